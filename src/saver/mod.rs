//! Synchronization of a collection with the annotation server.
//!
//! The saver remembers the objects the server knows about (`initial_objects`,
//! keyed by server ID). On save it diffs the collection export against them:
//! objects without a server ID are created, known objects that changed are
//! updated, and known objects missing from the export are deleted. The three
//! requests run strictly one after another. After an `empty()` of the
//! collection the whole export replaces the server state in one request.

mod proxy;


use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};

use crate::collection::Collection;
use crate::error::{AnnotationError, Result};
use crate::format::wire::{AnnotationsData, LabeledShape, LabeledTag, LabeledTrack, WireObject};
use crate::model::object_state::{ClientId, ServerId};
use crate::objects::Annotation;

pub use proxy::{SaveAction, ServerProxy, SessionType};

/// Objects the server is known to hold, by kind and server ID.
#[derive(Debug, Clone, Default)]
struct InitialObjects {
    shapes: BTreeMap<ServerId, LabeledShape>,
    tracks: BTreeMap<ServerId, LabeledTrack>,
    tags: BTreeMap<ServerId, LabeledTag>,
}

impl InitialObjects {
    fn from_data(data: &AnnotationsData) -> Self {
        let mut objects = Self::default();
        objects.insert(data);
        objects
    }

    fn insert(&mut self, data: &AnnotationsData) {
        fn index<T: WireObject>(target: &mut BTreeMap<ServerId, T>, objects: &[T]) {
            for object in objects {
                if let Some(id) = object.server_id() {
                    target.insert(id, object.clone());
                }
            }
        }
        index(&mut self.shapes, &data.shapes);
        index(&mut self.tracks, &data.tracks);
        index(&mut self.tags, &data.tags);
    }

    fn remove(&mut self, data: &AnnotationsData) {
        for id in data.shapes.iter().filter_map(WireObject::server_id) {
            self.shapes.remove(&id);
        }
        for id in data.tracks.iter().filter_map(WireObject::server_id) {
            self.tracks.remove(&id);
        }
        for id in data.tags.iter().filter_map(WireObject::server_id) {
            self.tags.remove(&id);
        }
    }

    fn len(&self) -> usize {
        self.shapes.len() + self.tracks.len() + self.tags.len()
    }
}

/// Export of a collection split by the request it needs.
#[derive(Debug, Default)]
struct Changes {
    created: AnnotationsData,
    updated: AnnotationsData,
    deleted: AnnotationsData,
}

/// Sort the objects of one kind into created, updated and deleted.
fn split_kind<T: WireObject>(
    exported: &[T],
    initial: &BTreeMap<ServerId, T>,
    created: &mut Vec<T>,
    updated: &mut Vec<T>,
    deleted: &mut Vec<T>,
) -> Result<()> {
    let mut seen = BTreeSet::new();
    for object in exported {
        let Some(id) = object.server_id() else {
            created.push(object.clone());
            continue;
        };
        let Some(known) = initial.get(&id) else {
            return Err(AnnotationError::scripting(format!(
                "Object with server id {id} is unknown to the saver"
            )));
        };
        seen.insert(id);
        if serde_json::to_value(object)? != serde_json::to_value(known)? {
            updated.push(object.clone());
        }
    }

    deleted.extend(
        initial
            .iter()
            .filter(|(id, _)| !seen.contains(*id))
            .map(|(_, object)| object.clone()),
    );
    Ok(())
}

fn content_hash(data: &AnnotationsData) -> Result<u64> {
    let mut hasher = DefaultHasher::new();
    data.canonical_json()?.hash(&mut hasher);
    Ok(hasher.finish())
}

/// Saves the annotations of one session through a [`ServerProxy`].
#[derive(Debug)]
pub struct AnnotationsSaver<P> {
    session_type: SessionType,
    session_id: u64,
    version: u64,
    proxy: P,
    initial_objects: InitialObjects,
    hash: u64,
}

impl<P: ServerProxy> AnnotationsSaver<P> {
    /// Create a saver for a collection that holds the server state of
    /// annotations `version`.
    pub fn new(
        session_type: SessionType,
        session_id: u64,
        version: u64,
        proxy: P,
        collection: &Collection,
    ) -> Result<Self> {
        let exported = collection.export();
        Ok(Self {
            session_type,
            session_id,
            version,
            proxy,
            initial_objects: InitialObjects::from_data(&exported),
            hash: content_hash(&exported)?,
        })
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn proxy(&self) -> &P {
        &self.proxy
    }

    pub fn session_type(&self) -> SessionType {
        self.session_type
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Whether the collection differs from what was last saved or loaded.
    pub fn has_unsaved_changes(&self, collection: &Collection) -> bool {
        match content_hash(&collection.export()) {
            Ok(hash) => hash != self.hash,
            Err(e) => {
                log::warn!("Could not hash annotations, assuming unsaved changes: {e}");
                true
            }
        }
    }

    /// Forget server IDs of objects the server no longer holds.
    ///
    /// Undo and redo can bring back an object whose deletion was already
    /// saved. Without an ID it is created again on the next save.
    pub fn detach_unknown_ids(&self, collection: &mut Collection) {
        for object in collection.objects_mut() {
            let Some(id) = object.server_id() else {
                continue;
            };
            let known = match &*object {
                Annotation::Shape(_) => self.initial_objects.shapes.contains_key(&id),
                Annotation::Track(_) => self.initial_objects.tracks.contains_key(&id),
                Annotation::Tag(_) => self.initial_objects.tags.contains_key(&id),
            };
            if known {
                continue;
            }

            log::debug!(
                "Object {} lost server id {id}, it will be created again",
                object.client_id()
            );
            object.data_mut().server_id = None;
            if let Annotation::Track(track) = &mut *object {
                track.clear_keyframe_ids();
            }
        }
    }

    /// Push every local change to the server.
    ///
    /// Progress messages are reported through `on_update`. On error the
    /// message is reported as well and the error returned; requests that
    /// already succeeded are kept.
    pub async fn save(
        &mut self,
        collection: &mut Collection,
        mut on_update: impl FnMut(&str),
    ) -> Result<()> {
        match self.save_changes(collection, &mut on_update).await {
            Ok(()) => {
                on_update("Saving is done");
                log::info!(
                    "Saved annotations of {} {} (version {})",
                    self.session_type.as_str(),
                    self.session_id,
                    self.version
                );
                Ok(())
            }
            Err(e) => {
                let message = format!("Could not save annotations: {e}");
                log::error!("{message}");
                on_update(&message);
                Err(e)
            }
        }
    }

    async fn save_changes(
        &mut self,
        collection: &mut Collection,
        on_update: &mut dyn FnMut(&str),
    ) -> Result<()> {
        let exported = collection.export();

        if collection.flush() {
            on_update("New objects are being saved to the server");
            let response = self.request(&exported, SaveAction::Put).await?;
            reconcile_created(collection, &exported, &response)?;
            collection.reset_flush();
            self.initial_objects = InitialObjects::from_data(&response);
        } else {
            let changes = self.split(&exported)?;

            if !changes.created.is_empty() {
                on_update("New objects are being saved to the server");
                let response = self.request(&changes.created, SaveAction::Create).await?;
                reconcile_created(collection, &changes.created, &response)?;
                self.initial_objects.insert(&response);
            }
            if !changes.updated.is_empty() {
                on_update("Updated objects are being saved to the server");
                let response = self.request(&changes.updated, SaveAction::Update).await?;
                check_counts(&changes.updated, &response)?;
                adopt_updated_keyframe_ids(collection, &changes.updated, &response);
                self.initial_objects.insert(&response);
            }
            if !changes.deleted.is_empty() {
                on_update("Deleted objects are being removed from the server");
                self.request(&changes.deleted, SaveAction::Delete).await?;
                self.initial_objects.remove(&changes.deleted);
            }
        }

        self.hash = content_hash(&collection.export())?;
        log::debug!("Server holds {} known objects", self.initial_objects.len());
        Ok(())
    }

    fn split(&self, exported: &AnnotationsData) -> Result<Changes> {
        let mut changes = Changes::default();
        split_kind(
            &exported.shapes,
            &self.initial_objects.shapes,
            &mut changes.created.shapes,
            &mut changes.updated.shapes,
            &mut changes.deleted.shapes,
        )?;
        split_kind(
            &exported.tracks,
            &self.initial_objects.tracks,
            &mut changes.created.tracks,
            &mut changes.updated.tracks,
            &mut changes.deleted.tracks,
        )?;
        split_kind(
            &exported.tags,
            &self.initial_objects.tags,
            &mut changes.created.tags,
            &mut changes.updated.tags,
            &mut changes.deleted.tags,
        )?;
        Ok(changes)
    }

    /// Send one request carrying the current version and adopt the new one.
    async fn request(&mut self, payload: &AnnotationsData, action: SaveAction) -> Result<AnnotationsData> {
        let payload = payload.clone().with_version(self.version);
        log::debug!(
            "Sending {} request with {} objects (version {})",
            action,
            payload.len(),
            self.version
        );

        let response = self
            .proxy
            .update_annotations(self.session_type, self.session_id, &payload, action)
            .await?;
        self.version = response.version;
        Ok(response)
    }
}

/// Fail unless the server answered with as many objects as were sent.
fn check_counts(sent: &AnnotationsData, response: &AnnotationsData) -> Result<()> {
    let counts = |d: &AnnotationsData| (d.shapes.len(), d.tracks.len(), d.tags.len());
    if counts(sent) != counts(response) {
        return Err(AnnotationError::scripting(format!(
            "Number of saved objects {:?} differs from the number sent {:?}",
            counts(response),
            counts(sent)
        )));
    }
    Ok(())
}

/// Copy server IDs from a create or put response onto the live objects.
///
/// Objects are matched by position; `sent` carries the client ID of each.
fn reconcile_created(
    collection: &mut Collection,
    sent: &AnnotationsData,
    response: &AnnotationsData,
) -> Result<()> {
    check_counts(sent, response)?;

    let missing_id = || AnnotationError::scripting("The server did not assign an id to a new object");

    for (sent, saved) in sent.shapes.iter().zip(&response.shapes) {
        let id = saved.id.ok_or_else(missing_id)?;
        if let Some(object) = live_object(collection, sent.client_id) {
            object.data_mut().server_id = Some(id);
        }
    }
    for (sent, saved) in sent.tracks.iter().zip(&response.tracks) {
        let id = saved.id.ok_or_else(missing_id)?;
        if let Some(object) = live_object(collection, sent.client_id) {
            object.data_mut().server_id = Some(id);
            if let Annotation::Track(track) = object {
                track.adopt_keyframe_ids(&saved.shapes);
            }
        }
    }
    for (sent, saved) in sent.tags.iter().zip(&response.tags) {
        let id = saved.id.ok_or_else(missing_id)?;
        if let Some(object) = live_object(collection, sent.client_id) {
            object.data_mut().server_id = Some(id);
        }
    }
    Ok(())
}

/// Copy keyframe IDs from an update response onto the live tracks.
///
/// Keyframes added since the last save get their IDs here. Tracks are
/// matched by server ID.
fn adopt_updated_keyframe_ids(
    collection: &mut Collection,
    sent: &AnnotationsData,
    response: &AnnotationsData,
) {
    for saved in &response.tracks {
        let client_id = sent
            .tracks
            .iter()
            .find(|track| track.id.is_some() && track.id == saved.id)
            .and_then(|track| track.client_id);
        if let Some(Annotation::Track(track)) = live_object(collection, client_id) {
            track.adopt_keyframe_ids(&saved.shapes);
        }
    }
}

fn live_object(collection: &mut Collection, client_id: Option<ClientId>) -> Option<&mut Annotation> {
    let client_id = client_id?;
    let object = collection.object_mut(client_id);
    if object.is_none() {
        log::warn!("Saved object {client_id} is no longer in the collection");
    }
    object
}
