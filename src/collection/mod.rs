//! In-memory annotation collection of one session.
//!
//! The collection owns every annotation entity, keyed by client ID, plus
//! frame indexes for shapes and tags. Consumers interact with it through
//! [`ObjectState`] snapshots: `get` materializes them, `save` and `delete`
//! resolve their handle and apply the change to the owning entity.

mod edit;
mod statistics;


use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::error::{AnnotationError, Result};
use crate::format::wire::AnnotationsData;
use crate::model::label::{Label, LabelSet};
use crate::model::object_state::{ClientId, Frame, ObjectState, ObjectType};
use crate::objects::{Annotation, ShapeObject, TagObject, TrackObject};

pub use statistics::{KindCount, LabelStatistics, Statistics};

/// All annotations of a session.
#[derive(Debug, Clone)]
pub struct Collection {
    labels: LabelSet,
    start_frame: Frame,
    stop_frame: Frame,
    config: EngineConfig,
    /// Every entity, removed ones included, in creation order
    objects: BTreeMap<ClientId, Annotation>,
    /// Shape client IDs per frame, in insertion order
    shapes: BTreeMap<Frame, Vec<ClientId>>,
    /// Tag client IDs per frame, in insertion order
    tags: BTreeMap<Frame, Vec<ClientId>>,
    /// Track client IDs in insertion order
    tracks: Vec<ClientId>,
    /// Next client ID to hand out
    count: ClientId,
    /// Set by `empty()`; the next save replaces everything on the server
    flush: bool,
    /// Bumped by `empty()`, which restarts client IDs. States of an older
    /// epoch no longer resolve.
    epoch: u64,
    /// Largest group ID in use
    max_group: u32,
}

impl Collection {
    /// Create an empty collection for the frames `start_frame..=stop_frame`.
    pub fn new(labels: LabelSet, start_frame: Frame, stop_frame: Frame, config: EngineConfig) -> Self {
        Self {
            labels,
            start_frame,
            stop_frame,
            config,
            objects: BTreeMap::new(),
            shapes: BTreeMap::new(),
            tags: BTreeMap::new(),
            tracks: Vec::new(),
            count: 0,
            flush: false,
            epoch: 0,
            max_group: 0,
        }
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn start_frame(&self) -> Frame {
        self.start_frame
    }

    pub fn stop_frame(&self) -> Frame {
        self.stop_frame
    }

    #[inline]
    pub fn flush(&self) -> bool {
        self.flush
    }

    #[inline]
    pub(crate) fn reset_flush(&mut self) {
        self.flush = false;
    }

    #[inline]
    pub fn max_group(&self) -> u32 {
        self.max_group
    }

    /// Number of live (not removed) objects.
    pub fn len(&self) -> usize {
        self.objects.values().filter(|o| !o.is_removed()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entity by client ID, removed ones included.
    pub fn object(&self, client_id: ClientId) -> Option<&Annotation> {
        self.objects.get(&client_id)
    }

    pub(crate) fn object_mut(&mut self, client_id: ClientId) -> Option<&mut Annotation> {
        self.objects.get_mut(&client_id)
    }

    pub(crate) fn objects_mut(&mut self) -> impl Iterator<Item = &mut Annotation> {
        self.objects.values_mut()
    }

    pub(crate) fn next_client_id(&mut self) -> ClientId {
        let id = self.count;
        self.count += 1;
        id
    }

    fn label_for_import(&self, label_id: u32) -> Result<Arc<Label>> {
        self.labels
            .get(label_id)
            .cloned()
            .ok_or_else(|| AnnotationError::data(format!("Unknown label id {label_id} in annotations")))
    }

    /// Import wire data, assigning fresh client IDs.
    ///
    /// Either every object is imported or none is. Tracks without keyframes
    /// are skipped with a warning. Returns the client IDs of the imported
    /// objects.
    pub fn import(&mut self, data: &AnnotationsData) -> Result<Vec<ClientId>> {
        let mut count = self.count;
        let mut next_id = || {
            let id = count;
            count += 1;
            id
        };

        let mut imported = Vec::with_capacity(data.len());
        for wire in &data.shapes {
            let client_id = next_id();
            let label = self.label_for_import(wire.label_id)?;
            let color = self.config.color_for(client_id);
            imported.push(Annotation::Shape(ShapeObject::from_wire(wire, client_id, label, color)?));
        }
        for wire in &data.tracks {
            let client_id = next_id();
            let label = self.label_for_import(wire.label_id)?;
            let color = self.config.color_for(client_id);
            if let Some(track) = TrackObject::from_wire(wire, client_id, label, color)? {
                imported.push(Annotation::Track(track));
            }
        }
        for wire in &data.tags {
            let client_id = next_id();
            let label = self.label_for_import(wire.label_id)?;
            let color = self.config.color_for(client_id);
            imported.push(Annotation::Tag(TagObject::from_wire(wire, client_id, label, color)));
        }

        self.count = count;
        let ids: Vec<ClientId> = imported.iter().map(Annotation::client_id).collect();
        for object in imported {
            self.insert(object);
        }

        log::info!(
            "Imported {} objects ({} shapes, {} tracks, {} tags)",
            ids.len(),
            data.shapes.len(),
            data.tracks.len(),
            data.tags.len()
        );
        Ok(ids)
    }

    /// Register an entity in the object map and the frame indexes.
    pub(crate) fn insert(&mut self, object: Annotation) {
        let client_id = object.client_id();
        let frame = object.data().frame;
        self.max_group = self.max_group.max(object.data().group);
        self.count = self.count.max(client_id + 1);

        let index = match object.object_type() {
            ObjectType::Shape => Some(self.shapes.entry(frame).or_default()),
            ObjectType::Tag => Some(self.tags.entry(frame).or_default()),
            ObjectType::Track => None,
        };
        match index {
            Some(ids) => {
                if !ids.contains(&client_id) {
                    ids.push(client_id);
                }
            }
            None => {
                if !self.tracks.contains(&client_id) {
                    self.tracks.push(client_id);
                }
            }
        }

        self.objects.insert(client_id, object);
    }

    /// Wire form of every live object. The version is left at 0.
    pub fn export(&self) -> AnnotationsData {
        let live = |id: &ClientId| self.objects.get(id).filter(|o| !o.is_removed());

        let mut data = AnnotationsData::new();
        for object in self.tracks.iter().filter_map(live) {
            if let Annotation::Track(track) = object {
                data.tracks.push(track.to_wire());
            }
        }
        for object in self.shapes.values().flatten().filter_map(live) {
            if let Annotation::Shape(shape) = object {
                data.shapes.push(shape.to_wire());
            }
        }
        for object in self.tags.values().flatten().filter_map(live) {
            if let Annotation::Tag(tag) = object {
                data.tags.push(tag.to_wire());
            }
        }
        data
    }

    /// Materialize every live object visible on `frame`: all tracks, then the
    /// shapes and tags of that frame.
    pub fn get(&self, frame: Frame) -> Result<Vec<ObjectState>> {
        let interpolation = &self.config.interpolation;
        let on_frame = |index: &BTreeMap<Frame, Vec<ClientId>>| -> Vec<ClientId> {
            index.get(&frame).cloned().unwrap_or_default()
        };

        let ids = self
            .tracks
            .iter()
            .copied()
            .chain(on_frame(&self.shapes))
            .chain(on_frame(&self.tags));

        let mut states = Vec::new();
        for id in ids {
            match self.objects.get(&id) {
                Some(object) if !object.is_removed() => {
                    let mut state = object.get(frame, interpolation)?;
                    state.epoch = self.epoch;
                    states.push(state);
                }
                _ => {}
            }
        }
        Ok(states)
    }

    /// Drop every object. The next save replaces all server annotations.
    pub fn empty(&mut self) {
        self.objects.clear();
        self.shapes.clear();
        self.tags.clear();
        self.tracks.clear();
        self.count = 0;
        self.max_group = 0;
        self.flush = true;
        self.epoch += 1;
        log::info!("Collection emptied, next save will flush");
    }

    /// Resolve the owning entity of a state.
    fn resolve(&self, state: &ObjectState) -> Result<ClientId> {
        let Some(client_id) = state.client_id else {
            return Err(AnnotationError::scripting(
                "The object state does not belong to the collection yet",
            ));
        };
        if state.epoch != self.epoch {
            return Err(AnnotationError::scripting(format!(
                "Object {client_id} belongs to annotations that were emptied"
            )));
        }
        match self.objects.get(&client_id) {
            Some(object) if object.object_type() != state.object_type => {
                Err(AnnotationError::scripting(format!(
                    "Object {client_id} is a {}, not a {}",
                    object.object_type().as_str(),
                    state.object_type.as_str()
                )))
            }
            Some(object) if object.is_removed() => Err(AnnotationError::scripting(format!(
                "Object {client_id} has been deleted"
            ))),
            Some(_) => Ok(client_id),
            None => Err(AnnotationError::scripting(format!(
                "Object {client_id} is not in the collection"
            ))),
        }
    }

    /// Commit the flagged edits of `state` and return the resulting state.
    pub fn save(&mut self, state: &ObjectState) -> Result<ObjectState> {
        let client_id = self.resolve(state)?;
        let object = self
            .objects
            .get_mut(&client_id)
            .ok_or_else(|| AnnotationError::scripting(format!("Object {client_id} vanished")))?;

        object.save(state.frame, state, &self.labels, &self.config.interpolation)?;
        self.max_group = self.max_group.max(object.data().group);
        let mut saved = object.get(state.frame, &self.config.interpolation)?;
        saved.epoch = self.epoch;
        Ok(saved)
    }

    /// Delete the owning entity of `state`. Locked objects need `force`.
    ///
    /// Returns whether the object was deleted.
    pub fn delete(&mut self, state: &ObjectState, force: bool) -> Result<bool> {
        let client_id = self.resolve(state)?;
        let deleted = self
            .objects
            .get_mut(&client_id)
            .map(|object| object.delete(force))
            .unwrap_or(false);
        if !deleted {
            log::debug!("Object {client_id} is locked and was not deleted");
        }
        Ok(deleted)
    }

    /// Put an entity snapshot back, replacing the entity with the same client ID.
    ///
    /// The server IDs of the replaced entity win over those of the snapshot,
    /// which may predate a save.
    pub fn restore(&mut self, mut object: Annotation) {
        if let Some(current) = self.objects.get(&object.client_id()) {
            if current.server_id().is_some() {
                object.data_mut().server_id = current.server_id();
            }
            if let (Annotation::Track(track), Annotation::Track(current)) = (&mut object, current) {
                track.inherit_keyframe_ids(current);
            }
        }
        if let Annotation::Track(track) = &object {
            track.reset_cache();
        }
        self.insert(object);
    }
}
