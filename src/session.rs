//! Annotation session: collection, saver and history in one place.

use crate::collection::{Collection, Statistics};
use crate::config::EngineConfig;
use crate::error::{AnnotationError, Result};
use crate::format::wire::AnnotationsData;
use crate::history::{Command, History};
use crate::model::label::LabelSet;
use crate::model::object_state::{ClientId, Frame, ObjectState};
use crate::objects::Annotation;
use crate::saver::{AnnotationsSaver, ServerProxy, SessionType};

/// Annotations of one task or job, with undo history and server sync.
///
/// Edits made through the session are recorded in the history. Edits made
/// directly on the [`Collection`] are not.
#[derive(Debug)]
pub struct AnnotationSession<P> {
    collection: Collection,
    saver: AnnotationsSaver<P>,
    history: History,
}

impl<P: ServerProxy> AnnotationSession<P> {
    /// Open a session on the annotations loaded from the server.
    pub fn new(
        session_type: SessionType,
        session_id: u64,
        labels: LabelSet,
        frames: (Frame, Frame),
        config: EngineConfig,
        data: &AnnotationsData,
        proxy: P,
    ) -> Result<Self> {
        let history = History::with_config(config.history);
        let mut collection = Collection::new(labels, frames.0, frames.1, config);
        collection.import(data)?;
        let saver = AnnotationsSaver::new(session_type, session_id, data.version, proxy, &collection)?;

        log::info!(
            "Opened {} {} with {} objects (version {})",
            session_type.as_str(),
            session_id,
            collection.len(),
            data.version
        );
        Ok(Self {
            collection,
            saver,
            history,
        })
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn saver(&self) -> &AnnotationsSaver<P> {
        &self.saver
    }

    pub fn get(&self, frame: Frame) -> Result<Vec<ObjectState>> {
        self.collection.get(frame)
    }

    pub fn export(&self) -> AnnotationsData {
        self.collection.export()
    }

    pub fn statistics(&self) -> Statistics {
        self.collection.statistics()
    }

    fn snapshot(&self, ids: &[ClientId]) -> Vec<Annotation> {
        ids.iter()
            .filter_map(|id| self.collection.object(*id).cloned())
            .collect()
    }

    fn record(&mut self, description: &str, frame: Frame, before: Vec<Annotation>, after: Vec<Annotation>) {
        if before == after {
            return;
        }
        self.history.push(Command::Changed {
            description: description.to_string(),
            frame,
            before,
            after,
        });
    }

    /// Create new objects.
    pub fn put(&mut self, states: &[ObjectState]) -> Result<Vec<ClientId>> {
        let ids = self.collection.put(states)?;
        let after = self.snapshot(&ids);
        let before = after.iter().cloned().map(removed).collect();
        let frame = states.first().map(|s| s.frame()).unwrap_or(0);
        self.record("Create objects", frame, before, after);
        Ok(ids)
    }

    /// Commit an edited state.
    pub fn save_state(&mut self, state: &ObjectState) -> Result<ObjectState> {
        let ids = client_ids(std::slice::from_ref(state))?;
        let before = self.snapshot(&ids);
        let saved = self.collection.save(state)?;
        let after = self.snapshot(&ids);
        self.record("Edit object", state.frame(), before, after);
        Ok(saved)
    }

    /// Delete the object of a state. Locked objects need `force`.
    pub fn delete_state(&mut self, state: &ObjectState, force: bool) -> Result<bool> {
        let ids = client_ids(std::slice::from_ref(state))?;
        let before = self.snapshot(&ids);
        let deleted = self.collection.delete(state, force)?;
        let after = self.snapshot(&ids);
        self.record("Delete object", state.frame(), before, after);
        Ok(deleted)
    }

    pub fn group(&mut self, states: &[ObjectState], reset: bool) -> Result<u32> {
        let ids = client_ids(states)?;
        let before = self.snapshot(&ids);
        let group = self.collection.group(states, reset)?;
        let after = self.snapshot(&ids);
        let description = if reset { "Ungroup objects" } else { "Group objects" };
        let frame = states.first().map(|s| s.frame()).unwrap_or(0);
        self.record(description, frame, before, after);
        Ok(group)
    }

    pub fn merge(&mut self, states: &[ObjectState]) -> Result<ClientId> {
        let ids = client_ids(states)?;
        let mut before = self.snapshot(&ids);
        let track = self.collection.merge(states)?;

        let mut after = self.snapshot(&ids);
        let created = self.snapshot(&[track]);
        before.extend(created.iter().cloned().map(removed));
        after.extend(created);
        let frame = states.first().map(|s| s.frame()).unwrap_or(0);
        self.record("Merge objects", frame, before, after);
        Ok(track)
    }

    pub fn split(&mut self, state: &ObjectState, frame: Frame) -> Result<(ClientId, ClientId)> {
        let ids = client_ids(std::slice::from_ref(state))?;
        let mut before = self.snapshot(&ids);
        let (first, second) = self.collection.split(state, frame)?;

        let mut after = self.snapshot(&ids);
        let created = self.snapshot(&[first, second]);
        before.extend(created.iter().cloned().map(removed));
        after.extend(created);
        self.record("Split track", frame, before, after);
        Ok((first, second))
    }

    /// Undo the last edit. Returns the frame it was made on.
    pub fn undo(&mut self) -> Option<Frame> {
        let frame = self.history.undo(&mut self.collection);
        self.saver.detach_unknown_ids(&mut self.collection);
        frame
    }

    /// Redo the last undone edit. Returns the frame it was made on.
    pub fn redo(&mut self) -> Option<Frame> {
        let frame = self.history.redo(&mut self.collection);
        self.saver.detach_unknown_ids(&mut self.collection);
        frame
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.saver.has_unsaved_changes(&self.collection)
    }

    /// Save every change to the server.
    pub async fn save(&mut self, on_update: impl FnMut(&str)) -> Result<()> {
        self.saver.save(&mut self.collection, on_update).await
    }

    /// Remove every object. The next save replaces the server annotations.
    pub fn clear(&mut self) {
        self.collection.empty();
        self.history.clear();
    }
}

fn removed(mut object: Annotation) -> Annotation {
    object.data_mut().removed = true;
    object
}

fn client_ids(states: &[ObjectState]) -> Result<Vec<ClientId>> {
    states
        .iter()
        .map(|state| {
            state.client_id().ok_or_else(|| {
                AnnotationError::scripting("The object state does not belong to the collection yet")
            })
        })
        .collect()
}
