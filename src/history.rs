//! Undo/redo history for annotation edits.
//!
//! Every recorded command stores snapshots of the affected entities before
//! and after the change. Undoing puts the `before` snapshots back into the
//! collection, redoing puts the `after` snapshots back. Objects that did not
//! exist before a change are recorded with a removed snapshot.

use crate::collection::Collection;
use crate::config::HistoryConfig;
use crate::model::object_state::Frame;
use crate::objects::Annotation;

// ============================================================================
// Command Types
// ============================================================================

/// A recorded change that can be undone and redone.
#[derive(Debug, Clone)]
pub enum Command {
    /// Entities replaced by an edit
    Changed {
        /// Human-readable name of the edit
        description: String,
        /// Frame the edit was made on
        frame: Frame,
        /// Snapshots before the edit
        before: Vec<Annotation>,
        /// Snapshots after the edit
        after: Vec<Annotation>,
    },
    /// Several commands undone and redone as one step
    Batch {
        description: String,
        commands: Vec<Command>,
    },
}

impl Command {
    pub fn description(&self) -> &str {
        match self {
            Command::Changed { description, .. } | Command::Batch { description, .. } => {
                description
            }
        }
    }

    /// Frame of the (first) edit.
    pub fn frame(&self) -> Option<Frame> {
        match self {
            Command::Changed { frame, .. } => Some(*frame),
            Command::Batch { commands, .. } => commands.iter().find_map(Command::frame),
        }
    }

    fn apply_undo(&self, collection: &mut Collection) {
        match self {
            Command::Changed { before, .. } => {
                for object in before {
                    collection.restore(object.clone());
                }
            }
            Command::Batch { commands, .. } => {
                for command in commands.iter().rev() {
                    command.apply_undo(collection);
                }
            }
        }
    }

    fn apply_redo(&self, collection: &mut Collection) {
        match self {
            Command::Changed { after, .. } => {
                for object in after {
                    collection.restore(object.clone());
                }
            }
            Command::Batch { commands, .. } => {
                for command in commands {
                    command.apply_redo(collection);
                }
            }
        }
    }
}

// ============================================================================
// History Stack
// ============================================================================

/// The undo/redo history of a session.
///
/// Pushing a command clears the redo stack. The undo stack keeps at most
/// `max_history` commands, dropping the oldest first.
#[derive(Debug, Clone, Default)]
pub struct History {
    undo_stack: Vec<Command>,
    redo_stack: Vec<Command>,
    config: HistoryConfig,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: HistoryConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Record a command that has already been applied.
    pub fn push(&mut self, command: Command) {
        log::debug!("History: pushed '{}'", command.description());
        self.undo_stack.push(command);
        self.redo_stack.clear();

        while self.undo_stack.len() > self.config.max_history {
            self.undo_stack.remove(0);
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Undo the last command. Returns the frame it was made on.
    pub fn undo(&mut self, collection: &mut Collection) -> Option<Frame> {
        let command = self.undo_stack.pop()?;
        log::debug!("History: undo '{}'", command.description());
        command.apply_undo(collection);
        let frame = command.frame();
        self.redo_stack.push(command);
        frame
    }

    /// Redo the last undone command. Returns the frame it was made on.
    pub fn redo(&mut self, collection: &mut Collection) -> Option<Frame> {
        let command = self.redo_stack.pop()?;
        log::debug!("History: redo '{}'", command.description());
        command.apply_redo(collection);
        let frame = command.frame();
        self.undo_stack.push(command);
        frame
    }

    pub fn undo_description(&self) -> Option<&str> {
        self.undo_stack.last().map(Command::description)
    }

    pub fn redo_description(&self) -> Option<&str> {
        self.redo_stack.last().map(Command::description)
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        log::debug!("History cleared");
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::EngineConfig;
    use crate::model::geometry::ShapeType;
    use crate::model::label::{Label, LabelSet};
    use crate::model::object_state::{ObjectState, ObjectType};

    fn collection_with_shape() -> Collection {
        let labels = LabelSet::new([Label::new(1, "car")]);
        let mut state = ObjectState::new(
            ObjectType::Shape,
            Some(ShapeType::Rectangle),
            0,
            Arc::clone(labels.get(1).unwrap()),
        )
        .unwrap();
        state.set_points(vec![0.0, 0.0, 1.0, 1.0]).unwrap();

        let mut collection = Collection::new(labels, 0, 10, EngineConfig::default());
        collection.put(&[state]).unwrap();
        collection
    }

    fn moved(collection: &mut Collection, points: Vec<f64>) -> Command {
        let before = collection.object(0).unwrap().clone();
        let mut state = collection.get(0).unwrap().remove(0);
        state.set_points(points).unwrap();
        collection.save(&state).unwrap();
        Command::Changed {
            description: "Move shape".into(),
            frame: 0,
            before: vec![before],
            after: vec![collection.object(0).unwrap().clone()],
        }
    }

    #[test]
    fn test_undo_and_redo_restore_snapshots() {
        let mut collection = collection_with_shape();
        let mut history = History::new();
        let command = moved(&mut collection, vec![2.0, 2.0, 3.0, 3.0]);
        history.push(command);

        assert_eq!(history.undo(&mut collection), Some(0));
        assert_eq!(collection.get(0).unwrap()[0].points(), &[0.0, 0.0, 1.0, 1.0]);
        assert!(history.can_redo());

        assert_eq!(history.redo(&mut collection), Some(0));
        assert_eq!(collection.get(0).unwrap()[0].points(), &[2.0, 2.0, 3.0, 3.0]);
        assert!(!history.can_redo());
        assert_eq!(history.undo_description(), Some("Move shape"));
    }

    #[test]
    fn test_push_clears_redo() {
        let mut collection = collection_with_shape();
        let mut history = History::new();
        history.push(moved(&mut collection, vec![2.0, 2.0, 3.0, 3.0]));
        history.undo(&mut collection);
        assert!(history.can_redo());

        history.push(moved(&mut collection, vec![4.0, 4.0, 5.0, 5.0]));
        assert!(!history.can_redo());
    }

    #[test]
    fn test_max_history() {
        let mut collection = collection_with_shape();
        let mut history = History::with_config(HistoryConfig { max_history: 3 });
        for i in 0..5 {
            let offset = f64::from(i);
            history.push(moved(
                &mut collection,
                vec![offset, offset, offset + 1.0, offset + 1.0],
            ));
        }
        assert_eq!(history.undo_count(), 3);
    }

    #[test]
    fn test_batch_undoes_in_reverse_order() {
        let mut collection = collection_with_shape();
        let mut history = History::new();
        let first = moved(&mut collection, vec![2.0, 2.0, 3.0, 3.0]);
        let second = moved(&mut collection, vec![4.0, 4.0, 5.0, 5.0]);
        history.push(Command::Batch {
            description: "Move twice".into(),
            commands: vec![first, second],
        });

        history.undo(&mut collection);
        assert_eq!(collection.get(0).unwrap()[0].points(), &[0.0, 0.0, 1.0, 1.0]);
        history.redo(&mut collection);
        assert_eq!(collection.get(0).unwrap()[0].points(), &[4.0, 4.0, 5.0, 5.0]);
    }

    #[test]
    fn test_empty_history() {
        let mut collection = collection_with_shape();
        let mut history = History::new();
        assert_eq!(history.undo(&mut collection), None);
        assert_eq!(history.redo(&mut collection), None);
        assert_eq!(history.redo_description(), None);
    }
}
