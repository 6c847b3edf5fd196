//! vatcore - Video Annotation Core
//!
//! Annotation object model for video annotation clients: shapes, tracks and
//! tags with their editable [`ObjectState`] snapshots, keyframe interpolation
//! of tracks, the per-session [`Collection`] and the [`AnnotationsSaver`] that
//! reconciles local edits with the annotation server.

pub mod collection;
pub mod config;
pub mod error;
pub mod format;
pub mod history;
pub mod interpolation;
pub mod model;
pub mod objects;
pub mod saver;
pub mod session;

pub use collection::{Collection, Statistics};
pub use config::EngineConfig;
pub use error::{AnnotationError, Result};
pub use format::AnnotationsData;
pub use history::{Command, History};
pub use model::{Label, LabelSet, ObjectState, ObjectType, ShapeType};
pub use objects::Annotation;
pub use saver::{AnnotationsSaver, SaveAction, ServerProxy, SessionType};
pub use session::AnnotationSession;
