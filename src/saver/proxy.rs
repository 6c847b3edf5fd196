//! Boundary to the annotation server.

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::format::wire::AnnotationsData;

/// Kind of session whose annotations are saved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionType {
    Task,
    Job,
}

impl SessionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionType::Task => "task",
            SessionType::Job => "job",
        }
    }
}

/// What the server does with a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveAction {
    /// Replace every annotation of the session
    Put,
    /// Create the objects; the response carries their server IDs
    Create,
    /// Replace the objects with the same server IDs
    Update,
    /// Remove the objects with the same server IDs
    Delete,
}

impl SaveAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaveAction::Put => "put",
            SaveAction::Create => "create",
            SaveAction::Update => "update",
            SaveAction::Delete => "delete",
        }
    }
}

impl fmt::Display for SaveAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport used by [`AnnotationsSaver`](super::AnnotationsSaver).
///
/// The response lists the affected objects in request order, each with its
/// server ID, together with the new annotations version.
pub trait ServerProxy {
    fn update_annotations(
        &self,
        session_type: SessionType,
        session_id: u64,
        payload: &AnnotationsData,
        action: SaveAction,
    ) -> impl Future<Output = Result<AnnotationsData>>;
}
