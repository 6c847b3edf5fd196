//! Error types for annotation engine operations.

use thiserror::Error;

/// Errors that can occur while editing, importing or saving annotations.
#[derive(Error, Debug)]
pub enum AnnotationError {
    /// A public mutation received a malformed value.
    ///
    /// Always raised before any state is touched.
    #[error("Argument error: {0}")]
    Argument(String),

    /// The API was used against its contract (wrong frame, stale handle, ...).
    #[error("Scripting error: {0}")]
    Scripting(String),

    /// Import data is malformed (unknown shape type, unknown label).
    #[error("Data error: {0}")]
    Data(String),

    /// The server proxy failed.
    #[error("Server error{}: {message}", status_suffix(.status))]
    Server {
        /// HTTP-like status code when the backend reported one
        status: Option<u16>,
        /// Message returned by the backend or the transport
        message: String,
    },

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AnnotationError {
    /// Create an argument error with a message.
    pub fn argument(message: impl Into<String>) -> Self {
        Self::Argument(message.into())
    }

    /// Create a scripting error with a message.
    pub fn scripting(message: impl Into<String>) -> Self {
        Self::Scripting(message.into())
    }

    /// Create a data error with a message.
    pub fn data(message: impl Into<String>) -> Self {
        Self::Data(message.into())
    }

    /// Create a server error.
    pub fn server(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Server {
            status,
            message: message.into(),
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AnnotationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_error_display() {
        let with_status = AnnotationError::server(Some(409), "version conflict");
        assert_eq!(with_status.to_string(), "Server error (409): version conflict");

        let without_status = AnnotationError::server(None, "connection reset");
        assert_eq!(without_status.to_string(), "Server error: connection reset");
    }

    #[test]
    fn test_constructors() {
        assert!(matches!(
            AnnotationError::argument("bad"),
            AnnotationError::Argument(m) if m == "bad"
        ));
        assert!(matches!(
            AnnotationError::scripting("bad"),
            AnnotationError::Scripting(_)
        ));
        assert!(matches!(AnnotationError::data("bad"), AnnotationError::Data(_)));
    }
}
