//! Error types for acquisition, the host channel and the expansion store.
//!
//! None of these reach the tree consumer directly: acquisition errors only
//! decide which strategy runs next, and store errors are logged.

use thiserror::Error;

/// Why one acquisition strategy produced no usable content.
#[derive(Debug, Error)]
pub enum AcquireError {
    /// Network-level failure from the HTTP client.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("server answered {0}")]
    Status(reqwest::StatusCode),

    /// The strategy did not finish within its time budget.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The response carried no content.
    #[error("empty response body")]
    EmptyBody,

    /// The privileged host refused or failed the request.
    #[error("delegated fetch failed: {0}")]
    Delegation(String),

    /// The rendering surface could not produce a document.
    #[error("render failed: {0}")]
    Render(String),

    /// A document was rendered but contained no listing anchors.
    #[error("rendered document has no listing entries")]
    NoListing,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures on the message channel to the privileged host process.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("failed to start host process: {0}")]
    Spawn(std::io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The host answered with something that is not a response message.
    #[error("malformed host message: {0}")]
    Protocol(#[from] serde_json::Error),

    /// The host closed its end of the channel.
    #[error("host channel closed")]
    Closed,
}

/// Failures persisting the expansion set.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Host(#[from] HostError),

    /// The host answered but reported the write as unsuccessful.
    #[error("host rejected storage request")]
    Rejected,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid store contents: {0}")]
    Json(#[from] serde_json::Error),
}

/// Outcome of a listing load when no strategy delivered any content.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("listing unavailable for {path}: {reason}")]
    Unavailable { path: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn timeout_error_display() {
        let err = AcquireError::Timeout(Duration::from_secs(5));
        assert_eq!(err.to_string(), "timed out after 5s");
    }

    #[test]
    fn io_error_converts_into_store_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err: StoreError = io_err.into();
        assert!(matches!(err, StoreError::Io(_)));
        assert!(err.to_string().contains("read-only"));
    }

    #[test]
    fn host_error_is_transparent_inside_store_error() {
        let err: StoreError = HostError::Closed.into();
        assert_eq!(err.to_string(), "host channel closed");
    }

    #[test]
    fn unavailable_error_names_the_path() {
        let err = LoadError::Unavailable {
            path: "https://x/docs/".into(),
            reason: "empty response body".into(),
        };
        assert_eq!(
            err.to_string(),
            "listing unavailable for https://x/docs/: empty response body"
        );
    }
}
