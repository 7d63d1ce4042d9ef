//! Node runtime errors.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors talking to the node runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The runtime service could not be reached at all.
    #[error("node runtime is not reachable at {socket:?}: {message}")]
    Unavailable { socket: PathBuf, message: String },

    #[error("node runtime error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("node {0} not found")]
    NotFound(String),

    #[error("invalid response from node runtime: {0}")]
    Protocol(String),

    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl RuntimeError {
    /// True when the runtime service itself is down or missing.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, RuntimeError::Unavailable { .. })
    }
}

impl From<hyper::http::Error> for RuntimeError {
    fn from(err: hyper::http::Error) -> Self {
        RuntimeError::Protocol(err.to_string())
    }
}
