//! Kubeconfig errors.

use std::io;
use std::path::PathBuf;
use std::string::FromUtf8Error;

use cluster_paths::PathError;
use thiserror::Error;

/// Errors reading, writing or locating kubeconfig files.
#[derive(Debug, Error)]
pub enum KubeconfigError {
    #[error("failed to write kubeconfig to {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read kubeconfig from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("kubeconfig at {path:?} is not valid UTF-8")]
    Encoding {
        path: PathBuf,
        #[source]
        source: FromUtf8Error,
    },

    #[error(transparent)]
    Path(#[from] PathError),
}
