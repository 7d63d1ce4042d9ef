//! Kernel cache errors.

use std::io;
use std::path::{Path, PathBuf};

use cluster_paths::PathError;
use thiserror::Error;

/// Errors resolving the boot kernel.
#[derive(Debug, Error)]
pub enum KernelError {
    #[error("invalid kernel archive URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to download kernel archive from {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("kernel archive download from {url} failed with HTTP status {status}")]
    Download { url: String, status: u16 },

    #[error("kernel archive digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("{path:?} is not a tar, tar.gz or tar.xz archive")]
    UnsupportedArchive { path: PathBuf },

    #[error("failed to read kernel archive {path:?}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("kernel archive has no entry {entry}")]
    EntryMissing { entry: String },

    #[error("kernel archive entry {entry} is a {kind}, not a regular file")]
    EntryNotFile { entry: String, kind: String },

    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Path(#[from] PathError),
}

impl KernelError {
    /// Attach `path` to an I/O error.
    pub(crate) fn io(path: &Path) -> impl FnOnce(io::Error) -> KernelError + '_ {
        move |source| KernelError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Attach `path` to an error reading or decompressing an archive.
    pub(crate) fn archive(path: &Path) -> impl FnOnce(io::Error) -> KernelError + '_ {
        move |source| KernelError::Archive {
            path: path.to_path_buf(),
            source,
        }
    }
}
