//! Guest kernel cache.
//!
//! The node runtime boots each node with an explicit kernel binary. Unless the
//! user supplies one, the kernel is pulled out of a release archive once and
//! kept at a deterministic path:
//!
//! ```text
//! <platform cache dir>/cluster/kernels/<archive file name>/vmlinux
//! ```
//!
//! A cached file is valid when it exists and is non-empty. There is no
//! content check on hits and nothing ever invalidates an entry.

mod archive;
mod cache;
mod error;

pub use archive::{
    default_archive_url, extract_entry, KernelArchive, DEFAULT_KERNEL_ENTRY, KATA_RELEASE,
};
pub use cache::{KernelCache, KERNEL_FILE_NAME, KERNEL_MODE};
pub use error::KernelError;
