//! Directory-backed kernel cache.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use reqwest::{redirect, Client};
use sha2::{Digest, Sha256};
use tempfile::TempDir;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::archive::{extract_entry, KernelArchive};
use crate::KernelError;

/// File name of the cached kernel binary.
pub const KERNEL_FILE_NAME: &str = "vmlinux";

/// Permissions of the cached kernel binary.
pub const KERNEL_MODE: u32 = 0o644;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_REDIRECTS: usize = 10;

/// Resolves the boot kernel, downloading it on first use.
#[derive(Debug, Clone)]
pub struct KernelCache {
    root: PathBuf,
    archive: KernelArchive,
    cached_path: PathBuf,
    client: Client,
}

impl KernelCache {
    /// Create a cache rooted at `root` (usually `<caches>/cluster/kernels`).
    pub fn new(root: impl Into<PathBuf>, archive: KernelArchive) -> Result<Self, KernelError> {
        let root = root.into();
        let cached_path = root.join(archive.file_name()?).join(KERNEL_FILE_NAME);

        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .redirect(redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(|source| KernelError::Http {
                url: archive.url.clone(),
                source,
            })?;

        Ok(Self {
            root,
            archive,
            cached_path,
            client,
        })
    }

    /// Cache rooted in the per-user cache directory.
    pub fn user_default(archive: KernelArchive) -> Result<Self, KernelError> {
        Self::new(cluster_paths::cache_dir()?.join("kernels"), archive)
    }

    /// Root directory of the cache.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic location of the cached kernel.
    pub fn cached_path(&self) -> &Path {
        &self.cached_path
    }

    /// Archive the kernel is taken from.
    pub fn archive(&self) -> &KernelArchive {
        &self.archive
    }

    /// Resolve the kernel to boot.
    ///
    /// An explicit path is tilde-expanded and returned without any checks.
    /// Otherwise the cached kernel is returned, fetching it first if it is
    /// missing or empty.
    pub async fn resolve(&self, explicit: Option<&Path>) -> Result<PathBuf, KernelError> {
        if let Some(path) = explicit {
            let path = cluster_paths::expand_tilde(path)?;
            debug!(path = %path.display(), "Using explicit kernel");
            return Ok(path);
        }

        fs::create_dir_all(&self.root)
            .await
            .map_err(KernelError::io(&self.root))?;

        if self.is_cached().await {
            debug!(path = %self.cached_path.display(), "Kernel cache hit");
            return Ok(self.cached_path.clone());
        }

        info!(url = %self.archive.url, "Kernel cache miss, fetching");
        self.fetch().await?;
        Ok(self.cached_path.clone())
    }

    async fn is_cached(&self) -> bool {
        fs::metadata(&self.cached_path)
            .await
            .map(|meta| meta.is_file() && meta.len() > 0)
            .unwrap_or(false)
    }

    /// Download, extract and move the kernel into place.
    ///
    /// All intermediate files live in a private directory under the cache root
    /// so the final rename stays on one filesystem. The directory is removed
    /// when `workdir` drops, on success and on every error path.
    async fn fetch(&self) -> Result<(), KernelError> {
        let start = Instant::now();
        let workdir = tempfile::Builder::new()
            .prefix(".fetch-")
            .tempdir_in(&self.root)
            .map_err(KernelError::io(&self.root))?;

        let archive_path = self.download(&workdir).await?;

        let extracted = workdir.path().join(KERNEL_FILE_NAME);
        let entry = self.archive.entry.clone();
        let bytes = tokio::task::spawn_blocking({
            let archive_path = archive_path.clone();
            let extracted = extracted.clone();
            move || extract_entry(&archive_path, &entry, &extracted)
        })
        .await
        .map_err(|e| KernelError::Io {
            path: archive_path.clone(),
            source: std::io::Error::other(e),
        })??;

        self.install(&extracted).await?;

        let dir = workdir.path().to_path_buf();
        if let Err(e) = workdir.close() {
            warn!(dir = %dir.display(), error = %e, "Failed to remove kernel fetch directory");
        }

        info!(
            path = %self.cached_path.display(),
            bytes,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Kernel cached"
        );
        Ok(())
    }

    /// Stream the archive into `workdir`, verifying the digest when configured.
    async fn download(&self, workdir: &TempDir) -> Result<PathBuf, KernelError> {
        let url = &self.archive.url;
        let http_err = |source| KernelError::Http {
            url: url.clone(),
            source,
        };

        let response = self.client.get(url).send().await.map_err(http_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(KernelError::Download {
                url: url.clone(),
                status: status.as_u16(),
            });
        }

        let file_name = self.archive.file_name()?;
        let partial = workdir.path().join(format!("{file_name}.part"));
        let mut file = fs::File::create(&partial)
            .await
            .map_err(KernelError::io(&partial))?;

        let mut hasher = Sha256::new();
        let mut total_bytes = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(http_err)?;
            hasher.update(&chunk);
            total_bytes += chunk.len() as u64;
            file.write_all(&chunk)
                .await
                .map_err(KernelError::io(&partial))?;
        }
        file.sync_all().await.map_err(KernelError::io(&partial))?;
        drop(file);

        let digest = hex::encode(hasher.finalize());
        if let Some(expected) = &self.archive.sha256 {
            if !expected.eq_ignore_ascii_case(&digest) {
                return Err(KernelError::DigestMismatch {
                    expected: expected.clone(),
                    actual: digest,
                });
            }
        }

        let archive_path = workdir.path().join(&file_name);
        fs::rename(&partial, &archive_path)
            .await
            .map_err(KernelError::io(&archive_path))?;

        info!(
            url = %url,
            size = total_bytes,
            sha256 = %digest,
            "Kernel archive downloaded"
        );
        Ok(archive_path)
    }

    /// Publish `extracted` at the cache path.
    ///
    /// The file gets its final mode while still private, then a single rename
    /// replaces whatever is at the cache path. Concurrent fetches may each
    /// rename a complete kernel over the other's; nothing touches the cache
    /// path after that.
    async fn install(&self, extracted: &Path) -> Result<(), KernelError> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(extracted, std::fs::Permissions::from_mode(KERNEL_MODE))
                .await
                .map_err(KernelError::io(extracted))?;
        }

        let dest = &self.cached_path;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(KernelError::io(parent))?;
        }

        fs::rename(extracted, dest)
            .await
            .map_err(KernelError::io(dest))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cached_path_layout() {
        let archive = KernelArchive {
            url: "https://example.com/releases/kata-static-arm64.tar.gz".to_string(),
            entry: "opt/vmlinux".to_string(),
            sha256: None,
        };
        let cache = KernelCache::new("/var/cache/cluster/kernels", archive).unwrap();

        assert_eq!(
            cache.cached_path(),
            Path::new("/var/cache/cluster/kernels/kata-static-arm64.tar.gz/vmlinux")
        );
    }

    #[tokio::test]
    async fn test_empty_file_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let archive = KernelArchive {
            url: "https://example.com/k.tar".to_string(),
            entry: "vmlinux".to_string(),
            sha256: None,
        };
        let cache = KernelCache::new(dir.path(), archive).unwrap();
        std::fs::create_dir_all(cache.cached_path().parent().unwrap()).unwrap();

        std::fs::write(cache.cached_path(), b"").unwrap();
        assert!(!cache.is_cached().await);

        std::fs::write(cache.cached_path(), b"kernel").unwrap();
        assert!(cache.is_cached().await);
    }
}
