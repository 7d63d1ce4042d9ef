//! Kernel archive descriptor and single-entry extraction.

use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tar::{Archive, EntryType};
use tracing::debug;
use xz2::read::XzDecoder;

use crate::KernelError;

#[cfg(target_arch = "aarch64")]
const ARCH: &str = "arm64";
#[cfg(not(target_arch = "aarch64"))]
const ARCH: &str = "amd64";

/// Kata Containers release the default kernel is taken from.
pub const KATA_RELEASE: &str = "3.17.0";

/// Release archive the kernel is taken from by default.
pub fn default_archive_url() -> String {
    format!(
        "https://github.com/kata-containers/kata-containers/releases/download/\
         {KATA_RELEASE}/kata-static-{KATA_RELEASE}-{ARCH}.tar.xz"
    )
}

/// Path of the kernel binary inside the default archive.
pub const DEFAULT_KERNEL_ENTRY: &str = "opt/kata/share/kata-containers/vmlinux-6.12.28-153";

/// Where to fetch the kernel from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelArchive {
    /// HTTPS URL of a tar, tar.gz or tar.xz archive.
    pub url: String,
    /// Path of the kernel binary inside the archive.
    pub entry: String,
    /// Expected SHA-256 (hex) of the archive, checked on download when set.
    pub sha256: Option<String>,
}

impl Default for KernelArchive {
    fn default() -> Self {
        Self {
            url: default_archive_url(),
            entry: DEFAULT_KERNEL_ENTRY.to_string(),
            sha256: None,
        }
    }
}

impl KernelArchive {
    /// Last path segment of the URL; names the cache directory.
    pub fn file_name(&self) -> Result<String, KernelError> {
        let invalid = |reason: &str| KernelError::InvalidUrl {
            url: self.url.clone(),
            reason: reason.to_string(),
        };

        let url = reqwest::Url::parse(&self.url).map_err(|e| invalid(&e.to_string()))?;
        let name = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty() && *name != "." && *name != "..")
            .ok_or_else(|| invalid("URL has no file name"))?;

        Ok(name.to_string())
    }
}

/// Container format of a downloaded archive, sniffed from its first bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Tar,
    Gzip,
    Xz,
}

const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const XZ_MAGIC: &[u8] = &[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00];
/// `ustar` magic of POSIX and GNU tar headers.
const TAR_MAGIC: &[u8] = b"ustar";
const TAR_MAGIC_OFFSET: usize = 257;

/// Extract the regular file `entry` from the archive at `archive_path` into
/// `dest`. The bytes land in a sibling temporary file that is renamed over
/// `dest` once complete. Returns the number of bytes written.
pub fn extract_entry(archive_path: &Path, entry: &str, dest: &Path) -> Result<u64, KernelError> {
    let wanted = normalize(Path::new(entry));
    let format = sniff(archive_path)?;
    debug!(archive = %archive_path.display(), ?format, "Extracting kernel");

    let file = File::open(archive_path).map_err(KernelError::io(archive_path))?;
    let reader = BufReader::new(file);

    match format {
        Format::Tar => extract_from(Archive::new(reader), archive_path, &wanted, dest),
        Format::Gzip => extract_from(
            Archive::new(GzDecoder::new(reader)),
            archive_path,
            &wanted,
            dest,
        ),
        Format::Xz => extract_from(
            Archive::new(XzDecoder::new(reader)),
            archive_path,
            &wanted,
            dest,
        ),
    }
}

fn extract_from<R: Read>(
    mut archive: Archive<R>,
    archive_path: &Path,
    wanted: &Path,
    dest: &Path,
) -> Result<u64, KernelError> {
    let entries = archive.entries().map_err(KernelError::archive(archive_path))?;

    for entry in entries {
        let mut entry = entry.map_err(KernelError::archive(archive_path))?;
        let path = entry.path().map_err(KernelError::archive(archive_path))?;
        if normalize(&path) != wanted {
            continue;
        }

        let entry_type = entry.header().entry_type();
        if !matches!(entry_type, EntryType::Regular | EntryType::Continuous) {
            return Err(KernelError::EntryNotFile {
                entry: wanted.display().to_string(),
                kind: describe(entry_type).to_string(),
            });
        }

        let partial = dest.with_extension("partial");
        let mut out = File::create(&partial).map_err(KernelError::io(&partial))?;
        let written = io::copy(&mut entry, &mut out).map_err(KernelError::archive(archive_path))?;
        out.flush().map_err(KernelError::io(&partial))?;
        out.sync_all().map_err(KernelError::io(&partial))?;
        drop(out);

        fs::rename(&partial, dest).map_err(KernelError::io(dest))?;

        debug!(
            entry = %wanted.display(),
            dest = %dest.display(),
            bytes = written,
            "Extracted kernel"
        );
        return Ok(written);
    }

    Err(KernelError::EntryMissing {
        entry: wanted.display().to_string(),
    })
}

/// Drop `.` components so `./opt/x` and `opt/x` compare equal.
fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

fn describe(entry_type: EntryType) -> &'static str {
    match entry_type {
        EntryType::Directory => "directory",
        EntryType::Symlink => "symlink",
        EntryType::Link => "hard link",
        EntryType::Char | EntryType::Block => "device",
        EntryType::Fifo => "fifo",
        _ => "non-regular entry",
    }
}

/// Identify the archive by its magic bytes.
fn sniff(path: &Path) -> Result<Format, KernelError> {
    let mut head = Vec::with_capacity(TAR_MAGIC_OFFSET + TAR_MAGIC.len());
    File::open(path)
        .and_then(|file| {
            file.take((TAR_MAGIC_OFFSET + TAR_MAGIC.len()) as u64)
                .read_to_end(&mut head)
        })
        .map_err(KernelError::io(path))?;

    if head.starts_with(XZ_MAGIC) {
        Ok(Format::Xz)
    } else if head.starts_with(GZIP_MAGIC) {
        Ok(Format::Gzip)
    } else if head.get(TAR_MAGIC_OFFSET..) == Some(TAR_MAGIC) {
        Ok(Format::Tar)
    } else {
        Err(KernelError::UnsupportedArchive {
            path: path.to_path_buf(),
        })
    }
}
