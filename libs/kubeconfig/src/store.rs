//! Kubeconfig file persistence.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::KubeconfigError;

/// Permissions for written kubeconfigs. The document carries client credentials.
pub const KUBECONFIG_MODE: u32 = 0o600;

/// `~/.kube/cluster/<name>.config`.
pub fn default_path(cluster_name: &str) -> Result<PathBuf, KubeconfigError> {
    Ok(cluster_paths::kube_dir()?.join(format!("{cluster_name}.config")))
}

/// Explicit override (tilde-expanded) or the default path for `cluster_name`.
pub fn resolve_path(
    explicit: Option<&Path>,
    cluster_name: &str,
) -> Result<PathBuf, KubeconfigError> {
    match explicit {
        Some(path) => Ok(cluster_paths::expand_tilde(path)?),
        None => default_path(cluster_name),
    }
}

/// Atomically write `text` to `path`, creating parent directories.
///
/// The content goes to a temporary file in the destination directory which
/// is restricted to the owner before being renamed over `path`.
pub fn write(text: &str, path: &Path) -> Result<(), KubeconfigError> {
    let write_err = |source| KubeconfigError::Write {
        path: path.to_path_buf(),
        source,
    };

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(write_err)?;

    let mut file = NamedTempFile::new_in(parent).map_err(write_err)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.as_file()
            .set_permissions(fs::Permissions::from_mode(KUBECONFIG_MODE))
            .map_err(write_err)?;
    }

    file.write_all(text.as_bytes()).map_err(write_err)?;
    file.as_file().sync_all().map_err(write_err)?;
    file.persist(path).map_err(|e| write_err(e.error))?;

    debug!(path = %path.display(), bytes = text.len(), "Wrote kubeconfig");
    Ok(())
}

/// Read a kubeconfig, requiring valid UTF-8.
pub fn read(path: &Path) -> Result<String, KubeconfigError> {
    let bytes = fs::read(path).map_err(|source| KubeconfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    String::from_utf8(bytes).map_err(|source| KubeconfigError::Encoding {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_creates_parents_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/dir/uds.config");

        write("current-context: uds\n", &path).unwrap();

        assert_eq!(read(&path).unwrap(), "current-context: uds\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_write_restricts_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uds.config");
        fs::write(&path, "old").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        write("new", &path).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, KUBECONFIG_MODE);
        assert_eq!(read(&path).unwrap(), "new");
    }

    #[test]
    fn test_write_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uds.config");

        write("a", &path).unwrap();
        write("b", &path).unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_read_rejects_invalid_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.config");
        fs::write(&path, [0x66, 0x6f, 0xff, 0xfe]).unwrap();

        let err = read(&path).unwrap_err();
        assert!(matches!(err, KubeconfigError::Encoding { .. }));
    }

    #[test]
    fn test_read_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = read(&dir.path().join("missing.config")).unwrap_err();
        assert!(matches!(err, KubeconfigError::Read { .. }));
    }

    #[test]
    fn test_resolve_path_prefers_explicit() {
        let resolved = resolve_path(Some(Path::new("/tmp/explicit.config")), "uds").unwrap();
        assert_eq!(resolved, PathBuf::from("/tmp/explicit.config"));
    }

    #[test]
    fn test_default_path_layout() {
        let path = default_path("uds").unwrap();
        assert!(path.ends_with(".kube/cluster/uds.config"));
    }
}
