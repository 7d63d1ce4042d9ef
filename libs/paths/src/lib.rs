//! Per-user directory resolution.
//!
//! Every on-disk location the tool touches is derived here:
//!
//! - kernel cache: `<platform cache dir>/cluster/kernels`
//! - CLI config: `<platform config dir>/cluster/config.json`
//! - kubeconfigs: `~/.kube/cluster/<name>.config`

use std::io;
use std::path::{Component, Path, PathBuf};

use directories::BaseDirs;
use thiserror::Error;

/// Directory segment used under every platform base directory.
pub const APP_DIR: &str = "cluster";

/// Errors resolving user directories.
#[derive(Debug, Error)]
pub enum PathError {
    #[error("could not determine the home directory of the current user")]
    NoHomeDirectory,

    #[error("could not make {path:?} absolute: {source}")]
    Absolute {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn base_dirs() -> Result<BaseDirs, PathError> {
    BaseDirs::new().ok_or(PathError::NoHomeDirectory)
}

/// The current user's home directory.
pub fn home_dir() -> Result<PathBuf, PathError> {
    Ok(base_dirs()?.home_dir().to_path_buf())
}

/// `<platform cache dir>/cluster`.
pub fn cache_dir() -> Result<PathBuf, PathError> {
    Ok(base_dirs()?.cache_dir().join(APP_DIR))
}

/// `<platform config dir>/cluster`.
pub fn config_dir() -> Result<PathBuf, PathError> {
    Ok(base_dirs()?.config_dir().join(APP_DIR))
}

/// Directory for runtime sockets. Falls back to the cache dir on platforms
/// without a per-user runtime dir (macOS).
pub fn runtime_dir() -> Result<PathBuf, PathError> {
    let dirs = base_dirs()?;
    let base = dirs.runtime_dir().unwrap_or_else(|| dirs.cache_dir());
    Ok(base.join(APP_DIR))
}

/// `~/.kube/cluster`.
pub fn kube_dir() -> Result<PathBuf, PathError> {
    Ok(home_dir()?.join(".kube").join(APP_DIR))
}

/// Expand a leading `~` and make the result absolute.
pub fn expand_tilde(path: &Path) -> Result<PathBuf, PathError> {
    let expanded = if starts_with_tilde(path) {
        expand_with_home(path, &home_dir()?)
    } else {
        path.to_path_buf()
    };

    std::path::absolute(&expanded).map_err(|source| PathError::Absolute {
        path: expanded,
        source,
    })
}

fn starts_with_tilde(path: &Path) -> bool {
    matches!(path.components().next(), Some(Component::Normal(first)) if first == "~")
}

/// Replace a leading `~` component with `home`. Paths without one are
/// returned unchanged; `~user` forms are not supported.
pub fn expand_with_home(path: &Path, home: &Path) -> PathBuf {
    if !starts_with_tilde(path) {
        return path.to_path_buf();
    }

    let rest: PathBuf = path.components().skip(1).collect();
    if rest.as_os_str().is_empty() {
        home.to_path_buf()
    } else {
        home.join(rest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_with_home_replaces_leading_tilde() {
        let home = Path::new("/home/dev");
        assert_eq!(
            expand_with_home(Path::new("~/kernels/vmlinux"), home),
            PathBuf::from("/home/dev/kernels/vmlinux")
        );
        assert_eq!(expand_with_home(Path::new("~"), home), PathBuf::from("/home/dev"));
    }

    #[test]
    fn test_expand_with_home_leaves_other_paths() {
        let home = Path::new("/home/dev");
        assert_eq!(
            expand_with_home(Path::new("/opt/vmlinux"), home),
            PathBuf::from("/opt/vmlinux")
        );
        assert_eq!(
            expand_with_home(Path::new("~user/vmlinux"), home),
            PathBuf::from("~user/vmlinux")
        );
        assert_eq!(
            expand_with_home(Path::new("kernels/~/vmlinux"), home),
            PathBuf::from("kernels/~/vmlinux")
        );
    }

    #[test]
    fn test_expand_tilde_is_absolute() {
        let expanded = expand_tilde(Path::new("relative/vmlinux")).unwrap();
        assert!(expanded.is_absolute());
        assert!(expanded.ends_with("relative/vmlinux"));
    }
}
