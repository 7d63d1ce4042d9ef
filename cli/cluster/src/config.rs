//! CLI configuration.
//!
//! Read from `<config dir>/cluster/config.json` when present. Every field is
//! optional; the environment overrides the file and flags override both.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use cluster_kernel::KernelArchive;
use cluster_lifecycle::{
    DEFAULT_API_PORT, DEFAULT_CPUS, DEFAULT_IMAGE, DEFAULT_MEMORY, DEFAULT_POD_CIDR,
};
use serde::{Deserialize, Serialize};

/// Configuration file name.
const CONFIG_FILE: &str = "config.json";

/// Socket file name inside the runtime directory.
const RUNTIME_SOCKET: &str = "runtime.sock";

pub const ENV_RUNTIME_SOCKET: &str = "CLUSTER_RUNTIME_SOCKET";
pub const ENV_KERNEL_URL: &str = "CLUSTER_KERNEL_URL";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub runtime: RuntimeConfig,

    #[serde(default)]
    pub kernel: KernelConfig,

    #[serde(default)]
    pub defaults: CreateDefaults,
}

/// Node runtime service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Unix socket of the runtime service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket_path: Option<PathBuf>,
}

/// Boot kernel archive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_url: Option<String>,

    /// Path of the kernel inside the archive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<String>,

    /// Expected SHA-256 of the archive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

/// Defaults for `create` flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateDefaults {
    #[serde(default = "default_image")]
    pub image: String,

    #[serde(default = "default_cpus")]
    pub cpus: u32,

    #[serde(default = "default_memory")]
    pub memory: String,

    #[serde(default = "default_pod_cidr")]
    pub pod_cidr: String,

    #[serde(default = "default_api_port")]
    pub api_port: u16,
}

fn default_image() -> String {
    DEFAULT_IMAGE.to_string()
}

fn default_cpus() -> u32 {
    DEFAULT_CPUS
}

fn default_memory() -> String {
    DEFAULT_MEMORY.to_string()
}

fn default_pod_cidr() -> String {
    DEFAULT_POD_CIDR.to_string()
}

fn default_api_port() -> u16 {
    DEFAULT_API_PORT
}

impl Default for CreateDefaults {
    fn default() -> Self {
        Self {
            image: default_image(),
            cpus: default_cpus(),
            memory: default_memory(),
            pod_cidr: default_pod_cidr(),
            api_port: default_api_port(),
        }
    }
}

impl Config {
    /// Load the config file and apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = cluster_paths::config_dir()?.join(CONFIG_FILE);
        let mut config = Self::load_from(&path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from `path`, or defaults if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;

        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config from {:?}", path))
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(socket) = var(ENV_RUNTIME_SOCKET).filter(|v| !v.is_empty()) {
            self.runtime.socket_path = Some(PathBuf::from(socket));
        }
        if let Some(url) = var(ENV_KERNEL_URL).filter(|v| !v.is_empty()) {
            self.kernel.archive_url = Some(url);
        }
    }

    /// Runtime socket, defaulting to `<runtime dir>/cluster/runtime.sock`.
    pub fn runtime_socket(&self) -> Result<PathBuf> {
        match &self.runtime.socket_path {
            Some(path) => Ok(cluster_paths::expand_tilde(path)?),
            None => Ok(cluster_paths::runtime_dir()?.join(RUNTIME_SOCKET)),
        }
    }

    /// Kernel archive with configured fields replacing the built-in ones.
    pub fn kernel_archive(&self) -> KernelArchive {
        let mut archive = KernelArchive::default();
        if let Some(url) = &self.kernel.archive_url {
            archive.url = url.clone();
        }
        if let Some(entry) = &self.kernel.entry {
            archive.entry = entry.clone();
        }
        archive.sha256 = self.kernel.sha256.clone();
        archive
    }
}
