//! Cluster provisioning requests.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::ClusterError;

pub const DEFAULT_CLUSTER_NAME: &str = "default";
pub const DEFAULT_IMAGE: &str = "kindest/node:v1.33.1";
pub const DEFAULT_CPUS: u32 = 4;
pub const DEFAULT_MEMORY: &str = "4G";
pub const DEFAULT_POD_CIDR: &str = "10.244.0.0/16";
pub const DEFAULT_API_PORT: u16 = 6443;

/// Longest accepted cluster name. Leaves room for the node name suffix
/// within a 63 character DNS label.
pub const MAX_NAME_LENGTH: usize = 50;

const NODE_SUFFIX: &str = "-control-plane";

/// Raw user input for a cluster. Every field has a default.
#[derive(Debug, Clone)]
pub struct ClusterOptions {
    pub name: String,
    pub image: String,
    pub cpus: u32,
    pub memory: String,
    pub pod_cidr: String,
    pub api_port: u16,
    /// Boot kernel to use instead of the cached one.
    pub kernel: Option<PathBuf>,
    /// Where to write the kubeconfig instead of `~/.kube/cluster/<name>.config`.
    pub kubeconfig: Option<PathBuf>,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            name: DEFAULT_CLUSTER_NAME.to_string(),
            image: DEFAULT_IMAGE.to_string(),
            cpus: DEFAULT_CPUS,
            memory: DEFAULT_MEMORY.to_string(),
            pod_cidr: DEFAULT_POD_CIDR.to_string(),
            api_port: DEFAULT_API_PORT,
            kernel: None,
            kubeconfig: None,
        }
    }
}

impl ClusterOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// A validated cluster descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterSpec {
    name: String,
    image: String,
    cpus: u32,
    memory: String,
    memory_bytes: u64,
    pod_cidr: String,
    api_port: u16,
    kernel: Option<PathBuf>,
    kubeconfig: PathBuf,
}

impl ClusterSpec {
    /// Validate `options` and resolve the kubeconfig path.
    pub fn new(options: ClusterOptions) -> Result<Self, ClusterError> {
        let kubeconfig =
            cluster_kubeconfig::resolve_path(options.kubeconfig.as_deref(), &options.name)?;
        Self::with_kubeconfig(options, kubeconfig)
    }

    /// Validate `options` using an already resolved kubeconfig path.
    pub fn with_kubeconfig(
        options: ClusterOptions,
        kubeconfig: PathBuf,
    ) -> Result<Self, ClusterError> {
        validate_name(&options.name)?;

        if options.cpus == 0 {
            return Err(ClusterError::InvalidSpec(
                "cpus must be at least 1".to_string(),
            ));
        }

        let memory_bytes = parse_memory(&options.memory)?;
        validate_cidr(&options.pod_cidr)?;

        if options.api_port == 0 {
            return Err(ClusterError::InvalidSpec(
                "api port must be between 1 and 65535".to_string(),
            ));
        }

        Ok(Self {
            name: options.name,
            image: options.image,
            cpus: options.cpus,
            memory: options.memory,
            memory_bytes,
            pod_cidr: options.pod_cidr,
            api_port: options.api_port,
            kernel: options.kernel,
            kubeconfig,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Identity of the cluster's node in the runtime.
    pub fn node_name(&self) -> String {
        node_name(&self.name)
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn cpus(&self) -> u32 {
        self.cpus
    }

    pub fn memory(&self) -> &str {
        &self.memory
    }

    pub fn memory_bytes(&self) -> u64 {
        self.memory_bytes
    }

    pub fn pod_cidr(&self) -> &str {
        &self.pod_cidr
    }

    pub fn api_port(&self) -> u16 {
        self.api_port
    }

    pub fn kernel(&self) -> Option<&Path> {
        self.kernel.as_deref()
    }

    pub fn kubeconfig(&self) -> &Path {
        &self.kubeconfig
    }
}

/// `<name>-control-plane`.
pub fn node_name(cluster_name: &str) -> String {
    format!("{cluster_name}{NODE_SUFFIX}")
}

fn invalid_name(name: &str, reason: &str) -> ClusterError {
    ClusterError::InvalidSpec(format!("invalid cluster name {name:?}: {reason}"))
}

/// Lowercase DNS-1123 label of at most [`MAX_NAME_LENGTH`] characters.
fn validate_name(name: &str) -> Result<(), ClusterError> {
    if name.is_empty() {
        return Err(invalid_name(name, "name cannot be empty"));
    }

    if name.len() > MAX_NAME_LENGTH {
        return Err(invalid_name(
            name,
            &format!("name cannot exceed {MAX_NAME_LENGTH} characters"),
        ));
    }

    if let Some(c) = name
        .chars()
        .find(|c| !c.is_ascii_lowercase() && !c.is_ascii_digit() && *c != '-')
    {
        return Err(invalid_name(name, &format!("invalid character '{c}'")));
    }

    if name.starts_with('-') || name.ends_with('-') {
        return Err(invalid_name(
            name,
            "name must start and end with a letter or digit",
        ));
    }

    Ok(())
}

/// Parse `<n>[K|M|G|T][i][B]` into bytes. All units are binary multiples.
pub fn parse_memory(memory: &str) -> Result<u64, ClusterError> {
    let invalid = || {
        ClusterError::InvalidSpec(format!(
            "invalid memory size {memory:?}: expected a number with an optional K, M, G or T suffix"
        ))
    };

    let trimmed = memory.trim();
    let digits_end = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(digits_end);
    let number: u64 = number.parse().map_err(|_| invalid())?;

    let unit = unit.to_ascii_uppercase();
    let unit = unit.strip_suffix('B').unwrap_or(&unit);
    let unit = unit.strip_suffix('I').unwrap_or(unit);

    let shift = match unit {
        "" => 0,
        "K" => 10,
        "M" => 20,
        "G" => 30,
        "T" => 40,
        _ => return Err(invalid()),
    };

    let bytes = number.checked_mul(1 << shift).ok_or_else(invalid)?;
    if bytes == 0 {
        return Err(ClusterError::InvalidSpec(
            "memory size must be greater than zero".to_string(),
        ));
    }
    Ok(bytes)
}

/// `a.b.c.d/len` with `len <= 32`.
fn validate_cidr(cidr: &str) -> Result<(), ClusterError> {
    let invalid = || ClusterError::InvalidSpec(format!("invalid pod CIDR {cidr:?}"));

    let (address, prefix) = cidr.split_once('/').ok_or_else(invalid)?;
    address.parse::<Ipv4Addr>().map_err(|_| invalid())?;
    let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
    if prefix > 32 {
        return Err(invalid());
    }

    Ok(())
}
