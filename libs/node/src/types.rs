//! Node descriptions exchanged with the node runtime.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Lifecycle status reported by the runtime. A node that does not exist has
/// no status at all (lookups return `None`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    /// Created but never started.
    Created,
    Running,
    Stopped,
    /// Anything this client does not recognise.
    #[serde(other)]
    Unknown,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Created => "created",
            NodeStatus::Running => "running",
            NodeStatus::Stopped => "stopped",
            NodeStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport protocol of a published port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

/// A host port forwarded to a port inside the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedPort {
    /// Host address the port is bound on.
    pub host_address: String,
    pub host_port: u16,
    pub container_port: u16,
    #[serde(default)]
    pub protocol: Protocol,
}

/// An interface attachment of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkAttachment {
    pub network: String,
    /// Address in CIDR notation, e.g. `192.168.64.3/24`.
    pub address: String,
}

/// Everything the runtime needs to create a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub id: String,
    pub image: String,
    pub cpus: u32,
    pub memory_bytes: u64,
    /// Kernel binary to boot the node with.
    pub kernel: PathBuf,
    #[serde(default)]
    pub published_ports: Vec<PublishedPort>,
    /// Environment of the init process, inherited by every exec.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// Point-in-time view of a node as reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub id: String,
    pub status: NodeStatus,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub networks: Vec<NetworkAttachment>,
    #[serde(default)]
    pub published_ports: Vec<PublishedPort>,
}

impl NodeSnapshot {
    /// First interface address without its prefix length.
    pub fn address(&self) -> Option<&str> {
        self.networks
            .first()
            .map(|n| n.address.split('/').next().unwrap_or(&n.address))
    }

    /// Host port forwarded to `container_port`, if any.
    pub fn published_host_port(&self, container_port: u16) -> Option<u16> {
        self.published_ports
            .iter()
            .find(|p| p.container_port == container_port && p.protocol == Protocol::Tcp)
            .map(|p| p.host_port)
    }
}

/// A process to run inside a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessSpec {
    pub executable: String,
    #[serde(default)]
    pub arguments: Vec<String>,
    /// Allocate a pseudo-terminal. Always false for setup commands.
    #[serde(default)]
    pub terminal: bool,
}

impl ProcessSpec {
    /// Build from an argv; `None` when `argv` is empty.
    pub fn from_argv<S: AsRef<str>>(argv: &[S]) -> Option<Self> {
        let (executable, arguments) = argv.split_first()?;
        Some(Self {
            executable: executable.as_ref().to_string(),
            arguments: arguments.iter().map(|a| a.as_ref().to_string()).collect(),
            terminal: false,
        })
    }

    /// The full command line, space-joined.
    pub fn command_line(&self) -> String {
        std::iter::once(self.executable.as_str())
            .chain(self.arguments.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> NodeSnapshot {
        NodeSnapshot {
            id: "uds-control-plane".to_string(),
            status: NodeStatus::Running,
            image: "kindest/node:v1.31.0".to_string(),
            networks: vec![NetworkAttachment {
                network: "default".to_string(),
                address: "192.168.64.3/24".to_string(),
            }],
            published_ports: vec![
                PublishedPort {
                    host_address: "127.0.0.1".to_string(),
                    host_port: 53,
                    container_port: 6443,
                    protocol: Protocol::Udp,
                },
                PublishedPort {
                    host_address: "127.0.0.1".to_string(),
                    host_port: 7443,
                    container_port: 6443,
                    protocol: Protocol::Tcp,
                },
            ],
        }
    }

    #[test]
    fn test_address_strips_prefix() {
        assert_eq!(snapshot().address(), Some("192.168.64.3"));

        let mut bare = snapshot();
        bare.networks.clear();
        assert_eq!(bare.address(), None);
    }

    #[test]
    fn test_published_host_port_is_tcp_only() {
        assert_eq!(snapshot().published_host_port(6443), Some(7443));
        assert_eq!(snapshot().published_host_port(80), None);
    }

    #[test]
    fn test_unknown_status_deserializes() {
        let status: NodeStatus = serde_json::from_str("\"paused\"").unwrap();
        assert_eq!(status, NodeStatus::Unknown);

        let status: NodeStatus = serde_json::from_str("\"running\"").unwrap();
        assert_eq!(status, NodeStatus::Running);
    }

    #[test]
    fn test_process_spec_from_argv() {
        assert!(ProcessSpec::from_argv::<&str>(&[]).is_none());

        let spec = ProcessSpec::from_argv(&["kubectl", "get", "nodes"]).unwrap();
        assert_eq!(spec.executable, "kubectl");
        assert_eq!(spec.arguments, vec!["get", "nodes"]);
        assert!(!spec.terminal);
        assert_eq!(spec.command_line(), "kubectl get nodes");
    }
}
