//! Cluster lifecycle operations.
//!
//! The controller keeps no state of its own. Every operation looks the
//! cluster's node up by name and acts on what the runtime reports.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cluster_kernel::KernelCache;
use cluster_kubeconfig::{HOST_LOOPBACK, NODE_API_PORT};
use cluster_node::{
    run, NodeConfig, NodeHandle, NodeRuntime, NodeStatus, OutputMode, Protocol, PublishedPort,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::spec::{node_name, ClusterSpec, DEFAULT_API_PORT};
use crate::steps::{read_admin_conf, setup_steps, ADMIN_CONF};
use crate::ClusterError;

/// Label carrying the cluster name on the node.
pub const CLUSTER_LABEL: &str = "cluster.name";

/// Summary of a created cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateReport {
    pub name: String,
    pub node: String,
    pub address: Option<String>,
    /// Host-facing API server URL.
    pub api_server: String,
    pub kubeconfig: PathBuf,
}

/// What `delete` found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteOutcome {
    Deleted,
    /// There was nothing to delete.
    Absent,
}

/// What `start` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

/// Observed state of a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub name: String,
    pub node: String,
    pub status: NodeStatus,
    pub address: Option<String>,
    /// Host port the API server is published on.
    pub api_port: Option<u16>,
    /// Where the kubeconfig is, or would be, written.
    pub kubeconfig: PathBuf,
}

/// Result of the read-only kubeconfig operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KubeconfigExport {
    /// No destination was given.
    Text(String),
    Written(PathBuf),
}

/// Drives cluster operations against a node runtime.
pub struct Controller {
    runtime: Arc<dyn NodeRuntime>,
    output: OutputMode,
}

impl Controller {
    pub fn new(runtime: Arc<dyn NodeRuntime>) -> Self {
        Self {
            runtime,
            output: OutputMode::Captured,
        }
    }

    /// Stream setup command output live instead of capturing it.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.output = OutputMode::from_verbose(verbose);
        self
    }

    async fn lookup(&self, name: &str) -> Result<Option<NodeHandle>, ClusterError> {
        let node = node_name(name);
        debug!(cluster = %name, node = %node, "Looking up node");
        Ok(NodeHandle::lookup(self.runtime.clone(), &node).await?)
    }

    async fn require(&self, name: &str) -> Result<NodeHandle, ClusterError> {
        self.lookup(name).await?.ok_or_else(|| ClusterError::NotFound {
            name: name.to_string(),
        })
    }

    /// Create and provision a cluster, booting the kernel resolved through
    /// `kernels`.
    ///
    /// A node left over from an earlier attempt is replaced when `replace`
    /// is set, unless it is running. A failing setup step stops creation and
    /// leaves the node as it is.
    pub async fn create(
        &self,
        spec: &ClusterSpec,
        kernels: &KernelCache,
        replace: bool,
    ) -> Result<CreateReport, ClusterError> {
        if let Some(existing) = self.lookup(spec.name()).await? {
            let replaceable = matches!(
                existing.status(),
                NodeStatus::Created | NodeStatus::Stopped
            );
            if !(replace && replaceable) {
                return Err(ClusterError::AlreadyExists {
                    name: spec.name().to_string(),
                    node: existing.id().to_string(),
                    status: existing.status(),
                });
            }

            info!(
                node = %existing.id(),
                status = %existing.status(),
                "Replacing existing node"
            );
            existing.delete(true).await?;
        }

        let kernel = kernels.resolve(spec.kernel()).await?;
        let config = node_config(spec, kernel);

        info!(
            cluster = %spec.name(),
            node = %config.id,
            image = %config.image,
            cpus = config.cpus,
            memory = %spec.memory(),
            "Creating node"
        );
        let mut node = NodeHandle::create(self.runtime.clone(), &config).await?;
        node.bootstrap().await?;

        for step in setup_steps(spec.pod_cidr()) {
            info!(node = %node.id(), step = step.description, "Running setup step");
            run(&node, &step.argv, self.output, step.allow_failure).await?;
        }

        let kubeconfig = self
            .export_kubeconfig(&node, spec.name(), spec.api_port())
            .await?;
        cluster_kubeconfig::write(&kubeconfig, spec.kubeconfig())?;
        info!(path = %spec.kubeconfig().display(), "Kubeconfig written");

        node.refresh().await?;
        Ok(CreateReport {
            name: spec.name().to_string(),
            node: node.id().to_string(),
            address: node.snapshot().address().map(str::to_string),
            api_server: format!("https://{HOST_LOOPBACK}:{}", spec.api_port()),
            kubeconfig: spec.kubeconfig().to_path_buf(),
        })
    }

    /// Delete a cluster. A missing cluster is already deleted.
    pub async fn delete(&self, name: &str, force: bool) -> Result<DeleteOutcome, ClusterError> {
        let Some(node) = self.lookup(name).await? else {
            warn!(cluster = %name, "Cluster not found, nothing to delete");
            return Ok(DeleteOutcome::Absent);
        };

        info!(cluster = %name, node = %node.id(), force, "Deleting node");
        node.delete(force).await?;
        Ok(DeleteOutcome::Deleted)
    }

    /// Start a stopped cluster. Starting a running cluster does nothing.
    pub async fn start(&self, name: &str) -> Result<StartOutcome, ClusterError> {
        let mut node = self.require(name).await?;
        if node.status() == NodeStatus::Running {
            debug!(cluster = %name, "Cluster already running");
            return Ok(StartOutcome::AlreadyRunning);
        }

        info!(cluster = %name, node = %node.id(), "Starting node");
        node.bootstrap().await?;
        Ok(StartOutcome::Started)
    }

    pub async fn stop(&self, name: &str) -> Result<(), ClusterError> {
        let mut node = self.require(name).await?;
        info!(cluster = %name, node = %node.id(), "Stopping node");
        node.stop().await?;
        Ok(())
    }

    /// Report a cluster's state. `kubeconfig` is the resolved path, whether
    /// or not it exists.
    pub async fn status(
        &self,
        name: &str,
        kubeconfig: &Path,
    ) -> Result<StatusReport, ClusterError> {
        let node = self.require(name).await?;
        let snapshot = node.snapshot();

        Ok(StatusReport {
            name: name.to_string(),
            node: node.id().to_string(),
            status: snapshot.status,
            address: snapshot.address().map(str::to_string),
            api_port: snapshot.published_host_port(NODE_API_PORT),
            kubeconfig: kubeconfig.to_path_buf(),
        })
    }

    /// Read the kubeconfig of a running cluster, patched for host access.
    ///
    /// Written to `destination` when given, returned as text otherwise.
    pub async fn kubeconfig(
        &self,
        name: &str,
        destination: Option<&Path>,
    ) -> Result<KubeconfigExport, ClusterError> {
        let node = self.require(name).await?;
        if node.status() != NodeStatus::Running {
            return Err(ClusterError::InvalidState {
                name: name.to_string(),
                status: node.status(),
                required: NodeStatus::Running,
            });
        }

        let api_port = node
            .snapshot()
            .published_host_port(NODE_API_PORT)
            .unwrap_or_else(|| {
                warn!(
                    cluster = %name,
                    port = DEFAULT_API_PORT,
                    "No published API port, using default"
                );
                DEFAULT_API_PORT
            });

        let text = self.export_kubeconfig(&node, name, api_port).await?;
        match destination {
            Some(path) => {
                let path = cluster_kubeconfig::resolve_path(Some(path), name)?;
                cluster_kubeconfig::write(&text, &path)?;
                Ok(KubeconfigExport::Written(path))
            }
            None => Ok(KubeconfigExport::Text(text)),
        }
    }

    async fn export_kubeconfig(
        &self,
        node: &NodeHandle,
        name: &str,
        api_port: u16,
    ) -> Result<String, ClusterError> {
        debug!(node = %node.id(), path = ADMIN_CONF, "Reading admin kubeconfig");
        let raw = run(node, &read_admin_conf(), OutputMode::Captured, false).await?;
        Ok(cluster_kubeconfig::patch(&raw.stdout, name, api_port))
    }
}

fn node_config(spec: &ClusterSpec, kernel: PathBuf) -> NodeConfig {
    NodeConfig {
        id: spec.node_name(),
        image: spec.image().to_string(),
        cpus: spec.cpus(),
        memory_bytes: spec.memory_bytes(),
        kernel,
        published_ports: vec![PublishedPort {
            host_address: HOST_LOOPBACK.to_string(),
            host_port: spec.api_port(),
            container_port: NODE_API_PORT,
            protocol: Protocol::Tcp,
        }],
        env: BTreeMap::from([("KUBECONFIG".to_string(), ADMIN_CONF.to_string())]),
        labels: BTreeMap::from([(CLUSTER_LABEL.to_string(), spec.name().to_string())]),
    }
}
