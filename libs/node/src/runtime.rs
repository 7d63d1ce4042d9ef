//! Node runtime interface.
//!
//! The runtime owns the sandbox lifecycle; this crate only asks it to create,
//! boot, stop, delete and exec into nodes identified by name. Implementations:
//!
//! - [`UnixSocketRuntime`](crate::UnixSocketRuntime): the local runtime service
//! - [`MockRuntime`](crate::MockRuntime): in-memory, for tests

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWrite;

use crate::types::{NodeConfig, NodeSnapshot, NodeStatus, ProcessSpec};
use crate::RuntimeError;

/// Destination for one output stream of an in-node process.
pub type OutputSink = Box<dyn AsyncWrite + Send + Unpin>;

/// Where an in-node process writes its output.
///
/// The runtime drops both sinks when the process has exited, which is what
/// lets a reader on the other end of a pipe see end-of-file.
pub struct ProcessIo {
    pub stdout: OutputSink,
    pub stderr: OutputSink,
}

impl ProcessIo {
    pub fn new(stdout: OutputSink, stderr: OutputSink) -> Self {
        Self { stdout, stderr }
    }

    /// Forward output to this process's own stdout and stderr.
    pub fn inherit() -> Self {
        Self::new(Box::new(tokio::io::stdout()), Box::new(tokio::io::stderr()))
    }
}

/// Capability interface over the node runtime.
#[async_trait]
pub trait NodeRuntime: Send + Sync {
    /// Look a node up by id. `Ok(None)` when it does not exist.
    async fn get(&self, id: &str) -> Result<Option<NodeSnapshot>, RuntimeError>;

    /// Create a node. It is not started.
    async fn create(&self, config: &NodeConfig) -> Result<NodeSnapshot, RuntimeError>;

    /// Boot the node's init process with detached, non-interactive stdio.
    /// Returns once the runtime confirms startup.
    async fn bootstrap(&self, id: &str) -> Result<(), RuntimeError>;

    /// Stop a running node.
    async fn stop(&self, id: &str) -> Result<(), RuntimeError>;

    /// Delete a node. `force` also removes a running node.
    async fn delete(&self, id: &str, force: bool) -> Result<(), RuntimeError>;

    /// Run a process inside a running node and wait for it to exit.
    ///
    /// The process inherits the node's environment. Returns its exit code.
    async fn exec(
        &self,
        id: &str,
        process: &ProcessSpec,
        io: ProcessIo,
    ) -> Result<i32, RuntimeError>;
}

/// A node obtained from the runtime, by lookup or creation.
#[derive(Clone)]
pub struct NodeHandle {
    runtime: Arc<dyn NodeRuntime>,
    snapshot: NodeSnapshot,
}

impl std::fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeHandle")
            .field("snapshot", &self.snapshot)
            .finish_non_exhaustive()
    }
}

impl NodeHandle {
    /// Look up `id`. `Ok(None)` when the node does not exist.
    pub async fn lookup(
        runtime: Arc<dyn NodeRuntime>,
        id: &str,
    ) -> Result<Option<Self>, RuntimeError> {
        let snapshot = runtime.get(id).await?;
        Ok(snapshot.map(|snapshot| Self { runtime, snapshot }))
    }

    /// Create a node from `config`.
    pub async fn create(
        runtime: Arc<dyn NodeRuntime>,
        config: &NodeConfig,
    ) -> Result<Self, RuntimeError> {
        let snapshot = runtime.create(config).await?;
        Ok(Self { runtime, snapshot })
    }

    pub fn id(&self) -> &str {
        &self.snapshot.id
    }

    /// Status as of the last lookup or refresh.
    pub fn status(&self) -> NodeStatus {
        self.snapshot.status
    }

    pub fn snapshot(&self) -> &NodeSnapshot {
        &self.snapshot
    }

    /// Re-read the node from the runtime.
    pub async fn refresh(&mut self) -> Result<(), RuntimeError> {
        self.snapshot = self
            .runtime
            .get(&self.snapshot.id)
            .await?
            .ok_or_else(|| RuntimeError::NotFound(self.snapshot.id.clone()))?;
        Ok(())
    }

    /// Boot the node and refresh its snapshot.
    pub async fn bootstrap(&mut self) -> Result<(), RuntimeError> {
        self.runtime.bootstrap(&self.snapshot.id).await?;
        self.refresh().await
    }

    pub async fn stop(&mut self) -> Result<(), RuntimeError> {
        self.runtime.stop(&self.snapshot.id).await?;
        self.refresh().await
    }

    pub async fn delete(self, force: bool) -> Result<(), RuntimeError> {
        self.runtime.delete(&self.snapshot.id, force).await
    }

    pub async fn exec(&self, process: &ProcessSpec, io: ProcessIo) -> Result<i32, RuntimeError> {
        self.runtime.exec(&self.snapshot.id, process, io).await
    }
}
