//! In-memory node runtime for tests and development.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::runtime::{NodeRuntime, ProcessIo};
use crate::types::{NetworkAttachment, NodeConfig, NodeSnapshot, NodeStatus, ProcessSpec};
use crate::RuntimeError;

/// A call received by [`MockRuntime`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    Get(String),
    Create(NodeConfig),
    Bootstrap(String),
    Stop(String),
    Delete { id: String, force: bool },
    Exec { id: String, argv: Vec<String> },
}

/// Canned result for execs whose argv starts with a given prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptedExec {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i32,
}

impl ScriptedExec {
    pub fn stdout(data: impl Into<Vec<u8>>) -> Self {
        Self {
            stdout: data.into(),
            ..Self::default()
        }
    }

    pub fn failure(exit_code: i32, stderr: impl Into<Vec<u8>>) -> Self {
        Self {
            stderr: stderr.into(),
            exit_code,
            ..Self::default()
        }
    }
}

#[derive(Default)]
struct State {
    nodes: BTreeMap<String, NodeSnapshot>,
    calls: Vec<RuntimeCall>,
    scripts: Vec<(Vec<String>, ScriptedExec)>,
    next_host: u8,
}

/// Mock node runtime.
///
/// Nodes live in memory. Execs succeed silently unless scripted with
/// [`MockRuntime::on_exec`].
#[derive(Default)]
pub struct MockRuntime {
    state: Mutex<State>,
    unavailable: bool,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// A runtime whose service is never reachable.
    pub fn unavailable() -> Self {
        Self {
            state: Mutex::default(),
            unavailable: true,
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_available(&self) -> Result<(), RuntimeError> {
        if self.unavailable {
            return Err(RuntimeError::Unavailable {
                socket: "mock".into(),
                message: "connection refused".to_string(),
            });
        }
        Ok(())
    }

    /// Script execs whose argv starts with `prefix`. Later scripts win.
    pub fn on_exec<S: AsRef<str>>(&self, prefix: &[S], result: ScriptedExec) {
        let prefix = prefix.iter().map(|s| s.as_ref().to_string()).collect();
        self.state().scripts.push((prefix, result));
    }

    /// Seed a node directly.
    pub fn insert_node(&self, snapshot: NodeSnapshot) {
        self.state().nodes.insert(snapshot.id.clone(), snapshot);
    }

    pub fn node(&self, id: &str) -> Option<NodeSnapshot> {
        self.state().nodes.get(id).cloned()
    }

    pub fn set_status(&self, id: &str, status: NodeStatus) {
        if let Some(node) = self.state().nodes.get_mut(id) {
            node.status = status;
        }
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.state().calls.clone()
    }

    /// Argv of every exec received so far, in order.
    pub fn exec_calls(&self) -> Vec<Vec<String>> {
        self.state()
            .calls
            .iter()
            .filter_map(|call| match call {
                RuntimeCall::Exec { argv, .. } => Some(argv.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: RuntimeCall) {
        self.state().calls.push(call);
    }
}

fn conflict(message: String) -> RuntimeError {
    RuntimeError::Api {
        status: 409,
        message,
    }
}

#[async_trait]
impl NodeRuntime for MockRuntime {
    async fn get(&self, id: &str) -> Result<Option<NodeSnapshot>, RuntimeError> {
        self.check_available()?;
        self.record(RuntimeCall::Get(id.to_string()));
        Ok(self.node(id))
    }

    async fn create(&self, config: &NodeConfig) -> Result<NodeSnapshot, RuntimeError> {
        self.check_available()?;
        self.record(RuntimeCall::Create(config.clone()));

        info!(
            node = %config.id,
            image = %config.image,
            cpus = config.cpus,
            memory_mb = config.memory_bytes / (1024 * 1024),
            "[MOCK] Creating node"
        );

        let mut state = self.state();
        if state.nodes.contains_key(&config.id) {
            return Err(conflict(format!("node {} already exists", config.id)));
        }

        let snapshot = NodeSnapshot {
            id: config.id.clone(),
            status: NodeStatus::Created,
            image: config.image.clone(),
            networks: Vec::new(),
            published_ports: config.published_ports.clone(),
        };
        state.nodes.insert(config.id.clone(), snapshot.clone());
        Ok(snapshot)
    }

    async fn bootstrap(&self, id: &str) -> Result<(), RuntimeError> {
        self.check_available()?;
        self.record(RuntimeCall::Bootstrap(id.to_string()));
        info!(node = %id, "[MOCK] Booting node");

        let mut state = self.state();
        state.next_host = state.next_host.saturating_add(1);
        let host = state.next_host.saturating_add(1);

        let node = state
            .nodes
            .get_mut(id)
            .ok_or_else(|| RuntimeError::NotFound(id.to_string()))?;
        node.status = NodeStatus::Running;
        if node.networks.is_empty() {
            node.networks.push(NetworkAttachment {
                network: "default".to_string(),
                address: format!("192.168.64.{host}/24"),
            });
        }
        Ok(())
    }

    async fn stop(&self, id: &str) -> Result<(), RuntimeError> {
        self.check_available()?;
        self.record(RuntimeCall::Stop(id.to_string()));
        info!(node = %id, "[MOCK] Stopping node");

        let mut state = self.state();
        let node = state
            .nodes
            .get_mut(id)
            .ok_or_else(|| RuntimeError::NotFound(id.to_string()))?;
        node.status = NodeStatus::Stopped;
        node.networks.clear();
        Ok(())
    }

    async fn delete(&self, id: &str, force: bool) -> Result<(), RuntimeError> {
        self.check_available()?;
        self.record(RuntimeCall::Delete {
            id: id.to_string(),
            force,
        });
        info!(node = %id, force, "[MOCK] Deleting node");

        let mut state = self.state();
        match state.nodes.get(id) {
            None => Err(RuntimeError::NotFound(id.to_string())),
            Some(node) if node.status == NodeStatus::Running && !force => {
                Err(conflict(format!("node {id} is running")))
            }
            Some(_) => {
                state.nodes.remove(id);
                Ok(())
            }
        }
    }

    async fn exec(
        &self,
        id: &str,
        process: &ProcessSpec,
        io: ProcessIo,
    ) -> Result<i32, RuntimeError> {
        self.check_available()?;

        let argv: Vec<String> = std::iter::once(process.executable.clone())
            .chain(process.arguments.iter().cloned())
            .collect();
        self.record(RuntimeCall::Exec {
            id: id.to_string(),
            argv: argv.clone(),
        });
        debug!(node = %id, command = %process.command_line(), "[MOCK] Exec");

        let result = {
            let state = self.state();
            match state.nodes.get(id) {
                None => return Err(RuntimeError::NotFound(id.to_string())),
                Some(node) if node.status != NodeStatus::Running => {
                    return Err(conflict(format!("node {id} is not running")))
                }
                Some(_) => {}
            }
            state
                .scripts
                .iter()
                .rev()
                .find(|(prefix, _)| argv.starts_with(prefix))
                .map(|(_, result)| result.clone())
                .unwrap_or_default()
        };

        let ProcessIo {
            mut stdout,
            mut stderr,
        } = io;
        stdout.write_all(&result.stdout).await?;
        stderr.write_all(&result.stderr).await?;
        stdout.flush().await?;
        stderr.flush().await?;

        Ok(result.exit_code)
    }
}
