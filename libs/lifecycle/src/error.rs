//! Cluster lifecycle errors.

use cluster_kernel::KernelError;
use cluster_kubeconfig::KubeconfigError;
use cluster_node::{ExecError, NodeStatus, RuntimeError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("cluster {name} already exists (node {node} is {status})")]
    AlreadyExists {
        name: String,
        node: String,
        status: NodeStatus,
    },

    #[error("cluster {name} is {status}, it must be {required}")]
    InvalidState {
        name: String,
        status: NodeStatus,
        required: NodeStatus,
    },

    #[error("cluster {name} not found")]
    NotFound { name: String },

    #[error("invalid cluster spec: {0}")]
    InvalidSpec(String),

    #[error(transparent)]
    Kernel(#[from] KernelError),

    #[error(transparent)]
    Kubeconfig(#[from] KubeconfigError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Exec(#[from] ExecError),
}

impl ClusterError {
    /// The node runtime service could not be reached.
    pub fn is_runtime_unavailable(&self) -> bool {
        match self {
            ClusterError::Runtime(err) | ClusterError::Exec(ExecError::Runtime(err)) => {
                err.is_unavailable()
            }
            _ => false,
        }
    }
}
