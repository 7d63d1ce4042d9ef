//! Single-node Kubernetes cluster lifecycle.
//!
//! A cluster is one node in the node runtime, named `<cluster>-control-plane`.
//! [`Controller::create`] boots the node with a cached kernel, initializes
//! Kubernetes inside it and writes a host-usable kubeconfig. The remaining
//! operations act on the node by name.

mod controller;
mod error;
mod spec;
mod steps;

pub use controller::{
    Controller, CreateReport, DeleteOutcome, KubeconfigExport, StartOutcome, StatusReport,
    CLUSTER_LABEL,
};
pub use error::ClusterError;
pub use spec::{
    node_name, parse_memory, ClusterOptions, ClusterSpec, DEFAULT_API_PORT, DEFAULT_CLUSTER_NAME,
    DEFAULT_CPUS, DEFAULT_IMAGE, DEFAULT_MEMORY, DEFAULT_POD_CIDR, MAX_NAME_LENGTH,
};
pub use steps::{setup_steps, SetupStep, ADMIN_CONF, CNI_MANIFEST};
