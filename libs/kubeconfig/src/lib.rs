//! Kubeconfig rewriting and persistence.
//!
//! The admin kubeconfig generated inside the node by `kubeadm init` points at
//! the node's own API server address and uses kubeadm's default names
//! (`kubernetes`, `kubernetes-admin`, `kubernetes-admin@kubernetes`). This
//! crate turns it into a document usable from the host:
//!
//! - `patch`: ordered, pure text rewrite (see [`RULES`])
//! - `write` / `read`: persistence with owner-only permissions
//! - `resolve_path`: explicit override or `~/.kube/cluster/<name>.config`

mod error;
mod patch;
mod store;

pub use error::KubeconfigError;
pub use patch::{
    apply_rules, patch, Matcher, Replacement, Rule, ADMIN_USER, DEFAULT_CLUSTER, DEFAULT_CONTEXT,
    DEFAULT_USER, HOST_LOOPBACK, NODE_API_PORT, RULES,
};
pub use store::{default_path, read, resolve_path, write, KUBECONFIG_MODE};
