//! Node runtime access for cluster provisioning.
//!
//! The node runtime is an external service that creates and runs the sandbox
//! hosting the cluster node. This crate provides:
//!
//! - [`NodeRuntime`]: the capability interface the provisioning core uses
//! - [`UnixSocketRuntime`]: the adapter for the local runtime service
//! - [`MockRuntime`]: an in-memory runtime for tests
//! - [`exec::run`]: in-node command execution with captured or streamed output

pub mod error;
pub mod exec;
pub mod frame;
pub mod mock;
pub mod runtime;
pub mod socket;
pub mod types;

pub use error::RuntimeError;
pub use exec::{run, ExecError, ExecResult, OutputMode};
pub use mock::{MockRuntime, RuntimeCall, ScriptedExec};
pub use runtime::{NodeHandle, NodeRuntime, OutputSink, ProcessIo};
pub use socket::UnixSocketRuntime;
pub use types::{
    NetworkAttachment, NodeConfig, NodeSnapshot, NodeStatus, ProcessSpec, Protocol, PublishedPort,
};
