//! Error display for the CLI.

use cluster_lifecycle::ClusterError;
use cluster_node::RuntimeError;
use colored::Colorize;

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {}", "Error:".red().bold(), err);

    if let Some(hint) = hint(err) {
        eprintln!("\n{}", format!("Hint: {hint}").yellow());
    }
}

fn hint(err: &anyhow::Error) -> Option<String> {
    if runtime_unavailable(err) {
        return Some(
            "The node runtime service is not running. Start the node runtime service first, \
             then retry."
                .to_string(),
        );
    }

    match err.downcast_ref::<ClusterError>()? {
        ClusterError::AlreadyExists { name, .. } => Some(format!(
            "Choose another name, or run `cluster delete --name {name}` or pass --replace."
        )),
        ClusterError::NotFound { name } => {
            Some(format!("Run `cluster create --name {name}` to create it."))
        }
        ClusterError::InvalidState { name, .. } => {
            Some(format!("Run `cluster start --name {name}` first."))
        }
        ClusterError::Exec(_) => Some(
            "The node was left as it is. Re-run with --debug to see command output, \
             or recreate it with --replace."
                .to_string(),
        ),
        _ => None,
    }
}

/// True when any error in the chain is a failed connection to the runtime.
fn runtime_unavailable(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<ClusterError>()
            .is_some_and(ClusterError::is_runtime_unavailable)
            || cause
                .downcast_ref::<RuntimeError>()
                .is_some_and(RuntimeError::is_unavailable)
    })
}
