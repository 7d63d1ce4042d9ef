//! `cluster delete`.

use anyhow::Result;
use clap::Args;
use cluster_lifecycle::{DeleteOutcome, DEFAULT_CLUSTER_NAME};
use serde_json::json;

use crate::output::{print_info, print_json, print_success, OutputFormat};

use super::CommandContext;

#[derive(Debug, Args)]
pub struct DeleteCommand {
    /// Cluster name.
    #[arg(long, default_value = DEFAULT_CLUSTER_NAME)]
    name: String,

    /// Delete the cluster even if it is running.
    #[arg(long)]
    force: bool,
}

impl DeleteCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let spec = ctx.existing(&self.name, None)?;
        let outcome = ctx.controller()?.delete(spec.name(), self.force).await?;

        match ctx.format {
            OutputFormat::Table => match outcome {
                DeleteOutcome::Deleted => {
                    print_success(&format!("Cluster {} deleted", spec.name()))
                }
                DeleteOutcome::Absent => {
                    print_info(&format!("Cluster {} does not exist", spec.name()))
                }
            },
            OutputFormat::Json => print_json(&json!({
                "name": spec.name(),
                "outcome": outcome,
            })),
        }
        Ok(())
    }
}
