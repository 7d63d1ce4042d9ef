//! `cluster start`.

use anyhow::Result;
use clap::Args;
use cluster_lifecycle::{StartOutcome, DEFAULT_CLUSTER_NAME};
use serde_json::json;

use crate::output::{print_info, print_json, print_success, OutputFormat};

use super::CommandContext;

#[derive(Debug, Args)]
pub struct StartCommand {
    /// Cluster name.
    #[arg(long, default_value = DEFAULT_CLUSTER_NAME)]
    name: String,
}

impl StartCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let spec = ctx.existing(&self.name, None)?;
        let outcome = ctx.controller()?.start(spec.name()).await?;

        match ctx.format {
            OutputFormat::Table => match outcome {
                StartOutcome::Started => {
                    print_success(&format!("Cluster {} started", spec.name()))
                }
                StartOutcome::AlreadyRunning => {
                    print_info(&format!("Cluster {} is already running", spec.name()))
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
