//! `cluster stop`.

use anyhow::Result;
use clap::Args;
use cluster_lifecycle::DEFAULT_CLUSTER_NAME;
use serde_json::json;

use crate::output::{print_json, print_success, OutputFormat};

use super::CommandContext;

#[derive(Debug, Args)]
pub struct StopCommand {
    /// Cluster name.
    #[arg(long, default_value = DEFAULT_CLUSTER_NAME)]
    name: String,
}

impl StopCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let spec = ctx.existing(&self.name, None)?;
        ctx.controller()?.stop(spec.name()).await?;

        match ctx.format {
            OutputFormat::Table => print_success(&format!("Cluster {} stopped", spec.name())),
            OutputFormat::Json => print_json(&json!({
                "name": spec.name(),
                "outcome": "stopped",
            })),
        }
        Ok(())
    }
}
