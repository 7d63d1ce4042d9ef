//! `cluster status`.

use anyhow::Result;
use clap::Args;
use cluster_lifecycle::DEFAULT_CLUSTER_NAME;

use crate::output::{print_json, render_fields, Field, OutputFormat};

use super::CommandContext;

#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Cluster name.
    #[arg(long, default_value = DEFAULT_CLUSTER_NAME)]
    name: String,
}

impl StatusCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let spec = ctx.existing(&self.name, None)?;
        let report = ctx
            .controller()?
            .status(spec.name(), spec.kubeconfig())
            .await?;

        match ctx.format {
            OutputFormat::Table => {
                let fields = [
                    Field::new("Name", report.name.as_str()),
                    Field::new("Node", report.node.as_str()),
                    Field::new("Status", report.status.as_str()),
                    Field::optional("Address", report.address.as_deref()),
                    Field::optional("API port", report.api_port),
                    Field::new("Kubeconfig", report.kubeconfig.display().to_string()),
                ];
                println!("{}", render_fields(&fields));
            }
            OutputFormat::Json => print_json(&report),
        }
        Ok(())
    }
}
