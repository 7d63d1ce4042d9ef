//! `cluster kubeconfig`.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use cluster_lifecycle::{KubeconfigExport, DEFAULT_CLUSTER_NAME};
use serde_json::json;

use crate::output::{print_json, print_success, OutputFormat};

use super::CommandContext;

#[derive(Debug, Args)]
pub struct KubeconfigCommand {
    /// Cluster name.
    #[arg(long, default_value = DEFAULT_CLUSTER_NAME)]
    name: String,

    /// Write the kubeconfig here instead of printing it.
    #[arg(long)]
    kubeconfig: Option<PathBuf>,
}

impl KubeconfigCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let spec = ctx.existing(&self.name, None)?;
        let export = ctx
            .controller()?
            .kubeconfig(spec.name(), self.kubeconfig.as_deref())
            .await?;

        match (export, ctx.format) {
            (KubeconfigExport::Text(text), OutputFormat::Table) => print!("{text}"),
            (KubeconfigExport::Text(text), OutputFormat::Json) => print_json(&json!({
                "name": spec.name(),
                "kubeconfig": text,
            })),
            (KubeconfigExport::Written(path), OutputFormat::Table) => {
                print_success(&format!("Kubeconfig written to {}", path.display()))
            }
            (KubeconfigExport::Written(path), OutputFormat::Json) => print_json(&json!({
                "name": spec.name(),
                "path": path,
            })),
        }
        Ok(())
    }
}
