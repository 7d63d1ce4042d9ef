//! `cluster create`.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use cluster_lifecycle::{ClusterOptions, ClusterSpec, DEFAULT_CLUSTER_NAME};

use crate::output::{print_info, print_json, print_next, print_success, OutputFormat};

use super::CommandContext;

#[derive(Debug, Args)]
pub struct CreateCommand {
    /// Cluster name.
    #[arg(long, default_value = DEFAULT_CLUSTER_NAME)]
    name: String,

    /// Node image.
    #[arg(long)]
    image: Option<String>,

    /// Number of CPUs for the node.
    #[arg(long)]
    cpus: Option<u32>,

    /// Memory for the node, e.g. 4G or 512Mi.
    #[arg(long)]
    memory: Option<String>,

    /// Pod network CIDR.
    #[arg(long)]
    pod_cidr: Option<String>,

    /// Host port the API server is published on.
    #[arg(long)]
    api_port: Option<u16>,

    /// Boot kernel to use instead of the cached one.
    #[arg(long)]
    kernel: Option<PathBuf>,

    /// Where to write the kubeconfig.
    #[arg(long)]
    kubeconfig: Option<PathBuf>,

    /// Replace an existing cluster that is not running.
    #[arg(long)]
    replace: bool,
}

impl CreateCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let defaults = &ctx.config.defaults;
        let spec = ClusterSpec::new(ClusterOptions {
            name: self.name,
            image: self.image.unwrap_or_else(|| defaults.image.clone()),
            cpus: self.cpus.unwrap_or(defaults.cpus),
            memory: self.memory.unwrap_or_else(|| defaults.memory.clone()),
            pod_cidr: self.pod_cidr.unwrap_or_else(|| defaults.pod_cidr.clone()),
            api_port: self.api_port.unwrap_or(defaults.api_port),
            kernel: self.kernel,
            kubeconfig: self.kubeconfig,
        })?;

        if ctx.format == OutputFormat::Table {
            print_info(&format!(
                "Creating cluster {} ({} CPUs, {} memory, image {})",
                spec.name(),
                spec.cpus(),
                spec.memory(),
                spec.image()
            ));
        }

        let kernels = ctx.kernels()?;
        let report = ctx
            .controller()?
            .create(&spec, &kernels, self.replace)
            .await?;

        match ctx.format {
            OutputFormat::Table => {
                print_success(&format!("Cluster {} created", report.name));
                println!("  Node:       {}", report.node);
                println!(
                    "  Address:    {}",
                    report.address.as_deref().unwrap_or("-")
                );
                println!("  API server: {}", report.api_server);
                println!("  Kubeconfig: {}", report.kubeconfig.display());
                println!();
                print_next(
                    "Next",
                    &format!(
                        "kubectl --kubeconfig {} get nodes",
                        report.kubeconfig.display()
                    ),
                );
            }
            OutputFormat::Json => print_json(&report),
        }
        Ok(())
    }
}
