//! CLI commands.

mod create;
mod delete;
mod kubeconfig;
mod start;
mod status;
mod stop;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use cluster_kernel::KernelCache;
use cluster_lifecycle::{ClusterOptions, ClusterSpec, Controller};
use cluster_node::UnixSocketRuntime;
use tracing::debug;

use crate::config::Config;
use crate::output::OutputFormat;

/// cluster - Run a single-node Kubernetes cluster in a local sandbox.
#[derive(Debug, Parser)]
#[command(name = "cluster")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    /// Stream in-node command output and enable debug logging.
    #[arg(long, global = true, visible_alias = "verbose")]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create a cluster.
    Create(create::CreateCommand),

    /// Delete a cluster.
    Delete(delete::DeleteCommand),

    /// Start a stopped cluster.
    Start(start::StartCommand),

    /// Stop a running cluster.
    Stop(stop::StopCommand),

    /// Show cluster status.
    Status(status::StatusCommand),

    /// Print or write the cluster's kubeconfig.
    Kubeconfig(kubeconfig::KubeconfigCommand),

    /// Show CLI version.
    Version,
}

impl Cli {
    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Run the CLI command.
    pub async fn run(self) -> Result<()> {
        if let Commands::Version = self.command {
            println!("cluster {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }

        let ctx = CommandContext {
            config: Config::load()?,
            format: self.format,
            verbose: self.debug,
        };

        match self.command {
            Commands::Create(cmd) => cmd.run(ctx).await,
            Commands::Delete(cmd) => cmd.run(ctx).await,
            Commands::Start(cmd) => cmd.run(ctx).await,
            Commands::Stop(cmd) => cmd.run(ctx).await,
            Commands::Status(cmd) => cmd.run(ctx).await,
            Commands::Kubeconfig(cmd) => cmd.run(ctx).await,
            Commands::Version => Ok(()),
        }
    }
}

/// Shared command context.
pub struct CommandContext {
    pub config: Config,
    pub format: OutputFormat,
    pub verbose: bool,
}

impl CommandContext {
    /// Controller talking to the configured node runtime.
    pub fn controller(&self) -> Result<Controller> {
        let socket = self.config.runtime_socket()?;
        debug!(socket = %socket.display(), "Using node runtime");

        let runtime = Arc::new(UnixSocketRuntime::new(socket));
        Ok(Controller::new(runtime).verbose(self.stream_output()))
    }

    /// Kernel cache for the configured archive. Only `create` boots a kernel,
    /// so only `create` asks for it.
    pub fn kernels(&self) -> Result<KernelCache> {
        Ok(KernelCache::user_default(self.config.kernel_archive())?)
    }

    /// Stream in-node output only when stdout is not carrying a JSON report.
    fn stream_output(&self) -> bool {
        self.verbose && self.format == OutputFormat::Table
    }

    /// Validated spec for an existing cluster, with defaults for everything
    /// but the name and kubeconfig path.
    pub fn existing(&self, name: &str, kubeconfig: Option<&Path>) -> Result<ClusterSpec> {
        let options = ClusterOptions {
            kubeconfig: kubeconfig.map(Path::to_path_buf),
            ..ClusterOptions::named(name)
        };
        Ok(ClusterSpec::new(options)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "cluster", "status", "--name", "uds", "--format", "json", "--verbose",
        ])
        .unwrap();
        assert!(cli.debug());
        assert_eq!(cli.format, OutputFormat::Json);
    }

    #[test]
    fn test_create_flags() {
        let cli = Cli::try_parse_from([
            "cluster",
            "create",
            "--name",
            "uds",
            "--cpus",
            "2",
            "--memory",
            "2GiB",
            "--api-port",
            "7443",
            "--replace",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Create(_)));
    }

    fn context(format: OutputFormat, verbose: bool) -> CommandContext {
        let mut config = Config::default();
        config.runtime.socket_path = Some("/run/cluster/runtime.sock".into());
        config.kernel.archive_url = Some("not a url".to_string());
        CommandContext {
            config,
            format,
            verbose,
        }
    }

    #[test]
    fn test_bad_kernel_url_only_affects_create() {
        let ctx = context(OutputFormat::Table, false);
        assert!(ctx.controller().is_ok());

        let err = ctx.kernels().unwrap_err();
        assert!(err.to_string().contains("invalid kernel archive URL"));
    }

    #[test]
    fn test_json_output_is_never_mixed_with_streamed_output() {
        assert!(context(OutputFormat::Table, true).stream_output());
        assert!(!context(OutputFormat::Json, true).stream_output());
        assert!(!context(OutputFormat::Table, false).stream_output());
    }

    #[test]
    fn test_rejects_unknown_format() {
        assert!(Cli::try_parse_from(["cluster", "--format", "yaml", "version"]).is_err());
    }
}
