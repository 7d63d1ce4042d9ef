//! cluster - CLI for single-node Kubernetes clusters.
//!
//! Provisions a Kubernetes control plane inside one sandboxed node managed by
//! the local node runtime service, and manages its lifecycle.

use clap::Parser;
use colored::Colorize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod config;
mod error;
mod output;

use commands::Cli;

/// Exit code after an interrupt (128 + SIGINT).
const EXIT_INTERRUPTED: i32 = 130;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.debug());

    tokio::select! {
        result = cli.run() => {
            if let Err(e) = result {
                error::print_error(&e);
                std::process::exit(1);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            // Nothing is rolled back; the node keeps whatever state it reached.
            restore_terminal();
            eprintln!("\n{}", "Interrupted".yellow());
            std::process::exit(EXIT_INTERRUPTED);
        }
    }
}

/// Logs go to stderr so command output stays clean. `RUST_LOG` wins over
/// `--debug`.
fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "warn" };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn restore_terminal() {
    let _ = crossterm::execute!(std::io::stderr(), crossterm::cursor::Show);
}
