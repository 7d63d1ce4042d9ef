//! Output formatting for CLI commands.

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output.
    #[default]
    Table,
    /// JSON output.
    Json,
}

/// One row of a key/value table.
#[derive(Debug, Tabled)]
pub struct Field {
    #[tabled(rename = "Field")]
    pub key: String,

    #[tabled(rename = "Value")]
    pub value: String,
}

impl Field {
    pub fn new(key: &str, value: impl Into<String>) -> Self {
        Self {
            key: key.to_string(),
            value: value.into(),
        }
    }

    /// `-` when absent.
    pub fn optional(key: &str, value: Option<impl ToString>) -> Self {
        Self::new(key, value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string()))
    }
}

/// Render fields as a table.
pub fn render_fields(fields: &[Field]) -> String {
    Table::new(fields).with(Style::sharp()).to_string()
}

/// Print `data` as pretty JSON.
pub fn print_json<T: Serialize>(data: &T) {
    let json = serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string());
    println!("{}", json);
}

/// Print a success message.
pub fn print_success(message: &str) {
    println!("{} {}", "Success:".green().bold(), message);
}

/// Print an info message.
pub fn print_info(message: &str) {
    println!("{} {}", "Info:".blue().bold(), message);
}

/// Print a suggested follow-up command.
pub fn print_next(label: &str, cmd: &str) {
    println!("  {} {}", format!("{label}:").dimmed(), cmd.cyan());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_fields() {
        let table = render_fields(&[
            Field::new("Name", "uds"),
            Field::optional("Address", None::<String>),
            Field::optional("API port", Some(7443)),
        ]);

        assert!(table.contains("Field"));
        assert!(table.contains("uds"));
        assert!(table.contains("7443"));
        assert!(table.lines().any(|l| l.contains("Address") && l.contains('-')));
    }
}
