//! CLI argument parsing definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Set the log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the agent: keep the task archive current (master) and resend buffered results
    Agent,

    /// Build the task archive from the task tree
    Pack,

    /// Replace the task tree with the contents of the task archive
    Unpack,

    /// Print every task definition found in the task tree as JSON
    List,

    /// Stage and deliver one execution record
    Report {
        /// JSON file holding the execution record
        #[arg(long, value_name = "PATH")]
        file: PathBuf,
    },

    /// Run one resend pass over the buffered results
    Sweep,

    /// List buffered results waiting for delivery
    Pending,

    /// Configuration management commands
    Config {
        #[command(subcommand)]
        config_cmd: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Validate a configuration file
    Validate {
        /// Path to the configuration file to validate
        #[arg(long, value_name = "PATH")]
        config_file: PathBuf,
    },

    /// Write a sample configuration file with every default spelled out
    Generate {
        /// Output file path
        #[arg(long, value_name = "PATH", default_value = "taskrelay.yaml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "taskrelay",
            "report",
            "--file",
            "record.json",
            "--log-level",
            "debug",
            "--config",
            "agent.yaml",
        ])
        .unwrap();

        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert_eq!(cli.config, Some(PathBuf::from("agent.yaml")));
        assert!(matches!(cli.command, Commands::Report { ref file } if file == &PathBuf::from("record.json")));
    }
}
