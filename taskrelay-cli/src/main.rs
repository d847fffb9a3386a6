use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use taskrelay_config::{ConfigLoader, TaskRelayConfig};
use taskrelay_core::ExecutionRecord;
use taskrelay_delivery::ReportOutcome;
use taskrelay_logging::init_logging_from_config;
use taskrelay_registry::build_archive;
use tracing::{debug, error, info, warn};

mod agent;
mod cli;
mod shutdown;

use agent::AgentContext;
use cli::{Cli, Commands, ConfigCommands};

/// Load configuration from file or use defaults
fn load_config(config_path: Option<&PathBuf>) -> Result<TaskRelayConfig> {
    let loader = ConfigLoader::new();

    match config_path {
        Some(path) => {
            if path.exists() {
                info!("Loading configuration from: {:?}", path);
                loader
                    .from_file(path)
                    .context(format!("Failed to load configuration from {:?}", path))
            } else {
                warn!("Configuration file not found: {:?}. Using defaults.", path);
                loader
                    .from_env()
                    .context("Failed to load configuration from environment")
            }
        }
        None => {
            debug!("No configuration file specified. Loading from environment or defaults.");
            loader
                .from_env()
                .context("Failed to load configuration from environment")
        }
    }
}

/// Initialize logging from config, letting `--log-level` win over the file
fn init_logging(config: &TaskRelayConfig, log_level: Option<&String>) -> Result<()> {
    let mut logging = config.logging.clone();
    if let Some(level) = log_level {
        logging.level = level
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid log level: {}", level))?;
    }
    init_logging_from_config(&logging)
}

async fn agent_command(config: TaskRelayConfig) -> Result<()> {
    let context = AgentContext::new(config)?;
    let shutdown = shutdown::install_shutdown_handler();
    context.run(shutdown).await
}

async fn pack_command(config: &TaskRelayConfig) -> Result<()> {
    let src = config.paths.tasks_dir.clone();
    let dst = config.paths.archive_path.clone();

    let count = tokio::task::spawn_blocking(move || build_archive(&src, &dst))
        .await
        .context("Archive build task failed")?
        .context("Failed to build task archive")?;

    println!("Packed {} files into {:?}", count, config.paths.archive_path);
    Ok(())
}

async fn unpack_command(context: &AgentContext) -> Result<()> {
    let packager = context.packager().clone();
    let count = tokio::task::spawn_blocking(move || packager.restore())
        .await
        .context("Archive restore task failed")?
        .context("Failed to restore task archive")?;

    println!("Restored {} files into {:?}", count, context.store().root());
    Ok(())
}

fn list_command(context: &AgentContext) -> Result<()> {
    let specs = context.store().discover_specs();
    println!("{}", serde_json::to_string_pretty(&specs)?);
    Ok(())
}

async fn report_command(context: &AgentContext, file: &Path) -> Result<()> {
    let bytes = fs::read(file).context(format!("Failed to read record file {:?}", file))?;
    let record = ExecutionRecord::from_json(&bytes).context("Record file is not a valid execution record")?;
    record.validate()?;

    match context.pipeline().report(&record).await? {
        ReportOutcome::Delivered => println!("Delivered record {}", record.id()),
        ReportOutcome::Buffered { name } => {
            println!("Master unreachable, record {} buffered as {}", record.id(), name)
        }
    }
    Ok(())
}

async fn sweep_command(context: &AgentContext) -> Result<()> {
    let summary = context.pipeline().sweep_once().await;
    println!(
        "Resend pass: {} sent, {} failed, {} skipped",
        summary.sent, summary.failed, summary.skipped
    );
    Ok(())
}

fn pending_command(context: &AgentContext) -> Result<()> {
    for name in context.pipeline().pending()? {
        println!("{}", name);
    }
    Ok(())
}

/// Handle configuration validation
fn handle_config_validate(config_file: &PathBuf) -> Result<()> {
    info!("Validating configuration file: {:?}", config_file);

    if !config_file.exists() {
        return Err(anyhow::anyhow!("Configuration file not found: {:?}", config_file));
    }

    match ConfigLoader::new().from_file(config_file) {
        Ok(_config) => {
            println!("Configuration file is valid");
            Ok(())
        }
        Err(e) => {
            error!("Configuration validation failed: {}", e);
            Err(anyhow::anyhow!("Configuration validation failed: {}", e))
        }
    }
}

/// Handle configuration generation
fn handle_config_generate(output: &PathBuf, force: bool) -> Result<()> {
    info!("Generating configuration at: {:?}", output);

    if output.exists() && !force {
        return Err(anyhow::anyhow!(
            "Output file already exists: {:?}. Use --force to overwrite.",
            output
        ));
    }

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).context("Failed to create output directory")?;
        }
    }

    fs::write(output, TaskRelayConfig::generate_sample()).context("Failed to write configuration file")?;

    println!("Configuration generated at: {:?}", output);
    println!("Validate with: taskrelay config validate --config-file {:?}", output);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Config subcommands work on files named on the command line
    if let Commands::Config { config_cmd } = &cli.command {
        taskrelay_logging::init_simple_tracing(cli.log_level.as_deref().unwrap_or("info"))?;
        return match config_cmd {
            ConfigCommands::Validate { config_file } => handle_config_validate(config_file),
            ConfigCommands::Generate { output, force } => handle_config_generate(output, *force),
        };
    }

    let config = load_config(cli.config.as_ref())?;
    init_logging(&config, cli.log_level.as_ref())?;
    debug!("taskrelay {} starting", env!("CARGO_PKG_VERSION"));

    match &cli.command {
        Commands::Agent => agent_command(config).await,
        Commands::Pack => pack_command(&config).await,
        Commands::Unpack => unpack_command(&AgentContext::new(config)?).await,
        Commands::List => list_command(&AgentContext::new(config)?),
        Commands::Report { file } => report_command(&AgentContext::new(config)?, file).await,
        Commands::Sweep => sweep_command(&AgentContext::new(config)?).await,
        Commands::Pending => pending_command(&AgentContext::new(config)?),
        Commands::Config { .. } => Ok(()),
    }
}
