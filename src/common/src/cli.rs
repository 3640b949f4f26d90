use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Common CLI arguments shared across node binaries
#[derive(Parser, Debug, Clone)]
pub struct CommonArgs {
    #[arg(long, help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(short, long, help = "Enable quiet mode (minimal output)")]
    pub quiet: bool,
}

/// Common subcommands available for all services
#[derive(Subcommand, Debug, Clone, Default)]
pub enum CommonCommands {
    /// Start the service (default behavior)
    #[default]
    Start,
    /// Show current configuration and exit
    Config {
        #[arg(long, help = "Show configuration in JSON format")]
        json: bool,
    },
    /// Validate configuration and exit
    Validate,
    /// Show version information and exit
    Version,
}

/// Utility functions for CLI operations
pub mod utils {
    use super::*;
    use crate::config::{Configuration, LoggingConfig};
    use crate::logging;
    use anyhow::{Context, Result};

    /// Initialize logging, letting `-v`/`-q` override the configured level
    pub fn init_logging(args: &CommonArgs, config: &LoggingConfig) {
        let level = if args.quiet {
            "warn".to_string()
        } else if args.verbose {
            "debug".to_string()
        } else {
            config.level.clone()
        };

        logging::init_tracing(&LoggingConfig {
            level,
            json: config.json,
        });
    }

    /// Load configuration with optional override from CLI
    pub fn load_config(config_path: Option<&PathBuf>) -> Result<Configuration> {
        match config_path {
            Some(path) => Configuration::load_from_path(path).with_context(|| {
                format!("Failed to load configuration from {}", path.display())
            }),
            None => Configuration::load().context("Failed to load configuration"),
        }
    }

    /// Display configuration in human-readable or JSON format
    pub fn display_config(config: &Configuration, json: bool) -> Result<()> {
        if json {
            let json = serde_json::to_string_pretty(config)
                .context("Failed to serialize configuration to JSON")?;
            println!("{json}");
        } else {
            println!("Retention Service Configuration:");
            println!("================================");
            println!("Retention enabled: {}", config.retention.enabled);
            println!(
                "Check interval: {}",
                humantime::format_duration(config.retention.check_interval)
            );
            println!("Reconcile orphans: {}", config.retention.reconcile_orphans);
            println!("Shard data directory: {}", config.storage.data_dir.display());
            match &config.meta.snapshot_path {
                Some(path) => println!(
                    "Metadata snapshot: {} (persist: {})",
                    path.display(),
                    config.meta.persist
                ),
                None => println!("Metadata snapshot: none (empty metadata)"),
            }
            println!("Log level: {}", config.logging.level);
        }
        Ok(())
    }

    /// Validate configuration and report any issues
    pub fn validate_config(config: &Configuration) -> Result<()> {
        tracing::info!("Validating configuration...");
        config.validate().context("Invalid configuration")?;
        tracing::info!("Configuration validation passed");
        Ok(())
    }

    /// Handle common CLI commands that don't require starting services.
    ///
    /// Returns `true` when the command was handled and the process should exit.
    pub fn handle_common_command(command: &CommonCommands, config: &Configuration) -> Result<bool> {
        match command {
            CommonCommands::Config { json } => {
                display_config(config, *json)?;
                Ok(true)
            }
            CommonCommands::Validate => {
                validate_config(config)?;
                Ok(true)
            }
            CommonCommands::Version => {
                println!("{}", version_info());
                Ok(true)
            }
            CommonCommands::Start => Ok(false),
        }
    }

    /// Standard version information
    pub fn version_info() -> String {
        format!(
            "{} {} ({})",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            env!("CARGO_PKG_RUST_VERSION")
        )
    }
}
