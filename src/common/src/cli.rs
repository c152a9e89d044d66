use clap::{Args, Subcommand};
use std::path::PathBuf;

/// Common CLI arguments shared by every command
#[derive(Args, Debug, Clone, Default)]
pub struct CommonArgs {
    #[arg(long, global = true, help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(
        short,
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Enable quiet mode (minimal output)"
    )]
    pub quiet: bool,
}

/// Common subcommands
#[derive(Subcommand, Debug, Clone, Default, PartialEq, Eq)]
pub enum CommonCommands {
    /// Run one reconciliation pass (default behavior)
    #[default]
    Run,
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
    use crate::config::Configuration;
    use anyhow::{Context, Result};
    use tracing_subscriber::EnvFilter;

    /// Log level implied by the verbosity flags
    pub fn log_level(args: &CommonArgs) -> &'static str {
        if args.quiet {
            "warn"
        } else if args.verbose {
            "debug"
        } else {
            "info"
        }
    }

    /// Initialize logging based on CLI arguments. `RUST_LOG` takes precedence.
    ///
    /// Logs go to stderr, leaving stdout to command output.
    pub fn init_logging(args: &CommonArgs) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(log_level(args)));

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    /// Load configuration with optional override from CLI
    pub fn load_config(config_path: Option<&PathBuf>) -> Result<Configuration> {
        match config_path {
            Some(path) => {
                log::info!("Loading configuration from: {}", path.display());
                Configuration::load_from_path(path).context("Failed to load configuration")
            }
            None => Configuration::load().context("Failed to load configuration"),
        }
    }

    /// Render configuration in human-readable or JSON format.
    ///
    /// The enrollment API key is never printed.
    pub fn render_config(config: &Configuration, json: bool) -> Result<String> {
        let mut redacted = config.clone();
        if redacted.enrollment.api_key.is_some() {
            redacted.enrollment.api_key = Some("<redacted>".to_string());
        }

        if json {
            return serde_json::to_string_pretty(&redacted)
                .context("Failed to serialize configuration to JSON");
        }

        let mut out = String::new();
        out.push_str("roster-reaper configuration:\n");
        out.push_str("============================\n");
        out.push_str(&format!("Enrollment endpoint: {}\n", redacted.enrollment.endpoint));
        out.push_str(&format!(
            "Enrollment environment: {}\n",
            redacted.enrollment.environment
        ));
        out.push_str(&format!(
            "Enrollment API key: {}\n",
            redacted.enrollment.api_key.as_deref().unwrap_or("<unset>")
        ));
        out.push_str(&format!(
            "Cluster API server: {}\n",
            redacted
                .cluster
                .api_server
                .as_deref()
                .unwrap_or("<in-cluster>")
        ));
        out.push_str(&format!("Strategy: {}\n", redacted.reconcile.strategy));
        out.push_str(&format!(
            "Volume suffixes: {}\n",
            redacted.reconcile.volume_suffixes.join(", ")
        ));
        out.push_str(&format!(
            "Protected namespaces: {}\n",
            redacted.reconcile.protected_namespaces.join(", ")
        ));
        out.push_str(&format!(
            "Max concurrency: {}\n",
            redacted.reconcile.max_concurrency
        ));
        out.push_str(&format!(
            "Existence errors as absent: {}\n",
            redacted.reconcile.existence_errors_as_absent
        ));
        Ok(out)
    }

    /// Validate configuration and report any issues
    pub fn validate_config(config: &Configuration) -> Result<()> {
        log::info!("Validating configuration...");
        config.validate()?;
        log::info!("Configuration validation passed");
        Ok(())
    }

    /// Handle the commands that don't run a reconciliation.
    ///
    /// Returns `true` when the command was handled.
    pub fn handle_common_command(command: &CommonCommands, config: &Configuration) -> Result<bool> {
        match command {
            CommonCommands::Config { json } => {
                print!("{}", render_config(config, *json)?);
                if *json {
                    println!();
                }
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
            CommonCommands::Run => Ok(false),
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
