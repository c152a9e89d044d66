//! roster-reaper
//!
//! Deletes the namespaces and persistent volumes of users who are no longer
//! enrolled. One invocation runs one reconciliation pass.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use common::cli::{CommonArgs, CommonCommands, utils};
use reconciler::cluster::KubeApiClient;
use reconciler::enrollment::{AwsedClient, EnrollmentSource, StaticRoster};
use reconciler::{ReconcileReport, ReconcileSettings, ReconciliationEngine};

/// Delete namespaces and volumes of users who are no longer enrolled
#[derive(Parser, Debug)]
#[command(name = "roster-reaper", author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    /// Log what would be deleted without deleting anything
    #[arg(long, global = true)]
    dry_run: bool,

    /// Read enrollments from a JSON export instead of the enrollment API
    #[arg(long, global = true, value_name = "FILE")]
    roster_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<CommonCommands>,
}

/// Waits for a shutdown signal (SIGINT or SIGTERM)
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

        tokio::select! {
            _ = sigint.recv() => log::warn!("Received SIGINT"),
            _ = sigterm.recv() => log::warn!("Received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for shutdown signal")?;
        log::warn!("Received Ctrl+C");
    }

    Ok(())
}

fn print_report(report: &ReconcileReport) {
    for notice in &report.notices {
        println!("{notice}");
    }

    if report.dry_run {
        println!(
            "dry run: {} of {} namespaces are stale, nothing was deleted",
            report.stale.len(),
            report.namespaces_seen.len()
        );
    } else {
        println!(
            "deleted {} namespaces and {} volumes, skipped {} missing volumes",
            report.namespaces_deleted(),
            report.volumes_deleted(),
            report.volumes_skipped()
        );
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = utils::load_config(cli.common.config.as_ref())?;

    let command = cli.command.clone().unwrap_or_default();
    if utils::handle_common_command(&command, &config)? {
        return Ok(());
    }

    config.validate().context("Invalid configuration")?;

    let enrollment: Arc<dyn EnrollmentSource> = match &cli.roster_file {
        Some(path) => {
            log::info!("Reading enrollments from {}", path.display());
            Arc::new(StaticRoster::from_json_file(path).context("Failed to load roster file")?)
        }
        None => Arc::new(
            AwsedClient::new(&config.enrollment)
                .context("Failed to create enrollment client")?,
        ),
    };

    let cluster = Arc::new(
        KubeApiClient::from_config(&config.cluster)
            .await
            .context("Failed to create cluster client")?,
    );

    let engine = ReconciliationEngine::new(
        ReconcileSettings::from(&config.reconcile),
        enrollment,
        cluster,
    );

    if cli.dry_run {
        log::info!("Dry run: no resources will be deleted");
    }

    tokio::select! {
        result = engine.reconcile(cli.dry_run) => {
            let report = result.context("Reconciliation failed")?;
            print_report(&report);
            Ok(())
        }
        signal = wait_for_shutdown_signal() => {
            signal?;
            anyhow::bail!("Reconciliation interrupted before completion")
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    utils::init_logging(&cli.common);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        for cause in e.chain().skip(1) {
            eprintln!("  caused by: {cause}");
        }
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults_to_live_run() {
        let cli = Cli::try_parse_from(["roster-reaper"]).unwrap();

        assert!(!cli.dry_run);
        assert!(cli.command.is_none());
        assert!(cli.roster_file.is_none());
    }

    #[test]
    fn test_dry_run_flag() {
        let cli = Cli::try_parse_from(["roster-reaper", "--dry-run"]).unwrap();
        assert!(cli.dry_run);

        let cli = Cli::try_parse_from(["roster-reaper", "run", "--dry-run", "-v"]).unwrap();
        assert!(cli.dry_run);
        assert!(cli.common.verbose);
        assert_eq!(cli.command, Some(CommonCommands::Run));
    }

    #[test]
    fn test_config_subcommand() {
        let cli = Cli::try_parse_from([
            "roster-reaper",
            "--config",
            "/etc/roster-reaper.toml",
            "config",
            "--json",
        ])
        .unwrap();

        assert_eq!(cli.command, Some(CommonCommands::Config { json: true }));
        assert_eq!(
            cli.common.config,
            Some(PathBuf::from("/etc/roster-reaper.toml"))
        );
    }

    #[test]
    fn test_verbose_and_quiet_conflict() {
        assert!(Cli::try_parse_from(["roster-reaper", "-v", "-q"]).is_err());
    }

    #[test]
    fn test_unknown_argument_is_rejected() {
        assert!(Cli::try_parse_from(["roster-reaper", "-dry-run"]).is_err());
    }
}
