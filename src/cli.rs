//! CLI interface for chart-repo

use crate::config::{ChartRepoConfig, StorageBackend};
use crate::http::user_agent;
use crate::output::{Output, Progress, format_repo, format_url};
use crate::scheduler::JobKind;
use crate::sync::{ChartRepoSyncer, SyncOutcome};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Chart Repository utility
#[derive(Parser, Debug)]
#[command(name = "chart-repo")]
#[command(about = "Chart Repository utility - mirrors chart repositories into a catalog")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to chart-repo.toml
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Document store backend
    #[arg(long, global = true, value_enum)]
    pub db_type: Option<StorageBackend>,

    /// SQLite database path
    #[arg(long, global = true)]
    pub database: Option<PathBuf>,

    /// Comment appended to the User-Agent header
    #[arg(long, global = true)]
    pub user_agent_comment: Option<String>,

    /// Number of asset workers
    #[arg(long, global = true)]
    pub workers: Option<usize>,

    /// Verbose logging
    #[arg(long, global = true)]
    pub debug: bool,
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Add a chart repository, or resync it when it already exists
    Sync(SyncCommand),
    /// Delete a chart repository and everything imported from it
    Delete(DeleteCommand),
    /// Print version information
    Version,
}

#[derive(Parser, Debug)]
pub struct SyncCommand {
    /// Repository name
    pub repo_name: String,

    /// Repository URL
    pub repo_url: String,

    /// Value of the Authorization header sent to the repository
    #[arg(long, env = "AUTHORIZATION_HEADER", hide_env_values = true)]
    pub authorization_header: Option<String>,
}

#[derive(Parser, Debug)]
pub struct DeleteCommand {
    /// Repository name
    pub repo_name: String,
}

/// Run the CLI
pub async fn run() -> crate::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("chart_repo={log_level}")));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(cli.debug)
        .with_file(cli.debug)
        .with_line_number(cli.debug)
        .init();

    tracing::debug!("CLI arguments: {:?}", cli);

    let result = match cli.command {
        Commands::Sync(ref cmd) => handle_sync(&cli, cmd).await,
        Commands::Delete(ref cmd) => handle_delete(&cli, cmd).await,
        Commands::Version => {
            handle_version(&cli);
            Ok(())
        }
    };

    if let Err(e) = &result {
        crate::cli_error::print_error_with_suggestions(e);
        let exit_code = crate::cli_error::get_exit_code(e);
        std::process::exit(exit_code);
    }

    result
}

/// Loads configuration and applies command line overrides on top of the
/// file and environment values.
pub async fn resolve_config(cli: &Cli) -> crate::Result<ChartRepoConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let mut config = ChartRepoConfig::from_file(path).await?;
            config.apply_env_overrides();
            config
        }
        None => ChartRepoConfig::load().await?,
    };

    if let Some(backend) = cli.db_type {
        config.storage.backend = backend;
    }
    if let Some(database) = &cli.database {
        config.storage.database_path = database.clone();
    }
    if let Some(comment) = &cli.user_agent_comment {
        config.http.user_agent_comment = Some(comment.clone()).filter(|c| !c.is_empty());
    }
    if let Some(workers) = cli.workers {
        config.sync.workers = workers;
    }

    config.validate()?;
    Ok(config)
}

async fn handle_sync(cli: &Cli, cmd: &SyncCommand) -> crate::Result<()> {
    let config = resolve_config(cli).await?;
    Progress::start(&format!(
        "Syncing {} from {}",
        format_repo(&cmd.repo_name),
        format_url(cmd.repo_url.trim())
    ));

    let syncer = ChartRepoSyncer::from_config(&config).await?;
    let outcome = syncer
        .sync_repo(
            &cmd.repo_name,
            &cmd.repo_url,
            cmd.authorization_header.as_deref(),
        )
        .await?;

    match outcome {
        SyncOutcome::Skipped { .. } => {
            Output::info(&format!(
                "{} is up to date, nothing to do",
                format_repo(&cmd.repo_name)
            ));
        }
        SyncOutcome::Synced { charts, report, .. } => {
            Progress::step(&format!(
                "{} icons, {} chart files imported, {} chart files unchanged",
                report.icons_imported, report.files_imported, report.files_up_to_date
            ));
            if !report.is_clean() {
                Output::warning(&format!(
                    "{} asset jobs failed; their charts are still listed",
                    report.failures.len()
                ));
                for failure in &report.failures {
                    let kind = match failure.kind {
                        JobKind::Icon => "icon",
                        JobKind::Files => "files",
                    };
                    Output::list_item(&format!("{kind} {}: {}", failure.job_id, failure.error));
                }
            }
            Output::success(&format!(
                "Synced {charts} charts from {}",
                format_repo(&cmd.repo_name)
            ));
        }
    }
    Ok(())
}

async fn handle_delete(cli: &Cli, cmd: &DeleteCommand) -> crate::Result<()> {
    let config = resolve_config(cli).await?;
    Progress::start(&format!("Deleting {}", format_repo(&cmd.repo_name)));

    let syncer = ChartRepoSyncer::from_config(&config).await?;
    let summary = syncer.delete_repo(&cmd.repo_name).await?;

    Output::success(&format!(
        "Deleted {} charts and {} chart file sets of {}",
        summary.charts,
        summary.chart_files,
        format_repo(&cmd.repo_name)
    ));
    Ok(())
}

fn handle_version(cli: &Cli) {
    Output::result(&format!("chart-repo version: {}", env!("CARGO_PKG_VERSION")));
    Output::result(&format!(
        "user agent: {}",
        user_agent(cli.user_agent_comment.as_deref())
    ));
}
