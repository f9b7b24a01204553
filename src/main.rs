use anyhow::{Context, Result};
use clap::Parser;
use identity_rekey::{
    Datastore, DryRunStore, PgStore, ProgressReporter, RekeyConfig, RekeyEngine, RekeyError,
    RunSummary, SilentProgress, StoreMappingSource, TerminalProgress,
};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rekey-identities")]
#[command(about = "Rewrite every record keyed by an internal username to the user's directory UUID")]
struct Cli {
    /// PostgreSQL connection string
    #[arg(long, env = "REKEY_DATABASE_URL")]
    database_url: String,

    /// Prefix of the governed tables
    #[arg(long, default_value = RekeyConfig::DEFAULT_TABLE_PREFIX)]
    table_prefix: String,

    /// Seconds to wait for the database connection
    #[arg(long, default_value_t = 30)]
    connect_timeout: u64,

    /// Report what would change without writing anything
    #[arg(long)]
    dry_run: bool,

    /// Write the run summary as JSON to this path
    #[arg(long)]
    summary_json: Option<PathBuf>,

    /// Do not draw the progress bar
    #[arg(long)]
    no_progress: bool,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn config(&self) -> RekeyConfig {
        let mut config = RekeyConfig::new(&self.database_url)
            .table_prefix(&self.table_prefix)
            .connect_timeout(Duration::from_secs(self.connect_timeout))
            .dry_run(self.dry_run)
            .show_progress(!self.no_progress);
        if let Some(path) = &self.summary_json {
            config = config.summary_path(path);
        }
        config
    }
}

const EXIT_OK: u8 = 0;
const EXIT_FATAL: u8 = 1;
const EXIT_CONFIG: u8 = 2;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = cli.config();
    let result = config
        .validate()
        .map_err(anyhow::Error::from)
        .and_then(|()| run(&config));

    match &result {
        Ok(summary) => {
            if let Err(e) = report(&config, summary) {
                // The rekey itself finished; a lost report is not fatal.
                error!("{:#}", e);
            }
        }
        Err(e) => error!("{:#}", e),
    }
    ExitCode::from(exit_code(&result))
}

/// Invalid configuration (including an unparsable database URL) is 2; any
/// other error that ends the run early is 1.
fn exit_code<T>(result: &Result<T>) -> u8 {
    match result {
        Ok(_) => EXIT_OK,
        Err(e) => match e.downcast_ref::<RekeyError>() {
            Some(RekeyError::Config(_)) => EXIT_CONFIG,
            _ => EXIT_FATAL,
        },
    }
}

/// The bar redraws in place, so it is only drawn on a terminal.
fn draws_progress(config: &RekeyConfig, stdout_is_terminal: bool) -> bool {
    config.show_progress && stdout_is_terminal
}

fn run(config: &RekeyConfig) -> Result<RunSummary> {
    info!(database = %config.redacted_url(), prefix = %config.table_prefix, "connecting");
    let pg = PgStore::connect(&config.database_url, config.connect_timeout)
        .context("could not connect to the database")?;

    let store: Arc<dyn Datastore> = if config.dry_run {
        Arc::new(DryRunStore::new(Arc::new(pg)))
    } else {
        Arc::new(pg)
    };

    let source = StoreMappingSource::new(store.clone(), &config.table_prefix);
    let mut engine = RekeyEngine::new(store, Box::new(source))
        .table_prefix(config.table_prefix.clone())
        .dry_run(config.dry_run);

    let on_terminal = std::io::stdout().is_terminal();
    let mut reporter: Box<dyn ProgressReporter> = if draws_progress(config, on_terminal) {
        Box::new(TerminalProgress::stdout())
    } else {
        Box::new(SilentProgress)
    };

    let summary = engine
        .run(reporter.as_mut())
        .context("rekey aborted")?;
    Ok(summary)
}

fn report(config: &RekeyConfig, summary: &RunSummary) -> Result<()> {
    summary
        .render(&mut std::io::stdout().lock())
        .context("failed to print summary")?;

    if let Some(path) = &config.summary_path {
        let json = summary.to_json().context("failed to serialize summary")?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write summary to {}", path.display()))?;
        info!(path = %path.display(), "summary written");
    }
    Ok(())
}
