//! CLI command definitions, routing, and tracing setup.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use fightsync_core::{
    Extractors, PipelineConfig, ProgressReporter, RunCommand, RunMode, RunSummary, StageStatus,
};
use fightsync_ledger::Ledger;
use fightsync_shared::{AppConfig, SourceKind, Stage, init_config, load_config};
use fightsync_sources::JsonFeedExtractor;
use fightsync_storage::{Storage, Table};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// FightSync — one canonical fighter record set from many sources.
#[derive(Parser)]
#[command(
    name = "fightsync",
    version,
    about = "Reconcile fighter records from independent sources into one canonical set.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Execute a pipeline run.
    Run {
        /// Run mode: full-refresh, incremental, or targeted.
        #[arg(short, long, default_value = "incremental")]
        mode: String,

        /// Stages for targeted mode (comma-separated, e.g.
        /// "fetch-rankings,reconcile").
        #[arg(long)]
        stages: Option<String>,

        /// Skip the load stage (dry run against the database).
        #[arg(long)]
        skip_load: bool,

        /// Override the fetch worker-pool size.
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Show outstanding retry backlog and loaded table counts.
    Status,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "fightsync=info",
        1 => "fightsync=debug",
        _ => "fightsync=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run {
            mode,
            stages,
            skip_load,
            workers,
        } => cmd_run(&mode, stages.as_deref(), skip_load, workers).await,
        Command::Status => cmd_status().await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

async fn cmd_run(
    mode: &str,
    stages: Option<&str>,
    skip_load: bool,
    workers: Option<usize>,
) -> Result<()> {
    let config = load_config()?;

    let mode: RunMode = mode.parse().map_err(|e: String| eyre!(e))?;
    let targets = match stages {
        Some(list) => list
            .split(',')
            .map(|s| s.trim().parse::<Stage>().map_err(|e| eyre!(e)))
            .collect::<Result<Vec<_>>>()?,
        None => Vec::new(),
    };
    if mode != RunMode::Targeted && !targets.is_empty() {
        return Err(eyre!("--stages only applies to targeted mode"));
    }

    let command = RunCommand {
        mode,
        targets,
        skip_load,
        workers,
    };

    let pipeline_config = PipelineConfig::from_app(&config);
    let extractors = build_extractors(&config);

    info!(mode = %command.mode, skip_load, "starting run");

    let reporter = CliProgress::new();
    let summary =
        fightsync_core::run(&pipeline_config, &command, &extractors, &reporter).await?;

    print_summary(&summary);

    if summary.succeeded() {
        Ok(())
    } else {
        Err(eyre!("run completed with stage failures (see summary)"))
    }
}

/// Wire a feed extractor for every source configured under `[sources]`.
fn build_extractors(config: &AppConfig) -> Extractors {
    let feed = |source: SourceKind| -> Option<Arc<dyn fightsync_sources::Extractor>> {
        config
            .sources
            .get(source.as_str())
            .map(|location| {
                Arc::new(JsonFeedExtractor::new(source, location))
                    as Arc<dyn fightsync_sources::Extractor>
            })
    };

    Extractors {
        roster: feed(SourceKind::Roster),
        details: feed(SourceKind::Details),
        secondary: feed(SourceKind::Sherdog),
        rankings: feed(SourceKind::Rankings),
        bouts: feed(SourceKind::Bouts),
    }
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("  Run summary ({} mode)", summary.mode);
    println!("  {:-<60}", "");
    for outcome in &summary.stages {
        println!(
            "  {:<16} {:<40} backlog: {}",
            outcome.stage.to_string(),
            outcome.status.describe(),
            outcome.ledger_after
        );
    }
    println!("  {:-<60}", "");
    println!("  Fighters:  {}", summary.fighters);
    println!("  Rankings:  {}", summary.rankings);
    println!("  Bouts:     {}", summary.bouts);
    println!("  Conflicts: {}", summary.conflicts);
    println!("  Orphans:   {}", summary.orphans);
    if let Some(fingerprint) = &summary.fingerprint {
        println!("  Set hash:  {}", &fingerprint[..16.min(fingerprint.len())]);
    }
    println!("  Time:      {:.1}s", summary.elapsed.as_secs_f64());
    println!();
}

async fn cmd_status() -> Result<()> {
    let config = load_config()?;

    println!();
    println!("  Outstanding retry backlog:");
    let ledger = Ledger::open(config.errors_dir())?;
    for (stage, size) in ledger.sizes()? {
        if Stage::fetch_stages().contains(&stage) {
            println!("    {:<16} {}", stage.to_string(), size);
        }
    }

    println!();
    let db_path = config.db_path();
    if db_path.exists() {
        let storage = Storage::open(&db_path).await?;
        println!("  Loaded tables ({}):", db_path.display());
        for table in [
            Table::Fighters,
            Table::FightHistory,
            Table::Rankings,
            Table::UpcomingBouts,
        ] {
            println!("    {:<16} {}", table.name(), storage.count(table).await?);
        }
    } else {
        println!("  Database not created yet ({})", db_path.display());
    }
    println!();

    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn stage_started(&self, stage: Stage) {
        self.spinner.set_message(format!("Running {stage}"));
    }

    fn stage_finished(&self, stage: Stage, status: &StageStatus) {
        self.spinner
            .set_message(format!("{stage}: {}", status.describe()));
    }

    fn done(&self, _summary: &RunSummary) {
        self.spinner.finish_and_clear();
    }
}
