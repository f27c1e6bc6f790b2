//! MapSearch - POI collection from the AMap place-search API
//!
//! Main entry point for the console application.
//!
//! # Overview
//!
//! This binary provides a headless frontend for the query engine. It initializes:
//! - Logging infrastructure (file rotation + optional console output)
//! - Tokio async runtime for the query worker
//! - Configuration loading ([`ConfigManager`])
//! - The event bridge ([`EventBridge`]) rendering run events to stdout
//! - The search controller ([`SearchController`])
//!
//! While a run is active, typing `p`, `r` or `c` (then Enter) pauses, resumes or
//! cancels it. Ctrl-C cancels gracefully: the current page finishes and the
//! current region is left unmarked.
//!
//! # Data Files
//!
//! Expected in `MapSearch Data/` (or `--data-dir`):
//! - `MapSearch Settings.yaml`: API keys, keyword, export options, field selection
//! - `MapSearch Catalog.json`: provinces, cities and their query status

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::Parser;
use mapsearch::config::DEFAULT_DATA_DIR;
use mapsearch::models::SearchSettings;
use mapsearch::services::{AmapFetcher, RunReport};
use mapsearch::ui::{ConsoleCommand, ConsoleSink, EventBridge, RegionSelection, SearchController};
use mapsearch::{APP_NAME, ConfigManager, StrategyKind, VERSION};
use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// How often watch mode checks the auto-collect schedule
const WATCH_INTERVAL: Duration = Duration::from_secs(20);

#[derive(Debug, Parser)]
#[command(name = "mapsearch", version, about = "Collect points of interest from AMap place search")]
struct Cli {
    /// Directory holding the settings and catalog files
    #[arg(long, default_value = DEFAULT_DATA_DIR)]
    data_dir: Utf8PathBuf,

    /// Directory for log files
    #[arg(long, default_value = "logs")]
    log_dir: Utf8PathBuf,

    /// Search keyword (defaults to the saved keyword)
    #[arg(short, long)]
    keyword: Option<String>,

    /// Region to query; repeat for several
    #[arg(short = 'r', long = "region")]
    regions: Vec<String>,

    /// Query every region of one province
    #[arg(long, conflicts_with = "regions")]
    group: Option<String>,

    /// Query every region in the catalog
    #[arg(long, conflicts_with_all = ["regions", "group", "unqueried"])]
    all: bool,

    /// Query only regions that have not been queried yet
    #[arg(long, conflicts_with_all = ["regions", "group"])]
    unqueried: bool,

    /// Force batch mode
    #[arg(long, conflicts_with = "sequential")]
    batch: bool,

    /// Force sequential mode
    #[arg(long)]
    sequential: bool,

    /// Write all results of the run to this CSV file afterwards
    #[arg(long)]
    export: Option<Utf8PathBuf>,

    /// Reset every region to "not queried" before anything else
    #[arg(long)]
    reset_status: bool,

    /// Keep running and start a collection at the configured auto-collect times
    #[arg(long)]
    watch: bool,

    /// Debug logging, also echoed to the console
    #[arg(long)]
    debug: bool,
}

impl Cli {
    fn selection(&self, all_regions_setting: bool) -> RegionSelection {
        if !self.regions.is_empty() {
            RegionSelection::Named(self.regions.clone())
        } else if let Some(group) = &self.group {
            RegionSelection::Group(group.clone())
        } else if self.all || (all_regions_setting && !self.unqueried) {
            RegionSelection::All
        } else {
            RegionSelection::Unqueried
        }
    }

    fn strategy(&self) -> Option<StrategyKind> {
        if self.batch {
            Some(StrategyKind::ChunkedBatch)
        } else if self.sequential {
            Some(StrategyKind::Sequential)
        } else {
            None
        }
    }

    /// Debug logging from `--debug` or the saved "Debug Mode" setting
    fn debug_logging(&self, settings: &SearchSettings) -> bool {
        self.debug || settings.debug_mode
    }

    /// Whether any query was asked for (as opposed to a bare `--reset-status`)
    fn wants_run(&self) -> bool {
        !self.reset_status
            || self.watch
            || self.keyword.is_some()
            || !self.regions.is_empty()
            || self.group.is_some()
            || self.all
            || self.unqueried
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Settings decide the log level, so they are read before logging starts
    let config_manager = ConfigManager::new(&cli.data_dir)?;
    let user_config = config_manager.load_user_config()?;
    let debug = cli.debug_logging(&user_config.search_settings);

    let _log_guard =
        mapsearch::logging::setup_logging_with_console(&cli.log_dir, "mapsearch", debug, cli.debug)?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);
    if !config_manager.user_config_path().exists() {
        tracing::warn!(
            "No settings file at {}, using defaults",
            config_manager.user_config_path()
        );
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(2)
        .thread_name("mapsearch-worker")
        .build()
        .context("Failed to create tokio runtime")?;

    let all_regions_setting = user_config.search_settings.all_regions;

    let bridge = EventBridge::new(ConsoleSink::new(std::io::stdout()));
    let fetcher = AmapFetcher::new().context("Failed to create HTTP client")?;

    let controller = SearchController::new(
        config_manager,
        user_config,
        Arc::new(fetcher),
        bridge.sender(),
    )?;

    let result = (|| -> Result<()> {
        if cli.reset_status {
            controller.reset_query_status()?;
            println!("All regions reset to not queried");
        }
        if !cli.wants_run() {
            return Ok(());
        }

        let commands = spawn_command_reader();
        let selection = cli.selection(all_regions_setting);
        let strategy = cli.strategy();
        let keyword = cli.keyword.as_deref();

        runtime.block_on(async {
            if cli.watch {
                watch_loop(&controller, keyword, &selection, strategy, commands).await
            } else {
                let mut commands = commands;
                run_once(&controller, keyword, selection, strategy, &mut commands)
                    .await
                    .map(|_| ())
            }
        })?;

        if let Some(path) = &cli.export {
            let summary = controller.export_results(path)?;
            println!(
                "Exported {} rows to {} ({} empty records skipped)",
                summary.rows_written, path, summary.rows_skipped
            );
        }

        controller.save_settings()
    })();

    // The bridge drains until the controller's senders are gone
    drop(controller);
    if let Some(sink) = bridge.shutdown() {
        tracing::debug!(
            "Console displayed {} fields across {} regions",
            sink.fields_shown(),
            sink.regions_completed()
        );
    }

    runtime.shutdown_timeout(Duration::from_secs(5));
    tracing::info!("Application shutdown complete");

    result
}

/// Forward console commands typed on stdin.
///
/// The reader thread owns only the sender, so it never keeps the controller alive.
fn spawn_command_reader() -> mpsc::UnboundedReceiver<ConsoleCommand> {
    let (tx, rx) = mpsc::unbounded_channel();

    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            match ConsoleCommand::parse(&line) {
                Some(command) => {
                    if tx.send(command).is_err() {
                        break;
                    }
                }
                None => println!("Commands: p = pause, r = resume, c = cancel"),
            }
        }
    });

    rx
}

async fn run_once(
    controller: &SearchController,
    keyword: Option<&str>,
    selection: RegionSelection,
    strategy: Option<StrategyKind>,
    commands: &mut mpsc::UnboundedReceiver<ConsoleCommand>,
) -> Result<RunReport> {
    let mut handle = controller.start_run(keyword, selection, strategy)?;

    let joined = loop {
        tokio::select! {
            joined = &mut handle => break joined,
            Some(command) = commands.recv() => {
                let applied = match command {
                    ConsoleCommand::Pause => controller.pause(),
                    ConsoleCommand::Resume => controller.resume(),
                    ConsoleCommand::Cancel => controller.cancel(),
                };
                if !applied {
                    tracing::debug!("{:?} ignored, no active run", command);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("Interrupted, cancelling run");
                controller.cancel();
            }
        }
    };

    let report = joined.context("Query worker failed")?;
    tracing::info!(
        "Run {}: {} regions completed, {} skipped, {} records",
        report.outcome,
        report.regions_completed,
        report.regions_skipped,
        report.records.len()
    );
    Ok(report)
}

async fn watch_loop(
    controller: &SearchController,
    keyword: Option<&str>,
    selection: &RegionSelection,
    strategy: Option<StrategyKind>,
    mut commands: mpsc::UnboundedReceiver<ConsoleCommand>,
) -> Result<()> {
    let schedule = controller
        .auto_collect_schedule()?
        .context("Auto collect is disabled in the settings file")?;

    let mut last_fired = None;
    let now = chrono::Local::now().naive_local();
    println!("Watching; next collection at {}", schedule.next_after(now));

    loop {
        let now = chrono::Local::now().naive_local();
        if schedule.is_due(now, last_fired) {
            last_fired = Some(now);
            tracing::info!("Auto-collect triggered at {}", now);

            if let Err(e) = run_once(controller, keyword, selection.clone(), strategy, &mut commands).await {
                tracing::warn!("Auto-collect run failed: {:#}", e);
            }
            println!("Next collection at {}", schedule.next_after(chrono::Local::now().naive_local()));
        }

        tokio::select! {
            _ = tokio::time::sleep(WATCH_INTERVAL) => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Watch mode stopped");
                return Ok(());
            }
        }
    }
}
