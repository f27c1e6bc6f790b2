// Search Controller - Wires settings, catalog and the query engine for a frontend
//
// This module contains the SearchController which coordinates between:
// - ConfigManager (settings and catalog files)
// - QueryOrchestrator (the query worker)
// - StateManager (run state)
// - EventBridge sender (worker → frontend events)
//
// It handles:
// - Turning a frontend selection into a run request
// - Choosing a strategy when the caller leaves it open
// - Manual export, status reset and settings persistence

use crate::config::ConfigManager;
use crate::models::{Catalog, RunPhase, StrategyKind, UserConfig};
use crate::services::export::{ExportSummary, export_all};
use crate::services::fetcher::PageFetcher;
use crate::services::orchestrator::{EventSender, QueryOrchestrator, RunReport, RunRequest, RunTiming};
use crate::services::progress::ProgressSnapshot;
use crate::services::schedule::AutoCollectSchedule;
use crate::services::strategy::recommended_strategy;
use crate::state::{StateChange, StateManager};
use anyhow::{Context, Result, bail};
use camino::{Utf8Path, Utf8PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Which regions a run should cover
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionSelection {
    /// Explicit region names
    Named(Vec<String>),
    /// Every region in one group (province)
    Group(String),
    /// Every region in the catalog
    All,
    /// Regions not yet queried, to resume where earlier runs stopped
    Unqueried,
}

/// Controller that wires a frontend to the query engine
///
/// # Example
/// ```ignore
/// let config_manager = ConfigManager::new("MapSearch Data")?;
/// let user_config = config_manager.load_user_config()?;
/// let bridge = EventBridge::new(ConsoleSink::new(std::io::stdout()));
///
/// let controller = SearchController::new(
///     config_manager,
///     user_config,
///     Arc::new(AmapFetcher::new()?),
///     bridge.sender(),
/// )?;
/// let handle = controller.start_run(None, RegionSelection::Unqueried, None)?;
/// let report = handle.await?;
/// ```
pub struct SearchController {
    config_manager: ConfigManager,
    user_config: RwLock<UserConfig>,
    orchestrator: QueryOrchestrator,
    state_manager: StateManager,
}

impl SearchController {
    /// Create a controller, loading the catalog from the data directory
    pub fn new(
        config_manager: ConfigManager,
        user_config: UserConfig,
        fetcher: Arc<dyn PageFetcher>,
        events: EventSender,
    ) -> Result<Self> {
        let catalog = config_manager
            .load_catalog()
            .context("Failed to load region catalog")?;
        Ok(Self::with_catalog(
            config_manager,
            user_config,
            catalog,
            fetcher,
            events,
        ))
    }

    /// Create a controller around an already loaded catalog
    pub fn with_catalog(
        config_manager: ConfigManager,
        user_config: UserConfig,
        catalog: Catalog,
        fetcher: Arc<dyn PageFetcher>,
        events: EventSender,
    ) -> Self {
        let state_manager = StateManager::new();
        let orchestrator = QueryOrchestrator::new(
            fetcher,
            Arc::new(RwLock::new(catalog)),
            state_manager.clone(),
            events,
        )
        .with_store(config_manager.catalog_store().clone());

        tracing::info!("Search controller initialized");

        Self {
            config_manager,
            user_config: RwLock::new(user_config),
            orchestrator,
            state_manager,
        }
    }

    /// Override the worker delays (tests use zero delays)
    pub fn with_timing(mut self, timing: RunTiming) -> Self {
        self.orchestrator = self.orchestrator.with_timing(timing);
        self
    }

    fn settings(&self) -> RwLockReadGuard<'_, UserConfig> {
        self.user_config.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn user_config(&self) -> UserConfig {
        self.settings().clone()
    }

    pub fn state(&self) -> &StateManager {
        &self.state_manager
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_manager.subscribe()
    }

    pub fn catalog(&self) -> Arc<RwLock<Catalog>> {
        self.orchestrator.catalog()
    }

    pub fn phase(&self) -> RunPhase {
        self.state_manager.phase()
    }

    /// Region names for a selection, in catalog order where the catalog decides
    pub fn resolve_regions(&self, selection: &RegionSelection) -> Vec<String> {
        let catalog = self.catalog();
        let catalog = catalog.read().unwrap_or_else(PoisonError::into_inner);
        match selection {
            RegionSelection::Named(names) => names.clone(),
            RegionSelection::Group(group) => catalog
                .regions_in_group(group)
                .into_iter()
                .map(|r| r.name.clone())
                .collect(),
            RegionSelection::All => catalog.all_region_names(),
            RegionSelection::Unqueried => catalog.unqueried_names(),
        }
    }

    /// Build a run request from the current settings
    ///
    /// `keyword` falls back to the saved keyword. Real-time export uses the
    /// saved path when enabled.
    pub fn build_request(&self, keyword: Option<&str>, regions: Vec<String>) -> RunRequest {
        let config = self.settings();
        let settings = &config.search_settings;

        let keyword = keyword
            .map(str::to_string)
            .unwrap_or_else(|| settings.keywords.clone());
        let export_path = settings
            .realtime_export
            .then(|| Utf8PathBuf::from(settings.realtime_export_path.trim()))
            .filter(|p| !p.as_str().is_empty());

        RunRequest {
            keyword: keyword.trim().to_string(),
            regions,
            credentials: settings.api_key_list(),
            fields: config.field_settings.clone(),
            export_path,
        }
    }

    /// Start a run over `selection`
    ///
    /// With `strategy == None` the batch strategy is used above
    /// [`BATCH_THRESHOLD`](crate::services::strategy::BATCH_THRESHOLD) regions.
    /// The keyword becomes the saved keyword for the session.
    pub fn start_run(
        &self,
        keyword: Option<&str>,
        selection: RegionSelection,
        strategy: Option<StrategyKind>,
    ) -> Result<JoinHandle<RunReport>> {
        let regions = self.resolve_regions(&selection);
        let request = self.build_request(keyword, regions);

        if request.fields.selected().is_empty() {
            tracing::warn!("No fields selected; records will not be exported or displayed");
        }

        let kind = strategy.unwrap_or_else(|| {
            let recommended = recommended_strategy(request.regions.len());
            if recommended == StrategyKind::ChunkedBatch {
                tracing::info!(
                    "{} regions selected, using batch mode",
                    request.regions.len()
                );
            }
            recommended
        });

        let keyword = request.keyword.clone();
        let handle = self
            .orchestrator
            .start(request, kind)
            .context("Failed to start query run")?;

        self.user_config
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .search_settings
            .keywords = keyword;

        Ok(handle)
    }

    pub fn pause(&self) -> bool {
        self.orchestrator.pause()
    }

    pub fn resume(&self) -> bool {
        self.orchestrator.resume()
    }

    pub fn cancel(&self) -> bool {
        self.orchestrator.cancel()
    }

    /// Progress of the active run, or catalog-wide query status when idle
    pub fn progress(&self) -> ProgressSnapshot {
        let catalog = self.catalog();
        let catalog = catalog.read().unwrap_or_else(PoisonError::into_inner);
        self.state_manager.read(|s| s.progress.snapshot(&catalog))
    }

    /// Write every record of the last run to `path`, replacing the file
    pub fn export_results(&self, path: &Utf8Path) -> Result<ExportSummary> {
        let records = self.state_manager.records();
        if records.is_empty() {
            bail!("No results to export");
        }
        let fields = self.settings().field_settings.clone();

        export_all(path, &records, &fields)
            .with_context(|| format!("Failed to export results to {}", path))
    }

    /// Mark every region as never queried and save the catalog
    pub fn reset_query_status(&self) -> Result<()> {
        if self.orchestrator.is_running() {
            bail!("Cannot reset query status while a run is active");
        }

        let catalog = self.catalog();
        let mut catalog = catalog.write().unwrap_or_else(PoisonError::into_inner);
        catalog.reset_all();
        self.config_manager
            .save_catalog(&catalog)
            .context("Failed to save catalog after reset")?;

        tracing::info!("Reset query status of {} regions", catalog.total_regions());
        Ok(())
    }

    /// Persist the current settings (including the last keyword)
    pub fn save_settings(&self) -> Result<()> {
        self.config_manager.save_user_config(&self.settings())
    }

    /// Auto-collect schedule, when enabled in the settings
    pub fn auto_collect_schedule(&self) -> Result<Option<AutoCollectSchedule>> {
        let config = self.settings();
        let settings = &config.search_settings;
        if !settings.auto_collect {
            return Ok(None);
        }
        AutoCollectSchedule::parse(&settings.auto_collect_times)
            .map(Some)
            .context("Invalid auto-collect times in settings")
    }
}
