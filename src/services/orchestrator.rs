//! Region/page state machine for one query run.
//!
//! [`QueryOrchestrator`] is the control surface (start, pause, resume, cancel).
//! Each run is executed by a [`RegionRunner`] on a tokio task, driven by a
//! [`RunStrategy`](crate::services::strategy::RunStrategy).

use crate::config::CatalogStore;
use crate::metrics::RunMetrics;
use crate::models::{Catalog, FieldSelection, PoiRecord, RunOutcome, StrategyKind};
use crate::services::credentials::CredentialRotator;
use crate::services::export::CsvExporter;
use crate::services::fetcher::{PageFetcher, PageResult};
use crate::services::progress::ProgressSnapshot;
use crate::services::strategy::{RunStrategy, strategy_for};
use crate::state::StateManager;
use camino::Utf8PathBuf;
use indexmap::IndexSet;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Notifications from the worker to the frontend.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    Log(String),
    RecordDisplayed { field: String, value: String },
    RegionCompleted(String),
    Progress { completed: usize, total: usize, percent: f64 },
    Warning(String),
    RunFinished(RunOutcome),
}

pub type EventSender = mpsc::UnboundedSender<RunEvent>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error("A query run is already active")]
    AlreadyRunning,

    #[error("No search keyword given")]
    EmptyKeyword,

    #[error("No regions selected")]
    NoRegions,

    #[error("No API keys configured")]
    NoCredentials,
}

/// Delays applied by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunTiming {
    /// Between consecutive pages of one region
    pub page_delay: Duration,
    /// Between regions inside a batch
    pub region_delay: Duration,
    /// Between batches
    pub chunk_delay: Duration,
    /// Poll interval while paused
    pub pause_poll: Duration,
}

impl Default for RunTiming {
    fn default() -> Self {
        Self {
            page_delay: Duration::from_millis(1100),
            region_delay: Duration::from_millis(500),
            chunk_delay: Duration::from_secs(5),
            pause_poll: Duration::from_millis(200),
        }
    }
}

/// Everything one run needs from the caller.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub keyword: String,
    pub regions: Vec<String>,
    pub credentials: Vec<String>,
    pub fields: FieldSelection,
    /// Real-time export target; `None` disables real-time export.
    pub export_path: Option<Utf8PathBuf>,
}

impl RunRequest {
    fn validate(&self) -> Result<(), OrchestratorError> {
        if self.keyword.trim().is_empty() {
            return Err(OrchestratorError::EmptyKeyword);
        }
        if self.regions.is_empty() {
            return Err(OrchestratorError::NoRegions);
        }
        if self.credentials.iter().all(|k| k.trim().is_empty()) {
            return Err(OrchestratorError::NoCredentials);
        }
        Ok(())
    }
}

/// Result of a finished run, returned by the worker task.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub records: Vec<PoiRecord>,
    pub regions_completed: usize,
    pub regions_skipped: usize,
}

/// How a single region ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionFlow {
    /// Fetched to the end and marked queried
    Completed,
    /// No region code; not marked
    Skipped,
    /// The run must stop
    Stop(RunOutcome),
}

struct RunControl {
    pause_tx: watch::Sender<bool>,
    cancel_tx: watch::Sender<bool>,
}

/// Starts and steers query runs.
///
/// At most one run is active at a time; [`start`](Self::start) while a run is
/// running or paused fails with [`OrchestratorError::AlreadyRunning`].
pub struct QueryOrchestrator {
    fetcher: Arc<dyn PageFetcher>,
    catalog: Arc<RwLock<Catalog>>,
    store: Option<CatalogStore>,
    state: StateManager,
    events: EventSender,
    timing: RunTiming,
    control: Mutex<Option<RunControl>>,
}

impl QueryOrchestrator {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        catalog: Arc<RwLock<Catalog>>,
        state: StateManager,
        events: EventSender,
    ) -> Self {
        Self {
            fetcher,
            catalog,
            store: None,
            state,
            events,
            timing: RunTiming::default(),
            control: Mutex::new(None),
        }
    }

    /// Persist the catalog through `store` after every completed region.
    pub fn with_store(mut self, store: CatalogStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_timing(mut self, timing: RunTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn catalog(&self) -> Arc<RwLock<Catalog>> {
        Arc::clone(&self.catalog)
    }

    pub fn state(&self) -> &StateManager {
        &self.state
    }

    pub fn is_running(&self) -> bool {
        self.state.is_active()
    }

    pub fn start_sequential(&self, request: RunRequest) -> Result<JoinHandle<RunReport>, OrchestratorError> {
        self.start(request, StrategyKind::Sequential)
    }

    pub fn start_chunked(&self, request: RunRequest) -> Result<JoinHandle<RunReport>, OrchestratorError> {
        self.start(request, StrategyKind::ChunkedBatch)
    }

    /// Spawn a worker for `request` on the current tokio runtime.
    ///
    /// # Errors
    /// Fails without side effects if the request is incomplete or a run is active.
    pub fn start(
        &self,
        mut request: RunRequest,
        kind: StrategyKind,
    ) -> Result<JoinHandle<RunReport>, OrchestratorError> {
        request.validate()?;

        // Duplicate selections are fetched once
        let regions: IndexSet<String> = request.regions.drain(..).collect();
        request.regions = regions.into_iter().collect();

        self.state
            .try_begin_run(&request.keyword, &request.regions, kind)
            .map_err(|_| OrchestratorError::AlreadyRunning)?;

        let (pause_tx, pause_rx) = watch::channel(false);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        *self.control_guard() = Some(RunControl {
            pause_tx,
            cancel_tx,
        });

        tracing::info!(
            "Starting {} run for '{}' over {} regions",
            kind,
            request.keyword,
            request.regions.len()
        );

        let runner = RegionRunner {
            fetcher: Arc::clone(&self.fetcher),
            catalog: Arc::clone(&self.catalog),
            store: self.store.clone(),
            state: self.state.clone(),
            events: self.events.clone(),
            metrics: Arc::new(RunMetrics::new()),
            timing: self.timing,
            rotator: CredentialRotator::new(request.credentials),
            keyword: request.keyword,
            regions: request.regions,
            exporter: request.export_path.map(CsvExporter::new),
            fields: request.fields,
            pause_rx,
            cancel_rx,
            records: Vec::new(),
            regions_completed: 0,
            regions_skipped: 0,
        };

        let strategy = strategy_for(kind);
        Ok(tokio::spawn(runner.run(strategy)))
    }

    /// Pause the active run before its next page or region.
    ///
    /// Returns `false` when no run is active.
    pub fn pause(&self) -> bool {
        self.set_paused(true)
    }

    pub fn resume(&self) -> bool {
        self.set_paused(false)
    }

    /// Cancel the active run after its in-flight page.
    pub fn cancel(&self) -> bool {
        if !self.state.is_active() {
            return false;
        }
        match self.control_guard().as_ref() {
            Some(control) => {
                control.cancel_tx.send_replace(true);
                tracing::info!("Cancellation requested");
                true
            }
            None => false,
        }
    }

    fn set_paused(&self, paused: bool) -> bool {
        if !self.state.is_active() {
            return false;
        }
        match self.control_guard().as_ref() {
            Some(control) => {
                control.pause_tx.send_replace(paused);
                self.state.set_paused(paused);
                tracing::info!("Run {}", if paused { "paused" } else { "resumed" });
                true
            }
            None => false,
        }
    }

    fn control_guard(&self) -> std::sync::MutexGuard<'_, Option<RunControl>> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Worker-side state of one run.
///
/// Owns the credential cursor and the collected records; strategies drive it
/// through [`run_region`](Self::run_region), [`checkpoint`](Self::checkpoint)
/// and [`delay`](Self::delay).
pub struct RegionRunner {
    fetcher: Arc<dyn PageFetcher>,
    catalog: Arc<RwLock<Catalog>>,
    store: Option<CatalogStore>,
    state: StateManager,
    events: EventSender,
    metrics: Arc<RunMetrics>,
    timing: RunTiming,
    rotator: CredentialRotator,
    keyword: String,
    regions: Vec<String>,
    exporter: Option<CsvExporter>,
    fields: FieldSelection,
    pause_rx: watch::Receiver<bool>,
    cancel_rx: watch::Receiver<bool>,
    records: Vec<PoiRecord>,
    regions_completed: usize,
    regions_skipped: usize,
}

impl RegionRunner {
    async fn run(mut self, strategy: Box<dyn RunStrategy>) -> RunReport {
        self.log(format!(
            "Searching '{}' in {} regions ({} mode, {} API keys)",
            self.keyword,
            self.regions.len(),
            strategy.kind(),
            self.rotator.len()
        ));

        let outcome = strategy.execute(&mut self).await;

        self.state.finish_run(outcome);
        self.metrics.log_summary();
        self.log(format!(
            "Run {}: {} regions completed, {} skipped, {} records",
            outcome,
            self.regions_completed,
            self.regions_skipped,
            self.records.len()
        ));
        self.emit(RunEvent::RunFinished(outcome));

        RunReport {
            outcome,
            records: self.records,
            regions_completed: self.regions_completed,
            regions_skipped: self.regions_skipped,
        }
    }

    pub fn regions(&self) -> &[String] {
        &self.regions
    }

    pub fn timing(&self) -> RunTiming {
        self.timing
    }

    pub fn metrics(&self) -> &RunMetrics {
        &self.metrics
    }

    /// Progress of the run target.
    pub fn progress(&self) -> ProgressSnapshot {
        self.state.read(|s| {
            s.progress.run_snapshot().unwrap_or(ProgressSnapshot {
                completed: 0,
                total: 0,
                percent: 0.0,
            })
        })
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    /// Block while paused. Returns `false` once the run is cancelled.
    pub async fn checkpoint(&mut self) -> bool {
        loop {
            if self.is_cancelled() {
                return false;
            }
            if !*self.pause_rx.borrow() {
                return true;
            }
            tokio::time::sleep(self.timing.pause_poll).await;
        }
    }

    /// Sleep for `duration`, waking early on cancellation.
    ///
    /// Returns `false` if the run was cancelled.
    pub async fn delay(&mut self, duration: Duration) -> bool {
        if self.is_cancelled() {
            return false;
        }
        let cancel_rx = &mut self.cancel_rx;
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = async {
                let closed = cancel_rx.wait_for(|cancelled| *cancelled).await.is_err();
                if closed {
                    // Control dropped without cancelling; let the sleep finish
                    std::future::pending::<()>().await;
                }
            } => {}
        }
        !self.is_cancelled()
    }

    /// Fetch every page of `region` (up to `page_cap`) and record its completion.
    pub async fn run_region(&mut self, region: &str, page_cap: Option<u32>) -> RegionFlow {
        let code = {
            let catalog = self.catalog.read().unwrap_or_else(PoisonError::into_inner);
            catalog.resolve_code(region).map(str::to_string)
        };
        let Some(code) = code else {
            self.regions_skipped += 1;
            self.metrics.record_region_skipped();
            self.warning(format!("Region code not found for {}, skipping", region));
            return RegionFlow::Skipped;
        };

        self.log(format!("Querying {} ({})", region, code));
        let mut page: u32 = 1;

        loop {
            if !self.checkpoint().await {
                return RegionFlow::Stop(RunOutcome::Cancelled);
            }
            self.state.set_cursor(region, page);

            let credential = match self.rotator.current() {
                Ok(key) => key.to_string(),
                Err(e) => {
                    self.warning(e.to_string());
                    return RegionFlow::Stop(RunOutcome::CredentialsExhausted);
                }
            };

            let result = self
                .fetcher
                .fetch_page(&credential, &self.keyword, &code, page)
                .await;
            let last_page = result.is_last_page();

            match result {
                PageResult::QuotaOrAuthError { reason } => {
                    self.metrics.record_page(0);
                    self.metrics.record_rotation();
                    let refused = self.rotator.position();
                    let total = self.rotator.len();
                    match self.rotator.advance() {
                        Ok(_) => self.warning(format!(
                            "API key {}/{} refused ({}), switching to key {}/{}",
                            refused,
                            total,
                            reason.describe(),
                            refused + 1,
                            total
                        )),
                        Err(e) => {
                            self.warning(format!(
                                "API key {}/{} refused ({}): {}",
                                refused,
                                total,
                                reason.describe(),
                                e
                            ));
                            return RegionFlow::Stop(RunOutcome::CredentialsExhausted);
                        }
                    }
                }
                PageResult::Empty => {
                    self.metrics.record_page(0);
                    tracing::debug!("{} page {}: no more results", region, page);
                    break;
                }
                PageResult::Ok { items, item_count } => {
                    self.metrics.record_page(item_count);
                    tracing::debug!("{} page {}: {} results", region, page, item_count);
                    self.accept_records(items);

                    if last_page {
                        break;
                    }
                    if page_cap.is_some_and(|cap| page >= cap) {
                        self.log(format!("{}: page limit {} reached", region, page));
                        break;
                    }
                    page += 1;
                    if !self.delay(self.timing.page_delay).await {
                        return RegionFlow::Stop(RunOutcome::Cancelled);
                    }
                }
            }
        }

        // A cancel that landed during the last fetch still leaves the region unmarked
        if self.is_cancelled() {
            return RegionFlow::Stop(RunOutcome::Cancelled);
        }

        self.complete_region(region);
        RegionFlow::Completed
    }

    fn accept_records(&mut self, items: Vec<PoiRecord>) {
        if items.is_empty() {
            return;
        }
        self.state.push_records(&items);

        if let Some(exporter) = &self.exporter {
            match exporter.append_records(&items, &self.fields) {
                Ok(summary) => self
                    .metrics
                    .record_export(summary.rows_written, summary.rows_skipped),
                Err(e) => {
                    self.metrics.record_export_failure();
                    self.state.note_export_warning();
                    self.warning(format!("Real-time export failed: {}", e));
                }
            }
        }

        for record in &items {
            for (display, key) in self.fields.selected() {
                if record.contains(key) {
                    self.emit(RunEvent::RecordDisplayed {
                        field: display.to_string(),
                        value: record.text(key),
                    });
                }
            }
        }

        self.records.extend(items);
    }

    fn complete_region(&mut self, region: &str) {
        let now = chrono::Local::now().naive_local();

        let (count, persisted) = {
            let mut catalog = self.catalog.write().unwrap_or_else(PoisonError::into_inner);
            let count = catalog.mark_queried(region, now).ok();
            let persisted = self.store.as_ref().map(|store| store.save(&catalog));
            (count, persisted)
        };

        if let Some(Err(e)) = persisted {
            self.warning(format!("Failed to save region status: {:#}", e));
        }

        self.state.mark_region_complete(region);
        self.regions_completed += 1;
        self.metrics.record_region_completed();

        self.log(format!(
            "{} done (queried {} times)",
            region,
            count.unwrap_or_default()
        ));
        self.emit(RunEvent::RegionCompleted(region.to_string()));

        let progress = self.progress();
        self.emit(RunEvent::Progress {
            completed: progress.completed,
            total: progress.total,
            percent: progress.percent,
        });
    }

    fn emit(&self, event: RunEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("Run event dropped, receiver closed");
        }
    }

    pub fn log(&self, text: String) {
        tracing::info!("{}", text);
        self.emit(RunEvent::Log(text));
    }

    fn warning(&self, text: String) {
        tracing::warn!("{}", text);
        self.emit(RunEvent::Warning(text));
    }
}
