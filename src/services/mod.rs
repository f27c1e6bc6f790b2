//! Services module - the query engine.
//!
//! Everything here is frontend-agnostic: no terminal or window code, only the
//! place-search workflow and its collaborators.
//!
//! # Components
//!
//! - [`QueryOrchestrator`]: starts, pauses, resumes and cancels runs. A run walks the
//!   selected regions page by page, rotating API keys when the provider refuses one,
//!   and marks each region queried in the catalog once its last page is fetched.
//! - [`RunStrategy`]: [`SequentialStrategy`] fetches everything;
//!   [`ChunkedBatchStrategy`] caps pages per region and spaces out batches.
//! - [`PageFetcher`] / [`AmapFetcher`]: one page request against the AMap
//!   `v3/place/text` endpoint, with transient failures retried by [`RetryPolicy`].
//! - [`CredentialRotator`]: ordered API keys, consumed strictly forward.
//! - [`CsvExporter`]: real-time CSV append with the all-fields-empty skip rule;
//!   [`export_all`] for manual exports.
//! - [`ProgressTracker`]: completion of the run target or of the whole catalog.
//! - [`AutoCollectSchedule`]: daily auto-collect times.
//!
//! # Usage Example
//!
//! ```ignore
//! use mapsearch::services::{AmapFetcher, QueryOrchestrator, RunRequest};
//!
//! let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
//! let orchestrator = QueryOrchestrator::new(Arc::new(AmapFetcher::new()?), catalog, state, tx)
//!     .with_store(config_manager.catalog_store().clone());
//!
//! let handle = orchestrator.start_sequential(RunRequest {
//!     keyword: "museum".into(),
//!     regions: vec!["Springfield".into()],
//!     credentials: vec![api_key],
//!     fields,
//!     export_path: Some("poi_export.csv".into()),
//! })?;
//! let report = handle.await?;
//! ```

pub mod credentials;
pub mod export;
pub mod fetcher;
pub mod orchestrator;
pub mod progress;
pub mod retry;
pub mod schedule;
pub mod strategy;

pub use credentials::{CredentialError, CredentialRotator};
pub use export::{CsvExporter, ExportError, ExportSummary, export_all};
pub use fetcher::{AmapFetcher, PAGE_SIZE, PageFetcher, PageResult, QuotaReason};
pub use orchestrator::{
    EventSender, OrchestratorError, QueryOrchestrator, RunEvent, RunReport, RunRequest, RunTiming,
};
pub use progress::{ProgressSnapshot, ProgressTracker, RunTarget};
pub use retry::RetryPolicy;
pub use schedule::{AutoCollectSchedule, ScheduleError};
pub use strategy::{
    BATCH_THRESHOLD, ChunkedBatchStrategy, RunStrategy, SequentialStrategy, chunk_size_for,
    recommended_strategy,
};
