//! Data models for the MapSearch application.
//!
//! This module contains the core data structures used throughout the application:
//! - [`Catalog`]: Province → city mapping with per-city query status, persisted between runs
//! - [`PoiRecord`]: One raw result item from the place-search endpoint
//! - [`UserConfig`]: Search settings and export field selection from `MapSearch Settings.yaml`
//! - [`RunState`]: The state of the current query run (phase, cursor, progress, results)
//!
//! # Architecture Note
//!
//! The models are designed to be:
//! - **Serializable**: Catalog and config structs derive `Serialize`/`Deserialize`
//! - **Cloneable**: RunState is wrapped in `Arc<RwLock<>>` by [`StateManager`](crate::state::StateManager)
//! - **Owned**: The catalog is handed to the orchestrator as a shared handle, never a global

pub mod catalog;
pub mod config;
pub mod record;
pub mod run_state;

pub use catalog::{Catalog, CatalogError, Region, RegionGroup};
pub use self::config::{FieldSelection, FieldSpec, SearchSettings, UserConfig};
pub use record::PoiRecord;
pub use run_state::{RunOutcome, RunPhase, RunState, StrategyKind};
