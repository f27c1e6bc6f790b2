// MapSearch - POI collection from the AMap place-search API
//
// This is the library crate containing the query engine and data structures.
// The binary crate (main.rs) provides the console entry point.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;
pub mod ui;

// Re-export commonly used types for convenience
pub use crate::config::{CatalogStore, ConfigManager};
pub use models::{Catalog, FieldSelection, PoiRecord, RunOutcome, RunPhase, StrategyKind, UserConfig};
pub use services::{QueryOrchestrator, RunEvent, RunReport, RunRequest};
pub use state::{StateChange, StateManager};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
