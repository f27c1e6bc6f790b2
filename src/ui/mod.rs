// UI module - frontend boundary and console frontend
//
// This module contains:
// - EventBridge: Delivers worker events to an EventSink on a handler thread
// - SearchController: Wires settings, catalog and the query engine for a frontend
// - ConsoleSink: Terminal rendering of run events

pub mod bridge;
pub mod console;
pub mod controller;

pub use bridge::{EventBridge, EventSink, dispatch};
pub use console::{ConsoleCommand, ConsoleSink};
pub use controller::{RegionSelection, SearchController};
