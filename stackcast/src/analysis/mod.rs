//! Analysis of received snapshots
//!
//! Pure functions over snapshots, kept apart from the headless printer in
//! the binary.

pub mod hotspot_analyzer;

pub use hotspot_analyzer::{analyze_hotspots, FunctionHotspot};
