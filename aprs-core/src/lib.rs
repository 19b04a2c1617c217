//! aprs-core: Pure decode + propagation library for APRS-IS traffic.
//!
//! No async, no I/O. Parses TNC2 frames, replays them into a propagation
//! graph, and assembles the map overlay. Shared by `aprs-feeder` (ingestion)
//! and `aprs-server` (HTTP + CLI).

pub mod config;
pub mod footprint;
pub mod frame;
pub mod geo;
pub mod hull;
pub mod overlay;
pub mod position;
pub mod propagation;
pub mod types;

// Re-export commonly used types at crate root
pub use frame::{parse_tnc2, ParsedFrame};
pub use overlay::{LocationsResponse, PropagationOverlay};
pub use propagation::{PropagationGraph, PropagationParams, StationPosition};
pub use types::*;
