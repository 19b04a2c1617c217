//! aprs-feeder: APRS-IS full-feed ingestion and the packet store it writes.
//!
//! The server links this crate to start a background [`client::IngestSession`]
//! and to open the store read-side for queries.

pub mod client;
pub mod lines;
pub mod store;

pub use client::{FeedConfig, IngestSession, IngestStats, Login, SessionState};
pub use store::{PacketStore, StoreError, StoreStats};
