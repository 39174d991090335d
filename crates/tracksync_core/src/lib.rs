//! tracksync core - audio offset estimation between two media releases.
//!
//! This crate contains the offset-estimation engine and the thin adapters
//! around the external media tools (ffmpeg, ffprobe, mkvmerge, mkvextract).
//! It has no UI dependencies and can be driven by the CLI or any other
//! front end.
//!
//! # Layout
//!
//! - [`probe`]: duration and track probing (`MediaProber`)
//! - [`analysis`]: window sampling, cross-correlation, robust aggregation
//! - [`extraction`]: non-centre mono segment extraction (`SegmentExtractor`)
//! - [`engine`]: the `SyncEngine` state machine tying everything together
//! - [`mux`]: applying the offset with mkvmerge (`Muxer`)
//! - [`config`], [`logging`], [`tools`]: ambient plumbing

pub mod analysis;
pub mod config;
pub mod engine;
pub mod extraction;
pub mod logging;
pub mod models;
pub mod mux;
pub mod probe;
pub mod tools;

pub use engine::{EngineConfig, EngineState, SyncEngine, SyncError};
pub use models::{MediaHandle, SampleWindow, SyncResult, SyncStatus, TrackInfo, WaveformSegment};

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_returns_value() {
        assert!(!version().is_empty());
    }
}
