//! Data models shared across the crate.
//!
//! - Media structures (probed inputs, tracks)
//! - Sync structures (windows, waveform segments, offset samples, results)

mod media;
mod sync;

pub use media::{friendly_codec_name, MediaHandle, TrackInfo, TrackType};
pub use sync::{
    IndeterminateReason, OffsetSample, SampleWindow, SyncResult, SyncStatus, WaveformSegment,
};
