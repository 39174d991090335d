//! Audio extraction.
//!
//! - **ffmpeg**: short mono windows for correlation (`SegmentExtractor`)
//! - **mkvextract**: whole audio tracks exported to files

pub mod ffmpeg;
pub mod mkvextract;

pub use ffmpeg::{
    bytes_to_f64_samples, layout_channels, non_center_pan_filter, resolve_track, FfmpegExtractor,
};
pub use mkvextract::{codec_extension, extract_audio_track, track_output_path};

use std::path::PathBuf;

use thiserror::Error;

use crate::models::{MediaHandle, SampleWindow, WaveformSegment};
use crate::tools::ToolError;

/// Errors that can occur during extraction.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Track {track} of {path} does not exist or is not an audio track")]
    TrackNotFound { path: PathBuf, track: usize },

    #[error("{0} has no audio track")]
    NoAudioTrack(PathBuf),

    #[error("{0} is not a Matroska file")]
    NotMatroska(PathBuf),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No audio decoded from {path} for window {window}")]
    EmptyOutput { path: PathBuf, window: usize },

    #[error("Decoded audio is not a whole number of samples ({bytes} bytes)")]
    MalformedOutput { bytes: usize },
}

/// Produces the mono waveform of one input at one window.
pub trait SegmentExtractor: Send + Sync {
    /// `track` selects the audio track id; `None` is the first audio track.
    fn extract(
        &self,
        media: &MediaHandle,
        track: Option<usize>,
        window: &SampleWindow,
        sample_rate: u32,
    ) -> Result<WaveformSegment, ExtractionError>;
}
