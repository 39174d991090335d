//! Offset analysis.
//!
//! - **sampler**: where to cut windows (seeded, evenly spaced, bounds checked)
//! - **correlation**: full cross-correlation and peak to milliseconds
//! - **aggregate**: trimmed median / std dev and Aligned / Warped
//!
//! Everything here is pure; extraction and orchestration live in
//! `extraction` and `engine`.

pub mod aggregate;
pub mod correlation;
pub mod sampler;

pub use aggregate::{aggregate, trimmed_stats, TrimmedStats, MIN_OFFSETS};
pub use correlation::{argmax, cross_correlate_direct, cross_correlate_fft, Correlator};
pub use sampler::{linspace, SamplerConfig, TimestampSampler};

use thiserror::Error;

/// Errors from sampling and correlation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error(
        "Input too short: shorter duration {shorter_secs:.1}s must exceed the longest window ({required_secs:.0}s)"
    )]
    InsufficientDuration { shorter_secs: f64, required_secs: f64 },

    #[error("Invalid analysis configuration: {0}")]
    InvalidConfig(String),

    #[error("Empty {which} segment")]
    EmptySegment { which: &'static str },

    #[error("Sample rate mismatch: reference {reference_rate} Hz vs source {source_rate} Hz")]
    SampleRateMismatch {
        reference_rate: u32,
        source_rate: u32,
    },
}
