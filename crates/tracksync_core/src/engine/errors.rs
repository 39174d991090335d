//! Error types for the sync engine.
//!
//! Component errors keep their own enums; `SyncError` adds which input and
//! which window they happened at.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::analysis::AnalysisError;
use crate::extraction::ExtractionError;
use crate::probe::ProbeError;

/// Which input of the pair an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Reference,
    Source,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Reference => write!(f, "reference"),
            Side::Source => write!(f, "source"),
        }
    }
}

/// Everything that can stop an offset estimate.
///
/// `Warped` and `Indeterminate` outcomes are not errors; they are returned
/// as a `SyncResult`.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Failed to probe {side} {path}: {source}")]
    Probe {
        side: Side,
        path: PathBuf,
        #[source]
        source: ProbeError,
    },

    #[error(
        "Input too short: shorter duration {shorter_secs:.1}s must exceed the longest window ({required_secs:.0}s)"
    )]
    InsufficientDuration { shorter_secs: f64, required_secs: f64 },

    #[error("Extraction failed for {side} at window {window_index}: {source}")]
    Extraction {
        window_index: usize,
        side: Side,
        #[source]
        source: ExtractionError,
    },

    #[error("Correlation failed at window {window_index}: {source}")]
    Correlation {
        window_index: usize,
        #[source]
        source: AnalysisError,
    },

    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to start worker pool: {0}")]
    WorkerPool(String),
}

impl From<AnalysisError> for SyncError {
    /// Sampling errors raised before any window is measured.
    fn from(err: AnalysisError) -> Self {
        match err {
            AnalysisError::InsufficientDuration {
                shorter_secs,
                required_secs,
            } => SyncError::InsufficientDuration {
                shorter_secs,
                required_secs,
            },
            AnalysisError::InvalidConfig(message) => SyncError::InvalidConfig(message),
            other => SyncError::Correlation {
                window_index: 0,
                source: other,
            },
        }
    }
}

impl SyncError {
    /// Window index for errors raised inside the window loop.
    pub fn window_index(&self) -> Option<usize> {
        match self {
            SyncError::Extraction { window_index, .. }
            | SyncError::Correlation { window_index, .. } => Some(*window_index),
            _ => None,
        }
    }
}
