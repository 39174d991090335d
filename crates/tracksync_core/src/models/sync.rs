//! Types produced while estimating an offset.

use serde::{Deserialize, Serialize};
use tempfile::TempPath;

/// One sampling window, shared by both inputs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleWindow {
    /// Window index (0-based, generation order).
    pub index: usize,
    /// Start time in seconds.
    pub start_secs: f64,
    /// Window length in whole seconds.
    pub length_secs: u32,
}

impl SampleWindow {
    /// End time in seconds.
    pub fn end_secs(&self) -> f64 {
        self.start_secs + self.length_secs as f64
    }
}

/// Mono PCM excerpt of one input at one window.
///
/// Holds the temporary file the samples were read from (if any). Dropping
/// the segment deletes that file.
#[derive(Debug)]
pub struct WaveformSegment {
    /// Mono samples, centre channel excluded.
    pub samples: Vec<f64>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Window the segment was cut from.
    pub window: SampleWindow,
    backing: Option<TempPath>,
}

impl WaveformSegment {
    /// Create an in-memory segment.
    pub fn new(samples: Vec<f64>, sample_rate: u32, window: SampleWindow) -> Self {
        Self {
            samples,
            sample_rate,
            window,
            backing: None,
        }
    }

    /// Attach the temporary file backing this segment.
    pub fn with_backing(mut self, path: TempPath) -> Self {
        self.backing = Some(path);
        self
    }

    /// Path of the backing file, if any.
    pub fn backing_path(&self) -> Option<&std::path::Path> {
        self.backing.as_deref()
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the segment has no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration of the decoded audio in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Offset measured at one window, in milliseconds.
///
/// Positive: source audio occurs later than the reference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OffsetSample {
    pub window: SampleWindow,
    pub offset_ms: f64,
}

/// Classification of a (reference, source) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// One constant offset explains all trimmed windows.
    Aligned,
    /// Per-window offsets disagree too much for a constant offset.
    Warped,
    /// No estimate was attempted or possible.
    Indeterminate,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStatus::Aligned => write!(f, "aligned"),
            SyncStatus::Warped => write!(f, "warped"),
            SyncStatus::Indeterminate => write!(f, "indeterminate"),
        }
    }
}

/// Why a result is `Indeterminate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IndeterminateReason {
    /// Durations differ by more than the configured ceiling.
    DurationMismatch {
        reference_secs: f64,
        source_secs: f64,
        difference_secs: f64,
    },
    /// Fewer than three offsets, trimming is meaningless.
    TooFewSamples { got: usize },
}

impl std::fmt::Display for IndeterminateReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndeterminateReason::DurationMismatch {
                reference_secs,
                source_secs,
                difference_secs,
            } => write!(
                f,
                "durations differ by {:.1}s (reference {:.1}s, source {:.1}s); likely different cuts",
                difference_secs, reference_secs, source_secs
            ),
            IndeterminateReason::TooFewSamples { got } => {
                write!(f, "only {} offset sample(s), at least 3 required", got)
            }
        }
    }
}

/// Outcome of one estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResult {
    /// Per-window offsets in window order.
    pub offsets: Vec<OffsetSample>,
    /// Median of the trimmed offsets.
    pub median_ms: Option<f64>,
    /// Population standard deviation of the trimmed offsets.
    pub std_dev_ms: Option<f64>,
    pub status: SyncStatus,
    /// Set when `status` is `Indeterminate`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indeterminate_reason: Option<IndeterminateReason>,
}

impl SyncResult {
    /// An indeterminate result carrying whatever offsets were measured.
    pub fn indeterminate(offsets: Vec<OffsetSample>, reason: IndeterminateReason) -> Self {
        Self {
            offsets,
            median_ms: None,
            std_dev_ms: None,
            status: SyncStatus::Indeterminate,
            indeterminate_reason: Some(reason),
        }
    }

    /// Raw offsets in milliseconds, window order.
    pub fn offsets_ms(&self) -> Vec<f64> {
        self.offsets.iter().map(|o| o.offset_ms).collect()
    }

    /// Whether the pair can be muxed with a single offset.
    pub fn is_aligned(&self) -> bool {
        self.status == SyncStatus::Aligned
    }

    /// Median rounded to whole milliseconds (mkvmerge only takes integers).
    pub fn rounded_offset_ms(&self) -> Option<i64> {
        self.median_ms.map(|m| m.round() as i64)
    }

    /// Track delay for `mkvmerge --sync` that lines the source up with the
    /// reference.
    ///
    /// The offset is positive when the source plays late, so the delay is
    /// its negation: a late source is pulled earlier.
    pub fn mux_delay_ms(&self) -> Option<i64> {
        self.rounded_offset_ms().map(|ms| -ms)
    }
}

impl std::fmt::Display for SyncResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.median_ms, self.std_dev_ms) {
            (Some(median), Some(std_dev)) => write!(
                f,
                "{}: median {:.1}ms, std dev {:.1}ms over {} windows",
                self.status,
                median,
                std_dev,
                self.offsets.len()
            ),
            _ => match &self.indeterminate_reason {
                Some(reason) => write!(f, "{}: {}", self.status, reason),
                None => write!(f, "{}", self.status),
            },
        }
    }
}
