//! Remuxing a source audio track into the reference container.
//!
//! The delay applied is the negated rounded median of an `Aligned` result
//! (`SyncResult::mux_delay_ms`); positive values delay the source track.

mod mkvmerge;

pub use mkvmerge::{synced_output_path, MkvmergeMuxer, MuxPlan};

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::tools::ToolError;

/// Errors that can occur while muxing.
#[derive(Error, Debug)]
pub enum MuxError {
    #[error("Input not found: {0}")]
    InputNotFound(PathBuf),

    #[error("Output {0} would overwrite an input")]
    WouldOverwriteInput(PathBuf),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("mkvmerge failed with exit code {exit_code}: {message}")]
    Failed { exit_code: i32, message: String },
}

/// Writes a new file combining the reference with one shifted source track.
pub trait Muxer {
    /// Returns the path of the written file.
    fn mux(
        &self,
        reference_path: &Path,
        source_path: &Path,
        source_track_id: usize,
        delay_ms: i64,
        output_dir: &Path,
    ) -> Result<PathBuf, MuxError>;
}
