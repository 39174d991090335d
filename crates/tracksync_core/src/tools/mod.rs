//! External tool plumbing (ffmpeg, ffprobe, mkvmerge, mkvextract).
//!
//! `ToolRegistry` resolves executables once; `ToolCommand` runs them with a
//! deadline and captures their output.

mod command;
mod registry;

pub use command::{ToolCommand, ToolOutput};
pub use registry::{Tool, ToolInfo, ToolRegistry};

use std::time::Duration;

use thiserror::Error;

/// Errors from running external tools.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("{0} not found; is it installed and in PATH?")]
    NotFound(Tool),

    #[error("Failed to spawn {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} timed out after {timeout:?}")]
    TimedOut { tool: String, timeout: Duration },

    #[error("I/O error while waiting for {tool}: {source}")]
    Io {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} failed with exit code {exit_code}: {message}")]
    Failed {
        tool: String,
        exit_code: i32,
        message: String,
    },
}
