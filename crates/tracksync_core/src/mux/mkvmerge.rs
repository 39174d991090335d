//! mkvmerge remux of one source audio track into the reference container.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{MuxError, Muxer};
use crate::logging::RunLogger;
use crate::tools::{Tool, ToolRegistry};

/// Output file name for a reference: `<stem>.synced.mkv`.
pub fn synced_output_path(reference: &Path, output_dir: &Path) -> PathBuf {
    let stem = reference
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    output_dir.join(format!("{}.synced.mkv", stem))
}

/// Everything needed to build one mkvmerge command.
#[derive(Debug, Clone, PartialEq)]
pub struct MuxPlan {
    pub reference: PathBuf,
    pub source: PathBuf,
    pub source_track_id: usize,
    /// Whole milliseconds; positive delays the source track.
    pub delay_ms: i64,
    pub output: PathBuf,
}

impl MuxPlan {
    /// mkvmerge tokens.
    ///
    /// All reference tracks are kept. From the source only the selected
    /// audio track is taken, shifted with `--sync`.
    pub fn tokens(&self) -> Vec<String> {
        let id = self.source_track_id;
        vec![
            "-o".to_string(),
            self.output.to_string_lossy().into_owned(),
            self.reference.to_string_lossy().into_owned(),
            "--no-video".to_string(),
            "--no-subtitles".to_string(),
            "--no-buttons".to_string(),
            "--no-attachments".to_string(),
            "--no-chapters".to_string(),
            "--no-global-tags".to_string(),
            "--audio-tracks".to_string(),
            id.to_string(),
            "--sync".to_string(),
            format!("{}:{}", id, self.delay_ms),
            self.source.to_string_lossy().into_owned(),
        ]
    }
}

/// `Muxer` backed by mkvmerge.
pub struct MkvmergeMuxer {
    registry: ToolRegistry,
    logger: Option<Arc<RunLogger>>,
}

impl MkvmergeMuxer {
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry,
            logger: None,
        }
    }

    /// Mirror the command and its output into a run log.
    pub fn with_logger(mut self, logger: Arc<RunLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    fn run(&self, plan: &MuxPlan) -> Result<i32, MuxError> {
        let mut cmd = self.registry.command(Tool::Mkvmerge)?;
        cmd.args(plan.tokens());

        if let Some(logger) = &self.logger {
            logger.command(&cmd.display());
        }

        let output = cmd.output()?;
        let exit_code = output.exit_code();

        if let Some(logger) = &self.logger {
            logger.tool_output(&output.stdout_str(), &output.stderr);
        }

        // mkvmerge exit codes: 0 = success, 1 = warnings, 2 = errors
        if exit_code >= 2 {
            if let Some(logger) = &self.logger {
                logger.show_tail("mkvmerge output");
            }
            let _ = fs::remove_file(&plan.output);
            let message = if output.stderr.trim().is_empty() {
                last_error_line(&output.stdout_str())
            } else {
                output.stderr.trim().to_string()
            };
            return Err(MuxError::Failed { exit_code, message });
        }

        if exit_code == 1 {
            tracing::warn!("mkvmerge completed with warnings");
            if let Some(logger) = &self.logger {
                logger.warn("mkvmerge completed with warnings");
            }
        }

        Ok(exit_code)
    }
}

impl Muxer for MkvmergeMuxer {
    fn mux(
        &self,
        reference_path: &Path,
        source_path: &Path,
        source_track_id: usize,
        delay_ms: i64,
        output_dir: &Path,
    ) -> Result<PathBuf, MuxError> {
        for path in [reference_path, source_path] {
            if !path.exists() {
                return Err(MuxError::InputNotFound(path.to_path_buf()));
            }
        }

        fs::create_dir_all(output_dir)?;
        let output = synced_output_path(reference_path, output_dir);
        if output == reference_path || output == source_path {
            return Err(MuxError::WouldOverwriteInput(output));
        }

        let plan = MuxPlan {
            reference: reference_path.to_path_buf(),
            source: source_path.to_path_buf(),
            source_track_id,
            delay_ms,
            output,
        };

        tracing::info!(
            "Muxing track {} of {} into {} with a {:+}ms delay",
            source_track_id,
            source_path.display(),
            reference_path.display(),
            delay_ms
        );
        self.run(&plan)?;

        Ok(plan.output)
    }
}

/// mkvmerge prints errors on stdout prefixed with "Error:".
fn last_error_line(stdout: &str) -> String {
    stdout
        .lines()
        .rev()
        .find(|l| l.starts_with("Error:"))
        .or_else(|| stdout.lines().last())
        .unwrap_or("mkvmerge failed")
        .to_string()
}
