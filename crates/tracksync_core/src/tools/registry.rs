//! Discovery of the external tools the pipeline drives.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{ToolCommand, ToolError};
use crate::config::ToolSettings;

/// External tools used by tracksync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    Ffmpeg,
    Ffprobe,
    Mkvmerge,
    Mkvextract,
}

impl Tool {
    pub const ALL: [Tool; 4] = [Tool::Ffmpeg, Tool::Ffprobe, Tool::Mkvmerge, Tool::Mkvextract];

    /// Executable name looked up on PATH.
    pub fn binary_name(&self) -> &'static str {
        match self {
            Tool::Ffmpeg => "ffmpeg",
            Tool::Ffprobe => "ffprobe",
            Tool::Mkvmerge => "mkvmerge",
            Tool::Mkvextract => "mkvextract",
        }
    }

    fn version_arg(&self) -> &'static str {
        match self {
            Tool::Ffmpeg | Tool::Ffprobe => "-version",
            Tool::Mkvmerge | Tool::Mkvextract => "--version",
        }
    }

    /// Inverse of `binary_name`.
    pub fn from_binary_name(name: &str) -> Option<Tool> {
        Tool::ALL.into_iter().find(|tool| tool.binary_name() == name)
    }

    /// Set or clear the configured path. `None` falls back to PATH lookup.
    pub fn set_override(&self, settings: &mut ToolSettings, path: Option<String>) {
        let slot = match self {
            Tool::Ffmpeg => &mut settings.ffmpeg_path,
            Tool::Ffprobe => &mut settings.ffprobe_path,
            Tool::Mkvmerge => &mut settings.mkvmerge_path,
            Tool::Mkvextract => &mut settings.mkvextract_path,
        };
        *slot = path;
    }

    fn override_path<'a>(&self, settings: &'a ToolSettings) -> Option<&'a str> {
        match self {
            Tool::Ffmpeg => settings.ffmpeg_path.as_deref(),
            Tool::Ffprobe => settings.ffprobe_path.as_deref(),
            Tool::Mkvmerge => settings.mkvmerge_path.as_deref(),
            Tool::Mkvextract => settings.mkvextract_path.as_deref(),
        }
    }
}

impl std::fmt::Display for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.binary_name())
    }
}

/// Availability report for one tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub tool: Tool,
    pub available: bool,
    /// First line of the version output.
    pub version: Option<String>,
    pub path: Option<PathBuf>,
}

/// Resolved tool paths plus the shared timeout.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    paths: HashMap<Tool, PathBuf>,
    timeout: Duration,
}

impl ToolRegistry {
    /// Resolve every tool from the configured override or PATH.
    ///
    /// An override that does not exist falls back to PATH. Tools that are
    /// not found are left out and reported by `require`.
    pub fn discover(settings: &ToolSettings) -> Self {
        let mut paths = HashMap::new();
        for tool in Tool::ALL {
            let resolved = match tool.override_path(settings).map(Path::new) {
                Some(p) if p.exists() => Some(p.to_path_buf()),
                Some(p) => {
                    tracing::warn!(
                        "Configured {} path {} does not exist, searching PATH",
                        tool,
                        p.display()
                    );
                    which::which(tool.binary_name()).ok()
                }
                None => which::which(tool.binary_name()).ok(),
            };

            if let Some(path) = resolved {
                tracing::debug!("Found {} at {}", tool, path.display());
                paths.insert(tool, path);
            }
        }

        Self {
            paths,
            timeout: Duration::from_secs(settings.timeout_secs),
        }
    }

    /// Registry with explicit paths, skipping discovery.
    pub fn with_paths(paths: impl IntoIterator<Item = (Tool, PathBuf)>, timeout: Duration) -> Self {
        Self {
            paths: paths.into_iter().collect(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Path of a tool, or `NotFound`.
    pub fn require(&self, tool: Tool) -> Result<&Path, ToolError> {
        self.paths
            .get(&tool)
            .map(PathBuf::as_path)
            .ok_or(ToolError::NotFound(tool))
    }

    pub fn is_available(&self, tool: Tool) -> bool {
        self.paths.contains_key(&tool)
    }

    /// Start a command for a tool with the registry timeout.
    pub fn command(&self, tool: Tool) -> Result<ToolCommand, ToolError> {
        Ok(ToolCommand::new(self.require(tool)?, self.timeout))
    }

    /// Availability and version of every tool.
    pub fn check_all(&self) -> Vec<ToolInfo> {
        Tool::ALL
            .iter()
            .map(|&tool| match self.paths.get(&tool) {
                Some(path) => ToolInfo {
                    tool,
                    available: true,
                    version: self.detect_version(tool, path),
                    path: Some(path.clone()),
                },
                None => ToolInfo {
                    tool,
                    available: false,
                    version: None,
                    path: None,
                },
            })
            .collect()
    }

    fn detect_version(&self, tool: Tool, path: &Path) -> Option<String> {
        let output = ToolCommand::new(path, self.timeout.min(Duration::from_secs(10)))
            .arg(tool.version_arg())
            .execute()
            .ok()?;
        output.stdout_str().lines().next().map(|s| s.trim().to_string())
    }
}
