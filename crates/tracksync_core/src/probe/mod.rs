//! Duration and track probing.
//!
//! Matroska files go through `mkvmerge -J`; everything else (bare `.ac3`,
//! `.dts`, `.flac`, `.wav` ...) through ffprobe. When mkvmerge reports no
//! container duration, ffprobe supplies it; ffprobe also fills in the
//! channel layouts mkvmerge does not report.

pub mod ffprobe;
pub mod mkvmerge;

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::models::{MediaHandle, TrackInfo};
use crate::tools::{Tool, ToolError, ToolRegistry};

/// Errors that can occur while probing an input.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("Failed to parse {tool} output: {source}")]
    Json {
        tool: Tool,
        #[source]
        source: serde_json::Error,
    },

    #[error("Container not recognized")]
    UnrecognizedContainer,

    #[error("Unsupported or corrupt input {path}: {message}")]
    Unsupported { path: PathBuf, message: String },

    #[error("Could not determine the duration of {0}")]
    NoDuration(PathBuf),
}

/// Turns a path into a `MediaHandle`.
pub trait MediaProber: Send + Sync {
    fn probe(&self, path: &Path) -> Result<MediaHandle, ProbeError>;
}

const MATROSKA_EXTENSIONS: &[&str] = &["mkv", "mka", "mks", "mk3d", "webm"];

/// Whether a path should be probed with mkvmerge.
pub fn is_matroska(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| MATROSKA_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Prober backed by the external tools in a `ToolRegistry`.
#[derive(Debug, Clone)]
pub struct ToolProber {
    registry: ToolRegistry,
}

impl ToolProber {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    fn probe_matroska(&self, path: &Path) -> Result<MediaHandle, ProbeError> {
        let mut ident = mkvmerge::identify(&self.registry, path)?;

        // mkvmerge does not report channel layouts; ffprobe stream indices
        // match mkvmerge track ids.
        let streams = if self.registry.is_available(Tool::Ffprobe) {
            match ffprobe::probe(&self.registry, path) {
                Ok(info) => Some(info),
                Err(e) => {
                    tracing::debug!("ffprobe failed on {}: {}", path.display(), e);
                    None
                }
            }
        } else {
            None
        };
        if let Some(info) = &streams {
            fill_channel_layouts(&mut ident.tracks, &info.tracks);
        }

        let duration = match ident.duration_secs {
            Some(d) if d > 0.0 => d,
            _ => {
                tracing::debug!(
                    "mkvmerge reported no duration for {}, asking ffprobe",
                    path.display()
                );
                let info = match streams {
                    Some(info) => info,
                    None => ffprobe::probe(&self.registry, path)?,
                };
                info.duration_secs
                    .ok_or_else(|| ProbeError::NoDuration(path.to_path_buf()))?
            }
        };

        Ok(MediaHandle::new(path, duration, ident.container, ident.tracks))
    }

    fn probe_other(&self, path: &Path) -> Result<MediaHandle, ProbeError> {
        let info = ffprobe::probe(&self.registry, path)?;
        let duration = info
            .duration_secs
            .ok_or_else(|| ProbeError::NoDuration(path.to_path_buf()))?;
        Ok(MediaHandle::new(path, duration, info.format_name, info.tracks))
    }
}

/// Copy ffprobe channel layouts onto tracks with the same id.
fn fill_channel_layouts(tracks: &mut [TrackInfo], streams: &[TrackInfo]) {
    for track in tracks.iter_mut().filter(|t| t.is_audio()) {
        if let Some(stream) = streams.iter().find(|s| s.id == track.id && s.is_audio()) {
            track.channel_layout = stream.channel_layout.clone();
        }
    }
}

impl MediaProber for ToolProber {
    fn probe(&self, path: &Path) -> Result<MediaHandle, ProbeError> {
        if !path.exists() {
            return Err(ProbeError::FileNotFound(path.to_path_buf()));
        }

        tracing::debug!("Probing file: {}", path.display());

        let handle = if is_matroska(path) {
            self.probe_matroska(path)?
        } else {
            self.probe_other(path)?
        };

        tracing::debug!(
            "{}: {:.3}s, {} tracks ({})",
            path.display(),
            handle.duration_secs(),
            handle.tracks().len(),
            handle.container()
        );
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn detects_matroska_extensions() {
        assert!(is_matroska(Path::new("/a/movie.mkv")));
        assert!(is_matroska(Path::new("/a/MOVIE.MKA")));
        assert!(!is_matroska(Path::new("/a/track.ac3")));
        assert!(!is_matroska(Path::new("/a/noext")));
    }

    #[test]
    fn channel_layouts_follow_track_ids() {
        let mut tracks = vec![
            TrackInfo::audio(1, "A_AAC").with_channels(6),
            TrackInfo::audio(2, "A_AC3").with_channels(6),
        ];
        let streams = vec![
            TrackInfo::audio(2, "ac3").with_channel_layout("5.1(side)"),
            TrackInfo::audio(1, "aac").with_channel_layout("5.1"),
        ];

        fill_channel_layouts(&mut tracks, &streams);

        assert_eq!(tracks[0].channel_layout.as_deref(), Some("5.1"));
        assert_eq!(tracks[1].channel_layout.as_deref(), Some("5.1(side)"));
    }

    #[test]
    fn missing_file_fails_before_tools() {
        let prober = ToolProber::new(ToolRegistry::with_paths([], Duration::from_secs(1)));
        let result = prober.probe(Path::new("/definitely/not/here.mkv"));
        assert!(matches!(result, Err(ProbeError::FileNotFound(_))));
    }

    #[test]
    fn missing_tool_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("movie.mkv");
        std::fs::write(&path, b"not really matroska").unwrap();

        let prober = ToolProber::new(ToolRegistry::with_paths([], Duration::from_secs(1)));
        assert!(matches!(
            prober.probe(&path),
            Err(ProbeError::Tool(ToolError::NotFound(Tool::Mkvmerge)))
        ));
    }
}
