//! Full-track export with mkvextract.

use std::fs;
use std::path::{Path, PathBuf};

use super::ffmpeg::resolve_track;
use super::ExtractionError;
use crate::models::MediaHandle;
use crate::probe::is_matroska;
use crate::tools::{Tool, ToolError, ToolRegistry};

/// File extension for a Matroska codec id.
pub fn codec_extension(codec: &str) -> &'static str {
    const MAP: &[(&str, &str)] = &[
        ("A_EAC3", "eac3"),
        ("A_AC3", "ac3"),
        ("A_DTS", "dts"),
        ("A_TRUEHD", "thd"),
        ("A_FLAC", "flac"),
        ("A_AAC", "aac"),
        ("A_OPUS", "opus"),
        ("A_VORBIS", "ogg"),
        ("A_PCM", "wav"),
        ("A_MPEG/L3", "mp3"),
        ("A_MPEG/L2", "mp2"),
    ];
    MAP.iter()
        .find(|(prefix, _)| codec.starts_with(prefix))
        .map(|(_, ext)| *ext)
        .unwrap_or("bin")
}

/// Output path for an exported track: `<dir>/track_<id>.<ext>`.
pub fn track_output_path(output_dir: &Path, track_id: usize, codec: &str) -> PathBuf {
    output_dir.join(format!("track_{}.{}", track_id, codec_extension(codec)))
}

/// Export one audio track of a Matroska file into `output_dir`.
///
/// `None` exports the first audio track. mkvextract warnings (exit code 1)
/// are logged and tolerated.
pub fn extract_audio_track(
    registry: &ToolRegistry,
    media: &MediaHandle,
    track: Option<usize>,
    output_dir: &Path,
) -> Result<PathBuf, ExtractionError> {
    if !is_matroska(media.path()) {
        return Err(ExtractionError::NotMatroska(media.path().to_path_buf()));
    }

    let track_info = resolve_track(media, track)?;
    fs::create_dir_all(output_dir)?;
    let output_path = track_output_path(output_dir, track_info.id, &track_info.codec);

    let mut cmd = registry.command(Tool::Mkvextract)?;
    cmd.path_arg(media.path())
        .arg("tracks")
        .arg(format!("{}:{}", track_info.id, output_path.display()));

    let output = cmd.output()?;
    match output.exit_code() {
        0 => {}
        1 => tracing::warn!(
            "mkvextract finished with warnings: {}",
            output.stdout_str().trim()
        ),
        code => {
            return Err(ToolError::Failed {
                tool: Tool::Mkvextract.to_string(),
                exit_code: code,
                message: output.stderr.trim().to_string(),
            }
            .into())
        }
    }

    tracing::info!(
        "Extracted track {} from {} to {}",
        track_info.id,
        media.path().display(),
        output_path.display()
    );
    Ok(output_path)
}
