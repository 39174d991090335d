//! Probing of non-Matroska inputs with ffprobe.
//!
//! Runs `ffprobe -v quiet -print_format json -show_format -show_streams` and
//! maps streams to tracks. The stream index doubles as the track id, which is
//! what `-map 0:<id>` expects.

use std::path::Path;

use serde::Deserialize;

use super::ProbeError;
use crate::models::{TrackInfo, TrackType};
use crate::tools::{Tool, ToolRegistry};

/// Parsed ffprobe result.
#[derive(Debug, Clone, PartialEq)]
pub struct FfprobeInfo {
    pub format_name: String,
    pub duration_secs: Option<f64>,
    pub tracks: Vec<TrackInfo>,
}

pub fn probe(registry: &ToolRegistry, path: &Path) -> Result<FfprobeInfo, ProbeError> {
    let mut cmd = registry.command(Tool::Ffprobe)?;
    cmd.args([
        "-v",
        "quiet",
        "-print_format",
        "json",
        "-show_format",
        "-show_streams",
    ])
    .path_arg(path);

    let output = cmd.output()?;
    if !output.status.success() {
        return Err(ProbeError::Unsupported {
            path: path.to_path_buf(),
            message: format!("ffprobe exited with code {}", output.exit_code()),
        });
    }

    parse_output(&output.stdout_str())
}

/// Parse ffprobe JSON output.
pub fn parse_output(json: &str) -> Result<FfprobeInfo, ProbeError> {
    let ff: FfprobeOutput = serde_json::from_str(json).map_err(|source| ProbeError::Json {
        tool: Tool::Ffprobe,
        source,
    })?;

    // Some raw streams only carry a per-stream duration.
    let duration_secs = ff
        .format
        .duration
        .as_deref()
        .and_then(parse_seconds)
        .or_else(|| {
            ff.streams
                .iter()
                .filter_map(|s| s.duration.as_deref().and_then(parse_seconds))
                .reduce(f64::max)
        });

    let tracks = ff.streams.iter().filter_map(to_track).collect();

    Ok(FfprobeInfo {
        format_name: ff.format.format_name.unwrap_or_else(|| "unknown".to_string()),
        duration_secs,
        tracks,
    })
}

fn parse_seconds(s: &str) -> Option<f64> {
    s.trim()
        .parse::<f64>()
        .ok()
        .filter(|d| d.is_finite() && *d > 0.0)
}

fn to_track(stream: &FfprobeStream) -> Option<TrackInfo> {
    let track_type = TrackType::parse(stream.codec_type.as_deref()?)?;
    Some(TrackInfo {
        id: stream.index,
        track_type,
        codec: stream.codec_name.clone().unwrap_or_default(),
        language: stream
            .tags
            .language
            .clone()
            .unwrap_or_else(|| "und".to_string()),
        name: stream.tags.title.clone(),
        channels: stream.channels.map(|c| c.min(u8::MAX as u32) as u8),
        channel_layout: stream
            .channel_layout
            .clone()
            .filter(|l| !l.is_empty() && l != "unknown"),
        sample_rate: stream.sample_rate.as_deref().and_then(|s| s.parse().ok()),
        is_default: stream.disposition.default != 0,
    })
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    index: usize,
    codec_type: Option<String>,
    codec_name: Option<String>,
    channels: Option<u32>,
    channel_layout: Option<String>,
    sample_rate: Option<String>,
    duration: Option<String>,
    #[serde(default)]
    disposition: FfprobeDisposition,
    #[serde(default)]
    tags: FfprobeTags,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeDisposition {
    #[serde(default)]
    default: u8,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeTags {
    language: Option<String>,
    title: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const AC3_JSON: &str = r#"{
        "streams": [
            {
                "index": 0,
                "codec_name": "ac3",
                "codec_type": "audio",
                "sample_rate": "48000",
                "channels": 6,
                "channel_layout": "5.1(side)",
                "duration": "5399.904000",
                "disposition": { "default": 0 }
            }
        ],
        "format": {
            "filename": "movie.ac3",
            "format_name": "ac3",
            "duration": "5400.032000"
        }
    }"#;

    #[test]
    fn parses_bare_audio_file() {
        let info = parse_output(AC3_JSON).unwrap();
        assert_eq!(info.format_name, "ac3");
        assert!((info.duration_secs.unwrap() - 5400.032).abs() < 1e-9);
        assert_eq!(info.tracks.len(), 1);

        let track = &info.tracks[0];
        assert_eq!(track.id, 0);
        assert!(track.is_audio());
        assert_eq!(track.codec, "ac3");
        assert_eq!(track.channels, Some(6));
        assert_eq!(track.channel_layout.as_deref(), Some("5.1(side)"));
        assert_eq!(track.sample_rate, Some(48000));
        assert_eq!(track.language, "und");
    }

    #[test]
    fn falls_back_to_stream_duration() {
        let json = r#"{
            "streams": [
                { "index": 0, "codec_type": "audio", "codec_name": "dts", "duration": "120.5" },
                { "index": 1, "codec_type": "data", "duration": "121.0" }
            ],
            "format": { "format_name": "dts" }
        }"#;
        let info = parse_output(json).unwrap();
        assert_eq!(info.duration_secs, Some(121.0));
        assert_eq!(info.tracks[0].channel_layout, None);
        // Data streams are not tracks.
        assert_eq!(info.tracks.len(), 1);
    }

    #[test]
    fn no_duration_anywhere() {
        let info = parse_output(r#"{"streams": [], "format": {"duration": "N/A"}}"#).unwrap();
        assert_eq!(info.duration_secs, None);
    }

    #[test]
    fn invalid_json_fails() {
        assert!(matches!(
            parse_output("not json"),
            Err(ProbeError::Json { tool: Tool::Ffprobe, .. })
        ));
    }
}
