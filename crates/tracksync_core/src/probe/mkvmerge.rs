//! Matroska probing with `mkvmerge -J`.

use std::path::Path;

use serde_json::Value;

use super::ProbeError;
use crate::models::{TrackInfo, TrackType};
use crate::tools::{Tool, ToolRegistry};

/// Parsed mkvmerge identification.
#[derive(Debug, Clone, PartialEq)]
pub struct MkvmergeIdentification {
    pub container: String,
    /// Container duration in seconds, if mkvmerge reported one.
    pub duration_secs: Option<f64>,
    pub tracks: Vec<TrackInfo>,
}

/// Run `mkvmerge -J` on a file and parse the result.
pub fn identify(registry: &ToolRegistry, path: &Path) -> Result<MkvmergeIdentification, ProbeError> {
    let mut cmd = registry.command(Tool::Mkvmerge)?;
    cmd.arg("-J").path_arg(path);

    // mkvmerge exits with 1 on warnings; the JSON is still complete.
    let output = cmd.output()?;
    if output.exit_code() > 1 {
        return Err(ProbeError::Unsupported {
            path: path.to_path_buf(),
            message: first_error_line(&output.stdout_str(), &output.stderr),
        });
    }

    let json: Value = serde_json::from_slice(&output.stdout).map_err(|source| ProbeError::Json {
        tool: Tool::Mkvmerge,
        source,
    })?;

    parse_identification(&json)
}

/// Parse the JSON printed by `mkvmerge -J`.
pub fn parse_identification(json: &Value) -> Result<MkvmergeIdentification, ProbeError> {
    let container = json.get("container");

    let recognized = container
        .and_then(|c| c.get("recognized"))
        .and_then(|r| r.as_bool())
        .unwrap_or(true);
    if !recognized {
        return Err(ProbeError::UnrecognizedContainer);
    }

    let container_name = container
        .and_then(|c| c.get("type"))
        .and_then(|t| t.as_str())
        .unwrap_or("unknown")
        .to_string();

    // Nanoseconds.
    let duration_secs = container
        .and_then(|c| c.get("properties"))
        .and_then(|p| p.get("duration"))
        .and_then(|d| d.as_u64())
        .map(|ns| ns as f64 / 1_000_000_000.0);

    let tracks = json
        .get("tracks")
        .and_then(|t| t.as_array())
        .map(|tracks| tracks.iter().filter_map(parse_track).collect())
        .unwrap_or_default();

    Ok(MkvmergeIdentification {
        container: container_name,
        duration_secs,
        tracks,
    })
}

fn parse_track(track: &Value) -> Option<TrackInfo> {
    let track_type = TrackType::parse(track.get("type")?.as_str()?)?;
    let id = track.get("id")?.as_u64()? as usize;
    let properties = track.get("properties");

    let prop_str = |key: &str| -> Option<String> {
        properties
            .and_then(|p| p.get(key))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    };

    let codec = prop_str("codec_id")
        .or_else(|| track.get("codec").and_then(|c| c.as_str()).map(|s| s.to_string()))
        .unwrap_or_default();

    let channels = properties
        .and_then(|p| p.get("audio_channels"))
        .and_then(|c| c.as_u64())
        .map(|c| c.min(u8::MAX as u64) as u8);

    let sample_rate = properties
        .and_then(|p| p.get("audio_sampling_frequency"))
        .and_then(|s| s.as_u64())
        .map(|s| s as u32);

    let is_default = properties
        .and_then(|p| p.get("default_track"))
        .and_then(|d| d.as_bool())
        .unwrap_or(false);

    Some(TrackInfo {
        id,
        track_type,
        codec,
        language: prop_str("language").unwrap_or_else(|| "und".to_string()),
        name: prop_str("track_name"),
        channels,
        channel_layout: None,
        sample_rate,
        is_default,
    })
}

/// mkvmerge reports fatal problems in its JSON `errors` array, or on stderr.
fn first_error_line(stdout: &str, stderr: &str) -> String {
    serde_json::from_str::<Value>(stdout)
        .ok()
        .and_then(|json| {
            json.get("errors")
                .and_then(|e| e.as_array())
                .and_then(|e| e.first())
                .and_then(|e| e.as_str())
                .map(|s| s.to_string())
        })
        .or_else(|| stderr.lines().next().map(|s| s.to_string()))
        .unwrap_or_else(|| "mkvmerge could not identify the file".to_string())
}
