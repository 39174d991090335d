//! Probed media inputs and their tracks.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Type of media track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackType {
    Video,
    Audio,
    Subtitles,
}

impl TrackType {
    /// Parse the track type names used by mkvmerge and ffprobe.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "video" => Some(TrackType::Video),
            "audio" => Some(TrackType::Audio),
            "subtitles" | "subtitle" => Some(TrackType::Subtitles),
            _ => None,
        }
    }
}

impl std::fmt::Display for TrackType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackType::Video => write!(f, "video"),
            TrackType::Audio => write!(f, "audio"),
            TrackType::Subtitles => write!(f, "subtitles"),
        }
    }
}

/// A single track inside a probed input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackInfo {
    /// Track ID (mkvmerge numbering, equal to the ffmpeg stream index).
    pub id: usize,
    /// Type of track.
    #[serde(rename = "type")]
    pub track_type: TrackType,
    /// Codec identifier as reported by the prober (e.g. "A_AC3" or "ac3").
    pub codec: String,
    /// Language code, "und" when unknown.
    pub language: String,
    /// Track name, if any.
    pub name: Option<String>,
    /// Number of audio channels.
    pub channels: Option<u8>,
    /// ffmpeg channel layout name (e.g. "5.1(side)"), when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_layout: Option<String>,
    /// Audio sample rate in Hz.
    pub sample_rate: Option<u32>,
    /// Whether the default flag is set.
    pub is_default: bool,
}

impl TrackInfo {
    /// Create an audio track with the given id and codec.
    pub fn audio(id: usize, codec: impl Into<String>) -> Self {
        Self {
            id,
            track_type: TrackType::Audio,
            codec: codec.into(),
            language: "und".to_string(),
            name: None,
            channels: None,
            channel_layout: None,
            sample_rate: None,
            is_default: false,
        }
    }

    /// Set the language code.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Set the channel count.
    pub fn with_channels(mut self, channels: u8) -> Self {
        self.channels = Some(channels);
        self
    }

    /// Set the ffmpeg channel layout name.
    pub fn with_channel_layout(mut self, layout: impl Into<String>) -> Self {
        self.channel_layout = Some(layout.into());
        self
    }

    /// Whether this is an audio track.
    pub fn is_audio(&self) -> bool {
        self.track_type == TrackType::Audio
    }

    /// One-line description used by track listings.
    pub fn describe(&self) -> String {
        let mut line = format!(
            "#{} {} ({})",
            self.id,
            friendly_codec_name(&self.codec),
            self.language
        );
        if let Some(name) = &self.name {
            line.push_str(&format!(" '{}'", name));
        }
        let mut details = Vec::new();
        if let Some(sr) = self.sample_rate {
            details.push(format!("{} Hz", sr));
        }
        if let Some(ch) = self.channels {
            details.push(format!("{} ch", ch));
        }
        if self.is_default {
            details.push("default".to_string());
        }
        if !details.is_empty() {
            line.push_str(" | ");
            line.push_str(&details.join(", "));
        }
        line
    }
}

/// A probed input: path, duration and tracks.
///
/// Created once by a prober and only read afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaHandle {
    path: PathBuf,
    duration_secs: f64,
    container: String,
    tracks: Vec<TrackInfo>,
}

impl MediaHandle {
    /// Create a handle from probe results.
    pub fn new(
        path: impl Into<PathBuf>,
        duration_secs: f64,
        container: impl Into<String>,
        tracks: Vec<TrackInfo>,
    ) -> Self {
        Self {
            path: path.into(),
            duration_secs,
            container: container.into(),
            tracks,
        }
    }

    /// Path of the probed input.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Total duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.duration_secs
    }

    /// Container format name reported by the prober.
    pub fn container(&self) -> &str {
        &self.container
    }

    /// All probed tracks.
    pub fn tracks(&self) -> &[TrackInfo] {
        &self.tracks
    }

    /// Audio tracks only, in container order.
    pub fn audio_tracks(&self) -> impl Iterator<Item = &TrackInfo> {
        self.tracks.iter().filter(|t| t.is_audio())
    }

    /// Look up a track by id.
    pub fn track(&self, id: usize) -> Option<&TrackInfo> {
        self.tracks.iter().find(|t| t.id == id)
    }

    /// Resolve a track selector to an audio track.
    ///
    /// `None` selects the first audio track. Returns `None` when the id does
    /// not exist or is not an audio track.
    pub fn resolve_audio_track(&self, selector: Option<usize>) -> Option<&TrackInfo> {
        match selector {
            Some(id) => self.track(id).filter(|t| t.is_audio()),
            None => self.audio_tracks().next(),
        }
    }

    /// File stem used to name derived files.
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "media".to_string())
    }
}

/// Codec ID to friendly name mapping (mkvmerge ids and ffprobe names).
const CODEC_NAME_MAP: &[(&str, &str)] = &[
    ("A_AC3", "AC-3"),
    ("A_EAC3", "E-AC3 / DD+"),
    ("A_DTS", "DTS"),
    ("A_TRUEHD", "TrueHD"),
    ("A_FLAC", "FLAC"),
    ("A_AAC", "AAC"),
    ("A_OPUS", "Opus"),
    ("A_VORBIS", "Vorbis"),
    ("A_PCM", "PCM"),
    ("A_MPEG/L3", "MP3"),
    ("ac3", "AC-3"),
    ("eac3", "E-AC3 / DD+"),
    ("dts", "DTS"),
    ("truehd", "TrueHD"),
    ("flac", "FLAC"),
    ("aac", "AAC"),
    ("opus", "Opus"),
    ("vorbis", "Vorbis"),
    ("pcm_", "PCM"),
    ("mp3", "MP3"),
];

/// Friendly codec name for display.
pub fn friendly_codec_name(codec: &str) -> String {
    CODEC_NAME_MAP
        .iter()
        .find(|(id, _)| codec.starts_with(id))
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| codec.to_string())
}
