//! Window extraction with ffmpeg.
//!
//! Each window is decoded into a temporary raw `f64le` file: seeked, mapped
//! to one audio track, downmixed to mono without the centre channel and
//! resampled to the analysis rate.

use std::fs;
use std::path::{Path, PathBuf};

use super::{ExtractionError, SegmentExtractor};
use crate::models::{MediaHandle, SampleWindow, TrackInfo, WaveformSegment};
use crate::tools::{Tool, ToolRegistry};

/// Channels of the ffmpeg standard layouts, in ffmpeg order.
const NAMED_LAYOUTS: &[(&str, &[&str])] = &[
    ("mono", &["FC"]),
    ("stereo", &["FL", "FR"]),
    ("2.1", &["FL", "FR", "LFE"]),
    ("3.0", &["FL", "FR", "FC"]),
    ("3.0(back)", &["FL", "FR", "BC"]),
    ("4.0", &["FL", "FR", "FC", "BC"]),
    ("quad", &["FL", "FR", "BL", "BR"]),
    ("quad(side)", &["FL", "FR", "SL", "SR"]),
    ("3.1", &["FL", "FR", "FC", "LFE"]),
    ("5.0", &["FL", "FR", "FC", "BL", "BR"]),
    ("5.0(side)", &["FL", "FR", "FC", "SL", "SR"]),
    ("4.1", &["FL", "FR", "FC", "LFE", "BC"]),
    ("5.1", &["FL", "FR", "FC", "LFE", "BL", "BR"]),
    ("5.1(side)", &["FL", "FR", "FC", "LFE", "SL", "SR"]),
    ("6.0", &["FL", "FR", "FC", "BC", "SL", "SR"]),
    ("6.0(front)", &["FL", "FR", "FLC", "FRC", "SL", "SR"]),
    ("hexagonal", &["FL", "FR", "FC", "BL", "BR", "BC"]),
    ("6.1", &["FL", "FR", "FC", "LFE", "BC", "SL", "SR"]),
    ("6.1(back)", &["FL", "FR", "FC", "LFE", "BL", "BR", "BC"]),
    ("6.1(front)", &["FL", "FR", "LFE", "FLC", "FRC", "SL", "SR"]),
    ("7.0", &["FL", "FR", "FC", "BL", "BR", "SL", "SR"]),
    ("7.0(front)", &["FL", "FR", "FC", "FLC", "FRC", "SL", "SR"]),
    ("7.1", &["FL", "FR", "FC", "LFE", "BL", "BR", "SL", "SR"]),
    ("7.1(wide)", &["FL", "FR", "FC", "LFE", "BL", "BR", "FLC", "FRC"]),
    ("7.1(wide-side)", &["FL", "FR", "FC", "LFE", "FLC", "FRC", "SL", "SR"]),
];

/// Channel names of an ffmpeg layout description.
///
/// Accepts the standard layout names and explicit `FL+FR+...` lists.
pub fn layout_channels(layout: &str) -> Option<Vec<String>> {
    let layout = layout.trim();
    if let Some((_, channels)) = NAMED_LAYOUTS.iter().find(|(name, _)| *name == layout) {
        return Some(channels.iter().map(|c| c.to_string()).collect());
    }
    if layout.contains('+') {
        let channels: Vec<String> = layout
            .split('+')
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        return (!channels.is_empty()).then_some(channels);
    }
    None
}

/// Pan expression summing every channel except front-centre.
///
/// With a known layout the sum covers exactly the channels present. Without
/// one the channel count decides: 2 is stereo, 8 is 7.1 and anything else
/// is treated as 5.1(side). `None` for single-channel input, which needs no
/// downmix.
pub fn non_center_pan_filter(channels: Option<u8>, layout: Option<&str>) -> Option<String> {
    let names = match layout.and_then(layout_channels) {
        Some(names) => names,
        None => {
            let fallback = match channels {
                Some(1) => return None,
                Some(2) => "stereo",
                Some(8) => "7.1",
                _ => "5.1(side)",
            };
            layout_channels(fallback)?
        }
    };
    if names.len() < 2 {
        return None;
    }

    let kept: Vec<&str> = names
        .iter()
        .map(String::as_str)
        .filter(|c| *c != "FC")
        .collect();
    Some(format!("pan=mono|c0={}", kept.join("+")))
}

/// Decode little-endian f64 samples. Trailing partial samples are an error.
pub fn bytes_to_f64_samples(bytes: &[u8]) -> Result<Vec<f64>, ExtractionError> {
    if bytes.len() % 8 != 0 {
        return Err(ExtractionError::MalformedOutput { bytes: bytes.len() });
    }
    Ok(bytes
        .chunks_exact(8)
        .map(|chunk| {
            let mut arr = [0u8; 8];
            arr.copy_from_slice(chunk);
            f64::from_le_bytes(arr)
        })
        .collect())
}

/// `SegmentExtractor` backed by ffmpeg.
#[derive(Debug, Clone)]
pub struct FfmpegExtractor {
    registry: ToolRegistry,
    temp_root: PathBuf,
}

impl FfmpegExtractor {
    /// Temporary files are created under `temp_root`.
    pub fn new(registry: ToolRegistry, temp_root: impl Into<PathBuf>) -> Self {
        Self {
            registry,
            temp_root: temp_root.into(),
        }
    }

    pub fn temp_root(&self) -> &Path {
        &self.temp_root
    }

    /// ffmpeg arguments for one window, writing to `output`.
    pub fn build_args(
        input: &Path,
        track: &TrackInfo,
        window: &SampleWindow,
        sample_rate: u32,
        output: &Path,
    ) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-nostdin".into(),
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-ss".into(),
            format!("{:.3}", window.start_secs),
            "-i".into(),
            input.to_string_lossy().into_owned(),
            "-map".into(),
            format!("0:{}", track.id),
            "-t".into(),
            window.length_secs.to_string(),
            "-vn".into(),
        ];

        if let Some(pan) = non_center_pan_filter(track.channels, track.channel_layout.as_deref()) {
            args.push("-af".into());
            args.push(pan);
        }

        args.extend([
            "-ac".to_string(),
            "1".to_string(),
            "-ar".to_string(),
            sample_rate.to_string(),
            "-c:a".to_string(),
            "pcm_f64le".to_string(),
            "-f".to_string(),
            "f64le".to_string(),
            "-y".to_string(),
            output.to_string_lossy().into_owned(),
        ]);
        args
    }
}

impl SegmentExtractor for FfmpegExtractor {
    fn extract(
        &self,
        media: &MediaHandle,
        track: Option<usize>,
        window: &SampleWindow,
        sample_rate: u32,
    ) -> Result<WaveformSegment, ExtractionError> {
        let track_info = resolve_track(media, track)?;

        fs::create_dir_all(&self.temp_root)?;
        let temp = tempfile::Builder::new()
            .prefix(&format!("{}_w{:02}_", media.stem(), window.index))
            .suffix(".f64")
            .tempfile_in(&self.temp_root)?
            .into_temp_path();

        let mut cmd = self.registry.command(Tool::Ffmpeg)?;
        cmd.args(Self::build_args(
            media.path(),
            track_info,
            window,
            sample_rate,
            &temp,
        ));
        cmd.execute()?;

        let bytes = fs::read(&temp)?;
        let samples = bytes_to_f64_samples(&bytes)?;
        if samples.is_empty() {
            return Err(ExtractionError::EmptyOutput {
                path: media.path().to_path_buf(),
                window: window.index,
            });
        }

        tracing::trace!(
            "Window {}: {} samples ({:.2}s) from {}",
            window.index,
            samples.len(),
            samples.len() as f64 / sample_rate as f64,
            media.path().display()
        );

        Ok(WaveformSegment::new(samples, sample_rate, *window).with_backing(temp))
    }
}

/// Audio track for a selector, with a precise error when it does not resolve.
pub fn resolve_track(
    media: &MediaHandle,
    track: Option<usize>,
) -> Result<&TrackInfo, ExtractionError> {
    media
        .resolve_audio_track(track)
        .ok_or_else(|| match track {
            Some(id) => ExtractionError::TrackNotFound {
                path: media.path().to_path_buf(),
                track: id,
            },
            None => ExtractionError::NoAudioTrack(media.path().to_path_buf()),
        })
}
