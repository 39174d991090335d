//! Subcommand implementations.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use tracksync_core::config::{ConfigManager, ConfigSection, Settings};
use tracksync_core::engine::{EngineConfig, EngineState, SyncEngine};
use tracksync_core::extraction::{extract_audio_track, FfmpegExtractor};
use tracksync_core::logging::{LogConfig, RunLogger};
use tracksync_core::mux::{MkvmergeMuxer, Muxer};
use tracksync_core::probe::{MediaProber, ToolProber};
use tracksync_core::tools::{Tool, ToolRegistry};
use tracksync_core::{SyncResult, SyncStatus};

/// Loaded settings plus the discovered tools.
pub struct Context {
    config: ConfigManager,
    registry: ToolRegistry,
}

impl Context {
    pub fn new(config: ConfigManager) -> Self {
        let registry = ToolRegistry::discover(&config.settings().tools);
        Self { config, registry }
    }

    fn settings(&self) -> &Settings {
        self.config.settings()
    }

    fn prober(&self) -> ToolProber {
        ToolProber::new(self.registry.clone())
    }

    fn run_logger(&self, run_name: &str) -> Result<Arc<RunLogger>> {
        let settings = self.settings();
        let logger = RunLogger::new(
            run_name,
            &settings.paths.logs_folder,
            LogConfig::from_settings(&settings.logging),
            None,
        )
        .with_context(|| format!("Failed to create run log in {}", settings.paths.logs_folder))?;
        tracing::debug!("Run log: {}", logger.log_path().display());
        Ok(Arc::new(logger))
    }

    fn engine(
        &self,
        seed: Option<u64>,
        parallel: bool,
        logger: Arc<RunLogger>,
        show_progress: bool,
    ) -> SyncEngine<ToolProber, FfmpegExtractor> {
        let settings = self.settings();
        let mut config = EngineConfig::from_settings(settings).with_seed(seed.or(settings.sampling.seed));
        config.parallel_windows |= parallel;

        let extractor = FfmpegExtractor::new(self.registry.clone(), &settings.paths.temp_root);
        let mut engine = SyncEngine::new(self.prober(), extractor, config).with_logger(logger);
        if show_progress {
            engine = engine.with_state_callback(Box::new(|state: EngineState| {
                if let EngineState::Correlating { .. } = state {
                    eprintln!("  {}", state);
                }
            }));
        }
        engine
    }

    pub fn tracks(&self, file: &Path, json: bool) -> Result<()> {
        let media = self.prober().probe(file)?;

        if json {
            println!("{}", serde_json::to_string_pretty(&media)?);
            return Ok(());
        }

        println!("File: {}", media.path().display());
        println!("Container: {}", media.container());
        println!("Duration: {}", format_duration(media.duration_secs()));
        println!("\nTracks: {}", media.tracks().len());
        for track in media.tracks() {
            println!("  {:<9} {}", track.track_type.to_string(), track.describe());
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn offset(
        &self,
        reference: &Path,
        source: &Path,
        reference_track: Option<usize>,
        source_track: Option<usize>,
        seed: Option<u64>,
        parallel: bool,
        json: bool,
    ) -> Result<()> {
        self.config.ensure_dirs_exist()?;
        let logger = self.run_logger(&run_name("offset", reference, source))?;
        let engine = self.engine(seed, parallel, Arc::clone(&logger), !json);

        let result = engine.estimate_offset(reference, source, reference_track, source_track)?;

        if json {
            let report = serde_json::json!({
                "reference": reference,
                "source": source,
                "result": result,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_result(reference, source, &result);
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn mux(
        &self,
        reference: &Path,
        source: &Path,
        reference_track: Option<usize>,
        source_track: Option<usize>,
        offset: Option<i64>,
        seed: Option<u64>,
        force: bool,
        output_dir: Option<PathBuf>,
    ) -> Result<()> {
        self.config.ensure_dirs_exist()?;
        let logger = self.run_logger(&run_name("mux", reference, source))?;

        let delay_ms = match offset {
            Some(ms) => -ms,
            None => {
                let engine = self.engine(seed, false, Arc::clone(&logger), true);
                let result =
                    engine.estimate_offset(reference, source, reference_track, source_track)?;
                print_result(reference, source, &result);
                muxable_delay(&result, force)?
            }
        };

        let source_media = self.prober().probe(source)?;
        let track = source_media
            .resolve_audio_track(source_track)
            .with_context(|| match source_track {
                Some(id) => format!("{} has no audio track {}", source.display(), id),
                None => format!("{} has no audio track", source.display()),
            })?;

        let output_dir =
            output_dir.unwrap_or_else(|| PathBuf::from(&self.settings().paths.output_folder));
        println!(
            "\nMuxing {} track {} with a {:+} ms delay...",
            source.display(),
            track.id,
            delay_ms
        );

        let muxer = MkvmergeMuxer::new(self.registry.clone()).with_logger(logger);
        let output = muxer.mux(reference, source, track.id, delay_ms, &output_dir)?;
        println!("Output: {}", output.display());
        Ok(())
    }

    pub fn extract(&self, file: &Path, track: Option<usize>, output_dir: Option<PathBuf>) -> Result<()> {
        let media = self.prober().probe(file)?;
        let output_dir =
            output_dir.unwrap_or_else(|| PathBuf::from(&self.settings().paths.output_folder));

        let output = extract_audio_track(&self.registry, &media, track, &output_dir)?;
        println!("Extracted: {}", output.display());
        Ok(())
    }

    pub fn check_tools(&self, json: bool) -> Result<()> {
        let tools = self.registry.check_all();

        if json {
            println!("{}", serde_json::to_string_pretty(&tools)?);
            return Ok(());
        }

        println!("Checking external tools...\n");
        let mut all_ok = true;

        for info in &tools {
            let status = if info.available {
                "✓"
            } else {
                all_ok = false;
                "✗"
            };

            print!("{} {}", status, info.tool);

            if let Some(ref version) = info.version {
                print!(" ({})", version);
            }

            if let Some(ref path) = info.path {
                print!(" - {}", path.display());
            }

            println!();
        }

        println!();
        if all_ok {
            println!("All required tools are available!");
        } else {
            println!("Some tools are missing. Install them or set their paths in [tools].");
        }

        Ok(())
    }

    /// Print the settings after storing any tool paths in `[tools]`.
    pub fn config(&mut self, tool_paths: Vec<(Tool, Option<String>)>) -> Result<()> {
        if !tool_paths.is_empty() {
            store_tool_paths(&mut self.config, tool_paths)?;
            self.registry = ToolRegistry::discover(&self.settings().tools);
        }

        println!("# {}", self.config.path().display());
        print!("{}", toml::to_string_pretty(self.settings())?);
        Ok(())
    }
}

fn store_tool_paths(config: &mut ConfigManager, tool_paths: Vec<(Tool, Option<String>)>) -> Result<()> {
    for (tool, path) in tool_paths {
        match &path {
            Some(p) => tracing::info!("Using {} for {}", p, tool),
            None => tracing::info!("Looking up {} on PATH", tool),
        }
        tool.set_override(&mut config.settings_mut().tools, path);
    }
    config
        .update_section(ConfigSection::Tools)
        .with_context(|| format!("Failed to update {}", config.path().display()))
}

/// mkvmerge delay for an estimate, refusing anything but `Aligned` unless forced.
fn muxable_delay(result: &SyncResult, force: bool) -> Result<i64> {
    match result.status {
        SyncStatus::Aligned => {}
        SyncStatus::Warped if force => {
            tracing::warn!("Muxing a warped estimate because --force was given");
        }
        SyncStatus::Warped => bail!(
            "Offsets disagree between windows ({}); use --force to mux the median anyway",
            result
        ),
        SyncStatus::Indeterminate => bail!("Cannot mux: {}", result),
    }
    result
        .mux_delay_ms()
        .context("Estimate has no median offset")
}

fn print_result(reference: &Path, source: &Path, result: &SyncResult) {
    println!("Reference: {}", reference.display());
    println!("Source:    {}", source.display());
    println!("\nStatus: {}", result.status);

    if let (Some(median), Some(std_dev)) = (result.median_ms, result.std_dev_ms) {
        println!("Offset: {:+.1} ms (std dev {:.1} ms)", median, std_dev);
    }
    if let Some(ref reason) = result.indeterminate_reason {
        println!("Reason: {}", reason);
    }

    if !result.offsets.is_empty() {
        println!("\nWindows: {}", result.offsets.len());
        for sample in &result.offsets {
            println!(
                "  [{}] {:>9.1}s +{:>2}s  {:+.1} ms",
                sample.window.index,
                sample.window.start_secs,
                sample.window.length_secs,
                sample.offset_ms
            );
        }
    }
}

fn run_name(kind: &str, reference: &Path, source: &Path) -> String {
    format!("{}_{}_vs_{}", kind, file_stem(reference), file_stem(source))
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "input".to_string())
}

fn format_duration(secs: f64) -> String {
    let total_ms = (secs * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let s = total_ms / 1000;
    format!("{:02}:{:02}:{:02}.{:03}", s / 3600, (s / 60) % 60, s % 60, ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracksync_core::models::{IndeterminateReason, OffsetSample, SampleWindow};

    fn result(status: SyncStatus, median: Option<f64>) -> SyncResult {
        let offsets = (0..5)
            .map(|index| OffsetSample {
                window: SampleWindow {
                    index,
                    start_secs: index as f64 * 100.0,
                    length_secs: 30,
                },
                offset_ms: median.unwrap_or(0.0),
            })
            .collect();
        SyncResult {
            offsets,
            median_ms: median,
            std_dev_ms: median.map(|_| 0.0),
            status,
            indeterminate_reason: None,
        }
    }

    #[test]
    fn aligned_delay_opposes_offset() {
        let early = result(SyncStatus::Aligned, Some(-120.6));
        assert_eq!(muxable_delay(&early, false).unwrap(), 121);

        let late = result(SyncStatus::Aligned, Some(250.0));
        assert_eq!(muxable_delay(&late, false).unwrap(), -250);
    }

    #[test]
    fn warped_needs_force() {
        let r = result(SyncStatus::Warped, Some(300.2));
        assert!(muxable_delay(&r, false).is_err());
        assert_eq!(muxable_delay(&r, true).unwrap(), -300);
    }

    #[test]
    fn indeterminate_never_muxes() {
        let r = SyncResult::indeterminate(Vec::new(), IndeterminateReason::TooFewSamples { got: 2 });
        assert!(muxable_delay(&r, true).is_err());
    }

    #[test]
    fn tool_paths_rewrite_only_tools_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracksync.toml");
        let mut config = ConfigManager::new(&path);
        config.load_or_create().unwrap();
        config.settings_mut().analysis.warp_threshold_ms = 55.0;

        store_tool_paths(
            &mut config,
            vec![(Tool::Mkvmerge, Some("/opt/mkvtoolnix/mkvmerge".to_string()))],
        )
        .unwrap();

        let mut reloaded = ConfigManager::new(&path);
        reloaded.load().unwrap();
        assert_eq!(
            reloaded.settings().tools.mkvmerge_path.as_deref(),
            Some("/opt/mkvtoolnix/mkvmerge")
        );
        assert_ne!(reloaded.settings().analysis.warp_threshold_ms, 55.0);
    }

    #[test]
    fn run_name_uses_stems() {
        assert_eq!(
            run_name("offset", Path::new("/m/movie.mkv"), Path::new("/n/rerelease.mka")),
            "offset_movie_vs_rerelease"
        );
    }

    #[test]
    fn formats_duration() {
        assert_eq!(format_duration(3725.5), "01:02:05.500");
        assert_eq!(format_duration(0.0), "00:00:00.000");
    }
}
