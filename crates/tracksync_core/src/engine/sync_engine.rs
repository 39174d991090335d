//! Offset estimation for one (reference, source) pair.

use std::path::Path;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;

use super::errors::{Side, SyncError};
use super::state::{EngineState, StateCallback};
use crate::analysis::{aggregate, Correlator, SamplerConfig, TimestampSampler};
use crate::config::Settings;
use crate::extraction::SegmentExtractor;
use crate::logging::RunLogger;
use crate::models::{
    IndeterminateReason, MediaHandle, OffsetSample, SampleWindow, SyncResult,
};
use crate::probe::MediaProber;

/// Engine parameters, usually taken from `Settings`.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub sampler: SamplerConfig,
    pub sample_rate: u32,
    pub warp_threshold_ms: f64,
    pub max_duration_diff_secs: f64,
    pub parallel_windows: bool,
    /// 0 lets rayon pick.
    pub worker_threads: usize,
    /// Entropy when unset.
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl EngineConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            sampler: SamplerConfig::from_settings(&settings.sampling),
            sample_rate: settings.analysis.sample_rate,
            warp_threshold_ms: settings.analysis.warp_threshold_ms,
            max_duration_diff_secs: settings.analysis.max_duration_diff_secs,
            parallel_windows: settings.analysis.parallel_windows,
            worker_threads: settings.analysis.worker_threads,
            seed: settings.sampling.seed,
        }
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Reject parameters the engine cannot run with.
    pub fn validate(&self) -> Result<(), SyncError> {
        self.sampler.validate()?;
        if self.sample_rate == 0 {
            return Err(SyncError::InvalidConfig(
                "sample_rate must be positive".to_string(),
            ));
        }
        if !(self.warp_threshold_ms > 0.0) {
            return Err(SyncError::InvalidConfig(
                "warp_threshold_ms must be positive".to_string(),
            ));
        }
        if !(self.max_duration_diff_secs > 0.0) {
            return Err(SyncError::InvalidConfig(
                "max_duration_diff_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Probes, samples, extracts, correlates and aggregates.
pub struct SyncEngine<P, E> {
    prober: P,
    extractor: E,
    config: EngineConfig,
    correlator: Correlator,
    logger: Option<Arc<RunLogger>>,
    state_callback: Option<StateCallback>,
}

impl<P, E> SyncEngine<P, E>
where
    P: MediaProber,
    E: SegmentExtractor,
{
    pub fn new(prober: P, extractor: E, config: EngineConfig) -> Self {
        Self {
            prober,
            extractor,
            config,
            correlator: Correlator::new(),
            logger: None,
            state_callback: None,
        }
    }

    /// Mirror progress into a run log.
    pub fn with_logger(mut self, logger: Arc<RunLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Report every state transition.
    pub fn with_state_callback(mut self, callback: StateCallback) -> Self {
        self.state_callback = Some(callback);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Probe one input.
    pub fn probe(&self, path: &Path) -> Result<MediaHandle, SyncError> {
        self.probe_side(path, Side::Reference)
    }

    fn probe_side(&self, path: &Path, side: Side) -> Result<MediaHandle, SyncError> {
        self.prober.probe(path).map_err(|source| SyncError::Probe {
            side,
            path: path.to_path_buf(),
            source,
        })
    }

    /// Estimate the offset of `source` relative to `reference`.
    ///
    /// Track selectors pick audio track ids; `None` is the first audio track.
    pub fn estimate_offset(
        &self,
        reference: &Path,
        source: &Path,
        reference_track: Option<usize>,
        source_track: Option<usize>,
    ) -> Result<SyncResult, SyncError> {
        self.transition(EngineState::Init);
        let reference = self.probe_side(reference, Side::Reference)?;
        let source = self.probe_side(source, Side::Source)?;
        self.estimate_probed(&reference, &source, reference_track, source_track)
    }

    /// Estimate from already probed inputs, seeding from the config.
    pub fn estimate_probed(
        &self,
        reference: &MediaHandle,
        source: &MediaHandle,
        reference_track: Option<usize>,
        source_track: Option<usize>,
    ) -> Result<SyncResult, SyncError> {
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        self.estimate_with_rng(reference, source, reference_track, source_track, &mut rng)
    }

    /// Estimate with an explicit random source for window placement.
    pub fn estimate_with_rng(
        &self,
        reference: &MediaHandle,
        source: &MediaHandle,
        reference_track: Option<usize>,
        source_track: Option<usize>,
        rng: &mut StdRng,
    ) -> Result<SyncResult, SyncError> {
        if let Err(e) = self.config.validate() {
            self.error(&e.to_string());
            self.transition(EngineState::Aborted);
            return Err(e);
        }

        let ref_secs = reference.duration_secs();
        let src_secs = source.duration_secs();
        let difference = (ref_secs - src_secs).abs();

        self.info(&format!(
            "Reference {:.1}s, source {:.1}s (difference {:.1}s)",
            ref_secs, src_secs, difference
        ));

        self.transition(EngineState::DurationChecked);
        if difference > self.config.max_duration_diff_secs {
            let reason = IndeterminateReason::DurationMismatch {
                reference_secs: ref_secs,
                source_secs: src_secs,
                difference_secs: difference,
            };
            self.warn(&format!("Not estimating: {}", reason));
            self.transition(EngineState::Aborted);
            return Ok(SyncResult::indeterminate(Vec::new(), reason));
        }

        self.transition(EngineState::Sampling);
        let sampler = TimestampSampler::new(self.config.sampler);
        let windows = match sampler.sample(ref_secs.min(src_secs), rng) {
            Ok(windows) => windows,
            Err(e) => {
                self.transition(EngineState::Aborted);
                return Err(e.into());
            }
        };

        self.info(&format!(
            "{} windows: {}",
            windows.len(),
            windows
                .iter()
                .map(|w| format!("{:.0}s+{}s", w.start_secs, w.length_secs))
                .collect::<Vec<_>>()
                .join(", ")
        ));

        let offsets =
            match self.measure_windows(reference, source, reference_track, source_track, &windows) {
                Ok(offsets) => offsets,
                Err(e) => {
                    self.error(&e.to_string());
                    self.transition(EngineState::Aborted);
                    return Err(e);
                }
            };

        self.transition(EngineState::Aggregating);
        let result = aggregate(offsets, self.config.warp_threshold_ms);
        self.transition(EngineState::Done);

        if result.is_aligned() {
            self.success(&result.to_string());
        } else {
            self.warn(&result.to_string());
        }
        Ok(result)
    }

    fn measure_windows(
        &self,
        reference: &MediaHandle,
        source: &MediaHandle,
        reference_track: Option<usize>,
        source_track: Option<usize>,
        windows: &[SampleWindow],
    ) -> Result<Vec<OffsetSample>, SyncError> {
        let total = windows.len();
        let measure = |window: &SampleWindow| {
            self.measure_window(reference, source, reference_track, source_track, window, total)
        };

        if !self.config.parallel_windows {
            return windows.iter().map(measure).collect();
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.worker_threads)
            .build()
            .map_err(|e| SyncError::WorkerPool(e.to_string()))?;

        // Indexed collect keeps window order; the first error stops the rest.
        pool.install(|| windows.par_iter().map(measure).collect())
    }

    /// Extract both sides, correlate and release the segments.
    fn measure_window(
        &self,
        reference: &MediaHandle,
        source: &MediaHandle,
        reference_track: Option<usize>,
        source_track: Option<usize>,
        window: &SampleWindow,
        total: usize,
    ) -> Result<OffsetSample, SyncError> {
        self.transition(EngineState::Correlating {
            window: window.index,
            total,
        });

        let sample_rate = self.config.sample_rate;
        let reference_segment = self
            .extractor
            .extract(reference, reference_track, window, sample_rate)
            .map_err(|source| SyncError::Extraction {
                window_index: window.index,
                side: Side::Reference,
                source,
            })?;
        let source_segment = self
            .extractor
            .extract(source, source_track, window, sample_rate)
            .map_err(|source| SyncError::Extraction {
                window_index: window.index,
                side: Side::Source,
                source,
            })?;

        let offset_ms = self
            .correlator
            .offset_ms(&reference_segment, &source_segment)
            .map_err(|source| SyncError::Correlation {
                window_index: window.index,
                source,
            })?;

        self.debug(&format!(
            "Window {} at {:.1}s ({}s): {:+.1}ms",
            window.index, window.start_secs, window.length_secs, offset_ms
        ));

        Ok(OffsetSample {
            window: *window,
            offset_ms,
        })
    }

    fn transition(&self, state: EngineState) {
        tracing::debug!("Engine state: {}", state);
        match state {
            EngineState::Sampling | EngineState::Aggregating => {
                if let Some(logger) = &self.logger {
                    logger.phase(&state.to_string());
                }
            }
            EngineState::Correlating { .. } => {
                if let Some(logger) = &self.logger {
                    logger.debug(&state.to_string());
                }
            }
            _ => {}
        }
        if let Some(callback) = &self.state_callback {
            callback(state);
        }
    }

    fn info(&self, message: &str) {
        tracing::info!("{}", message);
        if let Some(logger) = &self.logger {
            logger.info(message);
        }
    }

    fn debug(&self, message: &str) {
        tracing::debug!("{}", message);
        if let Some(logger) = &self.logger {
            logger.debug(message);
        }
    }

    fn success(&self, message: &str) {
        tracing::info!("{}", message);
        if let Some(logger) = &self.logger {
            logger.success(message);
        }
    }

    fn warn(&self, message: &str) {
        tracing::warn!("{}", message);
        if let Some(logger) = &self.logger {
            logger.warn(message);
        }
    }

    fn error(&self, message: &str) {
        tracing::error!("{}", message);
        if let Some(logger) = &self.logger {
            logger.error(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::ExtractionError;
    use crate::models::{SyncStatus, TrackInfo, WaveformSegment};
    use crate::probe::ProbeError;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    const SR: u32 = 1000;

    /// Deterministic noise at an absolute sample position.
    fn program(position: i64) -> f64 {
        let mut z = (position as u64).wrapping_add(0x9E37_79B9_7F4A_7C15);
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^= z >> 31;
        (z as f64 / u64::MAX as f64) * 2.0 - 1.0
    }

    struct MockProber {
        handles: HashMap<PathBuf, MediaHandle>,
    }

    impl MockProber {
        fn new(durations: &[(&str, f64)]) -> Self {
            let handles = durations
                .iter()
                .map(|(path, secs)| {
                    let handle = MediaHandle::new(
                        *path,
                        *secs,
                        "Matroska",
                        vec![TrackInfo::audio(1, "A_AC3").with_channels(6)],
                    );
                    (PathBuf::from(path), handle)
                })
                .collect();
            Self { handles }
        }
    }

    impl MediaProber for MockProber {
        fn probe(&self, path: &Path) -> Result<MediaHandle, ProbeError> {
            self.handles
                .get(path)
                .cloned()
                .ok_or_else(|| ProbeError::FileNotFound(path.to_path_buf()))
        }
    }

    type DelayFn = Box<dyn Fn(&SampleWindow) -> f64 + Send + Sync>;

    /// Cuts windows out of `program`; "source" inputs are delayed by `delay_ms`.
    struct SyntheticExtractor {
        delay_ms: DelayFn,
        calls: AtomicUsize,
        fail_on_call: Option<usize>,
        temp_dir: TempDir,
    }

    impl SyntheticExtractor {
        fn constant(delay_ms: f64) -> Self {
            Self::with_delay(Box::new(move |_: &SampleWindow| delay_ms))
        }

        fn with_delay(delay_ms: DelayFn) -> Self {
            Self {
                delay_ms,
                calls: AtomicUsize::new(0),
                fail_on_call: None,
                temp_dir: tempfile::tempdir().unwrap(),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn leftover_files(&self) -> usize {
            std::fs::read_dir(self.temp_dir.path()).unwrap().count()
        }
    }

    impl SegmentExtractor for SyntheticExtractor {
        fn extract(
            &self,
            media: &MediaHandle,
            _track: Option<usize>,
            window: &SampleWindow,
            sample_rate: u32,
        ) -> Result<WaveformSegment, ExtractionError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_on_call == Some(call) {
                return Err(ExtractionError::EmptyOutput {
                    path: media.path().to_path_buf(),
                    window: window.index,
                });
            }

            let is_source = media.stem() == "source";
            let delay_samples = if is_source {
                ((self.delay_ms)(window) * sample_rate as f64 / 1000.0).round() as i64
            } else {
                0
            };
            let start = (window.start_secs * sample_rate as f64).round() as i64;
            let len = window.length_secs as i64 * sample_rate as i64;
            let samples = (0..len).map(|n| program(start + n - delay_samples)).collect();

            let backing = tempfile::NamedTempFile::new_in(self.temp_dir.path())?.into_temp_path();
            Ok(WaveformSegment::new(samples, sample_rate, *window).with_backing(backing))
        }
    }

    fn config(samples: usize) -> EngineConfig {
        EngineConfig {
            sampler: SamplerConfig {
                min_samples: samples,
                max_samples: samples,
                min_window_secs: 20,
                max_window_secs: 30,
            },
            sample_rate: SR,
            warp_threshold_ms: 100.0,
            max_duration_diff_secs: 900.0,
            parallel_windows: false,
            worker_threads: 0,
            seed: Some(7),
        }
    }

    fn engine(
        ref_secs: f64,
        src_secs: f64,
        extractor: SyntheticExtractor,
        config: EngineConfig,
    ) -> SyncEngine<MockProber, SyntheticExtractor> {
        let prober = MockProber::new(&[("/m/reference.mkv", ref_secs), ("/m/source.mkv", src_secs)]);
        SyncEngine::new(prober, extractor, config)
    }

    fn run(engine: &SyncEngine<MockProber, SyntheticExtractor>) -> Result<SyncResult, SyncError> {
        engine.estimate_offset(
            Path::new("/m/reference.mkv"),
            Path::new("/m/source.mkv"),
            None,
            None,
        )
    }

    #[test]
    fn constant_delay_is_aligned() {
        let engine = engine(7200.0, 7200.0, SyntheticExtractor::constant(250.0), config(6));
        let result = run(&engine).unwrap();

        assert_eq!(result.status, SyncStatus::Aligned);
        assert_eq!(result.offsets.len(), 6);
        assert!((result.median_ms.unwrap() - 250.0).abs() <= 1.0);
        assert!(result.std_dev_ms.unwrap() < 5.0);
        assert_eq!(result.rounded_offset_ms(), Some(250));
        assert_eq!(engine.extractor.calls(), 12);
    }

    #[test]
    fn negative_delay() {
        let engine = engine(3600.0, 3610.0, SyntheticExtractor::constant(-1500.0), config(5));
        let result = run(&engine).unwrap();
        assert_eq!(result.status, SyncStatus::Aligned);
        assert_eq!(result.median_ms, Some(-1500.0));
    }

    #[test]
    fn duration_mismatch_skips_extraction() {
        let engine = engine(5400.0, 9300.0, SyntheticExtractor::constant(0.0), config(6));
        let result = run(&engine).unwrap();

        assert_eq!(result.status, SyncStatus::Indeterminate);
        assert!(matches!(
            result.indeterminate_reason,
            Some(IndeterminateReason::DurationMismatch { difference_secs, .. }) if difference_secs == 3900.0
        ));
        assert!(result.offsets.is_empty());
        assert_eq!(engine.extractor.calls(), 0);
    }

    #[test]
    fn too_short_input_fails_without_extraction() {
        let engine = engine(25.0, 28.0, SyntheticExtractor::constant(0.0), config(6));
        let err = run(&engine).unwrap_err();

        assert!(matches!(
            err,
            SyncError::InsufficientDuration { shorter_secs, required_secs }
                if shorter_secs == 25.0 && required_secs == 30.0
        ));
        assert_eq!(engine.extractor.calls(), 0);
    }

    #[test]
    fn invalid_bounds_fail_without_extraction() {
        let mut bad = config(6);
        bad.sampler.max_samples = 3;
        let inverted = engine(7200.0, 7200.0, SyntheticExtractor::constant(0.0), bad);

        assert!(matches!(run(&inverted), Err(SyncError::InvalidConfig(_))));
        assert_eq!(inverted.extractor.calls(), 0);

        let mut silent = config(6);
        silent.sample_rate = 0;
        let zero_rate = engine(7200.0, 7200.0, SyntheticExtractor::constant(0.0), silent);
        assert!(matches!(run(&zero_rate), Err(SyncError::InvalidConfig(_))));
        assert_eq!(zero_rate.extractor.calls(), 0);
    }

    #[test]
    fn late_source_gets_negative_mux_delay() {
        let engine = engine(7200.0, 7200.0, SyntheticExtractor::constant(250.0), config(6));
        let result = run(&engine).unwrap();
        let delay_ms = result.mux_delay_ms().unwrap();
        assert_eq!(delay_ms, -250);

        let plan = crate::mux::MuxPlan {
            reference: PathBuf::from("/m/reference.mkv"),
            source: PathBuf::from("/m/source.mkv"),
            source_track_id: 1,
            delay_ms,
            output: PathBuf::from("/out/reference.synced.mkv"),
        };
        let tokens = plan.tokens();
        assert!(tokens.ends_with(&[
            "--sync".to_string(),
            "1:-250".to_string(),
            "/m/source.mkv".to_string(),
        ]));
    }

    #[test]
    fn fixed_seed_is_reproducible() {
        let a = run(&engine(7200.0, 7200.0, SyntheticExtractor::constant(40.0), config(6))).unwrap();
        let b = run(&engine(7200.0, 7200.0, SyntheticExtractor::constant(40.0), config(6))).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn parallel_matches_sequential() {
        let mut sampler_config = config(0);
        sampler_config.sampler.min_samples = 5;
        sampler_config.sampler.max_samples = 8;
        let mut parallel_config = sampler_config.clone();
        parallel_config.parallel_windows = true;
        parallel_config.worker_threads = 3;

        let sequential =
            run(&engine(4000.0, 4000.0, SyntheticExtractor::constant(-75.0), sampler_config))
                .unwrap();
        let parallel =
            run(&engine(4000.0, 4000.0, SyntheticExtractor::constant(-75.0), parallel_config))
                .unwrap();

        assert_eq!(sequential, parallel);
        let indices: Vec<usize> = parallel.offsets.iter().map(|o| o.window.index).collect();
        let expected: Vec<usize> = (0..parallel.offsets.len()).collect();
        assert_eq!(indices, expected);
    }

    #[test]
    fn drifting_offsets_are_warped() {
        let extractor = SyntheticExtractor::with_delay(Box::new(|w: &SampleWindow| w.index as f64 * 800.0));
        let engine = engine(7200.0, 7200.0, extractor, config(6));
        let result = run(&engine).unwrap();

        assert_eq!(result.status, SyncStatus::Warped);
        assert!(result.std_dev_ms.unwrap() > 100.0);
        assert_eq!(
            result.offsets_ms(),
            vec![0.0, 800.0, 1600.0, 2400.0, 3200.0, 4000.0]
        );
    }

    #[test]
    fn extraction_failure_aborts_run() {
        let mut extractor = SyntheticExtractor::constant(250.0);
        // Third call: reference side of window 1.
        extractor.fail_on_call = Some(2);
        let engine = engine(7200.0, 7200.0, extractor, config(6));

        let err = run(&engine).unwrap_err();
        assert!(matches!(
            err,
            SyncError::Extraction {
                window_index: 1,
                side: Side::Reference,
                ..
            }
        ));
        assert_eq!(engine.extractor.calls(), 3);
        assert_eq!(engine.extractor.leftover_files(), 0);
    }

    #[test]
    fn temporary_segments_are_removed() {
        let engine = engine(7200.0, 7200.0, SyntheticExtractor::constant(10.0), config(5));
        run(&engine).unwrap();
        assert_eq!(engine.extractor.calls(), 10);
        assert_eq!(engine.extractor.leftover_files(), 0);
    }

    #[test]
    fn probe_failure_names_side() {
        let engine = engine(7200.0, 7200.0, SyntheticExtractor::constant(0.0), config(5));
        let err = engine
            .estimate_offset(
                Path::new("/m/reference.mkv"),
                Path::new("/m/missing.mkv"),
                None,
                None,
            )
            .unwrap_err();
        assert!(matches!(err, SyncError::Probe { side: Side::Source, .. }));
    }

    #[test]
    fn reports_state_transitions() {
        let states: Arc<Mutex<Vec<EngineState>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&states);
        let engine = engine(600.0, 600.0, SyntheticExtractor::constant(0.0), config(3))
            .with_state_callback(Box::new(move |state: EngineState| sink.lock().push(state)));

        run(&engine).unwrap();

        assert_eq!(
            *states.lock(),
            vec![
                EngineState::Init,
                EngineState::DurationChecked,
                EngineState::Sampling,
                EngineState::Correlating { window: 0, total: 3 },
                EngineState::Correlating { window: 1, total: 3 },
                EngineState::Correlating { window: 2, total: 3 },
                EngineState::Aggregating,
                EngineState::Done,
            ]
        );
    }

    #[test]
    fn mismatch_reports_aborted() {
        let states: Arc<Mutex<Vec<EngineState>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&states);
        let engine = engine(1000.0, 3000.0, SyntheticExtractor::constant(0.0), config(3))
            .with_state_callback(Box::new(move |state: EngineState| sink.lock().push(state)));

        run(&engine).unwrap();
        assert_eq!(
            *states.lock(),
            vec![
                EngineState::Init,
                EngineState::DurationChecked,
                EngineState::Aborted
            ]
        );
    }

    #[test]
    fn run_log_records_phases() {
        let dir = tempfile::tempdir().unwrap();
        let logger = Arc::new(
            RunLogger::new("pair", dir.path(), crate::logging::LogConfig::default(), None).unwrap(),
        );
        let engine = engine(600.0, 600.0, SyntheticExtractor::constant(0.0), config(3))
            .with_logger(Arc::clone(&logger));

        run(&engine).unwrap();
        logger.flush();

        let content = std::fs::read_to_string(logger.log_path()).unwrap();
        assert!(content.contains("=== Sampling ==="));
        assert!(content.contains("[SUCCESS] aligned"));
    }

    #[test]
    fn config_from_settings() {
        let mut settings = Settings::default();
        settings.sampling.seed = Some(99);
        settings.analysis.parallel_windows = true;

        let config = EngineConfig::from_settings(&settings);
        assert_eq!(config.seed, Some(99));
        assert_eq!(config.sample_rate, 16000);
        assert_eq!(config.sampler.max_window_secs, 60);
        assert!(config.parallel_windows);
        assert_eq!(config.with_seed(None).seed, None);
    }
}
