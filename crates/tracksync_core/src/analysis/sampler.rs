//! Sampling window placement.
//!
//! Pure apart from the injected random source: the same seed always yields
//! the same windows.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::aggregate::MIN_OFFSETS;
use super::AnalysisError;
use crate::config::SamplingSettings;
use crate::models::SampleWindow;

/// Bounds for window count and length.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplerConfig {
    pub min_samples: usize,
    pub max_samples: usize,
    pub min_window_secs: u32,
    pub max_window_secs: u32,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self::from_settings(&SamplingSettings::default())
    }
}

impl SamplerConfig {
    /// Reject bounds the sampler cannot draw from.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        let invalid =
            |message: String| -> Result<(), AnalysisError> { Err(AnalysisError::InvalidConfig(message)) };
        if self.min_samples < MIN_OFFSETS {
            return invalid(format!(
                "min_samples must be at least {} (got {})",
                MIN_OFFSETS, self.min_samples
            ));
        }
        if self.min_samples > self.max_samples {
            return invalid(format!(
                "min_samples ({}) exceeds max_samples ({})",
                self.min_samples, self.max_samples
            ));
        }
        if self.min_window_secs == 0 {
            return invalid("min_window_secs must be positive".to_string());
        }
        if self.min_window_secs > self.max_window_secs {
            return invalid(format!(
                "min_window_secs ({}) exceeds max_window_secs ({})",
                self.min_window_secs, self.max_window_secs
            ));
        }
        Ok(())
    }

    pub fn from_settings(settings: &SamplingSettings) -> Self {
        Self {
            min_samples: settings.min_samples as usize,
            max_samples: settings.max_samples as usize,
            min_window_secs: settings.min_window_secs,
            max_window_secs: settings.max_window_secs,
        }
    }
}

/// Places sampling windows over the shorter of two inputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimestampSampler {
    config: SamplerConfig,
}

impl TimestampSampler {
    pub fn new(config: SamplerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Draw the windows for one run.
    ///
    /// Fails with `InvalidConfig` when the bounds are unusable. The count and each length are drawn uniformly from their bounds. Starts
    /// are spread evenly over `[0, shorter - max_window_secs]`, both ends
    /// included, so every window ends inside the shorter input whatever
    /// length it drew.
    pub fn sample<R: Rng>(
        &self,
        shorter_duration_secs: f64,
        rng: &mut R,
    ) -> Result<Vec<SampleWindow>, AnalysisError> {
        let c = &self.config;
        c.validate()?;
        let span = shorter_duration_secs - c.max_window_secs as f64;
        if !(span > 0.0) {
            return Err(AnalysisError::InsufficientDuration {
                shorter_secs: shorter_duration_secs,
                required_secs: c.max_window_secs as f64,
            });
        }

        let count = rng.gen_range(c.min_samples..=c.max_samples);
        let starts = linspace(0.0, span, count);

        Ok(starts
            .into_iter()
            .enumerate()
            .map(|(index, start_secs)| SampleWindow {
                index,
                start_secs,
                length_secs: rng.gen_range(c.min_window_secs..=c.max_window_secs),
            })
            .collect())
    }
}

/// `count` evenly spaced values from `start` to `end` inclusive.
///
/// A single value is `start`.
pub fn linspace(start: f64, end: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (count - 1) as f64;
            (0..count)
                .map(|i| {
                    if i == count - 1 {
                        end
                    } else {
                        start + i as f64 * step
                    }
                })
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn linspace_includes_both_ends() {
        assert_eq!(linspace(0.0, 100.0, 5), vec![0.0, 25.0, 50.0, 75.0, 100.0]);
        assert_eq!(linspace(0.0, 100.0, 1), vec![0.0]);
        assert!(linspace(0.0, 1.0, 0).is_empty());
    }

    #[test]
    fn windows_stay_inside_shorter_duration() {
        let sampler = TimestampSampler::default();
        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            let windows = sampler.sample(600.0, &mut rng).unwrap();

            assert!((5..=10).contains(&windows.len()));
            assert_eq!(windows[0].start_secs, 0.0);
            assert!((windows.last().unwrap().start_secs - 540.0).abs() < 1e-9);
            for (i, w) in windows.iter().enumerate() {
                assert_eq!(w.index, i);
                assert!((20..=60).contains(&w.length_secs));
                assert!(w.end_secs() <= 600.0);
            }
        }
    }

    #[test]
    fn same_seed_same_windows() {
        let sampler = TimestampSampler::default();
        let a = sampler.sample(7200.0, &mut StdRng::seed_from_u64(42)).unwrap();
        let b = sampler.sample(7200.0, &mut StdRng::seed_from_u64(42)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn fixed_count_when_bounds_equal() {
        let sampler = TimestampSampler::new(SamplerConfig {
            min_samples: 6,
            max_samples: 6,
            min_window_secs: 30,
            max_window_secs: 30,
        });
        let windows = sampler.sample(330.0, &mut StdRng::seed_from_u64(1)).unwrap();
        let starts: Vec<f64> = windows.iter().map(|w| w.start_secs).collect();
        assert_eq!(starts, vec![0.0, 60.0, 120.0, 180.0, 240.0, 300.0]);
    }

    #[test]
    fn rejects_unusable_bounds() {
        let valid = SamplerConfig::default();
        let cases = [
            SamplerConfig {
                min_samples: 6,
                max_samples: 3,
                ..valid
            },
            SamplerConfig {
                min_samples: 2,
                max_samples: 5,
                ..valid
            },
            SamplerConfig {
                min_window_secs: 0,
                ..valid
            },
            SamplerConfig {
                min_window_secs: 90,
                max_window_secs: 30,
                ..valid
            },
        ];

        for config in cases {
            let result = TimestampSampler::new(config).sample(7200.0, &mut StdRng::seed_from_u64(3));
            assert!(
                matches!(result, Err(AnalysisError::InvalidConfig(_))),
                "{:?} gave {:?}",
                config,
                result
            );
        }
        assert!(valid.validate().is_ok());
    }

    #[test]
    fn too_short_input_fails() {
        let sampler = TimestampSampler::default();
        let mut rng = StdRng::seed_from_u64(0);

        for shorter in [59.0, 60.0, 0.0] {
            match sampler.sample(shorter, &mut rng) {
                Err(AnalysisError::InsufficientDuration {
                    shorter_secs,
                    required_secs,
                }) => {
                    assert_eq!(shorter_secs, shorter);
                    assert_eq!(required_secs, 60.0);
                }
                other => panic!("unexpected result: {:?}", other),
            }
        }
    }
}
