//! Full discrete cross-correlation and peak-to-offset conversion.
//!
//! Layout of the correlation vector (length `len(reference) + len(source)`):
//! index `i` holds lag `i - len(reference)`, where lag `k` scores
//! `sum_n reference[n] * source[n + k]`. A source that plays the same content
//! `D` samples later peaks at index `len(reference) + D`.

use rustfft::{num_complex::Complex, FftPlanner};

use super::AnalysisError;
use crate::models::WaveformSegment;

/// Above this many multiply-adds the FFT path is used.
const DEFAULT_DIRECT_LIMIT: usize = 1 << 16;

/// Cross-correlates two segments and reports the offset in milliseconds.
#[derive(Debug, Clone, Copy)]
pub struct Correlator {
    direct_limit: usize,
}

impl Default for Correlator {
    fn default() -> Self {
        Self {
            direct_limit: DEFAULT_DIRECT_LIMIT,
        }
    }
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Correlator that switches to the FFT path above `direct_limit` multiply-adds.
    pub fn with_direct_limit(direct_limit: usize) -> Self {
        Self { direct_limit }
    }

    /// Offset of `source` relative to `reference` in milliseconds.
    ///
    /// Positive when the source content occurs later than the reference.
    pub fn offset_ms(
        &self,
        reference: &WaveformSegment,
        source: &WaveformSegment,
    ) -> Result<f64, AnalysisError> {
        if reference.is_empty() {
            return Err(AnalysisError::EmptySegment { which: "reference" });
        }
        if source.is_empty() {
            return Err(AnalysisError::EmptySegment { which: "source" });
        }
        if reference.sample_rate != source.sample_rate {
            return Err(AnalysisError::SampleRateMismatch {
                reference_rate: reference.sample_rate,
                source_rate: source.sample_rate,
            });
        }
        if reference.sample_rate == 0 {
            return Err(AnalysisError::SampleRateMismatch {
                reference_rate: 0,
                source_rate: 0,
            });
        }

        let correlation = self.cross_correlate(&reference.samples, &source.samples);
        Ok(peak_to_offset_ms(
            &correlation,
            reference.len(),
            reference.sample_rate,
        ))
    }

    /// Full cross-correlation, choosing the direct or FFT path by size.
    pub fn cross_correlate(&self, reference: &[f64], source: &[f64]) -> Vec<f64> {
        if reference.len().saturating_mul(source.len()) <= self.direct_limit {
            cross_correlate_direct(reference, source)
        } else {
            cross_correlate_fft(reference, source)
        }
    }
}

/// Time-domain cross-correlation.
pub fn cross_correlate_direct(reference: &[f64], source: &[f64]) -> Vec<f64> {
    let len_ref = reference.len();
    let len_src = source.len();
    let mut correlation = vec![0.0; len_ref + len_src];
    if len_ref == 0 || len_src == 0 {
        return correlation;
    }

    for (i, out) in correlation.iter_mut().enumerate().skip(1) {
        let lag = i as isize - len_ref as isize;
        // Valid n: 0 <= n < len_ref and 0 <= n + lag < len_src.
        let n_start = (-lag).max(0) as usize;
        let n_end = ((len_src as isize - lag).min(len_ref as isize)).max(0) as usize;
        let mut sum = 0.0;
        for n in n_start..n_end {
            sum += reference[n] * source[(n as isize + lag) as usize];
        }
        *out = sum;
    }

    correlation
}

/// FFT cross-correlation: `IFFT(FFT(source) * conj(FFT(reference)))`.
///
/// Zero padding to at least `len_ref + len_src - 1` keeps the circular result
/// free of wrap-around; negative lags land at the end of the buffer.
pub fn cross_correlate_fft(reference: &[f64], source: &[f64]) -> Vec<f64> {
    let len_ref = reference.len();
    let len_src = source.len();
    let total = len_ref + len_src;
    if len_ref == 0 || len_src == 0 {
        return vec![0.0; total];
    }

    let fft_len = total.next_power_of_two();

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(fft_len);
    let ifft = planner.plan_fft_inverse(fft_len);

    let to_padded = |signal: &[f64]| -> Vec<Complex<f64>> {
        let mut buffer: Vec<Complex<f64>> =
            signal.iter().map(|&x| Complex::new(x, 0.0)).collect();
        buffer.resize(fft_len, Complex::new(0.0, 0.0));
        buffer
    };

    let mut ref_spectrum = to_padded(reference);
    let mut src_spectrum = to_padded(source);
    fft.process(&mut ref_spectrum);
    fft.process(&mut src_spectrum);

    let mut product: Vec<Complex<f64>> = src_spectrum
        .iter()
        .zip(ref_spectrum.iter())
        .map(|(s, r)| s * r.conj())
        .collect();
    ifft.process(&mut product);

    let scale = 1.0 / fft_len as f64;
    let mut correlation = vec![0.0; total];
    // Index 0 is lag -len_ref, which never overlaps.
    for (i, out) in correlation.iter_mut().enumerate().skip(1) {
        let lag = i as isize - len_ref as isize;
        let circular = lag.rem_euclid(fft_len as isize) as usize;
        *out = product[circular].re * scale;
    }

    correlation
}

/// Index of the first maximum. NaN values never win.
pub fn argmax(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// `(argmax - len_reference) * 1000 / sample_rate`.
pub fn peak_to_offset_ms(correlation: &[f64], len_reference: usize, sample_rate: u32) -> f64 {
    let peak = argmax(correlation).unwrap_or(len_reference);
    (peak as f64 - len_reference as f64) * 1000.0 / sample_rate as f64
}
