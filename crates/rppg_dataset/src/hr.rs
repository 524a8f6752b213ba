//! Reference heart-rate estimation from a label (PPG) chunk.

use crate::types::{DatasetError, DatasetResult};
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

/// Converts a physiological label sequence into beats per minute.
pub trait HeartRateEstimator {
    fn estimate(&self, labels: &[f32], fs: f32, diff_normalized: bool) -> DatasetResult<f32>;
}

/// Periodogram peak within the physiological band.
///
/// Diff-normalized labels are integrated first; the signal is then linearly detrended,
/// zero-padded to the next power of two and the strongest bin inside
/// `[min_hz, max_hz]` is reported as `60 * f`.
#[derive(Debug, Clone, Copy)]
pub struct FftHeartRate {
    pub min_hz: f64,
    pub max_hz: f64,
}

impl Default for FftHeartRate {
    fn default() -> Self {
        Self {
            min_hz: 0.75,
            max_hz: 2.5,
        }
    }
}

impl HeartRateEstimator for FftHeartRate {
    fn estimate(&self, labels: &[f32], fs: f32, diff_normalized: bool) -> DatasetResult<f32> {
        if labels.len() < 2 {
            return Err(DatasetError::Estimator(format!(
                "need at least 2 samples, got {}",
                labels.len()
            )));
        }
        if fs.is_nan() || fs <= 0.0 {
            return Err(DatasetError::Estimator(format!("invalid sampling rate {fs}")));
        }
        let mut signal: Vec<f64> = if diff_normalized {
            labels
                .iter()
                .scan(0.0f64, |acc, v| {
                    *acc += *v as f64;
                    Some(*acc)
                })
                .collect()
        } else {
            labels.iter().map(|v| *v as f64).collect()
        };
        detrend_linear(&mut signal);

        let nfft = signal.len().next_power_of_two();
        let mut buffer: Vec<Complex<f64>> = signal
            .iter()
            .map(|v| Complex::new(*v, 0.0))
            .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
            .take(nfft)
            .collect();
        let mut planner = FftPlanner::new();
        planner.plan_fft_forward(nfft).process(&mut buffer);

        let fs = fs as f64;
        let mut best: Option<(f64, f64)> = None;
        for (k, bin) in buffer.iter().enumerate().take(nfft / 2 + 1) {
            let freq = k as f64 * fs / nfft as f64;
            if freq < self.min_hz || freq > self.max_hz {
                continue;
            }
            let power = bin.norm_sqr();
            if best.map_or(true, |(_, p)| power > p) {
                best = Some((freq, power));
            }
        }
        let (freq, _) = best.ok_or_else(|| {
            DatasetError::Estimator(format!(
                "no frequency bin in [{}, {}] Hz for {} samples at {fs} Hz",
                self.min_hz,
                self.max_hz,
                labels.len()
            ))
        })?;
        Ok((freq * 60.0) as f32)
    }
}

/// Remove the least-squares line from `signal` in place.
pub(crate) fn detrend_linear(signal: &mut [f64]) {
    let n = signal.len() as f64;
    if n < 2.0 {
        return;
    }
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = signal.iter().sum::<f64>() / n;
    let mut cov = 0.0;
    let mut var = 0.0;
    for (i, y) in signal.iter().enumerate() {
        let dx = i as f64 - mean_x;
        cov += dx * (y - mean_y);
        var += dx * dx;
    }
    let slope = if var > 0.0 { cov / var } else { 0.0 };
    for (i, y) in signal.iter_mut().enumerate() {
        *y -= mean_y + slope * (i as f64 - mean_x);
    }
}
