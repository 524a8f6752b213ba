//! Heart-rate metrics over reconstructed per-subject signals.

use std::path::Path;

use rppg_dataset::{FftHeartRate, HeartRateEstimator};
use serde::{Deserialize, Serialize};

use crate::config::TrainerConfig;
use crate::error::{TrainerError, TrainerResult};
use crate::reconstruct::SubjectSignals;

/// Consumes the test-phase predictions and labels.
pub trait MetricsSink {
    type Output;

    fn evaluate(
        &mut self,
        predictions: &SubjectSignals,
        labels: &SubjectSignals,
        cfg: &TrainerConfig,
    ) -> TrainerResult<Self::Output>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectHr {
    pub subject: String,
    pub predicted_bpm: f32,
    pub reference_bpm: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub subjects: usize,
    pub mae: f32,
    pub rmse: f32,
    /// Percent.
    pub mape: f32,
    /// Undefined for fewer than two subjects or constant heart rates.
    pub pearson: Option<f32>,
    pub per_subject: Vec<SubjectHr>,
}

impl MetricsReport {
    pub fn from_pairs(per_subject: Vec<SubjectHr>) -> TrainerResult<Self> {
        if per_subject.is_empty() {
            return Err(TrainerError::Metrics("no test subjects".into()));
        }
        let n = per_subject.len() as f64;
        let (mut abs, mut sq, mut pct) = (0.0f64, 0.0f64, 0.0f64);
        for s in &per_subject {
            let err = (s.predicted_bpm - s.reference_bpm) as f64;
            abs += err.abs();
            sq += err * err;
            pct += err.abs() / (s.reference_bpm as f64).abs().max(f64::EPSILON);
        }
        let pred: Vec<f64> = per_subject.iter().map(|s| s.predicted_bpm as f64).collect();
        let refs: Vec<f64> = per_subject.iter().map(|s| s.reference_bpm as f64).collect();
        Ok(Self {
            subjects: per_subject.len(),
            mae: (abs / n) as f32,
            rmse: (sq / n).sqrt() as f32,
            mape: (pct / n * 100.0) as f32,
            pearson: pearson(&pred, &refs).map(|r| r as f32),
            per_subject,
        })
    }
}

fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() < 2 {
        return None;
    }
    let n = x.len() as f64;
    let mx = x.iter().sum::<f64>() / n;
    let my = y.iter().sum::<f64>() / n;
    let (mut cov, mut vx, mut vy) = (0.0, 0.0, 0.0);
    for (a, b) in x.iter().zip(y) {
        cov += (a - mx) * (b - my);
        vx += (a - mx) * (a - mx);
        vy += (b - my) * (b - my);
    }
    let denom = (vx * vy).sqrt();
    (denom > 0.0).then(|| cov / denom)
}

/// FFT heart rate per subject on the concatenated signal, then MAE/RMSE/MAPE/Pearson.
#[derive(Debug, Clone, Default)]
pub struct HrMetrics<E = FftHeartRate> {
    estimator: E,
}

impl<E: HeartRateEstimator> HrMetrics<E> {
    pub fn new(estimator: E) -> Self {
        Self { estimator }
    }
}

impl<E: HeartRateEstimator> MetricsSink for HrMetrics<E> {
    type Output = MetricsReport;

    fn evaluate(
        &mut self,
        predictions: &SubjectSignals,
        labels: &SubjectSignals,
        cfg: &TrainerConfig,
    ) -> TrainerResult<MetricsReport> {
        let diff = cfg.diff_normalized();
        let mut per_subject = Vec::with_capacity(predictions.len());
        for (subject, _) in predictions.iter() {
            let (Some(pred), Some(label)) = (
                predictions.concatenated(subject),
                labels.concatenated(subject),
            ) else {
                return Err(TrainerError::Metrics(format!(
                    "subject {subject} has predictions but no labels"
                )));
            };
            let predicted_bpm = self.estimator.estimate(&pred, cfg.test_fs, diff)?;
            let reference_bpm = self.estimator.estimate(&label, cfg.test_fs, diff)?;
            tracing::debug!(%subject, predicted_bpm, reference_bpm, "subject heart rate");
            per_subject.push(SubjectHr {
                subject: subject.clone(),
                predicted_bpm,
                reference_bpm,
            });
        }
        let report = MetricsReport::from_pairs(per_subject)?;
        tracing::info!(
            subjects = report.subjects,
            mae = report.mae,
            rmse = report.rmse,
            mape = report.mape,
            pearson = ?report.pearson,
            "test metrics"
        );
        if let Some(path) = &cfg.metrics_output {
            write_report(&report, path)?;
        }
        Ok(report)
    }
}

fn write_report(report: &MetricsReport, path: &Path) -> TrainerResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| TrainerError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let data = serde_json::to_vec_pretty(report).map_err(|e| TrainerError::Metrics(e.to_string()))?;
    std::fs::write(path, data).map_err(|source| TrainerError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!(path = %path.display(), "wrote metrics report");
    Ok(())
}
