//! Offline VIPL-HR fold filter.
//!
//! Walks every `(subject, variant, source)` recording and keeps the ones whose video frame
//! count, label length and recorded duration agree with a nominal 30 fps capture.

use crate::types::{DatasetError, DatasetResult};
use data_contracts::fold::write_fold;
use data_contracts::{SampleId, Variant};
use std::fs;
use std::io::{BufRead, BufReader, Read};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

pub const LABEL_FILE: &str = "gt_HR.csv";
pub const VIDEO_FILE: &str = "video.avi";
pub const TIMESTAMP_FILE: &str = "time.txt";
pub const NOMINAL_FPS: f64 = 30.0;
/// Allowed |fps - 30| when only the label length is known.
pub const FALLBACK_FPS_TOLERANCE: f64 = 1.0;
/// Allowed |recorded duration - label length| in seconds.
pub const DURATION_TOLERANCE: f64 = 1.0;
/// Allowed |fps - 30| when the recorded duration is known.
pub const TIMESTAMPED_FPS_TOLERANCE: f64 = 2.0;

/// Raw measurements of one recording.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurements {
    /// `None` when the video file is absent.
    pub frame_count: Option<f64>,
    /// Label rows minus two (header plus off-by-one convention).
    pub label_time: f64,
    /// Last timestamp in seconds; `None` when the timestamp file is absent.
    pub gt_time: Option<f64>,
}

/// Source of the raw measurements for a recording directory.
pub trait RecordingProbe {
    /// `Ok(None)` when the recording has no label file and is not a candidate.
    fn measure(&self, recording_dir: &Path) -> DatasetResult<Option<Measurements>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptBranch {
    /// No timestamp file: fps inferred from label length.
    Fallback,
    /// Timestamp file present: duration cross-checked.
    Timestamped,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RejectReason {
    MissingVideo,
    FrameRate { fps: f64 },
    Duration { gt_time: f64, label_time: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    Accepted(AcceptBranch),
    Rejected(RejectReason),
}

impl Decision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Decision::Accepted(_))
    }
}

/// Apply the admission rules to one recording's measurements.
///
/// A zero divisor means the artifact is unusable and is reported as malformed.
pub fn evaluate(dir: &Path, m: &Measurements) -> DatasetResult<Decision> {
    let Some(frame_count) = m.frame_count else {
        return Ok(Decision::Rejected(RejectReason::MissingVideo));
    };
    match m.gt_time {
        None => {
            if m.label_time == 0.0 {
                return Err(DatasetError::malformed(
                    dir.join(LABEL_FILE),
                    "label file has no data rows",
                ));
            }
            let fps = frame_count / m.label_time;
            if (fps - NOMINAL_FPS).abs() < FALLBACK_FPS_TOLERANCE {
                Ok(Decision::Accepted(AcceptBranch::Fallback))
            } else {
                Ok(Decision::Rejected(RejectReason::FrameRate { fps }))
            }
        }
        Some(gt_time) => {
            if (gt_time - m.label_time).abs() >= DURATION_TOLERANCE {
                return Ok(Decision::Rejected(RejectReason::Duration {
                    gt_time,
                    label_time: m.label_time,
                }));
            }
            if gt_time == 0.0 {
                return Err(DatasetError::malformed(
                    dir.join(TIMESTAMP_FILE),
                    "recorded duration is zero",
                ));
            }
            let fps = frame_count / gt_time;
            if (fps - NOMINAL_FPS).abs() < TIMESTAMPED_FPS_TOLERANCE {
                Ok(Decision::Accepted(AcceptBranch::Timestamped))
            } else {
                Ok(Decision::Rejected(RejectReason::FrameRate { fps }))
            }
        }
    }
}

/// Reads measurements from `gt_HR.csv`, `video.avi` and `time.txt`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsRecordingProbe;

impl RecordingProbe for FsRecordingProbe {
    fn measure(&self, recording_dir: &Path) -> DatasetResult<Option<Measurements>> {
        let labels = recording_dir.join(LABEL_FILE);
        if !labels.exists() {
            return Ok(None);
        }
        let video = recording_dir.join(VIDEO_FILE);
        let frame_count = if video.exists() {
            Some(avi_frame_count(&video)? as f64)
        } else {
            None
        };
        let timestamps = recording_dir.join(TIMESTAMP_FILE);
        let gt_time = if timestamps.exists() {
            Some(last_timestamp_ms(&timestamps)? / 1000.0)
        } else {
            None
        };
        Ok(Some(Measurements {
            frame_count,
            label_time: label_time(&labels)?,
            gt_time,
        }))
    }
}

/// Number of rows in the label file minus two.
pub fn label_time(path: &Path) -> DatasetResult<f64> {
    let file = fs::File::open(path).map_err(|e| DatasetError::io(path, e))?;
    let mut rows = 0usize;
    for line in BufReader::new(file).lines() {
        line.map_err(|e| DatasetError::io(path, e))?;
        rows += 1;
    }
    if rows == 0 {
        return Err(DatasetError::malformed(path, "empty label file"));
    }
    Ok(rows as f64 - 2.0)
}

/// Last line of the timestamp file, in milliseconds.
pub fn last_timestamp_ms(path: &Path) -> DatasetResult<f64> {
    let raw = fs::read_to_string(path).map_err(|e| DatasetError::io(path, e))?;
    let last = raw
        .lines()
        .last()
        .ok_or_else(|| DatasetError::malformed(path, "empty timestamp file"))?
        .trim();
    last.parse::<f64>()
        .map_err(|e| DatasetError::malformed(path, format!("bad timestamp {last:?}: {e}")))
}

const AVI_HEADER_SCAN: u64 = 64 * 1024;

/// Total frame count from an AVI header.
///
/// Prefers the OpenDML `dmlh` extended header (counts frames across RIFF-AVIX
/// extensions) and falls back to `dwTotalFrames` of the `avih` main header.
pub fn avi_frame_count(path: &Path) -> DatasetResult<u32> {
    let file = fs::File::open(path).map_err(|e| DatasetError::io(path, e))?;
    let mut head = Vec::new();
    file.take(AVI_HEADER_SCAN)
        .read_to_end(&mut head)
        .map_err(|e| DatasetError::io(path, e))?;
    if head.len() < 12 || &head[0..4] != b"RIFF" || &head[8..12] != b"AVI " {
        return Err(DatasetError::malformed(path, "not a RIFF AVI file"));
    }
    // dmlh: fourcc, size, dwTotalFrames.
    if let Some(pos) = find_fourcc(&head, b"dmlh") {
        if let Some(frames) = read_u32_le(&head, pos + 8) {
            return Ok(frames);
        }
    }
    // avih: fourcc, size, dwMicroSecPerFrame, dwMaxBytesPerSec, dwPaddingGranularity,
    // dwFlags, dwTotalFrames.
    let pos = find_fourcc(&head, b"avih")
        .ok_or_else(|| DatasetError::malformed(path, "missing avih header"))?;
    read_u32_le(&head, pos + 8 + 16)
        .ok_or_else(|| DatasetError::malformed(path, "truncated avih header"))
}

fn find_fourcc(data: &[u8], tag: &[u8; 4]) -> Option<usize> {
    data.windows(4).position(|w| w == tag)
}

fn read_u32_le(data: &[u8], at: usize) -> Option<u32> {
    let bytes = data.get(at..at + 4)?;
    let mut arr = [0u8; 4];
    arr.copy_from_slice(bytes);
    Some(u32::from_le_bytes(arr))
}

#[derive(Debug, Clone)]
pub struct FoldFilterConfig {
    pub dataset_root: PathBuf,
    pub subjects: RangeInclusive<u32>,
    /// Traversal indices; 10, 11 and 12 map onto the `1-2`, `3-2` and `9-2` retakes.
    pub variants: RangeInclusive<u32>,
    pub sources: RangeInclusive<u32>,
}

impl FoldFilterConfig {
    pub fn vipl_v1(dataset_root: impl Into<PathBuf>) -> Self {
        Self {
            dataset_root: dataset_root.into(),
            subjects: 1..=107,
            variants: 1..=12,
            sources: 1..=3,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSummary {
    pub candidates: usize,
    pub accepted_fallback: usize,
    pub accepted_timestamped: usize,
    pub rejected: usize,
}

impl FilterSummary {
    pub fn accepted(&self) -> usize {
        self.accepted_fallback + self.accepted_timestamped
    }
}

pub struct FoldFilter<P> {
    cfg: FoldFilterConfig,
    probe: P,
}

impl<P: RecordingProbe> FoldFilter<P> {
    pub fn new(cfg: FoldFilterConfig, probe: P) -> Self {
        Self { cfg, probe }
    }

    /// Every recording in traversal order: subject, then variant, then source.
    pub fn recordings(&self) -> impl Iterator<Item = SampleId> + '_ {
        self.cfg.subjects.clone().flat_map(move |subject| {
            self.cfg.variants.clone().flat_map(move |variant| {
                self.cfg.sources.clone().map(move |source| {
                    SampleId::new(subject, Variant::from_index(variant), source)
                })
            })
        })
    }

    /// `Ok(None)` when the recording is not a candidate (no label file).
    pub fn decide(&self, id: &SampleId) -> DatasetResult<Option<Decision>> {
        let dir = self.cfg.dataset_root.join(id.relative_dir());
        let Some(measurements) = self.probe.measure(&dir)? else {
            return Ok(None);
        };
        let decision = evaluate(&dir, &measurements)?;
        tracing::debug!(%id, ?measurements, ?decision, "fold filter decision");
        Ok(Some(decision))
    }

    /// Accepted identifiers in traversal order.
    pub fn run(&self) -> DatasetResult<(Vec<SampleId>, FilterSummary)> {
        let mut accepted = Vec::new();
        let mut summary = FilterSummary::default();
        for id in self.recordings() {
            let Some(decision) = self.decide(&id)? else {
                continue;
            };
            summary.candidates += 1;
            match decision {
                Decision::Accepted(AcceptBranch::Fallback) => summary.accepted_fallback += 1,
                Decision::Accepted(AcceptBranch::Timestamped) => {
                    summary.accepted_timestamped += 1
                }
                Decision::Rejected(_) => summary.rejected += 1,
            }
            if decision.is_accepted() {
                accepted.push(id);
            }
        }
        Ok((accepted, summary))
    }

    /// Run the filter and write the fold file, one identifier per line.
    pub fn run_to_file(&self, output: &Path) -> DatasetResult<FilterSummary> {
        let (accepted, summary) = self.run()?;
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| DatasetError::io(parent, e))?;
        }
        let file = fs::File::create(output).map_err(|e| DatasetError::io(output, e))?;
        write_fold(std::io::BufWriter::new(file), &accepted)
            .map_err(|e| DatasetError::io(output, e))?;
        tracing::info!(
            output = %output.display(),
            candidates = summary.candidates,
            accepted = summary.accepted(),
            rejected = summary.rejected,
            "wrote fold list"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(frame_count: f64, label_time: f64, gt_time: Option<f64>) -> Measurements {
        Measurements {
            frame_count: Some(frame_count),
            label_time,
            gt_time,
        }
    }

    #[test]
    fn fallback_branch_uses_tight_tolerance() {
        let dir = Path::new("p1/v1/source2");
        assert_eq!(
            evaluate(dir, &m(3050.0, 100.0, None)).unwrap(),
            Decision::Accepted(AcceptBranch::Fallback)
        );
        assert!(!evaluate(dir, &m(3100.0, 100.0, None)).unwrap().is_accepted());
        assert!(!evaluate(dir, &m(2900.0, 100.0, None)).unwrap().is_accepted());
    }

    #[test]
    fn timestamped_branch_checks_duration_then_fps() {
        let dir = Path::new("p1/v1/source1");
        assert_eq!(
            evaluate(dir, &m(3150.0, 100.0, Some(100.5))).unwrap(),
            Decision::Accepted(AcceptBranch::Timestamped)
        );
        assert!(matches!(
            evaluate(dir, &m(3000.0, 100.0, Some(101.0))).unwrap(),
            Decision::Rejected(RejectReason::Duration { .. })
        ));
        assert!(matches!(
            evaluate(dir, &m(3250.0, 100.0, Some(100.0))).unwrap(),
            Decision::Rejected(RejectReason::FrameRate { .. })
        ));
    }

    #[test]
    fn missing_video_is_rejected_not_fatal() {
        let measurements = Measurements {
            frame_count: None,
            label_time: 10.0,
            gt_time: None,
        };
        assert_eq!(
            evaluate(Path::new("x"), &measurements).unwrap(),
            Decision::Rejected(RejectReason::MissingVideo)
        );
    }

    #[test]
    fn zero_divisors_are_malformed() {
        assert!(matches!(
            evaluate(Path::new("x"), &m(300.0, 0.0, None)),
            Err(DatasetError::MalformedArtifact { .. })
        ));
        assert!(matches!(
            evaluate(Path::new("x"), &m(300.0, 0.5, Some(0.0))),
            Err(DatasetError::MalformedArtifact { .. })
        ));
    }
}
