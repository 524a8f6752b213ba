//! Heart-rate conditioned temporal augmentation of chunk batches.
//!
//! Half of the samples (on average) are inspected: their reference heart rate decides
//! whether the chunk is stretched (fast pulse appears slower), folded (slow pulse
//! appears faster), or left alone. A horizontal mirror is then decided once for the
//! whole batch.

use crate::batch::ChunkBatch;
use crate::cache::HeartRateCache;
use crate::hr::HeartRateEstimator;
use crate::types::DatasetResult;
use data_contracts::{ContractError, FoldList};
use rand::Rng;

pub const VIPL_HR_DATASET: &str = "VIPL-HR";

/// Draws below this value send a sample through the heart-rate check.
const TRANSFORM_DRAW: f64 = 0.5;
/// Draws below this value mirror the batch.
const FLIP_DRAW: f64 = 0.5;
const HIGH_BPM: f32 = 90.0;
const GENERIC_LOW_BPM: f32 = 75.0;
const VIPL_LOW_BPM: f32 = 70.0;

#[derive(Debug, Clone)]
pub enum AugPolicy {
    Generic,
    /// Roughly half of VIPL-HR was recorded below 20 fps and already upsampled, so only
    /// recordings admitted by the fold filter may be stretched again.
    ViplHr { fold: FoldList },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HrBand {
    High,
    Low,
    Mid,
}

impl AugPolicy {
    /// Pick the policy for a dataset name; the fold list is only loaded for VIPL-HR.
    pub fn for_dataset<F>(dataset: &str, load_fold: F) -> Result<Self, ContractError>
    where
        F: FnOnce() -> Result<FoldList, ContractError>,
    {
        if dataset == VIPL_HR_DATASET {
            Ok(AugPolicy::ViplHr { fold: load_fold()? })
        } else {
            Ok(AugPolicy::Generic)
        }
    }

    pub fn high_bpm(&self) -> f32 {
        HIGH_BPM
    }

    pub fn low_bpm(&self) -> f32 {
        match self {
            AugPolicy::Generic => GENERIC_LOW_BPM,
            AugPolicy::ViplHr { .. } => VIPL_LOW_BPM,
        }
    }

    pub fn band(&self, hr: f32, subject: &str) -> HrBand {
        let may_stretch = match self {
            AugPolicy::Generic => true,
            AugPolicy::ViplHr { fold } => fold.contains(subject),
        };
        if hr > self.high_bpm() && may_stretch {
            HrBand::High
        } else if hr < self.low_bpm() {
            HrBand::Low
        } else {
            HrBand::Mid
        }
    }
}

/// What happened to one sample of the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemporalBranch {
    /// Transform draw was >= 0.5; heart rate not consulted.
    Skipped,
    /// Half window starting at `offset` stretched over the full chunk.
    Upsample { offset: usize },
    /// Every second frame, repeated twice.
    Downsample,
    /// Heart rate inside the middle band.
    MidBand,
}

#[derive(Debug, Clone)]
pub struct Augmented {
    pub batch: ChunkBatch,
    pub branches: Vec<TemporalBranch>,
    pub flipped: bool,
}

pub struct TemporalAugmentor<E, C> {
    policy: AugPolicy,
    estimator: E,
    cache: C,
    fs: f32,
    diff_normalized: bool,
}

impl<E: HeartRateEstimator, C: HeartRateCache> TemporalAugmentor<E, C> {
    pub fn new(policy: AugPolicy, estimator: E, cache: C, fs: f32, diff_normalized: bool) -> Self {
        Self {
            policy,
            estimator,
            cache,
            fs,
            diff_normalized,
        }
    }

    pub fn policy(&self) -> &AugPolicy {
        &self.policy
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut C {
        &mut self.cache
    }

    pub fn estimator(&self) -> &E {
        &self.estimator
    }

    /// Augment a batch; the output has exactly the input's shape.
    pub fn augment<R: Rng + ?Sized>(
        &mut self,
        batch: &ChunkBatch,
        rng: &mut R,
    ) -> DatasetResult<Augmented> {
        let shape = batch.shape;
        shape.validate()?;
        let n = batch.len();
        let transform_draws: Vec<f64> = (0..n).map(|_| rng.random::<f64>()).collect();
        let flip_draws: Vec<f64> = (0..n).map(|_| rng.random::<f64>()).collect();

        let mut out = batch.clone();
        let mut branches = Vec::with_capacity(n);
        for (idx, draw) in transform_draws.iter().enumerate() {
            let branch = if *draw < TRANSFORM_DRAW {
                let hr = self.reference_hr(batch, idx)?;
                match self.policy.band(hr, &batch.subjects[idx]) {
                    HrBand::High => TemporalBranch::Upsample {
                        offset: rng.random_range(0..shape.frames / 2),
                    },
                    HrBand::Low => TemporalBranch::Downsample,
                    HrBand::Mid => TemporalBranch::MidBand,
                }
            } else {
                TemporalBranch::Skipped
            };

            let frame_len = shape.frame_len();
            let (video, labels) = out.sample_mut(idx);
            match branch {
                TemporalBranch::Upsample { offset } => {
                    stretch_half_window(batch.sample_video(idx), video, shape.frames, frame_len, offset);
                    stretch_half_window(batch.sample_labels(idx), labels, shape.frames, 1, offset);
                }
                TemporalBranch::Downsample => {
                    fold_double_rate(batch.sample_video(idx), video, shape.frames, frame_len);
                    fold_double_rate(batch.sample_labels(idx), labels, shape.frames, 1);
                }
                TemporalBranch::Skipped | TemporalBranch::MidBand => {}
            }
            branches.push(branch);
        }

        // One mirror decision per batch, taken from the last sample's draw.
        let flipped = flip_draws.last().is_some_and(|r| *r < FLIP_DRAW);
        if flipped {
            flip_width(&mut out.video, shape.width);
        }

        tracing::debug!(
            samples = n,
            upsampled = branches
                .iter()
                .filter(|b| matches!(b, TemporalBranch::Upsample { .. }))
                .count(),
            downsampled = branches
                .iter()
                .filter(|b| matches!(b, TemporalBranch::Downsample))
                .count(),
            flipped,
            "augmented batch"
        );

        Ok(Augmented {
            batch: out,
            branches,
            flipped,
        })
    }

    fn reference_hr(&mut self, batch: &ChunkBatch, idx: usize) -> DatasetResult<f32> {
        let key = batch.key(idx);
        let labels = batch.sample_labels(idx);
        let estimator = &self.estimator;
        let (fs, diff) = (self.fs, self.diff_normalized);
        self.cache
            .get_or_compute(&key, &mut || estimator.estimate(labels, fs, diff))
    }
}

/// Stretch `frames / 2 + 1` source frames starting at `offset` over `frames` output frames:
/// even outputs copy source frame `offset + t / 2`, odd outputs average it with its successor.
///
/// Requires `offset + frames / 2 < frames`.
pub fn stretch_half_window(
    src: &[f32],
    dst: &mut [f32],
    frames: usize,
    frame_len: usize,
    offset: usize,
) {
    for t in 0..frames {
        let base = offset + t / 2;
        let a = &src[base * frame_len..(base + 1) * frame_len];
        let out = &mut dst[t * frame_len..(t + 1) * frame_len];
        if t % 2 == 0 {
            out.copy_from_slice(a);
        } else {
            let b = &src[(base + 1) * frame_len..(base + 2) * frame_len];
            for ((o, x), y) in out.iter_mut().zip(a).zip(b) {
                *o = (x + y) / 2.0;
            }
        }
    }
}

/// Fill the first half with every second source frame and repeat it in the second half.
pub fn fold_double_rate(src: &[f32], dst: &mut [f32], frames: usize, frame_len: usize) {
    let half = frames / 2;
    for t in 0..half {
        dst[t * frame_len..(t + 1) * frame_len]
            .copy_from_slice(&src[2 * t * frame_len..(2 * t + 1) * frame_len]);
    }
    dst.copy_within(0..half * frame_len, half * frame_len);
}

/// Mirror every row along the innermost (width) axis.
pub fn flip_width(video: &mut [f32], width: usize) {
    for row in video.chunks_exact_mut(width) {
        row.reverse();
    }
}
