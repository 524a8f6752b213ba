//! Behavioural tests for the heart-rate conditioned temporal augmentor.

use data_contracts::{ChunkShape, FoldList, SampleId, SampleKey};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rppg_dataset::aug::flip_width;
use rppg_dataset::{
    AugPolicy, BoundedHrCache, ChunkBatch, DatasetResult, HeartRateCache, HeartRateEstimator,
    TemporalAugmentor, TemporalBranch,
};
use std::cell::Cell;
use std::collections::BTreeSet;

/// Reports a fixed heart rate and counts how often it was asked.
struct FixedHr {
    bpm: f32,
    calls: Cell<usize>,
}

impl FixedHr {
    fn new(bpm: f32) -> Self {
        Self {
            bpm,
            calls: Cell::new(0),
        }
    }
}

impl HeartRateEstimator for FixedHr {
    fn estimate(&self, _labels: &[f32], _fs: f32, _diff: bool) -> DatasetResult<f32> {
        self.calls.set(self.calls.get() + 1);
        Ok(self.bpm)
    }
}

/// Every value is distinct and exactly representable: sample * 1000 + frame * 10 + offset.
fn synthetic_batch(n: usize, shape: ChunkShape, subject_prefix: &str) -> ChunkBatch {
    let frame_len = shape.frame_len();
    let mut video = Vec::with_capacity(n * shape.video_len());
    let mut labels = Vec::with_capacity(n * shape.frames);
    for s in 0..n {
        for f in 0..shape.frames {
            for p in 0..frame_len {
                video.push((s * 1000 + f * 10 + p) as f32);
            }
            labels.push((s * 100 + f) as f32);
        }
    }
    let subjects = (0..n).map(|s| format!("{subject_prefix}{s}")).collect();
    let chunk_indices = (0..n).collect();
    ChunkBatch::new(shape, video, labels, subjects, chunk_indices).unwrap()
}

fn augmentor(bpm: f32, policy: AugPolicy) -> TemporalAugmentor<FixedHr, BoundedHrCache> {
    TemporalAugmentor::new(policy, FixedHr::new(bpm), BoundedHrCache::unbounded(), 30.0, false)
}

/// Undo the batch-wide mirror so temporal content can be compared directly.
fn unflipped_video(batch: &ChunkBatch, flipped: bool) -> Vec<f32> {
    let mut video = batch.video.clone();
    if flipped {
        flip_width(&mut video, batch.shape.width);
    }
    video
}

#[test]
fn output_shape_matches_input() {
    for (n, frames) in [(1, 2), (3, 4), (5, 8), (2, 16)] {
        let shape = ChunkShape::new(frames, 3, 2, 3);
        for bpm in [60.0, 80.0, 120.0] {
            let batch = synthetic_batch(n, shape, "p");
            let mut aug = augmentor(bpm, AugPolicy::Generic);
            let mut rng = StdRng::seed_from_u64(n as u64 * 31 + frames as u64);
            let out = aug.augment(&batch, &mut rng).unwrap();
            assert_eq!(out.batch.shape, batch.shape);
            assert_eq!(out.batch.video.len(), batch.video.len());
            assert_eq!(out.batch.labels.len(), batch.labels.len());
            assert_eq!(out.batch.subjects, batch.subjects);
            assert_eq!(out.batch.chunk_indices, batch.chunk_indices);
            assert_eq!(out.branches.len(), n);
        }
    }
}

#[test]
fn reference_heart_rate_computed_once_per_key() {
    let shape = ChunkShape::new(4, 1, 1, 2);
    let first = synthetic_batch(16, shape, "subj");
    let second = synthetic_batch(16, shape, "subj");
    let mut aug = augmentor(80.0, AugPolicy::Generic);
    let mut rng = StdRng::seed_from_u64(7);

    let mut consulted = BTreeSet::new();
    for _epoch in 0..10 {
        for batch in [&first, &second] {
            let out = aug.augment(batch, &mut rng).unwrap();
            for (idx, branch) in out.branches.iter().enumerate() {
                if *branch != TemporalBranch::Skipped {
                    consulted.insert(batch.key(idx));
                }
            }
        }
    }

    let calls = aug.estimator().calls.get();
    assert!(!consulted.is_empty());
    assert_eq!(calls, consulted.len());
    assert_eq!(aug.cache().len(), consulted.len());
    assert_eq!(aug.cache().stats().misses, calls);
    for idx in 0..16 {
        let key = SampleKey::new(format!("subj{idx}"), idx);
        assert_eq!(aug.cache().get(&key).is_some(), consulted.contains(&key), "{key}");
    }
}

#[test]
fn high_heart_rate_stretches_half_window() {
    let shape = ChunkShape::new(8, 2, 1, 3);
    let n = 32;
    let batch = synthetic_batch(n, shape, "p");
    let mut aug = augmentor(120.0, AugPolicy::Generic);
    let mut rng = StdRng::seed_from_u64(2024);
    let out = aug.augment(&batch, &mut rng).unwrap();

    let frame_len = shape.frame_len();
    let video = unflipped_video(&out.batch, out.flipped);
    let mut stretched = 0;
    for (idx, branch) in out.branches.iter().enumerate() {
        let src = batch.sample_video(idx);
        let src_labels = batch.sample_labels(idx);
        let dst = &video[idx * shape.video_len()..(idx + 1) * shape.video_len()];
        let dst_labels = out.batch.sample_labels(idx);
        match *branch {
            TemporalBranch::Upsample { offset } => {
                stretched += 1;
                assert!(offset < shape.frames / 2);
                for t in 0..shape.frames {
                    let base = offset + t / 2;
                    for p in 0..frame_len {
                        let got = dst[t * frame_len + p];
                        let want = if t % 2 == 0 {
                            src[base * frame_len + p]
                        } else {
                            (src[base * frame_len + p] + src[(base + 1) * frame_len + p]) / 2.0
                        };
                        assert!((got - want).abs() < 1e-4, "sample {idx} frame {t}");
                    }
                    let want_label = if t % 2 == 0 {
                        src_labels[base]
                    } else {
                        (src_labels[base] + src_labels[base + 1]) / 2.0
                    };
                    assert!((dst_labels[t] - want_label).abs() < 1e-4);
                }
            }
            TemporalBranch::Skipped => {
                assert_eq!(dst, src);
                assert_eq!(dst_labels, src_labels);
            }
            other => panic!("unexpected branch {other:?} at 120 bpm"),
        }
    }
    assert!(stretched > 0);
}

#[test]
fn low_heart_rate_folds_at_double_rate() {
    let shape = ChunkShape::new(6, 1, 2, 2);
    let n = 32;
    let batch = synthetic_batch(n, shape, "p");
    let mut aug = augmentor(55.0, AugPolicy::Generic);
    let mut rng = StdRng::seed_from_u64(99);
    let out = aug.augment(&batch, &mut rng).unwrap();

    let frame_len = shape.frame_len();
    let half = shape.frames / 2;
    let video = unflipped_video(&out.batch, out.flipped);
    let mut folded = 0;
    for (idx, branch) in out.branches.iter().enumerate() {
        let src = batch.sample_video(idx);
        let dst = &video[idx * shape.video_len()..(idx + 1) * shape.video_len()];
        let dst_labels = out.batch.sample_labels(idx);
        match branch {
            TemporalBranch::Downsample => {
                folded += 1;
                for t in 0..half {
                    assert_eq!(
                        &dst[t * frame_len..(t + 1) * frame_len],
                        &src[2 * t * frame_len..(2 * t + 1) * frame_len]
                    );
                    assert_eq!(dst_labels[t], batch.sample_labels(idx)[2 * t]);
                }
                assert_eq!(&dst[..half * frame_len], &dst[half * frame_len..]);
                assert_eq!(&dst_labels[..half], &dst_labels[half..]);
            }
            TemporalBranch::Skipped => assert_eq!(dst, src),
            other => panic!("unexpected branch {other:?} at 55 bpm"),
        }
    }
    assert!(folded > 0);
}

#[test]
fn mid_band_and_flip_leave_labels_untouched() {
    let shape = ChunkShape::new(4, 1, 1, 4);
    let batch = synthetic_batch(8, shape, "p");
    let mut aug = augmentor(82.0, AugPolicy::Generic);
    for seed in 0..16 {
        let mut rng = StdRng::seed_from_u64(seed);
        let out = aug.augment(&batch, &mut rng).unwrap();
        assert!(out
            .branches
            .iter()
            .all(|b| matches!(b, TemporalBranch::Skipped | TemporalBranch::MidBand)));
        assert_eq!(out.batch.labels, batch.labels);
        if out.flipped {
            let mut expected = batch.video.clone();
            flip_width(&mut expected, shape.width);
            assert_eq!(out.batch.video, expected);
        } else {
            assert_eq!(out.batch.video, batch.video);
        }
    }
}

#[test]
fn vipl_policy_only_stretches_fold_members() {
    let shape = ChunkShape::new(4, 1, 1, 1);
    let n = 32;
    let batch = synthetic_batch(n, shape, "p");
    // Subjects are "p0".."p31"; none parse as fold identifiers, so none may be stretched.
    let fold: FoldList = ["p1_v1_s1".parse::<SampleId>().unwrap()]
        .into_iter()
        .collect();
    let mut aug = augmentor(120.0, AugPolicy::ViplHr { fold });
    let mut rng = StdRng::seed_from_u64(5);
    let out = aug.augment(&batch, &mut rng).unwrap();
    assert!(out
        .branches
        .iter()
        .all(|b| matches!(b, TemporalBranch::Skipped | TemporalBranch::MidBand)));
    assert!(out.branches.contains(&TemporalBranch::MidBand));
}
