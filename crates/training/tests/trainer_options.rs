//! Config options that reach the trainer's collaborators: heart-rate cache scope and
//! capacity, the VIPL-HR fold allow-list, and mode validation at construction.

use burn::backend::{ndarray::NdArray, Autodiff};
use data_contracts::fold::write_fold;
use data_contracts::{ChunkShape, SampleId, SampleKey};
use rppg_dataset::{
    AugPolicy, BoundedHrCache, ChunkBatch, ChunkSample, DataLoaders, DatasetError,
    DatasetResult, HeartRateCache, HeartRateEstimator, InMemoryChunks,
};
use std::cell::{Cell, RefCell};
use std::path::Path;
use training::{
    NegPearsonLoss, TemporalPulseNet, TemporalPulseNetConfig, ToolboxMode, Trainer,
    TrainerConfig, TrainerError,
};

type ADBackend = Autodiff<NdArray<f32>>;

const FRAMES: usize = 8;
const SUBJECTS: usize = 16;
const VALID_FS: f32 = 16.0;

/// Mid-band heart rate for every chunk; counts calls and records the sampling rate used.
#[derive(Default)]
struct CountingHr {
    calls: Cell<usize>,
    fs_seen: RefCell<Vec<f32>>,
}

impl HeartRateEstimator for CountingHr {
    fn estimate(&self, _labels: &[f32], fs: f32, _diff: bool) -> DatasetResult<f32> {
        self.calls.set(self.calls.get() + 1);
        self.fs_seen.borrow_mut().push(fs);
        Ok(80.0)
    }
}

/// Unbounded cache that remembers how often it was cleared.
#[derive(Default)]
struct ClearCountingCache {
    inner: BoundedHrCache,
    clears: usize,
}

impl HeartRateCache for ClearCountingCache {
    fn get_or_compute(
        &mut self,
        key: &SampleKey,
        compute: &mut dyn FnMut() -> DatasetResult<f32>,
    ) -> DatasetResult<f32> {
        self.inner.get_or_compute(key, compute)
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn clear(&mut self) {
        self.clears += 1;
        self.inner.clear();
    }
}

fn shape() -> ChunkShape {
    ChunkShape::new(FRAMES, 3, 1, 2)
}

fn sample(subject: String) -> ChunkSample {
    let shape = shape();
    let labels: Vec<f32> = (0..FRAMES).map(|t| (t as f32 * 0.7).sin()).collect();
    let video = (0..shape.video_len()).map(|v| 0.5 + 0.01 * v as f32).collect();
    ChunkSample {
        subject,
        chunk_index: 0,
        video,
        labels,
    }
}

/// Four batches of four distinct subjects, so each key is seen once per epoch.
fn loaders() -> DataLoaders {
    let batches = (0..SUBJECTS / 4)
        .map(|b| {
            let samples = (0..4).map(|s| sample(format!("t{}", b * 4 + s))).collect();
            ChunkBatch::from_samples(shape(), samples).unwrap()
        })
        .collect();
    let mut loaders = DataLoaders::default();
    loaders.train = Some(Box::new(InMemoryChunks::new(batches)));
    loaders
}

fn config(model_dir: &Path, extra: &str) -> TrainerConfig {
    let raw = format!(
        r#"
toolbox_mode = "train_and_test"

[train]
epochs = 3
lr = 0.001
batch_size = 4
model_file_name = "options"
augment = true
fs = 30.0
chunk_length = {FRAMES}
label_type = "Standardized"

[valid]
fs = {VALID_FS}

[test]
use_last_epoch = true

{extra}
"#
    );
    let mut cfg = TrainerConfig::from_toml_str(&raw).unwrap();
    cfg.model_dir = model_dir.to_path_buf();
    cfg
}

fn model() -> TemporalPulseNet<ADBackend> {
    let cfg = TemporalPulseNetConfig {
        channels: 3,
        hidden: 4,
        depth: 1,
        kernel: 3,
    };
    TemporalPulseNet::new(cfg, &Default::default())
}

fn counting_trainer(
    cfg: TrainerConfig,
) -> Trainer<ADBackend, TemporalPulseNet<ADBackend>, NegPearsonLoss, CountingHr, ClearCountingCache>
{
    Trainer::with_collaborators(
        cfg,
        model(),
        NegPearsonLoss,
        loaders(),
        CountingHr::default(),
        ClearCountingCache::default(),
        Default::default(),
    )
    .unwrap()
}

#[test]
fn epoch_scoped_cache_recomputes_every_epoch() {
    let tmp = tempfile::tempdir().unwrap();

    let mut scoped = counting_trainer(config(
        tmp.path(),
        "[augment]\nseed = 11\nepoch_scoped_cache = true",
    ));
    scoped.train().unwrap();
    let mut shared = counting_trainer(config(tmp.path(), "[augment]\nseed = 11"));
    shared.train().unwrap();

    let scoped_aug = scoped.augmentor().unwrap();
    let shared_aug = shared.augmentor().unwrap();
    assert_eq!(scoped_aug.cache().clears, 3);
    assert_eq!(shared_aug.cache().clears, 0);

    // Identical seeds give identical draws; only the cache lifetime differs.
    let scoped_calls = scoped_aug.estimator().calls.get();
    let shared_calls = shared_aug.estimator().calls.get();
    assert_eq!(shared_calls, shared_aug.cache().len());
    assert!(shared_calls <= SUBJECTS);
    assert!(scoped_calls > shared_calls);
    assert_eq!(scoped_aug.cache().inner.stats().misses, scoped_calls);
}

#[test]
fn reference_rate_uses_the_validation_sampling_rate() {
    let tmp = tempfile::tempdir().unwrap();
    let mut trainer = counting_trainer(config(tmp.path(), "[augment]\nseed = 3"));
    trainer.train().unwrap();

    let estimator = trainer.augmentor().unwrap().estimator();
    let fs_seen = estimator.fs_seen.borrow();
    assert!(!fs_seen.is_empty());
    assert!(fs_seen.iter().all(|fs| *fs == VALID_FS));
}

#[test]
fn cache_capacity_reaches_the_trainer_cache() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = config(tmp.path(), "[augment]\nseed = 5\nhr_cache_capacity = 2");
    let mut trainer = Trainer::<ADBackend, _, _>::new(
        cfg,
        model(),
        NegPearsonLoss,
        loaders(),
        Default::default(),
    )
    .unwrap();
    trainer.train().unwrap();

    let cache = trainer.augmentor().unwrap().cache();
    let stats = cache.stats();
    assert!(cache.len() <= 2);
    assert!(stats.misses > 2);
    assert_eq!(stats.misses - stats.evictions, cache.len());
}

#[test]
fn vipl_dataset_loads_the_fold_list_at_construction() {
    let tmp = tempfile::tempdir().unwrap();
    let fold_path = tmp.path().join("fold.txt");
    let ids: Vec<SampleId> = ["p1_v1_s1", "p2_v1-2_s3"]
        .iter()
        .map(|id| id.parse().unwrap())
        .collect();
    write_fold(std::fs::File::create(&fold_path).unwrap(), &ids).unwrap();

    let mut cfg = config(tmp.path(), "");
    cfg.train.dataset = "VIPL-HR".to_string();
    cfg.fold_path = fold_path;
    let trainer = Trainer::<ADBackend, _, _>::new(
        cfg.clone(),
        model(),
        NegPearsonLoss,
        loaders(),
        Default::default(),
    )
    .unwrap();
    match trainer.augmentor().unwrap().policy() {
        AugPolicy::ViplHr { fold } => {
            assert_eq!(fold.len(), 2);
            assert!(fold.contains("p2_v1-2_s3"));
        }
        other => panic!("expected the VIPL-HR policy, got {other:?}"),
    }

    cfg.fold_path = tmp.path().join("missing_fold.txt");
    let result = Trainer::<ADBackend, _, _>::new(
        cfg,
        model(),
        NegPearsonLoss,
        loaders(),
        Default::default(),
    );
    assert!(matches!(
        result,
        Err(TrainerError::Dataset(DatasetError::Contract(_)))
    ));
}

#[test]
fn zero_epochs_are_rejected_at_construction() {
    let tmp = tempfile::tempdir().unwrap();
    let mut cfg = config(tmp.path(), "");
    cfg.mode = ToolboxMode::TrainAndTest {
        epochs: 0,
        lr: 1e-3,
        use_last_epoch: true,
    };
    let result = Trainer::<ADBackend, _, _>::new(
        cfg,
        model(),
        NegPearsonLoss,
        loaders(),
        Default::default(),
    );
    assert!(matches!(result, Err(TrainerError::Config(_))));
}
