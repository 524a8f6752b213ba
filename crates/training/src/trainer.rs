//! Epoch loop, validation-driven checkpoint selection and the test pass.

use std::marker::PhantomData;
use std::path::PathBuf;

use burn::lr_scheduler::LrScheduler;
use burn::module::AutodiffModule;
use burn::optim::{AdamWConfig, GradientsParams, Optimizer};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::Tensor;
use data_contracts::FoldList;
use models::PulseModel;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rppg_dataset::{
    AugPolicy, BoundedHrCache, DataLoaders, FftHeartRate, HeartRateCache, HeartRateEstimator,
    TemporalAugmentor,
};

use crate::checkpoint::{checkpoint_path, load_model, save_model, BestCheckpoint};
use crate::config::{ToolboxMode, TrainerConfig};
use crate::error::{TrainerError, TrainerResult};
use crate::loss::{batch_loss, normalize_rows, PulseLoss};
use crate::metrics::MetricsSink;
use crate::reconstruct::SubjectSignals;
use crate::schedule::OneCycleLr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainerPhase {
    Ready,
    Training { epoch: usize },
    Validating { epoch: usize },
    Testing,
    Done,
}

enum ModeState {
    TrainAndTest {
        epochs: usize,
        lr: f64,
        use_last_epoch: bool,
        best: BestCheckpoint,
    },
    OnlyTest {
        model_path: PathBuf,
    },
}

/// Drives one run in the configured [`ToolboxMode`].
///
/// Single-threaded: the heart-rate cache and best-checkpoint state are plain fields, so a
/// trainer must not be shared between workers.
pub struct Trainer<B: AutodiffBackend, M, L, E = FftHeartRate, C = BoundedHrCache> {
    cfg: TrainerConfig,
    device: B::Device,
    model: M,
    loss: L,
    loaders: DataLoaders,
    augmentor: Option<TemporalAugmentor<E, C>>,
    rng: StdRng,
    mode: ModeState,
    phase: TrainerPhase,
    _backend: PhantomData<B>,
}

impl<B, M, L> Trainer<B, M, L, FftHeartRate, BoundedHrCache>
where
    B: AutodiffBackend,
    M: PulseModel<B> + AutodiffModule<B>,
    <M as AutodiffModule<B>>::InnerModule: PulseModel<B::InnerBackend>,
    L: PulseLoss<B> + PulseLoss<B::InnerBackend>,
{
    /// Trainer with the FFT heart-rate estimator and a cache sized from the config.
    pub fn new(
        cfg: TrainerConfig,
        model: M,
        loss: L,
        loaders: DataLoaders,
        device: B::Device,
    ) -> TrainerResult<Self> {
        let cache = BoundedHrCache::new(cfg.augment.hr_cache_capacity);
        Self::with_collaborators(cfg, model, loss, loaders, FftHeartRate::default(), cache, device)
    }
}

impl<B, M, L, E, C> Trainer<B, M, L, E, C>
where
    B: AutodiffBackend,
    M: PulseModel<B> + AutodiffModule<B>,
    <M as AutodiffModule<B>>::InnerModule: PulseModel<B::InnerBackend>,
    L: PulseLoss<B> + PulseLoss<B::InnerBackend>,
    E: HeartRateEstimator,
    C: HeartRateCache,
{
    pub fn with_collaborators(
        cfg: TrainerConfig,
        model: M,
        loss: L,
        loaders: DataLoaders,
        estimator: E,
        cache: C,
        device: B::Device,
    ) -> TrainerResult<Self> {
        cfg.validate()?;
        let mode = match &cfg.mode {
            ToolboxMode::TrainAndTest {
                epochs,
                lr,
                use_last_epoch,
            } => ModeState::TrainAndTest {
                epochs: *epochs,
                lr: *lr,
                use_last_epoch: *use_last_epoch,
                best: BestCheckpoint::new(),
            },
            ToolboxMode::OnlyTest { model_path } => ModeState::OnlyTest {
                model_path: model_path.clone(),
            },
        };

        let augmentor = match (&mode, cfg.train.augment) {
            (ModeState::TrainAndTest { .. }, true) => {
                let policy =
                    AugPolicy::for_dataset(&cfg.train.dataset, || FoldList::load(&cfg.fold_path))?;
                if let AugPolicy::ViplHr { fold } = &policy {
                    tracing::info!(
                        path = %cfg.fold_path.display(),
                        recordings = fold.len(),
                        "loaded fold allow-list"
                    );
                }
                // Reference heart rates are estimated at the validation sampling rate.
                Some(TemporalAugmentor::new(
                    policy,
                    estimator,
                    cache,
                    cfg.valid_fs,
                    cfg.diff_normalized(),
                ))
            }
            _ => None,
        };
        let rng = match cfg.augment.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Ok(Self {
            cfg,
            device,
            model,
            loss,
            loaders,
            augmentor,
            rng,
            mode,
            phase: TrainerPhase::Ready,
            _backend: PhantomData,
        })
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.cfg
    }

    pub fn phase(&self) -> TrainerPhase {
        self.phase
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn augmentor(&self) -> Option<&TemporalAugmentor<E, C>> {
        self.augmentor.as_ref()
    }

    /// Best validation result so far; `None` in `only_test` mode.
    pub fn best(&self) -> Option<BestCheckpoint> {
        match &self.mode {
            ModeState::TrainAndTest { best, .. } => Some(*best),
            ModeState::OnlyTest { .. } => None,
        }
    }

    /// Train (when configured to) then test, handing the reconstructed signals to `sink`.
    pub fn run<S: MetricsSink>(&mut self, sink: &mut S) -> TrainerResult<S::Output> {
        if matches!(self.mode, ModeState::TrainAndTest { .. }) {
            self.train()?;
        }
        let (predictions, labels) = self.test()?;
        sink.evaluate(&predictions, &labels, &self.cfg)
    }

    /// Every epoch: (augment,) forward, normalize, loss, step; save a checkpoint; validate
    /// unless the last epoch is used for testing.
    pub fn train(&mut self) -> TrainerResult<()> {
        let ModeState::TrainAndTest {
            epochs,
            lr,
            use_last_epoch,
            ..
        } = self.mode
        else {
            return Err(TrainerError::Config(
                "training requires toolbox_mode = \"train_and_test\"".into(),
            ));
        };
        let train = self
            .loaders
            .train
            .as_deref()
            .ok_or(TrainerError::MissingSplit("train"))?;
        if !use_last_epoch && self.loaders.valid.is_none() {
            return Err(TrainerError::MissingSplit("valid"));
        }
        let steps_per_epoch = train.num_batches();
        if steps_per_epoch == 0 {
            return Err(TrainerError::MissingSplit("train"));
        }

        let mut schedule = OneCycleLr::new(lr, epochs * steps_per_epoch);
        let mut optim = AdamWConfig::new().with_weight_decay(0.0).init();
        let mut model = self.model.clone();
        let diff = self.cfg.diff_normalized();
        let fs = self.cfg.train.fs;

        for epoch in 0..epochs {
            self.phase = TrainerPhase::Training { epoch };
            if let Some(aug) = self.augmentor.as_mut() {
                if self.cfg.augment.epoch_scoped_cache {
                    aug.cache_mut().clear();
                }
            }

            let mut losses = Vec::with_capacity(steps_per_epoch);
            for batch in train.batches() {
                let batch = batch?;
                let batch = match self.augmentor.as_mut() {
                    Some(aug) => aug.augment(&batch, &mut self.rng)?.batch,
                    None => batch,
                };
                let (video, labels) = batch.to_tensors::<B>(&self.device);
                let pred = normalize_rows(model.forward(video));
                let loss = batch_loss(&self.loss, pred, labels, epoch, fs, diff);
                losses.push(scalar(loss.clone().detach())?);
                let grads = GradientsParams::from_grads(loss.backward(), &model);
                let lr = LrScheduler::step(&mut schedule);
                model = optim.step(lr, model, grads);
            }
            tracing::info!(
                epoch,
                train_loss = mean(&losses),
                lr_step = schedule.current_step(),
                "epoch finished"
            );

            self.model = model.clone();
            let path = checkpoint_path(&self.cfg.model_dir, &self.cfg.train.model_file_name, epoch);
            save_model::<B, M>(&model, &path)?;
            tracing::info!(path = %path.display(), "saved checkpoint");

            if !use_last_epoch {
                self.phase = TrainerPhase::Validating { epoch };
                let valid_loss = self.valid()?;
                tracing::info!(epoch, valid_loss, "validation finished");
                if let ModeState::TrainAndTest { best, .. } = &mut self.mode {
                    if best.observe(epoch, valid_loss) {
                        tracing::info!(epoch, valid_loss, "new best epoch");
                    }
                }
            }
        }

        if let Some(best) = self.best().filter(|_| !use_last_epoch) {
            tracing::info!(
                best_epoch = best.best_epoch(),
                min_valid_loss = ?best.min_valid_loss(),
                "training finished"
            );
        }
        self.phase = TrainerPhase::Ready;
        Ok(())
    }

    /// Mean per-sample loss over the validation split, without gradient tracking.
    pub fn valid(&self) -> TrainerResult<f32> {
        let valid = self
            .loaders
            .valid
            .as_deref()
            .ok_or(TrainerError::MissingSplit("valid"))?;
        let epochs = match &self.mode {
            ModeState::TrainAndTest { epochs, .. } => *epochs,
            ModeState::OnlyTest { .. } => 0,
        };
        let diff = self.cfg.diff_normalized();
        let model = self.model.valid();

        let mut losses = Vec::new();
        for batch in valid.batches() {
            let batch = batch?;
            let (video, labels) = batch.to_tensors::<B::InnerBackend>(&self.device);
            let pred = normalize_rows(model.forward(video));
            let [n, d] = pred.dims();
            for idx in 0..n {
                let p = pred.clone().slice([idx..idx + 1, 0..d]).reshape([d]);
                let l = labels.clone().slice([idx..idx + 1, 0..d]).reshape([d]);
                let loss = PulseLoss::<B::InnerBackend>::sample_loss(
                    &self.loss,
                    p,
                    l,
                    epochs,
                    self.cfg.valid_fs,
                    diff,
                );
                losses.push(scalar(loss)?);
            }
        }
        if losses.is_empty() {
            return Err(TrainerError::MissingSplit("valid"));
        }
        Ok(mean(&losses))
    }

    /// Load the selected checkpoint and rebuild per-subject predictions and labels.
    pub fn test(&mut self) -> TrainerResult<(SubjectSignals, SubjectSignals)> {
        let test = self
            .loaders
            .test
            .as_deref()
            .ok_or(TrainerError::MissingSplit("test"))?;
        self.phase = TrainerPhase::Testing;

        let path = match &self.mode {
            ModeState::OnlyTest { model_path } => {
                tracing::info!(path = %model_path.display(), "testing with pretrained model");
                model_path.clone()
            }
            ModeState::TrainAndTest {
                epochs,
                use_last_epoch: true,
                ..
            } => {
                let path = checkpoint_path(
                    &self.cfg.model_dir,
                    &self.cfg.train.model_file_name,
                    epochs - 1,
                );
                tracing::info!(path = %path.display(), "testing with last epoch");
                path
            }
            ModeState::TrainAndTest { best, .. } => {
                let path = checkpoint_path(
                    &self.cfg.model_dir,
                    &self.cfg.train.model_file_name,
                    best.best_epoch(),
                );
                tracing::info!(
                    path = %path.display(),
                    best_epoch = best.best_epoch(),
                    "testing with best validation epoch"
                );
                path
            }
        };
        self.model = load_model::<B, M>(self.model.clone(), &path, &self.device)?;
        let model = self.model.valid();

        let chunk_len = self.cfg.train.chunk_length;
        let mut predictions = SubjectSignals::new(chunk_len);
        let mut labels = SubjectSignals::new(chunk_len);
        for batch in test.batches() {
            let batch = batch?;
            let (video, _) = batch.to_tensors::<B::InnerBackend>(&self.device);
            let pred = normalize_rows(model.forward(video));
            let flat = pred
                .into_data()
                .convert::<f32>()
                .to_vec::<f32>()
                .map_err(|e| TrainerError::Tensor(format!("{e:?}")))?;
            predictions.insert_batch(&batch.subjects, &batch.chunk_indices, &flat)?;
            labels.insert_batch(&batch.subjects, &batch.chunk_indices, &batch.labels)?;
        }
        tracing::info!(subjects = predictions.len(), "test pass finished");
        self.phase = TrainerPhase::Done;
        Ok((predictions, labels))
    }
}

fn scalar<B: Backend>(t: Tensor<B, 1>) -> TrainerResult<f32> {
    t.into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| TrainerError::Tensor(format!("{e:?}")))?
        .first()
        .copied()
        .ok_or_else(|| TrainerError::Tensor("empty loss tensor".into()))
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f32>() / values.len() as f32
    }
}
