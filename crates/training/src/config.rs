//! Run configuration: a TOML file with optional fields, resolved once into an immutable
//! [`TrainerConfig`].

use std::path::{Path, PathBuf};

use cli_support::BackendArg;
use data_contracts::fold::DEFAULT_FOLD_FILE;
use serde::{Deserialize, Serialize};

use crate::error::{TrainerError, TrainerResult};

pub const DEFAULT_CONFIG_NAME: &str = "rppg-train.toml";

const DEFAULT_MODEL_DIR: &str = "runs/checkpoints";
const DEFAULT_MANIFEST: &str = "data/chunks/manifest.json";
const DEFAULT_FS: f32 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LabelType {
    DiffNormalized,
    Standardized,
    Raw,
}

impl LabelType {
    pub fn is_diff_normalized(&self) -> bool {
        matches!(self, LabelType::DiffNormalized)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    NdArray,
    Wgpu,
}

impl From<BackendArg> for BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::NdArray => BackendKind::NdArray,
            BackendArg::Wgpu => BackendKind::Wgpu,
        }
    }
}

/// What the run does; each mode carries only the settings it needs.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolboxMode {
    TrainAndTest {
        epochs: usize,
        lr: f64,
        /// Test with the last epoch's checkpoint and skip validation.
        use_last_epoch: bool,
    },
    OnlyTest {
        model_path: PathBuf,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainSettings {
    pub batch_size: usize,
    pub model_file_name: String,
    pub augment: bool,
    pub fs: f32,
    pub chunk_length: usize,
    pub dataset: String,
    pub label_type: LabelType,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AugmentSettings {
    /// FIFO bound on cached reference heart rates; `None` keeps every key.
    pub hr_cache_capacity: Option<usize>,
    /// Clear the heart-rate cache at the start of every epoch.
    pub epoch_scoped_cache: bool,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainerConfig {
    pub backend: BackendKind,
    /// Recorded for bookkeeping; device parallelism is the backend's concern.
    pub num_of_gpu_train: usize,
    pub mode: ToolboxMode,
    pub train: TrainSettings,
    pub valid_fs: f32,
    pub test_fs: f32,
    pub model_dir: PathBuf,
    pub manifest: PathBuf,
    pub fold_path: PathBuf,
    pub augment: AugmentSettings,
    pub metrics_output: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct TrainerConfigFile {
    backend: Option<BackendKind>,
    num_of_gpu_train: Option<usize>,
    toolbox_mode: Option<String>,
    train: Option<TrainSection>,
    valid: Option<FsSection>,
    test: Option<TestSection>,
    inference: Option<InferenceSection>,
    model: Option<ModelSection>,
    data: Option<DataSection>,
    augment: Option<AugmentSection>,
    metrics: Option<MetricsSection>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct TrainSection {
    epochs: Option<usize>,
    lr: Option<f64>,
    batch_size: Option<usize>,
    model_file_name: Option<String>,
    augment: Option<bool>,
    fs: Option<f32>,
    chunk_length: Option<usize>,
    dataset: Option<String>,
    label_type: Option<LabelType>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct FsSection {
    fs: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct TestSection {
    fs: Option<f32>,
    use_last_epoch: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct InferenceSection {
    model_path: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ModelSection {
    model_dir: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DataSection {
    manifest: Option<String>,
    fold_path: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct AugmentSection {
    hr_cache_capacity: Option<usize>,
    epoch_scoped_cache: Option<bool>,
    seed: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct MetricsSection {
    output: Option<String>,
}

impl TrainerConfig {
    pub fn from_path(path: &Path) -> TrainerResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| TrainerError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        let file: TrainerConfigFile =
            toml::from_str(&raw).map_err(|source| TrainerError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_file(file)
    }

    /// Parse a config held in memory; relative paths stay relative to the working directory.
    pub fn from_toml_str(raw: &str) -> TrainerResult<Self> {
        let file: TrainerConfigFile =
            toml::from_str(raw).map_err(|e| TrainerError::Config(e.to_string()))?;
        Self::from_file(file)
    }

    fn from_file(file: TrainerConfigFile) -> TrainerResult<Self> {
        let train = file.train.unwrap_or_default();
        let test = file.test.unwrap_or_default();

        let mode = match file.toolbox_mode.as_deref().unwrap_or("train_and_test") {
            "train_and_test" => ToolboxMode::TrainAndTest {
                epochs: train.epochs.unwrap_or(30),
                lr: train.lr.unwrap_or(9e-3),
                use_last_epoch: test.use_last_epoch.unwrap_or(false),
            },
            "only_test" => ToolboxMode::OnlyTest {
                model_path: file
                    .inference
                    .and_then(|s| s.model_path)
                    .map(PathBuf::from)
                    .unwrap_or_default(),
            },
            other => {
                return Err(TrainerError::Config(format!(
                    "unsupported toolbox_mode {other:?} (expected train_and_test or only_test)"
                )))
            }
        };

        let train_fs = train.fs.unwrap_or(DEFAULT_FS);
        let settings = TrainSettings {
            batch_size: train.batch_size.unwrap_or(4),
            model_file_name: train
                .model_file_name
                .unwrap_or_else(|| "TemporalPulseNet".to_string()),
            augment: train.augment.unwrap_or(false),
            fs: train_fs,
            chunk_length: train.chunk_length.unwrap_or(160),
            dataset: train.dataset.unwrap_or_else(|| "UBFC-rPPG".to_string()),
            label_type: train.label_type.unwrap_or(LabelType::DiffNormalized),
        };
        let data = file.data.unwrap_or_default();
        let augment = file.augment.unwrap_or_default();

        let cfg = Self {
            backend: file.backend.unwrap_or(BackendKind::NdArray),
            num_of_gpu_train: file.num_of_gpu_train.unwrap_or(1),
            mode,
            train: settings,
            valid_fs: file.valid.and_then(|v| v.fs).unwrap_or(train_fs),
            test_fs: test.fs.unwrap_or(train_fs),
            model_dir: file
                .model
                .and_then(|m| m.model_dir)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_DIR)),
            manifest: data
                .manifest
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MANIFEST)),
            fold_path: data
                .fold_path
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_FOLD_FILE)),
            augment: AugmentSettings {
                hr_cache_capacity: augment.hr_cache_capacity,
                epoch_scoped_cache: augment.epoch_scoped_cache.unwrap_or(false),
                seed: augment.seed,
            },
            metrics_output: file.metrics.and_then(|m| m.output).map(PathBuf::from),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> TrainerResult<()> {
        let bad = |msg: String| Err(TrainerError::Config(msg));
        match &self.mode {
            ToolboxMode::TrainAndTest { epochs, lr, .. } => {
                if *epochs == 0 {
                    return bad("train.epochs must be at least 1".into());
                }
                if lr.is_nan() || *lr <= 0.0 {
                    return bad(format!("train.lr must be positive, got {lr}"));
                }
            }
            ToolboxMode::OnlyTest { model_path } => {
                if model_path.as_os_str().to_string_lossy().trim().is_empty() {
                    return bad("only_test requires inference.model_path".into());
                }
            }
        }
        if self.num_of_gpu_train == 0 {
            return bad("num_of_gpu_train must be at least 1".into());
        }
        if self.train.batch_size == 0 {
            return bad("train.batch_size must be at least 1".into());
        }
        if self.train.model_file_name.trim().is_empty() {
            return bad("train.model_file_name must not be empty".into());
        }
        if self.train.chunk_length < 2 || self.train.chunk_length % 2 != 0 {
            return bad(format!(
                "train.chunk_length must be even and at least 2, got {}",
                self.train.chunk_length
            ));
        }
        for (name, fs) in [
            ("train.fs", self.train.fs),
            ("valid.fs", self.valid_fs),
            ("test.fs", self.test_fs),
        ] {
            if fs.is_nan() || fs <= 0.0 {
                return bad(format!("{name} must be positive, got {fs}"));
            }
        }
        if self.augment.hr_cache_capacity == Some(0) {
            return bad("augment.hr_cache_capacity must be at least 1 when set".into());
        }
        Ok(())
    }

    pub fn diff_normalized(&self) -> bool {
        self.train.label_type.is_diff_normalized()
    }

    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_metrics_output(mut self, output: PathBuf) -> Self {
        self.metrics_output = Some(output);
        self
    }
}
