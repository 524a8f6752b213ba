//! Checkpoint naming, persistence and best-epoch selection.

use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::backend::Backend;

use crate::error::{TrainerError, TrainerResult};

pub const CHECKPOINT_EXT: &str = "bin";

/// `<model_dir>/<name>_Epoch<epoch>.bin`
pub fn checkpoint_path(model_dir: &Path, model_file_name: &str, epoch: usize) -> PathBuf {
    model_dir.join(format!("{model_file_name}_Epoch{epoch}.{CHECKPOINT_EXT}"))
}

pub fn save_model<B: Backend, M: Module<B>>(model: &M, path: &Path) -> TrainerResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| TrainerError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    model
        .clone()
        .save_file(path, &recorder)
        .map_err(|e| TrainerError::Checkpoint {
            path: path.to_path_buf(),
            msg: format!("failed to save: {e}"),
        })
}

pub fn load_model<B: Backend, M: Module<B>>(
    model: M,
    path: &Path,
    device: &B::Device,
) -> TrainerResult<M> {
    if !path.exists() {
        return Err(TrainerError::MissingCheckpoint {
            path: path.to_path_buf(),
        });
    }
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    model
        .load_file(path, &recorder, device)
        .map_err(|e| TrainerError::Checkpoint {
            path: path.to_path_buf(),
            msg: format!("failed to load: {e}"),
        })
}

/// Best validation epoch so far; replaced only on a strictly lower loss.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BestCheckpoint {
    best_epoch: usize,
    min_valid_loss: Option<f32>,
}

impl BestCheckpoint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one validation result; returns true when it became the new best.
    pub fn observe(&mut self, epoch: usize, valid_loss: f32) -> bool {
        let improved = self.min_valid_loss.map_or(true, |min| valid_loss < min);
        if improved {
            self.best_epoch = epoch;
            self.min_valid_loss = Some(valid_loss);
        }
        improved
    }

    pub fn best_epoch(&self) -> usize {
        self.best_epoch
    }

    pub fn min_valid_loss(&self) -> Option<f32> {
        self.min_valid_loss
    }
}
