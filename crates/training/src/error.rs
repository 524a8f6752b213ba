use rppg_dataset::DatasetError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrainerError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("failed to read config {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("no data for {0}")]
    MissingSplit(&'static str),
    #[error("checkpoint {path} does not exist; check the model path in your config")]
    MissingCheckpoint { path: PathBuf },
    #[error("checkpoint {path}: {msg}")]
    Checkpoint { path: PathBuf, msg: String },
    #[error("tensor readback failed: {0}")]
    Tensor(String),
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error("metrics: {0}")]
    Metrics(String),
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<data_contracts::ContractError> for TrainerError {
    fn from(err: data_contracts::ContractError) -> Self {
        TrainerError::Dataset(DatasetError::Contract(err))
    }
}

pub type TrainerResult<T> = Result<T, TrainerError>;
