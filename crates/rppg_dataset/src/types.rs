//! Error definitions for rppg_dataset.

use data_contracts::ContractError;
use std::path::PathBuf;
use thiserror::Error;

pub type DatasetResult<T> = Result<T, DatasetError>;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("json error at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("malformed artifact {path}: {msg}")]
    MalformedArtifact { path: PathBuf, msg: String },
    #[error("batch shape mismatch: {0}")]
    Shape(String),
    #[error("heart-rate estimation failed: {0}")]
    Estimator(String),
    #[error(transparent)]
    Contract(#[from] ContractError),
}

impl DatasetError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DatasetError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn malformed(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        DatasetError::MalformedArtifact {
            path: path.into(),
            msg: msg.into(),
        }
    }
}
