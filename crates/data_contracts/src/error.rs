use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContractError {
    #[error("invalid sample id {0:?}: expected p<subject>_v<variant>_s<source>")]
    InvalidSampleId(String),
    #[error("invalid variant {0:?}")]
    InvalidVariant(String),
    #[error("fold list line {line}: {source}")]
    FoldLine {
        line: usize,
        #[source]
        source: Box<ContractError>,
    },
    #[error("io error reading fold list: {0}")]
    Io(#[from] std::io::Error),
    #[error("chunk frames must be even and >= 2, got {0}")]
    OddFrames(usize),
    #[error("chunk dimension {name} must be non-zero")]
    EmptyDimension { name: &'static str },
}
