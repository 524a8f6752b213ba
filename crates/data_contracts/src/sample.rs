//! Recording identifiers and the composite key used to cache per-chunk data.

use crate::error::ContractError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Recording variant within a subject session.
///
/// Variants 1..=9 are plain scenarios. Three scenarios were recorded twice; their second
/// takes are labelled `1-2`, `3-2` and `9-2` and enumerate as indices 10, 11 and 12.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Variant {
    Numbered(u32),
    Retake(u32),
}

impl Variant {
    /// Map a traversal index onto the variant label used on disk.
    pub fn from_index(index: u32) -> Self {
        match index {
            10 => Variant::Retake(1),
            11 => Variant::Retake(3),
            12 => Variant::Retake(9),
            other => Variant::Numbered(other),
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Numbered(n) => write!(f, "{n}"),
            Variant::Retake(n) => write!(f, "{n}-2"),
        }
    }
}

impl FromStr for Variant {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ContractError::InvalidVariant(s.to_string());
        match s.split_once('-') {
            Some((base, "2")) => base.parse().map(Variant::Retake).map_err(|_| invalid()),
            Some(_) => Err(invalid()),
            None => s.parse().map(Variant::Numbered).map_err(|_| invalid()),
        }
    }
}

/// One recording: `p<subject>_v<variant>_s<source>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SampleId {
    pub subject: u32,
    pub variant: Variant,
    pub source: u32,
}

impl SampleId {
    pub fn new(subject: u32, variant: Variant, source: u32) -> Self {
        Self {
            subject,
            variant,
            source,
        }
    }

    /// Directory components of the recording under a dataset root: `p<k>/v<j>/source<i>`.
    pub fn relative_dir(&self) -> std::path::PathBuf {
        std::path::PathBuf::from(format!("p{}", self.subject))
            .join(format!("v{}", self.variant))
            .join(format!("source{}", self.source))
    }
}

impl fmt::Display for SampleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}_v{}_s{}", self.subject, self.variant, self.source)
    }
}

impl FromStr for SampleId {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ContractError::InvalidSampleId(s.to_string());
        let rest = s.strip_prefix('p').ok_or_else(invalid)?;
        let (subject, rest) = rest.split_once("_v").ok_or_else(invalid)?;
        let (variant, source) = rest.rsplit_once("_s").ok_or_else(invalid)?;
        Ok(Self {
            subject: subject.parse().map_err(|_| invalid())?,
            variant: variant.parse().map_err(|_| invalid())?,
            source: source.parse().map_err(|_| invalid())?,
        })
    }
}

/// Identifies one temporal chunk of one subject's recording.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SampleKey {
    pub subject: String,
    pub chunk_index: usize,
}

impl SampleKey {
    pub fn new(subject: impl Into<String>, chunk_index: usize) -> Self {
        Self {
            subject: subject.into(),
            chunk_index,
        }
    }
}

impl fmt::Display for SampleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.subject, self.chunk_index)
    }
}
