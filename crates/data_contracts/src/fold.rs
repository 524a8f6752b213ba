//! Fold allow-list file: one `p<subject>_v<variant>_s<source>` identifier per line.

use crate::error::ContractError;
use crate::sample::SampleId;
use std::collections::HashSet;
use std::io::{BufRead, Write};
use std::path::Path;

pub const DEFAULT_FOLD_FILE: &str = "vipl_filter_fold.txt";

/// Immutable set of subject identifiers admitted by the fold filter.
#[derive(Debug, Clone, Default)]
pub struct FoldList {
    ids: HashSet<String>,
}

impl FoldList {
    pub fn load(path: &Path) -> Result<Self, ContractError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, ContractError> {
        let mut ids = HashSet::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let id: SampleId = trimmed.parse().map_err(|e| ContractError::FoldLine {
                line: idx + 1,
                source: Box::new(e),
            })?;
            ids.insert(id.to_string());
        }
        Ok(Self { ids })
    }

    pub fn contains(&self, subject: &str) -> bool {
        self.ids.contains(subject)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl FromIterator<SampleId> for FoldList {
    fn from_iter<I: IntoIterator<Item = SampleId>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().map(|id| id.to_string()).collect(),
        }
    }
}

/// Write identifiers one per line, preserving the given order.
pub fn write_fold<W: Write>(mut out: W, ids: &[SampleId]) -> std::io::Result<()> {
    for id in ids {
        writeln!(out, "{id}")?;
    }
    out.flush()
}
