use std::collections::BTreeMap;

use rppg_dataset::DatasetError;

use crate::error::TrainerResult;

/// Per-subject signals keyed by chunk sort index, assembled from test batches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubjectSignals {
    chunk_len: usize,
    subjects: BTreeMap<String, BTreeMap<usize, Vec<f32>>>,
}

impl SubjectSignals {
    pub fn new(chunk_len: usize) -> Self {
        Self {
            chunk_len,
            subjects: BTreeMap::new(),
        }
    }

    pub fn chunk_len(&self) -> usize {
        self.chunk_len
    }

    /// Slice a flattened `[batch * chunk_len]` output into per-sample segments.
    ///
    /// A repeated `(subject, chunk_index)` overwrites the earlier segment.
    pub fn insert_batch(
        &mut self,
        subjects: &[String],
        chunk_indices: &[usize],
        flat: &[f32],
    ) -> TrainerResult<()> {
        if subjects.len() != chunk_indices.len() || flat.len() != subjects.len() * self.chunk_len {
            return Err(DatasetError::Shape(format!(
                "batch of {} subjects / {} indices does not match {} values at chunk length {}",
                subjects.len(),
                chunk_indices.len(),
                flat.len(),
                self.chunk_len
            ))
            .into());
        }
        for (ib, (subject, sort_index)) in subjects.iter().zip(chunk_indices).enumerate() {
            let segment = flat[ib * self.chunk_len..(ib + 1) * self.chunk_len].to_vec();
            self.subjects
                .entry(subject.clone())
                .or_default()
                .insert(*sort_index, segment);
        }
        Ok(())
    }

    pub fn subject(&self, subject: &str) -> Option<&BTreeMap<usize, Vec<f32>>> {
        self.subjects.get(subject)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeMap<usize, Vec<f32>>)> {
        self.subjects.iter()
    }

    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }

    /// A subject's chunks joined in sort order.
    pub fn concatenated(&self, subject: &str) -> Option<Vec<f32>> {
        self.subjects
            .get(subject)
            .map(|chunks| chunks.values().flatten().copied().collect())
    }

    pub fn into_inner(self) -> BTreeMap<String, BTreeMap<usize, Vec<f32>>> {
        self.subjects
    }
}
