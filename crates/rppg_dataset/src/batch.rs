//! Host-side chunk batches and their conversion to burn tensors.

use crate::types::{DatasetError, DatasetResult};
use burn::tensor::{backend::Backend, Tensor, TensorData};
use data_contracts::{ChunkShape, SampleKey};

/// One chunk as yielded by a dataset loader.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkSample {
    pub subject: String,
    pub chunk_index: usize,
    /// Frames in `[frames, channels, height, width]` order.
    pub video: Vec<f32>,
    pub labels: Vec<f32>,
}

/// A batch of chunks laid out as `[batch, frames, channels, height, width]` video and
/// `[batch, frames]` labels, with the subject id and chunk index of every row.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkBatch {
    pub shape: ChunkShape,
    pub video: Vec<f32>,
    pub labels: Vec<f32>,
    pub subjects: Vec<String>,
    pub chunk_indices: Vec<usize>,
}

impl ChunkBatch {
    pub fn new(
        shape: ChunkShape,
        video: Vec<f32>,
        labels: Vec<f32>,
        subjects: Vec<String>,
        chunk_indices: Vec<usize>,
    ) -> DatasetResult<Self> {
        shape.validate()?;
        let batch = subjects.len();
        if batch == 0 {
            return Err(DatasetError::Shape("empty batch".into()));
        }
        if chunk_indices.len() != batch {
            return Err(DatasetError::Shape(format!(
                "{} chunk indices for {batch} subjects",
                chunk_indices.len()
            )));
        }
        if video.len() != batch * shape.video_len() {
            return Err(DatasetError::Shape(format!(
                "video buffer has {} values, expected {}",
                video.len(),
                batch * shape.video_len()
            )));
        }
        if labels.len() != batch * shape.frames {
            return Err(DatasetError::Shape(format!(
                "label buffer has {} values, expected {}",
                labels.len(),
                batch * shape.frames
            )));
        }
        Ok(Self {
            shape,
            video,
            labels,
            subjects,
            chunk_indices,
        })
    }

    pub fn from_samples(shape: ChunkShape, samples: Vec<ChunkSample>) -> DatasetResult<Self> {
        let mut video = Vec::with_capacity(samples.len() * shape.video_len());
        let mut labels = Vec::with_capacity(samples.len() * shape.frames);
        let mut subjects = Vec::with_capacity(samples.len());
        let mut chunk_indices = Vec::with_capacity(samples.len());
        for sample in samples {
            if sample.video.len() != shape.video_len() || sample.labels.len() != shape.frames {
                return Err(DatasetError::Shape(format!(
                    "chunk {}#{} does not match shape {:?}",
                    sample.subject, sample.chunk_index, shape
                )));
            }
            video.extend_from_slice(&sample.video);
            labels.extend_from_slice(&sample.labels);
            subjects.push(sample.subject);
            chunk_indices.push(sample.chunk_index);
        }
        Self::new(shape, video, labels, subjects, chunk_indices)
    }

    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }

    pub fn key(&self, idx: usize) -> SampleKey {
        SampleKey::new(self.subjects[idx].clone(), self.chunk_indices[idx])
    }

    pub fn sample_video(&self, idx: usize) -> &[f32] {
        let len = self.shape.video_len();
        &self.video[idx * len..(idx + 1) * len]
    }

    pub fn sample_labels(&self, idx: usize) -> &[f32] {
        let len = self.shape.frames;
        &self.labels[idx * len..(idx + 1) * len]
    }

    pub(crate) fn sample_mut(&mut self, idx: usize) -> (&mut [f32], &mut [f32]) {
        let vlen = self.shape.video_len();
        let llen = self.shape.frames;
        (
            &mut self.video[idx * vlen..(idx + 1) * vlen],
            &mut self.labels[idx * llen..(idx + 1) * llen],
        )
    }

    /// Video as `[batch, frames, channels, height, width]`, labels as `[batch, frames]`.
    pub fn to_tensors<B: Backend>(&self, device: &B::Device) -> (Tensor<B, 5>, Tensor<B, 2>) {
        let s = self.shape;
        let n = self.len();
        let video = Tensor::<B, 5>::from_data(
            TensorData::new(self.video.clone(), [n, s.frames, s.channels, s.height, s.width]),
            device,
        );
        let labels =
            Tensor::<B, 2>::from_data(TensorData::new(self.labels.clone(), [n, s.frames]), device);
        (video, labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(subject: &str, idx: usize, shape: ChunkShape, fill: f32) -> ChunkSample {
        ChunkSample {
            subject: subject.into(),
            chunk_index: idx,
            video: vec![fill; shape.video_len()],
            labels: vec![fill; shape.frames],
        }
    }

    #[test]
    fn from_samples_concatenates_rows() {
        let shape = ChunkShape::new(2, 1, 1, 2);
        let batch = ChunkBatch::from_samples(
            shape,
            vec![sample("a", 0, shape, 1.0), sample("b", 3, shape, 2.0)],
        )
        .unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.sample_video(1), &[2.0; 4]);
        assert_eq!(batch.sample_labels(0), &[1.0; 2]);
        assert_eq!(batch.key(1), SampleKey::new("b", 3));
    }

    #[test]
    fn mismatched_chunk_is_rejected() {
        let shape = ChunkShape::new(2, 1, 1, 2);
        let mut bad = sample("a", 0, shape, 1.0);
        bad.labels.push(0.0);
        assert!(matches!(
            ChunkBatch::from_samples(shape, vec![bad]),
            Err(DatasetError::Shape(_))
        ));
        assert!(ChunkBatch::from_samples(shape, Vec::new()).is_err());
    }
}
