//! On-disk chunk store and the loaders that feed the trainer.
//!
//! A JSON manifest lists the chunks of each split; every chunk is a small little-endian
//! binary record holding one `[frames, channels, height, width]` video block followed by
//! its `frames` label values.

use crate::batch::{ChunkBatch, ChunkSample};
use crate::types::{DatasetError, DatasetResult};
use data_contracts::ChunkShape;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const CHUNK_MAGIC: &[u8; 4] = b"RPC1";
const CHUNK_VERSION: u32 = 1;
const HEADER_LEN: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Split {
    Train,
    Valid,
    Test,
}

impl Split {
    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Valid => "valid",
            Split::Test => "test",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkEntry {
    pub subject: String,
    pub chunk_index: usize,
    /// Chunk file, relative to the manifest's directory (UTF-8).
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkManifest {
    pub shape: ChunkShape,
    #[serde(default)]
    pub train: Option<Vec<ChunkEntry>>,
    #[serde(default)]
    pub valid: Option<Vec<ChunkEntry>>,
    #[serde(default)]
    pub test: Option<Vec<ChunkEntry>>,
}

impl ChunkManifest {
    pub fn new(shape: ChunkShape) -> Self {
        Self {
            shape,
            train: None,
            valid: None,
            test: None,
        }
    }

    pub fn entries(&self, split: Split) -> Option<&[ChunkEntry]> {
        match split {
            Split::Train => self.train.as_deref(),
            Split::Valid => self.valid.as_deref(),
            Split::Test => self.test.as_deref(),
        }
    }

    pub fn set_entries(&mut self, split: Split, entries: Vec<ChunkEntry>) {
        match split {
            Split::Train => self.train = Some(entries),
            Split::Valid => self.valid = Some(entries),
            Split::Test => self.test = Some(entries),
        }
    }

    pub fn load(path: &Path) -> DatasetResult<Self> {
        let raw = fs::read(path).map_err(|e| DatasetError::io(path, e))?;
        let manifest: Self = serde_json::from_slice(&raw).map_err(|e| DatasetError::Json {
            path: path.to_path_buf(),
            source: e,
        })?;
        manifest.shape.validate()?;
        Ok(manifest)
    }

    pub fn save(&self, path: &Path) -> DatasetResult<()> {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| DatasetError::io(parent, e))?;
        }
        let data = serde_json::to_vec_pretty(self).map_err(|e| DatasetError::Json {
            path: path.to_path_buf(),
            source: e,
        })?;
        fs::write(path, data).map_err(|e| DatasetError::io(path, e))
    }
}

/// Write one chunk record.
pub fn write_chunk(
    path: &Path,
    shape: ChunkShape,
    video: &[f32],
    labels: &[f32],
) -> DatasetResult<()> {
    if video.len() != shape.video_len() || labels.len() != shape.frames {
        return Err(DatasetError::Shape(format!(
            "chunk for {} has {} video and {} label values, shape {:?}",
            path.display(),
            video.len(),
            labels.len(),
            shape
        )));
    }
    let mut data = Vec::with_capacity(HEADER_LEN + 4 * (video.len() + labels.len()));
    data.extend_from_slice(CHUNK_MAGIC);
    for v in [
        CHUNK_VERSION,
        shape.frames as u32,
        shape.channels as u32,
        shape.height as u32,
        shape.width as u32,
    ] {
        data.extend_from_slice(&v.to_le_bytes());
    }
    for v in video.iter().chain(labels) {
        data.extend_from_slice(&v.to_le_bytes());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| DatasetError::io(parent, e))?;
    }
    fs::write(path, data).map_err(|e| DatasetError::io(path, e))
}

/// Read one chunk record, checking it against the manifest shape.
pub fn read_chunk(path: &Path, shape: ChunkShape) -> DatasetResult<(Vec<f32>, Vec<f32>)> {
    let data = fs::read(path).map_err(|e| DatasetError::io(path, e))?;
    if data.len() < HEADER_LEN || &data[0..4] != CHUNK_MAGIC {
        return Err(DatasetError::malformed(path, "bad chunk magic"));
    }
    let header: Vec<u32> = data[4..HEADER_LEN]
        .chunks_exact(4)
        .map(|c| {
            let mut arr = [0u8; 4];
            arr.copy_from_slice(c);
            u32::from_le_bytes(arr)
        })
        .collect();
    if header[0] != CHUNK_VERSION {
        return Err(DatasetError::malformed(
            path,
            format!("chunk version {} (expected {CHUNK_VERSION})", header[0]),
        ));
    }
    let found = ChunkShape::new(
        header[1] as usize,
        header[2] as usize,
        header[3] as usize,
        header[4] as usize,
    );
    if found != shape {
        return Err(DatasetError::Shape(format!(
            "{} has shape {:?}, manifest says {:?}",
            path.display(),
            found,
            shape
        )));
    }
    let expected = HEADER_LEN + 4 * (shape.video_len() + shape.frames);
    if data.len() != expected {
        return Err(DatasetError::malformed(
            path,
            format!("{} bytes, expected {expected}", data.len()),
        ));
    }
    let mut values = data[HEADER_LEN..].chunks_exact(4).map(|c| {
        let mut arr = [0u8; 4];
        arr.copy_from_slice(c);
        f32::from_le_bytes(arr)
    });
    let video: Vec<f32> = values.by_ref().take(shape.video_len()).collect();
    let labels: Vec<f32> = values.collect();
    Ok((video, labels))
}

/// Yields the batches of one dataset split.
pub trait ChunkSource {
    fn num_batches(&self) -> usize;
    fn batches(&self) -> Box<dyn Iterator<Item = DatasetResult<ChunkBatch>> + '_>;
}

/// Pre-assembled batches held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryChunks {
    batches: Vec<ChunkBatch>,
}

impl InMemoryChunks {
    pub fn new(batches: Vec<ChunkBatch>) -> Self {
        Self { batches }
    }
}

impl ChunkSource for InMemoryChunks {
    fn num_batches(&self) -> usize {
        self.batches.len()
    }

    fn batches(&self) -> Box<dyn Iterator<Item = DatasetResult<ChunkBatch>> + '_> {
        Box::new(self.batches.iter().cloned().map(Ok))
    }
}

/// Reads chunk records listed in a manifest split, `batch_size` at a time, in manifest order.
#[derive(Debug, Clone)]
pub struct ChunkStoreLoader {
    root: PathBuf,
    shape: ChunkShape,
    entries: Vec<ChunkEntry>,
    batch_size: usize,
}

impl ChunkStoreLoader {
    pub fn new(
        root: PathBuf,
        shape: ChunkShape,
        entries: Vec<ChunkEntry>,
        batch_size: usize,
    ) -> Self {
        Self {
            root,
            shape,
            entries,
            batch_size: batch_size.max(1),
        }
    }

    fn load_batch(&self, entries: &[ChunkEntry]) -> DatasetResult<ChunkBatch> {
        let mut samples = Vec::with_capacity(entries.len());
        for entry in entries {
            let (video, labels) = read_chunk(&self.root.join(&entry.path), self.shape)?;
            samples.push(ChunkSample {
                subject: entry.subject.clone(),
                chunk_index: entry.chunk_index,
                video,
                labels,
            });
        }
        ChunkBatch::from_samples(self.shape, samples)
    }
}

impl ChunkSource for ChunkStoreLoader {
    fn num_batches(&self) -> usize {
        self.entries.len().div_ceil(self.batch_size)
    }

    fn batches(&self) -> Box<dyn Iterator<Item = DatasetResult<ChunkBatch>> + '_> {
        Box::new(
            self.entries
                .chunks(self.batch_size)
                .map(move |chunk| self.load_batch(chunk)),
        )
    }
}

/// Train/valid/test loaders; an absent split is `None`.
#[derive(Default)]
pub struct DataLoaders {
    pub train: Option<Box<dyn ChunkSource>>,
    pub valid: Option<Box<dyn ChunkSource>>,
    pub test: Option<Box<dyn ChunkSource>>,
}

impl DataLoaders {
    pub fn from_manifest(path: &Path, batch_size: usize) -> DatasetResult<Self> {
        let manifest = ChunkManifest::load(path)?;
        let root = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let loader = |split: Split| -> Option<Box<dyn ChunkSource>> {
            manifest.entries(split).map(|entries| {
                tracing::info!(
                    split = split.as_str(),
                    chunks = entries.len(),
                    "loaded split from manifest"
                );
                Box::new(ChunkStoreLoader::new(
                    root.clone(),
                    manifest.shape,
                    entries.to_vec(),
                    batch_size,
                )) as Box<dyn ChunkSource>
            })
        };
        Ok(Self {
            train: loader(Split::Train),
            valid: loader(Split::Valid),
            test: loader(Split::Test),
        })
    }

    pub fn split(&self, split: Split) -> Option<&dyn ChunkSource> {
        match split {
            Split::Train => self.train.as_deref(),
            Split::Valid => self.valid.as_deref(),
            Split::Test => self.test.as_deref(),
        }
    }
}
