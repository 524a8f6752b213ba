//! Dataset-side machinery for rPPG training.
//!
//! This crate provides:
//! - The offline fold filter that cleans the VIPL-HR recordings list
//! - Heart-rate conditioned temporal augmentation of chunk batches
//! - The reference heart-rate estimator and its per-chunk cache
//! - Host-side chunk batches and the on-disk chunk store that feeds the trainer

pub mod aug;
pub mod batch;
pub mod cache;
pub mod fold_filter;
pub mod hr;
pub mod store;
pub mod types;

pub use aug::{AugPolicy, Augmented, TemporalAugmentor, TemporalBranch};
pub use batch::{ChunkBatch, ChunkSample};
pub use cache::{BoundedHrCache, CacheStats, HeartRateCache};
pub use fold_filter::{
    AcceptBranch, Decision, FoldFilter, FoldFilterConfig, FsRecordingProbe, Measurements,
    RecordingProbe, RejectReason,
};
pub use hr::{FftHeartRate, HeartRateEstimator};
pub use store::{
    write_chunk, ChunkEntry, ChunkManifest, ChunkSource, ChunkStoreLoader, DataLoaders,
    InMemoryChunks, Split,
};
pub use types::{DatasetError, DatasetResult};
