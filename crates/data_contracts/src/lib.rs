//! Shared data contracts for rPPG recordings, fold allow-lists, and chunk shapes.

pub mod chunk;
pub mod error;
pub mod fold;
pub mod sample;

pub use chunk::ChunkShape;
pub use error::ContractError;
pub use fold::FoldList;
pub use sample::{SampleId, SampleKey, Variant};
