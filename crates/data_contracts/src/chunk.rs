use crate::error::ContractError;
use serde::{Deserialize, Serialize};

/// Per-sample chunk geometry shared by every chunk of a dataset split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkShape {
    pub frames: usize,
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

impl ChunkShape {
    pub fn new(frames: usize, channels: usize, height: usize, width: usize) -> Self {
        Self {
            frames,
            channels,
            height,
            width,
        }
    }

    /// Temporal transforms halve and double the frame axis, so it must be even.
    pub fn validate(&self) -> Result<(), ContractError> {
        if self.frames < 2 || self.frames % 2 != 0 {
            return Err(ContractError::OddFrames(self.frames));
        }
        for (name, value) in [
            ("channels", self.channels),
            ("height", self.height),
            ("width", self.width),
        ] {
            if value == 0 {
                return Err(ContractError::EmptyDimension { name });
            }
        }
        Ok(())
    }

    /// Number of values in one frame (`channels * height * width`).
    pub fn frame_len(&self) -> usize {
        self.channels * self.height * self.width
    }

    /// Number of video values in one chunk.
    pub fn video_len(&self) -> usize {
        self.frames * self.frame_len()
    }
}
