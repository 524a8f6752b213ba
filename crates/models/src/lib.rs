//! Burn models that map a chunk of face video to a pulse waveform.
//!
//! Every model consumes `[batch, frames, channels, height, width]` and produces one
//! value per frame, `[batch, frames]`. The training crate only depends on the
//! [`PulseModel`] trait, so architectures can be swapped without touching the loop.

use burn::module::Module;
use burn::nn;
use burn::nn::conv::{Conv1d, Conv1dConfig};
use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// A trainable network producing a per-frame pulse estimate.
pub trait PulseModel<B: Backend>: Module<B> {
    fn forward(&self, video: Tensor<B, 5>) -> Tensor<B, 2>;
}

#[derive(Debug, Clone)]
pub struct TemporalPulseNetConfig {
    /// Colour channels of the input video.
    pub channels: usize,
    pub hidden: usize,
    /// Number of residual temporal blocks after the stem.
    pub depth: usize,
    /// Temporal kernel size; odd so `Same` padding stays centred.
    pub kernel: usize,
}

impl Default for TemporalPulseNetConfig {
    fn default() -> Self {
        Self {
            channels: 3,
            hidden: 32,
            depth: 2,
            kernel: 5,
        }
    }
}

/// Spatially pooled colour traces followed by a stack of 1-D temporal convolutions.
#[derive(Debug, Module)]
pub struct TemporalPulseNet<B: Backend> {
    stem: Conv1d<B>,
    blocks: Vec<Conv1d<B>>,
    head: Conv1d<B>,
}

impl<B: Backend> TemporalPulseNet<B> {
    pub fn new(cfg: TemporalPulseNetConfig, device: &B::Device) -> Self {
        let conv = |c_in: usize, c_out: usize, k: usize| {
            Conv1dConfig::new(c_in, c_out, k)
                .with_padding(nn::PaddingConfig1d::Same)
                .init(device)
        };
        let kernel = cfg.kernel.max(1) | 1;
        let hidden = cfg.hidden.max(1);
        let stem = conv(cfg.channels.max(1), hidden, kernel);
        let blocks = (0..cfg.depth).map(|_| conv(hidden, hidden, kernel)).collect();
        let head = conv(hidden, 1, 1);
        Self { stem, blocks, head }
    }

    /// Mean over height and width, as `[batch, channels, frames]` with the temporal mean removed.
    fn colour_traces(video: Tensor<B, 5>) -> Tensor<B, 3> {
        let [n, d, c, _, _] = video.dims();
        let traces = video
            .mean_dim(4)
            .mean_dim(3)
            .reshape([n, d, c])
            .swap_dims(1, 2);
        traces.clone() - traces.mean_dim(2)
    }
}

impl<B: Backend> PulseModel<B> for TemporalPulseNet<B> {
    fn forward(&self, video: Tensor<B, 5>) -> Tensor<B, 2> {
        let [n, d, _, _, _] = video.dims();
        let mut x = relu(self.stem.forward(Self::colour_traces(video)));
        for block in &self.blocks {
            x = x.clone() + relu(block.forward(x));
        }
        self.head.forward(x).reshape([n, d])
    }
}

pub mod prelude {
    pub use super::{PulseModel, TemporalPulseNet, TemporalPulseNetConfig};
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn forward_keeps_batch_and_frames() {
        let device = Default::default();
        let model = TemporalPulseNet::<B>::new(TemporalPulseNetConfig::default(), &device);
        let video = Tensor::<B, 5>::ones([2, 8, 3, 4, 4], &device);
        assert_eq!(model.forward(video).dims(), [2, 8]);
    }

    #[test]
    fn even_kernel_is_rounded_up() {
        let device = Default::default();
        let cfg = TemporalPulseNetConfig {
            channels: 1,
            hidden: 4,
            depth: 1,
            kernel: 4,
        };
        let model = TemporalPulseNet::<B>::new(cfg, &device);
        let video = Tensor::<B, 5>::zeros([1, 6, 1, 2, 2], &device);
        assert_eq!(model.forward(video).dims(), [1, 6]);
    }
}
