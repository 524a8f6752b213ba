use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

const EPS: f64 = 1e-8;

/// Loss between one predicted waveform and its label, both `[frames]`.
///
/// `epoch`, `fs` and `diff_normalized` are passed through for losses that schedule
/// frequency-domain terms; the default loss ignores them.
pub trait PulseLoss<B: Backend> {
    fn sample_loss(
        &self,
        pred: Tensor<B, 1>,
        label: Tensor<B, 1>,
        epoch: usize,
        fs: f32,
        diff_normalized: bool,
    ) -> Tensor<B, 1>;
}

/// `1 - r`, with `r` the Pearson correlation of prediction and label.
#[derive(Debug, Clone, Copy, Default)]
pub struct NegPearsonLoss;

impl<B: Backend> PulseLoss<B> for NegPearsonLoss {
    fn sample_loss(
        &self,
        pred: Tensor<B, 1>,
        label: Tensor<B, 1>,
        _epoch: usize,
        _fs: f32,
        _diff_normalized: bool,
    ) -> Tensor<B, 1> {
        let x = pred.clone() - pred.mean();
        let y = label.clone() - label.mean();
        let cov = (x.clone() * y.clone()).sum();
        let var_x = (x.clone() * x).sum();
        let var_y = (y.clone() * y).sum();
        let denom = (var_x * var_y).add_scalar(EPS).sqrt();
        (cov / denom).neg().add_scalar(1.0)
    }
}

/// Mean of the per-sample losses over a `[batch, frames]` pair.
pub(crate) fn batch_loss<B: Backend, L: PulseLoss<B>>(
    loss: &L,
    pred: Tensor<B, 2>,
    labels: Tensor<B, 2>,
    epoch: usize,
    fs: f32,
    diff_normalized: bool,
) -> Tensor<B, 1> {
    let [n, d] = pred.dims();
    let device = pred.device();
    let mut total = Tensor::<B, 1>::zeros([1], &device);
    for idx in 0..n {
        let p = pred.clone().slice([idx..idx + 1, 0..d]).reshape([d]);
        let l = labels.clone().slice([idx..idx + 1, 0..d]).reshape([d]);
        total = total + loss.sample_loss(p, l, epoch, fs, diff_normalized);
    }
    total.div_scalar(n.max(1) as f64)
}

/// Zero-mean, unit-(sample-)std per row of a `[batch, frames]` waveform.
pub(crate) fn normalize_rows<B: Backend>(pred: Tensor<B, 2>) -> Tensor<B, 2> {
    let mean = pred.clone().mean_dim(1);
    let std = pred.clone().var(1).sqrt();
    (pred - mean) / std
}
