#![recursion_limit = "256"]

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod loss;
pub mod metrics;
pub mod reconstruct;
pub mod schedule;
pub mod trainer;

pub use checkpoint::{checkpoint_path, BestCheckpoint};
pub use config::{BackendKind, LabelType, ToolboxMode, TrainerConfig};
pub use error::{TrainerError, TrainerResult};
pub use loss::{NegPearsonLoss, PulseLoss};
pub use metrics::{HrMetrics, MetricsReport, MetricsSink};
pub use models::{PulseModel, TemporalPulseNet, TemporalPulseNetConfig};
pub use reconstruct::SubjectSignals;
pub use schedule::OneCycleLr;
pub use trainer::{Trainer, TrainerPhase};

/// Backend alias for training/eval (NdArray by default; WGPU if enabled).
#[cfg(feature = "backend-wgpu")]
pub type TrainBackend = burn_wgpu::Wgpu<f32>;
#[cfg(not(feature = "backend-wgpu"))]
pub type TrainBackend = burn_ndarray::NdArray<f32>;
