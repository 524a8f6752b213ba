use anyhow::{Context, Result};
use burn::backend::Autodiff;
use clap::Parser;
use cli_support::{init_tracing, BackendArg, LogArgs};
use rppg_dataset::{ChunkManifest, DataLoaders, FftHeartRate};
use std::path::PathBuf;
use training::config::DEFAULT_CONFIG_NAME;
use training::{
    BackendKind, HrMetrics, NegPearsonLoss, TemporalPulseNet, TemporalPulseNetConfig,
    TrainBackend, Trainer, TrainerConfig,
};

type ADBackend = Autodiff<TrainBackend>;

#[derive(Parser, Debug)]
#[command(name = "train", about = "Train and/or test an rPPG pulse model")]
struct TrainArgs {
    /// TOML run configuration.
    #[arg(long, default_value = DEFAULT_CONFIG_NAME)]
    config: PathBuf,
    /// Override the configured backend.
    #[arg(long, value_enum)]
    backend: Option<BackendArg>,
    /// Write the metrics report as JSON to this path.
    #[arg(long)]
    metrics_output: Option<PathBuf>,
    #[command(flatten)]
    log: LogArgs,
}

fn main() -> Result<()> {
    let args = TrainArgs::parse();
    init_tracing(args.log.directive())?;

    let mut cfg = TrainerConfig::from_path(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(backend) = args.backend {
        cfg = cfg.with_backend(backend.into());
    }
    if let Some(path) = args.metrics_output {
        cfg = cfg.with_metrics_output(path);
    }
    validate_backend_choice(cfg.backend)?;

    let manifest = ChunkManifest::load(&cfg.manifest)
        .with_context(|| format!("loading chunk manifest {}", cfg.manifest.display()))?;
    if manifest.shape.frames != cfg.train.chunk_length {
        anyhow::bail!(
            "manifest chunks have {} frames but train.chunk_length is {}",
            manifest.shape.frames,
            cfg.train.chunk_length
        );
    }
    let loaders = DataLoaders::from_manifest(&cfg.manifest, cfg.train.batch_size)?;

    let device = <ADBackend as burn::tensor::backend::Backend>::Device::default();
    let model = TemporalPulseNet::<ADBackend>::new(
        TemporalPulseNetConfig {
            channels: manifest.shape.channels,
            ..Default::default()
        },
        &device,
    );
    let mut trainer = Trainer::<ADBackend, _, _>::new(cfg, model, NegPearsonLoss, loaders, device)?;
    let report = trainer.run(&mut HrMetrics::new(FftHeartRate::default()))?;
    println!(
        "MAE {:.3} bpm, RMSE {:.3} bpm, MAPE {:.2}%, Pearson {} over {} subjects",
        report.mae,
        report.rmse,
        report.mape,
        report
            .pearson
            .map(|r| format!("{r:.3}"))
            .unwrap_or_else(|| "n/a".to_string()),
        report.subjects
    );
    Ok(())
}

fn validate_backend_choice(kind: BackendKind) -> Result<()> {
    let built_wgpu = cfg!(feature = "backend-wgpu");
    match (kind, built_wgpu) {
        (BackendKind::Wgpu, false) => {
            anyhow::bail!("backend-wgpu feature not enabled; rebuild with --features backend-wgpu or choose the ndarray backend")
        }
        (BackendKind::NdArray, true) => {
            tracing::warn!("built with backend-wgpu; training uses WGPU despite backend = ndarray");
        }
        _ => {}
    }
    Ok(())
}
