//! Scan a VIPL-HR tree and write the list of recordings with a trustworthy frame rate.

use anyhow::Result;
use clap::Parser;
use cli_support::{init_tracing, LogArgs};
use data_contracts::fold::DEFAULT_FOLD_FILE;
use rppg_dataset::{FoldFilter, FoldFilterConfig, FsRecordingProbe};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "filter_fold", about = "Build the VIPL-HR fold list")]
struct Args {
    /// Root of the VIPL-HR data directory (contains p1 .. p107).
    #[arg(long)]
    dataset_root: PathBuf,
    /// Fold file to write.
    #[arg(long, default_value = DEFAULT_FOLD_FILE)]
    output: PathBuf,
    #[command(flatten)]
    log: LogArgs,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log.directive())?;

    let filter = FoldFilter::new(FoldFilterConfig::vipl_v1(&args.dataset_root), FsRecordingProbe);
    let summary = filter.run_to_file(&args.output)?;
    println!(
        "{} of {} recordings kept ({} by label duration, {} by timestamps) -> {}",
        summary.accepted(),
        summary.candidates,
        summary.accepted_fallback,
        summary.accepted_timestamped,
        args.output.display()
    );
    Ok(())
}
