use clap::{Args, ValueEnum};

/// Logging verbosity shared by every binary.
#[derive(Debug, Clone, Args)]
pub struct LogArgs {
    /// Default filter when `RUST_LOG` is unset (e.g. "info", "rppg_dataset=debug").
    #[arg(long, default_value = "info")]
    pub log_level: String,
    /// Increase verbosity (-v debug, -vv trace); overrides --log-level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl LogArgs {
    /// The filter directive to fall back on.
    pub fn directive(&self) -> &str {
        match self.verbose {
            0 => self.log_level.as_str(),
            1 => "debug",
            _ => "trace",
        }
    }
}

impl Default for LogArgs {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            verbose: 0,
        }
    }
}

/// Compute backend requested on the command line.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendArg {
    #[value(name = "ndarray")]
    NdArray,
    #[value(name = "wgpu")]
    Wgpu,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        log: LogArgs,
        #[arg(long, value_enum)]
        backend: Option<BackendArg>,
    }

    #[test]
    fn verbosity_overrides_level() {
        let cli = Cli::parse_from(["bin", "--log-level", "warn"]);
        assert_eq!(cli.log.directive(), "warn");
        let cli = Cli::parse_from(["bin", "-vv", "--backend", "wgpu"]);
        assert_eq!(cli.log.directive(), "trace");
        assert_eq!(cli.backend, Some(BackendArg::Wgpu));
    }
}
