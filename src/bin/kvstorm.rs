use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use kvstorm::{Harness, HarnessConfig, MemoryBackend, Mode};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    ClosedLoop,
    OpenLoopReadWrite,
    OpenLoopReadOnly,
}

impl From<ModeArg> for Mode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::ClosedLoop => Mode::ClosedLoop,
            ModeArg::OpenLoopReadWrite => Mode::OpenLoopReadWrite,
            ModeArg::OpenLoopReadOnly => Mode::OpenLoopReadOnly,
        }
    }
}

/// Workload generator and latency harness for key-value backends.
#[derive(Debug, Parser)]
#[command(name = "kvstorm", version, about)]
struct Cli {
    /// JSON configuration file; flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Load mode.
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// Closed-loop: total operations to issue. Open-loop: operations per
    /// worker.
    #[arg(long)]
    ops: Option<usize>,

    /// Worker pool size.
    #[arg(long)]
    workers: Option<usize>,

    /// Number of distinct keys.
    #[arg(long)]
    keys: Option<usize>,

    /// Probability that a closed-loop operation is a read, in [0, 1].
    #[arg(long)]
    read_fraction: Option<f64>,

    /// Length of random write payloads.
    #[arg(long)]
    value_size: Option<usize>,

    /// Skip writing initial values to every key before the run.
    #[arg(long)]
    no_prefill: bool,

    /// Emit the report as JSON instead of the text summary.
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn build_config(&self) -> kvstorm::Result<HarnessConfig> {
        let mut config = match &self.config {
            Some(path) => HarnessConfig::from_json_file(path)?,
            None => HarnessConfig::default(),
        };
        if let Some(mode) = self.mode {
            config.mode = mode.into();
        }
        if let Some(ops) = self.ops {
            match config.mode {
                Mode::ClosedLoop => config.op_quota = ops,
                Mode::OpenLoopReadWrite | Mode::OpenLoopReadOnly => config.ops_per_worker = ops,
            }
        }
        if let Some(workers) = self.workers {
            config.pool_size = workers;
        }
        if let Some(keys) = self.keys {
            config.key_space_size = keys;
        }
        if let Some(read_fraction) = self.read_fraction {
            config.read_fraction = read_fraction;
        }
        if let Some(value_size) = self.value_size {
            config.value_size = value_size;
        }
        Ok(config)
    }
}

async fn run(cli: Cli) -> kvstorm::Result<()> {
    let config = cli.build_config()?;
    let harness = Harness::new(config, MemoryBackend::new())?;

    if !cli.no_prefill {
        harness.prefill().await?;
    }
    let report = harness.run().await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{report}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "run failed");
            ExitCode::FAILURE
        }
    }
}
