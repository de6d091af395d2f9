//! syssim: replay an I/O trace through the disk engine and print
//! response-time statistics.
//!
//! # Usage
//!
//! ```bash
//! # Replay a trace of 10000 requests on a 2676846-sector device
//! syssim disk.toml engine.out 2676846 financial.trace 10000
//!
//! # Random single-page reads instead of a trace file
//! syssim disk.toml engine.out 2676846 - 10000 --synthetic --seed 7
//!
//! # Override driver settings
//! SYSSIM_WARMUP_FRACTION=0.5 syssim --settings replay.toml disk.toml engine.out 2676846 t.trace 500
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use tracing::{Level, info};

use syssim::{
    DiskEngine, Engine, ReplayDriver, SettingsLoader, SyntheticWorkload, TraceEnd, TraceReader,
};

/// Replays an I/O trace against a discrete-event disk simulator.
#[derive(Parser, Debug)]
#[command(name = "syssim")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Engine configuration file (TOML).
    config_path: PathBuf,

    /// Raw engine output file.
    output_path: PathBuf,

    /// Number of sectors on the simulated device.
    #[arg(allow_negative_numbers = true)]
    sector_count: i64,

    /// Trace file, one `time device block sectors direction` line per request.
    trace_path: PathBuf,

    /// Expected number of requests; sets the warm-up threshold.
    max_requests: u64,

    /// Driver settings file (TOML).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Generate random single-page reads instead of reading the trace.
    #[arg(long)]
    synthetic: bool,

    /// Seed for --synthetic.
    #[arg(long, default_value_t = SyntheticWorkload::DEFAULT_SEED)]
    seed: u64,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
                e.exit();
            }
            let _ = e.print();
            return ExitCode::FAILURE;
        }
    };

    if cli.sector_count <= 0 {
        let _ = Cli::command()
            .error(
                ErrorKind::ValueValidation,
                format!("<sector_count> must be positive, got {}", cli.sector_count),
            )
            .print();
        return ExitCode::FAILURE;
    }

    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("syssim: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    let mut loader = SettingsLoader::new();
    if let Some(path) = &cli.settings {
        loader = loader.with_file(path);
    }
    let settings = loader.load().context("failed to load driver settings")?;

    let engine = DiskEngine::initialize(&cli.config_path, &cli.output_path)
        .context("failed to initialize engine")?;
    let mut driver = ReplayDriver::new(engine, settings.clone(), cli.max_requests)?;

    info!(
        trace = %cli.trace_path.display(),
        max_requests = cli.max_requests,
        synthetic = cli.synthetic,
        "starting replay"
    );

    if cli.synthetic {
        let workload = SyntheticWorkload::new(
            cli.max_requests,
            cli.sector_count.unsigned_abs(),
            settings.sector_size,
            settings.page_size,
            cli.seed,
        )?;
        driver.replay(workload)?;
    } else {
        match TraceReader::open(&cli.trace_path) {
            Ok(mut reader) => {
                driver.replay(&mut reader)?;
                if let Some(TraceEnd::Malformed { line, .. }) = reader.end() {
                    info!(line, "trace ended at malformed line");
                }
                info!(records = reader.records_read(), "trace consumed");
            }
            Err(e) => {
                // Degrades to an empty run; shutdown and the summary still happen.
                eprintln!("syssim: {e}");
                driver.replay(std::iter::empty())?;
            }
        }
    }

    let report = driver.finish()?;
    print!("{}", report.stats.report("response time"));
    Ok(())
}
