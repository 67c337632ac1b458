//! he-bench command-line entry point

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use he_bench::{Backend, BenchError, Driver, RunConfig, SchemeKind, SimulatedBackend};
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{filter, Layer};

/// Exit status for configuration and command-line errors.
const EXIT_CONFIG: u8 = 2;

#[derive(clap::ValueEnum, Debug, Clone, Copy)]
enum BackendKind {
    Simulated,
    #[cfg(feature = "tfhe-boolean")]
    Tfhe,
}

#[derive(Parser, Debug)]
#[command(
    name = "he-bench",
    version,
    about = "Times homomorphic-encryption primitives and writes one CSV table per benchmark case"
)]
struct Args {
    #[arg(long, help = "TOML run file; the built-in variant set is used without it")]
    config: Option<PathBuf>,
    #[arg(long, help = "directory receiving the <Kind>Results folders")]
    results_root: Option<PathBuf>,
    #[arg(long, help = "repetitions of every timed case, overriding the configuration")]
    repetitions: Option<usize>,
    #[arg(long = "scheme", value_enum, help = "only run variants of this scheme (repeatable)")]
    schemes: Vec<SchemeKind>,
    #[arg(long, help = "wall-clock budget of the whole run in seconds")]
    deadline_secs: Option<u64>,
    #[arg(long, default_value = "info")]
    log_level: filter::LevelFilter,
    #[arg(long, value_enum, default_value_t = BackendKind::Simulated)]
    backend: BackendKind,
}

fn load_config(args: &Args) -> he_bench::Result<RunConfig> {
    let mut config = match &args.config {
        Some(path) => RunConfig::from_file(path)?,
        None => RunConfig::default(),
    };
    if let Some(root) = &args.results_root {
        config.results_root.clone_from(root);
    }
    if args.deadline_secs.is_some() {
        config.deadline_secs = args.deadline_secs;
    }
    config.retain_schemes(&args.schemes);
    restrict_to_backend(&mut config, args.backend);
    if let Some(n) = args.repetitions {
        config.override_repetitions(n);
    }
    config.validate()?;
    Ok(config)
}

#[cfg(feature = "tfhe-boolean")]
fn restrict_to_backend(config: &mut RunConfig, backend: BackendKind) {
    if matches!(backend, BackendKind::Tfhe) {
        info!("tfhe backend selected, keeping boolean variants only");
        config.retain_schemes(&[SchemeKind::BooleanGate]);
    }
}

#[cfg(not(feature = "tfhe-boolean"))]
fn restrict_to_backend(_config: &mut RunConfig, _backend: BackendKind) {}

fn run<B: Backend>(backend: &B, config: &RunConfig) -> he_bench::Result<u8> {
    let report = Driver::new(backend, &config.results_root)
        .with_deadline(config.deadline())
        .run(&config.variants)?;
    report.log_summary();
    Ok(report.exit_code())
}

fn main() -> ExitCode {
    let args = Args::parse();

    let stdout_log = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(stdout_log.with_filter(args.log_level))
        .init();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    info!(
        variants = config.variants.len(),
        root = %config.results_root.display(),
        "configuration loaded"
    );

    let outcome = match args.backend {
        BackendKind::Simulated => run(&SimulatedBackend, &config),
        #[cfg(feature = "tfhe-boolean")]
        BackendKind::Tfhe => run(&he_bench::capability::tfhe_boolean::TfheBooleanBackend, &config),
    };
    match outcome {
        Ok(code) => ExitCode::from(code),
        Err(e @ BenchError::Config(_)) => {
            error!(error = %e, "invalid configuration");
            ExitCode::from(EXIT_CONFIG)
        }
        Err(e) => {
            error!(error = %e, "run aborted");
            ExitCode::FAILURE
        }
    }
}
