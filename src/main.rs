use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use tracing::info;

use common::config::load_config;
use common::pointer::default_sink;
use common::{InjectionRecorder, PointerConfig, ShutdownReport, StopReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Two OS threads
    Threaded,
    /// Two tokio tasks
    Async,
}

/// Moves the host pointer from a UDP orientation feed.
#[derive(Parser, Debug)]
#[command(name = "gyro-pointer")]
#[command(version, about, long_about = None)]
struct Args {
    /// TOML config file; built-in defaults are used when omitted
    #[arg(short, long)]
    config: Option<String>,

    /// UDP listen address (host:port), overrides the config file
    #[arg(short, long, env = "GYRO_POINTER_BIND")]
    bind: Option<String>,

    /// Pipeline runtime
    #[arg(short, long, value_enum, default_value_t = Mode::Threaded)]
    mode: Mode,

    /// Verbose logging (can be specified multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Write every attempted injection to this CSV file on exit
    #[arg(long)]
    trace_csv: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = match &args.config {
        Some(path) => load_config(path).with_context(|| format!("loading {path}"))?,
        None => PointerConfig::default(),
    }
    .with_bind_addr(args.bind.clone());
    config.validate().context("invalid configuration")?;

    info!(
        mode = ?args.mode,
        bind = %config.bind_addr,
        update_rate_ms = config.update_rate_ms,
        deadzone = config.deadzone,
        "gyro-pointer v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    let recorder = args.trace_csv.as_ref().map(|_| InjectionRecorder::new());
    let rt = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;

    let report = match args.mode {
        Mode::Threaded => run_threaded(&rt, &config, recorder.clone())?,
        Mode::Async => rt.block_on(run_async(&config, recorder.clone()))?,
    };

    if let (Some(path), Some(recorder)) = (&args.trace_csv, &recorder) {
        recorder
            .save_to_csv(path)
            .with_context(|| format!("writing injection trace to {path}"))?;
    }

    if !report.clean {
        tracing::warn!("pipeline did not shut down cleanly");
    }
    match report.reason {
        StopReason::Interrupted => {
            info!("gyro-pointer stopped");
            Ok(())
        }
        StopReason::TransportFailure(e) => bail!("stopped after transport failure: {e}"),
    }
}

fn run_threaded(
    rt: &tokio::runtime::Runtime,
    config: &PointerConfig,
    recorder: Option<InjectionRecorder>,
) -> Result<ShutdownReport> {
    let coordinator = threaded_impl::Coordinator::start(config, default_sink(), recorder)?;

    let stop = coordinator.stop_handle();
    rt.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop.interrupt();
        }
    });

    info!("press Ctrl+C to stop");
    Ok(coordinator.run_until_stopped())
}

async fn run_async(
    config: &PointerConfig,
    recorder: Option<InjectionRecorder>,
) -> Result<ShutdownReport> {
    let coordinator = async_impl::Coordinator::start(config, default_sink(), recorder).await?;

    let stop = coordinator.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop.interrupt();
        }
    });

    info!("press Ctrl+C to stop");
    Ok(coordinator.run_until_stopped().await)
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "gyro_pointer={level},common={level},threaded_impl={level},async_impl={level},warn"
        ))
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
