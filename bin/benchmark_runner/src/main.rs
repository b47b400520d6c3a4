use std::net::{SocketAddr, UdpSocket};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use criterion::{black_box, Criterion};

use common::config::load_config;
use common::metrics::InjectionRecord;
use common::packet::encode_yaw_pitch;
use common::pointer::RecordingSink;
use common::sync_strategies::{AtomicCell, DisplacementCell, MutexCell};
use common::{DeltaEngine, Displacement, InjectionRecorder, PointerConfig, ShutdownReport, StopReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    Threaded,
    Async,
    Both,
}

/// Drives the pipeline with a synthetic orientation feed and reports how
/// the actuator kept to its minimum interval.
#[derive(Parser, Debug)]
#[command(name = "benchmark_runner")]
struct Args {
    /// Optional TOML config; the bind address is always replaced by a
    /// loopback port
    config: Option<String>,

    #[arg(value_enum, default_value_t = Mode::Both)]
    mode: Mode,

    /// How long to stream samples, in seconds
    #[arg(long, default_value_t = 5)]
    duration_secs: u64,

    /// Interval between synthetic samples, in microseconds
    #[arg(long, default_value_t = 1000)]
    sample_period_us: u64,

    /// Run criterion micro-benchmarks instead of the live pipeline
    #[arg(long)]
    criterion: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let mut config = match &args.config {
        Some(path) => load_config(path).with_context(|| format!("loading {path}"))?,
        None => PointerConfig::default(),
    };
    config.bind_addr = "127.0.0.1:0".to_string();

    println!("========================================");
    println!("Gyro Pointer Pipeline Benchmark");
    println!("========================================");
    println!("Update rate: {} ms", config.update_rate_ms);
    println!("Poll interval: {} ms", config.poll_interval_ms);
    println!("Cell strategy: {:?}", config.cell);
    println!("Replay policy: {:?}", config.replay);
    println!("Duration: {} seconds", args.duration_secs);
    println!("Sample period: {} us", args.sample_period_us);
    println!("========================================\n");

    if args.criterion {
        let mut criterion = Criterion::default()
            .sample_size(50)
            .measurement_time(Duration::from_secs(5));
        benchmark_delta_engine(&mut criterion, &config);
        benchmark_cells(&mut criterion);
        criterion.final_summary();
        println!("\nCheck target/criterion for detailed HTML reports.");
        return Ok(());
    }

    let duration = Duration::from_secs(args.duration_secs);
    let period = Duration::from_micros(args.sample_period_us);

    if matches!(args.mode, Mode::Threaded | Mode::Both) {
        println!("Running THREADED pipeline...");
        let recorder = InjectionRecorder::new();
        let sink = RecordingSink::new();
        let coordinator =
            threaded_impl::Coordinator::start(&config, Box::new(sink), Some(recorder.clone()))?;
        let target = coordinator
            .local_addr()
            .context("threaded pipeline has no socket address")?;
        stream_samples(target, duration, period)?;
        let report = coordinator.shutdown(StopReason::Interrupted);
        analyze(&report, &recorder.get_records(), &config, "THREADED");
        recorder.save_to_csv("threaded_injections.csv")?;
    }

    if matches!(args.mode, Mode::Async | Mode::Both) {
        println!("\nRunning ASYNC pipeline...");
        let rt = tokio::runtime::Runtime::new()?;
        let recorder = InjectionRecorder::new();
        let report = rt.block_on(async {
            let sink = RecordingSink::new();
            let coordinator =
                async_impl::Coordinator::start(&config, Box::new(sink), Some(recorder.clone()))
                    .await?;
            let target = coordinator.local_addr();
            tokio::task::spawn_blocking(move || stream_samples(target, duration, period))
                .await??;
            Ok::<_, anyhow::Error>(coordinator.shutdown(StopReason::Interrupted).await)
        })?;
        analyze(&report, &recorder.get_records(), &config, "ASYNC");
        recorder.save_to_csv("async_injections.csv")?;
    }

    println!("\n========================================");
    println!("Benchmark complete!");
    println!("========================================");
    Ok(())
}

/// Smooth head motion: yaw and pitch trace out an ellipse.
fn synthetic_orientation(step: u64) -> (f64, f64) {
    let phase = step as f64 * 0.05;
    (phase.sin() * 30.0, phase.cos() * 15.0)
}

fn stream_samples(target: SocketAddr, duration: Duration, period: Duration) -> Result<()> {
    let socket = UdpSocket::bind("127.0.0.1:0")?;
    let start = Instant::now();
    let mut next_tick = start;
    let mut step = 0u64;

    while start.elapsed() < duration {
        next_tick += period;
        let now = Instant::now();
        if now < next_tick {
            thread::sleep(next_tick - now);
        }

        let (yaw, pitch) = synthetic_orientation(step);
        socket.send_to(&encode_yaw_pitch(yaw, pitch), target)?;
        step += 1;
    }
    println!("Sent {} samples", step);
    Ok(())
}

fn analyze(report: &ShutdownReport, records: &[InjectionRecord], config: &PointerConfig, name: &str) {
    let stats = &report.diagnostics;
    println!("\n=== {} Analysis ===", name);
    println!("Clean shutdown: {}", report.clean);
    println!("Packets received: {}", stats.packets_received);
    println!("Malformed packets: {}", stats.malformed_packets);
    println!("Displacements published: {}", stats.displacements_published);
    println!(
        "Injections: {} ({} failed)",
        stats.injections, stats.failed_injections
    );

    if records.len() < 2 {
        println!("Not enough injections to analyze intervals");
        return;
    }

    let gaps: Vec<u64> = records
        .windows(2)
        .map(|pair| pair[1].elapsed_us - pair[0].elapsed_us)
        .collect();
    let min_gap = gaps.iter().copied().min().unwrap_or(0);
    let max_gap = gaps.iter().copied().max().unwrap_or(0);
    let avg_gap = gaps.iter().sum::<u64>() as f64 / gaps.len() as f64;
    let limit_us = config.update_rate_ms * 1000;
    let violations = gaps.iter().filter(|&&g| g < limit_us).count();

    println!(
        "Injection interval (ms): avg={:.2}, min={:.2}, max={:.2}",
        avg_gap / 1000.0,
        min_gap as f64 / 1000.0,
        max_gap as f64 / 1000.0
    );
    println!(
        "Rate limit compliance: {:.2}% ({} violations)",
        (1.0 - violations as f64 / gaps.len() as f64) * 100.0,
        violations
    );

    let coalesced = stats
        .displacements_published
        .saturating_sub(stats.injections);
    println!("Published values superseded before actuation: {}", coalesced);
}

fn benchmark_delta_engine(c: &mut Criterion, config: &PointerConfig) {
    let packets: Vec<_> = (0..1024)
        .map(|step| {
            let (yaw, pitch) = synthetic_orientation(step);
            encode_yaw_pitch(yaw, pitch)
        })
        .collect();
    let settings = config.delta_settings();

    c.bench_function("delta_engine_ingest_1024", |b| {
        b.iter(|| {
            let mut engine = DeltaEngine::new(settings);
            for packet in &packets {
                black_box(engine.ingest(black_box(packet)).ok());
            }
        });
    });
}

fn benchmark_cells(c: &mut Criterion) {
    let mutex = MutexCell::new();
    let atomic = AtomicCell::new();
    let cells: [(&str, &dyn DisplacementCell); 2] = [("mutex", &mutex), ("atomic", &atomic)];

    for (name, cell) in cells {
        c.bench_function(&format!("{name}_cell_set_get"), |b| {
            let mut i = 0i32;
            b.iter(|| {
                i = i.wrapping_add(1);
                cell.set(black_box(Displacement::new(i, -i)));
                black_box(cell.get());
            });
        });
    }
}
