//! Two OS threads sharing one displacement cell: a blocking UDP decoder
//! and a polling actuator.

pub mod actuator;
pub mod sensor;

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use common::sync_strategies::new_cell;
use common::{
    DeltaEngine, DisplacementCell, InjectionRecorder, PipelineDiagnostics, PipelineError,
    PointerConfig, PointerSink, RateGate, ShutdownReport, StopReason,
};

pub use sensor::DatagramSource;

/// Cloneable handle that asks a running [`Coordinator`] to stop.
#[derive(Clone)]
pub struct StopHandle {
    stop_tx: Sender<StopReason>,
}

impl StopHandle {
    pub fn interrupt(&self) {
        let _ = self.stop_tx.send(StopReason::Interrupted);
    }
}

/// Owns both pipeline threads and their shared state.
pub struct Coordinator {
    shutdown_flag: Arc<AtomicBool>,
    stop_tx: Sender<StopReason>,
    stop_rx: Receiver<StopReason>,
    done_rx: Receiver<&'static str>,
    threads: Vec<(&'static str, JoinHandle<()>)>,
    local_addr: Option<SocketAddr>,
    cell: Arc<dyn DisplacementCell>,
    diagnostics: Arc<PipelineDiagnostics>,
    shutdown_grace: Duration,
}

impl Coordinator {
    /// Binds the configured UDP address and starts both threads.
    pub fn start(
        config: &PointerConfig,
        sink: Box<dyn PointerSink>,
        recorder: Option<InjectionRecorder>,
    ) -> Result<Self, PipelineError> {
        let addr = config.socket_addr()?;
        let socket = UdpSocket::bind(addr).map_err(|source| PipelineError::Bind { addr, source })?;
        let local_addr = socket
            .local_addr()
            .map_err(|source| PipelineError::Bind { addr, source })?;
        tracing::info!(%local_addr, "listening for orientation packets");

        Self::start_with_source(config, socket, Some(local_addr), sink, recorder)
    }

    /// Starts both threads on an arbitrary datagram source. `wake_addr`,
    /// when set, receives an empty datagram on shutdown so a blocked
    /// receive returns.
    pub fn start_with_source<S: DatagramSource + 'static>(
        config: &PointerConfig,
        source: S,
        wake_addr: Option<SocketAddr>,
        sink: Box<dyn PointerSink>,
        recorder: Option<InjectionRecorder>,
    ) -> Result<Self, PipelineError> {
        let shutdown_flag = Arc::new(AtomicBool::new(false));
        let diagnostics = Arc::new(PipelineDiagnostics::default());
        let cell = new_cell(config.cell);
        let (stop_tx, stop_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();

        let engine = DeltaEngine::new(config.delta_settings());
        let gate = RateGate::new(
            config.update_rate(),
            config.replay,
            Arc::clone(&diagnostics),
            recorder,
        );

        let sensor = {
            let cell = Arc::clone(&cell);
            let diagnostics = Arc::clone(&diagnostics);
            let shutdown_flag = Arc::clone(&shutdown_flag);
            let stop_tx = stop_tx.clone();
            let done_tx = done_tx.clone();
            thread::Builder::new()
                .name("gyro-decoder".into())
                .spawn(move || {
                    sensor::run_sensor_thread(
                        source,
                        engine,
                        cell,
                        diagnostics,
                        shutdown_flag,
                        stop_tx,
                    );
                    let _ = done_tx.send("decoder");
                })
                .map_err(|source| PipelineError::Spawn {
                    name: "decoder",
                    source,
                })?
        };

        let actuator = {
            let cell = Arc::clone(&cell);
            let shutdown_flag = Arc::clone(&shutdown_flag);
            let poll_interval = config.poll_interval();
            thread::Builder::new()
                .name("gyro-actuator".into())
                .spawn(move || {
                    actuator::run_actuator_thread(gate, cell, sink, poll_interval, shutdown_flag);
                    let _ = done_tx.send("actuator");
                })
        };
        let actuator = match actuator {
            Ok(handle) => handle,
            Err(source) => {
                // Unblock and reap the decoder before reporting.
                shutdown_flag.store(true, Ordering::Release);
                if let Some(addr) = wake_addr {
                    wake(addr);
                }
                join_within("decoder", sensor, &done_rx, config.shutdown_grace());
                return Err(PipelineError::Spawn {
                    name: "actuator",
                    source,
                });
            }
        };
        let threads = vec![("decoder", sensor), ("actuator", actuator)];

        Ok(Self {
            shutdown_flag,
            stop_tx,
            stop_rx,
            done_rx,
            threads,
            local_addr: wake_addr,
            cell,
            diagnostics,
            shutdown_grace: config.shutdown_grace(),
        })
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            stop_tx: self.stop_tx.clone(),
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn cell(&self) -> Arc<dyn DisplacementCell> {
        Arc::clone(&self.cell)
    }

    pub fn diagnostics(&self) -> Arc<PipelineDiagnostics> {
        Arc::clone(&self.diagnostics)
    }

    /// Blocks until an interrupt or a transport failure, then shuts down.
    pub fn run_until_stopped(self) -> ShutdownReport {
        let reason = self.stop_rx.recv().unwrap_or(StopReason::Interrupted);
        match &reason {
            StopReason::Interrupted => tracing::info!("stop requested"),
            StopReason::TransportFailure(e) => {
                tracing::error!(error = %e, "transport failure, shutting down")
            }
        }
        self.shutdown(reason)
    }

    /// Raises the stop flag and waits up to the grace period for both
    /// threads. Threads still running after that are detached.
    pub fn shutdown(self, reason: StopReason) -> ShutdownReport {
        self.shutdown_flag.store(true, Ordering::Release);
        if let Some(addr) = self.local_addr {
            wake(addr);
        }

        let deadline = Instant::now() + self.shutdown_grace;
        let mut finished = Vec::with_capacity(self.threads.len());
        while finished.len() < self.threads.len() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.done_rx.recv_timeout(remaining) {
                Ok(name) => finished.push(name),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        let mut clean = true;
        for (name, handle) in self.threads {
            if finished.contains(&name) {
                if handle.join().is_err() {
                    tracing::error!(thread = name, "thread panicked");
                    clean = false;
                }
            } else {
                tracing::warn!(
                    thread = name,
                    grace_ms = self.shutdown_grace.as_millis() as u64,
                    "thread did not stop within grace period, detaching"
                );
                clean = false;
            }
        }

        self.diagnostics.log_summary();
        ShutdownReport {
            reason,
            clean,
            diagnostics: self.diagnostics.snapshot(),
        }
    }
}

/// Joins `handle` once it reports done on `done_rx`, detaching it if that
/// takes longer than `grace`.
fn join_within(
    name: &'static str,
    handle: JoinHandle<()>,
    done_rx: &Receiver<&'static str>,
    grace: Duration,
) -> bool {
    match done_rx.recv_timeout(grace) {
        Ok(_) => handle.join().is_ok(),
        Err(_) => {
            tracing::warn!(
                thread = name,
                grace_ms = grace.as_millis() as u64,
                "thread did not stop within grace period, detaching"
            );
            false
        }
    }
}

/// Sends an empty datagram to `addr` so a blocking receive returns.
fn wake(addr: SocketAddr) {
    let target = match addr {
        SocketAddr::V4(v4) if v4.ip().is_unspecified() => {
            SocketAddr::from((Ipv4Addr::LOCALHOST, v4.port()))
        }
        SocketAddr::V6(v6) if v6.ip().is_unspecified() => {
            SocketAddr::from((Ipv6Addr::LOCALHOST, v6.port()))
        }
        other => other,
    };
    let bind: SocketAddr = if target.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };
    match UdpSocket::bind(bind).and_then(|s| s.send_to(&[], target)) {
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, %target, "failed to wake decoder"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_within_joins_finished_thread() {
        let (done_tx, done_rx) = mpsc::channel();
        let handle = thread::spawn(move || {
            let _ = done_tx.send("worker");
        });
        assert!(join_within("worker", handle, &done_rx, Duration::from_secs(1)));
    }

    #[test]
    fn test_join_within_gives_up_after_grace() {
        let (done_tx, done_rx) = mpsc::channel::<&'static str>();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(300));
            drop(done_tx);
        });

        let started = Instant::now();
        assert!(!join_within(
            "worker",
            handle,
            &done_rx,
            Duration::from_millis(20)
        ));
        assert!(started.elapsed() < Duration::from_millis(250));
    }
}
