//! Tokio rendition of the pipeline: the decoder awaits the socket and the
//! actuator runs off an interval ticker.

pub mod actuator;
pub mod sensor;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;

use common::sync_strategies::new_cell;
use common::{
    DeltaEngine, DisplacementCell, InjectionRecorder, PipelineDiagnostics, PipelineError,
    PointerConfig, PointerSink, RateGate, ShutdownReport, StopReason,
};

pub use sensor::DatagramSource;

#[derive(Clone)]
pub struct StopHandle {
    stop_tx: mpsc::UnboundedSender<StopReason>,
}

impl StopHandle {
    pub fn interrupt(&self) {
        let _ = self.stop_tx.send(StopReason::Interrupted);
    }
}

pub struct Coordinator {
    token: CancellationToken,
    stop_tx: mpsc::UnboundedSender<StopReason>,
    stop_rx: mpsc::UnboundedReceiver<StopReason>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
    local_addr: SocketAddr,
    cell: Arc<dyn DisplacementCell>,
    diagnostics: Arc<PipelineDiagnostics>,
    shutdown_grace: Duration,
}

impl Coordinator {
    /// Binds the configured address and spawns both tasks on the current
    /// runtime.
    pub async fn start(
        config: &PointerConfig,
        sink: Box<dyn PointerSink>,
        recorder: Option<InjectionRecorder>,
    ) -> Result<Self, PipelineError> {
        let addr = config.socket_addr()?;
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| PipelineError::Bind { addr, source })?;
        let local_addr = socket
            .local_addr()
            .map_err(|source| PipelineError::Bind { addr, source })?;
        tracing::info!(%local_addr, "listening for orientation packets");

        Ok(Self::start_with_source(config, socket, local_addr, sink, recorder))
    }

    /// Spawns both tasks on an arbitrary datagram source. Must be called
    /// from within a tokio runtime.
    pub fn start_with_source<S: DatagramSource>(
        config: &PointerConfig,
        source: S,
        local_addr: SocketAddr,
        sink: Box<dyn PointerSink>,
        recorder: Option<InjectionRecorder>,
    ) -> Self {
        let token = CancellationToken::new();
        let diagnostics = Arc::new(PipelineDiagnostics::default());
        let cell = new_cell(config.cell);
        let (stop_tx, stop_rx) = mpsc::unbounded_channel();

        let sensor = tokio::spawn(sensor::run_sensor_task(
            source,
            DeltaEngine::new(config.delta_settings()),
            Arc::clone(&cell),
            Arc::clone(&diagnostics),
            token.clone(),
            stop_tx.clone(),
        ));

        let gate = RateGate::new(
            config.update_rate(),
            config.replay,
            Arc::clone(&diagnostics),
            recorder,
        );
        let actuator = tokio::spawn(actuator::run_actuator_task(
            gate,
            Arc::clone(&cell),
            sink,
            config.poll_interval(),
            token.clone(),
        ));

        Self {
            token,
            stop_tx,
            stop_rx,
            tasks: vec![("decoder", sensor), ("actuator", actuator)],
            local_addr,
            cell,
            diagnostics,
            shutdown_grace: config.shutdown_grace(),
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            stop_tx: self.stop_tx.clone(),
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn cell(&self) -> Arc<dyn DisplacementCell> {
        Arc::clone(&self.cell)
    }

    pub fn diagnostics(&self) -> Arc<PipelineDiagnostics> {
        Arc::clone(&self.diagnostics)
    }

    pub async fn run_until_stopped(mut self) -> ShutdownReport {
        let reason = self
            .stop_rx
            .recv()
            .await
            .unwrap_or(StopReason::Interrupted);
        match &reason {
            StopReason::Interrupted => tracing::info!("stop requested"),
            StopReason::TransportFailure(e) => {
                tracing::error!(error = %e, "transport failure, shutting down")
            }
        }
        self.shutdown(reason).await
    }

    /// Cancels both tasks and waits up to the grace period for them.
    /// Tasks still running after that are aborted.
    pub async fn shutdown(self, reason: StopReason) -> ShutdownReport {
        self.token.cancel();

        let deadline = Instant::now() + self.shutdown_grace;
        let mut clean = true;
        for (name, mut handle) in self.tasks {
            match timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!(task = name, error = %e, "task failed");
                    clean = false;
                }
                Err(_) => {
                    tracing::warn!(
                        task = name,
                        grace_ms = self.shutdown_grace.as_millis() as u64,
                        "task did not stop within grace period, aborting"
                    );
                    handle.abort();
                    clean = false;
                }
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
