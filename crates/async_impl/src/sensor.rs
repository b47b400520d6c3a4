use std::future::poll_fn;
use std::io;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::ReadBuf;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use common::packet::{is_oversized, RECV_BUFFER_SIZE};
use common::{DeltaEngine, DisplacementCell, PipelineDiagnostics, StopReason};

/// Readiness-driven source of datagrams for the decoder task.
pub trait DatagramSource: Send + 'static {
    /// Fills `buf` with one datagram once it is available.
    fn poll_recv(&mut self, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>>;
}

impl DatagramSource for UdpSocket {
    fn poll_recv(&mut self, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        self.poll_recv_from(cx, buf).map_ok(|_from| ())
    }
}

fn poll_datagram<S: DatagramSource>(
    source: &mut S,
    cx: &mut Context<'_>,
    buf: &mut [u8],
) -> Poll<io::Result<usize>> {
    let mut read_buf = ReadBuf::new(buf);
    match source.poll_recv(cx, &mut read_buf) {
        Poll::Ready(Ok(())) => Poll::Ready(Ok(read_buf.filled().len())),
        Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
        Poll::Pending => Poll::Pending,
    }
}

pub async fn run_sensor_task<S: DatagramSource>(
    mut source: S,
    mut engine: DeltaEngine,
    cell: Arc<dyn DisplacementCell>,
    diagnostics: Arc<PipelineDiagnostics>,
    shutdown: CancellationToken,
    stop_tx: mpsc::UnboundedSender<StopReason>,
) {
    let mut buf = [0u8; RECV_BUFFER_SIZE];

    loop {
        let received = tokio::select! {
            _ = shutdown.cancelled() => break,
            received = poll_fn(|cx| poll_datagram(&mut source, cx, &mut buf)) => received,
        };

        let len = match received {
            Ok(len) => len,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if is_oversized(&e) => {
                diagnostics.record_packet();
                diagnostics.record_malformed();
                tracing::warn!(
                    buffer = RECV_BUFFER_SIZE,
                    "skipping datagram larger than receive buffer"
                );
                continue;
            }
            Err(e) => {
                tracing::error!(error = %e, "UDP receive failed, stopping decoder");
                let _ = stop_tx.send(StopReason::TransportFailure(e.to_string()));
                shutdown.cancel();
                break;
            }
        };

        diagnostics.record_packet();
        match engine.ingest(&buf[..len]) {
            Ok(Some(displacement)) => {
                cell.set(displacement);
                diagnostics.record_published();
                tracing::trace!(dx = displacement.dx, dy = displacement.dy, "published");
            }
            Ok(None) => {
                diagnostics.record_bootstrap();
                tracing::debug!("bootstrap sample received");
            }
            Err(e) => {
                diagnostics.record_malformed();
                tracing::warn!(len, error = %e, "skipping malformed packet");
            }
        }
    }

    tracing::debug!("decoder task exiting");
}
