use std::io;
use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use common::packet::{is_oversized, RECV_BUFFER_SIZE};
use common::{DeltaEngine, DisplacementCell, PipelineDiagnostics, StopReason};

/// Blocking source of datagrams for the decoder thread.
pub trait DatagramSource: Send {
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

impl DatagramSource for UdpSocket {
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.recv_from(buf).map(|(len, _)| len)
    }
}

pub fn run_sensor_thread<S: DatagramSource>(
    mut source: S,
    mut engine: DeltaEngine,
    cell: Arc<dyn DisplacementCell>,
    diagnostics: Arc<PipelineDiagnostics>,
    shutdown_flag: Arc<AtomicBool>,
    stop_tx: Sender<StopReason>,
) {
    let mut buf = [0u8; RECV_BUFFER_SIZE];

    while !shutdown_flag.load(Ordering::Acquire) {
        let len = match source.recv(&mut buf) {
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
                shutdown_flag.store(true, Ordering::Release);
                let _ = stop_tx.send(StopReason::TransportFailure(e.to_string()));
                return;
            }
        };

        // The coordinator's wake datagram lands here.
        if shutdown_flag.load(Ordering::Acquire) {
            break;
        }

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

    tracing::debug!("decoder thread exiting");
}
