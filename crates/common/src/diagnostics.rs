use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Event counters shared by the decoder and the actuator.
#[derive(Default, Debug)]
pub struct PipelineDiagnostics {
    pub packets_received: AtomicU64,
    pub malformed_packets: AtomicU64,
    pub bootstrap_samples: AtomicU64,
    pub displacements_published: AtomicU64,
    pub injections: AtomicU64,
    pub failed_injections: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiagnosticsSnapshot {
    pub packets_received: u64,
    pub malformed_packets: u64,
    pub bootstrap_samples: u64,
    pub displacements_published: u64,
    pub injections: u64,
    pub failed_injections: u64,
}

impl PipelineDiagnostics {
    pub fn record_packet(&self) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.malformed_packets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bootstrap(&self) {
        self.bootstrap_samples.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_published(&self) {
        self.displacements_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_injection(&self, succeeded: bool) {
        self.injections.fetch_add(1, Ordering::Relaxed);
        if !succeeded {
            self.failed_injections.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            packets_received: self.packets_received.load(Ordering::Relaxed),
            malformed_packets: self.malformed_packets.load(Ordering::Relaxed),
            bootstrap_samples: self.bootstrap_samples.load(Ordering::Relaxed),
            displacements_published: self.displacements_published.load(Ordering::Relaxed),
            injections: self.injections.load(Ordering::Relaxed),
            failed_injections: self.failed_injections.load(Ordering::Relaxed),
        }
    }

    pub fn log_summary(&self) {
        let s = self.snapshot();
        tracing::info!(
            packets = s.packets_received,
            malformed = s.malformed_packets,
            bootstrap = s.bootstrap_samples,
            published = s.displacements_published,
            injections = s.injections,
            failed_injections = s.failed_injections,
            "pipeline summary"
        );
    }
}
