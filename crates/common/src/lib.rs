use serde::{Deserialize, Serialize};

pub mod config;
pub mod delta;
pub mod diagnostics;
pub mod error;
pub mod metrics;
pub mod packet;
pub mod pointer;
pub mod rate_gate;
pub mod sync_strategies;

pub use config::PointerConfig;
pub use delta::DeltaEngine;
pub use diagnostics::PipelineDiagnostics;
pub use error::{ConfigError, DecodeError, PipelineError};
pub use metrics::InjectionRecorder;
pub use pointer::{InjectionResult, PointerSink};
pub use rate_gate::RateGate;
pub use sync_strategies::{AtomicCell, DisplacementCell, MutexCell};

/// One decoded orientation packet. Only yaw and pitch drive the pointer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrientationSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
}

/// Relative pointer offset in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Displacement {
    pub dx: i32,
    pub dy: i32,
}

impl Displacement {
    pub const ZERO: Displacement = Displacement { dx: 0, dy: 0 };

    pub const fn new(dx: i32, dy: i32) -> Self {
        Self { dx, dy }
    }

    pub fn is_zero(&self) -> bool {
        self.dx == 0 && self.dy == 0
    }
}

/// Why a pipeline stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// External interrupt (Ctrl+C) or an explicit stop request.
    Interrupted,
    /// The decoder's socket failed; carries the I/O error text.
    TransportFailure(String),
}

/// Outcome of a coordinator shutdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    pub reason: StopReason,
    /// Both loops exited within the grace period.
    pub clean: bool,
    pub diagnostics: diagnostics::DiagnosticsSnapshot,
}
