//! Host pointer injection.
//!
//! The actuator only ever talks to a [`PointerSink`]. On Windows the real
//! sink goes through `SendInput`; elsewhere moves are logged.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::Displacement;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectionResult {
    Injected,
    Failed,
}

impl InjectionResult {
    pub fn is_injected(self) -> bool {
        matches!(self, InjectionResult::Injected)
    }
}

/// Relative pointer move primitive. Best-effort and non-blocking.
pub trait PointerSink: Send {
    fn move_relative(&mut self, dx: i32, dy: i32) -> InjectionResult;
}

impl<S: PointerSink + ?Sized> PointerSink for Box<S> {
    fn move_relative(&mut self, dx: i32, dy: i32) -> InjectionResult {
        (**self).move_relative(dx, dy)
    }
}

#[cfg(windows)]
pub use send_input::SendInputSink;

#[cfg(windows)]
mod send_input {
    use super::{InjectionResult, PointerSink};
    use winapi::um::winuser::{SendInput, INPUT, INPUT_MOUSE, MOUSEEVENTF_MOVE, MOUSEINPUT};

    #[derive(Debug, Default)]
    pub struct SendInputSink;

    impl PointerSink for SendInputSink {
        fn move_relative(&mut self, dx: i32, dy: i32) -> InjectionResult {
            // SAFETY: INPUT is a plain C struct; zeroed is a valid bit pattern
            // and the union is written as the mouse variant before use.
            let inserted = unsafe {
                let mut input: INPUT = std::mem::zeroed();
                input.type_ = INPUT_MOUSE;
                *input.u.mi_mut() = MOUSEINPUT {
                    dx,
                    dy,
                    mouseData: 0,
                    dwFlags: MOUSEEVENTF_MOVE,
                    time: 0,
                    dwExtraInfo: 0,
                };
                SendInput(1, &mut input, std::mem::size_of::<INPUT>() as i32)
            };
            if inserted == 1 {
                InjectionResult::Injected
            } else {
                InjectionResult::Failed
            }
        }
    }
}

/// Logs moves instead of performing them.
#[derive(Debug, Default)]
pub struct DryRunSink;

impl PointerSink for DryRunSink {
    fn move_relative(&mut self, dx: i32, dy: i32) -> InjectionResult {
        tracing::debug!(dx, dy, "dry-run pointer move");
        InjectionResult::Injected
    }
}

/// Records every call with its timestamp. Clones share the record list.
#[derive(Clone, Default)]
pub struct RecordingSink {
    moves: Arc<Mutex<Vec<(Instant, Displacement)>>>,
    fail: Arc<AtomicBool>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent calls report failure (they are still recorded).
    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::Relaxed);
    }

    pub fn moves(&self) -> Vec<(Instant, Displacement)> {
        self.moves.lock().map(|m| m.clone()).unwrap_or_default()
    }

    pub fn displacements(&self) -> Vec<Displacement> {
        self.moves().into_iter().map(|(_, d)| d).collect()
    }

    pub fn count(&self) -> usize {
        self.moves.lock().map(|m| m.len()).unwrap_or(0)
    }
}

impl PointerSink for RecordingSink {
    fn move_relative(&mut self, dx: i32, dy: i32) -> InjectionResult {
        if let Ok(mut moves) = self.moves.lock() {
            moves.push((Instant::now(), Displacement::new(dx, dy)));
        }
        if self.fail.load(Ordering::Relaxed) {
            InjectionResult::Failed
        } else {
            InjectionResult::Injected
        }
    }
}

/// The host's native sink, or [`DryRunSink`] where none is available.
pub fn default_sink() -> Box<dyn PointerSink> {
    #[cfg(windows)]
    {
        Box::new(SendInputSink)
    }
    #[cfg(not(windows))]
    {
        tracing::warn!("no native pointer injection on this platform, using dry-run sink");
        Box::new(DryRunSink)
    }
}
