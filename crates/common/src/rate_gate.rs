//! Minimum-interval gate in front of the pointer sink.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::ReplayPolicy;
use crate::diagnostics::PipelineDiagnostics;
use crate::metrics::InjectionRecorder;
use crate::pointer::{InjectionResult, PointerSink};
use crate::sync_strategies::DisplacementCell;

pub struct RateGate {
    update_rate: Duration,
    replay: ReplayPolicy,
    last_injection_time: Option<Instant>,
    diagnostics: Arc<PipelineDiagnostics>,
    recorder: Option<InjectionRecorder>,
}

impl RateGate {
    pub fn new(
        update_rate: Duration,
        replay: ReplayPolicy,
        diagnostics: Arc<PipelineDiagnostics>,
        recorder: Option<InjectionRecorder>,
    ) -> Self {
        Self {
            update_rate,
            replay,
            last_injection_time: None,
            diagnostics,
            recorder,
        }
    }

    pub fn last_injection_time(&self) -> Option<Instant> {
        self.last_injection_time
    }

    /// True once `update_rate` has passed since the last injection.
    pub fn window_open(&self, now: Instant) -> bool {
        match self.last_injection_time {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.update_rate,
        }
    }

    /// One actuation tick. Returns `None` when nothing was sent.
    ///
    /// The cell is only read once the window is open, so under
    /// [`ReplayPolicy::ConsumeOnce`] a value is never cleared without
    /// being applied.
    pub fn poll(
        &mut self,
        now: Instant,
        cell: &dyn DisplacementCell,
        sink: &mut dyn PointerSink,
    ) -> Option<InjectionResult> {
        if !self.window_open(now) {
            return None;
        }

        let displacement = match self.replay {
            ReplayPolicy::Repeat => cell.get(),
            ReplayPolicy::ConsumeOnce => cell.take(),
        };
        if displacement.is_zero() {
            return None;
        }

        let result = sink.move_relative(displacement.dx, displacement.dy);
        self.last_injection_time = Some(now);
        self.diagnostics.record_injection(result.is_injected());
        if let Some(recorder) = &self.recorder {
            recorder.record(now, displacement, result.is_injected());
        }
        if !result.is_injected() {
            tracing::debug!(
                dx = displacement.dx,
                dy = displacement.dy,
                "pointer injection failed"
            );
        }
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pointer::RecordingSink;
    use crate::sync_strategies::{AtomicCell, MutexCell};
    use crate::Displacement;

    const RATE: Duration = Duration::from_millis(10);

    fn gate(replay: ReplayPolicy) -> RateGate {
        RateGate::new(RATE, replay, Arc::new(PipelineDiagnostics::default()), None)
    }

    #[test]
    fn test_zero_displacement_is_noop() {
        let cell = MutexCell::new();
        let mut sink = RecordingSink::new();
        let mut gate = gate(ReplayPolicy::Repeat);

        assert_eq!(gate.poll(Instant::now(), &cell, &mut sink), None);
        assert_eq!(gate.last_injection_time(), None);
        assert_eq!(sink.count(), 0);
    }

    #[test]
    fn test_first_nonzero_injects_immediately() {
        let cell = MutexCell::new();
        cell.set(Displacement::new(0, 20));
        let mut sink = RecordingSink::new();
        let mut gate = gate(ReplayPolicy::Repeat);

        let now = Instant::now();
        assert_eq!(gate.poll(now, &cell, &mut sink), Some(InjectionResult::Injected));
        assert_eq!(gate.last_injection_time(), Some(now));
        assert_eq!(sink.displacements(), vec![Displacement::new(0, 20)]);
    }

    #[test]
    fn test_never_injects_twice_within_rate() {
        let cell = AtomicCell::new();
        let mut sink = RecordingSink::new();
        let mut gate = gate(ReplayPolicy::Repeat);

        let t0 = Instant::now();
        cell.set(Displacement::new(1, 1));
        assert!(gate.poll(t0, &cell, &mut sink).is_some());

        for ms in 1..10 {
            cell.set(Displacement::new(ms, ms));
            let at = t0 + Duration::from_millis(ms as u64);
            assert_eq!(gate.poll(at, &cell, &mut sink), None);
        }

        assert!(gate.poll(t0 + RATE, &cell, &mut sink).is_some());
        // only the value current at the tick is applied
        assert_eq!(
            sink.displacements(),
            vec![Displacement::new(1, 1), Displacement::new(9, 9)]
        );
    }

    #[test]
    fn test_repeat_policy_redelivers_stale_value_once_per_window() {
        let cell = MutexCell::new();
        let mut sink = RecordingSink::new();
        let mut gate = gate(ReplayPolicy::Repeat);

        let t0 = Instant::now();
        for step in 0..100u64 {
            // same value republished every millisecond
            cell.set(Displacement::new(3, 0));
            gate.poll(t0 + Duration::from_millis(step), &cell, &mut sink);
        }
        // windows opening at 0, 10, ..., 90
        assert_eq!(sink.count(), 10);
    }

    #[test]
    fn test_consume_once_clears_after_apply() {
        let cell = MutexCell::new();
        let mut sink = RecordingSink::new();
        let mut gate = gate(ReplayPolicy::ConsumeOnce);

        let t0 = Instant::now();
        cell.set(Displacement::new(3, 0));
        assert!(gate.poll(t0, &cell, &mut sink).is_some());
        assert_eq!(cell.get(), Displacement::ZERO);
        assert_eq!(gate.poll(t0 + RATE * 2, &cell, &mut sink), None);
        assert_eq!(sink.count(), 1);
    }

    #[test]
    fn test_consume_once_does_not_clear_inside_window() {
        let cell = MutexCell::new();
        let mut sink = RecordingSink::new();
        let mut gate = gate(ReplayPolicy::ConsumeOnce);

        let t0 = Instant::now();
        cell.set(Displacement::new(1, 0));
        gate.poll(t0, &cell, &mut sink);
        cell.set(Displacement::new(2, 0));
        assert_eq!(gate.poll(t0 + Duration::from_millis(5), &cell, &mut sink), None);
        assert_eq!(cell.get(), Displacement::new(2, 0));
    }

    #[test]
    fn test_failures_are_swallowed_but_counted() {
        let diagnostics = Arc::new(PipelineDiagnostics::default());
        let recorder = InjectionRecorder::new();
        let mut gate = RateGate::new(
            RATE,
            ReplayPolicy::Repeat,
            Arc::clone(&diagnostics),
            Some(recorder.clone()),
        );
        let cell = MutexCell::new();
        cell.set(Displacement::new(-5, 5));
        let mut sink = RecordingSink::new();
        sink.set_failing(true);

        let now = Instant::now();
        assert_eq!(gate.poll(now, &cell, &mut sink), Some(InjectionResult::Failed));
        // an attempted injection still closes the window
        assert_eq!(gate.last_injection_time(), Some(now));

        let snapshot = diagnostics.snapshot();
        assert_eq!(snapshot.injections, 1);
        assert_eq!(snapshot.failed_injections, 1);
        assert!(!recorder.get_records()[0].injected);
    }
}
