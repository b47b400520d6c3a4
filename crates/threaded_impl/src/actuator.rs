use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use common::{DisplacementCell, PointerSink, RateGate};

pub fn run_actuator_thread(
    mut gate: RateGate,
    cell: Arc<dyn DisplacementCell>,
    mut sink: Box<dyn PointerSink>,
    poll_interval: Duration,
    shutdown_flag: Arc<AtomicBool>,
) {
    while !shutdown_flag.load(Ordering::Acquire) {
        gate.poll(Instant::now(), cell.as_ref(), sink.as_mut());
        thread::sleep(poll_interval);
    }

    tracing::debug!("actuator thread exiting");
}
