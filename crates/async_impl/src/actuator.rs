use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use common::{DisplacementCell, PointerSink, RateGate};

/// Ticker periods below this are raised to it.
const MIN_TICK: Duration = Duration::from_micros(100);

pub async fn run_actuator_task(
    mut gate: RateGate,
    cell: Arc<dyn DisplacementCell>,
    mut sink: Box<dyn PointerSink>,
    tick: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = interval(tick.max(MIN_TICK));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                gate.poll(Instant::now(), cell.as_ref(), sink.as_mut());
            }
        }
    }

    tracing::debug!("actuator task exiting");
}
