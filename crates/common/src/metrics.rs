use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::Displacement;

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct InjectionRecord {
    pub elapsed_us: u64,
    pub dx: i32,
    pub dy: i32,
    pub injected: bool,
}

/// Thread-safe trace of every attempted injection.
/// Cloning shares the same underlying list.
#[derive(Clone)]
pub struct InjectionRecorder {
    records: Arc<Mutex<Vec<InjectionRecord>>>,
    start_time: Instant,
}

impl InjectionRecorder {
    pub fn new() -> Self {
        Self {
            records: Arc::new(Mutex::new(Vec::with_capacity(10_000))),
            start_time: Instant::now(),
        }
    }

    pub fn record(&self, at: Instant, displacement: Displacement, injected: bool) {
        let elapsed = at
            .checked_duration_since(self.start_time)
            .unwrap_or(Duration::ZERO);
        if let Ok(mut data) = self.records.lock() {
            data.push(InjectionRecord {
                elapsed_us: elapsed.as_micros() as u64,
                dx: displacement.dx,
                dy: displacement.dy,
                injected,
            });
        }
    }

    pub fn get_records(&self) -> Vec<InjectionRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn save_to_csv(&self, filename: &str) -> Result<usize, csv::Error> {
        let data = self.get_records();
        let mut wtr = csv::Writer::from_path(filename)?;
        for record in &data {
            wtr.serialize(record)?;
        }
        wtr.flush()?;
        tracing::info!(records = data.len(), file = filename, "saved injection trace");
        Ok(data.len())
    }
}

impl Default for InjectionRecorder {
    fn default() -> Self {
        Self::new()
    }
}
