use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::CellStrategy;
use crate::Displacement;

/// Single-slot register shared by the decoder and the actuator.
///
/// Writers overwrite, readers see the latest write. There is no queue:
/// values overwritten before a read are never observed.
pub trait DisplacementCell: Send + Sync {
    fn set(&self, displacement: Displacement);
    fn get(&self) -> Displacement;
    /// Reads the current value and leaves `(0, 0)` behind.
    fn take(&self) -> Displacement;
}

/// Strategy 1: one mutex guarding both fields.
#[derive(Default)]
pub struct MutexCell {
    value: Mutex<Displacement>,
}

impl MutexCell {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DisplacementCell for MutexCell {
    fn set(&self, displacement: Displacement) {
        // A poisoned lock still holds a plain Copy value; keep going.
        let mut slot = self.value.lock().unwrap_or_else(|e| e.into_inner());
        *slot = displacement;
    }

    fn get(&self) -> Displacement {
        *self.value.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn take(&self) -> Displacement {
        let mut slot = self.value.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *slot)
    }
}

/// Strategy 2: lock-free, both fields packed into one 64-bit word so a
/// reader can never see `dx` from one write and `dy` from another.
#[derive(Default)]
pub struct AtomicCell {
    packed: AtomicU64,
}

impl AtomicCell {
    pub fn new() -> Self {
        Self::default()
    }

    fn pack(displacement: Displacement) -> u64 {
        ((displacement.dx as u32 as u64) << 32) | (displacement.dy as u32 as u64)
    }

    fn unpack(packed: u64) -> Displacement {
        Displacement {
            dx: (packed >> 32) as u32 as i32,
            dy: packed as u32 as i32,
        }
    }
}

impl DisplacementCell for AtomicCell {
    fn set(&self, displacement: Displacement) {
        self.packed.store(Self::pack(displacement), Ordering::Release);
    }

    fn get(&self) -> Displacement {
        Self::unpack(self.packed.load(Ordering::Acquire))
    }

    fn take(&self) -> Displacement {
        Self::unpack(self.packed.swap(0, Ordering::AcqRel))
    }
}

pub fn new_cell(strategy: CellStrategy) -> Arc<dyn DisplacementCell> {
    match strategy {
        CellStrategy::Mutex => Arc::new(MutexCell::new()),
        CellStrategy::Atomic => Arc::new(AtomicCell::new()),
    }
}
