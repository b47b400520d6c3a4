//! Converts absolute yaw/pitch readings into relative pixel displacements.
//!
//! Deltas are always taken against the immediately preceding raw sample,
//! so a reading swallowed by the deadzone still becomes the new baseline.

use crate::config::{DEADZONE, MIN_MOVEMENT, PITCH_SCALE, YAW_SCALE};
use crate::error::DecodeError;
use crate::packet;
use crate::{Displacement, OrientationSample};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeltaSettings {
    pub deadzone: f64,
    pub yaw_scale: f64,
    pub pitch_scale: f64,
    pub min_movement: i32,
}

impl Default for DeltaSettings {
    fn default() -> Self {
        Self {
            deadzone: DEADZONE,
            yaw_scale: YAW_SCALE,
            pitch_scale: PITCH_SCALE,
            min_movement: MIN_MOVEMENT,
        }
    }
}

#[derive(Debug)]
pub struct DeltaEngine {
    settings: DeltaSettings,
    prev_yaw: Option<f64>,
    prev_pitch: Option<f64>,
}

impl DeltaEngine {
    pub fn new(settings: DeltaSettings) -> Self {
        Self {
            settings,
            prev_yaw: None,
            prev_pitch: None,
        }
    }

    /// Previous (yaw, pitch), or `None` before the bootstrap sample.
    pub fn previous(&self) -> Option<(f64, f64)> {
        self.prev_yaw.zip(self.prev_pitch)
    }

    pub fn reset(&mut self) {
        self.prev_yaw = None;
        self.prev_pitch = None;
    }

    /// Decodes a datagram and feeds it through [`DeltaEngine::update`].
    /// A malformed datagram leaves the previous sample untouched.
    pub fn ingest(&mut self, datagram: &[u8]) -> Result<Option<Displacement>, DecodeError> {
        let sample = packet::decode(datagram)?;
        Ok(self.update(&sample))
    }

    /// Returns `None` for the bootstrap sample, otherwise the displacement
    /// to publish (possibly zero).
    pub fn update(&mut self, sample: &OrientationSample) -> Option<Displacement> {
        let previous = self.previous();
        self.prev_yaw = Some(sample.yaw);
        self.prev_pitch = Some(sample.pitch);

        let (prev_yaw, prev_pitch) = previous?;
        let yaw_delta = self.apply_deadzone(sample.yaw - prev_yaw);
        let pitch_delta = self.apply_deadzone(sample.pitch - prev_pitch);

        // `as` truncates toward zero; yaw is inverted so turning right moves right.
        let x_move = (-yaw_delta * self.settings.yaw_scale) as i32;
        let y_move = (pitch_delta * self.settings.pitch_scale) as i32;

        let min = self.settings.min_movement.unsigned_abs();
        if x_move.unsigned_abs() < min && y_move.unsigned_abs() < min {
            Some(Displacement::ZERO)
        } else {
            Some(Displacement::new(x_move, y_move))
        }
    }

    fn apply_deadzone(&self, delta: f64) -> f64 {
        if delta.abs() < self.settings.deadzone {
            0.0
        } else {
            delta
        }
    }
}

impl Default for DeltaEngine {
    fn default() -> Self {
        Self::new(DeltaSettings::default())
    }
}
