use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::time::Duration;

use crate::delta::DeltaSettings;
use crate::error::ConfigError;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:4242";
pub const DEADZONE: f64 = 0.2;
pub const YAW_SCALE: f64 = 40.0;
pub const PITCH_SCALE: f64 = 40.0;
pub const MIN_MOVEMENT: i32 = 1;
pub const MOUSE_UPDATE_RATE_MS: u64 = 10;
pub const POLL_INTERVAL_MS: u64 = 1;
pub const SHUTDOWN_GRACE_MS: u64 = 1000;

/// Which shared-cell implementation carries the displacement between loops.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CellStrategy {
    #[default]
    Mutex,
    Atomic,
}

/// What the actuator does with a displacement once it has been applied.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReplayPolicy {
    /// Leave the value in place; it is re-applied every window until the
    /// decoder overwrites it.
    #[default]
    Repeat,
    /// Clear the cell when an actuation tick reads it.
    ConsumeOnce,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PointerConfig {
    pub bind_addr: String,
    pub deadzone: f64,
    pub yaw_scale: f64,
    pub pitch_scale: f64,
    pub min_movement: i32,
    pub update_rate_ms: u64,
    pub poll_interval_ms: u64,
    pub shutdown_grace_ms: u64,
    pub cell: CellStrategy,
    pub replay: ReplayPolicy,
}

impl Default for PointerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            deadzone: DEADZONE,
            yaw_scale: YAW_SCALE,
            pitch_scale: PITCH_SCALE,
            min_movement: MIN_MOVEMENT,
            update_rate_ms: MOUSE_UPDATE_RATE_MS,
            poll_interval_ms: POLL_INTERVAL_MS,
            shutdown_grace_ms: SHUTDOWN_GRACE_MS,
            cell: CellStrategy::default(),
            replay: ReplayPolicy::default(),
        }
    }
}

pub fn load_config(path: &str) -> Result<PointerConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_string(),
        source,
    })?;
    PointerConfig::from_toml_str(&content)
}

impl PointerConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: PointerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.socket_addr()?;

        if !self.deadzone.is_finite() || self.deadzone < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "deadzone",
                reason: format!("must be a non-negative number, got {}", self.deadzone),
            });
        }
        if !self.yaw_scale.is_finite() {
            return Err(ConfigError::InvalidValue {
                field: "yaw_scale",
                reason: "must be finite".to_string(),
            });
        }
        if !self.pitch_scale.is_finite() {
            return Err(ConfigError::InvalidValue {
                field: "pitch_scale",
                reason: "must be finite".to_string(),
            });
        }
        if self.min_movement < 0 {
            return Err(ConfigError::InvalidValue {
                field: "min_movement",
                reason: format!("must not be negative, got {}", self.min_movement),
            });
        }
        if self.update_rate_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "update_rate_ms",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind_addr
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidBindAddr(self.bind_addr.clone()))
    }

    pub fn with_bind_addr(mut self, bind_addr: Option<String>) -> Self {
        if let Some(addr) = bind_addr {
            self.bind_addr = addr;
        }
        self
    }

    pub fn delta_settings(&self) -> DeltaSettings {
        DeltaSettings {
            deadzone: self.deadzone,
            yaw_scale: self.yaw_scale,
            pitch_scale: self.pitch_scale,
            min_movement: self.min_movement,
        }
    }

    pub fn update_rate(&self) -> Duration {
        Duration::from_millis(self.update_rate_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}
