use embassy_time::Duration;
use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

use crate::debug_stream::OverflowPolicy;
use crate::sensors::SensorId;

/// BME280 address with SDO tied to ground
pub const BME280_PRIMARY_ADDRESS: u8 = 0x76;
/// BME280 address with SDO tied to VDDIO
pub const BME280_SECONDARY_ADDRESS: u8 = 0x77;

/// Error types for configuration validation
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// A window must average at least one sample
    #[error("Sample window must contain at least one sample")]
    EmptyWindow,

    /// A change threshold is negative or not a finite number
    #[error("Invalid change threshold for {channel}")]
    InvalidThreshold {
        /// Channel the threshold applies to
        channel: &'static str,
    },
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct Config {
    pub sensor: SensorConfig,
    pub debug: DebugConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sensor.reader.validate()
    }
}

/// Identity and wiring of one sensor
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct SensorConfig {
    pub id: SensorId,
    /// 7-bit I2C address of the chip
    pub address: u8,
    pub reader: ReaderConfig,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            id: SensorId::default(),
            address: BME280_PRIMARY_ADDRESS,
            reader: ReaderConfig::default(),
        }
    }
}

/// Sampling window and change detection settings
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct ReaderConfig {
    /// Minimum time between two raw samples; an update must be strictly later
    pub update_interval_ms: u64,
    /// Raw samples averaged into one reported value
    pub samples_per_window: u32,
    pub thresholds: ChangeThresholds,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            update_interval_ms: 12_000,
            samples_per_window: 5,
            thresholds: ChangeThresholds::default(),
        }
    }
}

impl ReaderConfig {
    pub const fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.samples_per_window == 0 {
            return Err(ConfigError::EmptyWindow);
        }
        self.thresholds.validate()
    }
}

/// Absolute differences that count as a meaningful change
///
/// A channel counts as changed when `|average - last_reported| >= threshold`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct ChangeThresholds {
    /// Degrees Celsius
    pub temperature: f32,
    /// Percent relative humidity
    pub humidity: f32,
    /// Millimetres of mercury
    pub pressure_mmhg: f32,
}

impl Default for ChangeThresholds {
    fn default() -> Self {
        Self {
            temperature: 0.5,
            humidity: 1.0,
            pressure_mmhg: 1.0,
        }
    }
}

impl ChangeThresholds {
    fn validate(&self) -> Result<(), ConfigError> {
        let channels = [
            ("temperature", self.temperature),
            ("humidity", self.humidity),
            ("pressure", self.pressure_mmhg),
        ];

        for (channel, threshold) in channels {
            if !threshold.is_finite() || threshold < 0.0 {
                return Err(ConfigError::InvalidThreshold { channel });
            }
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct DebugConfig {
    pub overflow_policy: OverflowPolicy,
}
