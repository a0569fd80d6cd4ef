#[cfg(feature = "sensor-bme280")]
mod bme280;
mod reader;

#[cfg(feature = "sensor-bme280")]
pub use self::bme280::Bme280Sensor;
pub use reader::{SensorReader, SensorState, UpdateOutcome};

use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

/// Pascal to millimetres of mercury
pub const PA_TO_MMHG: f32 = 0.0075006;

/// Error types for sensor communication
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// The chip did not answer the handshake at this address
    #[error("Could not find a valid BME280 sensor at address 0x{address:x}")]
    NotFound { address: u8 },

    /// A measurement could not be read
    #[error("Sensor 0x{address:x} read failed: {details}")]
    ReadFailed {
        address: u8,
        details: &'static str,
    },

    /// The handshake has not succeeded, so there is nothing to read
    #[error("Sensor 0x{address:x} is not connected")]
    NotConnected { address: u8 },
}

/// Known sensor placements
///
/// The numeric codes identify a sensor to whatever consumes its reports.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorId {
    #[default]
    Guestroom,
    Bedroom,
    Kitchen,
    Street,
}

impl SensorId {
    pub const fn code(self) -> u16 {
        match self {
            Self::Guestroom => 1000,
            Self::Bedroom => 1001,
            Self::Kitchen => 1002,
            Self::Street => 1003,
        }
    }

    pub const fn from_code(code: u16) -> Option<Self> {
        match code {
            1000 => Some(Self::Guestroom),
            1001 => Some(Self::Bedroom),
            1002 => Some(Self::Kitchen),
            1003 => Some(Self::Street),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Guestroom => "Guestroom",
            Self::Bedroom => "Bedroom",
            Self::Kitchen => "Kitchen",
            Self::Street => "Street",
        }
    }
}

/// One set of temperature, humidity and pressure values
///
/// Raw samples carry pressure in pascals; averaged values produced by
/// [`SensorReader`] carry it in mmHg.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq)]
pub struct SensorData {
    /// Degrees Celsius
    pub temperature: f32,
    /// Percent relative humidity
    pub humidity: f32,
    pub pressure: f32,
}

impl SensorData {
    pub const fn new(temperature: f32, humidity: f32, pressure: f32) -> Self {
        Self {
            temperature,
            humidity,
            pressure,
        }
    }
}

/// Trait for a temperature / humidity / pressure sensor.
///
/// Separates the reader's windowing logic from the I2C driver so the
/// reader can run against synthetic sensors on a desktop host.
pub trait EnvironmentalSensor {
    /// Bus address, used in diagnostics.
    fn address(&self) -> u8;

    /// Check that the chip is present and configure it for measurements.
    fn probe(&mut self) -> impl Future<Output = Result<(), SensorError>>;

    /// Take one raw measurement. Pressure is in pascals.
    fn read(&mut self) -> impl Future<Output = Result<SensorData, SensorError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensor_id_codes() {
        for id in [
            SensorId::Guestroom,
            SensorId::Bedroom,
            SensorId::Kitchen,
            SensorId::Street,
        ] {
            assert_eq!(SensorId::from_code(id.code()), Some(id));
        }
        assert_eq!(SensorId::Kitchen.code(), 1002);
        assert_eq!(SensorId::from_code(999), None);
    }

    #[test]
    fn test_standard_atmosphere_in_mmhg() {
        let mmhg = 101_325.0 * PA_TO_MMHG;
        assert!((mmhg - 760.0).abs() < 0.1, "got {mmhg}");
    }
}
