use crate::sensors::{EnvironmentalSensor, SensorData, SensorError};

use ::bme280::i2c::AsyncBME280;
use embassy_time::Delay;
use embedded_hal_async::i2c::I2c;
use log::{error, info};

use crate::config::{BME280_PRIMARY_ADDRESS, BME280_SECONDARY_ADDRESS};

/// BME280 on an async I2C bus
pub struct Bme280Sensor<I> {
    sensor: AsyncBME280<I>,
    address: u8,
}

impl<I: I2c> Bme280Sensor<I> {
    pub fn new(i2c: I, address: u8) -> Self {
        Self {
            sensor: AsyncBME280::new(i2c, address),
            address,
        }
    }

    pub fn new_primary(i2c: I) -> Self {
        Self::new(i2c, BME280_PRIMARY_ADDRESS)
    }

    pub fn new_secondary(i2c: I) -> Self {
        Self::new(i2c, BME280_SECONDARY_ADDRESS)
    }
}

impl<I: I2c> EnvironmentalSensor for Bme280Sensor<I> {
    fn address(&self) -> u8 {
        self.address
    }

    async fn probe(&mut self) -> Result<(), SensorError> {
        let address = self.address;

        self.sensor.init(&mut Delay).await.map_err(|e| {
            error!("BME280 0x{:x} init failed: {:?}", address, e);
            SensorError::NotFound { address }
        })?;

        info!("BME280 0x{:x}: calibration data loaded", address);
        Ok(())
    }

    async fn read(&mut self) -> Result<SensorData, SensorError> {
        let address = self.address;

        let measurements = self.sensor.measure(&mut Delay).await.map_err(|e| {
            error!("BME280 0x{:x} measurement failed: {:?}", address, e);
            SensorError::ReadFailed {
                address,
                details: "I2C communication error or invalid data",
            }
        })?;

        Ok(SensorData::new(
            measurements.temperature,
            measurements.humidity,
            measurements.pressure,
        ))
    }
}
