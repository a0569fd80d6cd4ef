//! Windowed sensor polling with change detection
//!
//! A [`SensorReader`] owns one [`EnvironmentalSensor`] and is driven by
//! periodic calls to [`SensorReader::update`]. Each call that comes more than
//! the configured interval after the previous sample takes one raw
//! measurement. Once a full window has been collected the reader averages it
//! and compares the result against the last *reported* value of each channel.
//!
//! ## Lifecycle
//!
//! ```text
//! Uninitialized --init ok--> Valid
//!       |
//!       +------init err----> Invalid (terminal, updates do nothing)
//! ```
//!
//! Reporting is edge-triggered: consumers should only act on
//! [`UpdateOutcome::Changed`].

use embassy_time::{Duration, Instant};
use log::{error, info};

use super::{EnvironmentalSensor, PA_TO_MMHG, SensorData, SensorError, SensorId};
use crate::config::{ChangeThresholds, ConfigError, ReaderConfig};
use crate::debug_print;
use crate::debug_stream::DebugSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorState {
    /// `init` has not run yet
    Uninitialized,
    /// The handshake succeeded
    Valid,
    /// The handshake failed; the reader stays idle for good
    Invalid,
}

/// What a single [`SensorReader::update`] call did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The sensor is not valid, nothing was read
    Inactive,
    /// The update interval has not elapsed yet
    Idle,
    /// A raw sample was added to the current window
    Accumulating {
        /// Samples in the window so far
        collected: u32,
    },
    /// The window completed and no channel moved past its threshold
    Unchanged,
    /// The window completed and at least one channel moved past its threshold
    Changed,
}

impl UpdateOutcome {
    pub const fn is_changed(self) -> bool {
        matches!(self, Self::Changed)
    }
}

/// Running sums of the current window
#[derive(Debug, Default, Clone, Copy)]
struct Accumulator {
    temperature: f32,
    humidity: f32,
    /// Pascals
    pressure: f32,
    count: u32,
}

impl Accumulator {
    fn add(&mut self, sample: &SensorData) {
        self.temperature += sample.temperature;
        self.humidity += sample.humidity;
        self.pressure += sample.pressure;
        self.count += 1;
    }

    /// Mean of the window with pressure converted to mmHg
    fn average(&self) -> SensorData {
        let count = self.count as f32;
        SensorData {
            temperature: self.temperature / count,
            humidity: self.humidity / count,
            pressure: self.pressure * PA_TO_MMHG / count,
        }
    }
}

/// `|last - value| >= threshold`
fn exceeds(last: f32, value: f32, threshold: f32) -> bool {
    let diff = if last > value {
        last - value
    } else {
        value - last
    };
    diff >= threshold
}

pub struct SensorReader<S> {
    sensor: S,
    id: SensorId,
    state: SensorState,
    interval: Duration,
    samples_per_window: u32,
    thresholds: ChangeThresholds,
    last_update: Instant,
    window: Accumulator,
    /// Latest window average, pressure in mmHg
    current: SensorData,
    /// Per-channel values at the time each channel last changed
    last_reported: SensorData,
}

impl<S: EnvironmentalSensor> SensorReader<S> {
    /// Create a reader with the default window (5 samples, 12 s apart)
    pub fn new(sensor: S, id: SensorId) -> Self {
        Self::build(sensor, id, ReaderConfig::default())
    }

    pub fn with_config(sensor: S, id: SensorId, config: ReaderConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(sensor, id, config))
    }

    fn build(sensor: S, id: SensorId, config: ReaderConfig) -> Self {
        Self {
            sensor,
            id,
            state: SensorState::Uninitialized,
            interval: config.update_interval(),
            samples_per_window: config.samples_per_window,
            thresholds: config.thresholds,
            last_update: Instant::from_ticks(0),
            window: Accumulator::default(),
            current: SensorData::default(),
            last_reported: SensorData::default(),
        }
    }

    pub const fn id(&self) -> SensorId {
        self.id
    }

    pub fn address(&self) -> u8 {
        self.sensor.address()
    }

    pub const fn state(&self) -> SensorState {
        self.state
    }

    pub fn is_valid(&self) -> bool {
        self.state == SensorState::Valid
    }

    pub const fn sensor(&self) -> &S {
        &self.sensor
    }

    /// Average temperature of the last completed window, in °C
    pub const fn temperature(&self) -> f32 {
        self.current.temperature
    }

    /// Average humidity of the last completed window, in %RH
    pub const fn humidity(&self) -> f32 {
        self.current.humidity
    }

    /// Average pressure of the last completed window, in mmHg
    pub const fn pressure_mmhg(&self) -> f32 {
        self.current.pressure
    }

    pub const fn current(&self) -> SensorData {
        self.current
    }

    pub const fn last_reported(&self) -> SensorData {
        self.last_reported
    }

    /// Perform the hardware handshake.
    ///
    /// Only the first call talks to the sensor; later calls return the
    /// validity decided then.
    pub async fn init<D: DebugSink>(&mut self, debug: &mut D) -> bool {
        if self.state != SensorState::Uninitialized {
            return self.is_valid();
        }

        let address = self.sensor.address();
        match self.sensor.probe().await {
            Ok(()) => {
                self.state = SensorState::Valid;
                info!("{}: sensor BME280 (0x{:x}) connected", self.id.label(), address);
                debug.print(format_args!("Sensor BME280 (0x{:x}) connected.\r\n", address));
            }
            Err(e) => {
                self.state = SensorState::Invalid;
                error!("{}: {}", self.id.label(), e);
                debug.print(format_args!(
                    "Could not find a valid BME280 sensor for 0x{:x} address.\r\n",
                    address
                ));
            }
        }

        self.is_valid()
    }

    /// Take one measurement immediately, outside of the sampling window
    pub async fn read_raw(&mut self) -> Result<SensorData, SensorError> {
        if !self.is_valid() {
            return Err(SensorError::NotConnected {
                address: self.sensor.address(),
            });
        }
        self.sensor.read().await
    }

    /// Advance the reader to `now`.
    ///
    /// A failed read is returned as an error and is not counted towards the
    /// window; the interval still restarts from `now`.
    pub async fn update<D: DebugSink>(
        &mut self,
        now: Instant,
        debug: &mut D,
    ) -> Result<UpdateOutcome, SensorError> {
        if self.state != SensorState::Valid {
            return Ok(UpdateOutcome::Inactive);
        }
        if now.saturating_duration_since(self.last_update) <= self.interval {
            return Ok(UpdateOutcome::Idle);
        }
        self.last_update = now;

        let address = self.sensor.address();
        let sample = match self.sensor.read().await {
            Ok(sample) => sample,
            Err(e) => {
                error!("{}: {}", self.id.label(), e);
                debug.print(format_args!("Sensor 0x{:x} read failed\r\n", address));
                return Err(e);
            }
        };

        self.window.add(&sample);
        debug_print!(
            debug,
            "Sensor 0x{:x} acc - t: {}, h: {}, p: {}\r\n",
            address,
            self.window.temperature as i32,
            self.window.humidity as i32,
            self.window.pressure as i32
        );

        if self.window.count < self.samples_per_window {
            return Ok(UpdateOutcome::Accumulating {
                collected: self.window.count,
            });
        }

        self.current = self.window.average();
        self.window = Accumulator::default();

        Ok(self.detect_change(debug))
    }

    fn detect_change<D: DebugSink>(&mut self, debug: &mut D) -> UpdateOutcome {
        let current = self.current;
        let thresholds = self.thresholds;
        let mut changed = false;

        if exceeds(self.last_reported.temperature, current.temperature, thresholds.temperature) {
            self.last_reported.temperature = current.temperature;
            changed = true;
        }
        if exceeds(self.last_reported.humidity, current.humidity, thresholds.humidity) {
            self.last_reported.humidity = current.humidity;
            changed = true;
        }
        if exceeds(self.last_reported.pressure, current.pressure, thresholds.pressure_mmhg) {
            self.last_reported.pressure = current.pressure;
            changed = true;
        }

        if !changed {
            debug_print!(
                debug,
                "Data not changed: t: {} h: {} p: {}\r\n",
                current.temperature as i32,
                current.humidity as i32,
                current.pressure as i32
            );
            return UpdateOutcome::Unchanged;
        }

        info!(
            "{}: t: {} C, h: {} %, p: {} mmHg",
            self.id.label(),
            current.temperature,
            current.humidity,
            current.pressure
        );
        UpdateOutcome::Changed
    }
}
