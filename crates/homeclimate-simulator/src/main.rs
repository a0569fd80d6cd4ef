//! Desktop simulator for the homeclimate sensor reader.
//!
//! Runs a [`SensorReader`] against a synthetic BME280 on a virtual clock, so
//! the windowing, change detection and debug stream can be exercised without
//! hardware. Every `Changed` report is printed to stdout, and the debug stream
//! is drained after each tick the way the firmware hands it to its transport.
//!
//! ```text
//! homeclimate-simulator --config homeclimate.toml --ticks 600 --step-ms 1000
//! RUST_LOG=debug homeclimate-simulator --fail-every 7
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use embassy_futures::block_on;
use embassy_time::Instant;
use log::{info, warn};

use homeclimate_core::config::Config;
use homeclimate_core::sensors::{
    EnvironmentalSensor, SensorData, SensorError, SensorReader, UpdateOutcome,
};
use homeclimate_core::DebugStream;

/// Size of the buffered diagnostics, matching the firmware.
const DEBUG_STREAM_CAPACITY: usize = 512;

#[derive(Parser)]
#[command(name = "homeclimate-simulator")]
#[command(version = "0.1")]
#[command(about = "Run the BME280 sensor reader against a synthetic sensor")]
struct Cli {
    /// TOML configuration file; defaults are used when it does not exist
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Number of polling ticks to simulate
    #[arg(long, default_value_t = 300)]
    ticks: u64,

    /// Virtual time between two ticks, in milliseconds
    #[arg(long, default_value_t = 1_000)]
    step_ms: u64,

    /// Simulate a sensor that never answers the handshake
    #[arg(long)]
    sensor_offline: bool,

    /// Make every Nth raw read fail with a bus error
    #[arg(long, value_name = "N")]
    fail_every: Option<u32>,
}

/// Synthetic BME280 producing slowly drifting readings
struct SimulatedBme280 {
    address: u8,
    online: bool,
    /// Virtual seconds between two reads
    read_spacing_secs: f64,
    fail_every: Option<u32>,
    reads: u32,
}

impl SimulatedBme280 {
    fn new(address: u8, online: bool, read_spacing_ms: u64, fail_every: Option<u32>) -> Self {
        Self {
            address,
            online,
            read_spacing_secs: read_spacing_ms as f64 / 1000.0,
            fail_every,
            reads: 0,
        }
    }

    /// Reading at `t` virtual seconds. Pressure is in pascals.
    fn sample_at(t: f64) -> SensorData {
        // Temperature: 19–25 °C over a few hours with a little jitter
        let temperature = 22.0 + 3.0 * (t / 3_600.0).sin() + 0.2 * (t / 97.0).cos();

        // Humidity: 42–58 % on a longer cycle
        let humidity = 50.0 + 8.0 * (t / 5_400.0).sin();

        // Pressure: ±2 mmHg around standard atmosphere
        let pressure = 101_325.0 + 270.0 * (t / 7_200.0).sin();

        SensorData::new(temperature as f32, humidity as f32, pressure as f32)
    }
}

impl EnvironmentalSensor for SimulatedBme280 {
    fn address(&self) -> u8 {
        self.address
    }

    async fn probe(&mut self) -> Result<(), SensorError> {
        if self.online {
            Ok(())
        } else {
            Err(SensorError::NotFound {
                address: self.address,
            })
        }
    }

    async fn read(&mut self) -> Result<SensorData, SensorError> {
        self.reads += 1;

        if self.fail_every.is_some_and(|n| n > 0 && self.reads % n == 0) {
            return Err(SensorError::ReadFailed {
                address: self.address,
                details: "simulated bus error",
            });
        }

        let t = f64::from(self.reads) * self.read_spacing_secs;
        Ok(Self::sample_at(t))
    }
}

/// Load the configuration file, falling back to defaults when it is missing.
fn load_config(path: Option<&Path>) -> Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };

    if !path.exists() {
        info!("{} not found, using defaults", path.display());
        return Ok(Config::default());
    }

    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    parse_config(&contents)
        .with_context(|| format!("Failed to parse config from {}", path.display()))
}

fn parse_config(contents: &str) -> Result<Config> {
    let config: Config = toml::from_str(contents)?;
    config
        .validate()
        .map_err(|e| anyhow!("Invalid configuration: {e}"))?;
    Ok(config)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    let sensor = SimulatedBme280::new(
        config.sensor.address,
        !cli.sensor_offline,
        config.sensor.reader.update_interval_ms,
        cli.fail_every,
    );
    let mut reader = SensorReader::with_config(sensor, config.sensor.id, config.sensor.reader)
        .map_err(|e| anyhow!("Invalid reader configuration: {e}"))?;
    let mut stream: DebugStream<DEBUG_STREAM_CAPACITY> =
        DebugStream::with_policy(config.debug.overflow_policy);

    info!(
        "Simulating {} (0x{:x}) for {} ticks of {} ms",
        config.sensor.id.label(),
        config.sensor.address,
        cli.ticks,
        cli.step_ms
    );

    if !block_on(reader.init(&mut stream)) {
        warn!("Sensor handshake failed; the reader will stay idle");
    }

    let mut changes = 0;
    for tick in 1..=cli.ticks {
        let now = Instant::from_millis(tick * cli.step_ms);

        match block_on(reader.update(now, &mut stream)) {
            Ok(outcome) if outcome.is_changed() => {
                changes += 1;
                println!(
                    "[{:>8.1}s] {} {}: t: {:.2} C, h: {:.2} %, p: {:.2} mmHg",
                    now.as_millis() as f64 / 1000.0,
                    reader.id().code(),
                    reader.id().label(),
                    reader.temperature(),
                    reader.humidity(),
                    reader.pressure_mmhg()
                );
            }
            Ok(_) => {}
            Err(e) => warn!("tick {tick}: {e}"),
        }

        stream.pop_with(|bytes| print!("{}", String::from_utf8_lossy(bytes)));
    }

    info!("Done: {changes} change reports");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use homeclimate_core::SensorId;
    use homeclimate_core::debug_stream::{NullSink, OverflowPolicy};

    #[test]
    fn test_parse_example_config() {
        let config = parse_config(include_str!("../homeclimate.toml")).unwrap();

        assert_eq!(config.sensor.id, SensorId::Kitchen);
        assert_eq!(config.sensor.address, 0x76);
        assert_eq!(config.sensor.reader.samples_per_window, 5);
        assert_eq!(config.debug.overflow_policy, OverflowPolicy::ClearAndRetry);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = parse_config("[sensor]\nid = \"Street\"\naddress = 0x77\n").unwrap();

        assert_eq!(config.sensor.id, SensorId::Street);
        assert_eq!(config.sensor.address, 0x77);
        assert_eq!(config.sensor.reader.update_interval_ms, 12_000);
        assert_eq!(config.debug.overflow_policy, OverflowPolicy::ClearAndRetry);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = parse_config("[sensor.reader]\nsamples_per_window = 0\n");

        assert!(result.is_err());
    }

    #[test]
    fn test_missing_config_file_uses_defaults() {
        let config = load_config(Some(Path::new("/nonexistent/homeclimate.toml"))).unwrap();

        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_simulated_sensor_failure_injection() {
        let mut sensor = SimulatedBme280::new(0x76, true, 12_000, Some(3));

        assert!(block_on(sensor.read()).is_ok());
        assert!(block_on(sensor.read()).is_ok());
        assert!(matches!(
            block_on(sensor.read()),
            Err(SensorError::ReadFailed { address: 0x76, .. })
        ));
    }

    #[test]
    fn test_simulated_readings_are_plausible() {
        for step in 0..1_000 {
            let sample = SimulatedBme280::sample_at(f64::from(step) * 12.0);
            assert!((18.0..=26.0).contains(&sample.temperature));
            assert!((40.0..=60.0).contains(&sample.humidity));
            assert!((100_000.0..=102_000.0).contains(&sample.pressure));
        }
    }

    #[test]
    fn test_offline_sensor_never_reports() {
        let sensor = SimulatedBme280::new(0x76, false, 12_000, None);
        let mut reader = SensorReader::new(sensor, SensorId::Guestroom);

        assert!(!block_on(reader.init(&mut NullSink)));
        for tick in 1..=100u64 {
            let outcome = block_on(reader.update(Instant::from_millis(tick * 12_001), &mut NullSink));
            assert_eq!(outcome, Ok(UpdateOutcome::Inactive));
        }
    }
}
