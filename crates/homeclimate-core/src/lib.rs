//! Hardware-independent core library for homeclimate
//!
//! This crate contains all platform-agnostic logic for the BME280 polling
//! firmware: the bounded debug text stream, the sensor trait and BME280
//! wrapper, the windowed sensor reader with change detection, and the
//! configuration types shared by the firmware and the desktop simulator.
//!
//! It is `#![no_std]` so it compiles on both embedded targets (ESP32-S3) and
//! desktop hosts (for the simulator and tests).

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod debug_stream;
pub mod sensors;

#[doc(hidden)]
pub use log as __log;

pub use debug_stream::{AppendOutcome, DebugSink, DebugStream, NullSink, OverflowPolicy};
pub use sensors::{SensorData, SensorError, SensorId, SensorReader, SensorState, UpdateOutcome};
