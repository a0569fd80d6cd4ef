#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use embassy_executor::Spawner;
use embassy_time::{Duration, Instant, Timer};
use esp_hal::clock::CpuClock;
use esp_hal::i2c::master::{Config as I2cConfig, I2c};
use esp_hal::time::Rate;
use esp_hal::timer::timg::TimerGroup;
use log::info;
use rtt_target::rprint;

use homeclimate_core::config::Config;
use homeclimate_core::sensors::{Bme280Sensor, SensorReader};
use homeclimate_core::DebugStream;

/// Buffered diagnostics waiting for the transport
const DEBUG_STREAM_CAPACITY: usize = 512;

/// How often the reader is given a chance to sample.
/// The reader itself decides when a sample is due.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    loop {}
}

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    rtt_target::rtt_init_log!();

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    info!("Embassy initialized!");

    let app_config = Config::default();

    // Grove port: SDA on GPIO2, SCL on GPIO1
    let i2c = I2c::new(
        peripherals.I2C0,
        I2cConfig::default().with_frequency(Rate::from_khz(100)),
    )
    .expect("Failed to initialize I2C0")
    .with_sda(peripherals.GPIO2)
    .with_scl(peripherals.GPIO1)
    .into_async();

    let sensor = Bme280Sensor::new(i2c, app_config.sensor.address);
    let mut reader = SensorReader::with_config(sensor, app_config.sensor.id, app_config.sensor.reader)
        .expect("Default reader configuration is valid");
    let mut stream: DebugStream<DEBUG_STREAM_CAPACITY> =
        DebugStream::with_policy(app_config.debug.overflow_policy);

    reader.init(&mut stream).await;

    // The sensor loop runs on the main task; nothing else needs spawning.
    let _ = spawner;

    loop {
        let outcome = reader.update(Instant::now(), &mut stream).await;
        if outcome.is_ok_and(|outcome| outcome.is_changed()) {
            info!(
                "Report {} ({}): t: {} C, h: {} %, p: {} mmHg",
                reader.id().code(),
                reader.id().label(),
                reader.temperature(),
                reader.humidity(),
                reader.pressure_mmhg()
            );
        }

        // RTT stands in for the transport until one exists.
        stream.pop_with(|bytes| {
            rprint!("{}", core::str::from_utf8(bytes).unwrap_or("<invalid utf-8>\r\n"));
        });

        Timer::after(POLL_INTERVAL).await;
    }
}
