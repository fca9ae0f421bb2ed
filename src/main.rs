//! Olfactometer Firmware — Main Entry Point
//!
//! Hexagonal architecture with event-driven execution.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  HardwareAdapter          LogEventSink      NvsAdapter         │
//! │  (Pwm+Line+Eeprom+Mfc)    (EventSink)       (Config+Eeprom)    │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │            Olfactometer (pure logic)                   │    │
//! │  │  Registers · Valves · PWM handoff · Flow control       │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  IsrShared (atomics) ◀── BUSY / DI0 / EXT ISRs, MCPWM rollover │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

// ── Imports ───────────────────────────────────────────────────
use anyhow::{Context, Result};
use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::gpio::{AnyOutputPin, Output, OutputPin, PinDriver};
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_hal::spi::{config as spi_config, SpiDeviceDriver, SpiDriver, SpiDriverConfig};
use esp_idf_hal::units::FromValueType;
use log::{info, warn};

use olfactometer::adapters::hardware::{HardwareAdapter, LINE_COUNT};
use olfactometer::adapters::log_sink::LogEventSink;
use olfactometer::adapters::nvs::NvsAdapter;
use olfactometer::app::ports::ConfigPort;
use olfactometer::app::service::Olfactometer;
use olfactometer::config::DeviceConfig;
use olfactometer::drivers::{hw_init, hw_timer};
use olfactometer::events::{drain_events, Event};
use olfactometer::isr::SHARED;
use olfactometer::pins;
use olfactometer::sensors::temperature::TemperatureSensor;

/// Ticks between manifold temperature samples.
const TEMPERATURE_PERIOD_TICKS: u32 = 1_000;

fn output<'d>(pin: impl OutputPin + 'd) -> Result<PinDriver<'d, AnyOutputPin, Output>> {
    PinDriver::output(pin.downgrade_output()).context("output pin driver")
}

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  Olfactometer v{}                    ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Load config and calibration from NVS ───────────────
    let mut nvs = match NvsAdapter::new() {
        Ok(n) => n,
        Err(e) => {
            warn!("NVS init failed ({}), running with defaults and no persistence", e);
            NvsAdapter::default()
        }
    };
    let config = match nvs.load() {
        Ok(cfg) => {
            info!("Config loaded from NVS");
            cfg
        }
        Err(e) => {
            warn!("NVS config load failed ({}), using defaults", e);
            DeviceConfig::default()
        }
    };
    nvs.load_calibration_image(&config);

    // ── 3. Initialise hardware peripherals ────────────────────
    hw_init::init_peripherals(config.system_clock_hz).context("peripheral init")?;

    let peripherals = Peripherals::take().context("peripherals already taken")?;
    let p = peripherals.pins;

    // Order matches the valve slots, then DO0, DO1, CONVST.
    let lines: [PinDriver<'_, AnyOutputPin, Output>; LINE_COUNT] = [
        output(p.gpio7)?,
        output(p.gpio8)?,
        output(p.gpio9)?,
        output(p.gpio10)?,
        output(p.gpio11)?,
        output(p.gpio12)?,
        output(p.gpio13)?,
        output(p.gpio14)?,
        output(p.gpio15)?,
        output(p.gpio16)?,
        output(p.gpio17)?,
        output(p.gpio18)?,
        output(p.gpio47)?,
    ];

    let spi = SpiDriver::new_without_sdo(
        peripherals.spi2,
        p.gpio36,
        p.gpio37,
        &SpiDriverConfig::new(),
    )
    .context("ADC SPI bus")?;
    let mut adc_spi = SpiDeviceDriver::new(
        spi,
        Some(p.gpio35),
        &spi_config::Config::new().baudrate(pins::ADC_SPI_HZ.Hz()),
    )
    .context("ADC SPI device")?;

    if let Err(e) = hw_init::init_isr_service() {
        log::error!("ISR service init failed: {}, continuing without ISRs", e);
    }

    // ── 4. Construct adapters and the service ─────────────────
    let mut hw = HardwareAdapter::new(lines, &nvs);
    let mut log_sink = LogEventSink::new();
    let thermistor = TemperatureSensor::new(pins::TEMP_ADC_CHANNEL);

    let mut app = Olfactometer::new(config, &SHARED);
    app.boot(&mut hw, &mut log_sink);

    hw_timer::start_timers();
    info!("System ready. Entering event loop.");

    // ── 5. Event loop ─────────────────────────────────────────
    let mut ticks: u32 = 0;
    loop {
        drain_events(|event| match event {
            Event::ConversionDone => {
                if let Err(e) = SHARED.adc.harvest(&mut adc_spi) {
                    warn!("adc: frame read failed: {:?}", e);
                }
            }
            Event::Tick => {
                app.tick(&mut hw, &mut log_sink);
                ticks = ticks.wrapping_add(1);
                if ticks % TEMPERATURE_PERIOD_TICKS == 0 {
                    match thermistor.read_celsius() {
                        Some(celsius) => app.update_temperature(celsius),
                        None => warn!("temperature: thermistor reading unavailable"),
                    }
                }
            }
        });

        // One FreeRTOS tick (1 ms with the shipped sdkconfig).
        FreeRtos::delay_ms(1);
    }
}
