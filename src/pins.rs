//! GPIO / peripheral pin assignments for the olfactometer controller.
//!
//! Single source of truth: every driver references this module rather than
//! hard-coding pin numbers.

// ---------------------------------------------------------------------------
// Proportional valves (MCPWM outputs)
// ---------------------------------------------------------------------------

/// PWM output per flow channel 0–4.
pub const PROP_VALVE_GPIOS: [i32; 5] = [2, 3, 4, 5, 6];

// ---------------------------------------------------------------------------
// On/off valves (push-pull, HIGH = open)
// ---------------------------------------------------------------------------

/// Odor valves 0–3.
pub const ODOR_VALVE_GPIOS: [i32; 4] = [7, 8, 9, 10];
/// End valves 0–1.
pub const END_VALVE_GPIOS: [i32; 2] = [11, 12];
/// Check valves 0–3.
pub const CHECK_VALVE_GPIOS: [i32; 4] = [13, 14, 15, 16];

// ---------------------------------------------------------------------------
// Digital I/O
// ---------------------------------------------------------------------------

pub const DO0_GPIO: i32 = 17;
pub const DO1_GPIO: i32 = 18;
/// Trigger input, both edges.
pub const DI0_GPIO: i32 = 21;

/// External valve control inputs: odor 0–3 then end 0–1.
pub const EXT_CTRL_GPIOS: [i32; 6] = [38, 39, 40, 41, 42, 45];

// ---------------------------------------------------------------------------
// Flowmeter ADC (16-bit, 5 channels, SPI)
// ---------------------------------------------------------------------------

/// Conversion start, active HIGH pulse.
pub const ADC_CONVST_GPIO: i32 = 47;
/// BUSY falls when a frame is ready.
pub const ADC_BUSY_GPIO: i32 = 48;
pub const ADC_SCLK_GPIO: i32 = 36;
pub const ADC_MISO_GPIO: i32 = 37;
pub const ADC_CS_GPIO: i32 = 35;
/// SPI clock for frame reads.
pub const ADC_SPI_HZ: u32 = 10_000_000;

// ---------------------------------------------------------------------------
// Manifold temperature (NTC divider on ADC1)
// ---------------------------------------------------------------------------

/// ADC1 channel 0 (GPIO 1 on ESP32-S3).
pub const TEMP_ADC_GPIO: i32 = 1;
pub const TEMP_ADC_CHANNEL: u32 = 0;

// ---------------------------------------------------------------------------
// MFC serial link
// ---------------------------------------------------------------------------

pub const MFC_UART_TX_GPIO: i32 = 43;
pub const MFC_UART_RX_GPIO: i32 = 44;
pub const MFC_BAUD: u32 = 9600;
