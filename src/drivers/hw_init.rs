//! One-shot hardware peripheral initialization.
//!
//! Configures the input GPIOs and their interrupts, the NTC ADC channel,
//! the five MCPWM timers that drive the proportional valves and the MFC
//! UART, using raw
//! ESP-IDF sys calls.  Called once from `main()` before the event loop
//! starts.  Output lines are owned by `PinDriver`s in the hardware
//! adapter.
//!
//! MCPWM timers count at [`MCPWM_RESOLUTION_HZ`]; [`McpwmPort`] rescales
//! the driver's counts (taken at the system clock) to that resolution.

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
use log::info;

use crate::app::ports::PwmPort;
use crate::drivers::pwm::PwmTiming;

// ── Error type ────────────────────────────────────────────────

/// Errors during one-shot peripheral initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwInitError {
    AdcInitFailed(i32),
    GpioConfigFailed(i32),
    PwmInitFailed(i32),
    UartInitFailed(i32),
    IsrInstallFailed(i32),
}

impl core::fmt::Display for HwInitError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::AdcInitFailed(rc) => write!(f, "ADC1 init failed (rc={})", rc),
            Self::GpioConfigFailed(rc) => write!(f, "GPIO config failed (rc={})", rc),
            Self::PwmInitFailed(rc) => write!(f, "MCPWM timer setup failed (rc={})", rc),
            Self::UartInitFailed(rc) => write!(f, "MFC UART setup failed (rc={})", rc),
            Self::IsrInstallFailed(rc) => write!(f, "GPIO ISR service install failed (rc={})", rc),
        }
    }
}

impl core::error::Error for HwInitError {}

/// MCPWM counter resolution.  100 Hz needs 50 000 ticks, within 16 bits.
pub const MCPWM_RESOLUTION_HZ: u32 = 5_000_000;

/// Convert driver counts at `clock_hz` to MCPWM ticks.
pub fn scale_ticks(counts: u16, prescaler: u16, clock_hz: u32) -> u32 {
    if clock_hz == 0 {
        return 0;
    }
    let ticks = u64::from(counts) * u64::from(prescaler) * u64::from(MCPWM_RESOLUTION_HZ)
        / u64::from(clock_hz);
    u32::try_from(ticks).unwrap_or(u32::MAX)
}

#[cfg(target_os = "espidf")]
use crate::pins;

#[cfg(target_os = "espidf")]
pub fn init_peripherals(clock_hz: u32) -> Result<(), HwInitError> {
    // SAFETY: Called once from main() before the event loop; single-threaded.
    unsafe {
        init_gpio_inputs()?;
        init_adc()?;
        init_pwm(clock_hz)?;
        init_uart()?;
    }
    info!("hw_init: all peripherals configured");
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn init_peripherals(_clock_hz: u32) -> Result<(), HwInitError> {
    log::info!("hw_init(sim): peripheral init skipped");
    Ok(())
}

// ── GPIO Inputs ───────────────────────────────────────────────

#[cfg(target_os = "espidf")]
unsafe fn init_gpio_inputs() -> Result<(), HwInitError> {
    let mut input_pins = heapless::Vec::<i32, 8>::new();
    let _ = input_pins.push(pins::DI0_GPIO);
    let _ = input_pins.push(pins::ADC_BUSY_GPIO);
    let _ = input_pins.extend_from_slice(&pins::EXT_CTRL_GPIOS);

    for &pin in &input_pins {
        let cfg = gpio_config_t {
            pin_bit_mask: 1u64 << pin,
            mode: gpio_mode_t_GPIO_MODE_INPUT,
            pull_up_en: gpio_pullup_t_GPIO_PULLUP_DISABLE,
            pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_ENABLE,
            intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
        };
        let ret = unsafe { gpio_config(&cfg) };
        if ret != ESP_OK {
            return Err(HwInitError::GpioConfigFailed(ret));
        }
    }

    info!("hw_init: GPIO inputs configured");
    Ok(())
}

#[cfg(target_os = "espidf")]
pub fn gpio_read(pin: i32) -> bool {
    // SAFETY: register read on a configured input; ISR-safe.
    (unsafe { gpio_get_level(pin) }) != 0
}

#[cfg(not(target_os = "espidf"))]
pub fn gpio_read(_pin: i32) -> bool {
    false
}

// ── ADC (oneshot, NTC) ────────────────────────────────────────

#[cfg(target_os = "espidf")]
static mut ADC1_HANDLE: adc_oneshot_unit_handle_t = core::ptr::null_mut();

#[cfg(target_os = "espidf")]
unsafe fn init_adc() -> Result<(), HwInitError> {
    let init_cfg = adc_oneshot_unit_init_cfg_t {
        unit_id: adc_unit_t_ADC_UNIT_1,
        ulp_mode: adc_ulp_mode_t_ADC_ULP_MODE_DISABLE,
        ..Default::default()
    };
    // SAFETY: ADC1_HANDLE is only written here, once at boot.
    let ret = unsafe { adc_oneshot_new_unit(&init_cfg, &raw mut ADC1_HANDLE) };
    if ret != ESP_OK {
        return Err(HwInitError::AdcInitFailed(ret));
    }

    let chan_cfg = adc_oneshot_chan_cfg_t {
        atten: adc_atten_t_ADC_ATTEN_DB_12,
        bitwidth: adc_bitwidth_t_ADC_BITWIDTH_12,
    };
    let ret = unsafe { adc_oneshot_config_channel(ADC1_HANDLE, pins::TEMP_ADC_CHANNEL, &chan_cfg) };
    if ret != ESP_OK {
        return Err(HwInitError::AdcInitFailed(ret));
    }

    info!("hw_init: ADC1 configured (CH{}=NTC)", pins::TEMP_ADC_CHANNEL);
    Ok(())
}

/// Raw 12-bit reading, or `None` if the conversion failed.
#[cfg(target_os = "espidf")]
pub fn adc1_read(channel: u32) -> Option<u16> {
    let mut raw: i32 = 0;
    // SAFETY: handle written once in init_adc(); main loop only.
    let ret = unsafe { adc_oneshot_read(ADC1_HANDLE, channel, &mut raw) };
    (ret == ESP_OK).then(|| raw.clamp(0, 4095) as u16)
}

#[cfg(not(target_os = "espidf"))]
pub fn adc1_read(_channel: u32) -> Option<u16> {
    None
}

// ── MCPWM ─────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
mod mcpwm {
    use core::sync::atomic::{AtomicU16, AtomicU32, Ordering};

    use esp_idf_svc::sys::*;

    use super::HwInitError;
    use crate::drivers::pwm::{PwmDriver, CHANNELS};
    use crate::pins;

    static mut TIMERS: [mcpwm_timer_handle_t; CHANNELS] = [core::ptr::null_mut(); CHANNELS];
    static mut COMPARATORS: [mcpwm_cmpr_handle_t; CHANNELS] = [core::ptr::null_mut(); CHANNELS];

    pub(super) static CLOCK_HZ: AtomicU32 = AtomicU32::new(0);
    pub(super) static PRESCALER: [AtomicU16; CHANNELS] = [const { AtomicU16::new(1) }; CHANNELS];

    /// Channels 0–2 live on group 0, 3–4 on group 1.
    fn group(channel: usize) -> i32 {
        if channel < 3 { 0 } else { 1 }
    }

    unsafe extern "C" fn on_empty(
        _timer: mcpwm_timer_handle_t,
        _edata: *const mcpwm_timer_event_data_t,
        user_ctx: *mut core::ffi::c_void,
    ) -> bool {
        let channel = user_ctx as usize;
        PwmDriver::on_rollover(channel, &crate::isr::SHARED.duty, &mut super::McpwmPort);
        false
    }

    fn check(ret: esp_err_t) -> Result<(), HwInitError> {
        if ret == ESP_OK {
            Ok(())
        } else {
            Err(HwInitError::PwmInitFailed(ret))
        }
    }

    pub(super) unsafe fn init(clock_hz: u32) -> Result<(), HwInitError> {
        CLOCK_HZ.store(clock_hz, Ordering::Relaxed);
        for (ch, &gpio) in pins::PROP_VALVE_GPIOS.iter().enumerate() {
            unsafe {
                let timer_cfg = mcpwm_timer_config_t {
                    group_id: group(ch),
                    clk_src: soc_periph_mcpwm_timer_clk_src_t_MCPWM_TIMER_CLK_SRC_DEFAULT,
                    resolution_hz: super::MCPWM_RESOLUTION_HZ,
                    count_mode: mcpwm_timer_count_mode_t_MCPWM_TIMER_COUNT_MODE_UP,
                    period_ticks: super::MCPWM_RESOLUTION_HZ / 1000,
                    ..Default::default()
                };
                check(mcpwm_new_timer(&timer_cfg, &raw mut TIMERS[ch]))?;

                let oper_cfg = mcpwm_operator_config_t {
                    group_id: group(ch),
                    ..Default::default()
                };
                let mut oper: mcpwm_oper_handle_t = core::ptr::null_mut();
                check(mcpwm_new_operator(&oper_cfg, &mut oper))?;
                check(mcpwm_operator_connect_timer(oper, TIMERS[ch]))?;

                let mut cmpr_cfg = mcpwm_comparator_config_t::default();
                cmpr_cfg.flags.set_update_cmp_on_tez(1);
                check(mcpwm_new_comparator(oper, &cmpr_cfg, &raw mut COMPARATORS[ch]))?;

                let gen_cfg = mcpwm_generator_config_t {
                    gen_gpio_num: gpio,
                    ..Default::default()
                };
                let mut generator: mcpwm_gen_handle_t = core::ptr::null_mut();
                check(mcpwm_new_generator(oper, &gen_cfg, &mut generator))?;
                check(mcpwm_generator_set_action_on_timer_event(
                    generator,
                    mcpwm_gen_timer_event_action_t {
                        direction: mcpwm_timer_direction_t_MCPWM_TIMER_DIRECTION_UP,
                        event: mcpwm_timer_event_t_MCPWM_TIMER_EVENT_EMPTY,
                        action: mcpwm_generator_action_t_MCPWM_GEN_ACTION_HIGH,
                    },
                ))?;
                check(mcpwm_generator_set_action_on_compare_event(
                    generator,
                    mcpwm_gen_compare_event_action_t {
                        direction: mcpwm_timer_direction_t_MCPWM_TIMER_DIRECTION_UP,
                        comparator: COMPARATORS[ch],
                        action: mcpwm_generator_action_t_MCPWM_GEN_ACTION_LOW,
                    },
                ))?;

                let cbs = mcpwm_timer_event_callbacks_t {
                    on_empty: Some(on_empty),
                    ..Default::default()
                };
                check(mcpwm_timer_register_event_callbacks(
                    TIMERS[ch],
                    &cbs,
                    ch as *mut core::ffi::c_void,
                ))?;
                check(mcpwm_timer_enable(TIMERS[ch]))?;
            }
        }
        log::info!("hw_init: MCPWM configured (5 channels @ {} Hz)", super::MCPWM_RESOLUTION_HZ);
        Ok(())
    }

    // SAFETY (all below): handles are written once in init() before the
    // event loop and the first callback; reads only afterwards.

    pub(super) fn set_period(channel: usize, ticks: u32) {
        unsafe {
            mcpwm_timer_set_period(TIMERS[channel], ticks);
        }
    }

    pub(super) fn set_compare(channel: usize, ticks: u32) {
        unsafe {
            mcpwm_comparator_set_compare_value(COMPARATORS[channel], ticks);
        }
    }

    pub(super) fn run(channel: usize, on: bool) {
        let cmd = if on {
            mcpwm_timer_start_stop_cmd_t_MCPWM_TIMER_START_NO_STOP
        } else {
            mcpwm_timer_start_stop_cmd_t_MCPWM_TIMER_STOP_EMPTY
        };
        unsafe {
            mcpwm_timer_start_stop(TIMERS[channel], cmd);
        }
    }
}

#[cfg(target_os = "espidf")]
unsafe fn init_pwm(clock_hz: u32) -> Result<(), HwInitError> {
    unsafe { mcpwm::init(clock_hz) }
}

/// [`PwmPort`] backed by the MCPWM timers.  Also used from the rollover
/// callback, so it carries no state of its own.
pub struct McpwmPort;

#[cfg(target_os = "espidf")]
impl McpwmPort {
    fn ticks(channel: usize, counts: u16) -> u32 {
        use core::sync::atomic::Ordering;
        scale_ticks(
            counts,
            mcpwm::PRESCALER[channel].load(Ordering::Relaxed),
            mcpwm::CLOCK_HZ.load(Ordering::Relaxed),
        )
    }
}

#[cfg(target_os = "espidf")]
impl PwmPort for McpwmPort {
    fn configure(&mut self, channel: usize, timing: PwmTiming) {
        use core::sync::atomic::Ordering;
        mcpwm::PRESCALER[channel].store(timing.prescaler, Ordering::Relaxed);
        mcpwm::set_period(channel, Self::ticks(channel, timing.period));
        mcpwm::set_compare(channel, Self::ticks(channel, timing.compare));
    }

    fn start(&mut self, channel: usize) {
        mcpwm::run(channel, true);
    }

    fn stop(&mut self, channel: usize) {
        mcpwm::run(channel, false);
    }

    fn load_compare(&mut self, channel: usize, compare: u16) {
        mcpwm::set_compare(channel, Self::ticks(channel, compare));
    }
}

#[cfg(not(target_os = "espidf"))]
impl PwmPort for McpwmPort {
    fn configure(&mut self, channel: usize, timing: PwmTiming) {
        log::debug!("hw_init(sim): pwm {} {:?}", channel, timing);
    }
    fn start(&mut self, _channel: usize) {}
    fn stop(&mut self, _channel: usize) {}
    fn load_compare(&mut self, _channel: usize, _compare: u16) {}
}

// ── MFC UART ──────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
const MFC_UART: uart_port_t = 1;

#[cfg(target_os = "espidf")]
unsafe fn init_uart() -> Result<(), HwInitError> {
    let cfg = uart_config_t {
        baud_rate: pins::MFC_BAUD as i32,
        data_bits: uart_word_length_t_UART_DATA_8_BITS,
        parity: uart_parity_t_UART_PARITY_DISABLE,
        stop_bits: uart_stop_bits_t_UART_STOP_BITS_1,
        flow_ctrl: uart_hw_flowcontrol_t_UART_HW_FLOWCTRL_DISABLE,
        ..Default::default()
    };
    unsafe {
        let ret = uart_driver_install(MFC_UART, 256, 256, 0, core::ptr::null_mut(), 0);
        if ret != ESP_OK {
            return Err(HwInitError::UartInitFailed(ret));
        }
        let ret = uart_param_config(MFC_UART, &cfg);
        if ret != ESP_OK {
            return Err(HwInitError::UartInitFailed(ret));
        }
        let ret = uart_set_pin(MFC_UART, pins::MFC_UART_TX_GPIO, pins::MFC_UART_RX_GPIO, -1, -1);
        if ret != ESP_OK {
            return Err(HwInitError::UartInitFailed(ret));
        }
    }
    info!("hw_init: MFC UART at {} baud", pins::MFC_BAUD);
    Ok(())
}

#[cfg(target_os = "espidf")]
pub fn uart_write(bytes: &[u8]) {
    // SAFETY: driver installed in init_uart(); main loop is the only writer.
    let written = unsafe { uart_write_bytes(MFC_UART, bytes.as_ptr().cast(), bytes.len()) };
    if written < 0 {
        log::warn!("hw_init: MFC UART write failed (rc={})", written);
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn uart_write(bytes: &[u8]) {
    log::info!("hw_init(sim): mfc <- {:?}", core::str::from_utf8(bytes).unwrap_or("<binary>"));
}

// ── GPIO ISR Service ──────────────────────────────────────────

#[cfg(target_os = "espidf")]
use crate::events::{push_event, Event};
#[cfg(target_os = "espidf")]
use crate::isr::SHARED;

#[cfg(target_os = "espidf")]
unsafe extern "C" fn di0_isr(_arg: *mut core::ffi::c_void) {
    SHARED.inputs.record_di0(gpio_read(pins::DI0_GPIO));
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn ext_ctrl_isr(_arg: *mut core::ffi::c_void) {
    SHARED.inputs.record_external(external_pins());
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn busy_isr(_arg: *mut core::ffi::c_void) {
    push_event(Event::ConversionDone);
}

/// External valve-control pins packed as odor 0–3 then end 0–1.
#[cfg(target_os = "espidf")]
fn external_pins() -> u8 {
    pins::EXT_CTRL_GPIOS
        .iter()
        .enumerate()
        .filter(|(_, pin)| gpio_read(**pin))
        .fold(0, |acc, (bit, _)| acc | (1 << bit))
}

/// Install per-pin GPIO ISR service and register interrupt handlers.
/// Call after init_peripherals() and before the event loop.
#[cfg(target_os = "espidf")]
pub fn init_isr_service() -> Result<(), HwInitError> {
    // SAFETY: ESP_ERR_INVALID_STATE means the service is already installed.
    // Handlers only touch atomics in SHARED and the lock-free queue.
    unsafe {
        let ret = gpio_install_isr_service(0);
        if ret != ESP_OK && ret != ESP_ERR_INVALID_STATE {
            return Err(HwInitError::IsrInstallFailed(ret));
        }

        gpio_set_intr_type(pins::DI0_GPIO, gpio_int_type_t_GPIO_INTR_ANYEDGE);
        gpio_isr_handler_add(pins::DI0_GPIO, Some(di0_isr), core::ptr::null_mut());
        gpio_intr_enable(pins::DI0_GPIO);

        for &pin in &pins::EXT_CTRL_GPIOS {
            gpio_set_intr_type(pin, gpio_int_type_t_GPIO_INTR_ANYEDGE);
            gpio_isr_handler_add(pin, Some(ext_ctrl_isr), core::ptr::null_mut());
            gpio_intr_enable(pin);
        }

        gpio_set_intr_type(pins::ADC_BUSY_GPIO, gpio_int_type_t_GPIO_INTR_NEGEDGE);
        gpio_isr_handler_add(pins::ADC_BUSY_GPIO, Some(busy_isr), core::ptr::null_mut());
        gpio_intr_enable(pins::ADC_BUSY_GPIO);

        // Seed the latches with the current levels.
        SHARED.inputs.record_di0(gpio_read(pins::DI0_GPIO));
        SHARED.inputs.record_external(external_pins());

        info!("hw_init: ISR service installed (di0, ext-ctrl×6, adc busy)");
    }
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn init_isr_service() -> Result<(), HwInitError> {
    log::info!("hw_init(sim): ISR service skipped");
    Ok(())
}
