//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements [`ConfigPort`] for the device configuration and
//! [`EepromPort`] for the factory calibration image.
//!
//! - Config: a `postcard` blob, range-checked before it is persisted.
//! - Calibration: the raw EEPROM image (big-endian tables plus the
//!   temperature reference byte) stored as one blob and cached in RAM at
//!   boot.  Bytes outside the image read as 0, which the calibration
//!   loader treats as "use defaults".
//!
//! On non-espidf targets a `HashMap` stands in for flash.

use crate::app::ports::{ConfigError, ConfigPort, EepromPort};
use crate::config::DeviceConfig;
use log::{info, warn};

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

const NAMESPACE: &str = "olfacto";
const CONFIG_KEY: &str = "devcfg";
const CALIBRATION_KEY: &str = "calimg";

const MAX_BLOB_SIZE: usize = 1024;

pub struct NvsAdapter {
    #[cfg(not(target_os = "espidf"))]
    store: std::cell::RefCell<HashMap<String, Vec<u8>>>,
    /// Cached calibration image and the EEPROM address of its first byte.
    image: Vec<u8>,
    image_base: u16,
}

impl NvsAdapter {
    /// Create the adapter and initialise NVS flash.
    ///
    /// On first boot or after a version mismatch the partition is erased
    /// and re-initialised.
    pub fn new() -> Result<Self, ConfigError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: called from the main task before any other NVS access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("NVS: erasing and re-initialising flash partition");
                if unsafe { nvs_flash_erase() } != ESP_OK {
                    return Err(ConfigError::IoError);
                }
                if unsafe { nvs_flash_init() } != ESP_OK {
                    return Err(ConfigError::IoError);
                }
            } else if ret != ESP_OK {
                return Err(ConfigError::IoError);
            }
            info!("NvsAdapter: ESP-IDF NVS initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NvsAdapter: simulation backend");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            store: std::cell::RefCell::new(HashMap::new()),
            image: Vec::new(),
            image_base: 0,
        })
    }

    /// Read the calibration image into RAM.  A missing blob leaves the
    /// cache empty.
    pub fn load_calibration_image(&mut self, config: &DeviceConfig) {
        self.image_base = config.calibration_base;
        match self.get_blob(CALIBRATION_KEY) {
            Ok(Some(bytes)) => {
                info!("NvsAdapter: calibration image loaded ({} bytes)", bytes.len());
                self.image = bytes;
            }
            Ok(None) => {
                info!("NvsAdapter: no calibration image, factory defaults apply");
                self.image.clear();
            }
            Err(e) => {
                warn!("NvsAdapter: calibration read error {}, factory defaults apply", e);
                self.image.clear();
            }
        }
    }

    /// Persist a calibration image starting at `config.calibration_base`
    /// and refresh the cache.
    pub fn store_calibration_image(
        &mut self,
        config: &DeviceConfig,
        image: &[u8],
    ) -> Result<(), ConfigError> {
        if image.len() > MAX_BLOB_SIZE {
            return Err(ConfigError::ValidationFailed("calibration image too large"));
        }
        self.set_blob(CALIBRATION_KEY, image).map_err(|e| {
            warn!("NvsAdapter: calibration write error {}", e);
            ConfigError::IoError
        })?;
        self.image_base = config.calibration_base;
        self.image = image.to_vec();
        info!("NvsAdapter: calibration image saved ({} bytes)", image.len());
        Ok(())
    }

    // ── Blob backend ──────────────────────────────────────────

    #[cfg(not(target_os = "espidf"))]
    fn composite_key(key: &str) -> String {
        format!("{}::{}", NAMESPACE, key)
    }

    #[cfg(not(target_os = "espidf"))]
    fn get_blob(&self, key: &str) -> Result<Option<Vec<u8>>, i32> {
        Ok(self.store.borrow().get(&Self::composite_key(key)).cloned())
    }

    #[cfg(not(target_os = "espidf"))]
    fn set_blob(&self, key: &str, bytes: &[u8]) -> Result<(), i32> {
        self.store
            .borrow_mut()
            .insert(Self::composite_key(key), bytes.to_vec());
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn get_blob(&self, key: &str) -> Result<Option<Vec<u8>>, i32> {
        let key_buf = c_key(key);
        let result = Self::with_nvs_handle(false, |handle| {
            let mut size: usize = 0;
            // First call: size only.
            let ret = unsafe {
                nvs_get_blob(handle, key_buf.as_ptr() as *const _, core::ptr::null_mut(), &mut size)
            };
            if ret == ESP_ERR_NVS_NOT_FOUND {
                return Ok(None);
            }
            if ret != ESP_OK || size == 0 || size > MAX_BLOB_SIZE {
                return Err(ret);
            }
            let mut buf = vec![0u8; size];
            let ret = unsafe {
                nvs_get_blob(
                    handle,
                    key_buf.as_ptr() as *const _,
                    buf.as_mut_ptr() as *mut _,
                    &mut size,
                )
            };
            if ret != ESP_OK {
                return Err(ret);
            }
            Ok(Some(buf))
        });
        match result {
            Err(e) if e == ESP_ERR_NVS_NOT_FOUND => Ok(None),
            other => other,
        }
    }

    #[cfg(target_os = "espidf")]
    fn set_blob(&self, key: &str, bytes: &[u8]) -> Result<(), i32> {
        let key_buf = c_key(key);
        Self::with_nvs_handle(true, |handle| {
            let ret = unsafe {
                nvs_set_blob(
                    handle,
                    key_buf.as_ptr() as *const _,
                    bytes.as_ptr() as *const _,
                    bytes.len(),
                )
            };
            if ret != ESP_OK {
                return Err(ret);
            }
            let ret = unsafe { nvs_commit(handle) };
            if ret != ESP_OK {
                return Err(ret);
            }
            Ok(())
        })
    }

    /// Open the namespace, run `f` with the handle, then close.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let ns_buf = c_key(NAMESPACE);
        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        // SAFETY: ns_buf is NUL-terminated; handle is closed below.
        let ret = unsafe { nvs_open(ns_buf.as_ptr() as *const _, mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }
        let result = f(handle);
        unsafe {
            nvs_close(handle);
        }
        result
    }
}

/// NUL-terminated NVS key (15 chars max).
#[cfg(target_os = "espidf")]
fn c_key(key: &str) -> [u8; 16] {
    let mut buf = [0u8; 16];
    let bytes = key.as_bytes();
    let len = bytes.len().min(15);
    buf[..len].copy_from_slice(&bytes[..len]);
    buf
}

fn validate_config(cfg: &DeviceConfig) -> Result<(), ConfigError> {
    if cfg.sampling_divider == 0 || cfg.control_period_cycles == 0 {
        return Err(ConfigError::ValidationFailed(
            "sampling_divider and control_period_cycles must be >= 1",
        ));
    }
    if !cfg.gains.iter().all(|g| g.is_finite() && *g > 0.0) {
        return Err(ConfigError::ValidationFailed("gains must be finite and > 0"));
    }
    if !(0.0..100.0).contains(&cfg.duty_floor)
        || !(0.0..=100.0).contains(&cfg.duty_ceiling)
        || cfg.duty_floor >= cfg.duty_ceiling
    {
        return Err(ConfigError::ValidationFailed(
            "duty_floor < duty_ceiling, both within 0–100",
        ));
    }
    if cfg.min_frequency_hz == 0 || cfg.min_frequency_hz >= cfg.max_frequency_hz {
        return Err(ConfigError::ValidationFailed(
            "min_frequency_hz must be >= 1 and < max_frequency_hz",
        ));
    }
    if cfg.system_clock_hz == 0 {
        return Err(ConfigError::ValidationFailed("system_clock_hz must be > 0"));
    }
    let scales = [cfg.temperature_scale_low_range, cfg.temperature_scale_high_range];
    if !scales.iter().all(|s| s.is_finite()) {
        return Err(ConfigError::ValidationFailed("temperature scales must be finite"));
    }
    let base = u32::from(cfg.calibration_base);
    let last_table = cfg.calibration_stride.saturating_mul(4).max(cfg.channel3_high_offset);
    let table_end = base + u32::from(last_table) + 22;
    let reference = base + u32::from(cfg.temperature_reference_offset);
    if table_end.max(reference) > u32::from(u16::MAX) {
        return Err(ConfigError::ValidationFailed(
            "calibration layout exceeds address space",
        ));
    }
    Ok(())
}

impl ConfigPort for NvsAdapter {
    fn load(&self) -> Result<DeviceConfig, ConfigError> {
        match self.get_blob(CONFIG_KEY) {
            Ok(Some(bytes)) => {
                let cfg: DeviceConfig =
                    postcard::from_bytes(&bytes).map_err(|_| ConfigError::Corrupted)?;
                if let Err(e) = validate_config(&cfg) {
                    warn!("NvsAdapter: stored config rejected ({}), using defaults", e);
                    return Ok(DeviceConfig::default());
                }
                info!("NvsAdapter: loaded config ({} bytes)", bytes.len());
                Ok(cfg)
            }
            Ok(None) => {
                info!("NvsAdapter: no stored config, using defaults");
                Ok(DeviceConfig::default())
            }
            Err(e) => {
                warn!("NvsAdapter: NVS read error {}, using defaults", e);
                Ok(DeviceConfig::default())
            }
        }
    }

    fn save(&self, config: &DeviceConfig) -> Result<(), ConfigError> {
        validate_config(config)?;
        let bytes = postcard::to_allocvec(config).map_err(|_| ConfigError::IoError)?;
        self.set_blob(CONFIG_KEY, &bytes).map_err(|e| {
            warn!("NvsAdapter: NVS write error {}", e);
            ConfigError::IoError
        })?;
        info!("NvsAdapter: config saved ({} bytes)", bytes.len());
        Ok(())
    }
}

impl EepromPort for NvsAdapter {
    fn read_byte(&self, address: u16) -> u8 {
        address
            .checked_sub(self.image_base)
            .and_then(|offset| self.image.get(usize::from(offset)))
            .copied()
            .unwrap_or(0)
    }
}

impl Default for NvsAdapter {
    fn default() -> Self {
        Self::new().unwrap_or_else(|_| Self {
            #[cfg(not(target_os = "espidf"))]
            store: std::cell::RefCell::new(HashMap::new()),
            image: Vec::new(),
            image_base: 0,
        })
    }
}
