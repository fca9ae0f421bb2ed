//! Adapters — concrete implementations of the hexagonal port traits.
//!
//! | Adapter    | Implements   | Connects to                    |
//! |------------|--------------|--------------------------------|
//! | `hardware` | PwmPort      | ESP32 MCPWM                    |
//! |            | LinePort     | GPIO output drivers            |
//! |            | EepromPort   | Calibration image (borrowed)   |
//! |            | MfcPort      | MFC UART                       |
//! | `log_sink` | EventSink    | Serial log output              |
//! | `nvs`      | ConfigPort   | NVS / in-memory store          |
//! |            | EepromPort   | Factory calibration image      |

pub mod hardware;
pub mod log_sink;
pub mod nvs;
