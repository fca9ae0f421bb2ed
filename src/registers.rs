//! Register map.
//!
//! Every externally visible value lives behind an address in 32..=104
//! with a fixed element type and count.  [`Register::from_address`]
//! replaces a runtime table lookup with an exhaustive match, and the
//! service matches on [`Register`] to route reads and writes.
//!
//! Payloads are little-endian, elements packed back to back.

use crate::drivers::valves::Valve;
use crate::error::ProtocolError;

/// First application register.
pub const FIRST_ADDRESS: u8 = 32;
/// Last application register.
pub const LAST_ADDRESS: u8 = 104;

/// Widest payload: 11 × u16.
pub const MAX_PAYLOAD: usize = 22;

/// Encoded register contents.
pub type Payload = heapless::Vec<u8, MAX_PAYLOAD>;

/// Element type tag, using the host protocol's type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RegType {
    U8 = 0x01,
    U16 = 0x02,
    I16 = 0x82,
    Float = 0x44,
}

impl RegType {
    /// Bytes per element.
    pub const fn size(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 | Self::I16 => 2,
            Self::Float => 4,
        }
    }
}

/// Valves in the order their per-valve register blocks list them.
const VALVE_BLOCK: [Valve; 10] = [
    Valve::Valve0,
    Valve::Valve1,
    Valve::Valve2,
    Valve::Valve3,
    Valve::CheckValve0,
    Valve::CheckValve1,
    Valve::CheckValve2,
    Valve::CheckValve3,
    Valve::EndValve0,
    Valve::EndValve1,
];

const PULSE_BASE: u8 = 75;
const MIMIC_BASE: u8 = 88;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    EnableFlow,
    FlowmeterAnalogOutputs,
    Di0State,
    UserCalibration(usize),
    UserCalibrationAux,
    EnableUserCalibration,
    TargetFlow(usize),
    ChannelsTargetFlow,
    ActualFlow(usize),
    Frequency(usize),
    DutyCycle(usize),
    OutputSet,
    OutputClear,
    OutputToggle,
    OutputState,
    EnableValvePulse,
    ValveSet,
    ValveClear,
    ValveToggle,
    ValveState,
    OdorValveState,
    EndValveState,
    CheckValveState,
    /// Pulse width; for check valves the sync delay.
    PulseDuration(Valve),
    DoSync(usize),
    Di0Trigger,
    Mimic(Valve),
    EnableValveExternalControl,
    Channel3Range,
    EnableCheckValveSync,
    TemperatureValue,
    EnableTemperatureCalibration,
    TemperatureCalibrationValue,
    EnableEvents,
}

impl Register {
    pub fn from_address(address: u8) -> Result<Self, ProtocolError> {
        let reg = match address {
            32 => Self::EnableFlow,
            33 => Self::FlowmeterAnalogOutputs,
            34 => Self::Di0State,
            35..=39 => Self::UserCalibration(usize::from(address - 35)),
            40 => Self::UserCalibrationAux,
            41 => Self::EnableUserCalibration,
            42..=46 => Self::TargetFlow(usize::from(address - 42)),
            47 => Self::ChannelsTargetFlow,
            48..=52 => Self::ActualFlow(usize::from(address - 48)),
            53..=57 => Self::Frequency(usize::from(address - 53)),
            58..=62 => Self::DutyCycle(usize::from(address - 58)),
            63 => Self::OutputSet,
            64 => Self::OutputClear,
            65 => Self::OutputToggle,
            66 => Self::OutputState,
            67 => Self::EnableValvePulse,
            68 => Self::ValveSet,
            69 => Self::ValveClear,
            70 => Self::ValveToggle,
            71 => Self::ValveState,
            72 => Self::OdorValveState,
            73 => Self::EndValveState,
            74 => Self::CheckValveState,
            75..=84 => Self::PulseDuration(VALVE_BLOCK[usize::from(address - PULSE_BASE)]),
            85 | 86 => Self::DoSync(usize::from(address - 85)),
            87 => Self::Di0Trigger,
            88..=97 => Self::Mimic(VALVE_BLOCK[usize::from(address - MIMIC_BASE)]),
            98 => Self::EnableValveExternalControl,
            99 => Self::Channel3Range,
            100 => Self::EnableCheckValveSync,
            101 => Self::TemperatureValue,
            102 => Self::EnableTemperatureCalibration,
            103 => Self::TemperatureCalibrationValue,
            104 => Self::EnableEvents,
            _ => return Err(ProtocolError::AddressOutOfRange(address)),
        };
        Ok(reg)
    }

    pub fn address(self) -> u8 {
        match self {
            Self::EnableFlow => 32,
            Self::FlowmeterAnalogOutputs => 33,
            Self::Di0State => 34,
            Self::UserCalibration(ch) => 35 + ch as u8,
            Self::UserCalibrationAux => 40,
            Self::EnableUserCalibration => 41,
            Self::TargetFlow(ch) => 42 + ch as u8,
            Self::ChannelsTargetFlow => 47,
            Self::ActualFlow(ch) => 48 + ch as u8,
            Self::Frequency(ch) => 53 + ch as u8,
            Self::DutyCycle(ch) => 58 + ch as u8,
            Self::OutputSet => 63,
            Self::OutputClear => 64,
            Self::OutputToggle => 65,
            Self::OutputState => 66,
            Self::EnableValvePulse => 67,
            Self::ValveSet => 68,
            Self::ValveClear => 69,
            Self::ValveToggle => 70,
            Self::ValveState => 71,
            Self::OdorValveState => 72,
            Self::EndValveState => 73,
            Self::CheckValveState => 74,
            Self::PulseDuration(v) => PULSE_BASE + block_index(v),
            Self::DoSync(n) => 85 + n as u8,
            Self::Di0Trigger => 87,
            Self::Mimic(v) => MIMIC_BASE + block_index(v),
            Self::EnableValveExternalControl => 98,
            Self::Channel3Range => 99,
            Self::EnableCheckValveSync => 100,
            Self::TemperatureValue => 101,
            Self::EnableTemperatureCalibration => 102,
            Self::TemperatureCalibrationValue => 103,
            Self::EnableEvents => 104,
        }
    }

    pub fn reg_type(self) -> RegType {
        match self {
            Self::FlowmeterAnalogOutputs => RegType::I16,
            Self::UserCalibration(_)
            | Self::UserCalibrationAux
            | Self::Frequency(_)
            | Self::EnableValvePulse
            | Self::ValveSet
            | Self::ValveClear
            | Self::ValveToggle
            | Self::ValveState
            | Self::PulseDuration(_) => RegType::U16,
            Self::TargetFlow(_)
            | Self::ChannelsTargetFlow
            | Self::ActualFlow(_)
            | Self::DutyCycle(_) => RegType::Float,
            _ => RegType::U8,
        }
    }

    /// Elements per access.
    pub fn count(self) -> usize {
        match self {
            Self::UserCalibration(_) | Self::UserCalibrationAux => 11,
            Self::FlowmeterAnalogOutputs | Self::ChannelsTargetFlow => 5,
            _ => 1,
        }
    }

    /// Payload length in bytes.
    pub fn payload_len(self) -> usize {
        self.reg_type().size() * self.count()
    }

    pub fn is_read_only(self) -> bool {
        matches!(
            self,
            Self::FlowmeterAnalogOutputs
                | Self::Di0State
                | Self::ActualFlow(_)
                | Self::TemperatureValue
        )
    }

    /// Resolve an access and check the declared type and element count.
    pub fn resolve(address: u8, ty: RegType, count: usize) -> Result<Self, ProtocolError> {
        let reg = Self::from_address(address)?;
        if reg.reg_type() != ty {
            return Err(ProtocolError::TypeMismatch);
        }
        if reg.count() != count {
            return Err(ProtocolError::ElementCount);
        }
        Ok(reg)
    }
}

fn block_index(valve: Valve) -> u8 {
    VALVE_BLOCK
        .iter()
        .position(|v| *v == valve)
        .unwrap_or_default() as u8
}

// ── Payload codec ─────────────────────────────────────────────

fn extend(payload: &mut Payload, bytes: &[u8]) {
    // MAX_PAYLOAD covers every register.
    let fits = payload.extend_from_slice(bytes).is_ok();
    debug_assert!(fits, "payload of {} bytes exceeds MAX_PAYLOAD", bytes.len());
}

pub fn encode_u8(value: u8) -> Payload {
    let mut p = Payload::new();
    extend(&mut p, &[value]);
    p
}

pub fn encode_u16s(values: &[u16]) -> Payload {
    let mut p = Payload::new();
    for v in values {
        extend(&mut p, &v.to_le_bytes());
    }
    p
}

pub fn encode_i16s(values: &[i16]) -> Payload {
    let mut p = Payload::new();
    for v in values {
        extend(&mut p, &v.to_le_bytes());
    }
    p
}

pub fn encode_f32s(values: &[f32]) -> Payload {
    let mut p = Payload::new();
    for v in values {
        extend(&mut p, &v.to_le_bytes());
    }
    p
}

/// Decode `N` little-endian u16 elements.  `data` is at least `2 × N` bytes.
pub fn decode_u16s<const N: usize>(data: &[u8]) -> [u16; N] {
    core::array::from_fn(|i| u16::from_le_bytes([data[2 * i], data[2 * i + 1]]))
}

/// Decode `N` little-endian f32 elements.  `data` is at least `4 × N` bytes.
pub fn decode_f32s<const N: usize>(data: &[u8]) -> [f32; N] {
    core::array::from_fn(|i| {
        let b = &data[4 * i..4 * i + 4];
        f32::from_le_bytes([b[0], b[1], b[2], b[3]])
    })
}
