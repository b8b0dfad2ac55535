//! Wire protocol shared with the rig firmware.
//!
//! Every sample the firmware emits is `SEPARATOR | type:u8 | timestamp:u32 | value:i32`,
//! big-endian. Commands travel the other way as `SEPARATOR | type:u8 | value:i32`.
//! Byte widths, field order and the signal code table are a compatibility contract with
//! the firmware and must change on both sides together.

pub mod codec;

pub use codec::{decode, encode, FIRST_RECORD_SIZE, RECORD_SIZE, SEND_RECORD_SIZE};

use serde::{Deserialize, Serialize};

use crate::error::{AppResult, RigError};

/// Frame separator. Marks the start of every record on the wire.
pub const SEPARATOR: u8 = 0xFF;

/// Serial baud rate the firmware is flashed with.
pub const BAUDRATE: u32 = 115_200;

/// Minimum number of buffered bytes before a poll tick attempts a decode.
pub const SERIAL_SEGMENT: usize = 10;

/// Signal kinds exchanged with the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SignalType {
    /// Valve opened (inbound stamp) / open valve (outbound).
    WaterStart = 0x00,
    /// Valve closed (inbound stamp) / close valve (outbound).
    WaterEnd = 0x01,
    /// Sound onset reported by the firmware.
    PlaySound = 0x02,
    /// Capacitive lick sensor reading.
    LickTouch = 0x03,
    /// Auxiliary touch channel.
    TouchAux = 0x04,
    /// Lever position reading.
    Lever = 0x05,
    /// TTL pulse request (outbound) and its echo (inbound).
    SendTtl = 0x06,
    /// Imaging frame sync pulse.
    FrameSync = 0x07,
}

/// Signal kinds surfaced only as `(name, first timestamp)` records, in routing order.
pub const OTHER_SIGNALS: [SignalType; 4] = [
    SignalType::WaterStart,
    SignalType::WaterEnd,
    SignalType::TouchAux,
    SignalType::FrameSync,
];

impl SignalType {
    /// Map a wire code to a signal kind. Unknown codes yield `None`.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(SignalType::WaterStart),
            0x01 => Some(SignalType::WaterEnd),
            0x02 => Some(SignalType::PlaySound),
            0x03 => Some(SignalType::LickTouch),
            0x04 => Some(SignalType::TouchAux),
            0x05 => Some(SignalType::Lever),
            0x06 => Some(SignalType::SendTtl),
            0x07 => Some(SignalType::FrameSync),
            _ => None,
        }
    }

    /// Wire code of this signal kind.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Human-readable name used in session logs.
    pub fn name(self) -> &'static str {
        match self {
            SignalType::WaterStart => "water_start",
            SignalType::WaterEnd => "water_end",
            SignalType::PlaySound => "play_sound",
            SignalType::LickTouch => "lick_touch",
            SignalType::TouchAux => "touch_aux",
            SignalType::Lever => "lever",
            SignalType::SendTtl => "send_ttl",
            SignalType::FrameSync => "frame_sync",
        }
    }
}

impl std::fmt::Display for SignalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One decoded reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    /// Kind of signal.
    pub signal_type: SignalType,
    /// Device clock, in milliseconds since firmware boot.
    pub timestamp: u32,
    /// Raw reading.
    pub value: i32,
}

/// Samples decoded in one read cycle, in device emission order.
pub type Burst = Vec<Sample>;

/// Valve opening time carried by a `GiveWater` command.
///
/// The payload field is a signed 32-bit integer, so only `0..=i32::MAX` ms can be
/// built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct ValveDuration(i32);

impl ValveDuration {
    /// Longest duration the wire can carry.
    pub const MAX: ValveDuration = ValveDuration(i32::MAX);

    /// Wrap a duration in milliseconds, rejecting values the wire cannot carry.
    pub fn from_millis(duration_ms: u32) -> AppResult<Self> {
        i32::try_from(duration_ms)
            .map(Self)
            .map_err(|_| RigError::RewardOverflow(f64::from(duration_ms)))
    }

    /// Duration in milliseconds.
    pub fn as_millis(self) -> u32 {
        self.0.unsigned_abs()
    }

    fn wire_value(self) -> i32 {
        self.0
    }
}

impl TryFrom<u32> for ValveDuration {
    type Error = RigError;

    fn try_from(duration_ms: u32) -> AppResult<Self> {
        Self::from_millis(duration_ms)
    }
}

impl From<ValveDuration> for u32 {
    fn from(duration: ValveDuration) -> u32 {
        duration.as_millis()
    }
}

/// Outbound actuation commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Open the valve for the given time.
    GiveWater(ValveDuration),
    /// Open the valve until told otherwise.
    StartWater,
    /// Close the valve.
    StopWater,
    /// Emit a TTL pulse.
    SendTtl,
}

impl Command {
    /// Signal kind and payload placed on the wire for this command.
    pub fn wire_fields(self) -> (SignalType, i32) {
        match self {
            Command::GiveWater(duration) => (SignalType::WaterStart, duration.wire_value()),
            Command::StartWater => (SignalType::WaterStart, 0),
            Command::StopWater => (SignalType::WaterEnd, 0),
            Command::SendTtl => (SignalType::SendTtl, 0),
        }
    }
}
