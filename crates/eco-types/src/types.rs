//! Wire types for Danfoss Eco characteristics.
//!
//! Every layout here is the *plaintext* form of a characteristic value.
//! Encrypted characteristics are decrypted by eco-core before they reach
//! these decoders.

use core::fmt;
use core::str::FromStr;

use bytes::Buf;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, UtcOffset};

use crate::error::{ParseError, ParseResult};

/// A temperature in half-degree Celsius steps, as stored by the valve.
///
/// The device encodes every temperature as one byte holding twice the
/// Celsius value, so the representable range is 0.0 to 127.5 °C.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(into = "f32", try_from = "f32")
)]
pub struct Temperature(u8);

impl Temperature {
    /// Highest temperature the one-byte encoding can carry.
    pub const MAX_CELSIUS: f32 = 127.5;

    /// Create from the raw half-degree byte.
    pub const fn from_raw(raw: u8) -> Self {
        Self(raw)
    }

    /// The raw half-degree byte.
    pub const fn raw(self) -> u8 {
        self.0
    }

    /// Create from degrees Celsius, rounding to the nearest 0.5 °C.
    ///
    /// Returns `None` for non-finite or negative values and for values above
    /// [`Temperature::MAX_CELSIUS`].
    ///
    /// ```
    /// use eco_types::Temperature;
    ///
    /// assert_eq!(Temperature::from_celsius(21.5).unwrap().raw(), 43);
    /// assert_eq!(Temperature::from_celsius(21.3).unwrap().celsius(), 21.5);
    /// assert!(Temperature::from_celsius(-1.0).is_none());
    /// ```
    #[must_use]
    pub fn from_celsius(celsius: f32) -> Option<Self> {
        if !celsius.is_finite() || !(0.0..=Self::MAX_CELSIUS).contains(&celsius) {
            return None;
        }
        Some(Self((celsius * 2.0).round() as u8))
    }

    /// The temperature in degrees Celsius.
    pub fn celsius(self) -> f32 {
        f32::from(self.0) / 2.0
    }

    /// Whether the temperature lies within `min..=max` degrees Celsius.
    pub fn within(self, min: f32, max: f32) -> bool {
        (min..=max).contains(&self.celsius())
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}°C", self.celsius())
    }
}

impl From<Temperature> for f32 {
    fn from(value: Temperature) -> Self {
        value.celsius()
    }
}

impl TryFrom<f32> for Temperature {
    type Error = ParseError;

    fn try_from(value: f32) -> Result<Self, Self::Error> {
        Temperature::from_celsius(value)
            .ok_or_else(|| ParseError::InvalidValue(format!("temperature {value} out of range")))
    }
}

/// Minimum number of bytes in a temperature payload.
pub const MIN_TEMPERATURE_BYTES: usize = 2;

/// Target (set-point) and measured room temperature.
///
/// Layout: `[target, room, 0, 0, 0, 0, 0, 0]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TemperatureReading {
    /// Set-point the valve regulates towards.
    pub target: Temperature,
    /// Temperature measured at the valve.
    pub room: Temperature,
}

impl TemperatureReading {
    /// Size of the characteristic value on the wire.
    pub const LEN: usize = 8;

    /// Parse a temperature payload.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InsufficientBytes`] if `data` holds fewer than
    /// [`MIN_TEMPERATURE_BYTES`] bytes.
    pub fn from_bytes(data: &[u8]) -> ParseResult<Self> {
        ParseError::require_len(data, MIN_TEMPERATURE_BYTES)?;
        let mut buf = data;
        Ok(Self {
            target: Temperature::from_raw(buf.get_u8()),
            room: Temperature::from_raw(buf.get_u8()),
        })
    }

    /// Encode for a characteristic write.
    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut out = [0u8; Self::LEN];
        out[0] = self.target.raw();
        out[1] = self.room.raw();
        out
    }
}

/// Valve operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum ScheduleMode {
    /// Holds the target temperature set by the user.
    Manual = 0x00,
    /// Follows the weekly schedule stored on the valve.
    Scheduled = 0x01,
    /// Holds the vacation temperature between the vacation dates.
    Vacation = 0x03,
    /// Temporary hold until the next schedule point.
    Hold = 0x05,
}

impl TryFrom<u8> for ScheduleMode {
    type Error = ParseError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(ScheduleMode::Manual),
            0x01 => Ok(ScheduleMode::Scheduled),
            0x03 => Ok(ScheduleMode::Vacation),
            0x05 => Ok(ScheduleMode::Hold),
            other => Err(ParseError::InvalidValue(format!(
                "unknown schedule mode 0x{other:02X}"
            ))),
        }
    }
}

/// Flag byte at the start of the settings payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct SettingsFlags(u8);

impl SettingsFlags {
    /// Adaptive learning (adaptable regulation).
    pub const ADAPTIVE_LEARNING: u8 = 0x80;
    /// Valve is mounted vertically.
    pub const VERTICAL_INSTALLATION: u8 = 0x40;
    /// Display is rotated 180°.
    pub const DISPLAY_FLIP: u8 = 0x20;
    /// Slow regulation for large radiators.
    pub const SLOW_REGULATION: u8 = 0x10;
    /// Valve has been installed on a radiator.
    pub const VALVE_INSTALLED: u8 = 0x08;
    /// Child safety: buttons on the valve are locked.
    pub const CHILD_SAFETY: u8 = 0x04;
    /// Room temperature exceeded the configured maximum.
    pub const TEMPERATURE_EXCEEDED: u8 = 0x02;
    /// Adaptive learning could not optimise the regulation.
    pub const OPTIMISATION_FAULTY: u8 = 0x01;

    /// Create from the raw flag byte.
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// The raw flag byte.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Whether every bit of `flag` is set.
    pub const fn contains(self, flag: u8) -> bool {
        self.0 & flag == flag
    }

    /// Set or clear `flag`.
    pub fn set(&mut self, flag: u8, enabled: bool) {
        if enabled {
            self.0 |= flag;
        } else {
            self.0 &= !flag;
        }
    }
}

/// Minimum number of bytes in a settings payload (the trailing padding may be absent).
pub const MIN_SETTINGS_BYTES: usize = 14;

/// Device settings.
///
/// Layout (16 bytes):
///
/// | Offset | Field |
/// |--------|-------|
/// | 0 | flags ([`SettingsFlags`]) |
/// | 1 | temperature min |
/// | 2 | temperature max |
/// | 3 | frost protection temperature |
/// | 4 | schedule mode |
/// | 5 | vacation temperature |
/// | 6..10 | vacation start, u32 BE unix seconds (0 = unset) |
/// | 10..14 | vacation end, u32 BE unix seconds (0 = unset) |
/// | 14..16 | padding |
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceSettings {
    /// Flag byte.
    pub flags: SettingsFlags,
    /// Lowest target temperature the valve accepts.
    pub temperature_min: Temperature,
    /// Highest target temperature the valve accepts.
    pub temperature_max: Temperature,
    /// Temperature held to keep the radiator from freezing.
    pub frost_protection_temperature: Temperature,
    /// Current operating mode.
    pub schedule_mode: ScheduleMode,
    /// Temperature held while in vacation mode.
    pub vacation_temperature: Temperature,
    /// Start of the vacation period, if set.
    pub vacation_start: Option<OffsetDateTime>,
    /// End of the vacation period, if set.
    pub vacation_end: Option<OffsetDateTime>,
}

impl DeviceSettings {
    /// Size of the characteristic value on the wire.
    pub const LEN: usize = 16;

    /// Parse a settings payload.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InsufficientBytes`] for short payloads and
    /// [`ParseError::InvalidValue`] for an unknown schedule mode.
    pub fn from_bytes(data: &[u8]) -> ParseResult<Self> {
        ParseError::require_len(data, MIN_SETTINGS_BYTES)?;

        let mut buf = data;
        let flags = SettingsFlags::from_bits(buf.get_u8());
        let temperature_min = Temperature::from_raw(buf.get_u8());
        let temperature_max = Temperature::from_raw(buf.get_u8());
        let frost_protection_temperature = Temperature::from_raw(buf.get_u8());
        let schedule_mode = ScheduleMode::try_from(buf.get_u8())?;
        let vacation_temperature = Temperature::from_raw(buf.get_u8());
        let vacation_start = timestamp_from_wire(buf.get_u32());
        let vacation_end = timestamp_from_wire(buf.get_u32());

        Ok(Self {
            flags,
            temperature_min,
            temperature_max,
            frost_protection_temperature,
            schedule_mode,
            vacation_temperature,
            vacation_start,
            vacation_end,
        })
    }

    /// Encode for a characteristic write.
    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut out = [0u8; Self::LEN];
        out[0] = self.flags.bits();
        out[1] = self.temperature_min.raw();
        out[2] = self.temperature_max.raw();
        out[3] = self.frost_protection_temperature.raw();
        out[4] = self.schedule_mode as u8;
        out[5] = self.vacation_temperature.raw();
        out[6..10].copy_from_slice(&timestamp_to_wire(self.vacation_start).to_be_bytes());
        out[10..14].copy_from_slice(&timestamp_to_wire(self.vacation_end).to_be_bytes());
        out
    }

    /// Whether the valve buttons are locked.
    pub fn child_safety(&self) -> bool {
        self.flags.contains(SettingsFlags::CHILD_SAFETY)
    }

    /// Whether adaptive learning is enabled.
    pub fn adaptive_learning(&self) -> bool {
        self.flags.contains(SettingsFlags::ADAPTIVE_LEARNING)
    }

    /// Lock or unlock the valve buttons.
    pub fn set_child_safety(&mut self, enabled: bool) {
        self.flags.set(SettingsFlags::CHILD_SAFETY, enabled);
    }

    /// Enable or disable adaptive learning.
    pub fn set_adaptive_learning(&mut self, enabled: bool) {
        self.flags.set(SettingsFlags::ADAPTIVE_LEARNING, enabled);
    }
}

fn timestamp_from_wire(seconds: u32) -> Option<OffsetDateTime> {
    if seconds == 0 {
        return None;
    }
    OffsetDateTime::from_unix_timestamp(i64::from(seconds)).ok()
}

fn timestamp_to_wire(timestamp: Option<OffsetDateTime>) -> u32 {
    timestamp
        .map(|t| u32::try_from(t.unix_timestamp()).unwrap_or(0))
        .unwrap_or(0)
}

/// A single error code reported by the valve (shown as `E<n>` on its display).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ErrorCode {
    /// E9: the valve cannot close.
    ValveNotClosing,
    /// E10: the clock is not set.
    InvalidTime,
    /// E14: battery low.
    LowBattery,
    /// E15: battery critically low, the valve stops regulating.
    VeryLowBattery,
    /// Any other code, by its display number.
    Other(u8),
}

impl ErrorCode {
    /// The number shown after the `E` on the valve display.
    pub fn number(self) -> u8 {
        match self {
            ErrorCode::ValveNotClosing => 9,
            ErrorCode::InvalidTime => 10,
            ErrorCode::LowBattery => 14,
            ErrorCode::VeryLowBattery => 15,
            ErrorCode::Other(n) => n,
        }
    }

    fn from_number(number: u8) -> Self {
        match number {
            9 => ErrorCode::ValveNotClosing,
            10 => ErrorCode::InvalidTime,
            14 => ErrorCode::LowBattery,
            15 => ErrorCode::VeryLowBattery,
            n => ErrorCode::Other(n),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.number())
    }
}

/// Minimum number of bytes in an errors payload.
pub const MIN_ERRORS_BYTES: usize = 2;

/// Bitmask of active error codes; code `E<n>` is bit `n - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct DeviceErrors(u16);

impl DeviceErrors {
    /// Create from the raw bitmask.
    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    /// The raw bitmask.
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Parse an errors payload (u16 BE bitmask, rest padding).
    pub fn from_bytes(data: &[u8]) -> ParseResult<Self> {
        ParseError::require_len(data, MIN_ERRORS_BYTES)?;
        let mut buf = data;
        Ok(Self(buf.get_u16()))
    }

    /// Whether any error is active.
    pub const fn has_problems(self) -> bool {
        self.0 != 0
    }

    /// Active codes, lowest number first.
    pub fn codes(self) -> Vec<ErrorCode> {
        (0..16u8)
            .filter(|bit| self.0 & (1 << bit) != 0)
            .map(|bit| ErrorCode::from_number(bit + 1))
            .collect()
    }
}

/// Device clock.
///
/// Layout: u32 BE local time in seconds, i32 BE UTC offset in seconds.
/// Local time is the unix timestamp shifted by the offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceClock {
    /// Seconds since the epoch in the valve's local time.
    pub local_time: u32,
    /// Offset from UTC in seconds.
    pub utc_offset: i32,
}

impl DeviceClock {
    /// Size of the characteristic value on the wire.
    pub const LEN: usize = 8;

    /// Parse a clock payload.
    pub fn from_bytes(data: &[u8]) -> ParseResult<Self> {
        ParseError::require_len(data, Self::LEN)?;
        let mut buf = data;
        Ok(Self {
            local_time: buf.get_u32(),
            utc_offset: buf.get_i32(),
        })
    }

    /// Encode for a characteristic write.
    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut out = [0u8; Self::LEN];
        out[0..4].copy_from_slice(&self.local_time.to_be_bytes());
        out[4..8].copy_from_slice(&self.utc_offset.to_be_bytes());
        out
    }

    /// Build the clock value for a point in time, keeping its UTC offset.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidValue`] if the local time does not fit
    /// the 32-bit wire field.
    pub fn from_datetime(at: OffsetDateTime) -> ParseResult<Self> {
        let utc_offset = at.offset().whole_seconds();
        let local = at.unix_timestamp() + i64::from(utc_offset);
        let local_time = u32::try_from(local)
            .map_err(|_| ParseError::InvalidValue(format!("time {at} out of range")))?;
        Ok(Self {
            local_time,
            utc_offset,
        })
    }

    /// The clock value as an [`OffsetDateTime`] in the valve's offset.
    pub fn to_datetime(&self) -> ParseResult<OffsetDateTime> {
        let offset = UtcOffset::from_whole_seconds(self.utc_offset)
            .map_err(|e| ParseError::InvalidValue(format!("UTC offset: {e}")))?;
        let utc = i64::from(self.local_time) - i64::from(self.utc_offset);
        OffsetDateTime::from_unix_timestamp(utc)
            .map(|t| t.to_offset(offset))
            .map_err(|e| ParseError::InvalidValue(format!("timestamp: {e}")))
    }
}

/// Parse a battery level payload (one byte, percent).
///
/// # Errors
///
/// Returns [`ParseError::InvalidValue`] for values above 100.
pub fn parse_battery_level(data: &[u8]) -> ParseResult<u8> {
    ParseError::require_len(data, 1)?;
    match data[0] {
        level @ 0..=100 => Ok(level),
        other => Err(ParseError::InvalidValue(format!(
            "battery level {other}% out of range"
        ))),
    }
}

/// Size of the device name characteristic on the wire.
pub const DEVICE_NAME_BYTES: usize = 20;

/// Parse a NUL-padded UTF-8 device name.
pub fn parse_device_name(data: &[u8]) -> ParseResult<String> {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8(data[..end].to_vec())
        .map_err(|e| ParseError::InvalidValue(format!("device name is not UTF-8: {e}")))
}

/// Parse a Device Information revision string.
///
/// Trailing NUL padding and surrounding whitespace are dropped.
pub fn parse_revision(data: &[u8]) -> ParseResult<String> {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    let text = std::str::from_utf8(&data[..end])
        .map_err(|e| ParseError::InvalidValue(format!("revision is not UTF-8: {e}")))?;
    Ok(text.trim().to_string())
}

/// Four-digit PIN code written after connecting.
///
/// Encoded on the wire as the decimal value in a u32 BE.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PinCode([u8; 4]);

impl PinCode {
    /// Encode for the PIN characteristic.
    pub fn to_bytes(&self) -> [u8; 4] {
        let value = self
            .0
            .iter()
            .fold(0u32, |acc, digit| acc * 10 + u32::from(*digit));
        value.to_be_bytes()
    }
}

impl FromStr for PinCode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.len() != 4 || !bytes.iter().all(u8::is_ascii_digit) {
            return Err(ParseError::InvalidValue(
                "PIN code should be exactly 4 digits".to_string(),
            ));
        }
        let mut digits = [0u8; 4];
        for (digit, byte) in digits.iter_mut().zip(bytes) {
            *digit = byte - b'0';
        }
        Ok(Self(digits))
    }
}

impl fmt::Debug for PinCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PinCode(****)")
    }
}
