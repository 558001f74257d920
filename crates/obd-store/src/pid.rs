//! PID Codes, Service Modes and Collection Scenarios
//!
//! A PID is stored twice, as decimal and as lowercase hex text, both derived
//! from the same integer so the two columns can never disagree.

use serde::{Deserialize, Serialize};
use std::fmt;

/// OBD-II service mode constants
pub mod mode {
    /// Current data
    pub const CURRENT_DATA: u8 = 0x01;
    /// Freeze frame data
    pub const FREEZE_FRAME: u8 = 0x02;
    /// Diagnostic trouble codes
    pub const READ_DTC: u8 = 0x03;
    /// Vehicle information
    pub const VEHICLE_INFO: u8 = 0x09;
    /// Permanent trouble codes
    pub const PERMANENT_DTC: u8 = 0x0A;

    /// Whether `mode` is one of the standard services 0x01..=0x0A
    pub fn is_recognized(mode: u8) -> bool {
        (CURRENT_DATA..=PERMANENT_DTC).contains(&mode)
    }
}

/// Well-known PIDs, including the telematics unit's extension range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum Pid {
    /// Calculated engine load (0x04)
    EngineLoad = 0x04,
    /// Engine coolant temperature (0x05)
    CoolantTemp = 0x05,
    /// Engine RPM (0x0C)
    Rpm = 0x0C,
    /// Vehicle speed (0x0D)
    Speed = 0x0D,
    /// Mass air flow rate (0x10)
    Maf = 0x10,
    /// Throttle position (0x11)
    ThrottlePosition = 0x11,
    /// Cellular signal strength reported by the device (0x100)
    Rssi = 0x100,
    /// Device board temperature (0x101)
    DeviceTemp = 0x101,
    /// GPS latitude (0x200)
    GpsLatitude = 0x200,
    /// GPS longitude (0x201)
    GpsLongitude = 0x201,
    /// GPS ground speed (0x202)
    GpsSpeed = 0x202,
    /// GPS altitude (0x203)
    GpsAltitude = 0x203,
    /// GPS heading (0x204)
    GpsHeading = 0x204,
}

impl Pid {
    /// Get the numeric code
    pub fn code(&self) -> PidCode {
        PidCode(*self as u16)
    }
}

/// Raw PID value as received from the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PidCode(pub u16);

impl PidCode {
    /// Decimal column value
    pub fn decimal(&self) -> i32 {
        i32::from(self.0)
    }

    /// Lowercase hex text without prefix, e.g. `0x0C -> "c"`
    pub fn hex(&self) -> String {
        format!("{:x}", self.0)
    }

    /// Parse the hex form devices put on the wire (`"0C"`, `"c"`, `"0x10d"`)
    pub fn parse_hex(text: &str) -> Option<Self> {
        let digits = text.trim();
        let digits = digits
            .strip_prefix("0x")
            .or_else(|| digits.strip_prefix("0X"))
            .unwrap_or(digits);
        u16::from_str_radix(digits, 16).ok().map(PidCode)
    }
}

impl From<Pid> for PidCode {
    fn from(pid: Pid) -> Self {
        pid.code()
    }
}

impl From<u16> for PidCode {
    fn from(raw: u16) -> Self {
        PidCode(raw)
    }
}

impl fmt::Display for PidCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}", self.0)
    }
}

/// Collection scenario of a master record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Scenario {
    /// Periodic collection while driving
    Driving = 1,
    /// Collection with the engine idling
    Idle = 2,
    /// Triggered by a diagnostic trouble code
    FaultDiagnosis = 3,
    /// Requested remotely by an operator
    OnDemand = 4,
}

impl Scenario {
    /// Stored scenario code
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl TryFrom<u8> for Scenario {
    type Error = u8;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Scenario::Driving),
            2 => Ok(Scenario::Idle),
            3 => Ok(Scenario::FaultDiagnosis),
            4 => Ok(Scenario::OnDemand),
            other => Err(other),
        }
    }
}

/// One PID reading waiting to be stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PidReading {
    pub pid: PidCode,
    pub value: String,
}

impl PidReading {
    pub fn new(pid: impl Into<PidCode>, value: impl Into<String>) -> Self {
        Self {
            pid: pid.into(),
            value: value.into(),
        }
    }
}
