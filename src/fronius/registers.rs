//! Fronius GEN24 register map and lookup tables.

use num_enum::{IntoPrimitive, TryFromPrimitive};

// Block start addresses and lengths {{{
pub const COMMON_ADDRESS: u16 = 40004;
pub const COMMON_LEN: u16 = 65;

pub const INVERTER_ADDRESS: u16 = 40071;
pub const INVERTER_LEN: u16 = 50;

pub const NAMEPLATE_ADDRESS: u16 = 40123;
pub const NAMEPLATE_LEN: u16 = 120;

pub const MODEL_SETTINGS_ADDRESS: u16 = 40151;
pub const MODEL_SETTINGS_LEN: u16 = 30;

pub const STATUS_ADDRESS: u16 = 40183;
pub const STATUS_LEN: u16 = 44;

pub const CONTROLS_ADDRESS: u16 = 40229;
pub const CONTROLS_LEN: u16 = 24;

pub const MPPT_ADDRESS: u16 = 40255;
pub const MPPT_LEN: u16 = 88;

pub const METER_ADDRESS: u16 = 40071;
pub const METER_LEN: u16 = 103;

pub const STORAGE_ADDRESS: u16 = 40345;
pub const STORAGE_LEN: u16 = 24;
// }}}

// Writable registers {{{
pub const CONN_ADDRESS: u16 = 40231;
pub const EXPORT_LIMIT_RATE_ADDRESS: u16 = 40232;
pub const EXPORT_LIMIT_ENABLE_ADDRESS: u16 = 40236;
pub const STORAGE_CONTROL_MODE_ADDRESS: u16 = 40348;
pub const MINIMUM_RESERVE_ADDRESS: u16 = 40350;
pub const DISCHARGE_RATE_ADDRESS: u16 = 40355;
pub const CHARGE_RATE_ADDRESS: u16 = 40356;
// }}}

/// DERTyp value reported by hybrid inverters with a battery attached.
pub const DER_TYPE_STORAGE: u16 = 82;

pub const MAX_METERS: usize = 5;

#[derive(Clone, Copy, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum InverterStatus {
    Off = 1,
    Sleeping = 2,
    Starting = 3,
    Mppt = 4,
    Throttled = 5,
    ShuttingDown = 6,
    Fault = 7,
    Standby = 8,
    NoBusinit = 9,
    NoCommInv = 10,
    SnOverCurrent = 11,
    Bootload = 12,
    Afci = 13,
}

impl InverterStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Off => "Off",
            Self::Sleeping => "Sleeping",
            Self::Starting => "Starting",
            Self::Mppt => "Normal",
            Self::Throttled => "Throttled",
            Self::ShuttingDown => "Shutdown",
            Self::Fault => "Fault",
            Self::Standby => "Standby",
            Self::NoBusinit => "No solarnet",
            Self::NoCommInv => "No inverter communication",
            Self::SnOverCurrent => "Overcurrent solarnet",
            Self::Bootload => "Firmware updating",
            Self::Afci => "AFCI event",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum ChargeStatus {
    Off = 1,
    Empty = 2,
    Discharging = 3,
    Charging = 4,
    Full = 5,
    Holding = 6,
    Testing = 7,
}

impl ChargeStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Off => "Off",
            Self::Empty => "Empty",
            Self::Discharging => "Discharging",
            Self::Charging => "Charging",
            Self::Full => "Full",
            Self::Holding => "Holding",
            Self::Testing => "Testing",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum GridCharging {
    Disabled = 1,
    Enabled = 2,
}

impl GridCharging {
    pub fn label(self) -> &'static str {
        match self {
            Self::Disabled => "Disabled",
            Self::Enabled => "Enabled",
        }
    }
}

/// Raw StorCtl_Mod register.
#[derive(Clone, Copy, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum StorageControlMode {
    Auto = 0,
    Charge = 1,
    Discharge = 2,
    ChargeAndDischarge = 3,
}

impl StorageControlMode {
    pub fn label(self) -> &'static str {
        match self {
            Self::Auto => "Auto",
            Self::Charge => "Charge",
            Self::Discharge => "Discharge",
            Self::ChargeAndDischarge => "Charge and Discharge",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum ControlStatus {
    Disabled = 0,
    Enabled = 1,
}

impl ControlStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Disabled => "Disabled",
            Self::Enabled => "Enabled",
        }
    }
}

/// Condensed PVConn/StorConn bit field, only the combinations the inverter
/// actually reports.
#[derive(Clone, Copy, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum ConnectionStatus {
    Disconnected = 0,
    Connected = 1,
    Available = 3,
    Operating = 7,
}

impl ConnectionStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connected => "Connected",
            Self::Available => "Available",
            Self::Operating => "Operating",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum EcpConnectionStatus {
    Disconnected = 0,
    Connected = 1,
}

impl EcpConnectionStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connected => "Connected",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum GridStatus {
    OffGrid = 0,
    OffGridOperating = 1,
    OnGrid = 2,
    OnGridOperating = 3,
}

impl GridStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::OffGrid => "Off grid",
            Self::OffGridOperating => "Off grid operating",
            Self::OnGrid => "On grid",
            Self::OnGridOperating => "On grid operating",
        }
    }
}

/// EvtVnd2 bits.
pub const INVERTER_EVENTS: &[(u8, &str)] = &[(0, "Error"), (1, "Warning"), (2, "Info")];

/// StActCtl bits.
pub const INVERTER_CONTROLS: &[(u8, &str)] = &[
    (0, "Power reduction"),
    (1, "Constant reactive power"),
    (2, "Constant power factor"),
];
