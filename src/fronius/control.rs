//! Storage control modes.
//!
//! The inverter only knows four raw storage control modes plus signed
//! charge/discharge rates. The extended mode is the user-facing view built on
//! top: it decides which setpoints may be written and what the rate registers
//! should hold.

use crate::prelude::*;

use crate::fronius::registers::StorageControlMode;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Used until the nameplate block reports real values.
pub const DEFAULT_MAX_RATE_W: f64 = 11000.0;

pub const MIN_RESERVE: f64 = 5.0;
pub const MAX_RESERVE: f64 = 100.0;

/// Reserve applied when the calibration failsafe drops back to Auto.
pub const FAILSAFE_RESERVE: f64 = 30.0;

pub const DEFAULT_RESERVE: f64 = 7.0;

#[derive(Clone, Copy, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ExtControlMode {
    Auto = 0,
    PvChargeLimit = 1,
    DischargeLimit = 2,
    PvChargeAndDischargeLimit = 3,
    ChargeFromGrid = 4,
    DischargeToGrid = 5,
    BlockDischarging = 6,
    BlockCharging = 7,
    Calibrate = 8,
}

impl ExtControlMode {
    pub const ALL: [Self; 9] = [
        Self::Auto,
        Self::PvChargeLimit,
        Self::DischargeLimit,
        Self::PvChargeAndDischargeLimit,
        Self::ChargeFromGrid,
        Self::DischargeToGrid,
        Self::BlockDischarging,
        Self::BlockCharging,
        Self::Calibrate,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Auto => "Auto",
            Self::PvChargeLimit => "PV Charge Limit",
            Self::DischargeLimit => "Discharge Limit",
            Self::PvChargeAndDischargeLimit => "PV Charge and Discharge Limit",
            Self::ChargeFromGrid => "Charge from Grid",
            Self::DischargeToGrid => "Discharge to Grid",
            Self::BlockDischarging => "Block Discharging",
            Self::BlockCharging => "Block Charging",
            Self::Calibrate => "Calibrate",
        }
    }

    /// Work out the extended mode from the raw registers. First match wins;
    /// [`Self::Calibrate`] is never derived.
    pub fn derive(mode: StorageControlMode, charge_rate: f64, discharge_rate: f64) -> Self {
        use StorageControlMode::*;

        match mode {
            Auto => Self::Auto,
            Charge | ChargeAndDischarge if charge_rate == 0.0 => Self::BlockCharging,
            Charge => Self::PvChargeLimit,
            Discharge | ChargeAndDischarge if discharge_rate < 0.0 => Self::ChargeFromGrid,
            Discharge | ChargeAndDischarge if charge_rate < 0.0 => Self::DischargeToGrid,
            Discharge | ChargeAndDischarge if discharge_rate == 0.0 => Self::BlockDischarging,
            Discharge => Self::DischargeLimit,
            ChargeAndDischarge => Self::PvChargeAndDischargeLimit,
        }
    }

    /// Register values written when switching into this mode.
    pub fn settings(self) -> ModeSettings {
        use StorageControlMode::*;

        let (mode, charge_rate, discharge_rate) = match self {
            Self::Auto => (Auto, 100.0, 100.0),
            Self::PvChargeLimit => (Charge, 100.0, 100.0),
            Self::DischargeLimit => (Discharge, 100.0, 100.0),
            Self::PvChargeAndDischargeLimit => (ChargeAndDischarge, 100.0, 100.0),
            Self::ChargeFromGrid => (Discharge, 100.0, 0.0),
            Self::DischargeToGrid => (Charge, 0.0, 100.0),
            Self::BlockDischarging => (ChargeAndDischarge, 100.0, 0.0),
            Self::BlockCharging => (ChargeAndDischarge, 0.0, 100.0),
            Self::Calibrate => (Discharge, 100.0, -100.0),
        };

        ModeSettings {
            mode,
            charge_rate,
            discharge_rate,
            grid_charge_rate: if self == Self::Calibrate { 100.0 } else { 0.0 },
            grid_discharge_rate: 0.0,
        }
    }

    /// Modes the calibration failsafe watches.
    pub fn is_calibrating(self) -> bool {
        matches!(self, Self::BlockCharging | Self::Calibrate)
    }
}

/// Rates are percentages of the nameplate maximum, signed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ModeSettings {
    pub mode: StorageControlMode,
    pub charge_rate: f64,
    pub discharge_rate: f64,
    pub grid_charge_rate: f64,
    pub grid_discharge_rate: f64,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LimitField {
    MinimumReserve,
    ChargeLimit,
    DischargeLimit,
    GridChargePower,
    GridDischargePower,
}

impl LimitField {
    pub fn name(self) -> &'static str {
        match self {
            Self::MinimumReserve => "minimum_reserve",
            Self::ChargeLimit => "charge_limit",
            Self::DischargeLimit => "discharge_limit",
            Self::GridChargePower => "grid_charge_power",
            Self::GridDischargePower => "grid_discharge_power",
        }
    }

    pub fn writable_modes(self) -> &'static [ExtControlMode] {
        use ExtControlMode::*;

        match self {
            Self::MinimumReserve => &ExtControlMode::ALL,
            Self::ChargeLimit => &[PvChargeLimit, PvChargeAndDischargeLimit, BlockDischarging],
            Self::DischargeLimit => &[DischargeLimit, PvChargeAndDischargeLimit, BlockCharging],
            Self::GridChargePower => &[ChargeFromGrid],
            Self::GridDischargePower => &[DischargeToGrid],
        }
    }

    /// An unknown mode only allows fields writable everywhere.
    pub fn is_writable_in(self, mode: Option<ExtControlMode>) -> bool {
        match mode {
            Some(mode) => self.writable_modes().contains(&mode),
            None => self == Self::MinimumReserve,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FailsafeAction {
    /// Battery is full while calibrating: start discharging it.
    StartDischarge,
    /// Battery is empty: back to Auto with a safe reserve.
    RestoreAuto,
}

pub fn calibration_failsafe(
    ext_mode: Option<ExtControlMode>,
    mode: Option<StorageControlMode>,
    soc: Option<f64>,
) -> Option<FailsafeAction> {
    if !ext_mode.is_some_and(ExtControlMode::is_calibrating) {
        return None;
    }

    match (mode?, soc?) {
        (StorageControlMode::Discharge, soc) if soc >= 100.0 => Some(FailsafeAction::StartDischarge),
        (StorageControlMode::ChargeAndDischarge, soc) if soc <= 5.0 => Some(FailsafeAction::RestoreAuto),
        _ => None,
    }
}

/// Encode a signed percentage for the InWRte/OutWRte registers.
pub fn encode_rate(rate: f64) -> u16 {
    let rate = rate.clamp(-100.0, 100.0);
    let scaled = (rate * 100.0).round() as i32;

    if scaled >= 0 {
        scaled as u16
    } else {
        (65536 + scaled) as u16
    }
}

pub fn decode_rate(raw: u16) -> f64 {
    f64::from(raw as i16) / 100.0
}

/// Convert a watt setpoint to a percentage of `max_w`, saturating at ±100.
pub fn watts_to_rate(watts: f64, max_w: f64) -> f64 {
    let max_w = if max_w > 0.0 { max_w } else { DEFAULT_MAX_RATE_W };

    if watts > max_w {
        100.0
    } else if watts < -max_w {
        -100.0
    } else {
        watts / max_w * 100.0
    }
}

pub fn rate_to_watts(rate: f64, max_w: f64) -> f64 {
    crate::modbus::codec::round(rate / 100.0 * max_w, 0)
}

/// Cached storage control state. Limits and grid powers are watts.
#[derive(Clone, Debug, PartialEq)]
pub struct StorageControl {
    pub ext_mode: Option<ExtControlMode>,
    pub mode: Option<StorageControlMode>,
    pub charge_limit: Option<f64>,
    pub discharge_limit: Option<f64>,
    pub grid_charge_power: Option<f64>,
    pub grid_discharge_power: Option<f64>,
    pub minimum_reserve: Option<f64>,
    pub max_charge_rate_w: f64,
    pub max_discharge_rate_w: f64,
}

impl Default for StorageControl {
    fn default() -> Self {
        Self {
            ext_mode: None,
            mode: None,
            charge_limit: None,
            discharge_limit: None,
            grid_charge_power: None,
            grid_discharge_power: None,
            minimum_reserve: None,
            max_charge_rate_w: DEFAULT_MAX_RATE_W,
            max_discharge_rate_w: DEFAULT_MAX_RATE_W,
        }
    }
}

impl StorageControl {
    pub fn limit(&self, field: LimitField) -> Option<f64> {
        match field {
            LimitField::MinimumReserve => self.minimum_reserve,
            LimitField::ChargeLimit => self.charge_limit,
            LimitField::DischargeLimit => self.discharge_limit,
            LimitField::GridChargePower => self.grid_charge_power,
            LimitField::GridDischargePower => self.grid_discharge_power,
        }
    }

    pub fn set_limit(&mut self, field: LimitField, value: f64) {
        let slot = match field {
            LimitField::MinimumReserve => &mut self.minimum_reserve,
            LimitField::ChargeLimit => &mut self.charge_limit,
            LimitField::DischargeLimit => &mut self.discharge_limit,
            LimitField::GridChargePower => &mut self.grid_charge_power,
            LimitField::GridDischargePower => &mut self.grid_discharge_power,
        };
        *slot = Some(value);
    }

    /// Re-seed setpoints from the raw rate registers. A negative rate means
    /// the power flows the other way through the grid.
    pub fn seed_limits(&mut self, charge_rate: f64, discharge_rate: f64) {
        if discharge_rate >= 0.0 {
            self.discharge_limit = Some(rate_to_watts(discharge_rate, self.max_discharge_rate_w));
            self.grid_charge_power = Some(0.0);
        } else {
            self.grid_charge_power = Some(rate_to_watts(-discharge_rate, self.max_discharge_rate_w));
            self.discharge_limit = Some(0.0);
        }

        if charge_rate >= 0.0 {
            self.charge_limit = Some(rate_to_watts(charge_rate, self.max_charge_rate_w));
            self.grid_discharge_power = Some(0.0);
        } else {
            self.grid_discharge_power = Some(rate_to_watts(-charge_rate, self.max_charge_rate_w));
            self.charge_limit = Some(0.0);
        }
    }

    /// Cache update after switching into `ext_mode` with its canonical
    /// settings.
    pub fn apply_mode(&mut self, ext_mode: ExtControlMode) {
        let settings = ext_mode.settings();

        self.ext_mode = Some(ext_mode);
        self.mode = Some(settings.mode);
        self.charge_limit = Some(match ext_mode {
            ExtControlMode::DischargeToGrid => 0.0,
            _ => rate_to_watts(settings.charge_rate.max(0.0), self.max_charge_rate_w),
        });
        self.discharge_limit = Some(match ext_mode {
            ExtControlMode::ChargeFromGrid => 0.0,
            _ => rate_to_watts(settings.discharge_rate.max(0.0), self.max_discharge_rate_w),
        });
        self.grid_charge_power = Some(rate_to_watts(settings.grid_charge_rate, self.max_discharge_rate_w));
        self.grid_discharge_power = Some(rate_to_watts(settings.grid_discharge_rate, self.max_charge_rate_w));
    }

    pub fn fields(&self) -> Vec<(&'static str, serde_json::Value)> {
        let number = |v: Option<f64>| v.map_or(serde_json::Value::Null, serde_json::Value::from);

        vec![
            (
                "ext_control_mode",
                self.ext_mode
                    .map_or(serde_json::Value::Null, |m| serde_json::Value::from(m.label())),
            ),
            (
                "control_mode",
                self.mode
                    .map_or(serde_json::Value::Null, |m| serde_json::Value::from(m.label())),
            ),
            ("charge_limit", number(self.charge_limit)),
            ("discharge_limit", number(self.discharge_limit)),
            ("grid_charge_power", number(self.grid_charge_power)),
            ("grid_discharge_power", number(self.grid_discharge_power)),
            ("max_charge_rate_w", serde_json::Value::from(self.max_charge_rate_w)),
            ("max_discharge_rate_w", serde_json::Value::from(self.max_discharge_rate_w)),
        ]
    }

    pub fn log_state(&self) {
        debug!(
            "storage: ext={:?} mode={:?} charge={:?} discharge={:?} grid_charge={:?} grid_discharge={:?}",
            self.ext_mode,
            self.mode,
            self.charge_limit,
            self.discharge_limit,
            self.grid_charge_power,
            self.grid_discharge_power
        );
    }
}
