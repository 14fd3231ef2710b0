use crate::prelude::*;

use clap::{Parser, Subcommand};

/// Fronius Bridge - Modbus TCP bridge for Fronius GEN24 inverters
#[derive(Debug, Parser)]
#[clap(author, version)]
pub struct Options {
    /// Config file to read
    #[clap(short = 'c', long = "config", default_value = "config.yaml")]
    pub config_file: String,

    /// Optional runtime limit in seconds
    #[clap(short = 't', long = "time")]
    pub runtime: Option<u64>,

    #[clap(subcommand)]
    pub action: Option<Action>,
}

#[derive(Debug, Clone, PartialEq, Subcommand)]
pub enum Action {
    /// Poll continuously (default)
    Run,
    /// Run one poll cycle and print the telemetry as JSON
    Read,
    /// Switch the extended storage control mode (0-8)
    SetMode { mode: u8 },
    /// Write the raw storage control mode register (0-3)
    SetStorageControlMode { mode: u16 },
    /// Minimum battery reserve in percent (5-100)
    SetReserve { percent: f64 },
    /// Charge limit in watts
    SetChargeLimit { watts: f64 },
    /// Discharge limit in watts
    SetDischargeLimit { watts: f64 },
    /// Grid charging power in watts (Charge from Grid mode only)
    SetGridChargePower { watts: f64 },
    /// Grid feed-in power from the battery in watts (Discharge to Grid mode only)
    SetGridDischargePower { watts: f64 },
    /// Export limit rate, clamped to 100-10000
    SetExportLimitRate { rate: u16 },
    /// Enable or disable export limiting
    SetExportLimitEnable {
        #[clap(action = clap::ArgAction::Set)]
        enable: bool,
    },
    /// Disable, set and re-enable the export limit
    ApplyExportLimit { rate: u16 },
    /// Connect the inverter to the grid, or put it in standby
    SetConn {
        #[clap(action = clap::ArgAction::Set)]
        connected: bool,
    },
    /// Auto mode with a 7% reserve
    RestoreDefaults,
}

impl Action {
    /// The control command for this action, if it is one.
    pub fn command(&self) -> Option<Command> {
        use Action::*;

        let command = match *self {
            Run | Read => return None,
            SetMode { mode } => Command::SetExtControlMode(mode),
            SetStorageControlMode { mode } => Command::SetStorageControlMode(mode),
            SetReserve { percent } => Command::SetMinimumReserve(percent),
            SetChargeLimit { watts } => Command::SetChargeLimit(watts),
            SetDischargeLimit { watts } => Command::SetDischargeLimit(watts),
            SetGridChargePower { watts } => Command::SetGridChargePower(watts),
            SetGridDischargePower { watts } => Command::SetGridDischargePower(watts),
            SetExportLimitRate { rate } => Command::SetExportLimitRate(rate),
            SetExportLimitEnable { enable } => Command::SetExportLimitEnable(enable),
            ApplyExportLimit { rate } => Command::ApplyExportLimit(rate),
            SetConn { connected } => Command::SetConnectionStatus(connected),
            RestoreDefaults => Command::RestoreDefaults,
        };

        Some(command)
    }
}

impl Options {
    pub fn new() -> Self {
        Self::parse()
    }

    pub fn action(&self) -> Action {
        self.action.clone().unwrap_or(Action::Run)
    }
}
