#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetExtControlMode(u8),
    SetStorageControlMode(u16),
    SetMinimumReserve(f64),
    SetChargeLimit(f64),
    SetDischargeLimit(f64),
    SetGridChargePower(f64),
    SetGridDischargePower(f64),
    SetExportLimitRate(u16),
    SetExportLimitEnable(bool),
    ApplyExportLimit(u16),
    SetConnectionStatus(bool),
    RestoreDefaults,
}

impl Command {
    /// Short path-like name, used in logs and command results.
    pub fn to_result_topic(&self) -> String {
        use Command::*;

        let rest = match self {
            SetExtControlMode(mode) => format!("set/ext_control_mode/{}", mode),
            SetStorageControlMode(mode) => format!("set/storage_control_mode/{}", mode),
            SetMinimumReserve(_) => "set/minimum_reserve".to_string(),
            SetChargeLimit(_) => "set/charge_limit".to_string(),
            SetDischargeLimit(_) => "set/discharge_limit".to_string(),
            SetGridChargePower(_) => "set/grid_charge_power".to_string(),
            SetGridDischargePower(_) => "set/grid_discharge_power".to_string(),
            SetExportLimitRate(_) => "set/export_limit_rate".to_string(),
            SetExportLimitEnable(_) => "set/export_limit_enable".to_string(),
            ApplyExportLimit(_) => "set/export_limit".to_string(),
            SetConnectionStatus(_) => "set/conn".to_string(),
            RestoreDefaults => "set/restore_defaults".to_string(),
        };

        format!("result/{}", rest)
    }
}
