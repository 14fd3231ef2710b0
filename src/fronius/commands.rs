//! Write operations.
//!
//! Validation failures and mode-gated writes are not errors: they come back
//! as [`CommandOutcome::Rejected`] / [`CommandOutcome::Ignored`] with nothing
//! written. A write the device refuses is an error.

use crate::prelude::*;

use crate::fronius::control::{
    encode_rate, watts_to_rate, LimitField, ModeSettings, DEFAULT_RESERVE, MAX_RESERVE, MIN_RESERVE,
};
use crate::fronius::registers::*;

pub const EXPORT_LIMIT_MIN: u16 = 100;
pub const EXPORT_LIMIT_MAX: u16 = 10000;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CommandOutcome {
    Applied,
    /// Not writable in the current extended mode; nothing written.
    Ignored,
    /// Failed validation; nothing written.
    Rejected,
}

fn finite(field: LimitField, watts: f64) -> bool {
    if !watts.is_finite() {
        error!("Attempted to set {} to {}", field.name(), watts);
    }
    watts.is_finite()
}

impl<T: Transport> FroniusClient<T> {
    pub async fn execute(&mut self, command: &Command) -> Result<CommandOutcome> {
        debug!("executing {}", command.to_result_topic());

        match *command {
            Command::SetExtControlMode(mode) => self.set_ext_control_mode(mode).await,
            Command::SetStorageControlMode(mode) => self.set_storage_control_mode(mode).await,
            Command::SetMinimumReserve(value) => self.set_minimum_reserve(value).await,
            Command::SetChargeLimit(watts) => self.set_charge_limit(watts).await,
            Command::SetDischargeLimit(watts) => self.set_discharge_limit(watts).await,
            Command::SetGridChargePower(watts) => self.set_grid_charge_power(watts).await,
            Command::SetGridDischargePower(watts) => self.set_grid_discharge_power(watts).await,
            Command::SetExportLimitRate(rate) => self.set_export_limit_rate(rate).await,
            Command::SetExportLimitEnable(enable) => self.set_export_limit_enable(enable).await,
            Command::ApplyExportLimit(rate) => self.apply_export_limit(rate).await,
            Command::SetConnectionStatus(connected) => self.set_conn_status(connected).await,
            Command::RestoreDefaults => self.restore_defaults().await,
        }
    }

    // modes {{{
    pub async fn set_ext_control_mode(&mut self, mode: u8) -> Result<CommandOutcome> {
        match ExtControlMode::try_from(mode) {
            Ok(mode) => self.change_settings(mode).await,
            Err(_) => {
                error!("Attempted to set to unsupported mode. Mode: {}", mode);
                Ok(CommandOutcome::Rejected)
            }
        }
    }

    pub async fn set_auto_mode(&mut self) -> Result<CommandOutcome> {
        self.change_settings(ExtControlMode::Auto).await
    }

    pub async fn set_charge_mode(&mut self) -> Result<CommandOutcome> {
        self.change_settings(ExtControlMode::PvChargeLimit).await
    }

    pub async fn set_discharge_mode(&mut self) -> Result<CommandOutcome> {
        self.change_settings(ExtControlMode::DischargeLimit).await
    }

    pub async fn set_charge_discharge_mode(&mut self) -> Result<CommandOutcome> {
        self.change_settings(ExtControlMode::PvChargeAndDischargeLimit).await
    }

    pub async fn set_grid_charge_mode(&mut self) -> Result<CommandOutcome> {
        self.change_settings(ExtControlMode::ChargeFromGrid).await
    }

    pub async fn set_grid_discharge_mode(&mut self) -> Result<CommandOutcome> {
        self.change_settings(ExtControlMode::DischargeToGrid).await
    }

    pub async fn set_block_discharge_mode(&mut self) -> Result<CommandOutcome> {
        self.change_settings(ExtControlMode::BlockDischarging).await
    }

    pub async fn set_block_charge_mode(&mut self) -> Result<CommandOutcome> {
        self.change_settings(ExtControlMode::BlockCharging).await
    }

    pub async fn set_calibrate_mode(&mut self) -> Result<CommandOutcome> {
        self.change_settings(ExtControlMode::Calibrate).await
    }

    pub async fn restore_defaults(&mut self) -> Result<CommandOutcome> {
        self.change_settings(ExtControlMode::Auto).await?;
        self.set_minimum_reserve(DEFAULT_RESERVE).await
    }

    /// Write the mode's canonical register values, then track it.
    pub async fn change_settings(&mut self, ext_mode: ExtControlMode) -> Result<CommandOutcome> {
        info!("switching to {}", ext_mode.label());
        self.write_settings(ext_mode.settings()).await?;

        let storage = self.telemetry.storage_mut();
        storage.apply_mode(ext_mode);
        storage.log_state();

        Ok(CommandOutcome::Applied)
    }

    /// Block charging with discharge unrestricted, keeping the tracked
    /// extended mode.
    pub(crate) async fn force_discharge(&mut self) -> Result<()> {
        let settings = ExtControlMode::DischargeToGrid.settings();
        self.write_settings(settings).await?;

        let storage = self.telemetry.storage_mut();
        storage.mode = Some(settings.mode);
        storage.seed_limits(settings.charge_rate, settings.discharge_rate);
        Ok(())
    }

    async fn write_settings(&mut self, settings: ModeSettings) -> Result<()> {
        self.write(STORAGE_CONTROL_MODE_ADDRESS, &[u16::from(settings.mode)])
            .await?;
        self.write(CHARGE_RATE_ADDRESS, &[encode_rate(settings.charge_rate)])
            .await?;
        self.write(DISCHARGE_RATE_ADDRESS, &[encode_rate(settings.discharge_rate)])
            .await?;
        Ok(())
    }

    /// Raw StorCtl_Mod write, leaving the rates alone.
    pub async fn set_storage_control_mode(&mut self, mode: u16) -> Result<CommandOutcome> {
        let Ok(mode) = StorageControlMode::try_from(mode) else {
            error!("Attempted to set to unsupported storage control mode. Mode: {}", mode);
            return Ok(CommandOutcome::Rejected);
        };

        self.write(STORAGE_CONTROL_MODE_ADDRESS, &[u16::from(mode)]).await?;
        self.telemetry.storage_mut().mode = Some(mode);
        Ok(CommandOutcome::Applied)
    }
    // }}}

    // limits {{{
    pub async fn set_minimum_reserve(&mut self, value: f64) -> Result<CommandOutcome> {
        if !(MIN_RESERVE..=MAX_RESERVE).contains(&value) {
            error!(
                "Attempted to set minimum reserve to {}, allowed {}..={}",
                value, MIN_RESERVE, MAX_RESERVE
            );
            return Ok(CommandOutcome::Rejected);
        }

        let raw = (value * 100.0).round() as u16;
        self.write(MINIMUM_RESERVE_ADDRESS, &[raw]).await?;
        self.telemetry
            .storage_mut()
            .set_limit(LimitField::MinimumReserve, value);
        self.telemetry.set_analog("minimum_reserve", Some(value));

        Ok(CommandOutcome::Applied)
    }

    fn gate(&self, field: LimitField) -> bool {
        let ext_mode = self.telemetry.storage().ext_mode;
        let writable = field.is_writable_in(ext_mode);
        if !writable {
            debug!(
                "{} is not writable in {}, ignoring",
                field.name(),
                ext_mode.map_or("an unknown mode", ExtControlMode::label)
            );
        }
        writable
    }

    async fn set_charge_rate_w(&mut self, watts: f64) -> Result<()> {
        let rate = watts_to_rate(watts, self.telemetry.storage().max_charge_rate_w);
        self.write(CHARGE_RATE_ADDRESS, &[encode_rate(rate)]).await
    }

    async fn set_discharge_rate_w(&mut self, watts: f64) -> Result<()> {
        let rate = watts_to_rate(watts, self.telemetry.storage().max_discharge_rate_w);
        self.write(DISCHARGE_RATE_ADDRESS, &[encode_rate(rate)]).await
    }

    pub async fn set_charge_limit(&mut self, watts: f64) -> Result<CommandOutcome> {
        if !finite(LimitField::ChargeLimit, watts) {
            return Ok(CommandOutcome::Rejected);
        }
        if !self.gate(LimitField::ChargeLimit) {
            return Ok(CommandOutcome::Ignored);
        }

        self.set_charge_rate_w(watts).await?;
        self.telemetry
            .storage_mut()
            .set_limit(LimitField::ChargeLimit, watts);
        Ok(CommandOutcome::Applied)
    }

    pub async fn set_discharge_limit(&mut self, watts: f64) -> Result<CommandOutcome> {
        if !finite(LimitField::DischargeLimit, watts) {
            return Ok(CommandOutcome::Rejected);
        }
        if !self.gate(LimitField::DischargeLimit) {
            return Ok(CommandOutcome::Ignored);
        }

        self.set_discharge_rate_w(watts).await?;
        self.telemetry
            .storage_mut()
            .set_limit(LimitField::DischargeLimit, watts);
        Ok(CommandOutcome::Applied)
    }

    /// Grid charging runs the discharge rate negative.
    pub async fn set_grid_charge_power(&mut self, watts: f64) -> Result<CommandOutcome> {
        if !finite(LimitField::GridChargePower, watts) {
            return Ok(CommandOutcome::Rejected);
        }
        if !self.gate(LimitField::GridChargePower) {
            return Ok(CommandOutcome::Ignored);
        }

        self.set_discharge_rate_w(-watts).await?;
        self.telemetry
            .storage_mut()
            .set_limit(LimitField::GridChargePower, watts);
        Ok(CommandOutcome::Applied)
    }

    /// Feeding the grid from the battery runs the charge rate negative.
    pub async fn set_grid_discharge_power(&mut self, watts: f64) -> Result<CommandOutcome> {
        if !finite(LimitField::GridDischargePower, watts) {
            return Ok(CommandOutcome::Rejected);
        }
        if !self.gate(LimitField::GridDischargePower) {
            return Ok(CommandOutcome::Ignored);
        }

        self.set_charge_rate_w(-watts).await?;
        self.telemetry
            .storage_mut()
            .set_limit(LimitField::GridDischargePower, watts);
        Ok(CommandOutcome::Applied)
    }
    // }}}

    // export limit and connection {{{
    pub async fn set_export_limit_rate(&mut self, rate: u16) -> Result<CommandOutcome> {
        let clamped = rate.clamp(EXPORT_LIMIT_MIN, EXPORT_LIMIT_MAX);
        if clamped != rate {
            warn!("export limit rate {} clamped to {}", rate, clamped);
        }

        self.write(EXPORT_LIMIT_RATE_ADDRESS, &[clamped]).await?;
        self.telemetry
            .set_int("export_limit_rate", Some(i64::from(clamped)));
        Ok(CommandOutcome::Applied)
    }

    pub async fn set_export_limit_enable(&mut self, enable: bool) -> Result<CommandOutcome> {
        let status = if enable {
            ControlStatus::Enabled
        } else {
            ControlStatus::Disabled
        };

        self.write(EXPORT_LIMIT_ENABLE_ADDRESS, &[u16::from(status)])
            .await?;
        self.telemetry
            .set_text("export_limit_enable", Some(status.label()));
        Ok(CommandOutcome::Applied)
    }

    /// The inverter only takes a new rate while limiting is off, and needs
    /// time between the steps.
    pub async fn apply_export_limit(&mut self, rate: u16) -> Result<CommandOutcome> {
        info!("applying export limit {}", rate);

        self.set_export_limit_enable(false).await?;
        tokio::time::sleep(self.settle_delay).await;
        self.set_export_limit_rate(rate).await?;
        tokio::time::sleep(self.settle_delay).await;
        self.set_export_limit_enable(true).await
    }

    /// Connect the inverter to the grid, or put it in standby.
    pub async fn set_conn_status(&mut self, connected: bool) -> Result<CommandOutcome> {
        let status = if connected {
            ControlStatus::Enabled
        } else {
            ControlStatus::Disabled
        };

        self.write(CONN_ADDRESS, &[u16::from(status)]).await?;
        self.telemetry.set_text("conn", Some(status.label()));
        Ok(CommandOutcome::Applied)
    }
    // }}}
}
