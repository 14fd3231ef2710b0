use crate::prelude::*;

use crate::fronius::control::{calibration_failsafe, decode_rate, FailsafeAction};
use crate::fronius::registers::*;
use crate::modbus::codec::{calculate_value, BitLabels, RegisterBlock};

/// Meter frequency must sit this close to nominal for the grid to count as up.
const METER_FREQUENCY_TOLERANCE: f64 = 0.2;
/// Looser band for an inverter running its own island.
const INVERTER_FREQUENCY_TOLERANCE: f64 = 5.0;

fn scaled(raw: impl Into<f64>, sf: i16) -> Option<f64> {
    calculate_value(raw.into(), sf, 2, None, None)
}

fn bounded(raw: impl Into<f64>, sf: i16, digits: u32, lower: f64, upper: f64) -> Option<f64> {
    calculate_value(raw.into(), sf, digits, Some(lower), Some(upper))
}

fn lookup<E>(field: &str, raw: u16) -> Option<E>
where
    E: TryFrom<u16>,
{
    let value = E::try_from(raw).ok();
    if value.is_none() {
        error!("unknown {} value {}", field, raw);
    }
    value
}

/// Grid connection state from the primary meter and the inverter frequency.
pub fn grid_status(meter_hz: Option<f64>, inverter_hz: Option<f64>, nominal: f64) -> Option<GridStatus> {
    let (Some(meter_hz), Some(inverter_hz)) = (meter_hz, inverter_hz) else {
        error!("grid status needs both frequencies, meter {:?} inverter {:?}", meter_hz, inverter_hz);
        return None;
    };

    let in_band = |hz: f64, tolerance: f64| hz > nominal - tolerance && hz < nominal + tolerance;
    let meter_online = in_band(meter_hz, METER_FREQUENCY_TOLERANCE);

    let status = if meter_online && in_band(inverter_hz, METER_FREQUENCY_TOLERANCE) {
        Some(GridStatus::OnGridOperating)
    } else if !meter_online && in_band(inverter_hz, INVERTER_FREQUENCY_TOLERANCE) {
        Some(GridStatus::OffGridOperating)
    } else if inverter_hz < 1.0 && meter_online {
        Some(GridStatus::OnGrid)
    } else if inverter_hz < 1.0 && meter_hz < 1.0 {
        Some(GridStatus::OffGrid)
    } else {
        None
    };

    if status.is_none() {
        error!(
            "Could not establish grid connection status m: {} i: {}",
            meter_hz, inverter_hz
        );
    }
    status
}

impl<T: Transport> FroniusClient<T> {
    async fn read_inverter_block(&mut self, address: u16, count: u16) -> Option<Vec<u16>> {
        let unit_id = self.unit_id;
        self.modbus.get_registers(unit_id, address, count).await
    }

    /// AC side of the inverter.
    pub async fn read_inverter_data(&mut self) -> bool {
        let Some(regs) = self.read_inverter_block(INVERTER_ADDRESS, INVERTER_LEN).await else {
            return false;
        };

        match self.parse_inverter(&regs) {
            Ok(()) => true,
            Err(err) => {
                error!("inverter block: {}", err);
                false
            }
        }
    }

    fn parse_inverter(&mut self, regs: &[u16]) -> Result<(), CodecError> {
        let block = RegisterBlock::new(regs, INVERTER_LEN)?;
        let v_sf = block.i16(11)?;
        let events = BitLabels::new(32, INVERTER_EVENTS)?;

        let t = &mut self.telemetry;
        for (key, offset) in [
            ("PPVphAB", 5),
            ("PPVphBC", 6),
            ("PPVphCA", 7),
            ("PhVphA", 8),
            ("PhVphB", 9),
            ("PhVphC", 10),
        ] {
            t.set_analog(key, scaled(block.u16(offset)?, v_sf));
        }

        t.set_analog("acpower", bounded(block.i16(12)?, block.i16(13)?, 2, -50000.0, 50000.0));
        t.set_analog("line_frequency", bounded(block.i16(14)?, block.i16(15)?, 2, 0.0, 100.0));
        t.set_analog("acenergy", scaled(block.u32(22)?, block.i16(24)?));
        t.set_analog("tempcab", scaled(block.i16(31)?, block.i16(35)?));

        let status_vendor = block.u16(37)?;
        t.set_text(
            "statusvendor",
            lookup::<InverterStatus>("inverter status", status_vendor).map(InverterStatus::label),
        );
        t.set_int("statusvendor_id", Some(i64::from(status_vendor)));
        t.set_text("events2", Some(events.to_string(block.u32(44)?, "None")));

        Ok(())
    }

    /// Connection status and active controls.
    pub async fn read_inverter_status_data(&mut self) -> bool {
        let Some(regs) = self.read_inverter_block(STATUS_ADDRESS, STATUS_LEN).await else {
            return false;
        };

        match self.parse_inverter_status(&regs) {
            Ok(()) => true,
            Err(err) => {
                error!("inverter status block: {}", err);
                false
            }
        }
    }

    fn parse_inverter_status(&mut self, regs: &[u16]) -> Result<(), CodecError> {
        let block = RegisterBlock::new(regs, STATUS_LEN)?;
        let controls = BitLabels::new(32, INVERTER_CONTROLS)?;

        let t = &mut self.telemetry;
        t.set_text(
            "pv_connection",
            lookup::<ConnectionStatus>("PV connection", block.u16(0)?).map(ConnectionStatus::label),
        );
        t.set_text(
            "storage_connection",
            lookup::<ConnectionStatus>("storage connection", block.u16(1)?).map(ConnectionStatus::label),
        );
        t.set_text(
            "ecp_connection",
            lookup::<EcpConnectionStatus>("ECP connection", block.u16(2)?).map(EcpConnectionStatus::label),
        );
        t.set_text("inverter_controls", Some(controls.to_string(block.u32(33)?, "Normal")));

        Ok(())
    }

    /// Immediate controls, including the export limit.
    pub async fn read_inverter_controls_data(&mut self) -> bool {
        let Some(regs) = self.read_inverter_block(CONTROLS_ADDRESS, CONTROLS_LEN).await else {
            return false;
        };

        match self.parse_inverter_controls(&regs) {
            Ok(()) => true,
            Err(err) => {
                error!("inverter controls block: {}", err);
                false
            }
        }
    }

    fn parse_inverter_controls(&mut self, regs: &[u16]) -> Result<(), CodecError> {
        let block = RegisterBlock::new(regs, CONTROLS_LEN)?;
        let status = |field: &str, raw: u16| lookup::<ControlStatus>(field, raw).map(ControlStatus::label);

        let conn = status("connection", block.u16(2)?);
        let export_limit_rate = block.u16(3)?;
        let export_limit_enable = status("export limit", block.u16(7)?);
        let power_factor = status("power factor", block.u16(12)?);
        let reactive_power = status("reactive power", block.u16(20)?);

        let t = &mut self.telemetry;
        t.set_text("conn", conn);
        t.set_int("export_limit_rate", Some(i64::from(export_limit_rate)));
        t.set_text("export_limit_enable", export_limit_enable);
        t.set_text("power_factor_enable", power_factor);
        t.set_text("reactive_power_enable", reactive_power);

        Ok(())
    }

    /// DC strings. Strings 3 and 4 are the battery on hybrid models.
    pub async fn read_mppt_data(&mut self) -> bool {
        let Some(regs) = self.read_inverter_block(MPPT_ADDRESS, MPPT_LEN).await else {
            return false;
        };

        match self.parse_mppt(&regs) {
            Ok(()) => true,
            Err(err) => {
                error!("mppt block: {}", err);
                false
            }
        }
    }

    fn parse_mppt(&mut self, regs: &[u16]) -> Result<(), CodecError> {
        let block = RegisterBlock::new(regs, MPPT_LEN)?;
        let dcw_sf = block.i16(2)?;
        let dcwh_sf = block.i16(3)?;
        let modules = block.u16(6)?;
        trace!("mppt reports {} modules", modules);

        let strings = if self.storage_configured { 4 } else { 2 };
        let mut power = [None; 4];

        for (i, slot) in power.iter_mut().enumerate().take(strings) {
            let base = 19 + 20 * i;
            *slot = bounded(block.u16(base)?, dcw_sf, 2, 0.0, 15000.0);
            self.telemetry.set_analog(format!("mppt{}_power", i + 1), *slot);
            self.telemetry
                .set_analog(format!("mppt{}_lfte", i + 1), scaled(block.u32(base + 1)?, dcwh_sf));
        }

        let sum = |a: Option<f64>, b: Option<f64>| Some(crate::modbus::codec::round(a? + b?, 2));
        self.telemetry.set_analog("pv_power", sum(power[0], power[1]));
        if self.storage_configured {
            self.telemetry
                .set_analog("storage_power", sum(power[3], power[2].map(|p| -p)));
        }

        Ok(())
    }

    /// One AC meter, stored under `prefix`. The first meter also feeds the
    /// house load and grid status.
    pub async fn read_meter_data(&mut self, prefix: &str, unit_id: u8) -> bool {
        let Some(regs) = self
            .modbus
            .get_registers(unit_id, METER_ADDRESS, METER_LEN)
            .await
        else {
            return false;
        };

        match self.parse_meter(prefix, &regs) {
            Ok(()) => true,
            Err(err) => {
                error!("{}meter block: {}", prefix, err);
                false
            }
        }
    }

    fn parse_meter(&mut self, prefix: &str, regs: &[u16]) -> Result<(), CodecError> {
        let block = RegisterBlock::new(regs, METER_LEN)?;
        let v_sf = block.i16(13)?;
        let tot_wh_sf = block.i16(52)?;

        let power = bounded(block.i16(16)?, block.i16(20)?, 2, -50000.0, 50000.0);
        let frequency = bounded(block.i16(14)?, block.i16(15)?, 2, 0.0, 100.0);

        let t = &mut self.telemetry;
        for (key, offset) in [("PhVphA", 6), ("PhVphB", 7), ("PhVphC", 8), ("PPV", 9)] {
            t.set_analog(
                format!("{}{}", prefix, key),
                bounded(block.i16(offset)?, v_sf, 1, 0.0, 1000.0),
            );
        }
        t.set_analog(format!("{}exported", prefix), scaled(block.u32(36)?, tot_wh_sf));
        t.set_analog(format!("{}imported", prefix), scaled(block.u32(44)?, tot_wh_sf));
        t.set_analog(format!("{}line_frequency", prefix), frequency);
        t.set_analog(format!("{}power", prefix), power);

        if prefix == "m1_" {
            match (power, t.analog("acpower")) {
                (Some(meter), Some(inverter)) => {
                    t.set_analog("load", Some(crate::modbus::codec::round(meter + inverter, 2)));
                }
                (meter, inverter) => {
                    debug!("no load figure, meter {:?} inverter {:?}", meter, inverter);
                }
            }

            let status = grid_status(frequency, t.analog("line_frequency"), self.grid_frequency);
            t.set_text("grid_status", status.map(GridStatus::label));
        }

        Ok(())
    }

    /// Battery block, then mode derivation and the calibration failsafe.
    pub async fn read_storage_data(&mut self) -> bool {
        let Some(regs) = self.read_inverter_block(STORAGE_ADDRESS, STORAGE_LEN).await else {
            return false;
        };

        if let Err(err) = self.parse_storage(&regs) {
            error!("storage block: {}", err);
            return false;
        }

        if let Err(err) = self.run_failsafe().await {
            error!("calibration failsafe: {:#}", err);
        }

        true
    }

    fn parse_storage(&mut self, regs: &[u16]) -> Result<(), CodecError> {
        let block = RegisterBlock::new(regs, STORAGE_LEN)?;

        let max_charge = block.u16(0)?;
        let charge_gradient = block.u16(1)?;
        let discharge_gradient = block.u16(2)?;
        let raw_mode = block.u16(3)?;
        let minimum_reserve = bounded(block.u16(5)?, -2, 2, 0.0, 100.0);
        let soc = bounded(block.u16(6)?, -2, 2, 0.0, 100.0);
        let charge_status = block.u16(9)?;
        let discharge_raw = block.u16(10)?;
        let charge_raw = block.u16(11)?;
        let grid_charging = block.u16(15)?;

        let discharge_rate = decode_rate(discharge_raw);
        let charge_rate = decode_rate(charge_raw);

        let t = &mut self.telemetry;
        t.set_analog("max_charge", scaled(max_charge, 0).map(|v| v.round()));
        t.set_int("charge_gradient", Some(i64::from(charge_gradient)));
        t.set_int("discharge_gradient", Some(i64::from(discharge_gradient)));
        t.set_analog("minimum_reserve", minimum_reserve);
        t.set_analog("soc", soc);
        t.set_text(
            "charge_status",
            lookup::<ChargeStatus>("charge status", charge_status).map(ChargeStatus::label),
        );
        t.set_analog("discharging_power", bounded(discharge_raw as i16, -2, 2, -100.0, 100.0));
        t.set_analog("charging_power", bounded(charge_raw as i16, -2, 2, -100.0, 100.0));
        t.set_text(
            "grid_charging",
            lookup::<GridCharging>("grid charging", grid_charging).map(GridCharging::label),
        );
        t.set_int("storage_control_mode", Some(i64::from(raw_mode)));

        let Some(mode) = lookup::<StorageControlMode>("storage control mode", raw_mode) else {
            return Ok(());
        };

        let storage = t.storage_mut();
        storage.minimum_reserve = minimum_reserve;

        if storage.mode != Some(mode) {
            debug!("storage control mode now {}", mode.label());
            storage.mode = Some(mode);
            storage.seed_limits(charge_rate, discharge_rate);

            if let Some(ext_mode) = storage.ext_mode {
                if ext_mode.settings().mode != mode {
                    warn!(
                        "device switched to {} while {} is tracked; not re-deriving",
                        mode.label(),
                        ext_mode.label()
                    );
                }
            }
        }

        if storage.ext_mode.is_none() {
            let ext_mode = ExtControlMode::derive(mode, charge_rate, discharge_rate);
            info!("derived extended control mode {}", ext_mode.label());
            storage.ext_mode = Some(ext_mode);
        }
        storage.log_state();

        Ok(())
    }

    async fn run_failsafe(&mut self) -> Result<()> {
        let storage = self.telemetry.storage();
        let action = calibration_failsafe(storage.ext_mode, storage.mode, self.telemetry.analog("soc"));

        match action {
            Some(FailsafeAction::StartDischarge) => {
                info!("battery full while calibrating, discharging");
                self.force_discharge().await?;
            }
            Some(FailsafeAction::RestoreAuto) => {
                info!("battery empty while calibrating, back to auto");
                self.set_auto_mode().await?;
                self.set_minimum_reserve(crate::fronius::control::FAILSAFE_RESERVE).await?;
            }
            None => {}
        }

        Ok(())
    }
}
