use crate::prelude::*;

use crate::fronius::registers::*;
use crate::fronius::solar_api::SolarApi;
use crate::modbus::codec::{calculate_value, RegisterBlock};

impl<T: Transport> FroniusClient<T> {
    /// Connect and read everything that doesn't change while running:
    /// identities, installed strings, meters and the nameplate.
    pub async fn init_data(&mut self) -> Result<()> {
        let retries = self.connect_retries;
        self.modbus.connect(retries).await?;

        let unit_id = self.unit_id;
        if !self.read_device_info("i_", unit_id).await {
            bail!("Empty inverter info");
        }

        if self.read_mppt_data().await {
            self.mppt_configured = true;
        }

        if self.meter_unit_ids.len() > MAX_METERS {
            error!(
                "{} meters configured, at most {} supported; ignoring all meters",
                self.meter_unit_ids.len(),
                MAX_METERS
            );
        } else {
            let meters: Vec<(usize, u8)> = self.meter_unit_ids.iter().copied().enumerate().collect();
            for (index, unit_id) in meters {
                let prefix = format!("m{}_", index + 1);
                if self.read_device_info(&prefix, unit_id).await {
                    self.meter_configured = true;
                }
            }
        }

        if !self.read_nameplate_data().await {
            warn!("nameplate unavailable, assuming no storage");
        }

        self.read_model_settings().await;

        info!(
            "initialised {} {}: mppt {}, storage {}, meters {}",
            self.telemetry
                .identity("i_")
                .and_then(|i| i.manufacturer.as_deref())
                .unwrap_or("?"),
            self.telemetry
                .identity("i_")
                .and_then(|i| i.model.as_deref())
                .unwrap_or("?"),
            self.mppt_configured,
            self.storage_configured,
            self.meter_configured
        );

        Ok(())
    }

    /// SunSpec common block. Returns false (without erroring) when the block
    /// can't be read or decoded.
    pub async fn read_device_info(&mut self, prefix: &str, unit_id: u8) -> bool {
        let Some(regs) = self
            .modbus
            .get_registers(unit_id, COMMON_ADDRESS, COMMON_LEN)
            .await
        else {
            return false;
        };

        match parse_device_info(&regs) {
            Ok(identity) => {
                info!(
                    "{}device: {} {} serial {} sw {}",
                    prefix,
                    identity.manufacturer.as_deref().unwrap_or_default(),
                    identity.model.as_deref().unwrap_or_default(),
                    identity.serial.as_deref().unwrap_or_default(),
                    identity.sw_version.as_deref().unwrap_or_default()
                );
                self.telemetry.set_identity(prefix, identity);
                true
            }
            Err(err) => {
                error!("{}device info: {}", prefix, err);
                false
            }
        }
    }

    pub async fn read_nameplate_data(&mut self) -> bool {
        let unit_id = self.unit_id;
        let Some(regs) = self
            .modbus
            .get_registers(unit_id, NAMEPLATE_ADDRESS, NAMEPLATE_LEN)
            .await
        else {
            return false;
        };

        let parsed = (|| -> Result<_, CodecError> {
            let block = RegisterBlock::new(&regs, NAMEPLATE_LEN)?;
            Ok((block.u16(0)?, block.u16(17)?, block.u16(21)?, block.u16(23)?))
        })();

        let (der_type, wh_rtg, max_cha_rte, max_dis_cha_rte) = match parsed {
            Ok(values) => values,
            Err(err) => {
                error!("nameplate: {}", err);
                return false;
            }
        };

        if der_type == DER_TYPE_STORAGE {
            self.storage_configured = true;
        }

        self.telemetry.set_int("der_type", Some(i64::from(der_type)));
        self.telemetry.set_int("whrtg", Some(i64::from(wh_rtg)));
        self.telemetry.set_int("max_cha_rte", Some(i64::from(max_cha_rte)));
        self.telemetry.set_int("max_dis_cha_rte", Some(i64::from(max_dis_cha_rte)));

        let storage = self.telemetry.storage_mut();
        if max_cha_rte > 0 {
            storage.max_charge_rate_w = f64::from(max_cha_rte);
        }
        if max_dis_cha_rte > 0 {
            storage.max_discharge_rate_w = f64::from(max_dis_cha_rte);
        }

        debug!(
            "nameplate: DERTyp {} WHRtg {} MaxChaRte {} MaxDisChaRte {}",
            der_type, wh_rtg, max_cha_rte, max_dis_cha_rte
        );
        true
    }

    /// WMax from the basic settings model.
    pub async fn read_model_settings(&mut self) -> bool {
        let unit_id = self.unit_id;
        let Some(regs) = self
            .modbus
            .get_registers(unit_id, MODEL_SETTINGS_ADDRESS, MODEL_SETTINGS_LEN)
            .await
        else {
            return false;
        };

        let parsed = (|| -> Result<_, CodecError> {
            let block = RegisterBlock::new(&regs, MODEL_SETTINGS_LEN)?;
            Ok((block.u16(0)?, block.i16(20)?))
        })();

        match parsed {
            Ok((w_max, w_max_sf)) => {
                let max_power = calculate_value(f64::from(w_max), w_max_sf, 2, Some(0.0), Some(50000.0));
                self.telemetry.set_analog("max_power", max_power);
                true
            }
            Err(err) => {
                error!("model settings: {}", err);
                false
            }
        }
    }

    /// Name the battery from the Solar API. Failures are logged only.
    pub async fn read_storage_info(&mut self, api: &SolarApi) -> bool {
        match api.storage_info().await {
            Some(identity) => {
                info!(
                    "storage: {} {} serial {}",
                    identity.manufacturer.as_deref().unwrap_or_default(),
                    identity.model.as_deref().unwrap_or_default(),
                    identity.serial.as_deref().unwrap_or_default()
                );
                self.telemetry.set_identity("s_", identity);
                true
            }
            None => false,
        }
    }
}

pub fn parse_device_info(regs: &[u16]) -> Result<DeviceIdentity, CodecError> {
    let block = RegisterBlock::new(regs, COMMON_LEN)?;
    let text = |offset, len| -> Result<Option<String>, CodecError> {
        Ok(Some(block.string(offset, len)?))
    };

    Ok(DeviceIdentity {
        manufacturer: text(0, 16)?,
        model: text(16, 16)?,
        options: text(32, 8)?,
        sw_version: text(40, 8)?,
        serial: text(48, 16)?,
        unit_id: Some(block.u16(64)?),
    })
}
