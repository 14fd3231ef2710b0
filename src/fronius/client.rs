use crate::prelude::*;

use std::time::Duration;

/// Outcome of one poll cycle, per register block. `None` means the block is
/// not configured on this installation.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CycleReport {
    pub inverter: bool,
    pub status: bool,
    pub controls: bool,
    pub storage: Option<bool>,
    pub mppt: Option<bool>,
    pub meters: Vec<bool>,
}

impl CycleReport {
    /// A cycle counts as successful when the inverter block was read; other
    /// blocks failing only leaves their previous values in place.
    pub fn success(&self) -> bool {
        self.inverter
    }

    pub fn failures(&self) -> usize {
        [self.inverter, self.status, self.controls]
            .into_iter()
            .chain(self.storage)
            .chain(self.mppt)
            .chain(self.meters.iter().copied())
            .filter(|ok| !ok)
            .count()
    }
}

/// One Fronius GEN24 inverter with its meters and optional battery.
///
/// Owns the register connection and the telemetry it decodes. Callers are
/// expected to serialize access (see [`crate::coordinator::Coordinator`]).
pub struct FroniusClient<T: Transport> {
    pub(crate) modbus: ModbusClient<T>,
    pub(crate) unit_id: u8,
    pub(crate) meter_unit_ids: Vec<u8>,
    pub(crate) connect_retries: u32,
    pub(crate) read_only: bool,
    pub(crate) grid_frequency: f64,
    pub(crate) settle_delay: Duration,
    pub(crate) telemetry: Telemetry,
    pub(crate) mppt_configured: bool,
    pub(crate) storage_configured: bool,
    pub(crate) meter_configured: bool,
}

impl FroniusClient<TcpTransport> {
    pub fn from_config(config: &Config) -> Self {
        let inverter = config.inverter();
        let transport = TcpTransport::new(inverter.host(), inverter.port(), config.request_timeout());
        let modbus = ModbusClient::new(transport, inverter.host(), inverter.port())
            .with_read_retries(config.read_retries);

        Self::new(modbus, inverter)
            .with_connect_retries(config.connect_retries)
            .with_grid_frequency(config.grid_frequency)
    }
}

impl<T: Transport> FroniusClient<T> {
    pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(1);
    pub const DEFAULT_GRID_FREQUENCY: f64 = 50.0;

    pub fn new(modbus: ModbusClient<T>, inverter: &config::Inverter) -> Self {
        Self {
            modbus,
            unit_id: inverter.unit_id(),
            meter_unit_ids: inverter.meter_unit_ids().to_vec(),
            connect_retries: ModbusClient::<T>::DEFAULT_RETRIES,
            read_only: inverter.read_only(),
            grid_frequency: Self::DEFAULT_GRID_FREQUENCY,
            settle_delay: Self::DEFAULT_SETTLE_DELAY,
            telemetry: Telemetry::new(),
            mppt_configured: false,
            storage_configured: false,
            meter_configured: false,
        }
    }

    pub fn with_connect_retries(mut self, retries: u32) -> Self {
        self.connect_retries = retries;
        self.modbus = self.modbus.with_reconnect_retries(retries);
        self
    }

    pub fn with_grid_frequency(mut self, frequency: f64) -> Self {
        self.grid_frequency = frequency;
        self
    }

    /// Pause between the steps of [`Self::apply_export_limit`].
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    pub fn storage_configured(&self) -> bool {
        self.storage_configured
    }

    pub fn mppt_configured(&self) -> bool {
        self.mppt_configured
    }

    pub fn meter_configured(&self) -> bool {
        self.meter_configured
    }

    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::Value::Object(self.telemetry.snapshot())
    }

    /// One poll cycle: inverter, status, controls, storage, MPPT, meters.
    /// A failing block is logged and skipped; the rest still run.
    pub async fn refresh(&mut self) -> CycleReport {
        let mut report = CycleReport {
            inverter: self.read_inverter_data().await,
            status: self.read_inverter_status_data().await,
            controls: self.read_inverter_controls_data().await,
            ..Default::default()
        };

        if !report.inverter {
            warn!("inverter block unavailable this cycle");
        }

        if self.storage_configured {
            report.storage = Some(self.read_storage_data().await);
        }

        if self.mppt_configured {
            report.mppt = Some(self.read_mppt_data().await);
        }

        if self.meter_configured {
            let meters: Vec<(usize, u8)> = self.meter_unit_ids.iter().copied().enumerate().collect();
            for (index, unit_id) in meters {
                let prefix = format!("m{}_", index + 1);
                report.meters.push(self.read_meter_data(&prefix, unit_id).await);
            }
        }

        if report.failures() > 0 {
            warn!("poll cycle finished with {} failed block(s)", report.failures());
        } else {
            debug!("poll cycle complete");
        }

        report
    }

    pub(crate) fn check_read_only(&self) -> Result<()> {
        if self.read_only {
            Err(anyhow!("Write operations are disabled in read-only mode"))
        } else {
            Ok(())
        }
    }

    /// The one path every register write goes through.
    pub(crate) async fn write(&mut self, address: u16, values: &[u16]) -> Result<()> {
        self.check_read_only()?;
        self.modbus
            .write_registers(self.unit_id, address, values)
            .await
            .with_context(|| format!("writing {:?} to {}", values, address))
    }

    pub fn close(&mut self) {
        self.modbus.close();
    }
}
