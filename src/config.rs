use crate::prelude::*;

use serde::Deserialize;
use std::time::Duration;

use crate::fronius::registers::MAX_METERS;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub inverter: Inverter,

    #[serde(default = "Config::default_scan_interval")]
    pub scan_interval: u64,

    #[serde(default = "Config::default_retries")]
    pub connect_retries: u32,

    #[serde(default = "Config::default_retries")]
    pub read_retries: u32,

    #[serde(default = "Config::default_loglevel")]
    pub loglevel: String,

    #[serde(default = "Config::default_enabled")]
    pub solar_api: bool,

    #[serde(default = "Config::default_grid_frequency")]
    pub grid_frequency: f64,

    /// Optional path to keep the latest telemetry snapshot in, as JSON
    pub status_file: Option<String>,
}

// Inverter {{{
#[derive(Clone, Debug, Deserialize)]
pub struct Inverter {
    pub host: String,

    #[serde(default = "Config::default_port")]
    pub port: u16,

    #[serde(default = "Config::default_unit_id")]
    pub unit_id: u8,

    #[serde(default = "Vec::new")]
    pub meter_unit_ids: Vec<u8>,

    pub read_only: Option<bool>,
}
impl Inverter {
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn unit_id(&self) -> u8 {
        self.unit_id
    }

    pub fn meter_unit_ids(&self) -> &[u8] {
        &self.meter_unit_ids
    }

    pub fn read_only(&self) -> bool {
        self.read_only == Some(true)
    }
} // }}}

impl Config {
    pub fn new(file: String) -> Result<Self> {
        let content = std::fs::read_to_string(&file)
            .map_err(|err| anyhow!("error reading {}: {}", file, err))?;

        let config = Self::from_yaml(&content)?;
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn log_summary(&self) {
        info!("Configuration loaded successfully:");
        info!("  Inverter:");
        info!("    Host: {}", self.inverter.host);
        info!("    Port: {}", self.inverter.port);
        info!("    Unit ID: {}", self.inverter.unit_id);
        info!("    Meter unit IDs: {:?}", self.inverter.meter_unit_ids);
        info!("    Read Only: {}", self.inverter.read_only());
        info!("  Scan interval: {}s", self.scan_interval);
        info!("  Request timeout: {}s", self.request_timeout().as_secs());
        info!("  Connect retries: {}", self.connect_retries);
        info!("  Read retries: {}", self.read_retries);
        info!("  Solar API: {}", if self.solar_api { "enabled" } else { "disabled" });
        info!("  Grid frequency: {}Hz", self.grid_frequency);
        info!(
            "  Status file: {}",
            self.status_file.as_deref().unwrap_or("none")
        );
        info!("  Log Level: {}", self.loglevel);
    }

    fn validate(&self) -> Result<()> {
        if self.inverter.port == 0 {
            bail!("inverter.port must be between 1 and 65535");
        }
        if self.inverter.host.is_empty() {
            return Err(anyhow!("inverter host cannot be empty"));
        }
        if self.inverter.meter_unit_ids.len() > MAX_METERS {
            bail!(
                "{} meters configured, at most {} are supported",
                self.inverter.meter_unit_ids.len(),
                MAX_METERS
            );
        }
        if self.scan_interval == 0 {
            bail!("scan_interval must be at least 1 second");
        }
        if self.grid_frequency.is_nan() || self.grid_frequency <= 0.0 {
            bail!("grid_frequency must be positive");
        }

        Ok(())
    }

    pub fn inverter(&self) -> &Inverter {
        &self.inverter
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval)
    }

    /// Per request socket timeout, one second under the scan interval but
    /// never less than three.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_interval.saturating_sub(1).max(3))
    }

    pub fn loglevel(&self) -> &str {
        &self.loglevel
    }

    pub fn read_only(&self) -> bool {
        self.inverter.read_only()
    }

    pub fn status_file(&self) -> Option<&str> {
        self.status_file.as_deref()
    }

    fn default_scan_interval() -> u64 {
        10
    }

    fn default_retries() -> u32 {
        3
    }

    fn default_port() -> u16 {
        502
    }

    fn default_unit_id() -> u8 {
        1
    }

    fn default_enabled() -> bool {
        true
    }

    fn default_grid_frequency() -> f64 {
        50.0
    }

    fn default_loglevel() -> String {
        "info".to_string()
    }
}
