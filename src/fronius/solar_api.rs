use crate::prelude::*;

use serde_json::Value as Json;
use std::time::Duration;

const STORAGE_REALTIME_PATH: &str = "/solar_api/v1/GetStorageRealtimeData.cgi";

pub const DEFAULT_STORAGE_MODEL: &str = "Battery Storage";

/// Read-only client for the inverter's Solar API, used only to name the
/// attached battery.
#[derive(Clone, Debug)]
pub struct SolarApi {
    base_url: String,
    client: reqwest::Client,
}

impl SolarApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn for_host(host: &str, timeout: Duration) -> Result<Self> {
        Self::new(&format!("http://{}", host), timeout)
    }

    /// Storage identity, or `None` when the request or payload is unusable.
    /// Never fails.
    pub async fn storage_info(&self) -> Option<DeviceIdentity> {
        let url = format!("{}{}", self.base_url, STORAGE_REALTIME_PATH);
        debug!("fetching storage info from {}", url);

        let body = match self.fetch(&url).await {
            Ok(body) => body,
            Err(err) => {
                error!("storage info request to {} failed: {}", url, err);
                return None;
            }
        };

        match serde_json::from_str::<Json>(&body) {
            Ok(json) => parse_storage_info(&json),
            Err(err) => {
                error!("storage info from {} is not JSON: {}", url, err);
                None
            }
        }
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }
}

/// `Body.Data.<first id>.Controller.Details` of a storage realtime reply.
pub fn parse_storage_info(json: &Json) -> Option<DeviceIdentity> {
    let Some(data) = json.pointer("/Body/Data").and_then(Json::as_object) else {
        error!("storage info has no Body.Data object");
        return None;
    };

    let Some((id, entry)) = data.iter().next() else {
        warn!("storage info lists no storage devices");
        return None;
    };

    let Some(details) = entry.pointer("/Controller/Details").and_then(Json::as_object) else {
        error!("storage {} has no Controller.Details", id);
        return None;
    };

    let text = |key: &str| -> Option<String> {
        let value = match details.get(key)? {
            Json::String(s) => s.trim().to_string(),
            Json::Number(n) => n.to_string(),
            _ => return None,
        };
        Some(value).filter(|s| !s.is_empty())
    };

    Some(DeviceIdentity {
        manufacturer: text("Manufacturer"),
        model: Some(text("Model").unwrap_or_else(|| DEFAULT_STORAGE_MODEL.to_string())),
        serial: text("Serial"),
        ..Default::default()
    })
}
