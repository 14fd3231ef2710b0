use crate::fronius::control::StorageControl;
use serde::Serialize;
use std::collections::BTreeMap;

/// One telemetry value. A key mapped to `None` is known but unavailable.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Float(f64),
    Int(i64),
    Text(String),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            Self::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DeviceIdentity {
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub options: Option<String>,
    pub sw_version: Option<String>,
    pub serial: Option<String>,
    pub unit_id: Option<u16>,
}

/// Current-value store for everything read from the inverter.
///
/// Split in three categories: device identities keyed by prefix (`i_`,
/// `m1_`, `s_`), plain values keyed by field name, and the storage control
/// state. A failed block read leaves older values in place.
#[derive(Clone, Debug, Default)]
pub struct Telemetry {
    identities: BTreeMap<String, DeviceIdentity>,
    values: BTreeMap<String, Option<Value>>,
    storage: StorageControl,
}

impl Telemetry {
    pub fn new() -> Self {
        Self::default()
    }

    // identity {{{
    pub fn set_identity(&mut self, prefix: &str, identity: DeviceIdentity) {
        self.identities.insert(prefix.to_string(), identity);
    }

    pub fn identity(&self, prefix: &str) -> Option<&DeviceIdentity> {
        self.identities.get(prefix)
    }
    // }}}

    // values {{{
    pub fn set_analog(&mut self, key: impl Into<String>, value: Option<f64>) {
        self.values.insert(key.into(), value.map(Value::Float));
    }

    pub fn set_int(&mut self, key: impl Into<String>, value: Option<i64>) {
        self.values.insert(key.into(), value.map(Value::Int));
    }

    pub fn set_text(&mut self, key: impl Into<String>, value: Option<impl Into<String>>) {
        self.values.insert(key.into(), value.map(|v| Value::Text(v.into())));
    }

    /// `Some(None)` for a key that is known but currently unavailable.
    pub fn get(&self, key: &str) -> Option<Option<&Value>> {
        self.values.get(key).map(Option::as_ref)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn analog(&self, key: &str) -> Option<f64> {
        self.values.get(key)?.as_ref()?.as_f64()
    }

    pub fn int(&self, key: &str) -> Option<i64> {
        match self.values.get(key)?.as_ref()? {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.values.get(key)?.as_ref()?.as_str()
    }
    // }}}

    // storage control {{{
    pub fn storage(&self) -> &StorageControl {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut StorageControl {
        &mut self.storage
    }
    // }}}

    /// Flatten everything into one JSON object keyed by field name.
    pub fn snapshot(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut map = serde_json::Map::new();

        for (prefix, identity) in &self.identities {
            if let Ok(serde_json::Value::Object(fields)) = serde_json::to_value(identity) {
                for (key, value) in fields {
                    map.insert(format!("{}{}", prefix, key), value);
                }
            }
        }

        for (key, value) in &self.values {
            let value = serde_json::to_value(value).unwrap_or(serde_json::Value::Null);
            map.insert(key.clone(), value);
        }

        for (key, value) in self.storage.fields() {
            map.insert(key.to_string(), value);
        }

        map
    }
}
