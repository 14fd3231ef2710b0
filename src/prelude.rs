pub use anyhow::{anyhow, bail, Context as _, Result};
pub use log::{debug, error, info, trace, warn};
pub use std::io::Write as _;
pub use tokio::sync::broadcast;

pub use crate::channels::{ChannelData, Channels};
pub use crate::command::Command;
pub use crate::config::{self, Config};
pub use crate::error::{CodecError, ModbusError};
pub use crate::fronius::client::FroniusClient;
pub use crate::fronius::commands::CommandOutcome;
pub use crate::fronius::control::ExtControlMode;
pub use crate::fronius::telemetry::{DeviceIdentity, Telemetry, Value};
pub use crate::modbus::client::ModbusClient;
pub use crate::modbus::transport::{TcpTransport, Transport};
pub use crate::options::Options;
