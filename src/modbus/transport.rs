use crate::prelude::*;

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::timeout;
use tokio_modbus::client::{Context, Reader, Writer};
use tokio_modbus::prelude::{SlaveContext, Slave};

/// Raw request/response access to a register device.
///
/// Implementations do no retrying of their own; that policy lives in
/// [`crate::modbus::client::ModbusClient`].
#[async_trait]
pub trait Transport: Send {
    async fn connect(&mut self) -> Result<(), ModbusError>;

    fn is_connected(&self) -> bool;

    async fn read_holding_registers(
        &mut self,
        unit_id: u8,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, ModbusError>;

    async fn write_registers(
        &mut self,
        unit_id: u8,
        address: u16,
        values: &[u16],
    ) -> Result<(), ModbusError>;

    fn close(&mut self);
}

/// Modbus TCP over `tokio-modbus`.
pub struct TcpTransport {
    host: String,
    port: u16,
    timeout: Duration,
    context: Option<Context>,
}

impl TcpTransport {
    pub fn new(host: &str, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.to_string(),
            port,
            timeout,
            context: None,
        }
    }

    fn context(&mut self, unit_id: u8) -> Result<&mut Context, ModbusError> {
        let context = self.context.as_mut().ok_or(ModbusError::NotConnected)?;
        context.set_slave(Slave(unit_id));
        Ok(context)
    }

    fn on_error(&mut self, err: ModbusError) -> ModbusError {
        if err.is_connection_fatal() {
            debug!("dropping connection to {}:{} after {}", self.host, self.port, err);
            self.context = None;
        }
        err
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&mut self) -> Result<(), ModbusError> {
        self.context = None;

        let addr = timeout(self.timeout, tokio::net::lookup_host((self.host.as_str(), self.port)))
            .await
            .map_err(|_| ModbusError::Timeout(self.timeout))?
            .map_err(|err| ModbusError::Connection(err.to_string()))?
            .next()
            .ok_or_else(|| {
                ModbusError::Connection(format!("{} did not resolve", self.host))
            })?;

        let context = timeout(self.timeout, tokio_modbus::client::tcp::connect(addr))
            .await
            .map_err(|_| ModbusError::Timeout(self.timeout))?
            .map_err(|err| ModbusError::Connection(err.to_string()))?;

        self.context = Some(context);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.context.is_some()
    }

    async fn read_holding_registers(
        &mut self,
        unit_id: u8,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, ModbusError> {
        let duration = self.timeout;
        let context = self.context(unit_id)?;

        let result = match timeout(duration, context.read_holding_registers(address, count)).await {
            Err(_) => Err(ModbusError::Timeout(duration)),
            Ok(Err(err)) => Err(ModbusError::Io(err.to_string())),
            Ok(Ok(Err(exception))) => Err(ModbusError::Exception(format!("{:?}", exception))),
            Ok(Ok(Ok(words))) if words.len() != usize::from(count) => {
                Err(ModbusError::ShortResponse {
                    expected: count,
                    got: words.len(),
                })
            }
            Ok(Ok(Ok(words))) => Ok(words),
        };

        result.map_err(|err| self.on_error(err))
    }

    async fn write_registers(
        &mut self,
        unit_id: u8,
        address: u16,
        values: &[u16],
    ) -> Result<(), ModbusError> {
        let duration = self.timeout;
        let context = self.context(unit_id)?;

        let result = match timeout(duration, context.write_multiple_registers(address, values)).await {
            Err(_) => Err(ModbusError::Timeout(duration)),
            Ok(Err(err)) => Err(ModbusError::Io(err.to_string())),
            Ok(Ok(Err(exception))) => Err(ModbusError::Exception(format!("{:?}", exception))),
            Ok(Ok(Ok(()))) => Ok(()),
        };

        result.map_err(|err| self.on_error(err))
    }

    fn close(&mut self) {
        if self.context.take().is_some() {
            info!("closed connection to {}:{}", self.host, self.port);
        }
    }
}
