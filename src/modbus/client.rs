use crate::prelude::*;

use std::time::Duration;

/// Retry policy and connection supervision on top of a [`Transport`].
///
/// Reads degrade to `None` after exhausting retries, writes always report
/// their error, and connecting raises once every attempt has failed. Every
/// operation first checks the connection and reconnects if it's down, with
/// the same attempt budget as [`ModbusClient::connect`].
pub struct ModbusClient<T: Transport> {
    transport: T,
    host: String,
    port: u16,
    retry_delay: Duration,
    read_retries: u32,
    reconnect_retries: u32,
}

impl<T: Transport> ModbusClient<T> {
    pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(200);
    pub const DEFAULT_RETRIES: u32 = 3;

    pub fn new(transport: T, host: &str, port: u16) -> Self {
        Self {
            transport,
            host: host.to_string(),
            port,
            retry_delay: Self::DEFAULT_RETRY_DELAY,
            read_retries: Self::DEFAULT_RETRIES,
            reconnect_retries: Self::DEFAULT_RETRIES,
        }
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_read_retries(mut self, read_retries: u32) -> Self {
        self.read_retries = read_retries;
        self
    }

    pub fn with_reconnect_retries(mut self, reconnect_retries: u32) -> Self {
        self.reconnect_retries = reconnect_retries;
        self
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub async fn connect(&mut self, retries: u32) -> Result<(), ModbusError> {
        let attempts = retries.max(1);

        for attempt in 1..=attempts {
            match self.transport.connect().await {
                Ok(()) => {
                    info!("connected to {}:{}", self.host, self.port);
                    return Ok(());
                }
                Err(err) => {
                    warn!(
                        "connection attempt {}/{} to {}:{} failed: {}",
                        attempt, attempts, self.host, self.port, err
                    );
                    if attempt < attempts {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        Err(ModbusError::Connection(format!(
            "Failed to connect to {}:{} retries: {}",
            self.host, self.port, attempts
        )))
    }

    pub async fn check_and_reconnect(&mut self) -> Result<(), ModbusError> {
        if self.transport.is_connected() {
            return Ok(());
        }

        info!("reconnecting to {}:{}", self.host, self.port);
        self.connect(self.reconnect_retries).await
    }

    /// Read `count` holding registers, retrying up to `retries` times.
    pub async fn read_holding_registers(
        &mut self,
        unit_id: u8,
        address: u16,
        count: u16,
        retries: u32,
    ) -> Option<Vec<u16>> {
        for attempt in 0..=retries {
            if let Err(err) = self.check_and_reconnect().await {
                error!("read {} x{} on unit {}: {}", address, count, unit_id, err);
            } else {
                match self
                    .transport
                    .read_holding_registers(unit_id, address, count)
                    .await
                {
                    Ok(words) => return Some(words),
                    Err(err) => warn!(
                        "read {} x{} on unit {} failed (attempt {}/{}): {}",
                        address,
                        count,
                        unit_id,
                        attempt + 1,
                        retries + 1,
                        err
                    ),
                }
            }

            if attempt < retries {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        error!(
            "giving up reading {} x{} on unit {} after {} attempts",
            address,
            count,
            unit_id,
            retries + 1
        );
        None
    }

    /// The read every block reader uses.
    pub async fn get_registers(&mut self, unit_id: u8, address: u16, count: u16) -> Option<Vec<u16>> {
        let retries = self.read_retries;
        self.read_holding_registers(unit_id, address, count, retries)
            .await
    }

    pub async fn write_registers(
        &mut self,
        unit_id: u8,
        address: u16,
        values: &[u16],
    ) -> Result<(), ModbusError> {
        self.check_and_reconnect().await?;

        debug!("write {} {:?} on unit {}", address, values, unit_id);
        self.transport
            .write_registers(unit_id, address, values)
            .await
            .map_err(|err| {
                error!("write {} {:?} on unit {} failed: {}", address, values, unit_id, err);
                err
            })
    }

    pub fn close(&mut self) {
        self.transport.close();
    }
}
