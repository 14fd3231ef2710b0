#![allow(dead_code)]

use async_trait::async_trait;
use fronius_bridge::fronius::registers::*;
use fronius_bridge::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub fn common_setup() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Clone, Debug)]
pub struct WriteRecord {
    pub unit_id: u8,
    pub address: u16,
    pub values: Vec<u16>,
    pub at: Instant,
}

#[derive(Debug, Default)]
pub struct MockState {
    registers: HashMap<(u8, u16), u16>,
    failing_reads: HashSet<(u8, u16)>,
    failing_writes: HashSet<u16>,
    writes: Vec<WriteRecord>,
    reads: usize,
    read_delay: Duration,
    connect_failures: u32,
    connect_attempts: u32,
    connected: bool,
}

/// In-memory register device. Each unit id has a flat register space, so
/// writes show up in later reads the way they do on the inverter.
#[derive(Clone, Debug, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn set(&self, unit_id: u8, address: u16, values: &[u16]) {
        let mut state = self.state();
        for (i, value) in values.iter().enumerate() {
            state.registers.insert((unit_id, address + i as u16), *value);
        }
    }

    pub fn set_i16(&self, unit_id: u8, address: u16, value: i16) {
        self.set(unit_id, address, &[value as u16]);
    }

    pub fn set_u32(&self, unit_id: u8, address: u16, value: u32) {
        self.set(unit_id, address, &[(value >> 16) as u16, value as u16]);
    }

    pub fn set_string(&self, unit_id: u8, address: u16, value: &str) {
        let words: Vec<u16> = value
            .as_bytes()
            .chunks(2)
            .map(|c| u16::from_be_bytes([c[0], c.get(1).copied().unwrap_or(0)]))
            .collect();
        self.set(unit_id, address, &words);
    }

    pub fn get(&self, unit_id: u8, address: u16) -> u16 {
        self.state().registers.get(&(unit_id, address)).copied().unwrap_or(0)
    }

    /// Reads starting at `address` fail until [`Self::heal_block`].
    pub fn fail_block(&self, unit_id: u8, address: u16) {
        self.state().failing_reads.insert((unit_id, address));
    }

    pub fn heal_block(&self, unit_id: u8, address: u16) {
        self.state().failing_reads.remove(&(unit_id, address));
    }

    pub fn fail_writes_to(&self, address: u16) {
        self.state().failing_writes.insert(address);
    }

    pub fn fail_connects(&self, count: u32) {
        self.state().connect_failures = count;
    }

    pub fn disconnect(&self) {
        self.state().connected = false;
    }

    pub fn set_read_delay(&self, delay: Duration) {
        self.state().read_delay = delay;
    }

    pub fn connect_attempts(&self) -> u32 {
        self.state().connect_attempts
    }

    pub fn reads(&self) -> usize {
        self.state().reads
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.state().writes.clone()
    }

    /// `(address, values)` of every write so far.
    pub fn written(&self) -> Vec<(u16, Vec<u16>)> {
        self.writes()
            .into_iter()
            .map(|w| (w.address, w.values))
            .collect()
    }

    pub fn clear_writes(&self) {
        self.state().writes.clear();
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&mut self) -> Result<(), ModbusError> {
        let mut state = self.state();
        state.connect_attempts += 1;

        if state.connect_failures > 0 {
            state.connect_failures -= 1;
            return Err(ModbusError::Connection("connection refused".to_string()));
        }

        state.connected = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state().connected
    }

    async fn read_holding_registers(
        &mut self,
        unit_id: u8,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, ModbusError> {
        let delay = self.state().read_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        state.reads += 1;

        if !state.connected {
            return Err(ModbusError::NotConnected);
        }
        if state.failing_reads.contains(&(unit_id, address)) {
            state.connected = false;
            return Err(ModbusError::Io("connection reset by peer".to_string()));
        }

        Ok((address..address + count)
            .map(|a| state.registers.get(&(unit_id, a)).copied().unwrap_or(0))
            .collect())
    }

    async fn write_registers(
        &mut self,
        unit_id: u8,
        address: u16,
        values: &[u16],
    ) -> Result<(), ModbusError> {
        let mut state = self.state();

        if !state.connected {
            return Err(ModbusError::NotConnected);
        }
        if state.failing_writes.contains(&address) {
            return Err(ModbusError::Exception("IllegalDataAddress".to_string()));
        }

        state.writes.push(WriteRecord {
            unit_id,
            address,
            values: values.to_vec(),
            at: Instant::now(),
        });
        for (i, value) in values.iter().enumerate() {
            state.registers.insert((unit_id, address + i as u16), *value);
        }
        Ok(())
    }

    fn close(&mut self) {
        self.state().connected = false;
    }
}

pub struct Factory;

impl Factory {
    pub const UNIT_ID: u8 = 1;
    pub const METER_UNIT_ID: u8 = 200;
    /// Nameplate MaxChaRte / MaxDisChaRte.
    pub const MAX_RATE_W: u16 = 5000;
    pub const SETTLE_DELAY: Duration = Duration::from_millis(20);

    pub fn inverter() -> config::Inverter {
        config::Inverter {
            host: "gen24".to_string(),
            port: 502,
            unit_id: Self::UNIT_ID,
            meter_unit_ids: vec![Self::METER_UNIT_ID],
            read_only: None,
        }
    }

    pub fn client(transport: &MockTransport) -> FroniusClient<MockTransport> {
        Self::client_for(transport, &Self::inverter())
    }

    pub fn client_for(transport: &MockTransport, inverter: &config::Inverter) -> FroniusClient<MockTransport> {
        let modbus = ModbusClient::new(transport.clone(), inverter.host(), inverter.port())
            .with_retry_delay(Duration::ZERO)
            .with_read_retries(1);

        FroniusClient::new(modbus, inverter).with_settle_delay(Self::SETTLE_DELAY)
    }

    /// Client after `init_data`, with the write log cleared.
    pub async fn ready_client(transport: &MockTransport) -> FroniusClient<MockTransport> {
        let mut client = Self::client(transport);
        client.init_data().await.unwrap();
        transport.clear_writes();
        client
    }

    /// A Primo GEN24 Plus with a battery and one smart meter.
    pub fn gen24() -> MockTransport {
        let transport = MockTransport::new();
        Self::identity(&transport, Self::UNIT_ID, "Fronius", "Primo GEN24 6.0 Plus", "31234567");
        Self::identity(&transport, Self::METER_UNIT_ID, "Fronius", "Smart Meter TS 65A-3", "41234567");
        Self::nameplate(&transport, DER_TYPE_STORAGE);
        Self::model_settings(&transport, 6000);
        Self::inverter_block(&transport, 1500, 5000);
        Self::status_block(&transport);
        Self::controls_block(&transport, 10000, false);
        Self::mppt_block(&transport, [1000, 1200, 300, 0]);
        Self::meter_block(&transport, Self::METER_UNIT_ID, -500, 4999);
        Self::storage_block(&transport, StorageControlMode::Auto, 100.0, 100.0, 55.5);
        transport
    }

    pub fn identity(transport: &MockTransport, unit_id: u8, manufacturer: &str, model: &str, serial: &str) {
        transport.set_string(unit_id, COMMON_ADDRESS, manufacturer);
        transport.set_string(unit_id, COMMON_ADDRESS + 16, model);
        transport.set_string(unit_id, COMMON_ADDRESS + 40, "1.30.7-1");
        transport.set_string(unit_id, COMMON_ADDRESS + 48, serial);
        transport.set(unit_id, COMMON_ADDRESS + 64, &[u16::from(unit_id)]);
    }

    pub fn nameplate(transport: &MockTransport, der_type: u16) {
        let unit = Self::UNIT_ID;
        transport.set(unit, NAMEPLATE_ADDRESS, &[der_type]);
        transport.set(unit, NAMEPLATE_ADDRESS + 17, &[10240]);
        transport.set(unit, NAMEPLATE_ADDRESS + 21, &[Self::MAX_RATE_W]);
        transport.set(unit, NAMEPLATE_ADDRESS + 23, &[Self::MAX_RATE_W]);
    }

    pub fn model_settings(transport: &MockTransport, w_max: u16) {
        transport.set(Self::UNIT_ID, MODEL_SETTINGS_ADDRESS, &[w_max]);
        transport.set_i16(Self::UNIT_ID, MODEL_SETTINGS_ADDRESS + 20, 0);
    }

    /// `frequency` in centihertz.
    pub fn inverter_block(transport: &MockTransport, ac_power: i16, frequency: i16) {
        let (unit, base) = (Self::UNIT_ID, INVERTER_ADDRESS);
        transport.set(unit, base + 5, &[4000, 4000, 4000, 2300, 2310, 2320]);
        transport.set_i16(unit, base + 11, -1);
        transport.set_i16(unit, base + 12, ac_power);
        transport.set_i16(unit, base + 13, 0);
        transport.set_i16(unit, base + 14, frequency);
        transport.set_i16(unit, base + 15, -2);
        transport.set_u32(unit, base + 22, 1_234_567);
        transport.set_i16(unit, base + 24, 0);
        transport.set_i16(unit, base + 31, 35);
        transport.set_i16(unit, base + 35, 0);
        transport.set(unit, base + 37, &[4]);
        transport.set_u32(unit, base + 44, 0);
    }

    pub fn status_block(transport: &MockTransport) {
        transport.set(Self::UNIT_ID, STATUS_ADDRESS, &[7, 7, 1]);
        transport.set_u32(Self::UNIT_ID, STATUS_ADDRESS + 33, 0);
    }

    pub fn controls_block(transport: &MockTransport, export_limit_rate: u16, export_limit_enabled: bool) {
        let base = CONTROLS_ADDRESS;
        transport.set(Self::UNIT_ID, base + 2, &[1, export_limit_rate]);
        transport.set(Self::UNIT_ID, base + 7, &[u16::from(export_limit_enabled)]);
    }

    pub fn mppt_block(transport: &MockTransport, power: [u16; 4]) {
        let (unit, base) = (Self::UNIT_ID, MPPT_ADDRESS);
        transport.set_i16(unit, base + 2, 0);
        transport.set_i16(unit, base + 3, 0);
        transport.set(unit, base + 6, &[4]);
        for (i, watts) in power.iter().enumerate() {
            let offset = base + 19 + 20 * i as u16;
            transport.set(unit, offset, &[*watts]);
            transport.set_u32(unit, offset + 1, 100_000 * (i as u32 + 1));
        }
    }

    /// `frequency` in centihertz.
    pub fn meter_block(transport: &MockTransport, unit_id: u8, power: i16, frequency: i16) {
        let base = METER_ADDRESS;
        transport.set(unit_id, base + 6, &[2301, 2302, 2303, 3990]);
        transport.set_i16(unit_id, base + 13, -1);
        transport.set_i16(unit_id, base + 14, frequency);
        transport.set_i16(unit_id, base + 15, -2);
        transport.set_i16(unit_id, base + 16, power);
        transport.set_i16(unit_id, base + 20, 0);
        transport.set_u32(unit_id, base + 36, 2_000_000);
        transport.set_u32(unit_id, base + 44, 3_000_000);
        transport.set_i16(unit_id, base + 52, 0);
    }

    /// Rates in percent, as the inverter reports them.
    pub fn storage_block(
        transport: &MockTransport,
        mode: StorageControlMode,
        charge_rate: f64,
        discharge_rate: f64,
        soc: f64,
    ) {
        let (unit, base) = (Self::UNIT_ID, STORAGE_ADDRESS);
        let rate = |r: f64| (r * 100.0).round() as i16 as u16;

        transport.set(unit, base, &[10240, 100, 100, u16::from(mode)]);
        transport.set(unit, base + 5, &[700, (soc * 100.0).round() as u16]);
        transport.set(unit, base + 9, &[4, rate(discharge_rate), rate(charge_rate)]);
        transport.set(unit, base + 15, &[1]);
    }
}
