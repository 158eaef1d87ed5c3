/// In-memory BLE backend that records every operation
use async_trait::async_trait;
use bluer::Uuid;
use std::collections::{BTreeMap, HashMap};
use tokio::time::Duration;

use super::BleBackend;
use crate::error::BleError;
use crate::models::{Advertisement, CharacteristicHandle, DiscoveredCharacteristic};

const SERVICE_HANDLE: u16 = 0x000a;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Scan,
    Connect(String),
    Disconnect(String),
    Enumerate(String),
    Read(String, Uuid),
}

#[derive(Debug, Clone, Copy)]
pub enum Fault {
    Disconnect,
    Timeout,
    /// GATT error reported while the link stays up
    Gatt,
}

impl Fault {
    fn error(self) -> BleError {
        match self {
            Fault::Disconnect => BleError::Disconnected,
            Fault::Timeout => BleError::Timeout,
            Fault::Gatt => BleError::Bluetooth(bluer::Error {
                kind: bluer::ErrorKind::Failed,
                message: "Operation failed with ATT error: 0x0e".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MockDevice {
    pub address: String,
    characteristics: Vec<(DiscoveredCharacteristic, Vec<u8>)>,
    faults: HashMap<Uuid, Fault>,
    connect_failures: u32,
    unreachable: bool,
    enumerate_fault: Option<Fault>,
}

impl MockDevice {
    pub fn new(address: &str) -> Self {
        MockDevice {
            address: address.to_string(),
            characteristics: Vec::new(),
            faults: HashMap::new(),
            connect_failures: 0,
            unreachable: false,
            enumerate_fault: None,
        }
    }

    pub fn with_characteristic(mut self, uuid: Uuid, payload: Vec<u8>) -> Self {
        let handle = CharacteristicHandle {
            service: SERVICE_HANDLE,
            characteristic: self.characteristics.len() as u16 + 1,
        };
        self.characteristics
            .push((DiscoveredCharacteristic { uuid, handle }, payload));
        self
    }

    /// Fail the next `count` connect attempts
    pub fn fail_connects(mut self, count: u32) -> Self {
        self.connect_failures = count;
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    pub fn fail_enumerate(mut self, fault: Fault) -> Self {
        self.enumerate_fault = Some(fault);
        self
    }

    pub fn fault(mut self, uuid: Uuid, fault: Fault) -> Self {
        self.faults.insert(uuid, fault);
        self
    }
}

#[derive(Debug, Default)]
pub struct MockBackend {
    devices: BTreeMap<String, MockDevice>,
    /// Advertisements returned by successive scan rounds
    rounds: Vec<Vec<Advertisement>>,
    pub ops: Vec<Op>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(mut self, device: MockDevice) -> Self {
        self.devices.insert(device.address.clone(), device);
        self
    }

    pub fn with_scan_round(mut self, advertisements: &[(&str, Option<&str>)]) -> Self {
        self.rounds.push(
            advertisements
                .iter()
                .map(|(address, name)| Advertisement {
                    address: address.to_string(),
                    local_name: name.map(str::to_string),
                })
                .collect(),
        );
        self
    }

    pub fn set_payload(&mut self, address: &str, uuid: Uuid, payload: Vec<u8>) {
        if let Some(device) = self.devices.get_mut(address) {
            for (characteristic, data) in device.characteristics.iter_mut() {
                if characteristic.uuid == uuid {
                    *data = payload.clone();
                }
            }
        }
    }

    pub fn set_unreachable(&mut self, address: &str, unreachable: bool) {
        if let Some(device) = self.devices.get_mut(address) {
            device.unreachable = unreachable;
        }
    }

    pub fn connect_attempts(&self, address: &str) -> usize {
        self.count(|op| matches!(op, Op::Connect(a) if a == address))
    }

    pub fn count(&self, predicate: impl Fn(&Op) -> bool) -> usize {
        self.ops.iter().filter(|op| predicate(op)).count()
    }
}

#[async_trait]
impl BleBackend for MockBackend {
    type Connection = String;

    async fn scan(&mut self, _duration: Duration) -> Result<Vec<Advertisement>, BleError> {
        self.ops.push(Op::Scan);
        if self.rounds.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.rounds.remove(0))
    }

    async fn connect(&mut self, address: &str) -> Result<String, BleError> {
        self.ops.push(Op::Connect(address.to_string()));
        let device = self
            .devices
            .get_mut(address)
            .ok_or(BleError::Timeout)?;
        if device.unreachable {
            return Err(BleError::Timeout);
        }
        if device.connect_failures > 0 {
            device.connect_failures -= 1;
            return Err(BleError::Timeout);
        }
        Ok(address.to_string())
    }

    async fn disconnect(&mut self, connection: String) -> Result<(), BleError> {
        self.ops.push(Op::Disconnect(connection));
        Ok(())
    }

    async fn characteristics(
        &mut self,
        connection: &String,
    ) -> Result<Vec<DiscoveredCharacteristic>, BleError> {
        self.ops.push(Op::Enumerate(connection.clone()));
        let device = self.devices.get(connection).ok_or(BleError::Disconnected)?;
        if let Some(fault) = device.enumerate_fault {
            return Err(fault.error());
        }
        Ok(device
            .characteristics
            .iter()
            .map(|(characteristic, _)| characteristic.clone())
            .collect())
    }

    async fn read(
        &mut self,
        connection: &String,
        handle: CharacteristicHandle,
    ) -> Result<Vec<u8>, BleError> {
        let device = self.devices.get(connection).ok_or(BleError::Disconnected)?;
        let (characteristic, payload) = device
            .characteristics
            .iter()
            .find(|(c, _)| c.handle == handle)
            .ok_or(BleError::Disconnected)?;
        self.ops
            .push(Op::Read(connection.clone(), characteristic.uuid));
        match device.faults.get(&characteristic.uuid) {
            Some(fault) => Err(fault.error()),
            None => Ok(payload.clone()),
        }
    }
}
