use std::collections::BTreeMap;

use crate::models::{normalize_address, DeviceInfo};

/// Known meters keyed by normalised address
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: BTreeMap<String, DeviceInfo>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a device; returns false if the address was already known
    pub fn insert(&mut self, info: DeviceInfo) -> bool {
        if self.devices.contains_key(&info.address) {
            return false;
        }
        self.devices.insert(info.address.clone(), info);
        true
    }

    pub fn contains(&self, address: &str) -> bool {
        self.devices.contains_key(&normalize_address(address))
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn addresses(&self) -> Vec<String> {
        self.devices.keys().cloned().collect()
    }

    pub fn infos(&self) -> &BTreeMap<String, DeviceInfo> {
        &self.devices
    }
}
