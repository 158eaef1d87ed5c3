use bluer::Uuid;
use std::collections::BTreeMap;
use std::fmt;

/// Normalise a BLE MAC so that lookups are case-insensitive
pub fn normalize_address(address: &str) -> String {
    address.trim().to_uppercase()
}

/// A meter found during discovery (or configured up front)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub address: String,
    pub display_name: String,
}

impl DeviceInfo {
    pub fn new(address: &str, display_name: &str) -> Self {
        DeviceInfo {
            address: normalize_address(address),
            display_name: display_name.to_string(),
        }
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mac: {} Device: {}", self.address, self.display_name)
    }
}

/// One advertisement seen during a scan round
#[derive(Debug, Clone)]
pub struct Advertisement {
    pub address: String,
    pub local_name: Option<String>,
}

/// Backend-specific location of a characteristic on a connected device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CharacteristicHandle {
    pub service: u16,
    pub characteristic: u16,
}

impl fmt::Display for CharacteristicHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}/{:#06x}", self.service, self.characteristic)
    }
}

/// A characteristic exposed by the device, as returned by enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredCharacteristic {
    pub uuid: Uuid,
    pub handle: CharacteristicHandle,
}

/// A characteristic on a specific device that has a registered decoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownCharacteristic {
    pub device_address: String,
    pub characteristic_id: Uuid,
    pub handle: CharacteristicHandle,
}

/// Decoded fields of one or more characteristics.
///
/// A `None` value means the meter reported its "no measurement" sentinel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reading(BTreeMap<&'static str, Option<f64>>);

impl Reading {
    pub fn new() -> Self {
        Reading(BTreeMap::new())
    }

    pub fn insert(&mut self, field: &'static str, value: Option<f64>) {
        self.0.insert(field, value);
    }

    /// Overwrite the fields present in `other`, keep everything else
    pub fn merge(&mut self, other: Reading) {
        self.0.extend(other.0);
    }

    /// `None` if the field was never read, `Some(None)` if it was read as absent
    pub fn get(&self, field: &str) -> Option<Option<f64>> {
        self.0.get(field).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, Option<f64>)> + '_ {
        self.0.iter().map(|(name, value)| (*name, *value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}
