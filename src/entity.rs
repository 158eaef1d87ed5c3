/// Per-reading sensor entities exposed by the service
use log::{debug, warn};
use std::fmt;

use crate::bluetooth::BleBackend;
use crate::meter::{MeterHandle, SensorData};

/// Display metadata for one reading name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorSpecifics {
    pub unit: Option<&'static str>,
    pub device_class: Option<&'static str>,
    pub icon: Option<&'static str>,
    pub state_class: Option<&'static str>,
}

const ENERGY: SensorSpecifics = SensorSpecifics {
    unit: Some("kWh"),
    device_class: Some("energy"),
    icon: None,
    state_class: Some("measurement"),
};

const TARIFF: SensorSpecifics = SensorSpecifics {
    unit: None,
    device_class: None,
    icon: None,
    state_class: Some("measurement"),
};

const GAS: SensorSpecifics = SensorSpecifics {
    unit: Some("m³"),
    device_class: Some("gas"),
    icon: None,
    state_class: Some("measurement"),
};

/// Metadata for a reading name, `None` for names this service does not expose
pub fn sensor_specifics(name: &str) -> Option<SensorSpecifics> {
    match name {
        "power_consumption_tariff1"
        | "power_consumption_tariff2"
        | "power_delivery_tariff1"
        | "power_delivery_tariff2" => Some(ENERGY),
        "current_tariff" => Some(TARIFF),
        "gas_consumption" => Some(GAS),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EntityState {
    Unknown,
    Value(f64),
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityState::Unknown => write!(f, "unknown"),
            EntityState::Value(v) => write!(f, "{}", v),
        }
    }
}

/// One reading of one meter
pub struct MeterEntity<B: BleBackend> {
    handle: MeterHandle<B>,
    address: String,
    field: &'static str,
    pub specifics: SensorSpecifics,
    state: EntityState,
}

impl<B: BleBackend> Clone for MeterEntity<B> {
    fn clone(&self) -> Self {
        MeterEntity {
            handle: self.handle.clone(),
            address: self.address.clone(),
            field: self.field,
            specifics: self.specifics,
            state: self.state,
        }
    }
}

impl<B: BleBackend> MeterEntity<B> {
    pub fn new(
        handle: MeterHandle<B>,
        address: &str,
        field: &'static str,
        specifics: SensorSpecifics,
    ) -> Self {
        let entity = MeterEntity {
            handle,
            address: address.to_string(),
            field,
            specifics,
            state: EntityState::Unknown,
        };
        debug!(
            "Added sensor entity {} (class {:?}, state class {:?}, icon {:?})",
            entity.name(),
            specifics.device_class,
            specifics.state_class,
            specifics.icon
        );
        entity
    }

    /// `<ADDRESS>-<reading>`, also used as the unique id
    pub fn name(&self) -> String {
        format!("{}-{}", self.address.to_uppercase(), self.field)
    }

    pub fn state(&self) -> EntityState {
        self.state
    }

    /// Fetch the (possibly cached) readings and take this entity's value
    pub async fn update(&mut self) -> EntityState {
        let data = self.handle.get_sensor_data().await;
        self.state = state_from(&data, &self.address, self.field);
        self.state
    }
}

fn state_from(data: &SensorData, address: &str, field: &str) -> EntityState {
    match data.get(address).and_then(|reading| reading.get(field)) {
        Some(Some(value)) => EntityState::Value(value),
        _ => EntityState::Unknown,
    }
}

/// Create an entity for every reading present in `data`
pub fn entities_from<B: BleBackend>(
    handle: &MeterHandle<B>,
    data: &SensorData,
) -> Vec<MeterEntity<B>> {
    let mut entities = Vec::new();
    for (address, reading) in data {
        for (field, value) in reading.iter() {
            let Some(specifics) = sensor_specifics(field) else {
                warn!("{}: no metadata for reading {}", address, field);
                continue;
            };
            let mut entity = MeterEntity::new(handle.clone(), address, field, specifics);
            entity.state = match value {
                Some(v) => EntityState::Value(v),
                None => EntityState::Unknown,
            };
            entities.push(entity);
        }
    }
    entities
}
