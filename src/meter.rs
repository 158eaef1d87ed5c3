/// Discovery, sensor catalog and throttled reading cache for smart meters
use log::{debug, error, info, warn};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

use crate::bluetooth::decoders;
use crate::bluetooth::scanner::{self, SMART_METER_NAME};
use crate::bluetooth::{BleBackend, ReadOutcome, SessionManager};
use crate::error::BleError;
use crate::models::{DeviceInfo, KnownCharacteristic, Reading};
use crate::registry::DeviceRegistry;

pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(300);
pub const DEFAULT_CONNECT_RETRIES: u32 = 5;

/// Latest merged reading per device address
pub type SensorData = BTreeMap<String, Reading>;

/// Owns the BLE session, the known devices and their characteristics, and
/// the reading cache. All BLE traffic goes through this one object.
pub struct SmartMeterReader<B: BleBackend> {
    session: SessionManager<B>,
    devices: DeviceRegistry,
    sensors: BTreeMap<String, Vec<KnownCharacteristic>>,
    cache: SensorData,
    last_refresh: Option<Instant>,
    scan_interval: Duration,
    connect_retries: u32,
}

impl<B: BleBackend> SmartMeterReader<B> {
    /// Reader that finds its meters through `find_devices`
    pub fn new(backend: B, scan_interval: Duration, connect_retries: u32) -> Self {
        SmartMeterReader {
            session: SessionManager::new(backend),
            devices: DeviceRegistry::new(),
            sensors: BTreeMap::new(),
            cache: SensorData::new(),
            last_refresh: None,
            scan_interval,
            connect_retries,
        }
    }

    /// Reader bound to one pre-configured meter; discovery is not needed
    pub fn with_address(
        backend: B,
        address: &str,
        scan_interval: Duration,
        connect_retries: u32,
    ) -> Self {
        let mut reader = Self::new(backend, scan_interval, connect_retries);
        reader
            .devices
            .insert(DeviceInfo::new(address, SMART_METER_NAME));
        reader
    }

    pub async fn find_devices(&mut self, rounds: u32, per_round: Duration) -> usize {
        scanner::find_devices(&mut self.session, &mut self.devices, rounds, per_round).await
    }

    pub fn get_info(&self) -> &BTreeMap<String, DeviceInfo> {
        self.devices.infos()
    }

    /// Connect to every known meter and record which supported
    /// characteristics it exposes. Values are not read.
    ///
    /// A meter that cannot be reached, or fails during enumeration, is
    /// left out of the result.
    pub async fn get_sensors(&mut self) -> &BTreeMap<String, Vec<KnownCharacteristic>> {
        let mut sensors = BTreeMap::new();

        for address in self.devices.addresses() {
            if let Err(failure) = self.session.connect(&address, self.connect_retries).await {
                warn!("{}", failure);
                continue;
            }

            match self.session.characteristics().await {
                Ok(found) => {
                    let known: Vec<KnownCharacteristic> = found
                        .into_iter()
                        .inspect(|c| debug!("{}: characteristic {} at {}", address, c.uuid, c.handle))
                        .filter(|c| decoders::lookup(&c.uuid).is_some())
                        .map(|c| KnownCharacteristic {
                            device_address: address.clone(),
                            characteristic_id: c.uuid,
                            handle: c.handle,
                        })
                        .collect();
                    info!("{}: {} supported characteristic(s)", address, known.len());
                    sensors.insert(address.clone(), known);
                }
                Err(BleError::Disconnected) => {
                    error!("{}: disconnected while listing characteristics", address);
                    self.session.drop_lost();
                }
                Err(e) => error!("{}: failed to list characteristics: {}", address, e),
            }

            self.session.disconnect().await;
        }

        self.sensors = sensors;
        &self.sensors
    }

    /// Current readings for every meter, refreshed at most once per scan interval
    ///
    /// Within the interval the cache is returned without any BLE traffic.
    /// Otherwise every meter from the sensor catalog is connected, read
    /// and disconnected in turn. A meter that fails keeps its previous
    /// reading; a meter never read successfully has no entry.
    pub async fn get_sensor_data(&mut self) -> &SensorData {
        let now = Instant::now();
        if let Some(last) = self.last_refresh {
            if now.duration_since(last) < self.scan_interval {
                return &self.cache;
            }
        }
        // Stamp before any I/O so a slow pass does not trigger another
        self.last_refresh = Some(now);

        let sensors = self.sensors.clone();
        debug!("Refreshing {} smart meter(s)", sensors.len());
        for (address, characteristics) in &sensors {
            self.refresh_device(address, characteristics).await;
        }

        &self.cache
    }

    async fn refresh_device(&mut self, address: &str, characteristics: &[KnownCharacteristic]) {
        if let Err(failure) = self.session.connect(address, self.connect_retries).await {
            warn!("{}; keeping previous reading", failure);
            return;
        }

        for characteristic in characteristics {
            let id = characteristic.characteristic_id;
            let Some(descriptor) = decoders::lookup(&id) else {
                continue;
            };

            match self.session.read(characteristic.handle).await {
                ReadOutcome::Value(data) => match (descriptor.decode)(&data) {
                    Ok(reading) => {
                        debug!("{} Got sensordata {:?}", address, reading);
                        self.cache
                            .entry(address.to_string())
                            .or_default()
                            .merge(reading);
                    }
                    Err(e) => error!("{}: failed to decode {}: {}", address, descriptor.name, e),
                },
                ReadOutcome::Disconnected => {
                    error!("{}: disconnected while reading {}", address, id);
                    self.session.drop_lost();
                    break;
                }
                ReadOutcome::Timeout => {
                    error!("{}: read of {} timed out", address, id);
                    break;
                }
                ReadOutcome::Failed(e) => {
                    error!("{}: read of {} failed: {}", address, id, e);
                    break;
                }
            }
        }

        self.session.disconnect().await;

        if let Some(reading) = self.cache.get(address) {
            debug!("{}: {} field(s) cached", address, reading.len());
        }
    }

    #[cfg(test)]
    pub fn backend(&self) -> &B {
        self.session.backend()
    }

    #[cfg(test)]
    pub fn backend_mut(&mut self) -> &mut B {
        self.session.backend_mut()
    }
}

/// Cloneable handle for callers that share one reader.
///
/// Callers are serialised on the lock: a caller that arrives during a
/// refresh waits for it and then gets the fresh cache.
pub struct MeterHandle<B: BleBackend> {
    inner: Arc<Mutex<SmartMeterReader<B>>>,
}

impl<B: BleBackend> Clone for MeterHandle<B> {
    fn clone(&self) -> Self {
        MeterHandle {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: BleBackend> MeterHandle<B> {
    pub fn new(reader: SmartMeterReader<B>) -> Self {
        MeterHandle {
            inner: Arc::new(Mutex::new(reader)),
        }
    }

    pub async fn get_sensor_data(&self) -> SensorData {
        let mut reader = self.inner.lock().await;
        reader.get_sensor_data().await.clone()
    }

    pub async fn get_info(&self) -> BTreeMap<String, DeviceInfo> {
        self.inner.lock().await.get_info().clone()
    }

    #[cfg(test)]
    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, SmartMeterReader<B>> {
        self.inner.lock().await
    }
}
