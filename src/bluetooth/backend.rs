/// BlueZ implementation of the BLE backend
use async_trait::async_trait;
use bluer::{Adapter, AdapterEvent, Address, Device};
use futures_util::{pin_mut, StreamExt};
use log::{debug, info, warn};
use std::collections::HashSet;
use tokio::time::{sleep, timeout, Duration};

use super::BleBackend;
use crate::error::BleError;
use crate::models::{Advertisement, CharacteristicHandle, DiscoveredCharacteristic};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const SERVICES_RESOLVED_TIMEOUT: Duration = Duration::from_secs(5);
const READ_TIMEOUT: Duration = Duration::from_secs(5);
const SERVICES_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct BluerBackend {
    _session: bluer::Session,
    adapter: Adapter,
}

impl BluerBackend {
    /// Open a BlueZ session on the default adapter and prepare it for LE scanning
    pub async fn new() -> Result<Self, BleError> {
        let session = bluer::Session::new().await?;
        let adapter = session.default_adapter().await?;

        // Ensure Bluetooth adapter is powered on
        adapter.set_powered(true).await?;
        info!("Using Bluetooth adapter {}", adapter.name());

        let filter = bluer::DiscoveryFilter {
            transport: bluer::DiscoveryTransport::Le,
            duplicate_data: false,
            ..Default::default()
        };
        if let Err(e) = adapter.set_discovery_filter(filter).await {
            warn!("Failed to set discovery filter: {}", e);
        }

        Ok(BluerBackend {
            _session: session,
            adapter,
        })
    }

    fn device(&self, address: &str) -> Result<Device, BleError> {
        let address: Address = address
            .parse()
            .map_err(|_| BleError::InvalidAddress(address.to_string()))?;
        Ok(self.adapter.device(address)?)
    }

    async fn wait_services_resolved(device: &Device) -> Result<(), BleError> {
        loop {
            if device.is_services_resolved().await? {
                return Ok(());
            }
            sleep(SERVICES_POLL_INTERVAL).await;
        }
    }
}

/// Report a GATT failure as a disconnect when the link is gone
async fn classify(device: &Device, error: bluer::Error) -> BleError {
    match device.is_connected().await {
        Ok(true) => BleError::Bluetooth(error),
        _ => BleError::Disconnected,
    }
}

#[async_trait]
impl BleBackend for BluerBackend {
    type Connection = Device;

    async fn scan(&mut self, duration: Duration) -> Result<Vec<Advertisement>, BleError> {
        // Discovery stops when the event stream is dropped
        let seen = {
            let events = self.adapter.discover_devices().await?;
            pin_mut!(events);

            let deadline = sleep(duration);
            tokio::pin!(deadline);

            let mut seen = HashSet::new();
            loop {
                tokio::select! {
                    _ = &mut deadline => break,
                    event = events.next() => match event {
                        Some(AdapterEvent::DeviceAdded(address)) => {
                            seen.insert(address);
                        }
                        Some(_) => {}
                        None => break,
                    },
                }
            }
            seen
        };

        let mut advertisements = Vec::with_capacity(seen.len());
        for address in seen {
            let device = match self.adapter.device(address) {
                Ok(device) => device,
                Err(_) => continue,
            };
            let local_name = match device.name().await {
                Ok(name) => name,
                Err(e) => {
                    debug!("Failed to get name for {}: {}", address, e);
                    None
                }
            };
            advertisements.push(Advertisement {
                address: address.to_string(),
                local_name,
            });
        }

        Ok(advertisements)
    }

    async fn connect(&mut self, address: &str) -> Result<Device, BleError> {
        let device = self.device(address)?;

        timeout(CONNECT_TIMEOUT, device.connect())
            .await
            .map_err(|_| BleError::Timeout)??;

        let resolved = timeout(
            SERVICES_RESOLVED_TIMEOUT,
            Self::wait_services_resolved(&device),
        )
        .await
        .map_err(|_| BleError::Timeout)
        .and_then(|r| r);

        if let Err(e) = resolved {
            if let Err(e) = device.disconnect().await {
                debug!("Failed to disconnect {} after setup error: {}", address, e);
            }
            return Err(e);
        }

        Ok(device)
    }

    async fn disconnect(&mut self, device: Device) -> Result<(), BleError> {
        device.disconnect().await?;
        Ok(())
    }

    async fn characteristics(
        &mut self,
        device: &Device,
    ) -> Result<Vec<DiscoveredCharacteristic>, BleError> {
        let enumerate = async {
            let mut found = Vec::new();
            for service in device.services().await? {
                for characteristic in service.characteristics().await? {
                    found.push(DiscoveredCharacteristic {
                        uuid: characteristic.uuid().await?,
                        handle: CharacteristicHandle {
                            service: service.id(),
                            characteristic: characteristic.id(),
                        },
                    });
                }
            }
            Ok::<_, bluer::Error>(found)
        };

        match enumerate.await {
            Ok(found) => Ok(found),
            Err(e) => Err(classify(device, e).await),
        }
    }

    async fn read(
        &mut self,
        device: &Device,
        handle: CharacteristicHandle,
    ) -> Result<Vec<u8>, BleError> {
        let read = async {
            let service = device.service(handle.service).await?;
            let characteristic = service.characteristic(handle.characteristic).await?;
            characteristic.read().await
        };

        match timeout(READ_TIMEOUT, read).await {
            Err(_) => Err(BleError::Timeout),
            Ok(Ok(data)) => Ok(data),
            Ok(Err(e)) => Err(classify(device, e).await),
        }
    }
}
