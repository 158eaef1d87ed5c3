pub mod backend;
pub mod decoders;
#[cfg(test)]
pub mod mock;
pub mod scanner;
pub mod session;

use async_trait::async_trait;
use tokio::time::Duration;

use crate::error::BleError;
use crate::models::{Advertisement, CharacteristicHandle, DiscoveredCharacteristic};

pub use backend::BluerBackend;
pub use session::SessionManager;

/// Low-level BLE operations the poller needs from an adapter
#[async_trait]
pub trait BleBackend: Send {
    /// An open connection to one peripheral
    type Connection: Send + Sync;

    /// Listen for advertisements for `duration` and report every device seen
    async fn scan(&mut self, duration: Duration) -> Result<Vec<Advertisement>, BleError>;

    async fn connect(&mut self, address: &str) -> Result<Self::Connection, BleError>;

    async fn disconnect(&mut self, connection: Self::Connection) -> Result<(), BleError>;

    /// List every characteristic of every GATT service on the device
    async fn characteristics(
        &mut self,
        connection: &Self::Connection,
    ) -> Result<Vec<DiscoveredCharacteristic>, BleError>;

    async fn read(
        &mut self,
        connection: &Self::Connection,
        handle: CharacteristicHandle,
    ) -> Result<Vec<u8>, BleError>;
}

/// Result of reading one characteristic
#[derive(Debug)]
pub enum ReadOutcome {
    Value(Vec<u8>),
    /// The link is gone; the session cannot be disconnected any more
    Disconnected,
    Timeout,
    /// The stack rejected the read while the link stayed up
    Failed(BleError),
}

impl From<Result<Vec<u8>, BleError>> for ReadOutcome {
    fn from(result: Result<Vec<u8>, BleError>) -> Self {
        match result {
            Ok(data) => ReadOutcome::Value(data),
            Err(BleError::Timeout) => ReadOutcome::Timeout,
            Err(BleError::Disconnected | BleError::NotConnected) => ReadOutcome::Disconnected,
            Err(e) => ReadOutcome::Failed(e),
        }
    }
}
