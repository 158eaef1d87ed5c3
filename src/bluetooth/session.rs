/// Ownership of the single active BLE connection
use log::{debug, warn};
use tokio::time::Duration;

use super::{BleBackend, ReadOutcome};
use crate::error::{BleError, ConnectFailure};
use crate::models::{Advertisement, CharacteristicHandle, DiscoveredCharacteristic};

struct ActiveSession<C> {
    address: String,
    connection: C,
}

/// Holds the backend and at most one open connection at a time
pub struct SessionManager<B: BleBackend> {
    backend: B,
    active: Option<ActiveSession<B::Connection>>,
}

impl<B: BleBackend> SessionManager<B> {
    pub fn new(backend: B) -> Self {
        SessionManager {
            backend,
            active: None,
        }
    }

    /// Connect to `address`, trying up to `max_retries` times (at least once).
    ///
    /// Any existing session is closed first. There is no delay between
    /// attempts. On failure no session is left open.
    pub async fn connect(&mut self, address: &str, max_retries: u32) -> Result<(), ConnectFailure> {
        self.disconnect().await;

        let attempts = max_retries.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.backend.connect(address).await {
                Ok(connection) => {
                    debug!("Connected to {} (attempt {})", address, attempt);
                    self.active = Some(ActiveSession {
                        address: address.to_string(),
                        connection,
                    });
                    return Ok(());
                }
                Err(e) if attempt < attempts => {
                    debug!(
                        "Connect attempt {}/{} to {} failed: {}",
                        attempt, attempts, address, e
                    );
                    debug!("Retrying {}", address);
                }
                Err(e) => {
                    return Err(ConnectFailure {
                        address: address.to_string(),
                        attempts,
                        last_error: e,
                    });
                }
            }
        }
    }

    /// Close the active session, if any
    pub async fn disconnect(&mut self) {
        if let Some(active) = self.active.take() {
            if let Err(e) = self.backend.disconnect(active.connection).await {
                warn!("Failed to disconnect {}: {}", active.address, e);
            }
        }
    }

    /// Forget a session whose link already dropped, without talking to the device
    pub fn drop_lost(&mut self) {
        if let Some(active) = self.active.take() {
            debug!("Dropping lost session to {}", active.address);
        }
    }

    #[cfg(test)]
    pub fn is_connected(&self) -> bool {
        self.active.is_some()
    }

    #[cfg(test)]
    pub fn active_address(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.address.as_str())
    }

    pub async fn scan(&mut self, duration: Duration) -> Result<Vec<Advertisement>, BleError> {
        self.backend.scan(duration).await
    }

    pub async fn characteristics(&mut self) -> Result<Vec<DiscoveredCharacteristic>, BleError> {
        let active = self.active.as_ref().ok_or(BleError::NotConnected)?;
        self.backend.characteristics(&active.connection).await
    }

    pub async fn read(&mut self, handle: CharacteristicHandle) -> ReadOutcome {
        let active = match self.active.as_ref() {
            Some(active) => active,
            None => return ReadOutcome::Disconnected,
        };
        self.backend.read(&active.connection, handle).await.into()
    }

    #[cfg(test)]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[cfg(test)]
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}
