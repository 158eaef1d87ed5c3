/// Error types shared by the BLE layer, the decoders and the poller
use thiserror::Error;

/// Failure of a single low-level BLE operation
#[derive(Error, Debug)]
pub enum BleError {
    #[error("bluetooth error: {0}")]
    Bluetooth(#[from] bluer::Error),

    #[error("device disconnected during operation")]
    Disconnected,

    #[error("operation timed out")]
    Timeout,

    #[error("no active connection")]
    NotConnected,

    #[error("invalid device address: {0}")]
    InvalidAddress(String),
}

/// Every connect attempt for a device failed
#[derive(Error, Debug)]
#[error("could not connect to {address} after {attempts} attempt(s): {last_error}")]
pub struct ConnectFailure {
    pub address: String,
    pub attempts: u32,
    pub last_error: BleError,
}

/// A characteristic payload that does not match its fixed layout
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("{characteristic}: expected {expected} byte(s), got {actual}")]
    Length {
        characteristic: &'static str,
        expected: usize,
        actual: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DecodeError::Length {
            characteristic: "power-tariff",
            expected: 1,
            actual: 3,
        };
        assert_eq!(err.to_string(), "power-tariff: expected 1 byte(s), got 3");

        let err = ConnectFailure {
            address: "AA:BB:CC:DD:EE:FF".to_string(),
            attempts: 5,
            last_error: BleError::Timeout,
        };
        assert_eq!(
            err.to_string(),
            "could not connect to AA:BB:CC:DD:EE:FF after 5 attempt(s): operation timed out"
        );
    }
}
