use std::env;
use std::fmt::Display;
use std::str::FromStr;
use tokio::time::Duration;

use crate::bluetooth::scanner::{DEFAULT_SCAN_ROUNDS, DEFAULT_SCAN_TIMEOUT};
use crate::meter::{DEFAULT_CONNECT_RETRIES, DEFAULT_SCAN_INTERVAL};

#[derive(Debug, Clone)]
pub struct MeterConfig {
    /// Pre-configured meter address; `None` means discover
    pub mac: Option<String>,
    pub scan_interval: Duration,
    pub discovery_rounds: u32,
    pub discovery_timeout: Duration,
    pub connect_retries: u32,
}

impl MeterConfig {
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        // Load environment variables
        dotenv::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key/value source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Box<dyn std::error::Error>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mac = match lookup("SMARTMETER_MAC") {
            Some(mac) if !mac.trim().is_empty() => {
                let mac = mac.trim().to_string();
                if !is_valid_mac(&mac) {
                    return Err(format!("SMARTMETER_MAC is not a valid BLE address: '{}'", mac).into());
                }
                Some(mac)
            }
            _ => None,
        };

        let scan_interval = Duration::from_secs(parse_var(
            &lookup,
            "SCAN_INTERVAL_SECS",
            DEFAULT_SCAN_INTERVAL.as_secs(),
        )?);
        let discovery_rounds = parse_var(&lookup, "DISCOVERY_ROUNDS", DEFAULT_SCAN_ROUNDS)?;
        let discovery_timeout = Duration::from_millis(parse_var(
            &lookup,
            "DISCOVERY_TIMEOUT_MS",
            DEFAULT_SCAN_TIMEOUT.as_millis() as u64,
        )?);
        let connect_retries = parse_var(&lookup, "CONNECT_RETRIES", DEFAULT_CONNECT_RETRIES)?;

        Ok(MeterConfig {
            mac,
            scan_interval,
            discovery_rounds,
            discovery_timeout,
            connect_retries,
        })
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T, Box<dyn std::error::Error>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map_err(|e| {
                Box::<dyn std::error::Error>::from(format!(
                    "Invalid value for {}: '{}' ({})",
                    key, value, e
                ))
            }),
        _ => Ok(default),
    }
}

/// Six colon-separated hex octets
fn is_valid_mac(mac: &str) -> bool {
    let octets: Vec<&str> = mac.split(':').collect();
    octets.len() == 6
        && octets
            .iter()
            .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()))
}
