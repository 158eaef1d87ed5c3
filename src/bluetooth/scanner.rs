/// Advertisement scanning for smart meters
use log::{debug, info, warn};
use tokio::time::Duration;

use super::{BleBackend, SessionManager};
use crate::models::DeviceInfo;
use crate::registry::DeviceRegistry;

/// Complete local name every meter advertises
pub const SMART_METER_NAME: &str = "SmartMeter";

pub const DEFAULT_SCAN_ROUNDS: u32 = 50;
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_millis(100);

/// Scan for smart meters and add new ones to the registry
///
/// Meters advertise intermittently, so the scan is split into `rounds`
/// short windows of `per_round` each. A failed round is logged and the
/// next one is attempted.
///
/// # Arguments
/// * `session` - Session manager owning the BLE backend
/// * `registry` - Registry receiving newly found meters
/// * `rounds` - Number of scan windows
/// * `per_round` - Length of each window
///
/// # Returns
/// Total number of known meters after scanning, including ones known before
pub async fn find_devices<B: BleBackend>(
    session: &mut SessionManager<B>,
    registry: &mut DeviceRegistry,
    rounds: u32,
    per_round: Duration,
) -> usize {
    for round in 0..rounds {
        let advertisements = match session.scan(per_round).await {
            Ok(advertisements) => advertisements,
            Err(e) => {
                warn!("Scan round {} failed: {}", round + 1, e);
                continue;
            }
        };

        for adv in advertisements {
            if adv.local_name.as_deref() != Some(SMART_METER_NAME) {
                continue;
            }
            if registry.contains(&adv.address) {
                continue;
            }
            registry.insert(DeviceInfo::new(&adv.address, SMART_METER_NAME));
            info!("Found smart meter {}", adv.address.to_uppercase());
        }
    }

    debug!("Found {} smart meter(s)", registry.len());
    registry.len()
}
