mod bluetooth;
mod config;
mod entity;
mod error;
mod meter;
mod models;
mod registry;
mod utils;

use log::{debug, error, info, warn};
use time::OffsetDateTime;
use tokio::time::{sleep, Duration};

use bluetooth::BluerBackend;
use config::MeterConfig;
use entity::{entities_from, MeterEntity};
use meter::{MeterHandle, SmartMeterReader};
use utils::{count_values, format_datetime, format_state};

const POLL_INTERVAL_SECS: u64 = 30;

/// Discover meters, build their sensor catalog and create one entity per reading
async fn setup(
    config: &MeterConfig,
) -> Result<Option<(MeterHandle<BluerBackend>, Vec<MeterEntity<BluerBackend>>)>, Box<dyn std::error::Error>>
{
    let backend = BluerBackend::new().await?;

    let mut reader = match &config.mac {
        Some(mac) => {
            info!("Using configured smart meter {}", mac);
            SmartMeterReader::with_address(
                backend,
                mac,
                config.scan_interval,
                config.connect_retries,
            )
        }
        None => {
            debug!("Searching for smart meters...");
            let mut reader =
                SmartMeterReader::new(backend, config.scan_interval, config.connect_retries);
            let found = reader
                .find_devices(config.discovery_rounds, config.discovery_timeout)
                .await;
            info!("Found {} smart meter(s)", found);
            if found == 0 {
                warn!("No smart meters found.");
                return Ok(None);
            }
            reader
        }
    };

    for (mac, device) in reader.get_info() {
        info!("{}: {}", mac, device);
    }

    debug!("Getting sensors");
    for sensors in reader.get_sensors().await.values() {
        for sensor in sensors {
            debug!(
                "{}: Found sensor UUID: {} Handle: {}",
                sensor.device_address, sensor.characteristic_id, sensor.handle
            );
        }
    }

    // Entities are only created for readings available at startup
    debug!("Getting initial sensor data");
    let initial = reader.get_sensor_data().await.clone();
    let handle = MeterHandle::new(reader);
    let entities = entities_from(&handle, &initial);
    for entity in &entities {
        info!(
            "{}: {}",
            entity.name(),
            format_state(entity.state(), &entity.specifics)
        );
    }

    Ok(Some((handle, entities)))
}

async fn main_loop(config: MeterConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting smart meter service");

    let (handle, mut entities) = match setup(&config).await? {
        Some(setup) => setup,
        None => return Ok(()),
    };

    if entities.is_empty() {
        warn!("No readings available yet; no sensor entities created");
    }
    info!("Tracking {} sensor entities", entities.len());

    loop {
        sleep(Duration::from_secs(POLL_INTERVAL_SECS)).await;
        debug!(
            "Updating entities at: {}",
            format_datetime(&OffsetDateTime::now_utc())
        );

        // Entities update independently; the reader serialises BLE access
        let mut tasks = Vec::with_capacity(entities.len());
        for mut entity in entities.drain(..) {
            let fallback = entity.clone();
            let task = tokio::spawn(async move {
                entity.update().await;
                entity
            });
            tasks.push((fallback, task));
        }

        for (fallback, task) in tasks {
            match task.await {
                Ok(entity) => {
                    debug!(
                        "State {} {}",
                        entity.name(),
                        format_state(entity.state(), &entity.specifics)
                    );
                    entities.push(entity);
                }
                Err(e) => {
                    error!("Entity update failed for {}: {}", fallback.name(), e);
                    entities.push(fallback);
                }
            }
        }

        let data = handle.get_sensor_data().await;
        debug!(
            "{} meter(s), {} reading(s) with a value",
            handle.get_info().await.len(),
            count_values(&data)
        );
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_timestamp_secs()
        .init();

    // Load configuration
    let config = match MeterConfig::new() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e);
        }
    };

    // Handle Ctrl+C gracefully
    let (tx, mut rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        let _ = tx.send(());
    });

    // Run main loop or wait for shutdown signal
    tokio::select! {
        result = main_loop(config) => {
            match result {
                Ok(_) => info!("Program completed successfully"),
                Err(e) => error!("Fatal error: {}", e),
            }
        }
        _ = &mut rx => {
            info!("Program terminated by user. Exiting gracefully.");
        }
    }

    Ok(())
}
