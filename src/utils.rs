/// Utility functions for formatting log output
use time::{format_description, OffsetDateTime};

use crate::entity::{EntityState, SensorSpecifics};
use crate::meter::SensorData;

/// Format a timestamp for human-readable logging
///
/// Converts an OffsetDateTime to DD.MM.YYYY - HH:MM:SS format
/// Falls back to default string representation if formatting fails.
pub fn format_datetime(dt: &OffsetDateTime) -> String {
    match format_description::parse("[day].[month].[year] - [hour]:[minute]:[second]") {
        Ok(format) => dt.format(&format).unwrap_or_else(|_| dt.to_string()),
        Err(_) => dt.to_string(),
    }
}

/// Render an entity state with its unit, e.g. "12.345 kWh"
pub fn format_state(state: EntityState, specifics: &SensorSpecifics) -> String {
    match (state, specifics.unit) {
        (EntityState::Value(v), Some(unit)) => format!("{} {}", v, unit),
        (state, _) => state.to_string(),
    }
}

/// Count fields across all devices that currently hold a value
pub fn count_values(data: &SensorData) -> usize {
    data.values()
        .map(|reading| reading.iter().filter(|(_, v)| v.is_some()).count())
        .sum()
}
