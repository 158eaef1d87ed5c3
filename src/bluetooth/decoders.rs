/// Smart meter GATT characteristics and their payload decoders
use bluer::Uuid;

use crate::error::DecodeError;
use crate::models::Reading;

// Vendor characteristic UUIDs (power service af88xxxx, gas service 4bf7xxxx)
pub const POWER_CONSUMPTION: Uuid = Uuid::from_u128(0xaf880001_558d_47ca_bd46_cb3b6e84b8ac);
pub const POWER_TARIFF: Uuid = Uuid::from_u128(0xaf880002_558d_47ca_bd46_cb3b6e84b8ac);
pub const GAS_CONSUMPTION: Uuid = Uuid::from_u128(0x4bf70001_e031_4a4f_a0bd_64459a589768);

/// Raw value the meter sends when a counter has no reading
const NO_VALUE: i32 = -1;
/// Counters are transmitted in Wh and dm³
const SCALE_DIVISOR: f64 = 1000.0;

pub type Decoder = fn(&[u8]) -> Result<Reading, DecodeError>;

/// Static description of a supported characteristic
#[derive(Debug)]
pub struct CharacteristicDescriptor {
    pub id: Uuid,
    pub name: &'static str,
    pub decode: Decoder,
}

pub static CHARACTERISTICS: [CharacteristicDescriptor; 3] = [
    CharacteristicDescriptor {
        id: POWER_CONSUMPTION,
        name: "power-consumption",
        decode: decode_power_consumption,
    },
    CharacteristicDescriptor {
        id: POWER_TARIFF,
        name: "power-tariff",
        decode: decode_power_tariff,
    },
    CharacteristicDescriptor {
        id: GAS_CONSUMPTION,
        name: "gas-consumption",
        decode: decode_gas_consumption,
    },
];

/// Find the descriptor for a characteristic UUID
pub fn lookup(id: &Uuid) -> Option<&'static CharacteristicDescriptor> {
    CHARACTERISTICS.iter().find(|c| c.id == *id)
}

fn checked_scale(raw: i32) -> Option<f64> {
    if raw == NO_VALUE {
        return None;
    }
    Some(raw as f64 / SCALE_DIVISOR)
}

fn expect_len(
    characteristic: &'static str,
    data: &[u8],
    expected: usize,
) -> Result<(), DecodeError> {
    if data.len() != expected {
        return Err(DecodeError::Length {
            characteristic,
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

fn i32_le(data: &[u8], index: usize) -> i32 {
    let offset = index * 4;
    i32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

/// Decode the power consumption characteristic
///
/// 16-byte payload of four little-endian signed 32-bit counters in Wh:
/// - Bytes 0-3: Consumption, tariff 1
/// - Bytes 4-7: Consumption, tariff 2
/// - Bytes 8-11: Delivery, tariff 1
/// - Bytes 12-15: Delivery, tariff 2
///
/// Values are converted to kWh; a raw -1 becomes an absent value.
pub fn decode_power_consumption(data: &[u8]) -> Result<Reading, DecodeError> {
    expect_len("power-consumption", data, 16)?;

    let mut reading = Reading::new();
    reading.insert("power_consumption_tariff1", checked_scale(i32_le(data, 0)));
    reading.insert("power_consumption_tariff2", checked_scale(i32_le(data, 1)));
    reading.insert("power_delivery_tariff1", checked_scale(i32_le(data, 2)));
    reading.insert("power_delivery_tariff2", checked_scale(i32_le(data, 3)));
    Ok(reading)
}

/// Decode the active tariff: a single unsigned byte (1 or 2), unscaled
pub fn decode_power_tariff(data: &[u8]) -> Result<Reading, DecodeError> {
    expect_len("power-tariff", data, 1)?;

    let mut reading = Reading::new();
    reading.insert("current_tariff", Some(data[0] as f64));
    Ok(reading)
}

/// Decode the gas counter: one little-endian signed 32-bit value in dm³, reported in m³
pub fn decode_gas_consumption(data: &[u8]) -> Result<Reading, DecodeError> {
    expect_len("gas-consumption", data, 4)?;

    let mut reading = Reading::new();
    reading.insert("gas_consumption", checked_scale(i32_le(data, 0)));
    Ok(reading)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counters(values: [i32; 4]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn test_power_consumption_sentinel() {
        let reading = decode_power_consumption(&counters([-1, 0, 0, 0])).unwrap();
        assert_eq!(reading.get("power_consumption_tariff1"), Some(None));
        assert_eq!(reading.get("power_consumption_tariff2"), Some(Some(0.0)));
        assert_eq!(reading.get("power_delivery_tariff1"), Some(Some(0.0)));
        assert_eq!(reading.get("power_delivery_tariff2"), Some(Some(0.0)));
    }

    #[test]
    fn test_power_consumption_scaling() {
        let reading = decode_power_consumption(&counters([12345, 2_000_000, 1, -2])).unwrap();
        assert_eq!(reading.get("power_consumption_tariff1"), Some(Some(12.345)));
        assert_eq!(reading.get("power_consumption_tariff2"), Some(Some(2000.0)));
        assert_eq!(reading.get("power_delivery_tariff1"), Some(Some(0.001)));
        // Only exactly -1 is the sentinel
        assert_eq!(reading.get("power_delivery_tariff2"), Some(Some(-0.002)));
    }

    #[test]
    fn test_power_tariff() {
        let reading = decode_power_tariff(&[0x01]).unwrap();
        assert_eq!(reading.get("current_tariff"), Some(Some(1.0)));
        assert_eq!(reading.len(), 1);

        let reading = decode_power_tariff(&[0x02]).unwrap();
        assert_eq!(reading.get("current_tariff"), Some(Some(2.0)));
    }

    #[test]
    fn test_gas_consumption() {
        let reading = decode_gas_consumption(&12345i32.to_le_bytes()).unwrap();
        assert_eq!(reading.get("gas_consumption"), Some(Some(12.345)));

        let reading = decode_gas_consumption(&(-1i32).to_le_bytes()).unwrap();
        assert_eq!(reading.get("gas_consumption"), Some(None));
    }

    #[test]
    fn test_malformed_payloads() {
        assert_eq!(
            decode_power_consumption(&[0u8; 12]),
            Err(DecodeError::Length {
                characteristic: "power-consumption",
                expected: 16,
                actual: 12,
            })
        );
        assert!(decode_power_tariff(&[]).is_err());
        assert!(decode_power_tariff(&[1, 2]).is_err());
        assert!(decode_gas_consumption(&[0u8; 5]).is_err());
    }

    #[test]
    fn test_registry_lookup() {
        assert_eq!(
            POWER_CONSUMPTION.to_string(),
            "af880001-558d-47ca-bd46-cb3b6e84b8ac"
        );
        assert_eq!(lookup(&POWER_TARIFF).map(|c| c.name), Some("power-tariff"));
        assert_eq!(lookup(&GAS_CONSUMPTION).map(|c| c.name), Some("gas-consumption"));

        // Power (af880003) is advertised by the meter but not decoded
        let power = Uuid::from_u128(0xaf880003_558d_47ca_bd46_cb3b6e84b8ac);
        assert!(lookup(&power).is_none());

        let gas = lookup(&GAS_CONSUMPTION).unwrap();
        let reading = (gas.decode)(&500i32.to_le_bytes()).unwrap();
        assert_eq!(reading.get("gas_consumption"), Some(Some(0.5)));
    }
}
