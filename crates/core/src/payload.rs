//! Block height extraction from relay and altruist responses.
//!
//! Any payload that is not a JSON object, lacks the result key, or carries a
//! value that is not a non-negative integer yields the sentinel height 0.

use serde_json::Value;
use synccheck_common::types::SENTINEL_HEIGHT;

/// Parse a raw relay payload and read the height under `result_key`
pub fn parse_block_height(payload: &str, result_key: &str) -> u64 {
    match serde_json::from_str::<Value>(payload) {
        Ok(value) => block_height_from_value(&value, result_key),
        Err(_) => SENTINEL_HEIGHT,
    }
}

/// Whether a relay payload is a JSON object
pub fn is_json_object(payload: &str) -> bool {
    matches!(serde_json::from_str::<Value>(payload), Ok(Value::Object(_)))
}

/// Read the height under `result_key` from an already-decoded payload
pub fn block_height_from_value(value: &Value, result_key: &str) -> u64 {
    let Some(object) = value.as_object() else {
        return SENTINEL_HEIGHT;
    };

    match object.get(result_key) {
        Some(Value::Number(number)) => number.as_u64().unwrap_or(SENTINEL_HEIGHT),
        Some(Value::String(raw)) => parse_height_str(raw),
        _ => SENTINEL_HEIGHT,
    }
}

/// Decimal, or `0x`-prefixed hex as returned by `eth_blockNumber`
fn parse_height_str(raw: &str) -> u64 {
    let raw = raw.trim();
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => raw.parse::<u64>(),
    };
    parsed.unwrap_or(SENTINEL_HEIGHT)
}
