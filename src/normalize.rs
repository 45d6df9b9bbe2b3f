//! Best-effort integer coercion for loosely typed catalog scalars.
//!
//! Catalog identifiers show up as JSON numbers, `0x`-prefixed hex strings,
//! bare hex tokens (`"00A2"`) and plain decimal strings. [`parse_unknown_value`]
//! tries each radix in [`RADIX_ORDER`] and keeps the first interpretation that
//! succeeds.

use serde_json::Value;

/// Radixes attempted by [`parse_unknown_value`], in order.
pub const RADIX_ORDER: [u32; 3] = [16, 10, 2];

/// Interprets `value` as a non-negative integer, trying hexadecimal, then
/// decimal, then binary.
///
/// Returns `None` when no radix yields a number. Callers decide what an
/// unknown value means for them.
pub fn parse_unknown_value(value: &Value) -> Option<u64> {
    RADIX_ORDER
        .iter()
        .find_map(|&radix| parse_with_radix(value, radix))
}

/// Single attempt at interpreting `value` in `radix`.
///
/// JSON numbers are already numeric and are accepted by every radix as long
/// as they are non-negative integers. Strings carrying a `0x` prefix are only
/// accepted by the hexadecimal attempt.
pub fn parse_with_radix(value: &Value, radix: u32) -> Option<u64> {
    match value {
        Value::Number(number) => number_as_u64(number),
        Value::String(text) => parse_token(text.trim(), radix),
        _ => None,
    }
}

/// Parses a signed decimal scalar, used for setting bounds and defaults.
pub fn parse_signed(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(text) => text.trim().parse().ok(),
        Value::Bool(flag) => Some(i64::from(*flag)),
        _ => None,
    }
}

fn number_as_u64(number: &serde_json::Number) -> Option<u64> {
    if let Some(n) = number.as_u64() {
        return Some(n);
    }
    number
        .as_f64()
        .filter(|f| *f >= 0.0 && f.fract() == 0.0 && *f <= u64::MAX as f64)
        .map(|f| f as u64)
}

fn parse_token(token: &str, radix: u32) -> Option<u64> {
    match strip_hex_prefix(token) {
        Some(digits) if radix == 16 => from_digits(digits, 16),
        Some(_) => None,
        // Bare tokens made only of decimal digits belong to the decimal attempt.
        None if radix == 16 => {
            if token.chars().any(|c| c.is_ascii_alphabetic()) {
                from_digits(token, 16)
            } else {
                None
            }
        }
        None => from_digits(token, radix),
    }
}

fn strip_hex_prefix(token: &str) -> Option<&str> {
    token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
}

fn from_digits(digits: &str, radix: u32) -> Option<u64> {
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    u64::from_str_radix(digits, radix).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prefixed_hex() {
        assert_eq!(parse_unknown_value(&json!("0x0086")), Some(134));
        assert_eq!(parse_unknown_value(&json!("0X00A2")), Some(162));
    }

    #[test]
    fn test_bare_hex_token() {
        assert_eq!(parse_unknown_value(&json!("00A2")), Some(0xA2));
        assert_eq!(parse_unknown_value(&json!("ff")), Some(255));
    }

    #[test]
    fn test_decimal_string() {
        assert_eq!(parse_unknown_value(&json!("134")), Some(134));
        assert_eq!(parse_unknown_value(&json!(" 42 ")), Some(42));
    }

    #[test]
    fn test_b_after_zero_is_a_hex_digit() {
        assert_eq!(parse_unknown_value(&json!("0B10")), Some(0x0B10));
        assert_eq!(parse_unknown_value(&json!("0B00")), Some(0x0B00));
        assert_eq!(parse_unknown_value(&json!("0b101")), Some(0xB101));
    }

    #[test]
    fn test_numbers_pass_through() {
        assert_eq!(parse_unknown_value(&json!(134)), Some(134));
        assert_eq!(parse_unknown_value(&json!(7.0)), Some(7));
        assert_eq!(parse_unknown_value(&json!(-1)), None);
        assert_eq!(parse_unknown_value(&json!(1.5)), None);
    }

    #[test]
    fn test_garbage_is_none() {
        assert_eq!(parse_unknown_value(&json!("garbage")), None);
        assert_eq!(parse_unknown_value(&json!("")), None);
        assert_eq!(parse_unknown_value(&json!("0x")), None);
        assert_eq!(parse_unknown_value(&Value::Null), None);
        assert_eq!(parse_unknown_value(&json!([1])), None);
    }

    #[test]
    fn test_radix_attempts_are_independent() {
        assert_eq!(parse_with_radix(&json!("0x10"), 10), None);
        assert_eq!(parse_with_radix(&json!("0x10"), 16), Some(16));
        assert_eq!(parse_with_radix(&json!("10"), 16), None);
        assert_eq!(parse_with_radix(&json!("10"), 2), Some(2));
    }

    #[test]
    fn test_parse_signed() {
        assert_eq!(parse_signed(&json!("-5")), Some(-5));
        assert_eq!(parse_signed(&json!(200)), Some(200));
        assert_eq!(parse_signed(&json!("abc")), None);
        assert_eq!(parse_signed(&Value::Null), None);
    }
}
