//! Coercion of provider payload fields into canonical types
//!
//! Providers disagree on how they encode amounts: decimal strings, hex
//! strings, JSON integers, floats and scientific notation all show up. Every
//! amount ends up as an exact `U256`; anything that cannot be represented
//! exactly is rejected rather than truncated.

use alloy_primitives::U256;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::ProviderError;
use crate::provider::ProviderKind;

/// Largest integer an f64 holds without gaps
const F64_EXACT_LIMIT: f64 = 9_007_199_254_740_992.0;

/// Parse an amount in the smallest token unit
pub fn parse_amount(provider: ProviderKind, field: &str, value: &Value) -> Result<U256, ProviderError> {
    match value {
        Value::String(s) => parse_amount_str(provider, field, s),
        Value::Number(n) => {
            if let Some(v) = n.as_u64() {
                return Ok(U256::from(v));
            }
            if n.as_i64().is_some() {
                return Err(ProviderError::malformed(provider, format!("negative {}: {}", field, n)));
            }
            match n.as_f64() {
                Some(f) if f >= 0.0 && f.fract() == 0.0 && f <= F64_EXACT_LIMIT => Ok(U256::from(f as u64)),
                Some(f) if f < 0.0 => Err(ProviderError::malformed(provider, format!("negative {}: {}", field, n))),
                _ => Err(precision_loss(provider, field, &n.to_string())),
            }
        }
        Value::Null => Err(ProviderError::malformed(provider, format!("missing {}", field))),
        other => Err(ProviderError::malformed(provider, format!("unexpected {} value: {}", field, other))),
    }
}

/// Parse a textual amount (decimal, `0x` hex or scientific notation)
pub fn parse_amount_str(provider: ProviderKind, field: &str, raw: &str) -> Result<U256, ProviderError> {
    let s = raw.trim();
    if s.is_empty() {
        return Err(ProviderError::malformed(provider, format!("empty {}", field)));
    }
    if s.starts_with('-') {
        return Err(ProviderError::malformed(provider, format!("negative {}: {}", field, s)));
    }

    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        if hex.is_empty() {
            return Ok(U256::ZERO);
        }
        return U256::from_str_radix(hex, 16)
            .map_err(|e| ProviderError::malformed(provider, format!("bad hex {} {}: {}", field, s, e)));
    }

    if s.bytes().all(|b| b.is_ascii_digit()) {
        return U256::from_str_radix(s, 10)
            .map_err(|e| ProviderError::malformed(provider, format!("bad {} {}: {}", field, s, e)));
    }

    let digits = expand_decimal(provider, field, s)?;
    U256::from_str_radix(&digits, 10)
        .map_err(|e| ProviderError::malformed(provider, format!("bad {} {}: {}", field, s, e)))
}

/// Expand `1.25e3` style text to an integer digit string, exactly
fn expand_decimal(provider: ProviderKind, field: &str, s: &str) -> Result<String, ProviderError> {
    let bad = || ProviderError::malformed(provider, format!("unparseable {}: {}", field, s));

    let (mantissa, exponent) = match s.find(|c: char| c == 'e' || c == 'E') {
        Some(idx) => {
            let exp: i64 = s[idx + 1..].trim_start_matches('+').parse().map_err(|_| bad())?;
            (&s[..idx], exp)
        }
        None => (s, 0),
    };

    let (int_part, frac_part) = match mantissa.split_once('.') {
        Some((i, f)) => (i, f),
        None => (mantissa, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(bad());
    }
    if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
        return Err(bad());
    }

    let mut digits = format!("{}{}", int_part, frac_part);
    let frac_len = i64::try_from(frac_part.len()).map_err(|_| bad())?;
    let scale = exponent.checked_sub(frac_len).ok_or_else(bad)?;

    if scale >= 0 {
        // U256 tops out at 78 digits; anything longer cannot fit anyway
        let width = i64::try_from(digits.len()).ok().and_then(|len| len.checked_add(scale));
        if width.map_or(true, |w| w > 80) {
            return Err(bad());
        }
        digits.push_str(&"0".repeat(scale as usize));
    } else {
        let drop = usize::try_from(scale.unsigned_abs()).unwrap_or(usize::MAX);
        let keep = digits.len().saturating_sub(drop);
        if digits[keep..].bytes().any(|b| b != b'0') {
            return Err(precision_loss(provider, field, s));
        }
        digits.truncate(keep);
    }

    let trimmed = digits.trim_start_matches('0');
    Ok(if trimmed.is_empty() { "0".to_string() } else { trimmed.to_string() })
}

/// Parse token decimals from a number or numeric string
pub fn parse_decimals(provider: ProviderKind, value: &Value) -> Result<u8, ProviderError> {
    let parsed = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    parsed
        .and_then(|d| u8::try_from(d).ok())
        .ok_or_else(|| ProviderError::malformed(provider, format!("invalid decimals: {}", value)))
}

/// Parse a timestamp given as unix seconds (number, decimal or hex string)
/// or RFC 3339 text
pub fn parse_timestamp(provider: ProviderKind, field: &str, value: &Value) -> Result<DateTime<Utc>, ProviderError> {
    let bad = || ProviderError::malformed(provider, format!("invalid {}: {}", field, value));

    let secs = match value {
        Value::Number(n) => n.as_i64().ok_or_else(bad)?,
        Value::String(s) => {
            let s = s.trim();
            if let Some(hex) = s.strip_prefix("0x") {
                i64::from_str_radix(hex, 16).map_err(|_| bad())?
            } else if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
                s.parse::<i64>().map_err(|_| bad())?
            } else {
                return DateTime::parse_from_rfc3339(s)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|_| bad());
            }
        }
        _ => return Err(bad()),
    };

    DateTime::from_timestamp(secs, 0).ok_or_else(bad)
}

/// Parse a block number given as decimal or hex text
pub fn parse_block_number(provider: ProviderKind, raw: &str) -> Result<u64, ProviderError> {
    let s = raw.trim();
    let parsed = match s.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse::<u64>(),
    };
    parsed.map_err(|_| ProviderError::malformed(provider, format!("invalid block number: {}", raw)))
}

fn precision_loss(provider: ProviderKind, field: &str, value: &str) -> ProviderError {
    ProviderError::PrecisionLoss {
        provider,
        field: field.to_string(),
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const P: ProviderKind = ProviderKind::Covalent;

    #[test]
    fn test_decimal_and_hex_strings() {
        assert_eq!(parse_amount(P, "balance", &json!("1000")).unwrap(), U256::from(1000u64));
        assert_eq!(parse_amount(P, "balance", &json!("0x3e8")).unwrap(), U256::from(1000u64));
        assert_eq!(parse_amount(P, "balance", &json!("0x")).unwrap(), U256::ZERO);
    }

    #[test]
    fn test_large_supply_string() {
        let raw = "115792089237316195423570985008687907853269984665640564039457584007913129639935";
        assert_eq!(parse_amount(P, "total_supply", &json!(raw)).unwrap(), U256::MAX);
    }

    #[test]
    fn test_scientific_notation_exact() {
        assert_eq!(
            parse_amount(P, "balance", &json!("1.5e+24")).unwrap(),
            U256::from_str_radix("1500000000000000000000000", 10).unwrap()
        );
        assert_eq!(parse_amount(P, "balance", &json!("2500.000")).unwrap(), U256::from(2500u64));
    }

    #[test]
    fn test_fractional_values_rejected() {
        let err = parse_amount(P, "balance", &json!("12.5")).unwrap_err();
        assert!(matches!(err, ProviderError::PrecisionLoss { .. }));

        let err = parse_amount(P, "balance", &json!(12.5)).unwrap_err();
        assert!(matches!(err, ProviderError::PrecisionLoss { .. }));
    }

    #[test]
    fn test_floats_beyond_exact_range_rejected() {
        let err = parse_amount(P, "balance", &json!(1.5e24)).unwrap_err();
        assert!(matches!(err, ProviderError::PrecisionLoss { .. }));
        assert_eq!(parse_amount(P, "balance", &json!(4096.0)).unwrap(), U256::from(4096u64));
    }

    #[test]
    fn test_malformed_amounts() {
        assert!(matches!(
            parse_amount(P, "balance", &json!("-5")),
            Err(ProviderError::Malformed { .. })
        ));
        assert!(matches!(
            parse_amount(P, "balance", &json!(null)),
            Err(ProviderError::Malformed { .. })
        ));
        assert!(matches!(
            parse_amount(P, "balance", &json!("twelve")),
            Err(ProviderError::Malformed { .. })
        ));
    }

    #[test]
    fn test_extreme_exponents_rejected() {
        assert!(matches!(
            parse_amount_str(P, "balance", "1e9223372036854775807"),
            Err(ProviderError::Malformed { .. })
        ));
        assert!(matches!(
            parse_amount_str(P, "balance", "1.5e-9223372036854775808"),
            Err(ProviderError::Malformed { .. })
        ));
        assert!(matches!(
            parse_amount_str(P, "balance", "1e-9223372036854775808"),
            Err(ProviderError::PrecisionLoss { .. })
        ));
        assert_eq!(parse_amount_str(P, "balance", "0e-9223372036854775808").unwrap(), U256::ZERO);
    }

    #[test]
    fn test_decimals() {
        assert_eq!(parse_decimals(P, &json!(18)).unwrap(), 18);
        assert_eq!(parse_decimals(P, &json!("6")).unwrap(), 6);
        assert!(parse_decimals(P, &json!(300)).is_err());
        assert!(parse_decimals(P, &json!(null)).is_err());
    }

    #[test]
    fn test_timestamps() {
        let expected = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        assert_eq!(parse_timestamp(P, "ts", &json!(1_700_000_000)).unwrap(), expected);
        assert_eq!(parse_timestamp(P, "ts", &json!("1700000000")).unwrap(), expected);
        assert_eq!(parse_timestamp(P, "ts", &json!("0x6553f100")).unwrap(), expected);
        assert_eq!(parse_timestamp(P, "ts", &json!("2023-11-14T22:13:20Z")).unwrap(), expected);
        assert!(parse_timestamp(P, "ts", &json!("yesterday")).is_err());
    }

    #[test]
    fn test_block_numbers() {
        assert_eq!(parse_block_number(P, "0x10").unwrap(), 16);
        assert_eq!(parse_block_number(P, "12345").unwrap(), 12345);
        assert!(parse_block_number(P, "latest").is_err());
    }
}
