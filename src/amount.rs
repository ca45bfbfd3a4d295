//! Exact balance and share arithmetic
//!
//! Balances stay in the token's smallest unit as `U256`. Shares are kept as
//! an exact numerator/denominator pair and only rendered to decimal text at
//! the edges, using integer long division with round-half-up.

use alloy_primitives::U256;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

/// Fraction of total supply, always within `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Share {
    numerator: U256,
    denominator: U256,
}

impl Share {
    /// `part / whole`; a zero `whole` yields a zero share and `part > whole`
    /// is clamped to one
    pub fn of(part: U256, whole: U256) -> Self {
        if whole.is_zero() {
            return Self::zero();
        }
        Self {
            numerator: part.min(whole),
            denominator: whole,
        }
    }

    pub fn zero() -> Self {
        Self {
            numerator: U256::ZERO,
            denominator: U256::from(1u64),
        }
    }

    pub fn numerator(&self) -> U256 {
        self.numerator
    }

    pub fn denominator(&self) -> U256 {
        self.denominator
    }

    pub fn is_zero(&self) -> bool {
        self.numerator.is_zero()
    }

    pub fn is_within_unit(&self) -> bool {
        self.numerator <= self.denominator
    }

    /// Decimal fraction such as `0.8000` with `places` fractional digits
    pub fn to_decimal_string(&self, places: usize) -> String {
        let (int_part, digits) = self.rounded_digits(places);
        render(int_part as u32, &digits)
    }

    /// Percentage such as `80.0000` with `places` fractional digits
    pub fn to_percent_string(&self, places: usize) -> String {
        let (int_part, digits) = self.rounded_digits(places + 2);
        let whole = int_part as u32 * 100 + digits[0] as u32 * 10 + digits[1] as u32;
        render(whole, &digits[2..])
    }

    /// Integer part plus `places` fractional digits, rounded half-up
    fn rounded_digits(&self, places: usize) -> (u8, Vec<u8>) {
        let mut int_part = if self.numerator == self.denominator { 1u8 } else { 0u8 };
        let mut remainder = if int_part == 1 { U256::ZERO } else { self.numerator };

        let mut digits = Vec::with_capacity(places + 1);
        for _ in 0..=places {
            let (digit, next) = times_ten(remainder, self.denominator);
            digits.push(digit);
            remainder = next;
        }

        let guard = digits.pop().unwrap_or(0);
        if guard >= 5 {
            let mut carry = true;
            for d in digits.iter_mut().rev() {
                if *d == 9 {
                    *d = 0;
                } else {
                    *d += 1;
                    carry = false;
                    break;
                }
            }
            if carry {
                int_part += 1;
            }
        }

        (int_part, digits)
    }
}

/// One step of long division: `(floor(10r / den), 10r mod den)` for `r < den`
///
/// Accumulates `r` ten times modulo `den` so no intermediate exceeds `den`.
fn times_ten(remainder: U256, denominator: U256) -> (u8, U256) {
    let gap = denominator - remainder;
    let mut acc = U256::ZERO;
    let mut digit = 0u8;
    for _ in 0..10 {
        if acc >= gap {
            acc -= gap;
            digit += 1;
        } else {
            acc += remainder;
        }
    }
    (digit, acc)
}

fn render(whole: u32, digits: &[u8]) -> String {
    if digits.is_empty() {
        return whole.to_string();
    }
    let frac: String = digits.iter().map(|d| char::from(b'0' + d)).collect();
    format!("{}.{}", whole, frac)
}

impl Default for Share {
    fn default() -> Self {
        Self::zero()
    }
}

impl Serialize for Share {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Share", 3)?;
        state.serialize_field("numerator", &self.numerator.to_string())?;
        state.serialize_field("denominator", &self.denominator.to_string())?;
        state.serialize_field("percent", &self.to_percent_string(4))?;
        state.end()
    }
}

/// Render a raw amount in whole-token units without rounding
pub fn format_units(raw: U256, decimals: u8) -> String {
    let digits = raw.to_string();
    let decimals = decimals as usize;
    if decimals == 0 {
        return digits;
    }

    let padded = if digits.len() <= decimals {
        format!("{}{}", "0".repeat(decimals - digits.len() + 1), digits)
    } else {
        digits
    };
    let (int_part, frac_part) = padded.split_at(padded.len() - decimals);
    let frac_part = frac_part.trim_end_matches('0');

    if frac_part.is_empty() {
        int_part.to_string()
    } else {
        format!("{}.{}", int_part, frac_part)
    }
}

/// Serialize a `U256` as a plain decimal string
pub mod u256_decimal {
    use alloy_primitives::U256;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }
}
