//! Dynamically typed contract value.
//!
//! Numbers are either `Int` (checked i64) or `Decimal` (fixed precision, truncated
//! to `MAX_DECIMAL_SCALE` fractional digits). There is no float variant.

use bigdecimal::BigDecimal;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Fractional digits kept by every decimal result.
pub const MAX_DECIMAL_SCALE: i64 = 30;
/// Digits allowed left of the decimal point.
pub const MAX_INTEGER_DIGITS: i64 = 64;
/// Longest decimal text accepted by `parse_decimal`.
pub const MAX_DECIMAL_TEXT: usize = 256;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueError {
    #[error("type error: {0}")]
    Type(String),

    #[error("integer overflow")]
    Overflow,

    #[error("division by zero")]
    DivisionByZero,

    #[error("invalid decimal literal {0:?}")]
    BadDecimal(String),

    #[error("decimal exceeds {MAX_INTEGER_DIGITS} integer digits")]
    DecimalOverflow,
}

#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Decimal(BigDecimal),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

/// Truncate to the fixed scale and strip trailing zeros.
///
/// The magnitude is checked before rescaling: `with_scale` materializes every
/// digit, so `1e2000000` must be refused rather than expanded.
pub fn fixed(d: BigDecimal) -> Result<BigDecimal, ValueError> {
    let zero = BigDecimal::from(0);
    if d == zero {
        return Ok(zero);
    }
    let (_, scale) = d.as_bigint_and_exponent();
    let integer_digits = d.digits() as i64 - scale;
    if integer_digits > MAX_INTEGER_DIGITS {
        return Err(ValueError::DecimalOverflow);
    }
    if integer_digits < -MAX_DECIMAL_SCALE {
        return Ok(zero);
    }
    Ok(d.with_scale(MAX_DECIMAL_SCALE).normalized())
}

/// Plain (never scientific) rendering of a decimal.
pub fn plain_string(d: &BigDecimal) -> String {
    let (int, scale) = d.as_bigint_and_exponent();
    let raw = int.to_string();
    let (negative, digits) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest.to_string()),
        None => (false, raw),
    };

    let body = if digits == "0" {
        "0".to_string()
    } else if scale <= 0 {
        format!("{}{}", digits, "0".repeat(scale.unsigned_abs() as usize))
    } else {
        let scale = scale as usize;
        if digits.len() > scale {
            let split = digits.len() - scale;
            format!("{}.{}", &digits[..split], &digits[split..])
        } else {
            format!("0.{}{}", "0".repeat(scale - digits.len()), digits)
        }
    };

    if negative && body != "0" {
        format!("-{}", body)
    } else {
        body
    }
}

/// `floor(a / b)` for a non-zero `b`.
fn floor_quotient(a: &BigDecimal, b: &BigDecimal) -> BigDecimal {
    let exact = a / b;
    let truncated = exact.with_scale(0);
    if truncated > exact {
        truncated - BigDecimal::from(1)
    } else {
        truncated
    }
}

impl Value {
    pub fn decimal(d: BigDecimal) -> Result<Value, ValueError> {
        fixed(d).map(Value::Decimal)
    }

    pub fn parse_decimal(s: &str) -> Result<Value, ValueError> {
        let text = s.trim();
        let bad = || ValueError::BadDecimal(s.chars().take(64).collect());
        if text.len() > MAX_DECIMAL_TEXT {
            return Err(bad());
        }
        let d = BigDecimal::from_str(text).map_err(|_| bad())?;
        Value::decimal(d).map_err(|_| bad())
    }

    pub fn str(s: impl Into<String>) -> Value {
        Value::Str(s.into())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Decimal(_) => "decimal",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Decimal(d) => *d != BigDecimal::from(0),
            Value::Str(s) => !s.is_empty(),
            Value::List(l) => !l.is_empty(),
            Value::Map(m) => !m.is_empty(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<BigDecimal> {
        match self {
            Value::Int(i) => Some(BigDecimal::from(*i)),
            Value::Decimal(d) => Some(d.clone()),
            _ => None,
        }
    }

    /// Approximate heap size in bytes and nesting depth (scalars are depth 0).
    pub fn footprint(&self) -> (usize, usize) {
        match self {
            Value::Null | Value::Bool(_) | Value::Int(_) => (8, 0),
            Value::Decimal(d) => (8 + d.digits() as usize, 0),
            Value::Str(s) => (8 + s.len(), 0),
            Value::List(items) => items.iter().fold((8, 1), |(bytes, depth), item| {
                let (b, d) = item.footprint();
                (bytes + b, depth.max(d + 1))
            }),
            Value::Map(map) => map.iter().fold((8, 1), |(bytes, depth), (k, item)| {
                let (b, d) = item.footprint();
                (bytes + 8 + k.len() + b, depth.max(d + 1))
            }),
        }
    }

    fn is_number(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Decimal(_))
    }

    fn mismatch(&self, op: &str, other: &Value) -> ValueError {
        ValueError::Type(format!(
            "unsupported operand types for {}: {} and {}",
            op,
            self.type_name(),
            other.type_name()
        ))
    }

    /// Both operands as decimals, when both are numbers and at least one is a decimal.
    fn decimal_pair(&self, other: &Value) -> Option<(BigDecimal, BigDecimal)> {
        match (self, other) {
            (Value::Int(_), Value::Int(_)) => None,
            _ => Some((self.as_decimal()?, other.as_decimal()?)),
        }
    }

    pub fn add(&self, other: &Value) -> Result<Value, ValueError> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.checked_add(*b).map(Value::Int).ok_or(ValueError::Overflow),
            (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{}{}", a, b))),
            (Value::List(a), Value::List(b)) => Ok(Value::List(a.iter().chain(b.iter()).cloned().collect())),
            _ => match self.decimal_pair(other) {
                Some((a, b)) => Value::decimal(&a + &b),
                None => Err(self.mismatch("+", other)),
            },
        }
    }

    pub fn sub(&self, other: &Value) -> Result<Value, ValueError> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.checked_sub(*b).map(Value::Int).ok_or(ValueError::Overflow),
            _ => match self.decimal_pair(other) {
                Some((a, b)) => Value::decimal(&a - &b),
                None => Err(self.mismatch("-", other)),
            },
        }
    }

    pub fn mul(&self, other: &Value) -> Result<Value, ValueError> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.checked_mul(*b).map(Value::Int).ok_or(ValueError::Overflow),
            _ => match self.decimal_pair(other) {
                Some((a, b)) => Value::decimal(&a * &b),
                None => Err(self.mismatch("*", other)),
            },
        }
    }

    /// True division: always yields a decimal.
    pub fn div(&self, other: &Value) -> Result<Value, ValueError> {
        if !self.is_number() || !other.is_number() {
            return Err(self.mismatch("/", other));
        }
        let (a, b) = (self.as_decimal(), other.as_decimal());
        match (a, b) {
            (Some(a), Some(b)) => {
                if b == BigDecimal::from(0) {
                    return Err(ValueError::DivisionByZero);
                }
                Value::decimal(&a / &b)
            }
            _ => Err(self.mismatch("/", other)),
        }
    }

    /// Floor division; rounds toward negative infinity for ints and decimals alike.
    pub fn floor_div(&self, other: &Value) -> Result<Value, ValueError> {
        match (self, other) {
            (Value::Int(_), Value::Int(0)) => Err(ValueError::DivisionByZero),
            (Value::Int(a), Value::Int(b)) => {
                let q = a.checked_div(*b).ok_or(ValueError::Overflow)?;
                if a % b != 0 && ((*a < 0) != (*b < 0)) {
                    Ok(Value::Int(q - 1))
                } else {
                    Ok(Value::Int(q))
                }
            }
            _ => match self.decimal_pair(other) {
                Some((a, b)) => {
                    if b == BigDecimal::from(0) {
                        return Err(ValueError::DivisionByZero);
                    }
                    Value::decimal(floor_quotient(&a, &b))
                }
                None => Err(self.mismatch("//", other)),
            },
        }
    }

    pub fn rem(&self, other: &Value) -> Result<Value, ValueError> {
        match (self, other) {
            (Value::Int(_), Value::Int(0)) => Err(ValueError::DivisionByZero),
            (Value::Int(a), Value::Int(b)) => {
                let r = a.checked_rem(*b).ok_or(ValueError::Overflow)?;
                if r != 0 && ((r < 0) != (*b < 0)) {
                    Ok(Value::Int(r + b))
                } else {
                    Ok(Value::Int(r))
                }
            }
            _ => match self.decimal_pair(other) {
                Some((a, b)) => {
                    if b == BigDecimal::from(0) {
                        return Err(ValueError::DivisionByZero);
                    }
                    // same sign rule as ints: the remainder follows the divisor
                    let q = floor_quotient(&a, &b);
                    Value::decimal(&a - &(&b * &q))
                }
                None => Err(self.mismatch("%", other)),
            },
        }
    }

    pub fn neg(&self) -> Result<Value, ValueError> {
        match self {
            Value::Int(a) => a.checked_neg().map(Value::Int).ok_or(ValueError::Overflow),
            Value::Decimal(d) => Value::decimal(-d.clone()),
            _ => Err(ValueError::Type(format!("bad operand type for unary -: {}", self.type_name()))),
        }
    }

    /// Ordering for `<`, `<=`, `>`, `>=`: numbers with numbers, strings with strings.
    pub fn compare(&self, other: &Value) -> Result<Ordering, ValueError> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
            (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
            _ => match (self.as_decimal(), other.as_decimal()) {
                (Some(a), Some(b)) => Ok(a.cmp(&b)),
                _ => Err(ValueError::Type(format!(
                    "cannot compare {} with {}",
                    self.type_name(),
                    other.type_name()
                ))),
            },
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            _ => match (self.as_decimal(), other.as_decimal()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{}", s),
            Value::Decimal(d) => write!(f, "{}", plain_string(d)),
            other => write!(f, "{}", super::canonical::encode(other)),
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Value {
        Value::parse_decimal(s).unwrap()
    }

    #[test]
    fn test_plain_string_never_scientific() {
        assert_eq!(dec("0.0000001").to_string(), "0.0000001");
        assert_eq!(dec("1E+3").to_string(), "1000");
        assert_eq!(dec("-12.500").to_string(), "-12.5");
        assert_eq!(dec("0.000").to_string(), "0");
    }

    #[test]
    fn test_decimal_truncates_to_fixed_scale() {
        let third = Value::Int(1).div(&Value::Int(3)).unwrap();
        assert_eq!(third.to_string(), format!("0.{}", "3".repeat(30)));
    }

    #[test]
    fn test_int_overflow_is_an_error() {
        assert_eq!(Value::Int(i64::MAX).add(&Value::Int(1)), Err(ValueError::Overflow));
    }

    #[test]
    fn test_mixed_numeric_equality_and_order() {
        assert_eq!(Value::Int(5), dec("5.0"));
        assert_eq!(Value::Int(2).compare(&dec("2.5")).unwrap(), Ordering::Less);
        assert!(Value::str("a").compare(&Value::Int(1)).is_err());
    }

    #[test]
    fn test_floor_division_and_remainder_follow_divisor_sign() {
        assert_eq!(Value::Int(-7).floor_div(&Value::Int(2)).unwrap(), Value::Int(-4));
        assert_eq!(Value::Int(-7).rem(&Value::Int(2)).unwrap(), Value::Int(1));
        assert_eq!(Value::Int(7).rem(&Value::Int(-2)).unwrap(), Value::Int(-1));
        assert_eq!(Value::Int(1).floor_div(&Value::Int(0)), Err(ValueError::DivisionByZero));
    }

    #[test]
    fn test_decimal_floor_division_matches_ints() {
        assert_eq!(dec("-7.5").floor_div(&Value::Int(2)).unwrap(), Value::Int(-4));
        assert_eq!(dec("7.5").floor_div(&Value::Int(2)).unwrap(), Value::Int(3));
        assert_eq!(dec("-7").floor_div(&dec("2")).unwrap(), Value::Int(-7).floor_div(&Value::Int(2)).unwrap());
        assert_eq!(dec("-7.5").rem(&Value::Int(2)).unwrap(), dec("0.5"));
        assert_eq!(dec("7.5").rem(&Value::Int(-2)).unwrap(), dec("-0.5"));
    }

    #[test]
    fn test_decimal_magnitude_is_bounded() {
        assert!(matches!(Value::parse_decimal("1e2000000"), Err(ValueError::BadDecimal(_))));
        assert!(matches!(Value::parse_decimal("1e64"), Err(ValueError::BadDecimal(_))));
        assert!(Value::parse_decimal("1e63").is_ok());
        assert_eq!(dec("1e-2000000"), Value::Int(0));
        assert!(Value::parse_decimal(&"9".repeat(MAX_DECIMAL_TEXT + 1)).is_err());

        let big = dec("1e40");
        assert_eq!(big.mul(&big), Err(ValueError::DecimalOverflow));
    }

    #[test]
    fn test_footprint_tracks_size_and_depth() {
        assert_eq!(Value::Int(1).footprint(), (8, 0));
        assert_eq!(Value::List(vec![Value::str("abc")]).footprint(), (19, 1));
        let nested = Value::List(vec![Value::List(vec![]), Value::Null]);
        assert_eq!(nested.footprint().1, 2);
    }

    #[test]
    fn test_string_concat() {
        assert_eq!(Value::str("ab").add(&Value::str("cd")).unwrap(), Value::str("abcd"));
        assert!(Value::str("ab").add(&Value::Int(1)).is_err());
    }
}
