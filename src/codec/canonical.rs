//! Canonical encoding.
//!
//! Output is compact JSON, bit-exact for a given logical value:
//! - no whitespace anywhere
//! - map keys in byte order (BTreeMap order)
//! - integers as plain decimal digits
//! - decimals as `{"__fixed__":"<plain decimal>"}`, already truncated to the fixed scale
//! - strings escaped with the minimal JSON escape set (`\"`, `\\`, `\n`, `\r`, `\t`,
//!   `\b`, `\f`, other control chars as `\u00XX`)

use super::value::{plain_string, Value};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt::Write;
use thiserror::Error;

/// Marker key used for fixed-precision decimals on the wire.
pub const FIXED_KEY: &str = "__fixed__";

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid decimal {0:?}")]
    Decimal(String),
}

pub fn encode(v: &Value) -> String {
    let mut out = String::new();
    write_value(v, &mut out);
    out
}

fn write_value(v: &Value, out: &mut String) {
    match v {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Int(i) => {
            let _ = write!(out, "{}", i);
        }
        Value::Decimal(d) => {
            out.push('{');
            write_str(FIXED_KEY, out);
            out.push(':');
            write_str(&plain_string(d), out);
            out.push('}');
        }
        Value::Str(s) => write_str(s, out),
        Value::List(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        Value::Map(map) => {
            out.push('{');
            for (i, (k, item)) in map.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_str(k, out);
                out.push(':');
                write_value(item, out);
            }
            out.push('}');
        }
    }
}

fn write_str(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

pub fn decode(s: &str) -> Result<Value, CodecError> {
    let json: JsonValue = serde_json::from_str(s)?;
    from_json(&json)
}

/// Convert wire JSON into a contract value. JSON floats are read through their
/// shortest decimal text, never kept as binary floats.
pub fn from_json(json: &JsonValue) -> Result<Value, CodecError> {
    Ok(match json {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Bool(*b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::parse_decimal(&n.to_string()).map_err(|_| CodecError::Decimal(n.to_string()))?,
        },
        JsonValue::String(s) => Value::Str(s.clone()),
        JsonValue::Array(items) => Value::List(items.iter().map(from_json).collect::<Result<_, _>>()?),
        JsonValue::Object(obj) => {
            if obj.len() == 1 {
                if let Some(JsonValue::String(fixed)) = obj.get(FIXED_KEY) {
                    return Value::parse_decimal(fixed).map_err(|_| CodecError::Decimal(fixed.clone()));
                }
            }
            let mut map = BTreeMap::new();
            for (k, v) in obj {
                map.insert(k.clone(), from_json(v)?);
            }
            Value::Map(map)
        }
    })
}

pub fn to_json(v: &Value) -> JsonValue {
    match v {
        Value::Null => JsonValue::Null,
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Int(i) => JsonValue::from(*i),
        Value::Decimal(d) => {
            let mut obj = serde_json::Map::new();
            obj.insert(FIXED_KEY.to_string(), JsonValue::String(plain_string(d)));
            JsonValue::Object(obj)
        }
        Value::Str(s) => JsonValue::String(s.clone()),
        Value::List(items) => JsonValue::Array(items.iter().map(to_json).collect()),
        Value::Map(map) => {
            let mut obj = serde_json::Map::new();
            for (k, item) in map {
                obj.insert(k.clone(), to_json(item));
            }
            JsonValue::Object(obj)
        }
    }
}
