//! State key builder: `contract.variable[:part...]`.

use crate::codec::Value;
use thiserror::Error;

/// Separates contract from variable.
pub const DELIMITER: char = '.';
/// Separates variable from each key part.
pub const INDEX_SEPARATOR: char = ':';
/// Longest key the driver accepts.
pub const MAX_KEY_LEN: usize = 1024;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("key part {0:?} contains the index separator")]
    Separator(String),

    #[error("{0} values cannot be used as key parts")]
    Unsupported(&'static str),

    #[error("key exceeds {MAX_KEY_LEN} bytes")]
    TooLong,
}

/// Build the storage key for a variable, or for one slot of a hash when `parts`
/// is non-empty. Parts render as their display form and must be scalars; no
/// rendered part may contain the index separator.
pub fn make_key(contract: &str, variable: &str, parts: &[Value]) -> Result<String, KeyError> {
    let mut key = format!("{}{}{}", contract, DELIMITER, variable);
    for part in parts {
        let rendered = match part {
            Value::List(_) | Value::Map(_) => return Err(KeyError::Unsupported(part.type_name())),
            other => other.to_string(),
        };
        if rendered.contains(INDEX_SEPARATOR) {
            return Err(KeyError::Separator(rendered));
        }
        key.push(INDEX_SEPARATOR);
        key.push_str(&rendered);
    }
    if key.len() > MAX_KEY_LEN {
        return Err(KeyError::TooLong);
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_variable_key() {
        assert_eq!(make_key("con", "v", &[]).unwrap(), "con.v");
    }

    #[test]
    fn test_multi_part_key() {
        let key = make_key("currency", "balances", &[Value::str("alice"), Value::Int(3)]).unwrap();
        assert_eq!(key, "currency.balances:alice:3");
    }

    #[test]
    fn test_separator_in_part_rejected() {
        assert_eq!(
            make_key("c", "h", &[Value::str("a:b")]),
            Err(KeyError::Separator("a:b".into()))
        );
    }

    #[test]
    fn test_overlong_key_rejected() {
        let long = "x".repeat(MAX_KEY_LEN);
        assert_eq!(make_key("c", "h", &[Value::str(long)]), Err(KeyError::TooLong));
    }

    #[test]
    fn test_collection_parts_rejected() {
        let mut m = std::collections::BTreeMap::new();
        m.insert("a".to_string(), Value::str("b"));
        assert_eq!(make_key("c", "h", &[Value::Map(m)]), Err(KeyError::Unsupported("map")));
        assert_eq!(make_key("c", "h", &[Value::List(vec![Value::Int(1)])]), Err(KeyError::Unsupported("list")));
        // two string parts are the only way to reach this key
        let key = make_key("c", "h", &[Value::str("{\"a\""), Value::str("\"b\"}")]).unwrap();
        assert_eq!(key, "c.h:{\"a\":\"b\"}");
    }

    #[test]
    fn test_scalar_parts_render_plainly() {
        let d = Value::parse_decimal("1.50").unwrap();
        let key = make_key("c", "h", &[d, Value::Bool(true), Value::Null]).unwrap();
        assert_eq!(key, "c.h:1.5:true:null");
    }
}
