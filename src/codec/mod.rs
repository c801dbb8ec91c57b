//! Codec module: the value model shared by contracts, state and the wire,
//! plus the canonical encoding every hashed/signed/stored byte goes through.
//!
//! - `Value`: dynamically typed contract value (no binary floats)
//! - `canonical`: bit-exact JSON encoding (sorted keys, fixed decimals)

pub mod value;
pub mod canonical;

pub use value::{Value, ValueError, MAX_DECIMAL_SCALE, MAX_INTEGER_DIGITS};
pub use canonical::{decode, encode, from_json, to_json, CodecError};
