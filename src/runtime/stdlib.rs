//! Sandbox builtins.
//!
//! The whitelist is closed: the compiler resolves call names against
//! `Builtin::from_name` and rejects anything else. Pure builtins are evaluated
//! here; the ones that need the environment (`now`, `rand_int`, `is_owner`,
//! `deploy`) are handled by the VM.

use crate::codec::{encode, Value};
use crate::crypto::{hash_bytes, sha256_hex};
use crate::runtime::metering::CostClass;
use crate::runtime::runtime_types::VmError;
use bigdecimal::{BigDecimal, ToPrimitive};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Builtin {
    Len,
    Str,
    Int,
    Decimal,
    Abs,
    Min,
    Max,
    Keys,
    Contains,
    Append,
    Sha3,
    Sha256,
    Now,
    RandInt,
    IsOwner,
    Deploy,
}

impl Builtin {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "len" => Builtin::Len,
            "str" => Builtin::Str,
            "int" => Builtin::Int,
            "decimal" => Builtin::Decimal,
            "abs" => Builtin::Abs,
            "min" => Builtin::Min,
            "max" => Builtin::Max,
            "keys" => Builtin::Keys,
            "contains" => Builtin::Contains,
            "append" => Builtin::Append,
            "sha3" => Builtin::Sha3,
            "sha256" => Builtin::Sha256,
            "now" => Builtin::Now,
            "rand_int" => Builtin::RandInt,
            "is_owner" => Builtin::IsOwner,
            "deploy" => Builtin::Deploy,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Len => "len",
            Builtin::Str => "str",
            Builtin::Int => "int",
            Builtin::Decimal => "decimal",
            Builtin::Abs => "abs",
            Builtin::Min => "min",
            Builtin::Max => "max",
            Builtin::Keys => "keys",
            Builtin::Contains => "contains",
            Builtin::Append => "append",
            Builtin::Sha3 => "sha3",
            Builtin::Sha256 => "sha256",
            Builtin::Now => "now",
            Builtin::RandInt => "rand_int",
            Builtin::IsOwner => "is_owner",
            Builtin::Deploy => "deploy",
        }
    }

    pub fn cost_class(&self) -> CostClass {
        match self {
            Builtin::Sha3 | Builtin::Sha256 => CostClass::Hash,
            Builtin::IsOwner => CostClass::StateRead,
            Builtin::Deploy => CostClass::Deploy,
            _ => CostClass::Builtin,
        }
    }
}

fn arity(b: Builtin, args: &[Value], n: usize) -> Result<(), VmError> {
    if args.len() != n {
        return Err(VmError::BadArguments(format!(
            "{}() takes {} argument(s), got {}",
            b.name(),
            n,
            args.len()
        )));
    }
    Ok(())
}

fn extreme(b: Builtin, args: Vec<Value>, want: Ordering) -> Result<Value, VmError> {
    let items = match args.as_slice() {
        [Value::List(items)] => items.clone(),
        _ => args,
    };
    let mut iter = items.into_iter();
    let mut best = iter
        .next()
        .ok_or_else(|| VmError::BadArguments(format!("{}() of an empty sequence", b.name())))?;
    for item in iter {
        if item.compare(&best)? == want {
            best = item;
        }
    }
    Ok(best)
}

fn digest_input(v: &Value) -> Vec<u8> {
    match v {
        Value::Str(s) => s.as_bytes().to_vec(),
        other => encode(other).into_bytes(),
    }
}

/// Evaluate a builtin that needs nothing beyond its arguments.
pub fn call_pure(b: Builtin, args: Vec<Value>) -> Result<Value, VmError> {
    match b {
        Builtin::Len => {
            arity(b, &args, 1)?;
            let n = match &args[0] {
                Value::Str(s) => s.chars().count(),
                Value::List(l) => l.len(),
                Value::Map(m) => m.len(),
                other => return Err(VmError::type_error(format!("len() of {}", other.type_name()))),
            };
            Ok(Value::Int(n as i64))
        }
        Builtin::Str => {
            arity(b, &args, 1)?;
            Ok(Value::Str(args[0].to_string()))
        }
        Builtin::Int => {
            arity(b, &args, 1)?;
            match &args[0] {
                Value::Int(i) => Ok(Value::Int(*i)),
                Value::Bool(v) => Ok(Value::Int(*v as i64)),
                Value::Decimal(d) => d
                    .with_scale(0)
                    .to_i64()
                    .map(Value::Int)
                    .ok_or_else(|| VmError::Value(crate::codec::ValueError::Overflow)),
                Value::Str(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::Int)
                    .map_err(|_| VmError::type_error(format!("invalid int literal {:?}", s))),
                other => Err(VmError::type_error(format!("int() of {}", other.type_name()))),
            }
        }
        Builtin::Decimal => {
            arity(b, &args, 1)?;
            match &args[0] {
                Value::Int(i) => Ok(Value::decimal(BigDecimal::from(*i))?),
                Value::Decimal(d) => Ok(Value::Decimal(d.clone())),
                Value::Str(s) => Ok(Value::parse_decimal(s)?),
                other => Err(VmError::type_error(format!("decimal() of {}", other.type_name()))),
            }
        }
        Builtin::Abs => {
            arity(b, &args, 1)?;
            match &args[0] {
                Value::Int(i) => i
                    .checked_abs()
                    .map(Value::Int)
                    .ok_or(VmError::Value(crate::codec::ValueError::Overflow)),
                Value::Decimal(d) => Ok(Value::Decimal(d.abs())),
                other => Err(VmError::type_error(format!("abs() of {}", other.type_name()))),
            }
        }
        Builtin::Min => extreme(b, args, Ordering::Less),
        Builtin::Max => extreme(b, args, Ordering::Greater),
        Builtin::Keys => {
            arity(b, &args, 1)?;
            match &args[0] {
                Value::Map(m) => Ok(Value::List(m.keys().cloned().map(Value::Str).collect())),
                other => Err(VmError::type_error(format!("keys() of {}", other.type_name()))),
            }
        }
        Builtin::Contains => {
            arity(b, &args, 2)?;
            let found = match (&args[0], &args[1]) {
                (Value::List(l), needle) => l.iter().any(|v| v == needle),
                (Value::Map(m), Value::Str(k)) => m.contains_key(k),
                (Value::Str(s), Value::Str(sub)) => s.contains(sub.as_str()),
                (coll, needle) => {
                    return Err(VmError::type_error(format!(
                        "contains() of {} in {}",
                        needle.type_name(),
                        coll.type_name()
                    )))
                }
            };
            Ok(Value::Bool(found))
        }
        Builtin::Append => {
            arity(b, &args, 2)?;
            let mut it = args.into_iter();
            match (it.next(), it.next()) {
                (Some(Value::List(mut l)), Some(item)) => {
                    l.push(item);
                    Ok(Value::List(l))
                }
                (Some(other), _) => Err(VmError::type_error(format!("append() to {}", other.type_name()))),
                _ => Err(VmError::BadArguments("append() takes 2 arguments".into())),
            }
        }
        Builtin::Sha3 => {
            arity(b, &args, 1)?;
            Ok(Value::Str(hash_bytes(&digest_input(&args[0]))))
        }
        Builtin::Sha256 => {
            arity(b, &args, 1)?;
            Ok(Value::Str(sha256_hex(&digest_input(&args[0]))))
        }
        Builtin::Now | Builtin::RandInt | Builtin::IsOwner | Builtin::Deploy => {
            Err(VmError::Restricted(format!("{}() needs the execution environment", b.name())))
        }
    }
}
