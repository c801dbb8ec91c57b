//! Compiled contract form.
//!
//! A `CompiledUnit` is what the loader caches and what gets stored (bincode, hex)
//! under `<name>.__compiled__`. Instructions address everything by index into
//! the unit's tables so the blob stays small.

use crate::codec::Value;
use crate::runtime::stdlib::Builtin;
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Bumped whenever the instruction set or its cost mapping changes.
pub const BYTECODE_VERSION: u16 = 2;

/// Constant pool entry. Decimals travel as their plain text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Const {
    Null,
    Bool(bool),
    Int(i64),
    Decimal(String),
    Str(String),
}

impl Const {
    pub fn to_value(&self) -> Value {
        match self {
            Const::Null => Value::Null,
            Const::Bool(b) => Value::Bool(*b),
            Const::Int(i) => Value::Int(*i),
            // validated at compile time; fall back to null on a corrupt blob
            Const::Decimal(d) => Value::parse_decimal(d).unwrap_or(Value::Null),
            Const::Str(s) => Value::Str(s.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CtxField {
    Signer,
    Caller,
    This,
    Owner,
}

impl CtxField {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "signer" => CtxField::Signer,
            "caller" => CtxField::Caller,
            "this" => CtxField::This,
            "owner" => CtxField::Owner,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    Const(u32),
    Pop,
    LoadLocal(u32),
    StoreLocal(u32),
    MakeList(u32),
    /// pops `n` key/value pairs
    MakeMap(u32),
    /// `coll[key]` on a local value
    GetItem,
    /// pops value, key; updates the collection held in the local slot
    SetItem(u32),
    Unary(UnOp),
    Binary(ArithOp),
    Jump(u32),
    /// pops the condition
    JumpIfFalse(u32),
    /// short-circuit `and`: jumps keeping the value, otherwise pops it
    JumpIfFalseKeep(u32),
    /// short-circuit `or`
    JumpIfTrueKeep(u32),
    Ctx(CtxField),
    VarGet(u32),
    /// pops value, pushes null
    VarSet(u32),
    HashGet { slot: u32, keys: u8 },
    /// pops value then keys
    HashSet { slot: u32, keys: u8 },
    ForeignGet { slot: u32, keys: u8 },
    CallBuiltin { builtin: Builtin, argc: u8 },
    /// always called with the full parameter list
    CallLocal { func: u32, argc: u8 },
    CallExternal(u32),
    Assert { has_msg: bool },
    Return,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    Export,
    Construct,
    Private,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub visibility: Visibility,
    pub params: Vec<String>,
    pub defaults: Vec<Option<Const>>,
    /// total local slots, params first
    pub locals: u32,
    pub code: Vec<Op>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashDef {
    pub name: String,
    pub default: Const,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignDef {
    pub name: String,
    pub contract: String,
    pub variable: String,
    pub is_hash: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalCall {
    pub contract: String,
    pub function: String,
    pub arg_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledUnit {
    pub version: u16,
    pub name: String,
    pub imports: Vec<String>,
    pub variables: Vec<String>,
    pub hashes: Vec<HashDef>,
    pub foreign: Vec<ForeignDef>,
    pub consts: Vec<Const>,
    pub functions: Vec<Function>,
    pub calls: Vec<ExternalCall>,
}

impl CompiledUnit {
    pub fn function(&self, name: &str) -> Option<(usize, &Function)> {
        self.functions.iter().enumerate().find(|(_, f)| f.name == name)
    }

    pub fn constructor(&self) -> Option<(usize, &Function)> {
        self.functions.iter().enumerate().find(|(_, f)| f.visibility == Visibility::Construct)
    }

    pub fn exported(&self) -> impl Iterator<Item = &Function> {
        self.functions.iter().filter(|f| f.visibility == Visibility::Export)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let unit: CompiledUnit = bincode::deserialize(bytes)?;
        anyhow::ensure!(
            unit.version == BYTECODE_VERSION,
            "bytecode version {} unsupported (expected {})",
            unit.version,
            BYTECODE_VERSION
        );
        Ok(unit)
    }
}
