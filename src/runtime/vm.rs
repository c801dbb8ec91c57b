//! Stack interpreter for compiled contracts.
//!
//! The VM owns nothing persistent: state goes through the borrowed `StateDriver`,
//! code through the `ModuleLoader`, cost through the `Meter`. Every instruction is
//! charged before it runs, and every value it produces is charged for its size
//! and held to `MAX_VALUE_BYTES` / `MAX_VALUE_DEPTH`.

use crate::codec::Value;
use crate::compiler::compile;
use crate::runtime::bytecode::{ArithOp, CompiledUnit, CtxField, Op, UnOp, Visibility};
use crate::runtime::context::{ContextStack, Environment};
use crate::runtime::metering::{CostClass, Meter};
use crate::runtime::program_loader::ModuleLoader;
use crate::runtime::runtime_types::{CallArgs, VmError};
use crate::runtime::stdlib::{self, Builtin};
use crate::state::{make_key, StateDriver};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::trace;

/// Nested function frames (local or cross-contract) allowed per execution.
pub const MAX_CALL_DEPTH: usize = 32;

/// Largest value, by `Value::footprint`, an execution may produce.
pub const MAX_VALUE_BYTES: usize = 1 << 20;

/// Deepest list/map nesting an execution may produce.
pub const MAX_VALUE_DEPTH: usize = 64;

/// The only contract allowed to call `deploy`.
pub const SUBMISSION_CONTRACT: &str = "submission";

pub struct Vm<'a> {
    driver: &'a mut StateDriver,
    loader: &'a mut ModuleLoader,
    meter: &'a mut Meter,
    env: &'a Environment,
    ctx: ContextStack,
    rng: ChaCha20Rng,
    frames: usize,
}

fn op_class(op: &Op) -> CostClass {
    match op {
        Op::VarGet(_) | Op::HashGet { .. } | Op::ForeignGet { .. } | Op::Ctx(CtxField::Owner) => CostClass::StateRead,
        Op::VarSet(_) | Op::HashSet { .. } => CostClass::StateWrite,
        Op::CallBuiltin { builtin, .. } => builtin.cost_class(),
        Op::CallExternal(_) => CostClass::ExternalCall,
        _ => CostClass::Op,
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => chars.all(|c| c.is_ascii_alphanumeric() || c == '_'),
        _ => false,
    }
}

fn bad_bytecode(msg: impl Into<String>) -> VmError {
    VmError::InvalidBytecode(msg.into())
}

impl<'a> Vm<'a> {
    pub fn new(
        driver: &'a mut StateDriver,
        loader: &'a mut ModuleLoader,
        meter: &'a mut Meter,
        env: &'a Environment,
        signer: &str,
    ) -> Self {
        Self {
            driver,
            loader,
            meter,
            env,
            ctx: ContextStack::new(signer),
            rng: ChaCha20Rng::from_seed(env.seed),
            frames: 0,
        }
    }

    pub fn context(&self) -> &ContextStack {
        &self.ctx
    }

    /// Entry point for a transaction: `contract.function(**args)` with the signer as caller.
    pub fn call(&mut self, contract: &str, function: &str, args: CallArgs) -> Result<Value, VmError> {
        self.enter(contract, function, args, None, false)
    }

    fn enter(
        &mut self,
        contract: &str,
        function: &str,
        args: CallArgs,
        caller: Option<String>,
        constructing: bool,
    ) -> Result<Value, VmError> {
        let unit = self.loader.resolve(contract, self.driver)?;
        let (idx, func) = unit.function(function).ok_or_else(|| VmError::FunctionNotFound {
            contract: contract.to_string(),
            function: function.to_string(),
        })?;

        let allowed = match func.visibility {
            Visibility::Export => true,
            Visibility::Construct => constructing,
            Visibility::Private => false,
        };
        if !allowed {
            return Err(VmError::NotExported { contract: contract.to_string(), function: function.to_string() });
        }

        let caller = caller.unwrap_or_else(|| self.ctx.this().to_string());
        if !constructing {
            if let Some(owner) = self.driver.get_owner(contract).map_err(VmError::storage)? {
                if owner != caller {
                    return Err(VmError::NotOwner(contract.to_string()));
                }
            }
        }

        let locals = bind_args(&unit, idx, args)?;
        trace!(contract, function, caller = %caller, "enter");
        self.ctx.push_as(contract, caller);
        let result = self.run(&unit, idx, locals);
        self.ctx.pop();
        result
    }

    fn run(&mut self, unit: &Arc<CompiledUnit>, idx: usize, mut locals: Vec<Value>) -> Result<Value, VmError> {
        if self.frames >= MAX_CALL_DEPTH {
            return Err(VmError::CallDepth(MAX_CALL_DEPTH));
        }
        self.frames += 1;
        let result = self.exec(unit, idx, &mut locals);
        self.frames -= 1;
        result
    }

    fn exec(&mut self, unit: &Arc<CompiledUnit>, idx: usize, locals: &mut [Value]) -> Result<Value, VmError> {
        let func = unit.functions.get(idx).ok_or_else(|| bad_bytecode(format!("no function #{}", idx)))?;
        let mut stack: Vec<Value> = Vec::new();
        let mut pc = 0usize;

        loop {
            let op = *func
                .code
                .get(pc)
                .ok_or_else(|| bad_bytecode(format!("{} ran past its end", func.name)))?;
            pc += 1;
            self.meter.charge(op_class(&op))?;

            match op {
                Op::Const(i) => {
                    let c = unit.consts.get(i as usize).ok_or_else(|| bad_bytecode("constant out of range"))?;
                    self.push(&mut stack, c.to_value())?;
                }
                Op::Pop => {
                    pop(&mut stack)?;
                }
                Op::LoadLocal(i) => {
                    let v = locals.get(i as usize).ok_or_else(|| bad_bytecode("local out of range"))?.clone();
                    self.push(&mut stack, v)?;
                }
                Op::StoreLocal(i) => {
                    let v = pop(&mut stack)?;
                    *locals.get_mut(i as usize).ok_or_else(|| bad_bytecode("local out of range"))? = v;
                }
                Op::MakeList(n) => {
                    let items = pop_n(&mut stack, n as usize)?;
                    self.push(&mut stack, Value::List(items))?;
                }
                Op::MakeMap(n) => {
                    let flat = pop_n(&mut stack, n as usize * 2)?;
                    let mut map = BTreeMap::new();
                    let mut it = flat.into_iter();
                    while let (Some(k), Some(v)) = (it.next(), it.next()) {
                        match k {
                            Value::Str(k) => {
                                map.insert(k, v);
                            }
                            other => {
                                return Err(VmError::type_error(format!(
                                    "map keys must be str, got {}",
                                    other.type_name()
                                )))
                            }
                        }
                    }
                    self.push(&mut stack, Value::Map(map))?;
                }
                Op::GetItem => {
                    let key = pop(&mut stack)?;
                    let coll = pop(&mut stack)?;
                    self.push(&mut stack, get_item(&coll, &key)?)?;
                }
                Op::SetItem(slot) => {
                    let value = pop(&mut stack)?;
                    let key = pop(&mut stack)?;
                    let target = locals.get_mut(slot as usize).ok_or_else(|| bad_bytecode("local out of range"))?;
                    set_item(target, key, value)?;
                    self.account(target)?;
                }
                Op::Unary(UnOp::Neg) => {
                    let v = pop(&mut stack)?;
                    self.push(&mut stack, v.neg()?)?;
                }
                Op::Unary(UnOp::Not) => {
                    let v = pop(&mut stack)?;
                    stack.push(Value::Bool(!v.is_truthy()));
                }
                Op::Binary(op) => {
                    let r = pop(&mut stack)?;
                    let l = pop(&mut stack)?;
                    self.push(&mut stack, binary(op, &l, &r)?)?;
                }
                Op::Jump(t) => pc = t as usize,
                Op::JumpIfFalse(t) => {
                    if !pop(&mut stack)?.is_truthy() {
                        pc = t as usize;
                    }
                }
                Op::JumpIfFalseKeep(t) => {
                    if !peek(&stack)?.is_truthy() {
                        pc = t as usize;
                    } else {
                        pop(&mut stack)?;
                    }
                }
                Op::JumpIfTrueKeep(t) => {
                    if peek(&stack)?.is_truthy() {
                        pc = t as usize;
                    } else {
                        pop(&mut stack)?;
                    }
                }
                Op::Ctx(field) => {
                    let v = match field {
                        CtxField::Signer => Value::str(self.ctx.signer()),
                        CtxField::Caller => Value::str(self.ctx.caller()),
                        CtxField::This => Value::str(self.ctx.this()),
                        CtxField::Owner => self.owner_of_this()?.map(Value::Str).unwrap_or(Value::Null),
                    };
                    self.push(&mut stack, v)?;
                }
                Op::VarGet(slot) => {
                    let name = unit.variables.get(slot as usize).ok_or_else(|| bad_bytecode("variable out of range"))?;
                    let key = make_key(&unit.name, name, &[])?;
                    let v = self.read(&key)?.unwrap_or(Value::Null);
                    self.push(&mut stack, v)?;
                }
                Op::VarSet(slot) => {
                    let name = unit.variables.get(slot as usize).ok_or_else(|| bad_bytecode("variable out of range"))?;
                    let key = make_key(&unit.name, name, &[])?;
                    let v = pop(&mut stack)?;
                    self.driver.set(&key, &v);
                    stack.push(Value::Null);
                }
                Op::HashGet { slot, keys } => {
                    let def = unit.hashes.get(slot as usize).ok_or_else(|| bad_bytecode("hash out of range"))?;
                    let parts = pop_n(&mut stack, keys as usize)?;
                    let key = make_key(&unit.name, &def.name, &parts)?;
                    let v = self.read(&key)?.unwrap_or_else(|| def.default.to_value());
                    self.push(&mut stack, v)?;
                }
                Op::HashSet { slot, keys } => {
                    let def = unit.hashes.get(slot as usize).ok_or_else(|| bad_bytecode("hash out of range"))?;
                    let value = pop(&mut stack)?;
                    let parts = pop_n(&mut stack, keys as usize)?;
                    let key = make_key(&unit.name, &def.name, &parts)?;
                    self.driver.set(&key, &value);
                }
                Op::ForeignGet { slot, keys } => {
                    let def = unit.foreign.get(slot as usize).ok_or_else(|| bad_bytecode("foreign out of range"))?;
                    let parts = pop_n(&mut stack, keys as usize)?;
                    let key = make_key(&def.contract, &def.variable, &parts)?;
                    let v = self.read(&key)?.unwrap_or(Value::Null);
                    self.push(&mut stack, v)?;
                }
                Op::CallBuiltin { builtin, argc } => {
                    let args = pop_n(&mut stack, argc as usize)?;
                    let v = self.builtin(builtin, args)?;
                    self.push(&mut stack, v)?;
                }
                Op::CallLocal { func: target, argc } => {
                    let args = pop_n(&mut stack, argc as usize)?;
                    let callee = unit
                        .functions
                        .get(target as usize)
                        .ok_or_else(|| bad_bytecode("function out of range"))?;
                    let mut callee_locals = args;
                    callee_locals.resize(callee.locals as usize, Value::Null);
                    let v = self.run(unit, target as usize, callee_locals)?;
                    stack.push(v);
                }
                Op::CallExternal(i) => {
                    let call = unit.calls.get(i as usize).ok_or_else(|| bad_bytecode("call out of range"))?;
                    if !unit.imports.contains(&call.contract) {
                        return Err(VmError::Restricted(format!("{} does not import {}", unit.name, call.contract)));
                    }
                    let values = pop_n(&mut stack, call.arg_names.len())?;
                    let args: CallArgs = call.arg_names.iter().cloned().zip(values).collect();
                    let v = self.enter(&call.contract, &call.function, args, None, false)?;
                    stack.push(v);
                }
                Op::Assert { has_msg } => {
                    let msg = if has_msg { Some(pop(&mut stack)?) } else { None };
                    let cond = pop(&mut stack)?;
                    if !cond.is_truthy() {
                        let msg = msg.map(|m| m.to_string()).unwrap_or_else(|| "assertion failed".to_string());
                        return Err(VmError::AssertionFailed(msg));
                    }
                }
                Op::Return => return Ok(stack.pop().unwrap_or(Value::Null)),
            }
        }
    }

    /// Charge `v` for its size, refusing it outright past the value limits.
    fn account(&mut self, v: &Value) -> Result<(), VmError> {
        let (bytes, depth) = v.footprint();
        if bytes > MAX_VALUE_BYTES || depth > MAX_VALUE_DEPTH {
            return Err(VmError::ValueTooLarge { bytes, depth });
        }
        self.meter.charge_bytes(bytes)
    }

    fn push(&mut self, stack: &mut Vec<Value>, v: Value) -> Result<(), VmError> {
        self.account(&v)?;
        stack.push(v);
        Ok(())
    }

    fn read(&self, key: &str) -> Result<Option<Value>, VmError> {
        self.driver.get(key).map_err(VmError::storage)
    }

    fn owner_of_this(&self) -> Result<Option<String>, VmError> {
        self.driver.get_owner(self.ctx.this()).map_err(VmError::storage)
    }

    fn builtin(&mut self, b: Builtin, args: Vec<Value>) -> Result<Value, VmError> {
        match b {
            Builtin::Now => {
                expect_args(b, &args, 0, 0)?;
                Ok(self.env.now.clone().unwrap_or(Value::Null))
            }
            Builtin::RandInt => {
                expect_args(b, &args, 2, 2)?;
                match (&args[0], &args[1]) {
                    (Value::Int(lo), Value::Int(hi)) if lo <= hi => Ok(Value::Int(self.rng.gen_range(*lo..=*hi))),
                    _ => Err(VmError::BadArguments("rand_int() takes two ints, low <= high".into())),
                }
            }
            Builtin::IsOwner => {
                expect_args(b, &args, 0, 0)?;
                let owner = self.owner_of_this()?;
                Ok(Value::Bool(owner.as_deref() == Some(self.ctx.caller())))
            }
            Builtin::Deploy => {
                if self.ctx.this() != SUBMISSION_CONTRACT {
                    return Err(VmError::Restricted(format!("deploy() called from {}", self.ctx.this())));
                }
                expect_args(b, &args, 2, 4)?;
                let mut it = args.into_iter();
                let name = it.next().unwrap_or(Value::Null);
                let code = it.next().unwrap_or(Value::Null);
                let owner = it.next().unwrap_or(Value::Null);
                let ctor_args = it.next().unwrap_or(Value::Null);

                let (Value::Str(name), Value::Str(code)) = (name, code) else {
                    return Err(VmError::BadArguments("deploy() takes a str name and str code".into()));
                };
                let owner = match owner {
                    Value::Null => None,
                    Value::Str(o) => Some(o),
                    other => return Err(VmError::type_error(format!("owner must be str, got {}", other.type_name()))),
                };
                let ctor_args = match ctor_args {
                    Value::Null => CallArgs::new(),
                    Value::Map(m) => m,
                    other => {
                        return Err(VmError::type_error(format!(
                            "constructor arguments must be a map, got {}",
                            other.type_name()
                        )))
                    }
                };
                let author = self.ctx.caller().to_string();
                self.deploy(&name, &code, owner.as_deref(), &author, ctor_args)?;
                Ok(Value::Null)
            }
            other => stdlib::call_pure(other, args),
        }
    }

    /// Compile, store and construct a new contract. Existing names are never overwritten.
    pub fn deploy(
        &mut self,
        name: &str,
        source: &str,
        owner: Option<&str>,
        author: &str,
        ctor_args: CallArgs,
    ) -> Result<(), VmError> {
        if !is_identifier(name) || name.starts_with("__") {
            return Err(VmError::BadArguments(format!("invalid contract name {:?}", name)));
        }
        if self.driver.contract_exists(name).map_err(VmError::storage)? {
            return Err(VmError::ContractExists(name.to_string()));
        }
        let unit = compile(name, source).map_err(|e| VmError::Compile(e.to_string()))?;
        let bytes = unit.to_bytes().map_err(|e| bad_bytecode(e.to_string()))?;
        self.driver.set_contract(name, source, &bytes, owner, author);
        self.loader.invalidate(name);
        trace!(contract = name, author, "deployed");

        if let Some((_, ctor)) = unit.constructor() {
            self.enter(name, &ctor.name, ctor_args, Some(author.to_string()), true)?;
        }
        Ok(())
    }
}

fn bind_args(unit: &CompiledUnit, idx: usize, mut args: CallArgs) -> Result<Vec<Value>, VmError> {
    let func = &unit.functions[idx];
    if let Some(unknown) = args.keys().find(|k| !func.params.contains(k)) {
        return Err(VmError::BadArguments(format!("{}() got an unexpected argument {}", func.name, unknown)));
    }
    let mut locals = Vec::with_capacity(func.locals as usize);
    for (i, param) in func.params.iter().enumerate() {
        let v = match args.remove(param) {
            Some(v) => v,
            None => match func.defaults.get(i).and_then(|d| d.as_ref()) {
                Some(d) => d.to_value(),
                None => return Err(VmError::BadArguments(format!("{}() missing argument {}", func.name, param))),
            },
        };
        locals.push(v);
    }
    locals.resize(func.locals as usize, Value::Null);
    Ok(locals)
}

fn expect_args(b: Builtin, args: &[Value], min: usize, max: usize) -> Result<(), VmError> {
    if args.len() < min || args.len() > max {
        return Err(VmError::BadArguments(format!("{}() got {} arguments", b.name(), args.len())));
    }
    Ok(())
}

fn pop(stack: &mut Vec<Value>) -> Result<Value, VmError> {
    stack.pop().ok_or_else(|| bad_bytecode("stack underflow"))
}

fn peek(stack: &[Value]) -> Result<&Value, VmError> {
    stack.last().ok_or_else(|| bad_bytecode("stack underflow"))
}

fn pop_n(stack: &mut Vec<Value>, n: usize) -> Result<Vec<Value>, VmError> {
    if stack.len() < n {
        return Err(bad_bytecode("stack underflow"));
    }
    Ok(stack.split_off(stack.len() - n))
}

fn list_index(len: usize, key: &Value) -> Result<usize, VmError> {
    let i = key
        .as_int()
        .ok_or_else(|| VmError::type_error(format!("list indices must be int, got {}", key.type_name())))?;
    let resolved = if i < 0 { len as i64 + i } else { i };
    if resolved < 0 || resolved >= len as i64 {
        return Err(VmError::BadArguments(format!("list index {} out of range", i)));
    }
    Ok(resolved as usize)
}

fn get_item(coll: &Value, key: &Value) -> Result<Value, VmError> {
    match (coll, key) {
        (Value::List(l), _) => Ok(l[list_index(l.len(), key)?].clone()),
        (Value::Map(m), Value::Str(k)) => Ok(m.get(k).cloned().unwrap_or(Value::Null)),
        (Value::Str(s), _) => {
            let chars: Vec<char> = s.chars().collect();
            Ok(Value::Str(chars[list_index(chars.len(), key)?].to_string()))
        }
        (c, k) => Err(VmError::type_error(format!("cannot index {} with {}", c.type_name(), k.type_name()))),
    }
}

fn set_item(target: &mut Value, key: Value, value: Value) -> Result<(), VmError> {
    match (target, key) {
        (Value::List(l), key) => {
            let i = list_index(l.len(), &key)?;
            l[i] = value;
            Ok(())
        }
        (Value::Map(m), Value::Str(k)) => {
            m.insert(k, value);
            Ok(())
        }
        (t, k) => Err(VmError::type_error(format!("cannot assign into {} with {}", t.type_name(), k.type_name()))),
    }
}

fn binary(op: ArithOp, l: &Value, r: &Value) -> Result<Value, VmError> {
    use std::cmp::Ordering::*;
    Ok(match op {
        ArithOp::Add => l.add(r)?,
        ArithOp::Sub => l.sub(r)?,
        ArithOp::Mul => l.mul(r)?,
        ArithOp::Div => l.div(r)?,
        ArithOp::FloorDiv => l.floor_div(r)?,
        ArithOp::Mod => l.rem(r)?,
        ArithOp::Eq => Value::Bool(l == r),
        ArithOp::Ne => Value::Bool(l != r),
        ArithOp::Lt => Value::Bool(l.compare(r)? == Less),
        ArithOp::Le => Value::Bool(l.compare(r)? != Greater),
        ArithOp::Gt => Value::Bool(l.compare(r)? == Greater),
        ArithOp::Ge => Value::Bool(l.compare(r)? != Less),
    })
}
