//! Lowering from the syntax tree to a `CompiledUnit`.
//!
//! Lint rules are enforced here, during lowering, so `lint` and `compile` can
//! never disagree: every violation is collected (with its line) and compilation
//! fails if any were found.

use super::ast::*;
use crate::codec::Value;
use crate::runtime::bytecode::{
    ArithOp, CompiledUnit, Const, CtxField, ExternalCall, ForeignDef, Function, HashDef, Op, UnOp,
    Visibility, BYTECODE_VERSION,
};
use crate::runtime::stdlib::Builtin;
use std::collections::HashMap;

/// Max arguments to one call; argc travels as a byte.
const MAX_ARGS: usize = u8::MAX as usize;

#[derive(Debug, Clone, Copy)]
enum Symbol {
    Import,
    Var(u32),
    Hash(u32),
    Foreign { slot: u32, is_hash: bool },
    Function(u32),
}

struct FnCtx {
    locals: HashMap<String, u32>,
    next_local: u32,
    code: Vec<Op>,
}

impl FnCtx {
    fn here(&self) -> u32 {
        self.code.len() as u32
    }

    fn emit(&mut self, op: Op) -> usize {
        self.code.push(op);
        self.code.len() - 1
    }

    fn patch(&mut self, at: usize) {
        let target = self.here();
        match &mut self.code[at] {
            Op::Jump(t) | Op::JumpIfFalse(t) | Op::JumpIfFalseKeep(t) | Op::JumpIfTrueKeep(t) => *t = target,
            _ => {}
        }
    }
}

pub struct Codegen<'m> {
    name: String,
    module: &'m Module,
    errors: Vec<String>,
    symbols: HashMap<String, Symbol>,
    imports: Vec<String>,
    variables: Vec<String>,
    hashes: Vec<HashDef>,
    foreign: Vec<ForeignDef>,
    consts: Vec<Const>,
    calls: Vec<ExternalCall>,
    decls: Vec<&'m FnDecl>,
}

impl<'m> Codegen<'m> {
    pub fn new(name: &str, module: &'m Module) -> Self {
        Self {
            name: name.to_string(),
            module,
            errors: Vec::new(),
            symbols: HashMap::new(),
            imports: Vec::new(),
            variables: Vec::new(),
            hashes: Vec::new(),
            foreign: Vec::new(),
            consts: Vec::new(),
            calls: Vec::new(),
            decls: Vec::new(),
        }
    }

    fn violation(&mut self, line: usize, msg: impl AsRef<str>) {
        self.errors.push(format!("line {}: {}", line, msg.as_ref()));
    }

    /// Lower the module. `Err` carries every violation found.
    pub fn generate(mut self) -> Result<CompiledUnit, Vec<String>> {
        self.declare_items();
        let functions: Vec<Function> = self.decls.clone().into_iter().map(|d| self.function(d)).collect();

        if !functions.iter().any(|f| f.visibility == Visibility::Export) {
            self.violation(1, "contract must export at least one function");
        }

        if !self.errors.is_empty() {
            return Err(self.errors);
        }
        Ok(CompiledUnit {
            version: BYTECODE_VERSION,
            name: self.name,
            imports: self.imports,
            variables: self.variables,
            hashes: self.hashes,
            foreign: self.foreign,
            consts: self.consts,
            functions,
            calls: self.calls,
        })
    }

    fn check_declared_name(&mut self, name: &str, line: usize) {
        if name.starts_with("__") {
            self.violation(line, format!("name {} may not start with '__'", name));
        }
        if name == "ctx" || Builtin::from_name(name).is_some() {
            self.violation(line, format!("name {} is reserved", name));
        }
    }

    fn declare_items(&mut self) {
        let module = self.module;
        let mut constructors = 0;
        for item in &module.items {
            let (name, line) = (item.name().to_string(), item.line());
            self.check_declared_name(&name, line);
            if self.symbols.contains_key(&name) {
                self.violation(line, format!("duplicate definition of {}", name));
                continue;
            }
            let symbol = match item {
                Item::Import { .. } => {
                    self.imports.push(name.clone());
                    Symbol::Import
                }
                Item::Var { .. } => {
                    self.variables.push(name.clone());
                    Symbol::Var(self.variables.len() as u32 - 1)
                }
                Item::Hash { default, .. } => {
                    let default = match default {
                        None => Const::Null,
                        Some(e) => self.literal_default(e, &name, line),
                    };
                    self.hashes.push(HashDef { name: name.clone(), default });
                    Symbol::Hash(self.hashes.len() as u32 - 1)
                }
                Item::Foreign { kind, contract, variable, .. } => {
                    let is_hash = *kind == ForeignKind::Hash;
                    self.foreign.push(ForeignDef {
                        name: name.clone(),
                        contract: contract.clone(),
                        variable: variable.clone(),
                        is_hash,
                    });
                    Symbol::Foreign { slot: self.foreign.len() as u32 - 1, is_hash }
                }
                Item::Function(decl) => {
                    if decl.kind == FnKind::Construct {
                        constructors += 1;
                        if constructors > 1 {
                            self.violation(line, "more than one constructor");
                        }
                    }
                    self.decls.push(decl);
                    Symbol::Function(self.decls.len() as u32 - 1)
                }
            };
            self.symbols.insert(name, symbol);
        }
    }

    fn literal_default(&mut self, e: &Expr, what: &str, line: usize) -> Const {
        match e.literal() {
            Some(lit) => self.literal_const(lit, line),
            None => {
                self.violation(line, format!("default for {} must be a literal", what));
                Const::Null
            }
        }
    }

    fn literal_const(&mut self, lit: &Literal, line: usize) -> Const {
        match lit {
            Literal::Null => Const::Null,
            Literal::Bool(b) => Const::Bool(*b),
            Literal::Int(i) => Const::Int(*i),
            Literal::Str(s) => Const::Str(s.clone()),
            Literal::Decimal(d) => match Value::parse_decimal(d) {
                Ok(Value::Decimal(v)) => Const::Decimal(crate::codec::value::plain_string(&v)),
                _ => {
                    self.violation(line, format!("invalid decimal literal {}", d));
                    Const::Null
                }
            },
        }
    }

    fn add_const(&mut self, c: Const) -> u32 {
        if let Some(i) = self.consts.iter().position(|x| *x == c) {
            return i as u32;
        }
        self.consts.push(c);
        self.consts.len() as u32 - 1
    }

    fn push_null(&mut self, f: &mut FnCtx) {
        let idx = self.add_const(Const::Null);
        f.emit(Op::Const(idx));
    }

    fn function(&mut self, decl: &FnDecl) -> Function {
        let mut f = FnCtx { locals: HashMap::new(), next_local: 0, code: Vec::new() };
        let mut params = Vec::new();
        let mut defaults = Vec::new();
        for p in &decl.params {
            self.declare_local(&mut f, &p.name, decl.line);
            params.push(p.name.clone());
            defaults.push(p.default.as_ref().map(|e| self.literal_default(e, &p.name, decl.line)));
        }

        self.block(&mut f, &decl.body);
        self.push_null(&mut f);
        f.emit(Op::Return);

        Function {
            name: decl.name.clone(),
            visibility: match decl.kind {
                FnKind::Export => Visibility::Export,
                FnKind::Construct => Visibility::Construct,
                FnKind::Private => Visibility::Private,
            },
            params,
            defaults,
            locals: f.next_local,
            code: f.code,
        }
    }

    fn declare_local(&mut self, f: &mut FnCtx, name: &str, line: usize) -> u32 {
        self.check_declared_name(name, line);
        if f.locals.contains_key(name) {
            self.violation(line, format!("duplicate definition of {}", name));
        } else if self.symbols.contains_key(name) {
            self.violation(line, format!("local {} shadows a contract-level declaration", name));
        }
        let slot = f.next_local;
        f.locals.insert(name.to_string(), slot);
        f.next_local += 1;
        slot
    }

    fn block(&mut self, f: &mut FnCtx, stmts: &[Stmt]) {
        for s in stmts {
            self.stmt(f, s);
        }
    }

    fn stmt(&mut self, f: &mut FnCtx, s: &Stmt) {
        let line = s.line;
        match &s.kind {
            StmtKind::Let { name, value } => {
                self.expr(f, value, line);
                let slot = self.declare_local(f, name, line);
                f.emit(Op::StoreLocal(slot));
            }
            StmtKind::Assign { name, value } => {
                self.expr(f, value, line);
                match f.locals.get(name).copied() {
                    Some(slot) => {
                        f.emit(Op::StoreLocal(slot));
                    }
                    None => {
                        match self.symbols.get(name).copied() {
                            Some(Symbol::Var(_)) => {
                                self.violation(line, format!("state variable {} is written with {}.set(...)", name, name))
                            }
                            Some(Symbol::Foreign { .. }) => {
                                self.violation(line, format!("foreign binding {} is read-only", name))
                            }
                            _ => self.violation(line, format!("assignment to undeclared local {}", name)),
                        }
                        f.emit(Op::Pop);
                    }
                }
            }
            StmtKind::IndexAssign { target, keys, value } => self.index_assign(f, target, keys, value, line),
            StmtKind::If { cond, then, otherwise } => {
                self.expr(f, cond, line);
                let jump_else = f.emit(Op::JumpIfFalse(0));
                self.block(f, then);
                if otherwise.is_empty() {
                    f.patch(jump_else);
                } else {
                    let jump_end = f.emit(Op::Jump(0));
                    f.patch(jump_else);
                    self.block(f, otherwise);
                    f.patch(jump_end);
                }
            }
            StmtKind::While { cond, body } => {
                let start = f.here();
                self.expr(f, cond, line);
                let jump_end = f.emit(Op::JumpIfFalse(0));
                self.block(f, body);
                f.emit(Op::Jump(start));
                f.patch(jump_end);
            }
            StmtKind::Return(value) => {
                match value {
                    Some(e) => self.expr(f, e, line),
                    None => self.push_null(f),
                }
                f.emit(Op::Return);
            }
            StmtKind::Assert { cond, msg } => {
                self.expr(f, cond, line);
                if let Some(m) = msg {
                    self.expr(f, m, line);
                }
                f.emit(Op::Assert { has_msg: msg.is_some() });
            }
            StmtKind::Expr(e) => {
                self.expr(f, e, line);
                f.emit(Op::Pop);
            }
        }
    }

    fn index_assign(&mut self, f: &mut FnCtx, target: &str, keys: &[Expr], value: &Expr, line: usize) {
        if let Some(slot) = f.locals.get(target).copied() {
            if keys.len() != 1 {
                self.violation(line, format!("{} takes a single index", target));
            }
            for k in keys.iter().take(1) {
                self.expr(f, k, line);
            }
            self.expr(f, value, line);
            f.emit(Op::SetItem(slot));
            return;
        }
        match self.symbols.get(target).copied() {
            Some(Symbol::Hash(slot)) => {
                if keys.len() > MAX_ARGS {
                    self.violation(line, "too many hash dimensions");
                }
                for k in keys {
                    self.expr(f, k, line);
                }
                self.expr(f, value, line);
                f.emit(Op::HashSet { slot, keys: keys.len() as u8 });
            }
            Some(Symbol::Foreign { .. }) => {
                self.violation(line, format!("foreign binding {} is read-only", target));
            }
            Some(Symbol::Var(_)) => {
                self.violation(line, format!("state variable {} cannot be indexed", target));
            }
            _ => self.violation(line, format!("assignment to undeclared name {}", target)),
        }
    }

    fn expr(&mut self, f: &mut FnCtx, e: &Expr, line: usize) {
        match e {
            Expr::Lit(lit) => {
                let c = self.literal_const(lit, line);
                let idx = self.add_const(c);
                f.emit(Op::Const(idx));
            }
            Expr::Name(name) => self.name(f, name, line),
            Expr::List(items) => {
                for item in items {
                    self.expr(f, item, line);
                }
                f.emit(Op::MakeList(items.len() as u32));
            }
            Expr::Map(entries) => {
                for (k, v) in entries {
                    self.expr(f, k, line);
                    self.expr(f, v, line);
                }
                f.emit(Op::MakeMap(entries.len() as u32));
            }
            Expr::Neg(inner) => {
                self.expr(f, inner, line);
                f.emit(Op::Unary(UnOp::Neg));
            }
            Expr::Not(inner) => {
                self.expr(f, inner, line);
                f.emit(Op::Unary(UnOp::Not));
            }
            Expr::Binary(op, l, r) => {
                self.expr(f, l, line);
                self.expr(f, r, line);
                f.emit(Op::Binary(arith(*op)));
            }
            Expr::And(l, r) => {
                self.expr(f, l, line);
                let jump = f.emit(Op::JumpIfFalseKeep(0));
                self.expr(f, r, line);
                f.patch(jump);
            }
            Expr::Or(l, r) => {
                self.expr(f, l, line);
                let jump = f.emit(Op::JumpIfTrueKeep(0));
                self.expr(f, r, line);
                f.patch(jump);
            }
            Expr::Call { name, args, kwargs } => self.call(f, name, args, kwargs, line),
            Expr::Method { object, method, args, kwargs } => self.method(f, object, method, args, kwargs, line),
            Expr::Attr { object, field } => {
                match (object.as_str(), CtxField::from_name(field)) {
                    ("ctx", Some(field)) => {
                        f.emit(Op::Ctx(field));
                    }
                    ("ctx", None) => {
                        self.violation(line, format!("ctx has no field {}", field));
                        self.push_null(f);
                    }
                    _ => {
                        self.violation(line, format!("attribute access {}.{} is not allowed", object, field));
                        self.push_null(f);
                    }
                }
            }
            Expr::Index { target, keys } => self.index(f, target, keys, line),
        }
    }

    fn name(&mut self, f: &mut FnCtx, name: &str, line: usize) {
        if let Some(slot) = f.locals.get(name).copied() {
            f.emit(Op::LoadLocal(slot));
            return;
        }
        let msg = match self.symbols.get(name) {
            Some(Symbol::Var(_)) | Some(Symbol::Foreign { is_hash: false, .. }) => {
                format!("state variable {} is read with {}.get()", name, name)
            }
            Some(Symbol::Hash(_)) | Some(Symbol::Foreign { is_hash: true, .. }) => {
                format!("hash {} is read with {}[key]", name, name)
            }
            Some(Symbol::Import) => format!("contract {} cannot be used as a value", name),
            Some(Symbol::Function(_)) => format!("function {} cannot be used as a value", name),
            None => format!("undefined name {}", name),
        };
        self.violation(line, msg);
        self.push_null(f);
    }

    fn index(&mut self, f: &mut FnCtx, target: &Expr, keys: &[Expr], line: usize) {
        if let Expr::Name(name) = target {
            if !f.locals.contains_key(name) {
                let op = match self.symbols.get(name).copied() {
                    Some(Symbol::Hash(slot)) => Some(Op::HashGet { slot, keys: keys.len() as u8 }),
                    Some(Symbol::Foreign { slot, is_hash: true }) => Some(Op::ForeignGet { slot, keys: keys.len() as u8 }),
                    _ => None,
                };
                if let Some(op) = op {
                    if keys.len() > MAX_ARGS {
                        self.violation(line, "too many hash dimensions");
                    }
                    for k in keys {
                        self.expr(f, k, line);
                    }
                    f.emit(op);
                    return;
                }
            }
        }
        if keys.len() != 1 {
            self.violation(line, "only hashes take more than one index");
        }
        self.expr(f, target, line);
        for k in keys.iter().take(1) {
            self.expr(f, k, line);
        }
        f.emit(Op::GetItem);
    }

    fn call(&mut self, f: &mut FnCtx, name: &str, args: &[Expr], kwargs: &[(String, Expr)], line: usize) {
        if f.locals.contains_key(name) {
            self.violation(line, format!("local {} is not callable", name));
            self.push_null(f);
            return;
        }
        if let Some(Symbol::Function(idx)) = self.symbols.get(name).copied() {
            self.call_local(f, idx, args, kwargs, line);
            return;
        }
        match Builtin::from_name(name) {
            Some(builtin) => {
                if !kwargs.is_empty() {
                    self.violation(line, format!("{}() takes no keyword arguments", name));
                }
                if args.len() > MAX_ARGS {
                    self.violation(line, "too many arguments");
                }
                for a in args {
                    self.expr(f, a, line);
                }
                f.emit(Op::CallBuiltin { builtin, argc: args.len() as u8 });
            }
            None => {
                self.violation(line, format!("call to undefined or restricted name {}", name));
                self.push_null(f);
            }
        }
    }

    fn call_local(&mut self, f: &mut FnCtx, idx: u32, args: &[Expr], kwargs: &[(String, Expr)], line: usize) {
        let decl = self.decls[idx as usize];
        if decl.kind == FnKind::Construct {
            self.violation(line, format!("constructor {} cannot be called", decl.name));
        }
        if args.len() > decl.params.len() {
            self.violation(line, format!("{}() takes {} arguments, got {}", decl.name, decl.params.len(), args.len()));
        }
        for (k, _) in kwargs {
            if !decl.params.iter().any(|p| &p.name == k) {
                self.violation(line, format!("{}() got an unexpected argument {}", decl.name, k));
            }
        }
        for (i, p) in decl.params.iter().enumerate() {
            let by_kw = kwargs.iter().find(|(k, _)| *k == p.name).map(|(_, e)| e);
            match (args.get(i), by_kw) {
                (Some(_), Some(_)) => {
                    self.violation(line, format!("{}() got multiple values for {}", decl.name, p.name));
                    self.push_null(f);
                }
                (Some(e), None) | (None, Some(e)) => self.expr(f, e, line),
                (None, None) => match &p.default {
                    Some(d) => {
                        // non-literal defaults are reported once, at the declaration
                        let c = match d.literal() {
                            Some(lit) => self.literal_const(lit, line),
                            None => Const::Null,
                        };
                        let ci = self.add_const(c);
                        f.emit(Op::Const(ci));
                    }
                    None => {
                        self.violation(line, format!("{}() missing argument {}", decl.name, p.name));
                        self.push_null(f);
                    }
                },
            }
        }
        f.emit(Op::CallLocal { func: idx, argc: decl.params.len() as u8 });
    }

    fn method(
        &mut self,
        f: &mut FnCtx,
        object: &str,
        method: &str,
        args: &[Expr],
        kwargs: &[(String, Expr)],
        line: usize,
    ) {
        if f.locals.contains_key(object) {
            self.violation(line, format!("local {} has no methods", object));
            self.push_null(f);
            return;
        }
        match (self.symbols.get(object).copied(), method) {
            (Some(Symbol::Var(slot)), "get") if args.is_empty() && kwargs.is_empty() => {
                f.emit(Op::VarGet(slot));
            }
            (Some(Symbol::Var(slot)), "set") if args.len() == 1 && kwargs.is_empty() => {
                self.expr(f, &args[0], line);
                f.emit(Op::VarSet(slot));
            }
            (Some(Symbol::Foreign { slot, is_hash: false }), "get") if args.is_empty() && kwargs.is_empty() => {
                f.emit(Op::ForeignGet { slot, keys: 0 });
            }
            (Some(Symbol::Foreign { .. }), "set") => {
                self.violation(line, format!("foreign binding {} is read-only", object));
                self.push_null(f);
            }
            (Some(Symbol::Import), _) => {
                if !args.is_empty() {
                    self.violation(line, format!("calls to {}.{} take keyword arguments only", object, method));
                }
                for (_, e) in kwargs {
                    self.expr(f, e, line);
                }
                self.calls.push(ExternalCall {
                    contract: object.to_string(),
                    function: method.to_string(),
                    arg_names: kwargs.iter().map(|(k, _)| k.clone()).collect(),
                });
                f.emit(Op::CallExternal(self.calls.len() as u32 - 1));
            }
            (None, _) if object != "ctx" => {
                self.violation(line, format!("contract {} is not imported", object));
                self.push_null(f);
            }
            _ => {
                self.violation(line, format!("invalid call {}.{}(...)", object, method));
                self.push_null(f);
            }
        }
    }
}

fn arith(op: BinOp) -> ArithOp {
    match op {
        BinOp::Add => ArithOp::Add,
        BinOp::Sub => ArithOp::Sub,
        BinOp::Mul => ArithOp::Mul,
        BinOp::Div => ArithOp::Div,
        BinOp::FloorDiv => ArithOp::FloorDiv,
        BinOp::Mod => ArithOp::Mod,
        BinOp::Eq => ArithOp::Eq,
        BinOp::Ne => ArithOp::Ne,
        BinOp::Lt => ArithOp::Lt,
        BinOp::Le => ArithOp::Le,
        BinOp::Gt => ArithOp::Gt,
        BinOp::Ge => ArithOp::Ge,
    }
}
