//! Contract compiler: source text to `CompiledUnit`.
//!
//! - `lexer` / `parser`: source to syntax tree
//! - `codegen`: syntax tree to bytecode, enforcing the lint rules
//!
//! `lint` and `compile` share one pipeline; `lint` just reports instead of failing.

pub mod ast;
pub mod codegen;
pub mod lexer;
pub mod parser;

use crate::runtime::bytecode::CompiledUnit;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("syntax error on line {line}: {msg}")]
    Syntax { line: usize, msg: String },

    #[error("{}", .0.join("; "))]
    Lint(Vec<String>),
}

impl CompileError {
    pub fn violations(&self) -> Vec<String> {
        match self {
            CompileError::Syntax { .. } => vec![self.to_string()],
            CompileError::Lint(v) => v.clone(),
        }
    }
}

pub fn compile(name: &str, source: &str) -> Result<CompiledUnit, CompileError> {
    let module = parser::parse(source)?;
    codegen::Codegen::new(name, &module).generate().map_err(CompileError::Lint)
}

/// Every violation in `source`; empty means the contract compiles.
pub fn lint(source: &str) -> Vec<String> {
    match compile("lint", source) {
        Ok(_) => Vec::new(),
        Err(e) => e.violations(),
    }
}
