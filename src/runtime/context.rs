//! Contract context: who signed, who called, who is running.

use crate::codec::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Frame {
    this: String,
    caller: String,
}

/// Call stack threaded through one execution. The signer sits below every frame.
#[derive(Debug, Clone)]
pub struct ContextStack {
    signer: String,
    frames: Vec<Frame>,
}

impl ContextStack {
    pub fn new(signer: impl Into<String>) -> Self {
        Self { signer: signer.into(), frames: Vec::new() }
    }

    pub fn signer(&self) -> &str {
        &self.signer
    }

    pub fn this(&self) -> &str {
        self.frames.last().map(|f| f.this.as_str()).unwrap_or(&self.signer)
    }

    pub fn caller(&self) -> &str {
        self.frames.last().map(|f| f.caller.as_str()).unwrap_or(&self.signer)
    }

    /// Enter `contract`; the current `this` becomes its caller.
    pub fn push(&mut self, contract: impl Into<String>) {
        let caller = self.this().to_string();
        self.push_as(contract, caller);
    }

    /// Enter `contract` on behalf of an explicit caller (constructors run as the submitter).
    pub fn push_as(&mut self, contract: impl Into<String>, caller: impl Into<String>) {
        self.frames.push(Frame { this: contract.into(), caller: caller.into() });
    }

    pub fn pop(&mut self) {
        self.frames.pop();
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

/// Per-run environment exposed through `now()` and `rand_int()`.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    pub now: Option<Value>,
    pub seed: [u8; 32],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signer_is_caller_at_entry() {
        let mut ctx = ContextStack::new("alice");
        assert_eq!(ctx.caller(), "alice");
        ctx.push("token");
        assert_eq!(ctx.this(), "token");
        assert_eq!(ctx.caller(), "alice");
        ctx.push("currency");
        assert_eq!(ctx.caller(), "token");
        assert_eq!(ctx.signer(), "alice");
        assert_eq!(ctx.depth(), 2);
        ctx.pop();
        ctx.pop();
        assert_eq!(ctx.this(), "alice");
    }

    #[test]
    fn test_push_as_overrides_caller() {
        let mut ctx = ContextStack::new("alice");
        ctx.push("submission");
        ctx.push_as("token", "alice");
        assert_eq!(ctx.caller(), "alice");
        assert_eq!(ctx.this(), "token");
    }
}
