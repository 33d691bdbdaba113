//! Operand stack model
//!
//! Mirrors the values the emitted instructions leave on the JVM operand
//! stack. Conversions (boxing, unboxing, casts) are chosen from the types
//! recorded here, so the model has to follow every instruction exactly; any
//! disagreement is a compiler bug and surfaces as an internal error.

use crate::ast::TypeRef;
use crate::error::{CompileError, CompileResult, InternalContext};

#[derive(Debug, Default)]
pub struct OperandStack {
    values: Vec<TypeRef>,
    context: InternalContext,
}

impl OperandStack {
    pub fn new(context: InternalContext) -> Self {
        Self {
            values: Vec::new(),
            context,
        }
    }

    /// Source line of the statement being emitted
    pub fn set_line(&mut self, line: u32) {
        self.context.line = line;
    }

    pub fn context(&self) -> &InternalContext {
        &self.context
    }

    /// Internal error carrying the current class/method/line
    pub fn internal(&self, message: impl Into<String>) -> CompileError {
        CompileError::internal(message, self.context.clone())
    }

    /// Push a value; `void` pushes nothing
    pub fn push(&mut self, ty: TypeRef) {
        if !ty.is_void() {
            self.values.push(ty);
        }
    }

    pub fn pop(&mut self) -> CompileResult<TypeRef> {
        self.values
            .pop()
            .ok_or_else(|| self.internal("operand stack underflow"))
    }

    pub fn pop_n(&mut self, n: usize) -> CompileResult<Vec<TypeRef>> {
        if self.values.len() < n {
            return Err(self.internal(format!(
                "operand stack underflow: need {} values, have {}",
                n,
                self.values.len()
            )));
        }
        Ok(self.values.split_off(self.values.len() - n))
    }

    pub fn peek(&self) -> CompileResult<&TypeRef> {
        self.values
            .last()
            .ok_or_else(|| self.internal("operand stack is empty"))
    }

    /// Replace the top value's type after an in-place conversion
    pub fn replace_top(&mut self, ty: TypeRef) -> CompileResult<TypeRef> {
        let old = self.pop()?;
        self.push(ty);
        Ok(old)
    }

    pub fn dup(&mut self) -> CompileResult<()> {
        let top = self.peek()?.clone();
        self.values.push(top);
        Ok(())
    }

    pub fn swap(&mut self) -> CompileResult<()> {
        let len = self.values.len();
        if len < 2 {
            return Err(self.internal("swap needs two operands"));
        }
        self.values.swap(len - 1, len - 2);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Current depth in JVM slots (long and double take two)
    pub fn depth_in_slots(&self) -> u32 {
        self.values.iter().map(|t| t.slots() as u32).sum()
    }

    /// Restore a depth recorded earlier, at a branch merge point
    pub fn reset_to(&mut self, depth: usize) -> CompileResult<()> {
        if depth > self.values.len() {
            return Err(self.internal(format!(
                "cannot restore operand stack to depth {} from {}",
                depth,
                self.values.len()
            )));
        }
        self.values.truncate(depth);
        Ok(())
    }

    /// Statement boundary: nothing may be left behind
    pub fn expect_empty(&self, what: &str) -> CompileResult<()> {
        if self.values.is_empty() {
            return Ok(());
        }
        let leftover: Vec<String> = self.values.iter().map(TypeRef::display_name).collect();
        Err(self.internal(format!(
            "operand stack not empty after {}: [{}]",
            what,
            leftover.join(", ")
        )))
    }
}
