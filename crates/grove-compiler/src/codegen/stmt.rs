//! Statement emission
//!
//! Statements leave the operand stack empty. Code that can no longer be
//! reached (after `return`, `throw`, `break`, `continue` or an unconditional
//! loop) is not emitted. `finally` bodies are inlined at every exit of the
//! protected block instead of being called as subroutines.

use super::dispatch;
use super::method::MethodGen;
use crate::ast::{names, Parameter, Stmt, StmtKind, SwitchStmt, TryStmt, TypeRef};
use crate::error::{CompileError, CompileResult};
use grove_classfile::Opcode;

const ITERATOR: &str = "java/util/Iterator";

impl<'a, 'g> MethodGen<'a, 'g> {
    /// Bind the parameters, emit `body` and close it with an implicit
    /// return when it can complete normally
    pub(super) fn emit_body(&mut self, params: &[Parameter], body: &Stmt) -> CompileResult<()> {
        self.bind_parameters(params)?;
        self.emit_stmt(body)?;
        self.finish_body()
    }

    pub(super) fn emit_stmt(&mut self, stmt: &Stmt) -> CompileResult<()> {
        if !self.is_reachable() {
            return Ok(());
        }
        self.mark_line(stmt.pos);
        match &stmt.kind {
            StmtKind::Block(block) => {
                self.slots.push_scope();
                for inner in &block.stmts {
                    self.emit_stmt(inner)?;
                }
                self.slots.pop_scope();
                Ok(())
            }
            StmtKind::Expr(expr) => {
                self.emit_discard(expr)?;
                self.stack.expect_empty("statement")
            }
            StmtKind::Return(value) => self.emit_return_stmt(value.as_ref()),
            StmtKind::If(stmt) => {
                let otherwise = self.new_label();
                self.emit_branch(&stmt.cond, otherwise, false)?;
                self.emit_stmt(&stmt.then)?;
                match &stmt.otherwise {
                    Some(other) => {
                        let end = self.new_label();
                        if self.is_reachable() {
                            self.jump(Opcode::Goto, end)?;
                        }
                        self.place(otherwise);
                        self.emit_stmt(other)?;
                        self.place(end);
                    }
                    None => self.place(otherwise),
                }
                Ok(())
            }
            StmtKind::While(stmt) => {
                let start = self.new_label();
                let end = self.new_label();
                self.place(start);
                self.emit_branch(&stmt.cond, end, false)?;
                self.loops.push(end, Some(start), self.finally.len());
                self.emit_stmt(&stmt.body)?;
                self.loops.pop();
                if self.is_reachable() {
                    self.jump(Opcode::Goto, start)?;
                }
                self.place(end);
                Ok(())
            }
            StmtKind::For(stmt) => {
                self.slots.push_scope();
                for init in &stmt.init {
                    self.emit_discard(init)?;
                }
                let start = self.new_label();
                let next = self.new_label();
                let end = self.new_label();
                self.place(start);
                if let Some(cond) = &stmt.cond {
                    self.emit_branch(cond, end, false)?;
                }
                self.loops.push(end, Some(next), self.finally.len());
                self.emit_stmt(&stmt.body)?;
                self.loops.pop();
                self.place(next);
                if self.is_reachable() {
                    for update in &stmt.update {
                        self.emit_discard(update)?;
                    }
                    self.jump(Opcode::Goto, start)?;
                }
                self.place(end);
                self.slots.pop_scope();
                Ok(())
            }
            StmtKind::ForIn(stmt) => {
                self.slots.push_scope();
                let var = stmt
                    .var
                    .var
                    .ok_or_else(|| self.internal(format!("loop variable '{}' was not resolved", stmt.var.name)))?;
                self.emit_value(&stmt.iterable, &TypeRef::object())?;
                self.call_runtime(dispatch::AS_ITERATOR)?;
                let (iterator, iterator_ty) = self.store_temp()?;
                let slot = self.define_local(var);
                let start = self.new_label();
                let end = self.new_label();
                self.place(start);
                self.load_slot(iterator, &iterator_ty)?;
                self.invoke(Opcode::Invokeinterface, ITERATOR, "hasNext", "()Z")?;
                self.jump(Opcode::Ifeq, end)?;
                self.load_slot(iterator, &iterator_ty)?;
                self.invoke(Opcode::Invokeinterface, ITERATOR, "next", "()Ljava/lang/Object;")?;
                self.coerce(&TypeRef::object(), &slot.ty)?;
                if slot.shared {
                    // fresh cell per iteration, so closures keep their own value
                    self.wrap_in_reference(&slot.ty)?;
                }
                self.store_slot(slot.index, &slot.storage_type())?;
                self.loops.push(end, Some(start), self.finally.len());
                self.emit_stmt(&stmt.body)?;
                self.loops.pop();
                if self.is_reachable() {
                    self.jump(Opcode::Goto, start)?;
                }
                self.place(end);
                self.slots.pop_scope();
                Ok(())
            }
            StmtKind::Break => {
                let (label, depth) = self.loops.break_target().ok_or_else(|| {
                    CompileError::semantic("the break statement is only allowed inside loops or switches", self.location(stmt.pos))
                })?;
                self.run_finally_blocks(depth)?;
                if self.is_reachable() {
                    self.jump(Opcode::Goto, label)?;
                }
                Ok(())
            }
            StmtKind::Continue => {
                let (label, depth) = self.loops.continue_target().ok_or_else(|| {
                    CompileError::semantic("the continue statement is only allowed inside loops", self.location(stmt.pos))
                })?;
                self.run_finally_blocks(depth)?;
                if self.is_reachable() {
                    self.jump(Opcode::Goto, label)?;
                }
                Ok(())
            }
            StmtKind::Throw(expr) => {
                let ty = self.emit_expr(expr)?;
                let throwable = TypeRef::class(names::THROWABLE);
                self.coerce(&ty, &TypeRef::object())?;
                if !self.unit.is_assignable(&ty.boxed(), &throwable) {
                    self.type_insn(Opcode::Checkcast, &throwable)?;
                }
                self.emit_throw()
            }
            StmtKind::Try(stmt) => self.emit_try(stmt),
            StmtKind::Switch(stmt) => self.emit_switch(stmt),
            StmtKind::Synthetic(body) => self.emit_synthetic(body),
            StmtKind::Empty => Ok(()),
        }
    }

    fn emit_return_stmt(&mut self, value: Option<&crate::ast::Expr>) -> CompileResult<()> {
        let ret = self.head.return_type.erasure();
        match value {
            Some(expr) if ret.is_void() => self.emit_discard(expr)?,
            Some(expr) => self.emit_value(expr, &ret)?,
            None => self.push_default(&ret)?,
        }
        if self.finally.is_empty() {
            return self.emit_return(&ret);
        }
        let saved = if ret.is_void() {
            None
        } else {
            Some(self.store_temp()?)
        };
        self.run_finally_blocks(0)?;
        if !self.is_reachable() {
            return Ok(());
        }
        if let Some((slot, ty)) = saved {
            self.load_slot(slot, &ty)?;
        }
        self.emit_return(&ret)
    }

    fn emit_try(&mut self, stmt: &TryStmt) -> CompileResult<()> {
        let depth = self.finally.len();
        let end = self.new_label();
        if stmt.finally.is_some() {
            // covers the body and the catch blocks
            self.open_region();
        }
        self.open_region();
        if let Some(finally) = &stmt.finally {
            self.finally.push((**finally).clone());
        }

        self.emit_stmt(&stmt.body)?;
        let body = self.close_region()?;
        self.exit_try(depth, end)?;

        for clause in &stmt.catches {
            let caught = match clause.param.ty.erasure() {
                ty if ty.is_object() => TypeRef::class("java.lang.Exception"),
                ty => ty,
            };
            let handler = self.place_handler();
            self.stack.push(caught.clone());
            self.slots.push_scope();
            let var = clause
                .param
                .var
                .ok_or_else(|| self.internal(format!("catch parameter '{}' was not resolved", clause.param.name)))?;
            let slot = self.define_local(var);
            self.coerce(&caught, &slot.ty)?;
            if slot.shared {
                self.wrap_in_reference(&slot.ty)?;
            }
            self.store_slot(slot.index, &slot.storage_type())?;
            self.emit_stmt(&clause.body)?;
            self.slots.pop_scope();
            self.exit_try(depth, end)?;
            self.add_handler(&body, handler, Some(caught.internal_name()));
        }

        if let Some(finally) = &stmt.finally {
            self.finally.pop();
            let all = self.close_region()?;
            let handler = self.place_handler();
            self.stack.push(TypeRef::class(names::THROWABLE));
            self.slots.push_scope();
            let (pending, ty) = self.store_temp()?;
            self.emit_stmt(finally)?;
            if self.is_reachable() {
                self.load_slot(pending, &ty)?;
                self.emit_throw()?;
            }
            self.slots.pop_scope();
            self.add_handler(&all, handler, None);
        }
        self.place(end);
        Ok(())
    }

    /// Normal completion of a try or catch block
    fn exit_try(&mut self, depth: usize, end: grove_classfile::Label) -> CompileResult<()> {
        if !self.is_reachable() {
            return Ok(());
        }
        self.run_finally_blocks(depth)?;
        if self.is_reachable() {
            self.jump(Opcode::Goto, end)?;
        }
        Ok(())
    }

    /// Cases are tested in order with `isCase`; bodies fall through
    fn emit_switch(&mut self, stmt: &SwitchStmt) -> CompileResult<()> {
        self.emit_value(&stmt.subject, &TypeRef::object())?;
        let (subject, subject_ty) = self.store_temp()?;
        let end = self.new_label();
        let default = self.new_label();
        let bodies: Vec<_> = stmt.cases.iter().map(|_| self.code.new_label()).collect();
        for (case, &label) in stmt.cases.iter().zip(&bodies) {
            self.load_slot(subject, &subject_ty)?;
            self.emit_value(&case.value, &TypeRef::object())?;
            self.call_runtime(dispatch::IS_CASE)?;
            self.jump(Opcode::Ifne, label)?;
        }
        let fallback = if stmt.default.is_some() { default } else { end };
        self.jump(Opcode::Goto, fallback)?;

        self.loops.push(end, None, self.finally.len());
        for (case, &label) in stmt.cases.iter().zip(&bodies) {
            self.place(label);
            self.emit_stmt(&case.body)?;
        }
        if let Some(body) = &stmt.default {
            self.place(default);
            self.emit_stmt(body)?;
        }
        self.loops.pop();
        self.place(end);
        Ok(())
    }
}
