//! Method body emission
//!
//! [`MethodGen`] owns everything needed while one method body is written:
//! the instruction buffer, the operand stack model, the slot table, the
//! line table and the protected ranges. Expressions, statements, closures,
//! literals and synthetic bodies are emitted by further `impl MethodGen`
//! blocks in the sibling modules; this one holds the instruction-level
//! helpers they share.

use super::control::{LoopStack, TryRegion};
use super::dispatch::{self, RuntimeCall};
use super::slots::{LocalSlot, SlotTable};
use super::stack::OperandStack;
use super::{ClassOutput, GeneratedClass};
use crate::ast::{names, ClassId, CompileUnit, Parameter, Primitive, SourcePos, Stmt, TypeRef, VarId};
use crate::context::CompilationContext;
use crate::error::{CompileError, CompileResult, InternalContext};
use grove_classfile::{
    compute_max_stack, Attribute, CodeAttribute, CodeWriter, ConstantPool, ExceptionTableEntry,
    FieldType, Label, LineNumber, MethodDescriptor, Opcode,
};
use rustc_hash::{FxHashMap, FxHashSet};

const REFERENCE: &str = "groovy/lang/Reference";
const CLOSURE: &str = "groovy/lang/Closure";

/// Whose code is being written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    /// A method or constructor of the lexical class
    Method,
    /// `doCall` of a closure class; `this` means the closure's `thisObject`
    Closure,
}

/// Method being generated
#[derive(Debug, Clone)]
pub struct MethodHead {
    /// Lexical class: visibility, `this`, implicit field owners
    pub class: ClassId,
    /// Internal name of the class the code is written into
    pub owner: String,
    pub name: String,
    pub descriptor: String,
    pub return_type: TypeRef,
    /// No `this` in slot 0
    pub is_static: bool,
    /// `this` denotes the lexical class object rather than an instance
    pub static_context: bool,
    pub frame: Frame,
    /// Method whose body lexically contains the code; names closure classes
    pub enclosing: String,
    pub source: Option<String>,
}

/// Enclosing-method local reached through a field of the generated class
#[derive(Debug, Clone)]
pub struct CapturedField {
    pub owner: String,
    pub field: String,
}

#[derive(Debug)]
struct PendingHandler {
    start: usize,
    end: usize,
    handler: usize,
    catch_type: Option<String>,
}

pub struct MethodGen<'a, 'g> {
    pub(super) ctx: &'a CompilationContext,
    pub(super) unit: &'a CompileUnit,
    pub(super) generated: &'g mut Vec<GeneratedClass>,
    pub(super) pool: &'g mut ConstantPool,
    pub(super) output: &'g mut ClassOutput,
    pub(super) head: MethodHead,
    pub(super) code: CodeWriter,
    pub(super) stack: OperandStack,
    pub(super) slots: SlotTable,
    pub(super) captured: FxHashMap<VarId, CapturedField>,
    pub(super) loops: LoopStack,
    pub(super) regions: Vec<TryRegion>,
    /// `finally` bodies of the enclosing `try` statements, outermost first
    pub(super) finally: Vec<Stmt>,
    handlers: Vec<PendingHandler>,
    lines: Vec<LineNumber>,
    last_line: u32,
    reachable: bool,
    targeted: FxHashSet<Label>,
}

impl<'a, 'g> MethodGen<'a, 'g> {
    pub fn new(
        ctx: &'a CompilationContext,
        unit: &'a CompileUnit,
        generated: &'g mut Vec<GeneratedClass>,
        pool: &'g mut ConstantPool,
        output: &'g mut ClassOutput,
        head: MethodHead,
    ) -> Self {
        let context = InternalContext {
            class: head.owner.replace('/', "."),
            method: head.name.clone(),
            descriptor: head.descriptor.clone(),
            source: head.source.clone(),
            line: 0,
        };
        Self {
            ctx,
            unit,
            generated,
            pool,
            output,
            slots: SlotTable::new(head.is_static),
            head,
            code: CodeWriter::new(),
            stack: OperandStack::new(context),
            captured: FxHashMap::default(),
            loops: LoopStack::new(),
            regions: Vec::new(),
            finally: Vec::new(),
            handlers: Vec::new(),
            lines: Vec::new(),
            last_line: 0,
            reachable: true,
            targeted: FxHashSet::default(),
        }
    }

    pub(super) fn internal(&self, message: impl Into<String>) -> CompileError {
        self.stack.internal(message)
    }

    pub(super) fn is_reachable(&self) -> bool {
        self.reachable
    }

    /// Type of the generated class itself (the closure class in closures)
    pub(super) fn self_type(&self) -> TypeRef {
        TypeRef::class(self.head.owner.replace('/', "."))
    }

    /// Type of the lexical class
    pub(super) fn class_type(&self) -> TypeRef {
        self.unit.class(self.head.class).type_ref()
    }

    // ========================================================================
    // Parameters and variables
    // ========================================================================

    /// Assign slots to the parameters; shared ones are moved into fresh
    /// `Reference` cells
    pub(super) fn bind_parameters(&mut self, params: &[Parameter]) -> CompileResult<()> {
        let mut shared = Vec::new();
        for param in params {
            let ty = param.ty.erasure();
            match param.var {
                Some(var) => {
                    let slot = self.slots.define(var, ty, false);
                    if self.unit.vars.get(var).closure_shared {
                        shared.push((var, slot));
                    }
                }
                None => {
                    self.slots.temp(&ty);
                }
            }
        }
        for (var, slot) in shared {
            self.load_slot(slot.index, &slot.ty)?;
            self.wrap_in_reference(&slot.ty)?;
            let cell = self.slots.temp(&TypeRef::object());
            self.store_slot(cell, &TypeRef::class(names::REFERENCE))?;
            self.slots.rebind(
                var,
                LocalSlot {
                    index: cell,
                    ty: slot.ty,
                    shared: true,
                },
            );
        }
        Ok(())
    }

    /// Box the value on top and replace it by `new Reference(value)`
    pub(super) fn wrap_in_reference(&mut self, value_ty: &TypeRef) -> CompileResult<()> {
        self.coerce(value_ty, &TypeRef::object())?;
        self.type_insn(Opcode::New, &TypeRef::class(names::REFERENCE))?;
        // [value, ref] -> [ref, value, ref] -> [ref, ref, value]
        let pair = self.stack.pop_n(2)?;
        self.code.emit_opcode(Opcode::DupX1);
        self.stack.push(pair[1].clone());
        self.stack.push(pair[0].clone());
        self.stack.push(pair[1].clone());
        self.swap()?;
        self.invoke(Opcode::Invokespecial, REFERENCE, "<init>", "(Ljava/lang/Object;)V")?;
        Ok(())
    }

    /// Allocate the slot of a newly declared local
    pub(super) fn define_local(&mut self, var: VarId) -> LocalSlot {
        let variable = self.unit.vars.get(var);
        let ty = variable.ty.erasure();
        let shared = variable.closure_shared;
        self.slots.define(var, ty, shared)
    }

    /// Push the current value of a local, unwrapping its cell if shared
    pub(super) fn load_var(&mut self, var: VarId) -> CompileResult<TypeRef> {
        let declared = self.unit.vars.get(var).ty.erasure();
        match self.slots.get(var).cloned() {
            Some(slot) if !slot.shared => {
                self.load_slot(slot.index, &slot.ty)?;
                Ok(slot.ty)
            }
            _ => {
                self.load_cell(var)?;
                self.invoke(Opcode::Invokevirtual, REFERENCE, "get", "()Ljava/lang/Object;")?;
                self.coerce(&TypeRef::object(), &declared)?;
                Ok(declared)
            }
        }
    }

    /// Push the `Reference` cell of a shared or captured local
    pub(super) fn load_cell(&mut self, var: VarId) -> CompileResult<()> {
        if let Some(slot) = self.slots.get(var).cloned() {
            if slot.shared {
                return self.load_slot(slot.index, &TypeRef::class(names::REFERENCE));
            }
            return Err(self.internal(format!(
                "variable '{}' is captured but not shared",
                self.unit.vars.get(var).name
            )));
        }
        match self.captured.get(&var).cloned() {
            Some(captured) => {
                self.load_frame_self()?;
                self.field_insn(
                    Opcode::Getfield,
                    &captured.owner,
                    &captured.field,
                    &TypeRef::class(names::REFERENCE),
                )
            }
            None => Err(self.internal(format!(
                "no storage for variable '{}'",
                self.unit.vars.get(var).name
            ))),
        }
    }

    /// Store the value on top (of type `value_ty`) into a local
    pub(super) fn store_var(&mut self, var: VarId, value_ty: &TypeRef) -> CompileResult<()> {
        let declared = self.unit.vars.get(var).ty.erasure();
        self.coerce(value_ty, &declared)?;
        match self.slots.get(var).cloned() {
            Some(slot) if !slot.shared => self.store_slot(slot.index, &slot.ty),
            _ => {
                self.coerce(&declared, &TypeRef::object())?;
                self.load_cell(var)?;
                self.swap()?;
                self.invoke(Opcode::Invokevirtual, REFERENCE, "set", "(Ljava/lang/Object;)V")?;
                Ok(())
            }
        }
    }

    // ========================================================================
    // Receivers
    // ========================================================================

    /// `aload_0` as the generated class itself
    pub(super) fn load_frame_self(&mut self) -> CompileResult<()> {
        if self.head.is_static {
            return Err(self.internal("no 'this' in a static method"));
        }
        self.code.emit_opcode(Opcode::Aload0);
        self.stack.push(self.self_type());
        Ok(())
    }

    /// `this` of the lexical class: the instance, its class object in a
    /// static context, or the closure's `thisObject`
    pub(super) fn load_this(&mut self) -> CompileResult<TypeRef> {
        let class_ty = self.class_type();
        if self.head.static_context {
            self.push_class_literal(&class_ty)?;
            return Ok(TypeRef::class(names::CLASS));
        }
        self.load_frame_self()?;
        if self.head.frame == Frame::Closure {
            self.invoke(Opcode::Invokevirtual, CLOSURE, "getThisObject", "()Ljava/lang/Object;")?;
            self.checkcast(&class_ty)?;
        }
        Ok(class_ty)
    }

    /// Receiver of names without an explicit object: closures resolve
    /// through themselves so owner and delegate get a say
    pub(super) fn load_implicit_receiver(&mut self) -> CompileResult<TypeRef> {
        if self.head.frame == Frame::Closure {
            self.load_frame_self()?;
            return Ok(self.self_type());
        }
        self.load_this()
    }

    /// Class passed as the call-site owner to the runtime helpers
    pub(super) fn push_sender(&mut self) -> CompileResult<()> {
        let index = self.pool.class(&self.head.owner)?;
        self.code.emit_ldc(index);
        self.stack.push(TypeRef::class(names::CLASS));
        Ok(())
    }

    // ========================================================================
    // Constants
    // ========================================================================

    fn emit_int(&mut self, value: i32) -> CompileResult<()> {
        if (-32768..=32767).contains(&value) {
            self.code.emit_int(value, || 0);
        } else {
            let index = self.pool.integer(value)?;
            self.code.emit_ldc(index);
        }
        Ok(())
    }

    pub(super) fn push_int(&mut self, value: i32) -> CompileResult<()> {
        self.push_int_as(value, TypeRef::int())
    }

    /// Int constant typed as `ty` (boolean, char, ...)
    pub(super) fn push_int_as(&mut self, value: i32, ty: TypeRef) -> CompileResult<()> {
        self.emit_int(value)?;
        self.stack.push(ty);
        Ok(())
    }

    pub(super) fn push_long(&mut self, value: i64) -> CompileResult<()> {
        match value {
            0 => self.code.emit_opcode(Opcode::Lconst0),
            1 => self.code.emit_opcode(Opcode::Lconst1),
            _ => {
                let index = self.pool.long(value)?;
                self.code.emit_with_index(Opcode::Ldc2W, index);
            }
        }
        self.stack.push(TypeRef::long());
        Ok(())
    }

    pub(super) fn push_float(&mut self, value: f32) -> CompileResult<()> {
        if value.to_bits() == 0f32.to_bits() {
            self.code.emit_opcode(Opcode::Fconst0);
        } else if value == 1.0 {
            self.code.emit_opcode(Opcode::Fconst1);
        } else if value == 2.0 {
            self.code.emit_opcode(Opcode::Fconst2);
        } else {
            let index = self.pool.float(value)?;
            self.code.emit_ldc(index);
        }
        self.stack.push(TypeRef::Primitive(Primitive::Float));
        Ok(())
    }

    pub(super) fn push_double(&mut self, value: f64) -> CompileResult<()> {
        if value.to_bits() == 0f64.to_bits() {
            self.code.emit_opcode(Opcode::Dconst0);
        } else if value == 1.0 {
            self.code.emit_opcode(Opcode::Dconst1);
        } else {
            let index = self.pool.double(value)?;
            self.code.emit_with_index(Opcode::Ldc2W, index);
        }
        self.stack.push(TypeRef::double());
        Ok(())
    }

    pub(super) fn push_string(&mut self, value: &str) -> CompileResult<()> {
        let index = self.pool.string(value)?;
        self.code.emit_ldc(index);
        self.stack.push(TypeRef::string());
        Ok(())
    }

    pub(super) fn push_null(&mut self, ty: TypeRef) -> CompileResult<()> {
        self.code.emit_opcode(Opcode::AconstNull);
        self.stack.push(ty);
        Ok(())
    }

    /// `Foo.class`; primitives go through the wrapper's `TYPE`
    pub(super) fn push_class_literal(&mut self, ty: &TypeRef) -> CompileResult<()> {
        let class_ty = TypeRef::class(names::CLASS);
        match ty.erasure() {
            TypeRef::Primitive(p) => {
                let owner = crate::ast::types::internal_name(p.wrapper());
                self.field_insn(Opcode::Getstatic, &owner, "TYPE", &class_ty)
            }
            erased => {
                let index = self.pool.class(&erased.internal_name())?;
                self.code.emit_ldc(index);
                self.stack.push(class_ty);
                Ok(())
            }
        }
    }

    /// Zero value of `ty`: `0`, `0L`, `0.0`, `false` or `null`
    pub(super) fn push_default(&mut self, ty: &TypeRef) -> CompileResult<()> {
        match ty.erasure() {
            TypeRef::Primitive(Primitive::Void) => Ok(()),
            TypeRef::Primitive(Primitive::Long) => self.push_long(0),
            TypeRef::Primitive(Primitive::Float) => self.push_float(0.0),
            TypeRef::Primitive(Primitive::Double) => self.push_double(0.0),
            TypeRef::Primitive(p) => self.push_int_as(0, TypeRef::Primitive(p)),
            other => self.push_null(other),
        }
    }

    // ========================================================================
    // Instructions
    // ========================================================================

    /// Instruction without operands popping `pops` values
    pub(super) fn op(&mut self, opcode: Opcode, pops: usize, push: Option<TypeRef>) -> CompileResult<()> {
        self.code.emit_opcode(opcode);
        self.stack.pop_n(pops)?;
        if let Some(ty) = push {
            self.stack.push(ty);
        }
        Ok(())
    }

    pub(super) fn load_slot(&mut self, index: u16, ty: &TypeRef) -> CompileResult<()> {
        self.code
            .emit_local(load_op(ty), index)
            .map_err(|e| self.internal(e.to_string()))?;
        self.stack.push(ty.erasure());
        Ok(())
    }

    pub(super) fn store_slot(&mut self, index: u16, ty: &TypeRef) -> CompileResult<()> {
        self.code
            .emit_local(store_op(ty), index)
            .map_err(|e| self.internal(e.to_string()))?;
        self.stack.pop()?;
        Ok(())
    }

    /// Store the value on top into a fresh temporary of its own type
    pub(super) fn store_temp(&mut self) -> CompileResult<(u16, TypeRef)> {
        let ty = self.stack.peek()?.clone();
        let index = self.slots.temp(&ty);
        self.store_slot(index, &ty)?;
        Ok((index, ty))
    }

    pub(super) fn dup_value(&mut self) -> CompileResult<()> {
        let wide = self.stack.peek()?.slots() == 2;
        self.code
            .emit_opcode(if wide { Opcode::Dup2 } else { Opcode::Dup });
        self.stack.dup()
    }

    pub(super) fn swap(&mut self) -> CompileResult<()> {
        self.code.emit_opcode(Opcode::Swap);
        self.stack.swap()
    }

    pub(super) fn pop_value(&mut self) -> CompileResult<()> {
        let wide = self.stack.peek()?.slots() == 2;
        self.op(if wide { Opcode::Pop2 } else { Opcode::Pop }, 1, None)
    }

    /// Invoke a method, keeping the stack model in step with the descriptor
    pub(super) fn invoke(
        &mut self,
        opcode: Opcode,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> CompileResult<TypeRef> {
        let parsed = MethodDescriptor::parse(descriptor).map_err(|e| self.internal(e.to_string()))?;
        let index = if opcode == Opcode::Invokeinterface {
            self.pool.interface_method_ref(owner, name, descriptor)?
        } else {
            self.pool.method_ref(owner, name, descriptor)?
        };
        self.code.emit_with_index(opcode, index);
        if opcode == Opcode::Invokeinterface {
            self.code.emit_u8((parsed.arg_slots() + 1) as u8);
            self.code.emit_u8(0);
        }
        let receiver = usize::from(opcode != Opcode::Invokestatic);
        self.stack.pop_n(parsed.params.len() + receiver)?;
        let ret = parsed.ret.as_ref().map(field_type_ref).unwrap_or_else(TypeRef::void);
        self.stack.push(ret.clone());
        Ok(ret)
    }

    pub(super) fn call_runtime(&mut self, call: RuntimeCall) -> CompileResult<TypeRef> {
        self.invoke(Opcode::Invokestatic, call.owner, call.name, call.descriptor)
    }

    pub(super) fn field_insn(&mut self, opcode: Opcode, owner: &str, name: &str, ty: &TypeRef) -> CompileResult<()> {
        let ty = ty.erasure();
        let index = self.pool.field_ref(owner, name, &ty.descriptor())?;
        self.code.emit_with_index(opcode, index);
        match opcode {
            Opcode::Getstatic => self.stack.push(ty),
            Opcode::Putstatic => {
                self.stack.pop()?;
            }
            Opcode::Getfield => {
                self.stack.replace_top(ty)?;
            }
            Opcode::Putfield => {
                self.stack.pop_n(2)?;
            }
            other => return Err(self.internal(format!("{} is not a field instruction", other.name()))),
        }
        Ok(())
    }

    /// `new`, `checkcast`, `instanceof` and `anewarray`
    pub(super) fn type_insn(&mut self, opcode: Opcode, ty: &TypeRef) -> CompileResult<()> {
        let ty = ty.erasure();
        let index = self.pool.class(&ty.internal_name())?;
        self.code.emit_with_index(opcode, index);
        match opcode {
            Opcode::New => self.stack.push(ty),
            Opcode::Checkcast => {
                self.stack.replace_top(ty)?;
            }
            Opcode::Instanceof => {
                self.stack.replace_top(TypeRef::boolean())?;
            }
            Opcode::Anewarray => {
                self.stack.replace_top(TypeRef::array(ty))?;
            }
            other => return Err(self.internal(format!("{} takes no class operand", other.name()))),
        }
        Ok(())
    }

    /// New array of `component` with the length on top
    pub(super) fn new_array(&mut self, component: &TypeRef) -> CompileResult<()> {
        match component.erasure() {
            TypeRef::Primitive(p) => {
                let atype = match p {
                    Primitive::Boolean => 4,
                    Primitive::Char => 5,
                    Primitive::Float => 6,
                    Primitive::Double => 7,
                    Primitive::Byte => 8,
                    Primitive::Short => 9,
                    Primitive::Int => 10,
                    Primitive::Long => 11,
                    Primitive::Void => return Err(self.internal("array of void")),
                };
                self.code.emit_opcode(Opcode::Newarray);
                self.code.emit_u8(atype);
                self.stack.replace_top(TypeRef::array(TypeRef::Primitive(p)))?;
                Ok(())
            }
            other => self.type_insn(Opcode::Anewarray, &other),
        }
    }

    pub(super) fn checkcast(&mut self, ty: &TypeRef) -> CompileResult<()> {
        if ty.is_object() {
            return Ok(());
        }
        self.type_insn(Opcode::Checkcast, ty)
    }

    pub(super) fn emit_return(&mut self, ty: &TypeRef) -> CompileResult<()> {
        let pops = usize::from(!ty.is_void());
        self.op(return_op(ty), pops, None)?;
        self.reachable = false;
        Ok(())
    }

    pub(super) fn emit_throw(&mut self) -> CompileResult<()> {
        self.op(Opcode::Athrow, 1, None)?;
        self.reachable = false;
        Ok(())
    }

    // ========================================================================
    // Labels and branches
    // ========================================================================

    pub(super) fn new_label(&mut self) -> Label {
        self.code.new_label()
    }

    pub(super) fn jump(&mut self, opcode: Opcode, label: Label) -> CompileResult<()> {
        use Opcode::*;
        let pops = match opcode {
            Goto => 0,
            Ifeq | Ifne | Iflt | Ifge | Ifgt | Ifle | Ifnull | Ifnonnull => 1,
            IfIcmpeq | IfIcmpne | IfIcmplt | IfIcmpge | IfIcmpgt | IfIcmple | IfAcmpeq | IfAcmpne => 2,
            other => return Err(self.internal(format!("{} is not a supported branch", other.name()))),
        };
        self.stack.pop_n(pops)?;
        self.code.emit_branch(opcode, label);
        self.targeted.insert(label);
        if opcode == Goto {
            self.reachable = false;
        }
        Ok(())
    }

    /// Bind `label` here; code after a jumped-to label is reachable again
    pub(super) fn place(&mut self, label: Label) {
        self.code.place_label(label);
        if self.targeted.contains(&label) {
            self.reachable = true;
        }
    }

    /// Exception handler entry points are reachable through the table
    pub(super) fn place_handler(&mut self) -> usize {
        self.reachable = true;
        self.code.offset()
    }

    pub(super) fn add_handler(&mut self, ranges: &[(usize, usize)], handler: usize, catch_type: Option<String>) {
        for &(start, end) in ranges {
            self.handlers.push(PendingHandler {
                start,
                end,
                handler,
                catch_type: catch_type.clone(),
            });
        }
    }

    // ========================================================================
    // Try regions and finally blocks
    // ========================================================================

    pub(super) fn open_region(&mut self) {
        self.regions
            .push(TryRegion::open(self.finally.len(), self.code.offset()));
    }

    pub(super) fn close_region(&mut self) -> CompileResult<Vec<(usize, usize)>> {
        let region = self
            .regions
            .pop()
            .ok_or_else(|| self.internal("no open try region"))?;
        Ok(region.close(self.code.offset()))
    }

    /// Inline the `finally` bodies entered since `depth`, innermost first,
    /// keeping the inlined code out of their own protected ranges
    pub(super) fn run_finally_blocks(&mut self, depth: usize) -> CompileResult<()> {
        if depth >= self.finally.len() {
            return Ok(());
        }
        let at = self.code.offset();
        let mut paused = Vec::new();
        for (i, region) in self.regions.iter_mut().enumerate() {
            if region.finally_depth >= depth && region.pause(at) {
                paused.push(i);
            }
        }
        let saved = self.finally.clone();
        for index in (depth..saved.len()).rev() {
            if !self.reachable {
                break;
            }
            self.finally.truncate(index);
            self.emit_stmt(&saved[index])?;
        }
        self.finally = saved;
        let at = self.code.offset();
        for i in paused {
            self.regions[i].resume(at);
        }
        Ok(())
    }

    // ========================================================================
    // Line numbers
    // ========================================================================

    pub(super) fn mark_line(&mut self, pos: SourcePos) {
        if !pos.is_known() {
            return;
        }
        self.stack.set_line(pos.line);
        if !self.ctx.config.debug_line_numbers || pos.line == self.last_line {
            return;
        }
        self.last_line = pos.line;
        let start_pc = self.code.offset() as u16;
        let line = pos.line.min(u16::MAX as u32) as u16;
        match self.lines.last_mut() {
            Some(last) if last.start_pc == start_pc => last.line = line,
            _ => self.lines.push(LineNumber { start_pc, line }),
        }
    }

    // ========================================================================
    // Conversions
    // ========================================================================

    /// Convert the value on top from `from` to `to`
    ///
    /// Covers dropping values, primitive widening and narrowing, boxing,
    /// unboxing and reference casts. `from` is `void` when nothing was
    /// pushed, in which case the zero value of `to` is produced.
    pub(super) fn coerce(&mut self, from: &TypeRef, to: &TypeRef) -> CompileResult<()> {
        let (from, to) = (from.erasure(), to.erasure());
        if from == to {
            return Ok(());
        }
        if to.is_void() {
            return self.pop_value();
        }
        if from.is_void() {
            return self.push_default(&to);
        }
        match (from.primitive(), to.primitive()) {
            (Some(f), Some(t)) => self.convert_primitive(f, t),
            (Some(f), None) => {
                let target = match to.unboxed() {
                    Some(p) if p != f => {
                        self.convert_primitive(f, p)?;
                        p
                    }
                    _ => f,
                };
                self.box_primitive(target)?;
                let boxed = TypeRef::class(target.wrapper());
                if !self.unit.is_assignable(&boxed, &to) && !is_wrapper_supertype(&to) {
                    self.cast_reference(&to)?;
                }
                Ok(())
            }
            (None, Some(t)) => {
                let call = dispatch::unbox(t.descriptor())
                    .ok_or_else(|| self.internal(format!("cannot unbox to {}", t.name())))?;
                self.call_runtime(call)?;
                Ok(())
            }
            (None, None) => {
                if !self.unit.is_assignable(&from, &to) {
                    self.cast_reference(&to)?;
                }
                Ok(())
            }
        }
    }

    /// Groovy cast: `castToType` followed by `checkcast`
    pub(super) fn cast_reference(&mut self, to: &TypeRef) -> CompileResult<()> {
        if to.is_object() {
            return Ok(());
        }
        self.push_class_literal(to)?;
        self.call_runtime(dispatch::CAST_TO_TYPE)?;
        self.checkcast(to)
    }

    pub(super) fn box_primitive(&mut self, p: Primitive) -> CompileResult<()> {
        let wrapper = crate::ast::types::internal_name(p.wrapper());
        let descriptor = format!("({})L{};", p.descriptor(), wrapper);
        self.invoke(Opcode::Invokestatic, &wrapper, "valueOf", &descriptor)?;
        Ok(())
    }

    /// Turn the value on top into an `int` 0/1 following Groovy truth
    pub(super) fn truth(&mut self, from: &TypeRef) -> CompileResult<()> {
        let from = from.erasure();
        match from.primitive() {
            Some(Primitive::Boolean) => Ok(()),
            Some(Primitive::Void) => self.push_int_as(0, TypeRef::boolean()),
            Some(p) => self.convert_primitive(p, Primitive::Boolean),
            None => {
                self.call_runtime(dispatch::BOOLEAN_UNBOX)?;
                Ok(())
            }
        }
    }

    fn convert_primitive(&mut self, from: Primitive, to: Primitive) -> CompileResult<()> {
        use Opcode::*;
        use Primitive::*;
        if from == to {
            return Ok(());
        }
        if to == Void {
            return self.pop_value();
        }
        if to == Boolean {
            return self.zero_test(from);
        }
        let from = if from.is_int_like() { Int } else { from };
        let narrow = |to: Primitive| match to {
            Byte => Some(I2b),
            Char => Some(I2c),
            Short => Some(I2s),
            _ => None,
        };
        let mut ops = match (from, to) {
            (Int, Long) => vec![I2l],
            (Int, Float) => vec![I2f],
            (Int, Double) => vec![I2d],
            (Int, _) => vec![],
            (Long, Float) => vec![L2f],
            (Long, Double) => vec![L2d],
            (Long, _) => vec![L2i],
            (Float, Long) => vec![F2l],
            (Float, Double) => vec![F2d],
            (Float, _) => vec![F2i],
            (Double, Long) => vec![D2l],
            (Double, Float) => vec![D2f],
            (Double, _) => vec![D2i],
            (other, _) => return Err(self.internal(format!("cannot convert {} to {}", other.name(), to.name()))),
        };
        ops.extend(narrow(to));
        for op in ops {
            self.code.emit_opcode(op);
        }
        self.stack.replace_top(TypeRef::Primitive(to))?;
        Ok(())
    }

    /// Numeric value on top → `value != 0` as a boolean
    fn zero_test(&mut self, from: Primitive) -> CompileResult<()> {
        match from {
            Primitive::Long => {
                self.push_long(0)?;
                self.op(Opcode::Lcmp, 2, Some(TypeRef::int()))?;
            }
            Primitive::Float => {
                self.push_float(0.0)?;
                self.op(Opcode::Fcmpl, 2, Some(TypeRef::int()))?;
            }
            Primitive::Double => {
                self.push_double(0.0)?;
                self.op(Opcode::Dcmpl, 2, Some(TypeRef::int()))?;
            }
            _ => {}
        }
        self.bool_from_branch(|gen, when_false| gen.jump(Opcode::Ifeq, when_false))
    }

    /// Materialize a condition as `int` 0/1; `jump_false` emits the test,
    /// branching to the given label when the condition does not hold
    pub(super) fn bool_from_branch(
        &mut self,
        jump_false: impl FnOnce(&mut Self, Label) -> CompileResult<()>,
    ) -> CompileResult<()> {
        let when_false = self.new_label();
        let end = self.new_label();
        jump_false(self, when_false)?;
        let depth = self.stack.len();
        self.push_int_as(1, TypeRef::boolean())?;
        self.jump(Opcode::Goto, end)?;
        self.place(when_false);
        self.stack.reset_to(depth)?;
        self.push_int_as(0, TypeRef::boolean())?;
        self.place(end);
        Ok(())
    }

    // ========================================================================
    // Finish
    // ========================================================================

    /// Close the body with an implicit return when control can reach the end
    pub(super) fn finish_body(&mut self) -> CompileResult<()> {
        if !self.reachable {
            return Ok(());
        }
        let ret = self.head.return_type.erasure();
        self.push_default(&ret)?;
        self.emit_return(&ret)
    }

    /// Resolve branches, size the frame and build the `Code` attribute
    pub fn finish(self) -> CompileResult<CodeAttribute> {
        let context = self.stack.context().clone();
        let internal = |message: String| CompileError::internal(message, context.clone());
        if !self.stack.is_empty() {
            self.stack.expect_empty("method body")?;
        }
        let code = self
            .code
            .finish()
            .map_err(|e| internal(format!("cannot encode method body: {}", e)))?;
        if code.len() > u16::MAX as usize {
            return Err(internal(format!("method code too large ({} bytes)", code.len())));
        }
        let exception_table: Vec<ExceptionTableEntry> = self
            .handlers
            .into_iter()
            .map(|h| ExceptionTableEntry {
                start_pc: h.start as u16,
                end_pc: h.end as u16,
                handler_pc: h.handler as u16,
                catch_type: h.catch_type,
            })
            .collect();
        let max_stack = compute_max_stack(&code, self.pool, &exception_table)
            .map_err(|e| internal(format!("stack verification failed: {}", e)))?;
        let mut attributes = Vec::new();
        if !self.lines.is_empty() {
            attributes.push(Attribute::LineNumberTable(self.lines));
        }
        Ok(CodeAttribute {
            max_stack,
            max_locals: self.slots.max_locals(),
            code,
            exception_table,
            attributes,
        })
    }
}

// ============================================================================
// Opcode selection
// ============================================================================

fn is_wrapper_supertype(ty: &TypeRef) -> bool {
    matches!(
        ty.class_name(),
        Some("java.lang.Number" | "java.lang.Comparable" | "java.io.Serializable")
    )
}

pub(super) fn load_op(ty: &TypeRef) -> Opcode {
    match ty.primitive() {
        Some(Primitive::Long) => Opcode::Lload,
        Some(Primitive::Float) => Opcode::Fload,
        Some(Primitive::Double) => Opcode::Dload,
        Some(_) => Opcode::Iload,
        None => Opcode::Aload,
    }
}

pub(super) fn store_op(ty: &TypeRef) -> Opcode {
    match ty.primitive() {
        Some(Primitive::Long) => Opcode::Lstore,
        Some(Primitive::Float) => Opcode::Fstore,
        Some(Primitive::Double) => Opcode::Dstore,
        Some(_) => Opcode::Istore,
        None => Opcode::Astore,
    }
}

pub(super) fn return_op(ty: &TypeRef) -> Opcode {
    match ty.primitive() {
        Some(Primitive::Void) => Opcode::Return,
        Some(Primitive::Long) => Opcode::Lreturn,
        Some(Primitive::Float) => Opcode::Freturn,
        Some(Primitive::Double) => Opcode::Dreturn,
        Some(_) => Opcode::Ireturn,
        None => Opcode::Areturn,
    }
}

pub(super) fn array_load_op(component: &TypeRef) -> Opcode {
    match component.primitive() {
        Some(Primitive::Boolean | Primitive::Byte) => Opcode::Baload,
        Some(Primitive::Char) => Opcode::Caload,
        Some(Primitive::Short) => Opcode::Saload,
        Some(Primitive::Long) => Opcode::Laload,
        Some(Primitive::Float) => Opcode::Faload,
        Some(Primitive::Double) => Opcode::Daload,
        Some(_) => Opcode::Iaload,
        None => Opcode::Aaload,
    }
}

pub(super) fn array_store_op(component: &TypeRef) -> Opcode {
    match component.primitive() {
        Some(Primitive::Boolean | Primitive::Byte) => Opcode::Bastore,
        Some(Primitive::Char) => Opcode::Castore,
        Some(Primitive::Short) => Opcode::Sastore,
        Some(Primitive::Long) => Opcode::Lastore,
        Some(Primitive::Float) => Opcode::Fastore,
        Some(Primitive::Double) => Opcode::Dastore,
        Some(_) => Opcode::Iastore,
        None => Opcode::Aastore,
    }
}

/// Stack type of a descriptor type
pub(super) fn field_type_ref(ty: &FieldType) -> TypeRef {
    match ty {
        FieldType::Base(c) => TypeRef::Primitive(match c {
            'Z' => Primitive::Boolean,
            'B' => Primitive::Byte,
            'C' => Primitive::Char,
            'S' => Primitive::Short,
            'J' => Primitive::Long,
            'F' => Primitive::Float,
            'D' => Primitive::Double,
            _ => Primitive::Int,
        }),
        FieldType::Object(internal) => TypeRef::class(internal.replace('/', ".")),
        FieldType::Array(component) => TypeRef::array(field_type_ref(component)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ClassKind, ClassNode};

    fn head(unit: &CompileUnit, class: ClassId, ret: TypeRef) -> MethodHead {
        MethodHead {
            class,
            owner: unit.class(class).internal_name(),
            name: "run".into(),
            descriptor: "()V".into(),
            return_type: ret,
            is_static: false,
            static_context: false,
            frame: Frame::Method,
            enclosing: "run".into(),
            source: Some("A.groovy".into()),
        }
    }

    fn with_gen<R>(ret: TypeRef, f: impl FnOnce(&mut MethodGen<'_, '_>) -> R) -> R {
        let ctx = CompilationContext::default();
        let mut unit = CompileUnit::new();
        let class = unit.add_class(ClassNode::new("p.A", ClassKind::Class));
        let mut generated = Vec::new();
        let mut pool = ConstantPool::new();
        let mut output = ClassOutput::default();
        let head = head(&unit, class, ret);
        let mut gen = MethodGen::new(&ctx, &unit, &mut generated, &mut pool, &mut output, head);
        f(&mut gen)
    }

    #[test]
    fn test_int_constants_pick_short_forms() {
        with_gen(TypeRef::void(), |gen| {
            gen.push_int(3).unwrap();
            gen.push_int(100).unwrap();
            gen.push_int(1000).unwrap();
            gen.push_int(100_000).unwrap();
            assert_eq!(gen.code.buffer()[0], Opcode::Iconst3.to_u8());
            assert_eq!(gen.code.buffer()[1], Opcode::Bipush.to_u8());
            assert_eq!(gen.code.buffer()[3], Opcode::Sipush.to_u8());
            assert_eq!(gen.code.buffer()[6], Opcode::Ldc.to_u8());
            assert_eq!(gen.stack.len(), 4);
        });
    }

    #[test]
    fn test_boxing_and_unboxing() {
        with_gen(TypeRef::void(), |gen| {
            gen.push_int(1).unwrap();
            gen.coerce(&TypeRef::int(), &TypeRef::object()).unwrap();
            assert_eq!(gen.stack.peek().unwrap(), &TypeRef::class("java.lang.Integer"));
            gen.coerce(&TypeRef::class("java.lang.Integer"), &TypeRef::long()).unwrap();
            assert_eq!(gen.stack.peek().unwrap(), &TypeRef::long());
            assert_eq!(gen.stack.depth_in_slots(), 2);
        });
    }

    #[test]
    fn test_int_to_long_wrapper_widens_first() {
        with_gen(TypeRef::void(), |gen| {
            gen.push_int(1).unwrap();
            gen.coerce(&TypeRef::int(), &TypeRef::class("java.lang.Long")).unwrap();
            assert_eq!(gen.stack.peek().unwrap(), &TypeRef::class("java.lang.Long"));
            assert_eq!(gen.code.buffer()[1], Opcode::I2l.to_u8());
        });
    }

    #[test]
    fn test_void_coerces_to_default() {
        with_gen(TypeRef::void(), |gen| {
            gen.coerce(&TypeRef::void(), &TypeRef::object()).unwrap();
            assert_eq!(gen.code.buffer(), &[Opcode::AconstNull.to_u8()]);
            gen.coerce(&TypeRef::object(), &TypeRef::void()).unwrap();
            assert!(gen.stack.is_empty());
        });
    }

    #[test]
    fn test_finish_sizes_the_frame() {
        let ctx = CompilationContext::default();
        let mut unit = CompileUnit::new();
        let class = unit.add_class(ClassNode::new("p.A", ClassKind::Class));
        let mut generated = Vec::new();
        let mut pool = ConstantPool::new();
        let mut output = ClassOutput::default();
        let mut gen = MethodGen::new(
            &ctx,
            &unit,
            &mut generated,
            &mut pool,
            &mut output,
            head(&unit, class, TypeRef::long()),
        );
        gen.push_long(5).unwrap();
        gen.push_long(7).unwrap();
        gen.op(Opcode::Ladd, 2, Some(TypeRef::long())).unwrap();
        gen.emit_return(&TypeRef::long()).unwrap();
        let code = gen.finish().unwrap();
        assert_eq!(code.max_stack, 4);
        assert_eq!(code.max_locals, 1);
        assert_eq!(*code.code.last().unwrap(), Opcode::Lreturn.to_u8());
    }

    #[test]
    fn test_leftover_stack_is_internal_error() {
        let ctx = CompilationContext::default();
        let mut unit = CompileUnit::new();
        let class = unit.add_class(ClassNode::new("p.A", ClassKind::Class));
        let mut generated = Vec::new();
        let mut pool = ConstantPool::new();
        let mut output = ClassOutput::default();
        let mut gen = MethodGen::new(
            &ctx,
            &unit,
            &mut generated,
            &mut pool,
            &mut output,
            head(&unit, class, TypeRef::void()),
        );
        gen.push_int(1).unwrap();
        gen.emit_return(&TypeRef::void()).unwrap();
        let err = gen.finish().unwrap_err();
        assert!(err.is_internal());
        assert!(err.to_string().contains("class p.A, method run()V"));
    }
}
