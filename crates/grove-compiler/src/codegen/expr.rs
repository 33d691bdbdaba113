//! Expression emission
//!
//! Every emitter returns the type it left on the operand stack, `void` when
//! it left nothing. Operations the compiler can bind (locals, accessible
//! fields, primitive arithmetic, uniquely resolved static calls) become
//! direct instructions; everything else goes through the runtime helpers in
//! [`dispatch`].

use super::dispatch::{self, is_accessible_from, AccessSite};
use super::method::{array_load_op, array_store_op, Frame, MethodGen};
use crate::ast::node::capitalize;
use crate::ast::{
    names, Assign, Binary, BinaryOp, Binding, ClassId, ConstValue, ConstructorCall, CtorKind, Declaration, Expr,
    ExprKind, FieldAccess, IncDec, IncDecOp, MemberName, MethodCall, MethodNode, Modifiers, Primitive, SourcePos, StaticCall,
    TypeRef, VarId,
};
use crate::error::{CompileError, CompileResult, Location};
use grove_classfile::{Label, Opcode};

const GSTRING_IMPL: &str = "org/codehaus/groovy/runtime/GStringImpl";

/// Field reached with `getfield`/`getstatic`
#[derive(Debug, Clone)]
pub(super) struct DirectField {
    /// Internal name of the declaring class
    pub owner: String,
    pub name: String,
    pub ty: TypeRef,
    pub is_static: bool,
}

/// An assignable location, with its receiver and index already evaluated
#[derive(Debug)]
enum LValue {
    Local(VarId),
    Static(DirectField),
    Instance { field: DirectField, receiver: u16 },
    Dynamic { receiver: u16, name: DynName, attribute: bool, safe: bool },
    ArrayElement { array: u16, array_ty: TypeRef, index: u16 },
    Index { receiver: u16, index: u16 },
}

#[derive(Debug)]
enum DynName {
    Fixed(String),
    /// `String` held in a temporary
    Computed(u16),
}

/// Element of a runtime argument array
pub(super) enum ArgSource<'e> {
    Expr(&'e Expr),
    Slot(u16, TypeRef),
}

/// Numeric type both operands widen to
pub(super) fn promote(left: &TypeRef, right: &TypeRef) -> Option<Primitive> {
    let numeric = |t: &TypeRef| match t.primitive() {
        Some(Primitive::Boolean | Primitive::Void) | None => None,
        Some(p) => Some(p),
    };
    let (l, r) = (numeric(left)?, numeric(right)?);
    Some(if l == Primitive::Double || r == Primitive::Double {
        Primitive::Double
    } else if l == Primitive::Float || r == Primitive::Float {
        Primitive::Float
    } else if l == Primitive::Long || r == Primitive::Long {
        Primitive::Long
    } else {
        Primitive::Int
    })
}

fn arithmetic_opcode(op: BinaryOp, p: Primitive) -> Option<Opcode> {
    use Opcode::*;
    let table = match op {
        BinaryOp::Add => [Iadd, Ladd, Fadd, Dadd],
        BinaryOp::Sub => [Isub, Lsub, Fsub, Dsub],
        BinaryOp::Mul => [Imul, Lmul, Fmul, Dmul],
        BinaryOp::Mod => [Irem, Lrem, Frem, Drem],
        _ => return None,
    };
    Some(match p {
        Primitive::Long => table[1],
        Primitive::Float => table[2],
        Primitive::Double => table[3],
        _ => table[0],
    })
}

/// `if_icmp<op>` jumping when the comparison holds
fn int_compare(op: BinaryOp) -> Opcode {
    match op {
        BinaryOp::Eq => Opcode::IfIcmpeq,
        BinaryOp::Ne => Opcode::IfIcmpne,
        BinaryOp::Lt => Opcode::IfIcmplt,
        BinaryOp::Le => Opcode::IfIcmple,
        BinaryOp::Gt => Opcode::IfIcmpgt,
        _ => Opcode::IfIcmpge,
    }
}

/// `if<op>` against zero, for the result of `lcmp`/`fcmp`/`dcmp`
fn zero_compare(op: BinaryOp) -> Opcode {
    match op {
        BinaryOp::Eq => Opcode::Ifeq,
        BinaryOp::Ne => Opcode::Ifne,
        BinaryOp::Lt => Opcode::Iflt,
        BinaryOp::Le => Opcode::Ifle,
        BinaryOp::Gt => Opcode::Ifgt,
        _ => Opcode::Ifge,
    }
}

fn negate(op: BinaryOp) -> BinaryOp {
    match op {
        BinaryOp::Eq => BinaryOp::Ne,
        BinaryOp::Ne => BinaryOp::Eq,
        BinaryOp::Lt => BinaryOp::Ge,
        BinaryOp::Le => BinaryOp::Gt,
        BinaryOp::Gt => BinaryOp::Le,
        BinaryOp::Ge => BinaryOp::Lt,
        other => other,
    }
}

fn has_spread(args: &[Expr]) -> bool {
    args.iter().any(|a| matches!(a.kind, ExprKind::Spread(_)))
}

fn is_null(expr: &Expr) -> bool {
    matches!(expr.kind, ExprKind::Constant(ConstValue::Null))
}

impl<'a, 'g> MethodGen<'a, 'g> {
    pub(super) fn location(&self, pos: SourcePos) -> Location {
        Location {
            source: self.head.source.clone(),
            line: pos.line,
            column: pos.column,
        }
    }

    // ========================================================================
    // Entry points
    // ========================================================================

    pub(super) fn emit_expr(&mut self, expr: &Expr) -> CompileResult<TypeRef> {
        match &expr.kind {
            ExprKind::Constant(value) => self.emit_constant(value),
            ExprKind::Variable(var) => self.emit_variable(&var.name, var.binding.as_ref()),
            ExprKind::This => self.load_this(),
            ExprKind::Super => {
                let ty = self.load_this()?;
                match self.unit.class(self.head.class).super_class.clone() {
                    Some(sup) if !self.head.static_context => Ok(sup.erasure()),
                    _ => Ok(ty),
                }
            }
            ExprKind::ClassLiteral(ty) => {
                self.push_class_literal(ty)?;
                Ok(TypeRef::class(names::CLASS))
            }
            ExprKind::OuterThis(ty) => Err(self.internal(format!(
                "qualified this for {} was not rewritten",
                ty.display_name()
            ))),
            ExprKind::Property(p) => match &p.name {
                MemberName::Static(name) => self.emit_property(&p.object, name, p.safe),
                MemberName::Dynamic(name) => {
                    self.push_sender()?;
                    self.emit_value(&p.object, &TypeRef::object())?;
                    self.emit_name(name)?;
                    self.call_runtime(if p.safe {
                        dispatch::GET_PROPERTY_SAFE
                    } else {
                        dispatch::GET_PROPERTY
                    })
                }
            },
            ExprKind::Attribute(a) => self.emit_attribute(&a.object, &a.name),
            ExprKind::Field(f) => {
                match self.direct_field(self.field_receiver(f), &f.name, false) {
                    Some(field) if field.is_static => {
                        self.field_insn(Opcode::Getstatic, &field.owner, &field.name, &field.ty)?;
                        Ok(field.ty)
                    }
                    Some(field) => {
                        let owner_ty = self.unit.class(f.owner).type_ref();
                        match &f.object {
                            Some(object) => self.emit_value(object, &owner_ty)?,
                            None => {
                                self.load_this()?;
                            }
                        }
                        self.field_insn(Opcode::Getfield, &field.owner, &field.name, &field.ty)?;
                        Ok(field.ty)
                    }
                    None => {
                        self.push_sender()?;
                        match &f.object {
                            Some(object) => self.emit_value(object, &TypeRef::object())?,
                            None => {
                                let ty = self.load_this()?;
                                self.coerce(&ty, &TypeRef::object())?;
                            }
                        }
                        self.push_string(&f.name)?;
                        self.call_runtime(dispatch::GET_FIELD)
                    }
                }
            }
            ExprKind::MethodCall(call) => self.emit_method_call(call),
            ExprKind::StaticCall(call) => self.emit_static_call(call),
            ExprKind::ConstructorCall(call) => self.emit_constructor_call(call, expr),
            ExprKind::Binary(binary) => self.emit_binary(binary),
            ExprKind::Assign(assign) => self.emit_assign(assign, true),
            ExprKind::Declaration(decl) => self.emit_declaration(decl, true),
            ExprKind::IncDec(incdec) => self.emit_incdec(incdec, true),
            ExprKind::Not(_) => {
                self.bool_from_branch(|gen, when_false| gen.emit_branch(expr, when_false, false))?;
                Ok(TypeRef::boolean())
            }
            ExprKind::Negate(inner) => {
                let ty = self.emit_expr(inner)?;
                match promote(&ty, &TypeRef::int()) {
                    Some(p) => {
                        let target = TypeRef::Primitive(p);
                        self.coerce(&ty, &target)?;
                        let opcode = match p {
                            Primitive::Long => Opcode::Lneg,
                            Primitive::Float => Opcode::Fneg,
                            Primitive::Double => Opcode::Dneg,
                            _ => Opcode::Ineg,
                        };
                        self.op(opcode, 1, Some(target.clone()))?;
                        Ok(target)
                    }
                    None => {
                        self.coerce(&ty, &TypeRef::object())?;
                        self.call_runtime(dispatch::UNARY_MINUS)
                    }
                }
            }
            ExprKind::Cast(cast) => {
                let target = cast.ty.erasure();
                let ty = self.emit_expr(&cast.expr)?;
                if ty.is_reference() && target.is_reference() && !target.is_object() {
                    self.cast_reference(&target)?;
                } else {
                    self.coerce(&ty, &target)?;
                }
                Ok(target)
            }
            ExprKind::InstanceOf(test) => {
                self.emit_value(&test.expr, &TypeRef::object())?;
                self.type_insn(Opcode::Instanceof, &test.ty.boxed())?;
                Ok(TypeRef::boolean())
            }
            ExprKind::Ternary(ternary) => {
                let result = self.static_type(expr);
                let otherwise = self.new_label();
                let end = self.new_label();
                self.emit_branch(&ternary.cond, otherwise, false)?;
                let depth = self.stack.len();
                self.emit_value(&ternary.then, &result)?;
                self.jump(Opcode::Goto, end)?;
                self.place(otherwise);
                self.stack.reset_to(depth)?;
                self.emit_value(&ternary.otherwise, &result)?;
                self.place(end);
                Ok(result)
            }
            ExprKind::List(items) => self.emit_list(items),
            ExprKind::Map(entries) => {
                let items: Vec<ArgSource<'_>> = entries
                    .iter()
                    .flat_map(|e| [ArgSource::Expr(&e.key), ArgSource::Expr(&e.value)])
                    .collect();
                self.emit_object_array(&items)?;
                self.call_runtime(dispatch::CREATE_MAP)
            }
            ExprKind::Array(literal) => {
                let elem = literal.elem.erasure();
                self.push_int(literal.values.len() as i32)?;
                self.new_array(&elem)?;
                for (i, value) in literal.values.iter().enumerate() {
                    self.dup_value()?;
                    self.push_int(i as i32)?;
                    self.emit_value(value, &elem)?;
                    self.op(array_store_op(&elem), 3, None)?;
                }
                Ok(TypeRef::array(elem))
            }
            ExprKind::Closure(closure) => self.emit_closure(closure, expr.pos),
            ExprKind::GString(gstring) => {
                self.type_insn(Opcode::New, &TypeRef::class(GSTRING_IMPL.replace('/', ".")))?;
                self.dup_value()?;
                let values: Vec<ArgSource<'_>> = gstring.values.iter().map(ArgSource::Expr).collect();
                self.emit_object_array(&values)?;
                self.push_int(gstring.strings.len() as i32)?;
                self.new_array(&TypeRef::string())?;
                for (i, part) in gstring.strings.iter().enumerate() {
                    self.dup_value()?;
                    self.push_int(i as i32)?;
                    self.push_string(part)?;
                    self.op(Opcode::Aastore, 3, None)?;
                }
                self.invoke(
                    Opcode::Invokespecial,
                    GSTRING_IMPL,
                    "<init>",
                    "([Ljava/lang/Object;[Ljava/lang/String;)V",
                )?;
                let gstring_ty = TypeRef::class(names::GSTRING);
                self.stack.replace_top(gstring_ty.clone())?;
                Ok(gstring_ty)
            }
            ExprKind::Spread(_) => Err(CompileError::semantic(
                "spread expressions are only allowed in argument lists",
                self.location(expr.pos),
            )),
            ExprKind::Annotation(_) => Err(self.internal("annotation used as an expression")),
        }
    }

    /// Emit `expr` and convert the result to `ty`
    pub(super) fn emit_value(&mut self, expr: &Expr, ty: &TypeRef) -> CompileResult<()> {
        let actual = self.emit_expr(expr)?;
        self.coerce(&actual, ty)
    }

    /// Emit `expr` for its side effects only
    pub(super) fn emit_discard(&mut self, expr: &Expr) -> CompileResult<()> {
        let ty = match &expr.kind {
            ExprKind::Assign(assign) => self.emit_assign(assign, false)?,
            ExprKind::Declaration(decl) => self.emit_declaration(decl, false)?,
            ExprKind::IncDec(incdec) => self.emit_incdec(incdec, false)?,
            _ => self.emit_expr(expr)?,
        };
        self.coerce(&ty, &TypeRef::void())
    }

    fn emit_constant(&mut self, value: &ConstValue) -> CompileResult<TypeRef> {
        match value {
            ConstValue::Null => self.push_null(TypeRef::object())?,
            ConstValue::Bool(b) => self.push_int_as(i32::from(*b), TypeRef::boolean())?,
            ConstValue::Int(i) => self.push_int(*i)?,
            ConstValue::Long(l) => self.push_long(*l)?,
            ConstValue::Float(f) => self.push_float(*f)?,
            ConstValue::Double(d) => self.push_double(*d)?,
            ConstValue::Char(c) => self.push_int_as(*c as i32, TypeRef::Primitive(Primitive::Char))?,
            ConstValue::String(s) => self.push_string(s)?,
        }
        Ok(value.type_ref())
    }

    /// Computed member name → `String`
    fn emit_name(&mut self, name: &Expr) -> CompileResult<()> {
        self.emit_value(name, &TypeRef::object())?;
        self.invoke(Opcode::Invokevirtual, "java/lang/Object", "toString", "()Ljava/lang/String;")?;
        Ok(())
    }

    // ========================================================================
    // Static types
    // ========================================================================

    /// Type `emit_expr` will leave for `expr`
    pub(super) fn static_type(&self, expr: &Expr) -> TypeRef {
        match &expr.kind {
            ExprKind::Constant(value) => value.type_ref(),
            ExprKind::Variable(var) => match &var.binding {
                Some(Binding::Local(id)) => Some(self.unit.vars.get(*id).ty.erasure()),
                Some(Binding::Field { owner, .. }) => self.implicit_field(*owner, &var.name, false),
                Some(Binding::Property { owner, .. }) => self.implicit_field(*owner, &var.name, true),
                _ => None,
            }
            .unwrap_or_else(TypeRef::object),
            ExprKind::This | ExprKind::Super if self.head.static_context => TypeRef::class(names::CLASS),
            ExprKind::This => self.class_type(),
            ExprKind::Super => self
                .unit
                .class(self.head.class)
                .super_class
                .as_ref()
                .map_or_else(|| self.class_type(), TypeRef::erasure),
            ExprKind::ClassLiteral(_) => TypeRef::class(names::CLASS),
            ExprKind::Property(p) => match (&p.name, p.safe) {
                (MemberName::Static(name), false) => self
                    .property_field(&p.object, name, true)
                    .map(|f| f.ty)
                    .unwrap_or_else(|| {
                        if name == "length" && self.static_type(&p.object).is_array() {
                            TypeRef::int()
                        } else {
                            TypeRef::object()
                        }
                    }),
                _ => TypeRef::object(),
            },
            ExprKind::Attribute(a) => self
                .property_field(&a.object, &a.name, false)
                .map_or_else(TypeRef::object, |f| f.ty),
            ExprKind::Field(f) => self
                .direct_field(self.field_receiver(f), &f.name, false)
                .map_or_else(TypeRef::object, |f| f.ty),
            ExprKind::MethodCall(call) => match (&*call.object, &call.name) {
                (Expr { kind: ExprKind::Super, .. }, MemberName::Static(name)) => self
                    .super_target(name, &call.args)
                    .map_or_else(TypeRef::object, |(_, m)| m.return_type.erasure()),
                _ => TypeRef::object(),
            },
            ExprKind::StaticCall(call) => self
                .static_target(call)
                .map_or_else(TypeRef::object, |(_, m)| m.return_type.erasure()),
            ExprKind::ConstructorCall(call) => match call.kind {
                CtorKind::New => match call.anonymous {
                    Some(anon) => self.unit.class(anon).type_ref(),
                    None => call.ty.erasure(),
                },
                _ => TypeRef::void(),
            },
            ExprKind::Binary(binary) => self.binary_type(binary),
            ExprKind::Assign(assign) => self.static_type(&assign.target),
            ExprKind::Declaration(decl) => decl
                .var
                .map_or_else(|| decl.ty.erasure(), |v| self.unit.vars.get(v).ty.erasure()),
            ExprKind::IncDec(incdec) => self.static_type(&incdec.target),
            ExprKind::Not(_) | ExprKind::InstanceOf(_) => TypeRef::boolean(),
            ExprKind::Negate(inner) => promote(&self.static_type(inner), &TypeRef::int())
                .map_or_else(TypeRef::object, TypeRef::Primitive),
            ExprKind::Cast(cast) => cast.ty.erasure(),
            ExprKind::Ternary(t) => {
                let (a, b) = (self.static_type(&t.then), self.static_type(&t.otherwise));
                if a == b {
                    a
                } else {
                    promote(&a, &b).map_or_else(TypeRef::object, TypeRef::Primitive)
                }
            }
            ExprKind::List(_) => TypeRef::class(names::LIST),
            ExprKind::Map(_) => TypeRef::class(names::MAP),
            ExprKind::Array(a) => TypeRef::array(a.elem.erasure()),
            ExprKind::Closure(_) => TypeRef::class(names::CLOSURE),
            ExprKind::GString(_) => TypeRef::class(names::GSTRING),
            ExprKind::OuterThis(_) | ExprKind::Spread(_) | ExprKind::Annotation(_) => TypeRef::object(),
        }
    }

    fn binary_type(&self, binary: &Binary) -> TypeRef {
        let (l, r) = (self.static_type(&binary.left), self.static_type(&binary.right));
        match binary.op {
            op if op.is_comparison() || op.is_logical() => TypeRef::boolean(),
            BinaryOp::Index => match l.component() {
                Some(component) if r.primitive().is_some_and(Primitive::is_int_like) => component.erasure(),
                _ => TypeRef::object(),
            },
            BinaryOp::Div => TypeRef::object(),
            _ => promote(&l, &r).map_or_else(TypeRef::object, TypeRef::Primitive),
        }
    }

    // ========================================================================
    // Field selection
    // ========================================================================

    fn can_access(&self, modifiers: Modifiers, declaring: ClassId) -> bool {
        let site = match self.head.frame {
            Frame::Method => AccessSite::Class(self.head.class),
            Frame::Closure => AccessSite::Generated(self.head.class),
        };
        is_accessible_from(self.unit, modifiers, declaring, site)
    }

    /// Class of the instance an unqualified member of `owner` is read from:
    /// the current class when it inherits `owner`, otherwise the enclosing
    /// instance
    fn implicit_receiver(&self, owner: ClassId) -> ClassId {
        if self.unit.is_subclass_of(self.head.class, owner) {
            self.head.class
        } else {
            owner
        }
    }

    /// Receiver class of a field expression; an object not statically
    /// known to inherit the owner is cast to it first
    fn field_receiver(&self, f: &FieldAccess) -> ClassId {
        match &f.object {
            Some(object) => self
                .unit
                .resolve(&self.static_type(object))
                .filter(|&class| self.unit.is_subclass_of(class, f.owner))
                .unwrap_or(f.owner),
            None => self.implicit_receiver(f.owner),
        }
    }

    /// Field `name` of an instance of `receiver` when it can be accessed
    /// with a field instruction
    ///
    /// With `via_property`, a getter anywhere between `receiver` and the
    /// declaring class wins over the field unless the field belongs to the
    /// lexical class itself.
    pub(super) fn direct_field(&self, receiver: ClassId, name: &str, via_property: bool) -> Option<DirectField> {
        let (declaring, field) = self.unit.find_field(receiver, name)?;
        if via_property && declaring != self.head.class {
            let getter = format!("get{}", capitalize(name));
            let chain = std::iter::once(receiver).chain(self.unit.superclasses(receiver));
            for cid in chain {
                let class = self.unit.class(cid);
                if class.property(name).is_some() || class.has_method(&getter, 0) {
                    return None;
                }
                if cid == declaring {
                    break;
                }
            }
        }
        if !self.can_access(field.modifiers, declaring) {
            return None;
        }
        let is_static = field.modifiers.is_static();
        let same_package = self.unit.class(declaring).package() == self.unit.class(self.head.class).package();
        // protected instance fields from another package only through
        // receivers of the current class or its subclasses
        if field.modifiers.is_protected()
            && !same_package
            && !is_static
            && !self.unit.is_subclass_of(receiver, self.head.class)
        {
            return None;
        }
        Some(DirectField {
            owner: self.unit.class(declaring).internal_name(),
            name: name.to_string(),
            ty: field.ty.erasure(),
            is_static,
        })
    }

    /// Direct field behind an unqualified name bound to a member of `owner`
    fn unqualified_field(&self, owner: ClassId, name: &str, via_property: bool) -> Option<DirectField> {
        self.direct_field(self.implicit_receiver(owner), name, via_property)
            .filter(|f| f.is_static || !self.head.static_context)
    }

    /// Type of a field named without a receiver, if read directly
    fn implicit_field(&self, owner: ClassId, name: &str, via_property: bool) -> Option<TypeRef> {
        self.unqualified_field(owner, name, via_property).map(|f| f.ty)
    }

    /// Direct field behind `object.name`
    fn property_field(&self, object: &Expr, name: &str, via_property: bool) -> Option<DirectField> {
        if let ExprKind::ClassLiteral(ty) = &object.kind {
            let field = self.direct_field(self.unit.resolve(ty)?, name, via_property)?;
            return field.is_static.then_some(field);
        }
        let receiver = self.static_type(object);
        let class = self.unit.resolve(&receiver)?;
        let field = self.direct_field(class, name, via_property)?;
        (!field.is_static).then_some(field)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    fn emit_variable(&mut self, name: &str, binding: Option<&Binding>) -> CompileResult<TypeRef> {
        let (owner, via_property) = match binding {
            Some(Binding::Local(var)) => return self.load_var(*var),
            Some(Binding::Field { owner, .. }) => (Some(*owner), false),
            Some(Binding::Property { owner, .. }) => (Some(*owner), true),
            Some(Binding::Dynamic { .. }) | None => (None, false),
        };
        let direct = owner.and_then(|o| self.unqualified_field(o, name, via_property));
        match direct {
            Some(field) if field.is_static => {
                self.field_insn(Opcode::Getstatic, &field.owner, &field.name, &field.ty)?;
                Ok(field.ty)
            }
            Some(field) => {
                self.load_this()?;
                self.field_insn(Opcode::Getfield, &field.owner, &field.name, &field.ty)?;
                Ok(field.ty)
            }
            None => {
                self.push_sender()?;
                let receiver = self.load_implicit_receiver()?;
                self.coerce(&receiver, &TypeRef::object())?;
                self.push_string(name)?;
                self.call_runtime(dispatch::GET_PROPERTY)
            }
        }
    }

    fn emit_property(&mut self, object: &Expr, name: &str, safe: bool) -> CompileResult<TypeRef> {
        if !safe {
            if let Some(field) = self.property_field(object, name, true) {
                return self.read_direct(object, field);
            }
            if name == "length" && self.static_type(object).is_array() {
                self.emit_expr(object)?;
                self.op(Opcode::Arraylength, 1, Some(TypeRef::int()))?;
                return Ok(TypeRef::int());
            }
        }
        self.push_sender()?;
        self.emit_value(object, &TypeRef::object())?;
        self.push_string(name)?;
        self.call_runtime(if safe {
            dispatch::GET_PROPERTY_SAFE
        } else {
            dispatch::GET_PROPERTY
        })
    }

    fn emit_attribute(&mut self, object: &Expr, name: &str) -> CompileResult<TypeRef> {
        if let Some(field) = self.property_field(object, name, false) {
            return self.read_direct(object, field);
        }
        self.push_sender()?;
        self.emit_value(object, &TypeRef::object())?;
        self.push_string(name)?;
        self.call_runtime(dispatch::GET_FIELD)
    }

    fn read_direct(&mut self, object: &Expr, field: DirectField) -> CompileResult<TypeRef> {
        if field.is_static {
            self.field_insn(Opcode::Getstatic, &field.owner, &field.name, &field.ty)?;
        } else {
            self.emit_expr(object)?;
            self.field_insn(Opcode::Getfield, &field.owner, &field.name, &field.ty)?;
        }
        Ok(field.ty)
    }

    // ========================================================================
    // Assignment
    // ========================================================================

    /// Evaluate the receiver and index parts of an assignment target
    fn prepare_lvalue(&mut self, target: &Expr) -> CompileResult<LValue> {
        let invalid = || {
            CompileError::semantic("invalid assignment target", self.location(target.pos))
        };
        match &target.kind {
            ExprKind::Variable(var) => {
                let (owner, via_property) = match &var.binding {
                    Some(Binding::Local(id)) => return Ok(LValue::Local(*id)),
                    Some(Binding::Field { owner, .. }) => (Some(*owner), false),
                    Some(Binding::Property { owner, .. }) => (Some(*owner), true),
                    _ => (None, false),
                };
                let direct = owner.and_then(|o| self.unqualified_field(o, &var.name, via_property));
                match direct {
                    Some(field) if field.is_static => Ok(LValue::Static(field)),
                    Some(field) => {
                        self.load_this()?;
                        let (receiver, _) = self.store_temp()?;
                        Ok(LValue::Instance { field, receiver })
                    }
                    None => {
                        let ty = self.load_implicit_receiver()?;
                        self.coerce(&ty, &TypeRef::object())?;
                        let (receiver, _) = self.store_temp()?;
                        Ok(LValue::Dynamic {
                            receiver,
                            name: DynName::Fixed(var.name.clone()),
                            attribute: false,
                            safe: false,
                        })
                    }
                }
            }
            ExprKind::Property(p) => {
                if let (MemberName::Static(name), false) = (&p.name, p.safe) {
                    if let Some(field) = self.property_field(&p.object, name, true) {
                        return self.prepare_direct(&p.object, field);
                    }
                }
                self.prepare_dynamic(&p.object, &p.name, false, p.safe)
            }
            ExprKind::Attribute(a) => match self.property_field(&a.object, &a.name, false) {
                Some(field) => self.prepare_direct(&a.object, field),
                None => self.prepare_dynamic(&a.object, &MemberName::Static(a.name.clone()), true, false),
            },
            ExprKind::Field(f) => match self.direct_field(self.field_receiver(f), &f.name, false) {
                Some(field) if field.is_static => Ok(LValue::Static(field)),
                Some(field) => {
                    let owner_ty = self.unit.class(f.owner).type_ref();
                    match &f.object {
                        Some(object) => self.emit_value(object, &owner_ty)?,
                        None => {
                            self.load_this()?;
                        }
                    }
                    let (receiver, _) = self.store_temp()?;
                    Ok(LValue::Instance { field, receiver })
                }
                None => {
                    let this = Expr {
                        kind: ExprKind::This,
                        ..target.clone()
                    };
                    let object = f.object.as_deref().unwrap_or(&this);
                    self.prepare_dynamic(object, &MemberName::Static(f.name.clone()), true, false)
                }
            },
            ExprKind::Binary(Binary {
                op: BinaryOp::Index,
                left,
                right,
            }) => {
                let array_ty = self.static_type(left);
                let index_ty = self.static_type(right);
                if array_ty.is_array() && index_ty.primitive().is_some_and(Primitive::is_int_like) {
                    self.emit_value(left, &array_ty)?;
                    let (array, _) = self.store_temp()?;
                    self.emit_value(right, &TypeRef::int())?;
                    let (index, _) = self.store_temp()?;
                    Ok(LValue::ArrayElement { array, array_ty, index })
                } else {
                    self.emit_value(left, &TypeRef::object())?;
                    let (receiver, _) = self.store_temp()?;
                    self.emit_value(right, &TypeRef::object())?;
                    let (index, _) = self.store_temp()?;
                    Ok(LValue::Index { receiver, index })
                }
            }
            _ => Err(invalid()),
        }
    }

    fn prepare_direct(&mut self, object: &Expr, field: DirectField) -> CompileResult<LValue> {
        if field.is_static {
            return Ok(LValue::Static(field));
        }
        self.emit_expr(object)?;
        let (receiver, _) = self.store_temp()?;
        Ok(LValue::Instance { field, receiver })
    }

    fn prepare_dynamic(&mut self, object: &Expr, name: &MemberName, attribute: bool, safe: bool) -> CompileResult<LValue> {
        self.emit_value(object, &TypeRef::object())?;
        let (receiver, _) = self.store_temp()?;
        let name = match name {
            MemberName::Static(name) => DynName::Fixed(name.clone()),
            MemberName::Dynamic(expr) => {
                self.emit_name(expr)?;
                DynName::Computed(self.store_temp()?.0)
            }
        };
        Ok(LValue::Dynamic {
            receiver,
            name,
            attribute,
            safe,
        })
    }

    fn lvalue_type(&self, lvalue: &LValue) -> TypeRef {
        match lvalue {
            LValue::Local(var) => self.unit.vars.get(*var).ty.erasure(),
            LValue::Static(field) | LValue::Instance { field, .. } => field.ty.clone(),
            LValue::ArrayElement { array_ty, .. } => array_ty.component().map_or_else(TypeRef::object, TypeRef::erasure),
            LValue::Dynamic { .. } | LValue::Index { .. } => TypeRef::object(),
        }
    }

    fn push_dyn_name(&mut self, name: &DynName) -> CompileResult<()> {
        match name {
            DynName::Fixed(name) => self.push_string(name),
            DynName::Computed(slot) => self.load_slot(*slot, &TypeRef::string()),
        }
    }

    fn load_lvalue(&mut self, lvalue: &LValue) -> CompileResult<TypeRef> {
        match lvalue {
            LValue::Local(var) => self.load_var(*var),
            LValue::Static(field) => {
                self.field_insn(Opcode::Getstatic, &field.owner, &field.name, &field.ty)?;
                Ok(field.ty.clone())
            }
            LValue::Instance { field, receiver } => {
                self.load_slot(*receiver, &TypeRef::class(field.owner.replace('/', ".")))?;
                self.field_insn(Opcode::Getfield, &field.owner, &field.name, &field.ty)?;
                Ok(field.ty.clone())
            }
            LValue::Dynamic {
                receiver,
                name,
                attribute,
                safe,
            } => {
                self.push_sender()?;
                self.load_slot(*receiver, &TypeRef::object())?;
                self.push_dyn_name(name)?;
                self.call_runtime(match (attribute, safe) {
                    (true, _) => dispatch::GET_FIELD,
                    (false, true) => dispatch::GET_PROPERTY_SAFE,
                    (false, false) => dispatch::GET_PROPERTY,
                })
            }
            LValue::ArrayElement { array, array_ty, index } => {
                let component = self.lvalue_type(lvalue);
                self.load_slot(*array, array_ty)?;
                self.load_slot(*index, &TypeRef::int())?;
                self.op(array_load_op(&component), 2, Some(component.clone()))?;
                Ok(component)
            }
            LValue::Index { receiver, index } => self.invoke_dynamic(
                *receiver,
                "getAt",
                &[ArgSource::Slot(*index, TypeRef::object())],
            ),
        }
    }

    /// Store the value on top, of type `value_ty`, into `lvalue`
    fn store_lvalue(&mut self, lvalue: &LValue, value_ty: &TypeRef) -> CompileResult<()> {
        let target = self.lvalue_type(lvalue);
        match lvalue {
            LValue::Local(var) => self.store_var(*var, value_ty),
            LValue::Static(field) => {
                self.coerce(value_ty, &target)?;
                self.field_insn(Opcode::Putstatic, &field.owner, &field.name, &field.ty)
            }
            LValue::Instance { field, receiver } => {
                self.coerce(value_ty, &target)?;
                let (value, ty) = self.store_temp()?;
                self.load_slot(*receiver, &TypeRef::class(field.owner.replace('/', ".")))?;
                self.load_slot(value, &ty)?;
                self.field_insn(Opcode::Putfield, &field.owner, &field.name, &field.ty)
            }
            LValue::Dynamic {
                receiver,
                name,
                attribute,
                safe,
            } => {
                self.coerce(value_ty, &TypeRef::object())?;
                let (value, _) = self.store_temp()?;
                self.load_slot(value, &TypeRef::object())?;
                self.push_sender()?;
                self.load_slot(*receiver, &TypeRef::object())?;
                self.push_dyn_name(name)?;
                self.call_runtime(match (attribute, safe) {
                    (true, _) => dispatch::SET_FIELD,
                    (false, true) => dispatch::SET_PROPERTY_SAFE,
                    (false, false) => dispatch::SET_PROPERTY,
                })?;
                Ok(())
            }
            LValue::ArrayElement { array, array_ty, index } => {
                self.coerce(value_ty, &target)?;
                let (value, ty) = self.store_temp()?;
                self.load_slot(*array, array_ty)?;
                self.load_slot(*index, &TypeRef::int())?;
                self.load_slot(value, &ty)?;
                self.op(array_store_op(&target), 3, None)
            }
            LValue::Index { receiver, index } => {
                self.coerce(value_ty, &TypeRef::object())?;
                let (value, _) = self.store_temp()?;
                let result = self.invoke_dynamic(
                    *receiver,
                    "putAt",
                    &[
                        ArgSource::Slot(*index, TypeRef::object()),
                        ArgSource::Slot(value, TypeRef::object()),
                    ],
                )?;
                self.coerce(&result, &TypeRef::void())
            }
        }
    }

    fn emit_assign(&mut self, assign: &Assign, want: bool) -> CompileResult<TypeRef> {
        let lvalue = self.prepare_lvalue(&assign.target)?;
        let target = self.lvalue_type(&lvalue);
        match assign.op {
            None => self.emit_value(&assign.value, &target)?,
            Some(op) => {
                let current = self.load_lvalue(&lvalue)?;
                let result = self.apply_binary(op, current, &assign.value)?;
                self.coerce(&result, &target)?;
            }
        }
        if want {
            self.dup_value()?;
        }
        self.store_lvalue(&lvalue, &target)?;
        Ok(if want { target } else { TypeRef::void() })
    }

    fn emit_incdec(&mut self, incdec: &IncDec, want: bool) -> CompileResult<TypeRef> {
        let lvalue = self.prepare_lvalue(&incdec.target)?;
        let target = self.lvalue_type(&lvalue);
        let current = self.load_lvalue(&lvalue)?;
        self.coerce(&current, &target)?;
        if want && !incdec.prefix {
            self.dup_value()?;
        }
        match promote(&target, &TypeRef::int()) {
            Some(p) => {
                let work = TypeRef::Primitive(p);
                self.coerce(&target, &work)?;
                match p {
                    Primitive::Long => self.push_long(1)?,
                    Primitive::Float => self.push_float(1.0)?,
                    Primitive::Double => self.push_double(1.0)?,
                    _ => self.push_int(1)?,
                }
                let op = match incdec.op {
                    IncDecOp::Increment => BinaryOp::Add,
                    IncDecOp::Decrement => BinaryOp::Sub,
                };
                let opcode = arithmetic_opcode(op, p).ok_or_else(|| self.internal("no opcode for ++/--"))?;
                self.op(opcode, 2, Some(work.clone()))?;
                self.coerce(&work, &target)?;
            }
            None => {
                self.coerce(&target, &TypeRef::object())?;
                let (receiver, _) = self.store_temp()?;
                let name = match incdec.op {
                    IncDecOp::Increment => "next",
                    IncDecOp::Decrement => "previous",
                };
                let result = self.invoke_dynamic(receiver, name, &[])?;
                self.coerce(&result, &target)?;
            }
        }
        if want && incdec.prefix {
            self.dup_value()?;
        }
        self.store_lvalue(&lvalue, &target)?;
        Ok(if want { target } else { TypeRef::void() })
    }

    fn emit_declaration(&mut self, decl: &Declaration, want: bool) -> CompileResult<TypeRef> {
        let var = decl
            .var
            .ok_or_else(|| self.internal(format!("declaration of '{}' was not resolved", decl.name)))?;
        let ty = self.unit.vars.get(var).ty.erasure();
        if self.unit.vars.get(var).closure_shared {
            // The cell exists before the initializer runs so a closure in it
            // can refer to the variable being declared
            let slot = self.define_local(var);
            let reference = TypeRef::class(names::REFERENCE);
            self.type_insn(Opcode::New, &reference)?;
            self.dup_value()?;
            self.invoke(Opcode::Invokespecial, &reference.internal_name(), "<init>", "()V")?;
            self.store_slot(slot.index, &reference)?;
            match &decl.init {
                Some(init) => self.emit_value(init, &ty)?,
                None => self.push_default(&ty)?,
            }
            if want {
                self.dup_value()?;
            }
            self.store_var(var, &ty)?;
        } else {
            match &decl.init {
                Some(init) => self.emit_value(init, &ty)?,
                None => self.push_default(&ty)?,
            }
            if want {
                self.dup_value()?;
            }
            let slot = self.define_local(var);
            self.store_slot(slot.index, &ty)?;
        }
        Ok(if want { ty } else { TypeRef::void() })
    }

    // ========================================================================
    // Operators
    // ========================================================================

    fn emit_binary(&mut self, binary: &Binary) -> CompileResult<TypeRef> {
        let op = binary.op;
        if op.is_comparison() || op.is_logical() {
            self.bool_from_branch(|gen, when_false| gen.emit_binary_branch(binary, when_false, false))?;
            return Ok(TypeRef::boolean());
        }
        if op == BinaryOp::Index {
            let array_ty = self.static_type(&binary.left);
            let int_index = self.static_type(&binary.right).primitive().is_some_and(Primitive::is_int_like);
            if let (Some(component), true) = (array_ty.component(), int_index) {
                let result = component.erasure();
                self.emit_value(&binary.left, &array_ty)?;
                self.emit_value(&binary.right, &TypeRef::int())?;
                self.op(array_load_op(&result), 2, Some(result.clone()))?;
                return Ok(result);
            }
        }
        let left = self.emit_expr(&binary.left)?;
        self.apply_binary(op, left, &binary.right)
    }

    /// Apply `op` to the left operand already on the stack and `right`
    fn apply_binary(&mut self, op: BinaryOp, left: TypeRef, right: &Expr) -> CompileResult<TypeRef> {
        if op != BinaryOp::Div {
            if let (Some(p), Some(_)) = (promote(&left, &self.static_type(right)), arithmetic_opcode(op, Primitive::Int)) {
                let work = TypeRef::Primitive(p);
                self.coerce(&left, &work)?;
                self.emit_value(right, &work)?;
                let opcode = arithmetic_opcode(op, p).ok_or_else(|| self.internal("no arithmetic opcode"))?;
                self.op(opcode, 2, Some(work.clone()))?;
                return Ok(work);
            }
        }
        self.coerce(&left, &TypeRef::object())?;
        let (receiver, _) = self.store_temp()?;
        self.invoke_dynamic(receiver, op.method_name(), &[ArgSource::Expr(right)])
    }

    /// Jump to `label` when the Groovy truth of `expr` equals `jump_when`
    pub(super) fn emit_branch(&mut self, expr: &Expr, label: Label, jump_when: bool) -> CompileResult<()> {
        match &expr.kind {
            ExprKind::Not(inner) => return self.emit_branch(inner, label, !jump_when),
            ExprKind::Constant(ConstValue::Bool(value)) => {
                if *value == jump_when {
                    self.jump(Opcode::Goto, label)?;
                }
                return Ok(());
            }
            ExprKind::Binary(binary) if binary.op.is_comparison() || binary.op.is_logical() => {
                return self.emit_binary_branch(binary, label, jump_when)
            }
            _ => {}
        }
        let ty = self.emit_expr(expr)?;
        self.truth(&ty)?;
        self.jump(if jump_when { Opcode::Ifne } else { Opcode::Ifeq }, label)
    }

    fn emit_binary_branch(&mut self, binary: &Binary, label: Label, jump_when: bool) -> CompileResult<()> {
        if !binary.op.is_logical() {
            return self.emit_comparison(binary, label, jump_when);
        }
        // `a && b` is decided as soon as `a` is false, `a || b` as soon as
        // `a` is true
        let decided_on = binary.op == BinaryOp::Or;
        if jump_when == decided_on {
            self.emit_branch(&binary.left, label, jump_when)?;
            self.emit_branch(&binary.right, label, jump_when)?;
        } else {
            let skip = self.new_label();
            self.emit_branch(&binary.left, skip, decided_on)?;
            self.emit_branch(&binary.right, label, jump_when)?;
            self.place(skip);
        }
        Ok(())
    }

    fn emit_comparison(&mut self, binary: &Binary, label: Label, jump_when: bool) -> CompileResult<()> {
        let op = if jump_when { binary.op } else { negate(binary.op) };
        let equality = matches!(binary.op, BinaryOp::Eq | BinaryOp::Ne);

        // x == null
        if equality && (is_null(&binary.left) || is_null(&binary.right)) {
            let other = if is_null(&binary.right) { &binary.left } else { &binary.right };
            if self.static_type(other).is_reference() {
                self.emit_value(other, &TypeRef::object())?;
                let opcode = if op == BinaryOp::Eq { Opcode::Ifnull } else { Opcode::Ifnonnull };
                return self.jump(opcode, label);
            }
        }

        let (l, r) = (self.static_type(&binary.left), self.static_type(&binary.right));
        let work = match promote(&l, &r) {
            Some(p) => Some(p),
            None if equality && l.is_boolean() && r.is_boolean() => Some(Primitive::Int),
            None => None,
        };
        match work {
            Some(p) => {
                let work_ty = if p == Primitive::Int && l.is_boolean() {
                    TypeRef::boolean()
                } else {
                    TypeRef::Primitive(p)
                };
                self.emit_value(&binary.left, &work_ty)?;
                self.emit_value(&binary.right, &work_ty)?;
                let compare = match p {
                    Primitive::Long => Some(Opcode::Lcmp),
                    Primitive::Float if matches!(binary.op, BinaryOp::Lt | BinaryOp::Le) => Some(Opcode::Fcmpg),
                    Primitive::Float => Some(Opcode::Fcmpl),
                    Primitive::Double if matches!(binary.op, BinaryOp::Lt | BinaryOp::Le) => Some(Opcode::Dcmpg),
                    Primitive::Double => Some(Opcode::Dcmpl),
                    _ => None,
                };
                match compare {
                    Some(opcode) => {
                        self.op(opcode, 2, Some(TypeRef::int()))?;
                        self.jump(zero_compare(op), label)
                    }
                    None => self.jump(int_compare(op), label),
                }
            }
            None => {
                let call = dispatch::comparison(binary.op)
                    .ok_or_else(|| self.internal("not a comparison operator"))?;
                self.emit_value(&binary.left, &TypeRef::object())?;
                self.emit_value(&binary.right, &TypeRef::object())?;
                self.call_runtime(call)?;
                self.jump(if jump_when { Opcode::Ifne } else { Opcode::Ifeq }, label)
            }
        }
    }

    // ========================================================================
    // Calls
    // ========================================================================

    /// `Object[]` holding the boxed values
    pub(super) fn emit_object_array(&mut self, items: &[ArgSource<'_>]) -> CompileResult<()> {
        let object = TypeRef::object();
        self.push_int(items.len() as i32)?;
        self.new_array(&object)?;
        for (i, item) in items.iter().enumerate() {
            self.dup_value()?;
            self.push_int(i as i32)?;
            match item {
                ArgSource::Expr(expr) => self.emit_value(expr, &object)?,
                ArgSource::Slot(slot, ty) => {
                    self.load_slot(*slot, ty)?;
                    self.coerce(ty, &object)?;
                }
            }
            self.op(Opcode::Aastore, 3, None)?;
        }
        Ok(())
    }

    /// Argument array for a dynamic call, expanding `*spread` arguments
    pub(super) fn emit_arguments(&mut self, args: &[Expr]) -> CompileResult<()> {
        if !has_spread(args) {
            let items: Vec<ArgSource<'_>> = args.iter().map(ArgSource::Expr).collect();
            return self.emit_object_array(&items);
        }
        let mut normal = Vec::new();
        let mut spread = Vec::new();
        let mut positions = Vec::new();
        for arg in args {
            match &arg.kind {
                ExprKind::Spread(inner) => {
                    positions.push(normal.len() as i32);
                    spread.push(ArgSource::Expr(inner));
                }
                _ => normal.push(ArgSource::Expr(arg)),
            }
        }
        self.emit_object_array(&normal)?;
        self.emit_object_array(&spread)?;
        self.push_int(positions.len() as i32)?;
        self.new_array(&TypeRef::int())?;
        for (i, position) in positions.into_iter().enumerate() {
            self.dup_value()?;
            self.push_int(i as i32)?;
            self.push_int(position)?;
            self.op(Opcode::Iastore, 3, None)?;
        }
        self.call_runtime(dispatch::DESPREAD_LIST)?;
        Ok(())
    }

    /// `invokeMethodN(sender, receiver, name, args)` with the receiver in a temporary
    pub(super) fn invoke_dynamic(&mut self, receiver: u16, name: &str, args: &[ArgSource<'_>]) -> CompileResult<TypeRef> {
        self.push_sender()?;
        self.load_slot(receiver, &TypeRef::object())?;
        self.push_string(name)?;
        self.emit_object_array(args)?;
        self.call_runtime(dispatch::INVOKE_METHOD)
    }

    fn emit_method_call(&mut self, call: &MethodCall) -> CompileResult<TypeRef> {
        if let (ExprKind::Super, MemberName::Static(name)) = (&call.object.kind, &call.name) {
            return self.emit_super_call(name, &call.args);
        }
        if call.implicit_this && self.head.static_context && self.head.frame == Frame::Method {
            self.push_sender()?;
            let class_ty = self.class_type();
            self.push_class_literal(&class_ty)?;
            self.emit_member_name(&call.name)?;
            self.emit_arguments(&call.args)?;
            return self.call_runtime(dispatch::INVOKE_STATIC);
        }
        self.push_sender()?;
        let receiver = if call.implicit_this {
            self.load_implicit_receiver()?
        } else {
            self.emit_expr(&call.object)?
        };
        self.coerce(&receiver, &TypeRef::object())?;
        self.emit_member_name(&call.name)?;
        self.emit_arguments(&call.args)?;
        self.call_runtime(if call.safe {
            dispatch::INVOKE_METHOD_SAFE
        } else {
            dispatch::INVOKE_METHOD
        })
    }

    fn emit_member_name(&mut self, name: &MemberName) -> CompileResult<()> {
        match name {
            MemberName::Static(name) => self.push_string(name),
            MemberName::Dynamic(expr) => self.emit_name(expr),
        }
    }

    /// Unique superclass method `super.name(args)` can call with `invokespecial`
    fn super_target(&self, name: &str, args: &[Expr]) -> Option<(ClassId, &'a MethodNode)> {
        if self.head.frame != Frame::Method || self.head.static_context || has_spread(args) {
            return None;
        }
        let unit = self.unit;
        for cid in unit.superclasses(self.head.class) {
            let class = unit.class(cid);
            let mut candidates = class
                .methods
                .iter()
                .filter(|m| m.name == name && m.params.len() == args.len() && !m.modifiers.is_static());
            if let Some(first) = candidates.next() {
                let unique = candidates.next().is_none();
                let usable = unique && !first.modifiers.is_abstract() && self.can_access(first.modifiers, cid);
                return usable.then_some((cid, first));
            }
        }
        None
    }

    fn emit_super_call(&mut self, name: &str, args: &[Expr]) -> CompileResult<TypeRef> {
        if let Some((owner, method)) = self.super_target(name, args) {
            self.load_frame_self()?;
            for (arg, param) in args.iter().zip(method.erased_params()) {
                self.emit_value(arg, &param)?;
            }
            let owner = self.unit.class(owner).internal_name();
            return self.invoke(Opcode::Invokespecial, &owner, name, &method.descriptor());
        }
        let class_ty = self.class_type();
        self.push_class_literal(&class_ty)?;
        self.load_this()?;
        self.type_insn(Opcode::Checkcast, &TypeRef::class(names::GROOVY_OBJECT))?;
        self.push_string(name)?;
        self.emit_arguments(args)?;
        self.call_runtime(dispatch::INVOKE_ON_SUPER)
    }

    /// Unique accessible static method `call` resolves to
    fn static_target(&self, call: &StaticCall) -> Option<(ClassId, &'a MethodNode)> {
        if has_spread(&call.args) {
            return None;
        }
        let unit = self.unit;
        let owner = unit.resolve(&call.owner)?;
        let class = unit.class(owner);
        if class.is_interface() {
            return None;
        }
        let mut candidates = class
            .methods
            .iter()
            .filter(|m| m.name == call.name && m.modifiers.is_static() && m.params.len() == call.args.len());
        let first = candidates.next()?;
        if candidates.next().is_some() || !self.can_access(first.modifiers, owner) {
            return None;
        }
        Some((owner, first))
    }

    fn emit_static_call(&mut self, call: &StaticCall) -> CompileResult<TypeRef> {
        if let Some((owner, method)) = self.static_target(call) {
            for (arg, param) in call.args.iter().zip(method.erased_params()) {
                self.emit_value(arg, &param)?;
            }
            let owner = self.unit.class(owner).internal_name();
            return self.invoke(Opcode::Invokestatic, &owner, &call.name, &method.descriptor());
        }
        self.push_sender()?;
        self.push_class_literal(&call.owner)?;
        self.push_string(&call.name)?;
        self.emit_arguments(&call.args)?;
        self.call_runtime(dispatch::INVOKE_STATIC)
    }

    /// Constructor of `class` matching `args` by count, then by type
    fn select_constructor(&self, class: ClassId, args: &[Expr]) -> Option<&'a MethodNode> {
        let unit = self.unit;
        let by_arity: Vec<&MethodNode> = unit
            .class(class)
            .constructors
            .iter()
            .filter(|c| c.params.len() == args.len())
            .collect();
        if by_arity.len() <= 1 {
            return by_arity.into_iter().next();
        }
        let arg_types: Vec<TypeRef> = args.iter().map(|a| self.static_type(a)).collect();
        let mut matching = by_arity.into_iter().filter(|c| {
            c.erased_params()
                .iter()
                .zip(&arg_types)
                .all(|(param, arg)| arg.is_object() || unit.is_assignable(&arg.boxed(), &param.boxed()))
        });
        let first = matching.next()?;
        matching.next().is_none().then_some(first)
    }

    /// Declaration-order fallback when argument types cannot pick one
    fn first_constructor(&self, class: ClassId, arity: usize) -> Option<&'a MethodNode> {
        let unit = self.unit;
        unit.class(class).constructors.iter().find(|c| c.params.len() == arity)
    }

    fn emit_constructor_call(&mut self, call: &ConstructorCall, expr: &Expr) -> CompileResult<TypeRef> {
        match call.kind {
            CtorKind::New => self.emit_new(call, expr),
            CtorKind::This | CtorKind::Super => {
                let target = match call.kind {
                    CtorKind::This => Some(self.head.class),
                    _ => self.unit.super_class_id(self.head.class),
                };
                let owner = match call.kind {
                    CtorKind::This => self.unit.class(self.head.class).internal_name(),
                    _ => self
                        .unit
                        .class(self.head.class)
                        .super_class
                        .as_ref()
                        .map_or_else(|| "java/lang/Object".to_string(), TypeRef::internal_name),
                };
                let params = match target {
                    Some(class) if self.unit.class(class).constructors.is_empty() && call.args.is_empty() => {
                        Vec::new()
                    }
                    Some(class) => match self
                        .select_constructor(class, &call.args)
                        .or_else(|| self.first_constructor(class, call.args.len()))
                    {
                        Some(ctor) => ctor.erased_params(),
                        None => {
                            return Err(CompileError::semantic(
                                format!(
                                    "no constructor of {} takes {} argument(s)",
                                    self.unit.class(class).name,
                                    call.args.len()
                                ),
                                self.location(expr.pos),
                            ))
                        }
                    },
                    None => call.args.iter().map(|a| self.static_type(a)).collect(),
                };
                self.load_frame_self()?;
                for (arg, param) in call.args.iter().zip(&params) {
                    self.emit_value(arg, param)?;
                }
                let descriptor = crate::ast::types::method_descriptor(&params, &TypeRef::void());
                self.invoke(Opcode::Invokespecial, &owner, "<init>", &descriptor)
            }
        }
    }

    fn emit_new(&mut self, call: &ConstructorCall, expr: &Expr) -> CompileResult<TypeRef> {
        if let Some(anon) = call.anonymous {
            return self.emit_new_anonymous(anon, call, expr);
        }
        let ty = call.ty.erasure();
        let direct = self.unit.resolve(&ty).and_then(|class| {
            let node = self.unit.class(class);
            if node.is_interface() || node.modifiers.is_abstract() || has_spread(&call.args) {
                return None;
            }
            if node.constructors.is_empty() {
                return call.args.is_empty().then(Vec::new);
            }
            let ctor = self.select_constructor(class, &call.args)?;
            self.can_access(ctor.modifiers, class).then(|| ctor.erased_params())
        });
        match direct {
            Some(params) => {
                self.type_insn(Opcode::New, &ty)?;
                self.dup_value()?;
                for (arg, param) in call.args.iter().zip(&params) {
                    self.emit_value(arg, param)?;
                }
                let descriptor = crate::ast::types::method_descriptor(&params, &TypeRef::void());
                self.invoke(Opcode::Invokespecial, &ty.internal_name(), "<init>", &descriptor)?;
            }
            None => {
                self.push_sender()?;
                self.push_class_literal(&ty)?;
                self.emit_arguments(&call.args)?;
                self.call_runtime(dispatch::INVOKE_NEW)?;
                self.checkcast(&ty)?;
            }
        }
        Ok(ty)
    }

    /// `new Anon(outer?, args..., cells...)`
    fn emit_new_anonymous(&mut self, anon: ClassId, call: &ConstructorCall, expr: &Expr) -> CompileResult<TypeRef> {
        if has_spread(&call.args) {
            return Err(CompileError::semantic(
                "spread arguments cannot create an anonymous inner class",
                self.location(expr.pos),
            ));
        }
        let unit = self.unit;
        let class = unit.class(anon);
        let ctor = class
            .constructors
            .first()
            .ok_or_else(|| self.internal(format!("anonymous class {} has no constructor", class.name)))?;
        let ty = class.type_ref();
        self.type_insn(Opcode::New, &ty)?;
        self.dup_value()?;
        let params = ctor.erased_params();
        for (arg, param) in call.args.iter().zip(&params) {
            self.emit_value(arg, param)?;
        }
        for var in &class.captured {
            self.load_cell(*var)?;
        }
        self.invoke(Opcode::Invokespecial, &class.internal_name(), "<init>", &ctor.descriptor())?;
        Ok(ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_promotion_order() {
        let float = TypeRef::Primitive(Primitive::Float);
        assert_eq!(promote(&TypeRef::int(), &TypeRef::long()), Some(Primitive::Long));
        assert_eq!(promote(&float, &TypeRef::long()), Some(Primitive::Float));
        assert_eq!(promote(&float, &TypeRef::double()), Some(Primitive::Double));
        assert_eq!(
            promote(&TypeRef::Primitive(Primitive::Byte), &TypeRef::Primitive(Primitive::Char)),
            Some(Primitive::Int)
        );
        assert_eq!(promote(&TypeRef::boolean(), &TypeRef::int()), None);
        assert_eq!(promote(&TypeRef::object(), &TypeRef::int()), None);
    }

    #[test]
    fn test_negated_comparisons() {
        assert_eq!(negate(BinaryOp::Lt), BinaryOp::Ge);
        assert_eq!(negate(BinaryOp::Eq), BinaryOp::Ne);
        assert_eq!(int_compare(negate(BinaryOp::Gt)), Opcode::IfIcmple);
        assert_eq!(zero_compare(BinaryOp::Ne), Opcode::Ifne);
    }

    #[test]
    fn test_arithmetic_opcodes() {
        assert_eq!(arithmetic_opcode(BinaryOp::Add, Primitive::Short), Some(Opcode::Iadd));
        assert_eq!(arithmetic_opcode(BinaryOp::Mod, Primitive::Double), Some(Opcode::Drem));
        assert_eq!(arithmetic_opcode(BinaryOp::Div, Primitive::Int), None);
    }
}
