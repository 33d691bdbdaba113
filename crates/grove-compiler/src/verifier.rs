//! Class verifier
//!
//! Last structural checks before code generation, followed by the
//! initialization wiring that turns field initializers and initializer
//! blocks into constructor and `<clinit>` code.
//!
//! Duplicate signatures abort the class; every other problem is collected so
//! one run reports as much as possible.

use crate::ast::visit::{walk_expr, walk_stmt, Visitor};
use crate::ast::*;
use crate::complete::location;
use crate::context::CompilationContext;
use crate::error::{CompileError, CompileResult, Location};
use rustc_hash::FxHashSet;

/// Component names a record may not declare
const RESERVED_RECORD_COMPONENTS: &[&str] = &[
    "clone", "finalize", "getClass", "hashCode", "notify", "notifyAll", "toString", "wait",
];

#[tracing::instrument(skip_all)]
pub fn verify(ctx: &CompilationContext, unit: &mut CompileUnit) -> CompileResult<()> {
    for id in unit.primary_classes() {
        tracing::debug!(class = %unit.class(id).name, "verifying class");
        check_duplicate_signatures(unit, id)?;
        check_abstract_methods(ctx, unit, id)?;
        check_record_components(ctx, unit, id)?;
        check_final_field_writes(ctx, unit, id)?;
        check_special_constructor_calls(unit, id)?;
        wire_initializers(unit, id);
    }
    Ok(())
}

// ============================================================================
// Signatures
// ============================================================================

fn check_duplicate_signatures(unit: &CompileUnit, id: ClassId) -> CompileResult<()> {
    let class = unit.class(id);
    for members in [&class.methods, &class.constructors] {
        let mut seen = FxHashSet::default();
        for method in members.iter().filter(|m| !m.modifiers.is_synthetic()) {
            if !seen.insert(method.signature_key()) {
                return Err(CompileError::DuplicateSignature {
                    method: method.type_descriptor(),
                    location: location(unit, id, method.pos),
                });
            }
        }
    }
    Ok(())
}

// ============================================================================
// Abstract methods
// ============================================================================

fn check_abstract_methods(ctx: &CompilationContext, unit: &CompileUnit, id: ClassId) -> CompileResult<()> {
    let class = unit.class(id);
    if class.is_interface() || class.modifiers.is_abstract() {
        return Ok(());
    }
    let description = format!("class '{}'", class.name);

    for method in class.methods.iter().filter(|m| m.modifiers.is_abstract()) {
        ctx.error(
            format!(
                "Can't have an abstract method in a non-abstract class. The {} must be declared abstract or the method '{}' must not be abstract.",
                description,
                method.type_descriptor()
            ),
            location(unit, id, method.pos),
        )?;
    }

    let mut reported = FxHashSet::default();
    let inherited = unit
        .superclasses(id)
        .into_iter()
        .chain(unit.all_interfaces(id));
    for owner in inherited {
        for method in unit.class(owner).methods.iter() {
            if !method.modifiers.is_abstract() || !reported.insert(method.signature_key()) {
                continue;
            }
            let params = method.erased_params();
            let implementation = std::iter::once(id)
                .chain(unit.superclasses(id))
                .find_map(|cid| unit.class(cid).declared_method(&method.name, &params));
            let message = match implementation {
                Some(found) if !found.modifiers.is_abstract() => {
                    if unit.is_assignable(&found.return_type, &method.return_type)
                        || found.return_type.erasure() == method.return_type.erasure()
                    {
                        continue;
                    }
                    format!(
                        "Abstract method '{}' is not implemented but a method of the same name but different return type is defined: {}method '{}'",
                        method.type_descriptor(),
                        if found.modifiers.is_static() { "static " } else { "" },
                        found.type_descriptor()
                    )
                }
                _ => format!(
                    "Can't have an abstract method in a non-abstract class. The {} must be declared abstract or the method '{}' must be implemented.",
                    description,
                    method.type_descriptor()
                ),
            };
            ctx.error(message, location(unit, id, class.pos))?;
        }
    }
    Ok(())
}

// ============================================================================
// Records
// ============================================================================

fn check_record_components(ctx: &CompilationContext, unit: &CompileUnit, id: ClassId) -> CompileResult<()> {
    let class = unit.class(id);
    if !class.is_record() {
        return Ok(());
    }
    for property in &class.properties {
        if property.name.starts_with('$') || RESERVED_RECORD_COMPONENTS.contains(&property.name.as_str()) {
            ctx.error(
                format!(
                    "Illegal record component name '{}' in record '{}'",
                    property.name, class.name
                ),
                location(unit, id, property.pos),
            )?;
        }
    }
    Ok(())
}

// ============================================================================
// Final fields
// ============================================================================

/// Where the code being checked runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InitContext {
    Method,
    Constructor,
    StaticInit,
}

fn check_final_field_writes(ctx: &CompilationContext, unit: &CompileUnit, id: ClassId) -> CompileResult<()> {
    let class = unit.class(id);
    let mut checker = FinalFieldChecker {
        unit,
        class: id,
        context: InitContext::Method,
        found: Vec::new(),
    };

    for method in class.methods.iter().filter(|m| !m.modifiers.is_synthetic()) {
        checker.context = if method.is_static_init() {
            InitContext::StaticInit
        } else {
            InitContext::Method
        };
        if let Some(body) = &method.body {
            checker.visit_stmt(body);
        }
    }
    checker.context = InitContext::Constructor;
    for ctor in class.constructors.iter().filter(|c| !c.modifiers.is_synthetic()) {
        if let Some(body) = &ctor.body {
            checker.visit_stmt(body);
        }
    }
    for block in &class.object_initializers {
        checker.visit_stmt(block);
    }
    checker.context = InitContext::StaticInit;
    for block in &class.static_initializers {
        checker.visit_stmt(block);
    }

    for (message, at) in checker.found {
        ctx.error(message, at)?;
    }
    Ok(())
}

struct FinalFieldChecker<'a> {
    unit: &'a CompileUnit,
    class: ClassId,
    context: InitContext,
    found: Vec<(String, Location)>,
}

impl FinalFieldChecker<'_> {
    /// Field written by an assignment target, if the target names one
    fn written_field(&self, target: &Expr) -> Option<&FieldNode> {
        let unit = self.unit;
        match &target.kind {
            ExprKind::Field(access) => match access.object.as_deref() {
                None => unit.class(access.owner).field(&access.name),
                Some(object) if object.is_this() => unit.class(access.owner).field(&access.name),
                Some(_) => None,
            },
            ExprKind::Variable(VariableRef {
                binding: Some(Binding::Field { owner, name, .. } | Binding::Property { owner, name, .. }),
                ..
            }) => unit.class(*owner).field(name),
            ExprKind::Property(PropertyAccess {
                object,
                name: MemberName::Static(name),
                ..
            })
            | ExprKind::Attribute(AttributeAccess { object, name }) if object.is_this() => {
                unit.class(self.class).field(name)
            }
            _ => None,
        }
    }

    fn check_write(&mut self, target: &Expr) {
        let Some(field) = self.written_field(target) else {
            return;
        };
        if !field.modifiers.is_final() {
            return;
        }
        let is_static = field.modifiers.is_static();
        let allowed = match self.context {
            InitContext::StaticInit => is_static,
            InitContext::Constructor => !is_static,
            InitContext::Method => false,
        };
        if allowed {
            return;
        }
        let message = if is_static {
            format!(
                "cannot modify static final field '{}' outside of static initialization block.",
                field.name
            )
        } else {
            format!("cannot modify final field '{}' outside of constructor.", field.name)
        };
        self.found
            .push((message, location(self.unit, self.class, target.pos)));
    }
}

impl Visitor for FinalFieldChecker<'_> {
    fn visit_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Assign(assign) => self.check_write(&assign.target),
            ExprKind::IncDec(inc) => self.check_write(&inc.target),
            _ => {}
        }
        walk_expr(self, expr);
    }
}

// ============================================================================
// Special constructor calls
// ============================================================================

/// `this`, `super` and instance members are off limits inside the
/// arguments of `this(...)` / `super(...)`
fn check_special_constructor_calls(unit: &CompileUnit, id: ClassId) -> CompileResult<()> {
    let class = unit.class(id);
    for ctor in &class.constructors {
        let Some(Stmt {
            kind: StmtKind::Expr(call),
            ..
        }) = ctor.body.as_ref().and_then(Stmt::first_statement)
        else {
            continue;
        };
        let ExprKind::ConstructorCall(call) = &call.kind else {
            continue;
        };
        if call.kind == CtorKind::New {
            continue;
        }
        let mut checker = EarlyReferenceChecker {
            unit,
            class: id,
            found: None,
        };
        for arg in &call.args {
            checker.visit_expr(arg);
        }
        if let Some((name, pos)) = checker.found {
            return Err(CompileError::semantic(
                format!(
                    "Cannot reference '{}' before supertype constructor has been called. Possible causes:\n\
                     You attempted to access an instance field, method, or property.\n\
                     You attempted to construct a non-static inner class.",
                    name
                ),
                location(unit, id, if pos.line > 0 { pos } else { ctor.pos }),
            ));
        }
    }
    Ok(())
}

struct EarlyReferenceChecker<'a> {
    unit: &'a CompileUnit,
    class: ClassId,
    found: Option<(String, SourcePos)>,
}

impl EarlyReferenceChecker<'_> {
    fn report(&mut self, name: &str, pos: SourcePos) {
        if self.found.is_none() {
            self.found = Some((name.to_string(), pos));
        }
    }

    /// A static method of this class or of an enclosing class
    fn is_static_target(&self, name: &str, arity: usize) -> bool {
        let unit = self.unit;
        let mut current = Some(self.class);
        while let Some(cid) = current {
            let class = unit.class(cid);
            if class
                .methods_named(name)
                .any(|m| m.params.len() == arity && m.modifiers.is_static())
            {
                return true;
            }
            if cid != self.class && class.has_method(name, arity) {
                return true;
            }
            current = class.outer;
        }
        false
    }
}

impl Visitor for EarlyReferenceChecker<'_> {
    fn visit_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Closure(_) => return,
            ExprKind::This => self.report("this", expr.pos),
            ExprKind::Super => self.report("super", expr.pos),
            ExprKind::Variable(VariableRef {
                name,
                binding:
                    Some(
                        Binding::Field { is_static: false, .. } | Binding::Property { is_static: false, .. },
                    ),
            }) => self.report(name, expr.pos),
            ExprKind::Field(access) if access.object.is_none() => {
                let instance = self
                    .unit
                    .class(access.owner)
                    .field(&access.name)
                    .is_some_and(|f| !f.modifiers.is_static());
                if instance {
                    self.report(&access.name, expr.pos);
                }
            }
            ExprKind::MethodCall(call) if call.implicit_this || call.object.is_this() => {
                let name = call.name.as_str().unwrap_or("this");
                if !self.is_static_target(name, call.args.len()) {
                    let shown = if call.implicit_this { name } else { "this" };
                    self.report(shown, expr.pos);
                }
                for arg in &call.args {
                    self.visit_expr(arg);
                }
                return;
            }
            _ => {}
        }
        walk_expr(self, expr);
    }
}

// ============================================================================
// Initialization wiring
// ============================================================================

/// Move field initializers and initializer blocks into the constructors and
/// `<clinit>`; insert the implicit `super()` call
fn wire_initializers(unit: &mut CompileUnit, id: ClassId) {
    let b = unit.builder();
    let class = unit.class_mut(id);

    let mut instance_init = Vec::new();
    let mut static_init = Vec::new();
    for field in &mut class.fields {
        let Some(initial) = field.initial.take() else {
            continue;
        };
        let pos = initial.pos;
        let mut store = b.expr_stmt(b.assign(b.field(id, field.name.clone()), initial));
        store.pos = pos;
        if field.modifiers.is_static() {
            static_init.push(store);
        } else {
            instance_init.push(store);
        }
    }
    instance_init.extend(std::mem::take(&mut class.object_initializers));

    // enum constants are created before any other static state
    let mut static_blocks = std::mem::take(&mut class.static_initializers);
    let leading = if class.is_enum() && !static_blocks.is_empty() {
        Some(static_blocks.remove(0))
    } else {
        None
    };
    let mut clinit_stmts: Vec<Stmt> = leading.into_iter().collect();
    clinit_stmts.extend(static_init);
    clinit_stmts.extend(static_blocks);

    if !class.is_interface() {
        let synthetic_fields: FxHashSet<String> = class
            .fields
            .iter()
            .filter(|f| f.modifiers.is_synthetic())
            .map(|f| f.name.clone())
            .collect();
        for ctor in &mut class.constructors {
            let stmts = crate::complete::body_stmts_mut(&b, ctor);
            let delegates = match stmts.first() {
                Some(Stmt {
                    kind: StmtKind::Expr(expr),
                    ..
                }) => match &expr.kind {
                    ExprKind::ConstructorCall(call) => match call.kind {
                        CtorKind::This => Some(true),
                        CtorKind::Super => Some(false),
                        CtorKind::New => None,
                    },
                    _ => None,
                },
                _ => None,
            };
            match delegates {
                // the delegate runs the initializers
                Some(true) => continue,
                Some(false) => {}
                None => stmts.insert(0, b.expr_stmt(b.ctor_super(Vec::new()))),
            }
            if instance_init.is_empty() {
                continue;
            }
            let at = 1 + stmts[1..]
                .iter()
                .take_while(|s| is_synthetic_store(s, &synthetic_fields))
                .count();
            stmts.splice(at..at, instance_init.iter().cloned());
        }
    }

    if clinit_stmts.is_empty() {
        return;
    }
    match class.methods.iter_mut().find(|m| m.is_static_init()) {
        Some(existing) => {
            let stmts = crate::complete::body_stmts_mut(&b, existing);
            stmts.splice(0..0, clinit_stmts);
        }
        None => {
            tracing::trace!(class = %class.name, "adding static initializer");
            class.methods.push(
                MethodNode::new("<clinit>", Modifiers::STATIC, TypeRef::void())
                    .with_body(b.block(clinit_stmts)),
            );
        }
    }
}

/// `this.x = ...` for a compiler-generated field `x`
fn is_synthetic_store(stmt: &Stmt, synthetic_fields: &FxHashSet<String>) -> bool {
    let StmtKind::Expr(Expr {
        kind: ExprKind::Assign(assign),
        ..
    }) = &stmt.kind
    else {
        return false;
    };
    matches!(&assign.target.kind, ExprKind::Field(f) if synthetic_fields.contains(&f.name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_unit() -> (CompileUnit, AstBuilder) {
        let unit = CompileUnit::new();
        let b = unit.builder();
        (unit, b)
    }

    fn class(name: &str) -> ClassNode {
        let mut class = ClassNode::new(name, ClassKind::Class);
        class.source_file = Some("A.groovy".into());
        class
    }

    fn messages(ctx: &CompilationContext) -> Vec<String> {
        ctx.errors().errors().iter().map(|d| d.message.clone()).collect()
    }

    #[test]
    fn test_duplicate_method_signature_is_fatal() {
        let (mut unit, _) = new_unit();
        let mut a = class("p.A");
        for ret in [TypeRef::int(), TypeRef::string()] {
            a.methods.push(
                MethodNode::new("f", Modifiers::PUBLIC, ret)
                    .with_params(vec![Parameter::new("x", TypeRef::int())]),
            );
        }
        unit.add_class(a);
        let err = verify(&CompilationContext::default(), &mut unit).unwrap_err();
        assert!(err
            .to_string()
            .contains("The method java.lang.String f(int) duplicates another method of the same signature"));
    }

    #[test]
    fn test_synthetic_duplicates_are_ignored() {
        let (mut unit, _) = new_unit();
        let mut a = class("p.A");
        a.methods.push(MethodNode::new("f", Modifiers::PUBLIC, TypeRef::int()));
        a.methods.push(MethodNode::new(
            "f",
            Modifiers::PUBLIC | Modifiers::SYNTHETIC | Modifiers::BRIDGE,
            TypeRef::object(),
        ));
        unit.add_class(a);
        let ctx = CompilationContext::default();
        verify(&ctx, &mut unit).unwrap();
    }

    #[test]
    fn test_unimplemented_interface_method_is_collected() {
        let (mut unit, _) = new_unit();
        let mut a = class("p.Task");
        a.interfaces.push(TypeRef::class("java.lang.Runnable"));
        unit.add_class(a);
        let ctx = CompilationContext::default();
        verify(&ctx, &mut unit).unwrap();
        assert_eq!(
            messages(&ctx),
            vec!["Can't have an abstract method in a non-abstract class. The class 'p.Task' must be declared abstract or the method 'void run()' must be implemented."]
        );
    }

    #[test]
    fn test_abstract_class_may_leave_methods_open() {
        let (mut unit, _) = new_unit();
        let mut a = class("p.Task").with_modifiers(Modifiers::PUBLIC | Modifiers::ABSTRACT);
        a.interfaces.push(TypeRef::class("java.lang.Runnable"));
        unit.add_class(a);
        let ctx = CompilationContext::default();
        verify(&ctx, &mut unit).unwrap();
        assert!(messages(&ctx).is_empty());
    }

    #[test]
    fn test_own_abstract_method_in_concrete_class() {
        let (mut unit, _) = new_unit();
        let mut a = class("p.A");
        a.methods.push(MethodNode::new(
            "f",
            Modifiers::PUBLIC | Modifiers::ABSTRACT,
            TypeRef::void(),
        ));
        unit.add_class(a);
        let ctx = CompilationContext::default();
        verify(&ctx, &mut unit).unwrap();
        assert_eq!(
            messages(&ctx),
            vec!["Can't have an abstract method in a non-abstract class. The class 'p.A' must be declared abstract or the method 'void f()' must not be abstract."]
        );
    }

    #[test]
    fn test_final_field_write_outside_constructor() {
        let (mut unit, b) = new_unit();
        let mut a = class("p.A");
        a.fields.push(FieldNode::new("x", TypeRef::int(), Modifiers::PRIVATE | Modifiers::FINAL));
        a.fields.push(FieldNode::new(
            "Y",
            TypeRef::int(),
            Modifiers::PRIVATE | Modifiers::STATIC | Modifiers::FINAL,
        ));
        let id = unit.add_class(a);
        unit.class_mut(id).constructors.push(
            MethodNode::constructor(Modifiers::PUBLIC).with_body(b.block(vec![
                b.expr_stmt(b.assign(b.field(id, "x"), b.int(1))),
                b.expr_stmt(b.assign(b.field(id, "Y"), b.int(1)).at(3, 9)),
            ])),
        );
        unit.class_mut(id).methods.push(
            MethodNode::new("f", Modifiers::PUBLIC, TypeRef::void()).with_body(b.block(vec![
                b.expr_stmt(b.assign(b.attr(b.this(), "x"), b.int(2)).at(5, 9)),
            ])),
        );
        let ctx = CompilationContext::default();
        verify(&ctx, &mut unit).unwrap();
        assert_eq!(
            messages(&ctx),
            vec![
                "cannot modify final field 'x' outside of constructor.",
                "cannot modify static final field 'Y' outside of static initialization block.",
            ]
        );
    }

    #[test]
    fn test_record_component_names() {
        let (mut unit, _) = new_unit();
        let mut a = class("p.Point").with_modifiers(Modifiers::PUBLIC | Modifiers::FINAL | Modifiers::RECORD);
        a.add_property("x", TypeRef::int(), Modifiers::PUBLIC);
        a.add_property("hashCode", TypeRef::int(), Modifiers::PUBLIC);
        a.add_property("$y", TypeRef::int(), Modifiers::PUBLIC);
        unit.add_class(a);
        let ctx = CompilationContext::default();
        verify(&ctx, &mut unit).unwrap();
        assert_eq!(
            messages(&ctx),
            vec![
                "Illegal record component name 'hashCode' in record 'p.Point'",
                "Illegal record component name '$y' in record 'p.Point'",
            ]
        );
    }

    #[test]
    fn test_instance_reference_in_super_call_is_fatal() {
        let (mut unit, b) = new_unit();
        let mut a = class("p.A");
        a.fields.push(FieldNode::new("x", TypeRef::int(), Modifiers::PRIVATE));
        let id = unit.add_class(a);
        let arg = b.field(id, "x").at(4, 15);
        unit.class_mut(id).constructors.push(
            MethodNode::constructor(Modifiers::PUBLIC)
                .with_body(b.block(vec![b.expr_stmt(b.ctor_this(vec![arg]))])),
        );
        let err = verify(&CompilationContext::default(), &mut unit).unwrap_err();
        assert!(err
            .to_string()
            .starts_with("A.groovy:4:15: Cannot reference 'x' before supertype constructor has been called."));
    }

    #[test]
    fn test_closure_in_super_call_is_allowed() {
        let (mut unit, b) = new_unit();
        let id = unit.add_class(class("p.A"));
        let closure = b.closure(None, b.block(vec![b.expr_stmt(b.this())]));
        unit.class_mut(id).constructors.push(
            MethodNode::constructor(Modifiers::PUBLIC)
                .with_body(b.block(vec![b.expr_stmt(b.ctor_super(vec![closure]))])),
        );
        verify(&CompilationContext::default(), &mut unit).unwrap();
    }

    #[test]
    fn test_initializers_follow_super_call() {
        let (mut unit, b) = new_unit();
        let mut a = class("p.A");
        a.fields.push(
            FieldNode::new("x", TypeRef::int(), Modifiers::PRIVATE).with_initial(b.int(7)),
        );
        a.fields.push(
            FieldNode::new("N", TypeRef::int(), Modifiers::PRIVATE | Modifiers::STATIC)
                .with_initial(b.int(3)),
        );
        a.object_initializers.push(b.block(vec![b.expr_stmt(b.call_this("init", vec![]))]));
        let id = unit.add_class(a);
        unit.class_mut(id).constructors.push(
            MethodNode::constructor(Modifiers::PUBLIC).with_body(b.block(vec![b.expr_stmt(b.int(1))])),
        );
        unit.class_mut(id).constructors.push(
            MethodNode::constructor(Modifiers::PUBLIC)
                .with_params(vec![Parameter::new("y", TypeRef::int())])
                .with_body(b.block(vec![b.expr_stmt(b.ctor_this(vec![]))])),
        );
        verify(&CompilationContext::default(), &mut unit).unwrap();

        let class = unit.class(id);
        let first = &class.constructors[0].body.as_ref().unwrap().as_block().unwrap().stmts;
        assert_eq!(first.len(), 4);
        assert!(matches!(
            &first[0].kind,
            StmtKind::Expr(e) if matches!(&e.kind, ExprKind::ConstructorCall(c) if c.kind == CtorKind::Super)
        ));
        assert!(matches!(&first[1].kind, StmtKind::Expr(e) if matches!(e.kind, ExprKind::Assign(_))));
        assert!(matches!(first[2].kind, StmtKind::Block(_)));

        let delegating = &class.constructors[1].body.as_ref().unwrap().as_block().unwrap().stmts;
        assert_eq!(delegating.len(), 1);

        let clinit = class.methods.iter().find(|m| m.is_static_init()).unwrap();
        assert!(clinit.modifiers.is_static());
        assert_eq!(clinit.body.as_ref().unwrap().as_block().unwrap().stmts.len(), 1);
        assert!(class.fields.iter().all(|f| f.initial.is_none()));
        assert!(class.object_initializers.is_empty());
    }

    #[test]
    fn test_initializers_skip_synthetic_stores() {
        let (mut unit, b) = new_unit();
        let mut a = class("p.A");
        a.fields.push(FieldNode::new(
            "this$0",
            TypeRef::object(),
            Modifiers::FINAL | Modifiers::SYNTHETIC,
        ));
        a.fields.push(
            FieldNode::new("x", TypeRef::int(), Modifiers::PRIVATE).with_initial(b.int(7)),
        );
        let id = unit.add_class(a);
        unit.class_mut(id).constructors.push(
            MethodNode::constructor(Modifiers::PUBLIC).with_body(b.block(vec![
                b.expr_stmt(b.ctor_super(vec![])),
                b.expr_stmt(b.assign(b.field_of(b.this(), id, "this$0"), b.null())),
            ])),
        );
        verify(&CompilationContext::default(), &mut unit).unwrap();
        let stmts = &unit.class(id).constructors[0].body.as_ref().unwrap().as_block().unwrap().stmts;
        assert_eq!(stmts.len(), 3);
        match &stmts[2].kind {
            StmtKind::Expr(Expr {
                kind: ExprKind::Assign(assign),
                ..
            }) => assert!(matches!(&assign.target.kind, ExprKind::Field(f) if f.name == "x")),
            other => panic!("unexpected {:?}", other),
        }
    }
}
