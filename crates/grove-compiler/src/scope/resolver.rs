//! Scope resolution
//!
//! Walks every primary class, builds the scope tree and binds each
//! variable expression to a local, a class member, or a dynamic
//! placeholder. Locals used from inside a closure or an anonymous inner
//! class are marked closure-shared when the closure scope is left.
//!
//! Class scopes are crossed by querying class members rather than by
//! declaring them: fields, getter-derived properties, properties, then the
//! superclass chain and (for named classes) the outer class. A named class
//! scope ends the walk; an anonymous one is transparent so its methods see
//! the locals of the enclosing method.

use super::{ScopeKind, VarKind, Variable};
use crate::ast::visit::{walk_expr_mut, walk_stmt_mut, VisitorMut};
use crate::ast::*;
use crate::context::CompilationContext;
use crate::error::{CompileError, CompileResult, Location};
use rustc_hash::FxHashSet;

/// Resolve every primary class of the unit
#[tracing::instrument(skip_all)]
pub fn resolve(ctx: &CompilationContext, unit: &mut CompileUnit) -> CompileResult<()> {
    let classes = unit.primary_classes();
    let mut resolver = ScopeResolver::new(ctx, unit, false);
    for &id in &classes {
        if !resolver.unit.class(id).anonymous {
            resolver.resolve_class(id, None);
        }
    }
    // Anonymous classes never instantiated from a resolved body
    for &id in &classes {
        if resolver.unit.class(id).anonymous && !resolver.resolved_anonymous.contains(&id) {
            resolver.resolve_class(id, None);
        }
    }
    tracing::debug!(
        scopes = resolver.unit.scopes.len(),
        variables = resolver.unit.vars.len(),
        "scopes resolved"
    );
    resolver.finish()
}

/// Resolve methods synthesized after the first resolution (those without a
/// scope)
pub fn resolve_pending(ctx: &CompilationContext, unit: &mut CompileUnit) -> CompileResult<()> {
    let mut resolver = ScopeResolver::new(ctx, unit, true);
    for id in resolver.unit.primary_classes() {
        let class = resolver.unit.class(id);
        let pending = class
            .methods
            .iter()
            .chain(&class.constructors)
            .any(|m| m.scope.is_none());
        if pending {
            tracing::trace!(class = %class.name, "resolving synthesized members");
            resolver.resolve_class(id, None);
        }
    }
    resolver.finish()
}

/// Declare `param` in an existing method scope and bind it to a fresh
/// variable
pub fn declare_parameter(unit: &mut CompileUnit, scope: ScopeId, param: &mut Parameter) -> VarId {
    let var = unit.vars.declare(Variable {
        name: param.name.clone(),
        ty: param.ty.clone(),
        kind: VarKind::Parameter,
        modifiers: param.modifiers,
        closure_shared: false,
        scope,
        pos: param.pos,
    });
    unit.scopes
        .get_mut(scope)
        .declare(param.name.clone(), Binding::Local(var));
    param.var = Some(var);
    var
}

/// Name of the property a getter or setter stands for
pub fn property_name(method: &MethodNode) -> Option<String> {
    let name = &method.name;
    let stem = if name.starts_with("get") && method.params.is_empty() && !method.is_void() {
        &name[3..]
    } else if name.starts_with("is") && method.params.is_empty() && method.return_type.is_boolean() {
        &name[2..]
    } else if name.starts_with("set") && method.params.len() == 1 {
        &name[3..]
    } else {
        return None;
    };
    if stem.is_empty() {
        None
    } else {
        Some(decapitalize(stem))
    }
}

/// `Foo` → `foo`; names starting with two capitals stay as they are
fn decapitalize(name: &str) -> String {
    let mut chars = name.chars();
    match (chars.next(), chars.next()) {
        (Some(a), Some(b)) if a.is_uppercase() && b.is_uppercase() => name.to_string(),
        (Some(a), _) => a.to_lowercase().chain(name.chars().skip(1)).collect(),
        _ => String::new(),
    }
}

#[derive(Clone, Copy)]
enum Member {
    Method(usize),
    Constructor(usize),
}

struct ScopeResolver<'a> {
    ctx: &'a CompilationContext,
    unit: &'a mut CompileUnit,
    current: Option<ScopeId>,
    class: ClassId,
    /// Only resolve methods that have no scope yet
    pending_only: bool,
    resolved_anonymous: FxHashSet<ClassId>,
    failure: Option<CompileError>,
}

impl<'a> ScopeResolver<'a> {
    fn new(ctx: &'a CompilationContext, unit: &'a mut CompileUnit, pending_only: bool) -> Self {
        Self {
            ctx,
            unit,
            current: None,
            class: ClassId(0),
            pending_only,
            resolved_anonymous: FxHashSet::default(),
            failure: None,
        }
    }

    fn finish(self) -> CompileResult<()> {
        match self.failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    // ===== Diagnostics =====

    fn location(&self, pos: SourcePos) -> Location {
        Location::new(
            self.unit.class(self.class).source_file.as_deref(),
            pos.line,
            pos.column,
        )
    }

    fn report(&mut self, message: String, pos: SourcePos) {
        let location = self.location(pos);
        if let Err(err) = self.ctx.error(message, location) {
            self.failure.get_or_insert(err);
        }
    }

    // ===== Scope stack =====

    fn scope_id(&self) -> ScopeId {
        // Every visit happens below a class scope
        self.current.unwrap_or(ScopeId(0))
    }

    fn in_static_context(&self) -> bool {
        self.current
            .map(|s| self.unit.scopes.get(s).in_static_context)
            .unwrap_or(false)
    }

    fn push(&mut self, kind: ScopeKind, is_static: bool) -> ScopeId {
        let id = self.unit.scopes.push(kind, self.current, is_static, self.class);
        self.current = Some(id);
        id
    }

    fn pop(&mut self) {
        if let Some(id) = self.current {
            self.current = self.unit.scopes.get(id).parent;
        }
    }

    // ===== Declarations =====

    fn declare(&mut self, name: &str, ty: &TypeRef, kind: VarKind, modifiers: Modifiers, pos: SourcePos) -> VarId {
        self.check_redeclaration(name, pos);
        self.declare_unchecked(name, ty, kind, modifiers, pos)
    }

    fn check_redeclaration(&mut self, name: &str, pos: SourcePos) {
        let current = self.scope_id();
        let mut duplicate = self.unit.scopes.get(current).declared(name).is_some();
        let mut scope = self.unit.scopes.get(current).parent;
        while let (false, Some(id)) = (duplicate, scope) {
            let s = self.unit.scopes.get(id);
            if s.is_class_scope() && !s.anonymous {
                break;
            }
            duplicate = s.declared(name).is_some();
            scope = s.parent;
        }
        if duplicate {
            self.report(
                format!("The current scope already contains a variable of the name {}", name),
                pos,
            );
        }
    }

    /// Declared even after a redeclaration error so later checks still work
    fn declare_unchecked(
        &mut self,
        name: &str,
        ty: &TypeRef,
        kind: VarKind,
        modifiers: Modifiers,
        pos: SourcePos,
    ) -> VarId {
        let current = self.scope_id();
        let var = self.unit.vars.declare(Variable {
            name: name.to_string(),
            ty: ty.clone(),
            kind,
            modifiers,
            closure_shared: false,
            scope: current,
            pos,
        });
        self.unit
            .scopes
            .get_mut(current)
            .declare(name, Binding::Local(var));
        var
    }

    fn declare_param(&mut self, param: &mut Parameter) {
        match param.var {
            Some(var) => {
                let current = self.scope_id();
                self.unit.vars.get_mut(var).scope = current;
                self.unit
                    .scopes
                    .get_mut(current)
                    .declare(param.name.clone(), Binding::Local(var));
            }
            None => {
                let var = self.declare(
                    &param.name,
                    &param.ty,
                    VarKind::Parameter,
                    param.modifiers,
                    param.pos,
                );
                param.var = Some(var);
            }
        }
    }

    // ===== Lookup =====

    fn class_member(&self, id: ClassId, name: &str, cross_outer: bool) -> Option<Binding> {
        let class = self.unit.class(id);
        if let Some(field) = class.field(name) {
            return Some(Binding::Field {
                owner: id,
                name: name.to_string(),
                is_static: field.modifiers.is_static(),
            });
        }
        if let Some(method) = class
            .methods
            .iter()
            .find(|m| property_name(m).as_deref() == Some(name))
        {
            return Some(Binding::Property {
                owner: id,
                name: name.to_string(),
                is_static: method.modifiers.is_static(),
            });
        }
        if let Some(property) = class.property(name) {
            return Some(Binding::Property {
                owner: id,
                name: name.to_string(),
                is_static: property.modifiers.is_static(),
            });
        }
        if let Some(found) = self
            .unit
            .super_class_id(id)
            .and_then(|sup| self.class_member(sup, name, false))
        {
            return Some(found);
        }
        match class.outer {
            Some(outer) if cross_outer => self.class_member(outer, name, true),
            _ => None,
        }
    }

    /// Local variable visible under `name`, without recording anything
    fn peek_local(&self, name: &str) -> bool {
        let mut scope = self.current;
        while let Some(id) = scope {
            let s = self.unit.scopes.get(id);
            match s.declared(name) {
                Some(Binding::Local(_)) => return true,
                Some(_) => return false,
                None => {}
            }
            if s.is_class_scope() && (!s.anonymous || s.parent.is_none()) {
                return false;
            }
            scope = s.parent;
        }
        false
    }

    fn lookup(&mut self, name: &str, pos: SourcePos) -> Binding {
        let current = self.scope_id();
        let mut scope = current;
        let mut crossing_static = false;
        let mut instance_from_static = false;
        let mut found = None;
        loop {
            let s = self.unit.scopes.get(scope);
            crossing_static |= s.in_static_context;
            if let Some(binding) = s.declared(name) {
                found = Some(binding.clone());
                break;
            }
            if s.is_class_scope() {
                let named = !s.anonymous || s.parent.is_none();
                if let Some(member) = self.class_member(s.class, name, named) {
                    if crossing_static && !binding_is_static(&member) {
                        instance_from_static = true;
                    } else {
                        found = Some(member);
                    }
                }
                if named || found.is_some() {
                    break;
                }
            }
            match s.parent {
                Some(parent) => scope = parent,
                None => break,
            }
        }
        let end = scope;

        if instance_from_static {
            self.report(
                format!(
                    "Apparent variable '{}' was found in a static scope but doesn't refer to a local variable, static field or class.",
                    name
                ),
                pos,
            );
            let placeholder = Binding::Dynamic { is_static: true };
            self.unit
                .scopes
                .get_mut(current)
                .declare(name, placeholder.clone());
            return placeholder;
        }
        let binding = found.unwrap_or(Binding::Dynamic {
            is_static: crossing_static,
        });

        let mut scope = current;
        while scope != end {
            let s = self.unit.scopes.get_mut(scope);
            match &binding {
                Binding::Local(var) => s.add_referenced_local(*var),
                _ => s.add_referenced_class_var(name),
            }
            match s.parent {
                Some(parent) => scope = parent,
                None => break,
            }
        }
        binding
    }

    /// `this.x` in a static context where `x` is an instance member
    fn check_property_on_explicit_this(&mut self, name: &str, pos: SourcePos) {
        if !self.in_static_context() {
            return;
        }
        let member = self.class_member(self.class, name, true);
        if let Some(member) = member {
            if !binding_is_static(&member) {
                self.report(
                    format!(
                        "The variable [{}] is declared in a dynamic context, but you tried to access it from a static context.",
                        name
                    ),
                    pos,
                );
                let current = self.scope_id();
                self.unit
                    .scopes
                    .get_mut(current)
                    .declare(name, Binding::Dynamic { is_static: true });
            }
        }
    }

    fn mark_closure_shared(&mut self, scope: ScopeId) {
        let locals = self.unit.scopes.get(scope).referenced_locals().to_vec();
        for var in locals {
            self.unit.vars.get_mut(var).closure_shared = true;
        }
    }

    // ===== Classes =====

    fn resolve_class(&mut self, id: ClassId, parent: Option<ScopeId>) {
        let saved = (self.current, self.class);
        self.current = parent;
        self.class = id;
        let anonymous = self.unit.class(id).anonymous;
        let class_scope = self.push(ScopeKind::Class, false);
        self.unit.scopes.get_mut(class_scope).anonymous = anonymous;

        if !self.pending_only {
            for i in 0..self.unit.class(id).fields.len() {
                let field = &mut self.unit.class_mut(id).fields[i];
                let is_static = field.modifiers.is_static();
                if let Some(mut initial) = field.initial.take() {
                    self.push(ScopeKind::Block, is_static);
                    self.visit_expr_mut(&mut initial);
                    self.pop();
                    self.unit.class_mut(id).fields[i].initial = Some(initial);
                }
            }
        }

        for i in 0..self.unit.class(id).constructors.len() {
            self.resolve_method(id, Member::Constructor(i));
        }
        for i in 0..self.unit.class(id).methods.len() {
            self.resolve_method(id, Member::Method(i));
        }

        if !self.pending_only {
            for is_static in [false, true] {
                let class = self.unit.class_mut(id);
                let mut blocks = if is_static {
                    std::mem::take(&mut class.static_initializers)
                } else {
                    std::mem::take(&mut class.object_initializers)
                };
                self.push(ScopeKind::Block, is_static);
                for block in &mut blocks {
                    self.visit_stmt_mut(block);
                }
                self.pop();
                let class = self.unit.class_mut(id);
                if is_static {
                    class.static_initializers = blocks;
                } else {
                    class.object_initializers = blocks;
                }
            }
        }

        if anonymous && parent.is_some() {
            self.mark_closure_shared(class_scope);
            let captured = self.unit.scopes.get(class_scope).referenced_locals().to_vec();
            self.unit.class_mut(id).captured = captured;
        }
        self.current = saved.0;
        self.class = saved.1;
    }

    fn method_mut(&mut self, id: ClassId, member: Member) -> &mut MethodNode {
        let class = self.unit.class_mut(id);
        match member {
            Member::Method(i) => &mut class.methods[i],
            Member::Constructor(i) => &mut class.constructors[i],
        }
    }

    fn resolve_method(&mut self, id: ClassId, member: Member) {
        let pending_only = self.pending_only;
        let method = self.method_mut(id, member);
        if pending_only && method.scope.is_some() {
            return;
        }
        let is_static = method.modifiers.is_static();
        let mut body = method.body.take();
        // Parameters stay in place so the method keeps its arity for
        // property lookups on this class
        let mut params = method.params.clone();
        for param in &mut method.params {
            param.default = None;
        }

        let scope = self.push(ScopeKind::Method, is_static);
        for param in &mut params {
            if let Some(default) = &mut param.default {
                self.visit_expr_mut(default);
            }
            self.declare_param(param);
        }
        if let Some(body) = &mut body {
            self.visit_stmt_mut(body);
        }
        self.pop();

        let method = self.method_mut(id, member);
        method.body = body;
        method.params = params;
        method.scope = Some(scope);
    }

    fn resolve_anonymous(&mut self, id: ClassId) {
        if !self.resolved_anonymous.insert(id) {
            return;
        }
        let static_context = self.in_static_context();
        self.unit.class_mut(id).static_context = static_context;
        let saved = self.pending_only;
        self.pending_only = false;
        self.resolve_class(id, self.current);
        self.pending_only = saved;
    }
}

fn binding_is_static(binding: &Binding) -> bool {
    match binding {
        Binding::Local(_) => true,
        Binding::Field { is_static, .. }
        | Binding::Property { is_static, .. }
        | Binding::Dynamic { is_static } => *is_static,
    }
}

impl VisitorMut for ScopeResolver<'_> {
    fn visit_expr_mut(&mut self, expr: &mut Expr) {
        let pos = expr.pos;
        match &mut expr.kind {
            ExprKind::Variable(v) => {
                if v.binding.is_none() {
                    let name = v.name.clone();
                    v.binding = Some(self.lookup(&name, pos));
                }
            }
            ExprKind::Declaration(d) => {
                if let Some(init) = &mut d.init {
                    self.visit_expr_mut(init);
                }
                if d.var.is_none() {
                    let (name, ty, modifiers) = (d.name.clone(), d.ty.clone(), d.modifiers);
                    d.var = Some(self.declare(&name, &ty, VarKind::Local, modifiers, pos));
                }
            }
            ExprKind::Closure(closure) => {
                let is_static = self.in_static_context();
                let scope = self.push(ScopeKind::Closure, is_static);
                match &mut closure.params {
                    Some(params) => {
                        for param in params {
                            if let Some(default) = &mut param.default {
                                self.visit_expr_mut(default);
                            }
                            self.declare_param(param);
                        }
                    }
                    None => {
                        // implicit parameter; nested closures each get their own
                        self.declare_unchecked("it", &TypeRef::object(), VarKind::Parameter, Modifiers::NONE, pos);
                    }
                }
                self.visit_stmt_mut(&mut closure.body);
                self.mark_closure_shared(scope);
                closure.scope = Some(scope);
                self.pop();
            }
            ExprKind::ConstructorCall(call) => {
                for arg in &mut call.args {
                    self.visit_expr_mut(arg);
                }
                if let Some(anonymous) = call.anonymous {
                    self.resolve_anonymous(anonymous);
                }
            }
            ExprKind::MethodCall(call) => {
                if call.implicit_this {
                    if let MemberName::Static(name) = &call.name {
                        if self.peek_local(name) {
                            // A local holding a closure: `c(x)` means `c.call(x)`
                            let name = name.clone();
                            let binding = self.lookup(&name, pos);
                            call.object = Box::new(Expr {
                                id: call.object.id,
                                kind: ExprKind::Variable(VariableRef {
                                    name,
                                    binding: Some(binding),
                                }),
                                pos,
                            });
                            call.name = MemberName::Static("call".to_string());
                            call.implicit_this = false;
                        }
                    }
                }
                walk_expr_mut(self, expr);
            }
            ExprKind::Property(access) => {
                if let (true, MemberName::Static(name)) = (access.object.is_this(), &access.name) {
                    let name = name.clone();
                    self.check_property_on_explicit_this(&name, pos);
                }
                walk_expr_mut(self, expr);
            }
            ExprKind::Super => {
                if self.in_static_context() {
                    self.report(
                        "'super' cannot be used in a static context".to_string(),
                        pos,
                    );
                }
            }
            _ => walk_expr_mut(self, expr),
        }
    }

    fn visit_stmt_mut(&mut self, stmt: &mut Stmt) {
        let is_static = self.in_static_context();
        let pos = stmt.pos;
        match &mut stmt.kind {
            StmtKind::Block(block) => {
                let scope = self.push(ScopeKind::Block, is_static);
                block.scope = Some(scope);
                for s in &mut block.stmts {
                    self.visit_stmt_mut(s);
                }
                self.pop();
            }
            StmtKind::For(f) => {
                let scope = self.push(ScopeKind::Loop, is_static);
                f.scope = Some(scope);
                walk_stmt_mut(self, stmt);
                self.pop();
            }
            StmtKind::ForIn(f) => {
                self.visit_expr_mut(&mut f.iterable);
                let scope = self.push(ScopeKind::Loop, is_static);
                f.scope = Some(scope);
                if f.var.var.is_none() {
                    let (name, ty, modifiers) = (f.var.name.clone(), f.var.ty.clone(), f.var.modifiers);
                    f.var.var = Some(self.declare(&name, &ty, VarKind::Local, modifiers, pos));
                }
                self.visit_stmt_mut(&mut f.body);
                self.pop();
            }
            StmtKind::Try(t) => {
                self.visit_stmt_mut(&mut t.body);
                for catch in &mut t.catches {
                    let scope = self.push(ScopeKind::Catch, is_static);
                    catch.scope = Some(scope);
                    self.declare_param(&mut catch.param);
                    self.visit_stmt_mut(&mut catch.body);
                    self.pop();
                }
                if let Some(finally) = &mut t.finally {
                    self.visit_stmt_mut(finally);
                }
            }
            _ => walk_stmt_mut(self, stmt),
        }
    }
}
