//! Final-variable and dead-code analysis
//!
//! Tracks, per local variable, whether it has been assigned never, once,
//! more than once, or only on some paths. Reassigning a `final` variable is
//! fatal; reading a `final` variable that may still be uninitialized is a
//! collected error. The same walk flags the first statement following a
//! `return`/`break`/`continue`/`throw` in a block as unreachable.

use super::location;
use crate::ast::visit::{walk_expr, walk_stmt, Visitor};
use crate::ast::*;
use crate::context::CompilationContext;
use crate::error::{CompileError, CompileResult};
use rustc_hash::{FxHashMap, FxHashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VarState {
    Uninitialized,
    Final,
    Var,
    /// Initialized on some paths only
    Ambiguous,
}

impl VarState {
    fn next(self) -> Self {
        match self {
            VarState::Uninitialized => VarState::Final,
            _ => VarState::Var,
        }
    }

    fn may_be_uninitialized(self) -> bool {
        matches!(self, VarState::Uninitialized | VarState::Ambiguous)
    }
}

type StateMap = FxHashMap<VarId, VarState>;

#[tracing::instrument(skip_all)]
pub fn analyze(ctx: &CompilationContext, unit: &mut CompileUnit) -> CompileResult<()> {
    let mut unreachable = FxHashSet::default();
    for id in unit.primary_classes() {
        let class = unit.class(id);
        tracing::trace!(class = %class.name, "final variable analysis");
        let mut analyzer = FinalAnalyzer::new(ctx, unit, id);
        for method in class.constructors.iter().chain(&class.methods) {
            if let Some(body) = &method.body {
                analyzer.run(|a| a.visit_stmt(body));
            }
        }
        for init in class.fields.iter().filter_map(|f| f.initial.as_ref()) {
            analyzer.run(|a| a.visit_expr(init));
        }
        for blocks in [&class.object_initializers, &class.static_initializers] {
            analyzer.run(|a| {
                for block in blocks {
                    a.visit_stmt(block);
                }
            });
        }
        let (failure, found) = analyzer.finish();
        unreachable.extend(found);
        if let Some(err) = failure {
            return Err(err);
        }
    }
    tracing::debug!(unreachable = unreachable.len(), "final variable analysis done");
    unit.side.unreachable.extend(unreachable);
    Ok(())
}

/// Last statement of the block (or the statement itself) leaves it
fn returning_block(stmt: &Stmt) -> bool {
    match &stmt.kind {
        StmtKind::Return(_) | StmtKind::Throw(_) => true,
        StmtKind::Block(block) => block.stmts.last().is_some_and(returning_block),
        _ => false,
    }
}

struct FinalAnalyzer<'a> {
    ctx: &'a CompilationContext,
    unit: &'a CompileUnit,
    class: ClassId,
    states: Vec<StateMap>,
    in_rhs: bool,
    in_args: bool,
    /// Nodes already reported; `finally` blocks are walked more than once
    reported: FxHashSet<NodeId>,
    unreachable: FxHashSet<NodeId>,
    failure: Option<CompileError>,
}

impl<'a> FinalAnalyzer<'a> {
    fn new(ctx: &'a CompilationContext, unit: &'a CompileUnit, class: ClassId) -> Self {
        Self {
            ctx,
            unit,
            class,
            states: vec![StateMap::default()],
            in_rhs: false,
            in_args: false,
            reported: FxHashSet::default(),
            unreachable: FxHashSet::default(),
            failure: None,
        }
    }

    /// Analyze one body from a clean state
    fn run(&mut self, f: impl FnOnce(&mut Self)) {
        if self.failure.is_some() {
            return;
        }
        self.states = vec![StateMap::default()];
        self.in_rhs = false;
        self.in_args = false;
        f(self);
    }

    fn finish(self) -> (Option<CompileError>, FxHashSet<NodeId>) {
        (self.failure, self.unreachable)
    }

    fn state(&mut self) -> &mut StateMap {
        let last = self.states.len() - 1;
        &mut self.states[last]
    }

    fn push_state(&mut self) {
        let copy = self.state().clone();
        self.states.push(copy);
    }

    fn pop_state(&mut self) -> StateMap {
        self.states.pop().unwrap_or_default()
    }

    fn report(&mut self, node: NodeId, message: String, pos: SourcePos) {
        if self.failure.is_some() || !self.reported.insert(node) {
            return;
        }
        let location = location(self.unit, self.class, pos);
        if let Err(err) = self.ctx.error(message, location) {
            self.failure = Some(err);
        }
    }

    fn record_assignment(&mut self, var: VarId, declaration: bool, uninitialized: bool, force_var: bool, pos: SourcePos) {
        let unit = self.unit;
        let variable = unit.vars.get(var);
        let state = self.state();
        if !declaration && variable.closure_shared {
            state.insert(var, VarState::Var);
        }
        let next = match state.get(&var) {
            None if uninitialized => VarState::Uninitialized,
            None if variable.is_parameter() => VarState::Var,
            None => VarState::Final,
            Some(current) => current.next(),
        };
        let next = if force_var { VarState::Var } else { next };
        state.insert(var, next);

        if matches!(next, VarState::Var | VarState::Ambiguous) && variable.is_final() && self.failure.is_none() {
            self.failure = Some(CompileError::FinalReassigned {
                kind: if variable.is_parameter() { "parameter" } else { "variable" },
                name: variable.name.clone(),
                location: location(self.unit, self.class, pos),
            });
        }
    }

    fn check_read(&mut self, expr: &Expr, var: VarId) {
        let unit = self.unit;
        let variable = unit.vars.get(var);
        if variable.closure_shared || !variable.is_final() || !(self.in_rhs || self.in_args) {
            return;
        }
        let uninitialized = self
            .state()
            .get(&var)
            .is_some_and(|s| s.may_be_uninitialized());
        if uninitialized {
            let message = format!("The variable [{}] may be uninitialized", variable.name);
            self.report(expr.id, message, expr.pos);
        }
    }

    fn visit_args(&mut self, args: &[Expr]) {
        let old = std::mem::replace(&mut self.in_args, true);
        for arg in args {
            self.visit_expr(arg);
        }
        self.in_args = old;
    }

    // ===== Control flow =====

    fn visit_if(&mut self, stmt: &IfStmt) {
        self.visit_expr(&stmt.cond);
        self.push_state();
        self.visit_stmt(&stmt.then);
        let then_state = self.pop_state();
        self.push_state();
        if let Some(otherwise) = &stmt.otherwise {
            self.visit_stmt(otherwise);
        }
        let else_state = self.pop_state();

        let then_returns = returning_block(&stmt.then);
        let else_returns = stmt.otherwise.as_deref().is_some_and(returning_block);
        let current = self.state();
        for (var, before) in current.iter_mut() {
            let then_value = then_state.get(var).copied();
            let else_value = else_state.get(var).copied();
            *before = match (then_returns, else_returns) {
                (true, true) => continue,
                (true, false) => else_value.unwrap_or(*before),
                (false, true) => then_value.unwrap_or(*before),
                (false, false) => merge_branches(then_value, else_value),
            };
        }
    }

    fn visit_try(&mut self, stmt: &TryStmt) {
        let before_try = self.state().clone();
        self.push_state();
        self.visit_stmt(&stmt.body);
        let after_try = self.state().clone();
        let try_returns = returning_block(&stmt.body);
        let mut after_states = Vec::new();
        if let Some(finally) = &stmt.finally {
            self.visit_stmt(finally);
        }
        if !try_returns {
            after_states.push(self.state().clone());
        }
        self.pop_state();

        // the try block may have thrown before doing anything
        if stmt.catches.is_empty() {
            if let Some(finally) = &stmt.finally {
                self.visit_stmt(finally);
            }
            if !try_returns {
                after_states.push(self.state().clone());
            }
        }
        for catch in &stmt.catches {
            for initial in [&before_try, &after_try] {
                self.push_state();
                self.state().extend(initial.iter().map(|(k, v)| (*k, *v)));
                self.visit_stmt(&catch.body);
                if let Some(finally) = &stmt.finally {
                    self.visit_stmt(finally);
                }
                if !returning_block(&catch.body) {
                    after_states.push(self.state().clone());
                }
                self.pop_state();
            }
        }

        if after_states.is_empty() {
            return;
        }
        let mut corrected = after_states.remove(0);
        for next in &after_states {
            for (var, state) in corrected.iter_mut() {
                if *state == VarState::Ambiguous {
                    continue;
                }
                let candidate = next.get(var).copied();
                if Some(*state) != candidate {
                    *state = if *state == VarState::Uninitialized
                        || candidate == Some(VarState::Uninitialized)
                    {
                        VarState::Ambiguous
                    } else {
                        VarState::Var
                    };
                }
            }
        }
        self.state().extend(corrected);
    }

    fn check_dead_code(&mut self, block: &Block) {
        let dead = block
            .stmts
            .windows(2)
            .find(|pair| pair[0].is_exit())
            .map(|pair| (pair[1].id, pair[1].pos));
        if let Some((id, pos)) = dead {
            if self.unreachable.insert(id) {
                self.ctx
                    .warning("Unreachable statement found", location(self.unit, self.class, pos));
            }
        }
    }
}

fn merge_branches(then_value: Option<VarState>, else_value: Option<VarState>) -> VarState {
    match (then_value, else_value) {
        (Some(VarState::Final), Some(VarState::Final)) => VarState::Final,
        (Some(VarState::Uninitialized), Some(VarState::Uninitialized)) => VarState::Uninitialized,
        (Some(a), Some(b)) if a.may_be_uninitialized() || b.may_be_uninitialized() => VarState::Ambiguous,
        _ => VarState::Var,
    }
}

impl Visitor for FinalAnalyzer<'_> {
    fn visit_expr(&mut self, expr: &Expr) {
        if self.failure.is_some() {
            return;
        }
        match &expr.kind {
            ExprKind::Declaration(decl) => {
                if let Some(init) = &decl.init {
                    let old = std::mem::replace(&mut self.in_rhs, true);
                    self.visit_expr(init);
                    self.in_rhs = old;
                }
                if let Some(var) = decl.var {
                    self.record_assignment(var, true, decl.init.is_none(), false, expr.pos);
                }
            }
            ExprKind::Assign(assign) => {
                let old = std::mem::replace(&mut self.in_rhs, true);
                self.visit_expr(&assign.value);
                self.in_rhs = false;
                self.visit_expr(&assign.target);
                self.in_rhs = old;
                if let Some(VariableRef {
                    binding: Some(Binding::Local(var)),
                    ..
                }) = assign.target.as_variable()
                {
                    self.record_assignment(*var, false, false, false, expr.pos);
                }
            }
            ExprKind::IncDec(inc) => {
                let local = match inc.target.as_variable() {
                    Some(VariableRef {
                        binding: Some(Binding::Local(var)),
                        ..
                    }) => Some(*var),
                    _ => None,
                };
                let old = std::mem::replace(&mut self.in_rhs, local.is_some());
                self.visit_expr(&inc.target);
                self.in_rhs = old;
                if let Some(var) = local {
                    self.record_assignment(var, false, false, true, expr.pos);
                }
            }
            ExprKind::Variable(VariableRef {
                binding: Some(Binding::Local(var)),
                ..
            }) => self.check_read(expr, *var),
            ExprKind::Closure(closure) => {
                let saved = (self.in_rhs, self.in_args);
                self.in_rhs = false;
                self.in_args = false;
                let original = self.state().clone();
                self.visit_stmt(&closure.body);
                // locals declared inside the closure do not outlive it
                self.state().retain(|var, _| original.contains_key(var));
                (self.in_rhs, self.in_args) = saved;
            }
            ExprKind::MethodCall(call) => {
                self.visit_expr(&call.object);
                if let MemberName::Dynamic(name) = &call.name {
                    self.visit_expr(name);
                }
                self.visit_args(&call.args);
            }
            ExprKind::StaticCall(call) => self.visit_args(&call.args),
            ExprKind::ConstructorCall(call) => self.visit_args(&call.args),
            _ => walk_expr(self, expr),
        }
    }

    fn visit_stmt(&mut self, stmt: &Stmt) {
        if self.failure.is_some() {
            return;
        }
        match &stmt.kind {
            StmtKind::Block(block) => {
                self.check_dead_code(block);
                walk_stmt(self, stmt);
            }
            StmtKind::If(if_stmt) => self.visit_if(if_stmt),
            StmtKind::Try(try_stmt) => self.visit_try(try_stmt),
            _ => walk_stmt(self, stmt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope;

    fn run(body: impl FnOnce(&AstBuilder) -> Vec<Stmt>, params: Vec<Parameter>) -> (CompileUnit, CompilationContext, CompileResult<()>) {
        let mut unit = CompileUnit::new();
        let b = unit.builder();
        let mut class = ClassNode::new("p.A", ClassKind::Class);
        class.source_file = Some("A.groovy".into());
        class.methods.push(
            MethodNode::new("run", Modifiers::PUBLIC, TypeRef::void())
                .with_params(params)
                .with_body(b.block(body(&b))),
        );
        unit.add_class(class);
        let ctx = CompilationContext::default();
        scope::resolve(&ctx, &mut unit).unwrap();
        let result = analyze(&ctx, &mut unit);
        (unit, ctx, result)
    }

    fn errors(ctx: &CompilationContext) -> Vec<String> {
        ctx.errors().errors().into_iter().map(|d| d.message).collect()
    }

    #[test]
    fn test_final_reassignment_is_fatal() {
        let (_, _, result) = run(
            |b| {
                vec![
                    b.expr_stmt(b.declare_final("x", TypeRef::int(), Some(b.int(1)))),
                    b.expr_stmt(b.assign(b.var("x"), b.int(2)).at(3, 5)),
                ]
            },
            vec![],
        );
        let err = result.unwrap_err();
        assert_eq!(
            err.to_string(),
            "A.groovy:3:5: The variable [x] is declared final but is reassigned"
        );
    }

    #[test]
    fn test_deferred_initialization_is_allowed() {
        let (_, ctx, result) = run(
            |b| {
                vec![
                    b.expr_stmt(b.declare_final("x", TypeRef::int(), None)),
                    b.if_(
                        b.boolean(true),
                        b.block(vec![b.expr_stmt(b.assign(b.var("x"), b.int(1)))]),
                        Some(b.block(vec![b.expr_stmt(b.assign(b.var("x"), b.int(2)))])),
                    ),
                    b.expr_stmt(b.declare("y", TypeRef::int(), Some(b.var("x")))),
                ]
            },
            vec![],
        );
        result.unwrap();
        assert!(errors(&ctx).is_empty());
    }

    #[test]
    fn test_assignment_after_both_branches_is_fatal() {
        let (_, _, result) = run(
            |b| {
                vec![
                    b.expr_stmt(b.declare_final("x", TypeRef::int(), None)),
                    b.if_(
                        b.boolean(true),
                        b.expr_stmt(b.assign(b.var("x"), b.int(1))),
                        Some(b.expr_stmt(b.assign(b.var("x"), b.int(2)))),
                    ),
                    b.expr_stmt(b.assign(b.var("x"), b.int(3))),
                ]
            },
            vec![],
        );
        assert!(matches!(result, Err(CompileError::FinalReassigned { .. })));
    }

    #[test]
    fn test_final_parameter() {
        let (_, _, result) = run(
            |b| vec![b.expr_stmt(b.assign(b.var("p"), b.int(2)))],
            vec![Parameter::new("p", TypeRef::int()).with_modifiers(Modifiers::FINAL)],
        );
        match result {
            Err(CompileError::FinalReassigned { kind, name, .. }) => {
                assert_eq!((kind, name.as_str()), ("parameter", "p"))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_increment_forces_var() {
        let (_, _, result) = run(
            |b| {
                vec![
                    b.expr_stmt(b.declare_final("i", TypeRef::int(), Some(b.int(0)))),
                    b.expr_stmt(b.inc_dec(IncDecOp::Increment, false, b.var("i"))),
                ]
            },
            vec![],
        );
        assert!(matches!(result, Err(CompileError::FinalReassigned { .. })));
    }

    #[test]
    fn test_plain_variables_may_be_reassigned() {
        let (_, ctx, result) = run(
            |b| {
                vec![
                    b.expr_stmt(b.declare("x", TypeRef::int(), Some(b.int(1)))),
                    b.expr_stmt(b.assign(b.var("x"), b.int(2))),
                    b.expr_stmt(b.inc_dec(IncDecOp::Increment, true, b.var("x"))),
                ]
            },
            vec![],
        );
        result.unwrap();
        assert!(errors(&ctx).is_empty());
    }

    #[test]
    fn test_read_of_possibly_uninitialized_final() {
        let (_, ctx, result) = run(
            |b| {
                vec![
                    b.expr_stmt(b.declare_final("x", TypeRef::int(), None)),
                    b.if_(b.boolean(true), b.expr_stmt(b.assign(b.var("x"), b.int(1))), None),
                    b.expr_stmt(b.declare("y", TypeRef::int(), Some(b.var("x")))),
                ]
            },
            vec![],
        );
        result.unwrap();
        assert_eq!(errors(&ctx), vec!["The variable [x] may be uninitialized".to_string()]);
    }

    #[test]
    fn test_returning_branch_is_excluded_from_merge() {
        let (_, ctx, result) = run(
            |b| {
                vec![
                    b.expr_stmt(b.declare_final("x", TypeRef::int(), None)),
                    b.if_(
                        b.boolean(true),
                        b.block(vec![b.ret_void()]),
                        Some(b.expr_stmt(b.assign(b.var("x"), b.int(1)))),
                    ),
                    b.expr_stmt(b.declare("y", TypeRef::int(), Some(b.var("x")))),
                ]
            },
            vec![],
        );
        result.unwrap();
        assert!(errors(&ctx).is_empty());
    }

    #[test]
    fn test_initialization_only_inside_try_is_ambiguous() {
        let (_, ctx, result) = run(
            |b| {
                vec![
                    b.expr_stmt(b.declare_final("x", TypeRef::int(), None)),
                    b.try_(
                        b.block(vec![b.expr_stmt(b.assign(b.var("x"), b.int(1)))]),
                        vec![b.catch(
                            Parameter::new("e", TypeRef::class("java.lang.Exception")),
                            b.block(vec![]),
                        )],
                        None,
                    ),
                    b.expr_stmt(b.call_this("println", vec![b.var("x")])),
                ]
            },
            vec![],
        );
        result.unwrap();
        assert_eq!(errors(&ctx), vec!["The variable [x] may be uninitialized".to_string()]);
    }

    #[test]
    fn test_unreachable_statement_flagged_once_per_block() {
        let mut ids = Vec::new();
        let (unit, ctx, result) = run(
            |b| {
                let stmts = vec![
                    b.expr_stmt(b.declare("x", TypeRef::int(), Some(b.int(1)))),
                    b.ret_void(),
                    b.expr_stmt(b.assign(b.var("x"), b.int(2))),
                    b.expr_stmt(b.assign(b.var("x"), b.int(3))),
                ];
                ids = stmts.iter().map(|s| s.id).collect();
                stmts
            },
            vec![],
        );
        result.unwrap();
        let warnings = ctx.errors().warnings();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].message, "Unreachable statement found");
        assert!(unit.side.unreachable.contains(&ids[2]));
        assert!(!unit.side.unreachable.contains(&ids[3]));
    }

    #[test]
    fn test_closure_locals_do_not_leak() {
        let (_, ctx, result) = run(
            |b| {
                vec![
                    b.expr_stmt(b.closure(
                        None,
                        b.block(vec![b.expr_stmt(b.declare_final("z", TypeRef::int(), Some(b.int(1))))]),
                    )),
                    b.expr_stmt(b.declare("after", TypeRef::int(), Some(b.int(2)))),
                ]
            },
            vec![],
        );
        result.unwrap();
        assert!(errors(&ctx).is_empty());
    }
}
