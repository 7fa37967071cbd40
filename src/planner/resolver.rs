//! Resolver (Pass 2)
//!
//! Walks the IR in textual order, capturing reference bindings at the
//! reference site, evaluating declaration values once, populating the
//! vault, and materialising branch selection for if/when/for. Pass 1 never
//! calls value providers; this pass does, exactly once per provider key.

use indexmap::IndexMap;

use crate::ir::types::*;
use crate::ir::value::Value;
use crate::planner::errors::PlanError;
use crate::planner::eval::Evaluator;
use crate::planner::registry::DecoratorRegistry;
use crate::scope::{ScopeGraph, Taint, ValueClass};
use crate::vault::Vault;

pub struct Resolver<'a> {
    scopes: &'a mut ScopeGraph,
    vault: &'a mut Vault,
    registry: &'a DecoratorRegistry,
    /// Decorator key -> derived expr id, resolved once per planning run.
    decorator_ids: IndexMap<String, ExprId>,
    /// Fallback ids for bindings seeded by the embedder without a
    /// declaration site (enum members, injected config).
    named_ids: IndexMap<String, ExprId>,
    session_seq: u64,
}

impl<'a> Resolver<'a> {
    pub fn new(
        scopes: &'a mut ScopeGraph,
        vault: &'a mut Vault,
        registry: &'a DecoratorRegistry,
    ) -> Self {
        Self {
            scopes,
            vault,
            registry,
            decorator_ids: IndexMap::new(),
            named_ids: IndexMap::new(),
            session_seq: 0,
        }
    }

    pub fn resolve_statements(&mut self, stmts: &mut [Statement]) -> Result<(), PlanError> {
        for stmt in stmts {
            self.resolve_statement(stmt)?;
        }
        Ok(())
    }

    fn evaluate(&self, expr: &Expression) -> Result<Value, PlanError> {
        Evaluator::new(self.scopes, self.vault, self.registry).evaluate(expr)
    }

    fn current_session(&self) -> String {
        let id = self.scopes.current();
        self.scopes
            .scope_at(id)
            .map(|s| s.session_id.clone())
            .unwrap_or_else(|| "local".to_string())
    }

    fn resolve_statement(&mut self, stmt: &mut Statement) -> Result<(), PlanError> {
        match stmt {
            Statement::VarDecl(decl) => {
                self.capture_refs(&mut decl.value)?;
                let value = self.evaluate(&decl.value)?;
                self.vault.store(&decl.expr_id, value.clone());
                self.scopes.store(
                    decl.name.clone(),
                    format!("decl:{}", decl.expr_id),
                    value,
                    ValueClass::Data,
                    Taint::Agnostic,
                );
                self.scopes.bind_expr(&decl.name, decl.expr_id.clone());
                Ok(())
            }
            Statement::Command(cmd) => {
                for part in &mut cmd.command.parts {
                    self.capture_refs(part)?;
                }
                for (_, arg) in &mut cmd.args {
                    self.capture_refs(arg)?;
                }
                if let Some(block) = &mut cmd.block {
                    let (session_id, boundary) = match self
                        .registry
                        .get(&cmd.decorator)
                        .and_then(|d| d.block_session())
                    {
                        Some(session) => {
                            self.session_seq += 1;
                            (format!("{}-{}", cmd.decorator, self.session_seq), session.is_boundary)
                        }
                        None => (self.current_session(), false),
                    };
                    self.scopes.enter(session_id, boundary);
                    if boundary {
                        // The `imports` named argument admits parent-scope
                        // names across the transport boundary.
                        for name in import_names(&cmd.args) {
                            self.scopes.import(name);
                        }
                    }
                    let result = self.resolve_statements(block);
                    self.scopes.exit().expect("block scope entered above");
                    result?;
                }
                Ok(())
            }
            Statement::Blocker(blocker) => match &mut blocker.node {
                BlockerNode::If(node) => {
                    self.capture_refs(&mut node.condition)?;
                    let taken = self.evaluate(&node.condition)?.is_truthy();
                    node.taken = Some(taken);
                    let branch = if taken { &mut node.then_branch } else { &mut node.else_branch };
                    if !branch.is_empty() {
                        let session = self.current_session();
                        self.scopes.enter(session, false);
                        let result = self.resolve_statements(branch);
                        self.scopes.exit().expect("branch scope entered above");
                        result?;
                    }
                    Ok(())
                }
                BlockerNode::For(node) => {
                    self.capture_refs(&mut node.collection)?;
                    let collection = self.evaluate(&node.collection)?;
                    let Value::List(items) = collection else {
                        return Err(PlanError::NotIterable(collection.type_name()));
                    };
                    for (index, item) in items.into_iter().enumerate() {
                        let mut body = node.body.clone();
                        let iter_id = node.expr_id.derived(&format!("it{}", index + 1));
                        self.vault.store(&iter_id, item.clone());
                        let session = self.current_session();
                        self.scopes.enter(session, false);
                        self.scopes.store(
                            node.variable.clone(),
                            format!("loop:{}", iter_id),
                            item.clone(),
                            ValueClass::Data,
                            Taint::Agnostic,
                        );
                        self.scopes.bind_expr(&node.variable, iter_id);
                        let result = self.resolve_statements(&mut body);
                        self.scopes.exit().expect("iteration scope entered above");
                        result?;
                        node.iterations.push(Iteration { value: item, body });
                    }
                    Ok(())
                }
                BlockerNode::When(node) => {
                    self.capture_refs(&mut node.condition)?;
                    let subject = self.evaluate(&node.condition)?;
                    node.matched_arm = Some(-1);
                    for index in 0..node.arms.len() {
                        let matched = match &mut node.arms[index].pattern {
                            None => true,
                            Some(pattern) => {
                                self.capture_refs(pattern)?;
                                self.evaluate(pattern)? == subject
                            }
                        };
                        if matched {
                            node.matched_arm = Some(index as i64);
                            let session = self.current_session();
                            self.scopes.enter(session, false);
                            let result = self.resolve_statements(&mut node.arms[index].body);
                            self.scopes.exit().expect("arm scope entered above");
                            result?;
                            break;
                        }
                    }
                    Ok(())
                }
            },
            Statement::Try(node) => {
                // All three branches resolve; which one runs is a runtime
                // decision the plan defers to the executor.
                for body in [&mut node.try_body, &mut node.catch_body, &mut node.finally_body] {
                    let session = self.current_session();
                    self.scopes.enter(session, false);
                    let result = self.resolve_statements(body);
                    self.scopes.exit().expect("try scope entered above");
                    result?;
                }
                Ok(())
            }
        }
    }

    // =========================================================================
    // REFERENCE CAPTURE
    // =========================================================================

    /// Record the expr id visible for each reference at this site. Later
    /// redeclarations allocate new ids without rewriting captures made
    /// here, which is what makes shadowing correct.
    fn capture_refs(&mut self, expr: &mut Expression) -> Result<(), PlanError> {
        match expr {
            Expression::Literal(_) => Ok(()),
            Expression::VarRef(e) => {
                let (expr_id, value) = {
                    let binding = self.scopes.resolve(&e.name)?;
                    (binding.expr_id.clone(), binding.value.clone())
                };
                e.binding = Some(match expr_id {
                    Some(id) => id,
                    None => self.seeded_id(&e.name, value),
                });
                Ok(())
            }
            Expression::EnumMemberRef(e) => {
                let qualified = format!("{}.{}", e.enum_name, e.member);
                let (expr_id, value) = match self.scopes.resolve(&qualified) {
                    Ok(b) => (b.expr_id.clone(), b.value.clone()),
                    Err(crate::scope::ScopeError::Unresolved(_)) => {
                        return Err(PlanError::UnresolvedEnumMember {
                            enum_name: e.enum_name.clone(),
                            member: e.member.clone(),
                        })
                    }
                    Err(other) => return Err(other.into()),
                };
                e.binding = Some(match expr_id {
                    Some(id) => id,
                    None => self.seeded_id(&qualified, value),
                });
                Ok(())
            }
            Expression::DecoratorRef(e) => {
                for arg in &mut e.args {
                    self.capture_refs(arg)?;
                }
                if e.name == "var" {
                    // `@var.NAME` is reference syntax for a declared
                    // variable: capture the scope binding directly so each
                    // use site sees the declaration current at that point.
                    let name = e.path.join(".");
                    let (expr_id, value) = {
                        let binding = self.scopes.resolve(&name)?;
                        (binding.expr_id.clone(), binding.value.clone())
                    };
                    e.binding = Some(match expr_id {
                        Some(id) => id,
                        None => self.seeded_id(&name, value),
                    });
                    return Ok(());
                }
                let key = e.key();
                if let Some(id) = self.decorator_ids.get(&key) {
                    e.binding = Some(id.clone());
                    return Ok(());
                }
                let Some(decorator) = self.registry.get(&e.name) else {
                    return Err(PlanError::NotAValueProvider(e.name.clone()));
                };
                let value = match decorator.resolve_value(&e.path, &self.scopes.as_map()) {
                    Some(result) => result?,
                    None => return Err(PlanError::NotAValueProvider(e.name.clone())),
                };
                let id = ExprId(format!("d:{}", key));
                self.vault.store(&id, value);
                self.decorator_ids.insert(key, id.clone());
                e.binding = Some(id);
                Ok(())
            }
            Expression::BinaryOp(e) => {
                self.capture_refs(&mut e.left)?;
                self.capture_refs(&mut e.right)
            }
            Expression::TypeCast(e) => self.capture_refs(&mut e.inner),
            Expression::Command(e) => {
                for part in &mut e.parts {
                    self.capture_refs(part)?;
                }
                Ok(())
            }
        }
    }

    /// Stable id for embedder-seeded bindings with no declaration site.
    fn seeded_id(&mut self, name: &str, value: Value) -> ExprId {
        if let Some(id) = self.named_ids.get(name) {
            return id.clone();
        }
        let id = ExprId(format!("v:{}", name));
        self.vault.store(&id, value);
        self.named_ids.insert(name.to_string(), id.clone());
        id
    }
}

/// Names listed in a literal `imports` argument.
fn import_names(args: &[(String, Expression)]) -> Vec<String> {
    let mut names = Vec::new();
    for (key, expr) in args {
        if key != "imports" {
            continue;
        }
        if let Expression::Literal(lit) = expr {
            if let Value::List(items) = &lit.value {
                for item in items {
                    if let Value::Str(name) = item {
                        names.push(name.clone());
                    }
                }
            }
        }
    }
    names
}
