//! Scope Graph
//!
//! A rooted tree of scopes backed by an arena of integer indices, so parent
//! pointers and child lists never form ownership cycles. The current scope
//! is a stack of indices; `enter` pushes a child and `exit` pops.
//!
//! A scope entered across a transport boundary (ssh, container entry) is
//! *sealed*: parent-chain resolution stops there unless the name was
//! explicitly imported. This makes cross-transport data flow impossible
//! unless acknowledged by the author.

use std::collections::HashSet;

use indexmap::IndexMap;
use thiserror::Error;

use crate::ir::types::ExprId;
use crate::ir::value::Value;

/// Classification of a stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueClass {
    Data,
    Config,
    Secret,
}

/// Whether a variable may cross transport boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Taint {
    Agnostic,
    LocalOnly,
    BoundaryImported,
}

/// A variable binding in a scope.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub value: Value,
    pub origin: String,
    pub class: ValueClass,
    pub taint: Taint,
    /// Current expr id of the name, captured by references at their
    /// reference site.
    pub expr_id: Option<ExprId>,
}

#[derive(Debug, Clone)]
pub struct Scope {
    pub id: usize,
    pub session_id: String,
    pub sealed: bool,
    pub transport_depth: u32,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    vars: IndexMap<String, Binding>,
    imports: HashSet<String>,
}

#[derive(Debug, Error)]
pub enum ScopeError {
    #[error("cannot exit the root scope")]
    ExitRoot,
    #[error(
        "variable '{name}' is not visible in session '{session}': it lives in parent \
         session '{parent_session}' across a transport boundary; pass it explicitly \
         by importing it into the session"
    )]
    TransportBoundary {
        name: String,
        session: String,
        parent_session: String,
    },
    #[error("variable '{0}' is not defined")]
    Unresolved(String),
}

#[derive(Debug)]
pub struct ScopeGraph {
    scopes: Vec<Scope>,
    stack: Vec<usize>,
}

impl ScopeGraph {
    /// Create a graph with a root scope owned by `root_session`.
    pub fn new(root_session: impl Into<String>) -> Self {
        let root = Scope {
            id: 0,
            session_id: root_session.into(),
            sealed: false,
            transport_depth: 0,
            parent: None,
            children: Vec::new(),
            vars: IndexMap::new(),
            imports: HashSet::new(),
        };
        Self { scopes: vec![root], stack: vec![0] }
    }

    pub fn current(&self) -> usize {
        *self.stack.last().expect("scope stack never empty")
    }

    fn scope(&self, id: usize) -> &Scope {
        &self.scopes[id]
    }

    /// Read-only access to a scope by arena index.
    pub fn scope_at(&self, id: usize) -> Option<&Scope> {
        self.scopes.get(id)
    }

    /// Push a child of the current scope. `is_boundary` seals the child
    /// and bumps its transport depth.
    pub fn enter(&mut self, session_id: impl Into<String>, is_boundary: bool) -> usize {
        let parent = self.current();
        let id = self.scopes.len();
        let depth = self.scopes[parent].transport_depth + u32::from(is_boundary);
        self.scopes.push(Scope {
            id,
            session_id: session_id.into(),
            sealed: is_boundary,
            transport_depth: depth,
            parent: Some(parent),
            children: Vec::new(),
            vars: IndexMap::new(),
            imports: HashSet::new(),
        });
        self.scopes[parent].children.push(id);
        self.stack.push(id);
        id
    }

    /// Pop the current scope. The scope stays in the arena (emission and
    /// debug dumps still see it); only the cursor moves.
    pub fn exit(&mut self) -> Result<(), ScopeError> {
        if self.stack.len() == 1 {
            return Err(ScopeError::ExitRoot);
        }
        self.stack.pop();
        Ok(())
    }

    /// Bind a name in the current scope.
    pub fn store(
        &mut self,
        name: impl Into<String>,
        origin: impl Into<String>,
        value: Value,
        class: ValueClass,
        taint: Taint,
    ) {
        let current = self.current();
        self.scopes[current].vars.insert(
            name.into(),
            Binding {
                value,
                origin: origin.into(),
                class,
                taint,
                expr_id: None,
            },
        );
    }

    /// Attach the current expr id to a binding in the current scope.
    pub fn bind_expr(&mut self, name: &str, expr_id: ExprId) {
        let current = self.current();
        if let Some(binding) = self.scopes[current].vars.get_mut(name) {
            binding.expr_id = Some(expr_id);
        }
    }

    /// Admit a parent-chain name across this scope's sealed boundary.
    pub fn import(&mut self, name: impl Into<String>) {
        let current = self.current();
        self.scopes[current].imports.insert(name.into());
    }

    /// Walk the parent chain looking for a binding. Crossing a sealed
    /// scope requires the name to be in that scope's imports; otherwise
    /// the boundary error names the variable and both sessions.
    pub fn resolve(&self, name: &str) -> Result<&Binding, ScopeError> {
        let mut cursor = self.current();
        loop {
            let scope = self.scope(cursor);
            if let Some(binding) = scope.vars.get(name) {
                return Ok(binding);
            }
            let Some(parent) = scope.parent else {
                return Err(ScopeError::Unresolved(name.to_string()));
            };
            if scope.sealed && !scope.imports.contains(name) {
                return Err(ScopeError::TransportBoundary {
                    name: name.to_string(),
                    session: scope.session_id.clone(),
                    parent_session: self.scope(parent).session_id.clone(),
                });
            }
            cursor = parent;
        }
    }

    /// Flatten the bindings visible from the current scope. Child shadows
    /// parent. Flattening stops at a sealed boundary, but names imported
    /// across it are still admitted.
    pub fn as_map(&self) -> IndexMap<String, Value> {
        let mut out = IndexMap::new();
        let mut filters: Vec<&HashSet<String>> = Vec::new();
        let mut cursor = Some(self.current());
        while let Some(id) = cursor {
            let scope = self.scope(id);
            for (name, binding) in &scope.vars {
                let admitted = filters.iter().all(|imports| imports.contains(name));
                if admitted && !out.contains_key(name) {
                    out.insert(name.clone(), binding.value.clone());
                }
            }
            if scope.sealed {
                filters.push(&scope.imports);
            }
            cursor = scope.parent;
        }
        out
    }

    /// Post-order rendering of the whole graph for debug output. Values
    /// are never printed; bindings show class, taint, and expr id only.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.dump_scope(0, &mut out);
        out
    }

    fn dump_scope(&self, id: usize, out: &mut String) {
        let scope = self.scope(id);
        for child in &scope.children {
            self.dump_scope(*child, out);
        }
        out.push_str(&format!(
            "scope {} session={} depth={}{}\n",
            scope.id,
            scope.session_id,
            scope.transport_depth,
            if scope.sealed { " sealed" } else { "" },
        ));
        for (name, binding) in &scope.vars {
            out.push_str(&format!(
                "  {} class={:?} taint={:?} expr={}\n",
                name,
                binding.class,
                binding.taint,
                binding.expr_id.as_ref().map(|e| e.0.as_str()).unwrap_or("-"),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(graph: &mut ScopeGraph, name: &str, value: &str) {
        graph.store(name, "test", Value::Str(value.to_string()), ValueClass::Data, Taint::Agnostic);
    }

    #[test]
    fn test_resolve_walks_parent_chain() {
        let mut g = ScopeGraph::new("local");
        store(&mut g, "A", "1");
        g.enter("local", false);
        store(&mut g, "B", "2");
        assert_eq!(g.resolve("A").unwrap().value, Value::Str("1".into()));
        assert_eq!(g.resolve("B").unwrap().value, Value::Str("2".into()));
        assert!(matches!(g.resolve("C"), Err(ScopeError::Unresolved(_))));
    }

    #[test]
    fn test_child_shadows_parent() {
        let mut g = ScopeGraph::new("local");
        store(&mut g, "A", "outer");
        g.enter("local", false);
        store(&mut g, "A", "inner");
        assert_eq!(g.resolve("A").unwrap().value, Value::Str("inner".into()));
        g.exit().unwrap();
        assert_eq!(g.resolve("A").unwrap().value, Value::Str("outer".into()));
    }

    #[test]
    fn test_sealed_scope_blocks_unimported_names() {
        let mut g = ScopeGraph::new("local");
        store(&mut g, "TOKEN", "abc");
        g.enter("ssh-1", true);
        match g.resolve("TOKEN") {
            Err(ScopeError::TransportBoundary { name, session, parent_session }) => {
                assert_eq!(name, "TOKEN");
                assert_eq!(session, "ssh-1");
                assert_eq!(parent_session, "local");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_sealed_scope_admits_imports() {
        let mut g = ScopeGraph::new("local");
        store(&mut g, "TOKEN", "abc");
        g.enter("ssh-1", true);
        g.import("TOKEN");
        assert_eq!(g.resolve("TOKEN").unwrap().value, Value::Str("abc".into()));
    }

    #[test]
    fn test_transport_depth_monotone() {
        let mut g = ScopeGraph::new("local");
        let a = g.enter("retry-1", false);
        let b = g.enter("ssh-1", true);
        let c = g.enter("docker-1", true);
        let depths: Vec<u32> = [0, a, b, c]
            .iter()
            .map(|id| g.scope_at(*id).unwrap().transport_depth)
            .collect();
        assert_eq!(depths, vec![0, 0, 1, 2]);
        assert!(g.scope_at(b).unwrap().sealed);
        assert!(!g.scope_at(a).unwrap().sealed);
    }

    #[test]
    fn test_exit_root_errors() {
        let mut g = ScopeGraph::new("local");
        assert!(matches!(g.exit(), Err(ScopeError::ExitRoot)));
    }

    #[test]
    fn test_as_map_shadowing_and_sealing() {
        let mut g = ScopeGraph::new("local");
        store(&mut g, "A", "outer");
        store(&mut g, "SECRET", "s");
        g.enter("ssh-1", true);
        g.import("A");
        store(&mut g, "B", "inner");
        let map = g.as_map();
        assert_eq!(map.get("B"), Some(&Value::Str("inner".into())));
        assert_eq!(map.get("A"), Some(&Value::Str("outer".into())));
        // Not imported across the boundary: invisible.
        assert_eq!(map.get("SECRET"), None);
    }

    #[test]
    fn test_block_scope_does_not_mutate_outer_binding() {
        let mut g = ScopeGraph::new("local");
        store(&mut g, "X", "outer");
        g.enter("retry-1", false);
        store(&mut g, "X", "inner");
        g.exit().unwrap();
        assert_eq!(g.resolve("X").unwrap().value, Value::Str("outer".into()));
    }

    #[test]
    fn test_class_and_taint_are_preserved() {
        let mut g = ScopeGraph::new("local");
        g.store("KEY", "vault", Value::Str("s3cr3t".into()), ValueClass::Secret, Taint::LocalOnly);
        g.enter("ssh-1", true);
        g.import("KEY");
        g.store(
            "KEY",
            "import",
            Value::Str("s3cr3t".into()),
            ValueClass::Secret,
            Taint::BoundaryImported,
        );
        let binding = g.resolve("KEY").unwrap();
        assert_eq!(binding.class, ValueClass::Secret);
        assert_eq!(binding.taint, Taint::BoundaryImported);
        g.exit().unwrap();
        assert_eq!(g.resolve("KEY").unwrap().taint, Taint::LocalOnly);
    }

    #[test]
    fn test_dump_is_post_order() {
        let mut g = ScopeGraph::new("local");
        g.enter("a", false);
        g.exit().unwrap();
        g.enter("b", false);
        let dump = g.dump();
        let a_pos = dump.find("session=a").unwrap();
        let b_pos = dump.find("session=b").unwrap();
        let root_pos = dump.find("session=local").unwrap();
        assert!(a_pos < root_pos && b_pos < root_pos);
    }
}
