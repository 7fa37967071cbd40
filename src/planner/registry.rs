//! Decorator / Session Registry
//!
//! Pluggable registry keyed by decorator name. An entry can be a value
//! provider (resolving a selector path at plan time), open a block session
//! (possibly across a transport boundary), or neither (a plain command
//! decorator like `@shell`).

use indexmap::IndexMap;

use crate::ir::value::Value;
use crate::planner::errors::PlanError;

/// Where a session runs relative to the planner host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportScope {
    Local,
    Remote,
}

/// A planning-time session. Remote-scope transitions are transport
/// boundaries and seal the scopes they open.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: String,
    pub scope: TransportScope,
}

impl Session {
    pub fn is_remote(&self) -> bool {
        self.scope == TransportScope::Remote
    }
}

/// What a block-opening decorator declares about the session it opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSession {
    pub transport: TransportScope,
    pub is_boundary: bool,
}

/// One registry entry.
pub trait Decorator: Send + Sync {
    fn name(&self) -> &str;

    /// Value provider: resolve a selector path against the visible scope
    /// map. `None` means this decorator is not a value provider.
    fn resolve_value(
        &self,
        _path: &[String],
        _vars: &IndexMap<String, Value>,
    ) -> Option<Result<Value, PlanError>> {
        None
    }

    /// Block session: `Some` when a nested block under this decorator
    /// opens a new session.
    fn block_session(&self) -> Option<BlockSession> {
        None
    }
}

pub struct DecoratorRegistry {
    entries: IndexMap<String, Box<dyn Decorator>>,
}

impl DecoratorRegistry {
    pub fn new() -> Self {
        Self { entries: IndexMap::new() }
    }

    /// A registry with the built-in decorators installed. `@env` starts
    /// with an empty snapshot; use `with_env` to configure one.
    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        reg.register(Box::new(ShellDecorator));
        reg.register(Box::new(VarDecorator));
        reg.register(Box::new(EnvDecorator::new(IndexMap::new())));
        reg.register(Box::new(SessionDecorator::remote("ssh")));
        reg.register(Box::new(SessionDecorator::remote("docker")));
        reg.register(Box::new(SessionDecorator::local("retry")));
        reg.register(Box::new(SessionDecorator::local("timeout")));
        reg
    }

    pub fn register(&mut self, decorator: Box<dyn Decorator>) {
        self.entries.insert(decorator.name().to_string(), decorator);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Decorator> {
        self.entries.get(name).map(|d| d.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(|s| s.as_str()).collect()
    }
}

impl Default for DecoratorRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

// =============================================================================
// BUILT-IN DECORATORS
// =============================================================================

/// `@shell`: the default command decorator. Neither a provider nor a
/// session opener.
pub struct ShellDecorator;

impl Decorator for ShellDecorator {
    fn name(&self) -> &str {
        "shell"
    }
}

/// `@var.NAME`: reads a declared variable from the visible scope map.
pub struct VarDecorator;

impl Decorator for VarDecorator {
    fn name(&self) -> &str {
        "var"
    }

    fn resolve_value(
        &self,
        path: &[String],
        vars: &IndexMap<String, Value>,
    ) -> Option<Result<Value, PlanError>> {
        let key = path.join(".");
        Some(match vars.get(&key) {
            Some(v) => Ok(v.clone()),
            None => Err(PlanError::UnresolvedReference(format!("var.{}", key))),
        })
    }
}

/// `@env.NAME`: reads a value from a configured environment snapshot.
/// Never the process environment; the embedder decides what is visible.
pub struct EnvDecorator {
    snapshot: IndexMap<String, Value>,
}

impl EnvDecorator {
    pub fn new(snapshot: IndexMap<String, Value>) -> Self {
        Self { snapshot }
    }
}

impl Decorator for EnvDecorator {
    fn name(&self) -> &str {
        "env"
    }

    fn resolve_value(
        &self,
        path: &[String],
        _vars: &IndexMap<String, Value>,
    ) -> Option<Result<Value, PlanError>> {
        let key = path.join(".");
        Some(match self.snapshot.get(&key) {
            Some(v) => Ok(v.clone()),
            None => Err(PlanError::UnresolvedReference(format!("env.{}", key))),
        })
    }
}

/// A block-opening decorator: `@ssh` / `@docker` open remote sessions
/// across transport boundaries, `@retry` / `@timeout` open local ones.
pub struct SessionDecorator {
    name: &'static str,
    transport: TransportScope,
}

impl SessionDecorator {
    pub fn remote(name: &'static str) -> Self {
        Self { name, transport: TransportScope::Remote }
    }

    pub fn local(name: &'static str) -> Self {
        Self { name, transport: TransportScope::Local }
    }
}

impl Decorator for SessionDecorator {
    fn name(&self) -> &str {
        self.name
    }

    fn block_session(&self) -> Option<BlockSession> {
        Some(BlockSession {
            transport: self.transport,
            is_boundary: self.transport == TransportScope::Remote,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_present() {
        let reg = DecoratorRegistry::with_builtins();
        for name in ["shell", "var", "env", "ssh", "docker", "retry", "timeout"] {
            assert!(reg.contains(name), "missing builtin '{}'", name);
        }
    }

    #[test]
    fn test_var_provider_reads_scope_map() {
        let reg = DecoratorRegistry::with_builtins();
        let mut vars = IndexMap::new();
        vars.insert("COUNT".to_string(), Value::Str("5".into()));
        let dec = reg.get("var").unwrap();
        let value = dec
            .resolve_value(&["COUNT".to_string()], &vars)
            .unwrap()
            .unwrap();
        assert_eq!(value, Value::Str("5".into()));
        let missing = dec.resolve_value(&["NOPE".to_string()], &vars).unwrap();
        assert!(matches!(missing, Err(PlanError::UnresolvedReference(n)) if n == "var.NOPE"));
    }

    #[test]
    fn test_env_provider_uses_snapshot_only() {
        let mut snapshot = IndexMap::new();
        snapshot.insert("HOME".to_string(), Value::Str("/home/ci".into()));
        let dec = EnvDecorator::new(snapshot);
        let value = dec
            .resolve_value(&["HOME".to_string()], &IndexMap::new())
            .unwrap()
            .unwrap();
        assert_eq!(value, Value::Str("/home/ci".into()));
        assert!(dec
            .resolve_value(&["PATH".to_string()], &IndexMap::new())
            .unwrap()
            .is_err());
    }

    #[test]
    fn test_session_boundaries() {
        let reg = DecoratorRegistry::with_builtins();
        let ssh = reg.get("ssh").unwrap().block_session().unwrap();
        assert!(ssh.is_boundary);
        assert_eq!(ssh.transport, TransportScope::Remote);
        let retry = reg.get("retry").unwrap().block_session().unwrap();
        assert!(!retry.is_boundary);
        assert!(reg.get("shell").unwrap().block_session().is_none());
    }
}
