//! Scope Graph
//!
//! Hierarchical, session-tagged scopes with transport-boundary sealing,
//! explicit imports, and taint tracking.

pub mod graph;

pub use self::graph::{Binding, Scope, ScopeError, ScopeGraph, Taint, ValueClass};
