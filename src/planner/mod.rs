//! Planner
//!
//! Three-pass pipeline entry point. Pass 1 folds events into IR, Pass 2
//! resolves scopes and values into the vault, Pass 3 emits the plan tree.
//! A planning invocation is single-threaded and deterministic: identical
//! input against the same vault yields byte-identical plans.

pub mod emitter;
pub mod errors;
pub mod eval;
pub mod registry;
pub mod resolver;

use std::time::Instant;

use log::{debug, trace};

use crate::ir::builder;
use crate::ir::events::EventStream;
use crate::ir::types::{ExecutionGraph, Statement};
use crate::plan::types::{Plan, SecretUse, Step};
use crate::scope::ScopeGraph;
use crate::vault::Vault;
use self::emitter::Emitter;
use self::errors::{suggest, PlanError, UnknownTargetError};
use self::registry::DecoratorRegistry;
use self::resolver::Resolver;

/// Telemetry selection for a planning run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Telemetry {
    #[default]
    Off,
    Timing,
}

/// Debug output selection for a planning run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebugMode {
    #[default]
    Off,
    Paths,
}

/// Options for one planning invocation.
#[derive(Default)]
pub struct PlannerOptions {
    /// Target function name; empty selects script mode.
    pub target: String,
    pub telemetry: Telemetry,
    pub debug: DebugMode,
    /// Vault to plan against; a fresh one (fresh plan key) is constructed
    /// when absent.
    pub vault: Option<Vault>,
}

/// A successful planning run: the plan plus the vault that holds its
/// secrets, ready to feed the output scrubber.
#[derive(Debug)]
pub struct PlanResult {
    pub plan: Plan,
    pub vault: Vault,
}

pub struct Planner {
    registry: DecoratorRegistry,
}

impl Default for Planner {
    fn default() -> Self {
        Self::new(DecoratorRegistry::with_builtins())
    }
}

impl Planner {
    pub fn new(registry: DecoratorRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &DecoratorRegistry {
        &self.registry
    }

    /// Plan a parse-event stream.
    pub fn plan_events(
        &self,
        stream: &EventStream,
        options: PlannerOptions,
    ) -> Result<PlanResult, PlanError> {
        let started = Instant::now();
        let graph = builder::build(stream)?;
        if options.telemetry == Telemetry::Timing {
            debug!("build pass finished in {:?}", started.elapsed());
        }
        self.plan_graph(graph, options)
    }

    /// Plan an already-built execution graph.
    pub fn plan_graph(
        &self,
        graph: ExecutionGraph,
        options: PlannerOptions,
    ) -> Result<PlanResult, PlanError> {
        let mut vault = options.vault.unwrap_or_default();
        let mut scopes = ScopeGraph::new("local");
        let telemetry = options.telemetry;
        let target = options.target;

        let resolve_started = Instant::now();
        let resolved = self.resolve_target(graph, &target, &mut scopes, &mut vault)?;
        if telemetry == Telemetry::Timing {
            debug!("resolve pass finished in {:?}", resolve_started.elapsed());
        }

        let emit_started = Instant::now();
        let (steps, secret_uses) = emit_steps(&vault, &target, &resolved)?;
        if telemetry == Telemetry::Timing {
            debug!("emit pass finished in {:?}", emit_started.elapsed());
        }

        if options.debug == DebugMode::Paths {
            trace!("scope graph after resolution:\n{}", scopes.dump());
            for use_ in &secret_uses {
                trace!("secret use at {}", use_.site);
            }
        }

        let salt = vault.plan_salt();
        Ok(PlanResult {
            plan: Plan { target, steps, secret_uses, salt },
            vault,
        })
    }

    /// Resolve the statements the target selects and return them for
    /// emission: the whole script in script mode, the target function's
    /// body in command mode.
    fn resolve_target(
        &self,
        graph: ExecutionGraph,
        target: &str,
        scopes: &mut ScopeGraph,
        vault: &mut Vault,
    ) -> Result<Vec<Statement>, PlanError> {
        match graph {
            ExecutionGraph::Script(mut script) => {
                if !target.is_empty() {
                    return Err(PlanError::UnknownTarget(UnknownTargetError {
                        name: target.to_string(),
                        available: Vec::new(),
                        suggestion: None,
                    }));
                }
                Resolver::new(scopes, vault, &self.registry)
                    .resolve_statements(&mut script.statements)?;
                Ok(script.statements)
            }
            ExecutionGraph::Functions(mut graph) => {
                let available: Vec<String> = graph.functions.keys().cloned().collect();
                let Some(func) = graph.functions.get_mut(target) else {
                    let suggestion = suggest(target, &available);
                    return Err(PlanError::UnknownTarget(UnknownTargetError {
                        name: target.to_string(),
                        available,
                        suggestion,
                    }));
                };
                // The function sees exactly the prelude that lexically
                // precedes it; later declarations stay invisible.
                let visible = func.prelude_visible.min(graph.prelude.len());
                let mut resolver = Resolver::new(scopes, vault, &self.registry);
                resolver.resolve_statements(&mut graph.prelude[..visible])?;
                resolver.resolve_statements(&mut func.body)?;
                Ok(std::mem::take(&mut func.body))
            }
        }
    }
}

fn emit_steps(
    vault: &Vault,
    target: &str,
    stmts: &[Statement],
) -> Result<(Vec<Step>, Vec<SecretUse>), PlanError> {
    let mut emitter = Emitter::new(vault, target);
    let steps = emitter.emit(stmts)?;
    Ok((steps, emitter.into_secret_uses()))
}
