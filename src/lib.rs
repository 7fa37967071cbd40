//! safeplan - A secret-safe execution planner for shell orchestration
//!
//! This library compiles a small shell-orchestration language into a
//! deterministic, auditable execution plan in which every resolved value is
//! replaced by an opaque display identifier, and provides a streaming
//! scrubber that keeps plaintext secrets off observable output streams.

pub mod ir;
pub mod plan;
pub mod planner;
pub mod scope;
pub mod scrub;
pub mod vault;

pub use ir::builder::{BuildError, IrBuilder};
pub use ir::events::{ParseEvent, Token};
pub use ir::types::*;
pub use ir::value::Value;
pub use plan::types::{ExecutionNode, Plan, SecretUse, Step};
pub use planner::errors::PlanError;
pub use planner::registry::{DecoratorRegistry, Session, TransportScope};
pub use planner::{DebugMode, Planner, PlannerOptions, PlanResult, Telemetry};
pub use scrub::scrubber::StreamScrubber;
pub use scrub::ScrubError;
pub use vault::Vault;
