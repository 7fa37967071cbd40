//! Execution Plan Model
//!
//! The planner's output: an ordered tree of steps whose rendered form
//! never contains secret material, plus the secret-use records binding
//! display ids to their emission sites.

pub mod encode;
pub mod types;

pub use self::encode::{decode, encode, DecodeError};
pub use self::types::{ExecutionNode, LogicKind, Plan, SecretUse, Step};
