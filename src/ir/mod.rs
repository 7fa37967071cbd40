//! Intermediate Representation
//!
//! The IR is the planner's view of a parsed orchestration script: a tree of
//! statements over a tagged expression tree, produced by folding the parse
//! event stream. Pass 2 (resolution) annotates it in place; Pass 3
//! (emission) walks it to produce the plan.

pub mod builder;
pub mod events;
pub mod types;
pub mod value;

pub use self::builder::IrBuilder;
pub use self::types::*;
pub use self::value::Value;
