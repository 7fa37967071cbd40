//! Parse Event Stream
//!
//! The input contract of the out-of-scope lexer/parser: an ordered event
//! stream plus a token array. Both are serde-deserialisable so a frontend
//! can hand the planner a plain JSON document.

use serde::{Deserialize, Serialize};

use crate::ir::value::Value;

/// A source token. Events reference tokens by index to attach spans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub text: String,
    #[serde(default)]
    pub file: String,
    pub start: usize,
    pub end: usize,
}

/// A named argument in a command event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedArg {
    pub name: String,
    pub value: ExprSpec,
}

/// Serialized expression description inside events. The builder converts
/// these into IR expressions, resolving token indices to spans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExprSpec {
    Literal {
        value: Value,
        #[serde(default)]
        token: Option<usize>,
    },
    Var {
        name: String,
        #[serde(default)]
        token: Option<usize>,
    },
    EnumMember {
        enum_name: String,
        member: String,
        #[serde(default)]
        token: Option<usize>,
    },
    Decorator {
        name: String,
        #[serde(default)]
        path: Vec<String>,
        #[serde(default)]
        args: Vec<ExprSpec>,
        #[serde(default)]
        token: Option<usize>,
    },
    Binary {
        op: String,
        left: Box<ExprSpec>,
        right: Box<ExprSpec>,
        #[serde(default)]
        token: Option<usize>,
    },
    Cast {
        target: String,
        #[serde(default)]
        optional: bool,
        inner: Box<ExprSpec>,
        #[serde(default)]
        token: Option<usize>,
    },
    Command {
        parts: Vec<ExprSpec>,
        #[serde(default)]
        token: Option<usize>,
    },
}

/// One parse event. The stream is ordered; nesting is expressed with
/// start/end pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParseEvent {
    FunctionStart {
        name: String,
    },
    FunctionEnd,
    VarDecl {
        name: String,
        value: ExprSpec,
    },
    /// A command statement. When `block` is true, the statements up to the
    /// matching `BlockEnd` form the command's nested block.
    Command {
        #[serde(default)]
        decorator: Option<String>,
        parts: Vec<ExprSpec>,
        #[serde(default)]
        args: Vec<NamedArg>,
        /// Trailing operator symbol: "", ";", "&&", "||", "|".
        #[serde(default)]
        operator: String,
        #[serde(default)]
        block: bool,
    },
    BlockEnd,
    IfStart {
        condition: ExprSpec,
    },
    ElseStart,
    IfEnd,
    ForStart {
        variable: String,
        collection: ExprSpec,
    },
    ForEnd,
    WhenStart {
        condition: ExprSpec,
    },
    /// Starts a when arm. `pattern: None` is the else arm.
    WhenArm {
        #[serde(default)]
        pattern: Option<ExprSpec>,
    },
    WhenEnd,
    TryStart,
    CatchStart,
    FinallyStart,
    TryEnd,
}

/// A complete planner input document: token array plus event stream.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EventStream {
    #[serde(default)]
    pub tokens: Vec<Token>,
    pub events: Vec<ParseEvent>,
}
