//! Intermediate Representation Types
//!
//! This module defines the planner's IR: a tagged expression tree and a
//! statement tree, folded out of the parse-event stream by the builder.
//! Pass 2 fills the resolution slots (`binding`, `taken`, `iterations`,
//! `matched_arm`) in place.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::ir::value::Value;

// =============================================================================
// BASE TYPES
// =============================================================================

/// Stable identifier of a value-producing site (one per var declaration or
/// loop-variable binding). Opaque and content-independent: downstream
/// components carry the id, never the value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExprId(pub String);

impl ExprId {
    /// Derive a deterministic child id, e.g. for per-iteration loop
    /// variable bindings (`e7.it2`).
    pub fn derived(&self, suffix: &str) -> ExprId {
        ExprId(format!("{}.{}", self.0, suffix))
    }
}

impl fmt::Display for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Byte range in a source file, for error reporting.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourceSpan {
    pub file: String,
    pub start: usize,
    pub end: usize,
}

// =============================================================================
// EXPRESSIONS
// =============================================================================

/// Union of all expression types.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(LiteralExpr),
    VarRef(VarRefExpr),
    EnumMemberRef(EnumMemberRefExpr),
    DecoratorRef(DecoratorRefExpr),
    BinaryOp(Box<BinaryOpExpr>),
    TypeCast(Box<TypeCastExpr>),
    Command(CommandExpr),
}

impl Expression {
    pub fn span(&self) -> Option<&SourceSpan> {
        match self {
            Expression::Literal(e) => e.span.as_ref(),
            Expression::VarRef(e) => e.span.as_ref(),
            Expression::EnumMemberRef(e) => e.span.as_ref(),
            Expression::DecoratorRef(e) => e.span.as_ref(),
            Expression::BinaryOp(e) => e.span.as_ref(),
            Expression::TypeCast(e) => e.span.as_ref(),
            Expression::Command(e) => e.span.as_ref(),
        }
    }
}

/// A scalar, list, or map constant.
#[derive(Debug, Clone, PartialEq)]
pub struct LiteralExpr {
    pub value: Value,
    pub span: Option<SourceSpan>,
}

/// Reference to a declared variable.
#[derive(Debug, Clone, PartialEq)]
pub struct VarRefExpr {
    pub name: String,
    pub span: Option<SourceSpan>,
    /// Expr id captured at the reference site during resolution. Later
    /// redeclarations of the name never rewrite this.
    pub binding: Option<ExprId>,
}

/// Reference to an enum member, e.g. `Region.East`.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumMemberRefExpr {
    pub enum_name: String,
    pub member: String,
    pub span: Option<SourceSpan>,
    pub binding: Option<ExprId>,
}

/// Reference to a decorator value, e.g. `@env.HOME` or `@var.COUNT`.
#[derive(Debug, Clone, PartialEq)]
pub struct DecoratorRefExpr {
    pub name: String,
    /// Selector path after the decorator name.
    pub path: Vec<String>,
    /// Optional positional argument expressions.
    pub args: Vec<Expression>,
    pub span: Option<SourceSpan>,
    pub binding: Option<ExprId>,
}

impl DecoratorRefExpr {
    /// The decorator key: `name.selector1.selector2...`
    pub fn key(&self) -> String {
        let mut key = self.name.clone();
        for seg in &self.path {
            key.push('.');
            key.push_str(seg);
        }
        key
    }
}

/// Binary operation over two sub-expressions.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryOpExpr {
    pub op: BinaryOperator,
    pub left: Expression,
    pub right: Expression,
    pub span: Option<SourceSpan>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Eq, // ==
    Ne, // !=
    Lt, // <
    Le, // <=
    Gt, // >
    Ge, // >=
    And, // &&
    Or,  // ||
}

impl BinaryOperator {
    pub fn from_symbol(sym: &str) -> Option<Self> {
        match sym {
            "==" => Some(Self::Eq),
            "!=" => Some(Self::Ne),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Le),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Ge),
            "&&" => Some(Self::And),
            "||" => Some(Self::Or),
            _ => None,
        }
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eq => write!(f, "=="),
            Self::Ne => write!(f, "!="),
            Self::Lt => write!(f, "<"),
            Self::Le => write!(f, "<="),
            Self::Gt => write!(f, ">"),
            Self::Ge => write!(f, ">="),
            Self::And => write!(f, "&&"),
            Self::Or => write!(f, "||"),
        }
    }
}

/// Type cast: `value as Int`, `value as String?`.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeCastExpr {
    pub target: String,
    /// Optional-flag: a `?` suffix admits null through the cast.
    pub optional: bool,
    pub inner: Expression,
    pub span: Option<SourceSpan>,
}

/// An interpolated command string: an ordered sequence of sub-expressions
/// (literal fragments and references).
#[derive(Debug, Clone, PartialEq)]
pub struct CommandExpr {
    pub parts: Vec<Expression>,
    pub span: Option<SourceSpan>,
}

// =============================================================================
// STATEMENTS
// =============================================================================

/// Trailing operator connecting a command statement to the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChainOperator {
    /// No operator: the chain ends here.
    #[default]
    None,
    Semi, // ;
    And,  // &&
    Or,   // ||
    Pipe, // |
}

impl ChainOperator {
    pub fn from_symbol(sym: &str) -> Option<Self> {
        match sym {
            "" => Some(Self::None),
            ";" => Some(Self::Semi),
            "&&" => Some(Self::And),
            "||" => Some(Self::Or),
            "|" => Some(Self::Pipe),
            _ => None,
        }
    }

    /// Does this operator continue the chain into the next statement?
    pub fn chains(&self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Display for ChainOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, ""),
            Self::Semi => write!(f, ";"),
            Self::And => write!(f, "&&"),
            Self::Or => write!(f, "||"),
            Self::Pipe => write!(f, "|"),
        }
    }
}

/// Union of all statement types.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Command(CommandStatement),
    VarDecl(VarDeclStatement),
    Blocker(BlockerStatement),
    Try(TryStatement),
}

/// A decorated command with an interpolated command expression, named
/// arguments, a trailing chain operator, and an optional nested block.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandStatement {
    /// Decorator name without the `@` sigil; defaults to `shell`.
    pub decorator: String,
    pub command: CommandExpr,
    pub args: Vec<(String, Expression)>,
    pub operator: ChainOperator,
    pub block: Option<Vec<Statement>>,
}

/// `var NAME = expr`
#[derive(Debug, Clone, PartialEq)]
pub struct VarDeclStatement {
    pub name: String,
    pub value: Expression,
    /// Assigned at build time, unique per declaration site.
    pub expr_id: ExprId,
}

/// A control-flow blocker: if, for, or when.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockerStatement {
    /// Nesting depth of this blocker (0 = top level).
    pub depth: usize,
    pub node: BlockerNode,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BlockerNode {
    If(IfBlocker),
    For(ForBlocker),
    When(WhenBlocker),
}

impl BlockerNode {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::If(_) => "if",
            Self::For(_) => "for",
            Self::When(_) => "when",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfBlocker {
    pub condition: Expression,
    pub then_branch: Vec<Statement>,
    pub else_branch: Vec<Statement>,
    /// Set during resolution: whether the condition evaluated truthy.
    pub taken: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForBlocker {
    pub variable: String,
    pub collection: Expression,
    /// Body template; cloned once per iteration during resolution.
    pub body: Vec<Statement>,
    /// Base id for per-iteration loop-variable bindings.
    pub expr_id: ExprId,
    /// Set during resolution: one entry per collection element.
    pub iterations: Vec<Iteration>,
}

/// One materialised loop iteration: the element value plus a resolved
/// clone of the body carrying iteration-specific reference captures.
#[derive(Debug, Clone, PartialEq)]
pub struct Iteration {
    pub value: Value,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhenBlocker {
    pub condition: Expression,
    pub arms: Vec<WhenArm>,
    /// Set during resolution: index of the matched arm, -1 if none.
    pub matched_arm: Option<i64>,
}

/// One arm of a when blocker. `pattern: None` is the `else` arm.
#[derive(Debug, Clone, PartialEq)]
pub struct WhenArm {
    pub pattern: Option<Expression>,
    pub body: Vec<Statement>,
}

/// `try { } catch { } finally { }`. Which branch executes is a runtime
/// decision, so all three are resolved and emitted.
#[derive(Debug, Clone, PartialEq)]
pub struct TryStatement {
    pub try_body: Vec<Statement>,
    pub catch_body: Vec<Statement>,
    pub finally_body: Vec<Statement>,
}

// =============================================================================
// EXECUTION GRAPH
// =============================================================================

/// A named function with its body. `prelude_visible` counts the top-level
/// prelude statements that lexically precede the definition; the function
/// scope sees exactly that prefix.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub body: Vec<Statement>,
    pub prelude_visible: usize,
}

/// Root of the IR: either a script (statement list) or a function table
/// with a shared prelude.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionGraph {
    Script(ScriptGraph),
    Functions(FunctionGraph),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptGraph {
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionGraph {
    /// Top-level non-function statements, in order.
    pub prelude: Vec<Statement>,
    pub functions: IndexMap<String, FunctionDef>,
}

// =============================================================================
// FACTORY FUNCTIONS (IR builders)
// =============================================================================

/// IR factory for building nodes, mainly used by tests and the builder.
pub struct Ir;

impl Ir {
    pub fn literal(value: impl Into<Value>) -> Expression {
        Expression::Literal(LiteralExpr { value: value.into(), span: None })
    }

    pub fn var_ref(name: impl Into<String>) -> Expression {
        Expression::VarRef(VarRefExpr {
            name: name.into(),
            span: None,
            binding: None,
        })
    }

    pub fn enum_member(enum_name: impl Into<String>, member: impl Into<String>) -> Expression {
        Expression::EnumMemberRef(EnumMemberRefExpr {
            enum_name: enum_name.into(),
            member: member.into(),
            span: None,
            binding: None,
        })
    }

    pub fn decorator_ref(name: impl Into<String>, path: Vec<String>) -> Expression {
        Expression::DecoratorRef(DecoratorRefExpr {
            name: name.into(),
            path,
            args: Vec::new(),
            span: None,
            binding: None,
        })
    }

    pub fn binary(op: BinaryOperator, left: Expression, right: Expression) -> Expression {
        Expression::BinaryOp(Box::new(BinaryOpExpr { op, left, right, span: None }))
    }

    pub fn cast(target: impl Into<String>, optional: bool, inner: Expression) -> Expression {
        Expression::TypeCast(Box::new(TypeCastExpr {
            target: target.into(),
            optional,
            inner,
            span: None,
        }))
    }

    pub fn command_expr(parts: Vec<Expression>) -> CommandExpr {
        CommandExpr { parts, span: None }
    }

    pub fn command(parts: Vec<Expression>, operator: ChainOperator) -> Statement {
        Statement::Command(CommandStatement {
            decorator: "shell".to_string(),
            command: Self::command_expr(parts),
            args: Vec::new(),
            operator,
            block: None,
        })
    }

    pub fn var_decl(name: impl Into<String>, value: Expression, expr_id: impl Into<String>) -> Statement {
        Statement::VarDecl(VarDeclStatement {
            name: name.into(),
            value,
            expr_id: ExprId(expr_id.into()),
        })
    }
}
