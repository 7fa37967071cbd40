//! IR Builder
//!
//! Folds the ordered parse-event stream and token array into the execution
//! graph. The builder is deterministic: an identical event stream produces
//! identical IR, including expr-id assignment.

use indexmap::IndexMap;
use thiserror::Error;

use crate::ir::events::{EventStream, ExprSpec, NamedArg, ParseEvent, Token};
use crate::ir::types::*;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("unexpected event: {0}")]
    Unexpected(String),
    #[error("unterminated {0}")]
    Unterminated(&'static str),
    #[error("token index {0} out of range")]
    TokenIndex(usize),
    #[error("unknown operator '{0}'")]
    UnknownOperator(String),
    #[error("function definitions cannot nest")]
    NestedFunction,
    #[error("duplicate function '{0}'")]
    DuplicateFunction(String),
}

/// Build an execution graph from a parse-event stream.
pub fn build(stream: &EventStream) -> Result<ExecutionGraph, BuildError> {
    IrBuilder::new().build(stream)
}

// =============================================================================
// BUILDER
// =============================================================================

enum TryPhase {
    Try,
    Catch,
    Finally,
}

/// One open construct on the builder stack.
enum Frame {
    Function {
        name: String,
        prelude_visible: usize,
        stmts: Vec<Statement>,
    },
    CommandBlock {
        cmd: CommandStatement,
        stmts: Vec<Statement>,
    },
    IfThen {
        condition: Expression,
        stmts: Vec<Statement>,
    },
    IfElse {
        condition: Expression,
        then_branch: Vec<Statement>,
        stmts: Vec<Statement>,
    },
    For {
        variable: String,
        collection: Expression,
        expr_id: ExprId,
        stmts: Vec<Statement>,
    },
    When {
        condition: Expression,
        arms: Vec<WhenArm>,
        current_pattern: Option<Option<Expression>>,
        current_body: Vec<Statement>,
    },
    Try {
        phase: TryPhase,
        try_body: Vec<Statement>,
        catch_body: Vec<Statement>,
        stmts: Vec<Statement>,
    },
}

impl Frame {
    fn name(&self) -> &'static str {
        match self {
            Frame::Function { .. } => "function",
            Frame::CommandBlock { .. } => "command block",
            Frame::IfThen { .. } | Frame::IfElse { .. } => "if",
            Frame::For { .. } => "for",
            Frame::When { .. } => "when",
            Frame::Try { .. } => "try",
        }
    }
}

pub struct IrBuilder {
    next_expr: u64,
    root: Vec<Statement>,
    functions: IndexMap<String, FunctionDef>,
    stack: Vec<Frame>,
}

impl Default for IrBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl IrBuilder {
    pub fn new() -> Self {
        Self {
            next_expr: 0,
            root: Vec::new(),
            functions: IndexMap::new(),
            stack: Vec::new(),
        }
    }

    pub fn build(mut self, stream: &EventStream) -> Result<ExecutionGraph, BuildError> {
        for event in &stream.events {
            self.feed(event, &stream.tokens)?;
        }
        if let Some(frame) = self.stack.last() {
            return Err(BuildError::Unterminated(frame.name()));
        }
        if self.functions.is_empty() {
            Ok(ExecutionGraph::Script(ScriptGraph { statements: self.root }))
        } else {
            Ok(ExecutionGraph::Functions(FunctionGraph {
                prelude: self.root,
                functions: self.functions,
            }))
        }
    }

    fn fresh_id(&mut self) -> ExprId {
        self.next_expr += 1;
        ExprId(format!("e{}", self.next_expr))
    }

    /// Depth of the statement about to be pushed, counting enclosing
    /// blocker frames only.
    fn blocker_depth(&self) -> usize {
        self.stack
            .iter()
            .filter(|f| {
                matches!(
                    f,
                    Frame::IfThen { .. }
                        | Frame::IfElse { .. }
                        | Frame::For { .. }
                        | Frame::When { .. }
                )
            })
            .count()
    }

    fn push_statement(&mut self, stmt: Statement) -> Result<(), BuildError> {
        match self.stack.last_mut() {
            None => self.root.push(stmt),
            Some(Frame::Function { stmts, .. })
            | Some(Frame::CommandBlock { stmts, .. })
            | Some(Frame::IfThen { stmts, .. })
            | Some(Frame::IfElse { stmts, .. })
            | Some(Frame::For { stmts, .. })
            | Some(Frame::Try { stmts, .. }) => stmts.push(stmt),
            Some(Frame::When { current_pattern, current_body, .. }) => {
                if current_pattern.is_none() {
                    return Err(BuildError::Unexpected(
                        "statement inside when outside any arm".to_string(),
                    ));
                }
                current_body.push(stmt);
            }
        }
        Ok(())
    }

    fn feed(&mut self, event: &ParseEvent, tokens: &[Token]) -> Result<(), BuildError> {
        match event {
            ParseEvent::FunctionStart { name } => {
                if !self.stack.is_empty() {
                    return Err(BuildError::NestedFunction);
                }
                if self.functions.contains_key(name) {
                    return Err(BuildError::DuplicateFunction(name.clone()));
                }
                self.stack.push(Frame::Function {
                    name: name.clone(),
                    prelude_visible: self.root.len(),
                    stmts: Vec::new(),
                });
            }
            ParseEvent::FunctionEnd => match self.stack.pop() {
                Some(Frame::Function { name, prelude_visible, stmts }) => {
                    self.functions.insert(
                        name.clone(),
                        FunctionDef { name, body: stmts, prelude_visible },
                    );
                }
                other => return Err(self.mismatch("function_end", other)),
            },
            ParseEvent::VarDecl { name, value } => {
                let value = self.convert_expr(value, tokens)?;
                let expr_id = self.fresh_id();
                self.push_statement(Statement::VarDecl(VarDeclStatement {
                    name: name.clone(),
                    value,
                    expr_id,
                }))?;
            }
            ParseEvent::Command { decorator, parts, args, operator, block } => {
                let operator = ChainOperator::from_symbol(operator)
                    .ok_or_else(|| BuildError::UnknownOperator(operator.clone()))?;
                let parts = parts
                    .iter()
                    .map(|p| self.convert_expr(p, tokens))
                    .collect::<Result<Vec<_>, _>>()?;
                let args = args
                    .iter()
                    .map(|NamedArg { name, value }| {
                        Ok((name.clone(), self.convert_expr(value, tokens)?))
                    })
                    .collect::<Result<Vec<_>, BuildError>>()?;
                let cmd = CommandStatement {
                    decorator: decorator.clone().unwrap_or_else(|| "shell".to_string()),
                    command: CommandExpr { parts, span: None },
                    args,
                    operator,
                    block: None,
                };
                if *block {
                    self.stack.push(Frame::CommandBlock { cmd, stmts: Vec::new() });
                } else {
                    self.push_statement(Statement::Command(cmd))?;
                }
            }
            ParseEvent::BlockEnd => match self.stack.pop() {
                Some(Frame::CommandBlock { mut cmd, stmts }) => {
                    cmd.block = Some(stmts);
                    self.push_statement(Statement::Command(cmd))?;
                }
                other => return Err(self.mismatch("block_end", other)),
            },
            ParseEvent::IfStart { condition } => {
                let condition = self.convert_expr(condition, tokens)?;
                self.stack.push(Frame::IfThen { condition, stmts: Vec::new() });
            }
            ParseEvent::ElseStart => match self.stack.pop() {
                Some(Frame::IfThen { condition, stmts }) => {
                    self.stack.push(Frame::IfElse {
                        condition,
                        then_branch: stmts,
                        stmts: Vec::new(),
                    });
                }
                other => return Err(self.mismatch("else_start", other)),
            },
            ParseEvent::IfEnd => {
                let depth = self.blocker_depth().saturating_sub(1);
                match self.stack.pop() {
                    Some(Frame::IfThen { condition, stmts }) => {
                        self.push_statement(Statement::Blocker(BlockerStatement {
                            depth,
                            node: BlockerNode::If(IfBlocker {
                                condition,
                                then_branch: stmts,
                                else_branch: Vec::new(),
                                taken: None,
                            }),
                        }))?;
                    }
                    Some(Frame::IfElse { condition, then_branch, stmts }) => {
                        self.push_statement(Statement::Blocker(BlockerStatement {
                            depth,
                            node: BlockerNode::If(IfBlocker {
                                condition,
                                then_branch,
                                else_branch: stmts,
                                taken: None,
                            }),
                        }))?;
                    }
                    other => return Err(self.mismatch("if_end", other)),
                }
            }
            ParseEvent::ForStart { variable, collection } => {
                let collection = self.convert_expr(collection, tokens)?;
                let expr_id = self.fresh_id();
                self.stack.push(Frame::For {
                    variable: variable.clone(),
                    collection,
                    expr_id,
                    stmts: Vec::new(),
                });
            }
            ParseEvent::ForEnd => {
                let depth = self.blocker_depth().saturating_sub(1);
                match self.stack.pop() {
                    Some(Frame::For { variable, collection, expr_id, stmts }) => {
                        self.push_statement(Statement::Blocker(BlockerStatement {
                            depth,
                            node: BlockerNode::For(ForBlocker {
                                variable,
                                collection,
                                body: stmts,
                                expr_id,
                                iterations: Vec::new(),
                            }),
                        }))?;
                    }
                    other => return Err(self.mismatch("for_end", other)),
                }
            }
            ParseEvent::WhenStart { condition } => {
                let condition = self.convert_expr(condition, tokens)?;
                self.stack.push(Frame::When {
                    condition,
                    arms: Vec::new(),
                    current_pattern: None,
                    current_body: Vec::new(),
                });
            }
            ParseEvent::WhenArm { pattern } => {
                let pattern = match pattern {
                    Some(p) => Some(self.convert_expr(p, tokens)?),
                    None => None,
                };
                match self.stack.last_mut() {
                    Some(Frame::When { arms, current_pattern, current_body, .. }) => {
                        if let Some(prev) = current_pattern.take() {
                            arms.push(WhenArm {
                                pattern: prev,
                                body: std::mem::take(current_body),
                            });
                        }
                        *current_pattern = Some(pattern);
                    }
                    _ => {
                        return Err(BuildError::Unexpected(
                            "when_arm outside when".to_string(),
                        ))
                    }
                }
            }
            ParseEvent::WhenEnd => {
                let depth = self.blocker_depth().saturating_sub(1);
                match self.stack.pop() {
                    Some(Frame::When { condition, mut arms, current_pattern, current_body }) => {
                        if let Some(prev) = current_pattern {
                            arms.push(WhenArm { pattern: prev, body: current_body });
                        }
                        self.push_statement(Statement::Blocker(BlockerStatement {
                            depth,
                            node: BlockerNode::When(WhenBlocker {
                                condition,
                                arms,
                                matched_arm: None,
                            }),
                        }))?;
                    }
                    other => return Err(self.mismatch("when_end", other)),
                }
            }
            ParseEvent::TryStart => {
                self.stack.push(Frame::Try {
                    phase: TryPhase::Try,
                    try_body: Vec::new(),
                    catch_body: Vec::new(),
                    stmts: Vec::new(),
                });
            }
            ParseEvent::CatchStart => match self.stack.last_mut() {
                Some(Frame::Try { phase: phase @ TryPhase::Try, try_body, stmts, .. }) => {
                    *try_body = std::mem::take(stmts);
                    *phase = TryPhase::Catch;
                }
                _ => return Err(BuildError::Unexpected("catch_start outside try".to_string())),
            },
            ParseEvent::FinallyStart => match self.stack.last_mut() {
                Some(Frame::Try { phase, try_body, catch_body, stmts }) => {
                    match phase {
                        TryPhase::Try => *try_body = std::mem::take(stmts),
                        TryPhase::Catch => *catch_body = std::mem::take(stmts),
                        TryPhase::Finally => {
                            return Err(BuildError::Unexpected(
                                "finally_start after finally".to_string(),
                            ))
                        }
                    }
                    *phase = TryPhase::Finally;
                }
                _ => {
                    return Err(BuildError::Unexpected(
                        "finally_start outside try".to_string(),
                    ))
                }
            },
            ParseEvent::TryEnd => match self.stack.pop() {
                Some(Frame::Try { phase, mut try_body, mut catch_body, stmts }) => {
                    let mut finally_body = Vec::new();
                    match phase {
                        TryPhase::Try => try_body = stmts,
                        TryPhase::Catch => catch_body = stmts,
                        TryPhase::Finally => finally_body = stmts,
                    }
                    self.push_statement(Statement::Try(TryStatement {
                        try_body,
                        catch_body,
                        finally_body,
                    }))?;
                }
                other => return Err(self.mismatch("try_end", other)),
            },
        }
        Ok(())
    }

    fn mismatch(&mut self, event: &str, frame: Option<Frame>) -> BuildError {
        let found = frame.map(|f| f.name()).unwrap_or("top level");
        BuildError::Unexpected(format!("{} while inside {}", event, found))
    }

    fn span_for(&self, token: Option<usize>, tokens: &[Token]) -> Result<Option<SourceSpan>, BuildError> {
        match token {
            None => Ok(None),
            Some(i) => {
                let tok = tokens.get(i).ok_or(BuildError::TokenIndex(i))?;
                Ok(Some(SourceSpan {
                    file: tok.file.clone(),
                    start: tok.start,
                    end: tok.end,
                }))
            }
        }
    }

    fn convert_expr(&self, spec: &ExprSpec, tokens: &[Token]) -> Result<Expression, BuildError> {
        Ok(match spec {
            ExprSpec::Literal { value, token } => Expression::Literal(LiteralExpr {
                value: value.clone(),
                span: self.span_for(*token, tokens)?,
            }),
            ExprSpec::Var { name, token } => Expression::VarRef(VarRefExpr {
                name: name.clone(),
                span: self.span_for(*token, tokens)?,
                binding: None,
            }),
            ExprSpec::EnumMember { enum_name, member, token } => {
                Expression::EnumMemberRef(EnumMemberRefExpr {
                    enum_name: enum_name.clone(),
                    member: member.clone(),
                    span: self.span_for(*token, tokens)?,
                    binding: None,
                })
            }
            ExprSpec::Decorator { name, path, args, token } => {
                let args = args
                    .iter()
                    .map(|a| self.convert_expr(a, tokens))
                    .collect::<Result<Vec<_>, _>>()?;
                Expression::DecoratorRef(DecoratorRefExpr {
                    name: name.clone(),
                    path: path.clone(),
                    args,
                    span: self.span_for(*token, tokens)?,
                    binding: None,
                })
            }
            ExprSpec::Binary { op, left, right, token } => {
                let op = BinaryOperator::from_symbol(op)
                    .ok_or_else(|| BuildError::UnknownOperator(op.clone()))?;
                Expression::BinaryOp(Box::new(BinaryOpExpr {
                    op,
                    left: self.convert_expr(left, tokens)?,
                    right: self.convert_expr(right, tokens)?,
                    span: self.span_for(*token, tokens)?,
                }))
            }
            ExprSpec::Cast { target, optional, inner, token } => {
                Expression::TypeCast(Box::new(TypeCastExpr {
                    target: target.clone(),
                    optional: *optional,
                    inner: self.convert_expr(inner, tokens)?,
                    span: self.span_for(*token, tokens)?,
                }))
            }
            ExprSpec::Command { parts, token } => {
                let parts = parts
                    .iter()
                    .map(|p| self.convert_expr(p, tokens))
                    .collect::<Result<Vec<_>, _>>()?;
                Expression::Command(CommandExpr {
                    parts,
                    span: self.span_for(*token, tokens)?,
                })
            }
        })
    }
}
