//! Emitter (Pass 3)
//!
//! Walks the resolved IR and produces the plan tree. Adjacent command
//! statements joined by trailing operators collapse into a single step
//! whose node is built by splitting the chain lowest-precedence-first
//! (`;` then `||` then `&&` then `|`), at the rightmost occurrence, so the
//! tree is left-associative and pipe binds tightest.
//!
//! Every reference that interpolates to a display id is recorded as a
//! secret use, regardless of syntactic position; condition strings count.

use indexmap::IndexMap;

use crate::ir::types::*;
use crate::plan::types::{
    BinaryNode, CommandNode, ExecutionNode, LogicKind, LogicNode, SecretUse, Step, TryNode,
};
use crate::planner::errors::PlanError;
use crate::vault::Vault;

pub struct Emitter<'a> {
    vault: &'a Vault,
    next_step: u64,
    /// Current site path segments; starts at `root` (plus the target
    /// function name in command mode).
    site: Vec<String>,
    secret_uses: Vec<SecretUse>,
}

impl<'a> Emitter<'a> {
    pub fn new(vault: &'a Vault, target: &str) -> Self {
        let mut site = vec!["root".to_string()];
        if !target.is_empty() {
            site.push(target.to_string());
        }
        Self { vault, next_step: 0, site, secret_uses: Vec::new() }
    }

    pub fn into_secret_uses(self) -> Vec<SecretUse> {
        self.secret_uses
    }

    fn next_id(&mut self) -> u64 {
        self.next_step += 1;
        self.next_step
    }

    // =========================================================================
    // STATEMENT WALK
    // =========================================================================

    /// Emit a resolved statement list as plan steps.
    pub fn emit(&mut self, stmts: &[Statement]) -> Result<Vec<Step>, PlanError> {
        let mut steps = Vec::new();
        let mut chain: Vec<&CommandStatement> = Vec::new();
        for stmt in stmts {
            match stmt {
                Statement::Command(cmd) => {
                    chain.push(cmd);
                    if !cmd.operator.chains() {
                        steps.push(self.flush_chain(&chain)?);
                        chain.clear();
                    }
                }
                Statement::VarDecl(_) => {
                    // Declarations emit nothing, but they do break a chain.
                    if !chain.is_empty() {
                        steps.push(self.flush_chain(&chain)?);
                        chain.clear();
                    }
                }
                Statement::Blocker(blocker) => {
                    if !chain.is_empty() {
                        steps.push(self.flush_chain(&chain)?);
                        chain.clear();
                    }
                    self.emit_blocker(blocker, &mut steps)?;
                }
                Statement::Try(t) => {
                    if !chain.is_empty() {
                        steps.push(self.flush_chain(&chain)?);
                        chain.clear();
                    }
                    steps.push(self.emit_try(t)?);
                }
            }
        }
        if !chain.is_empty() {
            steps.push(self.flush_chain(&chain)?);
        }
        Ok(steps)
    }

    // =========================================================================
    // OPERATOR TREE
    // =========================================================================

    fn flush_chain(&mut self, chain: &[&CommandStatement]) -> Result<Step, PlanError> {
        let id = self.next_id();
        self.site.push(format!("step-{}", id));
        let result = self.split_chain(chain);
        self.site.pop();
        Ok(Step { id, node: result? })
    }

    /// Split a flat command chain into a tree, lowest precedence first,
    /// at the rightmost occurrence of each level.
    fn split_chain(&mut self, chain: &[&CommandStatement]) -> Result<ExecutionNode, PlanError> {
        if chain.len() == 1 {
            return self.command_node(chain[0]);
        }
        const LEVELS: [ChainOperator; 4] = [
            ChainOperator::Semi,
            ChainOperator::Or,
            ChainOperator::And,
            ChainOperator::Pipe,
        ];
        for level in LEVELS {
            // Joining operators live on every element but the last.
            let split_at = (0..chain.len() - 1).rev().find(|i| chain[*i].operator == level);
            if let Some(idx) = split_at {
                let left = self.split_chain(&chain[..=idx])?;
                let right = self.split_chain(&chain[idx + 1..])?;
                let pair = Box::new(BinaryNode { left, right });
                return Ok(match level {
                    ChainOperator::Semi => ExecutionNode::Sequence(pair),
                    ChainOperator::Or => ExecutionNode::Or(pair),
                    ChainOperator::And => ExecutionNode::And(pair),
                    ChainOperator::Pipe => ExecutionNode::Pipeline(pair),
                    ChainOperator::None => unreachable!("None never joins"),
                });
            }
        }
        // A multi-element chain always carries a joining operator.
        self.command_node(chain[0])
    }

    // =========================================================================
    // COMMAND RENDERING
    // =========================================================================

    fn command_node(&mut self, cmd: &CommandStatement) -> Result<ExecutionNode, PlanError> {
        // Fresh display-id map per command: reference name -> display id.
        let mut display_map = IndexMap::new();
        let mut command = String::new();
        for part in &cmd.command.parts {
            command.push_str(&self.render_interp(part, &mut display_map)?);
        }
        let mut args = cmd
            .args
            .iter()
            .map(|(key, expr)| Ok((key.clone(), self.render_interp(expr, &mut display_map)?)))
            .collect::<Result<Vec<_>, PlanError>>()?;
        args.sort_by(|a, b| a.0.cmp(&b.0));
        self.record_uses(display_map);
        let block = match &cmd.block {
            Some(stmts) => self.emit(stmts)?,
            None => Vec::new(),
        };
        Ok(ExecutionNode::Command(CommandNode {
            decorator: cmd.decorator.clone(),
            command,
            args,
            block,
        }))
    }

    /// Append one secret use per reference interpolated under the current
    /// site.
    fn record_uses(&mut self, display_map: IndexMap<String, String>) {
        for (name, display_id) in display_map {
            let site = format!("{}/params/{}", self.site.join("/"), name);
            let site_id = self.vault.derive_site_id(&site);
            self.secret_uses.push(SecretUse { display_id, site_id, site });
        }
    }

    fn interpolate(
        &self,
        name: &str,
        binding: Option<&ExprId>,
        display_map: &mut IndexMap<String, String>,
    ) -> Result<String, PlanError> {
        let display = binding.and_then(|id| self.vault.display_id(id));
        match display {
            Some(id) => {
                display_map.insert(name.to_string(), id.to_string());
                Ok(id.to_string())
            }
            // Renders as <unresolved:NAME>; mandatory references make that
            // fatal, and the resolver normally failed long before here.
            None => Err(PlanError::UnresolvedAtEmission(format!("<unresolved:{}>", name))),
        }
    }

    /// Interpolation rendering: literal fragments stay raw, references
    /// become display ids.
    fn render_interp(
        &self,
        expr: &Expression,
        display_map: &mut IndexMap<String, String>,
    ) -> Result<String, PlanError> {
        match expr {
            Expression::Literal(e) => Ok(e.value.to_string()),
            Expression::VarRef(e) => self.interpolate(&e.name, e.binding.as_ref(), display_map),
            Expression::EnumMemberRef(e) => {
                let name = format!("{}.{}", e.enum_name, e.member);
                self.interpolate(&name, e.binding.as_ref(), display_map)
            }
            Expression::DecoratorRef(e) => {
                self.interpolate(&e.key(), e.binding.as_ref(), display_map)
            }
            Expression::BinaryOp(_) | Expression::TypeCast(_) => {
                self.render_condition(expr, display_map)
            }
            Expression::Command(e) => {
                let mut out = String::new();
                for part in &e.parts {
                    out.push_str(&self.render_interp(part, display_map)?);
                }
                Ok(out)
            }
        }
    }

    /// Condition rendering: like interpolation, but string literals are
    /// quoted so `X == "5"` reads back unambiguously.
    fn render_condition(
        &self,
        expr: &Expression,
        display_map: &mut IndexMap<String, String>,
    ) -> Result<String, PlanError> {
        match expr {
            Expression::Literal(e) => Ok(e.value.to_json_compact()),
            Expression::BinaryOp(e) => {
                let left = self.render_condition(&e.left, display_map)?;
                let right = self.render_condition(&e.right, display_map)?;
                Ok(format!("{} {} {}", left, e.op, right))
            }
            Expression::TypeCast(e) => {
                let inner = self.render_condition(&e.inner, display_map)?;
                let optional = if e.optional { "?" } else { "" };
                Ok(format!("{} as {}{}", inner, e.target, optional))
            }
            other => self.render_interp(other, display_map),
        }
    }

    // =========================================================================
    // BLOCKERS
    // =========================================================================

    fn emit_blocker(
        &mut self,
        blocker: &BlockerStatement,
        steps: &mut Vec<Step>,
    ) -> Result<(), PlanError> {
        match &blocker.node {
            BlockerNode::If(node) => {
                let taken = node.taken.unwrap_or(false);
                let branch = if taken { &node.then_branch } else { &node.else_branch };
                if !taken && branch.is_empty() {
                    return Ok(());
                }
                let id = self.next_id();
                self.site.push(format!("step-{}", id));
                let result = self.emit_logic_body(node, taken, branch);
                self.site.pop();
                steps.push(Step { id, node: result? });
                Ok(())
            }
            BlockerNode::For(node) => {
                for (index, iteration) in node.iterations.iter().enumerate() {
                    let id = self.next_id();
                    self.site.push(format!("step-{}", id));
                    let result = self.emit_iteration(node, iteration, index + 1);
                    self.site.pop();
                    steps.push(Step { id, node: result? });
                }
                Ok(())
            }
            BlockerNode::When(node) => {
                let matched = node.matched_arm.unwrap_or(-1);
                if matched < 0 {
                    return Ok(());
                }
                let arm = &node.arms[matched as usize];
                let id = self.next_id();
                self.site.push(format!("step-{}", id));
                let result = self.emit_when_arm(node, arm);
                self.site.pop();
                steps.push(Step { id, node: result? });
                Ok(())
            }
        }
    }

    fn emit_logic_body(
        &mut self,
        node: &IfBlocker,
        taken: bool,
        branch: &[Statement],
    ) -> Result<ExecutionNode, PlanError> {
        let mut display_map = IndexMap::new();
        let condition = self.render_condition(&node.condition, &mut display_map)?;
        self.record_uses(display_map);
        let block = self.emit(branch)?;
        Ok(ExecutionNode::Logic(LogicNode {
            kind: LogicKind::If,
            condition,
            result: taken.to_string(),
            block,
        }))
    }

    fn emit_iteration(
        &mut self,
        node: &ForBlocker,
        iteration: &Iteration,
        number: usize,
    ) -> Result<ExecutionNode, PlanError> {
        let mut display_map = IndexMap::new();
        let collection = self.render_condition(&node.collection, &mut display_map)?;
        self.record_uses(display_map);
        let block = self.emit(&iteration.body)?;
        Ok(ExecutionNode::Logic(LogicNode {
            kind: LogicKind::For,
            condition: format!("{} in {}", node.variable, collection),
            result: format!("{} = {} (iteration {})", node.variable, iteration.value, number),
            block,
        }))
    }

    fn emit_when_arm(&mut self, node: &WhenBlocker, arm: &WhenArm) -> Result<ExecutionNode, PlanError> {
        let mut display_map = IndexMap::new();
        let condition = self.render_condition(&node.condition, &mut display_map)?;
        let pattern = match &arm.pattern {
            Some(p) => self.render_interp(p, &mut display_map)?,
            None => "else".to_string(),
        };
        self.record_uses(display_map);
        let block = self.emit(&arm.body)?;
        Ok(ExecutionNode::Logic(LogicNode {
            kind: LogicKind::When,
            condition,
            result: format!("matched: {}", pattern),
            block,
        }))
    }

    fn emit_try(&mut self, node: &TryStatement) -> Result<Step, PlanError> {
        let id = self.next_id();
        self.site.push(format!("step-{}", id));
        let result: Result<ExecutionNode, PlanError> = (|| {
            let try_steps = self.emit_branch("try", &node.try_body)?;
            let catch_steps = self.emit_branch("catch", &node.catch_body)?;
            let finally_steps = self.emit_branch("finally", &node.finally_body)?;
            Ok(ExecutionNode::Try(TryNode { try_steps, catch_steps, finally_steps }))
        })();
        self.site.pop();
        Ok(Step { id, node: result? })
    }

    fn emit_branch(&mut self, label: &str, stmts: &[Statement]) -> Result<Vec<Step>, PlanError> {
        self.site.push(label.to_string());
        let result = self.emit(stmts);
        self.site.pop();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::value::Value;
    use crate::planner::registry::DecoratorRegistry;
    use crate::planner::resolver::Resolver;
    use crate::scope::ScopeGraph;

    fn plan_stmts(mut stmts: Vec<Statement>) -> (Vec<Step>, Vec<SecretUse>, Vault) {
        let mut scopes = ScopeGraph::new("local");
        let mut vault = Vault::with_key([11u8; 32]);
        let registry = DecoratorRegistry::with_builtins();
        Resolver::new(&mut scopes, &mut vault, &registry)
            .resolve_statements(&mut stmts)
            .unwrap();
        let mut emitter = Emitter::new(&vault, "");
        let steps = emitter.emit(&stmts).unwrap();
        let uses = emitter.into_secret_uses();
        (steps, uses, vault)
    }

    fn echo(text: &str, op: ChainOperator) -> Statement {
        Ir::command(vec![Ir::literal(format!("echo \"{}\"", text))], op)
    }

    fn command_text(node: &ExecutionNode) -> &str {
        match node {
            ExecutionNode::Command(c) => &c.command,
            other => panic!("expected command, got {:?}", other),
        }
    }

    #[test]
    fn test_single_command_step() {
        let (steps, _, _) = plan_stmts(vec![echo("A", ChainOperator::None)]);
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].id, 1);
        assert_eq!(command_text(&steps[0].node), "echo \"A\"");
    }

    #[test]
    fn test_and_chain_groups_into_one_step() {
        let (steps, _, _) = plan_stmts(vec![
            echo("A", ChainOperator::And),
            echo("B", ChainOperator::None),
        ]);
        assert_eq!(steps.len(), 1);
        match &steps[0].node {
            ExecutionNode::And(pair) => {
                assert_eq!(command_text(&pair.left), "echo \"A\"");
                assert_eq!(command_text(&pair.right), "echo \"B\"");
            }
            other => panic!("expected And, got {:?}", other),
        }
    }

    #[test]
    fn test_precedence_or_over_and() {
        // echo "A" && echo "B" || echo "C"; then a fresh step echo "D".
        let (steps, _, _) = plan_stmts(vec![
            echo("A", ChainOperator::And),
            echo("B", ChainOperator::Or),
            echo("C", ChainOperator::None),
            echo("D", ChainOperator::None),
        ]);
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].id, 1);
        assert_eq!(steps[1].id, 2);
        match &steps[0].node {
            ExecutionNode::Or(pair) => {
                match &pair.left {
                    ExecutionNode::And(inner) => {
                        assert_eq!(command_text(&inner.left), "echo \"A\"");
                        assert_eq!(command_text(&inner.right), "echo \"B\"");
                    }
                    other => panic!("expected And on the left, got {:?}", other),
                }
                assert_eq!(command_text(&pair.right), "echo \"C\"");
            }
            other => panic!("expected Or, got {:?}", other),
        }
        assert_eq!(command_text(&steps[1].node), "echo \"D\"");
    }

    #[test]
    fn test_pipe_binds_tightest() {
        // a && b | c  =>  And(a, Pipeline(b, c))
        let (steps, _, _) = plan_stmts(vec![
            echo("a", ChainOperator::And),
            echo("b", ChainOperator::Pipe),
            echo("c", ChainOperator::None),
        ]);
        match &steps[0].node {
            ExecutionNode::And(pair) => match &pair.right {
                ExecutionNode::Pipeline(inner) => {
                    assert_eq!(command_text(&inner.left), "echo \"b\"");
                    assert_eq!(command_text(&inner.right), "echo \"c\"");
                }
                other => panic!("expected Pipeline, got {:?}", other),
            },
            other => panic!("expected And, got {:?}", other),
        }
    }

    #[test]
    fn test_semi_splits_lowest() {
        // a ; b && c  =>  Sequence(a, And(b, c))
        let (steps, _, _) = plan_stmts(vec![
            echo("a", ChainOperator::Semi),
            echo("b", ChainOperator::And),
            echo("c", ChainOperator::None),
        ]);
        assert_eq!(steps.len(), 1);
        match &steps[0].node {
            ExecutionNode::Sequence(pair) => {
                assert_eq!(command_text(&pair.left), "echo \"a\"");
                assert!(matches!(pair.right, ExecutionNode::And(_)));
            }
            other => panic!("expected Sequence, got {:?}", other),
        }
    }

    #[test]
    fn test_display_id_interpolation_and_secret_uses() {
        let (steps, uses, vault) = plan_stmts(vec![
            Ir::var_decl("COUNT", Ir::literal("5"), "e1"),
            Ir::command(
                vec![
                    Ir::literal("echo "),
                    Ir::decorator_ref("var", vec!["COUNT".to_string()]),
                ],
                ChainOperator::None,
            ),
        ]);
        assert_eq!(steps.len(), 1);
        let text = command_text(&steps[0].node);
        assert_eq!(uses.len(), 1);
        // The reference renders as exactly the display id, never the value.
        assert_eq!(text, format!("echo {}", uses[0].display_id));
        assert!(uses[0].display_id.starts_with("sv_"));
        assert_eq!(uses[0].site, "root/step-1/params/var.COUNT");
        assert_eq!(uses[0].site_id, vault.derive_site_id(&uses[0].site));
    }

    #[test]
    fn test_redeclaration_yields_distinct_uses() {
        let (steps, uses, _) = plan_stmts(vec![
            Ir::var_decl("COUNT", Ir::literal("5"), "e1"),
            Ir::command(
                vec![Ir::decorator_ref("var", vec!["COUNT".to_string()])],
                ChainOperator::None,
            ),
            Ir::var_decl("COUNT", Ir::literal("10"), "e2"),
            Ir::command(
                vec![Ir::decorator_ref("var", vec!["COUNT".to_string()])],
                ChainOperator::None,
            ),
        ]);
        assert_eq!(steps.len(), 2);
        assert_eq!(uses.len(), 2);
        assert_ne!(uses[0].display_id, uses[1].display_id);
        assert_ne!(uses[0].site_id, uses[1].site_id);
        // Each command renders as exactly its own display id.
        assert_eq!(command_text(&steps[0].node), uses[0].display_id);
        assert_eq!(command_text(&steps[1].node), uses[1].display_id);
    }

    #[test]
    fn test_args_sorted_by_key() {
        let (steps, _, _) = plan_stmts(vec![Statement::Command(CommandStatement {
            decorator: "shell".to_string(),
            command: Ir::command_expr(vec![Ir::literal("run")]),
            args: vec![
                ("timeout".to_string(), Ir::literal("30")),
                ("retries".to_string(), Ir::literal("3")),
            ],
            operator: ChainOperator::None,
            block: None,
        })]);
        match &steps[0].node {
            ExecutionNode::Command(c) => {
                let keys: Vec<&str> = c.args.iter().map(|(k, _)| k.as_str()).collect();
                assert_eq!(keys, vec!["retries", "timeout"]);
            }
            other => panic!("expected command, got {:?}", other),
        }
    }

    #[test]
    fn test_if_taken_emits_logic_node() {
        let (steps, _, _) = plan_stmts(vec![Statement::Blocker(BlockerStatement {
            depth: 0,
            node: BlockerNode::If(IfBlocker {
                condition: Ir::binary(BinaryOperator::Eq, Ir::literal("x"), Ir::literal("x")),
                then_branch: vec![echo("yes", ChainOperator::None)],
                else_branch: vec![],
                taken: None,
            }),
        })]);
        assert_eq!(steps.len(), 1);
        match &steps[0].node {
            ExecutionNode::Logic(l) => {
                assert_eq!(l.kind, LogicKind::If);
                assert_eq!(l.condition, "\"x\" == \"x\"");
                assert_eq!(l.result, "true");
                assert_eq!(l.block.len(), 1);
                assert_eq!(l.block[0].id, 2);
            }
            other => panic!("expected Logic, got {:?}", other),
        }
    }

    #[test]
    fn test_untaken_if_without_else_emits_nothing() {
        let (steps, _, _) = plan_stmts(vec![Statement::Blocker(BlockerStatement {
            depth: 0,
            node: BlockerNode::If(IfBlocker {
                condition: Ir::literal(""),
                then_branch: vec![echo("yes", ChainOperator::None)],
                else_branch: vec![],
                taken: None,
            }),
        })]);
        assert!(steps.is_empty());
    }

    #[test]
    fn test_untaken_if_with_else_emits_else_block() {
        let (steps, _, _) = plan_stmts(vec![Statement::Blocker(BlockerStatement {
            depth: 0,
            node: BlockerNode::If(IfBlocker {
                condition: Ir::literal(""),
                then_branch: vec![echo("yes", ChainOperator::None)],
                else_branch: vec![echo("no", ChainOperator::None)],
                taken: None,
            }),
        })]);
        assert_eq!(steps.len(), 1);
        match &steps[0].node {
            ExecutionNode::Logic(l) => {
                assert_eq!(l.result, "false");
                assert_eq!(command_text(&l.block[0].node), "echo \"no\"");
            }
            other => panic!("expected Logic, got {:?}", other),
        }
    }

    #[test]
    fn test_for_emits_one_node_per_iteration() {
        let items = Value::List(vec![Value::Str("us".into()), Value::Str("eu".into())]);
        let (steps, _, _) = plan_stmts(vec![Statement::Blocker(BlockerStatement {
            depth: 0,
            node: BlockerNode::For(ForBlocker {
                variable: "region".to_string(),
                collection: Ir::literal(items),
                body: vec![echo("ok", ChainOperator::None)],
                expr_id: ExprId("e1".into()),
                iterations: Vec::new(),
            }),
        })]);
        assert_eq!(steps.len(), 2);
        let results: Vec<&str> = steps
            .iter()
            .map(|s| match &s.node {
                ExecutionNode::Logic(l) => l.result.as_str(),
                other => panic!("expected Logic, got {:?}", other),
            })
            .collect();
        assert_eq!(results, vec!["region = us (iteration 1)", "region = eu (iteration 2)"]);
        match &steps[0].node {
            ExecutionNode::Logic(l) => {
                assert_eq!(l.kind, LogicKind::For);
                assert_eq!(l.condition, "region in [\"us\", \"eu\"]");
            }
            other => panic!("expected Logic, got {:?}", other),
        }
    }

    #[test]
    fn test_for_with_empty_collection_emits_nothing() {
        let (steps, _, _) = plan_stmts(vec![Statement::Blocker(BlockerStatement {
            depth: 0,
            node: BlockerNode::For(ForBlocker {
                variable: "x".to_string(),
                collection: Ir::literal(Value::List(vec![])),
                body: vec![echo("never", ChainOperator::None)],
                expr_id: ExprId("e1".into()),
                iterations: Vec::new(),
            }),
        })]);
        assert!(steps.is_empty());
    }

    #[test]
    fn test_when_emits_matched_arm_only() {
        let (steps, _, _) = plan_stmts(vec![
            Ir::var_decl("MODE", Ir::literal("prod"), "e1"),
            Statement::Blocker(BlockerStatement {
                depth: 0,
                node: BlockerNode::When(WhenBlocker {
                    condition: Ir::var_ref("MODE"),
                    arms: vec![
                        WhenArm {
                            pattern: Some(Ir::literal("dev")),
                            body: vec![echo("dev", ChainOperator::None)],
                        },
                        WhenArm {
                            pattern: Some(Ir::literal("prod")),
                            body: vec![echo("prod", ChainOperator::None)],
                        },
                    ],
                    matched_arm: None,
                }),
            }),
        ]);
        assert_eq!(steps.len(), 1);
        match &steps[0].node {
            ExecutionNode::Logic(l) => {
                assert_eq!(l.kind, LogicKind::When);
                assert_eq!(l.result, "matched: prod");
                assert_eq!(command_text(&l.block[0].node), "echo \"prod\"");
            }
            other => panic!("expected Logic, got {:?}", other),
        }
    }

    #[test]
    fn test_try_emits_three_branches() {
        let (steps, _, _) = plan_stmts(vec![Statement::Try(TryStatement {
            try_body: vec![echo("try", ChainOperator::None)],
            catch_body: vec![echo("catch", ChainOperator::None)],
            finally_body: vec![echo("finally", ChainOperator::None)],
        })]);
        assert_eq!(steps.len(), 1);
        match &steps[0].node {
            ExecutionNode::Try(t) => {
                assert_eq!(command_text(&t.try_steps[0].node), "echo \"try\"");
                assert_eq!(command_text(&t.catch_steps[0].node), "echo \"catch\"");
                assert_eq!(command_text(&t.finally_steps[0].node), "echo \"finally\"");
                // Nested ids continue the global sequence.
                assert_eq!(
                    (t.try_steps[0].id, t.catch_steps[0].id, t.finally_steps[0].id),
                    (2, 3, 4)
                );
            }
            other => panic!("expected Try, got {:?}", other),
        }
    }

    #[test]
    fn test_condition_references_become_secret_uses() {
        let (steps, uses, _) = plan_stmts(vec![
            Ir::var_decl("MODE", Ir::literal("prod"), "e1"),
            Statement::Blocker(BlockerStatement {
                depth: 0,
                node: BlockerNode::If(IfBlocker {
                    condition: Ir::binary(
                        BinaryOperator::Eq,
                        Ir::var_ref("MODE"),
                        Ir::literal("prod"),
                    ),
                    then_branch: vec![echo("yes", ChainOperator::None)],
                    else_branch: vec![],
                    taken: None,
                }),
            }),
        ]);
        assert_eq!(uses.len(), 1);
        assert_eq!(uses[0].site, "root/step-1/params/MODE");
        match &steps[0].node {
            ExecutionNode::Logic(l) => {
                // The reference renders as its display id; the author's own
                // literal stays as written.
                assert!(l.condition.starts_with("sv_"));
                assert!(l.condition.ends_with("== \"prod\""));
            }
            other => panic!("expected Logic, got {:?}", other),
        }
    }
}
