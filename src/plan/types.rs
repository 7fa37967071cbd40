//! Plan Tree Types
//!
//! Steps carry execution nodes; operator compositions are binary trees
//! split lowest-precedence-first, so `a && b || c` arrives at the executor
//! as `Or(And(a, b), c)` with no precedence knowledge needed downstream.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A complete execution plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Target function name; empty in script mode.
    pub target: String,
    pub steps: Vec<Step>,
    /// Secret uses in emission order.
    pub secret_uses: Vec<SecretUse>,
    /// 128-bit plan salt; fixed per planning run.
    pub salt: [u8; 16],
}

impl Plan {
    /// SHA-256 digest of the canonical binary encoding: the plan contract
    /// hash.
    pub fn contract_hash(&self) -> [u8; 32] {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(crate::plan::encode::encode(self));
        hasher.finalize().into()
    }
}

/// One plan step. Ids are assigned in emission order starting at 1 and are
/// unique across the whole plan, nested blocks included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: u64,
    pub node: ExecutionNode,
}

/// Record binding a display id to the site that interpolated it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecretUse {
    pub display_id: String,
    /// base64-url (no padding) of the first 16 bytes of
    /// HMAC-SHA256(plan key, site).
    pub site_id: String,
    /// `root/<segment>/.../params/<parameter-name>`
    pub site: String,
}

/// The execution node of a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecutionNode {
    Command(CommandNode),
    And(Box<BinaryNode>),
    Or(Box<BinaryNode>),
    Pipeline(Box<BinaryNode>),
    Sequence(Box<BinaryNode>),
    Logic(LogicNode),
    Try(TryNode),
}

/// A single rendered command. Args are sorted by key at emission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandNode {
    pub decorator: String,
    pub command: String,
    pub args: Vec<(String, String)>,
    pub block: Vec<Step>,
}

/// Left/right composition for `&&`, `||`, `|`, and `;`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryNode {
    pub left: ExecutionNode,
    pub right: ExecutionNode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicKind {
    If,
    For,
    When,
}

impl fmt::Display for LogicKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::If => write!(f, "if"),
            Self::For => write!(f, "for"),
            Self::When => write!(f, "when"),
        }
    }
}

/// Resolved control flow: one node per taken branch or iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicNode {
    pub kind: LogicKind,
    pub condition: String,
    pub result: String,
    pub block: Vec<Step>,
}

/// try/catch/finally. All three branches are present in the plan; the
/// executor picks at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TryNode {
    pub try_steps: Vec<Step>,
    pub catch_steps: Vec<Step>,
    pub finally_steps: Vec<Step>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(cmd: &str) -> ExecutionNode {
        ExecutionNode::Command(CommandNode {
            decorator: "shell".to_string(),
            command: cmd.to_string(),
            args: Vec::new(),
            block: Vec::new(),
        })
    }

    #[test]
    fn test_contract_hash_is_stable() {
        let plan = Plan {
            target: "test".to_string(),
            steps: vec![Step { id: 1, node: command("echo hi") }],
            secret_uses: Vec::new(),
            salt: [0u8; 16],
        };
        assert_eq!(plan.contract_hash(), plan.clone().contract_hash());
        let mut other = plan.clone();
        other.steps[0].node = command("echo bye");
        assert_ne!(plan.contract_hash(), other.contract_hash());
    }

    #[test]
    fn test_json_rendering_round_trips() {
        let plan = Plan {
            target: String::new(),
            steps: vec![Step {
                id: 1,
                node: ExecutionNode::Or(Box::new(BinaryNode {
                    left: ExecutionNode::And(Box::new(BinaryNode {
                        left: command("echo \"A\""),
                        right: command("echo \"B\""),
                    })),
                    right: command("echo \"C\""),
                })),
            }],
            secret_uses: vec![SecretUse {
                display_id: "sv_abc".to_string(),
                site_id: "xyz".to_string(),
                site: "root/step-1/params/X".to_string(),
            }],
            salt: [7u8; 16],
        };
        let json = serde_json::to_string_pretty(&plan).unwrap();
        let back: Plan = serde_json::from_str(&json).unwrap();
        assert_eq!(plan, back);
    }
}
