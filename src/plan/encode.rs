//! Plan Wire Format
//!
//! Deterministic binary encoding of a plan. Layout rules: all integers
//! little-endian, strings length-prefixed (u32) UTF-8, steps in id order,
//! args already sorted by key, secret uses in emission order. The SHA-256
//! digest of these bytes is the plan contract hash.
//!
//! Layout:
//!   magic "SPLN", version u8, salt [16]
//!   target: str
//!   steps:  u32 count, then each step
//!   uses:   u32 count, then (display_id, site_id, site) per use
//!
//! A step is `id u64` followed by a tagged node. Node tags: 1 Command,
//! 2 And, 3 Or, 4 Pipeline, 5 Sequence, 6 Logic, 7 Try.

use thiserror::Error;

use crate::plan::types::*;

const MAGIC: &[u8; 4] = b"SPLN";
const VERSION: u8 = 1;

const TAG_COMMAND: u8 = 1;
const TAG_AND: u8 = 2;
const TAG_OR: u8 = 3;
const TAG_PIPELINE: u8 = 4;
const TAG_SEQUENCE: u8 = 5;
const TAG_LOGIC: u8 = 6;
const TAG_TRY: u8 = 7;

// =============================================================================
// ENCODING
// =============================================================================

/// Encode a plan to its canonical bytes.
pub fn encode(plan: &Plan) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    out.push(VERSION);
    out.extend_from_slice(&plan.salt);
    write_str(&mut out, &plan.target);
    write_steps(&mut out, &plan.steps);
    write_u32(&mut out, plan.secret_uses.len() as u32);
    for use_ in &plan.secret_uses {
        write_str(&mut out, &use_.display_id);
        write_str(&mut out, &use_.site_id);
        write_str(&mut out, &use_.site);
    }
    out
}

fn write_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn write_u64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn write_str(out: &mut Vec<u8>, s: &str) {
    write_u32(out, s.len() as u32);
    out.extend_from_slice(s.as_bytes());
}

fn write_steps(out: &mut Vec<u8>, steps: &[Step]) {
    write_u32(out, steps.len() as u32);
    for step in steps {
        write_u64(out, step.id);
        write_node(out, &step.node);
    }
}

fn write_node(out: &mut Vec<u8>, node: &ExecutionNode) {
    match node {
        ExecutionNode::Command(cmd) => {
            out.push(TAG_COMMAND);
            write_str(out, &cmd.decorator);
            write_str(out, &cmd.command);
            write_u32(out, cmd.args.len() as u32);
            for (key, value) in &cmd.args {
                write_str(out, key);
                write_str(out, value);
            }
            write_steps(out, &cmd.block);
        }
        ExecutionNode::And(pair) => {
            out.push(TAG_AND);
            write_node(out, &pair.left);
            write_node(out, &pair.right);
        }
        ExecutionNode::Or(pair) => {
            out.push(TAG_OR);
            write_node(out, &pair.left);
            write_node(out, &pair.right);
        }
        ExecutionNode::Pipeline(pair) => {
            out.push(TAG_PIPELINE);
            write_node(out, &pair.left);
            write_node(out, &pair.right);
        }
        ExecutionNode::Sequence(pair) => {
            out.push(TAG_SEQUENCE);
            write_node(out, &pair.left);
            write_node(out, &pair.right);
        }
        ExecutionNode::Logic(logic) => {
            out.push(TAG_LOGIC);
            out.push(match logic.kind {
                LogicKind::If => 0,
                LogicKind::For => 1,
                LogicKind::When => 2,
            });
            write_str(out, &logic.condition);
            write_str(out, &logic.result);
            write_steps(out, &logic.block);
        }
        ExecutionNode::Try(t) => {
            out.push(TAG_TRY);
            write_steps(out, &t.try_steps);
            write_steps(out, &t.catch_steps);
            write_steps(out, &t.finally_steps);
        }
    }
}

// =============================================================================
// DECODING
// =============================================================================

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("truncated plan at byte {0}")]
    Truncated(usize),
    #[error("bad magic")]
    BadMagic,
    #[error("unsupported version {0}")]
    Version(u8),
    #[error("unknown node tag {0}")]
    UnknownTag(u8),
    #[error("invalid utf-8 in string field")]
    Utf8,
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.pos + n > self.bytes.len() {
            return Err(DecodeError::Truncated(self.pos));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64, DecodeError> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
    }

    fn str(&mut self) -> Result<String, DecodeError> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::Utf8)
    }
}

/// Decode a plan from its canonical bytes.
pub fn decode(bytes: &[u8]) -> Result<Plan, DecodeError> {
    let mut cur = Cursor { bytes, pos: 0 };
    if cur.take(4)? != MAGIC {
        return Err(DecodeError::BadMagic);
    }
    let version = cur.u8()?;
    if version != VERSION {
        return Err(DecodeError::Version(version));
    }
    let mut salt = [0u8; 16];
    salt.copy_from_slice(cur.take(16)?);
    let target = cur.str()?;
    let steps = read_steps(&mut cur)?;
    let use_count = cur.u32()?;
    let mut secret_uses = Vec::with_capacity(use_count as usize);
    for _ in 0..use_count {
        secret_uses.push(SecretUse {
            display_id: cur.str()?,
            site_id: cur.str()?,
            site: cur.str()?,
        });
    }
    Ok(Plan { target, steps, secret_uses, salt })
}

fn read_steps(cur: &mut Cursor<'_>) -> Result<Vec<Step>, DecodeError> {
    let count = cur.u32()?;
    let mut steps = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let id = cur.u64()?;
        let node = read_node(cur)?;
        steps.push(Step { id, node });
    }
    Ok(steps)
}

fn read_node(cur: &mut Cursor<'_>) -> Result<ExecutionNode, DecodeError> {
    let tag = cur.u8()?;
    Ok(match tag {
        TAG_COMMAND => {
            let decorator = cur.str()?;
            let command = cur.str()?;
            let argc = cur.u32()?;
            let mut args = Vec::with_capacity(argc as usize);
            for _ in 0..argc {
                let key = cur.str()?;
                let value = cur.str()?;
                args.push((key, value));
            }
            let block = read_steps(cur)?;
            ExecutionNode::Command(CommandNode { decorator, command, args, block })
        }
        TAG_AND | TAG_OR | TAG_PIPELINE | TAG_SEQUENCE => {
            let left = read_node(cur)?;
            let right = read_node(cur)?;
            let pair = Box::new(BinaryNode { left, right });
            match tag {
                TAG_AND => ExecutionNode::And(pair),
                TAG_OR => ExecutionNode::Or(pair),
                TAG_PIPELINE => ExecutionNode::Pipeline(pair),
                _ => ExecutionNode::Sequence(pair),
            }
        }
        TAG_LOGIC => {
            let kind = match cur.u8()? {
                0 => LogicKind::If,
                1 => LogicKind::For,
                2 => LogicKind::When,
                k => return Err(DecodeError::UnknownTag(k)),
            };
            ExecutionNode::Logic(LogicNode {
                kind,
                condition: cur.str()?,
                result: cur.str()?,
                block: read_steps(cur)?,
            })
        }
        TAG_TRY => ExecutionNode::Try(TryNode {
            try_steps: read_steps(cur)?,
            catch_steps: read_steps(cur)?,
            finally_steps: read_steps(cur)?,
        }),
        other => return Err(DecodeError::UnknownTag(other)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(cmd: &str) -> ExecutionNode {
        ExecutionNode::Command(CommandNode {
            decorator: "shell".to_string(),
            command: cmd.to_string(),
            args: vec![("retries".to_string(), "3".to_string())],
            block: Vec::new(),
        })
    }

    fn sample_plan() -> Plan {
        Plan {
            target: "deploy".to_string(),
            steps: vec![
                Step {
                    id: 1,
                    node: ExecutionNode::And(Box::new(BinaryNode {
                        left: command("echo \"A\""),
                        right: command("echo \"B\""),
                    })),
                },
                Step {
                    id: 2,
                    node: ExecutionNode::Logic(LogicNode {
                        kind: LogicKind::For,
                        condition: "region in [\"us\", \"eu\"]".to_string(),
                        result: "region = us (iteration 1)".to_string(),
                        block: vec![Step { id: 3, node: command("echo ok") }],
                    }),
                },
                Step {
                    id: 4,
                    node: ExecutionNode::Try(TryNode {
                        try_steps: vec![Step { id: 5, node: command("echo try") }],
                        catch_steps: vec![Step { id: 6, node: command("echo catch") }],
                        finally_steps: vec![Step { id: 7, node: command("echo finally") }],
                    }),
                },
            ],
            secret_uses: vec![SecretUse {
                display_id: "sv_abc".to_string(),
                site_id: "c2l0ZQ".to_string(),
                site: "root/deploy/step-1/params/X".to_string(),
            }],
            salt: [9u8; 16],
        }
    }

    #[test]
    fn test_round_trip() {
        let plan = sample_plan();
        let bytes = encode(&plan);
        let back = decode(&bytes).unwrap();
        assert_eq!(plan, back);
    }

    #[test]
    fn test_encoding_is_deterministic() {
        assert_eq!(encode(&sample_plan()), encode(&sample_plan()));
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut bytes = encode(&sample_plan());
        bytes[0] = b'X';
        assert!(matches!(decode(&bytes), Err(DecodeError::BadMagic)));
    }

    #[test]
    fn test_truncation_rejected() {
        let bytes = encode(&sample_plan());
        assert!(decode(&bytes[..bytes.len() - 3]).is_err());
    }
}
