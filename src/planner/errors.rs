//! Planner Errors
//!
//! Every planner error is fatal to the plan: no partial plan is ever
//! returned. Messages carry the offending name so script authors can find
//! the site without a debugger.

use std::fmt;

use thiserror::Error;

use crate::ir::builder::BuildError;
use crate::scope::ScopeError;

/// Command-mode target lookup failure, with a "did you mean" suggestion
/// within edit distance 2.
#[derive(Debug)]
pub struct UnknownTargetError {
    pub name: String,
    pub available: Vec<String>,
    pub suggestion: Option<String>,
}

impl fmt::Display for UnknownTargetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown target function '{}'", self.name)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, " (did you mean '{}'?)", suggestion)?;
        }
        if self.available.is_empty() {
            write!(f, "; available: none")
        } else {
            write!(f, "; available: {}", self.available.join(", "))
        }
    }
}

impl std::error::Error for UnknownTargetError {}

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("parse error: {0}")]
    Parse(#[from] BuildError),

    #[error("unresolved reference '{0}'")]
    UnresolvedReference(String),

    #[error("unresolved enum member '{enum_name}.{member}'")]
    UnresolvedEnumMember { enum_name: String, member: String },

    #[error(
        "variable '{name}' is not visible in session '{session}': it lives in parent \
         session '{parent_session}' across a transport boundary; pass it explicitly \
         by importing it into the session"
    )]
    TransportBoundary {
        name: String,
        session: String,
        parent_session: String,
    },

    #[error(transparent)]
    UnknownTarget(#[from] UnknownTargetError),

    #[error("cannot cast none to {0}")]
    CastNone(String),

    #[error("cannot cast {value_type} to {target}")]
    Cast { value_type: &'static str, target: String },

    #[error("unknown cast target type '{0}'")]
    UnknownCastTarget(String),

    #[error("ordering comparison requires integer operands, got {left} and {right}")]
    OrderingOperands { left: &'static str, right: &'static str },

    #[error("cannot iterate over {0}")]
    NotIterable(&'static str),

    #[error("decorator '@{0}' does not provide a value")]
    NotAValueProvider(String),

    #[error("unresolved reference '{0}' at emission")]
    UnresolvedAtEmission(String),

    #[error("scope error: {0}")]
    Scope(ScopeError),
}

impl From<ScopeError> for PlanError {
    fn from(e: ScopeError) -> Self {
        match e {
            ScopeError::Unresolved(name) => PlanError::UnresolvedReference(name),
            ScopeError::TransportBoundary { name, session, parent_session } => {
                PlanError::TransportBoundary { name, session, parent_session }
            }
            other => PlanError::Scope(other),
        }
    }
}

// =============================================================================
// DID-YOU-MEAN
// =============================================================================

/// Levenshtein edit distance, used for unknown-target suggestions.
fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Closest candidate within edit distance 2, ties broken by candidate
/// order.
pub fn suggest(name: &str, candidates: &[String]) -> Option<String> {
    candidates
        .iter()
        .map(|c| (edit_distance(name, c), c))
        .filter(|(d, _)| *d <= 2)
        .min_by_key(|(d, _)| *d)
        .map(|(_, c)| c.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_distance() {
        assert_eq!(edit_distance("deploy", "deploy"), 0);
        assert_eq!(edit_distance("deploy", "depoy"), 1);
        assert_eq!(edit_distance("deploy", "dploey"), 2);
        assert_eq!(edit_distance("", "abc"), 3);
    }

    #[test]
    fn test_suggest_within_distance_two() {
        let candidates = vec!["deploy".to_string(), "verify".to_string()];
        assert_eq!(suggest("depoy", &candidates), Some("deploy".to_string()));
        assert_eq!(suggest("verfy", &candidates), Some("verify".to_string()));
        assert_eq!(suggest("teardown", &candidates), None);
    }

    #[test]
    fn test_unknown_target_message() {
        let err = PlanError::from(UnknownTargetError {
            name: "depoy".to_string(),
            available: vec!["deploy".to_string(), "verify".to_string()],
            suggestion: Some("deploy".to_string()),
        });
        let msg = err.to_string();
        assert!(msg.contains("depoy"));
        assert!(msg.contains("did you mean 'deploy'?"));
        assert!(msg.contains("deploy, verify"));
    }

    #[test]
    fn test_unknown_target_without_suggestion() {
        let err = UnknownTargetError {
            name: "teardown".to_string(),
            available: Vec::new(),
            suggestion: None,
        };
        assert_eq!(
            err.to_string(),
            "unknown target function 'teardown'; available: none"
        );
    }

    #[test]
    fn test_scope_error_mapping() {
        let err: PlanError = ScopeError::Unresolved("X".to_string()).into();
        assert!(matches!(err, PlanError::UnresolvedReference(n) if n == "X"));
        let err: PlanError = ScopeError::TransportBoundary {
            name: "T".to_string(),
            session: "ssh-1".to_string(),
            parent_session: "local".to_string(),
        }
        .into();
        let msg = err.to_string();
        assert!(msg.contains("'T'"));
        assert!(msg.contains("ssh-1"));
        assert!(msg.contains("local"));
    }

    #[test]
    fn test_cast_none_message() {
        assert_eq!(
            PlanError::CastNone("Int".to_string()).to_string(),
            "cannot cast none to Int"
        );
    }
}
