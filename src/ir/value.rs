//! Scalar Value Model
//!
//! The value type the planner evaluates expressions over. Integers are
//! exact i64 everywhere; there is no float coercion anywhere in the
//! pipeline, so comparisons stay precise beyond 2^53.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A resolved scalar, list, or map value.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => {
                if a.len() != b.len() {
                    return false;
                }
                // Key order does not participate in equality.
                a.iter().all(|(k, v)| b.get(k) == Some(v))
            }
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Str(s) => write!(f, "{}", s),
            Value::List(_) | Value::Map(_) => write!(f, "{}", self.to_json_compact()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(m: IndexMap<String, Value>) -> Self {
        Value::Map(m)
    }
}

impl Value {
    /// Truthiness: null, false, zero, the empty string, and empty
    /// lists/maps are falsy; everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Str(s) => !s.is_empty(),
            Value::List(l) => !l.is_empty(),
            Value::Map(m) => !m.is_empty(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&Vec<Value>> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    fn format_json_string(s: &str) -> String {
        let mut result = String::from("\"");
        for ch in s.chars() {
            match ch {
                '"' => result.push_str("\\\""),
                '\\' => result.push_str("\\\\"),
                '\n' => result.push_str("\\n"),
                '\r' => result.push_str("\\r"),
                '\t' => result.push_str("\\t"),
                c if (c as u32) < 0x20 => {
                    result.push_str(&format!("\\u{:04x}", c as u32));
                }
                c => result.push(c),
            }
        }
        result.push('"');
        result
    }

    /// Compact JSON rendering, used for lists and maps inside rendered
    /// command strings and condition strings.
    pub fn to_json_compact(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => format!("{}", b),
            Value::Int(n) => format!("{}", n),
            Value::Str(s) => Self::format_json_string(s),
            Value::List(l) => {
                let items: Vec<String> = l.iter().map(|v| v.to_json_compact()).collect();
                format!("[{}]", items.join(", "))
            }
            Value::Map(m) => {
                let items: Vec<String> = m
                    .iter()
                    .map(|(k, v)| format!("{}: {}", Self::format_json_string(k), v.to_json_compact()))
                    .collect();
                format!("{{{}}}", items.join(", "))
            }
        }
    }

    /// Type-tagged canonical byte rendering. Distinct values always have
    /// distinct canonical bytes (`Str("5")` and `Int(5)` must not collide),
    /// so this is what the vault hashes for display-id derivation.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let tagged = match self {
            Value::Null => "n:".to_string(),
            Value::Bool(b) => format!("b:{}", b),
            Value::Int(n) => format!("i:{}", n),
            Value::Str(s) => format!("s:{}", s),
            Value::List(_) | Value::Map(_) => {
                format!("j:{}", self.to_json_compact())
            }
        };
        tagged.into_bytes()
    }

    /// The bytes of this value as they would appear on an output stream.
    /// This is what the scrubber is taught to recognise.
    pub fn rendered_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::Str(String::new()).is_truthy());
        assert!(!Value::List(vec![]).is_truthy());
        assert!(!Value::Map(IndexMap::new()).is_truthy());
        assert!(Value::Bool(true).is_truthy());
        assert!(Value::Int(-1).is_truthy());
        assert!(Value::Str("0".into()).is_truthy());
        assert!(Value::List(vec![Value::Null]).is_truthy());
    }

    #[test]
    fn test_integer_equality_is_exact() {
        // Distinguishable beyond 2^53: these differ by 1.
        let a = Value::Int(9_007_199_254_740_993);
        let b = Value::Int(9_007_199_254_740_992);
        assert_ne!(a, b);
        assert_eq!(a, Value::Int(9_007_199_254_740_993));
    }

    #[test]
    fn test_map_equality_ignores_key_order() {
        let mut m1 = IndexMap::new();
        m1.insert("a".to_string(), Value::Int(1));
        m1.insert("b".to_string(), Value::Int(2));
        let mut m2 = IndexMap::new();
        m2.insert("b".to_string(), Value::Int(2));
        m2.insert("a".to_string(), Value::Int(1));
        assert_eq!(Value::Map(m1), Value::Map(m2));
    }

    #[test]
    fn test_canonical_bytes_distinguish_types() {
        assert_ne!(
            Value::Str("5".into()).canonical_bytes(),
            Value::Int(5).canonical_bytes()
        );
        assert_ne!(Value::Null.canonical_bytes(), Value::Str(String::new()).canonical_bytes());
    }

    #[test]
    fn test_display_rendering() {
        assert_eq!(Value::Str("us".into()).to_string(), "us");
        assert_eq!(Value::Int(42).to_string(), "42");
        let list = Value::List(vec![Value::Str("us".into()), Value::Str("eu".into())]);
        assert_eq!(list.to_string(), r#"["us", "eu"]"#);
    }
}
