//! Secret Provider & Variant Expansion
//!
//! A secret provider substitutes every known pattern in a chunk with its
//! placeholder, longest pattern first, so `SECRET_EXTENDED` wins over
//! `SECRET`. The variant-aware provider additionally matches encoding
//! variants of each value: hex, base64, percent-encoding, and
//! separator-inserted spellings.

use std::collections::HashSet;

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine as _;

use crate::scrub::ScrubError;

/// One substitution rule: replace `value` with `placeholder`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretPattern {
    pub value: Vec<u8>,
    pub placeholder: Vec<u8>,
}

impl SecretPattern {
    pub fn new(value: impl Into<Vec<u8>>, placeholder: impl Into<Vec<u8>>) -> Self {
        Self { value: value.into(), placeholder: placeholder.into() }
    }
}

/// Dynamic pattern source; re-polled on `refresh`.
pub type PatternSource = Box<dyn Fn() -> Vec<SecretPattern> + Send>;

pub trait SecretProvider: Send {
    /// Substitute all known patterns in `input`.
    fn handle_chunk(&mut self, input: &[u8]) -> Result<Vec<u8>, ScrubError>;

    /// Length of the longest known pattern value; 0 when none. The
    /// scrubber sizes its carry window from this.
    fn max_secret_length(&self) -> usize;
}

// =============================================================================
// SUBSTITUTION
// =============================================================================

/// Drop empties, keep the first placeholder per value, sort longest first.
fn prepare(patterns: Vec<SecretPattern>) -> Vec<SecretPattern> {
    let mut seen: HashSet<Vec<u8>> = HashSet::new();
    let mut out: Vec<SecretPattern> = patterns
        .into_iter()
        .filter(|p| !p.value.is_empty())
        .filter(|p| seen.insert(p.value.clone()))
        .collect();
    out.sort_by(|a, b| b.value.len().cmp(&a.value.len()));
    out
}

/// Longest-first single-pass substitution.
fn substitute(patterns: &[SecretPattern], input: &[u8]) -> Vec<u8> {
    if patterns.is_empty() {
        return input.to_vec();
    }
    let mut out = Vec::with_capacity(input.len());
    let mut pos = 0;
    'scan: while pos < input.len() {
        for pattern in patterns {
            if input[pos..].starts_with(&pattern.value) {
                out.extend_from_slice(&pattern.placeholder);
                pos += pattern.value.len();
                continue 'scan;
            }
        }
        out.push(input[pos]);
        pos += 1;
    }
    out
}

// =============================================================================
// PROVIDERS
// =============================================================================

/// Substitutes exactly the patterns its source yields.
pub struct ReplacingProvider {
    source: PatternSource,
    patterns: Vec<SecretPattern>,
}

impl ReplacingProvider {
    pub fn new(source: PatternSource) -> Self {
        let patterns = prepare(source());
        Self { source, patterns }
    }

    pub fn from_patterns(patterns: Vec<SecretPattern>) -> Self {
        Self::new(Box::new(move || patterns.clone()))
    }

    /// Re-poll the source and rebuild the pattern table.
    pub fn refresh(&mut self) {
        self.patterns = prepare((self.source)());
    }
}

impl SecretProvider for ReplacingProvider {
    fn handle_chunk(&mut self, input: &[u8]) -> Result<Vec<u8>, ScrubError> {
        Ok(substitute(&self.patterns, input))
    }

    fn max_secret_length(&self) -> usize {
        self.patterns.first().map(|p| p.value.len()).unwrap_or(0)
    }
}

/// Substitutes the source patterns and their encoding variants. Variants
/// are expanded once per refresh, not per chunk.
pub struct VariantProvider {
    source: PatternSource,
    patterns: Vec<SecretPattern>,
}

impl VariantProvider {
    pub fn new(source: PatternSource) -> Self {
        let patterns = prepare(expand_all(source()));
        Self { source, patterns }
    }

    pub fn from_patterns(patterns: Vec<SecretPattern>) -> Self {
        Self::new(Box::new(move || patterns.clone()))
    }

    pub fn refresh(&mut self) {
        self.patterns = prepare(expand_all((self.source)()));
    }
}

impl SecretProvider for VariantProvider {
    fn handle_chunk(&mut self, input: &[u8]) -> Result<Vec<u8>, ScrubError> {
        Ok(substitute(&self.patterns, input))
    }

    fn max_secret_length(&self) -> usize {
        self.patterns.first().map(|p| p.value.len()).unwrap_or(0)
    }
}

// =============================================================================
// VARIANT EXPANSION
// =============================================================================

const SEPARATORS: [u8; 5] = [b'-', b'_', b':', b'.', b' '];

fn expand_all(patterns: Vec<SecretPattern>) -> Vec<SecretPattern> {
    let mut out = Vec::new();
    for pattern in patterns {
        if pattern.value.is_empty() {
            continue;
        }
        for variant in expand_variants(&pattern.value) {
            out.push(SecretPattern { value: variant, placeholder: pattern.placeholder.clone() });
        }
    }
    out
}

/// All recognised spellings of a secret value, the raw bytes first.
pub fn expand_variants(value: &[u8]) -> Vec<Vec<u8>> {
    let mut variants = Vec::new();
    let mut seen = HashSet::new();
    let mut push = |v: Vec<u8>| {
        if !v.is_empty() && seen.insert(v.clone()) {
            variants.push(v);
        }
    };

    push(value.to_vec());
    push(hex::encode(value).into_bytes());
    push(hex::encode_upper(value).into_bytes());
    push(STANDARD.encode(value).into_bytes());
    push(STANDARD_NO_PAD.encode(value).into_bytes());
    push(URL_SAFE_NO_PAD.encode(value).into_bytes());
    push(percent_encode(value, false));
    push(percent_encode(value, true));
    if value.len() >= 2 {
        for sep in SEPARATORS {
            push(join_with(value, sep));
        }
    }
    variants
}

fn percent_encode(value: &[u8], upper: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len());
    for &b in value {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~') {
            out.push(b);
        } else if upper {
            out.extend_from_slice(format!("%{:02X}", b).as_bytes());
        } else {
            out.extend_from_slice(format!("%{:02x}", b).as_bytes());
        }
    }
    out
}

fn join_with(value: &[u8], sep: u8) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len() * 2);
    for (i, &b) in value.iter().enumerate() {
        if i > 0 {
            out.push(sep);
        }
        out.push(b);
    }
    out
}
