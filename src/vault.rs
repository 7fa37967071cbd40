//! Vault
//!
//! Content-addressed secret store for one planning run. The vault owns the
//! 256-bit plan key; every identifier that leaves the planner (display ids,
//! site ids, the plan salt) is a one-way function of it. The raw key never
//! leaves this module.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use indexmap::IndexMap;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::ir::types::ExprId;
use crate::ir::value::Value;

type HmacSha256 = Hmac<Sha256>;

/// Number of MAC bytes a display id encodes.
const DISPLAY_ID_BYTES: usize = 12;
/// Number of MAC bytes a site id encodes.
const SITE_ID_BYTES: usize = 16;

pub struct Vault {
    plan_key: [u8; 32],
    /// Resolved value per owning expr id.
    values: IndexMap<ExprId, Value>,
    /// Display id per owning expr id.
    display_by_expr: IndexMap<ExprId, String>,
    /// Content-addressed cache: canonical value bytes hash -> display id.
    display_by_content: IndexMap<String, String>,
    /// Rendered secret bytes per display id, for the scrubber's pattern
    /// source. Insertion order, deduplicated by display id.
    secrets: IndexMap<String, Vec<u8>>,
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("plan_key", &"<redacted>")
            .field("display_by_expr", &self.display_by_expr)
            .field("display_by_content", &self.display_by_content)
            .field("secrets", &"<redacted>")
            .finish()
    }
}

impl Drop for Vault {
    fn drop(&mut self) {
        self.plan_key.zeroize();
    }
}

impl Default for Vault {
    fn default() -> Self {
        Self::new()
    }
}

impl Vault {
    /// Create a vault with a fresh plan key from the OS CSPRNG.
    pub fn new() -> Self {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        Self::with_key(key)
    }

    /// Create a vault with an explicit plan key (tests, reproducible runs).
    pub fn with_key(plan_key: [u8; 32]) -> Self {
        Self {
            plan_key,
            values: IndexMap::new(),
            display_by_expr: IndexMap::new(),
            display_by_content: IndexMap::new(),
            secrets: IndexMap::new(),
        }
    }

    fn mac(&self, label: &str, payload: &[u8]) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(&self.plan_key)
            .expect("hmac accepts any key length");
        mac.update(label.as_bytes());
        mac.update(&[0]);
        mac.update(payload);
        mac.finalize().into_bytes().to_vec()
    }

    /// Store a resolved value under its owning expr id and return the
    /// display id. Same (plan key, value) always yields the same display
    /// id, regardless of which expr id stores it.
    pub fn store(&mut self, expr_id: &ExprId, value: Value) -> String {
        let canonical = value.canonical_bytes();
        let content_key = hex::encode(self.mac("content", &canonical));
        let display = match self.display_by_content.get(&content_key) {
            Some(existing) => existing.clone(),
            None => {
                let tag = self.mac("display-id", &canonical);
                let display = format!("sv_{}", URL_SAFE_NO_PAD.encode(&tag[..DISPLAY_ID_BYTES]));
                self.display_by_content.insert(content_key, display.clone());
                display
            }
        };
        // Null and bool renderings are keywords, not secret material;
        // teaching them to the scrubber would redact every "true" in sight.
        if !matches!(value, Value::Null | Value::Bool(_)) {
            let rendered = value.rendered_bytes();
            if !rendered.is_empty() {
                self.secrets.entry(display.clone()).or_insert(rendered);
            }
        }
        self.values.insert(expr_id.clone(), value);
        self.display_by_expr.insert(expr_id.clone(), display.clone());
        display
    }

    /// The resolved value stored under an expr id.
    pub fn value(&self, expr_id: &ExprId) -> Option<&Value> {
        self.values.get(expr_id)
    }

    /// The display id assigned to an expr id's value.
    pub fn display_id(&self, expr_id: &ExprId) -> Option<&str> {
        self.display_by_expr.get(expr_id).map(String::as_str)
    }

    /// Site id for a site path: base64-url (no padding) of the first 16
    /// bytes of HMAC-SHA256(plan key, site path).
    pub fn derive_site_id(&self, site_path: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.plan_key)
            .expect("hmac accepts any key length");
        mac.update(site_path.as_bytes());
        let tag = mac.finalize().into_bytes();
        URL_SAFE_NO_PAD.encode(&tag[..SITE_ID_BYTES])
    }

    /// 128-bit plan salt, fixed per plan key. Derived rather than drawn so
    /// identical IR planned against the same vault stays byte-identical.
    pub fn plan_salt(&self) -> [u8; 16] {
        let tag = self.mac("plan-salt", b"");
        let mut salt = [0u8; 16];
        salt.copy_from_slice(&tag[..16]);
        salt
    }

    /// Pattern source for the scrubber: every stored secret's rendered
    /// bytes paired with its display id bytes.
    pub fn secret_patterns(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.secrets
            .iter()
            .map(|(display, rendered)| (rendered.clone(), display.clone().into_bytes()))
            .collect()
    }

    /// Rendered bytes of every stored secret value.
    pub fn secret_values(&self) -> Vec<Vec<u8>> {
        self.secrets.values().cloned().collect()
    }
}
