//! Placeholder Generator
//!
//! Deterministic per-run replacement tokens. A token is a keyed BLAKE2b
//! MAC of the secret, truncated and base64-url encoded, inside a fixed
//! frame, so its length never depends on the secret's length and tokens
//! cannot be correlated across runs with different keys.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use blake2::digest::consts::U32;
use blake2::digest::Mac;
use blake2::Blake2bMac;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroize;

type Blake2bMac256 = Blake2bMac<U32>;

const TOKEN_PREFIX: &str = "<REDACTED:";
const TOKEN_SUFFIX: &str = ">";
/// MAC bytes encoded into the token: 8 bytes -> 11 base64url chars.
const TOKEN_MAC_BYTES: usize = 8;

pub struct PlaceholderGenerator {
    key: [u8; 32],
}

impl Drop for PlaceholderGenerator {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl Default for PlaceholderGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaceholderGenerator {
    /// Generator with a fresh key from the OS CSPRNG.
    pub fn new() -> Self {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        Self { key }
    }

    /// Generator with an explicit 32-byte key.
    pub fn with_key(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// The constant token length this generator produces.
    pub fn token_len() -> usize {
        // 8 MAC bytes encode to ceil(8 * 4 / 3) = 11 chars unpadded.
        TOKEN_PREFIX.len() + 11 + TOKEN_SUFFIX.len()
    }

    pub fn generate(&self, secret: &[u8]) -> String {
        let mut mac = Blake2bMac256::new_from_slice(&self.key)
            .expect("32-byte key is always accepted");
        mac.update(secret);
        let tag = mac.finalize().into_bytes();
        format!(
            "{}{}{}",
            TOKEN_PREFIX,
            URL_SAFE_NO_PAD.encode(&tag[..TOKEN_MAC_BYTES]),
            TOKEN_SUFFIX
        )
    }

    /// Closure form for APIs that take a placeholder function.
    pub fn as_fn(self) -> impl Fn(&[u8]) -> Vec<u8> + Send {
        move |secret| self.generate(secret).into_bytes()
    }
}
