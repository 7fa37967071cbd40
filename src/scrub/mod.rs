//! Streaming Scrubber
//!
//! A write-through filter that keeps plaintext secrets off observable
//! output streams: carry-buffered streaming substitution, nested buffering
//! frames, deterministic keyed placeholders, encoding-variant matching,
//! and process-level stdout/stderr lockdown.

pub mod lockdown;
pub mod placeholder;
pub mod provider;
pub mod scrubber;

use thiserror::Error;

pub use self::lockdown::{lockdown_streams, LockdownGuard};
pub use self::placeholder::PlaceholderGenerator;
pub use self::provider::{ReplacingProvider, SecretPattern, SecretProvider, VariantProvider};
pub use self::scrubber::StreamScrubber;

#[derive(Debug, Error)]
pub enum ScrubError {
    /// The secret provider rejected a chunk. Fail-closed: the offending
    /// bytes were never written and buffers were zeroised.
    #[error("secret provider rejected chunk: {0}")]
    Provider(String),
    #[error("end_frame called with no active frame")]
    NoActiveFrame,
    #[error("scrubber is closed")]
    Closed,
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
