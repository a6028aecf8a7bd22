//! Request fingerprints
//!
//! A fingerprint identifies a unit of work: two requests with the same
//! fingerprint are guaranteed to produce the same result, so the cache can
//! share one computation between them.

use sha2::{Digest, Sha256};

/// Kind of work a fingerprint stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Ner,
    LegalRoles,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ner => "ner",
            Self::LegalRoles => "legal-roles",
        }
    }
}

/// SHA-256 digest of an operation, its input and the knobs that shape it
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint a request
    ///
    /// Trailing whitespace is not part of the input: it cannot change entity
    /// offsets. Every field is length-prefixed so adjacent fields never run
    /// together.
    pub fn compute(
        kind: OperationKind,
        text: &str,
        model_id: &str,
        rules_digest: &str,
        context_window: usize,
    ) -> Self {
        let mut hasher = Sha256::new();
        for field in [
            kind.as_str().as_bytes(),
            text.trim_end().as_bytes(),
            model_id.as_bytes(),
            rules_digest.as_bytes(),
        ] {
            hasher.update((field.len() as u64).to_le_bytes());
            hasher.update(field);
        }
        hasher.update((context_window as u64).to_le_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Leading hex digits, enough to tell requests apart in logs
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
