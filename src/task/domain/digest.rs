//! Stable request digests used for idempotency checks.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Hashes the parts, each framed as `<byte length>:<bytes>` so no two part
/// lists share an encoding.
pub(crate) fn sha256_hex(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.len().to_string().as_bytes());
        hasher.update(b":");
        hasher.update(part.as_bytes());
    }
    hasher
        .finalize()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

/// Digest of a round request payload (brief and ordered checks).
///
/// Two requests carrying the same nonce must carry the same digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PayloadDigest(String);

impl PayloadDigest {
    /// Digests a brief and its acceptance checks.
    #[must_use]
    pub fn of(brief: &str, checks: &[String]) -> Self {
        let mut parts = Vec::with_capacity(checks.len() + 1);
        parts.push(brief.trim());
        parts.extend(checks.iter().map(String::as_str));
        Self(sha256_hex(&parts))
    }

    /// Returns the hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
