//! Error classification shared by external collaborator ports.

use std::time::Duration;
use thiserror::Error;

/// Failure of a call to an external collaborator.
///
/// Dispatchers retry transient failures and surface the rest.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CollaboratorError {
    /// Connection-level failure.
    #[error("network error: {0}")]
    Network(String),

    /// The collaborator answered with an error status.
    #[error("upstream returned status {status}: {message}")]
    Upstream {
        /// Status code reported by the collaborator.
        status: u16,
        /// Body or reason text.
        message: String,
    },

    /// The collaborator asked the caller to slow down.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// A single attempt exceeded its deadline.
    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),

    /// The collaborator refused the request outright.
    #[error("rejected: {0}")]
    Rejected(String),

    /// The artifact was created but a follow-up step failed.
    #[error("artifact published at {artifact_url} but follow-up failed: {reason}")]
    PartialPublish {
        /// Location of the artifact that was created.
        artifact_url: String,
        /// Follow-up failure.
        reason: String,
    },
}

impl CollaboratorError {
    /// Returns `true` for network, 5xx, rate-limit and timeout failures.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::RateLimited(_) | Self::Timeout(_) => true,
            Self::Upstream { status, .. } => *status >= 500,
            Self::Rejected(_) | Self::PartialPublish { .. } => false,
        }
    }

    /// Returns the partially published artifact location, if any.
    #[must_use]
    pub fn partial_artifact_url(&self) -> Option<&str> {
        match self {
            Self::PartialPublish { artifact_url, .. } => Some(artifact_url),
            _ => None,
        }
    }
}
