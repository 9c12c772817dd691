//! Identifier and validated scalar types for the task domain.

use super::TaskDomainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

const MAX_TASK_ID_LEN: usize = 96;
const MAX_TEMPLATE_LEN: usize = 48;
const MAX_NONCE_LEN: usize = 128;
const SUFFIX_LEN: usize = 8;

fn is_slug(value: &str) -> bool {
    !value.is_empty()
        && !value.starts_with('-')
        && !value.ends_with('-')
        && value
            .chars()
            .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-')
}

/// Human-readable task identifier: template slug plus a random suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskId(String);

impl TaskId {
    /// Generates a fresh identifier such as `counter-3f9a1c07`.
    #[must_use]
    pub fn generate(template: &TemplateKind) -> Self {
        let suffix: String = Uuid::new_v4()
            .simple()
            .to_string()
            .chars()
            .take(SUFFIX_LEN)
            .collect();
        Self(format!("{}-{suffix}", template.as_str()))
    }

    /// Parses an identifier received from a caller.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidTaskId`] when the value is not a
    /// lowercase slug of at most 96 characters.
    pub fn parse(value: impl Into<String>) -> Result<Self, TaskDomainError> {
        let raw = value.into();
        let normalized = raw.trim();
        if normalized.len() > MAX_TASK_ID_LEN || !is_slug(normalized) {
            return Err(TaskDomainError::InvalidTaskId(raw));
        }
        Ok(Self(normalized.to_owned()))
    }

    /// Returns the identifier as `str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TaskId {
    type Error = TaskDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<TaskId> for String {
    fn from(value: TaskId) -> Self {
        value.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One-based round number within a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct RoundNumber(u32);

impl RoundNumber {
    /// The build round.
    pub const FIRST: Self = Self(1);

    /// Creates a validated round number.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::ZeroRound`] for zero.
    pub const fn new(value: u32) -> Result<Self, TaskDomainError> {
        if value == 0 {
            return Err(TaskDomainError::ZeroRound(value));
        }
        Ok(Self(value))
    }

    /// Returns the underlying number.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Returns the following round number.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Returns `true` for round one.
    #[must_use]
    pub const fn is_first(self) -> bool {
        self.0 == 1
    }
}

impl TryFrom<u32> for RoundNumber {
    type Error = TaskDomainError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RoundNumber> for u32 {
    fn from(value: RoundNumber) -> Self {
        value.0
    }
}

impl fmt::Display for RoundNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Caller-supplied idempotency token scoped to one round of one task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Nonce(String);

impl Nonce {
    /// Creates a validated nonce.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidNonce`] when the value is blank,
    /// longer than 128 characters, or contains control characters.
    pub fn new(value: impl Into<String>) -> Result<Self, TaskDomainError> {
        let raw = value.into();
        let trimmed = raw.trim();
        if trimmed.is_empty()
            || trimmed.chars().count() > MAX_NONCE_LEN
            || trimmed.chars().any(char::is_control)
        {
            return Err(TaskDomainError::InvalidNonce(raw));
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Derives the implicit round-one nonce from the build fingerprint.
    #[must_use]
    pub fn implicit(fingerprint: &BriefFingerprint) -> Self {
        Self(format!("implicit:{}", fingerprint.short()))
    }

    /// Returns the nonce as `str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalized caller identity (an email address).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Parses and normalizes an email identity.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidIdentity`] unless the value has one
    /// `@`, a non-empty local part, and a dotted domain without whitespace.
    pub fn parse(value: impl Into<String>) -> Result<Self, TaskDomainError> {
        let raw = value.into();
        let normalized = raw.trim().to_ascii_lowercase();
        let mut parts = normalized.split('@');
        let local = parts.next().unwrap_or_default();
        let domain = parts.next().unwrap_or_default();
        let is_valid = !local.is_empty()
            && parts.next().is_none()
            && domain.contains('.')
            && !domain.starts_with('.')
            && !domain.ends_with('.')
            && !normalized.chars().any(char::is_whitespace);

        if !is_valid {
            return Err(TaskDomainError::InvalidIdentity(raw));
        }
        Ok(Self(normalized))
    }

    /// Returns the normalized identity.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of web artifact a task builds, e.g. `counter`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateKind(String);

impl TemplateKind {
    /// Creates a syntactically valid template kind.
    ///
    /// Catalog membership is checked by the registry, not here.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidTemplate`] when the value is not a
    /// lowercase slug of at most 48 characters.
    pub fn new(value: impl Into<String>) -> Result<Self, TaskDomainError> {
        let raw = value.into();
        let normalized = raw.trim().to_ascii_lowercase();
        if normalized.len() > MAX_TEMPLATE_LEN || !is_slug(&normalized) {
            return Err(TaskDomainError::InvalidTemplate(raw));
        }
        Ok(Self(normalized))
    }

    /// Returns the template kind as `str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hex-encoded SHA-256 over the inputs that identify a build request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BriefFingerprint(String);

impl BriefFingerprint {
    /// Fingerprints a round-one build request.
    #[must_use]
    pub fn of_build(owner: Option<&Identity>, template: &TemplateKind, brief: &str) -> Self {
        let owner = owner.map(Identity::as_str).unwrap_or_default();
        Self(super::digest::sha256_hex(&[owner, template.as_str(), brief.trim()]))
    }

    /// Returns the full hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the first 16 hex characters.
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..16).unwrap_or(&self.0)
    }
}

impl fmt::Display for BriefFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
