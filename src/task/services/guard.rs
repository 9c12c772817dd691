//! Request authorization and template catalog checks.

use super::{OrchestrationError, OrchestrationResult};
use crate::task::domain::{Identity, TaskDomainError, TemplateKind};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fmt;

/// Template kinds offered when no catalog is configured.
pub const DEFAULT_TEMPLATES: &[&str] = &[
    "counter",
    "calculator",
    "todo-list",
    "markdown-viewer",
    "static-page",
];

/// Shared secret presented by callers.
///
/// The value never appears in `Debug` output or logs.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct SharedSecret(String);

impl SharedSecret {
    /// Wraps a secret value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns `true` when no usable secret was supplied.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    fn matches(&self, presented: &Self) -> bool {
        let expected = self.0.as_bytes();
        let actual = presented.0.as_bytes();
        // Fold over the longer input so timing does not reveal the prefix
        // length that matched.
        let length = expected.len().max(actual.len());
        let mut difference = u8::from(expected.len() != actual.len());
        for offset in 0..length {
            let left = expected.get(offset).copied().unwrap_or_default();
            let right = actual.get(offset).copied().unwrap_or_default();
            difference |= left ^ right;
        }
        difference == 0
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret([REDACTED])")
    }
}

/// Checks the shared secret presented with every request.
#[derive(Debug, Clone)]
pub struct AuthorizationGuard {
    secret: SharedSecret,
}

impl AuthorizationGuard {
    /// Creates a guard for the configured secret.
    #[must_use]
    pub const fn new(secret: SharedSecret) -> Self {
        Self { secret }
    }

    /// Verifies the presented secret.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrationError::Unauthorized`] on mismatch, including
    /// when no secret is configured.
    pub fn authorize(&self, presented: &SharedSecret) -> OrchestrationResult<()> {
        if self.secret.is_blank() || !self.secret.matches(presented) {
            return Err(OrchestrationError::Unauthorized);
        }
        Ok(())
    }
}

/// Parses an optional caller identity; blank input counts as absent.
///
/// # Errors
///
/// Returns [`TaskDomainError::InvalidIdentity`] for malformed addresses.
pub fn optional_identity(raw: Option<&str>) -> Result<Option<Identity>, TaskDomainError> {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .map(Identity::parse)
        .transpose()
}

/// Set of template kinds tasks may be created from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateCatalog {
    kinds: BTreeSet<TemplateKind>,
}

impl TemplateCatalog {
    /// Builds a catalog from template names.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidTemplate`] for a malformed name or an
    /// empty list.
    pub fn from_names<I, S>(names: I) -> Result<Self, TaskDomainError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let kinds = names
            .into_iter()
            .map(|name| TemplateKind::new(name.as_ref().trim()))
            .collect::<Result<BTreeSet<_>, _>>()?;
        if kinds.is_empty() {
            return Err(TaskDomainError::InvalidTemplate(String::new()));
        }
        Ok(Self { kinds })
    }

    /// Resolves a requested template against the catalog.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidTemplate`] when the kind is unknown.
    pub fn resolve(&self, raw: &str) -> Result<TemplateKind, TaskDomainError> {
        let kind = TemplateKind::new(raw.trim())?;
        if self.kinds.contains(&kind) {
            Ok(kind)
        } else {
            Err(TaskDomainError::InvalidTemplate(raw.to_owned()))
        }
    }

    /// Returns `true` when `kind` is offered.
    #[must_use]
    pub fn contains(&self, kind: &TemplateKind) -> bool {
        self.kinds.contains(kind)
    }

    /// Iterates the offered kinds in name order.
    pub fn kinds(&self) -> impl Iterator<Item = &TemplateKind> {
        self.kinds.iter()
    }
}

impl Default for TemplateCatalog {
    fn default() -> Self {
        Self {
            kinds: DEFAULT_TEMPLATES
                .iter()
                .filter_map(|name| TemplateKind::new(*name).ok())
                .collect(),
        }
    }
}
