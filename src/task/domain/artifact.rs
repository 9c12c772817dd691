//! Generated source bundles and publish receipts.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Files produced by the generation collaborator, keyed by relative path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceBundle {
    files: BTreeMap<String, String>,
}

impl SourceBundle {
    /// Creates an empty bundle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a file.
    #[must_use]
    pub fn with_file(mut self, path: impl Into<String>, contents: impl Into<String>) -> Self {
        self.files.insert(path.into(), contents.into());
        self
    }

    /// Returns a file's contents.
    #[must_use]
    pub fn file(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    /// Returns `true` when the bundle contains the path.
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    /// Iterates over `(path, contents)` pairs in path order.
    pub fn files(&self) -> impl Iterator<Item = (&str, &str)> {
        self.files
            .iter()
            .map(|(path, contents)| (path.as_str(), contents.as_str()))
    }

    /// Returns the number of files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns `true` when the bundle has no files.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Result of a successful publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishReceipt {
    /// Live artifact location.
    pub artifact_url: String,
    /// Provider revision (for example a commit SHA), when reported.
    pub revision: Option<String>,
}

impl PublishReceipt {
    /// Creates a receipt without a revision.
    #[must_use]
    pub fn new(artifact_url: impl Into<String>) -> Self {
        Self {
            artifact_url: artifact_url.into(),
            revision: None,
        }
    }

    /// Attaches a provider revision.
    #[must_use]
    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }
}
