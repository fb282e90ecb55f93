//! Input type definitions
//!
//! An Input is one unit of user-provided content. Inputs are soft-deleted
//! only (the `removed` flag), so cascade logic can consult history.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Domain;

/// Type alias for Input ID (unique within a session)
pub type InputId = String;

/// Source kind of an input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputSource {
    /// Free-text from the user
    Text,
    /// Image-derived description
    Image,
    /// A URL the user pasted
    Url,
}

/// Input - one unit of user-provided content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Input {
    /// Unique identifier within the session
    pub id: InputId,
    /// Raw content as submitted
    pub content: String,
    /// Source kind
    pub source: InputSource,
    /// Domain tags (possibly empty until classified)
    #[serde(default)]
    pub domains: BTreeSet<Domain>,
    /// Who added this input
    pub added_by: String,
    /// When this input was added
    pub added_at: DateTime<Utc>,
    /// Soft-delete flag; inputs are never physically erased
    #[serde(default)]
    pub removed: bool,
}

impl Input {
    /// Create a new text input
    pub fn text(content: impl Into<String>, added_by: impl Into<String>) -> Self {
        Self::new(content, InputSource::Text, added_by)
    }

    /// Create a new input with an explicit source kind
    pub fn new(
        content: impl Into<String>,
        source: InputSource,
        added_by: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content: content.into(),
            source,
            domains: BTreeSet::new(),
            added_by: added_by.into(),
            added_at: Utc::now(),
            removed: false,
        }
    }

    /// Attach domain tags
    pub fn with_domains(mut self, domains: BTreeSet<Domain>) -> Self {
        self.domains = domains;
        self
    }

    /// Check whether this input currently tags the given domain
    pub fn tags(&self, domain: &str) -> bool {
        !self.removed && self.domains.contains(domain)
    }
}
