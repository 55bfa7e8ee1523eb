use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure reported by the messaging transport when editing a view or
/// answering an event.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("{code}: {description}")]
pub struct TransportError {
    pub code: i32,
    pub description: String,
}

impl TransportError {
    pub fn new(code: i32, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
        }
    }

    /// True when the description contains any of the tolerated fragments
    /// (case-insensitive).
    pub fn is_tolerated(&self, tolerated: &[String]) -> bool {
        let description = self.description.to_lowercase();
        tolerated
            .iter()
            .filter(|fragment| !fragment.is_empty())
            .any(|fragment| description.contains(&fragment.to_lowercase()))
    }
}
