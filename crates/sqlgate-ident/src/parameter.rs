//! SQL parameter-name normalization.

use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::ParseError;

/// A normalized SQL parameter name, always carrying a leading `@`.
///
/// `ParameterName::new("x")` and `ParameterName::new("@x")` produce the same
/// value. Equality and hashing are case-insensitive on the normalized form,
/// which is what keys the parameter set of a query builder.
#[derive(Debug, Clone)]
pub struct ParameterName {
    normalized: String,
    folded: String,
}

impl ParameterName {
    /// Parse and normalize a raw parameter name.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::Empty`] for empty or whitespace-only input
    /// (including a bare `@`), and
    /// [`ParseError::InvalidParameterCharacter`] for characters that are not
    /// valid in a parameter name (anything outside letters, digits, `_`,
    /// `$` and `#`).
    pub fn new(raw: &str) -> Result<Self, ParseError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ParseError::Empty);
        }

        let bare = trimmed.strip_prefix('@').unwrap_or(trimmed);
        if bare.is_empty() {
            return Err(ParseError::Empty);
        }

        for (i, ch) in bare.chars().enumerate() {
            if !(ch.is_alphanumeric() || matches!(ch, '_' | '$' | '#')) {
                // Offset is relative to the bare name, past any '@'.
                return Err(ParseError::InvalidParameterCharacter { ch, offset: i });
            }
        }

        let normalized = format!("@{bare}");
        let folded = normalized.to_lowercase();
        Ok(Self { normalized, folded })
    }

    /// The normalized `@`-prefixed form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.normalized
    }
}

impl fmt::Display for ParameterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.normalized)
    }
}

impl PartialEq for ParameterName {
    fn eq(&self, other: &Self) -> bool {
        self.folded == other.folded
    }
}

impl Eq for ParameterName {}

impl Hash for ParameterName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.folded.hash(state);
    }
}
