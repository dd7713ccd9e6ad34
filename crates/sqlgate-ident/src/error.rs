//! Parse error types.

use thiserror::Error;

/// Errors produced while normalizing an identifier or parameter name.
///
/// Every variant that refers to a position carries the zero-based character
/// offset into the raw input, so callers can point at the exact spot that
/// failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The input was empty or contained only whitespace.
    #[error("identifier is empty or whitespace-only")]
    Empty,

    /// A `.` separator appeared as the first character.
    #[error("identifier starts with a '.' separator (offset {offset})")]
    LeadingSeparator {
        /// Character offset of the separator.
        offset: usize,
    },

    /// A `.` separator appeared as the last character.
    #[error("identifier ends with a '.' separator (offset {offset})")]
    TrailingSeparator {
        /// Character offset of the separator.
        offset: usize,
    },

    /// Two separators in a row produced an empty segment.
    #[error("empty identifier segment (offset {offset})")]
    EmptySegment {
        /// Character offset where the empty segment was detected.
        offset: usize,
    },

    /// A `[`, `]` or `"` appeared where it cannot open or close a run and
    /// was not escaped by doubling.
    #[error("unescaped '{ch}' inside identifier (offset {offset})")]
    StrayDelimiter {
        /// The offending character.
        ch: char,
        /// Character offset of the character.
        offset: usize,
    },

    /// A closing `]` or `"` did not match the delimiter that opened the run.
    #[error("unmatched closing '{ch}' (offset {offset})")]
    UnmatchedCloser {
        /// The offending character.
        ch: char,
        /// Character offset of the character.
        offset: usize,
    },

    /// An explicit `[` or `"` run was never closed before end of input.
    #[error("unterminated '{ch}' opened at offset {offset}")]
    Unterminated {
        /// The delimiter that opened the run.
        ch: char,
        /// Character offset where the run was opened.
        offset: usize,
    },

    /// A character followed a closed run without an intervening `.`.
    #[error("expected '.' separator after closing delimiter (offset {offset})")]
    ExpectedSeparator {
        /// Character offset of the unexpected character.
        offset: usize,
    },

    /// A parameter name contained a character that is not valid in one.
    #[error("invalid character '{ch}' in parameter name (offset {offset})")]
    InvalidParameterCharacter {
        /// The offending character.
        ch: char,
        /// Character offset of the character.
        offset: usize,
    },
}

impl ParseError {
    /// Character offset the error refers to, when it has one.
    #[must_use]
    pub fn offset(&self) -> Option<usize> {
        match self {
            Self::Empty => None,
            Self::LeadingSeparator { offset }
            | Self::TrailingSeparator { offset }
            | Self::EmptySegment { offset }
            | Self::StrayDelimiter { offset, .. }
            | Self::UnmatchedCloser { offset, .. }
            | Self::Unterminated { offset, .. }
            | Self::ExpectedSeparator { offset }
            | Self::InvalidParameterCharacter { offset, .. } => Some(*offset),
        }
    }
}
