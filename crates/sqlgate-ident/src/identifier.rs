//! SQL identifier normalization.
//!
//! An [`Identifier`] is the canonical bracket-quoted form of a raw SQL
//! object name. Dotted paths are bracketed per segment, quote-delimited
//! segments are rewritten to bracket-delimited ones, and SQL-standard
//! doubling of `]`, `[` and `"` is preserved.

use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::ParseError;

/// A normalized, bracket-quoted SQL identifier.
///
/// Construction parses and canonicalizes the raw name; the stored form is
/// always safe to interpolate into command text. Equality and hashing are
/// case-insensitive on the normalized form, matching SQL Server's default
/// identifier comparison.
///
/// # Examples
///
/// ```rust
/// use sqlgate_ident::Identifier;
///
/// assert_eq!(Identifier::new("dbo.Orders")?.as_str(), "[dbo].[Orders]");
/// assert_eq!(Identifier::new("[dbo].[Orders]")?.as_str(), "[dbo].[Orders]");
/// assert_eq!(Identifier::new("dbo.orders")?, Identifier::new("DBO.ORDERS")?);
/// # Ok::<(), sqlgate_ident::ParseError>(())
/// ```
#[derive(Debug, Clone)]
pub struct Identifier {
    normalized: String,
    /// Lowercased normalized form; equality and hashing key.
    folded: String,
}

impl Identifier {
    /// Parse and normalize a raw SQL name.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] carrying the character offset for empty
    /// input, leading/trailing/doubled separators, stray or unmatched
    /// delimiters, and unterminated quoted or bracketed runs.
    pub fn new(raw: &str) -> Result<Self, ParseError> {
        let normalized = normalize(raw)?;
        let folded = normalized.to_lowercase();
        Ok(Self { normalized, folded })
    }

    /// The canonical bracket-quoted form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.normalized
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.normalized)
    }
}

impl PartialEq for Identifier {
    fn eq(&self, other: &Self) -> bool {
        self.folded == other.folded
    }
}

impl Eq for Identifier {}

impl Hash for Identifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.folded.hash(state);
    }
}

/// Rewrite a raw SQL name into canonical bracket-quoted form.
///
/// Single left-to-right scan with one character of lookahead. The scan
/// tracks which delimiter the *input* opened the current run with (to
/// detect mismatched closers) and whether an output bracket is currently
/// open for writing. `[`, `]` and `"` are escapable: a doubled occurrence
/// is a literal and is written twice; a single occurrence must open or
/// close a run.
fn normalize(raw: &str) -> Result<String, ParseError> {
    if raw.trim().is_empty() {
        return Err(ParseError::Empty);
    }

    let mut out = String::with_capacity(raw.len() + 4);
    let mut chars = raw.chars().enumerate().peekable();
    // Delimiter the input opened the current run with, and where.
    let mut input_delim: Option<(char, usize)> = None;
    // Output bracket currently open.
    let mut writing = false;
    // An explicit run just closed; only '.' or end of input may follow.
    let mut just_closed = false;

    while let Some((i, c)) = chars.next() {
        match c {
            '.' if input_delim.is_none() => {
                if i == 0 {
                    return Err(ParseError::LeadingSeparator { offset: i });
                }
                if chars.peek().is_none() {
                    return Err(ParseError::TrailingSeparator { offset: i });
                }
                if !writing && !just_closed {
                    return Err(ParseError::EmptySegment { offset: i });
                }
                if writing {
                    out.push(']');
                    writing = false;
                }
                just_closed = false;
                out.push('.');
            }
            '[' | ']' | '"' => {
                if matches!(chars.peek(), Some(&(_, next)) if next == c) {
                    // Doubled escapable character: a literal, written twice.
                    if just_closed {
                        return Err(ParseError::ExpectedSeparator { offset: i });
                    }
                    chars.next();
                    if !writing {
                        out.push('[');
                        writing = true;
                    }
                    out.push(c);
                    out.push(c);
                    continue;
                }
                match (c, input_delim) {
                    ('[', None) if !writing => {
                        if just_closed {
                            return Err(ParseError::ExpectedSeparator { offset: i });
                        }
                        input_delim = Some(('[', i));
                        out.push('[');
                        writing = true;
                    }
                    ('"', None) if !writing => {
                        if just_closed {
                            return Err(ParseError::ExpectedSeparator { offset: i });
                        }
                        input_delim = Some(('"', i));
                        out.push('[');
                        writing = true;
                    }
                    (']', Some(('[', _))) => {
                        out.push(']');
                        writing = false;
                        input_delim = None;
                        just_closed = true;
                    }
                    ('"', Some(('"', _))) => {
                        out.push(']');
                        writing = false;
                        input_delim = None;
                        just_closed = true;
                    }
                    // A quote inside a bracket-delimited run needs no escape.
                    ('"', Some(('[', _))) => out.push('"'),
                    (']', _) => return Err(ParseError::UnmatchedCloser { ch: ']', offset: i }),
                    (ch, _) => return Err(ParseError::StrayDelimiter { ch, offset: i }),
                }
            }
            _ => {
                if just_closed {
                    return Err(ParseError::ExpectedSeparator { offset: i });
                }
                if !writing {
                    out.push('[');
                    writing = true;
                }
                out.push(c);
            }
        }
    }

    if let Some((ch, offset)) = input_delim {
        return Err(ParseError::Unterminated { ch, offset });
    }
    // An implicit bracket opened by the scan itself is auto-closed.
    if writing {
        out.push(']');
    }

    Ok(out)
}
