//! Structured schema-parsing errors.
//!
//! Every failure in the loader, tree builder, and query compiler surfaces as
//! a [`ParseError`] holding one or more [`ErrorEntry`] records. Entries are
//! pure values; deciding whether and how to print them is the caller's job.

use std::fmt;

use thiserror::Error;

/// One `(file, line, column, message)` diagnostic record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEntry {
    /// Schema filename, empty when unknown.
    pub file: String,
    /// 1-based line number in the schema file, 0 when not tied to a line.
    pub line: usize,
    /// Schema column (header) name, empty when not tied to a column.
    pub column: String,
    pub message: String,
}

impl ErrorEntry {
    /// Entry tied to a cell or row of the schema file.
    pub fn at(
        file: impl Into<String>,
        line: usize,
        column: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            file: file.into(),
            line,
            column: column.into(),
            message: message.into(),
        }
    }

    /// Entry tied to a rule rather than a file location, as produced by the
    /// tree builder once line numbers are no longer known.
    pub fn at_rule(file: impl Into<String>, rule_id: u32, message: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line: 0,
            column: String::new(),
            message: format!("rule {}: {}", rule_id, message.into()),
        }
    }

    /// Entry with a bare message and no location.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            file: String::new(),
            line: 0,
            column: String::new(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.file.is_empty(), self.line) {
            (true, _) => write!(f, "{}", self.message),
            (false, 0) => write!(f, "{}: {}", self.file, self.message),
            (false, line) if self.column.is_empty() => {
                write!(f, "{}({}): {}", self.file, line, self.message)
            }
            (false, line) => {
                write!(f, "{}({},{}): {}", self.file, line, self.column, self.message)
            }
        }
    }
}

/// Aggregated schema-parsing failure.
///
/// The contract is all-or-nothing: a `ParseError` means no rule map, tree, or
/// query set was produced at all.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{}", render(.entries))]
pub struct ParseError {
    pub entries: Vec<ErrorEntry>,
}

impl ParseError {
    pub fn new(entries: Vec<ErrorEntry>) -> Self {
        debug_assert!(!entries.is_empty());
        Self { entries }
    }

    pub fn single(entry: ErrorEntry) -> Self {
        Self {
            entries: vec![entry],
        }
    }
}

impl From<ErrorEntry> for ParseError {
    fn from(entry: ErrorEntry) -> Self {
        Self::single(entry)
    }
}

fn render(entries: &[ErrorEntry]) -> String {
    let lines: Vec<String> = entries.iter().map(ToString::to_string).collect();
    lines.join("\n")
}

pub type Result<T> = std::result::Result<T, ParseError>;
