use std::fmt;

use chumsky::span::SimpleSpan;
use thiserror::Error;

use crate::highlight::highlight_position;

/// Failure of a single parse.
///
/// I/O and syntax failures abort the parse immediately; schema failures are
/// accumulated so one invocation reports as many problems as possible.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    #[error(transparent)]
    Schema(#[from] SchemaErrors),
}

/// Malformed JSON.
///
/// `offset` is the zero-based byte offset of the first offending byte.
/// `position` is filled in by [`crate::parse_file`], which holds the source
/// bytes and can render the caret block; the displayed offset is one-based
/// to match the line/column convention.
#[derive(Debug)]
pub struct SyntaxError {
    pub message: String,
    pub offset: usize,
    pub position: Option<SyntaxPosition>,
}

#[derive(Debug, Clone)]
pub struct SyntaxPosition {
    pub line: usize,
    pub column: usize,
    pub highlight: String,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, offset: usize) -> Self {
        SyntaxError {
            message: message.into(),
            offset,
            position: None,
        }
    }

    /// Annotates the error with line, column, and a caret block computed
    /// from the source it occurred in.
    pub fn with_position_in(mut self, src: &[u8]) -> Self {
        let (line, column, highlight) = highlight_position(src, self.offset + 1);
        self.position = Some(SyntaxPosition {
            line,
            column,
            highlight,
        });
        self
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.position {
            Some(pos) => write!(
                f,
                "Error parsing JSON: {}\nAt line {}, column {} (offset {}):\n{}",
                self.message,
                pos.line,
                pos.column,
                self.offset + 1,
                pos.highlight
            ),
            None => write!(f, "Error parsing JSON: {}", self.message),
        }
    }
}

impl std::error::Error for SyntaxError {}

/// A single schema violation. The message carries the locus prefix
/// ("builder 2: ...") and is the stable, user-visible form; `span` and
/// `help` exist so callers can render richer diagnostics.
#[derive(Debug)]
pub struct SchemaError {
    pub message: String,
    /// Byte range in the root document; `None` when the offending node was
    /// synthesized or adopted from an included file.
    pub span: Option<SimpleSpan<usize>>,
    /// Remediation hint, e.g. a closest-match key suggestion.
    pub help: Option<String>,
}

/// Every schema violation found in one parse, in detection order.
#[derive(Debug, Default)]
pub struct SchemaErrors {
    pub errors: Vec<SchemaError>,
}

impl SchemaErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: impl Into<String>, span: Option<SimpleSpan<usize>>) {
        self.errors.push(SchemaError {
            message: message.into(),
            span,
            help: None,
        });
    }

    pub fn push_error(&mut self, error: SchemaError) {
        self.errors.push(error);
    }

    pub fn extend(&mut self, other: SchemaErrors) {
        self.errors.extend(other.errors);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// `Ok(value)` when nothing was accumulated.
    pub fn into_result<T>(self, value: T) -> Result<T, SchemaErrors> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for SchemaErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errors.len() == 1 {
            write!(f, "1 error occurred:")?;
        } else {
            write!(f, "{} errors occurred:", self.errors.len())?;
        }
        for error in &self.errors {
            write!(f, "\n  * {}", error.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for SchemaErrors {}
