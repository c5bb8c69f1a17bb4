//! Protocol parsing error types
//!
//! Every decoder in this module reports failures through [`ParseError`],
//! which keeps the failure cause discriminable (syntax, size limit, type
//! mismatch) for callers that need to react differently to each.

use std::fmt;

/// Maximum length of the input snippet kept as error context
const MAX_CONTEXT_LEN: usize = 50;

/// Parse error with location and context
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    /// Kind of error that occurred
    pub kind: ParseErrorKind,
    /// Byte offset where the error occurred (0-indexed)
    pub column: Option<usize>,
    /// The problematic input snippet (truncated if too long)
    pub context: Option<String>,
}

impl ParseError {
    /// Create a new parse error
    pub fn new(kind: ParseErrorKind) -> Self {
        Self {
            kind,
            column: None,
            context: None,
        }
    }

    /// Add byte offset to error
    pub fn at_column(mut self, column: usize) -> Self {
        self.column = Some(column);
        self
    }

    /// Add context snippet to error
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        let ctx = context.into();
        self.context = if ctx.len() > MAX_CONTEXT_LEN {
            let mut end = MAX_CONTEXT_LEN - 3;
            while !ctx.is_char_boundary(end) {
                end -= 1;
            }
            Some(format!("{}...", &ctx[..end]))
        } else {
            Some(ctx)
        };
        self
    }

    /// Check if this is a syntax error (malformed frame or record)
    pub fn is_syntax_error(&self) -> bool {
        matches!(
            self.kind,
            ParseErrorKind::UnexpectedChar { .. }
                | ParseErrorKind::UnexpectedEof
                | ParseErrorKind::MissingTerminator
                | ParseErrorKind::InvalidNumber { .. }
                | ParseErrorKind::InvalidJson { .. }
                | ParseErrorKind::NotAnObject
                | ParseErrorKind::MissingField { .. }
                | ParseErrorKind::InvalidTimespec { .. }
                | ParseErrorKind::InvalidUtf8
        )
    }

    /// Check if the payload was rejected for exceeding the packet size
    pub fn is_size_limit(&self) -> bool {
        matches!(
            self.kind,
            ParseErrorKind::PayloadTooLarge { .. }
                | ParseErrorKind::NameTooLong { .. }
                | ParseErrorKind::TooManyRecords { .. }
        )
    }

    /// Check if the record disagreed with its context (name or metric type)
    pub fn is_type_mismatch(&self) -> bool {
        matches!(
            self.kind,
            ParseErrorKind::NameMismatch { .. } | ParseErrorKind::UnknownMetricType { .. }
        )
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;

        if let Some(col) = self.column {
            write!(f, " at column {}", col)?;
        }

        if let Some(ref ctx) = self.context {
            write!(f, " near '{}'", ctx)?;
        }

        Ok(())
    }
}

impl std::error::Error for ParseError {}

/// Kinds of parse errors that can occur
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Input is not valid UTF-8
    InvalidUtf8,

    /// Unexpected character encountered
    UnexpectedChar {
        /// The unexpected character
        char: char,
        /// What was expected
        expected: String,
    },

    /// Unexpected end of input
    UnexpectedEof,

    /// Command fields were consumed but `;` did not follow
    MissingTerminator,

    /// Numeric literal could not be decoded
    InvalidNumber {
        /// The offending literal
        literal: String,
    },

    /// Embedded JSON could not be decoded
    InvalidJson {
        /// Decoder message
        reason: String,
    },

    /// A JSON record was not an object
    NotAnObject,

    /// A required record field is absent
    MissingField {
        /// The field name
        field: String,
    },

    /// Payload exceeds the maximum packet size
    PayloadTooLarge {
        /// Serialized size in bytes
        size: usize,
        /// Configured maximum
        max: usize,
    },

    /// JSON array holds more records than allowed
    TooManyRecords {
        /// Records in the array
        count: usize,
        /// Maximum allowed records
        max: usize,
    },

    /// Event name exceeds the maximum name length
    NameTooLong {
        /// Name length in bytes
        len: usize,
        /// Maximum allowed length
        max: usize,
    },

    /// Record name differs from the name supplied by the caller
    NameMismatch {
        /// Name the caller expected
        expected: String,
        /// Name found in the record
        found: String,
    },

    /// Metric `type` tag is not one of the known variants
    UnknownMetricType {
        /// The tag that was found
        found: String,
    },

    /// Timespec field is malformed or out of range
    InvalidTimespec {
        /// Description of the offending field
        reason: String,
    },
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseErrorKind::InvalidUtf8 => write!(f, "Invalid UTF-8 encoding"),
            ParseErrorKind::UnexpectedChar { char, expected } => {
                write!(f, "Unexpected character '{}', expected {}", char, expected)
            },
            ParseErrorKind::UnexpectedEof => write!(f, "Unexpected end of input"),
            ParseErrorKind::MissingTerminator => write!(f, "';' was expected"),
            ParseErrorKind::InvalidNumber { literal } => {
                write!(f, "Invalid number literal '{}'", literal)
            },
            ParseErrorKind::InvalidJson { reason } => write!(f, "Invalid JSON: {}", reason),
            ParseErrorKind::NotAnObject => write!(f, "JSON record must be an object"),
            ParseErrorKind::MissingField { field } => {
                write!(f, "Missing required field '{}'", field)
            },
            ParseErrorKind::PayloadTooLarge { size, max } => {
                write!(f, "Payload of {} bytes is too big [maximum: {}]", size, max)
            },
            ParseErrorKind::TooManyRecords { count, max } => {
                write!(f, "Array of {} records exceeds maximum of {}", count, max)
            },
            ParseErrorKind::NameTooLong { len, max } => {
                write!(f, "Name of {} bytes exceeds maximum of {}", len, max)
            },
            ParseErrorKind::NameMismatch { expected, found } => {
                write!(f, "Different names given [{} /= {}]", found, expected)
            },
            ParseErrorKind::UnknownMetricType { found } => {
                write!(f, "Unknown metric type '{}'", found)
            },
            ParseErrorKind::InvalidTimespec { reason } => {
                write!(f, "Invalid timespec: {}", reason)
            },
        }
    }
}
