use std::io;

use bstr::BString;
use thiserror::Error;

use crate::schema::Kind;

/// An error raised while decoding, with the input offset it was detected at.
#[derive(Error, Debug)]
#[error("{kind} at byte {offset}")]
pub struct DecodeError {
    pub(crate) kind: ErrorKind,
    pub(crate) offset: usize,
}

impl DecodeError {
    pub(crate) fn new(kind: ErrorKind, offset: usize) -> Self {
        Self { kind, offset }
    }

    /// What went wrong.
    #[must_use]
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Absolute byte offset into the input at which decoding stopped.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Consumes the error, returning its kind.
    #[must_use]
    pub fn into_kind(self) -> ErrorKind {
        self.kind
    }
}

/// The shape of JSON value found where a destination slot expected another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Found {
    /// A string value.
    String,
    /// A number without fraction or exponent.
    Integer,
    /// A number with a fraction or exponent.
    Float,
    /// `true` or `false`.
    Boolean,
    /// `null`.
    Null,
    /// `{`.
    Object,
    /// `[`.
    Array,
}

impl core::fmt::Display for Found {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Found::String => "string",
            Found::Integer => "integer",
            Found::Float => "float",
            Found::Boolean => "boolean",
            Found::Null => "null",
            Found::Object => "object",
            Found::Array => "array",
        })
    }
}

#[derive(Debug, Error)]
/// Everything that can abort a decode call.
pub enum ErrorKind {
    /// A name in key position has no slot in the destination's field map.
    #[error("field does not exist: {0}")]
    UnknownField(BString),
    /// The document nests deeper than the destination stack allows.
    #[error("nesting depth exceeds the limit of {0}")]
    DepthExceeded(usize),
    /// The destination slot cannot hold this JSON shape at all.
    #[error("unsupported destination kind for field `{field}`: cannot hold {found}")]
    Unsupported {
        /// Wire name of the slot.
        field: &'static str,
        /// What the input contained.
        found: Found,
    },
    /// The destination slot holds a different scalar kind.
    #[error("type mismatch for field `{field}`: expected {expected}, found {found}")]
    Mismatch {
        /// Wire name of the slot.
        field: &'static str,
        /// Declared kind of the slot.
        expected: Kind,
        /// What the input contained.
        found: Found,
    },
    /// A number does not fit the integer type of its slot.
    #[error("number out of range for field `{0}`")]
    NumberOutOfRange(&'static str),
    /// A string token is not valid UTF-8 once decoded.
    #[error("invalid UTF-8 in string")]
    InvalidUtf8,
    /// A backslash is followed by a character that starts no escape.
    #[error("invalid escape character '{0}'")]
    InvalidEscape(char),
    /// A `\u` escape contains a non-hexadecimal digit.
    #[error("invalid unicode escape sequence at character: '{0}'")]
    InvalidUnicodeEscapeChar(char),
    /// A `\u` escape does not denote a Unicode scalar value.
    #[error("invalid unicode escape sequence \\u{0:X}")]
    InvalidUnicodeEscapeSequence(u32),
    /// A byte that starts no value appeared in value or key position.
    #[error("unexpected character '{0}'")]
    UnexpectedCharacter(char),
    /// The input ended before the top-level object was closed.
    #[error("unexpected end of input")]
    UnexpectedEndOfInput,
    /// Non-whitespace input followed the closed top-level object.
    #[error("trailing characters after the top-level object")]
    TrailingCharacters,
    /// A hand-written [`Record`](crate::Record) returned no view, or a view of
    /// another kind, for a field its schema declares.
    #[error("destination does not match its schema at field `{0}`")]
    InconsistentDestination(&'static str),
    /// The byte source failed.
    #[error("read failed: {0}")]
    Io(#[from] io::Error),
}
