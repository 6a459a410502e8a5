//! Error types for VPACK operations.

use thiserror::Error;

/// Error type for VPACK operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// JSON input violated the grammar. Carries a message and the byte
    /// position the parser had reached.
    #[error("parse error: {0} (at byte {1})")]
    Parse(&'static str, usize),

    /// A string contained an invalid UTF-8 sequence.
    #[error("invalid UTF-8 sequence")]
    InvalidUtf8Sequence,

    /// An unescaped control character (< 0x20) appeared inside a string.
    #[error("unexpected control character in string")]
    UnexpectedControlCharacter,

    /// A numeric conversion would lose information.
    #[error("number out of range")]
    NumberOutOfRange,

    /// A typed accessor was called on a value of the wrong type.
    #[error("invalid value type: {0}")]
    InvalidValueType(&'static str),

    /// N-th element access beyond the container length.
    #[error("index {index} out of bounds (length={length})")]
    IndexOutOfBounds { index: usize, length: usize },

    /// The value has no JSON representation under the current options.
    #[error("value has no JSON equivalent")]
    NoJsonEquivalent,

    /// An integer-valued object key was read without a configured translator.
    #[error("need an attribute translator")]
    NeedAttributeTranslator,

    /// An object key was not a string (or a translated attribute id).
    #[error("object key must be a string")]
    BuilderKeyMustBeString,

    /// Duplicate object key detected while uniqueness checking is enabled.
    #[error("duplicate attribute name")]
    DuplicateAttributeName,

    /// A read would have crossed the end of the buffer.
    #[error("value data is truncated")]
    TruncatedValue,

    /// An internal invariant was violated.
    #[error("internal error: {0}")]
    Internal(&'static str),
}

/// Result type alias for VPACK operations.
pub type Result<T> = std::result::Result<T, Error>;
