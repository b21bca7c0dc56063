//! Error types for codec operations.

use std::fmt;

use bitbuf::BitError;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while encoding or decoding a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Bit-level failure, including running out of input.
    Bit(BitError),

    /// A remote type name could not be resolved and its payload cannot be
    /// skipped (unknown simple type).
    UnknownType {
        /// The unresolved type name.
        name: String,
    },

    /// A remote class name could not be resolved where one is required.
    UnknownClass {
        /// The unresolved class name.
        name: String,
    },

    /// A value was written whose runtime type has no registered streamer.
    /// This is a programmer error; nothing is emitted.
    UnregisteredType {
        /// The name of the unregistered type or class.
        name: String,
    },

    /// A streamer was handed a value of the wrong runtime kind.
    WrongValueKind {
        /// The streamer that rejected the value.
        streamer: String,
        /// The kind of value it received.
        found: &'static str,
    },

    /// A negative or limit-exceeding length prefix was decoded.
    InvalidLength {
        /// The decoded length.
        length: i64,
    },

    /// A script value tag outside the closed 0-12 range was decoded.
    InvalidScriptTag {
        /// The decoded tag.
        tag: u8,
    },

    /// A type descriptor kind tag outside the known range was decoded.
    InvalidKindTag {
        /// The decoded tag.
        tag: i32,
    },

    /// A mapping-stream ID does not match the next expected assignment.
    InvalidId {
        /// The decoded ID.
        id: u32,
    },

    /// Nesting exceeded the configured recursion limit.
    DepthLimitExceeded {
        /// The configured limit.
        max_depth: usize,
    },
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bit(e) => write!(f, "bit-level error: {e}"),
            Self::UnknownType { name } => {
                write!(f, "unknown type name: {name}")
            }
            Self::UnknownClass { name } => {
                write!(f, "unknown class name: {name}")
            }
            Self::UnregisteredType { name } => {
                write!(f, "write of unregistered type: {name}")
            }
            Self::WrongValueKind { streamer, found } => {
                write!(f, "streamer {streamer} cannot encode a {found} value")
            }
            Self::InvalidLength { length } => {
                write!(f, "invalid length prefix: {length}")
            }
            Self::InvalidScriptTag { tag } => {
                write!(f, "script value tag {tag} outside 0-12")
            }
            Self::InvalidKindTag { tag } => {
                write!(f, "unknown type descriptor kind tag {tag}")
            }
            Self::InvalidId { id } => {
                write!(f, "mapping stream ID {id} does not match expected assignment")
            }
            Self::DepthLimitExceeded { max_depth } => {
                write!(f, "value nesting exceeded depth limit {max_depth}")
            }
        }
    }
}

impl std::error::Error for CodecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Bit(e) => Some(e),
            _ => None,
        }
    }
}

impl From<BitError> for CodecError {
    fn from(err: BitError) -> Self {
        Self::Bit(err)
    }
}
