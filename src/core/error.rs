// This module defines error types for dumpexpr using the thiserror crate for
// idiomatic Rust error handling. MinidumpError is the main error enum covering every
// structural check performed by the minidump reader: truncated input, bad signature
// or version, out-of-bounds locations, reserved or duplicate stream types, malformed
// strings, missing exception streams and missing required streams. Each variant
// carries the offsets, sizes or stream types needed to locate the damage in the file.
// ParseError reports failures of the textual expression parser with the byte
// position where parsing stopped. The expression evaluator itself has no error type:
// unresolved values are carried as Option::None through the whole evaluation.

//! Error types for dumpexpr.
//!
//! Using thiserror for more idiomatic error handling.

use thiserror::Error;

use crate::minidump::StreamType;

/// Structural failures reported by the minidump reader.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MinidumpError {
    #[error("Truncated input: need {needed} bytes at offset {offset}, buffer has {available}")]
    TruncatedInput {
        offset: u64,
        needed: u64,
        available: u64,
    },

    #[error("Invalid signature {found:#010x}, expected {expected:#010x}")]
    InvalidSignature { found: u32, expected: u32 },

    #[error("Unsupported version {found:#06x}, expected {expected:#06x}")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("Location out of bounds: offset {offset} + size {size} exceeds buffer of {available} bytes")]
    OutOfBounds {
        offset: u64,
        size: u64,
        available: u64,
    },

    #[error("Cannot handle stream type {stream_type} (directory entry {index})")]
    UnsupportedStreamType {
        stream_type: StreamType,
        index: usize,
    },

    #[error("Duplicate stream type {stream_type} (directory entries {first} and {second})")]
    DuplicateStreamType {
        stream_type: StreamType,
        first: usize,
        second: usize,
    },

    #[error("String size not even: {length} bytes at offset {offset}")]
    InvalidStringLength { offset: u64, length: u32 },

    #[error("String decoding failed at offset {offset}")]
    StringDecodingFailed { offset: u64 },

    #[error("No exception streams found")]
    NoExceptionStreams,

    #[error("No such stream: {stream_type}")]
    NoSuchStream { stream_type: StreamType },
}

impl MinidumpError {
    /// Offset into the buffer the failed check was looking at, if any.
    pub fn offset(&self) -> Option<u64> {
        match self {
            MinidumpError::TruncatedInput { offset, .. }
            | MinidumpError::OutOfBounds { offset, .. }
            | MinidumpError::InvalidStringLength { offset, .. }
            | MinidumpError::StringDecodingFailed { offset } => Some(*offset),
            _ => None,
        }
    }
}

/// Result type alias for minidump operations.
pub type MinidumpResult<T> = Result<T, MinidumpError>;

/// Failure of the textual expression parser.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Parse error at position {pos}: {message}")]
pub struct ParseError {
    pub pos: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(pos: usize, message: impl Into<String>) -> Self {
        Self {
            pos,
            message: message.into(),
        }
    }
}

/// Result type alias for expression parsing.
pub type ParseResult<T> = Result<T, ParseError>;
