// This module holds the infrastructure shared by the minidump reader and the expression
// evaluator: the error types both subsystems report through (error.rs), and the testing
// helpers (test_utils.rs) that build minidump images byte by byte and own the arenas
// expression tests allocate from.

//! Shared infrastructure.

pub mod error;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use error::{MinidumpError, MinidumpResult, ParseError, ParseResult};
#[cfg(any(test, feature = "test-utils"))]
pub use test_utils::MinidumpBuilder;
