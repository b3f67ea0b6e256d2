//! dumpexpr - crash dump reading and target expression folding.
//!
//! Two independent pieces of object-file tooling live in this crate:
//!
//! - [`minidump`] - a validating, lazily decoding reader for the minidump
//!   crash dump container (header, stream directory, typed stream views).
//! - [`mc`] - a symbolic evaluator for the register-count and occupancy
//!   expressions GPU kernel descriptors are built from, with known-bits
//!   based constant folding.
//!
//! # Primary Usage
//!
//! ```ignore
//! use dumpexpr::mc::McContext;
//! use dumpexpr::minidump::MinidumpFile;
//! use bumpalo::Bump;
//!
//! let bytes = std::fs::read("crash.dmp")?;
//! let dump = MinidumpFile::create(&bytes)?;
//! println!("{} threads", dump.thread_list()?.len());
//!
//! let arena = Bump::new();
//! let ctx = McContext::new(&arena);
//! let expr = ctx.parse_expr("alignto(kernel.num_vgpr, 4)")?;
//! ctx.parse_definition("kernel.num_vgpr = 13")?;
//! assert_eq!(ctx.evaluate_as_absolute(expr), Some(16));
//! ```
//!
//! # Architecture
//!
//! - [`core`] - Shared infrastructure (errors, test builders)
//! - [`minidump`] - Container reader
//! - [`mc`] - Expression graph, evaluation and folding

pub mod core;
pub mod mc;
pub mod minidump;

pub use core::{MinidumpError, MinidumpResult, ParseError, ParseResult};
pub use mc::{Expr, ExprRef, GcnSubtarget, KnownBits, McContext, SubtargetInfo};
pub use minidump::{MinidumpFile, StreamType};
