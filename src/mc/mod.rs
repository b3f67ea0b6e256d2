// This module hosts the symbolic expression evaluator used when emitting GPU kernel
// descriptors. Register counts and occupancy are often only known once every function of a
// module has been compiled, so they are described as expression graphs over symbols that
// get defined later. The graph is built through McContext (context.rs) in an arena, evaluated
// to an absolute value once its symbols resolve (eval.rs), and simplified ahead of that with
// known-bits propagation and algebraic rewrites (fold.rs, known_bits.rs). The target
// operators read the GCN subtarget through the SubtargetInfo trait (subtarget.rs), and
// parser.rs reads back the printed form of an expression.

//! Target MC expression evaluation and folding.

pub mod context;
mod eval;
pub mod expr;
pub mod fold;
pub mod known_bits;
mod parser;
pub mod subtarget;

pub use context::{ContextStats, McContext};
pub use expr::{BinaryOp, Expr, ExprRef, Symbol, TargetExpr, TargetKind, UnaryOp};
pub use fold::{KnownBitsMap, DEFAULT_FOLD_DEPTH};
pub use known_bits::KnownBits;
pub use subtarget::{Generation, GcnSubtarget, SubtargetInfo};
