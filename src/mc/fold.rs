// This module implements best-effort constant folding of expression graphs. The first
// pass walks the graph post-order and records a KnownBits value for every node it reaches,
// memoised by node identity and bounded by a depth budget so that self-referential symbol
// definitions and very deep graphs cannot exhaust the stack; nodes reached with an exhausted
// budget are recorded as fully unknown. The concrete evaluation tried at each node gets the
// same remaining budget. Symbol definitions are only peeked at, never marked used. The second pass
// rewrites the graph bottom-up: non-unary nodes whose bits are all known become constants,
// a small set of algebraic identities drop neutral operands, and every other node is rebuilt
// only when one of its children actually changed so untouched subgraphs stay shared.

//! Known-bits propagation and tree folding.

use hashbrown::HashMap;
use std::ptr;

use super::context::McContext;
use super::expr::{BinaryOp, Expr, ExprRef, TargetKind, UnaryOp};
use super::known_bits::KnownBits;

/// Default recursion budget for [`McContext::try_fold`].
pub const DEFAULT_FOLD_DEPTH: u32 = 16;

/// Known bits of every node reached by [`McContext::compute_known_bits`],
/// keyed by node identity.
#[derive(Debug, Default)]
pub struct KnownBitsMap<'a> {
    /// Known bits and the depth budget they were computed with.
    entries: HashMap<*const Expr<'a>, (KnownBits, u32)>,
}

impl<'a> KnownBitsMap<'a> {
    pub fn get(&self, expr: ExprRef<'a>) -> Option<KnownBits> {
        self.entry(expr).map(|(known, _)| known)
    }

    /// Known bits of `expr` with the depth budget that was left when the
    /// node was reached.
    fn entry(&self, expr: ExprRef<'a>) -> Option<(KnownBits, u32)> {
        self.entries.get(&ptr::from_ref(expr)).copied()
    }

    pub fn contains(&self, expr: ExprRef<'a>) -> bool {
        self.entries.contains_key(&ptr::from_ref(expr))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `expr` is known to be exactly `value`.
    fn is_known(&self, expr: ExprRef<'a>, value: u64) -> bool {
        self.get(expr).and_then(|known| known.constant()) == Some(value)
    }
}

fn binary_known_bits(op: BinaryOp, lhs: KnownBits, rhs: KnownBits) -> KnownBits {
    use BinaryOp::*;
    let zero = KnownBits::make_constant(0);
    match op {
        Add => KnownBits::compute_for_add_sub(true, lhs, rhs),
        Sub => KnownBits::compute_for_add_sub(false, lhs, rhs),
        And => lhs & rhs,
        Or => lhs | rhs,
        Xor => lhs ^ rhs,
        Div => KnownBits::sdiv(lhs, rhs),
        Mod => KnownBits::srem(lhs, rhs),
        Mul => KnownBits::mul(lhs, rhs),
        Shl => KnownBits::shl(lhs, rhs),
        AShr => KnownBits::ashr(lhs, rhs),
        LShr => KnownBits::lshr(lhs, rhs),
        EQ => KnownBits::from_bool(KnownBits::known_eq(lhs, rhs)),
        NE => KnownBits::from_bool(KnownBits::known_ne(lhs, rhs)),
        GT => KnownBits::from_bool(KnownBits::sgt(lhs, rhs)),
        GTE => KnownBits::from_bool(KnownBits::sge(lhs, rhs)),
        LT => KnownBits::from_bool(KnownBits::slt(lhs, rhs)),
        LTE => KnownBits::from_bool(KnownBits::sle(lhs, rhs)),
        LAnd => {
            let lhs = KnownBits::known_ne(lhs, zero);
            let rhs = KnownBits::known_ne(rhs, zero);
            KnownBits::from_bool(lhs.zip(rhs).map(|(lhs, rhs)| lhs && rhs))
        }
        LOr => KnownBits::from_bool(KnownBits::known_ne(lhs | rhs, zero)),
    }
}

impl<'arena> McContext<'arena> {
    /// Compute known bits for `expr` and everything below it, up to `depth`
    /// levels deep.
    pub fn compute_known_bits(&self, expr: ExprRef<'arena>, depth: u32) -> KnownBitsMap<'arena> {
        let mut map = KnownBitsMap::default();
        self.known_bits_helper(expr, &mut map, depth);
        map
    }

    fn known_bits_helper(
        &self,
        expr: ExprRef<'arena>,
        map: &mut KnownBitsMap<'arena>,
        depth: u32,
    ) -> KnownBits {
        if let Some((known, computed_depth)) = map.entry(expr) {
            if computed_depth >= depth {
                return known;
            }
        }
        let known = self.node_known_bits(expr, map, depth);
        map.entries.insert(ptr::from_ref(expr), (known, depth));
        known
    }

    fn node_known_bits(
        &self,
        expr: ExprRef<'arena>,
        map: &mut KnownBitsMap<'arena>,
        depth: u32,
    ) -> KnownBits {
        if let Some(value) = self.peek_absolute(expr, depth) {
            return KnownBits::make_constant(value as u64);
        }

        if depth == 0 {
            log::trace!("Depth budget exhausted");
            return KnownBits::unknown();
        }
        let depth = depth - 1;

        match *expr {
            Expr::Constant(value) => KnownBits::make_constant(value as u64),
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.known_bits_helper(lhs, map, depth);
                let rhs = self.known_bits_helper(rhs, map, depth);
                binary_known_bits(op, lhs, rhs)
            }
            Expr::SymbolRef(symbol) => match symbol.variable_value(false) {
                Some(value) => self.known_bits_helper(value, map, depth),
                None => KnownBits::unknown(),
            },
            Expr::Unary { op, operand } => {
                let known = self.known_bits_helper(operand, map, depth);
                match op {
                    UnaryOp::Minus => known.negate(),
                    UnaryOp::Not => {
                        let mut all_ones = KnownBits::unknown();
                        all_ones.set_all_ones();
                        known ^ all_ones
                    }
                    UnaryOp::Plus => known,
                    UnaryOp::LNot => KnownBits::unknown(),
                }
            }
            Expr::Target(target) => match target.kind() {
                TargetKind::Or | TargetKind::Max => {
                    let mut args = target.args().iter();
                    let Some(&first) = args.next() else {
                        return KnownBits::unknown();
                    };
                    let mut known = self.known_bits_helper(first, map, depth);
                    for &arg in args {
                        let arg_known = self.known_bits_helper(arg, map, depth);
                        known = if target.kind() == TargetKind::Or {
                            known | arg_known
                        } else {
                            // Evaluation takes the signed maximum.
                            KnownBits::smax(known, arg_known)
                        };
                    }
                    known
                }
                // Opaque: exact when evaluable, which was already tried above.
                TargetKind::ExtraSGPRs
                | TargetKind::TotalNumVGPRs
                | TargetKind::AlignTo
                | TargetKind::Occupancy => KnownBits::unknown(),
            },
        }
    }

    /// Fold `expr` with the default depth budget.
    pub fn try_fold(&self, expr: ExprRef<'arena>) -> ExprRef<'arena> {
        self.try_fold_with_depth(expr, DEFAULT_FOLD_DEPTH)
    }

    /// Rewrite `expr` into an equivalent, simpler expression. Returns `expr`
    /// itself when nothing could be folded.
    pub fn try_fold_with_depth(&self, expr: ExprRef<'arena>, depth: u32) -> ExprRef<'arena> {
        let map = self.compute_known_bits(expr, depth);
        let folded = self.try_fold_helper(expr, &map);
        if !ptr::eq(folded, expr) {
            log::debug!("Folded {expr} into {folded}");
        }
        folded
    }

    fn fold_to_constant(&self, value: i64) -> ExprRef<'arena> {
        self.record_fold();
        self.constant(value)
    }

    fn try_fold_helper(&self, expr: ExprRef<'arena>, map: &KnownBitsMap<'arena>) -> ExprRef<'arena> {
        let Some((known, depth)) = map.entry(expr) else {
            return expr;
        };

        if expr.is_constant() {
            return expr;
        }

        // Unary nodes are left alone: `~62` is clearer as written than as -63.
        if !expr.is_unary() {
            if let Some(value) = known.constant() {
                return self.fold_to_constant(value as i64);
            }
            if let Some(value) = self.peek_absolute(expr, depth) {
                return self.fold_to_constant(value);
            }
        }

        match *expr {
            Expr::Binary { op, lhs, rhs } => {
                match op {
                    BinaryOp::Sub if map.is_known(rhs, 0) => {
                        self.record_fold();
                        return self.try_fold_helper(lhs, map);
                    }
                    BinaryOp::Add | BinaryOp::Or => {
                        if map.is_known(lhs, 0) {
                            self.record_fold();
                            return self.try_fold_helper(rhs, map);
                        }
                        if map.is_known(rhs, 0) {
                            self.record_fold();
                            return self.try_fold_helper(lhs, map);
                        }
                    }
                    BinaryOp::Mul => {
                        if map.is_known(lhs, 1) {
                            self.record_fold();
                            return self.try_fold_helper(rhs, map);
                        }
                        if map.is_known(rhs, 1) {
                            self.record_fold();
                            return self.try_fold_helper(lhs, map);
                        }
                    }
                    BinaryOp::Shl | BinaryOp::AShr | BinaryOp::LShr => {
                        if map.is_known(rhs, 0) {
                            self.record_fold();
                            return self.try_fold_helper(lhs, map);
                        }
                        if map.is_known(lhs, 0) {
                            return self.fold_to_constant(0);
                        }
                    }
                    BinaryOp::And => {
                        if map.is_known(lhs, 0) || map.is_known(rhs, 0) {
                            return self.fold_to_constant(0);
                        }
                    }
                    _ => {}
                }

                let new_lhs = self.try_fold_helper(lhs, map);
                let new_rhs = self.try_fold_helper(rhs, map);
                if ptr::eq(new_lhs, lhs) && ptr::eq(new_rhs, rhs) {
                    expr
                } else {
                    self.binary(op, new_lhs, new_rhs)
                }
            }
            Expr::Unary { op, operand } => {
                let new_operand = self.try_fold_helper(operand, map);
                if ptr::eq(new_operand, operand) {
                    expr
                } else {
                    self.unary(op, new_operand)
                }
            }
            Expr::Target(target) => {
                let mut changed = false;
                let new_args: Vec<ExprRef<'arena>> = target
                    .args()
                    .iter()
                    .map(|&arg| {
                        let new_arg = self.try_fold_helper(arg, map);
                        changed |= !ptr::eq(new_arg, arg);
                        new_arg
                    })
                    .collect();
                if changed {
                    self.target(target.kind(), &new_args)
                } else {
                    expr
                }
            }
            Expr::Constant(_) | Expr::SymbolRef(_) => expr,
        }
    }
}
