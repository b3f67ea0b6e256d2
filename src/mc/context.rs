// This module provides arena-based expression context management using the bumpalo crate
// to simplify lifetime management of expression graphs. McContext is the central hub that
// borrows the arena and owns everything tied to its lifetime: expression nodes, target
// operator argument slices, symbols and their interned names. Nodes are handed out as
// shared &'arena references, so any node can be a child of many parents and nothing is
// ever freed twice; the whole graph goes away when the arena is dropped. The context also
// owns the subtarget description the target operators consult, the symbol table used by
// the parser and by define(), and a small set of statistics for debugging.

//! Arena-based expression context.
//!
//! All expression nodes share the lifetime of the arena the context was
//! created with.

use bumpalo::Bump;
use hashbrown::HashMap;
use std::cell::RefCell;
use std::fmt;

use super::expr::{BinaryOp, Expr, ExprRef, Symbol, TargetExpr, TargetKind, UnaryOp};
use super::subtarget::{GcnSubtarget, SubtargetInfo};

/// Statistics gathered over the lifetime of a context.
#[derive(Debug, Clone, Default)]
pub struct ContextStats {
    pub nodes_created: usize,
    pub symbols_created: usize,
    pub folds_applied: usize,
}

impl fmt::Display for ContextStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} nodes, {} symbols, {} folds",
            self.nodes_created, self.symbols_created, self.folds_applied
        )
    }
}

/// Owner of an expression graph.
pub struct McContext<'arena> {
    arena: &'arena Bump,
    subtarget: Box<dyn SubtargetInfo + 'arena>,
    symbols: RefCell<HashMap<&'arena str, &'arena Symbol<'arena>>>,
    stats: RefCell<ContextStats>,
}

impl<'arena> McContext<'arena> {
    /// Create a context for the default subtarget.
    pub fn new(arena: &'arena Bump) -> Self {
        Self::with_subtarget(arena, GcnSubtarget::default())
    }

    pub fn with_subtarget(arena: &'arena Bump, subtarget: impl SubtargetInfo + 'arena) -> Self {
        Self {
            arena,
            subtarget: Box::new(subtarget),
            symbols: RefCell::new(HashMap::new()),
            stats: RefCell::new(ContextStats::default()),
        }
    }

    pub fn arena(&self) -> &'arena Bump {
        self.arena
    }

    pub fn subtarget(&self) -> &dyn SubtargetInfo {
        self.subtarget.as_ref()
    }

    pub fn stats(&self) -> ContextStats {
        self.stats.borrow().clone()
    }

    pub(crate) fn record_fold(&self) {
        self.stats.borrow_mut().folds_applied += 1;
    }

    fn alloc(&self, expr: Expr<'arena>) -> ExprRef<'arena> {
        self.stats.borrow_mut().nodes_created += 1;
        self.arena.alloc(expr)
    }

    pub fn constant(&self, value: i64) -> ExprRef<'arena> {
        self.alloc(Expr::Constant(value))
    }

    pub fn unary(&self, op: UnaryOp, operand: ExprRef<'arena>) -> ExprRef<'arena> {
        self.alloc(Expr::Unary { op, operand })
    }

    pub fn binary(
        &self,
        op: BinaryOp,
        lhs: ExprRef<'arena>,
        rhs: ExprRef<'arena>,
    ) -> ExprRef<'arena> {
        self.alloc(Expr::Binary { op, lhs, rhs })
    }

    /// Find the symbol called `name`, creating an undefined one if needed.
    pub fn get_or_create_symbol(&self, name: &str) -> &'arena Symbol<'arena> {
        if let Some(&symbol) = self.symbols.borrow().get(name) {
            return symbol;
        }
        let name: &'arena str = self.arena.alloc_str(name);
        let symbol: &'arena Symbol<'arena> = self.arena.alloc(Symbol::new(name));
        self.symbols.borrow_mut().insert(name, symbol);
        self.stats.borrow_mut().symbols_created += 1;
        symbol
    }

    pub fn lookup_symbol(&self, name: &str) -> Option<&'arena Symbol<'arena>> {
        self.symbols.borrow().get(name).copied()
    }

    pub fn symbol_ref(&self, name: &str) -> ExprRef<'arena> {
        let symbol = self.get_or_create_symbol(name);
        self.alloc(Expr::SymbolRef(symbol))
    }

    /// Give `name` a definition. Expressions already referencing the symbol
    /// see the new value on their next evaluation.
    pub fn define(&self, name: &str, value: ExprRef<'arena>) -> &'arena Symbol<'arena> {
        let symbol = self.get_or_create_symbol(name);
        if symbol.is_variable() {
            log::debug!("Redefining symbol {name}");
        }
        symbol.set_variable_value(value);
        symbol
    }

    /// Build a target operator node.
    ///
    /// `args` must not be empty. The per-kind argument count is only checked
    /// when the node is evaluated.
    pub fn target(&self, kind: TargetKind, args: &[ExprRef<'arena>]) -> ExprRef<'arena> {
        assert!(!args.is_empty(), "Needs a minimum of one expression.");
        let args = self.arena.alloc_slice_copy(args);
        self.alloc(Expr::Target(TargetExpr::new(kind, args)))
    }

    pub fn create_or(&self, args: &[ExprRef<'arena>]) -> ExprRef<'arena> {
        self.target(TargetKind::Or, args)
    }

    pub fn create_max(&self, args: &[ExprRef<'arena>]) -> ExprRef<'arena> {
        self.target(TargetKind::Max, args)
    }

    /// Extra SGPR count, resolvable later if the VCC or flat scratch usage is
    /// not known yet. XNACK usage is always known up front.
    pub fn create_extra_sgprs(
        &self,
        vcc_used: ExprRef<'arena>,
        flat_scr_used: ExprRef<'arena>,
        xnack_used: bool,
    ) -> ExprRef<'arena> {
        let xnack = self.constant(xnack_used as i64);
        self.target(TargetKind::ExtraSGPRs, &[vcc_used, flat_scr_used, xnack])
    }

    pub fn create_total_num_vgprs(
        &self,
        num_agpr: ExprRef<'arena>,
        num_vgpr: ExprRef<'arena>,
    ) -> ExprRef<'arena> {
        self.target(TargetKind::TotalNumVGPRs, &[num_agpr, num_vgpr])
    }

    pub fn create_align_to(&self, value: ExprRef<'arena>, align: ExprRef<'arena>) -> ExprRef<'arena> {
        self.target(TargetKind::AlignTo, &[value, align])
    }

    /// Occupancy of a kernel whose register counts may not be known yet.
    ///
    /// The subtarget parameters are captured as constants now, so the node
    /// evaluates the same way no matter which context later looks at it.
    pub fn create_occupancy(
        &self,
        init_occupancy: u32,
        num_sgprs: ExprRef<'arena>,
        num_vgprs: ExprRef<'arena>,
    ) -> ExprRef<'arena> {
        let sti = self.subtarget();
        let max_waves = self.constant(sti.max_waves_per_eu().into());
        let granule = self.constant(sti.vgpr_alloc_granule().into());
        let total_vgprs = self.constant(sti.total_num_vgprs().into());
        let generation = self.constant(sti.generation().as_raw().into());
        let init_occupancy = self.constant(init_occupancy.into());
        self.target(
            TargetKind::Occupancy,
            &[max_waves, granule, total_vgprs, generation, init_occupancy, num_sgprs, num_vgprs],
        )
    }

    /// Mark every symbol reachable from `expr` as used.
    pub fn visit_used(&self, expr: ExprRef<'arena>) {
        match *expr {
            Expr::Constant(_) => {}
            Expr::SymbolRef(symbol) => symbol.set_used(),
            Expr::Unary { operand, .. } => self.visit_used(operand),
            Expr::Binary { lhs, rhs, .. } => {
                self.visit_used(lhs);
                self.visit_used(rhs);
            }
            Expr::Target(target) => {
                for &arg in target.args() {
                    self.visit_used(arg);
                }
            }
        }
    }

    /// Render the absolute value of `expr` if it has one, the expression
    /// otherwise.
    pub fn print_value(&self, expr: ExprRef<'arena>) -> String {
        match self.evaluate_as_absolute(expr) {
            Some(value) => value.to_string(),
            None => expr.to_string(),
        }
    }
}

impl fmt::Debug for McContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("McContext")
            .field("symbols", &self.symbols.borrow().len())
            .field("stats", &self.stats.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_utils::test::{with_test_context, TestContext};

    #[test]
    fn test_symbols_are_interned() {
        with_test_context(|test_ctx| {
            let ctx = test_ctx.create_context("gfx900");
            let a = ctx.get_or_create_symbol("a");
            assert!(std::ptr::eq(a, ctx.get_or_create_symbol("a")));
            assert!(ctx.lookup_symbol("b").is_none());

            let first = ctx.symbol_ref("a");
            let second = ctx.symbol_ref("a");
            assert!(!std::ptr::eq(first, second));
            assert_eq!(first, second);
            assert_eq!(ctx.stats().symbols_created, 1);
        });
    }

    #[test]
    fn test_define_and_redefine() {
        let test_ctx = TestContext::new();
        let ctx = test_ctx.create_context("gfx90a");
        let symbol = ctx.define("n", ctx.constant(1));
        assert!(symbol.is_variable());
        let n = ctx.symbol_ref("n");
        assert_eq!(ctx.evaluate_as_absolute(n), Some(1));
        ctx.define("n", ctx.constant(2));
        assert_eq!(ctx.evaluate_as_absolute(n), Some(2));
        assert!(test_ctx.memory_used() > 0);
    }

    #[test]
    fn test_occupancy_captures_subtarget() {
        with_test_context(|test_ctx| {
            let gfx1100 = test_ctx.create_context("gfx1100");
            let occupancy = gfx1100.create_occupancy(16, gfx1100.constant(0), gfx1100.constant(0));
            let Expr::Target(target) = *occupancy else {
                panic!("expected a target node");
            };
            let params: Vec<_> = target.args()[..5]
                .iter()
                .map(|arg| arg.as_constant().unwrap())
                .collect();
            assert_eq!(params, [16, 8, 1536, 9, 16]);
            assert_eq!(gfx1100.subtarget().generation().isa_major(), 11);
        });
    }

    #[test]
    #[should_panic(expected = "Needs a minimum of one expression.")]
    fn test_target_without_args() {
        let test_ctx = TestContext::new();
        let ctx = McContext::new(test_ctx.arena());
        ctx.create_or(&[]);
    }
}
