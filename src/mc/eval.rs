//! Concrete evaluation of expressions.
//!
//! Evaluation either produces an absolute value or `None` when some symbol
//! the expression depends on is not defined yet. `None` is not an error: it
//! propagates up through every enclosing node and the same expression may
//! evaluate successfully once its symbols are defined.

use super::context::McContext;
use super::expr::{Expr, ExprRef, TargetExpr, TargetKind};
use super::subtarget::{align_to, isa_info};

impl<'arena> McContext<'arena> {
    /// Evaluate `expr` to an absolute value, marking the symbols it reads as
    /// used.
    pub fn evaluate_as_absolute(&self, expr: ExprRef<'arena>) -> Option<i64> {
        self.evaluate(expr, true, u32::MAX)
    }

    /// Evaluate without marking symbols used, looking at most `depth` levels
    /// below `expr`. Anything deeper is unresolved. For analysis passes.
    pub(crate) fn peek_absolute(&self, expr: ExprRef<'arena>, depth: u32) -> Option<i64> {
        self.evaluate(expr, false, depth)
    }

    fn evaluate(&self, expr: ExprRef<'arena>, set_used: bool, depth: u32) -> Option<i64> {
        // Constants need no budget; every other node spends one level.
        let Some(depth) = depth.checked_sub(1) else {
            return expr.as_constant();
        };
        match *expr {
            Expr::Constant(value) => Some(value),
            Expr::SymbolRef(symbol) => {
                let value = symbol.variable_value(set_used)?;
                if !symbol.begin_evaluation() {
                    log::trace!("Cyclic definition of {} left unresolved", symbol.name());
                    return None;
                }
                let result = self.evaluate(value, set_used, depth);
                symbol.end_evaluation();
                result
            }
            Expr::Unary { op, operand } => Some(op.apply(self.evaluate(operand, set_used, depth)?)),
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.evaluate(lhs, set_used, depth)?;
                let rhs = self.evaluate(rhs, set_used, depth)?;
                op.apply(lhs, rhs)
            }
            Expr::Target(target) => self.evaluate_target(&target, set_used, depth),
        }
    }

    fn evaluate_target(
        &self,
        target: &TargetExpr<'arena>,
        set_used: bool,
        depth: u32,
    ) -> Option<i64> {
        let kind = target.kind();
        let arity_ok = kind.accepts_arg_count(target.args().len());
        debug_assert!(arity_ok, "Argument count incorrect for {}", kind.name());
        if !arity_ok {
            log::warn!(
                "{} has {} arguments, left unresolved",
                kind.name(),
                target.args().len()
            );
            return None;
        }

        let eval = |index: usize| {
            self.evaluate(target.sub_expr(index), set_used, depth)
                .map(|value| value as u64)
        };

        match kind {
            TargetKind::Or | TargetKind::Max => {
                let mut total: Option<i64> = None;
                for &arg in target.args() {
                    let value = self.evaluate(arg, set_used, depth)?;
                    total = Some(match (total, kind) {
                        (None, _) => value,
                        (Some(total), TargetKind::Or) => total | value,
                        (Some(total), _) => total.max(value),
                    });
                }
                total
            }
            TargetKind::ExtraSGPRs => {
                let xnack_used = self.fixed_arg(target, depth, 2, set_used)?;
                let vcc_used = eval(0)?;
                let flat_scr_used = eval(1)?;
                let extra = isa_info::num_extra_sgprs(
                    self.subtarget(),
                    vcc_used != 0,
                    flat_scr_used != 0,
                    xnack_used != 0,
                );
                Some(extra.into())
            }
            TargetKind::TotalNumVGPRs => {
                let num_agpr = eval(0)?;
                let num_vgpr = eval(1)?;
                let total = if self.subtarget().has_gfx90a_insts() && num_agpr != 0 {
                    align_to(num_vgpr, 4).wrapping_add(num_agpr)
                } else {
                    num_vgpr.max(num_agpr)
                };
                Some(total as i64)
            }
            TargetKind::AlignTo => {
                let value = eval(0)?;
                let align = eval(1)?;
                if align == 0 {
                    log::warn!("alignto with zero alignment left unresolved");
                    return None;
                }
                Some(align_to(value, align) as i64)
            }
            TargetKind::Occupancy => {
                let max_waves = self.fixed_arg(target, depth, 0, set_used)?;
                let granule = self.fixed_arg(target, depth, 1, set_used)?;
                let target_total_vgprs = self.fixed_arg(target, depth, 2, set_used)?;
                let generation = self.fixed_arg(target, depth, 3, set_used)?;
                let init_occupancy = self.fixed_arg(target, depth, 4, set_used)?;
                let num_sgprs = eval(5)?;
                let num_vgprs = eval(6)?;

                // The ISA tables work on 32-bit register counts; wider values
                // are truncated on the way in.
                let mut occupancy = init_occupancy as u32;
                if num_sgprs != 0 {
                    occupancy = occupancy.min(isa_info::occupancy_with_num_sgprs(
                        num_sgprs as u32,
                        max_waves as u32,
                        generation as u32,
                    ));
                }
                if num_vgprs != 0 {
                    occupancy = occupancy.min(isa_info::num_waves_per_eu_with_num_vgprs(
                        num_vgprs as u32,
                        granule as u32,
                        max_waves as u32,
                        target_total_vgprs as u32,
                    ));
                }
                Some(occupancy.into())
            }
        }
    }

    /// An argument the factories always fill with a constant. Anything else
    /// means the node was built by hand against the contract; it evaluates
    /// as unresolved.
    fn fixed_arg(
        &self,
        target: &TargetExpr<'arena>,
        depth: u32,
        index: usize,
        set_used: bool,
    ) -> Option<u64> {
        let value = self.evaluate(target.sub_expr(index), set_used, depth);
        if value.is_none() {
            log::warn!(
                "Argument {} for {} should be a known constant",
                index + 1,
                target.kind().name()
            );
        }
        value.map(|value| value as u64)
    }
}
