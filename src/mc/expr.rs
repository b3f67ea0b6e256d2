//! Expression nodes.
//!
//! Nodes are allocated in the arena of an [`McContext`](super::McContext) and
//! referenced as `&'a Expr<'a>`, so a sub-expression can be shared by any
//! number of parents. Nodes never change after creation; folding builds new
//! nodes instead.

use std::cell::Cell;
use std::fmt;

/// Shared reference to an arena-allocated node.
pub type ExprRef<'a> = &'a Expr<'a>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expr<'a> {
    Constant(i64),
    SymbolRef(&'a Symbol<'a>),
    Unary {
        op: UnaryOp,
        operand: ExprRef<'a>,
    },
    Binary {
        op: BinaryOp,
        lhs: ExprRef<'a>,
        rhs: ExprRef<'a>,
    },
    Target(TargetExpr<'a>),
}

impl<'a> Expr<'a> {
    pub fn as_constant(&self) -> Option<i64> {
        match self {
            Expr::Constant(value) => Some(*value),
            _ => None,
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Expr::Constant(_))
    }

    pub fn is_unary(&self) -> bool {
        matches!(self, Expr::Unary { .. })
    }

    /// Operands that print without parentheses.
    fn is_trivial(&self) -> bool {
        match self {
            Expr::Constant(value) => *value >= 0,
            Expr::SymbolRef(_) | Expr::Target(_) => true,
            Expr::Unary { .. } | Expr::Binary { .. } => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// Logical negation, `!`.
    LNot,
    /// Two's-complement negation, `-`.
    Minus,
    /// Bitwise complement, `~`.
    Not,
    /// Identity, `+`.
    Plus,
}

impl UnaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            UnaryOp::LNot => "!",
            UnaryOp::Minus => "-",
            UnaryOp::Not => "~",
            UnaryOp::Plus => "+",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    And,
    Div,
    EQ,
    GT,
    GTE,
    LAnd,
    LOr,
    LT,
    LTE,
    Mod,
    Mul,
    NE,
    Or,
    Shl,
    /// Arithmetic shift right.
    AShr,
    /// Logical shift right.
    LShr,
    Sub,
    Xor,
}

impl BinaryOp {
    pub fn as_str(self) -> &'static str {
        use BinaryOp::*;
        match self {
            Add => "+",
            And => "&",
            Div => "/",
            EQ => "==",
            GT => ">",
            GTE => ">=",
            LAnd => "&&",
            LOr => "||",
            LT => "<",
            LTE => "<=",
            Mod => "%",
            Mul => "*",
            NE => "!=",
            Or => "|",
            Shl => "<<",
            AShr => ">>",
            LShr => ">>>",
            Sub => "-",
            Xor => "^",
        }
    }

    /// Apply the operator to two resolved values.
    ///
    /// Arithmetic wraps; comparisons and logical operators produce 0 or 1.
    /// Division or remainder by zero has no value.
    pub fn apply(self, lhs: i64, rhs: i64) -> Option<i64> {
        use BinaryOp::*;
        let value = match self {
            Add => lhs.wrapping_add(rhs),
            And => lhs & rhs,
            Div | Mod if rhs == 0 => return None,
            Div => lhs.wrapping_div(rhs),
            Mod => lhs.wrapping_rem(rhs),
            EQ => (lhs == rhs) as i64,
            GT => (lhs > rhs) as i64,
            GTE => (lhs >= rhs) as i64,
            LAnd => (lhs != 0 && rhs != 0) as i64,
            LOr => (lhs != 0 || rhs != 0) as i64,
            LT => (lhs < rhs) as i64,
            LTE => (lhs <= rhs) as i64,
            Mul => lhs.wrapping_mul(rhs),
            NE => (lhs != rhs) as i64,
            Or => lhs | rhs,
            Shl => shift_amount(rhs).map_or(0, |amount| ((lhs as u64) << amount) as i64),
            AShr => lhs >> shift_amount(rhs).unwrap_or(63),
            LShr => shift_amount(rhs).map_or(0, |amount| ((lhs as u64) >> amount) as i64),
            Sub => lhs.wrapping_sub(rhs),
            Xor => lhs ^ rhs,
        };
        Some(value)
    }
}

/// Shift amounts are unsigned; anything of 64 or more shifts every bit out.
pub(crate) fn shift_amount(rhs: i64) -> Option<u32> {
    u32::try_from(rhs as u64).ok().filter(|&amount| amount < 64)
}

impl UnaryOp {
    pub fn apply(self, operand: i64) -> i64 {
        match self {
            UnaryOp::LNot => (operand == 0) as i64,
            UnaryOp::Minus => operand.wrapping_neg(),
            UnaryOp::Not => !operand,
            UnaryOp::Plus => operand,
        }
    }
}

/// A named value whose definition may arrive after expressions referencing
/// it have been built.
pub struct Symbol<'a> {
    name: &'a str,
    value: Cell<Option<ExprRef<'a>>>,
    used: Cell<bool>,
    evaluating: Cell<bool>,
}

impl<'a> Symbol<'a> {
    pub(crate) fn new(name: &'a str) -> Self {
        Self {
            name,
            value: Cell::new(None),
            used: Cell::new(false),
            evaluating: Cell::new(false),
        }
    }

    pub fn name(&self) -> &'a str {
        self.name
    }

    /// Whether the symbol has been given a definition.
    pub fn is_variable(&self) -> bool {
        self.value.get().is_some()
    }

    /// The symbol's definition. `set_used` is false for analysis passes
    /// that only peek at it.
    pub fn variable_value(&self, set_used: bool) -> Option<ExprRef<'a>> {
        if set_used {
            self.used.set(true);
        }
        self.value.get()
    }

    pub(crate) fn set_variable_value(&self, value: ExprRef<'a>) {
        self.value.set(Some(value));
    }

    pub fn is_used(&self) -> bool {
        self.used.get()
    }

    pub(crate) fn set_used(&self) {
        self.used.set(true);
    }

    /// Enter evaluation of this symbol's definition. Returns false if it is
    /// already being evaluated further up the stack.
    pub(crate) fn begin_evaluation(&self) -> bool {
        !self.evaluating.replace(true)
    }

    pub(crate) fn end_evaluation(&self) {
        self.evaluating.set(false);
    }
}

impl PartialEq for Symbol<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

impl Eq for Symbol<'_> {}

impl fmt::Debug for Symbol<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Symbol")
            .field("name", &self.name)
            .field("defined", &self.is_variable())
            .finish()
    }
}

/// Target-specific derived computations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    /// Bitwise OR of all arguments.
    Or,
    /// Signed maximum of all arguments.
    Max,
    /// `(vcc_used, flat_scratch_used, xnack_used)`.
    ExtraSGPRs,
    /// `(num_agpr, num_vgpr)`.
    TotalNumVGPRs,
    /// `(value, align)`.
    AlignTo,
    /// `(max_waves, granule, target_total_vgprs, generation, init_occupancy,
    /// num_sgprs, num_vgprs)`.
    Occupancy,
}

impl TargetKind {
    pub fn name(self) -> &'static str {
        match self {
            TargetKind::Or => "or",
            TargetKind::Max => "max",
            TargetKind::ExtraSGPRs => "extrasgprs",
            TargetKind::TotalNumVGPRs => "totalnumvgprs",
            TargetKind::AlignTo => "alignto",
            TargetKind::Occupancy => "occupancy",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "or" => Some(TargetKind::Or),
            "max" => Some(TargetKind::Max),
            "extrasgprs" => Some(TargetKind::ExtraSGPRs),
            "totalnumvgprs" => Some(TargetKind::TotalNumVGPRs),
            "alignto" => Some(TargetKind::AlignTo),
            "occupancy" => Some(TargetKind::Occupancy),
            _ => None,
        }
    }

    /// Required argument count, or `None` for the variadic reductions.
    pub fn arity(self) -> Option<usize> {
        match self {
            TargetKind::Or | TargetKind::Max => None,
            TargetKind::ExtraSGPRs => Some(3),
            TargetKind::TotalNumVGPRs | TargetKind::AlignTo => Some(2),
            TargetKind::Occupancy => Some(7),
        }
    }

    pub fn accepts_arg_count(self, count: usize) -> bool {
        match self.arity() {
            Some(arity) => count == arity,
            None => count >= 1,
        }
    }
}

/// A target operator applied to its arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetExpr<'a> {
    kind: TargetKind,
    args: &'a [ExprRef<'a>],
}

impl<'a> TargetExpr<'a> {
    pub(crate) fn new(kind: TargetKind, args: &'a [ExprRef<'a>]) -> Self {
        debug_assert!(!args.is_empty(), "Needs a minimum of one expression.");
        Self { kind, args }
    }

    pub fn kind(&self) -> TargetKind {
        self.kind
    }

    pub fn args(&self) -> &'a [ExprRef<'a>] {
        self.args
    }

    pub fn sub_expr(&self, index: usize) -> ExprRef<'a> {
        self.args[index]
    }
}

fn fmt_operand(expr: &Expr<'_>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if expr.is_trivial() {
        write!(f, "{expr}")
    } else {
        write!(f, "({expr})")
    }
}

impl fmt::Display for Expr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Constant(value) => write!(f, "{value}"),
            Expr::SymbolRef(symbol) => f.write_str(symbol.name()),
            Expr::Unary { op, operand } => {
                f.write_str(op.as_str())?;
                fmt_operand(operand, f)
            }
            Expr::Binary { op, lhs, rhs } => {
                fmt_operand(lhs, f)?;
                f.write_str(op.as_str())?;
                fmt_operand(rhs, f)
            }
            Expr::Target(target) => write!(f, "{target}"),
        }
    }
}

impl fmt::Display for TargetExpr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.kind.name())?;
        for (i, arg) in self.args.iter().enumerate() {
            if i != 0 {
                f.write_str(", ")?;
            }
            write!(f, "{arg}")?;
        }
        f.write_str(")")
    }
}
