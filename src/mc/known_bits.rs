//! 64-bit known-bits lattice.
//!
//! A [`KnownBits`] records, for every bit position, whether the bit is known
//! to be zero, known to be one, or unknown. The transfer functions here are
//! conservative: a bit is only reported as known if it holds for every
//! concrete value the operands may take.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, BitXor};

const SIGN_BIT: u64 = 1 << 63;

#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct KnownBits {
    /// Bits known to be zero.
    pub zero: u64,
    /// Bits known to be one.
    pub one: u64,
}

impl KnownBits {
    pub const BIT_WIDTH: u32 = 64;

    /// Nothing known.
    pub const fn unknown() -> Self {
        Self { zero: 0, one: 0 }
    }

    pub const fn make_constant(value: u64) -> Self {
        Self {
            zero: !value,
            one: value,
        }
    }

    /// A 0/1 value whose low bit is unknown, zero-extended to 64 bits.
    pub const fn unknown_bool() -> Self {
        Self { zero: !1, one: 0 }
    }

    pub fn from_bool(value: Option<bool>) -> Self {
        match value {
            Some(value) => Self::make_constant(value as u64),
            None => Self::unknown_bool(),
        }
    }

    pub fn is_constant(&self) -> bool {
        self.zero | self.one == u64::MAX
    }

    pub fn is_unknown(&self) -> bool {
        self.zero == 0 && self.one == 0
    }

    pub fn constant(&self) -> Option<u64> {
        self.is_constant().then_some(self.one)
    }

    pub fn has_conflict(&self) -> bool {
        self.zero & self.one != 0
    }

    pub fn set_all_ones(&mut self) {
        self.zero = 0;
        self.one = u64::MAX;
    }

    pub fn min_value(&self) -> u64 {
        self.one
    }

    pub fn max_value(&self) -> u64 {
        !self.zero
    }

    pub fn signed_min_value(&self) -> i64 {
        // The sign bit is set unless known clear.
        let sign = if self.zero & SIGN_BIT != 0 { 0 } else { SIGN_BIT };
        (self.one | sign) as i64
    }

    pub fn signed_max_value(&self) -> i64 {
        // The sign bit is clear unless known set.
        let sign = if self.one & SIGN_BIT != 0 { 0 } else { SIGN_BIT };
        (!self.zero & !sign) as i64
    }

    pub fn count_min_trailing_zeros(&self) -> u32 {
        self.zero.trailing_ones()
    }

    fn compute_for_add_carry(lhs: Self, rhs: Self, carry_zero: bool, carry_one: bool) -> Self {
        let possible_sum_zero = lhs
            .max_value()
            .wrapping_add(rhs.max_value())
            .wrapping_add(!carry_zero as u64);
        let possible_sum_one = lhs
            .min_value()
            .wrapping_add(rhs.min_value())
            .wrapping_add(carry_one as u64);

        let carry_known_zero = !(possible_sum_zero ^ lhs.zero ^ rhs.zero);
        let carry_known_one = possible_sum_one ^ lhs.one ^ rhs.one;

        let known = (lhs.zero | lhs.one) & (rhs.zero | rhs.one) & (carry_known_zero | carry_known_one);
        Self {
            zero: !possible_sum_zero & known,
            one: possible_sum_one & known,
        }
    }

    /// Known bits of `lhs + rhs` (or `lhs - rhs`), assuming wraparound.
    pub fn compute_for_add_sub(add: bool, lhs: Self, rhs: Self) -> Self {
        if add {
            Self::compute_for_add_carry(lhs, rhs, true, false)
        } else {
            let not_rhs = Self {
                zero: rhs.one,
                one: rhs.zero,
            };
            Self::compute_for_add_carry(lhs, not_rhs, false, true)
        }
    }

    pub fn negate(self) -> Self {
        Self::compute_for_add_sub(false, Self::make_constant(0), self)
    }

    pub fn mul(lhs: Self, rhs: Self) -> Self {
        if let (Some(l), Some(r)) = (lhs.constant(), rhs.constant()) {
            return Self::make_constant(l.wrapping_mul(r));
        }
        let trailing = (lhs.count_min_trailing_zeros() + rhs.count_min_trailing_zeros()).min(64);
        Self {
            zero: low_bits(trailing),
            one: 0,
        }
    }

    fn signed_binop(lhs: Self, rhs: Self, op: fn(i64, i64) -> Option<i64>) -> Self {
        match (lhs.constant(), rhs.constant()) {
            (Some(l), Some(r)) => op(l as i64, r as i64)
                .map(|value| Self::make_constant(value as u64))
                .unwrap_or_default(),
            _ => Self::unknown(),
        }
    }

    pub fn sdiv(lhs: Self, rhs: Self) -> Self {
        Self::signed_binop(lhs, rhs, |l, r| (r != 0).then(|| l.wrapping_div(r)))
    }

    pub fn srem(lhs: Self, rhs: Self) -> Self {
        Self::signed_binop(lhs, rhs, |l, r| (r != 0).then(|| l.wrapping_rem(r)))
    }

    pub fn shl(lhs: Self, rhs: Self) -> Self {
        match rhs.constant() {
            Some(amount) if amount >= 64 => Self::make_constant(0),
            Some(amount) => Self {
                zero: (lhs.zero << amount) | low_bits(amount as u32),
                one: lhs.one << amount,
            },
            // Whatever the amount, known low zeros stay zero.
            None => Self {
                zero: low_bits(lhs.count_min_trailing_zeros()),
                one: 0,
            },
        }
    }

    pub fn lshr(lhs: Self, rhs: Self) -> Self {
        match rhs.constant() {
            Some(amount) if amount >= 64 => Self::make_constant(0),
            Some(amount) => Self {
                zero: (lhs.zero >> amount) | !(u64::MAX >> amount),
                one: lhs.one >> amount,
            },
            None => Self::unknown(),
        }
    }

    pub fn ashr(lhs: Self, rhs: Self) -> Self {
        match rhs.constant() {
            Some(amount) => {
                let amount = amount.min(63);
                Self {
                    zero: ((lhs.zero as i64) >> amount) as u64,
                    one: ((lhs.one as i64) >> amount) as u64,
                }
            }
            None => Self::unknown(),
        }
    }

    pub fn umax(lhs: Self, rhs: Self) -> Self {
        if lhs.min_value() >= rhs.max_value() {
            return lhs;
        }
        if rhs.min_value() >= lhs.max_value() {
            return rhs;
        }
        // The result is one of the two, so whatever they agree on holds.
        Self {
            zero: lhs.zero & rhs.zero,
            one: lhs.one & rhs.one,
        }
    }

    /// Signed counterpart of [`KnownBits::umax`].
    pub fn smax(lhs: Self, rhs: Self) -> Self {
        if lhs.signed_min_value() >= rhs.signed_max_value() {
            return lhs;
        }
        if rhs.signed_min_value() >= lhs.signed_max_value() {
            return rhs;
        }
        Self {
            zero: lhs.zero & rhs.zero,
            one: lhs.one & rhs.one,
        }
    }

    pub fn known_eq(lhs: Self, rhs: Self) -> Option<bool> {
        if (lhs.one & rhs.zero) | (lhs.zero & rhs.one) != 0 {
            return Some(false);
        }
        match (lhs.constant(), rhs.constant()) {
            (Some(l), Some(r)) => Some(l == r),
            _ => None,
        }
    }

    pub fn known_ne(lhs: Self, rhs: Self) -> Option<bool> {
        Self::known_eq(lhs, rhs).map(|equal| !equal)
    }

    pub fn sgt(lhs: Self, rhs: Self) -> Option<bool> {
        if lhs.signed_min_value() > rhs.signed_max_value() {
            return Some(true);
        }
        if lhs.signed_max_value() <= rhs.signed_min_value() {
            return Some(false);
        }
        None
    }

    pub fn sge(lhs: Self, rhs: Self) -> Option<bool> {
        if lhs.signed_min_value() >= rhs.signed_max_value() {
            return Some(true);
        }
        if lhs.signed_max_value() < rhs.signed_min_value() {
            return Some(false);
        }
        None
    }

    pub fn slt(lhs: Self, rhs: Self) -> Option<bool> {
        Self::sgt(rhs, lhs)
    }

    pub fn sle(lhs: Self, rhs: Self) -> Option<bool> {
        Self::sge(rhs, lhs)
    }
}

fn low_bits(count: u32) -> u64 {
    if count >= 64 {
        u64::MAX
    } else {
        (1u64 << count) - 1
    }
}

impl BitAnd for KnownBits {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self {
            zero: self.zero | rhs.zero,
            one: self.one & rhs.one,
        }
    }
}

impl BitOr for KnownBits {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self {
            zero: self.zero & rhs.zero,
            one: self.one | rhs.one,
        }
    }
}

impl BitOrAssign for KnownBits {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = *self | rhs;
    }
}

impl BitXor for KnownBits {
    type Output = Self;

    fn bitxor(self, rhs: Self) -> Self {
        Self {
            zero: (self.zero & rhs.zero) | (self.one & rhs.one),
            one: (self.zero & rhs.one) | (self.one & rhs.zero),
        }
    }
}

impl fmt::Debug for KnownBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.constant() {
            Some(value) => write!(f, "KnownBits(const {:#x})", value),
            None => write!(f, "KnownBits(zero: {:#018x}, one: {:#018x})", self.zero, self.one),
        }
    }
}
