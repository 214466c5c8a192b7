use std::{
    fmt,
    ops::{Add, BitAnd, BitOr, BitXor, Div, Mul, Neg, Not, Rem, Shl, Shr, Sub},
};

/// Opaque handle for a runtime value. Handles are compared syntactically:
/// two different handles may still stand for the same concrete value unless
/// the graph knows better.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolicValue(pub(crate) u64);

impl SymbolicValue {
    /// The value of the null pointer and of the integer zero.
    pub const NULL: SymbolicValue = SymbolicValue(0);

    pub fn index(&self) -> u64 {
        self.0
    }

    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }
}

impl fmt::Display for SymbolicValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_null() {
            write!(f, "NULL")
        } else {
            write!(f, "#{}", self.0)
        }
    }
}

/// A concretely known integer, or unknown. `Unknown` absorbs every
/// operation it takes part in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExplicitValue {
    Known(i64),
    Unknown,
}

impl ExplicitValue {
    pub const ZERO: ExplicitValue = ExplicitValue::Known(0);
    pub const ONE: ExplicitValue = ExplicitValue::Known(1);

    pub fn as_known(&self) -> Option<i64> {
        match self {
            ExplicitValue::Known(v) => Some(*v),
            ExplicitValue::Unknown => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, ExplicitValue::Unknown)
    }

    pub fn from_bool(b: bool) -> Self {
        ExplicitValue::Known(b as i64)
    }

    fn lift<F>(self, other: Self, op: F) -> Self
    where
        F: FnOnce(i64, i64) -> Option<i64>,
    {
        match (self, other) {
            (ExplicitValue::Known(l), ExplicitValue::Known(r)) => {
                op(l, r).map_or(ExplicitValue::Unknown, ExplicitValue::Known)
            }
            _ => ExplicitValue::Unknown,
        }
    }

    /// Comparison producing `0` or `1`.
    pub fn compare<F>(self, other: Self, cmp: F) -> Self
    where
        F: FnOnce(i64, i64) -> bool,
    {
        self.lift(other, |l, r| Some(cmp(l, r) as i64))
    }

    /// Division of the two's complement bit patterns read as `u64`.
    pub fn unsigned_div(self, other: Self) -> Self {
        self.lift(other, |l, r| (l as u64).checked_div(r as u64).map(|v| v as i64))
    }

    pub fn unsigned_rem(self, other: Self) -> Self {
        self.lift(other, |l, r| (l as u64).checked_rem(r as u64).map(|v| v as i64))
    }

    /// Logical right shift.
    pub fn unsigned_shr(self, other: Self) -> Self {
        self.lift(other, |l, r| {
            u32::try_from(r)
                .ok()
                .and_then(|r| (l as u64).checked_shr(r))
                .map(|v| v as i64)
        })
    }

    /// Like [`compare`](Self::compare), on the bit patterns read as `u64`.
    pub fn compare_unsigned<F>(self, other: Self, cmp: F) -> Self
    where
        F: FnOnce(u64, u64) -> bool,
    {
        self.lift(other, |l, r| Some(cmp(l as u64, r as u64) as i64))
    }

    /// Keeps the lowest `bits` bits, sign-extending if `signed`.
    pub fn truncate(self, bits: u32, signed: bool) -> Self {
        match self {
            ExplicitValue::Known(v) if bits > 0 && bits < 64 => {
                let shift = 64 - bits;
                let v = if signed {
                    (v << shift) >> shift
                } else {
                    ((v as u64) << shift >> shift) as i64
                };
                ExplicitValue::Known(v)
            }
            other => other,
        }
    }
}

impl From<i64> for ExplicitValue {
    fn from(v: i64) -> Self {
        ExplicitValue::Known(v)
    }
}

impl fmt::Display for ExplicitValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExplicitValue::Known(v) => write!(f, "{}", v),
            ExplicitValue::Unknown => write!(f, "?"),
        }
    }
}

macro_rules! explicit_binary_op {
    ($trait:ident, $method:ident, $op:expr) => {
        impl $trait for ExplicitValue {
            type Output = ExplicitValue;

            fn $method(self, other: ExplicitValue) -> ExplicitValue {
                self.lift(other, $op)
            }
        }
    };
}

explicit_binary_op!(Add, add, |l: i64, r: i64| Some(l.wrapping_add(r)));
explicit_binary_op!(Sub, sub, |l: i64, r: i64| Some(l.wrapping_sub(r)));
explicit_binary_op!(Mul, mul, |l: i64, r: i64| Some(l.wrapping_mul(r)));
explicit_binary_op!(Div, div, |l: i64, r: i64| l.checked_div(r));
explicit_binary_op!(Rem, rem, |l: i64, r: i64| l.checked_rem(r));
explicit_binary_op!(BitAnd, bitand, |l: i64, r: i64| Some(l & r));
explicit_binary_op!(BitOr, bitor, |l: i64, r: i64| Some(l | r));
explicit_binary_op!(BitXor, bitxor, |l: i64, r: i64| Some(l ^ r));
explicit_binary_op!(Shl, shl, |l: i64, r: i64| u32::try_from(r)
    .ok()
    .and_then(|r| l.checked_shl(r)));
explicit_binary_op!(Shr, shr, |l: i64, r: i64| u32::try_from(r)
    .ok()
    .and_then(|r| l.checked_shr(r)));

impl Neg for ExplicitValue {
    type Output = ExplicitValue;

    fn neg(self) -> ExplicitValue {
        match self {
            ExplicitValue::Known(v) => ExplicitValue::Known(v.wrapping_neg()),
            ExplicitValue::Unknown => ExplicitValue::Unknown,
        }
    }
}

/// Bitwise complement, like C's `~`.
impl Not for ExplicitValue {
    type Output = ExplicitValue;

    fn not(self) -> ExplicitValue {
        match self {
            ExplicitValue::Known(v) => ExplicitValue::Known(!v),
            ExplicitValue::Unknown => ExplicitValue::Unknown,
        }
    }
}
