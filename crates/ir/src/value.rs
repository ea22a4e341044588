//! Value definitions.
use std::{fmt, ops};

use cranelift_entity::entity_impl;

use crate::{inst::InstId, Type};

/// An opaque reference to [`Value`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Copy, Hash)]
pub struct ValueId(pub u32);
entity_impl!(ValueId);

/// A value data definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    /// The value is defined by an instruction.
    Inst { inst: InstId, ty: Type },

    /// The value is a function argument.
    Arg { ty: Type, idx: usize },

    /// The value is an immediate.
    Immediate { imm: Immediate, ty: Type },
}

impl Value {
    pub fn ty(&self) -> Type {
        match self {
            Self::Inst { ty, .. } | Self::Arg { ty, .. } | Self::Immediate { ty, .. } => *ty,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Immediate {
    I1(bool),
    I8(i8),
    I32(i32),
    I64(i64),
}

impl Immediate {
    pub fn ty(&self) -> Type {
        match self {
            Self::I1(..) => Type::I1,
            Self::I8(..) => Type::I8,
            Self::I32(..) => Type::I32,
            Self::I64(..) => Type::I64,
        }
    }

    pub fn zero(ty: Type) -> Self {
        Self::from_i64(0, ty)
    }

    pub fn is_zero(self) -> bool {
        self.as_i64() == 0
    }

    /// The branch-condition reading of the immediate: any nonzero value is
    /// taken as true.
    pub fn is_truthy(self) -> bool {
        !self.is_zero()
    }

    pub fn as_i64(self) -> i64 {
        match self {
            Self::I1(val) => val as i64,
            Self::I8(val) => val as i64,
            Self::I32(val) => val as i64,
            Self::I64(val) => val,
        }
    }

    pub fn from_i64(val: i64, ty: Type) -> Self {
        match ty {
            Type::I1 => Self::I1(val & 1 != 0),
            Type::I8 => Self::I8(val as i8),
            Type::I32 => Self::I32(val as i32),
            Type::I64 => Self::I64(val),
            _ => unreachable!("non-integral immediate type"),
        }
    }

    pub fn imm_eq(self, rhs: Self) -> Self {
        self.apply_cmp(rhs, |lhs, rhs| lhs == rhs)
    }

    pub fn imm_ne(self, rhs: Self) -> Self {
        self.apply_cmp(rhs, |lhs, rhs| lhs != rhs)
    }

    pub fn slt(self, rhs: Self) -> Self {
        self.apply_cmp(rhs, |lhs, rhs| lhs < rhs)
    }

    pub fn sgt(self, rhs: Self) -> Self {
        self.apply_cmp(rhs, |lhs, rhs| lhs > rhs)
    }

    pub fn sle(self, rhs: Self) -> Self {
        self.apply_cmp(rhs, |lhs, rhs| lhs <= rhs)
    }

    pub fn sge(self, rhs: Self) -> Self {
        self.apply_cmp(rhs, |lhs, rhs| lhs >= rhs)
    }

    fn apply_binop<F>(self, rhs: Self, f: F) -> Self
    where
        F: FnOnce(i64, i64) -> i64,
    {
        debug_assert_eq!(self.ty(), rhs.ty());
        Self::from_i64(f(self.as_i64(), rhs.as_i64()), self.ty())
    }

    fn apply_cmp<F>(self, rhs: Self, f: F) -> Self
    where
        F: FnOnce(i64, i64) -> bool,
    {
        debug_assert_eq!(self.ty(), rhs.ty());
        Self::I1(f(self.as_i64(), rhs.as_i64()))
    }
}

impl ops::Add for Immediate {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        self.apply_binop(rhs, i64::wrapping_add)
    }
}

impl ops::Sub for Immediate {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        self.apply_binop(rhs, i64::wrapping_sub)
    }
}

impl ops::Mul for Immediate {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        self.apply_binop(rhs, i64::wrapping_mul)
    }
}

impl ops::BitAnd for Immediate {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        self.apply_binop(rhs, ops::BitAnd::bitand)
    }
}

impl ops::BitOr for Immediate {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.apply_binop(rhs, ops::BitOr::bitor)
    }
}

impl ops::BitXor for Immediate {
    type Output = Self;

    fn bitxor(self, rhs: Self) -> Self {
        self.apply_binop(rhs, ops::BitXor::bitxor)
    }
}

impl ops::Not for Immediate {
    type Output = Self;

    fn not(self) -> Self {
        match self {
            Self::I1(val) => Self::I1(!val),
            imm => Self::from_i64(!imm.as_i64(), imm.ty()),
        }
    }
}

impl ops::Neg for Immediate {
    type Output = Self;

    fn neg(self) -> Self {
        Self::from_i64(self.as_i64().wrapping_neg(), self.ty())
    }
}

impl fmt::Display for Immediate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::I1(v) => write!(f, "{}", *v as u8),
            Self::I8(v) => write!(f, "{v}"),
            Self::I32(v) => write!(f, "{v}"),
            Self::I64(v) => write!(f, "{v}"),
        }
    }
}

macro_rules! imm_from_primitive {
    ($prim_ty:ty, $variant:expr) => {
        impl From<$prim_ty> for Immediate {
            fn from(imm: $prim_ty) -> Self {
                $variant(imm)
            }
        }
    };
}

imm_from_primitive!(bool, Immediate::I1);
imm_from_primitive!(i8, Immediate::I8);
imm_from_primitive!(i32, Immediate::I32);
imm_from_primitive!(i64, Immediate::I64);
