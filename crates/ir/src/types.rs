//! Value and stack-slot types.
use std::fmt;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Type {
    #[default]
    Unit,
    I1,
    I8,
    I32,
    I64,
    /// A pointer to a stack slot produced by `alloca`.
    Ptr,
}

impl Type {
    pub fn is_integral(self) -> bool {
        matches!(self, Self::I1 | Self::I8 | Self::I32 | Self::I64)
    }

    pub fn is_pointer(self) -> bool {
        matches!(self, Self::Ptr)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::Unit => "unit",
            Self::I1 => "i1",
            Self::I8 => "i8",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::Ptr => "ptr",
        };
        write!(f, "{s}")
    }
}
