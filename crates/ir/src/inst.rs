//! Instruction definitions.
use cranelift_entity::entity_impl;
use smallvec::SmallVec;

use crate::{dfg::BlockId, Type, ValueId};

/// An opaque reference to [`InstData`].
#[derive(Debug, Clone, PartialEq, Eq, Copy, Hash, PartialOrd, Ord)]
pub struct InstId(pub u32);
entity_impl!(InstId);

/// An instruction data definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InstData {
    /// Unary instructions.
    Unary { code: UnaryOp, args: [ValueId; 1] },

    /// Binary instructions.
    Binary { code: BinaryOp, args: [ValueId; 2] },

    /// A branchless conditional value: yields `args[1]` when `args[0]` is
    /// nonzero, `args[2]` otherwise.
    Select { args: [ValueId; 3] },

    /// Allocate a stack slot holding one value of the given type.
    Alloca { ty: Type },

    /// Load the value stored in the slot `args[0]` points to.
    Load { args: [ValueId; 1], ty: Type },

    /// Store the value `args[0]` into the slot `args[1]` points to.
    Store { args: [ValueId; 2] },

    /// Unconditional jump.
    Jump { dests: [BlockId; 1] },

    /// Conditional jump; `dests[0]` is taken when `args[0]` is nonzero.
    Br { args: [ValueId; 1], dests: [BlockId; 2] },

    /// Multi-way jump over an integer scrutinee. Case values reference
    /// interned immediates.
    Switch {
        args: [ValueId; 1],
        default: Option<BlockId>,
        table: SmallVec<[(ValueId, BlockId); 8]>,
    },

    /// Return from the function.
    Return { args: Option<ValueId> },

    /// Raise a non-local transfer (e.g. an exception). A terminator whose
    /// successors cannot be enumerated.
    Raise { args: Option<ValueId> },

    /// Phi function; `values` and `blocks` run in parallel.
    Phi {
        values: SmallVec<[ValueId; 8]>,
        blocks: SmallVec<[BlockId; 8]>,
        ty: Type,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    And,
    Or,
    Xor,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl InstData {
    pub fn unary(code: UnaryOp, arg: ValueId) -> Self {
        Self::Unary { code, args: [arg] }
    }

    pub fn binary(code: BinaryOp, lhs: ValueId, rhs: ValueId) -> Self {
        Self::Binary {
            code,
            args: [lhs, rhs],
        }
    }

    pub fn select(cond: ValueId, then: ValueId, else_: ValueId) -> Self {
        Self::Select {
            args: [cond, then, else_],
        }
    }

    pub fn alloca(ty: Type) -> Self {
        Self::Alloca { ty }
    }

    pub fn load(addr: ValueId, ty: Type) -> Self {
        Self::Load { args: [addr], ty }
    }

    pub fn store(value: ValueId, addr: ValueId) -> Self {
        Self::Store { args: [value, addr] }
    }

    pub fn jump(dest: BlockId) -> Self {
        Self::Jump { dests: [dest] }
    }

    pub fn br(cond: ValueId, nz_dest: BlockId, z_dest: BlockId) -> Self {
        Self::Br {
            args: [cond],
            dests: [nz_dest, z_dest],
        }
    }

    pub fn phi(ty: Type) -> Self {
        Self::Phi {
            values: SmallVec::new(),
            blocks: SmallVec::new(),
            ty,
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Self::Jump { .. }
                | Self::Br { .. }
                | Self::Switch { .. }
                | Self::Return { .. }
                | Self::Raise { .. }
        )
    }

    pub fn is_phi(&self) -> bool {
        matches!(self, Self::Phi { .. })
    }

    pub fn analyze_branch(&self) -> BranchInfo<'_> {
        match self {
            Self::Jump { dests } => BranchInfo::Jump { dest: dests[0] },

            Self::Br { args, dests } => BranchInfo::Br {
                cond: args[0],
                nz_dest: dests[0],
                z_dest: dests[1],
            },

            Self::Switch {
                args,
                default,
                table,
            } => BranchInfo::Switch {
                scrutinee: args[0],
                default: *default,
                table,
            },

            _ => BranchInfo::NotBranch,
        }
    }

    pub fn rewrite_branch_dest(&mut self, from: BlockId, to: BlockId) {
        match self {
            Self::Jump { dests } => rewrite_if_match(&mut dests[0], from, to),

            Self::Br { dests, .. } => {
                for dest in dests.iter_mut() {
                    rewrite_if_match(dest, from, to);
                }
            }

            Self::Switch { default, table, .. } => {
                if let Some(default) = default.as_mut() {
                    rewrite_if_match(default, from, to);
                }
                for (_, dest) in table.iter_mut() {
                    rewrite_if_match(dest, from, to);
                }
            }

            _ => panic!("not a branch"),
        }
    }

    pub fn visit_values(&self, f: &mut impl FnMut(ValueId)) {
        match self {
            Self::Unary { args, .. } | Self::Load { args, .. } => f(args[0]),
            Self::Binary { args, .. } | Self::Store { args } => args.iter().copied().for_each(f),
            Self::Select { args } => args.iter().copied().for_each(f),
            Self::Switch { args, table, .. } => {
                f(args[0]);
                table.iter().for_each(|(value, _)| f(*value));
            }
            Self::Br { args, .. } => f(args[0]),
            Self::Return { args } | Self::Raise { args } => args.iter().copied().for_each(f),
            Self::Phi { values, .. } => values.iter().copied().for_each(f),
            Self::Alloca { .. } | Self::Jump { .. } => {}
        }
    }

    pub fn visit_values_mut(&mut self, f: &mut impl FnMut(&mut ValueId)) {
        match self {
            Self::Unary { args, .. } | Self::Load { args, .. } => f(&mut args[0]),
            Self::Binary { args, .. } | Self::Store { args } => args.iter_mut().for_each(f),
            Self::Select { args } => args.iter_mut().for_each(f),
            Self::Switch { args, table, .. } => {
                f(&mut args[0]);
                table.iter_mut().for_each(|(value, _)| f(value));
            }
            Self::Br { args, .. } => f(&mut args[0]),
            Self::Return { args } | Self::Raise { args } => args.iter_mut().for_each(f),
            Self::Phi { values, .. } => values.iter_mut().for_each(f),
            Self::Alloca { .. } | Self::Jump { .. } => {}
        }
    }
}

fn rewrite_if_match(block: &mut BlockId, from: BlockId, to: BlockId) {
    if *block == from {
        *block = to
    }
}

/// A borrowed view of a terminator's enumerable destinations.
#[derive(Debug, Clone, Copy)]
pub enum BranchInfo<'a> {
    NotBranch,

    Jump {
        dest: BlockId,
    },

    Br {
        cond: ValueId,
        nz_dest: BlockId,
        z_dest: BlockId,
    },

    Switch {
        scrutinee: ValueId,
        default: Option<BlockId>,
        table: &'a [(ValueId, BlockId)],
    },
}

impl BranchInfo<'_> {
    pub fn dests(&self) -> SmallVec<[BlockId; 2]> {
        match self {
            Self::NotBranch => SmallVec::new(),
            Self::Jump { dest } => smallvec::smallvec![*dest],
            Self::Br { nz_dest, z_dest, .. } => smallvec::smallvec![*nz_dest, *z_dest],
            Self::Switch { default, table, .. } => default
                .iter()
                .copied()
                .chain(table.iter().map(|(_, dest)| *dest))
                .collect(),
        }
    }

    pub fn num_dests(&self) -> usize {
        match self {
            Self::NotBranch => 0,
            Self::Jump { .. } => 1,
            Self::Br { .. } => 2,
            Self::Switch { default, table, .. } => table.len() + default.is_some() as usize,
        }
    }
}
