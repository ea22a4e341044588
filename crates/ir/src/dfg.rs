//! The data flow graph: arenas for blocks, instructions and values, plus the
//! use-def index that transforms rely on.
use std::collections::BTreeSet;

use cranelift_entity::{entity_impl, packed_option::PackedOption, PrimaryMap, SecondaryMap};
use rustc_hash::FxHashMap;

use crate::{
    inst::{BranchInfo, InstData, InstId},
    Immediate, Type, Value, ValueId,
};

#[derive(Debug, Clone, Default)]
pub struct DataFlowGraph {
    #[doc(hidden)]
    pub blocks: PrimaryMap<BlockId, Block>,
    #[doc(hidden)]
    pub values: PrimaryMap<ValueId, Value>,
    insts: PrimaryMap<InstId, InstData>,
    inst_results: SecondaryMap<InstId, PackedOption<ValueId>>,
    immediates: FxHashMap<Immediate, ValueId>,
    users: SecondaryMap<ValueId, BTreeSet<InstId>>,
}

impl DataFlowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn make_block(&mut self) -> BlockId {
        self.blocks.push(Block::new())
    }

    pub fn make_value(&mut self, value: Value) -> ValueId {
        self.values.push(value)
    }

    pub fn make_inst(&mut self, data: InstData) -> InstId {
        let inst = self.insts.push(data);
        self.attach_user(inst);
        inst
    }

    /// Interns `imm` and returns a `ValueId` for it; immediates are shared
    /// across all their uses.
    pub fn make_imm_value<Imm>(&mut self, imm: Imm) -> ValueId
    where
        Imm: Into<Immediate>,
    {
        let imm: Immediate = imm.into();
        if let Some(&value) = self.immediates.get(&imm) {
            return value;
        }

        let ty = imm.ty();
        let value = self.make_value(Value::Immediate { imm, ty });
        self.immediates.insert(imm, value);
        value
    }

    pub fn make_arg_value(&mut self, ty: Type, idx: usize) -> ValueId {
        self.make_value(Value::Arg { ty, idx })
    }

    /// Creates a result value of type `ty` for `inst` and attaches it.
    pub fn make_result(&mut self, inst: InstId, ty: Type) -> ValueId {
        let result = self.make_value(Value::Inst { inst, ty });
        self.attach_result(inst, result);
        result
    }

    pub fn attach_result(&mut self, inst: InstId, value: ValueId) {
        debug_assert!(self.inst_results[inst].is_none());
        self.inst_results[inst] = value.into();
    }

    pub fn inst(&self, inst: InstId) -> &InstData {
        &self.insts[inst]
    }

    /// Replaces the data of `inst` in place, keeping the use-def index
    /// consistent.
    pub fn replace_inst(&mut self, inst: InstId, new: InstData) {
        self.untrack_inst(inst);
        self.insts[inst] = new;
        self.attach_user(inst);
    }

    pub fn value(&self, value: ValueId) -> &Value {
        &self.values[value]
    }

    pub fn value_ty(&self, value: ValueId) -> Type {
        self.values[value].ty()
    }

    pub fn value_inst(&self, value: ValueId) -> Option<InstId> {
        match self.values[value] {
            Value::Inst { inst, .. } => Some(inst),
            _ => None,
        }
    }

    pub fn inst_result(&self, inst: InstId) -> Option<ValueId> {
        self.inst_results[inst].expand()
    }

    /// Returns all instructions that use `value` as an operand.
    pub fn users(&self, value: ValueId) -> impl Iterator<Item = &InstId> {
        self.users[value].iter()
    }

    pub fn users_num(&self, value: ValueId) -> usize {
        self.users[value].len()
    }

    pub fn attach_user(&mut self, inst: InstId) {
        let data = &self.insts[inst];
        let mut used = Vec::new();
        data.visit_values(&mut |value| used.push(value));
        for value in used {
            self.users[value].insert(inst);
        }
    }

    pub fn untrack_inst(&mut self, inst: InstId) {
        let data = &self.insts[inst];
        let mut used = Vec::new();
        data.visit_values(&mut |value| used.push(value));
        for value in used {
            self.users[value].remove(&inst);
        }
    }

    /// Rewrites every occurrence of `from` among the operands of `inst` to
    /// `to`.
    pub fn rewrite_inst_arg(&mut self, inst: InstId, from: ValueId, to: ValueId) {
        self.untrack_inst(inst);
        self.insts[inst].visit_values_mut(&mut |value| {
            if *value == from {
                *value = to;
            }
        });
        self.attach_user(inst);
    }

    /// Rewrites the phi argument flowing in along `block` to `to`.
    pub fn rewrite_phi_arg(&mut self, inst: InstId, block: BlockId, to: ValueId) {
        self.untrack_inst(inst);
        let InstData::Phi { values, blocks, .. } = &mut self.insts[inst] else {
            panic!("{inst:?} is not a phi");
        };
        let pos = blocks
            .iter()
            .position(|b| *b == block)
            .unwrap_or_else(|| panic!("phi {inst:?} has no argument for {block:?}"));
        values[pos] = to;
        self.attach_user(inst);
    }

    /// Redirects all uses of `value` to `alias`.
    pub fn replace_all_uses(&mut self, value: ValueId, alias: ValueId) {
        let users = std::mem::take(&mut self.users[value]);
        for &inst in &users {
            self.insts[inst].visit_values_mut(&mut |user_value| {
                if *user_value == value {
                    *user_value = alias;
                }
            });
        }
        self.users[alias].extend(users);
    }

    pub fn append_phi_arg(&mut self, inst: InstId, value: ValueId, block: BlockId) {
        let InstData::Phi { values, blocks, .. } = &mut self.insts[inst] else {
            panic!("{inst:?} is not a phi");
        };
        values.push(value);
        blocks.push(block);
        self.users[value].insert(inst);
    }

    /// Retargets every incoming edge of a phi that flows in along `from` to
    /// flow in along `to`. Incoming values are untouched.
    pub fn rewrite_phi_incoming_block(&mut self, inst: InstId, from: BlockId, to: BlockId) {
        let InstData::Phi { blocks, .. } = &mut self.insts[inst] else {
            panic!("{inst:?} is not a phi");
        };
        for block in blocks.iter_mut() {
            if *block == from {
                *block = to;
            }
        }
    }

    /// Returns the `(incoming value, incoming block)` pairs of a phi.
    pub fn phi_incoming(&self, inst: InstId) -> Vec<(ValueId, BlockId)> {
        let InstData::Phi { values, blocks, .. } = &self.insts[inst] else {
            panic!("{inst:?} is not a phi");
        };
        values.iter().copied().zip(blocks.iter().copied()).collect()
    }

    pub fn branch_info(&self, inst: InstId) -> Option<BranchInfo<'_>> {
        match self.insts[inst].analyze_branch() {
            BranchInfo::NotBranch => None,
            info => Some(info),
        }
    }

    pub fn is_terminator(&self, inst: InstId) -> bool {
        self.insts[inst].is_terminator()
    }

    pub fn is_phi(&self, inst: InstId) -> bool {
        self.insts[inst].is_phi()
    }

    /// A terminator with no enumerable destinations (`return` or `raise`).
    pub fn is_exit(&self, inst: InstId) -> bool {
        self.is_terminator(inst) && self.branch_info(inst).is_none()
    }
}

/// An opaque reference to [`Block`].
#[derive(Clone, PartialEq, Eq, Copy, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);
entity_impl!(BlockId, "block");

/// A block data definition. Block contents and ordering are managed by
/// [`crate::Layout`].
#[derive(Debug, Clone, Default)]
pub struct Block {}

impl Block {
    pub fn new() -> Self {
        Self::default()
    }
}
