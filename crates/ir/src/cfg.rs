//! Predecessor/successor edges recomputed from block terminators.
use std::collections::BTreeSet;

use cranelift_entity::{packed_option::PackedOption, SecondaryMap};

use crate::{BlockId, Function};

#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct ControlFlowGraph {
    entry: PackedOption<BlockId>,
    blocks: SecondaryMap<BlockId, BlockNode>,
}

impl ControlFlowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compute(&mut self, func: &Function) {
        self.clear();
        self.entry = func.layout.entry_block().into();

        for block in func.layout.iter_block() {
            let Some(last_inst) = func.layout.last_inst_of(block) else {
                continue;
            };
            let Some(branch_info) = func.dfg.branch_info(last_inst) else {
                continue;
            };
            for dest in branch_info.dests() {
                self.add_edge(block, dest);
            }
        }
    }

    pub fn entry(&self) -> Option<BlockId> {
        self.entry.expand()
    }

    pub fn preds_of(&self, block: BlockId) -> impl Iterator<Item = &BlockId> {
        self.blocks[block].preds.iter()
    }

    pub fn succs_of(&self, block: BlockId) -> impl Iterator<Item = &BlockId> {
        self.blocks[block].succs.iter()
    }

    pub fn pred_num_of(&self, block: BlockId) -> usize {
        self.blocks[block].preds.len()
    }

    pub fn succ_num_of(&self, block: BlockId) -> usize {
        self.blocks[block].succs.len()
    }

    /// All blocks reachable from the entry.
    pub fn reachable(&self) -> BTreeSet<BlockId> {
        let mut reachable = BTreeSet::new();
        let mut stack: Vec<_> = self.entry.expand().into_iter().collect();

        while let Some(block) = stack.pop() {
            if !reachable.insert(block) {
                continue;
            }
            stack.extend(self.succs_of(block));
        }

        reachable
    }

    pub fn add_edge(&mut self, from: BlockId, to: BlockId) {
        self.blocks[to].preds.insert(from);
        self.blocks[from].succs.insert(to);
    }

    pub fn clear(&mut self) {
        self.entry = None.into();
        self.blocks.clear();
    }
}

#[derive(Default, Clone, Debug, PartialEq, Eq)]
struct BlockNode {
    preds: BTreeSet<BlockId>,
    succs: BTreeSet<BlockId>,
}
