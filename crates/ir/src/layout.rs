//! Block order and instruction order inside a function, kept as intrusive
//! doubly-linked lists over entity maps.
use cranelift_entity::SecondaryMap;

use crate::{dfg::BlockId, inst::InstId};

#[derive(Debug, Clone, Default)]
pub struct Layout {
    blocks: SecondaryMap<BlockId, BlockNode>,
    insts: SecondaryMap<InstId, InstNode>,
    entry_block: Option<BlockId>,
    last_block: Option<BlockId>,
}

impl Layout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry_block(&self) -> Option<BlockId> {
        self.entry_block
    }

    pub fn last_block(&self) -> Option<BlockId> {
        self.last_block
    }

    pub fn is_block_inserted(&self, block: BlockId) -> bool {
        Some(block) == self.entry_block || self.blocks[block] != BlockNode::default()
    }

    pub fn is_inst_inserted(&self, inst: InstId) -> bool {
        self.insts[inst] != InstNode::default()
    }

    pub fn prev_block_of(&self, block: BlockId) -> Option<BlockId> {
        debug_assert!(self.is_block_inserted(block));
        self.blocks[block].prev
    }

    pub fn next_block_of(&self, block: BlockId) -> Option<BlockId> {
        debug_assert!(self.is_block_inserted(block));
        self.blocks[block].next
    }

    pub fn first_inst_of(&self, block: BlockId) -> Option<InstId> {
        debug_assert!(self.is_block_inserted(block));
        self.blocks[block].first_inst
    }

    pub fn last_inst_of(&self, block: BlockId) -> Option<InstId> {
        debug_assert!(self.is_block_inserted(block));
        self.blocks[block].last_inst
    }

    pub fn prev_inst_of(&self, inst: InstId) -> Option<InstId> {
        debug_assert!(self.is_inst_inserted(inst));
        self.insts[inst].prev
    }

    pub fn next_inst_of(&self, inst: InstId) -> Option<InstId> {
        debug_assert!(self.is_inst_inserted(inst));
        self.insts[inst].next
    }

    pub fn inst_block(&self, inst: InstId) -> BlockId {
        debug_assert!(self.is_inst_inserted(inst));
        self.insts[inst].block.unwrap()
    }

    pub fn iter_block(&self) -> impl Iterator<Item = BlockId> + '_ {
        std::iter::successors(self.entry_block, |block| self.blocks[*block].next)
    }

    pub fn iter_inst(&self, block: BlockId) -> impl Iterator<Item = InstId> + '_ {
        debug_assert!(self.is_block_inserted(block));
        std::iter::successors(self.blocks[block].first_inst, |inst| self.insts[*inst].next)
    }

    pub fn append_block(&mut self, block: BlockId) {
        debug_assert!(!self.is_block_inserted(block));

        let mut node = BlockNode::default();
        if let Some(last_block) = self.last_block {
            self.blocks[last_block].next = Some(block);
            node.prev = Some(last_block);
        } else {
            self.entry_block = Some(block);
        }

        self.blocks[block] = node;
        self.last_block = Some(block);
    }

    pub fn insert_block_after(&mut self, block: BlockId, after: BlockId) {
        debug_assert!(self.is_block_inserted(after));
        debug_assert!(!self.is_block_inserted(block));

        let mut node = BlockNode::default();
        match self.blocks[after].next {
            Some(next) => {
                node.next = Some(next);
                self.blocks[next].prev = Some(block);
            }
            None => self.last_block = Some(block),
        }
        node.prev = Some(after);
        self.blocks[after].next = Some(block);
        self.blocks[block] = node;
    }

    pub fn remove_block(&mut self, block: BlockId) {
        debug_assert!(self.is_block_inserted(block));
        debug_assert!(self.blocks[block].first_inst.is_none());

        let BlockNode { prev, next, .. } = self.blocks[block];
        match prev {
            Some(prev) => self.blocks[prev].next = next,
            None => self.entry_block = next,
        }
        match next {
            Some(next) => self.blocks[next].prev = prev,
            None => self.last_block = prev,
        }

        self.blocks[block] = BlockNode::default();
    }

    pub fn append_inst(&mut self, inst: InstId, block: BlockId) {
        debug_assert!(self.is_block_inserted(block));
        debug_assert!(!self.is_inst_inserted(inst));

        let block_node = &mut self.blocks[block];
        let mut node = InstNode::with_block(block);

        if let Some(last_inst) = block_node.last_inst {
            node.prev = Some(last_inst);
            self.insts[last_inst].next = Some(inst);
        } else {
            block_node.first_inst = Some(inst);
        }

        block_node.last_inst = Some(inst);
        self.insts[inst] = node;
    }

    pub fn prepend_inst(&mut self, inst: InstId, block: BlockId) {
        debug_assert!(self.is_block_inserted(block));
        debug_assert!(!self.is_inst_inserted(inst));

        let block_node = &mut self.blocks[block];
        let mut node = InstNode::with_block(block);

        if let Some(first_inst) = block_node.first_inst {
            node.next = Some(first_inst);
            self.insts[first_inst].prev = Some(inst);
        } else {
            block_node.last_inst = Some(inst);
        }

        block_node.first_inst = Some(inst);
        self.insts[inst] = node;
    }

    pub fn insert_inst_before(&mut self, inst: InstId, before: InstId) {
        debug_assert!(self.is_inst_inserted(before));
        debug_assert!(!self.is_inst_inserted(inst));

        let block = self.insts[before].block.unwrap();
        let mut node = InstNode::with_block(block);

        match self.insts[before].prev {
            Some(prev) => {
                node.prev = Some(prev);
                self.insts[prev].next = Some(inst);
            }
            None => self.blocks[block].first_inst = Some(inst),
        }
        node.next = Some(before);
        self.insts[before].prev = Some(inst);
        self.insts[inst] = node;
    }

    pub fn insert_inst_after(&mut self, inst: InstId, after: InstId) {
        debug_assert!(self.is_inst_inserted(after));
        debug_assert!(!self.is_inst_inserted(inst));

        let block = self.insts[after].block.unwrap();
        let mut node = InstNode::with_block(block);

        match self.insts[after].next {
            Some(next) => {
                node.next = Some(next);
                self.insts[next].prev = Some(inst);
            }
            None => self.blocks[block].last_inst = Some(inst),
        }
        node.prev = Some(after);
        self.insts[after].next = Some(inst);
        self.insts[inst] = node;
    }

    /// Unlinks `inst` from its block. The instruction can be re-inserted at
    /// another position afterwards.
    pub fn remove_inst(&mut self, inst: InstId) {
        debug_assert!(self.is_inst_inserted(inst));

        let InstNode { block, prev, next } = self.insts[inst];
        let block_node = &mut self.blocks[block.unwrap()];
        match prev {
            Some(prev) => self.insts[prev].next = next,
            None => block_node.first_inst = next,
        }
        match next {
            Some(next) => self.insts[next].prev = prev,
            None => block_node.last_inst = prev,
        }

        self.insts[inst] = InstNode::default();
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct BlockNode {
    prev: Option<BlockId>,
    next: Option<BlockId>,
    first_inst: Option<InstId>,
    last_inst: Option<InstId>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct InstNode {
    block: Option<BlockId>,
    prev: Option<InstId>,
    next: Option<InstId>,
}

impl InstNode {
    fn with_block(block: BlockId) -> Self {
        Self {
            block: Some(block),
            ..Self::default()
        }
    }
}
