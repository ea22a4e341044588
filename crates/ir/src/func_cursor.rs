//! A cursor for inserting instructions at a position inside a function.
use crate::{dfg::BlockId, inst::InstData, inst::InstId, Function};

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorLocation {
    At(InstId),
    BlockTop(BlockId),
    BlockBottom(BlockId),
    #[default]
    NoWhere,
}

#[derive(Debug)]
pub struct InstInserter {
    loc: CursorLocation,
}

impl InstInserter {
    pub fn at_location(loc: CursorLocation) -> Self {
        Self { loc }
    }

    pub fn loc(&self) -> CursorLocation {
        self.loc
    }

    pub fn set_location(&mut self, loc: CursorLocation) {
        self.loc = loc;
    }

    pub fn block(&self, func: &Function) -> Option<BlockId> {
        match self.loc {
            CursorLocation::At(inst) => Some(func.layout.inst_block(inst)),
            CursorLocation::BlockTop(block) | CursorLocation::BlockBottom(block) => Some(block),
            CursorLocation::NoWhere => None,
        }
    }

    pub fn expect_block(&self, func: &Function) -> BlockId {
        self.block(func).expect("cursor loc points to `NoWhere`")
    }

    /// Inserts `inst` at the cursor position and moves the cursor onto it.
    pub fn insert_inst(&mut self, func: &mut Function, inst: InstId) {
        match self.loc {
            CursorLocation::At(at) => func.layout.insert_inst_after(inst, at),
            CursorLocation::BlockTop(block) => func.layout.prepend_inst(inst, block),
            CursorLocation::BlockBottom(block) => func.layout.append_inst(inst, block),
            CursorLocation::NoWhere => panic!("cursor loc points to `NoWhere`"),
        }
        self.loc = CursorLocation::At(inst);
    }

    pub fn insert_inst_data(&mut self, func: &mut Function, data: InstData) -> InstId {
        let inst = func.dfg.make_inst(data);
        self.insert_inst(func, inst);
        inst
    }
}
