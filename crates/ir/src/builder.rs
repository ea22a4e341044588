//! A builder for constructing functions block by block.
use crate::{
    func_cursor::{CursorLocation, InstInserter},
    inst::InstData,
    BlockId, Function, Immediate, Signature, Type, ValueId,
};

pub struct FunctionBuilder {
    pub func: Function,
    cursor: InstInserter,
}

impl FunctionBuilder {
    pub fn new(sig: Signature) -> Self {
        Self {
            func: Function::new(sig),
            cursor: InstInserter::at_location(CursorLocation::NoWhere),
        }
    }

    pub fn append_block(&mut self) -> BlockId {
        let block = self.func.dfg.make_block();
        self.func.layout.append_block(block);
        block
    }

    pub fn switch_to_block(&mut self, block: BlockId) {
        self.cursor.set_location(CursorLocation::BlockBottom(block));
    }

    pub fn current_block(&self) -> Option<BlockId> {
        self.cursor.block(&self.func)
    }

    pub fn args(&self) -> &[ValueId] {
        &self.func.arg_values
    }

    pub fn make_imm_value<Imm>(&mut self, imm: Imm) -> ValueId
    where
        Imm: Into<Immediate>,
    {
        self.func.dfg.make_imm_value(imm)
    }

    /// Inserts `data` at the cursor and returns a result value of type
    /// `ret_ty` attached to it.
    pub fn insert_inst(&mut self, data: InstData, ret_ty: Type) -> ValueId {
        let inst = self.cursor.insert_inst_data(&mut self.func, data);
        self.func.dfg.make_result(inst, ret_ty)
    }

    /// Inserts `data` at the cursor for instructions that produce no result.
    pub fn insert_inst_no_result(&mut self, data: InstData) {
        self.cursor.insert_inst_data(&mut self.func, data);
    }

    /// Inserts a phi with the given incoming `(value, block)` pairs.
    pub fn insert_phi(&mut self, incoming: &[(ValueId, BlockId)], ty: Type) -> ValueId {
        let mut phi = InstData::phi(ty);
        let InstData::Phi { values, blocks, .. } = &mut phi else {
            unreachable!();
        };
        for (value, block) in incoming {
            values.push(*value);
            blocks.push(*block);
        }
        self.insert_inst(phi, ty)
    }

    pub fn finish(self) -> Function {
        if cfg!(debug_assertions) {
            for block in self.func.layout.iter_block() {
                let last_inst = self.func.layout.last_inst_of(block);
                debug_assert!(
                    last_inst.is_some_and(|inst| self.func.dfg.is_terminator(inst)),
                    "all blocks must end with a terminator: `{block}` does not"
                );
            }
        }

        self.func
    }
}
