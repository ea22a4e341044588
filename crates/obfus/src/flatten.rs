//! Control-flow flattening.
//!
//! Rewrites a function into dispatch-loop form: one mutable i32 state slot,
//! one dispatcher block switching over it, and every original block reduced
//! to a switch case that writes the state of its logical successor and jumps
//! back to the dispatcher. The function's observable behavior is preserved;
//! only its static shape is erased.
//!
//! The pass requires the upstream normalizer contract: no `switch`
//! terminators on input (the dispatcher's own switch is the only multi-way
//! branch in the output). Functions containing non-local transfers
//! (`raise`) are declined untouched.
use indexmap::IndexMap;
use ostinato_ir::{BlockId, BranchInfo, Function, InstData, Type, ValueId};

use crate::demote::repair_value_locality;

#[derive(Debug, Default)]
pub struct ControlFlowFlattening {}

impl ControlFlowFlattening {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flattens `func` in place. Returns `false` (leaving the function
    /// unmodified) when the function is not eligible.
    pub fn run(&mut self, func: &mut Function) -> bool {
        if !is_applicable(func) {
            return false;
        }

        let entry = func.layout.entry_block().unwrap();
        let mut case_blocks: Vec<_> = func
            .layout
            .iter_block()
            .filter(|block| *block != entry)
            .collect();

        // The dispatcher state must be initialized exactly once, before any
        // branching, so a branching entry is carved in two and the carved-off
        // part becomes an ordinary case.
        let init_target = if let Some(carved) = split_branching_entry(func, entry) {
            case_blocks.insert(0, carved);
            Some(carved)
        } else {
            func.layout
                .last_inst_of(entry)
                .and_then(|term| func.dfg.branch_info(term))
                .and_then(|info| match info {
                    BranchInfo::Jump { dest } => Some(dest),
                    _ => None,
                })
        };

        // Only the terminator goes; computations left in the entry survive.
        if let Some(term) = func.layout.last_inst_of(entry) {
            if func.dfg.is_terminator(term) {
                func.dfg.untrack_inst(term);
                func.layout.remove_inst(term);
            }
        }

        // The state starts at the code of the entry's original successor, so
        // dispatch never depends on block layout order.
        let init_code = init_target
            .and_then(|dest| case_blocks.iter().position(|block| *block == dest))
            .unwrap_or(0) as i32;

        let ctx = DispatchCtx::build(func, entry, &case_blocks, init_code);

        for &block in &case_blocks {
            rewrite_terminator(func, block, &ctx);
        }

        // Flattening destroyed the dominance structure SSA values rely on;
        // demote everything that now crosses block boundaries.
        repair_value_locality(func);

        true
    }
}

/// Transform-local state of one flattening invocation.
struct DispatchCtx {
    dispatcher: BlockId,
    state_slot: ValueId,
    /// Original block -> interned case-code immediate, registered in
    /// dispatch order.
    cases: IndexMap<BlockId, ValueId>,
}

impl DispatchCtx {
    /// Installs the state slot, its initialization to `init_code`, the
    /// dispatcher block, and the case table; the entry is left ending in a
    /// jump to the dispatcher.
    fn build(func: &mut Function, entry: BlockId, case_blocks: &[BlockId], init_code: i32) -> Self {
        let slot_inst = func.dfg.make_inst(InstData::alloca(Type::I32));
        func.layout.append_inst(slot_inst, entry);
        let state_slot = func.dfg.make_result(slot_inst, Type::Ptr);

        let init_imm = func.dfg.make_imm_value(init_code);
        let init = func.dfg.make_inst(InstData::store(init_imm, state_slot));
        func.layout.append_inst(init, entry);

        let dispatcher = func.dfg.make_block();
        func.layout.insert_block_after(dispatcher, entry);

        let load = func.dfg.make_inst(InstData::load(state_slot, Type::I32));
        func.layout.append_inst(load, dispatcher);
        let state = func.dfg.make_result(load, Type::I32);

        let jump = func.dfg.make_inst(InstData::jump(dispatcher));
        func.layout.append_inst(jump, entry);

        let mut cases = IndexMap::new();
        let mut table = smallvec::SmallVec::new();
        for (idx, &block) in case_blocks.iter().enumerate() {
            let code = func.dfg.make_imm_value(idx as i32);
            cases.insert(block, code);
            table.push((code, block));
        }

        // An unmatched state value self-loops on the dispatcher rather than
        // falling into an arbitrary case; it is never reached by construction.
        let switch = func.dfg.make_inst(InstData::Switch {
            args: [state],
            default: Some(dispatcher),
            table,
        });
        func.layout.append_inst(switch, dispatcher);

        Self {
            dispatcher,
            state_slot,
            cases,
        }
    }

    fn case_code(&self, block: BlockId) -> ValueId {
        *self
            .cases
            .get(&block)
            .unwrap_or_else(|| panic!("successor {block} has no registered dispatch case"))
    }
}

fn is_applicable(func: &Function) -> bool {
    let mut num_blocks = 0;
    for block in func.layout.iter_block() {
        num_blocks += 1;
        let Some(term) = func.layout.last_inst_of(block) else {
            continue;
        };
        if matches!(func.dfg.inst(term), InstData::Raise { .. }) {
            return false;
        }
        debug_assert!(
            !matches!(func.dfg.inst(term), InstData::Switch { .. }),
            "multi-way branches must be lowered before flattening"
        );
    }

    num_blocks > 1
}

/// Carves a branching entry in two and returns the carved-off block.
///
/// The terminator moves to the new block, together with the single
/// instruction preceding it when there is one, so a condition's computation
/// is not separated from its use.
fn split_branching_entry(func: &mut Function, entry: BlockId) -> Option<BlockId> {
    let term = func.layout.last_inst_of(entry)?;
    if func.dfg.branch_info(term).map_or(true, |info| info.num_dests() <= 1) {
        return None;
    }

    let mut moved = smallvec::SmallVec::<[_; 2]>::new();
    if func.layout.first_inst_of(entry) != Some(term) {
        moved.push(func.layout.prev_inst_of(term).unwrap());
    }
    moved.push(term);

    let carved = func.dfg.make_block();
    func.layout.insert_block_after(carved, entry);
    for inst in moved {
        func.layout.remove_inst(inst);
        func.layout.append_inst(inst, carved);
    }

    // Successor phis now receive control from the carved-off block.
    let dests = func.dfg.branch_info(term).unwrap().dests();
    for dest in dests {
        let phis: Vec<_> = func
            .layout
            .iter_inst(dest)
            .filter(|inst| func.dfg.is_phi(*inst))
            .collect();
        for phi in phis {
            func.dfg.rewrite_phi_incoming_block(phi, entry, carved);
        }
    }

    Some(carved)
}

/// Replaces a case block's terminator with a state write followed by a jump
/// back to the dispatcher.
fn rewrite_terminator(func: &mut Function, block: BlockId, ctx: &DispatchCtx) {
    let term = func
        .layout
        .last_inst_of(block)
        .expect("flattened block has no terminator");

    enum Target {
        Exit,
        One(BlockId),
        Two(ValueId, BlockId, BlockId),
    }

    let target = match func.dfg.branch_info(term) {
        None | Some(BranchInfo::NotBranch) => Target::Exit,
        Some(BranchInfo::Jump { dest }) => Target::One(dest),
        Some(BranchInfo::Br {
            cond,
            nz_dest,
            z_dest,
        }) => Target::Two(cond, nz_dest, z_dest),
        Some(BranchInfo::Switch { .. }) => panic!("multi-way branch survived until flattening"),
    };

    let stored = match target {
        // Exits never return to the dispatcher.
        Target::Exit => return,

        Target::One(dest) => ctx.case_code(dest),

        Target::Two(cond, nz_dest, z_dest) => {
            // The state write must execute unconditionally, so the branch
            // decision becomes a branchless select over the two case codes.
            let code_nz = ctx.case_code(nz_dest);
            let code_z = ctx.case_code(z_dest);
            let select = func.dfg.make_inst(InstData::select(cond, code_nz, code_z));
            func.layout.insert_inst_before(select, term);
            func.dfg.make_result(select, Type::I32)
        }
    };

    func.dfg
        .replace_inst(term, InstData::store(stored, ctx.state_slot));
    let jump = func.dfg.make_inst(InstData::jump(ctx.dispatcher));
    func.layout.append_inst(jump, block);
}
