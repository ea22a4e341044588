//! Value-lifetime repair for CFG-destroying transforms.
//!
//! SSA values are directly usable only inside their defining block or in
//! blocks it dominates. A transform that rewires every edge through a
//! dispatcher invalidates that rule, so any value whose live range crosses a
//! block boundary is demoted to a stack slot: the definition gains a spill
//! store, every foreign use gains a reload, and phis become one slot written
//! at each incoming edge's source. The repair loops until a scan finds
//! nothing left to demote.
use ostinato_ir::{Function, InstData, InstId, Type, ValueId};

/// Demotion converges in one or two rounds; anything past this bound is a
/// defect, not a large input.
const MAX_ROUNDS: usize = 8;

pub fn repair_value_locality(func: &mut Function) {
    let entry = func.layout.entry_block().expect("function has no entry block");

    for round in 0.. {
        assert!(
            round < MAX_ROUNDS,
            "value demotion did not reach a fixed point within {MAX_ROUNDS} rounds"
        );

        let mut phis = Vec::new();
        let mut regs = Vec::new();
        for block in func.layout.iter_block() {
            for inst in func.layout.iter_inst(block) {
                if func.dfg.is_phi(inst) {
                    phis.push(inst);
                    continue;
                }
                let entry_slot =
                    matches!(func.dfg.inst(inst), InstData::Alloca { .. }) && block == entry;
                if !entry_slot && value_escapes(func, inst) {
                    regs.push(inst);
                }
            }
        }

        if regs.is_empty() && phis.is_empty() {
            break;
        }

        for inst in regs {
            demote_reg_to_slot(func, inst);
        }
        for phi in phis {
            demote_phi_to_slot(func, phi);
        }
    }
}

/// Whether the result of `inst` is used outside its defining block or by a
/// phi.
fn value_escapes(func: &Function, inst: InstId) -> bool {
    let Some(result) = func.dfg.inst_result(inst) else {
        return false;
    };
    let block = func.layout.inst_block(inst);
    func.dfg
        .users(result)
        .any(|&user| func.dfg.is_phi(user) || func.layout.inst_block(user) != block)
}

/// Demotes an instruction result to a stack slot: spill after the
/// definition, reload before each foreign use. Uses inside the defining
/// block keep the register directly.
fn demote_reg_to_slot(func: &mut Function, inst: InstId) {
    let result = func
        .dfg
        .inst_result(inst)
        .expect("escaping instruction must produce a value");
    let ty = func.dfg.value_ty(result);
    let def_block = func.layout.inst_block(inst);

    let slot = alloc_entry_slot(func, ty);

    let spill = func.dfg.make_inst(InstData::store(result, slot));
    func.layout.insert_inst_after(spill, inst);

    let users: Vec<InstId> = func
        .dfg
        .users(result)
        .copied()
        .filter(|&user| user != spill)
        .collect();

    for user in users {
        if func.dfg.is_phi(user) {
            // A phi consumes the value on its incoming edge, so the reload
            // belongs at the end of the edge's source block.
            for (value, pred) in func.dfg.phi_incoming(user) {
                if value != result {
                    continue;
                }
                let pred_term = func.layout.last_inst_of(pred).unwrap();
                let reloaded = reload_before(func, slot, ty, pred_term);
                func.dfg.rewrite_phi_arg(user, pred, reloaded);
            }
        } else if func.layout.inst_block(user) != def_block {
            let reloaded = reload_before(func, slot, ty, user);
            func.dfg.rewrite_inst_arg(user, result, reloaded);
        }
    }
}

/// Demotes a phi to a stack slot written at each incoming edge's source and
/// read once at the phi's position, then removes the phi.
fn demote_phi_to_slot(func: &mut Function, phi: InstId) {
    let result = func.dfg.inst_result(phi).expect("phi must produce a value");
    let ty = func.dfg.value_ty(result);

    let slot = alloc_entry_slot(func, ty);

    for (value, pred) in func.dfg.phi_incoming(phi) {
        let pred_term = func.layout.last_inst_of(pred).unwrap();
        let store = func.dfg.make_inst(InstData::store(value, slot));
        func.layout.insert_inst_before(store, pred_term);
    }

    let reload = func.dfg.make_inst(InstData::load(slot, ty));
    func.layout.insert_inst_after(reload, phi);
    let reloaded = func.dfg.make_result(reload, ty);
    func.dfg.replace_all_uses(result, reloaded);

    func.dfg.untrack_inst(phi);
    func.layout.remove_inst(phi);
}

/// Allocates a demotion slot at the head of the entry block, so the slot's
/// address is defined before any spill, including spills of values the
/// entry itself defines.
fn alloc_entry_slot(func: &mut Function, ty: Type) -> ValueId {
    let entry = func.layout.entry_block().unwrap();
    let slot = func.dfg.make_inst(InstData::alloca(ty));
    func.layout.prepend_inst(slot, entry);
    func.dfg.make_result(slot, Type::Ptr)
}

fn reload_before(func: &mut Function, slot: ValueId, ty: Type, before: InstId) -> ValueId {
    let reload = func.dfg.make_inst(InstData::load(slot, ty));
    func.layout.insert_inst_before(reload, before);
    func.dfg.make_result(reload, ty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ostinato_ir::{BinaryOp, FunctionBuilder, Signature};

    /// v defined in the entry, used two blocks later.
    fn cross_block_use() -> Function {
        let sig = Signature::new("cross", &[Type::I32], Type::I32);
        let mut builder = FunctionBuilder::new(sig);

        let b0 = builder.append_block();
        let b1 = builder.append_block();

        let arg0 = builder.args()[0];

        builder.switch_to_block(b0);
        let one = builder.make_imm_value(1i32);
        let v = builder.insert_inst(InstData::binary(BinaryOp::Add, arg0, one), Type::I32);
        builder.insert_inst_no_result(InstData::jump(b1));

        builder.switch_to_block(b1);
        builder.insert_inst_no_result(InstData::Return { args: Some(v) });

        builder.finish()
    }

    #[test]
    fn escaping_value_gets_slot() {
        let mut func = cross_block_use();
        repair_value_locality(&mut func);

        // One slot, one spill in the entry, one reload before the use.
        let entry = func.layout.entry_block().unwrap();
        let entry_insts: Vec<_> = func.layout.iter_inst(entry).collect();
        assert!(entry_insts
            .iter()
            .any(|inst| matches!(func.dfg.inst(*inst), InstData::Alloca { .. })));
        assert!(entry_insts
            .iter()
            .any(|inst| matches!(func.dfg.inst(*inst), InstData::Store { .. })));

        // Slot addresses are shared across blocks; everything else must be
        // local now.
        for block in func.layout.iter_block() {
            for inst in func.layout.iter_inst(block) {
                if block == entry && matches!(func.dfg.inst(inst), InstData::Alloca { .. }) {
                    continue;
                }
                assert!(!value_escapes(&func, inst), "{inst:?} still escapes");
            }
        }
    }

    #[test]
    fn repair_is_idempotent() {
        let mut func = cross_block_use();
        repair_value_locality(&mut func);
        let after_first = ostinato_ir::dump_function(&func);

        repair_value_locality(&mut func);
        assert_eq!(after_first, ostinato_ir::dump_function(&func));
    }
}
