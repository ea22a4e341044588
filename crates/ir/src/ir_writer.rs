//! Plain-text rendering of functions, used for debugging and for
//! structural-equality assertions in tests.
use std::fmt::Write;

use crate::{
    inst::{InstData, InstId},
    Function, Type, Value, ValueId,
};

/// Renders `func` into the canonical text form.
pub fn dump_function(func: &Function) -> String {
    let mut w = String::new();

    write!(w, "func %{}(", func.sig.name()).unwrap();
    for (i, arg) in func.arg_values.iter().enumerate() {
        if i != 0 {
            w.push_str(", ");
        }
        write!(w, "v{}.{}", arg.0, func.dfg.value_ty(*arg)).unwrap();
    }
    w.push(')');
    if func.sig.ret_ty() != Type::Unit {
        write!(w, " -> {}", func.sig.ret_ty()).unwrap();
    }
    w.push_str(" {\n");

    let mut first = true;
    for block in func.layout.iter_block() {
        if !first {
            w.push('\n');
        }
        first = false;

        writeln!(w, "    {block}:").unwrap();
        for inst in func.layout.iter_inst(block) {
            w.push_str("        ");
            write_inst(&mut w, func, inst);
            w.push('\n');
        }
    }

    w.push_str("}\n");
    w
}

fn write_inst(w: &mut String, func: &Function, inst: InstId) {
    if let Some(result) = func.dfg.inst_result(inst) {
        write!(w, "v{}.{} = ", result.0, func.dfg.value_ty(result)).unwrap();
    }

    match func.dfg.inst(inst) {
        InstData::Unary { code, args } => {
            let code = format!("{code:?}").to_lowercase();
            write!(w, "{code} {};", val(func, args[0])).unwrap();
        }
        InstData::Binary { code, args } => {
            let code = format!("{code:?}").to_lowercase();
            write!(w, "{code} {} {};", val(func, args[0]), val(func, args[1])).unwrap();
        }
        InstData::Select { args } => write!(
            w,
            "select {} {} {};",
            val(func, args[0]),
            val(func, args[1]),
            val(func, args[2])
        )
        .unwrap(),
        InstData::Alloca { ty } => write!(w, "alloca {ty};").unwrap(),
        InstData::Load { args, .. } => write!(w, "load {};", val(func, args[0])).unwrap(),
        InstData::Store { args } => {
            write!(w, "store {} {};", val(func, args[0]), val(func, args[1])).unwrap()
        }
        InstData::Jump { dests } => write!(w, "jump {};", dests[0]).unwrap(),
        InstData::Br { args, dests } => {
            write!(w, "br {} {} {};", val(func, args[0]), dests[0], dests[1]).unwrap()
        }
        InstData::Switch {
            args,
            default,
            table,
        } => {
            write!(w, "switch {}", val(func, args[0])).unwrap();
            if let Some(default) = default {
                write!(w, " default {default}").unwrap();
            }
            for (case, dest) in table {
                write!(w, " ({} {dest})", val(func, *case)).unwrap();
            }
            w.push(';');
        }
        InstData::Return { args } => match args {
            Some(arg) => write!(w, "return {};", val(func, *arg)).unwrap(),
            None => w.push_str("return;"),
        },
        InstData::Raise { args } => match args {
            Some(arg) => write!(w, "raise {};", val(func, *arg)).unwrap(),
            None => w.push_str("raise;"),
        },
        InstData::Phi { values, blocks, .. } => {
            w.push_str("phi");
            for (value, block) in values.iter().zip(blocks.iter()) {
                write!(w, " ({} {block})", val(func, *value)).unwrap();
            }
            w.push(';');
        }
    }
}

fn val(func: &Function, value: ValueId) -> String {
    match func.dfg.value(value) {
        Value::Immediate { imm, ty } => format!("{imm}.{ty}"),
        _ => format!("v{}", value.0),
    }
}
