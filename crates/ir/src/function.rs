use smallvec::SmallVec;

use crate::{DataFlowGraph, Layout, Type, ValueId};

#[derive(Debug, Clone)]
pub struct Function {
    pub sig: Signature,
    pub arg_values: SmallVec<[ValueId; 8]>,
    pub dfg: DataFlowGraph,
    pub layout: Layout,
}

impl Function {
    pub fn new(sig: Signature) -> Self {
        let mut dfg = DataFlowGraph::new();
        let arg_values = sig
            .args()
            .iter()
            .enumerate()
            .map(|(idx, arg_ty)| dfg.make_arg_value(*arg_ty, idx))
            .collect();

        Self {
            sig,
            arg_values,
            dfg,
            layout: Layout::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Signature {
    name: String,
    args: SmallVec<[Type; 8]>,
    ret_ty: Type,
}

impl Signature {
    pub fn new(name: &str, args: &[Type], ret_ty: Type) -> Self {
        Self {
            name: name.to_string(),
            args: args.into(),
            ret_ty,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[Type] {
        &self.args
    }

    pub fn ret_ty(&self) -> Type {
        self.ret_ty
    }
}
