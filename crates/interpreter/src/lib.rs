//! A concrete-execution machine over the ostinato IR.
//!
//! The machine walks a single function instruction by instruction, keeping
//! per-value locals and one memory cell per `alloca`. It exists mainly to
//! support differential execution tests of CFG transforms, so it enforces a
//! step budget: a transform bug that produces an endless dispatch loop
//! surfaces as a panic instead of a hang.
use cranelift_entity::SecondaryMap;
use ostinato_ir::{
    BlockId, Function, Immediate, InstData, InstId, UnaryOp, BinaryOp, Value, ValueId,
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum EvalValue {
    Imm(Immediate),
    /// A pointer to a memory cell created by `alloca`.
    Addr(usize),
    #[default]
    Undef,
}

impl EvalValue {
    pub fn as_imm(self) -> Option<Immediate> {
        match self {
            Self::Imm(imm) => Some(imm),
            _ => None,
        }
    }

    fn expect_imm(self) -> Immediate {
        self.as_imm().expect("undef value where immediate expected")
    }

    fn expect_addr(self) -> usize {
        match self {
            Self::Addr(addr) => addr,
            _ => panic!("non-address value where slot address expected"),
        }
    }
}

impl From<Immediate> for EvalValue {
    fn from(imm: Immediate) -> Self {
        Self::Imm(imm)
    }
}

enum Action {
    Continue,
    JumpTo(BlockId),
    Return(EvalValue),
}

pub struct Machine {
    locals: SecondaryMap<ValueId, EvalValue>,
    prev_block: Option<BlockId>,
    memory: Vec<EvalValue>,
    step_limit: usize,
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

impl Machine {
    pub fn new() -> Self {
        Self::with_step_limit(100_000)
    }

    pub fn with_step_limit(step_limit: usize) -> Self {
        Self {
            locals: SecondaryMap::default(),
            prev_block: None,
            memory: Vec::new(),
            step_limit,
        }
    }

    /// Runs `func` to completion and returns the value of its `return`.
    pub fn run(&mut self, func: &Function, args: &[EvalValue]) -> EvalValue {
        assert_eq!(func.arg_values.len(), args.len());

        self.locals.clear();
        self.prev_block = None;
        self.memory.clear();

        for (arg_value, arg) in func.arg_values.iter().zip(args.iter()) {
            self.locals[*arg_value] = *arg;
        }

        let entry_block = func.layout.entry_block().unwrap();
        let mut pc = func.layout.first_inst_of(entry_block).unwrap();

        for _ in 0..self.step_limit {
            match self.step(func, pc) {
                Action::Continue => {
                    pc = func.layout.next_inst_of(pc).unwrap();
                }
                Action::JumpTo(next_block) => {
                    self.prev_block = Some(func.layout.inst_block(pc));
                    pc = func.layout.first_inst_of(next_block).unwrap();
                }
                Action::Return(e_val) => return e_val,
            }
        }

        panic!("step limit exceeded; does the function diverge?");
    }

    fn step(&mut self, func: &Function, pc: InstId) -> Action {
        let e_val = match func.dfg.inst(pc) {
            InstData::Unary { code, args } => {
                let arg = self.lookup_val(func, args[0]).expect_imm();
                let imm = match code {
                    UnaryOp::Not => !arg,
                    UnaryOp::Neg => -arg,
                };
                imm.into()
            }

            InstData::Binary { code, args } => {
                let lhs = self.lookup_val(func, args[0]).expect_imm();
                let rhs = self.lookup_val(func, args[1]).expect_imm();
                let imm = match code {
                    BinaryOp::Add => lhs + rhs,
                    BinaryOp::Sub => lhs - rhs,
                    BinaryOp::Mul => lhs * rhs,
                    BinaryOp::And => lhs & rhs,
                    BinaryOp::Or => lhs | rhs,
                    BinaryOp::Xor => lhs ^ rhs,
                    BinaryOp::Eq => lhs.imm_eq(rhs),
                    BinaryOp::Ne => lhs.imm_ne(rhs),
                    BinaryOp::Lt => lhs.slt(rhs),
                    BinaryOp::Gt => lhs.sgt(rhs),
                    BinaryOp::Le => lhs.sle(rhs),
                    BinaryOp::Ge => lhs.sge(rhs),
                };
                imm.into()
            }

            InstData::Select { args } => {
                let cond = self.lookup_val(func, args[0]).expect_imm();
                let chosen = if cond.is_truthy() { args[1] } else { args[2] };
                self.lookup_val(func, chosen)
            }

            InstData::Alloca { .. } => {
                self.memory.push(EvalValue::Undef);
                EvalValue::Addr(self.memory.len() - 1)
            }

            InstData::Load { args, .. } => {
                let addr = self.lookup_val(func, args[0]).expect_addr();
                self.memory[addr]
            }

            InstData::Store { args } => {
                let value = self.lookup_val(func, args[0]);
                let addr = self.lookup_val(func, args[1]).expect_addr();
                self.memory[addr] = value;
                EvalValue::Undef
            }

            InstData::Jump { dests } => return Action::JumpTo(dests[0]),

            InstData::Br { args, dests } => {
                let cond = self.lookup_val(func, args[0]).expect_imm();
                let dest = if cond.is_truthy() { dests[0] } else { dests[1] };
                return Action::JumpTo(dest);
            }

            InstData::Switch {
                args,
                default,
                table,
            } => {
                let scrutinee = self.lookup_val(func, args[0]).expect_imm();
                let hit = table.iter().find_map(|(case, dest)| {
                    let case = self.lookup_val(func, *case).expect_imm();
                    case.imm_eq(scrutinee).is_truthy().then_some(*dest)
                });
                let dest = hit
                    .or(*default)
                    .expect("switch scrutinee matched no case and no default exists");
                return Action::JumpTo(dest);
            }

            InstData::Return { args } => {
                let e_val = args.map_or(EvalValue::Undef, |arg| self.lookup_val(func, arg));
                return Action::Return(e_val);
            }

            InstData::Raise { .. } => {
                panic!("non-local transfer reached; the machine cannot resume it")
            }

            InstData::Phi { values, blocks, .. } => {
                let prev_block = self.prev_block.expect("phi evaluated without a predecessor");
                let pos = blocks
                    .iter()
                    .position(|block| *block == prev_block)
                    .unwrap_or_else(|| panic!("phi has no incoming value for {prev_block}"));
                self.lookup_val(func, values[pos])
            }
        };

        if let Some(result) = func.dfg.inst_result(pc) {
            self.locals[result] = e_val;
        }

        Action::Continue
    }

    fn lookup_val(&self, func: &Function, value: ValueId) -> EvalValue {
        match func.dfg.value(value) {
            Value::Immediate { imm, .. } => (*imm).into(),
            _ => self.locals[value],
        }
    }
}
