pub mod builder;
pub mod cfg;
pub mod dfg;
pub mod func_cursor;
pub mod function;
pub mod inst;
pub mod ir_writer;
pub mod layout;
pub mod types;
pub mod value;

pub use builder::FunctionBuilder;
pub use cfg::ControlFlowGraph;
pub use dfg::{Block, BlockId, DataFlowGraph};
pub use function::{Function, Signature};
pub use inst::{BinaryOp, BranchInfo, InstData, InstId, UnaryOp};
pub use ir_writer::dump_function;
pub use layout::Layout;
pub use types::Type;
pub use value::{Immediate, Value, ValueId};
