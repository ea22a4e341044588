pub mod demote;
pub mod flatten;

pub use flatten::ControlFlowFlattening;
