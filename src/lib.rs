pub mod context;
pub mod converters;
pub mod error;
pub mod graph;
pub mod loader;
pub mod npu;
pub mod runtime_checks;

pub use context::{BridgeContext, ContextProperties};
pub use converters::{
    BridgeRegistry, ConvertedGraph, ProgramOutput, ReexecutionHint, TargetKind, convert_program,
};
pub use error::GraphError;
pub use graph::{
    ConstantData, DataLayout, DataType, KernelDecl, OpDesc, Program, Scope, Tensor,
    TensorDescriptor, TypeDecl,
};
pub use loader::load_program_from_path;
pub use npu::{NodeId, NpuGraph};
pub use runtime_checks::{ShapeCheck, ShapeGuard};
