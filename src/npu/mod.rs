//! Target-side graph representation for the NPU backend.

pub mod graph;
pub mod ops;

pub use graph::{GraphExport, Node, NodeId, NpuGraph};
pub use ops::{ActivationMode, AttrValue, NpuOp, NpuOpError, NpuOperator, OpKind};
