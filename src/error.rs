use std::path::PathBuf;

use thiserror::Error;

use crate::converters::npu::geometry::GeometryError;
use crate::graph::{DataLayout, DataType};
use crate::npu::ops::NpuOpError;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("failed to read program `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse program `{path}`: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write `{path}`: {source}")]
    Export {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize converted graph: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("no bridge registered for operator `{op_type}` on target `{target}`")]
    UnsupportedOperation { op_type: String, target: String },
    #[error("[{op_type}] {output}: {reason}")]
    Precondition {
        op_type: String,
        output: String,
        reason: String,
    },
    #[error("[{op_type}] {output}: {source}")]
    Geometry {
        op_type: String,
        output: String,
        #[source]
        source: GeometryError,
    },
    #[error(
        "[{op_type}] {output}: argument `{argument}` expects {expected_type:?}/{expected_layout:?}, kernel declares {actual_type:?}/{actual_layout:?}"
    )]
    DeclTypeMismatch {
        op_type: String,
        output: String,
        argument: String,
        expected_type: DataType,
        expected_layout: DataLayout,
        actual_type: DataType,
        actual_layout: DataLayout,
    },
    #[error("bias for `{output}` has {actual} channels, expected {expected}")]
    BiasChannelMismatch {
        output: String,
        expected: usize,
        actual: usize,
    },
    #[error("operator `{op_type}` is missing attribute `{attr}`")]
    MissingAttribute { op_type: String, attr: String },
    #[error("operator `{op_type}` has invalid attribute `{attr}`: {reason}")]
    InvalidAttribute {
        op_type: String,
        attr: String,
        reason: String,
    },
    #[error("tensor `{name}` is not present in the scope")]
    MissingTensor { name: String },
    #[error("tensor `{name}` is {byte_length} bytes which exceeds the limit of {limit}")]
    TensorTooLarge {
        name: String,
        byte_length: usize,
        limit: usize,
    },
    #[error("failed to bind node `{node}`: {source}")]
    NodeBinding {
        node: String,
        #[source]
        source: NpuOpError,
    },
    #[error("node {id} does not exist in the graph")]
    UnknownNode { id: u32 },
    #[error("runtime tensor `{name}` is missing")]
    RuntimeTensorMissing { name: String },
    #[error("runtime tensor `{name}` was not captured when the graph was built")]
    RuntimeTensorUnexpected { name: String },
    #[error("tensor `{name}` shape {shape:?} overflows the element count")]
    RuntimeTensorShapeOverflow { name: String, shape: Vec<u32> },
    #[error("tensor `{name}` holds {actual} bytes, shape requires {expected}")]
    RuntimeTensorDataLengthMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },
}

impl GraphError {
    pub fn io(path: PathBuf, source: std::io::Error) -> Self {
        GraphError::Io { path, source }
    }

    pub fn export(path: PathBuf, source: std::io::Error) -> Self {
        GraphError::Export { path, source }
    }
}
