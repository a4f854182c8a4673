//! Node construction helpers shared by NPU bridges.
//!
//! Everything here goes through [`NpuOperator`] so bridges never touch the concrete
//! op structs directly.

use tracing::trace;

use crate::context::ContextProperties;
use crate::converters::npu::geometry::{ConvTransposeParams, GeometryError};
use crate::error::GraphError;
use crate::graph::Tensor;
use crate::npu::ops::{ActivationMode, AttrValue, DataFormat, NpuOpError, OpKind, PadMode};
use crate::npu::{NodeId, NpuGraph, NpuOp, NpuOperator};

fn bind(node: &str, result: Result<(), NpuOpError>) -> Result<(), GraphError> {
    result.map_err(|source| GraphError::NodeBinding {
        node: node.to_string(),
        source,
    })
}

/// Returns the node registered under `name`, or registers `tensor` under it.
pub fn get_or_create_tensor_node(
    graph: &mut NpuGraph,
    props: &ContextProperties,
    name: &str,
    tensor: &Tensor,
    shape: Option<&[u32]>,
) -> Result<NodeId, GraphError> {
    if let Some(existing) = graph.get(name) {
        trace!(tensor = name, node = %existing, "reusing registered node");
        return Ok(existing);
    }

    if let Some(data) = &tensor.data {
        let limit = props.tensor_byte_length_limit;
        if data.len() > limit {
            return Err(GraphError::TensorTooLarge {
                name: name.to_string(),
                byte_length: data.len(),
                limit,
            });
        }
    }
    graph.add_tensor(name, tensor, shape)
}

pub fn create_constant_vector_node(
    graph: &mut NpuGraph,
    name: &str,
    values: &[i32],
) -> Result<NodeId, GraphError> {
    graph.add_int32_vector(name, values)
}

#[derive(Debug, Clone, Copy)]
pub struct DeconvOperands {
    pub input: NodeId,
    pub filter: NodeId,
    pub output_sizes: NodeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeconvAttrs {
    pub groups: i32,
    pub paddings: [i32; 4],
    pub dilations: [i32; 2],
    pub strides: [i32; 2],
    pub kernel: [i32; 2],
}

impl DeconvAttrs {
    /// Kernel size comes from the filter's spatial dims, never from an attribute.
    pub fn new(
        params: &ConvTransposeParams,
        filter_dims: [u32; 4],
    ) -> Result<Self, GeometryError> {
        let mut kernel = [0i32; 2];
        for (axis, slot) in kernel.iter_mut().enumerate() {
            let size = filter_dims[axis + 2];
            *slot =
                i32::try_from(size).map_err(|_| GeometryError::KernelOverflow { axis, size })?;
        }
        Ok(Self {
            groups: params.groups,
            paddings: params.paddings,
            dilations: params.dilations,
            strides: params.strides,
            kernel,
        })
    }
}

pub fn create_deconvolution_node(
    graph: &mut NpuGraph,
    name: &str,
    operands: DeconvOperands,
    attrs: &DeconvAttrs,
) -> Result<NodeId, GraphError> {
    let mut op = NpuOp::new(OpKind::Deconvolution);
    bind(name, op.set_input("input_sizes", operands.output_sizes))?;
    bind(name, op.set_input("filter", operands.filter))?;
    bind(name, op.set_input("x", operands.input))?;

    let settings: [(&str, AttrValue); 7] = [
        ("format", (DataFormat::Nchw as i32).into()),
        ("pad_mode", (PadMode::NotSet as i32).into()),
        ("group", attrs.groups.into()),
        ("pad", attrs.paddings.into()),
        ("dilation", attrs.dilations.into()),
        ("stride", attrs.strides.into()),
        ("kernel", attrs.kernel.into()),
    ];
    for (attr, value) in settings {
        bind(name, op.set_attr(attr, value))?;
    }
    graph.add_op(name, op)
}

/// Adds `bias` (shaped `[1, C, 1, 1]`) to `base`. The bias must hold exactly
/// `out_channels` elements so that it broadcasts over batch and spatial dims only.
pub fn append_bias_add(
    graph: &mut NpuGraph,
    base: NodeId,
    bias: NodeId,
    name: &str,
    out_channels: usize,
) -> Result<NodeId, GraphError> {
    if let Some(shape) = graph.require(bias)?.op.tensor_shape() {
        let channels: usize = shape.iter().map(|&d| d as usize).product();
        if channels != out_channels {
            return Err(GraphError::BiasChannelMismatch {
                output: name.to_string(),
                expected: out_channels,
                actual: channels,
            });
        }
    }

    let mut op = NpuOp::new(OpKind::Add);
    bind(name, op.set_input("x1", base))?;
    bind(name, op.set_input("x2", bias))?;
    graph.add_op(name, op)
}

pub fn append_activation(
    graph: &mut NpuGraph,
    base: NodeId,
    name: &str,
    mode: ActivationMode,
) -> Result<NodeId, GraphError> {
    let mut op = NpuOp::new(OpKind::Activation);
    bind(name, op.set_input("x", base))?;
    bind(name, op.set_attr("mode", (mode as i32).into()))?;
    graph.add_op(name, op)
}
