//! `conv2d_transpose` → NPU `Deconvolution` [+ `Add`] [+ `Activation`].

use tracing::{debug, trace};

use crate::context::BridgeContext;
use crate::converters::ReexecutionHint;
use crate::converters::npu::emitter::{self, DeconvAttrs, DeconvOperands};
use crate::converters::npu::geometry::{ConvTransposeParams, GeometryError, resolve_output_sizes};
use crate::error::GraphError;
use crate::graph::{DataLayout, DataType, KernelDecl, OpDesc, Scope, Tensor, TypeDecl};
use crate::npu::ActivationMode;

pub const OP_TYPE: &str = "conv2d_transpose";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Start,
    InputsValidated,
    NodesResolved,
    CoreEmitted,
    BiasEmitted,
    ActivationEmitted,
    Done,
}

/// Operator instance being converted, used to label diagnostics.
struct OpSite<'a> {
    op_type: &'a str,
    output: &'a str,
}

impl<'a> OpSite<'a> {
    fn precondition(&self, reason: impl Into<String>) -> GraphError {
        GraphError::Precondition {
            op_type: self.op_type.to_string(),
            output: self.output.to_string(),
            reason: reason.into(),
        }
    }

    fn geometry(&self, source: GeometryError) -> GraphError {
        GraphError::Geometry {
            op_type: self.op_type.to_string(),
            output: self.output.to_string(),
            source,
        }
    }

    fn advance(&self, from: Stage, to: Stage) -> Stage {
        trace!(op_type = self.op_type, output = self.output, ?from, ?to, "stage");
        to
    }

    fn first_name<'n>(&self, names: &'n [String], argument: &str) -> Result<&'n str, GraphError> {
        names
            .first()
            .map(String::as_str)
            .ok_or_else(|| self.precondition(format!("argument `{argument}` names no tensor")))
    }

    fn require_decl(&self, decl: Option<&TypeDecl>, argument: &str) -> Result<(), GraphError> {
        let decl = decl.ok_or_else(|| {
            self.precondition(format!("kernel declares no type for `{argument}`"))
        })?;
        if decl.precision != DataType::Float32 || decl.layout != DataLayout::Nchw {
            return Err(GraphError::DeclTypeMismatch {
                op_type: self.op_type.to_string(),
                output: self.output.to_string(),
                argument: argument.to_string(),
                expected_type: DataType::Float32,
                expected_layout: DataLayout::Nchw,
                actual_type: decl.precision,
                actual_layout: decl.layout,
            });
        }
        Ok(())
    }

    fn find_tensor<'s>(&self, scope: &'s Scope, name: &str) -> Result<&'s Tensor, GraphError> {
        scope.find_tensor(name).ok_or_else(|| GraphError::MissingTensor {
            name: name.to_string(),
        })
    }

    /// The scope tensor must itself be float32 NCHW, whatever the kernel declares.
    /// A 1-D bias has no spatial layout, so `Any` is accepted for it.
    fn require_tensor(
        &self,
        tensor: &Tensor,
        argument: &str,
        layout_optional: bool,
    ) -> Result<(), GraphError> {
        let descriptor = &tensor.descriptor;
        let layout_ok = descriptor.layout == DataLayout::Nchw
            || (layout_optional && descriptor.layout == DataLayout::Any);
        if descriptor.data_type != DataType::Float32 || !layout_ok {
            return Err(self.precondition(format!(
                "tensor for `{argument}` is {:?}/{:?}, expected Float32/Nchw",
                descriptor.data_type, descriptor.layout
            )));
        }
        Ok(())
    }

    fn rank4(&self, tensor: &Tensor, argument: &str) -> Result<[u32; 4], GraphError> {
        tensor.dims().try_into().map_err(|_| {
            self.precondition(format!(
                "`{argument}` must be 4D, got {}D",
                tensor.dims().len()
            ))
        })
    }
}

/// Emits the NPU subgraph for one `conv2d_transpose` operator.
///
/// The output size is baked into a constant node, so the caller must rebuild the
/// subgraph whenever input shapes change.
pub fn convert(
    ctx: &mut BridgeContext<'_>,
    op: &OpDesc,
    kernel: &KernelDecl,
) -> Result<ReexecutionHint, GraphError> {
    let scope = ctx.scope;
    let mut stage = Stage::Start;

    let output_name = op
        .output("Output")
        .first()
        .map(String::as_str)
        .ok_or_else(|| GraphError::Precondition {
            op_type: op.op_type.clone(),
            output: "<unnamed>".to_string(),
            reason: "argument `Output` names no tensor".to_string(),
        })?;
    let site = OpSite {
        op_type: &op.op_type,
        output: output_name,
    };
    debug!(op_type = site.op_type, output = output_name, "converting");

    let input_name = site.first_name(op.input("Input"), "Input")?;
    site.require_decl(kernel.input_decl("Input"), "Input")?;
    let input = site.find_tensor(scope, input_name)?;
    site.require_tensor(input, "Input", false)?;
    let input_dims = site.rank4(input, "Input")?;

    let filter_name = site.first_name(op.input("Filter"), "Filter")?;
    site.require_decl(kernel.input_decl("Filter"), "Filter")?;
    let filter = site.find_tensor(scope, filter_name)?;
    site.require_tensor(filter, "Filter", false)?;
    let filter_dims = site.rank4(filter, "Filter")?;

    site.require_decl(kernel.output_decl("Output"), "Output")?;

    let strides: Vec<i32> = op.attr("strides")?;
    let paddings: Vec<i32> = op.attr("paddings")?;
    let groups: i32 = op.attr("groups")?;
    let dilations: Vec<i32> = op.attr("dilations")?;
    let fuse_relu = op.has_attr("fuse_relu") && op.attr::<bool>("fuse_relu")?;
    let params = ConvTransposeParams::new(&strides, &dilations, &paddings, groups)
        .map_err(|err| site.geometry(err))?;
    stage = site.advance(stage, Stage::InputsValidated);

    let input_node =
        emitter::get_or_create_tensor_node(ctx.graph, ctx.props, input_name, input, None)?;
    let output_sizes = resolve_output_sizes(&input_dims, &filter_dims, &params)
        .map_err(|err| site.geometry(err))?;
    let sizes_node = emitter::create_constant_vector_node(
        ctx.graph,
        &format!("{output_name}/input_sizes"),
        &output_sizes,
    )?;
    let filter_node =
        emitter::get_or_create_tensor_node(ctx.graph, ctx.props, filter_name, filter, None)?;
    stage = site.advance(stage, Stage::NodesResolved);

    let attrs = DeconvAttrs::new(&params, filter_dims).map_err(|err| site.geometry(err))?;
    let mut terminal = emitter::create_deconvolution_node(
        ctx.graph,
        output_name,
        DeconvOperands {
            input: input_node,
            filter: filter_node,
            output_sizes: sizes_node,
        },
        &attrs,
    )?;
    stage = site.advance(stage, Stage::CoreEmitted);

    let out_channels = output_sizes[1] as usize;
    if op.has_input_arg(scope, "Bias") {
        let bias_name = site.first_name(op.input("Bias"), "Bias")?;
        site.require_decl(kernel.input_decl("Bias"), "Bias")?;
        let bias = site.find_tensor(scope, bias_name)?;
        site.require_tensor(bias, "Bias", true)?;
        let channels = bias
            .descriptor
            .element_count()
            .ok_or_else(|| site.precondition("bias element count overflows"))?;
        if channels != out_channels {
            return Err(GraphError::BiasChannelMismatch {
                output: output_name.to_string(),
                expected: out_channels,
                actual: channels,
            });
        }
        let bias_node = emitter::get_or_create_tensor_node(
            ctx.graph,
            ctx.props,
            bias_name,
            bias,
            Some(&[1, channels as u32, 1, 1]),
        )?;
        terminal =
            emitter::append_bias_add(ctx.graph, terminal, bias_node, output_name, out_channels)?;
        stage = site.advance(stage, Stage::BiasEmitted);
    }

    if fuse_relu {
        terminal =
            emitter::append_activation(ctx.graph, terminal, output_name, ActivationMode::Relu)?;
        stage = site.advance(stage, Stage::ActivationEmitted);
    }

    debug!(
        op_type = site.op_type,
        output = output_name,
        %terminal,
        sizes = ?output_sizes,
        "converted"
    );
    site.advance(stage, Stage::Done);
    Ok(ReexecutionHint::RebuildWhenShapeChanged)
}
