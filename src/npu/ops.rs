//! Accelerator operation kinds.
//!
//! Each op kind is a plain struct implementing [`NpuOperator`], the small capability
//! surface (bind operand, set attribute, read back) the graph emitter is written against.
//! [`NpuOp`] is the tagged variant stored in graph nodes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::graph::{ConstantData, DataType};
use crate::npu::graph::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    Data,
    Const,
    Deconvolution,
    Add,
    Activation,
}

impl OpKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OpKind::Data => "Data",
            OpKind::Const => "Const",
            OpKind::Deconvolution => "Deconvolution",
            OpKind::Add => "Add",
            OpKind::Activation => "Activation",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Int(i64),
    Ints(Vec<i64>),
}

impl AttrValue {
    fn as_i32(&self) -> Option<i32> {
        match self {
            AttrValue::Int(v) => i32::try_from(*v).ok(),
            AttrValue::Ints(_) => None,
        }
    }

    fn as_i32_array<const N: usize>(&self) -> Option<[i32; N]> {
        match self {
            AttrValue::Ints(values) if values.len() == N => {
                let mut out = [0i32; N];
                for (slot, v) in out.iter_mut().zip(values) {
                    *slot = i32::try_from(*v).ok()?;
                }
                Some(out)
            }
            _ => None,
        }
    }
}

impl From<i32> for AttrValue {
    fn from(value: i32) -> Self {
        AttrValue::Int(value as i64)
    }
}

impl<const N: usize> From<[i32; N]> for AttrValue {
    fn from(values: [i32; N]) -> Self {
        AttrValue::Ints(values.iter().map(|&v| v as i64).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NpuOpError {
    #[error("{kind} has no input slot `{slot}`")]
    UnknownInput { kind: &'static str, slot: String },
    #[error("{kind} has no attribute `{name}`")]
    UnknownAttr { kind: &'static str, name: String },
    #[error("{kind} attribute `{name}` expects {expected}")]
    AttrType {
        kind: &'static str,
        name: String,
        expected: &'static str,
    },
}

/// Capability surface shared by every accelerator op kind.
pub trait NpuOperator {
    fn op_kind(&self) -> OpKind;

    /// Operand slots in binding order.
    fn input_slots(&self) -> &'static [&'static str];

    fn set_input(&mut self, slot: &str, node: NodeId) -> Result<(), NpuOpError>;

    fn input(&self, slot: &str) -> Option<NodeId>;

    fn set_attr(&mut self, name: &str, value: AttrValue) -> Result<(), NpuOpError>;

    fn attr(&self, name: &str) -> Option<AttrValue>;

    /// Operand edges that have been bound, in slot order.
    fn bound_inputs(&self) -> Vec<(&'static str, NodeId)> {
        self.input_slots()
            .iter()
            .filter_map(|slot| self.input(slot).map(|id| (*slot, id)))
            .collect()
    }
}

fn unknown_input(kind: OpKind, slot: &str) -> NpuOpError {
    NpuOpError::UnknownInput {
        kind: kind.as_str(),
        slot: slot.to_string(),
    }
}

fn unknown_attr(kind: OpKind, name: &str) -> NpuOpError {
    NpuOpError::UnknownAttr {
        kind: kind.as_str(),
        name: name.to_string(),
    }
}

fn attr_type(kind: OpKind, name: &str, expected: &'static str) -> NpuOpError {
    NpuOpError::AttrType {
        kind: kind.as_str(),
        name: name.to_string(),
        expected,
    }
}

/// Graph input placeholder fed at execution time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataOp {
    pub data_type: DataType,
    pub shape: Vec<u32>,
}

impl NpuOperator for DataOp {
    fn op_kind(&self) -> OpKind {
        OpKind::Data
    }

    fn input_slots(&self) -> &'static [&'static str] {
        &[]
    }

    fn set_input(&mut self, slot: &str, _node: NodeId) -> Result<(), NpuOpError> {
        Err(unknown_input(self.op_kind(), slot))
    }

    fn input(&self, _slot: &str) -> Option<NodeId> {
        None
    }

    fn set_attr(&mut self, name: &str, _value: AttrValue) -> Result<(), NpuOpError> {
        Err(unknown_attr(self.op_kind(), name))
    }

    fn attr(&self, _name: &str) -> Option<AttrValue> {
        None
    }
}

/// Constant tensor baked into the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstOp {
    pub data_type: DataType,
    pub shape: Vec<u32>,
    pub value: ConstantData,
}

impl ConstOp {
    /// Decodes an `Int32` payload; other element types yield `None`.
    pub fn int32_values(&self) -> Option<Vec<i32>> {
        if self.data_type != DataType::Int32 || self.value.data.len() % 4 != 0 {
            return None;
        }
        Some(bytemuck::pod_collect_to_vec::<u8, i32>(&self.value.data))
    }
}

impl NpuOperator for ConstOp {
    fn op_kind(&self) -> OpKind {
        OpKind::Const
    }

    fn input_slots(&self) -> &'static [&'static str] {
        &[]
    }

    fn set_input(&mut self, slot: &str, _node: NodeId) -> Result<(), NpuOpError> {
        Err(unknown_input(self.op_kind(), slot))
    }

    fn input(&self, _slot: &str) -> Option<NodeId> {
        None
    }

    fn set_attr(&mut self, name: &str, _value: AttrValue) -> Result<(), NpuOpError> {
        Err(unknown_attr(self.op_kind(), name))
    }

    fn attr(&self, _name: &str) -> Option<AttrValue> {
        None
    }
}

/// Tensor layout codes understood by the accelerator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataFormat {
    #[default]
    Nchw = 0,
    Nhwc = 1,
}

impl DataFormat {
    fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(DataFormat::Nchw),
            1 => Some(DataFormat::Nhwc),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PadMode {
    /// Explicit padding taken from the `pad` attribute.
    #[default]
    NotSet = 0,
    Same = 5,
    Valid = 6,
}

impl PadMode {
    fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(PadMode::NotSet),
            5 => Some(PadMode::Same),
            6 => Some(PadMode::Valid),
            _ => None,
        }
    }
}

/// Transposed convolution. Operands: `x` (activation), `filter`, `input_sizes`
/// (1-D int32 `[n, c, h, w]` of the result).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeconvolutionOp {
    pub x: Option<NodeId>,
    pub filter: Option<NodeId>,
    pub input_sizes: Option<NodeId>,
    pub format: DataFormat,
    pub pad_mode: PadMode,
    pub group: i32,
    pub pad: [i32; 4],
    pub dilation: [i32; 2],
    pub stride: [i32; 2],
    pub kernel: [i32; 2],
}

impl NpuOperator for DeconvolutionOp {
    fn op_kind(&self) -> OpKind {
        OpKind::Deconvolution
    }

    fn input_slots(&self) -> &'static [&'static str] {
        &["x", "filter", "input_sizes"]
    }

    fn set_input(&mut self, slot: &str, node: NodeId) -> Result<(), NpuOpError> {
        let kind = self.op_kind();
        let target = match slot {
            "x" => &mut self.x,
            "filter" => &mut self.filter,
            "input_sizes" => &mut self.input_sizes,
            _ => return Err(unknown_input(kind, slot)),
        };
        *target = Some(node);
        Ok(())
    }

    fn input(&self, slot: &str) -> Option<NodeId> {
        match slot {
            "x" => self.x,
            "filter" => self.filter,
            "input_sizes" => self.input_sizes,
            _ => None,
        }
    }

    fn set_attr(&mut self, name: &str, value: AttrValue) -> Result<(), NpuOpError> {
        let kind = self.op_kind();
        match name {
            "format" => {
                self.format = value
                    .as_i32()
                    .and_then(DataFormat::from_code)
                    .ok_or_else(|| attr_type(kind, name, "a data format code"))?;
            }
            "pad_mode" => {
                self.pad_mode = value
                    .as_i32()
                    .and_then(PadMode::from_code)
                    .ok_or_else(|| attr_type(kind, name, "a pad mode code"))?;
            }
            "group" => {
                self.group = value
                    .as_i32()
                    .ok_or_else(|| attr_type(kind, name, "an int"))?;
            }
            "pad" => {
                self.pad = value
                    .as_i32_array::<4>()
                    .ok_or_else(|| attr_type(kind, name, "4 ints"))?;
            }
            "dilation" => {
                self.dilation = value
                    .as_i32_array::<2>()
                    .ok_or_else(|| attr_type(kind, name, "2 ints"))?;
            }
            "stride" => {
                self.stride = value
                    .as_i32_array::<2>()
                    .ok_or_else(|| attr_type(kind, name, "2 ints"))?;
            }
            "kernel" => {
                self.kernel = value
                    .as_i32_array::<2>()
                    .ok_or_else(|| attr_type(kind, name, "2 ints"))?;
            }
            _ => return Err(unknown_attr(kind, name)),
        }
        Ok(())
    }

    fn attr(&self, name: &str) -> Option<AttrValue> {
        match name {
            "format" => Some((self.format as i32).into()),
            "pad_mode" => Some((self.pad_mode as i32).into()),
            "group" => Some(self.group.into()),
            "pad" => Some(self.pad.into()),
            "dilation" => Some(self.dilation.into()),
            "stride" => Some(self.stride.into()),
            "kernel" => Some(self.kernel.into()),
            _ => None,
        }
    }
}

/// Elementwise sum with broadcasting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddOp {
    pub x1: Option<NodeId>,
    pub x2: Option<NodeId>,
}

impl NpuOperator for AddOp {
    fn op_kind(&self) -> OpKind {
        OpKind::Add
    }

    fn input_slots(&self) -> &'static [&'static str] {
        &["x1", "x2"]
    }

    fn set_input(&mut self, slot: &str, node: NodeId) -> Result<(), NpuOpError> {
        match slot {
            "x1" => self.x1 = Some(node),
            "x2" => self.x2 = Some(node),
            _ => return Err(unknown_input(self.op_kind(), slot)),
        }
        Ok(())
    }

    fn input(&self, slot: &str) -> Option<NodeId> {
        match slot {
            "x1" => self.x1,
            "x2" => self.x2,
            _ => None,
        }
    }

    fn set_attr(&mut self, name: &str, _value: AttrValue) -> Result<(), NpuOpError> {
        Err(unknown_attr(self.op_kind(), name))
    }

    fn attr(&self, _name: &str) -> Option<AttrValue> {
        None
    }
}

/// Activation mode codes of the accelerator's activation primitive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationMode {
    Sigmoid = 0,
    #[default]
    Relu = 1,
    Tanh = 2,
    ClippedRelu = 3,
    Elu = 4,
    LeakyRelu = 5,
    Abs = 6,
    Relu1 = 7,
    Softsign = 8,
    Softplus = 9,
    HardSigmoid = 10,
}

impl ActivationMode {
    fn from_code(code: i32) -> Option<Self> {
        [
            ActivationMode::Sigmoid,
            ActivationMode::Relu,
            ActivationMode::Tanh,
            ActivationMode::ClippedRelu,
            ActivationMode::Elu,
            ActivationMode::LeakyRelu,
            ActivationMode::Abs,
            ActivationMode::Relu1,
            ActivationMode::Softsign,
            ActivationMode::Softplus,
            ActivationMode::HardSigmoid,
        ]
        .into_iter()
        .find(|mode| *mode as i32 == code)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationOp {
    pub x: Option<NodeId>,
    pub mode: ActivationMode,
}

impl NpuOperator for ActivationOp {
    fn op_kind(&self) -> OpKind {
        OpKind::Activation
    }

    fn input_slots(&self) -> &'static [&'static str] {
        &["x"]
    }

    fn set_input(&mut self, slot: &str, node: NodeId) -> Result<(), NpuOpError> {
        match slot {
            "x" => self.x = Some(node),
            _ => return Err(unknown_input(self.op_kind(), slot)),
        }
        Ok(())
    }

    fn input(&self, slot: &str) -> Option<NodeId> {
        match slot {
            "x" => self.x,
            _ => None,
        }
    }

    fn set_attr(&mut self, name: &str, value: AttrValue) -> Result<(), NpuOpError> {
        let kind = self.op_kind();
        match name {
            "mode" => {
                self.mode = value
                    .as_i32()
                    .and_then(ActivationMode::from_code)
                    .ok_or_else(|| attr_type(kind, name, "an activation mode code"))?;
            }
            _ => return Err(unknown_attr(kind, name)),
        }
        Ok(())
    }

    fn attr(&self, name: &str) -> Option<AttrValue> {
        match name {
            "mode" => Some((self.mode as i32).into()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NpuOp {
    Data(DataOp),
    Const(ConstOp),
    Deconvolution(DeconvolutionOp),
    Add(AddOp),
    Activation(ActivationOp),
}

impl NpuOp {
    /// Fresh op of the given kind with every operand unbound.
    pub fn new(kind: OpKind) -> Self {
        match kind {
            OpKind::Data => NpuOp::Data(DataOp {
                data_type: DataType::Float32,
                shape: Vec::new(),
            }),
            OpKind::Const => NpuOp::Const(ConstOp {
                data_type: DataType::Float32,
                shape: Vec::new(),
                value: ConstantData { data: Vec::new() },
            }),
            OpKind::Deconvolution => NpuOp::Deconvolution(DeconvolutionOp::default()),
            OpKind::Add => NpuOp::Add(AddOp::default()),
            OpKind::Activation => NpuOp::Activation(ActivationOp::default()),
        }
    }

    /// Declared shape for tensor-backed ops.
    pub fn tensor_shape(&self) -> Option<&[u32]> {
        match self {
            NpuOp::Data(op) => Some(&op.shape),
            NpuOp::Const(op) => Some(&op.shape),
            _ => None,
        }
    }

    fn as_operator(&self) -> &dyn NpuOperator {
        match self {
            NpuOp::Data(op) => op,
            NpuOp::Const(op) => op,
            NpuOp::Deconvolution(op) => op,
            NpuOp::Add(op) => op,
            NpuOp::Activation(op) => op,
        }
    }

    fn as_operator_mut(&mut self) -> &mut dyn NpuOperator {
        match self {
            NpuOp::Data(op) => op,
            NpuOp::Const(op) => op,
            NpuOp::Deconvolution(op) => op,
            NpuOp::Add(op) => op,
            NpuOp::Activation(op) => op,
        }
    }
}

impl NpuOperator for NpuOp {
    fn op_kind(&self) -> OpKind {
        self.as_operator().op_kind()
    }

    fn input_slots(&self) -> &'static [&'static str] {
        self.as_operator().input_slots()
    }

    fn set_input(&mut self, slot: &str, node: NodeId) -> Result<(), NpuOpError> {
        self.as_operator_mut().set_input(slot, node)
    }

    fn input(&self, slot: &str) -> Option<NodeId> {
        self.as_operator().input(slot)
    }

    fn set_attr(&mut self, name: &str, value: AttrValue) -> Result<(), NpuOpError> {
        self.as_operator_mut().set_attr(name, value)
    }

    fn attr(&self, name: &str) -> Option<AttrValue> {
        self.as_operator().attr(name)
    }
}
