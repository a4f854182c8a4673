use std::collections::{BTreeMap, HashMap};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};

use crate::error::GraphError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Float16,
    Float32,
    Int8,
    Uint8,
    Int32,
    Int64,
    Bool,
}

impl DataType {
    pub fn bytes_per_element(self) -> usize {
        match self {
            DataType::Float16 => 2,
            DataType::Float32 => 4,
            DataType::Int8 => 1,
            DataType::Uint8 => 1,
            DataType::Int32 => 4,
            DataType::Int64 => 8,
            DataType::Bool => 1,
        }
    }
}

/// Memory layout tag declared by a kernel for one of its arguments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataLayout {
    Nchw,
    Nhwc,
    #[default]
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDecl {
    pub precision: DataType,
    #[serde(default)]
    pub layout: DataLayout,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorDescriptor {
    pub data_type: DataType,
    #[serde(default)]
    pub layout: DataLayout,
    #[serde(default)]
    pub shape: Vec<u32>,
}

impl TensorDescriptor {
    pub fn element_count(&self) -> Option<usize> {
        self.shape
            .iter()
            .try_fold(1usize, |acc, &dim| acc.checked_mul(dim as usize))
    }
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstantData {
    #[serde_as(as = "Base64")]
    pub data: Vec<u8>,
}

impl ConstantData {
    pub fn from_f32(values: &[f32]) -> Self {
        Self {
            data: bytemuck::cast_slice(values).to_vec(),
        }
    }

    pub fn from_i32(values: &[i32]) -> Self {
        Self {
            data: bytemuck::cast_slice(values).to_vec(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// A framework tensor. Persistable tensors carry their payload (weights, biases);
/// the rest are runtime activations known only by descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tensor {
    pub descriptor: TensorDescriptor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ConstantData>,
    #[serde(default)]
    pub persistable: bool,
}

impl Tensor {
    pub fn placeholder(data_type: DataType, shape: Vec<u32>) -> Self {
        Self {
            descriptor: TensorDescriptor {
                data_type,
                layout: DataLayout::Nchw,
                shape,
            },
            data: None,
            persistable: false,
        }
    }

    pub fn from_f32(shape: Vec<u32>, values: &[f32]) -> Self {
        Self {
            descriptor: TensorDescriptor {
                data_type: DataType::Float32,
                layout: DataLayout::Nchw,
                shape,
            },
            data: Some(ConstantData::from_f32(values)),
            persistable: true,
        }
    }

    pub fn dims(&self) -> &[u32] {
        &self.descriptor.shape
    }
}

/// Tensor store the framework hands to converters. Read-only during conversion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scope {
    tensors: HashMap<String, Tensor>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, tensor: Tensor) -> Option<Tensor> {
        self.tensors.insert(name.into(), tensor)
    }

    pub fn find_tensor(&self, name: &str) -> Option<&Tensor> {
        self.tensors.get(name)
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }
}

/// One framework operator instance: typed name, argument → tensor-name lists and attributes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpDesc {
    #[serde(rename = "type")]
    pub op_type: String,
    #[serde(default)]
    pub inputs: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub outputs: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl OpDesc {
    pub fn new(op_type: impl Into<String>) -> Self {
        Self {
            op_type: op_type.into(),
            ..Default::default()
        }
    }

    pub fn with_input(mut self, arg: &str, names: &[&str]) -> Self {
        self.inputs.insert(
            arg.to_string(),
            names.iter().map(|name| name.to_string()).collect(),
        );
        self
    }

    pub fn with_output(mut self, arg: &str, names: &[&str]) -> Self {
        self.outputs.insert(
            arg.to_string(),
            names.iter().map(|name| name.to_string()).collect(),
        );
        self
    }

    pub fn with_attr(mut self, name: &str, value: impl Into<serde_json::Value>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    pub fn input(&self, arg: &str) -> &[String] {
        self.inputs.get(arg).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn output(&self, arg: &str) -> &[String] {
        self.outputs.get(arg).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    pub fn attr<T: DeserializeOwned>(&self, name: &str) -> Result<T, GraphError> {
        let value = self
            .attributes
            .get(name)
            .ok_or_else(|| GraphError::MissingAttribute {
                op_type: self.op_type.clone(),
                attr: name.to_string(),
            })?;
        T::deserialize(value).map_err(|err| GraphError::InvalidAttribute {
            op_type: self.op_type.clone(),
            attr: name.to_string(),
            reason: err.to_string(),
        })
    }

    /// An optional argument counts as present when it is declared, names a tensor,
    /// and that tensor exists in the scope.
    pub fn has_input_arg(&self, scope: &Scope, arg: &str) -> bool {
        self.input(arg)
            .first()
            .is_some_and(|name| scope.find_tensor(name).is_some())
    }
}

/// Declared precision/layout per argument of the kernel selected for an operator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KernelDecl {
    #[serde(default)]
    pub inputs: BTreeMap<String, TypeDecl>,
    #[serde(default)]
    pub outputs: BTreeMap<String, TypeDecl>,
}

impl KernelDecl {
    pub fn input_decl(&self, arg: &str) -> Option<&TypeDecl> {
        self.inputs.get(arg)
    }

    pub fn output_decl(&self, arg: &str) -> Option<&TypeDecl> {
        self.outputs.get(arg)
    }

    pub fn with_input(mut self, arg: &str, decl: TypeDecl) -> Self {
        self.inputs.insert(arg.to_string(), decl);
        self
    }

    pub fn with_output(mut self, arg: &str, decl: TypeDecl) -> Self {
        self.outputs.insert(arg.to_string(), decl);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramOp {
    #[serde(flatten)]
    pub op: OpDesc,
    #[serde(default)]
    pub kernel: KernelDecl,
}

/// A serialized framework program: operators in execution order plus the scope they read.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Program {
    #[serde(default)]
    pub ops: Vec<ProgramOp>,
    #[serde(default)]
    pub scope: Scope,
}
