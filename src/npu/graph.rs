//! Accelerator graph under construction.
//!
//! Nodes live in an append-only arena addressed by [`NodeId`]. A separate name
//! registry maps each tensor/output name to the node that currently answers for it.
//! Registering a name again replaces the registry entry only: any `NodeId` obtained
//! earlier still refers to the node it was issued for.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::GraphError;
use crate::graph::{ConstantData, DataType, Tensor};
use crate::npu::ops::{ConstOp, DataOp, NpuOp, NpuOperator, OpKind};
use crate::runtime_checks::validate_shape_data_length;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    /// Name the node was registered under when it was created.
    pub name: String,
    pub op: NpuOp,
}

impl Node {
    pub fn kind(&self) -> OpKind {
        self.op.op_kind()
    }
}

#[derive(Debug, Default, Clone)]
pub struct NpuGraph {
    nodes: Vec<Node>,
    names: HashMap<String, NodeId>,
}

impl NpuGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    /// Node currently registered under `name`.
    pub fn get(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub fn require(&self, id: NodeId) -> Result<&Node, GraphError> {
        self.node(id).ok_or(GraphError::UnknownNode { id: id.0 })
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Appends `op` and makes it the node registered under `name`.
    pub fn add_op(&mut self, name: &str, op: NpuOp) -> Result<NodeId, GraphError> {
        for (slot, input) in op.bound_inputs() {
            if self.node(input).is_none() {
                trace!(node = name, slot, %input, "operand refers to a missing node");
                return Err(GraphError::UnknownNode { id: input.0 });
            }
        }

        let id = NodeId(self.nodes.len() as u32);
        let kind = op.op_kind();
        self.nodes.push(Node {
            id,
            name: name.to_string(),
            op,
        });
        if let Some(previous) = self.names.insert(name.to_string(), id) {
            debug!(node = name, %previous, %id, kind = kind.as_str(), "replaced registry entry");
        } else {
            trace!(node = name, %id, kind = kind.as_str(), "registered node");
        }
        Ok(id)
    }

    /// Registers a framework tensor: persistable tensors become constants carrying
    /// their payload, the rest become data placeholders. `shape` overrides the
    /// tensor's own dims when given.
    pub fn add_tensor(
        &mut self,
        name: &str,
        tensor: &Tensor,
        shape: Option<&[u32]>,
    ) -> Result<NodeId, GraphError> {
        let shape = shape.unwrap_or(tensor.dims()).to_vec();
        let data_type = tensor.descriptor.data_type;
        let op = match (&tensor.data, tensor.persistable) {
            (Some(value), true) => {
                validate_shape_data_length(
                    name,
                    tensor.dims(),
                    data_type.bytes_per_element(),
                    value.len(),
                )?;
                NpuOp::Const(ConstOp {
                    data_type,
                    shape,
                    value: value.clone(),
                })
            }
            _ => NpuOp::Data(DataOp { data_type, shape }),
        };
        self.add_op(name, op)
    }

    /// Registers a 1-D int32 constant.
    pub fn add_int32_vector(&mut self, name: &str, values: &[i32]) -> Result<NodeId, GraphError> {
        let op = NpuOp::Const(ConstOp {
            data_type: DataType::Int32,
            shape: vec![values.len() as u32],
            value: ConstantData::from_i32(values),
        });
        self.add_op(name, op)
    }

    pub fn export(&self) -> GraphExport<'_> {
        GraphExport {
            nodes: &self.nodes,
            registry: self
                .names
                .iter()
                .map(|(name, id)| (name.as_str(), *id))
                .collect(),
        }
    }
}

/// Serializable view of a built graph handed to the executor.
#[derive(Debug, Serialize)]
pub struct GraphExport<'a> {
    pub nodes: &'a [Node],
    pub registry: BTreeMap<&'a str, NodeId>,
}
