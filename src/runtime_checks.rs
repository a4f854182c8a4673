use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::error::GraphError;
use crate::graph::Scope;

/// Outcome of comparing runtime shapes against the ones a subgraph was built for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeCheck {
    Reuse,
    Rebuild {
        name: String,
        built: Vec<u32>,
        actual: Vec<u32>,
    },
}

/// Input shapes captured when a subgraph was emitted. Output sizes are baked into
/// constant nodes, so any change in these shapes invalidates the subgraph.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ShapeGuard {
    bound_shapes: BTreeMap<String, Vec<u32>>,
}

impl ShapeGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn capture<'a>(
        scope: &Scope,
        names: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, GraphError> {
        let mut guard = Self::new();
        for name in names {
            let tensor = scope
                .find_tensor(name)
                .ok_or_else(|| GraphError::MissingTensor {
                    name: name.to_string(),
                })?;
            guard.bind(name, tensor.dims().to_vec());
        }
        Ok(guard)
    }

    pub fn bind(&mut self, name: &str, shape: Vec<u32>) {
        self.bound_shapes.insert(name.to_string(), shape);
    }

    pub fn shape(&self, name: &str) -> Option<&[u32]> {
        self.bound_shapes.get(name).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.bound_shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bound_shapes.is_empty()
    }

    pub fn check(&self, actual_shapes: &HashMap<String, Vec<u32>>) -> Result<ShapeCheck, GraphError> {
        for name in self.bound_shapes.keys() {
            if !actual_shapes.contains_key(name) {
                return Err(GraphError::RuntimeTensorMissing { name: name.clone() });
            }
        }

        for name in actual_shapes.keys() {
            if !self.bound_shapes.contains_key(name) {
                return Err(GraphError::RuntimeTensorUnexpected { name: name.clone() });
            }
        }

        for (name, built) in &self.bound_shapes {
            let actual = &actual_shapes[name];
            if actual != built {
                debug!(tensor = %name, ?built, ?actual, "input shape changed, rebuild required");
                return Ok(ShapeCheck::Rebuild {
                    name: name.clone(),
                    built: built.clone(),
                    actual: actual.clone(),
                });
            }
        }

        Ok(ShapeCheck::Reuse)
    }
}

pub fn validate_shape_data_length(
    name: &str,
    shape: &[u32],
    bytes_per_element: usize,
    data_len: usize,
) -> Result<(), GraphError> {
    let expected = shape
        .iter()
        .try_fold(bytes_per_element, |acc, &dim| acc.checked_mul(dim as usize))
        .ok_or_else(|| GraphError::RuntimeTensorShapeOverflow {
            name: name.to_string(),
            shape: shape.to_vec(),
        })?;

    if data_len != expected {
        return Err(GraphError::RuntimeTensorDataLengthMismatch {
            name: name.to_string(),
            expected,
            actual: data_len,
        });
    }

    Ok(())
}
