use serde::{Deserialize, Serialize};

use crate::graph::Scope;
use crate::npu::NpuGraph;

pub const DEFAULT_TENSOR_BYTE_LENGTH_LIMIT: usize = 64 * 1024 * 1024;

/// Knobs applied to every bridge invoked during one graph build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextProperties {
    /// Largest constant payload a bridge may copy into the graph.
    pub tensor_byte_length_limit: usize,
}

impl Default for ContextProperties {
    fn default() -> Self {
        Self {
            tensor_byte_length_limit: DEFAULT_TENSOR_BYTE_LENGTH_LIMIT,
        }
    }
}

/// State a bridge works against. The graph is borrowed mutably for the whole call,
/// so two bridges can never build into the same graph at once.
pub struct BridgeContext<'a> {
    pub graph: &'a mut NpuGraph,
    pub scope: &'a Scope,
    pub props: &'a ContextProperties,
}

impl<'a> BridgeContext<'a> {
    pub fn new(graph: &'a mut NpuGraph, scope: &'a Scope, props: &'a ContextProperties) -> Self {
        Self {
            graph,
            scope,
            props,
        }
    }
}
