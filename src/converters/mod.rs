use std::collections::{BTreeSet, HashMap};

use serde::Serialize;
use tracing::{debug, info};

use crate::context::{BridgeContext, ContextProperties};
use crate::error::GraphError;
use crate::graph::{KernelDecl, OpDesc, Program};
use crate::npu::NpuGraph;
use crate::runtime_checks::ShapeGuard;

pub mod npu;

/// What the caller must do with a built subgraph when inputs change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReexecutionHint {
    Reuse,
    RebuildWhenShapeChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Npu,
}

impl TargetKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TargetKind::Npu => "npu",
        }
    }
}

pub type BridgeFn =
    fn(&mut BridgeContext<'_>, &OpDesc, &KernelDecl) -> Result<ReexecutionHint, GraphError>;

#[derive(Clone, Copy)]
pub struct BridgeEntry {
    pub op_type: &'static str,
    pub target: TargetKind,
    pub convert: BridgeFn,
}

static DEFAULT_BRIDGES: &[BridgeEntry] = &[BridgeEntry {
    op_type: npu::conv_transpose::OP_TYPE,
    target: TargetKind::Npu,
    convert: npu::conv_transpose::convert,
}];

/// Serialized graph ready to hand to an executor.
#[derive(Debug, Clone)]
pub struct ConvertedGraph {
    pub format: &'static str,
    pub content_type: &'static str,
    pub data: Vec<u8>,
}

/// Lookup from `(op_type, target)` to the bridge that lowers it.
#[derive(Default)]
pub struct BridgeRegistry {
    bridges: HashMap<(String, TargetKind), BridgeFn>,
}

impl BridgeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for entry in DEFAULT_BRIDGES {
            registry.register(entry.op_type, entry.target, entry.convert);
        }
        registry
    }

    /// Returns the bridge previously registered for the key, if any.
    pub fn register(
        &mut self,
        op_type: impl Into<String>,
        target: TargetKind,
        convert: BridgeFn,
    ) -> Option<BridgeFn> {
        self.bridges.insert((op_type.into(), target), convert)
    }

    pub fn get(&self, op_type: &str, target: TargetKind) -> Option<BridgeFn> {
        self.bridges.get(&(op_type.to_string(), target)).copied()
    }

    pub fn contains(&self, op_type: &str, target: TargetKind) -> bool {
        self.get(op_type, target).is_some()
    }

    pub fn convert(
        &self,
        target: TargetKind,
        ctx: &mut BridgeContext<'_>,
        op: &OpDesc,
        kernel: &KernelDecl,
    ) -> Result<ReexecutionHint, GraphError> {
        let bridge =
            self.get(&op.op_type, target)
                .ok_or_else(|| GraphError::UnsupportedOperation {
                    op_type: op.op_type.clone(),
                    target: target.as_str().to_string(),
                })?;
        bridge(ctx, op, kernel)
    }
}

/// Result of lowering a whole program onto one NPU graph.
#[derive(Debug)]
pub struct ProgramOutput {
    pub graph: NpuGraph,
    /// Per-operator hint, keyed by the operator's first output name.
    pub hints: Vec<(String, ReexecutionHint)>,
    pub shape_guard: ShapeGuard,
}

impl ProgramOutput {
    pub fn hint(&self) -> ReexecutionHint {
        if self
            .hints
            .iter()
            .any(|(_, hint)| *hint == ReexecutionHint::RebuildWhenShapeChanged)
        {
            ReexecutionHint::RebuildWhenShapeChanged
        } else {
            ReexecutionHint::Reuse
        }
    }

    pub fn to_converted(&self, pretty: bool) -> Result<ConvertedGraph, GraphError> {
        let export = self.graph.export();
        let data = if pretty {
            serde_json::to_vec_pretty(&export)?
        } else {
            serde_json::to_vec(&export)?
        };
        Ok(ConvertedGraph {
            format: TargetKind::Npu.as_str(),
            content_type: "application/json",
            data,
        })
    }
}

fn op_label(op: &OpDesc) -> String {
    op.outputs
        .values()
        .flatten()
        .next()
        .cloned()
        .unwrap_or_else(|| op.op_type.clone())
}

/// Lowers every operator of `program`, in order, into a fresh graph. The first
/// failing operator aborts the whole build.
pub fn convert_program(
    registry: &BridgeRegistry,
    program: &Program,
    props: &ContextProperties,
) -> Result<ProgramOutput, GraphError> {
    let mut graph = NpuGraph::new();
    let mut hints = Vec::with_capacity(program.ops.len());

    for (index, program_op) in program.ops.iter().enumerate() {
        let op = &program_op.op;
        debug!(index, op_type = %op.op_type, "lowering operator");
        let mut ctx = BridgeContext::new(&mut graph, &program.scope, props);
        let hint = registry.convert(TargetKind::Npu, &mut ctx, op, &program_op.kernel)?;
        hints.push((op_label(op), hint));
    }

    // Tensors produced inside the program are not fed at runtime.
    let produced: BTreeSet<&str> = program
        .ops
        .iter()
        .flat_map(|program_op| program_op.op.outputs.values().flatten())
        .map(String::as_str)
        .collect();
    let runtime_inputs: BTreeSet<&str> = program
        .ops
        .iter()
        .flat_map(|program_op| program_op.op.inputs.values().flatten())
        .map(String::as_str)
        .filter(|name| !produced.contains(name))
        .filter(|name| {
            program
                .scope
                .find_tensor(name)
                .is_some_and(|tensor| !tensor.persistable)
        })
        .collect();
    let shape_guard = ShapeGuard::capture(&program.scope, runtime_inputs)?;

    info!(
        ops = program.ops.len(),
        nodes = graph.len(),
        guarded_inputs = shape_guard.len(),
        "program lowered"
    );
    Ok(ProgramOutput {
        graph,
        hints,
        shape_guard,
    })
}
