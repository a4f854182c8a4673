//! End-to-end lowering of `conv2d_transpose` programs through the public API.

use std::collections::HashMap;
use std::io::Write;

use npubridge::npu::ops::{ActivationMode, AttrValue, NpuOp};
use npubridge::npu::{NpuOperator, OpKind};
use npubridge::{
    BridgeRegistry, ContextProperties, DataLayout, DataType, GraphError, KernelDecl, OpDesc,
    Program, ReexecutionHint, Scope, ShapeCheck, Tensor, TypeDecl, convert_program,
    load_program_from_path,
};

fn decl() -> TypeDecl {
    TypeDecl {
        precision: DataType::Float32,
        layout: DataLayout::Nchw,
    }
}

fn deconv_op(input: &str, filter: &str, output: &str) -> OpDesc {
    OpDesc::new("conv2d_transpose")
        .with_input("Input", &[input])
        .with_input("Filter", &[filter])
        .with_output("Output", &[output])
        .with_attr("strides", vec![2, 2])
        .with_attr("paddings", vec![1, 1])
        .with_attr("groups", 1)
        .with_attr("dilations", vec![1, 1])
}

fn kernel() -> KernelDecl {
    KernelDecl::default()
        .with_input("Input", decl())
        .with_input("Filter", decl())
        .with_input("Bias", decl())
        .with_output("Output", decl())
}

fn program(ops: Vec<OpDesc>, scope: Scope) -> Program {
    Program {
        ops: ops
            .into_iter()
            .map(|op| npubridge::graph::ProgramOp {
                op,
                kernel: kernel(),
            })
            .collect(),
        scope,
    }
}

#[test]
fn chained_deconvolutions_share_the_intermediate_node() {
    let mut scope = Scope::new();
    scope.insert("x", Tensor::placeholder(DataType::Float32, vec![1, 4, 8, 8]));
    scope.insert("w0", Tensor::from_f32(vec![4, 8, 3, 3], &[0.25; 288]));
    scope.insert("y0", Tensor::placeholder(DataType::Float32, vec![1, 8, 15, 15]));
    scope.insert("w1", Tensor::from_f32(vec![8, 2, 3, 3], &[0.5; 144]));
    scope.insert("b1", Tensor::from_f32(vec![2], &[1.0, -1.0]));

    let ops = vec![
        deconv_op("x", "w0", "y0"),
        deconv_op("y0", "w1", "y1")
            .with_input("Bias", &["b1"])
            .with_attr("fuse_relu", true),
    ];
    let output = convert_program(
        &BridgeRegistry::with_defaults(),
        &program(ops, scope),
        &ContextProperties::default(),
    )
    .unwrap();
    let graph = &output.graph;

    // The second op consumes the deconvolution registered as `y0` instead of a placeholder.
    let y1 = graph.get("y1").unwrap();
    let relu = graph.node(y1).unwrap();
    assert_eq!(relu.kind(), OpKind::Activation);
    assert_eq!(relu.op.attr("mode"), Some(AttrValue::Int(ActivationMode::Relu as i64)));

    let add = graph.node(relu.op.input("x").unwrap()).unwrap();
    assert_eq!(add.kind(), OpKind::Add);
    let deconv = graph.node(add.op.input("x1").unwrap()).unwrap();
    assert_eq!(deconv.kind(), OpKind::Deconvolution);
    assert_eq!(deconv.op.input("x"), graph.get("y0"));
    assert_eq!(
        graph.node(deconv.op.input("x").unwrap()).unwrap().kind(),
        OpKind::Deconvolution
    );

    let sizes = graph.get("y1/input_sizes").unwrap();
    let NpuOp::Const(sizes) = &graph.node(sizes).unwrap().op else {
        panic!("input sizes should be a constant");
    };
    assert_eq!(sizes.int32_values(), Some(vec![1, 2, 29, 29]));

    assert_eq!(output.hint(), ReexecutionHint::RebuildWhenShapeChanged);
    assert_eq!(output.hints.len(), 2);

    // Only the program input is fed at runtime; `y0` is produced internally.
    assert_eq!(output.shape_guard.shape("y0"), None);
    let fed = HashMap::from([("x".to_string(), vec![1, 4, 8, 8])]);
    assert_eq!(output.shape_guard.check(&fed).unwrap(), ShapeCheck::Reuse);
}

#[test]
fn shape_guard_requests_rebuild_on_new_input_shape() {
    let mut scope = Scope::new();
    scope.insert("x", Tensor::placeholder(DataType::Float32, vec![1, 4, 8, 8]));
    scope.insert("w", Tensor::from_f32(vec![4, 8, 3, 3], &[0.0; 288]));
    let output = convert_program(
        &BridgeRegistry::with_defaults(),
        &program(vec![deconv_op("x", "w", "y")], scope),
        &ContextProperties::default(),
    )
    .unwrap();

    let same = HashMap::from([("x".to_string(), vec![1, 4, 8, 8])]);
    assert_eq!(output.shape_guard.check(&same).unwrap(), ShapeCheck::Reuse);

    let bigger = HashMap::from([("x".to_string(), vec![1, 4, 16, 16])]);
    assert!(matches!(
        output.shape_guard.check(&bigger).unwrap(),
        ShapeCheck::Rebuild { ref name, .. } if name == "x"
    ));
}

#[test]
fn failing_operator_aborts_the_program() {
    let mut scope = Scope::new();
    scope.insert("x", Tensor::placeholder(DataType::Float32, vec![1, 4, 8, 8]));
    scope.insert("w", Tensor::from_f32(vec![4, 8, 3, 3], &[0.0; 288]));
    scope.insert("b", Tensor::from_f32(vec![3], &[0.0; 3]));
    let ops = vec![deconv_op("x", "w", "y").with_input("Bias", &["b"])];

    let err = convert_program(
        &BridgeRegistry::with_defaults(),
        &program(ops, scope),
        &ContextProperties::default(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        GraphError::BiasChannelMismatch {
            expected: 8,
            actual: 3,
            ..
        }
    ));
}

#[test]
fn tensor_limit_rejects_large_filters() {
    let mut scope = Scope::new();
    scope.insert("x", Tensor::placeholder(DataType::Float32, vec![1, 4, 8, 8]));
    scope.insert("w", Tensor::from_f32(vec![4, 8, 3, 3], &[0.0; 288]));
    let props = ContextProperties {
        tensor_byte_length_limit: 1024,
    };
    let err = convert_program(
        &BridgeRegistry::with_defaults(),
        &program(vec![deconv_op("x", "w", "y")], scope),
        &props,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        GraphError::TensorTooLarge {
            byte_length: 1152,
            limit: 1024,
            ..
        }
    ));
}

#[test]
fn lowers_program_loaded_from_json() {
    let mut scope = Scope::new();
    scope.insert("x", Tensor::placeholder(DataType::Float32, vec![1, 1, 3, 3]));
    scope.insert("w", Tensor::from_f32(vec![1, 1, 2, 2], &[1.0; 4]));
    let program = program(vec![deconv_op("x", "w", "y")], scope);

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&serde_json::to_vec(&program).unwrap()).unwrap();

    let loaded = load_program_from_path(file.path()).unwrap();
    let output = convert_program(
        &BridgeRegistry::with_defaults(),
        &loaded,
        &ContextProperties::default(),
    )
    .unwrap();
    let converted = output.to_converted(true).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&converted.data).unwrap();

    let y = value["registry"]["y"].as_u64().unwrap() as usize;
    let node = &value["nodes"][y];
    assert_eq!(node["op"]["kind"], "deconvolution");
    assert_eq!(node["op"]["pad"], serde_json::json!([1, 1, 1, 1]));
    assert_eq!(node["op"]["kernel"], serde_json::json!([2, 2]));
}
