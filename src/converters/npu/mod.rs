//! Bridges lowering framework operators onto the NPU graph.

pub mod conv_transpose;
pub mod emitter;
pub mod geometry;
