//! Error types for tensorgrad

use crate::autograd::TensorId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("Matmul shape mismatch: cannot multiply {left:?} by {right:?}")]
    MatmulMismatch { left: Vec<usize>, right: Vec<usize> },

    #[error("{op} expects a rank-{expected} tensor, got rank {got}")]
    RankMismatch {
        op: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("Axis {axis} is out of bounds for a tensor with {ndim} dimensions")]
    AxisOutOfBounds { axis: usize, ndim: usize },

    #[error("Index {index} is out of bounds for axis of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("Target class {target} is out of range for {classes} classes")]
    InvalidTarget { target: usize, classes: usize },

    #[error("Tensor {node} already received every gradient expected from child {child}")]
    DoubleReport { node: TensorId, child: TensorId },

    #[error("Gradient tensors must not require grad (higher-order gradients are unsupported)")]
    SecondOrderGradient,

    #[error("Gradient check failed: max error {max_error} exceeds tolerance {tolerance}")]
    GradientMismatch { max_error: f32, tolerance: f32 },

    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

pub type Result<T> = std::result::Result<T, Error>;
