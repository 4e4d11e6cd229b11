//! Dependency-counted autograd engine
//!
//! Operations build a DAG of [`Tensor`] nodes eagerly. Each parent counts the
//! gradient contributions its children still owe, so a node reached along
//! several paths propagates only after every path has reported.

mod backward;
mod context;
mod op;
mod ops;
mod pending;
mod tensor;


pub use context::Context;
pub use ops::*;
pub use tensor::{Tensor, TensorId};

use crate::error::Result;
use ndarray::ArrayD;

/// Perform backward pass on a tensor from a raw gradient buffer
///
/// Equivalent to [`Tensor::backward`]; `None` seeds with ones.
pub fn backward(tensor: &Tensor, grad_output: Option<ArrayD<f32>>) -> Result<()> {
    match grad_output {
        Some(grad) => tensor.backward(Some(&Tensor::new(grad, false))),
        None => tensor.backward(None),
    }
}
