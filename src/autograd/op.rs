//! Operation tags and their backward rules
//!
//! Each recorded node carries one [`Op`]. Variants that need state beyond
//! their inputs (gather indices, softmax output) cache it at construction.

use super::Tensor;
use crate::config::CrossEntropyScaling;
use crate::error::{Error, Result};
use ndarray::{ArrayD, Axis, Ix2};

#[derive(Debug, Clone)]
pub(crate) enum Op {
    Add,
    Sub,
    Mul,
    Matmul,
    Transpose,
    Sum {
        axis: usize,
    },
    Expand {
        axis: usize,
        copies: usize,
    },
    Neg,
    Sigmoid,
    Tanh,
    IndexSelect {
        indices: Vec<usize>,
    },
    CrossEntropy {
        probs: ArrayD<f32>,
        one_hot: ArrayD<f32>,
        batch: usize,
        scaling: CrossEntropyScaling,
    },
}

impl Op {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Op::Add => "add",
            Op::Sub => "sub",
            Op::Mul => "mul",
            Op::Matmul => "matmul",
            Op::Transpose => "transpose",
            Op::Sum { .. } => "sum",
            Op::Expand { .. } => "expand",
            Op::Neg => "neg",
            Op::Sigmoid => "sigmoid",
            Op::Tanh => "tanh",
            Op::IndexSelect { .. } => "index_select",
            Op::CrossEntropy { .. } => "cross_entropy",
        }
    }

    /// Gradient with respect to each parent, in parent order.
    ///
    /// `grad` is the accumulated gradient of the node, `output` its forward
    /// value.
    pub(crate) fn backward(
        &self,
        grad: &ArrayD<f32>,
        output: &ArrayD<f32>,
        parents: &[Tensor],
    ) -> Result<Vec<ArrayD<f32>>> {
        let grads = match self {
            Op::Add => vec![grad.clone(), grad.clone()],
            Op::Sub => vec![grad.clone(), -grad],
            Op::Mul => {
                let a = parents[0].data();
                let b = parents[1].data();
                // ∂L/∂a = ∂L/∂out * b, ∂L/∂b = ∂L/∂out * a
                vec![grad * &*b, grad * &*a]
            }
            Op::Matmul => {
                let a = parents[0].data();
                let b = parents[1].data();
                let a = a.view().into_dimensionality::<Ix2>()?;
                let b = b.view().into_dimensionality::<Ix2>()?;
                let dz = grad.view().into_dimensionality::<Ix2>()?;
                // ∂L/∂A = ∂L/∂C @ B^T, ∂L/∂B = A^T @ ∂L/∂C
                vec![dz.dot(&b.t()).into_dyn(), a.t().dot(&dz).into_dyn()]
            }
            Op::Transpose => vec![grad.t().to_owned()],
            Op::Sum { axis } => {
                let copies = parents[0].data().len_of(Axis(*axis));
                vec![expand_array(grad, *axis, copies)?]
            }
            Op::Expand { axis, copies } => {
                debug_assert_eq!(grad.len_of(Axis(*axis)), *copies);
                vec![grad.sum_axis(Axis(*axis))]
            }
            Op::Neg => vec![-grad],
            Op::Sigmoid => vec![grad * &output.mapv(|z| z * (1.0 - z))],
            Op::Tanh => vec![grad * &output.mapv(|z| 1.0 - z * z)],
            Op::IndexSelect { indices } => {
                let source = parents[0].data();
                let mut rows_shape = vec![indices.len()];
                rows_shape.extend_from_slice(&source.shape()[1..]);
                let rows = grad.to_shape(rows_shape)?;

                // Scatter-add: repeated indices accumulate.
                let mut da = ArrayD::zeros(source.raw_dim());
                for (row, &index) in rows.outer_iter().zip(indices) {
                    let mut target = da.index_axis_mut(Axis(0), index);
                    target += &row;
                }
                vec![da]
            }
            Op::CrossEntropy {
                probs,
                one_hot,
                batch,
                scaling,
            } => {
                let upstream = grad.sum() * scaling.factor(*batch);
                vec![(probs - one_hot) * upstream]
            }
        };

        debug_assert_eq!(grads.len(), parents.len());
        Ok(grads)
    }
}

/// Repeat `x` `copies` times along a new axis inserted at `axis`
pub(crate) fn expand_array(x: &ArrayD<f32>, axis: usize, copies: usize) -> Result<ArrayD<f32>> {
    if axis > x.ndim() {
        return Err(Error::AxisOutOfBounds {
            axis,
            ndim: x.ndim(),
        });
    }
    let mut shape = x.shape().to_vec();
    shape.insert(axis, copies);

    let lifted = x.view().insert_axis(Axis(axis));
    let expanded = lifted
        .broadcast(shape.clone())
        .ok_or_else(|| Error::ShapeMismatch {
            expected: shape,
            got: lifted.shape().to_vec(),
        })?;
    Ok(expanded.to_owned())
}
