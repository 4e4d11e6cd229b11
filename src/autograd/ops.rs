//! Autograd operations with backward passes
//!
//! Every operation computes its forward value eagerly and records a graph
//! node when any input requires grad. Shapes must match exactly; nothing is
//! broadcast implicitly.

use super::op::{expand_array, Op};
use super::Tensor;
use crate::config::CrossEntropyScaling;
use crate::error::{Error, Result};
use ndarray::{Array2, ArrayD, Axis, Ix2, IxDyn};

fn ensure_same_shape(a: &ArrayD<f32>, b: &ArrayD<f32>) -> Result<()> {
    if a.shape() != b.shape() {
        return Err(Error::ShapeMismatch {
            expected: a.shape().to_vec(),
            got: b.shape().to_vec(),
        });
    }
    Ok(())
}

fn ensure_rank(op: &'static str, x: &ArrayD<f32>, expected: usize) -> Result<()> {
    if x.ndim() != expected {
        return Err(Error::RankMismatch {
            op,
            expected,
            got: x.ndim(),
        });
    }
    Ok(())
}

/// Add two tensors
pub fn add(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    let data = {
        let (x, y) = (a.data(), b.data());
        ensure_same_shape(&x, &y)?;
        &*x + &*y
    };
    Ok(Tensor::from_op(data, Op::Add, vec![a.clone(), b.clone()]))
}

/// Subtract `b` from `a`
pub fn sub(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    let data = {
        let (x, y) = (a.data(), b.data());
        ensure_same_shape(&x, &y)?;
        &*x - &*y
    };
    Ok(Tensor::from_op(data, Op::Sub, vec![a.clone(), b.clone()]))
}

/// Multiply two tensors element-wise
pub fn mul(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    let data = {
        let (x, y) = (a.data(), b.data());
        ensure_same_shape(&x, &y)?;
        &*x * &*y
    };
    Ok(Tensor::from_op(data, Op::Mul, vec![a.clone(), b.clone()]))
}

/// Matrix multiplication
///
/// Computes C = A @ B for rank-2 `a` (m×k) and `b` (k×n).
pub fn matmul(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    let data = {
        let (x, y) = (a.data(), b.data());
        ensure_rank("matmul", &x, 2)?;
        ensure_rank("matmul", &y, 2)?;
        if x.shape()[1] != y.shape()[0] {
            return Err(Error::MatmulMismatch {
                left: x.shape().to_vec(),
                right: y.shape().to_vec(),
            });
        }
        let x = x.view().into_dimensionality::<Ix2>()?;
        let y = y.view().into_dimensionality::<Ix2>()?;
        x.dot(&y).into_dyn()
    };
    Ok(Tensor::from_op(data, Op::Matmul, vec![a.clone(), b.clone()]))
}

/// Reverse the axes (matrix transpose for rank 2)
pub fn transpose(a: &Tensor) -> Tensor {
    let data = a.data().t().to_owned();
    Tensor::from_op(data, Op::Transpose, vec![a.clone()])
}

/// Sum along `axis`, removing it
pub fn sum(a: &Tensor, axis: usize) -> Result<Tensor> {
    let data = {
        let x = a.data();
        if axis >= x.ndim() {
            return Err(Error::AxisOutOfBounds {
                axis,
                ndim: x.ndim(),
            });
        }
        x.sum_axis(Axis(axis))
    };
    Ok(Tensor::from_op(data, Op::Sum { axis }, vec![a.clone()]))
}

/// Repeat `a` `copies` times along a new axis inserted at `axis`
pub fn expand(a: &Tensor, axis: usize, copies: usize) -> Result<Tensor> {
    let data = expand_array(&a.data(), axis, copies)?;
    Ok(Tensor::from_op(
        data,
        Op::Expand { axis, copies },
        vec![a.clone()],
    ))
}

/// Negate every element
pub fn neg(a: &Tensor) -> Tensor {
    let data = -&*a.data();
    Tensor::from_op(data, Op::Neg, vec![a.clone()])
}

/// Logistic sigmoid, 1 / (1 + e^(-x))
pub fn sigmoid(a: &Tensor) -> Tensor {
    let data = a.data().mapv(|x| 1.0 / (1.0 + (-x).exp()));
    Tensor::from_op(data, Op::Sigmoid, vec![a.clone()])
}

/// Hyperbolic tangent
pub fn tanh(a: &Tensor) -> Tensor {
    let data = a.data().mapv(f32::tanh);
    Tensor::from_op(data, Op::Tanh, vec![a.clone()])
}

/// Gather rows (entries along axis 0) of `a`
pub fn index_select(a: &Tensor, indices: &[usize]) -> Result<Tensor> {
    let indices = ArrayD::from_shape_vec(IxDyn(&[indices.len()]), indices.to_vec())?;
    index_select_nd(a, &indices)
}

/// Gather rows of `a` for an arbitrarily shaped index array
///
/// The output shape is the index shape followed by the row shape, so a
/// `[batch, seq]` index array over a `[vocab, dim]` table yields
/// `[batch, seq, dim]`.
pub fn index_select_nd(a: &Tensor, indices: &ArrayD<usize>) -> Result<Tensor> {
    let flat: Vec<usize> = indices.iter().copied().collect();
    let data = {
        let x = a.data();
        if x.ndim() == 0 {
            return Err(Error::RankMismatch {
                op: "index_select",
                expected: 1,
                got: 0,
            });
        }
        let len = x.len_of(Axis(0));
        if let Some(&index) = flat.iter().find(|&&i| i >= len) {
            return Err(Error::IndexOutOfBounds { index, len });
        }

        let mut out_shape = indices.shape().to_vec();
        out_shape.extend_from_slice(&x.shape()[1..]);
        x.select(Axis(0), &flat)
            .to_shape(out_shape)?
            .into_owned()
    };
    Ok(Tensor::from_op(
        data,
        Op::IndexSelect { indices: flat },
        vec![a.clone()],
    ))
}

/// Fused softmax + cross-entropy with the default gradient scaling
///
/// See [`cross_entropy_with`].
pub fn cross_entropy(logits: &Tensor, targets: &[usize]) -> Result<Tensor> {
    cross_entropy_with(logits, targets, CrossEntropyScaling::default())
}

/// Fused softmax + cross-entropy
///
/// Softmax runs over the last axis of `logits`; every other axis is
/// flattened into one row per entry of `targets`. The result is a 0-d
/// tensor holding the batch mean of `-ln p[target]`.
///
/// The gradient flowing back to `logits` is `softmax - one_hot`, multiplied
/// by `1 / batch` only under [`CrossEntropyScaling::Mean`].
pub fn cross_entropy_with(
    logits: &Tensor,
    targets: &[usize],
    scaling: CrossEntropyScaling,
) -> Result<Tensor> {
    let (loss, probs, one_hot) = {
        let x = logits.data();
        if x.ndim() == 0 {
            return Err(Error::RankMismatch {
                op: "cross_entropy",
                expected: 1,
                got: 0,
            });
        }
        let classes = x.shape()[x.ndim() - 1];
        let batch = targets.len();
        if batch == 0 || batch * classes != x.len() {
            return Err(Error::ShapeMismatch {
                expected: vec![batch, classes],
                got: x.shape().to_vec(),
            });
        }
        if let Some(&target) = targets.iter().find(|&&t| t >= classes) {
            return Err(Error::InvalidTarget { target, classes });
        }

        let rows = x.to_shape((batch, classes))?;
        let mut probs = Array2::<f32>::zeros((batch, classes));
        let mut total_loss = 0.0f32;
        for ((mut out, row), &target) in probs
            .outer_iter_mut()
            .zip(rows.outer_iter())
            .zip(targets)
        {
            let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
            out.assign(&row.mapv(|v| (v - max).exp()));
            let total = out.sum();
            out /= total;

            // -ln p[target] in log-sum-exp form; stays finite when
            // p[target] underflows to zero.
            total_loss += max + total.ln() - row[target];
        }

        let mut one_hot = Array2::<f32>::zeros((batch, classes));
        for (row, &target) in targets.iter().enumerate() {
            one_hot[[row, target]] = 1.0;
        }

        let loss = total_loss / batch as f32;

        let probs = probs.into_shape_with_order(x.raw_dim())?;
        let one_hot = one_hot.into_shape_with_order(x.raw_dim())?;
        (loss, probs, one_hot)
    };

    let op = Op::CrossEntropy {
        probs,
        one_hot,
        batch: targets.len(),
        scaling,
    };
    Ok(Tensor::from_op(
        ArrayD::from_elem(IxDyn(&[]), loss),
        op,
        vec![logits.clone()],
    ))
}

impl Tensor {
    /// Matrix product with `other`
    pub fn matmul(&self, other: &Tensor) -> Result<Tensor> {
        matmul(self, other)
    }

    /// Transposed copy
    pub fn transpose(&self) -> Tensor {
        transpose(self)
    }

    /// Sum along `axis`
    pub fn sum(&self, axis: usize) -> Result<Tensor> {
        sum(self, axis)
    }

    /// Repeat along a new axis
    pub fn expand(&self, axis: usize, copies: usize) -> Result<Tensor> {
        expand(self, axis, copies)
    }

    pub fn sigmoid(&self) -> Tensor {
        sigmoid(self)
    }

    pub fn tanh(&self) -> Tensor {
        tanh(self)
    }

    /// Gather rows at `indices`
    pub fn index_select(&self, indices: &[usize]) -> Result<Tensor> {
        index_select(self, indices)
    }

    /// Gather rows for a shaped index array
    pub fn index_select_nd(&self, indices: &ArrayD<usize>) -> Result<Tensor> {
        index_select_nd(self, indices)
    }

    /// Softmax cross-entropy against class indices
    pub fn cross_entropy(&self, targets: &[usize]) -> Result<Tensor> {
        cross_entropy(self, targets)
    }

    /// Softmax cross-entropy with explicit gradient scaling
    pub fn cross_entropy_with(
        &self,
        targets: &[usize],
        scaling: CrossEntropyScaling,
    ) -> Result<Tensor> {
        cross_entropy_with(self, targets, scaling)
    }
}

macro_rules! impl_binary_operator {
    ($trait:ident, $method:ident, $op:path) => {
        impl std::ops::$trait<&Tensor> for &Tensor {
            type Output = Tensor;

            /// # Panics
            ///
            /// Panics if the shapes differ, like the ndarray operators do.
            /// Use the function form to get an error instead.
            fn $method(self, rhs: &Tensor) -> Tensor {
                $op(self, rhs).unwrap_or_else(|e| panic!("{e}"))
            }
        }
    };
}

impl_binary_operator!(Add, add, add);
impl_binary_operator!(Sub, sub, sub);
impl_binary_operator!(Mul, mul, mul);

impl std::ops::Neg for &Tensor {
    type Output = Tensor;

    fn neg(self) -> Tensor {
        neg(self)
    }
}
