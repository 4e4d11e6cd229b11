//! Finite-difference gradient verification
//!
//! Compares gradients from the backward pass against central differences of
//! `sum(f(x))`. Useful for validating custom compositions of operations.

use crate::autograd::Tensor;
use crate::config::GradCheckConfig;
use crate::error::{Error, Result};
use ndarray::ArrayD;

/// Outcome of a passed gradient check
#[derive(Debug, Clone)]
pub struct GradCheckReport {
    /// Gradient from the backward pass
    pub analytic: ArrayD<f32>,
    /// Gradient from central differences
    pub numerical: ArrayD<f32>,
    /// Largest scaled error between the two
    pub max_error: f32,
}

/// Compute `d sum(f(x)) / dx` with central differences
///
/// `f` is evaluated on tensors that do not require grad, so no graph is
/// recorded.
pub fn numerical_gradient<F>(f: F, x: &ArrayD<f32>, epsilon: f32) -> Result<ArrayD<f32>>
where
    F: Fn(&Tensor) -> Result<Tensor>,
{
    let eval = |point: &ArrayD<f32>| -> Result<f32> {
        let out = f(&Tensor::new(point.clone(), false))?;
        let total = out.data().sum();
        Ok(total)
    };

    let mut grad = ArrayD::zeros(x.raw_dim());
    let mut perturbed = x.clone();
    for (index, &value) in x.indexed_iter() {
        perturbed[&index] = value + epsilon;
        let f_plus = eval(&perturbed)?;
        perturbed[&index] = value - epsilon;
        let f_minus = eval(&perturbed)?;
        perturbed[&index] = value;

        grad[&index] = (f_plus - f_minus) / (2.0 * epsilon);
    }
    Ok(grad)
}

/// Largest absolute element-wise difference
pub fn max_abs_error(a: &ArrayD<f32>, b: &ArrayD<f32>) -> Result<f32> {
    if a.shape() != b.shape() {
        return Err(Error::ShapeMismatch {
            expected: a.shape().to_vec(),
            got: b.shape().to_vec(),
        });
    }
    Ok(a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f32::max))
}

/// Check the backward pass of `f` at `x` against central differences
///
/// Errors are scaled by `max(1, |analytic|, |numerical|)`, so the tolerance
/// is absolute for small gradients and relative for large ones.
pub fn check_gradient<F>(f: F, x: &ArrayD<f32>, config: &GradCheckConfig) -> Result<GradCheckReport>
where
    F: Fn(&Tensor) -> Result<Tensor>,
{
    let input = Tensor::new(x.clone(), true);
    let output = f(&input)?;
    output.backward(None)?;
    let analytic = input
        .grad()
        .unwrap_or_else(|| ArrayD::zeros(x.raw_dim()));

    let numerical = numerical_gradient(&f, x, config.epsilon)?;

    let max_error = analytic
        .iter()
        .zip(numerical.iter())
        .map(|(&a, &n)| (a - n).abs() / 1.0f32.max(a.abs()).max(n.abs()))
        .fold(0.0, f32::max);

    tracing::debug!(max_error, tolerance = config.tolerance, "gradient check");
    if max_error > config.tolerance {
        return Err(Error::GradientMismatch {
            max_error,
            tolerance: config.tolerance,
        });
    }

    Ok(GradCheckReport {
        analytic,
        numerical,
        max_error,
    })
}
