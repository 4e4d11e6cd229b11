#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tensorgrad::autograd::{add, mul, neg, sub, Tensor};

/// Fuzz target for graph construction and the backward pass
///
/// Builds a random DAG over a pool of tensors and runs backward from the last
/// node. Operations must return errors rather than panic, and every leaf that
/// feeds the root must end up with a gradient of its own shape.

#[derive(Arbitrary, Debug)]
enum Step {
    Add(u8, u8),
    Sub(u8, u8),
    Mul(u8, u8),
    Neg(u8),
    Sigmoid(u8),
    Tanh(u8),
    Matmul(u8, u8),
    Transpose(u8),
    Sum(u8, u8),
    Expand(u8, u8, u8),
    IndexSelect(u8, Vec<u8>),
    CrossEntropy(u8, Vec<u8>),
}

#[derive(Arbitrary, Debug)]
struct GraphFuzzInput {
    rows: u8,
    cols: u8,
    values: Vec<u8>,
    steps: Vec<Step>,
}

fn byte_to_f32(b: u8) -> f32 {
    // Map 0..255 to -4.0..4.0
    (b as f32) / 255.0 * 8.0 - 4.0
}

fuzz_target!(|input: GraphFuzzInput| {
    let rows = (input.rows as usize % 4) + 1;
    let cols = (input.cols as usize % 4) + 1;
    let count = rows * cols;
    if input.values.len() < count {
        return;
    }

    let data: Vec<f32> = input.values.iter().take(count).map(|&b| byte_to_f32(b)).collect();
    let Ok(leaf) = Tensor::from_shape_vec(&[rows, cols], data, true) else {
        return;
    };

    let mut pool = vec![leaf.clone()];
    for step in input.steps.iter().take(32) {
        let pick = |i: &u8| pool[*i as usize % pool.len()].clone();
        let result = match step {
            Step::Add(a, b) => add(&pick(a), &pick(b)),
            Step::Sub(a, b) => sub(&pick(a), &pick(b)),
            Step::Mul(a, b) => mul(&pick(a), &pick(b)),
            Step::Neg(a) => Ok(neg(&pick(a))),
            Step::Sigmoid(a) => Ok(pick(a).sigmoid()),
            Step::Tanh(a) => Ok(pick(a).tanh()),
            Step::Matmul(a, b) => pick(a).matmul(&pick(b)),
            Step::Transpose(a) => {
                let t = pick(a);
                if t.ndim() == 2 {
                    Ok(t.transpose())
                } else {
                    continue;
                }
            }
            Step::Sum(a, axis) => pick(a).sum(*axis as usize % 3),
            Step::Expand(a, axis, copies) => {
                pick(a).expand(*axis as usize % 3, (*copies as usize % 3) + 1)
            }
            Step::IndexSelect(a, idx) => {
                let indices: Vec<usize> = idx.iter().take(8).map(|&i| i as usize % 5).collect();
                pick(a).index_select(&indices)
            }
            Step::CrossEntropy(a, targets) => {
                let targets: Vec<usize> = targets.iter().take(8).map(|&t| t as usize % 5).collect();
                pick(a).cross_entropy(&targets)
            }
        };
        if let Ok(t) = result {
            // Keep tensors small so the graph stays cheap to evaluate
            if t.len() <= 256 {
                pool.push(t);
            }
        }
    }

    // Only the root survives, so dropped branches release their parents
    let root = pool.pop().unwrap_or_else(|| leaf.clone());
    drop(pool);

    if root.backward(None).is_ok() && root.requires_grad() {
        if let Some(grad) = leaf.grad() {
            assert_eq!(grad.shape(), leaf.data().shape());
        }
    }
});
