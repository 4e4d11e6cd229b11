//! Integration tests for the autograd engine.
//!
//! Exercises the public API end to end: graph construction, dependency
//! counting across shared subexpressions, and a small training loop.

use approx::assert_abs_diff_eq;
use ndarray::{arr1, arr2, ArrayD, IxDyn};
use tensorgrad::autograd::{add, backward, cross_entropy, mul, sub, Tensor};
use tensorgrad::config::parse_config;
use tensorgrad::gradcheck::check_gradient;
use tensorgrad::{Context, CrossEntropyScaling, Error};

/// Plain gradient-descent update using the accumulated gradients
fn sgd_step(params: &[&Tensor], lr: f32) {
    for p in params {
        if let Some(grad) = p.grad() {
            p.data_mut().scaled_add(-lr, &grad);
        }
        p.zero_grad();
    }
}

#[test]
fn test_tensor_zeros_and_ones() {
    let z = Tensor::zeros(&[5], true);
    assert_eq!(z.len(), 5);
    assert!(z.data().iter().all(|&v| v == 0.0));

    let o = Tensor::ones(&[2, 2], false);
    assert_eq!(o.shape(), vec![2, 2]);
    assert!(o.data().iter().all(|&v| v == 1.0));
}

#[test]
fn test_chain_rule_through_composition() {
    // y = tanh(sigmoid(x) * w)
    let x = Tensor::from_vec(vec![0.5, -0.25], true);
    let w = Tensor::from_vec(vec![2.0, -1.5], true);
    let s = x.sigmoid();
    let y = mul(&s, &w).unwrap().tanh();

    y.backward(None).unwrap();

    let gx = x.grad().unwrap();
    let gw = w.grad().unwrap();
    for i in 0..2 {
        let xv = x.data()[i];
        let wv = w.data()[i];
        let sv = 1.0 / (1.0 + (-xv).exp());
        let dt = 1.0 - (sv * wv).tanh().powi(2);
        assert_abs_diff_eq!(gx[i], dt * wv * sv * (1.0 - sv), epsilon = 1e-6);
        assert_abs_diff_eq!(gw[i], dt * sv, epsilon = 1e-6);
    }
}

#[test]
fn test_gradient_independent_of_path_order() {
    let run = |flip: bool| {
        let x = Tensor::from_vec(vec![1.5, -0.5], true);
        let a = x.tanh();
        let b = x.sigmoid();
        let y = if flip {
            add(&b, &mul(&a, &x).unwrap()).unwrap()
        } else {
            add(&mul(&a, &x).unwrap(), &b).unwrap()
        };
        y.backward(None).unwrap();
        x.grad().unwrap()
    };

    let g1 = run(false);
    let g2 = run(true);
    for (a, b) in g1.iter().zip(g2.iter()) {
        assert_abs_diff_eq!(a, b, epsilon = 1e-6);
    }
}

#[test]
fn test_sum_over_axis_after_expand_scales_gradient() {
    let v = Tensor::from_vec(vec![1.0, 2.0], true);
    let wide = v.expand(1, 3).unwrap();
    assert_eq!(wide.shape(), vec![2, 3]);
    let total = wide.sum(1).unwrap();
    assert_eq!(*total.data(), arr1(&[3.0, 6.0]).into_dyn());

    total.backward(None).unwrap();
    assert_eq!(v.grad().unwrap(), arr1(&[3.0, 3.0]).into_dyn());
}

#[test]
fn test_backward_free_function_with_raw_gradient() {
    let a = Tensor::new(arr2(&[[1.0, 2.0], [3.0, 4.0]]), true);
    let b = a.transpose();
    backward(&b, Some(arr2(&[[1.0, 0.0], [0.0, 0.0]]).into_dyn())).unwrap();

    assert_eq!(a.grad().unwrap(), arr2(&[[1.0, 0.0], [0.0, 0.0]]).into_dyn());
}

#[test]
fn test_second_backward_on_same_graph_errors() {
    let x = Tensor::from_vec(vec![1.0], true);
    let y = sub(&x, &Tensor::from_vec(vec![3.0], false)).unwrap();

    y.backward(None).unwrap();
    assert!(matches!(y.backward(None), Err(Error::DoubleReport { .. })));
    assert_eq!(x.grad().unwrap(), arr1(&[1.0]).into_dyn());
}

#[test]
fn test_fresh_forward_allows_another_backward() {
    let x = Tensor::from_vec(vec![2.0], true);

    for step in 1..=3 {
        let y = mul(&x, &x).unwrap();
        y.backward(None).unwrap();
        assert_eq!(x.grad().unwrap(), arr1(&[4.0 * step as f32]).into_dyn());
    }
}

#[test]
fn test_embedding_lookup_gradient() {
    let table = Tensor::uniform(&[5, 3], -0.1, 0.1, true).unwrap();
    let tokens = ArrayD::from_shape_vec(IxDyn(&[2, 2]), vec![1, 4, 1, 1]).unwrap();
    let embedded = table.index_select_nd(&tokens).unwrap();
    assert_eq!(embedded.shape(), vec![2, 2, 3]);

    embedded.backward(None).unwrap();
    let grad = table.grad().unwrap();
    assert_eq!(grad.row_sum(0), 0.0);
    assert_eq!(grad.row_sum(1), 9.0);
    assert_eq!(grad.row_sum(4), 3.0);
}

trait RowSum {
    fn row_sum(&self, row: usize) -> f32;
}

impl RowSum for ArrayD<f32> {
    fn row_sum(&self, row: usize) -> f32 {
        self.index_axis(ndarray::Axis(0), row).sum()
    }
}

#[test]
fn test_gradcheck_two_layer_network() {
    let w1 = arr2(&[[0.3f32, -0.2, 0.5], [0.1, 0.4, -0.6]]).into_dyn();
    let w2 = arr2(&[[0.7f32, -0.1], [0.2, 0.3], [-0.5, 0.6]]).into_dyn();
    let x = arr2(&[[1.0f32, -1.0], [0.5, 2.0]]).into_dyn();

    let report = check_gradient(
        |w: &Tensor| {
            let input = Tensor::new(x.clone(), false);
            let hidden = input.matmul(w)?.tanh();
            hidden.matmul(&Tensor::new(w2.clone(), false))?.sigmoid().sum(0)
        },
        &w1,
        &Default::default(),
    )
    .unwrap();
    assert!(report.max_error < 5e-2);
}

#[test]
fn test_training_reduces_cross_entropy() {
    // Linearly separable two-class problem
    let inputs = Tensor::new(
        arr2(&[[1.0, 0.0], [0.9, 0.1], [0.0, 1.0], [0.1, 0.9]]),
        false,
    );
    let targets = [0usize, 0, 1, 1];
    let weights = Tensor::uniform(&[2, 2], -0.1, 0.1, true).unwrap();

    let ctx = Context::with_config(
        parse_config("cross_entropy:\n  scaling: mean\n").unwrap(),
    )
    .unwrap();

    let mut losses = Vec::new();
    for _ in 0..50 {
        let logits = inputs.matmul(&weights).unwrap();
        let loss = ctx.cross_entropy(&logits, &targets).unwrap();
        loss.backward(None).unwrap();
        losses.push(loss.data()[[]]);
        sgd_step(&[&weights], 0.5);
    }

    assert!(losses.last().unwrap() < losses.first().unwrap());
    assert!(weights.grad().is_none());
}

#[test]
fn test_embedding_classifier_trains() {
    // Token -> embedding -> logits, with a shared embedding row
    let embeddings = Tensor::uniform(&[3, 4], -0.1, 0.1, true).unwrap();
    let projection = Tensor::uniform(&[4, 3], -0.1, 0.1, true).unwrap();
    let tokens = [0usize, 1, 2, 0];
    let labels = [2usize, 0, 1, 2];

    let mut first = None;
    let mut last = 0.0;
    for _ in 0..100 {
        let hidden = embeddings.index_select(&tokens).unwrap().tanh();
        let logits = hidden.matmul(&projection).unwrap();
        let loss = cross_entropy(&logits, &labels).unwrap();
        loss.backward(None).unwrap();

        last = loss.data()[[]];
        first.get_or_insert(last);
        sgd_step(&[&embeddings, &projection], 0.05);
    }

    assert!(last < first.unwrap());
}

#[test]
fn test_context_defaults_match_free_function() {
    let logits = Tensor::new(arr2(&[[0.5, -0.5, 1.0]]), true);
    let ctx = Context::new();
    assert_eq!(ctx.config().cross_entropy.scaling, CrossEntropyScaling::Sum);

    let a = ctx.cross_entropy(&logits, &[1]).unwrap();
    let b = cross_entropy(&logits, &[1]).unwrap();
    assert_eq!(*a.data(), *b.data());
}
