//! Tensor type with gradient tracking

use super::op::Op;
use super::pending::PendingGrads;
use crate::error::{Error, Result};
use ndarray::{Array, ArrayD, Dimension, IxDyn};
use rand::distributions::{Distribution, Uniform};
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TENSOR_ID: AtomicU64 = AtomicU64::new(0);

/// Identity of a graph node, unique for the lifetime of the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TensorId(u64);

impl TensorId {
    pub(crate) fn next() -> Self {
        Self(NEXT_TENSOR_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub(crate) struct Node {
    pub(crate) id: TensorId,
    pub(crate) data: RefCell<ArrayD<f32>>,
    pub(crate) grad: RefCell<Option<ArrayD<f32>>>,
    pub(crate) requires_grad: bool,
    pub(crate) parents: Vec<Tensor>,
    pub(crate) op: Option<Op>,
    pub(crate) pending: RefCell<PendingGrads>,
}

impl Node {
    /// A dropped child can never report, so parents stop waiting on it.
    fn release_parents(&self) {
        for parent in self.parents.iter().filter(|p| p.requires_grad()) {
            if let Ok(mut pending) = parent.node.pending.try_borrow_mut() {
                pending.forget(self.id);
            }
        }
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.release_parents();

        // Unwind uniquely owned ancestors with a worklist instead of nested
        // drops, so long chains do not exhaust the stack.
        let mut stack = std::mem::take(&mut self.parents);
        while let Some(parent) = stack.pop() {
            if let Ok(mut node) = Rc::try_unwrap(parent.node) {
                node.release_parents();
                stack.append(&mut node.parents);
            }
        }
    }
}

/// Tensor with automatic differentiation support
///
/// Cloning a `Tensor` is cheap and yields another handle to the same graph
/// node: data, gradient and pending bookkeeping are shared. A node keeps its
/// parents alive, never the other way round.
#[derive(Clone)]
pub struct Tensor {
    pub(crate) node: Rc<Node>,
}

impl Tensor {
    /// Create a leaf tensor from any ndarray
    pub fn new<D: Dimension>(data: Array<f32, D>, requires_grad: bool) -> Self {
        Self::leaf(data.into_dyn(), requires_grad)
    }

    /// Create a 1-D tensor from a vector
    pub fn from_vec(data: Vec<f32>, requires_grad: bool) -> Self {
        Self::new(Array::from(data), requires_grad)
    }

    /// Create a tensor of the given shape from row-major data
    pub fn from_shape_vec(shape: &[usize], data: Vec<f32>, requires_grad: bool) -> Result<Self> {
        let data = ArrayD::from_shape_vec(IxDyn(shape), data)?;
        Ok(Self::leaf(data, requires_grad))
    }

    /// Create a 0-dimensional tensor
    pub fn scalar(value: f32, requires_grad: bool) -> Self {
        Self::leaf(ArrayD::from_elem(IxDyn(&[]), value), requires_grad)
    }

    /// Create a tensor filled with zeros
    pub fn zeros(shape: &[usize], requires_grad: bool) -> Self {
        Self::leaf(ArrayD::zeros(IxDyn(shape)), requires_grad)
    }

    /// Create a tensor filled with ones
    pub fn ones(shape: &[usize], requires_grad: bool) -> Self {
        Self::leaf(ArrayD::ones(IxDyn(shape)), requires_grad)
    }

    /// Create a tensor sampled uniformly from `[low, high)`
    ///
    /// Intended for parameter initialisation.
    pub fn uniform(shape: &[usize], low: f32, high: f32, requires_grad: bool) -> Result<Self> {
        if low >= high || !low.is_finite() || !high.is_finite() {
            return Err(Error::InvalidParameter(format!(
                "uniform range [{low}, {high}) is empty or not finite"
            )));
        }
        let dist = Uniform::new(low, high);
        let mut rng = rand::thread_rng();
        let data = ArrayD::from_shape_simple_fn(IxDyn(shape), || dist.sample(&mut rng));
        Ok(Self::leaf(data, requires_grad))
    }

    fn leaf(data: ArrayD<f32>, requires_grad: bool) -> Self {
        Self {
            node: Rc::new(Node {
                id: TensorId::next(),
                data: RefCell::new(data),
                grad: RefCell::new(None),
                requires_grad,
                parents: Vec::new(),
                op: None,
                pending: RefCell::new(PendingGrads::default()),
            }),
        }
    }

    /// Wrap the output of an operation, recording the graph edge when any
    /// input requires grad.
    pub(crate) fn from_op(data: ArrayD<f32>, op: Op, parents: Vec<Tensor>) -> Self {
        if !parents.iter().any(Tensor::requires_grad) {
            return Self::leaf(data, false);
        }

        let id = TensorId::next();
        for parent in parents.iter().filter(|p| p.requires_grad()) {
            parent.node.pending.borrow_mut().register(id);
        }
        tracing::trace!(%id, op = op.name(), parents = parents.len(), "recorded graph node");

        Self {
            node: Rc::new(Node {
                id,
                data: RefCell::new(data),
                grad: RefCell::new(None),
                requires_grad: true,
                parents,
                op: Some(op),
                pending: RefCell::new(PendingGrads::default()),
            }),
        }
    }

    /// Node identity
    pub fn id(&self) -> TensorId {
        self.node.id
    }

    /// Check if requires gradient
    pub fn requires_grad(&self) -> bool {
        self.node.requires_grad
    }

    /// True for tensors not produced by a recorded operation
    pub fn is_leaf(&self) -> bool {
        self.node.parents.is_empty()
    }

    /// Name of the operation that produced this tensor
    pub fn op_name(&self) -> Option<&'static str> {
        self.node.op.as_ref().map(Op::name)
    }

    /// Tensors this one was computed from, in operand order
    pub fn parents(&self) -> &[Tensor] {
        &self.node.parents
    }

    /// Get reference to data
    pub fn data(&self) -> Ref<'_, ArrayD<f32>> {
        self.node.data.borrow()
    }

    /// Get mutable reference to data
    ///
    /// Writing through this does not invalidate recorded graph edges;
    /// backward rules read whatever the data holds when they run.
    pub fn data_mut(&self) -> RefMut<'_, ArrayD<f32>> {
        self.node.data.borrow_mut()
    }

    /// Replace the data with an array of the same shape
    pub fn set_data(&self, data: ArrayD<f32>) -> Result<()> {
        let mut slot = self.node.data.borrow_mut();
        if slot.shape() != data.shape() {
            return Err(Error::ShapeMismatch {
                expected: slot.shape().to_vec(),
                got: data.shape().to_vec(),
            });
        }
        *slot = data;
        Ok(())
    }

    /// Shape of the data
    pub fn shape(&self) -> Vec<usize> {
        self.node.data.borrow().shape().to_vec()
    }

    /// Number of dimensions
    pub fn ndim(&self) -> usize {
        self.node.data.borrow().ndim()
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.node.data.borrow().len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.node.data.borrow().is_empty()
    }

    /// Get gradient (if computed)
    pub fn grad(&self) -> Option<ArrayD<f32>> {
        self.node.grad.borrow().clone()
    }

    /// Gradient as a tensor that does not require grad
    pub fn grad_tensor(&self) -> Option<Tensor> {
        self.grad().map(|g| Self::leaf(g, false))
    }

    /// Zero out gradient
    pub fn zero_grad(&self) {
        *self.node.grad.borrow_mut() = None;
    }

    /// Copy of the data as a new leaf that does not require grad
    pub fn detach(&self) -> Tensor {
        Self::leaf(self.node.data.borrow().clone(), false)
    }

    /// Number of gradient contributions this tensor is still waiting for
    pub fn pending_grads(&self) -> usize {
        self.node.pending.borrow().outstanding()
    }

    /// Contributions still owed to this tensor by `child`
    pub fn pending_from(&self, child: &Tensor) -> usize {
        self.node.pending.borrow().expected_from(child.id())
    }

    /// Accumulate gradient (for when tensor is used multiple times)
    pub(crate) fn accumulate_grad(&self, grad: ArrayD<f32>) -> Result<()> {
        {
            let data = self.node.data.borrow();
            if data.shape() != grad.shape() {
                return Err(Error::ShapeMismatch {
                    expected: data.shape().to_vec(),
                    got: grad.shape().to_vec(),
                });
            }
        }

        let mut slot = self.node.grad.borrow_mut();
        match slot.as_mut() {
            Some(existing) => *existing += &grad,
            None => *slot = Some(grad),
        }
        Ok(())
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("id", &self.node.id)
            .field("op", &self.op_name())
            .field("data", &*self.node.data.borrow())
            .field("grad", &*self.node.grad.borrow())
            .field("requires_grad", &self.node.requires_grad)
            .finish()
    }
}
