//! Backward pass driver
//!
//! Gradients flow from a root through parent links. A node forwards to its
//! parents once: immediately when it is the root, otherwise on the report
//! that settles its last outstanding child.

use super::{Tensor, TensorId};
use crate::error::{Error, Result};
use ndarray::ArrayD;

impl Tensor {
    /// Run the backward pass from this tensor
    ///
    /// `grad` defaults to ones shaped like the data. A supplied gradient must
    /// not itself require grad. Calling this twice on the same graph without
    /// a fresh forward pass fails with [`Error::DoubleReport`].
    pub fn backward(&self, grad: Option<&Tensor>) -> Result<()> {
        if !self.requires_grad() {
            return Ok(());
        }

        let seed = match grad {
            Some(g) if g.requires_grad() => return Err(Error::SecondOrderGradient),
            Some(g) => g.data().clone(),
            None => ArrayD::ones(self.data().raw_dim()),
        };

        tracing::debug!(root = %self.id(), op = ?self.op_name(), "starting backward pass");
        self.backward_from(seed, None)
    }

    /// Accept one gradient contribution, reported by `origin` unless this is
    /// the root of the pass.
    pub(crate) fn backward_from(&self, grad: ArrayD<f32>, origin: Option<TensorId>) -> Result<()> {
        if !self.requires_grad() {
            return Ok(());
        }

        if let Some(child) = origin {
            self.node
                .pending
                .borrow_mut()
                .discharge(self.id(), child)?;
        }

        self.accumulate_grad(grad)?;

        if self.is_leaf() {
            return Ok(());
        }

        let ready = origin.is_none() || self.node.pending.borrow().is_ready();
        tracing::trace!(
            node = %self.id(),
            op = ?self.op_name(),
            outstanding = self.pending_grads(),
            ready,
            "accumulated gradient"
        );
        if ready {
            self.propagate()?;
        }
        Ok(())
    }

    fn propagate(&self) -> Result<()> {
        let Some(op) = self.node.op.as_ref() else {
            return Ok(());
        };

        // Every parent gradient is computed before any parent recurses.
        let parent_grads = {
            let grad = self.node.grad.borrow();
            let Some(grad) = grad.as_ref() else {
                return Ok(());
            };
            let output = self.node.data.borrow();
            op.backward(grad, &output, &self.node.parents)?
        };

        for (parent, grad) in self.node.parents.iter().zip(parent_grads) {
            parent.backward_from(grad, Some(self.id()))?;
        }
        Ok(())
    }
}
