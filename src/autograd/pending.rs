//! Per-node bookkeeping of gradient contributions still owed by children

use super::TensorId;
use crate::error::{Error, Result};
use std::collections::HashMap;

/// Outstanding gradient contributions, keyed by the child that owes them.
///
/// A child built from the same parent twice (`x + x`) registers twice and
/// must report twice. Entries are removed once they reach zero, so a report
/// for an unknown child and a report for an exhausted one are the same
/// error.
#[derive(Debug, Default, Clone)]
pub(crate) struct PendingGrads {
    counts: HashMap<TensorId, usize>,
}

impl PendingGrads {
    /// Record one more contribution expected from `child`
    pub(crate) fn register(&mut self, child: TensorId) {
        *self.counts.entry(child).or_insert(0) += 1;
    }

    /// Consume one contribution from `child` on behalf of `node`
    pub(crate) fn discharge(&mut self, node: TensorId, child: TensorId) -> Result<()> {
        let Some(count) = self.counts.get_mut(&child) else {
            tracing::warn!(%node, %child, "gradient reported twice over the same edge");
            return Err(Error::DoubleReport { node, child });
        };

        *count -= 1;
        if *count == 0 {
            self.counts.remove(&child);
        }
        Ok(())
    }

    /// Drop every expectation on `child`, used when the child itself is dropped
    pub(crate) fn forget(&mut self, child: TensorId) {
        self.counts.remove(&child);
    }

    /// True once every registered child has reported
    pub(crate) fn is_ready(&self) -> bool {
        self.counts.is_empty()
    }

    /// Total number of contributions still owed
    pub(crate) fn outstanding(&self) -> usize {
        self.counts.values().sum()
    }

    /// Contributions still owed by one particular child
    pub(crate) fn expected_from(&self, child: TensorId) -> usize {
        self.counts.get(&child).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> (TensorId, TensorId, TensorId) {
        (TensorId::next(), TensorId::next(), TensorId::next())
    }

    #[test]
    fn test_empty_tracker_is_ready() {
        let pending = PendingGrads::default();
        assert!(pending.is_ready());
        assert_eq!(pending.outstanding(), 0);
    }

    #[test]
    fn test_register_increments_per_occurrence() {
        let (_, child, _) = ids();
        let mut pending = PendingGrads::default();
        pending.register(child);
        pending.register(child);

        assert_eq!(pending.expected_from(child), 2);
        assert_eq!(pending.outstanding(), 2);
        assert!(!pending.is_ready());
    }

    #[test]
    fn test_discharge_until_ready() {
        let (node, c1, c2) = ids();
        let mut pending = PendingGrads::default();
        pending.register(c1);
        pending.register(c1);
        pending.register(c2);

        pending.discharge(node, c1).unwrap();
        assert!(!pending.is_ready());
        pending.discharge(node, c2).unwrap();
        assert!(!pending.is_ready());
        pending.discharge(node, c1).unwrap();
        assert!(pending.is_ready());
    }

    #[test]
    fn test_discharge_exhausted_edge_fails() {
        let (node, child, _) = ids();
        let mut pending = PendingGrads::default();
        pending.register(child);
        pending.discharge(node, child).unwrap();

        let err = pending.discharge(node, child).unwrap_err();
        assert!(matches!(err, Error::DoubleReport { node: n, child: c } if n == node && c == child));
    }

    #[test]
    fn test_discharge_unknown_child_fails() {
        let (node, child, _) = ids();
        let mut pending = PendingGrads::default();
        assert!(pending.discharge(node, child).is_err());
    }

    #[test]
    fn test_forget_clears_child() {
        let (_, c1, c2) = ids();
        let mut pending = PendingGrads::default();
        pending.register(c1);
        pending.register(c2);
        pending.forget(c1);

        assert_eq!(pending.expected_from(c1), 0);
        assert_eq!(pending.outstanding(), 1);
    }
}
