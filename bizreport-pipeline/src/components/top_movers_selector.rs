use std::cmp::Ordering;

use crate::comparator::{AsinDelta, CompareOptions};
use crate::selector::Selector;

/// Orders ASIN deltas by absolute revenue change, largest first, ties broken
/// by ASIN ascending. Optionally keeps only the first `limit`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TopMoversSelector {
    limit: Option<usize>,
}

impl TopMoversSelector {
    pub fn new(limit: usize) -> Self {
        Self { limit: Some(limit) }
    }

    /// Full ranking, nothing dropped.
    pub fn unbounded() -> Self {
        Self { limit: None }
    }
}

impl Selector<CompareOptions, AsinDelta> for TopMoversSelector {
    fn enable(&self, options: &CompareOptions) -> bool {
        options.top_n > 0
    }

    fn rank(&self, a: &AsinDelta, b: &AsinDelta) -> Ordering {
        b.deltas
            .revenue
            .delta
            .abs()
            .cmp(&a.deltas.revenue.delta.abs())
            .then_with(|| a.asin.cmp(&b.asin))
    }

    fn size(&self) -> Option<usize> {
        self.limit
    }
}
