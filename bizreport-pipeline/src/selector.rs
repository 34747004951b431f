use std::cmp::Ordering;

use crate::util;

/// Selectors sort and truncate a candidate list.
pub trait Selector<Q, C> {
    /// Default selection: sort and truncate based on provided configs.
    fn select(&self, _query: &Q, candidates: Vec<C>) -> Vec<C> {
        let mut sorted = self.sort(candidates);
        if let Some(limit) = self.size() {
            sorted.truncate(limit);
        }
        sorted
    }

    /// Decide if this selector should run for the given query.
    fn enable(&self, _query: &Q) -> bool {
        true
    }

    /// Total order between two candidates; `Less` sorts first.
    ///
    /// Implementations must break ties deterministically so that the same
    /// input always yields the same output order.
    fn rank(&self, a: &C, b: &C) -> Ordering;

    /// Sort candidates by `rank`. The sort is stable.
    fn sort(&self, candidates: Vec<C>) -> Vec<C> {
        let mut sorted = candidates;
        sorted.sort_by(|a, b| self.rank(a, b));
        sorted
    }

    /// Optionally provide a maximum number of candidates to select.
    /// Defaults to no truncation if not overridden.
    fn size(&self) -> Option<usize> {
        None
    }

    /// Returns a stable name for logging.
    fn name(&self) -> &str {
        util::short_type_name(std::any::type_name::<Self>())
    }
}
