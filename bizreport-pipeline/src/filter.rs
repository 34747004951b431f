use crate::util;

/// Result of a filter operation, partitioning candidates into kept and removed.
#[derive(Clone, Debug)]
pub struct FilterResult<C> {
    pub kept: Vec<C>,
    pub removed: Vec<C>,
}

/// Filters run sequentially and partition candidates into kept and removed
/// sets. They never fail: removing everything is a valid outcome.
pub trait Filter<Q, C> {
    /// Decide if this filter should run for the given query.
    fn enable(&self, _query: &Q) -> bool {
        true
    }

    /// Partition candidates. Kept candidates continue to the next stage,
    /// removed ones are excluded from further processing.
    fn filter(&self, query: &Q, candidates: Vec<C>) -> FilterResult<C>;

    /// Returns a stable name for logging.
    fn name(&self) -> &str {
        util::short_type_name(std::any::type_name::<Self>())
    }
}

/// Run each enabled filter in order, feeding kept candidates forward.
pub fn run_filters<Q, C>(filters: &[Box<dyn Filter<Q, C>>], query: &Q, candidates: Vec<C>) -> Vec<C> {
    let mut kept = candidates;
    for filter in filters.iter().filter(|f| f.enable(query)) {
        let before = kept.len();
        let result = filter.filter(query, kept);
        log::debug!(
            "{}: kept {} of {}",
            filter.name(),
            result.kept.len(),
            before
        );
        kept = result.kept;
    }
    kept
}
