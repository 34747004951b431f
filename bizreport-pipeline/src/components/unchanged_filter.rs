use crate::comparator::{AsinDelta, CompareOptions, Presence};
use crate::filter::{Filter, FilterResult};

/// Drops ASINs present in both periods with no change in any compared KPI.
pub struct UnchangedFilter;

impl Filter<CompareOptions, AsinDelta> for UnchangedFilter {
    fn filter(&self, _options: &CompareOptions, candidates: Vec<AsinDelta>) -> FilterResult<AsinDelta> {
        let (removed, kept): (Vec<_>, Vec<_>) = candidates
            .into_iter()
            .partition(|d| d.presence == Presence::Both && d.deltas.is_unchanged());

        FilterResult { kept, removed }
    }
}
