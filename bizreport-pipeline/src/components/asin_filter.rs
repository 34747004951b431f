use crate::filter::{Filter, FilterResult};
use crate::types::{FilterSelection, PeriodDataset, ReportRow};

/// Keeps rows whose child or parent ASIN is in the user's selection.
///
/// An empty selection keeps everything.
pub struct AsinFilter;

impl Filter<FilterSelection, ReportRow> for AsinFilter {
    fn enable(&self, selection: &FilterSelection) -> bool {
        !selection.is_empty()
    }

    fn filter(&self, selection: &FilterSelection, candidates: Vec<ReportRow>) -> FilterResult<ReportRow> {
        let (kept, removed): (Vec<_>, Vec<_>) = candidates
            .into_iter()
            .partition(|row| selection.matches(row));

        FilterResult { kept, removed }
    }
}

/// Restrict a dataset to the selected ASINs. A selection matching nothing
/// yields a dataset without rows.
pub fn apply(dataset: &PeriodDataset, selection: &FilterSelection) -> PeriodDataset {
    if !AsinFilter.enable(selection) {
        return dataset.clone();
    }
    let rows = dataset.rows.values().cloned().collect();
    let kept = AsinFilter.filter(selection, rows).kept;
    dataset.with_rows(
        kept.into_iter()
            .map(|row| (row.child_asin.clone(), row))
            .collect(),
    )
}
