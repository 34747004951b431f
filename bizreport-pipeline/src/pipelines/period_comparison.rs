use serde::Serialize;

use crate::aggregator::{self, KpiSnapshot, PeriodLeaders};
use crate::comparator::{self, CompareOptions, ComparisonResult};
use crate::components::asin_filter;
use crate::error::{ReportError, ReportResult};
use crate::store::{DatasetStore, PeriodOrdering};
use crate::types::{FilterSelection, TrafficMode};

/// Everything a recomputation depends on.
///
/// Callers bump `generation` on every change (upload, filter edit, mode
/// toggle) and drop any output whose generation is older than the latest.
#[derive(Clone, Debug, Default)]
pub struct SessionState {
    pub store: DatasetStore,
    pub selection: FilterSelection,
    pub mode: TrafficMode,
    pub ordering: PeriodOrdering,
    pub generation: u64,
}

impl SessionState {
    pub fn new(store: DatasetStore) -> Self {
        Self {
            store,
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ComparisonOutcome {
    Compared(ComparisonResult),
    /// Fewer than two periods have data after filtering.
    NeedsMorePeriods { usable: usize, message: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AnalysisOutput {
    pub generation: u64,
    pub mode: TrafficMode,
    /// One per period, in comparison order.
    pub snapshots: Vec<KpiSnapshot>,
    pub leaders: Vec<PeriodLeaders>,
    pub outcome: ComparisonOutcome,
}

/// Period comparison pipeline.
///
/// Pipeline flow:
/// 1. Datasets are ordered (insertion, explicit labels or file date)
/// 2. AsinFilter restricts each period to the selected ASINs
/// 3. Each filtered period is aggregated under the traffic mode
/// 4. Snapshots are compared pairwise and summarized
///
/// The store is only read. Running twice on the same state gives the same
/// output.
#[derive(Clone, Debug, Default)]
pub struct PeriodComparisonPipeline {
    options: CompareOptions,
}

impl PeriodComparisonPipeline {
    pub fn new(options: CompareOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CompareOptions {
        &self.options
    }

    /// Recompute everything for `state`.
    ///
    /// Only ordering problems (unknown or repeated labels) are errors. Too
    /// few periods is reported through [`ComparisonOutcome::NeedsMorePeriods`].
    pub fn execute(&self, state: &SessionState) -> ReportResult<AnalysisOutput> {
        let ordered = state.store.ordered(&state.ordering)?;
        log::debug!(
            "generation {}: {} periods, mode {}, {} selected ASINs",
            state.generation,
            ordered.len(),
            state.mode,
            state.selection.iter().count()
        );

        let snapshots: Vec<KpiSnapshot> = ordered
            .into_iter()
            .map(|dataset| {
                let filtered = asin_filter::apply(dataset, &state.selection);
                if filtered.is_empty() && !dataset.is_empty() {
                    log::info!("period '{}' has no rows for the selected ASINs", dataset.label);
                }
                aggregator::aggregate(&filtered, state.mode)
            })
            .collect();
        let leaders = snapshots.iter().map(aggregator::period_leaders).collect();

        let outcome = match comparator::compare(&snapshots, &self.options) {
            Ok(result) => {
                log::info!("compared {} period pairs", result.pairs.len());
                ComparisonOutcome::Compared(result)
            }
            Err(ReportError::InsufficientPeriods { usable }) => ComparisonOutcome::NeedsMorePeriods {
                usable,
                message: guidance(usable, state.store.len()),
            },
            Err(err) => return Err(err),
        };

        Ok(AnalysisOutput {
            generation: state.generation,
            mode: state.mode,
            snapshots,
            leaders,
            outcome,
        })
    }
}

fn guidance(usable: usize, loaded: usize) -> String {
    if loaded < 2 {
        format!("Load at least two report periods to compare ({loaded} loaded).")
    } else {
        format!(
            "Only {usable} of {loaded} periods contain data for the current selection; \
             widen the ASIN filter to compare."
        )
    }
}
