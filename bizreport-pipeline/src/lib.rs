//! Period-over-period comparison of Amazon Business Report exports.
//!
//! Flow: CSV file -> `report_loader` (normalized `PeriodDataset`) ->
//! `store` (labelled periods) -> `components::asin_filter` ->
//! `aggregator` (`KpiSnapshot` per period) -> `comparator` (deltas) ->
//! `summary` (text). `pipelines::period_comparison` runs the whole chain
//! as one pure function of a `SessionState`.

pub mod aggregator;
pub mod comparator;
pub mod components;
pub mod error;
pub mod filter;
pub mod numeric;
pub mod pipelines;
pub mod report_loader;
pub mod schema;
pub mod selector;
pub mod store;
pub mod summary;
pub mod types;
pub mod util;

pub use error::{ReportError, ReportResult};
pub use pipelines::period_comparison::{AnalysisOutput, ComparisonOutcome, PeriodComparisonPipeline, SessionState};
pub use store::{DatasetStore, PeriodOrdering};
pub use types::{FilterSelection, PeriodDataset, ReportRow, SchemaVariant, TrafficMode};
