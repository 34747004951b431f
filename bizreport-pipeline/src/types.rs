use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Session selections
// ---------------------------------------------------------------------------

/// Which traffic columns the KPIs are read from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrafficMode {
    #[default]
    Standard,
    B2b,
}

impl fmt::Display for TrafficMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrafficMode::Standard => write!(f, "Standard"),
            TrafficMode::B2b => write!(f, "B2B"),
        }
    }
}

/// ASINs (parent and/or child) chosen by the user. Empty means "include all".
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FilterSelection {
    asins: BTreeSet<String>,
}

impl FilterSelection {
    pub fn new<I, S>(asins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            asins: asins
                .into_iter()
                .map(|a| a.as_ref().trim().to_string())
                .filter(|a| !a.is_empty())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.asins.is_empty()
    }

    pub fn contains(&self, asin: &str) -> bool {
        self.asins.contains(asin)
    }

    /// A row matches when either its child or its parent ASIN was selected.
    pub fn matches(&self, row: &ReportRow) -> bool {
        self.contains(&row.child_asin)
            || (!row.parent_asin.is_empty() && self.contains(&row.parent_asin))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.asins.iter().map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Normalized report data
// ---------------------------------------------------------------------------

/// Column family a report file was exported with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchemaVariant {
    Standard,
    B2bCapable,
}

impl fmt::Display for SchemaVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaVariant::Standard => write!(f, "standard"),
            SchemaVariant::B2bCapable => write!(f, "b2b-capable"),
        }
    }
}

/// One child ASIN in one period. Counts absent from the source file stay zero.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReportRow {
    pub parent_asin: String,
    pub child_asin: String,
    pub title: String,

    pub ordered_units: u64,
    pub ordered_units_b2b: u64,
    pub revenue: Decimal,
    pub revenue_b2b: Decimal,
    pub page_views: u64,
    pub page_views_b2b: u64,

    // Inputs for the derived rates (conversion, order value).
    pub sessions: u64,
    pub sessions_b2b: u64,
    pub order_items: u64,
    pub order_items_b2b: u64,

    // Session split by device.
    pub sessions_mobile: u64,
    pub sessions_mobile_b2b: u64,
    pub sessions_browser: u64,
    pub sessions_browser_b2b: u64,
}

impl ReportRow {
    /// Fold another row for the same child ASIN into this one.
    ///
    /// Identity fields keep the first non-empty value seen. Sums that do not
    /// fit are capped at the type's maximum; returns `true` when that
    /// happened.
    pub fn merge(&mut self, other: &ReportRow) -> bool {
        if self.parent_asin.is_empty() {
            self.parent_asin = other.parent_asin.clone();
        }
        if self.title.is_empty() {
            self.title = other.title.clone();
        }
        let mut capped = false;
        for (sum, add) in [
            (&mut self.ordered_units, other.ordered_units),
            (&mut self.ordered_units_b2b, other.ordered_units_b2b),
            (&mut self.page_views, other.page_views),
            (&mut self.page_views_b2b, other.page_views_b2b),
            (&mut self.sessions, other.sessions),
            (&mut self.sessions_b2b, other.sessions_b2b),
            (&mut self.order_items, other.order_items),
            (&mut self.order_items_b2b, other.order_items_b2b),
            (&mut self.sessions_mobile, other.sessions_mobile),
            (&mut self.sessions_mobile_b2b, other.sessions_mobile_b2b),
            (&mut self.sessions_browser, other.sessions_browser),
            (&mut self.sessions_browser_b2b, other.sessions_browser_b2b),
        ] {
            capped |= saturating_add_count(sum, add);
        }
        capped |= saturating_add_money(&mut self.revenue, other.revenue);
        capped |= saturating_add_money(&mut self.revenue_b2b, other.revenue_b2b);
        capped
    }
}

/// `sum += add`, capped at `u64::MAX`. Returns `true` when capped.
pub fn saturating_add_count(sum: &mut u64, add: u64) -> bool {
    match sum.checked_add(add) {
        Some(v) => {
            *sum = v;
            false
        }
        None => {
            *sum = u64::MAX;
            true
        }
    }
}

/// `sum += add`, capped at `Decimal::MAX`. Returns `true` when capped.
pub fn saturating_add_money(sum: &mut Decimal, add: Decimal) -> bool {
    match sum.checked_add(add) {
        Some(v) => {
            *sum = v;
            false
        }
        None => {
            *sum = Decimal::MAX;
            true
        }
    }
}

/// All rows of one uploaded report, keyed by child ASIN.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PeriodDataset {
    pub label: String,
    pub source_name: String,
    /// Date found in the file name, if any.
    pub period_start: Option<NaiveDate>,
    pub schema_variant: SchemaVariant,
    /// Column families whose page views were filled from sessions.
    pub views_from_sessions: ViewsFromSessions,
    pub rows: BTreeMap<String, ReportRow>,
}

/// Set per column family when the file has no page-views column but does
/// have a sessions column, so sessions stand in for page views.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ViewsFromSessions {
    pub standard: bool,
    pub b2b: bool,
}

impl ViewsFromSessions {
    pub fn applies_to(&self, mode: TrafficMode) -> bool {
        match mode {
            TrafficMode::Standard => self.standard,
            TrafficMode::B2b => self.b2b,
        }
    }
}

impl PeriodDataset {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Same metadata, different rows.
    pub fn with_rows(&self, rows: BTreeMap<String, ReportRow>) -> Self {
        Self {
            label: self.label.clone(),
            source_name: self.source_name.clone(),
            period_start: self.period_start,
            schema_variant: self.schema_variant,
            views_from_sessions: self.views_from_sessions,
            rows,
        }
    }
}

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// Why a cell or row was not taken verbatim.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Non-blank value that is not a number; counted as zero.
    MalformedNumber,
    /// Negative value in a column that cannot be negative; counted as zero.
    NegativeValue,
    /// Row without a child ASIN; skipped.
    MissingAsin,
    /// Row for a child ASIN seen earlier in the file; summed into it.
    MergedDuplicate,
    /// Sum of merged rows exceeded the largest representable value; capped.
    CappedSum,
    /// No page-views column; sessions are used as page views.
    PageViewsFromSessions,
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WarningKind::MalformedNumber => write!(f, "malformed number, counted as 0"),
            WarningKind::NegativeValue => write!(f, "negative value, counted as 0"),
            WarningKind::MissingAsin => write!(f, "row without child ASIN skipped"),
            WarningKind::MergedDuplicate => write!(f, "duplicate child ASIN summed"),
            WarningKind::CappedSum => write!(f, "sum too large, capped at the maximum"),
            WarningKind::PageViewsFromSessions => write!(f, "no page views column, sessions used instead"),
        }
    }
}

/// Non-fatal problem found while normalizing a file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DataWarning {
    /// 1-based line in the source file (header is line 1).
    pub line: u64,
    pub column: String,
    pub value: String,
    pub kind: WarningKind,
}

impl fmt::Display for DataWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "line {}, {} '{}': {}",
            self.line, self.column, self.value, self.kind
        )
    }
}

/// A parsed file together with everything that was coerced along the way.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NormalizedReport {
    pub dataset: PeriodDataset,
    pub warnings: Vec<DataWarning>,
}
