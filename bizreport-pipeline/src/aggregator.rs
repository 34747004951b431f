//! Per-period KPI aggregation.
//!
//! A `KpiSnapshot` holds one `KpiValues` per surviving child ASIN and the
//! "ALL" total, read from the standard or the B2B column family. Snapshots
//! are always derived from a dataset and never edited afterwards.

use std::collections::BTreeMap;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::schema::{Column, KpiColumns};
use crate::types::{saturating_add_count, saturating_add_money, PeriodDataset, ReportRow, TrafficMode};

/// Key under which the aggregate of all ASINs is reported.
pub const ALL_ASINS: &str = "ALL";

/// Decimal places kept for derived rates.
const RATE_DP: u32 = 2;

/// KPI values for one ASIN (or the total) under one traffic mode.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct KpiValues {
    pub ordered_units: u64,
    pub revenue: Decimal,
    pub page_views: u64,
    pub sessions: u64,
    pub order_items: u64,
    pub sessions_mobile: u64,
    pub sessions_browser: u64,
}

impl KpiValues {
    pub fn from_row(row: &ReportRow, mode: TrafficMode) -> Self {
        let columns = KpiColumns::for_mode(mode);
        Self {
            ordered_units: count_of(row, columns.ordered_units),
            revenue: match columns.revenue {
                Column::RevenueB2b => row.revenue_b2b,
                _ => row.revenue,
            },
            page_views: count_of(row, columns.page_views),
            sessions: count_of(row, columns.sessions),
            order_items: count_of(row, columns.order_items),
            sessions_mobile: count_of(row, columns.sessions_mobile),
            sessions_browser: count_of(row, columns.sessions_browser),
        }
    }

    /// Add `other` into `self`, capping sums that do not fit. Returns `true`
    /// when any sum was capped.
    pub fn add(&mut self, other: &KpiValues) -> bool {
        let mut capped = saturating_add_money(&mut self.revenue, other.revenue);
        for (sum, add) in [
            (&mut self.ordered_units, other.ordered_units),
            (&mut self.page_views, other.page_views),
            (&mut self.sessions, other.sessions),
            (&mut self.order_items, other.order_items),
            (&mut self.sessions_mobile, other.sessions_mobile),
            (&mut self.sessions_browser, other.sessions_browser),
        ] {
            capped |= saturating_add_count(sum, add);
        }
        capped
    }

    pub fn is_zero(&self) -> bool {
        self.ordered_units == 0
            && self.revenue.is_zero()
            && self.page_views == 0
            && self.sessions == 0
            && self.order_items == 0
            && self.sessions_mobile == 0
            && self.sessions_browser == 0
    }

    /// Ordered units per 100 sessions.
    pub fn conversion_rate(&self) -> Option<Decimal> {
        ratio(Decimal::from(self.ordered_units).checked_mul(Decimal::from(100))?, self.sessions)
    }

    /// Revenue per order item.
    pub fn average_order_value(&self) -> Option<Decimal> {
        ratio(self.revenue, self.order_items)
    }

    pub fn revenue_per_session(&self) -> Option<Decimal> {
        ratio(self.revenue, self.sessions)
    }
}

fn count_of(row: &ReportRow, column: Column) -> u64 {
    match column {
        Column::OrderedUnits => row.ordered_units,
        Column::OrderedUnitsB2b => row.ordered_units_b2b,
        Column::PageViews => row.page_views,
        Column::PageViewsB2b => row.page_views_b2b,
        Column::Sessions => row.sessions,
        Column::SessionsB2b => row.sessions_b2b,
        Column::OrderItems => row.order_items,
        Column::OrderItemsB2b => row.order_items_b2b,
        Column::SessionsMobile => row.sessions_mobile,
        Column::SessionsMobileB2b => row.sessions_mobile_b2b,
        Column::SessionsBrowser => row.sessions_browser,
        Column::SessionsBrowserB2b => row.sessions_browser_b2b,
        _ => 0,
    }
}

fn ratio(numerator: Decimal, denominator: u64) -> Option<Decimal> {
    if denominator == 0 {
        return None;
    }
    numerator
        .checked_div(Decimal::from(denominator))
        .map(|v| v.round_dp_with_strategy(RATE_DP, RoundingStrategy::MidpointAwayFromZero))
}

/// KPIs of one child ASIN in one period.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AsinKpis {
    pub parent_asin: String,
    pub title: String,
    pub values: KpiValues,
}

/// All KPIs of one period under one traffic mode.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct KpiSnapshot {
    pub label: String,
    pub mode: TrafficMode,
    /// Page views of this mode were filled from sessions.
    pub views_from_sessions: bool,
    pub per_asin: BTreeMap<String, AsinKpis>,
    pub total: KpiValues,
}

impl KpiSnapshot {
    /// Values for a child ASIN, or the total for [`ALL_ASINS`].
    pub fn get(&self, asin: &str) -> Option<&KpiValues> {
        if asin == ALL_ASINS {
            return Some(&self.total);
        }
        self.per_asin.get(asin).map(|a| &a.values)
    }

    /// No ASIN survived filtering in this period.
    pub fn is_empty(&self) -> bool {
        self.per_asin.is_empty()
    }
}

/// Aggregate one (already filtered) dataset.
pub fn aggregate(dataset: &PeriodDataset, mode: TrafficMode) -> KpiSnapshot {
    let mut total = KpiValues::default();
    let mut capped = false;
    let per_asin = dataset
        .rows
        .iter()
        .map(|(asin, row)| {
            let values = KpiValues::from_row(row, mode);
            capped |= total.add(&values);
            (
                asin.clone(),
                AsinKpis {
                    parent_asin: row.parent_asin.clone(),
                    title: row.title.clone(),
                    values,
                },
            )
        })
        .collect();
    if capped {
        log::warn!("{}: {} total capped at the largest representable value", dataset.label, mode);
    }

    KpiSnapshot {
        label: dataset.label.clone(),
        mode,
        views_from_sessions: dataset.views_from_sessions.applies_to(mode),
        per_asin,
        total,
    }
}

/// Best and worst selling ASIN of a period by revenue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PeriodLeaders {
    pub label: String,
    /// Highest revenue, even when that is zero; `None` only for an empty
    /// period.
    pub top: Option<String>,
    /// Lowest revenue above zero; only set when at least two ASINs sold.
    pub flop: Option<String>,
}

pub fn period_leaders(snapshot: &KpiSnapshot) -> PeriodLeaders {
    let mut ranked: Vec<(&String, &Decimal)> = snapshot
        .per_asin
        .iter()
        .map(|(asin, kpis)| (asin, &kpis.values.revenue))
        .collect();
    // Highest revenue first, ASIN ascending on ties.
    ranked.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

    let top = ranked.first().map(|(asin, _)| (*asin).clone());
    let selling: Vec<_> = ranked.into_iter().filter(|(_, revenue)| !revenue.is_zero()).collect();
    let flop = if selling.len() > 1 {
        selling
            .iter()
            .min_by(|a, b| a.1.cmp(b.1).then_with(|| a.0.cmp(b.0)))
            .map(|(asin, _)| (*asin).clone())
    } else {
        None
    };

    PeriodLeaders {
        label: snapshot.label.clone(),
        top,
        flop,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SchemaVariant, ViewsFromSessions};

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn row(child: &str, units: u64, revenue: &str, views: u64) -> ReportRow {
        ReportRow {
            child_asin: child.into(),
            parent_asin: "P1".into(),
            ordered_units: units,
            revenue: dec(revenue),
            page_views: views,
            sessions: views / 2,
            order_items: units,
            ordered_units_b2b: units / 2,
            revenue_b2b: dec(revenue) / dec("2"),
            page_views_b2b: 1,
            ..ReportRow::default()
        }
    }

    fn dataset(rows: Vec<ReportRow>) -> PeriodDataset {
        PeriodDataset {
            label: "week".into(),
            source_name: "week.csv".into(),
            period_start: None,
            schema_variant: SchemaVariant::B2bCapable,
            views_from_sessions: ViewsFromSessions::default(),
            rows: rows.into_iter().map(|r| (r.child_asin.clone(), r)).collect(),
        }
    }

    #[test]
    fn total_equals_sum_of_asins() {
        let ds = dataset(vec![
            row("C1", 10, "100.10", 50),
            row("C2", 3, "0.20", 8),
            row("C3", 0, "0", 0),
        ]);
        for mode in [TrafficMode::Standard, TrafficMode::B2b] {
            let snap = aggregate(&ds, mode);
            let mut sum = KpiValues::default();
            for kpis in snap.per_asin.values() {
                assert!(!sum.add(&kpis.values));
            }
            assert_eq!(sum, snap.total);
            assert_eq!(snap.get(ALL_ASINS), Some(&snap.total));
        }
    }

    #[test]
    fn revenue_sums_exactly() {
        let rows = (0..1000)
            .map(|i| row(&format!("C{i:04}"), 1, "0.10", 1))
            .collect();
        let snap = aggregate(&dataset(rows), TrafficMode::Standard);
        assert_eq!(snap.total.revenue, dec("100.00"));
        assert_eq!(snap.total.ordered_units, 1000);
    }

    #[test]
    fn mode_selects_column_family() {
        let ds = dataset(vec![row("C1", 10, "100", 50)]);
        let standard = aggregate(&ds, TrafficMode::Standard);
        let b2b = aggregate(&ds, TrafficMode::B2b);
        assert_eq!(standard.total.ordered_units, 10);
        assert_eq!(standard.total.revenue, dec("100"));
        assert_eq!(standard.total.page_views, 50);
        assert_eq!(b2b.total.ordered_units, 5);
        assert_eq!(b2b.total.revenue, dec("50"));
        assert_eq!(b2b.total.page_views, 1);
        assert_eq!(b2b.mode, TrafficMode::B2b);
    }

    #[test]
    fn derived_rates_skip_zero_denominators() {
        let values = KpiValues {
            ordered_units: 3,
            revenue: dec("100"),
            page_views: 40,
            sessions: 30,
            order_items: 3,
            ..KpiValues::default()
        };
        assert_eq!(values.conversion_rate(), Some(dec("10.00")));
        assert_eq!(values.average_order_value(), Some(dec("33.33")));
        assert_eq!(values.revenue_per_session(), Some(dec("3.33")));
        assert_eq!(KpiValues::default().conversion_rate(), None);
        assert_eq!(KpiValues::default().average_order_value(), None);
    }

    #[test]
    fn empty_dataset_gives_empty_snapshot() {
        let snap = aggregate(&dataset(vec![]), TrafficMode::Standard);
        assert!(snap.is_empty());
        assert!(snap.total.is_zero());
        assert_eq!(snap.get("C1"), None);
    }

    #[test]
    fn leaders_pick_top_and_lowest_selling() {
        let ds = dataset(vec![
            row("C1", 1, "50", 1),
            row("C2", 1, "500", 1),
            row("C3", 1, "5", 1),
            row("C4", 0, "0", 1),
        ]);
        let leaders = period_leaders(&aggregate(&ds, TrafficMode::Standard));
        assert_eq!(leaders.top.as_deref(), Some("C2"));
        assert_eq!(leaders.flop.as_deref(), Some("C3"));

        let single = dataset(vec![row("C1", 1, "50", 1), row("C4", 0, "0", 1)]);
        let leaders = period_leaders(&aggregate(&single, TrafficMode::Standard));
        assert_eq!(leaders.top.as_deref(), Some("C1"));
        assert_eq!(leaders.flop, None);
    }

    #[test]
    fn top_is_set_when_nothing_sold() {
        let ds = dataset(vec![row("C2", 0, "0", 4), row("C1", 0, "0", 9)]);
        let leaders = period_leaders(&aggregate(&ds, TrafficMode::Standard));
        assert_eq!(leaders.top.as_deref(), Some("C1"));
        assert_eq!(leaders.flop, None);

        let empty = period_leaders(&aggregate(&dataset(vec![]), TrafficMode::Standard));
        assert_eq!(empty.top, None);
    }

    #[test]
    fn totals_cap_instead_of_wrapping() {
        let big = ReportRow {
            ordered_units: u64::MAX,
            ..row("C1", 0, "1", 0)
        };
        let snap = aggregate(&dataset(vec![big, row("C2", 7, "1", 2)]), TrafficMode::Standard);
        assert_eq!(snap.total.ordered_units, u64::MAX);
        assert_eq!(snap.total.revenue, dec("2"));
    }

    #[test]
    fn device_sessions_and_views_flag_follow_mode() {
        let mut ds = dataset(vec![ReportRow {
            sessions_mobile: 6,
            sessions_browser: 4,
            sessions_mobile_b2b: 1,
            ..row("C1", 1, "10", 10)
        }]);
        ds.views_from_sessions = ViewsFromSessions {
            standard: false,
            b2b: true,
        };
        let standard = aggregate(&ds, TrafficMode::Standard);
        let b2b = aggregate(&ds, TrafficMode::B2b);
        assert_eq!(standard.total.sessions_mobile, 6);
        assert_eq!(standard.total.sessions_browser, 4);
        assert!(!standard.views_from_sessions);
        assert_eq!(b2b.total.sessions_mobile, 1);
        assert_eq!(b2b.total.sessions_browser, 0);
        assert!(b2b.views_from_sessions);
    }
}
