//! Period-over-period KPI deltas.
//!
//! Snapshots are paired (consecutively, or each against the first one) and
//! joined on child ASIN. The join is a union: an ASIN that only exists on
//! one side is zero-filled on the other and tagged `Appeared` or
//! `Disappeared`. Every pair reconciles: per-ASIN deltas sum to the total
//! delta.

use std::collections::BTreeSet;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::aggregator::{KpiSnapshot, KpiValues};
use crate::components::top_movers_selector::TopMoversSelector;
use crate::error::{ReportError, ReportResult};
use crate::selector::Selector;
use crate::summary;
use crate::types::TrafficMode;

/// Decimal places kept for percentages.
const PERCENT_DP: u32 = 2;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Which periods are compared with each other.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pairing {
    /// Each period against the one before it.
    #[default]
    Consecutive,
    /// Each period against the first one.
    Baseline,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompareOptions {
    pub pairing: Pairing,
    /// ASINs listed per period pair in the summary.
    pub top_n: usize,
    /// Percent change (absolute) at which an ASIN is flagged significant.
    pub significance_pct: Decimal,
    pub currency_symbol: String,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            pairing: Pairing::Consecutive,
            top_n: 5,
            significance_pct: Decimal::from(10),
            currency_symbol: "€".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Relative change of one KPI.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PercentChange {
    Percent(Decimal),
    /// Previous value was zero, current is not.
    New,
}

impl PercentChange {
    /// A change too large to represent is capped at `Decimal::MAX` (or
    /// `Decimal::MIN` for a decrease).
    pub fn between(previous: Decimal, current: Decimal) -> Self {
        if previous.is_zero() {
            if current.is_zero() {
                return PercentChange::Percent(Decimal::ZERO);
            }
            return PercentChange::New;
        }
        let pct = current
            .checked_sub(previous)
            .and_then(|diff| diff.checked_div(previous))
            .and_then(|ratio| ratio.checked_mul(Decimal::from(100)));
        match pct {
            Some(pct) => PercentChange::Percent(
                pct.round_dp_with_strategy(PERCENT_DP, RoundingStrategy::MidpointAwayFromZero),
            ),
            None if (current > previous) == previous.is_sign_positive() => PercentChange::Percent(Decimal::MAX),
            None => PercentChange::Percent(Decimal::MIN),
        }
    }

    /// Whether the change reaches `threshold` percent in either direction.
    pub fn reaches(&self, threshold: Decimal) -> bool {
        match self {
            PercentChange::Percent(pct) => !pct.is_zero() && pct.abs() >= threshold,
            PercentChange::New => true,
        }
    }
}

/// Where an ASIN was found in a pair of periods.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    Both,
    Appeared,
    Disappeared,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CountDelta {
    pub previous: u64,
    pub current: u64,
    /// Wide enough for any difference of two `u64`.
    pub delta: i128,
    pub percent_change: PercentChange,
}

impl CountDelta {
    pub fn between(previous: u64, current: u64) -> Self {
        Self {
            previous,
            current,
            delta: i128::from(current) - i128::from(previous),
            percent_change: PercentChange::between(Decimal::from(previous), Decimal::from(current)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AmountDelta {
    pub previous: Decimal,
    pub current: Decimal,
    pub delta: Decimal,
    pub percent_change: PercentChange,
}

impl AmountDelta {
    pub fn between(previous: Decimal, current: Decimal) -> Self {
        Self {
            previous,
            current,
            delta: current.saturating_sub(previous),
            percent_change: PercentChange::between(previous, current),
        }
    }
}

/// Deltas of the three compared KPIs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct KpiDeltas {
    pub ordered_units: CountDelta,
    pub revenue: AmountDelta,
    pub page_views: CountDelta,
}

impl KpiDeltas {
    pub fn between(previous: &KpiValues, current: &KpiValues) -> Self {
        Self {
            ordered_units: CountDelta::between(previous.ordered_units, current.ordered_units),
            revenue: AmountDelta::between(previous.revenue, current.revenue),
            page_views: CountDelta::between(previous.page_views, current.page_views),
        }
    }

    pub fn is_unchanged(&self) -> bool {
        self.ordered_units.delta == 0 && self.revenue.delta.is_zero() && self.page_views.delta == 0
    }

    fn reaches(&self, threshold: Decimal) -> bool {
        self.ordered_units.percent_change.reaches(threshold)
            || self.revenue.percent_change.reaches(threshold)
            || self.page_views.percent_change.reaches(threshold)
    }
}

/// Change of a derived rate; absent where the rate is undefined.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RateChange {
    pub previous: Option<Decimal>,
    pub current: Option<Decimal>,
    pub delta: Option<Decimal>,
}

impl RateChange {
    fn between(previous: Option<Decimal>, current: Option<Decimal>) -> Self {
        Self {
            previous,
            current,
            delta: previous.zip(current).map(|(p, c)| c.saturating_sub(p)),
        }
    }
}

/// Total-level changes of the derived rates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DerivedChanges {
    /// In percentage points.
    pub conversion_rate: RateChange,
    pub average_order_value: RateChange,
    pub revenue_per_session: RateChange,
}

impl DerivedChanges {
    pub fn between(previous: &KpiValues, current: &KpiValues) -> Self {
        Self {
            conversion_rate: RateChange::between(previous.conversion_rate(), current.conversion_rate()),
            average_order_value: RateChange::between(
                previous.average_order_value(),
                current.average_order_value(),
            ),
            revenue_per_session: RateChange::between(
                previous.revenue_per_session(),
                current.revenue_per_session(),
            ),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AsinDelta {
    pub asin: String,
    pub parent_asin: String,
    pub title: String,
    pub presence: Presence,
    pub deltas: KpiDeltas,
    pub significant: bool,
}

/// One compared pair of periods.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PeriodComparison {
    pub previous_label: String,
    pub current_label: String,
    /// Page views of either period were filled from sessions.
    pub views_from_sessions: bool,
    pub total: KpiDeltas,
    pub derived: DerivedChanges,
    /// Every ASIN of either period, largest absolute revenue change first.
    pub asins: Vec<AsinDelta>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ComparisonResult {
    pub mode: TrafficMode,
    pub pairing: Pairing,
    pub pairs: Vec<PeriodComparison>,
    pub summary: String,
}

// ---------------------------------------------------------------------------
// Comparison
// ---------------------------------------------------------------------------

/// Compare snapshots given in chronological order.
///
/// At least two snapshots must contain data. Snapshots emptied by the ASIN
/// filter still take part in the pairs (everything in them is absent).
pub fn compare(snapshots: &[KpiSnapshot], options: &CompareOptions) -> ReportResult<ComparisonResult> {
    let usable = snapshots.iter().filter(|s| !s.is_empty()).count();
    if usable < 2 {
        return Err(ReportError::InsufficientPeriods { usable });
    }

    let ranking = TopMoversSelector::unbounded();
    let pairs: Vec<PeriodComparison> = pair_indices(snapshots.len(), options.pairing)
        .into_iter()
        .map(|(prev, cur)| compare_pair(&snapshots[prev], &snapshots[cur], options, &ranking))
        .collect();

    let mode = snapshots[0].mode;
    let summary = summary::render(&pairs, mode, options);

    Ok(ComparisonResult {
        mode,
        pairing: options.pairing,
        pairs,
        summary,
    })
}

fn pair_indices(len: usize, pairing: Pairing) -> Vec<(usize, usize)> {
    match pairing {
        Pairing::Consecutive => (1..len).map(|i| (i - 1, i)).collect(),
        Pairing::Baseline => (1..len).map(|i| (0, i)).collect(),
    }
}

/// Join two snapshots on ASIN and compute every delta.
pub fn compare_pair(
    previous: &KpiSnapshot,
    current: &KpiSnapshot,
    options: &CompareOptions,
    ranking: &TopMoversSelector,
) -> PeriodComparison {
    let union: BTreeSet<&String> = previous.per_asin.keys().chain(current.per_asin.keys()).collect();
    let zero = KpiValues::default();

    let asins: Vec<AsinDelta> = union
        .into_iter()
        .map(|asin| {
            let before = previous.per_asin.get(asin);
            let after = current.per_asin.get(asin);
            let presence = match (before, after) {
                (Some(_), Some(_)) => Presence::Both,
                (None, _) => Presence::Appeared,
                (_, None) => Presence::Disappeared,
            };
            // Identity comes from the latest period that has the ASIN.
            let identity = after.or(before);
            let deltas = KpiDeltas::between(
                before.map(|k| &k.values).unwrap_or(&zero),
                after.map(|k| &k.values).unwrap_or(&zero),
            );
            let significant = presence != Presence::Both || deltas.reaches(options.significance_pct);
            AsinDelta {
                asin: asin.clone(),
                parent_asin: identity.map(|k| k.parent_asin.clone()).unwrap_or_default(),
                title: identity.map(|k| k.title.clone()).unwrap_or_default(),
                presence,
                deltas,
                significant,
            }
        })
        .collect();

    PeriodComparison {
        previous_label: previous.label.clone(),
        current_label: current.label.clone(),
        views_from_sessions: previous.views_from_sessions || current.views_from_sessions,
        total: KpiDeltas::between(&previous.total, &current.total),
        derived: DerivedChanges::between(&previous.total, &current.total),
        asins: ranking.sort(asins),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::AsinKpis;
    use std::collections::BTreeMap;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn snapshot(label: &str, entries: &[(&str, u64, &str, u64)]) -> KpiSnapshot {
        let mut total = KpiValues::default();
        let per_asin: BTreeMap<String, AsinKpis> = entries
            .iter()
            .map(|&(asin, units, revenue, views)| {
                let values = KpiValues {
                    ordered_units: units,
                    revenue: dec(revenue),
                    page_views: views,
                    ..KpiValues::default()
                };
                total.add(&values);
                (
                    asin.to_string(),
                    AsinKpis {
                        parent_asin: String::new(),
                        title: String::new(),
                        values,
                    },
                )
            })
            .collect();
        KpiSnapshot {
            label: label.into(),
            mode: TrafficMode::Standard,
            views_from_sessions: false,
            per_asin,
            total,
        }
    }

    fn find<'a>(pair: &'a PeriodComparison, asin: &str) -> &'a AsinDelta {
        pair.asins.iter().find(|a| a.asin == asin).unwrap()
    }

    #[test]
    fn percent_change_cases() {
        assert_eq!(
            PercentChange::between(dec("10"), dec("15")),
            PercentChange::Percent(dec("50"))
        );
        assert_eq!(
            PercentChange::between(dec("3"), dec("1")),
            PercentChange::Percent(dec("-66.67"))
        );
        assert_eq!(PercentChange::between(Decimal::ZERO, dec("5")), PercentChange::New);
        assert_eq!(
            PercentChange::between(Decimal::ZERO, Decimal::ZERO),
            PercentChange::Percent(Decimal::ZERO)
        );
        assert_eq!(
            PercentChange::between(dec("4"), Decimal::ZERO),
            PercentChange::Percent(dec("-100"))
        );
    }

    #[test]
    fn percent_change_too_large_is_capped() {
        let tiny = dec("0.0000000000000000000000000001");
        assert_eq!(
            PercentChange::between(tiny, dec("1000")),
            PercentChange::Percent(Decimal::MAX)
        );
        assert_eq!(
            PercentChange::between(Decimal::MAX, Decimal::ZERO),
            PercentChange::Percent(dec("-100"))
        );
        assert!(PercentChange::between(tiny, dec("1000")).reaches(dec("10")));
    }

    #[test]
    fn count_delta_spans_the_full_u64_range() {
        let up = CountDelta::between(0, u64::MAX);
        assert_eq!(up.delta, i128::from(u64::MAX));
        assert_eq!(up.percent_change, PercentChange::New);
        let down = CountDelta::between(u64::MAX, 0);
        assert_eq!(down.delta, -i128::from(u64::MAX));
        assert_eq!(down.percent_change, PercentChange::Percent(dec("-100")));
    }

    #[test]
    fn new_asin_and_growth_scenario() {
        let a = snapshot("A", &[("X1", 10, "100", 50)]);
        let b = snapshot("B", &[("X1", 15, "120", 60), ("X2", 5, "50", 20)]);
        let result = compare(&[a, b], &CompareOptions::default()).unwrap();
        assert_eq!(result.pairs.len(), 1);
        let pair = &result.pairs[0];

        let x1 = find(pair, "X1");
        assert_eq!(x1.presence, Presence::Both);
        assert_eq!(x1.deltas.ordered_units.delta, 5);
        assert_eq!(x1.deltas.revenue.delta, dec("20"));
        assert_eq!(x1.deltas.page_views.delta, 10);
        assert_eq!(x1.deltas.ordered_units.percent_change, PercentChange::Percent(dec("50")));
        assert_eq!(x1.deltas.revenue.percent_change, PercentChange::Percent(dec("20")));
        assert_eq!(x1.deltas.page_views.percent_change, PercentChange::Percent(dec("20")));

        let x2 = find(pair, "X2");
        assert_eq!(x2.presence, Presence::Appeared);
        assert_eq!(x2.deltas.ordered_units.delta, 5);
        assert_eq!(x2.deltas.revenue.delta, dec("50"));
        assert_eq!(x2.deltas.page_views.delta, 20);
        assert_eq!(x2.deltas.revenue.percent_change, PercentChange::New);
        assert!(x2.significant);
    }

    #[test]
    fn disappeared_asin_is_tagged() {
        let a = snapshot("A", &[("X1", 10, "100", 50), ("X9", 4, "40", 8)]);
        let b = snapshot("B", &[("X1", 10, "100", 50)]);
        let result = compare(&[a, b], &CompareOptions::default()).unwrap();
        let x9 = find(&result.pairs[0], "X9");
        assert_eq!(x9.presence, Presence::Disappeared);
        assert_eq!(x9.deltas.ordered_units.delta, -4);
        assert_eq!(x9.deltas.revenue.percent_change, PercentChange::Percent(dec("-100")));

        let x1 = find(&result.pairs[0], "X1");
        assert!(x1.deltas.is_unchanged());
        assert!(!x1.significant);
    }

    #[test]
    fn zero_to_zero_stays_in_raw_table() {
        let a = snapshot("A", &[("X1", 0, "0", 5), ("X2", 1, "10", 1)]);
        let b = snapshot("B", &[("X1", 0, "0", 5), ("X2", 2, "10", 1)]);
        let result = compare(&[a, b], &CompareOptions::default()).unwrap();
        let x1 = find(&result.pairs[0], "X1");
        assert_eq!(x1.deltas.revenue.delta, Decimal::ZERO);
        assert_eq!(x1.deltas.revenue.percent_change, PercentChange::Percent(Decimal::ZERO));
        assert!(!x1.significant);
    }

    #[test]
    fn asin_deltas_reconcile_with_total() {
        let a = snapshot("A", &[("X1", 10, "100.55", 50), ("X2", 3, "7.10", 9), ("X3", 1, "0.99", 2)]);
        let b = snapshot("B", &[("X1", 4, "80.05", 70), ("X4", 6, "12.40", 1)]);
        let c = snapshot("C", &[("X4", 6, "12.40", 3), ("X5", 1, "1.01", 1)]);
        let result = compare(&[a, b, c], &CompareOptions::default()).unwrap();
        assert_eq!(result.pairs.len(), 2);
        for pair in &result.pairs {
            let units: i128 = pair.asins.iter().map(|a| a.deltas.ordered_units.delta).sum();
            let revenue: Decimal = pair.asins.iter().map(|a| a.deltas.revenue.delta).sum();
            let views: i128 = pair.asins.iter().map(|a| a.deltas.page_views.delta).sum();
            assert_eq!(units, pair.total.ordered_units.delta);
            assert_eq!(revenue, pair.total.revenue.delta);
            assert_eq!(views, pair.total.page_views.delta);
        }
    }

    #[test]
    fn ranking_by_absolute_revenue_delta_then_asin() {
        let a = snapshot("A", &[("B1", 1, "100", 1), ("A1", 1, "100", 1), ("C1", 1, "100", 1), ("D1", 1, "100", 1)]);
        let b = snapshot("B", &[("B1", 1, "70", 1), ("A1", 1, "130", 1), ("C1", 1, "150", 1), ("D1", 1, "100", 1)]);
        let result = compare(&[a, b], &CompareOptions::default()).unwrap();
        let order: Vec<&str> = result.pairs[0].asins.iter().map(|a| a.asin.as_str()).collect();
        assert_eq!(order, vec!["C1", "A1", "B1", "D1"]);
    }

    #[test]
    fn baseline_pairs_against_first_period() {
        let a = snapshot("A", &[("X1", 1, "1", 1)]);
        let b = snapshot("B", &[("X1", 2, "2", 2)]);
        let c = snapshot("C", &[("X1", 3, "3", 3)]);
        let options = CompareOptions {
            pairing: Pairing::Baseline,
            ..CompareOptions::default()
        };
        let result = compare(&[a, b, c], &options).unwrap();
        let labels: Vec<(&str, &str)> = result
            .pairs
            .iter()
            .map(|p| (p.previous_label.as_str(), p.current_label.as_str()))
            .collect();
        assert_eq!(labels, vec![("A", "B"), ("A", "C")]);
        assert_eq!(result.pairs[1].total.ordered_units.delta, 2);
    }

    #[test]
    fn fewer_than_two_usable_periods_is_insufficient() {
        let a = snapshot("A", &[("X1", 1, "1", 1)]);
        let empty = snapshot("B", &[]);
        let err = compare(&[a.clone(), empty], &CompareOptions::default()).unwrap_err();
        assert!(matches!(err, ReportError::InsufficientPeriods { usable: 1 }));
        assert!(matches!(
            compare(&[a], &CompareOptions::default()),
            Err(ReportError::InsufficientPeriods { usable: 1 })
        ));
        assert!(matches!(
            compare(&[], &CompareOptions::default()),
            Err(ReportError::InsufficientPeriods { usable: 0 })
        ));
    }

    #[test]
    fn empty_middle_period_still_pairs() {
        let a = snapshot("A", &[("X1", 1, "10", 1)]);
        let b = snapshot("B", &[]);
        let c = snapshot("C", &[("X1", 2, "20", 2)]);
        let result = compare(&[a, b, c], &CompareOptions::default()).unwrap();
        assert_eq!(result.pairs.len(), 2);
        assert_eq!(find(&result.pairs[0], "X1").presence, Presence::Disappeared);
        assert_eq!(find(&result.pairs[1], "X1").presence, Presence::Appeared);
    }

    #[test]
    fn significance_threshold_applies_to_any_kpi() {
        let a = snapshot("A", &[("X1", 100, "100", 100), ("X2", 100, "100", 100)]);
        let b = snapshot("B", &[("X1", 105, "100", 100), ("X2", 100, "100", 115)]);
        let result = compare(&[a, b], &CompareOptions::default()).unwrap();
        assert!(!find(&result.pairs[0], "X1").significant);
        assert!(find(&result.pairs[0], "X2").significant);
    }

    #[test]
    fn views_flag_carries_into_the_pair() {
        let a = snapshot("A", &[("X1", 1, "1", 1)]);
        let mut b = snapshot("B", &[("X1", 1, "1", 1)]);
        b.views_from_sessions = true;
        let result = compare(&[a.clone(), b, a], &CompareOptions::default()).unwrap();
        assert!(result.pairs.iter().all(|p| p.views_from_sessions));
    }

    #[test]
    fn derived_rates_change_in_points() {
        let mut a = snapshot("A", &[("X1", 5, "100", 10)]);
        a.total.sessions = 100;
        a.total.order_items = 4;
        let mut b = snapshot("B", &[("X1", 8, "150", 10)]);
        b.total.sessions = 100;
        b.total.order_items = 0;
        let pair = compare_pair(&a, &b, &CompareOptions::default(), &TopMoversSelector::unbounded());
        assert_eq!(pair.derived.conversion_rate.delta, Some(dec("3")));
        assert_eq!(pair.derived.average_order_value.previous, Some(dec("25")));
        assert_eq!(pair.derived.average_order_value.delta, None);
    }
}
