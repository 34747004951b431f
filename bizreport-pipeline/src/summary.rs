//! Plain-text summary of a comparison.
//!
//! One block per period pair: a header with both labels, the total deltas,
//! the derived rate changes and the top movers. ASINs that did not change are
//! left out of the listing but stay in the delta table.

use std::fmt::Write;

use rust_decimal::{Decimal, RoundingStrategy};

use crate::comparator::{
    AmountDelta, AsinDelta, CompareOptions, CountDelta, PercentChange, PeriodComparison, Presence, RateChange,
};
use crate::components::top_movers_selector::TopMoversSelector;
use crate::components::unchanged_filter::UnchangedFilter;
use crate::filter::{self, Filter};
use crate::selector::Selector;
use crate::types::TrafficMode;

/// Render every pair, blocks separated by a blank line.
pub fn render(pairs: &[PeriodComparison], mode: TrafficMode, options: &CompareOptions) -> String {
    pairs
        .iter()
        .map(|pair| render_pair(pair, mode, options))
        .collect::<Vec<_>>()
        .join("\n")
}

/// ASINs listed under "top movers" for one pair.
pub fn top_movers(pair: &PeriodComparison, options: &CompareOptions) -> Vec<AsinDelta> {
    let filters: Vec<Box<dyn Filter<CompareOptions, AsinDelta>>> = vec![Box::new(UnchangedFilter)];
    let changed = filter::run_filters(&filters, options, pair.asins.clone());

    let selector = TopMoversSelector::new(options.top_n);
    if !selector.enable(options) {
        return Vec::new();
    }
    selector.select(options, changed)
}

pub fn render_pair(pair: &PeriodComparison, mode: TrafficMode, options: &CompareOptions) -> String {
    let currency = options.currency_symbol.as_str();
    let views = views_label(pair);
    let mut out = String::new();

    // Writing to a String cannot fail.
    let _ = writeln!(out, "Comparison ({mode}): {} -> {}", pair.previous_label, pair.current_label);
    let total = &pair.total;
    let _ = writeln!(
        out,
        "  Total: units {}, revenue {}, {views} {}",
        count_totals(&total.ordered_units),
        money_totals(&total.revenue, currency),
        count_totals(&total.page_views),
    );
    let _ = writeln!(
        out,
        "  Conversion rate: {}; average order value: {}; revenue per session: {}",
        rate_change(&pair.derived.conversion_rate, " pp", "%"),
        money_rate_change(&pair.derived.average_order_value, currency),
        money_rate_change(&pair.derived.revenue_per_session, currency),
    );

    if pair.asins.iter().all(|a| a.presence == Presence::Both && a.deltas.is_unchanged()) {
        let _ = writeln!(out, "  No ASIN-level changes.");
        return out;
    }
    let movers = top_movers(pair, options);
    if movers.is_empty() {
        return out;
    }

    let _ = writeln!(out, "  Top {} movers:", movers.len());
    for (idx, mover) in movers.iter().enumerate() {
        let _ = writeln!(out, "    {}. {}", idx + 1, asin_line(mover, views, currency));
    }
    out
}

/// Page views filled from sessions are reported as sessions.
fn views_label(pair: &PeriodComparison) -> &'static str {
    if pair.views_from_sessions {
        "sessions"
    } else {
        "page views"
    }
}

fn asin_line(mover: &AsinDelta, views: &str, currency: &str) -> String {
    let mut line = mover.asin.clone();
    if !mover.title.is_empty() {
        let _ = write!(line, " \"{}\"", mover.title);
    }
    match mover.presence {
        Presence::Appeared => line.push_str(" [new]"),
        Presence::Disappeared => line.push_str(" [disappeared]"),
        Presence::Both => {}
    }
    let _ = write!(
        line,
        ": units {} ({}), revenue {} ({}), {views} {} ({})",
        signed_count(mover.deltas.ordered_units.delta),
        percent(&mover.deltas.ordered_units.percent_change),
        signed_money(mover.deltas.revenue.delta, currency),
        percent(&mover.deltas.revenue.percent_change),
        signed_count(mover.deltas.page_views.delta),
        percent(&mover.deltas.page_views.percent_change),
    );
    line
}

/// `13 -> 21 (+8, +61.54%)`
fn count_totals(change: &CountDelta) -> String {
    format!(
        "{} -> {} ({}, {})",
        change.previous,
        change.current,
        signed_count(change.delta),
        percent(&change.percent_change)
    )
}

fn money_totals(change: &AmountDelta, currency: &str) -> String {
    format!(
        "{} -> {} ({}, {})",
        money(change.previous, currency),
        money(change.current, currency),
        signed_money(change.delta, currency),
        percent(&change.percent_change)
    )
}

fn rate_change(change: &RateChange, delta_unit: &str, value_unit: &str) -> String {
    match (change.previous, change.current, change.delta) {
        (Some(prev), Some(cur), Some(delta)) => format!(
            "{}{value_unit} -> {}{value_unit} ({}{delta_unit})",
            fixed(prev),
            fixed(cur),
            signed_fixed(delta)
        ),
        _ => "n/a".to_string(),
    }
}

fn money_rate_change(change: &RateChange, currency: &str) -> String {
    match (change.previous, change.current, change.delta) {
        (Some(prev), Some(cur), Some(delta)) => format!(
            "{} -> {} ({})",
            money(prev, currency),
            money(cur, currency),
            signed_money(delta, currency)
        ),
        _ => "n/a".to_string(),
    }
}

fn percent(change: &PercentChange) -> String {
    match change {
        PercentChange::Percent(pct) => format!("{}%", signed_fixed(*pct)),
        PercentChange::New => "new".to_string(),
    }
}

fn signed_count(delta: i128) -> String {
    if delta > 0 {
        format!("+{delta}")
    } else {
        delta.to_string()
    }
}

fn sign_of(value: Decimal) -> &'static str {
    if value.is_sign_negative() && !value.is_zero() {
        "-"
    } else if value.is_zero() {
        ""
    } else {
        "+"
    }
}

/// Two decimal places.
fn fixed(value: Decimal) -> String {
    let mut v = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    v.rescale(2);
    v.to_string()
}

fn signed_fixed(value: Decimal) -> String {
    format!("{}{}", sign_of(value), fixed(value.abs()))
}

/// `1,234.50 €`: two decimals, comma-grouped thousands, symbol suffix.
pub fn money(value: Decimal, currency: &str) -> String {
    let sign = if value.is_sign_negative() && !value.is_zero() { "-" } else { "" };
    format!("{sign}{} {currency}", grouped(&fixed(value.abs())))
}

fn signed_money(value: Decimal, currency: &str) -> String {
    format!("{}{} {currency}", sign_of(value), grouped(&fixed(value.abs())))
}

fn grouped(plain: &str) -> String {
    let (int, frac) = plain.split_once('.').unwrap_or((plain, ""));
    let mut out = String::with_capacity(plain.len() + int.len() / 3);
    for (idx, ch) in int.chars().enumerate() {
        if idx > 0 && (int.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if !frac.is_empty() {
        out.push('.');
        out.push_str(frac);
    }
    out
}
