//! Static column table for the Amazon "Detail Page Sales and Traffic by
//! Child Item" business report (German marketplace export).
//!
//! Header matching is done on a normalized form of the header text so that
//! the en dash used by Amazon (`–`) and a plain hyphen (`-`) are
//! interchangeable, and spacing differences do not matter.

use std::collections::HashMap;

use crate::types::{SchemaVariant, TrafficMode, ViewsFromSessions};

/// Every column the normalizer understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Column {
    ParentAsin,
    ChildAsin,
    Title,
    OrderedUnits,
    OrderedUnitsB2b,
    Revenue,
    RevenueB2b,
    PageViews,
    PageViewsB2b,
    Sessions,
    SessionsB2b,
    OrderItems,
    OrderItemsB2b,
    SessionsMobile,
    SessionsMobileB2b,
    SessionsBrowser,
    SessionsBrowserB2b,
}

impl Column {
    pub const ALL: [Column; 17] = [
        Column::ParentAsin,
        Column::ChildAsin,
        Column::Title,
        Column::OrderedUnits,
        Column::OrderedUnitsB2b,
        Column::Revenue,
        Column::RevenueB2b,
        Column::PageViews,
        Column::PageViewsB2b,
        Column::Sessions,
        Column::SessionsB2b,
        Column::OrderItems,
        Column::OrderItemsB2b,
        Column::SessionsMobile,
        Column::SessionsMobileB2b,
        Column::SessionsBrowser,
        Column::SessionsBrowserB2b,
    ];

    /// Columns that make a file worth comparing. At least one must exist.
    pub const KPI: [Column; 6] = [
        Column::OrderedUnits,
        Column::OrderedUnitsB2b,
        Column::Revenue,
        Column::RevenueB2b,
        Column::PageViews,
        Column::PageViewsB2b,
    ];

    /// Header text as Amazon exports it.
    pub fn header(self) -> &'static str {
        match self {
            Column::ParentAsin => "(Übergeordnete) ASIN",
            Column::ChildAsin => "(Untergeordnete) ASIN",
            Column::Title => "Titel",
            Column::OrderedUnits => "Bestellte Einheiten",
            Column::OrderedUnitsB2b => "Bestellte Einheiten – B2B",
            Column::Revenue => "Durch bestellte Produkte erzielter Umsatz",
            Column::RevenueB2b => "Bestellsumme – B2B",
            Column::PageViews => "Seitenaufrufe – Summe",
            Column::PageViewsB2b => "Seitenaufrufe – Summe – B2B",
            Column::Sessions => "Sitzungen – Summe",
            Column::SessionsB2b => "Sitzungen – Summe – B2B",
            Column::OrderItems => "Zahl der Bestellposten",
            Column::OrderItemsB2b => "Zahl der Bestellposten – B2B",
            Column::SessionsMobile => "Sitzungen – mobile App",
            Column::SessionsMobileB2b => "Sitzungen – mobile App – B2B",
            Column::SessionsBrowser => "Sitzungen – Browser",
            Column::SessionsBrowserB2b => "Sitzungen – Browser – B2B",
        }
    }

    pub fn is_b2b(self) -> bool {
        matches!(
            self,
            Column::OrderedUnitsB2b
                | Column::RevenueB2b
                | Column::PageViewsB2b
                | Column::SessionsB2b
                | Column::OrderItemsB2b
                | Column::SessionsMobileB2b
                | Column::SessionsBrowserB2b
        )
    }
}

/// The KPI columns read for one traffic mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KpiColumns {
    pub ordered_units: Column,
    pub revenue: Column,
    pub page_views: Column,
    pub sessions: Column,
    pub order_items: Column,
    pub sessions_mobile: Column,
    pub sessions_browser: Column,
}

impl KpiColumns {
    pub fn for_mode(mode: TrafficMode) -> Self {
        match mode {
            TrafficMode::Standard => Self {
                ordered_units: Column::OrderedUnits,
                revenue: Column::Revenue,
                page_views: Column::PageViews,
                sessions: Column::Sessions,
                order_items: Column::OrderItems,
                sessions_mobile: Column::SessionsMobile,
                sessions_browser: Column::SessionsBrowser,
            },
            TrafficMode::B2b => Self {
                ordered_units: Column::OrderedUnitsB2b,
                revenue: Column::RevenueB2b,
                page_views: Column::PageViewsB2b,
                sessions: Column::SessionsB2b,
                order_items: Column::OrderItemsB2b,
                sessions_mobile: Column::SessionsMobileB2b,
                sessions_browser: Column::SessionsBrowserB2b,
            },
        }
    }
}

/// Canonical form used to compare header cells.
pub fn normalize_header(raw: &str) -> String {
    raw.trim_start_matches('\u{feff}')
        .chars()
        .map(|c| match c {
            '\u{2013}' | '\u{2014}' | '\u{2212}' => '-',
            other => other,
        })
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Positions of the known columns within one file's header row.
#[derive(Clone, Debug, Default)]
pub struct ColumnMap {
    positions: HashMap<Column, usize>,
}

impl ColumnMap {
    /// Resolve header cells against the static table. When a header occurs
    /// more than once, the first occurrence wins.
    pub fn resolve<S: AsRef<str>>(headers: &[S]) -> Self {
        let lookup: HashMap<String, Column> = Column::ALL
            .iter()
            .map(|&c| (normalize_header(c.header()), c))
            .collect();

        let mut positions = HashMap::new();
        for (idx, header) in headers.iter().enumerate() {
            if let Some(&column) = lookup.get(&normalize_header(header.as_ref())) {
                positions.entry(column).or_insert(idx);
            }
        }
        Self { positions }
    }

    pub fn position(&self, column: Column) -> Option<usize> {
        self.positions.get(&column).copied()
    }

    pub fn has(&self, column: Column) -> bool {
        self.positions.contains_key(&column)
    }

    /// Required columns that are absent, by their export header.
    pub fn missing_required(&self) -> Vec<String> {
        let mut missing: Vec<String> = [Column::ParentAsin, Column::ChildAsin]
            .iter()
            .filter(|&&c| !self.has(c))
            .map(|c| c.header().to_string())
            .collect();

        if !Column::KPI.iter().any(|&c| self.has(c)) {
            missing.push(format!(
                "a KPI column (one of: {})",
                Column::KPI
                    .iter()
                    .map(|c| c.header())
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }
        missing
    }

    /// Families that lack page views but have sessions to stand in for them.
    pub fn views_from_sessions(&self) -> ViewsFromSessions {
        ViewsFromSessions {
            standard: !self.has(Column::PageViews) && self.has(Column::Sessions),
            b2b: !self.has(Column::PageViewsB2b) && self.has(Column::SessionsB2b),
        }
    }

    pub fn variant(&self) -> SchemaVariant {
        if Column::KPI.iter().any(|&c| c.is_b2b() && self.has(c)) {
            SchemaVariant::B2bCapable
        } else {
            SchemaVariant::Standard
        }
    }
}
