//! CSV business report loader.
//!
//! Reads one exported report into a `RawTable` (header + string cells), then
//! normalizes it into a `PeriodDataset`:
//! - columns are resolved against the static table in `crate::schema`
//! - numeric cells are coerced by `crate::numeric`; bad cells become zero
//!   and are reported as `DataWarning`s
//! - rows repeating a child ASIN are summed into the first one

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::error::{ReportError, ReportResult};
use crate::numeric::{parse_count, parse_money};
use crate::schema::{Column, ColumnMap};
use crate::types::{DataWarning, NormalizedReport, PeriodDataset, ReportRow, WarningKind};
use crate::util::label_from_file_name;

/// Cells of one report file, before any interpretation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawTable {
    /// File name as uploaded.
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Read a whole CSV document. A leading UTF-8 byte-order mark is ignored
    /// and rows shorter than the header are allowed.
    pub fn from_reader<R: Read>(name: &str, reader: R) -> ReportResult<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = csv_reader
            .headers()
            .map_err(|e| csv_error(name, &e))?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_string())
            .collect();

        let mut rows = Vec::new();
        for result in csv_reader.records() {
            let record = result.map_err(|e| csv_error(name, &e))?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(Self {
            name: name.to_string(),
            headers,
            rows,
        })
    }

    /// Cell at `idx`, blank when the row is short.
    fn cell<'a>(row: &'a [String], idx: Option<usize>) -> &'a str {
        idx.and_then(|i| row.get(i)).map(String::as_str).unwrap_or("")
    }
}

fn csv_error(name: &str, e: &csv::Error) -> ReportError {
    if let csv::ErrorKind::Io(io) = e.kind() {
        return ReportError::Read {
            name: name.to_string(),
            reason: io.to_string(),
        };
    }
    ReportError::Csv {
        name: name.to_string(),
        line: e.position().map(|p| p.line()).unwrap_or(0),
        reason: e.to_string(),
    }
}

/// Turn a raw table into a period dataset labelled after the file name.
pub fn normalize(table: &RawTable) -> ReportResult<NormalizedReport> {
    normalize_as(table, &label_from_file_name(&table.name))
}

/// Turn a raw table into a period dataset with an explicit label.
pub fn normalize_as(table: &RawTable, label: &str) -> ReportResult<NormalizedReport> {
    let columns = ColumnMap::resolve(&table.headers);
    let missing = columns.missing_required();
    if !missing.is_empty() {
        return Err(ReportError::Schema {
            name: table.name.clone(),
            missing,
        });
    }

    let mut warnings = Vec::new();
    let mut rows: BTreeMap<String, ReportRow> = BTreeMap::new();

    let views_from_sessions = columns.views_from_sessions();
    for (applies, views) in [
        (views_from_sessions.standard, Column::PageViews),
        (views_from_sessions.b2b, Column::PageViewsB2b),
    ] {
        if applies {
            warnings.push(DataWarning {
                line: 1,
                column: views.header().to_string(),
                value: String::new(),
                kind: WarningKind::PageViewsFromSessions,
            });
        }
    }

    for (idx, cells) in table.rows.iter().enumerate() {
        // Header is line 1.
        let line = idx as u64 + 2;
        if cells.iter().all(|c| c.is_empty()) {
            continue;
        }

        let child_asin = RawTable::cell(cells, columns.position(Column::ChildAsin)).to_string();
        if child_asin.is_empty() {
            warnings.push(DataWarning {
                line,
                column: Column::ChildAsin.header().to_string(),
                value: String::new(),
                kind: WarningKind::MissingAsin,
            });
            continue;
        }

        let mut reader = CellReader {
            cells,
            columns: &columns,
            line,
            warnings: &mut warnings,
        };
        let mut row = ReportRow {
            parent_asin: reader.text(Column::ParentAsin),
            child_asin: child_asin.clone(),
            title: reader.text(Column::Title),
            ordered_units: reader.count(Column::OrderedUnits),
            ordered_units_b2b: reader.count(Column::OrderedUnitsB2b),
            revenue: reader.money(Column::Revenue),
            revenue_b2b: reader.money(Column::RevenueB2b),
            page_views: reader.count(Column::PageViews),
            page_views_b2b: reader.count(Column::PageViewsB2b),
            sessions: reader.count(Column::Sessions),
            sessions_b2b: reader.count(Column::SessionsB2b),
            order_items: reader.count(Column::OrderItems),
            order_items_b2b: reader.count(Column::OrderItemsB2b),
            sessions_mobile: reader.count(Column::SessionsMobile),
            sessions_mobile_b2b: reader.count(Column::SessionsMobileB2b),
            sessions_browser: reader.count(Column::SessionsBrowser),
            sessions_browser_b2b: reader.count(Column::SessionsBrowserB2b),
        };
        if views_from_sessions.standard {
            row.page_views = row.sessions;
        }
        if views_from_sessions.b2b {
            row.page_views_b2b = row.sessions_b2b;
        }

        match rows.get_mut(&child_asin) {
            Some(existing) => {
                let capped = existing.merge(&row);
                warnings.push(DataWarning {
                    line,
                    column: Column::ChildAsin.header().to_string(),
                    value: child_asin.clone(),
                    kind: WarningKind::MergedDuplicate,
                });
                if capped {
                    warnings.push(DataWarning {
                        line,
                        column: Column::ChildAsin.header().to_string(),
                        value: child_asin,
                        kind: WarningKind::CappedSum,
                    });
                }
            }
            None => {
                rows.insert(child_asin, row);
            }
        }
    }

    if !warnings.is_empty() {
        log::warn!(
            "{}: {} value(s) coerced or merged during normalization",
            table.name,
            warnings.len()
        );
    }
    log::debug!(
        "{}: {} ASINs, variant {}",
        table.name,
        rows.len(),
        columns.variant()
    );

    Ok(NormalizedReport {
        dataset: PeriodDataset {
            label: label.to_string(),
            source_name: table.name.clone(),
            period_start: period_date_from_name(&table.name),
            schema_variant: columns.variant(),
            views_from_sessions,
            rows,
        },
        warnings,
    })
}

/// Reads typed values out of one row, recording coercion problems.
struct CellReader<'a> {
    cells: &'a [String],
    columns: &'a ColumnMap,
    line: u64,
    warnings: &'a mut Vec<DataWarning>,
}

impl CellReader<'_> {
    fn raw(&self, column: Column) -> &str {
        RawTable::cell(self.cells, self.columns.position(column))
    }

    fn text(&self, column: Column) -> String {
        self.raw(column).to_string()
    }

    fn count(&mut self, column: Column) -> u64 {
        match parse_count(self.raw(column)) {
            Ok(value) => value,
            Err(issue) => {
                self.warn(column, issue.into());
                0
            }
        }
    }

    fn money(&mut self, column: Column) -> Decimal {
        match parse_money(self.raw(column)) {
            Ok(value) => value,
            Err(issue) => {
                self.warn(column, issue.into());
                Decimal::ZERO
            }
        }
    }

    fn warn(&mut self, column: Column, kind: WarningKind) {
        let value = self.raw(column).to_string();
        self.warnings.push(DataWarning {
            line: self.line,
            column: column.header().to_string(),
            value,
            kind,
        });
    }
}

/// Read and normalize a report from any reader.
pub fn load_report<R: Read>(name: &str, reader: R) -> ReportResult<NormalizedReport> {
    normalize(&RawTable::from_reader(name, reader)?)
}

/// Read and normalize a report file. The file is opened, read fully and
/// closed before normalization starts.
pub fn load_report_file(path: impl AsRef<Path>) -> ReportResult<NormalizedReport> {
    let path = path.as_ref();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let bytes = std::fs::read(path).map_err(|e| ReportError::Read {
        name: name.clone(),
        reason: e.to_string(),
    })?;
    load_report(&name, bytes.as_slice())
}

/// Date embedded in an uploaded file name: `DD.MM.YY`, `DD.MM.YYYY` or
/// `YYYY-MM-DD`. Two-digit years below 50 are 20xx, the rest 19xx.
pub fn period_date_from_name(name: &str) -> Option<NaiveDate> {
    let chars: Vec<char> = name.chars().collect();
    for start in 0..chars.len() {
        if start > 0 && chars[start - 1].is_ascii_digit() {
            continue;
        }
        for width in [10, 8] {
            let end = start + width;
            if end > chars.len() || chars.get(end).is_some_and(char::is_ascii_digit) {
                continue;
            }
            let window: String = chars[start..end].iter().collect();
            if let Some(date) = parse_date_token(&window) {
                return Some(date);
            }
        }
    }
    None
}

fn parse_date_token(token: &str) -> Option<NaiveDate> {
    // `%Y` alone would also take a two-digit year.
    let iso_shaped = token.len() == 10
        && token.as_bytes()[..4].iter().all(u8::is_ascii_digit)
        && token.as_bytes()[4] == b'-';
    if iso_shaped {
        return NaiveDate::parse_from_str(token, "%Y-%m-%d").ok();
    }
    if token.len() == 10 {
        return NaiveDate::parse_from_str(token, "%d.%m.%Y").ok();
    }
    let parts: Vec<&str> = token.split('.').collect();
    if let [day, month, year] = parts.as_slice() {
        if day.len() != 2 || month.len() != 2 || year.len() != 2 {
            return None;
        }
        let yy: i32 = year.parse().ok()?;
        let full_year = if yy < 50 { 2000 + yy } else { 1900 + yy };
        return NaiveDate::from_ymd_opt(full_year, month.parse().ok()?, day.parse().ok()?);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SchemaVariant;

    const SAMPLE_CSV: &str = "\
(Übergeordnete) ASIN,(Untergeordnete) ASIN,Titel,Sitzungen – Summe,Seitenaufrufe – Summe,Bestellte Einheiten,Durch bestellte Produkte erzielter Umsatz,Zahl der Bestellposten,Bestellte Einheiten – B2B,Bestellsumme – B2B,Seitenaufrufe – Summe – B2B
P100,C101,Tasse blau,\"1,204\",\"1,530\",12,\"368,14 €\",11,2,\"59,90 €\",40
P100,C102,Tasse rot,80,95,3,\"89,70 €\",3,0,\"0,00 €\",0
,C200,Teekanne,15,20,1,\"1.999,55 €\",1,1,\"1.999,55 €\",4
";

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn load_sample_csv() {
        let report = load_report("Report 01.02.24.csv", SAMPLE_CSV.as_bytes()).unwrap();
        let ds = &report.dataset;
        assert!(report.warnings.is_empty());
        assert_eq!(ds.label, "Report 01.02.24");
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.schema_variant, SchemaVariant::B2bCapable);
        assert_eq!(ds.period_start, NaiveDate::from_ymd_opt(2024, 2, 1));

        let c101 = &ds.rows["C101"];
        assert_eq!(c101.parent_asin, "P100");
        assert_eq!(c101.title, "Tasse blau");
        assert_eq!(c101.sessions, 1204);
        assert_eq!(c101.page_views, 1530);
        assert_eq!(c101.ordered_units, 12);
        assert_eq!(c101.revenue, dec("368.14"));
        assert_eq!(c101.order_items, 11);
        assert_eq!(c101.ordered_units_b2b, 2);
        assert_eq!(c101.revenue_b2b, dec("59.90"));
        assert_eq!(c101.page_views_b2b, 40);
        // Absent from the export.
        assert_eq!(c101.sessions_b2b, 0);

        assert_eq!(ds.rows["C200"].parent_asin, "");
        assert_eq!(ds.rows["C200"].revenue, dec("1999.55"));
    }

    #[test]
    fn byte_order_mark_is_tolerated() {
        let with_bom = format!("\u{feff}{}", SAMPLE_CSV);
        let report = load_report("bom.csv", with_bom.as_bytes()).unwrap();
        assert_eq!(report.dataset.len(), 3);
        assert_eq!(report.dataset.rows["C101"].parent_asin, "P100");
    }

    #[test]
    fn hyphen_headers_match_en_dash_headers() {
        let csv_data = "\
(Übergeordnete) ASIN,(Untergeordnete) ASIN,Bestellte Einheiten - B2B,Seitenaufrufe - Summe - B2B
P1,C1,4,9
";
        let report = load_report("b2b.csv", csv_data.as_bytes()).unwrap();
        let row = &report.dataset.rows["C1"];
        assert_eq!(row.ordered_units_b2b, 4);
        assert_eq!(row.page_views_b2b, 9);
        assert_eq!(row.ordered_units, 0);
    }

    #[test]
    fn malformed_cells_become_zero_with_warnings() {
        let csv_data = "\
(Übergeordnete) ASIN,(Untergeordnete) ASIN,Bestellte Einheiten,Durch bestellte Produkte erzielter Umsatz,Seitenaufrufe – Summe
P1,C1,zwölf,\"10,00 €\",
P1,C2,-4,kaputt,7
";
        let report = load_report("bad.csv", csv_data.as_bytes()).unwrap();
        let ds = &report.dataset;
        assert_eq!(ds.rows["C1"].ordered_units, 0);
        assert_eq!(ds.rows["C1"].revenue, dec("10"));
        // Blank is not a warning.
        assert_eq!(ds.rows["C1"].page_views, 0);
        assert_eq!(ds.rows["C2"].page_views, 7);

        assert_eq!(report.warnings.len(), 3);
        assert_eq!(report.warnings[0].line, 2);
        assert_eq!(report.warnings[0].column, "Bestellte Einheiten");
        assert_eq!(report.warnings[0].value, "zwölf");
        assert_eq!(report.warnings[0].kind, WarningKind::MalformedNumber);
        assert_eq!(report.warnings[1].kind, WarningKind::NegativeValue);
        assert_eq!(report.warnings[2].kind, WarningKind::MalformedNumber);
        assert_eq!(report.warnings[2].line, 3);
    }

    #[test]
    fn duplicate_child_asins_are_summed() {
        let csv_data = "\
(Übergeordnete) ASIN,(Untergeordnete) ASIN,Bestellte Einheiten,Durch bestellte Produkte erzielter Umsatz
,C1,2,\"5,50\"
P1,C1,3,\"4,50\"
P1,C2,1,\"1,00\"
";
        let report = load_report("dup.csv", csv_data.as_bytes()).unwrap();
        let ds = &report.dataset;
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.rows["C1"].ordered_units, 5);
        assert_eq!(ds.rows["C1"].revenue, dec("10"));
        assert_eq!(ds.rows["C1"].parent_asin, "P1");
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].kind, WarningKind::MergedDuplicate);
        assert_eq!(report.warnings[0].line, 3);
    }

    #[test]
    fn rows_without_child_asin_are_skipped_and_blank_rows_ignored() {
        let csv_data = "\
(Übergeordnete) ASIN,(Untergeordnete) ASIN,Bestellte Einheiten
P1,,3
,,
P1,C1,1
";
        let report = load_report("gaps.csv", csv_data.as_bytes()).unwrap();
        assert_eq!(report.dataset.len(), 1);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].kind, WarningKind::MissingAsin);
        assert_eq!(report.warnings[0].line, 2);
    }

    #[test]
    fn short_rows_read_as_blank() {
        let csv_data = "\
(Übergeordnete) ASIN,(Untergeordnete) ASIN,Bestellte Einheiten,Seitenaufrufe – Summe
P1,C1,3
";
        let report = load_report("short.csv", csv_data.as_bytes()).unwrap();
        assert_eq!(report.dataset.rows["C1"].ordered_units, 3);
        assert_eq!(report.dataset.rows["C1"].page_views, 0);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn missing_asin_columns_is_a_schema_error() {
        let csv_data = "Titel,Bestellte Einheiten\nTasse,3\n";
        let err = load_report("noasin.csv", csv_data.as_bytes()).unwrap_err();
        match err {
            ReportError::Schema { name, missing } => {
                assert_eq!(name, "noasin.csv");
                assert_eq!(missing.len(), 2);
            }
            other => panic!("expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn missing_kpi_columns_is_a_schema_error() {
        let csv_data = "(Übergeordnete) ASIN,(Untergeordnete) ASIN,Titel\nP1,C1,Tasse\n";
        let err = load_report("nokpi.csv", csv_data.as_bytes()).unwrap_err();
        assert!(matches!(err, ReportError::Schema { ref missing, .. } if missing.len() == 1));
    }

    #[test]
    fn invalid_utf8_is_a_csv_error() {
        let mut bytes = b"(\xdcbergeordnete) ASIN,(Untergeordnete) ASIN\n".to_vec();
        bytes.extend_from_slice(b"P1,C1\n");
        let err = load_report("latin1.csv", bytes.as_slice()).unwrap_err();
        assert!(matches!(err, ReportError::Csv { .. }));
    }

    #[test]
    fn normalize_is_idempotent() {
        let table = RawTable::from_reader("same.csv", SAMPLE_CSV.as_bytes()).unwrap();
        let first = normalize(&table).unwrap();
        let again = normalize(&RawTable::from_reader("same.csv", SAMPLE_CSV.as_bytes()).unwrap()).unwrap();
        assert_eq!(first, again);
    }

    #[test]
    fn load_from_file_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2024-03-04 Woche.csv");
        std::fs::write(&path, SAMPLE_CSV).unwrap();
        let report = load_report_file(&path).unwrap();
        assert_eq!(report.dataset.source_name, "2024-03-04 Woche.csv");
        assert_eq!(report.dataset.label, "2024-03-04 Woche");
        assert_eq!(report.dataset.period_start, NaiveDate::from_ymd_opt(2024, 3, 4));
    }

    #[test]
    fn unreadable_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_report_file(dir.path().join("missing.csv")).unwrap_err();
        assert!(matches!(err, ReportError::Read { ref name, .. } if name == "missing.csv"));
    }

    #[test]
    fn dates_in_file_names() {
        assert_eq!(
            period_date_from_name("BusinessReport-05.03.24.csv"),
            NaiveDate::from_ymd_opt(2024, 3, 5)
        );
        assert_eq!(
            period_date_from_name("KW10 05.03.2024.csv"),
            NaiveDate::from_ymd_opt(2024, 3, 5)
        );
        assert_eq!(
            period_date_from_name("export_2023-12-31.csv"),
            NaiveDate::from_ymd_opt(2023, 12, 31)
        );
        assert_eq!(period_date_from_name("januar.csv"), None);
        assert_eq!(period_date_from_name("99.99.99.csv"), None);
    }

    #[test]
    fn two_digit_year_is_not_an_iso_date() {
        assert_eq!(period_date_from_name("export_24-03-04.csv"), None);
        assert_eq!(period_date_from_name("export 24-03-04 05.03.24.csv"), NaiveDate::from_ymd_opt(2024, 3, 5));
    }

    #[test]
    fn sessions_fill_in_for_missing_page_views() {
        let csv_data = "\
(Übergeordnete) ASIN,(Untergeordnete) ASIN,Bestellte Einheiten,Sitzungen – Summe,Sitzungen – mobile App,Sitzungen – Browser
P1,C1,3,40,25,15
";
        let report = load_report("sessions.csv", csv_data.as_bytes()).unwrap();
        let ds = &report.dataset;
        assert!(ds.views_from_sessions.standard);
        assert!(!ds.views_from_sessions.b2b);
        let row = &ds.rows["C1"];
        assert_eq!(row.page_views, 40);
        assert_eq!(row.sessions_mobile, 25);
        assert_eq!(row.sessions_browser, 15);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].kind, WarningKind::PageViewsFromSessions);
        assert_eq!(report.warnings[0].line, 1);
        assert_eq!(report.warnings[0].column, "Seitenaufrufe – Summe");
    }

    #[test]
    fn oversized_duplicate_sum_is_capped() {
        let csv_data = "\
(Übergeordnete) ASIN,(Untergeordnete) ASIN,Bestellte Einheiten
P1,X1,18446744073709551615
P1,X1,1
";
        let report = load_report("huge.csv", csv_data.as_bytes()).unwrap();
        assert_eq!(report.dataset.rows["X1"].ordered_units, u64::MAX);
        let kinds: Vec<&WarningKind> = report.warnings.iter().map(|w| &w.kind).collect();
        assert_eq!(kinds, vec![&WarningKind::MergedDuplicate, &WarningKind::CappedSum]);
    }
}
