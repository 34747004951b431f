//! Cell coercion for report values.
//!
//! Amazon's German exports mix formats: money as `1.999,55 €` or `368,14 €`,
//! counts as `9,778` (comma as thousands separator) or `1.234`. Values are
//! parsed into exact types (`u64`, `Decimal`); binary floating point is never
//! involved.

use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::types::WarningKind;

/// Why a non-blank cell could not be taken as-is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NumberIssue {
    Malformed,
    Negative,
}

impl From<NumberIssue> for WarningKind {
    fn from(issue: NumberIssue) -> Self {
        match issue {
            NumberIssue::Malformed => WarningKind::MalformedNumber,
            NumberIssue::Negative => WarningKind::NegativeValue,
        }
    }
}

/// Parse a money cell. Blank cells are zero.
pub fn parse_money(raw: &str) -> Result<Decimal, NumberIssue> {
    let compact = strip_noise(raw);
    if compact.is_empty() {
        return Ok(Decimal::ZERO);
    }
    let value = Decimal::from_str(&canonical_decimal(&compact)).map_err(|_| NumberIssue::Malformed)?;
    if value.is_sign_negative() && !value.is_zero() {
        return Err(NumberIssue::Negative);
    }
    Ok(value.normalize())
}

/// Parse a count cell (units, page views, sessions). Blank cells are zero.
///
/// Grouped thousands with either separator are accepted, as is a decimal
/// rendering with a zero fraction (`12,00`). A real fraction is malformed.
pub fn parse_count(raw: &str) -> Result<u64, NumberIssue> {
    let compact = strip_noise(raw);
    if compact.is_empty() {
        return Ok(0);
    }
    if let Some(rest) = compact.strip_prefix('-') {
        return match parse_count(rest) {
            Ok(0) => Ok(0),
            Ok(_) => Err(NumberIssue::Negative),
            Err(issue) => Err(issue),
        };
    }
    if compact.bytes().all(|b| b.is_ascii_digit()) {
        return compact.parse().map_err(|_| NumberIssue::Malformed);
    }
    if is_grouped_thousands(&compact) {
        let digits: String = compact.chars().filter(char::is_ascii_digit).collect();
        return digits.parse().map_err(|_| NumberIssue::Malformed);
    }

    let value = Decimal::from_str(&canonical_decimal(&compact)).map_err(|_| NumberIssue::Malformed)?;
    if !value.fract().is_zero() {
        return Err(NumberIssue::Malformed);
    }
    value.trunc().to_u64().ok_or(NumberIssue::Malformed)
}

/// Drop whitespace (including the non-breaking kinds) and currency marks.
fn strip_noise(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '€' | '$' | '\u{a0}' | '\u{202f}'))
        .collect()
}

/// `9,778` / `1.234.567`: one to three leading digits, then groups of three,
/// all with the same separator.
fn is_grouped_thousands(s: &str) -> bool {
    let sep = match s.chars().find(|c| *c == '.' || *c == ',') {
        Some(sep) => sep,
        None => return false,
    };
    let mut groups = s.split(sep);
    let head = groups.next().unwrap_or_default();
    if head.is_empty() || head.len() > 3 || !head.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let mut saw_group = false;
    for group in groups {
        if group.len() != 3 || !group.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
        saw_group = true;
    }
    saw_group
}

/// Rewrite a localized decimal into `Decimal::from_str` syntax.
///
/// - both `.` and `,`: the one occurring last is the decimal separator
/// - only `,`: a single comma is the decimal separator, several are grouping
/// - only `.`: a single dot is the decimal separator, several are grouping
fn canonical_decimal(s: &str) -> String {
    let last_dot = s.rfind('.');
    let last_comma = s.rfind(',');
    match (last_dot, last_comma) {
        (Some(dot), Some(comma)) if comma > dot => s.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => s.replace(',', ""),
        (None, Some(_)) if s.matches(',').count() == 1 => s.replace(',', "."),
        (None, Some(_)) => s.replace(',', ""),
        (Some(_), None) if s.matches('.').count() > 1 => s.replace('.', ""),
        _ => s.to_string(),
    }
}
