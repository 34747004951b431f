//! Report error types.
//!
//! Every failure mode has a named variant. Per-file failures (`Read`, `Csv`,
//! `Schema`) only ever reject the file they came from.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to read '{name}': {reason}")]
    Read { name: String, reason: String },

    #[error("CSV parse error in '{name}' at line {line}: {reason}")]
    Csv {
        name: String,
        line: u64,
        reason: String,
    },

    #[error("Schema error in '{name}': missing {}", .missing.join(", "))]
    Schema { name: String, missing: Vec<String> },

    #[error("A period labelled '{0}' is already loaded")]
    DuplicateLabel(String),

    #[error("No period labelled '{0}'")]
    UnknownLabel(String),

    #[error("At least two periods with data are needed for a comparison ({usable} available)")]
    InsufficientPeriods { usable: usize },
}

impl ReportError {
    /// True for errors that reject a single input file and leave the rest of
    /// the session untouched.
    pub fn is_per_file(&self) -> bool {
        matches!(
            self,
            ReportError::Read { .. } | ReportError::Csv { .. } | ReportError::Schema { .. }
        )
    }
}

/// Result type alias for report operations.
pub type ReportResult<T> = Result<T, ReportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_error_lists_missing_columns() {
        let err = ReportError::Schema {
            name: "week.csv".into(),
            missing: vec!["(Übergeordnete) ASIN".into(), "(Untergeordnete) ASIN".into()],
        };
        assert_eq!(
            err.to_string(),
            "Schema error in 'week.csv': missing (Übergeordnete) ASIN, (Untergeordnete) ASIN"
        );
        assert!(err.is_per_file());
    }

    #[test]
    fn session_errors_are_not_per_file() {
        assert!(!ReportError::DuplicateLabel("a".into()).is_per_file());
        assert!(!ReportError::InsufficientPeriods { usable: 1 }.is_per_file());
    }
}
