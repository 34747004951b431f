//! Labelled collection of loaded periods.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{ReportError, ReportResult};
use crate::types::PeriodDataset;

/// How loaded periods are lined up for comparison.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodOrdering {
    /// Oldest upload first.
    #[default]
    Insertion,
    /// Only these labels, in this order.
    Explicit(Vec<String>),
    /// By the date found in each file name. Falls back to insertion order
    /// when any period has no date.
    FileDate,
}

/// Owns every loaded `PeriodDataset`. Labels are unique; insertion order is
/// kept.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DatasetStore {
    datasets: Vec<PeriodDataset>,
}

impl DatasetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a period. Fails when the label is already taken.
    pub fn add(&mut self, dataset: PeriodDataset) -> ReportResult<()> {
        if self.position(&dataset.label).is_some() {
            return Err(ReportError::DuplicateLabel(dataset.label));
        }
        log::info!(
            "loaded period '{}' ({} ASINs, {})",
            dataset.label,
            dataset.len(),
            dataset.schema_variant
        );
        self.datasets.push(dataset);
        Ok(())
    }

    /// Add a period, replacing one with the same label in place. Returns the
    /// replaced dataset.
    pub fn add_or_replace(&mut self, dataset: PeriodDataset) -> Option<PeriodDataset> {
        match self.position(&dataset.label) {
            Some(idx) => {
                log::info!("replaced period '{}'", dataset.label);
                Some(std::mem::replace(&mut self.datasets[idx], dataset))
            }
            None => {
                self.datasets.push(dataset);
                None
            }
        }
    }

    pub fn remove(&mut self, label: &str) -> ReportResult<PeriodDataset> {
        let idx = self
            .position(label)
            .ok_or_else(|| ReportError::UnknownLabel(label.to_string()))?;
        Ok(self.datasets.remove(idx))
    }

    pub fn get(&self, label: &str) -> Option<&PeriodDataset> {
        self.datasets.iter().find(|d| d.label == label)
    }

    /// Labels in insertion order.
    pub fn list_labels(&self) -> Vec<&str> {
        self.datasets.iter().map(|d| d.label.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    /// Periods in comparison order.
    pub fn ordered(&self, ordering: &PeriodOrdering) -> ReportResult<Vec<&PeriodDataset>> {
        match ordering {
            PeriodOrdering::Insertion => Ok(self.datasets.iter().collect()),
            PeriodOrdering::Explicit(labels) => {
                let mut seen = HashSet::new();
                labels
                    .iter()
                    .map(|label| {
                        if !seen.insert(label.as_str()) {
                            return Err(ReportError::DuplicateLabel(label.clone()));
                        }
                        self.get(label)
                            .ok_or_else(|| ReportError::UnknownLabel(label.clone()))
                    })
                    .collect()
            }
            PeriodOrdering::FileDate => {
                let mut ordered: Vec<&PeriodDataset> = self.datasets.iter().collect();
                if let Some(undated) = ordered.iter().find(|d| d.period_start.is_none()) {
                    log::warn!(
                        "period '{}' has no date in its file name; keeping upload order",
                        undated.label
                    );
                    return Ok(ordered);
                }
                ordered.sort_by_key(|d| d.period_start);
                Ok(ordered)
            }
        }
    }

    fn position(&self, label: &str) -> Option<usize> {
        self.datasets.iter().position(|d| d.label == label)
    }
}
