//! Dataset overview derived from the enriched table.

use lotline_core::record::{EnrichedRecord, Period};
use serde::Serialize;
use std::collections::BTreeSet;

/// At-a-glance numbers for the `dataset` command and the chat banner.
#[derive(Debug, Clone, Serialize)]
pub struct DatasetSummary {
    pub rows: usize,
    pub first_period: Option<Period>,
    pub last_period: Option<Period>,
    /// Distinct years, ascending.
    pub years: Vec<i32>,
    pub substances: usize,
    pub presentations: usize,
    pub lines: usize,
    pub families: usize,
}

impl DatasetSummary {
    /// "2023-11 .. 2025-01", or "empty" for a table with no rows.
    pub fn period_span(&self) -> String {
        match (self.first_period, self.last_period) {
            (Some(first), Some(last)) => format!("{first} .. {last}"),
            _ => "empty".into(),
        }
    }
}

/// Condense the enriched table into a [`DatasetSummary`].
pub fn summarize(records: &[EnrichedRecord]) -> DatasetSummary {
    let mut years = BTreeSet::new();
    let mut substances = BTreeSet::new();
    let mut presentations = BTreeSet::new();
    let mut lines = BTreeSet::new();
    let mut families = BTreeSet::new();

    for record in records {
        years.insert(record.year);
        if let Some(v) = &record.base.substance {
            substances.insert(v.as_str());
        }
        if let Some(v) = &record.base.presentation {
            presentations.insert(v.as_str());
        }
        if let Some(v) = &record.base.line {
            lines.insert(v.as_str());
        }
        if let Some(v) = &record.base.family {
            families.insert(v.as_str());
        }
    }

    DatasetSummary {
        rows: records.len(),
        first_period: records.iter().map(|r| r.period).min(),
        last_period: records.iter().map(|r| r.period).max(),
        years: years.into_iter().collect(),
        substances: substances.len(),
        presentations: presentations.len(),
        lines: lines.len(),
        families: families.len(),
    }
}
