//! Bounded prompt payloads from the enriched table.
//!
//! Two packing flavors, both deterministic for a given table and mode:
//! - by-year: the full table as JSON records grouped under year-string
//!   keys, optionally restricted to a subset of years
//! - head: the first N rows of the sorted table as a CSV block
//!
//! The payload text is what actually enters the system message, so both
//! flavors serialize to valid, parseable text and never silently change
//! shape based on table size.

use lotline_core::error::{Error, Result};
use lotline_core::record::EnrichedRecord;
use std::collections::{BTreeMap, BTreeSet};

/// Default row cap for [`PartitionMode::Head`].
pub const DEFAULT_HEAD_ROWS: usize = 50;

/// How the table is packed into the system message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionMode {
    /// JSON records grouped by year. `years: None` means every year in
    /// the table; a requested year with no rows is simply absent from
    /// the output.
    ByYear { years: Option<BTreeSet<i32>> },
    /// The first `cap` rows of the sorted table as a CSV block.
    Head { cap: usize },
}

impl PartitionMode {
    pub fn all_years() -> Self {
        Self::ByYear { years: None }
    }
}

/// Which flavor a payload was packed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    YearJson,
    HeadCsv,
}

/// A serialized slice of the dataset, ready for the system message.
#[derive(Debug, Clone)]
pub struct Payload {
    pub kind: PayloadKind,
    /// The serialized block itself.
    pub text: String,
    /// Rows that made it into the payload.
    pub rows_included: usize,
    /// Rows in the table the payload was packed from.
    pub rows_total: usize,
    /// Years present in the payload, ascending.
    pub years: Vec<i32>,
}

impl Payload {
    /// The block as it appears inside the system message, with the
    /// heading the instruction text refers to.
    pub fn prompt_block(&self) -> String {
        match self.kind {
            PayloadKind::YearJson => format!("DATOS (JSON por año):\n{}", self.text),
            PayloadKind::HeadCsv => format!(
                "DATOS (CSV, primeras {} filas):\n{}",
                self.rows_included, self.text
            ),
        }
    }
}

/// Pack `records` according to `mode`.
pub fn partition(records: &[EnrichedRecord], mode: &PartitionMode) -> Result<Payload> {
    match mode {
        PartitionMode::ByYear { years } => by_year(records, years.as_ref()),
        PartitionMode::Head { cap } => head(records, *cap),
    }
}

fn by_year(records: &[EnrichedRecord], filter: Option<&BTreeSet<i32>>) -> Result<Payload> {
    let mut groups: BTreeMap<String, Vec<&EnrichedRecord>> = BTreeMap::new();
    let mut years = BTreeSet::new();
    for record in records {
        if let Some(filter) = filter {
            if !filter.contains(&record.year) {
                continue;
            }
        }
        groups.entry(record.year.to_string()).or_default().push(record);
        years.insert(record.year);
    }

    let rows_included = groups.values().map(Vec::len).sum();
    let text = serde_json::to_string_pretty(&groups)?;
    Ok(Payload {
        kind: PayloadKind::YearJson,
        text,
        rows_included,
        rows_total: records.len(),
        years: years.into_iter().collect(),
    })
}

fn head(records: &[EnrichedRecord], cap: usize) -> Result<Payload> {
    let slice = &records[..cap.min(records.len())];
    if slice.is_empty() {
        return Ok(Payload {
            kind: PayloadKind::HeadCsv,
            text: String::new(),
            rows_included: 0,
            rows_total: records.len(),
            years: Vec::new(),
        });
    }

    // Flatten every row to a JSON object first; the column set is the
    // sorted union of keys, so optional fields line up across rows and
    // the block is deterministic.
    let mut rows: Vec<serde_json::Map<String, serde_json::Value>> = Vec::with_capacity(slice.len());
    let mut columns: BTreeSet<String> = BTreeSet::new();
    for record in slice {
        match serde_json::to_value(record)? {
            serde_json::Value::Object(map) => {
                columns.extend(map.keys().cloned());
                rows.push(map);
            }
            other => {
                return Err(Error::Internal(format!(
                    "enriched record serialized to {other:?}, expected an object"
                )));
            }
        }
    }

    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
    let header: Vec<&str> = columns.iter().map(String::as_str).collect();
    writer
        .write_record(&header)
        .map_err(|e| Error::Internal(format!("cannot write payload header: {e}")))?;
    for row in &rows {
        let cells: Vec<String> = columns.iter().map(|c| cell_text(row.get(c))).collect();
        writer
            .write_record(&cells)
            .map_err(|e| Error::Internal(format!("cannot write payload row: {e}")))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| Error::Internal(format!("cannot finish payload block: {e}")))?;
    let text = String::from_utf8(bytes)
        .map_err(|e| Error::Internal(format!("payload block is not UTF-8: {e}")))?;

    let years: BTreeSet<i32> = slice.iter().map(|r| r.year).collect();
    Ok(Payload {
        kind: PayloadKind::HeadCsv,
        text,
        rows_included: slice.len(),
        rows_total: records.len(),
        years: years.into_iter().collect(),
    })
}

fn cell_text(value: Option<&serde_json::Value>) -> String {
    match value {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
