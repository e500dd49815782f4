//! Production record domain types.
//!
//! These are the value objects that flow through the pipeline:
//! the loader yields `ProductionRecord`s → the enricher derives a
//! `EnrichedRecord` per row → the partitioner serializes them into the
//! prompt payload.

use chrono::{Datelike, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A year-month bucket, the chronological sort key for the whole table.
///
/// Renders and serializes as `YYYY-MM` so it stays readable inside the
/// JSON payload handed to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Period {
    pub year: i32,
    pub month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }

    /// The bucket a timestamp falls into.
    pub fn from_timestamp(ts: &NaiveDateTime) -> Self {
        Self {
            year: ts.year(),
            month: ts.month(),
        }
    }

    /// Calendar quarter, 1 through 4.
    pub fn quarter(&self) -> u32 {
        (self.month - 1) / 3 + 1
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl From<Period> for String {
    fn from(p: Period) -> Self {
        p.to_string()
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s
            .split_once('-')
            .ok_or_else(|| format!("expected YYYY-MM, got '{s}'"))?;
        let year: i32 = year
            .parse()
            .map_err(|_| format!("invalid year in period '{s}'"))?;
        let month: u32 = month
            .parse()
            .map_err(|_| format!("invalid month in period '{s}'"))?;
        if !(1..=12).contains(&month) {
            return Err(format!("month out of range in period '{s}'"));
        }
        Ok(Self { year, month })
    }
}

impl TryFrom<String> for Period {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// One row of the plant master table, as loaded from the source file.
///
/// The timestamp is naive plant-local time; no timezone conversion is
/// applied anywhere in the pipeline. Columns the loader does not map to
/// a named field are carried verbatim in `extra` and flattened back out
/// on serialization, so nothing the source table says is lost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionRecord {
    /// When the manufacturing order started processing.
    pub process_start: NaiveDateTime,

    /// Final produced volume for the order.
    pub final_volume: f64,

    /// Active substance, when the table carries it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub substance: Option<String>,

    /// Commercial presentation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presentation: Option<String>,

    /// Production line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<String>,

    /// Product family.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,

    /// Unmapped source columns, keyed by header name.
    #[serde(default, flatten, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl ProductionRecord {
    /// Minimal record with only the required columns set.
    pub fn new(process_start: NaiveDateTime, final_volume: f64) -> Self {
        Self {
            process_start,
            final_volume,
            substance: None,
            presentation: None,
            line: None,
            family: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn period(&self) -> Period {
        Period::from_timestamp(&self.process_start)
    }
}

/// Production phase cutover: orders from this year onward belong to the
/// plant's current operating phase.
pub const PHASE_CUTOVER_YEAR: i32 = 2023;

/// A `ProductionRecord` plus the derived time-series features.
///
/// `lag1`, `lag2` and `moving_avg3` are `None` while there is not enough
/// preceding history in the chronologically sorted table; they serialize
/// as JSON `null` rather than a fabricated zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    #[serde(flatten)]
    pub base: ProductionRecord,

    /// Calendar year of `process_start`.
    pub year: i32,

    /// Year-month bucket, the sort key.
    pub period: Period,

    /// Calendar month, 1 through 12.
    pub month: u32,

    /// Calendar quarter, 1 through 4.
    pub quarter: u32,

    /// Volume of the immediately preceding row in the sorted table.
    pub lag1: Option<f64>,

    /// Volume two rows back in the sorted table.
    pub lag2: Option<f64>,

    /// Trailing mean over this row and the two before it.
    pub moving_avg3: Option<f64>,

    /// Whether the row falls in the current operating phase
    /// (year >= [`PHASE_CUTOVER_YEAR`]).
    pub phase: bool,
}

impl EnrichedRecord {
    pub fn volume(&self) -> f64 {
        self.base.final_volume
    }
}
