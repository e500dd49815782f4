//! Time-series feature derivation over the loaded table.
//!
//! The table is sorted by period (stable, so same-period rows keep
//! their source order) and every derived feature is computed over that
//! one global ordering:
//!
//! | feature       | definition                                        |
//! |---------------|---------------------------------------------------|
//! | `year`        | calendar year of the timestamp                    |
//! | `period`      | year-month bucket                                 |
//! | `month`       | calendar month, 1..=12                            |
//! | `quarter`     | calendar quarter, 1..=4                           |
//! | `lag1`        | volume of the previous row                        |
//! | `lag2`        | volume two rows back                              |
//! | `moving_avg3` | mean of this row and the two before it            |
//! | `phase`       | year >= [`PHASE_CUTOVER_YEAR`]                    |
//!
//! Lags and the moving average stay `None` until enough history exists;
//! they are never backfilled with zeros.

use lotline_core::record::{EnrichedRecord, Period, ProductionRecord, PHASE_CUTOVER_YEAR};

/// Sort the table chronologically and derive the feature columns.
///
/// An empty input yields an empty output.
pub fn enrich(records: Vec<ProductionRecord>) -> Vec<EnrichedRecord> {
    let mut rows: Vec<(Period, ProductionRecord)> = records
        .into_iter()
        .map(|r| (r.period(), r))
        .collect();
    rows.sort_by_key(|(period, _)| *period);

    let volumes: Vec<f64> = rows.iter().map(|(_, r)| r.final_volume).collect();

    rows.into_iter()
        .enumerate()
        .map(|(i, (period, base))| {
            let lag1 = (i >= 1).then(|| volumes[i - 1]);
            let lag2 = (i >= 2).then(|| volumes[i - 2]);
            let moving_avg3 =
                (i >= 2).then(|| (volumes[i - 2] + volumes[i - 1] + volumes[i]) / 3.0);
            EnrichedRecord {
                year: period.year,
                month: period.month,
                quarter: period.quarter(),
                phase: period.year >= PHASE_CUTOVER_YEAR,
                lag1,
                lag2,
                moving_avg3,
                period,
                base,
            }
        })
        .collect()
}
