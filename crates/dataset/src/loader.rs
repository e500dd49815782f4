//! Delimited-text loader for the plant master table.
//!
//! Reads the configured source file, detects the field delimiter when
//! none is pinned in config, maps headers through the configured
//! [`ColumnMap`], and parses every data row into a `ProductionRecord`.
//! Unknown columns ride along untouched. A JSONL cache keyed by the
//! SHA-256 digest of the source bytes skips the reparse when nothing
//! changed.
//!
//! Encoding: UTF-8 first, with a Windows-1252 fallback for
//! Excel-exported files.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use lotline_config::{BadRowPolicy, ColumnMap, DatasetConfig};
use lotline_core::error::DatasetError;
use lotline_core::record::ProductionRecord;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::cache::{self, CacheHeader, SourceDigest};

/// Diagnostics from one load.
#[derive(Debug, Clone)]
pub struct LoadReport {
    /// Rows that made it into the table.
    pub rows: usize,
    /// Rows discarded under [`BadRowPolicy::Drop`].
    pub dropped: usize,
    /// Delimiter actually used, configured or sniffed.
    pub delimiter: u8,
    /// Header row as found in the source.
    pub columns: Vec<String>,
    /// Whether the rows came from the cache instead of a parse.
    pub from_cache: bool,
    /// Digest of the source bytes backing this load.
    pub digest: SourceDigest,
}

/// Parsed records plus the load diagnostics.
#[derive(Debug, Clone)]
pub struct LoadedTable {
    pub records: Vec<ProductionRecord>,
    pub report: LoadReport,
}

/// SHA-256 digest of the file as it is on disk right now.
///
/// Cheap relative to a full parse; callers use it to decide whether a
/// previously prepared dataset is still current.
pub fn fingerprint(path: &Path) -> Result<SourceDigest, DatasetError> {
    Ok(SourceDigest::of(&read_source(path)?))
}

/// Load the master table described by `cfg`.
pub fn load(cfg: &DatasetConfig) -> Result<LoadedTable, DatasetError> {
    let bytes = read_source(&cfg.path)?;
    let digest = SourceDigest::of(&bytes);

    if cfg.cache {
        let cache_file = cfg.cache_file();
        if let Some((header, records)) = cache::read(&cache_file, &digest) {
            info!(rows = records.len(), path = %cache_file.display(), "Dataset loaded from cache");
            return Ok(LoadedTable {
                records,
                report: LoadReport {
                    rows: header.rows,
                    dropped: 0,
                    delimiter: header.delimiter,
                    columns: header.columns,
                    from_cache: true,
                    digest,
                },
            });
        }
    }

    let text = decode_text(bytes);
    let delimiter = match cfg.delimiter {
        Some(c) => c as u8,
        None => sniff_delimiter(&text),
    };
    debug!(
        delimiter = %(delimiter as char),
        path = %cfg.path.display(),
        "Parsing dataset"
    );

    let parsed = parse_table(&text, delimiter, &cfg.columns, cfg.on_bad_row)?;
    info!(
        rows = parsed.records.len(),
        dropped = parsed.dropped,
        columns = parsed.columns.len(),
        digest = %digest,
        "Dataset parsed"
    );

    if cfg.cache {
        let cache_file = cfg.cache_file();
        let header = CacheHeader::new(&digest, parsed.records.len(), delimiter, &parsed.columns);
        if let Err(e) = cache::write(&cache_file, &header, &parsed.records) {
            warn!(error = %e, path = %cache_file.display(), "Could not write dataset cache");
        }
    }

    Ok(LoadedTable {
        report: LoadReport {
            rows: parsed.records.len(),
            dropped: parsed.dropped,
            delimiter,
            columns: parsed.columns,
            from_cache: false,
            digest,
        },
        records: parsed.records,
    })
}

/// Read the analyst instruction text that opens every system message.
pub fn load_instruction(path: &Path) -> Result<String, DatasetError> {
    let text = std::fs::read_to_string(path).map_err(|e| DatasetError::SourceUnavailable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(match text.strip_prefix('\u{feff}') {
        Some(stripped) => stripped.to_string(),
        None => text,
    })
}

fn read_source(path: &Path) -> Result<Vec<u8>, DatasetError> {
    std::fs::read(path).map_err(|e| DatasetError::SourceUnavailable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Decode source bytes as UTF-8, falling back to Windows-1252. Strips a
/// leading BOM either way.
fn decode_text(bytes: Vec<u8>) -> String {
    let text = match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => {
            warn!("Dataset is not valid UTF-8, decoding as Windows-1252");
            let bytes = e.into_bytes();
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            decoded.into_owned()
        }
    };
    match text.strip_prefix('\u{feff}') {
        Some(stripped) => stripped.to_string(),
        None => text,
    }
}

/// Detect the most likely field delimiter by parsing a sample with each
/// candidate and scoring field-count consistency.
///
/// A candidate must split the first line into more than one field to be
/// viable; among viable candidates, (consistent lines × field count)
/// wins, so wider consistent tables beat accidental matches.
pub fn sniff_delimiter(text: &str) -> u8 {
    const CANDIDATES: &[u8] = &[b'\t', b';', b',', b'|'];
    let sample = text.lines().take(10).collect::<Vec<_>>().join("\n");
    if sample.is_empty() {
        return b',';
    }

    let mut best = b',';
    let mut best_score = 0u64;
    for &delim in CANDIDATES {
        let counts: Vec<usize> = csv::ReaderBuilder::new()
            .delimiter(delim)
            .has_headers(false)
            .flexible(true)
            .from_reader(sample.as_bytes())
            .records()
            .filter_map(|r| r.ok())
            .map(|r| r.len())
            .collect();

        let Some(&first) = counts.first() else {
            continue;
        };
        if first <= 1 {
            continue;
        }

        let consistent = counts.iter().filter(|&&c| c == first).count() as u64;
        let score = consistent * first as u64;
        if score > best_score {
            best_score = score;
            best = delim;
        }
    }
    best
}

/// Where each mapped column landed in the header row.
struct ColumnLayout {
    timestamp: usize,
    timestamp_name: String,
    volume: usize,
    volume_name: String,
    substance: Option<usize>,
    presentation: Option<usize>,
    line: Option<usize>,
    family: Option<usize>,
    /// Unmapped columns: header index and name.
    extra: Vec<(usize, String)>,
}

impl ColumnLayout {
    fn resolve(headers: &[String], columns: &ColumnMap) -> Result<Self, DatasetError> {
        let find = |name: &str| headers.iter().position(|h| h == name);

        let (timestamp, volume) = match (find(&columns.timestamp), find(&columns.volume)) {
            (Some(t), Some(v)) => (t, v),
            (t, v) => {
                let mut missing = Vec::new();
                if t.is_none() {
                    missing.push(columns.timestamp.clone());
                }
                if v.is_none() {
                    missing.push(columns.volume.clone());
                }
                return Err(DatasetError::MissingColumns { missing });
            }
        };

        let substance = find(&columns.substance);
        let presentation = find(&columns.presentation);
        let line = find(&columns.line);
        let family = find(&columns.family);

        let claimed: Vec<usize> = [Some(timestamp), Some(volume), substance, presentation, line, family]
            .into_iter()
            .flatten()
            .collect();
        let extra = headers
            .iter()
            .enumerate()
            .filter(|(i, name)| !claimed.contains(i) && !name.is_empty())
            .map(|(i, name)| (i, name.clone()))
            .collect();

        Ok(Self {
            timestamp,
            timestamp_name: columns.timestamp.clone(),
            volume,
            volume_name: columns.volume.clone(),
            substance,
            presentation,
            line,
            family,
            extra,
        })
    }
}

/// One row that failed to parse, before the bad-row policy is applied.
struct RowError {
    line: usize,
    column: String,
    value: String,
    reason: String,
}

impl RowError {
    fn into_parse(self) -> DatasetError {
        DatasetError::Parse {
            row: self.line,
            column: self.column,
            value: self.value,
            reason: self.reason,
        }
    }
}

struct ParsedTable {
    records: Vec<ProductionRecord>,
    columns: Vec<String>,
    dropped: usize,
}

fn parse_table(
    text: &str,
    delimiter: u8,
    columns: &ColumnMap,
    policy: BadRowPolicy,
) -> Result<ParsedTable, DatasetError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| DatasetError::Schema(format!("unreadable header row: {e}")))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
        return Err(DatasetError::Schema("no columns detected in header row".into()));
    }

    let layout = ColumnLayout::resolve(&headers, columns)?;

    let mut records = Vec::new();
    let mut dropped = 0usize;
    for (i, row) in reader.records().enumerate() {
        let outcome = match row {
            Ok(rec) => {
                let line = rec.position().map(|p| p.line() as usize).unwrap_or(i + 2);
                parse_row(&rec, line, &layout)
            }
            Err(e) => {
                let line = e.position().map(|p| p.line() as usize).unwrap_or(i + 2);
                Err(RowError {
                    line,
                    column: "*".into(),
                    value: String::new(),
                    reason: e.to_string(),
                })
            }
        };

        match outcome {
            Ok(record) => records.push(record),
            Err(err) => match policy {
                BadRowPolicy::Abort => return Err(err.into_parse()),
                BadRowPolicy::Drop => {
                    warn!(
                        line = err.line,
                        column = %err.column,
                        value = %err.value,
                        reason = %err.reason,
                        "Dropping unparseable row"
                    );
                    dropped += 1;
                }
            },
        }
    }

    Ok(ParsedTable {
        records,
        columns: headers,
        dropped,
    })
}

fn parse_row(
    rec: &csv::StringRecord,
    line: usize,
    layout: &ColumnLayout,
) -> Result<ProductionRecord, RowError> {
    let raw_ts = rec.get(layout.timestamp).unwrap_or("").trim();
    let process_start = parse_timestamp(raw_ts).map_err(|reason| RowError {
        line,
        column: layout.timestamp_name.clone(),
        value: raw_ts.to_string(),
        reason,
    })?;

    let raw_vol = rec.get(layout.volume).unwrap_or("").trim();
    let final_volume = parse_volume(raw_vol).map_err(|reason| RowError {
        line,
        column: layout.volume_name.clone(),
        value: raw_vol.to_string(),
        reason,
    })?;

    let pick = |idx: Option<usize>| {
        idx.and_then(|i| rec.get(i))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    let mut extra = BTreeMap::new();
    for (i, name) in &layout.extra {
        if let Some(value) = rec.get(*i) {
            let value = value.trim();
            if !value.is_empty() {
                extra.insert(name.clone(), value.to_string());
            }
        }
    }

    Ok(ProductionRecord {
        process_start,
        final_volume,
        substance: pick(layout.substance),
        presentation: pick(layout.presentation),
        line: pick(layout.line),
        family: pick(layout.family),
        extra,
    })
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y"];

/// Parse a plant timestamp. Date-only values land at midnight.
fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, String> {
    if raw.is_empty() {
        return Err("empty timestamp".into());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(ts);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
            return Ok(d.and_time(NaiveTime::MIN));
        }
    }
    Err("unrecognized timestamp format".into())
}

/// Parse a volume cell. Accepts decimal commas from Excel exports.
fn parse_volume(raw: &str) -> Result<f64, String> {
    if raw.is_empty() {
        return Err("empty volume".into());
    }
    let parsed = match raw.parse::<f64>() {
        Ok(v) => Ok(v),
        Err(_) if raw.contains(',') && !raw.contains('.') => {
            raw.replace(',', ".").parse::<f64>().map_err(|e| e.to_string())
        }
        Err(e) => Err(e.to_string()),
    }?;
    if !parsed.is_finite() {
        return Err("not a finite number".into());
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn config(path: PathBuf) -> DatasetConfig {
        DatasetConfig {
            path,
            cache: false,
            ..DatasetConfig::default()
        }
    }

    const SEMICOLON_TABLE: &str = "\
order_process_start_dt;volumen_final;sustancia;lote
2024-01-05 06:30:00;120.5;PARACETAMOL;L-100
2024-02-10 09:00:00;98.0;OMEPRAZOL;L-101
2024-03-01 07:15:00;110.25;PARACETAMOL;L-102
";

    #[test]
    fn sniffs_semicolon() {
        assert_eq!(sniff_delimiter(SEMICOLON_TABLE), b';');
    }

    #[test]
    fn sniffs_comma_tab_and_pipe() {
        assert_eq!(sniff_delimiter("a,b,c\n1,2,3\n"), b',');
        assert_eq!(sniff_delimiter("a\tb\tc\n1\t2\t3\n"), b'\t');
        assert_eq!(sniff_delimiter("a|b|c\n1|2|3\n"), b'|');
    }

    #[test]
    fn sniff_ignores_commas_inside_quotes() {
        let text = "name;address\n\"Doe, Jane\";\"Calle Mayor, 4\"\n\"Ruiz, Ana\";\"Plaza Sol, 2\"\n";
        assert_eq!(sniff_delimiter(text), b';');
    }

    #[test]
    fn loads_semicolon_table() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("master.csv");
        fs::write(&path, SEMICOLON_TABLE).unwrap();

        let table = load(&config(path)).unwrap();
        assert_eq!(table.records.len(), 3);
        assert_eq!(table.report.delimiter, b';');
        assert_eq!(table.report.dropped, 0);
        assert!(!table.report.from_cache);

        let first = &table.records[0];
        assert_eq!(first.final_volume, 120.5);
        assert_eq!(first.substance.as_deref(), Some("PARACETAMOL"));
        // unmapped column rides along
        assert_eq!(first.extra.get("lote").map(String::as_str), Some("L-100"));
    }

    #[test]
    fn explicit_delimiter_overrides_sniffing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("master.csv");
        fs::write(
            &path,
            "order_process_start_dt|volumen_final\n2024-01-05|10.0\n",
        )
        .unwrap();

        let mut cfg = config(path);
        cfg.delimiter = Some('|');
        let table = load(&cfg).unwrap();
        assert_eq!(table.report.delimiter, b'|');
        assert_eq!(table.records.len(), 1);
    }

    #[test]
    fn missing_file_is_source_unavailable() {
        let err = load(&config(PathBuf::from("/nonexistent/master.csv"))).unwrap_err();
        assert!(matches!(err, DatasetError::SourceUnavailable { .. }));
    }

    #[test]
    fn empty_file_is_a_schema_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        fs::write(&path, "").unwrap();

        let err = load(&config(path)).unwrap_err();
        assert!(matches!(err, DatasetError::Schema(_)));
    }

    #[test]
    fn missing_required_columns_are_named() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("master.csv");
        fs::write(&path, "fecha;cantidad\n2024-01-05;10\n").unwrap();

        let err = load(&config(path)).unwrap_err();
        match err {
            DatasetError::MissingColumns { missing } => {
                assert!(missing.contains(&"order_process_start_dt".to_string()));
                assert!(missing.contains(&"volumen_final".to_string()));
            }
            other => panic!("expected MissingColumns, got {other:?}"),
        }
    }

    #[test]
    fn header_only_table_loads_zero_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("master.csv");
        fs::write(&path, "order_process_start_dt;volumen_final\n").unwrap();

        let table = load(&config(path)).unwrap();
        assert!(table.records.is_empty());
    }

    #[test]
    fn abort_policy_names_row_column_and_value() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("master.csv");
        fs::write(
            &path,
            "order_process_start_dt;volumen_final\n2024-01-05;10.0\n2024-02-05;not-a-number\n",
        )
        .unwrap();

        let err = load(&config(path)).unwrap_err();
        match err {
            DatasetError::Parse { row, column, value, .. } => {
                assert_eq!(row, 3);
                assert_eq!(column, "volumen_final");
                assert_eq!(value, "not-a-number");
            }
            other => panic!("expected Parse, got {other:?}"),
        }
    }

    #[test]
    fn drop_policy_keeps_good_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("master.csv");
        fs::write(
            &path,
            "order_process_start_dt;volumen_final\n2024-01-05;10.0\nnot-a-date;20.0\n2024-03-05;30.0\n",
        )
        .unwrap();

        let mut cfg = config(path);
        cfg.on_bad_row = BadRowPolicy::Drop;
        let table = load(&cfg).unwrap();
        assert_eq!(table.records.len(), 2);
        assert_eq!(table.report.dropped, 1);
    }

    #[test]
    fn windows_1252_fallback_decodes_accents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("master.csv");
        // "sólido" with 0xF3 for ó: invalid UTF-8, valid Windows-1252
        fs::write(
            &path,
            b"order_process_start_dt;volumen_final;sustancia\n2024-01-05;10.0;s\xf3lido\n",
        )
        .unwrap();

        let table = load(&config(path)).unwrap();
        assert_eq!(table.records[0].substance.as_deref(), Some("sólido"));
    }

    #[test]
    fn utf8_bom_does_not_break_the_first_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("master.csv");
        fs::write(
            &path,
            "\u{feff}order_process_start_dt;volumen_final\n2024-01-05;10.0\n",
        )
        .unwrap();

        let table = load(&config(path)).unwrap();
        assert_eq!(table.records.len(), 1);
    }

    #[test]
    fn second_load_hits_the_cache() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("master.csv");
        fs::write(&path, SEMICOLON_TABLE).unwrap();

        let mut cfg = config(path.clone());
        cfg.cache = true;

        let first = load(&cfg).unwrap();
        assert!(!first.report.from_cache);
        assert!(cfg.cache_file().exists());

        let second = load(&cfg).unwrap();
        assert!(second.report.from_cache);
        assert_eq!(second.records, first.records);
        assert_eq!(second.report.delimiter, b';');
    }

    #[test]
    fn editing_the_source_invalidates_the_cache() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("master.csv");
        fs::write(&path, SEMICOLON_TABLE).unwrap();

        let mut cfg = config(path.clone());
        cfg.cache = true;
        load(&cfg).unwrap();

        let extended = format!("{SEMICOLON_TABLE}2024-04-02 08:00:00;99.0;IBUPROFENO;L-103\n");
        fs::write(&path, extended).unwrap();

        let reloaded = load(&cfg).unwrap();
        assert!(!reloaded.report.from_cache);
        assert_eq!(reloaded.records.len(), 4);
    }

    #[test]
    fn corrupt_cache_falls_back_to_the_source() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("master.csv");
        fs::write(&path, SEMICOLON_TABLE).unwrap();

        let mut cfg = config(path);
        cfg.cache = true;
        load(&cfg).unwrap();
        fs::write(cfg.cache_file(), "garbage\nmore garbage\n").unwrap();

        let reloaded = load(&cfg).unwrap();
        assert!(!reloaded.report.from_cache);
        assert_eq!(reloaded.records.len(), 3);
    }

    #[test]
    fn fingerprint_tracks_content_not_name() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.csv");
        let b = dir.path().join("b.csv");
        fs::write(&a, "same bytes").unwrap();
        fs::write(&b, "same bytes").unwrap();

        assert_eq!(fingerprint(&a).unwrap(), fingerprint(&b).unwrap());

        fs::write(&b, "different bytes").unwrap();
        assert_ne!(fingerprint(&a).unwrap(), fingerprint(&b).unwrap());
    }

    #[test]
    fn instruction_text_loads_and_strips_bom() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("preprompt.txt");
        fs::write(&path, "\u{feff}Eres un analista.").unwrap();
        assert_eq!(load_instruction(&path).unwrap(), "Eres un analista.");

        let missing = load_instruction(&dir.path().join("nope.txt")).unwrap_err();
        assert!(matches!(missing, DatasetError::SourceUnavailable { .. }));
    }

    #[test]
    fn timestamp_formats() {
        assert!(parse_timestamp("2024-01-05 06:30:00").is_ok());
        assert!(parse_timestamp("2024-01-05T06:30:00.250").is_ok());
        assert!(parse_timestamp("2024-01-05 06:30").is_ok());
        assert!(parse_timestamp("05/01/2024 06:30:00").is_ok());

        let midnight = parse_timestamp("2024-01-05").unwrap();
        assert_eq!(midnight.time(), NaiveTime::MIN);

        assert!(parse_timestamp("").is_err());
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn volume_accepts_decimal_comma() {
        assert_eq!(parse_volume("10.5").unwrap(), 10.5);
        assert_eq!(parse_volume("10,5").unwrap(), 10.5);
        assert!(parse_volume("1,234.5").is_err());
        assert!(parse_volume("").is_err());
        assert!(parse_volume("NaN").is_err());
    }
}
