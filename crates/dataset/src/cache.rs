//! Parsed-row cache: a JSONL file kept next to the source table.
//!
//! The first line is a header object carrying the SHA-256 digest of the
//! raw source bytes; every following line is one `ProductionRecord`.
//! The cache is trusted only when the stored digest matches the file on
//! disk right now, so a stale or hand-edited cache can never shadow new
//! data. Any defect (unreadable header, corrupt line, truncation) means
//! the whole cache is discarded and the source is reparsed.

use chrono::{DateTime, Utc};
use lotline_core::error::DatasetError;
use lotline_core::record::ProductionRecord;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use tracing::{debug, warn};

/// SHA-256 digest of the source file bytes, hex-encoded.
///
/// Doubles as the invalidation key for the on-disk cache and the
/// in-process memo of the prepared dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDigest(String);

impl SourceDigest {
    pub fn of(bytes: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceDigest {
    /// Short prefix, enough for log lines.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.0[..self.0.len().min(12)])
    }
}

/// First line of the cache file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheHeader {
    pub source_digest: String,
    pub created_at: DateTime<Utc>,
    pub rows: usize,
    pub delimiter: u8,
    pub columns: Vec<String>,
}

impl CacheHeader {
    pub fn new(digest: &SourceDigest, rows: usize, delimiter: u8, columns: &[String]) -> Self {
        Self {
            source_digest: digest.as_str().to_string(),
            created_at: Utc::now(),
            rows,
            delimiter,
            columns: columns.to_vec(),
        }
    }
}

/// Load cached records if the cache exists, parses cleanly, and matches
/// `expect`. Any problem yields `None`: the caller reparses the source.
pub fn read(path: &Path, expect: &SourceDigest) -> Option<(CacheHeader, Vec<ProductionRecord>)> {
    let content = std::fs::read_to_string(path).ok()?;
    let mut lines = content.lines().filter(|line| !line.trim().is_empty());

    let header: CacheHeader = match serde_json::from_str(lines.next()?) {
        Ok(h) => h,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Discarding cache with unreadable header");
            return None;
        }
    };

    if header.source_digest != expect.as_str() {
        debug!(path = %path.display(), "Cache is stale, reparsing source");
        return None;
    }

    let mut records = Vec::with_capacity(header.rows);
    for line in lines {
        match serde_json::from_str::<ProductionRecord>(line) {
            Ok(r) => records.push(r),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Discarding cache with corrupt row");
                return None;
            }
        }
    }

    if records.len() != header.rows {
        warn!(
            path = %path.display(),
            expected = header.rows,
            found = records.len(),
            "Discarding truncated cache"
        );
        return None;
    }

    debug!(path = %path.display(), rows = records.len(), "Cache hit");
    Some((header, records))
}

/// Write the cache file, creating parent directories as needed.
///
/// Failures here only cost the next load a reparse; callers log them
/// and keep going.
pub fn write(
    path: &Path,
    header: &CacheHeader,
    records: &[ProductionRecord],
) -> Result<(), DatasetError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| DatasetError::Cache(format!("cannot create cache directory: {e}")))?;
        }
    }

    let mut content = serde_json::to_string(header)
        .map_err(|e| DatasetError::Cache(format!("cannot serialize cache header: {e}")))?;
    content.push('\n');
    for record in records {
        let line = serde_json::to_string(record)
            .map_err(|e| DatasetError::Cache(format!("cannot serialize cached row: {e}")))?;
        content.push_str(&line);
        content.push('\n');
    }

    std::fs::write(path, &content)
        .map_err(|e| DatasetError::Cache(format!("cannot write cache file: {e}")))?;
    Ok(())
}
