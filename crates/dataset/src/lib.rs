//! # Lotline Dataset
//!
//! The deterministic half of the system: everything between the raw
//! delimited file on disk and the payload text that lands in a prompt.
//!
//! Pipeline stages:
//! 1. [`loader`] reads and parses the master table (with a JSONL cache)
//! 2. [`enrich`] sorts chronologically and derives time-series features
//! 3. [`partition`] packs a bounded slice of the table for the prompt
//! 4. [`summary`] condenses the table for status displays
//!
//! Nothing in this crate performs network I/O.

pub mod cache;
pub mod enrich;
pub mod loader;
pub mod partition;
pub mod summary;

pub use cache::SourceDigest;
pub use enrich::enrich;
pub use loader::{fingerprint, load, load_instruction, LoadReport, LoadedTable};
pub use partition::{partition, PartitionMode, Payload, PayloadKind, DEFAULT_HEAD_ROWS};
pub use summary::{summarize, DatasetSummary};
