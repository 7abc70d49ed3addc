//! `inviteflow-ingest`: CSV ingestion and deduplication.
//!
//! Turns raw tabular invite data into normalized records keyed by email,
//! merging duplicate rows with first-non-empty-wins field precedence.

pub mod csv;
pub mod dedup;

pub use dedup::{parse_and_deduplicate, DedupStats, ImportOptions, ImportedRecord, ParseError};
