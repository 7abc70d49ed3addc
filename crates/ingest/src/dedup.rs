//! CSV parse + deduplicate: one normalized record per distinct email.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

use inviteflow_core::{normalize_email, FieldValue, InvitationRecord, PersonaType};

use crate::csv::parse_records;

/// Ingestion failure: the input is not a usable invite table.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("CSV input requires a header row and at least one data row")]
    NotEnoughRows,
    #[error("CSV header must contain an email column")]
    MissingEmailColumn,
}

/// Import tuning. `list_columns` designates headers whose cells are
/// semicolon-separated ordered sequences.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub list_columns: Vec<String>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        // Matches the observed data shape (e.g. "Chain-IDs", "Tags").
        Self {
            list_columns: vec!["ids".to_string(), "tags".to_string(), "chains".to_string()],
        }
    }
}

impl ImportOptions {
    fn is_list_column(&self, header: &str) -> bool {
        let lower = header.to_lowercase();
        self.list_columns.iter().any(|m| lower.contains(m.as_str()))
    }
}

/// A deduplicated row ready for insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedRecord {
    pub email: String,
    pub persona_type: PersonaType,
    pub persona_data: BTreeMap<String, FieldValue>,
}

impl ImportedRecord {
    /// Materialize as a fresh invitation record.
    pub fn into_invitation(self, now: DateTime<Utc>) -> InvitationRecord {
        InvitationRecord::new(self.email, self.persona_type, self.persona_data, now)
    }
}

/// Ingestion statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct DedupStats {
    /// Data rows in the input (valid or not).
    pub total_entries: usize,
    /// Distinct emails kept.
    pub final_count: usize,
    /// Rows whose email was already seen (counts occurrences, not emails).
    pub duplicates_found: usize,
    /// Distinct emails that had at least one duplicate row.
    pub merged_emails: BTreeSet<String>,
    /// Rows skipped for an implausible email.
    pub skipped_rows: usize,
}

/// Parse raw CSV text and merge duplicate emails.
///
/// The first-seen record is the base; each later duplicate row only fills
/// fields whose base value is still empty. Later duplicates never overwrite
/// a populated field, list-valued fields included.
pub fn parse_and_deduplicate(
    csv_text: &str,
    persona_type: PersonaType,
    options: &ImportOptions,
) -> Result<(Vec<ImportedRecord>, DedupStats), ParseError> {
    let rows = parse_records(csv_text);
    if rows.len() < 2 {
        return Err(ParseError::NotEnoughRows);
    }

    let headers: Vec<String> = rows[0].iter().map(|h| h.trim().to_string()).collect();
    let email_idx = headers
        .iter()
        .position(|h| h.to_lowercase().contains("email"))
        .ok_or(ParseError::MissingEmailColumn)?;

    let mut records: Vec<ImportedRecord> = Vec::new();
    let mut index_by_email: HashMap<String, usize> = HashMap::new();
    let mut stats = DedupStats {
        total_entries: rows.len() - 1,
        ..DedupStats::default()
    };

    for row in &rows[1..] {
        let raw_email = row.get(email_idx).map(String::as_str).unwrap_or("");
        let email = normalize_email(raw_email);
        if !email.contains('@') {
            stats.skipped_rows += 1;
            debug!(row_email = %raw_email, "skipping row without a usable email");
            continue;
        }

        let fields = row_fields(&headers, row, email_idx, options);

        match index_by_email.get(&email) {
            Some(&idx) => {
                stats.duplicates_found += 1;
                stats.merged_emails.insert(email.clone());
                merge_into(&mut records[idx].persona_data, fields);
            }
            None => {
                index_by_email.insert(email.clone(), records.len());
                records.push(ImportedRecord {
                    email,
                    persona_type,
                    persona_data: fields,
                });
            }
        }
    }

    stats.final_count = records.len();
    Ok((records, stats))
}

fn row_fields(
    headers: &[String],
    row: &[String],
    email_idx: usize,
    options: &ImportOptions,
) -> BTreeMap<String, FieldValue> {
    let mut fields = BTreeMap::new();
    for (i, header) in headers.iter().enumerate() {
        if i == email_idx || header.is_empty() {
            continue;
        }
        let cell = row.get(i).map(|c| c.trim()).unwrap_or("");
        let value = if options.is_list_column(header) {
            FieldValue::List(
                cell.split(';')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
            )
        } else {
            FieldValue::Text(cell.to_string())
        };
        fields.insert(header.clone(), value);
    }
    fields
}

/// First non-empty value per field wins.
fn merge_into(base: &mut BTreeMap<String, FieldValue>, incoming: BTreeMap<String, FieldValue>) {
    for (key, value) in incoming {
        if value.is_empty() {
            continue;
        }
        let fill = base.get(&key).is_none_or(|existing| existing.is_empty());
        if fill {
            base.insert(key, value);
        }
    }
}
