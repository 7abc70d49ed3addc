//! Request/response DTOs.

use serde::{Deserialize, Serialize};

use inviteflow_core::EmailBatch;
use inviteflow_ingest::DedupStats;

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    /// Raw CSV text including the header row.
    pub csv_text: String,
    /// One of: developer, founder, investor, community.
    pub persona_type: String,
    /// Header fragments marking list-valued columns; defaults apply when
    /// absent.
    #[serde(default)]
    pub list_columns: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct ImportResponse {
    pub inserted: usize,
    /// Emails rejected because an active invitation already exists.
    pub conflicts: Vec<String>,
    pub stats: DedupStats,
}

#[derive(Debug, Deserialize)]
pub struct DispatchRequestBody {
    pub emails: Vec<String>,
    /// Stop after the first processed record.
    #[serde(default)]
    pub test_mode: bool,
    /// Dispatch under an existing batch instead of creating a new one.
    #[serde(default)]
    pub batch_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BatchListResponse {
    pub batches: Vec<EmailBatch>,
}
