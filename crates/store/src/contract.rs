//! Store contracts consumed by the dispatch pipeline.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use inviteflow_core::{BatchId, EmailBatch, InvitationRecord};

/// Store-level error.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique constraint was violated (active email already invited).
    /// Distinguishable so the bulk-insert fallback can resolve it
    /// per-record.
    #[error("unique constraint violation: {0}")]
    UniqueViolation(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Backend failure (connection, query, serialization).
    #[error("storage error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}

/// Outcome of a bulk insert after conflict fallback: only the actually
/// conflicting emails are rejected, everything else succeeds.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct BulkInsertReport {
    pub inserted: usize,
    /// Emails rejected because an active invitation already exists.
    pub conflicts: Vec<String>,
}

/// Query shape for pending invitations.
///
/// Pending means not completed and not expired at `now`; expiry is computed
/// at query time, never enforced by deletion.
#[derive(Debug, Clone)]
pub struct PendingFilter {
    pub now: DateTime<Utc>,
    /// Restrict to these emails (normalized) when set.
    pub emails: Option<Vec<String>>,
    /// Only records not yet sent.
    pub only_unsent: bool,
    /// Restrict to records tagged with this batch.
    pub batch_id: Option<BatchId>,
    pub limit: Option<usize>,
}

impl PendingFilter {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now,
            emails: None,
            only_unsent: false,
            batch_id: None,
            limit: None,
        }
    }

    pub fn with_emails(mut self, emails: Vec<String>) -> Self {
        self.emails = Some(emails);
        self
    }

    pub fn unsent_only(mut self) -> Self {
        self.only_unsent = true;
        self
    }

    pub fn in_batch(mut self, batch_id: BatchId) -> Self {
        self.batch_id = Some(batch_id);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Aggregate counts plus the legacy class, read in one pass.
#[derive(Debug, Clone, Default)]
pub struct InvitationAggregates {
    pub total: u64,
    pub emails_sent: u64,
    pub emails_unsent: u64,
    pub signups_completed: u64,
    /// Sent but not yet completed.
    pub sent_awaiting_signup: u64,
    /// Emails of records with signup_completed and email_sent = false.
    pub legacy_completed_unsent: Vec<String>,
}

/// Durable invitation table with lifecycle fields.
#[async_trait]
pub trait InvitationStore: Send + Sync {
    /// Bulk insert with unique-email semantics. A uniqueness conflict on
    /// the bulk path MUST be retried per-record so only the conflicting
    /// emails are rejected; the rest of the call still succeeds.
    async fn insert_many(
        &self,
        records: Vec<InvitationRecord>,
    ) -> Result<BulkInsertReport, StoreError>;

    /// Fetch pending invitations ordered by `invited_at` ascending.
    async fn fetch_pending(
        &self,
        filter: &PendingFilter,
    ) -> Result<Vec<InvitationRecord>, StoreError>;

    /// Persist one more send attempt for this email. Monotonic; persisted
    /// before the send so a crash never loses attempt history.
    async fn increment_send_attempts(&self, email: &str) -> Result<(), StoreError>;

    /// Record a successful send: email_sent, email_sent_at, batch tag.
    async fn record_send_success(
        &self,
        email: &str,
        sent_at: DateTime<Utc>,
        batch_id: Option<&BatchId>,
    ) -> Result<(), StoreError>;

    /// Tag every unsent, unclaimed invitation in `emails` with `batch_id`
    /// in a single conditional update; returns the claimed count. Records
    /// already claimed by a concurrent batch are left untouched.
    async fn claim_for_batch(
        &self,
        emails: &[String],
        batch_id: &BatchId,
    ) -> Result<usize, StoreError>;

    /// Reset the batch tag on every still-unsent invitation claimed by
    /// `batch_id`, making those records claimable again; returns the
    /// released count. Undoes a claim whose batch row never landed.
    async fn release_batch_claim(&self, batch_id: &BatchId) -> Result<usize, StoreError>;

    /// Aggregate counts for the integrity reconciler.
    async fn aggregates(&self) -> Result<InvitationAggregates, StoreError>;

    /// Repair exactly the legacy class: if the record has
    /// signup_completed and not email_sent, set email_sent = true and
    /// email_sent_at = completed_at. Returns whether a row was mutated.
    /// Must never touch any other field or record class.
    async fn repair_legacy_sent(&self, email: &str) -> Result<bool, StoreError>;
}

/// Durable batch table.
#[async_trait]
pub trait BatchStore: Send + Sync {
    async fn insert_batch(&self, batch: EmailBatch) -> Result<(), StoreError>;

    async fn get_batch(&self, batch_id: &BatchId) -> Result<Option<EmailBatch>, StoreError>;

    /// Move the batch into `in_progress`, keeping the first `started_at`.
    async fn mark_started(&self, batch_id: &BatchId, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Record one dispatch pass: accumulated sends, latest-pass failures,
    /// terminal status, completed_at. Written once per pass from local
    /// counts to avoid lost-update races on the aggregates. Counters
    /// saturate at `total_emails`; a redelivered pass over already-sent
    /// records must not fail the write.
    async fn record_pass(
        &self,
        batch_id: &BatchId,
        pass_sent: u32,
        pass_failed: u32,
        at: DateTime<Utc>,
    ) -> Result<EmailBatch, StoreError>;

    /// All batches, newest first.
    async fn list_batches(&self) -> Result<Vec<EmailBatch>, StoreError>;
}
