//! Email batch lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;
use crate::id::BatchId;

/// Batch dispatch status.
///
/// Transitions: `Pending -> InProgress -> {Completed | Failed}`. Nothing
/// ever returns to `Pending`; recovering a stuck batch re-dispatches the
/// same batch's still-unsent subset instead of resetting status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl BatchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl core::str::FromStr for BatchStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(DomainError::validation(format!("unknown batch status {other:?}"))),
        }
    }
}

/// A named group of invitations dispatched together.
///
/// Created by the batch manager; mutated only by the dispatch worker.
/// Aggregate counters are written once per dispatch pass from locally
/// accumulated counts, never incrementally per row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailBatch {
    pub id: Uuid,
    pub batch_id: BatchId,
    pub total_emails: u32,
    pub emails_sent: u32,
    pub emails_failed: u32,
    pub status: BatchStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl EmailBatch {
    pub fn new(batch_id: BatchId, total_emails: u32, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            batch_id,
            total_emails,
            emails_sent: 0,
            emails_failed: 0,
            status: BatchStatus::Pending,
            created_at,
            started_at: None,
            completed_at: None,
        }
    }

    /// Enter dispatch. The first pass records `started_at`; a recovery pass
    /// over the same batch keeps the original start time. Terminal batches
    /// may re-enter dispatch (recovery never resets to `Pending`).
    pub fn mark_started(&mut self, at: DateTime<Utc>) {
        self.status = BatchStatus::InProgress;
        if self.started_at.is_none() {
            self.started_at = Some(at);
        }
    }

    /// Record the outcome of one dispatch pass.
    ///
    /// Sends accumulate across passes (a recovery pass only processes
    /// still-unsent invitations); failures reflect the latest pass, since
    /// earlier failures either got resent or failed again. Counters
    /// saturate at `total_emails`: a redelivered pass over already-sent
    /// records never pushes the aggregates past the batch size.
    pub fn record_pass(&mut self, pass_sent: u32, pass_failed: u32, at: DateTime<Utc>) {
        self.emails_sent = (self.emails_sent + pass_sent).min(self.total_emails);
        self.emails_failed = pass_failed.min(self.total_emails - self.emails_sent);
        self.status = if pass_sent > 0 {
            BatchStatus::Completed
        } else {
            BatchStatus::Failed
        };
        self.completed_at = Some(at);
    }

    /// Age of the batch relative to `now`.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.created_at
    }

    pub fn check_invariants(&self) -> Result<(), DomainError> {
        if self.emails_sent + self.emails_failed > self.total_emails {
            return Err(DomainError::invariant(
                "emails_sent + emails_failed must not exceed total_emails",
            ));
        }
        if self.status.is_terminal() && self.completed_at.is_none() {
            return Err(DomainError::invariant(
                "terminal status requires completed_at",
            ));
        }
        Ok(())
    }
}
