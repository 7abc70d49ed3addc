//! Stuck-batch detection and recovery.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::info;

use inviteflow_core::{BatchId, BatchStatus, EmailBatch};
use inviteflow_store::{BatchStore, InvitationStore, PendingFilter, StoreError};

use crate::worker::{DispatchError, DispatchRequest, DispatchResponse, DispatchWorker};

/// A pending batch older than this has never been picked up.
const PENDING_STALL_MINUTES: i64 = 5;
/// An in-progress batch older than this has stalled mid-dispatch.
const IN_PROGRESS_STALL_MINUTES: i64 = 10;

/// A batch needing operator attention, with the reasons why.
#[derive(Debug, Clone, Serialize)]
pub struct BatchAttention {
    pub batch: EmailBatch,
    pub reasons: Vec<String>,
}

/// Outcome of a recovery attempt. "Nothing to retry" is success with an
/// explicit message, distinct from a failed re-dispatch.
#[derive(Debug, Serialize)]
pub struct RetryOutcome {
    pub success: bool,
    pub message: String,
    pub dispatch: Option<DispatchResponse>,
}

/// Classifies stalled/failed batches at read time and re-triggers dispatch
/// for unresolved invitations only.
pub struct StuckBatchService {
    invitations: Arc<dyn InvitationStore>,
    batches: Arc<dyn BatchStore>,
    worker: Arc<DispatchWorker>,
}

/// Reasons a batch needs attention at `now`; empty means healthy.
pub fn classify(batch: &EmailBatch, now: DateTime<Utc>) -> Vec<String> {
    let mut reasons = Vec::new();
    let age = batch.age(now);
    match batch.status {
        BatchStatus::Pending if age > Duration::minutes(PENDING_STALL_MINUTES) => {
            reasons.push(format!("pending for {} minutes", age.num_minutes()));
        }
        BatchStatus::InProgress if age > Duration::minutes(IN_PROGRESS_STALL_MINUTES) => {
            reasons.push(format!("in progress for {} minutes", age.num_minutes()));
        }
        BatchStatus::Failed => {
            reasons.push("batch failed".to_string());
        }
        _ => {}
    }
    if batch.emails_failed > 0 && batch.status != BatchStatus::Failed {
        reasons.push(format!("{} emails failed", batch.emails_failed));
    }
    reasons
}

impl StuckBatchService {
    pub fn new(
        invitations: Arc<dyn InvitationStore>,
        batches: Arc<dyn BatchStore>,
        worker: Arc<DispatchWorker>,
    ) -> Self {
        Self {
            invitations,
            batches,
            worker,
        }
    }

    /// Batches in the attention union: stuck pending, stuck in-progress,
    /// failed, or carrying failed emails.
    pub async fn find_batches_needing_attention(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<BatchAttention>, StoreError> {
        let batches = self.batches.list_batches().await?;
        Ok(batches
            .into_iter()
            .filter_map(|batch| {
                let reasons = classify(&batch, now);
                if reasons.is_empty() {
                    None
                } else {
                    Some(BatchAttention { batch, reasons })
                }
            })
            .collect())
    }

    /// Re-dispatch exactly the batch's still-unsent invitations under the
    /// same batch identifier. Status is never reset to pending.
    pub async fn retry_stuck_batch(&self, batch_id: &BatchId) -> Result<RetryOutcome, DispatchError> {
        let Some(batch) = self.batches.get_batch(batch_id).await? else {
            return Err(DispatchError::Store(StoreError::NotFound(
                batch_id.to_string(),
            )));
        };

        let now = Utc::now();
        let unresolved = self
            .invitations
            .fetch_pending(
                &PendingFilter::at(now)
                    .unsent_only()
                    .in_batch(batch_id.clone()),
            )
            .await?;

        if unresolved.is_empty() {
            info!(batch_id = %batch_id, "nothing to retry");
            return Ok(RetryOutcome {
                success: true,
                message: format!(
                    "nothing to retry for {batch_id}: all invitations sent or resolved"
                ),
                dispatch: None,
            });
        }

        info!(
            batch_id = %batch_id,
            unresolved = unresolved.len(),
            status = batch.status.as_str(),
            "retrying stuck batch"
        );
        let response = self
            .worker
            .dispatch(DispatchRequest {
                emails: unresolved.into_iter().map(|r| r.email).collect(),
                test_mode: false,
                batch_id: Some(batch_id.clone()),
            })
            .await?;

        Ok(RetryOutcome {
            success: response.success,
            message: response.message.clone(),
            dispatch: Some(response),
        })
    }
}
