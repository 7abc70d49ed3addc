//! Batch creation over the invitation store.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use inviteflow_core::{normalize_email, BatchId, EmailBatch};
use inviteflow_store::{BatchStore, InvitationStore, StoreError};

/// Creates batch records and claims their invitations.
///
/// The claim is a single conditional update on the invitation table, so two
/// concurrent batches can never tag the same record: whichever claim lands
/// first wins, the other sees a smaller (possibly zero) claimed count.
pub struct BatchManager {
    invitations: Arc<dyn InvitationStore>,
    batches: Arc<dyn BatchStore>,
}

impl BatchManager {
    pub fn new(invitations: Arc<dyn InvitationStore>, batches: Arc<dyn BatchStore>) -> Self {
        Self {
            invitations,
            batches,
        }
    }

    /// Claim the unsent, unclaimed invitations among `emails` under a fresh
    /// batch id and persist a pending batch sized to the requested email
    /// set.
    ///
    /// Returns `None` when nothing could be claimed; no batch record is
    /// written in that case, and the identifier is never reused.
    pub async fn create_batch(
        &self,
        emails: &[String],
        now: DateTime<Utc>,
    ) -> Result<Option<EmailBatch>, StoreError> {
        let mut seen = std::collections::BTreeSet::new();
        let targets: Vec<String> = emails
            .iter()
            .map(|e| normalize_email(e))
            .filter(|e| !e.is_empty() && seen.insert(e.clone()))
            .collect();

        if targets.is_empty() {
            return Ok(None);
        }

        let batch_id = BatchId::generate(now);
        let claimed = self.invitations.claim_for_batch(&targets, &batch_id).await?;
        if claimed == 0 {
            info!(batch_id = %batch_id, requested = targets.len(), "no claimable invitations");
            return Ok(None);
        }

        let batch = EmailBatch::new(batch_id, targets.len() as u32, now);
        if let Err(e) = self.batches.insert_batch(batch.clone()).await {
            // A claim must not outlive a batch row that never landed;
            // otherwise the records can never be claimed again.
            match self.invitations.release_batch_claim(&batch.batch_id).await {
                Ok(released) => warn!(
                    batch_id = %batch.batch_id,
                    released,
                    error = %e,
                    "batch insert failed; claim released"
                ),
                Err(release_err) => warn!(
                    batch_id = %batch.batch_id,
                    error = %e,
                    release_error = %release_err,
                    "batch insert failed and the claim could not be released"
                ),
            }
            return Err(e);
        }
        info!(
            batch_id = %batch.batch_id,
            total_emails = batch.total_emails,
            claimed,
            "batch created"
        );
        Ok(Some(batch))
    }
}
