//! Dispatch worker: sequential per-recipient sending for one invocation.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use inviteflow_core::{is_plausible_email, normalize_email, BatchId};
use inviteflow_store::{BatchStore, InvitationStore, PendingFilter, StoreError};

use crate::provider::{EmailProvider, ProviderError};
use crate::retry::{execute_with_retry, RetryPolicy};
use crate::template;

/// Dispatch failure that aborts the whole invocation. Per-record failures
/// never land here; they surface as strings in the response.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One dispatch invocation.
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchRequest {
    pub emails: Vec<String>,
    /// Stop after the first processed record.
    #[serde(default)]
    pub test_mode: bool,
    #[serde(default)]
    pub batch_id: Option<BatchId>,
}

/// Outcome of one dispatch invocation. Partial success is explicit:
/// `sent`/`total` plus per-email error strings, never a collapsed boolean.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchResponse {
    pub success: bool,
    pub errors: Vec<String>,
    pub sent: u32,
    pub total: u32,
    pub message: String,
    pub sent_emails: Vec<String>,
    pub batch_id: Option<BatchId>,
}

impl DispatchResponse {
    fn nothing_to_send(batch_id: Option<BatchId>) -> Self {
        Self {
            success: false,
            errors: Vec::new(),
            sent: 0,
            total: 0,
            message: "no pending invitations found for the requested emails".to_string(),
            sent_emails: Vec::new(),
            batch_id,
        }
    }
}

/// Sends per-recipient emails for a batch, strictly sequentially, with
/// bounded retry and durable state transitions.
///
/// Sequential processing keeps the provider request rate bounded and the
/// per-recipient ordering deterministic within one invocation.
pub struct DispatchWorker {
    invitations: Arc<dyn InvitationStore>,
    batches: Arc<dyn BatchStore>,
    provider: Arc<dyn EmailProvider>,
    origin: String,
    retry: RetryPolicy,
}

impl DispatchWorker {
    pub fn new(
        invitations: Arc<dyn InvitationStore>,
        batches: Arc<dyn BatchStore>,
        provider: Arc<dyn EmailProvider>,
        origin: impl Into<String>,
    ) -> Self {
        Self {
            invitations,
            batches,
            provider,
            origin: origin.into(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Process one dispatch invocation.
    pub async fn dispatch(&self, request: DispatchRequest) -> Result<DispatchResponse, DispatchError> {
        let now = Utc::now();
        let targets: Vec<String> = request.emails.iter().map(|e| normalize_email(e)).collect();

        let records = self
            .invitations
            .fetch_pending(&PendingFilter::at(now).with_emails(targets))
            .await?;

        if records.is_empty() {
            info!(requested = request.emails.len(), "nothing to send");
            return Ok(DispatchResponse::nothing_to_send(request.batch_id));
        }

        if let Some(batch_id) = &request.batch_id {
            self.batches.mark_started(batch_id, now).await?;
        }

        let total = records.len() as u32;
        let mut sent: u32 = 0;
        let mut failed: u32 = 0;
        let mut errors: Vec<String> = Vec::new();
        let mut sent_emails: Vec<String> = Vec::new();

        for record in &records {
            // Attempt count is persisted before the send, so a crash
            // mid-batch never loses attempt history.
            if let Err(e) = self.invitations.increment_send_attempts(&record.email).await {
                warn!(email = %record.email, error = %e, "could not persist send attempt");
                errors.push(format!("{}: {}", record.email, e));
                failed += 1;
                continue;
            }

            if !is_plausible_email(&record.email) {
                // Malformed address: skipped, never retried.
                errors.push(format!("{}: invalid email address", record.email));
                failed += 1;
                if request.test_mode {
                    break;
                }
                continue;
            }

            let message = template::render(&self.origin, record);
            let outcome = execute_with_retry(
                || self.provider.send(&message),
                &self.retry,
                ProviderError::is_retryable,
            )
            .await;

            match outcome {
                Ok(()) => {
                    let sent_at = Utc::now();
                    if let Err(e) = self
                        .invitations
                        .record_send_success(&record.email, sent_at, request.batch_id.as_ref())
                        .await
                    {
                        // The provider accepted the message; surface the
                        // bookkeeping failure without undoing the send.
                        warn!(email = %record.email, error = %e, "sent but outcome not recorded");
                        errors.push(format!("{}: sent but outcome not recorded: {}", record.email, e));
                    }
                    sent += 1;
                    sent_emails.push(record.email.clone());
                }
                Err(e) => {
                    warn!(email = %record.email, error = %e, "send failed after retries");
                    errors.push(format!("{}: {}", record.email, e));
                    failed += 1;
                }
            }

            if request.test_mode {
                break;
            }
        }

        if let Some(batch_id) = &request.batch_id {
            let batch = self
                .batches
                .record_pass(batch_id, sent, failed, Utc::now())
                .await?;
            info!(
                batch_id = %batch_id,
                status = batch.status.as_str(),
                emails_sent = batch.emails_sent,
                emails_failed = batch.emails_failed,
                "batch pass recorded"
            );
        }

        let message = if errors.is_empty() {
            format!("sent {sent} of {total} invitations")
        } else {
            format!("sent {sent} of {total}; {failed} failed")
        };
        info!(sent, total, failed, "dispatch pass finished");

        Ok(DispatchResponse {
            success: sent > 0,
            errors,
            sent,
            total,
            message,
            sent_emails,
            batch_id: request.batch_id,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedProvider;
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::Ordering;

    use inviteflow_core::{EmailBatch, InvitationRecord, PersonaType};
    use inviteflow_store::{InMemoryBatchStore, InMemoryInvitationStore};

    struct Fixture {
        invitations: Arc<InMemoryInvitationStore>,
        batches: Arc<InMemoryBatchStore>,
        provider: Arc<ScriptedProvider>,
        worker: DispatchWorker,
    }

    fn fixture() -> Fixture {
        let invitations = Arc::new(InMemoryInvitationStore::new());
        let batches = Arc::new(InMemoryBatchStore::new());
        let provider = Arc::new(ScriptedProvider::new());
        let worker = DispatchWorker::new(
            invitations.clone(),
            batches.clone(),
            provider.clone(),
            "https://app.example.com",
        )
        .with_retry_policy(RetryPolicy {
            max_retries: 3,
            base_delay: std::time::Duration::from_millis(1),
            max_delay: std::time::Duration::from_millis(1),
        });
        Fixture {
            invitations,
            batches,
            provider,
            worker,
        }
    }

    async fn seed(fx: &Fixture, emails: &[&str]) {
        let now = Utc::now();
        let records = emails
            .iter()
            .enumerate()
            .map(|(i, e)| {
                InvitationRecord::new(
                    *e,
                    PersonaType::Developer,
                    BTreeMap::new(),
                    now + chrono::Duration::milliseconds(i as i64),
                )
            })
            .collect();
        fx.invitations.insert_many(records).await.unwrap();
    }

    fn request(emails: &[&str]) -> DispatchRequest {
        DispatchRequest {
            emails: emails.iter().map(|e| e.to_string()).collect(),
            test_mode: false,
            batch_id: None,
        }
    }

    #[tokio::test]
    async fn empty_resolution_is_benign_not_fatal() {
        let fx = fixture();
        let response = fx.worker.dispatch(request(&["ghost@x.com"])).await.unwrap();
        assert!(!response.success);
        assert_eq!(response.total, 0);
        assert!(response.errors.is_empty());
        assert!(response.message.contains("no pending invitations"));
    }

    #[tokio::test]
    async fn successful_pass_updates_records_and_batch() {
        let fx = fixture();
        seed(&fx, &["a@x.com", "b@x.com"]).await;

        let now = Utc::now();
        let batch_id = BatchId::generate(now);
        fx.batches
            .insert_batch(EmailBatch::new(batch_id.clone(), 2, now))
            .await
            .unwrap();

        let mut req = request(&["a@x.com", "b@x.com"]);
        req.batch_id = Some(batch_id.clone());
        let response = fx.worker.dispatch(req).await.unwrap();

        assert!(response.success);
        assert_eq!(response.sent, 2);
        assert_eq!(response.total, 2);
        assert_eq!(response.sent_emails, vec!["a@x.com", "b@x.com"]);
        assert_eq!(response.message, "sent 2 of 2 invitations");

        let a = fx.invitations.get_by_email("a@x.com").unwrap();
        assert!(a.email_sent);
        assert!(a.email_sent_at.is_some());
        assert_eq!(a.send_attempts, 1);
        assert_eq!(a.batch_id, Some(batch_id.clone()));

        let batch = fx.batches.get_batch(&batch_id).await.unwrap().unwrap();
        assert_eq!(batch.emails_sent, 2);
        assert_eq!(batch.emails_failed, 0);
        assert!(batch.status.is_terminal());
        assert!(batch.started_at.is_some());
        assert!(batch.completed_at.is_some());
    }

    #[tokio::test]
    async fn partial_failure_is_reported_per_email_and_never_aborts() {
        let fx = fixture();
        seed(&fx, &["ok@x.com", "bad@x.com", "also-ok@x.com"]).await;
        // 4xx: not retryable, exactly one provider attempt.
        fx.provider.script(
            "bad@x.com",
            vec![Err(ProviderError::Status {
                status: 422,
                body: "rejected".to_string(),
            })],
        );

        let response = fx
            .worker
            .dispatch(request(&["ok@x.com", "bad@x.com", "also-ok@x.com"]))
            .await
            .unwrap();

        assert!(response.success);
        assert_eq!(response.sent, 2);
        assert_eq!(response.total, 3);
        assert_eq!(response.errors.len(), 1);
        assert!(response.errors[0].starts_with("bad@x.com:"));
        assert_eq!(response.message, "sent 2 of 3; 1 failed");
        // one attempt for the 4xx, one each for the successes
        assert_eq!(fx.provider.calls.load(Ordering::SeqCst), 3);

        let bad = fx.invitations.get_by_email("bad@x.com").unwrap();
        assert!(!bad.email_sent);
        assert_eq!(bad.send_attempts, 1);
    }

    #[tokio::test]
    async fn transient_failures_are_retried_then_succeed() {
        let fx = fixture();
        seed(&fx, &["flaky@x.com"]).await;
        fx.provider.script(
            "flaky@x.com",
            vec![
                Err(ScriptedProvider::transient(503)),
                Err(ScriptedProvider::transient(500)),
                Ok(()),
            ],
        );

        let response = fx.worker.dispatch(request(&["flaky@x.com"])).await.unwrap();
        assert!(response.success);
        assert_eq!(response.sent, 1);
        assert_eq!(fx.provider.calls.load(Ordering::SeqCst), 3);
        // retries within one invocation count as one recorded attempt
        let rec = fx.invitations.get_by_email("flaky@x.com").unwrap();
        assert_eq!(rec.send_attempts, 1);
    }

    #[tokio::test]
    async fn exhausted_retries_record_failure_string() {
        let fx = fixture();
        seed(&fx, &["down@x.com"]).await;
        fx.provider.script(
            "down@x.com",
            vec![
                Err(ScriptedProvider::transient(500)),
                Err(ScriptedProvider::transient(500)),
                Err(ScriptedProvider::transient(500)),
                Err(ScriptedProvider::transient(502)),
            ],
        );

        let response = fx.worker.dispatch(request(&["down@x.com"])).await.unwrap();
        assert!(!response.success);
        assert_eq!(response.sent, 0);
        assert_eq!(response.errors.len(), 1);
        // the final underlying error surfaces unmodified
        assert!(response.errors[0].contains("502"));
        // 1 + max_retries attempts
        assert_eq!(fx.provider.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn zero_sends_fail_the_batch() {
        let fx = fixture();
        seed(&fx, &["down@x.com"]).await;
        fx.provider.script(
            "down@x.com",
            vec![
                Err(ScriptedProvider::transient(500)),
                Err(ScriptedProvider::transient(500)),
                Err(ScriptedProvider::transient(500)),
                Err(ScriptedProvider::transient(500)),
            ],
        );

        let now = Utc::now();
        let batch_id = BatchId::generate(now);
        fx.batches
            .insert_batch(EmailBatch::new(batch_id.clone(), 1, now))
            .await
            .unwrap();

        let mut req = request(&["down@x.com"]);
        req.batch_id = Some(batch_id.clone());
        fx.worker.dispatch(req).await.unwrap();

        let batch = fx.batches.get_batch(&batch_id).await.unwrap().unwrap();
        assert_eq!(batch.status, inviteflow_core::BatchStatus::Failed);
        assert_eq!(batch.emails_failed, 1);
        assert!(batch.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_mode_stops_after_first_processed_record() {
        let fx = fixture();
        seed(&fx, &["first@x.com", "second@x.com"]).await;

        let mut req = request(&["first@x.com", "second@x.com"]);
        req.test_mode = true;
        let response = fx.worker.dispatch(req).await.unwrap();

        assert_eq!(response.sent, 1);
        assert_eq!(response.total, 2);
        assert_eq!(response.sent_emails, vec!["first@x.com"]);
        assert!(fx.invitations.get_by_email("second@x.com").unwrap().send_attempts == 0);
    }

    #[tokio::test]
    async fn completed_and_expired_records_are_not_resolved() {
        let fx = fixture();
        seed(&fx, &["done@x.com", "old@x.com", "live@x.com"]).await;

        let now = Utc::now();
        let mut done = fx.invitations.get_by_email("done@x.com").unwrap();
        done.signup_completed = true;
        done.completed_at = Some(now);
        fx.invitations.put(done);

        let mut old = fx.invitations.get_by_email("old@x.com").unwrap();
        old.expires_at = now - chrono::Duration::days(1);
        fx.invitations.put(old);

        let response = fx
            .worker
            .dispatch(request(&["done@x.com", "old@x.com", "live@x.com"]))
            .await
            .unwrap();
        assert_eq!(response.total, 1);
        assert_eq!(response.sent_emails, vec!["live@x.com"]);
    }

    #[tokio::test]
    async fn redispatching_a_delivered_batch_keeps_counters_within_total() {
        let fx = fixture();
        seed(&fx, &["a@x.com"]).await;

        let now = Utc::now();
        let batch_id = BatchId::generate(now);
        fx.batches
            .insert_batch(EmailBatch::new(batch_id.clone(), 1, now))
            .await
            .unwrap();

        let mut req = request(&["a@x.com"]);
        req.batch_id = Some(batch_id.clone());
        fx.worker.dispatch(req.clone()).await.unwrap();

        // A client retrying a timed-out request resends the invitation;
        // the pass still lands and the aggregates stay within the batch.
        let response = fx.worker.dispatch(req).await.unwrap();
        assert!(response.success);
        assert_eq!(fx.provider.calls.load(Ordering::SeqCst), 2);

        let batch = fx.batches.get_batch(&batch_id).await.unwrap().unwrap();
        assert_eq!(batch.emails_sent, 1);
        assert_eq!(batch.emails_failed, 0);
        assert_eq!(batch.status, inviteflow_core::BatchStatus::Completed);
        batch.check_invariants().unwrap();
    }

    #[tokio::test]
    async fn records_are_processed_in_invited_at_order() {
        let fx = fixture();
        // seeded with increasing invited_at in slice order
        seed(&fx, &["z@x.com", "m@x.com", "a@x.com"]).await;

        let response = fx
            .worker
            .dispatch(request(&["a@x.com", "m@x.com", "z@x.com"]))
            .await
            .unwrap();
        assert_eq!(response.sent_emails, vec!["z@x.com", "m@x.com", "a@x.com"]);
    }
}
