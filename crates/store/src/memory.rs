//! In-memory stores for tests/dev.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use inviteflow_core::{BatchId, EmailBatch, InvitationRecord};

use crate::contract::{
    BatchStore, BulkInsertReport, InvitationAggregates, InvitationStore, PendingFilter, StoreError,
};

/// In-memory invitation table keyed by normalized email.
#[derive(Debug, Default)]
pub struct InMemoryInvitationStore {
    records: RwLock<HashMap<String, InvitationRecord>>,
}

impl InMemoryInvitationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test helper: direct lookup by email.
    pub fn get_by_email(&self, email: &str) -> Option<InvitationRecord> {
        self.records.read().unwrap().get(email).cloned()
    }

    /// Test helper: overwrite a record in place.
    pub fn put(&self, record: InvitationRecord) {
        self.records
            .write()
            .unwrap()
            .insert(record.email.clone(), record);
    }
}

#[async_trait]
impl InvitationStore for InMemoryInvitationStore {
    async fn insert_many(
        &self,
        records: Vec<InvitationRecord>,
    ) -> Result<BulkInsertReport, StoreError> {
        let mut map = self.records.write().unwrap();
        let mut report = BulkInsertReport::default();
        for record in records {
            if map.contains_key(&record.email) {
                report.conflicts.push(record.email);
            } else {
                report.inserted += 1;
                map.insert(record.email.clone(), record);
            }
        }
        Ok(report)
    }

    async fn fetch_pending(
        &self,
        filter: &PendingFilter,
    ) -> Result<Vec<InvitationRecord>, StoreError> {
        let map = self.records.read().unwrap();
        let mut out: Vec<InvitationRecord> = map
            .values()
            .filter(|r| r.is_pending(filter.now))
            .filter(|r| !filter.only_unsent || !r.email_sent)
            .filter(|r| {
                filter
                    .emails
                    .as_ref()
                    .is_none_or(|emails| emails.iter().any(|e| e == &r.email))
            })
            .filter(|r| {
                filter
                    .batch_id
                    .as_ref()
                    .is_none_or(|b| r.batch_id.as_ref() == Some(b))
            })
            .cloned()
            .collect();
        out.sort_by_key(|r| r.invited_at);
        if let Some(limit) = filter.limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    async fn increment_send_attempts(&self, email: &str) -> Result<(), StoreError> {
        let mut map = self.records.write().unwrap();
        let record = map
            .get_mut(email)
            .ok_or_else(|| StoreError::NotFound(email.to_string()))?;
        record.send_attempts += 1;
        Ok(())
    }

    async fn record_send_success(
        &self,
        email: &str,
        sent_at: DateTime<Utc>,
        batch_id: Option<&BatchId>,
    ) -> Result<(), StoreError> {
        let mut map = self.records.write().unwrap();
        let record = map
            .get_mut(email)
            .ok_or_else(|| StoreError::NotFound(email.to_string()))?;
        record.mark_sent(sent_at, batch_id.cloned());
        Ok(())
    }

    async fn claim_for_batch(
        &self,
        emails: &[String],
        batch_id: &BatchId,
    ) -> Result<usize, StoreError> {
        let mut map = self.records.write().unwrap();
        let mut claimed = 0;
        for email in emails {
            if let Some(record) = map.get_mut(email) {
                if !record.email_sent && record.batch_id.is_none() {
                    record.batch_id = Some(batch_id.clone());
                    claimed += 1;
                }
            }
        }
        Ok(claimed)
    }

    async fn release_batch_claim(&self, batch_id: &BatchId) -> Result<usize, StoreError> {
        let mut map = self.records.write().unwrap();
        let mut released = 0;
        for record in map.values_mut() {
            if !record.email_sent && record.batch_id.as_ref() == Some(batch_id) {
                record.batch_id = None;
                released += 1;
            }
        }
        Ok(released)
    }

    async fn aggregates(&self) -> Result<InvitationAggregates, StoreError> {
        let map = self.records.read().unwrap();
        let mut agg = InvitationAggregates::default();
        for record in map.values() {
            agg.total += 1;
            if record.email_sent {
                agg.emails_sent += 1;
                if !record.signup_completed {
                    agg.sent_awaiting_signup += 1;
                }
            } else {
                agg.emails_unsent += 1;
            }
            if record.signup_completed {
                agg.signups_completed += 1;
            }
            if record.is_legacy_completed_unsent() {
                agg.legacy_completed_unsent.push(record.email.clone());
            }
        }
        agg.legacy_completed_unsent.sort();
        Ok(agg)
    }

    async fn repair_legacy_sent(&self, email: &str) -> Result<bool, StoreError> {
        let mut map = self.records.write().unwrap();
        let record = map
            .get_mut(email)
            .ok_or_else(|| StoreError::NotFound(email.to_string()))?;
        if !record.is_legacy_completed_unsent() {
            return Ok(false);
        }
        record.email_sent = true;
        record.email_sent_at = record.completed_at;
        Ok(true)
    }
}

/// In-memory batch table keyed by batch identifier.
#[derive(Debug, Default)]
pub struct InMemoryBatchStore {
    batches: RwLock<HashMap<String, EmailBatch>>,
}

impl InMemoryBatchStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BatchStore for InMemoryBatchStore {
    async fn insert_batch(&self, batch: EmailBatch) -> Result<(), StoreError> {
        let mut map = self.batches.write().unwrap();
        let key = batch.batch_id.as_str().to_string();
        if map.contains_key(&key) {
            return Err(StoreError::UniqueViolation(key));
        }
        map.insert(key, batch);
        Ok(())
    }

    async fn get_batch(&self, batch_id: &BatchId) -> Result<Option<EmailBatch>, StoreError> {
        Ok(self.batches.read().unwrap().get(batch_id.as_str()).cloned())
    }

    async fn mark_started(&self, batch_id: &BatchId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut map = self.batches.write().unwrap();
        let batch = map
            .get_mut(batch_id.as_str())
            .ok_or_else(|| StoreError::NotFound(batch_id.to_string()))?;
        batch.mark_started(at);
        Ok(())
    }

    async fn record_pass(
        &self,
        batch_id: &BatchId,
        pass_sent: u32,
        pass_failed: u32,
        at: DateTime<Utc>,
    ) -> Result<EmailBatch, StoreError> {
        let mut map = self.batches.write().unwrap();
        let batch = map
            .get_mut(batch_id.as_str())
            .ok_or_else(|| StoreError::NotFound(batch_id.to_string()))?;
        batch.record_pass(pass_sent, pass_failed, at);
        Ok(batch.clone())
    }

    async fn list_batches(&self) -> Result<Vec<EmailBatch>, StoreError> {
        let mut out: Vec<EmailBatch> = self.batches.read().unwrap().values().cloned().collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use inviteflow_core::PersonaType;

    fn record(email: &str, at: DateTime<Utc>) -> InvitationRecord {
        InvitationRecord::new(email, PersonaType::Developer, BTreeMap::new(), at)
    }

    #[tokio::test]
    async fn insert_many_reports_only_conflicting_emails() {
        let store = InMemoryInvitationStore::new();
        let now = Utc::now();
        store
            .insert_many(vec![record("a@x.com", now)])
            .await
            .unwrap();

        let report = store
            .insert_many(vec![record("a@x.com", now), record("b@x.com", now)])
            .await
            .unwrap();
        assert_eq!(report.inserted, 1);
        assert_eq!(report.conflicts, vec!["a@x.com".to_string()]);
        assert!(store.get_by_email("b@x.com").is_some());
    }

    #[tokio::test]
    async fn fetch_pending_orders_by_invited_at_and_respects_filters() {
        let store = InMemoryInvitationStore::new();
        let now = Utc::now();
        let earlier = now - chrono::Duration::hours(2);

        store
            .insert_many(vec![record("late@x.com", now), record("early@x.com", earlier)])
            .await
            .unwrap();

        // expired record
        let mut expired = record("old@x.com", now - chrono::Duration::days(40));
        expired.expires_at = now - chrono::Duration::days(10);
        store.put(expired);

        // completed record
        let mut done = record("done@x.com", earlier);
        done.signup_completed = true;
        done.completed_at = Some(now);
        store.put(done);

        let pending = store.fetch_pending(&PendingFilter::at(now)).await.unwrap();
        let emails: Vec<_> = pending.iter().map(|r| r.email.as_str()).collect();
        assert_eq!(emails, vec!["early@x.com", "late@x.com"]);

        let limited = store
            .fetch_pending(&PendingFilter::at(now).with_limit(1))
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].email, "early@x.com");

        let scoped = store
            .fetch_pending(&PendingFilter::at(now).with_emails(vec!["late@x.com".to_string()]))
            .await
            .unwrap();
        assert_eq!(scoped.len(), 1);
    }

    #[tokio::test]
    async fn claim_skips_sent_and_already_claimed_records() {
        let store = InMemoryInvitationStore::new();
        let now = Utc::now();
        store
            .insert_many(vec![
                record("free@x.com", now),
                record("sent@x.com", now),
                record("claimed@x.com", now),
            ])
            .await
            .unwrap();

        store
            .record_send_success("sent@x.com", now, None)
            .await
            .unwrap();
        let other = BatchId::generate(now);
        store
            .claim_for_batch(&["claimed@x.com".to_string()], &other)
            .await
            .unwrap();

        let batch = BatchId::generate(now);
        let claimed = store
            .claim_for_batch(
                &[
                    "free@x.com".to_string(),
                    "sent@x.com".to_string(),
                    "claimed@x.com".to_string(),
                ],
                &batch,
            )
            .await
            .unwrap();
        assert_eq!(claimed, 1);
        assert_eq!(store.get_by_email("free@x.com").unwrap().batch_id, Some(batch));
        assert_eq!(
            store.get_by_email("claimed@x.com").unwrap().batch_id,
            Some(other)
        );
    }

    #[tokio::test]
    async fn release_resets_only_unsent_records_of_the_batch() {
        let store = InMemoryInvitationStore::new();
        let now = Utc::now();
        store
            .insert_many(vec![record("a@x.com", now), record("b@x.com", now)])
            .await
            .unwrap();
        let batch = BatchId::generate(now);
        store
            .claim_for_batch(&["a@x.com".to_string(), "b@x.com".to_string()], &batch)
            .await
            .unwrap();
        store
            .record_send_success("b@x.com", now, Some(&batch))
            .await
            .unwrap();

        let released = store.release_batch_claim(&batch).await.unwrap();
        assert_eq!(released, 1);
        assert!(store.get_by_email("a@x.com").unwrap().batch_id.is_none());
        // sent records keep their tag for reporting
        assert_eq!(store.get_by_email("b@x.com").unwrap().batch_id, Some(batch));
    }

    #[tokio::test]
    async fn send_attempts_are_monotonic() {
        let store = InMemoryInvitationStore::new();
        let now = Utc::now();
        store
            .insert_many(vec![record("a@x.com", now)])
            .await
            .unwrap();

        store.increment_send_attempts("a@x.com").await.unwrap();
        store.increment_send_attempts("a@x.com").await.unwrap();
        assert_eq!(store.get_by_email("a@x.com").unwrap().send_attempts, 2);
    }

    #[tokio::test]
    async fn aggregates_count_each_class() {
        let store = InMemoryInvitationStore::new();
        let now = Utc::now();

        let mut sent = record("sent@x.com", now);
        sent.mark_sent(now, None);
        store.put(sent);

        let mut done = record("done@x.com", now);
        done.mark_sent(now, None);
        done.signup_completed = true;
        done.completed_at = Some(now);
        store.put(done);

        let mut legacy = record("legacy@x.com", now);
        legacy.signup_completed = true;
        legacy.completed_at = Some(now);
        store.put(legacy);

        store.put(record("fresh@x.com", now));

        let agg = store.aggregates().await.unwrap();
        assert_eq!(agg.total, 4);
        assert_eq!(agg.emails_sent, 2);
        assert_eq!(agg.emails_unsent, 2);
        assert_eq!(agg.signups_completed, 2);
        assert_eq!(agg.sent_awaiting_signup, 1);
        assert_eq!(agg.legacy_completed_unsent, vec!["legacy@x.com".to_string()]);
    }

    #[tokio::test]
    async fn repair_legacy_sent_is_narrowly_scoped() {
        let store = InMemoryInvitationStore::new();
        let now = Utc::now();
        let completed_at = now - chrono::Duration::days(3);

        let mut legacy = record("legacy@x.com", now - chrono::Duration::days(5));
        legacy.signup_completed = true;
        legacy.completed_at = Some(completed_at);
        store.put(legacy);

        store.put(record("fresh@x.com", now));

        assert!(store.repair_legacy_sent("legacy@x.com").await.unwrap());
        let repaired = store.get_by_email("legacy@x.com").unwrap();
        assert!(repaired.email_sent);
        assert_eq!(repaired.email_sent_at, Some(completed_at));
        assert_eq!(repaired.send_attempts, 0);
        assert!(repaired.batch_id.is_none());

        // Non-legacy records are never mutated by this call.
        assert!(!store.repair_legacy_sent("fresh@x.com").await.unwrap());
        let fresh = store.get_by_email("fresh@x.com").unwrap();
        assert!(!fresh.email_sent);
        assert!(fresh.email_sent_at.is_none());
    }

    #[tokio::test]
    async fn batch_store_lifecycle() {
        let store = InMemoryBatchStore::new();
        let now = Utc::now();
        let id = BatchId::generate(now);
        let batch = EmailBatch::new(id.clone(), 3, now);
        store.insert_batch(batch.clone()).await.unwrap();

        // ids are never reused
        assert!(matches!(
            store.insert_batch(batch).await,
            Err(StoreError::UniqueViolation(_))
        ));

        store.mark_started(&id, now).await.unwrap();
        let updated = store.record_pass(&id, 2, 1, now).await.unwrap();
        assert_eq!(updated.emails_sent, 2);
        assert_eq!(updated.emails_failed, 1);
        assert!(updated.status.is_terminal());
        assert!(updated.completed_at.is_some());

        let all = store.list_batches().await.unwrap();
        assert_eq!(all.len(), 1);
    }
}
