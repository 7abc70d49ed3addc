//! Postgres-backed stores (sqlx).
//!
//! Schema lives in `schema.sql` next to this crate. Uniqueness of active
//! invitation emails is enforced by a unique index; sqlx errors carrying
//! PostgreSQL code `23505` map to [`StoreError::UniqueViolation`] so the
//! bulk-insert fallback can resolve conflicts per record. Everything else
//! maps to [`StoreError::Backend`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::{debug, warn};
use uuid::Uuid;

use inviteflow_core::{
    BatchId, BatchStatus, EmailBatch, FieldValue, InvitationId, InvitationRecord, InvitationToken,
    PersonaType,
};

use crate::contract::{
    BatchStore, BulkInsertReport, InvitationAggregates, InvitationStore, PendingFilter, StoreError,
};

const UNIQUE_VIOLATION: &str = "23505";

fn map_sqlx(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        if db.code().as_deref() == Some(UNIQUE_VIOLATION) {
            return StoreError::UniqueViolation(db.message().to_string());
        }
    }
    StoreError::Backend(e.to_string())
}

/// Postgres invitation table.
#[derive(Debug, Clone)]
pub struct PostgresInvitationStore {
    pool: PgPool,
}

impl PostgresInvitationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn invitation_from_row(row: &PgRow) -> Result<InvitationRecord, StoreError> {
    let persona: String = row.try_get("persona_type").map_err(map_sqlx)?;
    let persona_type =
        PersonaType::parse(&persona).map_err(|e| StoreError::Backend(e.to_string()))?;
    let persona_data: Json<BTreeMap<String, FieldValue>> =
        row.try_get("persona_data").map_err(map_sqlx)?;
    let send_attempts: i32 = row.try_get("send_attempts").map_err(map_sqlx)?;

    Ok(InvitationRecord {
        id: InvitationId::from_uuid(row.try_get::<Uuid, _>("id").map_err(map_sqlx)?),
        email: row.try_get("email").map_err(map_sqlx)?,
        persona_type,
        invited_at: row.try_get("invited_at").map_err(map_sqlx)?,
        expires_at: row.try_get("expires_at").map_err(map_sqlx)?,
        email_sent: row.try_get("email_sent").map_err(map_sqlx)?,
        email_sent_at: row.try_get("email_sent_at").map_err(map_sqlx)?,
        send_attempts: send_attempts.max(0) as u32,
        batch_id: row
            .try_get::<Option<String>, _>("batch_id")
            .map_err(map_sqlx)?
            .map(|s| s.parse())
            .transpose()
            .map_err(|e: inviteflow_core::DomainError| StoreError::Backend(e.to_string()))?,
        signup_completed: row.try_get("signup_completed").map_err(map_sqlx)?,
        completed_at: row.try_get("completed_at").map_err(map_sqlx)?,
        invitation_token: InvitationToken::from_uuid(
            row.try_get::<Uuid, _>("invitation_token").map_err(map_sqlx)?,
        ),
        persona_data: persona_data.0,
    })
}

async fn insert_one<'e, E>(executor: E, record: &InvitationRecord) -> Result<(), StoreError>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO invitations
            (id, email, persona_type, invited_at, expires_at, email_sent,
             email_sent_at, send_attempts, batch_id, signup_completed,
             completed_at, invitation_token, persona_data)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#,
    )
    .bind(*record.id.as_uuid())
    .bind(&record.email)
    .bind(record.persona_type.as_str())
    .bind(record.invited_at)
    .bind(record.expires_at)
    .bind(record.email_sent)
    .bind(record.email_sent_at)
    .bind(record.send_attempts as i32)
    .bind(record.batch_id.as_ref().map(|b| b.as_str().to_string()))
    .bind(record.signup_completed)
    .bind(record.completed_at)
    .bind(*record.invitation_token.as_uuid())
    .bind(Json(&record.persona_data))
    .execute(executor)
    .await
    .map_err(map_sqlx)
    .map(|_| ())
}

#[async_trait]
impl InvitationStore for PostgresInvitationStore {
    async fn insert_many(
        &self,
        records: Vec<InvitationRecord>,
    ) -> Result<BulkInsertReport, StoreError> {
        // Fast path: everything in one transaction.
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;
        let mut bulk_ok = true;
        for record in &records {
            match insert_one(&mut *tx, record).await {
                Ok(()) => {}
                Err(StoreError::UniqueViolation(_)) => {
                    bulk_ok = false;
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        if bulk_ok {
            tx.commit().await.map_err(map_sqlx)?;
            return Ok(BulkInsertReport {
                inserted: records.len(),
                conflicts: Vec::new(),
            });
        }
        tx.rollback().await.map_err(map_sqlx)?;

        // Fallback: per-record inserts so only the actually-conflicting
        // emails are rejected.
        warn!(
            total = records.len(),
            "bulk insert hit a unique violation; retrying per record"
        );
        let mut report = BulkInsertReport::default();
        for record in &records {
            match insert_one(&self.pool, record).await {
                Ok(()) => report.inserted += 1,
                Err(StoreError::UniqueViolation(_)) => {
                    report.conflicts.push(record.email.clone());
                }
                Err(e) => return Err(e),
            }
        }
        Ok(report)
    }

    async fn fetch_pending(
        &self,
        filter: &PendingFilter,
    ) -> Result<Vec<InvitationRecord>, StoreError> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT * FROM invitations WHERE signup_completed = FALSE AND expires_at >= ",
        );
        qb.push_bind(filter.now);
        if filter.only_unsent {
            qb.push(" AND email_sent = FALSE");
        }
        if let Some(emails) = &filter.emails {
            qb.push(" AND email = ANY(");
            qb.push_bind(emails.clone());
            qb.push(")");
        }
        if let Some(batch_id) = &filter.batch_id {
            qb.push(" AND batch_id = ");
            qb.push_bind(batch_id.as_str().to_string());
        }
        qb.push(" ORDER BY invited_at ASC");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ");
            qb.push_bind(limit as i64);
        }

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;
        rows.iter().map(invitation_from_row).collect()
    }

    async fn increment_send_attempts(&self, email: &str) -> Result<(), StoreError> {
        let result =
            sqlx::query("UPDATE invitations SET send_attempts = send_attempts + 1 WHERE email = $1")
                .bind(email)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(email.to_string()));
        }
        Ok(())
    }

    async fn record_send_success(
        &self,
        email: &str,
        sent_at: DateTime<Utc>,
        batch_id: Option<&BatchId>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE invitations
            SET email_sent = TRUE,
                email_sent_at = $2,
                batch_id = COALESCE($3, batch_id)
            WHERE email = $1
            "#,
        )
        .bind(email)
        .bind(sent_at)
        .bind(batch_id.map(|b| b.as_str().to_string()))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(email.to_string()));
        }
        Ok(())
    }

    async fn claim_for_batch(
        &self,
        emails: &[String],
        batch_id: &BatchId,
    ) -> Result<usize, StoreError> {
        // Single conditional update: concurrent batch creations cannot tag
        // the same invitation.
        let result = sqlx::query(
            r#"
            UPDATE invitations
            SET batch_id = $1
            WHERE email = ANY($2) AND email_sent = FALSE AND batch_id IS NULL
            "#,
        )
        .bind(batch_id.as_str())
        .bind(emails)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        debug!(batch_id = %batch_id, claimed = result.rows_affected(), "claimed invitations");
        Ok(result.rows_affected() as usize)
    }

    async fn release_batch_claim(&self, batch_id: &BatchId) -> Result<usize, StoreError> {
        let result = sqlx::query(
            "UPDATE invitations SET batch_id = NULL WHERE batch_id = $1 AND email_sent = FALSE",
        )
        .bind(batch_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        debug!(batch_id = %batch_id, released = result.rows_affected(), "released claim");
        Ok(result.rows_affected() as usize)
    }

    async fn aggregates(&self) -> Result<InvitationAggregates, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT
                count(*) AS total,
                count(*) FILTER (WHERE email_sent) AS sent,
                count(*) FILTER (WHERE NOT email_sent) AS unsent,
                count(*) FILTER (WHERE signup_completed) AS completed,
                count(*) FILTER (WHERE email_sent AND NOT signup_completed) AS awaiting
            FROM invitations
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;

        let legacy_rows = sqlx::query(
            "SELECT email FROM invitations WHERE signup_completed AND NOT email_sent ORDER BY email",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        let get = |name: &str| -> Result<u64, StoreError> {
            row.try_get::<i64, _>(name)
                .map(|v| v.max(0) as u64)
                .map_err(map_sqlx)
        };

        Ok(InvitationAggregates {
            total: get("total")?,
            emails_sent: get("sent")?,
            emails_unsent: get("unsent")?,
            signups_completed: get("completed")?,
            sent_awaiting_signup: get("awaiting")?,
            legacy_completed_unsent: legacy_rows
                .iter()
                .map(|r| r.try_get::<String, _>("email").map_err(map_sqlx))
                .collect::<Result<_, _>>()?,
        })
    }

    async fn repair_legacy_sent(&self, email: &str) -> Result<bool, StoreError> {
        // Scoped to exactly the legacy class; the WHERE clause is the guard.
        let result = sqlx::query(
            r#"
            UPDATE invitations
            SET email_sent = TRUE, email_sent_at = completed_at
            WHERE email = $1 AND signup_completed = TRUE AND email_sent = FALSE
            "#,
        )
        .bind(email)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(result.rows_affected() > 0)
    }
}

/// Postgres batch table.
#[derive(Debug, Clone)]
pub struct PostgresBatchStore {
    pool: PgPool,
}

impl PostgresBatchStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn batch_from_row(row: &PgRow) -> Result<EmailBatch, StoreError> {
    let status: String = row.try_get("status").map_err(map_sqlx)?;
    let status: BatchStatus = status
        .parse()
        .map_err(|e: inviteflow_core::DomainError| StoreError::Backend(e.to_string()))?;
    let batch_id: String = row.try_get("batch_id").map_err(map_sqlx)?;
    Ok(EmailBatch {
        id: row.try_get("id").map_err(map_sqlx)?,
        batch_id: batch_id
            .parse()
            .map_err(|e: inviteflow_core::DomainError| StoreError::Backend(e.to_string()))?,
        total_emails: row.try_get::<i32, _>("total_emails").map_err(map_sqlx)?.max(0) as u32,
        emails_sent: row.try_get::<i32, _>("emails_sent").map_err(map_sqlx)?.max(0) as u32,
        emails_failed: row.try_get::<i32, _>("emails_failed").map_err(map_sqlx)?.max(0) as u32,
        status,
        created_at: row.try_get("created_at").map_err(map_sqlx)?,
        started_at: row.try_get("started_at").map_err(map_sqlx)?,
        completed_at: row.try_get("completed_at").map_err(map_sqlx)?,
    })
}

#[async_trait]
impl BatchStore for PostgresBatchStore {
    async fn insert_batch(&self, batch: EmailBatch) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO email_batches
                (id, batch_id, total_emails, emails_sent, emails_failed,
                 status, created_at, started_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(batch.id)
        .bind(batch.batch_id.as_str())
        .bind(batch.total_emails as i32)
        .bind(batch.emails_sent as i32)
        .bind(batch.emails_failed as i32)
        .bind(batch.status.as_str())
        .bind(batch.created_at)
        .bind(batch.started_at)
        .bind(batch.completed_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)
        .map(|_| ())
    }

    async fn get_batch(&self, batch_id: &BatchId) -> Result<Option<EmailBatch>, StoreError> {
        let row = sqlx::query("SELECT * FROM email_batches WHERE batch_id = $1")
            .bind(batch_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        row.as_ref().map(batch_from_row).transpose()
    }

    async fn mark_started(&self, batch_id: &BatchId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE email_batches
            SET status = 'in_progress', started_at = COALESCE(started_at, $2)
            WHERE batch_id = $1
            "#,
        )
        .bind(batch_id.as_str())
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(batch_id.to_string()));
        }
        Ok(())
    }

    async fn record_pass(
        &self,
        batch_id: &BatchId,
        pass_sent: u32,
        pass_failed: u32,
        at: DateTime<Utc>,
    ) -> Result<EmailBatch, StoreError> {
        let row = sqlx::query(
            r#"
            UPDATE email_batches
            SET emails_sent = LEAST(emails_sent + $2, total_emails),
                emails_failed = LEAST($3, total_emails - LEAST(emails_sent + $2, total_emails)),
                status = CASE WHEN $2 > 0 THEN 'completed' ELSE 'failed' END,
                completed_at = $4
            WHERE batch_id = $1
            RETURNING *
            "#,
        )
        .bind(batch_id.as_str())
        .bind(pass_sent as i32)
        .bind(pass_failed as i32)
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;
        match row {
            Some(row) => batch_from_row(&row),
            None => Err(StoreError::NotFound(batch_id.to_string())),
        }
    }

    async fn list_batches(&self) -> Result<Vec<EmailBatch>, StoreError> {
        let rows = sqlx::query("SELECT * FROM email_batches ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;
        rows.iter().map(batch_from_row).collect()
    }
}
