//! Invitation records and persona classification.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::id::{BatchId, InvitationId, InvitationToken};

/// Default invitation validity window.
pub const DEFAULT_EXPIRY_DAYS: i64 = 30;

/// Persona classification selecting the downstream profile schema and email
/// template.
///
/// Closed enum on purpose: an unrecognized persona is a validation error at
/// the edge, never a silent zero-row match downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersonaType {
    Developer,
    Founder,
    Investor,
    Community,
}

impl PersonaType {
    pub fn parse(s: &str) -> Result<Self, DomainError> {
        match s.trim().to_lowercase().as_str() {
            "developer" => Ok(Self::Developer),
            "founder" => Ok(Self::Founder),
            "investor" => Ok(Self::Investor),
            "community" => Ok(Self::Community),
            other => Err(DomainError::validation(format!(
                "persona_type must be one of: developer, founder, investor, community (got {other:?})"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Developer => "developer",
            Self::Founder => "founder",
            Self::Investor => "investor",
            Self::Community => "community",
        }
    }
}

impl core::fmt::Display for PersonaType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persona payload value: free text or an ordered string sequence
/// (semicolon-separated in the CSV source).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    /// Whether this value counts as "empty" for merge purposes.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(s) => s.trim().is_empty(),
            Self::List(items) => items.is_empty(),
        }
    }
}

/// A pending signup grant tied to one email and persona type.
///
/// Records are never hard-deleted; expiry is computed at query time from
/// `expires_at`. Mutated only by the dispatch worker (send outcome, attempt
/// counter) and the external signup flow (completion).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvitationRecord {
    pub id: InvitationId,
    /// Lowercased, trimmed. Unique among active records.
    pub email: String,
    pub persona_type: PersonaType,
    pub invited_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub email_sent: bool,
    pub email_sent_at: Option<DateTime<Utc>>,
    /// Monotonic counter, persisted before each send attempt.
    pub send_attempts: u32,
    pub batch_id: Option<BatchId>,
    pub signup_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub invitation_token: InvitationToken,
    pub persona_data: BTreeMap<String, FieldValue>,
}

impl InvitationRecord {
    /// Create a fresh invitation with the default 30-day expiry.
    pub fn new(
        email: impl Into<String>,
        persona_type: PersonaType,
        persona_data: BTreeMap<String, FieldValue>,
        invited_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: InvitationId::new(),
            email: normalize_email(&email.into()),
            persona_type,
            invited_at,
            expires_at: invited_at + Duration::days(DEFAULT_EXPIRY_DAYS),
            email_sent: false,
            email_sent_at: None,
            send_attempts: 0,
            batch_id: None,
            signup_completed: false,
            completed_at: None,
            invitation_token: InvitationToken::new(),
            persona_data,
        }
    }

    /// Whether this invitation is still actionable at `now`: not completed
    /// and not expired.
    pub fn is_pending(&self, now: DateTime<Utc>) -> bool {
        !self.signup_completed && self.expires_at >= now
    }

    /// Record a successful send.
    pub fn mark_sent(&mut self, sent_at: DateTime<Utc>, batch_id: Option<BatchId>) {
        self.email_sent = true;
        self.email_sent_at = Some(sent_at);
        if batch_id.is_some() {
            self.batch_id = batch_id;
        }
    }

    /// A legacy record: signup completed before automated send tracking, so
    /// `email_sent` was never set.
    pub fn is_legacy_completed_unsent(&self) -> bool {
        self.signup_completed && !self.email_sent
    }

    /// Check the record's internal invariants.
    pub fn check_invariants(&self) -> Result<(), DomainError> {
        if self.email_sent != self.email_sent_at.is_some() {
            return Err(DomainError::invariant(
                "email_sent_at must be set iff email_sent",
            ));
        }
        if self.signup_completed != self.completed_at.is_some() {
            return Err(DomainError::invariant(
                "completed_at must be set iff signup_completed",
            ));
        }
        if self.expires_at <= self.invited_at {
            return Err(DomainError::invariant("expires_at must be after invited_at"));
        }
        Ok(())
    }
}

/// Canonical email form: trimmed and lowercased.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Minimal address plausibility check used at ingestion and before sends.
pub fn is_plausible_email(email: &str) -> bool {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty(),
        None => false,
    }
}
