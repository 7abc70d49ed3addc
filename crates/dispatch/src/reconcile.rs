//! Integrity reconciliation over the invitation table.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use inviteflow_core::{IntegrityReport, IntegrityTotals};
use inviteflow_store::{InvitationStore, StoreError};

/// At most this many legacy emails are named in the report; the rest are
/// summarized as a count.
const LEGACY_PREVIEW: usize = 5;

/// Result of a repair run over the legacy completed-but-unsent class.
#[derive(Debug, Default, Serialize)]
pub struct FixOutcome {
    pub examined: usize,
    pub fixed: usize,
}

/// Recomputes integrity findings from aggregate counts. Read-only except
/// for [`Reconciler::fix_data_inconsistencies`], which repairs exactly the
/// legacy class and nothing else.
pub struct Reconciler {
    invitations: Arc<dyn InvitationStore>,
}

impl Reconciler {
    pub fn new(invitations: Arc<dyn InvitationStore>) -> Self {
        Self { invitations }
    }

    /// Build a fresh integrity report. Fails only when the aggregate read
    /// itself fails; findings never abort the check.
    pub async fn compute_report(&self) -> Result<IntegrityReport, StoreError> {
        let agg = self.invitations.aggregates().await?;

        let totals = IntegrityTotals {
            total_invitations: agg.total,
            emails_sent: agg.emails_sent,
            emails_pending: agg.emails_unsent,
            signups_completed: agg.signups_completed,
            awaiting_signup: agg.sent_awaiting_signup,
        };

        let discrepancies = totals.discrepancies();
        let mut critical_issues = Vec::new();
        let mut recommendations = Vec::new();

        let legacy = &agg.legacy_completed_unsent;
        if !legacy.is_empty() {
            critical_issues.push(format!(
                "{} completed signups never marked as sent: {}",
                legacy.len(),
                preview(legacy)
            ));
            recommendations.push(
                "run the data fix to mark completed signups as sent".to_string(),
            );
        }
        if !discrepancies.is_empty() {
            recommendations
                .push("investigate count mismatches before trusting batch totals".to_string());
        }

        if critical_issues.is_empty() && discrepancies.is_empty() {
            info!(total = totals.total_invitations, "integrity check clean");
        } else {
            warn!(
                discrepancies = discrepancies.len(),
                critical = critical_issues.len(),
                "integrity check found issues"
            );
        }

        Ok(IntegrityReport {
            totals,
            discrepancies,
            critical_issues,
            recommendations,
        })
    }

    /// Repair the legacy class: for each record with a completed signup but
    /// no sent flag, set email_sent and backfill email_sent_at from
    /// completed_at. No other record or field is touched.
    pub async fn fix_data_inconsistencies(&self) -> Result<FixOutcome, StoreError> {
        let agg = self.invitations.aggregates().await?;
        let mut outcome = FixOutcome {
            examined: agg.legacy_completed_unsent.len(),
            fixed: 0,
        };

        for email in &agg.legacy_completed_unsent {
            if self.invitations.repair_legacy_sent(email).await? {
                outcome.fixed += 1;
            }
        }

        info!(examined = outcome.examined, fixed = outcome.fixed, "legacy repair complete");
        Ok(outcome)
    }
}

fn preview(emails: &[String]) -> String {
    if emails.len() <= LEGACY_PREVIEW {
        emails.join(", ")
    } else {
        format!(
            "{} and {} more",
            emails[..LEGACY_PREVIEW].join(", "),
            emails.len() - LEGACY_PREVIEW
        )
    }
}
