//! Derived integrity report types.
//!
//! Not persisted: recomputed from aggregate counts on each check.

use serde::{Deserialize, Serialize};

/// Aggregate totals over all invitation records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityTotals {
    pub total_invitations: u64,
    pub emails_sent: u64,
    pub emails_pending: u64,
    pub signups_completed: u64,
    pub awaiting_signup: u64,
}

impl IntegrityTotals {
    /// Check the two count invariants; each violation yields a discrepancy
    /// string naming the exact mismatching totals.
    pub fn discrepancies(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.emails_sent + self.emails_pending != self.total_invitations {
            out.push(format!(
                "emails_sent ({}) + emails_pending ({}) = {} does not match total_invitations ({})",
                self.emails_sent,
                self.emails_pending,
                self.emails_sent + self.emails_pending,
                self.total_invitations
            ));
        }
        if self.signups_completed + self.awaiting_signup != self.emails_sent {
            out.push(format!(
                "signups_completed ({}) + awaiting_signup ({}) = {} does not match emails_sent ({})",
                self.signups_completed,
                self.awaiting_signup,
                self.signups_completed + self.awaiting_signup,
                self.emails_sent
            ));
        }
        out
    }
}

/// Result of one integrity check: totals plus findings.
///
/// Findings never abort the check; only the legacy completed-but-unsent
/// class is ever auto-fixed, everything else is reported for a human.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntegrityReport {
    #[serde(flatten)]
    pub totals: IntegrityTotals,
    pub discrepancies: Vec<String>,
    pub critical_issues: Vec<String>,
    pub recommendations: Vec<String>,
}
