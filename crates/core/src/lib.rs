//! `inviteflow-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! typed identifiers, the invitation and batch lifecycle entities, the domain
//! error taxonomy, and the derived integrity report types.

pub mod batch;
pub mod error;
pub mod id;
pub mod invitation;
pub mod report;

pub use batch::{BatchStatus, EmailBatch};
pub use error::{DomainError, DomainResult};
pub use id::{BatchId, InvitationId, InvitationToken};
pub use invitation::{is_plausible_email, normalize_email, FieldValue, InvitationRecord, PersonaType};
pub use report::{IntegrityReport, IntegrityTotals};
