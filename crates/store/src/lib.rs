//! `inviteflow-store`: durable invitation and batch storage.
//!
//! Contracts plus two implementations: an in-memory store for tests/dev and
//! a Postgres store (sqlx) for production.

pub mod contract;
pub mod memory;
pub mod postgres;

pub use contract::{
    BatchStore, BulkInsertReport, InvitationAggregates, InvitationStore, PendingFilter, StoreError,
};
pub use memory::{InMemoryBatchStore, InMemoryInvitationStore};
pub use postgres::{PostgresBatchStore, PostgresInvitationStore};
