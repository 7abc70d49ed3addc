//! `inviteflow-dispatch`: the invitation dispatch pipeline.
//!
//! Batch creation, sequential per-recipient sending with bounded retry,
//! stuck-batch detection/recovery, and the integrity reconciler.

pub mod batch;
pub mod provider;
pub mod reconcile;
pub mod retry;
pub mod stuck;
pub mod template;
pub mod worker;

pub use batch::BatchManager;
pub use provider::{EmailMessage, EmailProvider, HttpEmailProvider, ProviderConfig, ProviderError};
pub use reconcile::{FixOutcome, Reconciler};
pub use retry::{execute_with_retry, RetryPolicy};
pub use stuck::{BatchAttention, RetryOutcome, StuckBatchService};
pub use worker::{DispatchError, DispatchRequest, DispatchResponse, DispatchWorker};
