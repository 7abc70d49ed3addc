//! Service wiring from the environment.
//!
//! Degrades instead of refusing to start: without `DATABASE_URL` the stores
//! are in-memory, and without provider credentials the dispatch routes
//! report a configuration error while read routes keep working.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

use inviteflow_dispatch::{
    BatchManager, DispatchWorker, HttpEmailProvider, ProviderConfig, Reconciler, StuckBatchService,
};
use inviteflow_store::{
    BatchStore, InMemoryBatchStore, InMemoryInvitationStore, InvitationStore, PostgresBatchStore,
    PostgresInvitationStore,
};

/// Dispatch-side services, present only when provider credentials exist.
pub struct DispatchServices {
    pub worker: Arc<DispatchWorker>,
    pub stuck: StuckBatchService,
}

pub struct AppServices {
    pub invitations: Arc<dyn InvitationStore>,
    pub batches: Arc<dyn BatchStore>,
    pub manager: BatchManager,
    pub reconciler: Reconciler,
    dispatch: Option<DispatchServices>,
}

impl AppServices {
    pub fn new(
        invitations: Arc<dyn InvitationStore>,
        batches: Arc<dyn BatchStore>,
        dispatch: Option<DispatchServices>,
    ) -> Self {
        Self {
            manager: BatchManager::new(invitations.clone(), batches.clone()),
            reconciler: Reconciler::new(invitations.clone()),
            invitations,
            batches,
            dispatch,
        }
    }

    /// Dispatch services, or `None` when the provider is not configured.
    pub fn dispatch(&self) -> Option<&DispatchServices> {
        self.dispatch.as_ref()
    }
}

fn in_memory_stores() -> (Arc<dyn InvitationStore>, Arc<dyn BatchStore>) {
    (
        Arc::new(InMemoryInvitationStore::new()),
        Arc::new(InMemoryBatchStore::new()),
    )
}

/// Wire stores and the email provider from the environment.
pub async fn build_services() -> AppServices {
    let (invitations, batches): (Arc<dyn InvitationStore>, Arc<dyn BatchStore>) =
        match std::env::var("DATABASE_URL") {
            Ok(url) => match PgPoolOptions::new().max_connections(5).connect(&url).await {
                Ok(pool) => {
                    info!("connected to postgres");
                    (
                        Arc::new(PostgresInvitationStore::new(pool.clone())),
                        Arc::new(PostgresBatchStore::new(pool)),
                    )
                }
                Err(e) => {
                    warn!(error = %e, "postgres connection failed, using in-memory stores");
                    in_memory_stores()
                }
            },
            Err(_) => {
                warn!("DATABASE_URL not set, using in-memory stores");
                in_memory_stores()
            }
        };

    let dispatch = match ProviderConfig::from_env() {
        Ok(config) => {
            let origin = config.origin.clone();
            let provider = Arc::new(HttpEmailProvider::new(config));
            let worker = Arc::new(DispatchWorker::new(
                invitations.clone(),
                batches.clone(),
                provider,
                origin,
            ));
            Some(DispatchServices {
                stuck: StuckBatchService::new(invitations.clone(), batches.clone(), worker.clone()),
                worker,
            })
        }
        Err(e) => {
            warn!(error = %e, "email provider not configured, dispatch routes disabled");
            None
        }
    };

    AppServices::new(invitations, batches, dispatch)
}
