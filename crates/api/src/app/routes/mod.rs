use axum::Router;

pub mod batches;
pub mod integrity;
pub mod invitations;
pub mod system;

pub fn router() -> Router {
    Router::new()
        .merge(invitations::router())
        .merge(batches::router())
        .merge(integrity::router())
}
