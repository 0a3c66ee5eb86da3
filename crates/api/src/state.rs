use std::sync::Arc;

use crate::config::ServerConfig;
use crate::dispatcher::JobDispatcher;

/// Shared application state injected into every handler.
#[derive(Clone)]
pub struct AppState {
    pub pool: sqlx::PgPool,
    pub config: Arc<ServerConfig>,
    pub dispatcher: Arc<JobDispatcher>,
}
