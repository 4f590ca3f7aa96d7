// Library exports for the binary and tests
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;

use std::sync::Arc;

use sqlx::PgPool;

use config::Config;
use services::email::EmailService;

/// Application state shared across all handlers. The pool is the only
/// process-wide shared resource; it is built once and injected here, never
/// reached through a global.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<Config>,
    pub email: Option<Arc<EmailService>>,
}
