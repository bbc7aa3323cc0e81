use std::sync::Arc;

use sqlx::SqlitePool;

use crate::services::Engine;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub engine: Arc<Engine>,
    pub default_max_attempts: u32,
    pub default_delay_seconds: u64,
}
