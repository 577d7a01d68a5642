use std::sync::Arc;

use sqlx::PgPool;

use crate::auth::sessions::SessionStore;
use crate::auth::tokens::TokenIssuer;
use crate::config::Config;
use crate::storage::FileStorage;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub sessions: SessionStore,
    /// Résumé storage. Local disk or S3, chosen by `STORAGE_DRIVER`.
    pub storage: Arc<dyn FileStorage>,
    pub tokens: TokenIssuer,
    pub config: Config,
}

#[cfg(test)]
impl AppState {
    /// State whose pool and Redis client never connect until first used.
    /// Router tests only exercise paths rejected before any I/O.
    pub fn for_tests(storage: Arc<dyn FileStorage>) -> Self {
        let config = Config::for_tests();
        let db = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy(&config.database_url)
            .expect("lazy pool");
        let redis = redis::Client::open(config.redis_url.clone()).expect("redis url");
        AppState {
            db,
            sessions: SessionStore::new(redis),
            storage,
            tokens: TokenIssuer::from_config(&config),
            config,
        }
    }
}
