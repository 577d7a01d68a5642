use redis::Client as RedisClient;
use tracing::debug;
use uuid::Uuid;

use crate::errors::AppError;

/// Tracks live refresh tokens by `jti` so they can be rotated and revoked.
#[derive(Clone)]
pub struct SessionStore {
    redis: RedisClient,
}

fn session_key(jti: Uuid) -> String {
    format!("jobboard:refresh:{jti}")
}

fn owned_by(owner: Option<&str>, user_id: Uuid) -> bool {
    owner.and_then(|o| Uuid::parse_str(o).ok()) == Some(user_id)
}

fn redis_err(e: redis::RedisError) -> AppError {
    AppError::Internal(anyhow::anyhow!("Redis error: {e}"))
}

impl SessionStore {
    pub fn new(redis: RedisClient) -> Self {
        Self { redis }
    }

    pub async fn store(&self, jti: Uuid, user_id: Uuid, ttl_secs: u64) -> Result<(), AppError> {
        let mut conn = self
            .redis
            .get_multiplexed_async_connection()
            .await
            .map_err(redis_err)?;
        redis::cmd("SET")
            .arg(session_key(jti))
            .arg(user_id.to_string())
            .arg("EX")
            .arg(ttl_secs.max(1))
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(redis_err)?;
        debug!("Stored refresh session {jti} for user {user_id}");
        Ok(())
    }

    /// Atomically deletes the session and reports whether it was live for
    /// `user_id`. Of two concurrent refreshes with one token only one wins.
    pub async fn consume(&self, jti: Uuid, user_id: Uuid) -> Result<bool, AppError> {
        let mut conn = self
            .redis
            .get_multiplexed_async_connection()
            .await
            .map_err(redis_err)?;
        let owner: Option<String> = redis::cmd("GETDEL")
            .arg(session_key(jti))
            .query_async(&mut conn)
            .await
            .map_err(redis_err)?;
        debug!("Consumed refresh session {jti}");
        Ok(owned_by(owner.as_deref(), user_id))
    }

    pub async fn revoke(&self, jti: Uuid) -> Result<(), AppError> {
        let mut conn = self
            .redis
            .get_multiplexed_async_connection()
            .await
            .map_err(redis_err)?;
        redis::cmd("DEL")
            .arg(session_key(jti))
            .query_async::<_, i64>(&mut conn)
            .await
            .map_err(redis_err)?;
        debug!("Revoked refresh session {jti}");
        Ok(())
    }
}
