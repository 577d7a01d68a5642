pub mod handlers;

use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::errors::AppError;

/// Notification kinds emitted by the backend.
pub mod kinds {
    pub const ACCOUNT_STATUS: &str = "account_status";
    pub const NEW_APPLICATION: &str = "new_application";
    pub const APPLICATION_STATUS: &str = "application_status";
    pub const APPLICATION_WITHDRAWN: &str = "application_withdrawn";
}

pub struct NewNotification<'a> {
    pub user_id: Uuid,
    pub kind: &'a str,
    pub title: &'a str,
    pub message: &'a str,
    pub link: Option<&'a str>,
}

pub async fn notify(pool: &PgPool, n: NewNotification<'_>) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO notifications (id, user_id, kind, title, message, link) VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(Uuid::new_v4())
    .bind(n.user_id)
    .bind(n.kind)
    .bind(n.title)
    .bind(n.message)
    .bind(n.link)
    .execute(pool)
    .await?;
    debug!("Queued {} notification for {}", n.kind, n.user_id);
    Ok(())
}
