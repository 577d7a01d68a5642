use axum::extract::State;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::extract::{Path, Query};
use crate::models::notification::NotificationRow;
use crate::response::ApiResponse;
use crate::state::AppState;

const MAX_NOTIFICATIONS: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: bool,
}

#[derive(Debug, Serialize)]
pub struct NotificationList {
    pub items: Vec<NotificationRow>,
    pub unread_count: i64,
}

#[derive(Debug, Serialize)]
pub struct MarkedRead {
    pub updated: u64,
}

/// GET /api/notifications
pub async fn handle_list_notifications(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(params): Query<NotificationQuery>,
) -> Result<ApiResponse<NotificationList>, AppError> {
    let items = sqlx::query_as::<_, NotificationRow>(
        r#"
        SELECT * FROM notifications
        WHERE user_id = $1 AND ($2 = false OR read_at IS NULL)
        ORDER BY created_at DESC
        LIMIT $3
        "#,
    )
    .bind(auth.user_id)
    .bind(params.unread_only)
    .bind(MAX_NOTIFICATIONS)
    .fetch_all(&state.db)
    .await?;

    let unread_count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND read_at IS NULL",
    )
    .bind(auth.user_id)
    .fetch_one(&state.db)
    .await?;

    Ok(ApiResponse::ok(
        "Notifications",
        NotificationList {
            items,
            unread_count,
        },
    ))
}

/// POST /api/notifications/:id/read
pub async fn handle_mark_read(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<NotificationRow>, AppError> {
    let row = sqlx::query_as::<_, NotificationRow>(
        r#"
        UPDATE notifications
        SET read_at = COALESCE(read_at, now())
        WHERE id = $1 AND user_id = $2
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(auth.user_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Notification {id} not found")))?;
    Ok(ApiResponse::ok("Notification marked as read", row))
}

/// POST /api/notifications/read-all
pub async fn handle_mark_all_read(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<ApiResponse<MarkedRead>, AppError> {
    let result = sqlx::query(
        "UPDATE notifications SET read_at = now() WHERE user_id = $1 AND read_at IS NULL",
    )
    .bind(auth.user_id)
    .execute(&state.db)
    .await?;
    Ok(ApiResponse::ok(
        "All notifications marked as read",
        MarkedRead {
            updated: result.rows_affected(),
        },
    ))
}
