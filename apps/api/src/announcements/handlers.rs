use axum::extract::State;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::extract::{Json, Path};
use crate::models::announcement::{AnnouncementRow, Audience, Priority};
use crate::models::user::Role;
use crate::models::TextEnum;
use crate::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAnnouncementRequest {
    #[validate(length(min = 1, max = 200, message = "must be 1-200 characters"))]
    pub title: String,
    #[validate(length(min = 1, max = 20000, message = "must be 1-20000 characters"))]
    pub body: String,
    #[serde(default = "default_audience")]
    pub audience: Audience,
    #[serde(default = "default_priority")]
    pub priority: Priority,
    #[serde(default = "default_published")]
    pub published: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

fn default_audience() -> Audience {
    Audience::All
}

fn default_priority() -> Priority {
    Priority::Normal
}

fn default_published() -> bool {
    true
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateAnnouncementRequest {
    #[validate(length(min = 1, max = 200, message = "must be 1-200 characters"))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 20000, message = "must be 1-20000 characters"))]
    pub body: Option<String>,
    pub audience: Option<Audience>,
    pub priority: Option<Priority>,
    pub published: Option<bool>,
    pub expires_at: Option<DateTime<Utc>>,
}

fn check_expiry(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Result<(), AppError> {
    match expires_at {
        Some(t) if t <= now => Err(AppError::Validation(
            "expires_at: must be in the future".to_string(),
        )),
        _ => Ok(()),
    }
}

/// GET /api/announcements
pub async fn handle_list_announcements(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<ApiResponse<Vec<AnnouncementRow>>, AppError> {
    let rows = match Audience::visible_to(auth.role) {
        // Admins see drafts and expired entries too.
        None => {
            sqlx::query_as::<_, AnnouncementRow>(
                r#"
                SELECT * FROM announcements
                WHERE deleted_at IS NULL
                ORDER BY (priority = 'high') DESC, created_at DESC
                "#,
            )
            .fetch_all(&state.db)
            .await?
        }
        Some(audiences) => {
            sqlx::query_as::<_, AnnouncementRow>(
                r#"
                SELECT * FROM announcements
                WHERE deleted_at IS NULL
                  AND published
                  AND (expires_at IS NULL OR expires_at > now())
                  AND audience = ANY($1)
                ORDER BY (priority = 'high') DESC, created_at DESC
                "#,
            )
            .bind(audiences)
            .fetch_all(&state.db)
            .await?
        }
    };
    Ok(ApiResponse::ok("Announcements", rows))
}

/// POST /api/announcements
pub async fn handle_create_announcement(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<CreateAnnouncementRequest>,
) -> Result<ApiResponse<AnnouncementRow>, AppError> {
    auth.require(&[Role::Admin])?;
    req.validate()?;
    check_expiry(req.expires_at, Utc::now())?;

    let row = sqlx::query_as::<_, AnnouncementRow>(
        r#"
        INSERT INTO announcements (id, author_id, title, body, audience, priority, published, expires_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING id, author_id, title, body, audience, priority, published, expires_at, created_at, updated_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(auth.user_id)
    .bind(req.title.trim())
    .bind(&req.body)
    .bind(req.audience.as_str())
    .bind(req.priority.as_str())
    .bind(req.published)
    .bind(req.expires_at)
    .fetch_one(&state.db)
    .await?;

    info!("Admin {} posted announcement {}", auth.user_id, row.id);
    Ok(ApiResponse::created("Announcement created", row))
}

/// PATCH /api/announcements/:id
pub async fn handle_update_announcement(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateAnnouncementRequest>,
) -> Result<ApiResponse<AnnouncementRow>, AppError> {
    auth.require(&[Role::Admin])?;
    req.validate()?;
    check_expiry(req.expires_at, Utc::now())?;

    let row = sqlx::query_as::<_, AnnouncementRow>(
        r#"
        UPDATE announcements
        SET title = COALESCE($2, title),
            body = COALESCE($3, body),
            audience = COALESCE($4, audience),
            priority = COALESCE($5, priority),
            published = COALESCE($6, published),
            expires_at = COALESCE($7, expires_at),
            updated_at = now()
        WHERE id = $1 AND deleted_at IS NULL
        RETURNING id, author_id, title, body, audience, priority, published, expires_at, created_at, updated_at
        "#,
    )
    .bind(id)
    .bind(req.title.as_deref().map(str::trim))
    .bind(req.body.as_deref())
    .bind(req.audience.map(|a| a.as_str()))
    .bind(req.priority.map(|p| p.as_str()))
    .bind(req.published)
    .bind(req.expires_at)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Announcement {id} not found")))?;

    Ok(ApiResponse::ok("Announcement updated", row))
}

/// DELETE /api/announcements/:id
pub async fn handle_delete_announcement(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<()>, AppError> {
    auth.require(&[Role::Admin])?;
    let result = sqlx::query(
        "UPDATE announcements SET deleted_at = now() WHERE id = $1 AND deleted_at IS NULL",
    )
    .bind(id)
    .execute(&state.db)
    .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Announcement {id} not found")));
    }
    info!("Admin {} deleted announcement {id}", auth.user_id);
    Ok(ApiResponse::message("Announcement deleted"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_create_defaults() {
        let req: CreateAnnouncementRequest = serde_json::from_value(serde_json::json!({
            "title": "Career fair",
            "body": "Hall B, 10:00"
        }))
        .unwrap();
        assert_eq!(req.audience, Audience::All);
        assert_eq!(req.priority, Priority::Normal);
        assert!(req.published);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_empty_title_rejected() {
        let req: CreateAnnouncementRequest = serde_json::from_value(serde_json::json!({
            "title": "",
            "body": "x",
            "audience": "student"
        }))
        .unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_expiry_must_be_future() {
        let now = Utc::now();
        assert!(check_expiry(None, now).is_ok());
        assert!(check_expiry(Some(now + Duration::hours(1)), now).is_ok());
        assert!(check_expiry(Some(now - Duration::hours(1)), now).is_err());
    }
}
