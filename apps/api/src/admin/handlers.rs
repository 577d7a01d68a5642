use axum::extract::State;
use serde::Deserialize;
use sqlx::{Postgres, QueryBuilder};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use super::accounts::{create_professor, next_status, CreateProfessorRequest, CreatedProfessor, StatusAction};
use super::dashboard::{admin_dashboard, AdminDashboard};
use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::extract::{Json, Path, Query};
use crate::jobs::filters::like_pattern;
use crate::models::user::{PublicUser, Role, UserRow, UserStatus, UserWithProfile};
use crate::models::TextEnum;
use crate::notifications::{kinds, notify, NewNotification};
use crate::profile::{find_user, load_user_with_profile};
use crate::response::{ApiResponse, Page, PageParams};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct UserListQuery {
    pub role: Option<Role>,
    pub status: Option<UserStatus>,
    pub search: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

impl UserListQuery {
    fn page_params(&self) -> PageParams {
        PageParams {
            page: self.page,
            page_size: self.page_size,
        }
    }
}

fn push_user_filters<'a>(qb: &mut QueryBuilder<'a, Postgres>, q: &'a UserListQuery) {
    qb.push(" WHERE deleted_at IS NULL");
    if let Some(role) = q.role {
        qb.push(" AND role = ").push_bind(role.as_str());
    }
    if let Some(status) = q.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(search) = q.search.as_deref().filter(|s| !s.trim().is_empty()) {
        let pattern = like_pattern(search);
        qb.push(" AND (email ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR full_name ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

/// GET /api/admin/users
pub async fn handle_list_users(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(q): Query<UserListQuery>,
) -> Result<ApiResponse<Page<PublicUser>>, AppError> {
    auth.require(&[Role::Admin])?;
    let params = q.page_params();

    let mut select = QueryBuilder::new("SELECT * FROM users");
    push_user_filters(&mut select, &q);
    select
        .push(" ORDER BY created_at DESC LIMIT ")
        .push_bind(params.page_size())
        .push(" OFFSET ")
        .push_bind(params.offset());
    let users: Vec<PublicUser> = select
        .build_query_as::<UserRow>()
        .fetch_all(&state.db)
        .await?
        .into_iter()
        .map(PublicUser::from)
        .collect();

    let mut count = QueryBuilder::new("SELECT COUNT(*) FROM users");
    push_user_filters(&mut count, &q);
    let total = count
        .build_query_scalar::<i64>()
        .fetch_one(&state.db)
        .await?;

    Ok(ApiResponse::ok("Users", Page::new(users, params, total)))
}

/// GET /api/admin/users/:id
pub async fn handle_get_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<UserWithProfile>, AppError> {
    auth.require(&[Role::Admin])?;
    let user = load_user_with_profile(&state.db, id).await?;
    Ok(ApiResponse::ok("User", user))
}

async fn apply_status_action(
    state: &AppState,
    auth: &AuthUser,
    id: Uuid,
    action: StatusAction,
) -> Result<ApiResponse<PublicUser>, AppError> {
    auth.require(&[Role::Admin])?;
    if id == auth.user_id {
        return Err(AppError::BadRequest(
            "Admins cannot change their own account status".to_string(),
        ));
    }

    let user = find_user(&state.db, id).await?;
    let current = UserStatus::parse_column(&user.status)?;
    let next = next_status(current, action)?;

    // Guard on the current status so concurrent actions cannot both apply.
    let updated = sqlx::query_as::<_, UserRow>(
        "UPDATE users SET status = $2, updated_at = now() WHERE id = $1 AND status = $3 RETURNING *",
    )
    .bind(id)
    .bind(next.as_str())
    .bind(current.as_str())
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::Conflict("Account status changed concurrently".to_string()))?;

    notify(
        &state.db,
        NewNotification {
            user_id: id,
            kind: kinds::ACCOUNT_STATUS,
            title: "Account status changed",
            message: &format!("Your account has been {}", action.verb()),
            link: None,
        },
    )
    .await?;

    info!(
        "Admin {} {} user {id} ({} -> {})",
        auth.user_id,
        action.verb(),
        current.as_str(),
        next.as_str()
    );
    Ok(ApiResponse::ok(
        format!("User {}", action.verb()),
        updated.into(),
    ))
}

/// POST /api/admin/users/:id/approve
pub async fn handle_approve_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<PublicUser>, AppError> {
    apply_status_action(&state, &auth, id, StatusAction::Approve).await
}

/// POST /api/admin/users/:id/reject
pub async fn handle_reject_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<PublicUser>, AppError> {
    apply_status_action(&state, &auth, id, StatusAction::Reject).await
}

/// POST /api/admin/users/:id/suspend
pub async fn handle_suspend_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<PublicUser>, AppError> {
    apply_status_action(&state, &auth, id, StatusAction::Suspend).await
}

/// POST /api/admin/users/:id/reactivate
pub async fn handle_reactivate_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<PublicUser>, AppError> {
    apply_status_action(&state, &auth, id, StatusAction::Reactivate).await
}

/// DELETE /api/admin/users/:id
pub async fn handle_delete_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<()>, AppError> {
    auth.require(&[Role::Admin])?;
    if id == auth.user_id {
        return Err(AppError::BadRequest(
            "Admins cannot delete their own account".to_string(),
        ));
    }
    find_user(&state.db, id).await?;

    let mut tx = state.db.begin().await?;
    sqlx::query("UPDATE users SET deleted_at = now(), updated_at = now() WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    // A deleted employer's postings disappear with them.
    sqlx::query(
        "UPDATE jobs SET deleted_at = now(), status = 'closed' WHERE employer_id = $1 AND deleted_at IS NULL",
    )
    .bind(id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    info!("Admin {} deleted user {id}", auth.user_id);
    Ok(ApiResponse::message("User deleted"))
}

/// POST /api/admin/users/professor
pub async fn handle_create_professor(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<CreateProfessorRequest>,
) -> Result<ApiResponse<CreatedProfessor>, AppError> {
    auth.require(&[Role::Admin])?;
    req.validate()?;
    let created = create_professor(&state.db, state.config.bcrypt_cost, req).await?;
    let message = if created.credentials.is_some() {
        "Professor account created; share the generated credentials securely"
    } else {
        "Professor account created"
    };
    Ok(ApiResponse::created(message, created))
}

/// GET /api/admin/dashboard
pub async fn handle_admin_dashboard(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<ApiResponse<AdminDashboard>, AppError> {
    auth.require(&[Role::Admin])?;
    let dashboard = admin_dashboard(&state.db).await?;
    Ok(ApiResponse::ok("Admin dashboard", dashboard))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_filters_sql() {
        let q = UserListQuery {
            role: Some(Role::Employer),
            status: Some(UserStatus::Pending),
            search: Some("acme".into()),
            ..Default::default()
        };
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM users");
        push_user_filters(&mut qb, &q);
        assert_eq!(
            qb.sql(),
            "SELECT COUNT(*) FROM users WHERE deleted_at IS NULL AND role = $1 AND status = $2 \
             AND (email ILIKE $3 OR full_name ILIKE $4)"
        );
    }

    #[test]
    fn test_no_filters_only_excludes_deleted() {
        let q = UserListQuery::default();
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM users");
        push_user_filters(&mut qb, &q);
        assert_eq!(qb.sql(), "SELECT COUNT(*) FROM users WHERE deleted_at IS NULL");
    }
}
