use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::auth::password::{generate_password, hash_password, validate_password_strength};
use crate::errors::AppError;
use crate::models::user::{
    ProfessorProfileRow, PublicUser, Role, UserRow, UserStatus,
};
use crate::models::TextEnum;

/// Admin actions on an account's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusAction {
    Approve,
    Reject,
    Suspend,
    Reactivate,
}

impl StatusAction {
    pub fn verb(&self) -> &'static str {
        match self {
            StatusAction::Approve => "approved",
            StatusAction::Reject => "rejected",
            StatusAction::Suspend => "suspended",
            StatusAction::Reactivate => "reactivated",
        }
    }
}

/// Resulting status for an admin action, or 409 when the action does not
/// apply to the current status.
pub fn next_status(current: UserStatus, action: StatusAction) -> Result<UserStatus, AppError> {
    use UserStatus::*;
    let next = match (current, action) {
        (Pending, StatusAction::Approve) | (Rejected, StatusAction::Approve) => Approved,
        (Pending, StatusAction::Reject) => Rejected,
        (Approved, StatusAction::Suspend) => Suspended,
        (Suspended, StatusAction::Reactivate) => Approved,
        _ => {
            return Err(AppError::Conflict(format!(
                "Cannot {} an account that is {}",
                match action {
                    StatusAction::Approve => "approve",
                    StatusAction::Reject => "reject",
                    StatusAction::Suspend => "suspend",
                    StatusAction::Reactivate => "reactivate",
                },
                current.as_str()
            )))
        }
    };
    Ok(next)
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProfessorRequest {
    #[validate(email(message = "must be a valid email"))]
    pub email: String,
    #[validate(length(min = 1, max = 200, message = "must be 1-200 characters"))]
    pub full_name: String,
    #[validate(custom(function = "validate_password_strength"))]
    pub password: Option<String>,
    #[validate(length(min = 1, max = 200, message = "must be 1-200 characters"))]
    pub department: String,
    #[validate(length(max = 200))]
    pub faculty: Option<String>,
    #[validate(length(max = 100))]
    pub title: Option<String>,
    #[validate(length(max = 32))]
    pub phone: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct CreatedProfessor {
    pub user: PublicUser,
    pub profile: ProfessorProfileRow,
    /// Present only when the password was generated by the server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,
}

/// Creates the user and professor rows in a single transaction.
pub async fn create_professor(
    pool: &PgPool,
    bcrypt_cost: u32,
    req: CreateProfessorRequest,
) -> Result<CreatedProfessor, AppError> {
    let email = req.email.trim().to_lowercase();
    if crate::profile::email_taken(pool, &email).await? {
        return Err(AppError::Conflict("Email is already registered".to_string()));
    }

    let (password, generated) = match req.password {
        Some(p) => (p, false),
        None => (generate_password(), true),
    };
    let password_hash = hash_password(&password, bcrypt_cost).await?;
    let user_id = Uuid::new_v4();

    let mut tx = pool.begin().await?;
    let user = sqlx::query_as::<_, UserRow>(
        r#"
        INSERT INTO users (id, email, password_hash, role, status, full_name, phone)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(&email)
    .bind(&password_hash)
    .bind(Role::Professor.as_str())
    .bind(UserStatus::Approved.as_str())
    .bind(req.full_name.trim())
    .bind(req.phone.as_deref())
    .fetch_one(&mut *tx)
    .await?;

    let profile = sqlx::query_as::<_, ProfessorProfileRow>(
        r#"
        INSERT INTO professor_profiles (user_id, department, faculty, title)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(req.department.trim())
    .bind(req.faculty.as_deref())
    .bind(req.title.as_deref())
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;

    info!("Created professor account {user_id}");

    Ok(CreatedProfessor {
        user: user.into(),
        profile,
        credentials: generated.then(|| Credentials { email, password }),
    })
}
