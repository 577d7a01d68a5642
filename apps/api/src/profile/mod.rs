pub mod handlers;

use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::user::{
    EmployerProfileRow, ProfessorProfileRow, Role, RoleProfile, StudentProfileRow, UserRow,
    UserWithProfile,
};
use crate::models::TextEnum;

/// Loads a live (not soft-deleted) user.
pub async fn find_user(pool: &PgPool, user_id: Uuid) -> Result<UserRow, AppError> {
    sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1 AND deleted_at IS NULL")
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {user_id} not found")))
}

pub async fn find_user_by_email(pool: &PgPool, email: &str) -> Result<Option<UserRow>, AppError> {
    Ok(sqlx::query_as::<_, UserRow>(
        "SELECT * FROM users WHERE lower(email) = lower($1) AND deleted_at IS NULL",
    )
    .bind(email.trim())
    .fetch_optional(pool)
    .await?)
}

/// Any row, deleted or not, holding this email. Emails stay reserved after soft delete.
pub async fn email_taken(pool: &PgPool, email: &str) -> Result<bool, AppError> {
    Ok(
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE lower(email) = lower($1))")
            .bind(email.trim())
            .fetch_one(pool)
            .await?,
    )
}

pub async fn find_student_profile<'e, E: PgExecutor<'e>>(
    executor: E,
    user_id: Uuid,
) -> Result<Option<StudentProfileRow>, AppError> {
    Ok(
        sqlx::query_as::<_, StudentProfileRow>("SELECT * FROM student_profiles WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(executor)
            .await?,
    )
}

const LOCK_STUDENT_SQL: &str = "SELECT id FROM users WHERE id = $1 AND role = 'student' FOR NO KEY UPDATE";

/// Serializes a student's résumé changes against their applications until
/// the surrounding transaction ends. Every path that writes a résumé key or
/// snapshots one into an application takes this lock first.
pub async fn lock_student<'e, E: PgExecutor<'e>>(executor: E, student_id: Uuid) -> Result<(), AppError> {
    sqlx::query_scalar::<_, Uuid>(LOCK_STUDENT_SQL)
        .bind(student_id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Student {student_id} not found")))?;
    Ok(())
}

pub async fn load_role_profile(pool: &PgPool, user: &UserRow) -> Result<Option<RoleProfile>, AppError> {
    let profile = match Role::parse_column(&user.role)? {
        Role::Student => find_student_profile(pool, user.id)
            .await?
            .map(RoleProfile::Student),
        Role::Employer => sqlx::query_as::<_, EmployerProfileRow>(
            "SELECT * FROM employer_profiles WHERE user_id = $1",
        )
        .bind(user.id)
        .fetch_optional(pool)
        .await?
        .map(RoleProfile::Employer),
        Role::Professor => sqlx::query_as::<_, ProfessorProfileRow>(
            "SELECT * FROM professor_profiles WHERE user_id = $1",
        )
        .bind(user.id)
        .fetch_optional(pool)
        .await?
        .map(RoleProfile::Professor),
        Role::Admin => None,
    };
    Ok(profile)
}

pub async fn load_user_with_profile(pool: &PgPool, user_id: Uuid) -> Result<UserWithProfile, AppError> {
    let user = find_user(pool, user_id).await?;
    let profile = load_role_profile(pool, &user).await?;
    Ok(UserWithProfile {
        user: user.into(),
        profile,
    })
}
