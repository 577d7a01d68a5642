use axum::extract::State;
use serde::Deserialize;
use tracing::info;
use validator::Validate;

use super::{find_user, load_user_with_profile};
use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::extract::Json;
use crate::models::user::{Role, UserWithProfile};
use crate::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 200, message = "must be 1-200 characters"))]
    pub full_name: Option<String>,
    #[validate(length(max = 32, message = "must be at most 32 characters"))]
    pub phone: Option<String>,

    // student
    #[validate(length(max = 32))]
    pub student_code: Option<String>,
    #[validate(length(max = 200))]
    pub faculty: Option<String>,
    #[validate(length(max = 200))]
    pub major: Option<String>,
    #[validate(range(min = 1, max = 8, message = "must be between 1 and 8"))]
    pub year_of_study: Option<i16>,
    #[validate(range(min = 0.0, max = 4.0, message = "must be between 0.0 and 4.0"))]
    pub gpa: Option<f64>,

    // employer
    #[validate(length(min = 1, max = 200))]
    pub company_name: Option<String>,
    #[validate(length(max = 5000))]
    pub company_description: Option<String>,
    #[validate(url(message = "must be a valid URL"))]
    pub website: Option<String>,
    #[validate(length(max = 32))]
    pub contact_phone: Option<String>,

    // professor
    #[validate(length(min = 1, max = 200))]
    pub department: Option<String>,
    #[validate(length(max = 100))]
    pub title: Option<String>,
}

/// GET /api/profile
pub async fn handle_get_profile(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<ApiResponse<UserWithProfile>, AppError> {
    let profile = load_user_with_profile(&state.db, auth.user_id).await?;
    Ok(ApiResponse::ok("Profile loaded", profile))
}

/// PATCH /api/profile
pub async fn handle_update_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<ApiResponse<UserWithProfile>, AppError> {
    req.validate()?;
    find_user(&state.db, auth.user_id).await?;

    let mut tx = state.db.begin().await?;

    sqlx::query(
        r#"
        UPDATE users
        SET full_name = COALESCE($2, full_name),
            phone = COALESCE($3, phone),
            updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(auth.user_id)
    .bind(req.full_name.as_deref().map(str::trim))
    .bind(req.phone.as_deref())
    .execute(&mut *tx)
    .await?;

    match auth.role {
        Role::Student => {
            sqlx::query(
                r#"
                INSERT INTO student_profiles (user_id, student_code, faculty, major, year_of_study, gpa)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (user_id) DO UPDATE
                SET student_code = COALESCE(EXCLUDED.student_code, student_profiles.student_code),
                    faculty = COALESCE(EXCLUDED.faculty, student_profiles.faculty),
                    major = COALESCE(EXCLUDED.major, student_profiles.major),
                    year_of_study = COALESCE(EXCLUDED.year_of_study, student_profiles.year_of_study),
                    gpa = COALESCE(EXCLUDED.gpa, student_profiles.gpa)
                "#,
            )
            .bind(auth.user_id)
            .bind(req.student_code.as_deref())
            .bind(req.faculty.as_deref())
            .bind(req.major.as_deref())
            .bind(req.year_of_study)
            .bind(req.gpa)
            .execute(&mut *tx)
            .await?;
        }
        Role::Employer => {
            sqlx::query(
                r#"
                UPDATE employer_profiles
                SET company_name = COALESCE($2, company_name),
                    company_description = COALESCE($3, company_description),
                    website = COALESCE($4, website),
                    contact_phone = COALESCE($5, contact_phone)
                WHERE user_id = $1
                "#,
            )
            .bind(auth.user_id)
            .bind(req.company_name.as_deref())
            .bind(req.company_description.as_deref())
            .bind(req.website.as_deref())
            .bind(req.contact_phone.as_deref())
            .execute(&mut *tx)
            .await?;
        }
        Role::Professor => {
            sqlx::query(
                r#"
                UPDATE professor_profiles
                SET department = COALESCE($2, department),
                    faculty = COALESCE($3, faculty),
                    title = COALESCE($4, title)
                WHERE user_id = $1
                "#,
            )
            .bind(auth.user_id)
            .bind(req.department.as_deref())
            .bind(req.faculty.as_deref())
            .bind(req.title.as_deref())
            .execute(&mut *tx)
            .await?;
        }
        Role::Admin => {}
    }

    tx.commit().await?;
    info!("User {} updated their profile", auth.user_id);

    let profile = load_user_with_profile(&state.db, auth.user_id).await?;
    Ok(ApiResponse::ok("Profile updated", profile))
}
