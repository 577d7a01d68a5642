use std::collections::BTreeMap;

use axum::extract::State;
use serde::Serialize;

use crate::admin::dashboard::{zero_filled, KeyCount};
use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::models::application::{ApplicationStatus, StudentApplication};
use crate::models::job::JobStatus;
use crate::models::user::Role;
use crate::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct EmployerDashboard {
    pub jobs_by_status: BTreeMap<String, i64>,
    pub applications_by_status: BTreeMap<String, i64>,
    pub recent_applications: Vec<StudentApplication>,
}

/// GET /api/employer/dashboard
pub async fn handle_employer_dashboard(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<ApiResponse<EmployerDashboard>, AppError> {
    auth.require(&[Role::Employer])?;

    let jobs = sqlx::query_as::<_, KeyCount>(
        r#"
        SELECT status AS key, COUNT(*) AS count
        FROM jobs
        WHERE employer_id = $1 AND deleted_at IS NULL
        GROUP BY status
        "#,
    )
    .bind(auth.user_id)
    .fetch_all(&state.db)
    .await?;

    let applications = sqlx::query_as::<_, KeyCount>(
        r#"
        SELECT a.status AS key, COUNT(*) AS count
        FROM applications a
        JOIN jobs j ON j.id = a.job_id
        WHERE j.employer_id = $1 AND j.deleted_at IS NULL
        GROUP BY a.status
        "#,
    )
    .bind(auth.user_id)
    .fetch_all(&state.db)
    .await?;

    let recent_applications = sqlx::query_as::<_, StudentApplication>(
        r#"
        SELECT a.*, j.title AS job_title, e.company_name
        FROM applications a
        JOIN jobs j ON j.id = a.job_id
        LEFT JOIN employer_profiles e ON e.user_id = j.employer_id
        WHERE j.employer_id = $1 AND j.deleted_at IS NULL
        ORDER BY a.created_at DESC
        LIMIT 5
        "#,
    )
    .bind(auth.user_id)
    .fetch_all(&state.db)
    .await?;

    Ok(ApiResponse::ok(
        "Employer dashboard",
        EmployerDashboard {
            jobs_by_status: zero_filled::<JobStatus>(jobs),
            applications_by_status: zero_filled::<ApplicationStatus>(applications),
            recent_applications,
        },
    ))
}
