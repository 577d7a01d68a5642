use axum::extract::State;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use super::filters::{count_query, listing_query, JobListFilter};
use super::{check_job_rules, ensure_owner, find_job, normalize_tags};
use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::extract::{Json, Path};
use crate::models::job::{EmployerJob, JobListing, JobRow, JobStatus, JobType, WorkMode};
use crate::models::user::{Role, UserStatus};
use crate::models::TextEnum;
use crate::profile::find_user;
use crate::response::{ApiResponse, Page};
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateJobRequest {
    #[validate(length(min = 3, max = 200, message = "must be 3-200 characters"))]
    pub title: String,
    #[validate(length(min = 10, max = 20000, message = "must be 10-20000 characters"))]
    pub description: String,
    #[validate(length(max = 200))]
    pub location: Option<String>,
    pub job_type: JobType,
    pub work_mode: WorkMode,
    #[validate(range(min = 0, message = "must not be negative"))]
    pub salary_min: Option<i32>,
    #[validate(range(min = 0, message = "must not be negative"))]
    pub salary_max: Option<i32>,
    #[serde(default)]
    #[validate(length(max = 50))]
    pub requirements: Vec<String>,
    #[serde(default)]
    #[validate(length(max = 20))]
    pub tags: Vec<String>,
    pub application_deadline: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateJobRequest {
    #[validate(length(min = 3, max = 200, message = "must be 3-200 characters"))]
    pub title: Option<String>,
    #[validate(length(min = 10, max = 20000, message = "must be 10-20000 characters"))]
    pub description: Option<String>,
    #[validate(length(max = 200))]
    pub location: Option<String>,
    pub job_type: Option<JobType>,
    pub work_mode: Option<WorkMode>,
    #[validate(range(min = 0, message = "must not be negative"))]
    pub salary_min: Option<i32>,
    #[validate(range(min = 0, message = "must not be negative"))]
    pub salary_max: Option<i32>,
    #[validate(length(max = 50))]
    pub requirements: Option<Vec<String>>,
    #[validate(length(max = 20))]
    pub tags: Option<Vec<String>>,
    pub application_deadline: Option<NaiveDate>,
    pub status: Option<JobStatus>,
}

impl UpdateJobRequest {
    /// Applies the patch onto the stored job.
    fn merge_into(self, mut job: JobRow) -> JobRow {
        if let Some(v) = self.title {
            job.title = v.trim().to_string();
        }
        if let Some(v) = self.description {
            job.description = v;
        }
        if let Some(v) = self.location {
            job.location = Some(v);
        }
        if let Some(v) = self.job_type {
            job.job_type = v.as_str().to_string();
        }
        if let Some(v) = self.work_mode {
            job.work_mode = v.as_str().to_string();
        }
        if let Some(v) = self.salary_min {
            job.salary_min = Some(v);
        }
        if let Some(v) = self.salary_max {
            job.salary_max = Some(v);
        }
        if let Some(v) = self.requirements {
            job.requirements = v;
        }
        if let Some(v) = self.tags {
            job.tags = normalize_tags(&v);
        }
        if let Some(v) = self.application_deadline {
            job.application_deadline = Some(v);
        }
        if let Some(v) = self.status {
            job.status = v.as_str().to_string();
        }
        job
    }
}

/// Employers must still be approved at the time they post.
async fn ensure_can_post(state: &AppState, auth: &AuthUser) -> Result<(), AppError> {
    auth.require(&[Role::Employer, Role::Admin])?;
    let user = find_user(&state.db, auth.user_id).await?;
    if UserStatus::parse_column(&user.status)? != UserStatus::Approved {
        return Err(AppError::Forbidden(
            "Account must be approved to post jobs".to_string(),
        ));
    }
    Ok(())
}

/// POST /api/job/list
pub async fn handle_list_jobs(
    State(state): State<AppState>,
    Json(filter): Json<JobListFilter>,
) -> Result<ApiResponse<Page<JobListing>>, AppError> {
    filter.validate()?;

    let items = listing_query(&filter)
        .build_query_as::<JobListing>()
        .fetch_all(&state.db)
        .await?;
    let total = count_query(&filter)
        .build_query_scalar::<i64>()
        .fetch_one(&state.db)
        .await?;

    Ok(ApiResponse::ok(
        "Jobs retrieved",
        Page::new(items, filter.page_params(), total),
    ))
}

/// GET /api/jobs/:job_id
pub async fn handle_get_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<ApiResponse<JobListing>, AppError> {
    let job = sqlx::query_as::<_, JobListing>(
        r#"
        SELECT j.*, e.company_name
        FROM jobs j
        LEFT JOIN employer_profiles e ON e.user_id = j.employer_id
        WHERE j.id = $1 AND j.deleted_at IS NULL
        "#,
    )
    .bind(job_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Job {job_id} not found")))?;
    Ok(ApiResponse::ok("Job retrieved", job))
}

/// POST /api/jobs
pub async fn handle_create_job(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<CreateJobRequest>,
) -> Result<ApiResponse<JobRow>, AppError> {
    req.validate()?;
    check_job_rules(
        req.salary_min,
        req.salary_max,
        req.application_deadline,
        Utc::now().date_naive(),
    )?;
    ensure_can_post(&state, &auth).await?;

    let job = sqlx::query_as::<_, JobRow>(
        r#"
        INSERT INTO jobs
            (id, employer_id, title, description, location, job_type, work_mode,
             salary_min, salary_max, requirements, tags, application_deadline, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(auth.user_id)
    .bind(req.title.trim())
    .bind(&req.description)
    .bind(req.location.as_deref())
    .bind(req.job_type.as_str())
    .bind(req.work_mode.as_str())
    .bind(req.salary_min)
    .bind(req.salary_max)
    .bind(&req.requirements)
    .bind(normalize_tags(&req.tags))
    .bind(req.application_deadline)
    .bind(JobStatus::Open.as_str())
    .fetch_one(&state.db)
    .await?;

    info!("User {} created job {}", auth.user_id, job.id);
    Ok(ApiResponse::created("Job created", job))
}

/// PATCH /api/jobs/:job_id
pub async fn handle_update_job(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(job_id): Path<Uuid>,
    Json(req): Json<UpdateJobRequest>,
) -> Result<ApiResponse<JobRow>, AppError> {
    req.validate()?;
    let existing = find_job(&state.db, job_id).await?;
    ensure_owner(&existing, &auth)?;

    let deadline_changed = req.application_deadline.is_some();
    let merged = req.merge_into(existing);
    // An unchanged past deadline on an old posting is not an error.
    let deadline = merged.application_deadline.filter(|_| deadline_changed);
    check_job_rules(
        merged.salary_min,
        merged.salary_max,
        deadline,
        Utc::now().date_naive(),
    )?;

    let job = sqlx::query_as::<_, JobRow>(
        r#"
        UPDATE jobs
        SET title = $2, description = $3, location = $4, job_type = $5, work_mode = $6,
            salary_min = $7, salary_max = $8, requirements = $9, tags = $10,
            application_deadline = $11, status = $12, updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(job_id)
    .bind(&merged.title)
    .bind(&merged.description)
    .bind(merged.location.as_deref())
    .bind(&merged.job_type)
    .bind(&merged.work_mode)
    .bind(merged.salary_min)
    .bind(merged.salary_max)
    .bind(&merged.requirements)
    .bind(&merged.tags)
    .bind(merged.application_deadline)
    .bind(&merged.status)
    .fetch_one(&state.db)
    .await?;

    info!("User {} updated job {job_id}", auth.user_id);
    Ok(ApiResponse::ok("Job updated", job))
}

/// POST /api/jobs/:job_id/close
pub async fn handle_close_job(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(job_id): Path<Uuid>,
) -> Result<ApiResponse<JobRow>, AppError> {
    let existing = find_job(&state.db, job_id).await?;
    ensure_owner(&existing, &auth)?;

    let job = sqlx::query_as::<_, JobRow>(
        "UPDATE jobs SET status = $2, updated_at = now() WHERE id = $1 RETURNING *",
    )
    .bind(job_id)
    .bind(JobStatus::Closed.as_str())
    .fetch_one(&state.db)
    .await?;

    info!("User {} closed job {job_id}", auth.user_id);
    Ok(ApiResponse::ok("Job closed", job))
}

/// DELETE /api/jobs/:job_id
pub async fn handle_delete_job(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(job_id): Path<Uuid>,
) -> Result<ApiResponse<()>, AppError> {
    let existing = find_job(&state.db, job_id).await?;
    ensure_owner(&existing, &auth)?;

    sqlx::query(
        "UPDATE jobs SET deleted_at = now(), status = $2, updated_at = now() WHERE id = $1",
    )
    .bind(job_id)
    .bind(JobStatus::Closed.as_str())
    .execute(&state.db)
    .await?;

    info!("User {} deleted job {job_id}", auth.user_id);
    Ok(ApiResponse::message("Job deleted"))
}

/// GET /api/employer/jobs
pub async fn handle_employer_jobs(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<ApiResponse<Vec<EmployerJob>>, AppError> {
    auth.require(&[Role::Employer])?;
    let jobs = sqlx::query_as::<_, EmployerJob>(
        r#"
        SELECT j.*, COUNT(a.id) AS application_count
        FROM jobs j
        LEFT JOIN applications a ON a.job_id = j.id
        WHERE j.employer_id = $1 AND j.deleted_at IS NULL
        GROUP BY j.id
        ORDER BY j.created_at DESC
        "#,
    )
    .bind(auth.user_id)
    .fetch_all(&state.db)
    .await?;
    Ok(ApiResponse::ok("Employer jobs", jobs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::sample_job;

    #[test]
    fn test_merge_only_touches_given_fields() {
        let job = sample_job(Uuid::new_v4());
        let patch = UpdateJobRequest {
            title: Some("  Senior Intern ".into()),
            tags: Some(vec!["Go".into(), "go".into()]),
            status: Some(JobStatus::Closed),
            ..Default::default()
        };
        let merged = patch.merge_into(job.clone());
        assert_eq!(merged.title, "Senior Intern");
        assert_eq!(merged.tags, vec!["go"]);
        assert_eq!(merged.status, "closed");
        assert_eq!(merged.description, job.description);
        assert_eq!(merged.salary_min, job.salary_min);
    }

    #[test]
    fn test_create_request_validation() {
        let req: CreateJobRequest = serde_json::from_value(serde_json::json!({
            "title": "QA",
            "description": "short",
            "job_type": "internship",
            "work_mode": "remote",
            "salary_min": -1
        }))
        .unwrap();
        let err = req.validate().unwrap_err();
        let fields = err.field_errors();
        assert!(fields.contains_key("title"));
        assert!(fields.contains_key("description"));
        assert!(fields.contains_key("salary_min"));
    }

    #[test]
    fn test_create_request_rejects_unknown_job_type() {
        let parsed = serde_json::from_value::<CreateJobRequest>(serde_json::json!({
            "title": "Barista",
            "description": "Make very good coffee",
            "job_type": "gig",
            "work_mode": "remote"
        }));
        assert!(parsed.is_err());
    }
}
