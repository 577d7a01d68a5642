use std::collections::BTreeMap;

use axum::extract::State;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{FromRow, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::admin::dashboard::{zero_filled, KeyCount};
use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::extract::Query;
use crate::jobs::filters::like_pattern;
use crate::models::application::ApplicationStatus;
use crate::models::user::Role;
use crate::models::TextEnum;
use crate::response::{ApiResponse, Page, PageParams};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct StudentSearchQuery {
    pub search: Option<String>,
    pub faculty: Option<String>,
    pub has_resume: Option<bool>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

/// One student row in the professor's overview.
#[derive(Debug, Serialize, FromRow)]
pub struct StudentSummary {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub student_code: Option<String>,
    pub faculty: Option<String>,
    pub major: Option<String>,
    pub year_of_study: Option<i16>,
    pub has_resume: bool,
    pub total_applications: i64,
    pub applications_by_status: Json<BTreeMap<String, i64>>,
    pub last_applied_at: Option<DateTime<Utc>>,
}

impl StudentSummary {
    fn fill_statuses(mut self) -> Self {
        for status in ApplicationStatus::ALL {
            self.applications_by_status
                .0
                .entry(status.as_str().to_string())
                .or_insert(0);
        }
        self
    }
}

#[derive(Debug, Serialize, FromRow)]
pub struct TopJob {
    pub job_id: Uuid,
    pub title: String,
    pub company_name: Option<String>,
    pub application_count: i64,
}

#[derive(Debug, Serialize)]
pub struct ProfessorDashboard {
    pub total_students: i64,
    pub students_with_resume: i64,
    pub students_applied: i64,
    pub applications_by_status: BTreeMap<String, i64>,
    pub top_jobs: Vec<TopJob>,
}

const STUDENT_SUMMARY_SELECT: &str = r#"
    SELECT u.id, u.email, u.full_name,
           s.student_code, s.faculty, s.major, s.year_of_study,
           (s.resume_key IS NOT NULL) AS has_resume,
           apps.total AS total_applications,
           apps.by_status AS applications_by_status,
           apps.last_applied_at
    FROM users u
    LEFT JOIN student_profiles s ON s.user_id = u.id
    CROSS JOIN LATERAL (
        SELECT COALESCE(SUM(g.n), 0)::BIGINT AS total,
               COALESCE(jsonb_object_agg(g.status, g.n), '{}'::jsonb) AS by_status,
               MAX(g.last_at) AS last_applied_at
        FROM (
            SELECT status, COUNT(*) AS n, MAX(created_at) AS last_at
            FROM applications
            WHERE student_id = u.id
            GROUP BY status
        ) g
    ) apps
"#;

fn push_student_filters<'a>(qb: &mut QueryBuilder<'a, Postgres>, q: &'a StudentSearchQuery) {
    qb.push(" WHERE u.role = 'student' AND u.deleted_at IS NULL");
    if let Some(search) = q.search.as_deref().filter(|s| !s.trim().is_empty()) {
        let pattern = like_pattern(search);
        qb.push(" AND (u.full_name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR u.email ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR s.student_code ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR s.major ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(faculty) = q.faculty.as_deref().filter(|s| !s.trim().is_empty()) {
        qb.push(" AND s.faculty ILIKE ").push_bind(like_pattern(faculty));
    }
    match q.has_resume {
        Some(true) => {
            qb.push(" AND s.resume_key IS NOT NULL");
        }
        Some(false) => {
            qb.push(" AND s.resume_key IS NULL");
        }
        None => {}
    }
}

/// GET /api/professor/students
pub async fn handle_list_students(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(q): Query<StudentSearchQuery>,
) -> Result<ApiResponse<Page<StudentSummary>>, AppError> {
    auth.require(&[Role::Professor, Role::Admin])?;
    let params = PageParams {
        page: q.page,
        page_size: q.page_size,
    };

    let mut select = QueryBuilder::new(STUDENT_SUMMARY_SELECT);
    push_student_filters(&mut select, &q);
    select
        .push(" ORDER BY u.full_name ASC LIMIT ")
        .push_bind(params.page_size())
        .push(" OFFSET ")
        .push_bind(params.offset());
    let items = select
        .build_query_as::<StudentSummary>()
        .fetch_all(&state.db)
        .await?
        .into_iter()
        .map(StudentSummary::fill_statuses)
        .collect();

    let mut count = QueryBuilder::new(
        "SELECT COUNT(*) FROM users u LEFT JOIN student_profiles s ON s.user_id = u.id",
    );
    push_student_filters(&mut count, &q);
    let total = count
        .build_query_scalar::<i64>()
        .fetch_one(&state.db)
        .await?;

    Ok(ApiResponse::ok("Students", Page::new(items, params, total)))
}

/// GET /api/professor/dashboard
pub async fn handle_professor_dashboard(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<ApiResponse<ProfessorDashboard>, AppError> {
    auth.require(&[Role::Professor, Role::Admin])?;

    let (total_students, students_with_resume, students_applied): (i64, i64, i64) = sqlx::query_as(
        r#"
        SELECT COUNT(*),
               COUNT(*) FILTER (WHERE s.resume_key IS NOT NULL),
               COUNT(*) FILTER (WHERE EXISTS (SELECT 1 FROM applications a WHERE a.student_id = u.id))
        FROM users u
        LEFT JOIN student_profiles s ON s.user_id = u.id
        WHERE u.role = 'student' AND u.deleted_at IS NULL
        "#,
    )
    .fetch_one(&state.db)
    .await?;

    let by_status = sqlx::query_as::<_, KeyCount>(
        "SELECT status AS key, COUNT(*) AS count FROM applications GROUP BY status",
    )
    .fetch_all(&state.db)
    .await?;

    let top_jobs = sqlx::query_as::<_, TopJob>(
        r#"
        SELECT j.id AS job_id, j.title, e.company_name, COUNT(a.id) AS application_count
        FROM jobs j
        JOIN applications a ON a.job_id = j.id
        LEFT JOIN employer_profiles e ON e.user_id = j.employer_id
        WHERE j.deleted_at IS NULL
        GROUP BY j.id, e.company_name
        ORDER BY application_count DESC, j.created_at DESC
        LIMIT 5
        "#,
    )
    .fetch_all(&state.db)
    .await?;

    Ok(ApiResponse::ok(
        "Professor dashboard",
        ProfessorDashboard {
            total_students,
            students_with_resume,
            students_applied,
            applications_by_status: zero_filled::<ApplicationStatus>(by_status),
            top_jobs,
        },
    ))
}
