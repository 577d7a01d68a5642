use axum::extract::State;
use chrono::Utc;
use serde::Deserialize;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use super::lifecycle::{check_transition, Actor};
use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::extract::{Json, Path};
use crate::jobs::{ensure_owner, find_job};
use crate::models::application::{
    Applicant, ApplicationRow, ApplicationStatus, ResumeMode, StudentApplication,
};
use crate::models::job::{JobResumeRow, JobRow};
use crate::models::user::{Role, StudentProfileRow};
use crate::models::TextEnum;
use crate::notifications::{kinds, notify, NewNotification};
use crate::profile::{find_student_profile, lock_student};
use crate::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct ApplyRequest {
    pub resume_mode: ResumeMode,
    #[validate(length(max = 5000, message = "must be at most 5000 characters"))]
    pub cover_letter: Option<String>,
    #[serde(default)]
    pub pdpa_consent: bool,
}

#[derive(Debug, Deserialize)]
pub struct StatusChangeRequest {
    pub status: ApplicationStatus,
}

/// Résumé file an application will point at.
#[derive(Debug, Clone, PartialEq)]
pub struct ChosenResume {
    pub key: String,
    pub filename: String,
    pub mime: String,
}

/// Picks the résumé for the requested mode, or explains what is missing.
pub fn choose_resume(
    mode: ResumeMode,
    profile: Option<&StudentProfileRow>,
    job_resume: Option<&JobResumeRow>,
) -> Result<ChosenResume, AppError> {
    match mode {
        ResumeMode::Profile => profile
            .and_then(|p| {
                p.resume_key.as_ref().map(|key| ChosenResume {
                    key: key.clone(),
                    filename: p.resume_filename.clone().unwrap_or_else(|| "resume".into()),
                    mime: p
                        .resume_mime
                        .clone()
                        .unwrap_or_else(|| "application/octet-stream".into()),
                })
            })
            .ok_or_else(|| {
                AppError::BadRequest("Upload a profile resume before applying".to_string())
            }),
        ResumeMode::JobSpecific => job_resume
            .map(|r| ChosenResume {
                key: r.file_key.clone(),
                filename: r.filename.clone(),
                mime: r.mime.clone(),
            })
            .ok_or_else(|| {
                AppError::BadRequest("Upload a resume for this job before applying".to_string())
            }),
    }
}

async fn find_application(pool: &PgPool, id: Uuid) -> Result<ApplicationRow, AppError> {
    sqlx::query_as::<_, ApplicationRow>("SELECT * FROM applications WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Application {id} not found")))
}

/// Only applies while the row still holds the status the transition was
/// checked against.
const SET_STATUS_SQL: &str = "UPDATE applications SET status = $2, updated_at = now() \
     WHERE id = $1 AND status = $3 RETURNING *";

async fn set_status(
    pool: &PgPool,
    id: Uuid,
    from: ApplicationStatus,
    to: ApplicationStatus,
) -> Result<ApplicationRow, AppError> {
    sqlx::query_as::<_, ApplicationRow>(SET_STATUS_SQL)
        .bind(id)
        .bind(to.as_str())
        .bind(from.as_str())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::Conflict("Application status changed concurrently".to_string()))
}

/// A job deleted since the application was made has nobody to notify.
fn job_to_notify(lookup: Result<JobRow, AppError>) -> Result<Option<JobRow>, AppError> {
    match lookup {
        Ok(job) => Ok(Some(job)),
        Err(AppError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// POST /api/jobs/:job_id/apply
pub async fn handle_apply(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(job_id): Path<Uuid>,
    Json(req): Json<ApplyRequest>,
) -> Result<ApiResponse<ApplicationRow>, AppError> {
    auth.require(&[Role::Student])?;
    req.validate()?;
    if !req.pdpa_consent {
        return Err(AppError::BadRequest(
            "Consent to share your resume with the employer (PDPA) is required".to_string(),
        ));
    }

    let job = find_job(&state.db, job_id).await?;
    if !job.accepts_applications(Utc::now().date_naive()) {
        return Err(AppError::BadRequest(
            "This job is no longer accepting applications".to_string(),
        ));
    }

    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM applications WHERE job_id = $1 AND student_id = $2)",
    )
    .bind(job_id)
    .bind(auth.user_id)
    .fetch_one(&state.db)
    .await?;
    if exists {
        return Err(AppError::Conflict(
            "You have already applied to this job".to_string(),
        ));
    }

    // The résumé read and the snapshot insert share the student lock, so a
    // concurrent replace cannot discard the key being snapshotted.
    let mut tx = state.db.begin().await?;
    lock_student(&mut *tx, auth.user_id).await?;
    let profile = find_student_profile(&mut *tx, auth.user_id).await?;
    let job_resume = sqlx::query_as::<_, JobResumeRow>(
        "SELECT * FROM job_resumes WHERE job_id = $1 AND student_id = $2",
    )
    .bind(job_id)
    .bind(auth.user_id)
    .fetch_optional(&mut *tx)
    .await?;
    let resume = choose_resume(req.resume_mode, profile.as_ref(), job_resume.as_ref())?;

    let application = sqlx::query_as::<_, ApplicationRow>(
        r#"
        INSERT INTO applications
            (id, job_id, student_id, status, cover_letter, resume_mode,
             resume_key, resume_filename, resume_mime, pdpa_consent_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now())
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(job_id)
    .bind(auth.user_id)
    .bind(ApplicationStatus::Pending.as_str())
    .bind(req.cover_letter.as_deref().map(str::trim).filter(|c| !c.is_empty()))
    .bind(req.resume_mode.as_str())
    .bind(&resume.key)
    .bind(&resume.filename)
    .bind(&resume.mime)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;

    let link = format!("/jobs/{job_id}/applications");
    notify(
        &state.db,
        NewNotification {
            user_id: job.employer_id,
            kind: kinds::NEW_APPLICATION,
            title: "New application",
            message: &format!("A student applied to \"{}\"", job.title),
            link: Some(&link),
        },
    )
    .await?;

    info!(
        "Student {} applied to job {job_id} ({})",
        auth.user_id,
        req.resume_mode.as_str()
    );
    Ok(ApiResponse::created("Application submitted", application))
}

/// GET /api/applications/mine
pub async fn handle_my_applications(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<ApiResponse<Vec<StudentApplication>>, AppError> {
    auth.require(&[Role::Student])?;
    let rows = sqlx::query_as::<_, StudentApplication>(
        r#"
        SELECT a.*, j.title AS job_title, e.company_name
        FROM applications a
        JOIN jobs j ON j.id = a.job_id
        LEFT JOIN employer_profiles e ON e.user_id = j.employer_id
        WHERE a.student_id = $1
        ORDER BY a.created_at DESC
        "#,
    )
    .bind(auth.user_id)
    .fetch_all(&state.db)
    .await?;
    Ok(ApiResponse::ok("Your applications", rows))
}

/// GET /api/jobs/:job_id/applications
pub async fn handle_job_applications(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(job_id): Path<Uuid>,
) -> Result<ApiResponse<Vec<Applicant>>, AppError> {
    let job = find_job(&state.db, job_id).await?;
    ensure_owner(&job, &auth)?;

    let rows = sqlx::query_as::<_, Applicant>(
        r#"
        SELECT a.*, u.full_name AS student_name, u.email AS student_email,
               s.student_code, s.major
        FROM applications a
        JOIN users u ON u.id = a.student_id
        LEFT JOIN student_profiles s ON s.user_id = a.student_id
        WHERE a.job_id = $1
        ORDER BY a.created_at ASC
        "#,
    )
    .bind(job_id)
    .fetch_all(&state.db)
    .await?;
    Ok(ApiResponse::ok("Applicants", rows))
}

/// PATCH /api/applications/:id/status
pub async fn handle_change_status(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<StatusChangeRequest>,
) -> Result<ApiResponse<ApplicationRow>, AppError> {
    let actor = Actor::for_role(auth.role).ok_or_else(AppError::forbidden)?;
    let application = find_application(&state.db, id).await?;
    let job = find_job(&state.db, application.job_id).await?;

    match actor {
        Actor::Applicant if application.student_id != auth.user_id => {
            return Err(AppError::forbidden())
        }
        Actor::Reviewer => ensure_owner(&job, &auth)?,
        Actor::Applicant => {}
    }

    let current = ApplicationStatus::parse_column(&application.status)?;
    check_transition(current, req.status, actor)?;
    let updated = set_status(&state.db, id, current, req.status).await?;

    let (recipient, kind, message) = match actor {
        Actor::Reviewer => (
            application.student_id,
            kinds::APPLICATION_STATUS,
            format!(
                "Your application for \"{}\" is now {}",
                job.title,
                req.status.as_str()
            ),
        ),
        Actor::Applicant => (
            job.employer_id,
            kinds::APPLICATION_STATUS,
            format!(
                "An applicant for \"{}\" changed their application to {}",
                job.title,
                req.status.as_str()
            ),
        ),
    };
    let link = format!("/applications/{id}");
    notify(
        &state.db,
        NewNotification {
            user_id: recipient,
            kind,
            title: "Application update",
            message: &message,
            link: Some(&link),
        },
    )
    .await?;

    info!(
        "Application {id}: {} -> {} by {}",
        current.as_str(),
        req.status.as_str(),
        auth.user_id
    );
    Ok(ApiResponse::ok("Application status updated", updated))
}

/// POST /api/applications/:id/withdraw
pub async fn handle_withdraw(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<ApplicationRow>, AppError> {
    auth.require(&[Role::Student])?;
    let application = find_application(&state.db, id).await?;
    if application.student_id != auth.user_id {
        return Err(AppError::forbidden());
    }

    let current = ApplicationStatus::parse_column(&application.status)?;
    check_transition(current, ApplicationStatus::Withdrawn, Actor::Applicant)?;
    let updated = set_status(&state.db, id, current, ApplicationStatus::Withdrawn).await?;

    if let Some(job) = job_to_notify(find_job(&state.db, application.job_id).await)? {
        notify(
            &state.db,
            NewNotification {
                user_id: job.employer_id,
                kind: kinds::APPLICATION_WITHDRAWN,
                title: "Application withdrawn",
                message: &format!("An applicant withdrew from \"{}\"", job.title),
                link: None,
            },
        )
        .await?;
    }

    info!("Student {} withdrew application {id}", auth.user_id);
    Ok(ApiResponse::ok("Application withdrawn", updated))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(with_resume: bool) -> StudentProfileRow {
        StudentProfileRow {
            user_id: Uuid::new_v4(),
            student_code: None,
            faculty: None,
            major: None,
            year_of_study: None,
            gpa: None,
            resume_key: with_resume.then(|| "resumes/s/a.pdf".to_string()),
            resume_filename: with_resume.then(|| "cv.pdf".to_string()),
            resume_mime: with_resume.then(|| "application/pdf".to_string()),
            resume_size: None,
            resume_uploaded_at: None,
        }
    }

    fn job_resume() -> JobResumeRow {
        let now = Utc::now();
        JobResumeRow {
            id: Uuid::new_v4(),
            job_id: Uuid::new_v4(),
            student_id: Uuid::new_v4(),
            file_key: "job-resumes/j/s/b.docx".into(),
            filename: "tailored.docx".into(),
            mime: "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
                .into(),
            size: 10,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_profile_mode_uses_profile_resume() {
        let p = profile(true);
        let jr = job_resume();
        let chosen = choose_resume(ResumeMode::Profile, Some(&p), Some(&jr)).unwrap();
        assert_eq!(chosen.key, "resumes/s/a.pdf");
        assert_eq!(chosen.filename, "cv.pdf");
    }

    #[test]
    fn test_profile_mode_without_resume_is_400() {
        let p = profile(false);
        let err = choose_resume(ResumeMode::Profile, Some(&p), None).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert!(choose_resume(ResumeMode::Profile, None, None).is_err());
    }

    #[test]
    fn test_job_specific_mode() {
        let jr = job_resume();
        let chosen = choose_resume(ResumeMode::JobSpecific, Some(&profile(true)), Some(&jr)).unwrap();
        assert_eq!(chosen.key, "job-resumes/j/s/b.docx");
        assert!(choose_resume(ResumeMode::JobSpecific, Some(&profile(true)), None).is_err());
    }

    #[test]
    fn test_apply_request_parsing() {
        let req: ApplyRequest = serde_json::from_value(serde_json::json!({
            "resume_mode": "job_specific",
            "cover_letter": "Hello"
        }))
        .unwrap();
        assert_eq!(req.resume_mode, ResumeMode::JobSpecific);
        assert!(!req.pdpa_consent);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_cover_letter_limit() {
        let req = ApplyRequest {
            resume_mode: ResumeMode::Profile,
            cover_letter: Some("x".repeat(5001)),
            pdpa_consent: true,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_status_update_guards_on_current_status() {
        assert!(SET_STATUS_SQL.contains("WHERE id = $1 AND status = $3"));
    }

    #[test]
    fn test_job_to_notify() {
        let job = crate::models::job::sample_job(Uuid::new_v4());
        let id = job.id;
        assert_eq!(job_to_notify(Ok(job)).unwrap().map(|j| j.id), Some(id));
        assert!(job_to_notify(Err(AppError::NotFound("gone".into())))
            .unwrap()
            .is_none());
        assert!(matches!(
            job_to_notify(Err(AppError::Database(sqlx::Error::PoolTimedOut))),
            Err(AppError::Database(_))
        ));
    }
}
