use axum::{
    extract::State,
    response::Response,
};
use sqlx::{PgExecutor, PgPool};
use tracing::{info, warn};
use uuid::Uuid;

use super::upload::{read_file_field, validate_upload, DocumentKind, UploadedFile};
use super::{attachment, can_view_resume};
use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::extract::{MultipartForm, Path};
use crate::jobs::find_job;
use crate::models::application::ApplicationRow;
use crate::models::job::JobResumeRow;
use crate::models::user::{Role, StudentProfileRow};
use crate::profile::{find_student_profile, lock_student};
use crate::response::ApiResponse;
use crate::state::AppState;

fn profile_resume_key(student_id: Uuid, kind: DocumentKind) -> String {
    format!("resumes/{student_id}/{}.{}", Uuid::new_v4(), kind.extension())
}

fn job_resume_key(job_id: Uuid, student_id: Uuid, kind: DocumentKind) -> String {
    format!(
        "job-resumes/{job_id}/{student_id}/{}.{}",
        Uuid::new_v4(),
        kind.extension()
    )
}

async fn employer_has_applicant(
    pool: &PgPool,
    employer_id: Uuid,
    student_id: Uuid,
) -> Result<bool, AppError> {
    Ok(sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM applications a
            JOIN jobs j ON j.id = a.job_id
            WHERE a.student_id = $1 AND j.employer_id = $2
        )
        "#,
    )
    .bind(student_id)
    .bind(employer_id)
    .fetch_one(pool)
    .await?)
}

async fn key_referenced_by_application<'e, E: PgExecutor<'e>>(
    executor: E,
    key: &str,
) -> Result<bool, AppError> {
    Ok(
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM applications WHERE resume_key = $1)")
            .bind(key)
            .fetch_one(executor)
            .await?,
    )
}

async fn has_applied<'e, E: PgExecutor<'e>>(
    executor: E,
    job_id: Uuid,
    student_id: Uuid,
) -> Result<bool, AppError> {
    Ok(sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM applications WHERE job_id = $1 AND student_id = $2)",
    )
    .bind(job_id)
    .bind(student_id)
    .fetch_one(executor)
    .await?)
}

/// Removes a stored object unless an application still points at it.
/// Call only after the transaction that unlinked the key has committed
/// under the student lock: any application snapshotting it is then visible.
/// Storage failures are logged; the database is already consistent.
async fn discard_object(state: &AppState, key: &str) -> Result<(), AppError> {
    if key_referenced_by_application(&state.db, key).await? {
        info!("Keeping {key}: referenced by an application");
        return Ok(());
    }
    if let Err(e) = state.storage.delete(key).await {
        warn!("Failed to delete stored object {key}: {e}");
    }
    Ok(())
}

async fn store_validated(
    state: &AppState,
    multipart: axum::extract::Multipart,
) -> Result<(UploadedFile, DocumentKind), AppError> {
    let file = read_file_field(multipart).await?;
    let kind = validate_upload(&file, state.config.max_upload_bytes)?;
    Ok((file, kind))
}

/// Points the profile at `key` and returns the key it replaced.
async fn replace_profile_resume(
    pool: &PgPool,
    student_id: Uuid,
    key: &str,
    file: &UploadedFile,
    kind: DocumentKind,
) -> Result<(StudentProfileRow, Option<String>), AppError> {
    let mut tx = pool.begin().await?;
    lock_student(&mut *tx, student_id).await?;
    let previous = find_student_profile(&mut *tx, student_id)
        .await?
        .and_then(|p| p.resume_key);

    let saved = sqlx::query_as::<_, StudentProfileRow>(
        r#"
        INSERT INTO student_profiles
            (user_id, resume_key, resume_filename, resume_mime, resume_size, resume_uploaded_at)
        VALUES ($1, $2, $3, $4, $5, now())
        ON CONFLICT (user_id) DO UPDATE
        SET resume_key = EXCLUDED.resume_key,
            resume_filename = EXCLUDED.resume_filename,
            resume_mime = EXCLUDED.resume_mime,
            resume_size = EXCLUDED.resume_size,
            resume_uploaded_at = EXCLUDED.resume_uploaded_at
        RETURNING *
        "#,
    )
    .bind(student_id)
    .bind(key)
    .bind(&file.filename)
    .bind(kind.mime())
    .bind(file.size())
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok((saved, previous))
}

/// POST /api/documents/resume
pub async fn handle_upload_profile_resume(
    State(state): State<AppState>,
    auth: AuthUser,
    MultipartForm(multipart): MultipartForm,
) -> Result<ApiResponse<StudentProfileRow>, AppError> {
    auth.require(&[Role::Student])?;
    let (file, kind) = store_validated(&state, multipart).await?;

    let key = profile_resume_key(auth.user_id, kind);
    state.storage.put(&key, file.bytes.clone(), kind.mime()).await?;

    let (saved, previous_key) =
        match replace_profile_resume(&state.db, auth.user_id, &key, &file, kind).await {
            Ok(replaced) => replaced,
            Err(e) => {
                // Don't leave an orphaned object behind.
                if let Err(se) = state.storage.delete(&key).await {
                    warn!("Failed to roll back upload {key}: {se}");
                }
                return Err(e);
            }
        };

    if let Some(old_key) = previous_key {
        discard_object(&state, &old_key).await?;
    }

    info!(
        "Student {} uploaded profile resume ({} bytes)",
        auth.user_id,
        file.size()
    );
    Ok(ApiResponse::created("Resume uploaded", saved))
}

/// GET /api/documents/resume/:user_id/download
pub async fn handle_download_resume(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(student_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let employer_link = auth.role == Role::Employer
        && employer_has_applicant(&state.db, auth.user_id, student_id).await?;
    if !can_view_resume(&auth, student_id, employer_link) {
        return Err(AppError::forbidden());
    }

    let profile = find_student_profile(&state.db, student_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Student not found".to_string()))?;
    let (key, filename) = match (profile.resume_key, profile.resume_filename) {
        (Some(k), Some(f)) => (k, f),
        (Some(k), None) => (k, "resume".to_string()),
        _ => return Err(AppError::NotFound("Student has no resume".to_string())),
    };

    let object = state.storage.get(&key).await?;
    info!("User {} downloaded resume of {student_id}", auth.user_id);
    Ok(attachment(object, &filename))
}

/// DELETE /api/documents/resume
pub async fn handle_delete_profile_resume(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<ApiResponse<()>, AppError> {
    auth.require(&[Role::Student])?;
    let mut tx = state.db.begin().await?;
    lock_student(&mut *tx, auth.user_id).await?;
    let key = find_student_profile(&mut *tx, auth.user_id)
        .await?
        .and_then(|p| p.resume_key)
        .ok_or_else(|| AppError::NotFound("No resume on file".to_string()))?;

    sqlx::query(
        r#"
        UPDATE student_profiles
        SET resume_key = NULL, resume_filename = NULL, resume_mime = NULL,
            resume_size = NULL, resume_uploaded_at = NULL
        WHERE user_id = $1
        "#,
    )
    .bind(auth.user_id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    discard_object(&state, &key).await?;
    Ok(ApiResponse::message("Resume deleted"))
}

async fn find_job_resume<'e, E: PgExecutor<'e>>(
    executor: E,
    job_id: Uuid,
    student_id: Uuid,
) -> Result<Option<JobResumeRow>, AppError> {
    Ok(sqlx::query_as::<_, JobResumeRow>(
        "SELECT * FROM job_resumes WHERE job_id = $1 AND student_id = $2",
    )
    .bind(job_id)
    .bind(student_id)
    .fetch_optional(executor)
    .await?)
}

fn already_applied_error() -> AppError {
    AppError::Conflict("You have already applied to this job".to_string())
}

/// Points the student's résumé for `job_id` at `key` and returns the key it
/// replaced. Refused once the student has applied to the job.
async fn replace_job_resume(
    pool: &PgPool,
    job_id: Uuid,
    student_id: Uuid,
    key: &str,
    file: &UploadedFile,
    kind: DocumentKind,
) -> Result<(JobResumeRow, Option<String>), AppError> {
    let mut tx = pool.begin().await?;
    lock_student(&mut *tx, student_id).await?;
    if has_applied(&mut *tx, job_id, student_id).await? {
        return Err(already_applied_error());
    }
    let previous = find_job_resume(&mut *tx, job_id, student_id)
        .await?
        .map(|r| r.file_key);

    let saved = sqlx::query_as::<_, JobResumeRow>(
        r#"
        INSERT INTO job_resumes (id, job_id, student_id, file_key, filename, mime, size)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (job_id, student_id) DO UPDATE
        SET file_key = EXCLUDED.file_key,
            filename = EXCLUDED.filename,
            mime = EXCLUDED.mime,
            size = EXCLUDED.size,
            updated_at = now()
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(job_id)
    .bind(student_id)
    .bind(key)
    .bind(&file.filename)
    .bind(kind.mime())
    .bind(file.size())
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok((saved, previous))
}

/// POST /api/jobs/:job_id/resume
pub async fn handle_upload_job_resume(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(job_id): Path<Uuid>,
    MultipartForm(multipart): MultipartForm,
) -> Result<ApiResponse<JobResumeRow>, AppError> {
    auth.require(&[Role::Student])?;
    find_job(&state.db, job_id).await?;

    if has_applied(&state.db, job_id, auth.user_id).await? {
        return Err(already_applied_error());
    }

    let (file, kind) = store_validated(&state, multipart).await?;
    let key = job_resume_key(job_id, auth.user_id, kind);
    state.storage.put(&key, file.bytes.clone(), kind.mime()).await?;

    let (saved, previous_key) =
        match replace_job_resume(&state.db, job_id, auth.user_id, &key, &file, kind).await {
            Ok(replaced) => replaced,
            Err(e) => {
                if let Err(se) = state.storage.delete(&key).await {
                    warn!("Failed to roll back upload {key}: {se}");
                }
                return Err(e);
            }
        };

    if let Some(old_key) = previous_key {
        discard_object(&state, &old_key).await?;
    }

    info!("Student {} uploaded resume for job {job_id}", auth.user_id);
    Ok(ApiResponse::created("Job resume uploaded", saved))
}

/// GET /api/jobs/:job_id/resume
pub async fn handle_get_job_resume(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(job_id): Path<Uuid>,
) -> Result<ApiResponse<JobResumeRow>, AppError> {
    auth.require(&[Role::Student])?;
    let row = find_job_resume(&state.db, job_id, auth.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("No resume uploaded for this job".to_string()))?;
    Ok(ApiResponse::ok("Job resume", row))
}

/// DELETE /api/jobs/:job_id/resume
pub async fn handle_delete_job_resume(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(job_id): Path<Uuid>,
) -> Result<ApiResponse<()>, AppError> {
    auth.require(&[Role::Student])?;
    let mut tx = state.db.begin().await?;
    lock_student(&mut *tx, auth.user_id).await?;
    let row = find_job_resume(&mut *tx, job_id, auth.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("No resume uploaded for this job".to_string()))?;

    if key_referenced_by_application(&mut *tx, &row.file_key).await? {
        return Err(AppError::Conflict(
            "Resume is attached to a submitted application".to_string(),
        ));
    }

    sqlx::query("DELETE FROM job_resumes WHERE id = $1")
        .bind(row.id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    if let Err(e) = state.storage.delete(&row.file_key).await {
        warn!("Failed to delete stored object {}: {e}", row.file_key);
    }
    Ok(ApiResponse::message("Job resume deleted"))
}

/// GET /api/applications/:id/resume
pub async fn handle_download_application_resume(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(application_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let application = sqlx::query_as::<_, ApplicationRow>("SELECT * FROM applications WHERE id = $1")
        .bind(application_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Application {application_id} not found")))?;

    let allowed = match auth.role {
        Role::Admin | Role::Professor => true,
        Role::Student => application.student_id == auth.user_id,
        Role::Employer => {
            let job = find_job(&state.db, application.job_id).await?;
            job.employer_id == auth.user_id
        }
    };
    if !allowed {
        return Err(AppError::forbidden());
    }

    let object = state.storage.get(&application.resume_key).await?;
    Ok(attachment(object, &application.resume_filename))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_scoped_and_valid() {
        let student = Uuid::new_v4();
        let job = Uuid::new_v4();

        let k = profile_resume_key(student, DocumentKind::Pdf);
        assert!(k.starts_with(&format!("resumes/{student}/")));
        assert!(k.ends_with(".pdf"));
        assert!(crate::storage::validate_key(&k).is_ok());

        let k = job_resume_key(job, student, DocumentKind::Docx);
        assert!(k.starts_with(&format!("job-resumes/{job}/{student}/")));
        assert!(k.ends_with(".docx"));
        assert!(crate::storage::validate_key(&k).is_ok());
    }

    #[test]
    fn test_keys_are_unique_per_upload() {
        let student = Uuid::new_v4();
        assert_ne!(
            profile_resume_key(student, DocumentKind::Pdf),
            profile_resume_key(student, DocumentKind::Pdf)
        );
    }
}
