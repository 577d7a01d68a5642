pub mod filters;
pub mod handlers;

use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::models::job::JobRow;

/// Loads a job that has not been soft-deleted.
pub async fn find_job(pool: &PgPool, job_id: Uuid) -> Result<JobRow, AppError> {
    sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = $1 AND deleted_at IS NULL")
        .bind(job_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Job {job_id} not found")))
}

/// Only the posting employer or an admin may change a job.
pub fn ensure_owner(job: &JobRow, auth: &AuthUser) -> Result<(), AppError> {
    if auth.is_admin() || job.employer_id == auth.user_id {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "Only the job owner can modify this job".to_string(),
        ))
    }
}

/// Cross-field checks shared by create and update.
pub fn check_job_rules(
    salary_min: Option<i32>,
    salary_max: Option<i32>,
    deadline: Option<NaiveDate>,
    today: NaiveDate,
) -> Result<(), AppError> {
    if let (Some(min), Some(max)) = (salary_min, salary_max) {
        if min > max {
            return Err(AppError::Validation(
                "salary_min: must not exceed salary_max".to_string(),
            ));
        }
    }
    if let Some(d) = deadline {
        if d < today {
            return Err(AppError::Validation(
                "application_deadline: must not be in the past".to_string(),
            ));
        }
    }
    Ok(())
}

/// Lowercased, trimmed, de-duplicated tags.
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = tags
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::sample_job;
    use crate::models::user::Role;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_non_owner_gets_403() {
        let owner = Uuid::new_v4();
        let job = sample_job(owner);
        let other = AuthUser {
            user_id: Uuid::new_v4(),
            role: Role::Employer,
        };
        let err = ensure_owner(&job, &other).unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_owner_and_admin_allowed() {
        let owner = Uuid::new_v4();
        let job = sample_job(owner);
        assert!(ensure_owner(
            &job,
            &AuthUser {
                user_id: owner,
                role: Role::Employer
            }
        )
        .is_ok());
        assert!(ensure_owner(
            &job,
            &AuthUser {
                user_id: Uuid::new_v4(),
                role: Role::Admin
            }
        )
        .is_ok());
    }

    #[test]
    fn test_salary_range_rule() {
        let today = day(2026, 1, 1);
        assert!(check_job_rules(Some(100), Some(50), None, today).is_err());
        assert!(check_job_rules(Some(50), Some(50), None, today).is_ok());
        assert!(check_job_rules(None, Some(50), None, today).is_ok());
    }

    #[test]
    fn test_deadline_rule() {
        let today = day(2026, 1, 10);
        assert!(check_job_rules(None, None, Some(day(2026, 1, 9)), today).is_err());
        assert!(check_job_rules(None, None, Some(day(2026, 1, 10)), today).is_ok());
    }

    #[test]
    fn test_normalize_tags() {
        let tags = vec![" Rust ".to_string(), "rust".into(), "".into(), "SQL".into()];
        assert_eq!(normalize_tags(&tags), vec!["rust", "sql"]);
    }
}
