use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::TextEnum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    Reviewing,
    Interview,
    Offered,
    Accepted,
    Rejected,
    Withdrawn,
}

impl TextEnum for ApplicationStatus {
    const ALL: &'static [Self] = &[
        ApplicationStatus::Pending,
        ApplicationStatus::Reviewing,
        ApplicationStatus::Interview,
        ApplicationStatus::Offered,
        ApplicationStatus::Accepted,
        ApplicationStatus::Rejected,
        ApplicationStatus::Withdrawn,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Reviewing => "reviewing",
            ApplicationStatus::Interview => "interview",
            ApplicationStatus::Offered => "offered",
            ApplicationStatus::Accepted => "accepted",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Withdrawn => "withdrawn",
        }
    }
}

/// Which résumé an application carries: the student's profile résumé or one
/// uploaded for this specific job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumeMode {
    Profile,
    JobSpecific,
}

impl TextEnum for ResumeMode {
    const ALL: &'static [Self] = &[ResumeMode::Profile, ResumeMode::JobSpecific];

    fn as_str(&self) -> &'static str {
        match self {
            ResumeMode::Profile => "profile",
            ResumeMode::JobSpecific => "job_specific",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ApplicationRow {
    pub id: Uuid,
    pub job_id: Uuid,
    pub student_id: Uuid,
    pub status: String,
    pub cover_letter: Option<String>,
    pub resume_mode: String,
    #[serde(skip_serializing)]
    pub resume_key: String,
    pub resume_filename: String,
    pub resume_mime: String,
    pub pdpa_consent_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A student's application with the job it targets.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct StudentApplication {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub application: ApplicationRow,
    pub job_title: String,
    pub company_name: Option<String>,
}

/// An application as seen by the job owner.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Applicant {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub application: ApplicationRow,
    pub student_name: String,
    pub student_email: String,
    pub student_code: Option<String>,
    pub major: Option<String>,
}
