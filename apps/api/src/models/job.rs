use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::TextEnum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    FullTime,
    PartTime,
    Internship,
    Contract,
}

impl TextEnum for JobType {
    const ALL: &'static [Self] = &[
        JobType::FullTime,
        JobType::PartTime,
        JobType::Internship,
        JobType::Contract,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            JobType::FullTime => "full_time",
            JobType::PartTime => "part_time",
            JobType::Internship => "internship",
            JobType::Contract => "contract",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkMode {
    OnSite,
    Remote,
    Hybrid,
}

impl TextEnum for WorkMode {
    const ALL: &'static [Self] = &[WorkMode::OnSite, WorkMode::Remote, WorkMode::Hybrid];

    fn as_str(&self) -> &'static str {
        match self {
            WorkMode::OnSite => "on_site",
            WorkMode::Remote => "remote",
            WorkMode::Hybrid => "hybrid",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Open,
    Closed,
}

impl TextEnum for JobStatus {
    const ALL: &'static [Self] = &[JobStatus::Open, JobStatus::Closed];

    fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Open => "open",
            JobStatus::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JobRow {
    pub id: Uuid,
    pub employer_id: Uuid,
    pub title: String,
    pub description: String,
    pub location: Option<String>,
    pub job_type: String,
    pub work_mode: String,
    pub salary_min: Option<i32>,
    pub salary_max: Option<i32>,
    pub requirements: Vec<String>,
    pub tags: Vec<String>,
    pub application_deadline: Option<NaiveDate>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl JobRow {
    /// A job accepts applications while open and on or before its deadline.
    pub fn accepts_applications(&self, today: NaiveDate) -> bool {
        self.status == JobStatus::Open.as_str()
            && self.deleted_at.is_none()
            && self.application_deadline.map_or(true, |d| today <= d)
    }
}

/// Job listing row joined with the employer's company name.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct JobListing {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub job: JobRow,
    pub company_name: Option<String>,
}

/// An employer's own job with its application count.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct EmployerJob {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub job: JobRow,
    pub application_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JobResumeRow {
    pub id: Uuid,
    pub job_id: Uuid,
    pub student_id: Uuid,
    #[serde(skip_serializing)]
    pub file_key: String,
    pub filename: String,
    pub mime: String,
    pub size: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
pub(crate) fn sample_job(employer_id: Uuid) -> JobRow {
    let now = Utc::now();
    JobRow {
        id: Uuid::new_v4(),
        employer_id,
        title: "Backend Intern".into(),
        description: "Build APIs".into(),
        location: Some("Bangkok".into()),
        job_type: "internship".into(),
        work_mode: "hybrid".into(),
        salary_min: Some(15000),
        salary_max: Some(20000),
        requirements: vec![],
        tags: vec!["rust".into()],
        application_deadline: None,
        status: "open".into(),
        created_at: now,
        updated_at: now,
        deleted_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_open_job_without_deadline_accepts() {
        let job = sample_job(Uuid::new_v4());
        assert!(job.accepts_applications(day(2030, 1, 1)));
    }

    #[test]
    fn test_deadline_day_is_inclusive() {
        let mut job = sample_job(Uuid::new_v4());
        job.application_deadline = Some(day(2026, 5, 31));
        assert!(job.accepts_applications(day(2026, 5, 31)));
        assert!(!job.accepts_applications(day(2026, 6, 1)));
    }

    #[test]
    fn test_closed_or_deleted_job_rejects() {
        let mut job = sample_job(Uuid::new_v4());
        job.status = "closed".into();
        assert!(!job.accepts_applications(day(2026, 1, 1)));

        let mut job = sample_job(Uuid::new_v4());
        job.deleted_at = Some(Utc::now());
        assert!(!job.accepts_applications(day(2026, 1, 1)));
    }

    #[test]
    fn test_job_type_parse() {
        assert_eq!(JobType::parse("part_time"), Some(JobType::PartTime));
        assert_eq!(JobType::parse("gig"), None);
    }
}
