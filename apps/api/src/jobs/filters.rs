use serde::Deserialize;
use sqlx::{Postgres, QueryBuilder};
use validator::Validate;

use super::normalize_tags;
use crate::models::job::{JobStatus, JobType, WorkMode};
use crate::models::TextEnum;
use crate::response::PageParams;

const LISTING_SELECT: &str = r#"
    SELECT j.*, e.company_name
    FROM jobs j
    LEFT JOIN employer_profiles e ON e.user_id = j.employer_id
"#;

const LISTING_COUNT: &str = r#"
    SELECT COUNT(*)
    FROM jobs j
    LEFT JOIN employer_profiles e ON e.user_id = j.employer_id
"#;

/// Body of `POST /api/job/list`.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct JobListFilter {
    #[validate(length(max = 200))]
    pub search: Option<String>,
    pub job_type: Option<JobType>,
    pub work_mode: Option<WorkMode>,
    #[validate(length(max = 200))]
    pub location: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub include_closed: bool,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

impl JobListFilter {
    pub fn page_params(&self) -> PageParams {
        PageParams {
            page: self.page,
            page_size: self.page_size,
        }
    }
}

/// Escapes LIKE wildcards so user input matches literally.
pub fn like_pattern(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len() + 2);
    escaped.push('%');
    for c in input.trim().chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn push_where<'a>(qb: &mut QueryBuilder<'a, Postgres>, filter: &'a JobListFilter) {
    qb.push(" WHERE j.deleted_at IS NULL");

    if !filter.include_closed {
        qb.push(" AND j.status = ")
            .push_bind(JobStatus::Open.as_str());
    }

    if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
        let pattern = like_pattern(search);
        qb.push(" AND (j.title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR j.description ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR e.company_name ILIKE ")
            .push_bind(pattern)
            .push(")");
    }

    if let Some(job_type) = filter.job_type {
        qb.push(" AND j.job_type = ").push_bind(job_type.as_str());
    }

    if let Some(work_mode) = filter.work_mode {
        qb.push(" AND j.work_mode = ").push_bind(work_mode.as_str());
    }

    if let Some(location) = filter.location.as_deref().filter(|s| !s.trim().is_empty()) {
        qb.push(" AND j.location ILIKE ")
            .push_bind(like_pattern(location));
    }

    let tags = normalize_tags(&filter.tags);
    if !tags.is_empty() {
        qb.push(" AND j.tags && ").push_bind(tags);
    }
}

pub fn listing_query(filter: &JobListFilter) -> QueryBuilder<'_, Postgres> {
    let params = filter.page_params();
    let mut qb = QueryBuilder::new(LISTING_SELECT);
    push_where(&mut qb, filter);
    qb.push(" ORDER BY j.created_at DESC LIMIT ")
        .push_bind(params.page_size())
        .push(" OFFSET ")
        .push_bind(params.offset());
    qb
}

pub fn count_query(filter: &JobListFilter) -> QueryBuilder<'_, Postgres> {
    let mut qb = QueryBuilder::new(LISTING_COUNT);
    push_where(&mut qb, filter);
    qb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("rust"), "%rust%");
        assert_eq!(like_pattern(" 100%_off\\ "), "%100\\%\\_off\\\\%");
    }

    #[test]
    fn test_default_filter_only_open_jobs() {
        let filter = JobListFilter::default();
        let qb = listing_query(&filter);
        let sql = qb.sql();
        assert!(sql.contains("j.deleted_at IS NULL"));
        assert!(sql.contains("j.status = $1"));
        assert!(sql.contains("ORDER BY j.created_at DESC LIMIT $2 OFFSET $3"));
        assert!(!sql.contains("ILIKE"));
    }

    #[test]
    fn test_all_filters_bind_in_order() {
        let filter = JobListFilter {
            search: Some("backend".into()),
            job_type: Some(JobType::Internship),
            work_mode: Some(WorkMode::Remote),
            location: Some("Chiang Mai".into()),
            tags: vec!["Rust".into()],
            include_closed: true,
            page: Some(2),
            page_size: Some(10),
        };
        let qb = count_query(&filter);
        let sql = qb.sql();
        assert!(!sql.contains("j.status ="));
        assert!(sql.contains("j.title ILIKE $1 OR j.description ILIKE $2 OR e.company_name ILIKE $3"));
        assert!(sql.contains("j.job_type = $4"));
        assert!(sql.contains("j.work_mode = $5"));
        assert!(sql.contains("j.location ILIKE $6"));
        assert!(sql.contains("j.tags && $7"));
    }

    #[test]
    fn test_blank_search_is_ignored() {
        let filter = JobListFilter {
            search: Some("   ".into()),
            ..Default::default()
        };
        assert!(!count_query(&filter).sql().contains("ILIKE"));
    }

    #[test]
    fn test_filter_deserializes_from_body() {
        let filter: JobListFilter = serde_json::from_value(serde_json::json!({
            "job_type": "part_time",
            "tags": ["design"],
            "page": 3
        }))
        .unwrap();
        assert_eq!(filter.job_type, Some(JobType::PartTime));
        assert_eq!(filter.page_params().page(), 3);
        assert!(!filter.include_closed);
    }
}
