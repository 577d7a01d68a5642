use std::collections::BTreeMap;

use serde::Serialize;
use sqlx::{FromRow, PgPool};

use crate::errors::AppError;
use crate::models::application::ApplicationStatus;
use crate::models::job::JobStatus;
use crate::models::user::{PublicUser, Role, UserRow, UserStatus};
use crate::models::TextEnum;

#[derive(Debug, Clone, FromRow)]
pub struct KeyCount {
    pub key: String,
    pub count: i64,
}

/// Turns grouped counts into a map holding every known key, zero-filled.
pub fn zero_filled<E: TextEnum>(rows: Vec<KeyCount>) -> BTreeMap<String, i64> {
    let mut map: BTreeMap<String, i64> = E::ALL
        .iter()
        .map(|v| (v.as_str().to_string(), 0))
        .collect();
    for row in rows {
        *map.entry(row.key).or_insert(0) += row.count;
    }
    map
}

#[derive(Debug, Serialize)]
pub struct AdminDashboard {
    pub users_by_role: BTreeMap<String, i64>,
    pub users_by_status: BTreeMap<String, i64>,
    pub jobs_by_status: BTreeMap<String, i64>,
    pub applications_by_status: BTreeMap<String, i64>,
    pub pending_approvals: i64,
    pub recent_users: Vec<PublicUser>,
}

async fn grouped(pool: &PgPool, sql: &str) -> Result<Vec<KeyCount>, AppError> {
    Ok(sqlx::query_as::<_, KeyCount>(sql).fetch_all(pool).await?)
}

pub async fn admin_dashboard(pool: &PgPool) -> Result<AdminDashboard, AppError> {
    let users_by_role = grouped(
        pool,
        "SELECT role AS key, COUNT(*) AS count FROM users WHERE deleted_at IS NULL GROUP BY role",
    )
    .await?;
    let users_by_status = grouped(
        pool,
        "SELECT status AS key, COUNT(*) AS count FROM users WHERE deleted_at IS NULL GROUP BY status",
    )
    .await?;
    let jobs_by_status = grouped(
        pool,
        "SELECT status AS key, COUNT(*) AS count FROM jobs WHERE deleted_at IS NULL GROUP BY status",
    )
    .await?;
    let applications_by_status = grouped(
        pool,
        "SELECT status AS key, COUNT(*) AS count FROM applications GROUP BY status",
    )
    .await?;

    let users_by_status = zero_filled::<UserStatus>(users_by_status);
    let pending_approvals = users_by_status
        .get(UserStatus::Pending.as_str())
        .copied()
        .unwrap_or(0);

    let recent_users = sqlx::query_as::<_, UserRow>(
        "SELECT * FROM users WHERE deleted_at IS NULL ORDER BY created_at DESC LIMIT 5",
    )
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(PublicUser::from)
    .collect();

    Ok(AdminDashboard {
        users_by_role: zero_filled::<Role>(users_by_role),
        users_by_status,
        jobs_by_status: zero_filled::<JobStatus>(jobs_by_status),
        applications_by_status: zero_filled::<ApplicationStatus>(applications_by_status),
        pending_approvals,
        recent_users,
    })
}
