use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::user::Role;
use super::TextEnum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    All,
    Student,
    Employer,
    Professor,
}

impl TextEnum for Audience {
    const ALL: &'static [Self] = &[
        Audience::All,
        Audience::Student,
        Audience::Employer,
        Audience::Professor,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            Audience::All => "all",
            Audience::Student => "student",
            Audience::Employer => "employer",
            Audience::Professor => "professor",
        }
    }
}

impl Audience {
    /// Audiences visible to a role. `None` means every audience.
    pub fn visible_to(role: Role) -> Option<Vec<&'static str>> {
        let own = match role {
            Role::Admin => return None,
            Role::Student => Audience::Student,
            Role::Employer => Audience::Employer,
            Role::Professor => Audience::Professor,
        };
        Some(vec![Audience::All.as_str(), own.as_str()])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Normal,
    High,
}

impl TextEnum for Priority {
    const ALL: &'static [Self] = &[Priority::Normal, Priority::High];

    fn as_str(&self) -> &'static str {
        match self {
            Priority::Normal => "normal",
            Priority::High => "high",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AnnouncementRow {
    pub id: Uuid,
    pub author_id: Uuid,
    pub title: String,
    pub body: String,
    pub audience: String,
    pub priority: String,
    pub published: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_student_sees_all_and_student() {
        assert_eq!(
            Audience::visible_to(Role::Student),
            Some(vec!["all", "student"])
        );
    }

    #[test]
    fn test_admin_sees_everything() {
        assert_eq!(Audience::visible_to(Role::Admin), None);
    }
}
