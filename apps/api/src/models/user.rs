use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::TextEnum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Employer,
    Professor,
    Admin,
}

impl TextEnum for Role {
    const ALL: &'static [Self] = &[Role::Student, Role::Employer, Role::Professor, Role::Admin];

    fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Employer => "employer",
            Role::Professor => "professor",
            Role::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Pending,
    Approved,
    Rejected,
    Suspended,
}

impl TextEnum for UserStatus {
    const ALL: &'static [Self] = &[
        UserStatus::Pending,
        UserStatus::Approved,
        UserStatus::Rejected,
        UserStatus::Suspended,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Pending => "pending",
            UserStatus::Approved => "approved",
            UserStatus::Rejected => "rejected",
            UserStatus::Suspended => "suspended",
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub status: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub pdpa_consent_at: Option<DateTime<Utc>>,
    pub pdpa_consent_version: Option<String>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A user as exposed over the API. Never carries the password hash.
#[derive(Debug, Clone, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub role: String,
    pub status: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub pdpa_consent_at: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<UserRow> for PublicUser {
    fn from(u: UserRow) -> Self {
        Self {
            id: u.id,
            email: u.email,
            role: u.role,
            status: u.status,
            full_name: u.full_name,
            phone: u.phone,
            pdpa_consent_at: u.pdpa_consent_at,
            last_login_at: u.last_login_at,
            created_at: u.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StudentProfileRow {
    pub user_id: Uuid,
    pub student_code: Option<String>,
    pub faculty: Option<String>,
    pub major: Option<String>,
    pub year_of_study: Option<i16>,
    pub gpa: Option<f64>,
    #[serde(skip_serializing)]
    pub resume_key: Option<String>,
    pub resume_filename: Option<String>,
    pub resume_mime: Option<String>,
    pub resume_size: Option<i64>,
    pub resume_uploaded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EmployerProfileRow {
    pub user_id: Uuid,
    pub company_name: String,
    pub company_description: Option<String>,
    pub website: Option<String>,
    pub contact_phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProfessorProfileRow {
    pub user_id: Uuid,
    pub department: String,
    pub faculty: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoleProfile {
    Student(StudentProfileRow),
    Employer(EmployerProfileRow),
    Professor(ProfessorProfileRow),
}

#[derive(Debug, Clone, Serialize)]
pub struct UserWithProfile {
    #[serde(flatten)]
    pub user: PublicUser,
    pub profile: Option<RoleProfile>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trips_through_text() {
        for role in Role::ALL {
            assert_eq!(Role::parse(role.as_str()), Some(*role));
        }
        assert_eq!(Role::parse("hr"), None);
    }

    #[test]
    fn test_public_user_has_no_password_hash() {
        let now = Utc::now();
        let row = UserRow {
            id: Uuid::new_v4(),
            email: "a@uni.ac.th".into(),
            password_hash: "$2b$04$secret".into(),
            role: "student".into(),
            status: "approved".into(),
            full_name: "A".into(),
            phone: None,
            pdpa_consent_at: Some(now),
            pdpa_consent_version: Some("1.0".into()),
            last_login_at: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        let json = serde_json::to_string(&PublicUser::from(row)).unwrap();
        assert!(!json.contains("password"));
        assert!(!json.contains("secret"));
    }

    #[test]
    fn test_student_profile_hides_storage_key() {
        let p = StudentProfileRow {
            user_id: Uuid::new_v4(),
            student_code: Some("6512345".into()),
            faculty: None,
            major: None,
            year_of_study: Some(3),
            gpa: Some(3.2),
            resume_key: Some("resumes/x/y.pdf".into()),
            resume_filename: Some("cv.pdf".into()),
            resume_mime: Some("application/pdf".into()),
            resume_size: Some(1000),
            resume_uploaded_at: None,
        };
        let v = serde_json::to_value(RoleProfile::Student(p)).unwrap();
        assert_eq!(v["kind"], "student");
        assert!(v.get("resume_key").is_none());
        assert_eq!(v["resume_filename"], "cv.pdf");
    }
}
