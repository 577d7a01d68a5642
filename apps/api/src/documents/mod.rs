pub mod handlers;
pub mod upload;

use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::models::user::Role;
use crate::storage::StoredObject;

/// Who may download a student's résumé. `employer_has_link` is true when the
/// employer owns a job the student applied to.
pub fn can_view_resume(viewer: &AuthUser, student_id: Uuid, employer_has_link: bool) -> bool {
    match viewer.role {
        Role::Admin | Role::Professor => true,
        Role::Student => viewer.user_id == student_id,
        Role::Employer => employer_has_link,
    }
}

/// Strips characters that would break a quoted `Content-Disposition` filename.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !c.is_control() && !matches!(c, '"' | '\\' | '/' | ';'))
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        "resume".to_string()
    } else {
        cleaned.to_string()
    }
}

/// File download response with attachment disposition.
pub fn attachment(object: StoredObject, filename: &str) -> Response {
    let mut headers = HeaderMap::new();
    let content_type = HeaderValue::from_str(&object.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    headers.insert(header::CONTENT_TYPE, content_type);

    // Non-ASCII names fall back to the generic filename.
    let disposition = format!("attachment; filename=\"{}\"", sanitize_filename(filename));
    let disposition = HeaderValue::from_str(&disposition)
        .unwrap_or_else(|_| HeaderValue::from_static("attachment; filename=\"resume\""));
    headers.insert(header::CONTENT_DISPOSITION, disposition);

    (headers, object.bytes).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn viewer(role: Role) -> AuthUser {
        AuthUser {
            user_id: Uuid::new_v4(),
            role,
        }
    }

    #[test]
    fn test_owner_can_view_own_resume() {
        let me = viewer(Role::Student);
        assert!(can_view_resume(&me, me.user_id, false));
        assert!(!can_view_resume(&me, Uuid::new_v4(), false));
    }

    #[test]
    fn test_staff_can_view_any_resume() {
        assert!(can_view_resume(&viewer(Role::Admin), Uuid::new_v4(), false));
        assert!(can_view_resume(&viewer(Role::Professor), Uuid::new_v4(), false));
    }

    #[test]
    fn test_employer_needs_application_link() {
        let hr = viewer(Role::Employer);
        assert!(!can_view_resume(&hr, Uuid::new_v4(), false));
        assert!(can_view_resume(&hr, Uuid::new_v4(), true));
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("my \"cv\".pdf"), "my cv.pdf");
        assert_eq!(sanitize_filename("../../etc"), "....etc");
        assert_eq!(sanitize_filename("\n\r"), "resume");
    }

    #[test]
    fn test_attachment_headers() {
        let resp = attachment(
            StoredObject {
                bytes: Bytes::from_static(b"%PDF-1.7"),
                content_type: "application/pdf".into(),
            },
            "cv.pdf",
        );
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/pdf");
        assert_eq!(
            resp.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"cv.pdf\""
        );
    }
}
