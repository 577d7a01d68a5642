use crate::errors::AppError;
use crate::models::application::ApplicationStatus;
use crate::models::user::Role;
use crate::models::TextEnum;

use ApplicationStatus::*;

/// Who is asking for a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    /// The student who submitted the application.
    Applicant,
    /// The job owner or an admin.
    Reviewer,
}

impl Actor {
    pub fn for_role(role: Role) -> Option<Self> {
        match role {
            Role::Student => Some(Actor::Applicant),
            Role::Employer | Role::Admin => Some(Actor::Reviewer),
            Role::Professor => None,
        }
    }
}

pub fn is_terminal(status: ApplicationStatus) -> bool {
    matches!(status, Accepted | Rejected | Withdrawn)
}

fn reachable(from: ApplicationStatus, to: ApplicationStatus) -> bool {
    if to == Withdrawn {
        return !is_terminal(from);
    }
    matches!(
        (from, to),
        (Pending, Reviewing)
            | (Pending, Rejected)
            | (Reviewing, Interview)
            | (Reviewing, Rejected)
            | (Interview, Offered)
            | (Interview, Rejected)
            | (Offered, Accepted)
            | (Offered, Rejected)
    )
}

fn actor_may_set(actor: Actor, to: ApplicationStatus) -> bool {
    match actor {
        Actor::Applicant => matches!(to, Withdrawn | Accepted),
        Actor::Reviewer => !matches!(to, Withdrawn | Accepted | Pending),
    }
}

/// Validates a status change. Role violations are 403, impossible moves 409.
pub fn check_transition(
    from: ApplicationStatus,
    to: ApplicationStatus,
    actor: Actor,
) -> Result<(), AppError> {
    if !actor_may_set(actor, to) {
        return Err(AppError::Forbidden(format!(
            "Not allowed to set application status to '{}'",
            to.as_str()
        )));
    }
    if !reachable(from, to) {
        return Err(AppError::Conflict(format!(
            "Cannot change application status from '{}' to '{}'",
            from.as_str(),
            to.as_str()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_reviewer_happy_path() {
        let path = [Pending, Reviewing, Interview, Offered];
        for pair in path.windows(2) {
            assert!(check_transition(pair[0], pair[1], Actor::Reviewer).is_ok());
        }
        assert!(check_transition(Offered, Accepted, Actor::Applicant).is_ok());
    }

    #[test]
    fn test_reviewer_can_reject_from_any_open_state() {
        for from in [Pending, Reviewing, Interview, Offered] {
            assert!(check_transition(from, Rejected, Actor::Reviewer).is_ok());
        }
    }

    #[test]
    fn test_applicant_withdraws_until_terminal() {
        for from in [Pending, Reviewing, Interview, Offered] {
            assert!(check_transition(from, Withdrawn, Actor::Applicant).is_ok());
        }
        for from in [Accepted, Rejected, Withdrawn] {
            let err = check_transition(from, Withdrawn, Actor::Applicant).unwrap_err();
            assert_eq!(err.status_code(), StatusCode::CONFLICT);
        }
    }

    #[test]
    fn test_skipping_steps_is_a_conflict() {
        let err = check_transition(Pending, Offered, Actor::Reviewer).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_role_limits_are_forbidden() {
        let err = check_transition(Pending, Reviewing, Actor::Applicant).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
        let err = check_transition(Offered, Accepted, Actor::Reviewer).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
        let err = check_transition(Pending, Withdrawn, Actor::Reviewer).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_professors_cannot_act() {
        assert_eq!(Actor::for_role(Role::Professor), None);
        assert_eq!(Actor::for_role(Role::Admin), Some(Actor::Reviewer));
    }
}
