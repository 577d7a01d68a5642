use axum::extract::State;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::password::{hash_password, validate_password_strength, verify_password};
use super::tokens::{IssuedTokens, TokenKind};
use super::{AuthUser, PDPA_CONSENT_VERSION, REFRESH_COOKIE, REFRESH_COOKIE_PATH};
use crate::errors::AppError;
use crate::extract::Json;
use crate::models::user::{PublicUser, Role, UserStatus, UserWithProfile};
use crate::models::TextEnum;
use crate::profile::{email_taken, find_user, find_user_by_email, load_user_with_profile};
use crate::response::ApiResponse;
use crate::state::AppState;

const INVALID_CREDENTIALS: &str = "Invalid email or password";

fn self_service_role(role: &Role) -> Result<(), ValidationError> {
    match role {
        Role::Student | Role::Employer => Ok(()),
        _ => {
            let mut err = ValidationError::new("role");
            err.message = Some("only student or employer accounts can self-register".into());
            Err(err)
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "must be a valid email"))]
    pub email: String,
    #[validate(custom(function = "validate_password_strength"))]
    pub password: String,
    #[validate(length(min = 1, max = 200, message = "must be 1-200 characters"))]
    pub full_name: String,
    #[validate(length(max = 32))]
    pub phone: Option<String>,
    #[validate(custom(function = "self_service_role"))]
    pub role: Role,
    #[serde(default)]
    pub pdpa_consent: bool,

    #[validate(length(max = 32))]
    pub student_code: Option<String>,
    #[validate(length(max = 200))]
    pub faculty: Option<String>,
    #[validate(length(max = 200))]
    pub major: Option<String>,

    #[validate(length(min = 1, max = 200))]
    pub company_name: Option<String>,
    #[validate(length(max = 5000))]
    pub company_description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "must be a valid email"))]
    pub email: String,
    #[validate(length(min = 1, message = "is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "is required"))]
    pub current_password: String,
    #[validate(custom(function = "validate_password_strength"))]
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginData {
    #[serde(flatten)]
    pub tokens: IssuedTokens,
    pub user: PublicUser,
}

#[derive(Debug, Serialize)]
pub struct RefreshData {
    #[serde(flatten)]
    pub tokens: IssuedTokens,
}

/// Registration rules that span fields.
fn check_registration(req: &RegisterRequest) -> Result<(), AppError> {
    if !req.pdpa_consent {
        return Err(AppError::BadRequest(
            "Consent to personal data processing (PDPA) is required".to_string(),
        ));
    }
    if req.role == Role::Employer
        && req
            .company_name
            .as_deref()
            .map_or(true, |c| c.trim().is_empty())
    {
        return Err(AppError::Validation(
            "company_name: is required for employer accounts".to_string(),
        ));
    }
    Ok(())
}

/// Students may sign in straight away; employers wait for an admin.
fn initial_status(role: Role) -> UserStatus {
    match role {
        Role::Employer => UserStatus::Pending,
        _ => UserStatus::Approved,
    }
}

/// Maps a non-approved account status to the login rejection.
fn login_gate(status: UserStatus) -> Result<(), AppError> {
    match status {
        UserStatus::Approved => Ok(()),
        UserStatus::Pending => Err(AppError::Forbidden(
            "Account is awaiting admin approval".to_string(),
        )),
        UserStatus::Rejected => Err(AppError::Forbidden(
            "Account registration was rejected".to_string(),
        )),
        UserStatus::Suspended => Err(AppError::Forbidden("Account is suspended".to_string())),
    }
}

fn refresh_cookie(state: &AppState, token: String) -> Cookie<'static> {
    Cookie::build((REFRESH_COOKIE, token))
        .http_only(true)
        .secure(state.config.cookie_secure)
        .same_site(SameSite::Strict)
        .path(REFRESH_COOKIE_PATH)
        .build()
}

async fn start_session(
    state: &AppState,
    user_id: Uuid,
    role: Role,
) -> Result<IssuedTokens, AppError> {
    let tokens = state.tokens.issue_pair(user_id, role)?;
    let ttl = state.tokens.refresh_ttl().num_seconds().max(1) as u64;
    state
        .sessions
        .store(tokens.refresh_claims.jti, user_id, ttl)
        .await?;
    Ok(tokens)
}

/// POST /api/auth/register
pub async fn handle_register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<ApiResponse<PublicUser>, AppError> {
    req.validate()?;
    check_registration(&req)?;

    let email = req.email.trim().to_lowercase();
    if email_taken(&state.db, &email).await? {
        return Err(AppError::Conflict("Email is already registered".to_string()));
    }

    let password_hash = hash_password(&req.password, state.config.bcrypt_cost).await?;
    let user_id = Uuid::new_v4();
    let status = initial_status(req.role);

    let mut tx = state.db.begin().await?;
    sqlx::query(
        r#"
        INSERT INTO users
            (id, email, password_hash, role, status, full_name, phone,
             pdpa_consent_at, pdpa_consent_version)
        VALUES ($1, $2, $3, $4, $5, $6, $7, now(), $8)
        "#,
    )
    .bind(user_id)
    .bind(&email)
    .bind(&password_hash)
    .bind(req.role.as_str())
    .bind(status.as_str())
    .bind(req.full_name.trim())
    .bind(req.phone.as_deref())
    .bind(PDPA_CONSENT_VERSION)
    .execute(&mut *tx)
    .await?;

    match req.role {
        Role::Student => {
            sqlx::query(
                "INSERT INTO student_profiles (user_id, student_code, faculty, major) VALUES ($1, $2, $3, $4)",
            )
            .bind(user_id)
            .bind(req.student_code.as_deref())
            .bind(req.faculty.as_deref())
            .bind(req.major.as_deref())
            .execute(&mut *tx)
            .await?;
        }
        Role::Employer => {
            sqlx::query(
                "INSERT INTO employer_profiles (user_id, company_name, company_description) VALUES ($1, $2, $3)",
            )
            .bind(user_id)
            .bind(req.company_name.as_deref().map(str::trim))
            .bind(req.company_description.as_deref())
            .execute(&mut *tx)
            .await?;
        }
        Role::Professor | Role::Admin => {
            return Err(AppError::Forbidden(
                "Only student or employer accounts can self-register".to_string(),
            ))
        }
    }
    tx.commit().await?;

    info!("Registered {} account {user_id}", req.role.as_str());

    let user = find_user(&state.db, user_id).await?;
    let message = match status {
        UserStatus::Pending => "Registration received; awaiting admin approval",
        _ => "Registration successful",
    };
    Ok(ApiResponse::created(message, user.into()))
}

/// POST /api/auth/login
pub async fn handle_login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<(CookieJar, ApiResponse<LoginData>), AppError> {
    req.validate()?;

    let user = find_user_by_email(&state.db, &req.email)
        .await?
        .ok_or_else(|| AppError::Unauthorized(INVALID_CREDENTIALS.to_string()))?;

    if !verify_password(&req.password, &user.password_hash).await? {
        warn!("Failed login for user {}", user.id);
        return Err(AppError::Unauthorized(INVALID_CREDENTIALS.to_string()));
    }

    login_gate(UserStatus::parse_column(&user.status)?)?;
    let role = Role::parse_column(&user.role)?;

    sqlx::query("UPDATE users SET last_login_at = now() WHERE id = $1")
        .bind(user.id)
        .execute(&state.db)
        .await?;

    let tokens = start_session(&state, user.id, role).await?;
    let jar = jar.add(refresh_cookie(&state, tokens.refresh_token.clone()));

    info!("User {} logged in", user.id);
    Ok((
        jar,
        ApiResponse::ok(
            "Login successful",
            LoginData {
                tokens,
                user: user.into(),
            },
        ),
    ))
}

/// POST /api/auth/refresh
pub async fn handle_refresh(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, ApiResponse<RefreshData>), AppError> {
    let token = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Missing refresh token".to_string()))?;

    let claims = state.tokens.verify(&token, TokenKind::Refresh)?;
    if !state.sessions.consume(claims.jti, claims.sub).await? {
        return Err(AppError::Unauthorized("Session has been revoked".to_string()));
    }

    // Role and status may have changed since the session started.
    let user = find_user(&state.db, claims.sub)
        .await
        .map_err(|_| AppError::Unauthorized("Session has been revoked".to_string()))?;
    login_gate(UserStatus::parse_column(&user.status)?)?;
    let role = Role::parse_column(&user.role)?;

    let tokens = start_session(&state, user.id, role).await?;
    let jar = jar.add(refresh_cookie(&state, tokens.refresh_token.clone()));

    Ok((jar, ApiResponse::ok("Token refreshed", RefreshData { tokens })))
}

/// POST /api/auth/logout
pub async fn handle_logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, ApiResponse<()>), AppError> {
    if let Some(cookie) = jar.get(REFRESH_COOKIE) {
        if let Ok(claims) = state.tokens.verify(cookie.value(), TokenKind::Refresh) {
            state.sessions.revoke(claims.jti).await?;
        }
    }
    let jar = jar.remove(Cookie::build((REFRESH_COOKIE, "")).path(REFRESH_COOKIE_PATH));
    Ok((jar, ApiResponse::message("Logged out")))
}

/// GET /api/auth/me
pub async fn handle_me(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<ApiResponse<UserWithProfile>, AppError> {
    let me = load_user_with_profile(&state.db, auth.user_id).await?;
    Ok(ApiResponse::ok("Current user", me))
}

/// POST /api/auth/change-password
pub async fn handle_change_password(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<ApiResponse<()>, AppError> {
    req.validate()?;
    let user = find_user(&state.db, auth.user_id).await?;

    if !verify_password(&req.current_password, &user.password_hash).await? {
        return Err(AppError::BadRequest(
            "Current password is incorrect".to_string(),
        ));
    }
    if req.current_password == req.new_password {
        return Err(AppError::BadRequest(
            "New password must differ from the current one".to_string(),
        ));
    }

    let hash = hash_password(&req.new_password, state.config.bcrypt_cost).await?;
    sqlx::query("UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1")
        .bind(auth.user_id)
        .bind(&hash)
        .execute(&state.db)
        .await?;

    info!("User {} changed password at {}", auth.user_id, Utc::now());
    Ok(ApiResponse::message("Password changed"))
}
