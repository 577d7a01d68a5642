pub mod extractor;
pub mod handlers;
pub mod password;
pub mod sessions;
pub mod tokens;

pub use extractor::AuthUser;

/// Version string recorded alongside a user's PDPA consent.
pub const PDPA_CONSENT_VERSION: &str = "1.0";

pub const REFRESH_COOKIE: &str = "refresh_token";
pub const REFRESH_COOKIE_PATH: &str = "/api/auth";
