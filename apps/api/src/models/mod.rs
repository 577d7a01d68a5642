pub mod announcement;
pub mod application;
pub mod job;
pub mod notification;
pub mod user;

use crate::errors::AppError;

/// Text-backed enum columns are parsed through this trait so a corrupt value
/// surfaces as a 500 instead of a panic.
pub trait TextEnum: Sized + Copy + 'static {
    const ALL: &'static [Self];

    fn as_str(&self) -> &'static str;

    fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|v| v.as_str() == s)
    }

    fn parse_column(s: &str) -> Result<Self, AppError> {
        Self::parse(s)
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("unexpected enum value '{s}'")))
    }
}
