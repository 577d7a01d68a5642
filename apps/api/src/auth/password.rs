use rand::{distributions::Alphanumeric, Rng};
use validator::ValidationError;

use crate::errors::AppError;

pub const MIN_PASSWORD_LEN: usize = 8;
pub const GENERATED_PASSWORD_LEN: usize = 12;

/// At least eight characters with one letter and one digit.
pub fn validate_password_strength(password: &str) -> Result<(), ValidationError> {
    let long_enough = password.chars().count() >= MIN_PASSWORD_LEN;
    let has_letter = password.chars().any(|c| c.is_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if long_enough && has_letter && has_digit {
        Ok(())
    } else {
        let mut err = ValidationError::new("weak_password");
        err.message = Some(
            "must be at least 8 characters and contain a letter and a digit".into(),
        );
        Err(err)
    }
}

/// bcrypt is CPU-bound, so hashing runs on the blocking pool.
pub async fn hash_password(password: &str, cost: u32) -> Result<String, AppError> {
    let password = password.to_owned();
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("hash task failed: {e}")))?
        .map_err(|e| AppError::Internal(anyhow::anyhow!("password hashing failed: {e}")))
}

/// A malformed stored hash verifies as `false` rather than erroring.
pub async fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    let password = password.to_owned();
    let hash = hash.to_owned();
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash).unwrap_or(false))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("verify task failed: {e}")))
}

/// Random alphanumeric password that always satisfies the strength policy.
pub fn generate_password() -> String {
    let mut rng = rand::thread_rng();
    loop {
        let candidate: String = (&mut rng)
            .sample_iter(&Alphanumeric)
            .take(GENERATED_PASSWORD_LEN)
            .map(char::from)
            .collect();
        if validate_password_strength(&candidate).is_ok() {
            return candidate;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strength_policy() {
        assert!(validate_password_strength("abcdefg1").is_ok());
        assert!(validate_password_strength("short1").is_err());
        assert!(validate_password_strength("onlyletters").is_err());
        assert!(validate_password_strength("12345678").is_err());
    }

    #[test]
    fn test_generated_passwords_pass_policy() {
        for _ in 0..50 {
            let pw = generate_password();
            assert_eq!(pw.len(), GENERATED_PASSWORD_LEN);
            assert!(validate_password_strength(&pw).is_ok());
        }
    }

    #[tokio::test]
    async fn test_hash_and_verify() {
        let hash = hash_password("correct horse 1", 4).await.unwrap();
        assert_ne!(hash, "correct horse 1");
        assert!(verify_password("correct horse 1", &hash).await.unwrap());
        assert!(!verify_password("wrong horse 1", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_verify_against_garbage_hash_is_false() {
        assert!(!verify_password("anything1", "not-a-hash").await.unwrap());
    }
}
