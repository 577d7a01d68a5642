use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;
use crate::errors::AppError;
use crate::models::user::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    pub kind: TokenKind,
    pub jti: Uuid,
    pub iat: i64,
    pub exp: i64,
}

/// Access/refresh pair handed to a client after login or refresh.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedTokens {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    #[serde(skip)]
    pub refresh_token: String,
    #[serde(skip)]
    pub refresh_claims: Claims,
}

/// HS256 JWT signer/verifier.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &str, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.jwt_secret,
            Duration::minutes(config.access_token_ttl_minutes),
            Duration::days(config.refresh_token_ttl_days),
        )
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    pub fn issue(&self, user_id: Uuid, role: Role, kind: TokenKind) -> Result<(String, Claims), AppError> {
        let now = Utc::now();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let claims = Claims {
            sub: user_id,
            role,
            kind,
            jti: Uuid::new_v4(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("JWT encoding failed: {e}")))?;
        Ok((token, claims))
    }

    pub fn issue_pair(&self, user_id: Uuid, role: Role) -> Result<IssuedTokens, AppError> {
        let (access_token, _) = self.issue(user_id, role, TokenKind::Access)?;
        let (refresh_token, refresh_claims) = self.issue(user_id, role, TokenKind::Refresh)?;
        Ok(IssuedTokens {
            access_token,
            token_type: "Bearer",
            expires_in: self.access_ttl.num_seconds(),
            refresh_token,
            refresh_claims,
        })
    }

    /// Decodes and checks signature, expiry and the expected token kind.
    pub fn verify(&self, token: &str, expected: TokenKind) -> Result<Claims, AppError> {
        let claims = decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|_| AppError::Unauthorized("Invalid or expired token".to_string()))?;
        if claims.kind != expected {
            return Err(AppError::Unauthorized("Wrong token type".to_string()));
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new("unit-test-secret", Duration::minutes(15), Duration::days(7))
    }

    #[test]
    fn test_access_token_round_trip() {
        let issuer = issuer();
        let user = Uuid::new_v4();
        let (token, issued) = issuer.issue(user, Role::Employer, TokenKind::Access).unwrap();
        let claims = issuer.verify(&token, TokenKind::Access).unwrap();
        assert_eq!(claims.sub, user);
        assert_eq!(claims.role, Role::Employer);
        assert_eq!(claims.jti, issued.jti);
    }

    #[test]
    fn test_refresh_token_rejected_as_access() {
        let issuer = issuer();
        let (token, _) = issuer
            .issue(Uuid::new_v4(), Role::Student, TokenKind::Refresh)
            .unwrap();
        assert!(matches!(
            issuer.verify(&token, TokenKind::Access),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_expired_token_rejected() {
        let issuer = TokenIssuer::new("s", Duration::minutes(-10), Duration::days(7));
        let (token, _) = issuer
            .issue(Uuid::new_v4(), Role::Admin, TokenKind::Access)
            .unwrap();
        assert!(issuer.verify(&token, TokenKind::Access).is_err());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let (token, _) = issuer()
            .issue(Uuid::new_v4(), Role::Admin, TokenKind::Access)
            .unwrap();
        let other = TokenIssuer::new("other", Duration::minutes(15), Duration::days(7));
        assert!(other.verify(&token, TokenKind::Access).is_err());
    }

    #[test]
    fn test_pair_serializes_only_access_token() {
        let pair = issuer().issue_pair(Uuid::new_v4(), Role::Student).unwrap();
        let v = serde_json::to_value(&pair).unwrap();
        assert_eq!(v["token_type"], "Bearer");
        assert_eq!(v["expires_in"], 900);
        assert!(v.get("refresh_token").is_none());
    }
}
