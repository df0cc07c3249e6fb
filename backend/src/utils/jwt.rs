use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::permission::Actor;
use crate::models::user::User;
use crate::types::{BranchId, RoleId, SessionId, UserId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user_id
    pub username: String,
    pub branch_id: BranchId,
    pub session_id: SessionId,
    pub role_id: RoleId,
    pub exp: i64,    // expiration time
    pub iat: i64,    // issued at
    pub jti: String, // JWT ID
}

impl Claims {
    pub fn new(user: &User, branch_id: BranchId, session_id: SessionId, ttl: Duration) -> Self {
        let now = Utc::now();
        let exp = now + ttl;

        Self {
            sub: user.id.to_string(),
            username: user.username.clone(),
            branch_id,
            session_id,
            role_id: user.role_id,
            exp: exp.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        }
    }

    /// `None` when `sub` is not a numeric user id.
    pub fn user_id(&self) -> Option<UserId> {
        self.sub.parse().ok()
    }

    pub fn actor(&self) -> Option<Actor> {
        Some(Actor {
            user_id: self.user_id()?,
            branch_id: self.branch_id,
            session_id: self.session_id,
            role_id: self.role_id,
        })
    }

    pub fn expires_at(&self) -> Option<chrono::DateTime<Utc>> {
        chrono::DateTime::from_timestamp(self.exp, 0)
    }
}

pub fn encode_claims(claims: &Claims, secret: &str) -> anyhow::Result<String> {
    let token = encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )?;
    Ok(token)
}

pub fn create_access_token(
    user: &User,
    branch_id: BranchId,
    session_id: SessionId,
    secret: &str,
    ttl: Duration,
) -> anyhow::Result<(String, Claims)> {
    let claims = Claims::new(user, branch_id, session_id, ttl);
    let token = encode_claims(&claims, secret)?;
    Ok((token, claims))
}

/// Rejects a token from its `exp` second on; logout only blacklists tokens
/// that are still inside that bound.
pub fn verify_access_token(token: &str, secret: &str) -> anyhow::Result<Claims> {
    let mut validation = Validation::default();
    validation.leeway = 0;
    decode_with(token, secret, validation)
}

/// Checks the signature only. Used at logout, where an expired token must still
/// identify the session it belonged to.
pub fn decode_access_token_ignoring_expiry(token: &str, secret: &str) -> anyhow::Result<Claims> {
    let mut validation = Validation::default();
    validation.validate_exp = false;
    decode_with(token, secret, validation)
}

fn decode_with(token: &str, secret: &str, validation: Validation) -> anyhow::Result<Claims> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &validation,
    )?;

    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User::new(UserId(7), "bob", "hash", RoleId(3), BranchId(2))
    }

    #[test]
    fn create_and_verify_carries_session_claims() {
        let (token, issued) =
            create_access_token(&user(), BranchId(2), SessionId(11), "secret", Duration::minutes(5))
                .expect("create token");
        let claims = verify_access_token(&token, "secret").expect("verify token");
        assert_eq!(claims.sub, "7");
        assert_eq!(claims.username, "bob");
        assert_eq!(claims.session_id, SessionId(11));
        assert_eq!(claims.role_id, RoleId(3));
        assert_eq!(claims.jti, issued.jti);
        assert_eq!(claims.user_id(), Some(UserId(7)));
    }

    #[test]
    fn expired_token_only_decodes_when_expiry_is_ignored() {
        let (token, _) =
            create_access_token(&user(), BranchId(2), SessionId(1), "secret", Duration::hours(-2))
                .expect("create token");
        assert!(verify_access_token(&token, "secret").is_err());
        let claims = decode_access_token_ignoring_expiry(&token, "secret").expect("decode");
        assert_eq!(claims.session_id, SessionId(1));
    }

    #[test]
    fn recently_expired_token_gets_no_grace_period() {
        let (token, _) = create_access_token(
            &user(),
            BranchId(2),
            SessionId(1),
            "secret",
            Duration::seconds(-5),
        )
        .expect("create token");
        assert!(verify_access_token(&token, "secret").is_err());
    }

    #[test]
    fn wrong_secret_is_rejected_even_ignoring_expiry() {
        let (token, _) =
            create_access_token(&user(), BranchId(2), SessionId(1), "secret", Duration::minutes(5))
                .expect("create token");
        assert!(decode_access_token_ignoring_expiry(&token, "other").is_err());
    }
}
