//! Authentication and authorization
//!
//! Identity is established upstream; this layer only verifies the token
//! signature and reads the subject and role claims from it.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use core_kernel::UserId;

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (numeric user ID)
    pub sub: String,
    /// User's roles
    pub roles: Vec<String>,
    /// Expiration timestamp
    pub exp: i64,
    /// Issued at timestamp
    pub iat: i64,
}

impl Claims {
    /// The acting user, parsed from the subject claim
    pub fn user_id(&self) -> Result<UserId, AuthError> {
        self.sub
            .parse::<UserId>()
            .map_err(|_| AuthError::InvalidSubject(self.sub.clone()))
    }
}

/// Auth errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token expired")]
    TokenExpired,
    #[error("Subject is not a user id: {0}")]
    InvalidSubject(String),
    #[error("Missing role: one of {0}")]
    MissingRole(String),
}

/// Creates a new JWT token
///
/// # Arguments
///
/// * `user_id` - User identifier
/// * `roles` - User's roles
/// * `secret` - JWT secret key
/// * `expiration_secs` - Token validity in seconds
pub fn create_token(
    user_id: UserId,
    roles: Vec<String>,
    secret: &str,
    expiration_secs: u64,
) -> Result<String, AuthError> {
    let now = Utc::now();
    let exp = now + Duration::seconds(expiration_secs as i64);

    let claims = Claims {
        sub: user_id.value().to_string(),
        roles,
        exp: exp.timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|_| AuthError::InvalidToken)
}

/// Validates a JWT token
///
/// # Arguments
///
/// * `token` - The JWT token to validate
/// * `secret` - JWT secret key
pub fn validate_token(token: &str, secret: &str) -> Result<Claims, AuthError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        _ => AuthError::InvalidToken,
    })?;

    Ok(token_data.claims)
}

/// Checks if user has required role
pub fn has_role(claims: &Claims, required_role: &str) -> bool {
    claims
        .roles
        .iter()
        .any(|r| r == required_role || r == roles::ADMIN)
}

/// Passes if the user holds any of the given roles; `admin` passes every gate
pub fn require_any_role(claims: &Claims, allowed: &[&str]) -> Result<(), AuthError> {
    if allowed.iter().any(|role| has_role(claims, role)) {
        Ok(())
    } else {
        Err(AuthError::MissingRole(allowed.join(", ")))
    }
}

/// Role names carried in the `roles` claim
pub mod roles {
    pub const ADMIN: &str = "admin";
    pub const CASHIER: &str = "cashier";
    pub const ACCOUNTANT: &str = "accountant";
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn test_token_carries_user_and_roles() {
        let token = create_token(UserId::new(2), vec![roles::CASHIER.into()], SECRET, 60).unwrap();
        let claims = validate_token(&token, SECRET).unwrap();

        assert_eq!(claims.user_id().unwrap(), UserId::new(2));
        assert_eq!(claims.roles, vec!["cashier".to_string()]);
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let token = create_token(UserId::new(2), vec![], SECRET, 60).unwrap();
        assert!(matches!(
            validate_token(&token, "other-secret"),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn test_role_gate() {
        let claims = Claims {
            sub: "2".into(),
            roles: vec![roles::ACCOUNTANT.into()],
            exp: 0,
            iat: 0,
        };
        assert!(require_any_role(&claims, &[roles::CASHIER, roles::ACCOUNTANT]).is_ok());
        assert!(require_any_role(&claims, &[roles::CASHIER]).is_err());
    }

    #[test]
    fn test_non_numeric_subject_is_rejected() {
        let claims = Claims {
            sub: "alice".into(),
            roles: vec![],
            exp: 0,
            iat: 0,
        };
        assert!(matches!(claims.user_id(), Err(AuthError::InvalidSubject(_))));
    }

    mod role_gate_properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn admin_passes_every_gate(role in "[a-z]{1,12}") {
                let claims = Claims {
                    sub: "1".into(),
                    roles: vec![roles::ADMIN.into()],
                    exp: 0,
                    iat: 0,
                };
                prop_assert!(require_any_role(&claims, &[role.as_str()]).is_ok());
            }
        }
    }
}
