//! Authentication and authorization
//!
//! Tokens are HS256 JWTs issued by the portal's auth service. The `sub`
//! claim is the staff user's id; `roles` holds `admin`, `billing` and/or
//! `caregiver`. Admins pass every role check.

use std::str::FromStr;

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use core_kernel::CaregiverId;
use domain_billing::Role;

use crate::error::ApiError;

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// User's roles
    pub roles: Vec<String>,
    /// Expiration timestamp
    pub exp: i64,
    /// Issued at timestamp
    pub iat: i64,
}

impl Claims {
    /// Checks if the user holds `role`, or is an admin
    pub fn has_role(&self, role: Role) -> bool {
        self.roles
            .iter()
            .filter_map(|r| Role::parse(r))
            .any(|r| r == role || r == Role::Admin)
    }

    /// Fails with `Forbidden` unless the user holds `role`
    pub fn require(&self, role: Role) -> Result<(), ApiError> {
        if self.has_role(role) {
            Ok(())
        } else {
            Err(ApiError::Forbidden(format!("{} role required", role.as_str())))
        }
    }

    /// The caller as a caregiver; the subject must be a user id
    pub fn caregiver_id(&self) -> Result<CaregiverId, ApiError> {
        self.require(Role::Caregiver)?;
        let user_id = self.sub.strip_prefix("USR-").unwrap_or(&self.sub);
        CaregiverId::from_str(user_id)
            .map_err(|_| ApiError::Forbidden("token subject is not a user id".to_string()))
    }
}

/// Auth errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token expired")]
    TokenExpired,
}

/// Creates a new JWT token
///
/// Token issuance belongs to the auth service; this is used by tests and
/// local tooling.
pub fn create_token(
    user_id: &str,
    roles: Vec<String>,
    secret: &str,
    expiration_secs: u64,
) -> Result<String, AuthError> {
    let now = Utc::now();
    let exp = now + Duration::seconds(expiration_secs as i64);

    let claims = Claims {
        sub: user_id.to_string(),
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
