//! Identity error types.

use nimbus_core::error::NimbusError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthzError {
    #[error("token has expired")]
    TokenExpired,

    #[error("invalid token: {0}")]
    TokenInvalid(String),

    #[error("token subject is not a user id: {0}")]
    InvalidSubject(String),

    #[error("cryptography error: {0}")]
    Crypto(String),
}

impl From<AuthzError> for NimbusError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::TokenExpired
            | AuthzError::TokenInvalid(_)
            | AuthzError::InvalidSubject(_) => NimbusError::Unauthenticated {
                reason: err.to_string(),
            },
            AuthzError::Crypto(msg) => NimbusError::Crypto(msg),
        }
    }
}
