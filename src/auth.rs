//! Authentication seam consumed by the worker contracts.
//!
//! The broker never decides *who* a token belongs to; it only asks an
//! [`Authenticator`] and short-circuits on failure. Token issuance and the
//! real credential store live outside this crate.

use std::fmt;

use async_trait::async_trait;

use crate::error::BrokerError;

/// An authenticated identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// Stable identifier of the principal (device or user name).
    pub id: String,
}

/// Capability for validating credential tokens.
#[async_trait]
pub trait Authenticator: Send + Sync + fmt::Debug {
    /// Validates a credential token.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Unauthorized`] when the token is absent,
    /// malformed, or does not check out.
    async fn validate(&self, token: &str) -> Result<Principal, BrokerError>;
}

/// Shared-secret authenticator for `subject:secret` tokens.
///
/// The subject half becomes the principal id; the secret half must match
/// the configured value. Good enough for a closed device fleet; anything
/// richer plugs in behind the [`Authenticator`] trait.
#[derive(Debug, Clone)]
pub struct StaticTokenAuthenticator {
    secret: String,
}

impl StaticTokenAuthenticator {
    /// Creates an authenticator accepting tokens signed with `secret`.
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

#[async_trait]
impl Authenticator for StaticTokenAuthenticator {
    async fn validate(&self, token: &str) -> Result<Principal, BrokerError> {
        match token.split_once(':') {
            Some((subject, secret)) if !subject.is_empty() && secret == self.secret => {
                Ok(Principal {
                    id: subject.to_string(),
                })
            }
            _ => Err(BrokerError::Unauthorized),
        }
    }
}
