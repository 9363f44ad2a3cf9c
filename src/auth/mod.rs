//! Identity, sessions and token verification.
//!
//! Two interchangeable strategies establish who is calling:
//!
//! * [`SessionStore`] issues opaque random tokens at login and keeps the
//!   token → identity mapping in memory.
//! * [`TokenVerifier`] checks HMAC-signed tokens minted by an external
//!   identity provider; nothing is stored server side.
//!
//! The strategy is chosen once at startup and wrapped in an [`Authenticator`],
//! which the request gate consults on every protected call.

pub mod credentials;
mod external;
pub mod password;
mod session;

pub use external::{ExternalClaims, TokenVerifier};
pub use session::SessionStore;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{AuthConfig, AuthStrategy};

/// Opaque key identifying one account.
///
/// Local accounts get a UUID; externally verified accounts keep the
/// provider's subject string exactly as issued.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Fresh identity for a local registration
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a resolved identity came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrincipalSource {
    /// Opaque session issued by this server
    Session,
    /// Signed token from the external provider, with the email it vouches for
    External { email: String },
}

/// The authenticated caller of a single request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub identity: Identity,
    pub source: PrincipalSource,
}

impl Principal {
    pub fn session(identity: Identity) -> Self {
        Self {
            identity,
            source: PrincipalSource::Session,
        }
    }

    pub fn external(identity: Identity, email: impl Into<String>) -> Self {
        Self {
            identity,
            source: PrincipalSource::External {
                email: email.into(),
            },
        }
    }
}

/// Why a request could not be authenticated
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("no token presented")]
    Missing,
    #[error("token has expired")]
    Expired,
    #[error("session not found")]
    NotFound,
    #[error("token rejected: {0}")]
    Invalid(String),
    #[error("authenticator misconfigured: {0}")]
    Misconfigured(String),
}

impl AuthError {
    /// Category message safe to show to the caller
    pub fn user_message(&self) -> &'static str {
        match self {
            AuthError::Missing => "Authentication required. Please log in.",
            AuthError::Expired => "Your session has expired. Please log in again.",
            AuthError::NotFound => "Your session is no longer valid. Please log in again.",
            AuthError::Invalid(_) => "Authentication failed.",
            AuthError::Misconfigured(_) => "Authentication is not available on this server.",
        }
    }
}

/// The identity strategy selected at startup
pub enum Authenticator {
    Session(SessionStore),
    External(TokenVerifier),
}

impl Authenticator {
    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        match config.strategy {
            AuthStrategy::Session => Ok(Authenticator::Session(SessionStore::new(
                chrono::Duration::days(config.session_ttl_days),
            ))),
            AuthStrategy::External => {
                let secret = config.jwt_secret.as_deref().ok_or_else(|| {
                    AuthError::Misconfigured("external strategy requires a jwt secret".to_string())
                })?;
                let verifier = TokenVerifier::new(secret, config.jwt_audience.as_deref())?;
                Ok(Authenticator::External(verifier))
            }
        }
    }

    pub fn strategy(&self) -> AuthStrategy {
        match self {
            Authenticator::Session(_) => AuthStrategy::Session,
            Authenticator::External(_) => AuthStrategy::External,
        }
    }

    /// Resolve a presented token to the caller it belongs to
    pub fn resolve(&self, token: &str) -> Result<Principal, AuthError> {
        match self {
            Authenticator::Session(store) => store.resolve(token).map(Principal::session),
            Authenticator::External(verifier) => {
                let claims = verifier.verify(token)?;
                Ok(Principal::external(Identity::new(claims.sub), claims.email))
            }
        }
    }

    /// The session store, when this server issues its own sessions
    pub fn sessions(&self) -> Option<&SessionStore> {
        match self {
            Authenticator::Session(store) => Some(store),
            Authenticator::External(_) => None,
        }
    }
}
