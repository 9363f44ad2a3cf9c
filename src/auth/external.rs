//! Verification of tokens issued by an external identity provider.
//!
//! The provider signs its access tokens with a shared HMAC secret. Only the
//! HMAC family is accepted; a token whose header names any other algorithm is
//! rejected before its signature is even looked at.

use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use super::AuthError;

/// Claims this service relies on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalClaims {
    /// Provider-assigned user id, used verbatim as the local identity
    pub sub: String,
    #[serde(default)]
    pub email: String,
    /// Expiry as a Unix timestamp
    pub exp: i64,
}

pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str, audience: Option<&str>) -> Result<Self, AuthError> {
        if secret.is_empty() {
            return Err(AuthError::Misconfigured("jwt secret is empty".to_string()));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);
        match audience {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }

        Ok(Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        })
    }

    /// Check signature, algorithm and expiry, returning the embedded claims.
    ///
    /// Pure: nothing is recorded on success or failure.
    pub fn verify(&self, token: &str) -> Result<ExternalClaims, AuthError> {
        let data = decode::<ExternalClaims>(token, &self.key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                ErrorKind::InvalidKeyFormat => AuthError::Misconfigured(e.to_string()),
                _ => AuthError::Invalid(e.to_string()),
            }
        })?;

        if data.claims.sub.is_empty() {
            return Err(AuthError::Invalid("empty subject".to_string()));
        }
        Ok(data.claims)
    }
}
