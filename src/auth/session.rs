use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

use super::{AuthError, Identity};

#[derive(Debug, Clone)]
struct SessionEntry {
    identity: Identity,
    expires_at: DateTime<Utc>,
}

/// In-memory store of opaque session tokens.
///
/// Tokens are kept only as SHA-256 digests. Expired entries are not swept;
/// they simply stop resolving. Sessions do not survive a restart.
#[derive(Debug)]
pub struct SessionStore {
    ttl: Duration,
    entries: RwLock<HashMap<String, SessionEntry>>,
}

/// Generate a random token
fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    hex::encode(bytes)
}

/// Hash a token for storage
fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Start a session for `identity` and return its bearer token
    pub fn issue(&self, identity: &Identity) -> String {
        let token = generate_token();
        let entry = SessionEntry {
            identity: identity.clone(),
            // Saturate instead of overflowing on an absurd ttl
            expires_at: Utc::now()
                .checked_add_signed(self.ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        };

        let mut entries = self.entries.write();
        entries.insert(hash_token(&token), entry);
        tracing::debug!(user_id = %identity, sessions = entries.len(), "Session issued");
        token
    }

    /// Look up the identity behind a token.
    ///
    /// Expiry is checked on every call and is never extended.
    pub fn resolve(&self, token: &str) -> Result<Identity, AuthError> {
        let key = hash_token(token);
        let entries = self.entries.read();
        let entry = entries.get(&key).ok_or(AuthError::NotFound)?;

        if Utc::now() >= entry.expires_at {
            return Err(AuthError::Expired);
        }
        Ok(entry.identity.clone())
    }

    /// End a session. Unknown or already revoked tokens are ignored.
    pub fn revoke(&self, token: &str) {
        if self.entries.write().remove(&hash_token(token)).is_some() {
            tracing::debug!("Session revoked");
        }
    }

}
