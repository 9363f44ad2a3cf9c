//! Local email + password accounts.

use sqlx::SqlitePool;
use std::sync::OnceLock;
use thiserror::Error;

use super::password::{hash_password, verify_password};
use super::Identity;
use crate::db::{self, User};

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("{0}")]
    InvalidInput(&'static str),
    #[error("user registration is disabled. maximum users ({0}) reached")]
    CapReached(u32),
    #[error("email is already registered")]
    EmailTaken,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("failed to hash password: {0}")]
    Hash(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

fn validate(email: &str, password: &str) -> Result<(), CredentialError> {
    if email.is_empty() || password.is_empty() {
        return Err(CredentialError::InvalidInput("email and password required"));
    }
    if !email.contains('@') {
        return Err(CredentialError::InvalidInput("invalid email address"));
    }
    Ok(())
}

/// Create a local account, honouring the registration cap.
///
/// The email is stored exactly as given.
pub async fn register(
    db: &SqlitePool,
    email: &str,
    password: &str,
    max_users: u32,
) -> Result<User, CredentialError> {
    validate(email, password)?;

    // Cheap early exit so a full server does not pay for hashing; the insert
    // re-checks the cap atomically.
    if db::count_local_users(db).await? >= i64::from(max_users) {
        return Err(CredentialError::CapReached(max_users));
    }

    let password_hash = hash_password(password).map_err(|e| CredentialError::Hash(e.to_string()))?;

    let inserted = db::insert_local_user(db, &Identity::generate(), email, &password_hash, max_users)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.is_unique_violation() {
                    return CredentialError::EmailTaken;
                }
            }
            CredentialError::Database(e)
        })?;

    inserted.ok_or(CredentialError::CapReached(max_users))
}

/// Hash checked when there is no real one, so a miss costs as much as a hit
fn dummy_hash() -> Option<&'static str> {
    static DUMMY: OnceLock<Option<String>> = OnceLock::new();
    DUMMY
        .get_or_init(|| hash_password("poppo-dummy-password").ok())
        .as_deref()
}

/// Check an email + password pair. Unknown email and wrong password are
/// reported identically and take the same argon2 work.
pub async fn authenticate(db: &SqlitePool, email: &str, password: &str) -> Result<User, CredentialError> {
    let user = db::find_local_by_email(db, email).await?;

    let verified = match (user.as_ref().and_then(|u| u.password_hash.as_deref()), dummy_hash()) {
        (Some(hash), _) => verify_password(password, hash),
        (None, Some(dummy)) => {
            verify_password(password, dummy);
            false
        }
        (None, None) => false,
    };

    match user {
        Some(user) if verified => Ok(user),
        _ => Err(CredentialError::InvalidCredentials),
    }
}
