//! User models and account queries.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use crate::auth::Identity;
use crate::utils::now_timestamp;

pub const PROVIDER_LOCAL: &str = "local";
pub const PROVIDER_EXTERNAL: &str = "external";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    /// `None` for mirrored external accounts, which cannot log in locally
    pub password_hash: Option<String>,
    pub provider: String,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    pub fn identity(&self) -> Identity {
        Identity::new(self.id.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
        }
    }
}

/// Body of both the register and login endpoints
#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Number of accounts holding local credentials
pub async fn count_local_users(db: &SqlitePool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE provider = ?")
        .bind(PROVIDER_LOCAL)
        .fetch_one(db)
        .await
}

/// Insert a local account unless `max_users` local accounts already exist.
///
/// The cap check and the insert are one statement, so concurrent
/// registrations cannot overshoot the cap. Returns `None` when the cap
/// stopped the insert.
pub async fn insert_local_user(
    db: &SqlitePool,
    identity: &Identity,
    email: &str,
    password_hash: &str,
    max_users: u32,
) -> Result<Option<User>, sqlx::Error> {
    let now = now_timestamp();

    let result = sqlx::query(
        r#"
        INSERT INTO users (id, email, password_hash, provider, created_at, updated_at)
        SELECT ?, ?, ?, ?, ?, ?
        WHERE (SELECT COUNT(*) FROM users WHERE provider = ?) < ?
        "#,
    )
    .bind(identity.as_str())
    .bind(email)
    .bind(password_hash)
    .bind(PROVIDER_LOCAL)
    .bind(&now)
    .bind(&now)
    .bind(PROVIDER_LOCAL)
    .bind(i64::from(max_users))
    .execute(db)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }

    Ok(Some(User {
        id: identity.as_str().to_string(),
        email: email.to_string(),
        password_hash: Some(password_hash.to_string()),
        provider: PROVIDER_LOCAL.to_string(),
        created_at: now.clone(),
        updated_at: now,
    }))
}

pub async fn find_local_by_email(db: &SqlitePool, email: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ? AND provider = ?")
        .bind(email)
        .bind(PROVIDER_LOCAL)
        .fetch_optional(db)
        .await
}

pub async fn find_by_id(db: &SqlitePool, identity: &Identity) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(identity.as_str())
        .fetch_optional(db)
        .await
}

/// Mirror an externally verified identity into the users table.
///
/// Safe to call concurrently and repeatedly: the insert is ignored when the
/// row exists, then the email is refreshed from the latest token.
pub async fn upsert_external_profile(
    db: &SqlitePool,
    identity: &Identity,
    email: &str,
) -> Result<(), sqlx::Error> {
    let now = now_timestamp();

    sqlx::query(
        r#"
        INSERT OR IGNORE INTO users (id, email, password_hash, provider, created_at, updated_at)
        VALUES (?, ?, NULL, ?, ?, ?)
        "#,
    )
    .bind(identity.as_str())
    .bind(email)
    .bind(PROVIDER_EXTERNAL)
    .bind(&now)
    .bind(&now)
    .execute(db)
    .await?;

    sqlx::query("UPDATE users SET email = ?, updated_at = ? WHERE id = ?")
        .bind(email)
        .bind(&now)
        .bind(identity.as_str())
        .execute(db)
        .await?;

    Ok(())
}
