//! Plushie records and their owner-scoped queries.
//!
//! Every query that touches a single record carries `user_id = ?` in the same
//! statement (or the same transaction), so a record owned by someone else
//! behaves exactly like a record that does not exist.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use crate::auth::Identity;
use crate::utils::now_timestamp;

/// URL prefix under which stored images are served
pub const UPLOADS_URL_PREFIX: &str = "/uploads/";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Plushie {
    pub id: i64,
    pub user_id: String,
    pub name: String,
    pub kind: String,
    /// Calendar date, `YYYY-MM-DD`
    pub adopted_at: Option<String>,
    /// File name inside the uploads directory
    pub image_path: Option<String>,
    pub conversation_history: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Public representation; the owner id is never exposed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlushieResponse {
    pub id: i64,
    pub name: String,
    pub kind: String,
    pub adopted_at: Option<String>,
    pub image_url: Option<String>,
    pub conversation_history: Option<String>,
    pub created_at: String,
    pub modified_at: String,
}

impl From<Plushie> for PlushieResponse {
    fn from(p: Plushie) -> Self {
        Self {
            id: p.id,
            name: p.name,
            kind: p.kind,
            adopted_at: p.adopted_at,
            image_url: p
                .image_path
                .map(|file| format!("{}{}", UPLOADS_URL_PREFIX, file)),
            conversation_history: p.conversation_history,
            created_at: p.created_at,
            modified_at: p.updated_at,
        }
    }
}

/// Field values for a create or a full update
#[derive(Debug, Clone, Default)]
pub struct PlushieFields {
    pub name: String,
    pub kind: String,
    pub adopted_at: Option<String>,
    /// New image; on update `None` keeps the current one
    pub image_path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreatedResponse {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateConversationRequest {
    #[serde(default)]
    pub conversation_history: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub message: String,
}

/// What the chat prompt is built from
#[derive(Debug, Clone, FromRow)]
pub struct ChatSubject {
    pub name: String,
    pub kind: String,
    pub conversation_history: Option<String>,
}

/// Result of an owner-scoped update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    NotFound,
    /// Carries the image file that the update replaced, if any
    Updated { replaced_image: Option<String> },
}

/// All records of one owner, newest first
pub async fn list_for_owner(db: &SqlitePool, owner: &Identity) -> Result<Vec<Plushie>, sqlx::Error> {
    sqlx::query_as::<_, Plushie>(
        "SELECT * FROM plushies WHERE user_id = ? ORDER BY created_at DESC, id DESC",
    )
    .bind(owner.as_str())
    .fetch_all(db)
    .await
}

pub async fn find_owned(
    db: &SqlitePool,
    id: i64,
    owner: &Identity,
) -> Result<Option<Plushie>, sqlx::Error> {
    sqlx::query_as::<_, Plushie>("SELECT * FROM plushies WHERE id = ? AND user_id = ?")
        .bind(id)
        .bind(owner.as_str())
        .fetch_optional(db)
        .await
}

/// Insert a record for `owner`, returning its id
pub async fn insert(db: &SqlitePool, owner: &Identity, fields: &PlushieFields) -> Result<i64, sqlx::Error> {
    let now = now_timestamp();

    let result = sqlx::query(
        r#"
        INSERT INTO plushies (user_id, name, kind, adopted_at, image_path, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(owner.as_str())
    .bind(&fields.name)
    .bind(&fields.kind)
    .bind(&fields.adopted_at)
    .bind(&fields.image_path)
    .bind(&now)
    .bind(&now)
    .execute(db)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Replace name, kind and adoption date; swap the image only when a new one
/// is given.
///
/// The lookup of the previous image and the update share a transaction so the
/// reported replaced file is exactly the one this update overwrote. The
/// transaction takes the write lock up front; a deferred one would fail with
/// `SQLITE_BUSY_SNAPSHOT` instead of waiting when another writer commits
/// between the read and the write.
pub async fn update_owned(
    db: &SqlitePool,
    id: i64,
    owner: &Identity,
    fields: &PlushieFields,
) -> Result<UpdateOutcome, sqlx::Error> {
    let mut tx = db.begin_with("BEGIN IMMEDIATE").await?;

    let current: Option<Option<String>> =
        sqlx::query_scalar("SELECT image_path FROM plushies WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(owner.as_str())
            .fetch_optional(&mut *tx)
            .await?;

    let Some(current_image) = current else {
        tx.rollback().await?;
        return Ok(UpdateOutcome::NotFound);
    };

    sqlx::query(
        r#"
        UPDATE plushies SET
            name = ?,
            kind = ?,
            adopted_at = ?,
            image_path = COALESCE(?, image_path),
            updated_at = ?
        WHERE id = ? AND user_id = ?
        "#,
    )
    .bind(&fields.name)
    .bind(&fields.kind)
    .bind(&fields.adopted_at)
    .bind(&fields.image_path)
    .bind(now_timestamp())
    .bind(id)
    .bind(owner.as_str())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    let replaced_image = match fields.image_path {
        Some(_) => current_image,
        None => None,
    };
    Ok(UpdateOutcome::Updated { replaced_image })
}

/// Overwrite the stored conversation. Returns `false` when no owned record matched.
pub async fn update_conversation(
    db: &SqlitePool,
    id: i64,
    owner: &Identity,
    history: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE plushies SET conversation_history = ?, updated_at = ? WHERE id = ? AND user_id = ?",
    )
    .bind(history)
    .bind(now_timestamp())
    .bind(id)
    .bind(owner.as_str())
    .execute(db)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Delete an owned record.
///
/// `None` means nothing was deleted; `Some(image)` carries the image file the
/// record pointed at.
pub async fn delete_owned(
    db: &SqlitePool,
    id: i64,
    owner: &Identity,
) -> Result<Option<Option<String>>, sqlx::Error> {
    sqlx::query_scalar("DELETE FROM plushies WHERE id = ? AND user_id = ? RETURNING image_path")
        .bind(id)
        .bind(owner.as_str())
        .fetch_optional(db)
        .await
}

pub async fn chat_subject(
    db: &SqlitePool,
    id: i64,
    owner: &Identity,
) -> Result<Option<ChatSubject>, sqlx::Error> {
    sqlx::query_as::<_, ChatSubject>(
        "SELECT name, kind, conversation_history FROM plushies WHERE id = ? AND user_id = ?",
    )
    .bind(id)
    .bind(owner.as_str())
    .fetch_optional(db)
    .await
}
