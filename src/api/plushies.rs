use axum::{
    extract::{rejection::JsonRejection, Multipart, Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use super::auth::ensure_profile;
use super::error::{ApiError, ValidationErrorBuilder};
use crate::auth::Principal;
use crate::chat::build_prompt;
use crate::db::{
    self, ChatResponse, CreatedResponse, PlushieFields, PlushieResponse, UpdateConversationRequest,
    UpdateOutcome,
};
use crate::AppState;

const NOT_FOUND: &str = "Plushie not found";

/// Parsed multipart body of a create or update
#[derive(Debug, Default)]
struct PlushieForm {
    name: String,
    kind: String,
    adopted_at: String,
    image: Option<UploadedImage>,
}

#[derive(Debug)]
struct UploadedImage {
    file_name: Option<String>,
    data: Vec<u8>,
}

fn parse_id(raw: &str) -> Result<i64, ApiError> {
    raw.parse::<i64>()
        .map_err(|_| ApiError::bad_request("Invalid ID"))
}

/// Read the form, enforcing the upload ceiling while the image streams in
async fn read_form(mut multipart: Multipart, max_file_bytes: usize) -> Result<PlushieForm, ApiError> {
    let mut form = PlushieForm::default();

    while let Some(mut field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                if form.image.is_some() {
                    return Err(ApiError::bad_request("Only one image may be uploaded"));
                }
                let file_name = field.file_name().map(str::to_string);

                let mut data = Vec::new();
                while let Some(chunk) = field.chunk().await? {
                    if data.len() + chunk.len() > max_file_bytes {
                        return Err(ApiError::payload_too_large(format!(
                            "Image exceeds the maximum upload size of {} bytes",
                            max_file_bytes
                        )));
                    }
                    data.extend_from_slice(&chunk);
                }

                // A file input left empty still submits a nameless, empty part
                let empty_name = file_name.as_deref().map_or(true, str::is_empty);
                if !(data.is_empty() && empty_name) {
                    form.image = Some(UploadedImage { file_name, data });
                }
            }
            "name" => form.name = field.text().await?,
            "kind" => form.kind = field.text().await?,
            "adopted_at" => form.adopted_at = field.text().await?,
            _ => {
                tracing::debug!(field = %name, "Ignoring unknown form field");
            }
        }
    }

    Ok(form)
}

/// Check the text fields and turn them into storable values
fn validate_form(form: &PlushieForm) -> Result<PlushieFields, ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    let name = form.name.trim();
    if name.is_empty() {
        errors.add("name", "Name is required");
    }

    let adopted_at = form.adopted_at.trim();
    if !adopted_at.is_empty() && chrono::NaiveDate::parse_from_str(adopted_at, "%Y-%m-%d").is_err() {
        errors.add("adopted_at", "Adoption date must be formatted as YYYY-MM-DD");
    }

    errors.finish()?;

    Ok(PlushieFields {
        name: name.to_string(),
        kind: form.kind.trim().to_string(),
        adopted_at: (!adopted_at.is_empty()).then(|| adopted_at.to_string()),
        image_path: None,
    })
}

async fn store_image(state: &AppState, image: Option<&UploadedImage>) -> Result<Option<String>, ApiError> {
    match image {
        Some(image) => {
            let stored = state
                .uploads
                .save(image.file_name.as_deref(), &image.data)
                .await?;
            Ok(Some(stored))
        }
        None => Ok(None),
    }
}

/// List the caller's plushies, newest first
pub async fn list_plushies(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> Result<Json<Vec<PlushieResponse>>, ApiError> {
    let plushies = db::list_for_owner(&state.db, &principal.identity).await?;
    Ok(Json(plushies.into_iter().map(PlushieResponse::from).collect()))
}

pub async fn get_plushie(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<PlushieResponse>, ApiError> {
    let id = parse_id(&id)?;

    let plushie = db::find_owned(&state.db, id, &principal.identity)
        .await?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;

    Ok(Json(plushie.into()))
}

/// Create a plushie from a multipart form
pub async fn create_plushie(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    multipart: Multipart,
) -> Result<(StatusCode, Json<CreatedResponse>), ApiError> {
    let form = read_form(multipart, state.uploads.max_file_bytes()).await?;
    let mut fields = validate_form(&form)?;

    ensure_profile(&state, &principal).await?;

    fields.image_path = store_image(&state, form.image.as_ref()).await?;

    let id = match db::insert(&state.db, &principal.identity, &fields).await {
        Ok(id) => id,
        Err(e) => {
            if let Some(image) = &fields.image_path {
                state.uploads.remove(image).await;
            }
            return Err(e.into());
        }
    };

    tracing::info!(plushie_id = id, user_id = %principal.identity, "Created plushie");
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

/// Replace a plushie's fields; the image changes only when a new one is sent
pub async fn update_plushie(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id)?;
    let form = read_form(multipart, state.uploads.max_file_bytes()).await?;
    let mut fields = validate_form(&form)?;

    fields.image_path = store_image(&state, form.image.as_ref()).await?;

    let outcome = db::update_owned(&state.db, id, &principal.identity, &fields).await;

    match outcome {
        Ok(UpdateOutcome::Updated { replaced_image }) => {
            if let Some(old) = replaced_image {
                state.uploads.remove(&old).await;
            }
            tracing::info!(plushie_id = id, "Updated plushie");
            Ok(StatusCode::NO_CONTENT)
        }
        Ok(UpdateOutcome::NotFound) => {
            if let Some(image) = &fields.image_path {
                state.uploads.remove(image).await;
            }
            Err(ApiError::not_found(NOT_FOUND))
        }
        Err(e) => {
            if let Some(image) = &fields.image_path {
                state.uploads.remove(image).await;
            }
            Err(e.into())
        }
    }
}

/// Overwrite the stored conversation log
pub async fn update_conversation(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
    body: Result<Json<UpdateConversationRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id)?;
    let Json(request) = body?;

    let updated = db::update_conversation(
        &state.db,
        id,
        &principal.identity,
        &request.conversation_history,
    )
    .await?;

    if !updated {
        return Err(ApiError::not_found(NOT_FOUND));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Ask the text generator for a line in the plushie's voice.
///
/// The reply is returned as-is and not stored.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<ChatResponse>, ApiError> {
    let id = parse_id(&id)?;

    let subject = db::chat_subject(&state.db, id, &principal.identity)
        .await?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;

    let prompt = build_prompt(
        &subject.name,
        &subject.kind,
        subject.conversation_history.as_deref().unwrap_or_default(),
    );

    let message = state.generator.generate(&prompt).await?;
    Ok(Json(ChatResponse { message }))
}

pub async fn delete_plushie(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id)?;

    let image = db::delete_owned(&state.db, id, &principal.identity)
        .await?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;

    if let Some(image) = image {
        state.uploads.remove(&image).await;
    }

    tracing::info!(plushie_id = id, "Deleted plushie");
    Ok(StatusCode::NO_CONTENT)
}
