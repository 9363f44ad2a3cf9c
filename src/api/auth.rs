use axum::{
    async_trait,
    body::Body,
    extract::{rejection::JsonRejection, FromRequestParts, State},
    http::{header, request::Parts, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use std::sync::Arc;

use super::error::ApiError;
use crate::auth::{credentials, AuthError, Principal, PrincipalSource};
use crate::config::AuthStrategy;
use crate::db::{self, CredentialsRequest, UserResponse};
use crate::AppState;

/// Cookies an external identity provider's browser SDK may set
const EXTERNAL_COOKIE_NAMES: [&str; 2] = ["sb-access-token", "supabase-auth-token"];

/// Find the caller's token: `Authorization: Bearer` first, then cookies
pub fn extract_token(headers: &HeaderMap, cookie_names: &[&str]) -> Option<String> {
    if let Some(auth_header) = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
    {
        if let Some(token) = auth_header.strip_prefix("Bearer ") {
            let token = token.trim();
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }

    let jar = CookieJar::from_headers(headers);
    cookie_names
        .iter()
        .filter_map(|name| jar.get(name))
        .map(|c| c.value().to_string())
        .find(|v| !v.is_empty())
}

fn cookie_names(state: &AppState) -> Vec<&str> {
    let mut names = vec![state.config.auth.cookie_name.as_str()];
    if state.auth.strategy() == AuthStrategy::External {
        names.extend(EXTERNAL_COOKIE_NAMES);
    }
    names
}

fn session_cookie(state: &AppState, value: String) -> Cookie<'static> {
    Cookie::build((state.config.auth.cookie_name.clone(), value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.config.auth.cookie_secure)
        .build()
}

/// Auth middleware: resolves the caller and stores a [`Principal`] in the
/// request extensions
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_token(request.headers(), &cookie_names(&state)).ok_or(AuthError::Missing)?;

    let principal = state.auth.resolve(&token)?;

    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

/// Extractor for the authenticated caller.
///
/// Only valid behind [`auth_middleware`]; anywhere else it rejects with 401.
#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .ok_or_else(|| AuthError::Missing.into())
    }
}

/// Mirror an externally verified caller into the users table so records can
/// reference it. No-op for session principals.
pub async fn ensure_profile(state: &AppState, principal: &Principal) -> Result<(), ApiError> {
    if let PrincipalSource::External { email } = &principal.source {
        db::upsert_external_profile(&state.db, &principal.identity, email).await?;
    }
    Ok(())
}

/// Register a local account
pub async fn register(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let Json(request) = body?;

    let user = credentials::register(
        &state.db,
        &request.email,
        &request.password,
        state.config.auth.max_users,
    )
    .await?;

    tracing::info!(user_id = %user.id, "Registered user");
    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

/// Login endpoint; sets the session cookie
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    body: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<(CookieJar, Json<UserResponse>), ApiError> {
    let Json(request) = body?;

    let Some(sessions) = state.auth.sessions() else {
        return Err(ApiError::forbidden(
            "Local sign-in is disabled; use the identity provider",
        ));
    };

    let user = credentials::authenticate(&state.db, &request.email, &request.password).await?;

    let token = sessions.issue(&user.identity());
    tracing::info!(user_id = %user.id, "User logged in");

    Ok((
        jar.add(session_cookie(&state, token)),
        Json(UserResponse::from(user)),
    ))
}

/// Logout endpoint. Always succeeds; revokes whichever session token was
/// presented and clears the cookie.
pub async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar, headers: HeaderMap) -> impl IntoResponse {
    if let Some(sessions) = state.auth.sessions() {
        if let Some(token) = extract_token(&headers, &[state.config.auth.cookie_name.as_str()]) {
            sessions.revoke(&token);
        }
    }

    let jar = jar.remove(Cookie::build(state.config.auth.cookie_name.clone()).path("/"));
    (StatusCode::NO_CONTENT, jar)
}

/// The current caller
pub async fn me(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> Result<Json<UserResponse>, ApiError> {
    match &principal.source {
        PrincipalSource::External { email } => {
            ensure_profile(&state, &principal).await?;
            Ok(Json(UserResponse {
                id: principal.identity.to_string(),
                email: email.clone(),
            }))
        }
        PrincipalSource::Session => {
            let user = db::find_by_id(&state.db, &principal.identity)
                .await?
                .ok_or(AuthError::NotFound)?;
            Ok(Json(UserResponse::from(user)))
        }
    }
}
