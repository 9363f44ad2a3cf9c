pub mod auth;
pub mod error;
mod plushies;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::AppState;
use error::ApiError;

/// Room for the text fields and multipart framing around the image
const FORM_OVERHEAD_BYTES: usize = 1 << 20;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Account routes (public)
    let account_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout));

    // Protected API routes
    let protected_routes = Router::new()
        .route("/me", get(auth::me))
        .route(
            "/plushies",
            get(plushies::list_plushies).post(plushies::create_plushie),
        )
        .route(
            "/plushies/:id",
            get(plushies::get_plushie)
                .put(plushies::update_plushie)
                .delete(plushies::delete_plushie),
        )
        .route(
            "/plushies/:id/conversation",
            put(plushies::update_conversation),
        )
        .route("/plushies/:id/chat", post(plushies::chat))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    let body_limit = state.uploads.max_file_bytes() + FORM_OVERHEAD_BYTES;
    let cors = cors_layer(&state.config.server.cors_origins);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", account_routes.merge(protected_routes))
        .nest_service("/uploads", ServeDir::new(state.uploads.root()))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(CatchPanicLayer::custom(handle_panic))
        .with_state(state)
}

/// Credentialed CORS for the configured front-end origins
fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(300))
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!(panic = %detail, "Request handler panicked");

    ApiError::internal("Internal server error").into_response()
}

async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}
