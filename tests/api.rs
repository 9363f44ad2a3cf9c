//! End-to-end tests driving the real router over an in-memory database.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

use poppo::auth::Authenticator;
use poppo::chat::{GenerationError, TextGenerator};
use poppo::config::{AuthStrategy, Config};
use poppo::storage::UploadStore;
use poppo::AppState;

const BOUNDARY: &str = "poppo-test-boundary";
const JWT_SECRET: &str = "test-provider-secret";

/// Records every prompt and answers with a fixed reply (or fails)
struct FakeGenerator {
    reply: Option<String>,
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl TextGenerator for FakeGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        self.prompts.lock().push(prompt.to_string());
        match &self.reply {
            Some(reply) => Ok(reply.clone()),
            None => Err(GenerationError::Status {
                status: 503,
                body: "model overloaded".to_string(),
            }),
        }
    }
}

struct TestApp {
    router: Router,
    generator: Arc<FakeGenerator>,
    uploads: TempDir,
}

struct TestResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl TestResponse {
    fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    fn session_token(&self) -> String {
        let cookie = self
            .headers
            .get(header::SET_COOKIE)
            .expect("no session cookie set")
            .to_str()
            .unwrap();
        cookie
            .split(';')
            .next()
            .and_then(|pair| pair.strip_prefix("poppo_session="))
            .unwrap()
            .to_string()
    }
}

fn test_config(uploads: &TempDir) -> Config {
    let mut config = Config::default();
    config.uploads.dir = uploads.path().to_path_buf();
    config.uploads.max_file_bytes = 1024;
    config.auth.max_users = 3;
    config
}

async fn spawn_with(config: Config, uploads: TempDir, reply: Option<&str>) -> TestApp {
    let db = poppo::db::init_in_memory().await.unwrap();
    let auth = Authenticator::from_config(&config.auth).unwrap();
    let store = UploadStore::new(&config.uploads.dir, config.uploads.max_file_bytes);
    let generator = Arc::new(FakeGenerator {
        reply: reply.map(str::to_string),
        prompts: Mutex::new(Vec::new()),
    });

    let state = AppState::new(config, db, auth, store, generator.clone());
    TestApp {
        router: poppo::api::create_router(Arc::new(state)),
        generator,
        uploads,
    }
}

async fn spawn_app() -> TestApp {
    let uploads = tempfile::tempdir().unwrap();
    let config = test_config(&uploads);
    spawn_with(config, uploads, Some("hello")).await
}

async fn spawn_external_app() -> TestApp {
    let uploads = tempfile::tempdir().unwrap();
    let mut config = test_config(&uploads);
    config.auth.strategy = AuthStrategy::External;
    config.auth.jwt_secret = Some(JWT_SECRET.to_string());
    spawn_with(config, uploads, Some("hello")).await
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.unwrap().to_bytes().to_vec();
        TestResponse {
            status,
            headers,
            body,
        }
    }

    async fn json(&self, method: Method, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }

    async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    async fn delete(&self, uri: &str, token: &str) -> TestResponse {
        let request = Request::builder()
            .method(Method::DELETE)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    async fn form(
        &self,
        method: Method,
        uri: &str,
        token: &str,
        fields: &[(&str, &str)],
        image: Option<(&str, &[u8])>,
    ) -> TestResponse {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(multipart_body(fields, image)))
            .unwrap();
        self.send(request).await
    }

    async fn register(&self, email: &str, password: &str) -> TestResponse {
        self.json(
            Method::POST,
            "/api/register",
            None,
            json!({ "email": email, "password": password }),
        )
        .await
    }

    async fn login(&self, email: &str, password: &str) -> TestResponse {
        self.json(
            Method::POST,
            "/api/login",
            None,
            json!({ "email": email, "password": password }),
        )
        .await
    }

    /// Register and log in, returning the session token
    async fn user(&self, email: &str) -> String {
        assert_eq!(self.register(email, "pw-123456").await.status, StatusCode::CREATED);
        let login = self.login(email, "pw-123456").await;
        assert_eq!(login.status, StatusCode::OK);
        login.session_token()
    }

    async fn create(&self, token: &str, name: &str) -> i64 {
        let response = self
            .form(
                Method::POST,
                "/api/plushies",
                token,
                &[("name", name), ("kind", "rabbit")],
                None,
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED);
        response.json()["id"].as_i64().unwrap()
    }

    async fn list(&self, token: &str) -> Vec<Value> {
        let response = self.get("/api/plushies", Some(token)).await;
        assert_eq!(response.status, StatusCode::OK);
        response.json().as_array().unwrap().clone()
    }

    fn stored_files(&self) -> usize {
        std::fs::read_dir(self.uploads.path()).map_or(0, |d| d.count())
    }
}

fn multipart_body(fields: &[(&str, &str)], image: Option<(&str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    if let Some((file_name, data)) = image {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                BOUNDARY, file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn external_token(sub: &str, email: &str, exp_offset_secs: i64) -> String {
    let claims = json!({
        "sub": sub,
        "email": email,
        "exp": chrono::Utc::now().timestamp() + exp_offset_secs,
    });
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap()
}

// -------------------------------------------------------------------------
// Accounts and sessions
// -------------------------------------------------------------------------

#[tokio::test]
async fn test_health() {
    let app = spawn_app().await;
    let response = app.get("/health", None).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, b"OK");
}

#[tokio::test]
async fn test_register_login_me_with_cookie() {
    let app = spawn_app().await;

    let registered = app.register("mika@example.com", "fluffy").await;
    assert_eq!(registered.status, StatusCode::CREATED);
    let id = registered.json()["id"].as_str().unwrap().to_string();
    assert_eq!(registered.json()["email"], "mika@example.com");

    let login = app.login("mika@example.com", "fluffy").await;
    assert_eq!(login.status, StatusCode::OK);
    assert_eq!(login.json()["id"], id.as_str());
    let set_cookie = login.headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("SameSite=Lax"));

    let request = Request::builder()
        .uri("/api/me")
        .header(header::COOKIE, format!("poppo_session={}", login.session_token()))
        .body(Body::empty())
        .unwrap();
    let me = app.send(request).await;

    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.json(), json!({ "id": id, "email": "mika@example.com" }));
}

#[tokio::test]
async fn test_bearer_token_resolves_same_session() {
    let app = spawn_app().await;
    let token = app.user("mika@example.com").await;

    let me = app.get("/api/me", Some(&token)).await;

    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.json()["email"], "mika@example.com");
}

#[tokio::test]
async fn test_wrong_password_twice_is_two_401s() {
    let app = spawn_app().await;
    app.register("mika@example.com", "fluffy").await;

    for _ in 0..2 {
        let response = app.login("mika@example.com", "not-fluffy").await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert!(response.headers.get(header::SET_COOKIE).is_none());
    }

    let unknown = app.login("nobody@example.com", "fluffy").await;
    assert_eq!(unknown.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_fourth_registration_hits_cap() {
    let app = spawn_app().await;
    for i in 0..3 {
        let response = app.register(&format!("user{}@example.com", i), "pw").await;
        assert_eq!(response.status, StatusCode::CREATED);
    }

    let response = app.register("user3@example.com", "pw").await;

    assert_eq!(response.status, StatusCode::FORBIDDEN);
    let message = response.json()["error"]["message"].as_str().unwrap().to_string();
    assert!(message.contains('3'), "message was: {}", message);
}

#[tokio::test]
async fn test_registration_input_errors() {
    let app = spawn_app().await;

    assert_eq!(app.register("", "pw").await.status, StatusCode::BAD_REQUEST);
    assert_eq!(app.register("a@b.c", "").await.status, StatusCode::BAD_REQUEST);

    app.register("dup@example.com", "pw").await;
    assert_eq!(app.register("dup@example.com", "pw").await.status, StatusCode::CONFLICT);

    let malformed = Request::builder()
        .method(Method::POST)
        .uri("/api/register")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    assert_eq!(app.send(malformed).await.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_logout_revokes_session() {
    let app = spawn_app().await;
    let token = app.user("mika@example.com").await;
    assert_eq!(app.get("/api/me", Some(&token)).await.status, StatusCode::OK);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/logout")
        .header(header::COOKIE, format!("poppo_session={}", token))
        .body(Body::empty())
        .unwrap();
    let logout = app.send(request).await;

    assert_eq!(logout.status, StatusCode::NO_CONTENT);
    let cleared = logout.headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(cleared.starts_with("poppo_session=;"));

    assert_eq!(app.get("/api/me", Some(&token)).await.status, StatusCode::UNAUTHORIZED);

    // Logging out again is harmless
    let again = app.json(Method::POST, "/api/logout", Some(&token), json!({})).await;
    assert_eq!(again.status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let app = spawn_app().await;

    let missing = app.get("/api/plushies", None).await;
    assert_eq!(missing.status, StatusCode::UNAUTHORIZED);
    assert_eq!(missing.json()["error"]["code"], "unauthorized");

    let bogus = app.get("/api/plushies", Some("deadbeef")).await;
    assert_eq!(bogus.status, StatusCode::UNAUTHORIZED);
    assert_ne!(
        missing.json()["error"]["message"],
        bogus.json()["error"]["message"]
    );
}

// -------------------------------------------------------------------------
// Plushie records
// -------------------------------------------------------------------------

#[tokio::test]
async fn test_create_get_update_delete() {
    let app = spawn_app().await;
    let token = app.user("mika@example.com").await;

    let response = app
        .form(
            Method::POST,
            "/api/plushies",
            &token,
            &[("name", "Usagi"), ("kind", "rabbit"), ("adopted_at", "2024-03-01")],
            None,
        )
        .await;
    assert_eq!(response.status, StatusCode::CREATED);
    let id = response.json()["id"].as_i64().unwrap();

    let fetched = app.get(&format!("/api/plushies/{}", id), Some(&token)).await;
    assert_eq!(fetched.status, StatusCode::OK);
    let record = fetched.json();
    assert_eq!(record["name"], "Usagi");
    assert_eq!(record["kind"], "rabbit");
    assert_eq!(record["adopted_at"], "2024-03-01");
    assert!(record["image_url"].is_null());
    assert!(record.get("user_id").is_none());

    let updated = app
        .form(
            Method::PUT,
            &format!("/api/plushies/{}", id),
            &token,
            &[("name", "Usagi-chan"), ("kind", "rabbit")],
            None,
        )
        .await;
    assert_eq!(updated.status, StatusCode::NO_CONTENT);
    let record = app.get(&format!("/api/plushies/{}", id), Some(&token)).await.json();
    assert_eq!(record["name"], "Usagi-chan");
    assert!(record["adopted_at"].is_null());

    let deleted = app.delete(&format!("/api/plushies/{}", id), &token).await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);
    assert_eq!(
        app.get(&format!("/api/plushies/{}", id), Some(&token)).await.status,
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_list_newest_first() {
    let app = spawn_app().await;
    let token = app.user("mika@example.com").await;
    let first = app.create(&token, "Usagi").await;
    let second = app.create(&token, "Kuma").await;

    let ids: Vec<i64> = app
        .list(&token)
        .await
        .iter()
        .map(|p| p["id"].as_i64().unwrap())
        .collect();

    assert_eq!(ids, vec![second, first]);
}

#[tokio::test]
async fn test_other_owners_records_look_missing() {
    let app = spawn_app().await;
    let alice = app.user("alice@example.com").await;
    let bob = app.user("bob@example.com").await;
    let id = app.create(&alice, "Usagi").await;
    let uri = format!("/api/plushies/{}", id);

    assert!(app.list(&bob).await.is_empty());
    assert_eq!(app.get(&uri, Some(&bob)).await.status, StatusCode::NOT_FOUND);
    assert_eq!(
        app.form(Method::PUT, &uri, &bob, &[("name", "Stolen")], None)
            .await
            .status,
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        app.json(
            Method::PUT,
            &format!("{}/conversation", uri),
            Some(&bob),
            json!({ "conversation_history": "mine now" })
        )
        .await
        .status,
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        app.json(Method::POST, &format!("{}/chat", uri), Some(&bob), json!({}))
            .await
            .status,
        StatusCode::NOT_FOUND
    );
    assert_eq!(app.delete(&uri, &bob).await.status, StatusCode::NOT_FOUND);

    let record = app.get(&uri, Some(&alice)).await.json();
    assert_eq!(record["name"], "Usagi");
    assert!(record["conversation_history"].is_null());
    assert!(app.generator.prompts.lock().is_empty());
}

#[tokio::test]
async fn test_empty_name_rejected_without_row() {
    let app = spawn_app().await;
    let token = app.user("mika@example.com").await;

    let response = app
        .form(
            Method::POST,
            "/api/plushies",
            &token,
            &[("name", "   "), ("kind", "bear")],
            Some(("bear.png", b"png-bytes".as_slice())),
        )
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["error"]["code"], "validation_error");
    assert!(app.list(&token).await.is_empty());
    assert_eq!(app.stored_files(), 0);
}

#[tokio::test]
async fn test_bad_adoption_date_rejected() {
    let app = spawn_app().await;
    let token = app.user("mika@example.com").await;

    let response = app
        .form(
            Method::POST,
            "/api/plushies",
            &token,
            &[("name", "Kuma"), ("adopted_at", "yesterday")],
            None,
        )
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(app.list(&token).await.is_empty());
}

#[tokio::test]
async fn test_oversized_upload_rejected_without_row() {
    let app = spawn_app().await;
    let token = app.user("mika@example.com").await;
    let big = vec![7u8; 2048];

    let response = app
        .form(
            Method::POST,
            "/api/plushies",
            &token,
            &[("name", "Kuma")],
            Some(("huge.png", big.as_slice())),
        )
        .await;

    assert_eq!(response.status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(app.list(&token).await.is_empty());
    assert_eq!(app.stored_files(), 0);
}

#[tokio::test]
async fn test_uploaded_image_served_byte_identical() {
    let app = spawn_app().await;
    let token = app.user("mika@example.com").await;
    let image: Vec<u8> = (0..=255u8).cycle().take(700).collect();

    let created = app
        .form(
            Method::POST,
            "/api/plushies",
            &token,
            &[("name", "Usagi")],
            Some(("usagi.PNG", image.as_slice())),
        )
        .await;
    assert_eq!(created.status, StatusCode::CREATED);
    let id = created.json()["id"].as_i64().unwrap();

    let record = app.get(&format!("/api/plushies/{}", id), Some(&token)).await.json();
    let url = record["image_url"].as_str().unwrap().to_string();
    assert!(url.starts_with("/uploads/"));
    assert!(url.ends_with(".png"));
    assert!(!url.contains("usagi"));

    let served = app.get(&url, None).await;
    assert_eq!(served.status, StatusCode::OK);
    assert_eq!(served.body, image);
}

#[tokio::test]
async fn test_replaced_and_deleted_images_are_cleaned_up() {
    let app = spawn_app().await;
    let token = app.user("mika@example.com").await;

    let created = app
        .form(
            Method::POST,
            "/api/plushies",
            &token,
            &[("name", "Usagi")],
            Some(("a.jpg", b"first".as_slice())),
        )
        .await;
    let id = created.json()["id"].as_i64().unwrap();
    let uri = format!("/api/plushies/{}", id);
    assert_eq!(app.stored_files(), 1);

    // No new image keeps the old one
    app.form(Method::PUT, &uri, &token, &[("name", "Usagi")], None).await;
    let kept = app.get(&uri, Some(&token)).await.json()["image_url"].clone();
    assert!(kept.is_string());

    let replaced = app
        .form(
            Method::PUT,
            &uri,
            &token,
            &[("name", "Usagi")],
            Some(("b.jpg", b"second".as_slice())),
        )
        .await;
    assert_eq!(replaced.status, StatusCode::NO_CONTENT);
    let url = app.get(&uri, Some(&token)).await.json()["image_url"]
        .as_str()
        .unwrap()
        .to_string();
    assert_ne!(Value::String(url.clone()), kept);
    assert_eq!(app.get(&url, None).await.body, b"second");
    assert_eq!(app.stored_files(), 1);

    app.delete(&uri, &token).await;
    assert_eq!(app.stored_files(), 0);
}

#[tokio::test]
async fn test_invalid_id_is_bad_request() {
    let app = spawn_app().await;
    let token = app.user("mika@example.com").await;

    let response = app.get("/api/plushies/not-a-number", Some(&token)).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["error"]["message"], "Invalid ID");
}

// -------------------------------------------------------------------------
// Conversation and chat
// -------------------------------------------------------------------------

#[tokio::test]
async fn test_chat_without_history() {
    let app = spawn_app().await;
    let token = app.user("mika@example.com").await;
    let id = app.create(&token, "Usagi").await;

    let response = app
        .json(
            Method::POST,
            &format!("/api/plushies/{}/chat", id),
            Some(&token),
            json!({}),
        )
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json(), json!({ "message": "hello" }));

    let prompts = app.generator.prompts.lock();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("Usagi"));
    assert!(!prompts[0].contains("Past conversation"));
}

#[tokio::test]
async fn test_chat_includes_saved_conversation_and_does_not_store_reply() {
    let app = spawn_app().await;
    let token = app.user("mika@example.com").await;
    let id = app.create(&token, "Kuma").await;

    let saved = app
        .json(
            Method::PUT,
            &format!("/api/plushies/{}/conversation", id),
            Some(&token),
            json!({ "conversation_history": "me: good night\nKuma: sleep well" }),
        )
        .await;
    assert_eq!(saved.status, StatusCode::NO_CONTENT);

    app.json(
        Method::POST,
        &format!("/api/plushies/{}/chat", id),
        Some(&token),
        json!({}),
    )
    .await;

    let prompt = app.generator.prompts.lock()[0].clone();
    assert!(prompt.contains("Past conversation"));
    assert!(prompt.contains("me: good night\nKuma: sleep well"));

    let record = app.get(&format!("/api/plushies/{}", id), Some(&token)).await.json();
    assert_eq!(record["conversation_history"], "me: good night\nKuma: sleep well");
}

#[tokio::test]
async fn test_upstream_failure_is_500_with_detail() {
    let uploads = tempfile::tempdir().unwrap();
    let config = test_config(&uploads);
    let app = spawn_with(config, uploads, None).await;
    let token = app.user("mika@example.com").await;
    let id = app.create(&token, "Usagi").await;

    let response = app
        .json(
            Method::POST,
            &format!("/api/plushies/{}/chat", id),
            Some(&token),
            json!({}),
        )
        .await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    let body = response.json();
    assert_eq!(body["error"]["code"], "upstream_error");
    assert!(body["error"]["details"]["upstream"]
        .as_str()
        .unwrap()
        .contains("model overloaded"));
}

// -------------------------------------------------------------------------
// External identity provider
// -------------------------------------------------------------------------

#[tokio::test]
async fn test_external_token_grants_access() {
    let app = spawn_external_app().await;
    let sub = "6a1f0c2e-aaaa-bbbb-cccc-0123456789ab";
    let token = external_token(sub, "mika@example.com", 3600);

    let me = app.get("/api/me", Some(&token)).await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.json(), json!({ "id": sub, "email": "mika@example.com" }));

    let id = app.create(&token, "Usagi").await;
    let record = app.get(&format!("/api/plushies/{}", id), Some(&token)).await;
    assert_eq!(record.status, StatusCode::OK);

    // Another subject cannot see it
    let other = external_token("someone-else", "x@example.com", 3600);
    assert_eq!(
        app.get(&format!("/api/plushies/{}", id), Some(&other)).await.status,
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_external_provider_cookie_accepted() {
    let app = spawn_external_app().await;
    let token = external_token("cookie-user", "c@example.com", 3600);

    let request = Request::builder()
        .uri("/api/me")
        .header(header::COOKIE, format!("sb-access-token={}", token))
        .body(Body::empty())
        .unwrap();

    assert_eq!(app.send(request).await.status, StatusCode::OK);
}

#[tokio::test]
async fn test_external_expired_and_forged_tokens_rejected() {
    let app = spawn_external_app().await;

    let expired = external_token("sub-1", "a@example.com", -60);
    assert_eq!(app.get("/api/me", Some(&expired)).await.status, StatusCode::UNAUTHORIZED);

    let forged = encode(
        &Header::new(Algorithm::HS256),
        &json!({ "sub": "sub-1", "exp": chrono::Utc::now().timestamp() + 3600 }),
        &EncodingKey::from_secret(b"not-the-secret"),
    )
    .unwrap();
    assert_eq!(app.get("/api/me", Some(&forged)).await.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_external_mode_disables_local_login() {
    let app = spawn_external_app().await;

    let response = app.login("mika@example.com", "pw").await;

    assert_eq!(response.status, StatusCode::FORBIDDEN);
}
