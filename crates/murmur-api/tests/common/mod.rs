#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, header};
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

use murmur_api::session::issue_token;
use murmur_api::{AppState, AppStateInner, Config};
use murmur_db::Database;
use murmur_types::Role;
use murmur_types::api::SessionUser;

pub const TEST_SECRET: &str = "integration-test-secret";
pub const TEST_PASSWORD: &str = "correct horse battery";
const BOUNDARY: &str = "murmur-test-boundary";

/// A fully wired application over an in-memory database and a temporary
/// upload directory that is removed on drop.
pub struct TestApp {
    pub state: AppState,
    pub router: Router,
    _uploads: TempDir,
}

pub fn test_config(upload_dir: &std::path::Path) -> Config {
    Config {
        jwt_secret: TEST_SECRET.to_string(),
        upload_dir: upload_dir.join("uploads"),
        ..Config::default()
    }
}

pub fn spawn_app() -> TestApp {
    spawn_app_with(|_| {})
}

pub fn spawn_app_with(customize: impl FnOnce(&mut Config)) -> TestApp {
    let uploads = tempfile::tempdir().expect("temp dir");
    let mut config = test_config(uploads.path());
    customize(&mut config);

    let db = Arc::new(Database::open_in_memory().expect("in-memory db"));
    let state = AppStateInner::new(db, config, None);
    let router = murmur_api::app(state.clone());

    TestApp {
        state,
        router,
        _uploads: uploads,
    }
}

impl TestApp {
    pub fn db(&self) -> &Database {
        &self.state.db
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    /// Insert a staff user with [`TEST_PASSWORD`] and return its id.
    pub fn create_user(&self, email: &str, role: Role, active: bool) -> Uuid {
        let id = Uuid::new_v4();
        let hash = murmur_api::auth::hash_password(TEST_PASSWORD).expect("hash");
        self.db()
            .create_user(&id.to_string(), email, &hash, role, active)
            .expect("create user");
        id
    }

    /// Create an active user with `role` and return a bearer token for it.
    pub fn token_for(&self, role: Role) -> String {
        let email = format!("{}@example.com", Uuid::new_v4().simple());
        let id = self.create_user(&email, role, true);
        self.token_for_user(id, &email, role)
    }

    pub fn token_for_user(&self, id: Uuid, email: &str, role: Role) -> String {
        let user = SessionUser {
            id,
            email: email.to_string(),
            role,
        };
        issue_token(TEST_SECRET, Duration::from_secs(3600), &user).expect("token")
    }

    pub fn stored_file_count(&self) -> usize {
        std::fs::read_dir(&self.state.config.upload_dir)
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

// -- Request builders --

pub fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

pub fn get_auth(uri: &str, token: &str) -> Request<Body> {
    Request::get(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

pub fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn send_auth(method: &str, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

/// A file part for [`multipart_request`].
pub struct FilePart<'a> {
    pub field: &'a str,
    pub file_name: &'a str,
    pub content_type: &'a str,
    pub data: Vec<u8>,
}

impl<'a> FilePart<'a> {
    pub fn new(file_name: &'a str, content_type: &'a str, data: Vec<u8>) -> Self {
        Self {
            field: "files",
            file_name,
            content_type,
            data,
        }
    }
}

pub fn multipart_body(fields: &[(&str, &str)], files: &[FilePart<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    for file in files {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                file.field, file.file_name, file.content_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(&file.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn multipart_request(uri: &str, fields: &[(&str, &str)], files: &[FilePart<'_>]) -> Request<Body> {
    Request::post(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(fields, files)))
        .unwrap()
}

/// Standard valid complaint fields.
pub fn complaint_fields(title: &str) -> Vec<(&str, &str)> {
    vec![
        ("title", title),
        ("description", "The reporting system has been down since morning."),
        ("category", "TECHNICAL"),
        ("priority", "HIGH"),
    ]
}

/// A PNG signature padded to `len` bytes.
pub fn png_bytes(len: usize) -> Vec<u8> {
    let mut data = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
    data.resize(len.max(8), 0);
    data
}

// -- Response helpers --

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).expect("json body")
}

/// Submit a complaint through the public endpoint and return its JSON reply.
pub async fn submit_complaint(app: &TestApp, title: &str, files: &[FilePart<'_>]) -> Value {
    let response = app
        .send(multipart_request("/api/complaints", &complaint_fields(title), files))
        .await;
    assert_eq!(response.status(), 201, "submission should succeed");
    body_json(response).await
}

/// Poll `check` until it returns true or two seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
