mod common;

use std::time::Duration;

use axum::http::StatusCode;
use common::*;
use murmur_types::Role;
use serde_json::json;

fn login(email: &str, password: &str) -> axum::http::Request<axum::body::Body> {
    json_request(
        "POST",
        "/api/auth/login",
        None,
        json!({ "email": email, "password": password }),
    )
}

#[tokio::test]
async fn login_returns_a_usable_token() {
    let app = spawn_app();
    let id = app.create_user("admin@example.com", Role::Admin, true);

    let response = app.send(login("Admin@Example.com ", TEST_PASSWORD)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["expiresIn"], 3600);
    assert_eq!(body["user"]["id"], id.to_string());
    assert_eq!(body["user"]["role"], "ADMIN");

    let token = body["token"].as_str().unwrap();
    let me = body_json(app.send(get_auth("/api/auth/me", token)).await).await;
    assert_eq!(me["email"], "admin@example.com");

    let user = app.db().get_user_by_id(&id.to_string()).unwrap().unwrap();
    assert!(user.last_login_at.is_some());
}

#[tokio::test]
async fn bad_credentials_are_unauthorized() {
    let app = spawn_app();
    app.create_user("viewer@example.com", Role::Viewer, true);

    let response = app.send(login("viewer@example.com", "wrong password")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.send(login("nobody@example.com", TEST_PASSWORD)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn inactive_accounts_are_forbidden() {
    let app = spawn_app();
    app.create_user("former@example.com", Role::Admin, false);

    let response = app.send(login("former@example.com", TEST_PASSWORD)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn login_attempts_are_rate_limited() {
    let app = spawn_app_with(|config| config.login_rate.limit = 2);
    for _ in 0..2 {
        let response = app.send(login("x@example.com", "nope")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
    let response = app.send(login("x@example.com", "nope")).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn sweeping_short_windows_keeps_login_windows() {
    let app = spawn_app_with(|config| {
        config.login_rate.limit = 2;
        config.submit_rate.window = Duration::from_millis(10);
    });
    for _ in 0..2 {
        app.send(login("x@example.com", "nope")).await;
    }
    assert_eq!(
        app.send(login("x@example.com", "nope")).await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );

    // Older than the submit window, well inside the login window.
    tokio::time::sleep(Duration::from_millis(30)).await;
    for limiter in app.state.limiters() {
        limiter.sweep().await.unwrap();
    }

    assert_eq!(
        app.send(login("x@example.com", "nope")).await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );
}

#[tokio::test]
async fn malformed_login_bodies_are_validation_errors() {
    let app = spawn_app();
    let response = app
        .send(json_request("POST", "/api/auth/login", None, json!({ "email": 42 })))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn me_requires_a_session() {
    let app = spawn_app();
    assert_eq!(
        app.send(get("/api/auth/me")).await.status(),
        StatusCode::UNAUTHORIZED
    );
}
