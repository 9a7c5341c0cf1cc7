//! Public submission, tracking and attachment access.

mod common;

use axum::http::{StatusCode, header};
use common::*;
use murmur_types::Role;

#[tokio::test]
async fn submit_then_track_with_png_attachment() {
    let app = spawn_app();
    let png = png_bytes(1024);

    let created = submit_complaint(
        &app,
        "ระบบล่ม",
        &[FilePart::new("screenshot.png", "image/png", png.clone())],
    )
    .await;
    let code = created["trackingCode"].as_str().unwrap().to_string();
    assert!(code.starts_with("TRK-"));
    assert!(murmur_types::tracking::is_tracking_code(&code));
    assert!(created["id"].is_string());

    let response = app.send(get(&format!("/api/track/{code}"))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let tracked = body_json(response).await;
    assert_eq!(tracked["title"], "ระบบล่ม");
    assert_eq!(tracked["status"], "NEW");
    assert_eq!(tracked["category"], "TECHNICAL");
    assert_eq!(tracked["priority"], "HIGH");

    let attachments = tracked["attachments"].as_array().unwrap();
    assert_eq!(attachments.len(), 1);
    assert_eq!(attachments[0]["fileName"], "screenshot.png");
    assert_eq!(attachments[0]["fileSize"], 1024);
    assert_eq!(attachments[0]["mimeType"], "image/png");

    let url = attachments[0]["downloadUrl"].as_str().unwrap();
    assert!(url.ends_with(&format!("?code={code}")));

    let response = app.send(get(url)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    assert_eq!(response.headers()[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    assert!(
        response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .starts_with("attachment;")
    );
    assert_eq!(body_bytes(response).await, png);
}

#[tokio::test]
async fn download_requires_matching_code_or_staff_session() {
    let app = spawn_app();
    let first = submit_complaint(&app, "first", &[FilePart::new("a.png", "image/png", png_bytes(64))]).await;
    let second = submit_complaint(&app, "second", &[]).await;

    let code = first["trackingCode"].as_str().unwrap();
    let tracked = body_json(app.send(get(&format!("/api/track/{code}"))).await).await;
    let attachment_id = tracked["attachments"][0]["id"].as_str().unwrap().to_string();
    let base = format!("/api/attachments/{attachment_id}/download");

    // No credential at all
    assert_eq!(app.send(get(&base)).await.status(), StatusCode::FORBIDDEN);

    // A real code, but for a different complaint
    let other = second["trackingCode"].as_str().unwrap();
    let response = app.send(get(&format!("{base}?code={other}"))).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Staff can fetch without a code
    let token = app.token_for(Role::Viewer);
    assert_eq!(app.send(get_auth(&base, &token)).await.status(), StatusCode::OK);

    // Unknown attachment
    let missing = format!("/api/attachments/{}/download?code={code}", uuid::Uuid::new_v4());
    assert_eq!(app.send(get(&missing)).await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn renamed_text_is_rejected_and_nothing_is_stored() {
    let app = spawn_app();
    let response = app
        .send(multipart_request(
            "/api/complaints",
            &complaint_fields("fake image"),
            &[
                FilePart::new("ok.png", "image/png", png_bytes(32)),
                FilePart::new("fake.png", "image/png", b"plain text pretending".to_vec()),
            ],
        ))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["code"], "UPLOAD_REJECTED");
    assert!(body["error"].as_str().unwrap().contains("fake.png"));

    let (rows, total) = app.db().list_complaints(&Default::default()).unwrap();
    assert!(rows.is_empty());
    assert_eq!(total, 0);
    assert_eq!(app.stored_file_count(), 0);
}

#[tokio::test]
async fn double_extension_is_rejected() {
    let app = spawn_app();
    let response = app
        .send(multipart_request(
            "/api/complaints",
            &complaint_fields("sneaky"),
            &[FilePart::new("invoice.php.png", "image/png", png_bytes(32))],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("dangerous"));
}

#[tokio::test]
async fn zero_byte_parts_are_skipped() {
    let app = spawn_app();
    let created = submit_complaint(&app, "empty file", &[FilePart::new("empty.png", "image/png", Vec::new())]).await;
    let code = created["trackingCode"].as_str().unwrap();

    let tracked = body_json(app.send(get(&format!("/api/track/{code}"))).await).await;
    assert!(tracked["attachments"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn file_count_is_capped_before_validation() {
    let app = spawn_app_with(|config| config.max_files = 2);
    // The third part is invalid too, but the count cap is reported first.
    let response = app
        .send(multipart_request(
            "/api/complaints",
            &complaint_fields("too many"),
            &[
                FilePart::new("a.png", "image/png", png_bytes(16)),
                FilePart::new("b.png", "image/png", png_bytes(16)),
                FilePart::new("c.exe", "application/x-msdownload", vec![1, 2, 3]),
            ],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert!(body["error"].as_str().unwrap().contains("Too many files"));
}

#[tokio::test]
async fn missing_fields_are_validation_errors() {
    let app = spawn_app();
    let response = app
        .send(multipart_request(
            "/api/complaints",
            &[("title", "only a title")],
            &[],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn sixth_submission_in_a_window_is_rate_limited() {
    let app = spawn_app();
    for i in 0..5 {
        submit_complaint(&app, &format!("complaint {i}"), &[]).await;
    }

    let response = app
        .send(multipart_request("/api/complaints", &complaint_fields("one too many"), &[]))
        .await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body_json(response).await["code"], "RATE_LIMITED");

    // Another client still has its full quota.
    let mut request = multipart_request("/api/complaints", &complaint_fields("other client"), &[]);
    request
        .headers_mut()
        .insert("x-forwarded-for", "198.51.100.20".parse().unwrap());
    assert_eq!(app.send(request).await.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn shared_backend_limits_through_the_database() {
    let app = spawn_app_with(|config| {
        config.rate_limit_backend = murmur_api::config::RateLimitBackendKind::Shared;
        config.submit_rate.limit = 1;
    });
    submit_complaint(&app, "first", &[]).await;
    let response = app
        .send(multipart_request("/api/complaints", &complaint_fields("second"), &[]))
        .await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn attachments_can_be_added_later_with_the_code() {
    let app = spawn_app();
    let created = submit_complaint(&app, "follow up", &[]).await;
    let code = created["trackingCode"].as_str().unwrap();

    let response = app
        .send(multipart_request(
            &format!("/api/complaints/{}/attachments", code.to_lowercase()),
            &[],
            &[FilePart::new("notes.txt", "text/plain", b"more detail".to_vec())],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["trackingCode"], code);
    assert_eq!(body["attachments"].as_array().unwrap().len(), 1);

    let tracked = body_json(app.send(get(&format!("/api/track/{code}"))).await).await;
    assert_eq!(tracked["attachments"][0]["fileName"], "notes.txt");
    assert_eq!(app.stored_file_count(), 1);
}

#[tokio::test]
async fn unknown_codes_are_not_found() {
    let app = spawn_app();
    let response = app.send(get("/api/track/TRK-ABC-DEF123")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "NOT_FOUND");

    let response = app
        .send(multipart_request(
            "/api/complaints/TRK-ABC-DEF123/attachments",
            &[],
            &[FilePart::new("notes.txt", "text/plain", b"x".to_vec())],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_reports_ok() {
    let app = spawn_app();
    let response = app.send(get("/health")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");
}

#[tokio::test]
async fn failed_file_write_leaves_no_complaint() {
    // A regular file where the upload directory should be.
    let blocker = tempfile::NamedTempFile::new().unwrap();
    let app = spawn_app_with(|config| config.upload_dir = blocker.path().join("uploads"));

    let response = app
        .send(multipart_request(
            "/api/complaints",
            &complaint_fields("disk full"),
            &[FilePart::new("a.png", "image/png", png_bytes(64))],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["code"], "INTERNAL_ERROR");

    let (_, total) = app
        .db()
        .list_complaints(&murmur_db::models::ComplaintFilter::default())
        .unwrap();
    assert_eq!(total, 0);
}

#[tokio::test]
async fn unrecorded_attachments_are_removed_from_disk() {
    let app = spawn_app();
    let files = vec![
        murmur_api::upload::UploadedFile::new("a.png", "image/png", png_bytes(64)),
        murmur_api::upload::UploadedFile::new("b.png", "image/png", png_bytes(64)),
    ];

    // No complaint with this id, so recording the rows fails.
    let result = murmur_api::upload::store_attachments(&app.state, "no-such-complaint", files).await;
    assert!(result.is_err());
    assert_eq!(app.stored_file_count(), 0);
}

#[tokio::test]
async fn display_names_are_sanitized_when_stored() {
    let app = spawn_app();
    let created = submit_complaint(
        &app,
        "odd name",
        &[FilePart::new("Report Final (v2).PNG", "image/png", png_bytes(64))],
    )
    .await;
    let code = created["trackingCode"].as_str().unwrap();

    let tracked = body_json(app.send(get(&format!("/api/track/{code}"))).await).await;
    assert_eq!(tracked["attachments"][0]["fileName"], "report_final_v2_.png");
}

#[tokio::test]
async fn non_multipart_submission_is_a_validation_error() {
    let app = spawn_app();
    let response = app
        .send(json_request("POST", "/api/complaints", None, serde_json::json!({ "title": "t" })))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
}
