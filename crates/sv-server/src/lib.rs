pub mod error;
pub mod server;
pub mod session;

pub use server::{AppState, Caller, SecureVisionServer, router};
pub use session::SessionStore;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use sv_engine::{DocumentService, ServiceSettings};
    use sv_security::Codec;
    use sv_storage::{FileStore, Storage};
    use tempfile::TempDir;
    use tower::ServiceExt;

    const BOUNDARY: &str = "sv-test-boundary";

    async fn create_test_app() -> (Router, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::in_memory().await.unwrap();
        let files = FileStore::new(dir.path().join("uploads")).unwrap();
        let service = DocumentService::new(
            storage,
            files,
            Codec::new("test passphrase"),
            ServiceSettings::default(),
        );
        (router(AppState::new(service, 24)), dir)
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body.to_vec())
    }

    async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let (status, body) = send(app, request).await;
        let value = if body.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, value)
    }

    fn post_json(uri: &str, token: Option<&str>, body: serde_json::Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get(uri: &str, token: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap()
    }

    fn upload_request(token: &str, filename: &str, content: &str, encrypt: bool) -> Request<Body> {
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\n\
             Content-Type: text/plain\r\n\r\n{c}\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"encrypt\"\r\n\r\n{e}\r\n\
             --{b}--\r\n",
            b = BOUNDARY,
            f = filename,
            c = content,
            e = encrypt,
        );
        Request::builder()
            .method("POST")
            .uri("/api/files")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::from(body))
            .unwrap()
    }

    async fn register_and_login(app: &Router, email: &str) -> String {
        let (status, _) = send_json(
            app,
            post_json(
                "/api/register",
                None,
                serde_json::json!({
                    "email": email,
                    "password": "password123",
                    "password2": "password123"
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send_json(
            app,
            post_json(
                "/api/login",
                None,
                serde_json::json!({ "email": email, "password": "password123" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        body["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_info() {
        let (app, _dir) = create_test_app().await;
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let (status, body) = send_json(&app, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "secure-vision");
    }

    #[tokio::test]
    async fn test_requires_authentication() {
        let (app, _dir) = create_test_app().await;
        let request = Request::builder()
            .uri("/api/files")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send_json(&app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send_json(&app, get("/api/files", "made-up-token")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_register_validation_and_login_failure() {
        let (app, _dir) = create_test_app().await;
        let (status, body) = send_json(
            &app,
            post_json(
                "/api/register",
                None,
                serde_json::json!({ "email": "bad", "password": "short", "password2": "x" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["fields"].as_array().unwrap().len(), 3);

        let (status, _) = send_json(
            &app,
            post_json(
                "/api/login",
                None,
                serde_json::json!({ "email": "nobody@example.com", "password": "password123" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_logout_revokes_token() {
        let (app, _dir) = create_test_app().await;
        let token = register_and_login(&app, "alice@example.com").await;

        let (status, _) = send_json(&app, post_json("/api/logout", Some(&token), serde_json::json!({}))).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send_json(&app, get("/api/files", &token)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_upload_view_and_download() {
        let (app, _dir) = create_test_app().await;
        let token = register_and_login(&app, "alice@example.com").await;

        let (status, record) = send_json(
            &app,
            upload_request(&token, "notes.txt", "call 555-123-4567", false),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(record["has_sensitive_data"], true);
        assert_eq!(record["sensitive_data_types"], "phone");
        let id = record["id"].as_i64().unwrap();

        // unsubscribed: raw content
        let (status, view) = send_json(&app, get(&format!("/api/files/{}", id), &token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["content"], "call 555-123-4567");
        assert_eq!(view["masked"], false);

        // history is a subscriber feature
        let (status, _) = send_json(&app, get(&format!("/api/files/{}/history", id), &token)).await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);

        let (status, user) = send_json(&app, post_json("/api/subscription", Some(&token), serde_json::json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(user["subscription_count"], 30);

        let (_, view) = send_json(&app, get(&format!("/api/files/{}", id), &token)).await;
        assert_eq!(view["content"], "call (555)***-4567");
        assert_eq!(view["redactions"][0]["span"]["start"], 5);

        let response = app
            .clone()
            .oneshot(get(&format!("/api/files/{}/download", id), &token))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let disposition = response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .to_string();
        assert_eq!(disposition, "attachment; filename=\"notes.txt.encrypted\"");

        let (status, history) = send_json(&app, get(&format!("/api/files/{}/history", id), &token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(history.as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_upload_with_truncated_encrypt_field_is_rejected() {
        let (app, _dir) = create_test_app().await;
        let token = register_and_login(&app, "alice@example.com").await;

        // the body ends inside the `encrypt` field
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"a.txt\"\r\n\
             Content-Type: text/plain\r\n\r\nssn 123-45-6789\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"encrypt\"\r\n\r\ntr",
            b = BOUNDARY,
        );
        let request = Request::builder()
            .method("POST")
            .uri("/api/files")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::from(body))
            .unwrap();
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, dashboard) = send_json(&app, get("/api/files", &token)).await;
        assert_eq!(dashboard["files"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_upload_rejects_file_type() {
        let (app, _dir) = create_test_app().await;
        let token = register_and_login(&app, "alice@example.com").await;

        let (status, _) = send_json(&app, upload_request(&token, "script.sh", "echo hi", false)).await;
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn test_other_users_are_denied() {
        let (app, _dir) = create_test_app().await;
        let alice = register_and_login(&app, "alice@example.com").await;
        let bob = register_and_login(&app, "bob@example.com").await;

        let (_, record) = send_json(&app, upload_request(&alice, "a.txt", "hello", false)).await;
        let id = record["id"].as_i64().unwrap();

        let (status, _) = send_json(&app, get(&format!("/api/files/{}", id), &bob)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send_json(&app, get("/api/admin", &bob)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send_json(
            &app,
            post_json(
                &format!("/api/files/{}/share", id),
                Some(&alice),
                serde_json::json!({ "user_email": "bob@example.com" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, view) = send_json(&app, get(&format!("/api/files/{}", id), &bob)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["content"], "hello");

        let (status, _) = send_json(&app, get("/api/files/999", &bob)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
