//! Integration tests for authentication, task ownership, and the admin
//! endpoint.

mod common;

use std::sync::Arc;

use axum::http::{Method, StatusCode};
use futures::FutureExt;
use futures::future::BoxFuture;
use rstest::rstest;
use serde_json::json;

use common::{ADMIN_TOKEN, OTHER_USER_TOKEN, TestApp, USER_TOKEN};
use task_store_api::infrastructure::{AuthError, AuthenticatedUser, IdentityProvider};

/// Identity provider whose backing service is down.
struct UnreachableIdentityProvider;

impl IdentityProvider for UnreachableIdentityProvider {
    fn verify<'a>(&'a self, _token: &'a str) -> BoxFuture<'a, Result<AuthenticatedUser, AuthError>> {
        let result: Result<AuthenticatedUser, AuthError> =
            Err(AuthError::Unavailable("connection refused".to_string()));
        futures::future::ready(result).boxed()
    }
}

// =============================================================================
// Token Checks
// =============================================================================

#[rstest]
#[case(Method::GET, "/tasks")]
#[case(Method::GET, "/tasks/1")]
#[case(Method::DELETE, "/tasks/1")]
#[case(Method::GET, "/admin/storage")]
#[tokio::test]
async fn test_protected_routes_require_token(#[case] method: Method, #[case] uri: &str) {
    let app = TestApp::with_authentication();

    let (status, error) = app.send(method, uri, None, None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error["code"], json!("UNAUTHORIZED"));
}

#[rstest]
#[tokio::test]
async fn test_unknown_token_is_rejected() {
    let app = TestApp::with_authentication();

    let (status, error) = app.send(Method::GET, "/tasks", None, Some("forged")).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error["message"], json!("Invalid or expired token"));
}

#[rstest]
#[tokio::test]
async fn test_health_and_fallback_stay_public() {
    let app = TestApp::with_authentication();

    let (status, _) = app.get("/health").await;
    assert_eq!(status, StatusCode::OK);

    let (status, error) = app.get("/unknown").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error["code"], json!("NOT_FOUND"));
}

#[rstest]
#[tokio::test]
async fn test_valid_token_reaches_task_routes() {
    let app = TestApp::with_authentication();

    let (status, task) = app
        .send(Method::POST, "/tasks", Some(json!({"title": "Mine"})), Some(USER_TOKEN))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(task["id"], json!(1));

    let (status, page) = app.send(Method::GET, "/tasks", None, Some(USER_TOKEN)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], json!(1));
}

#[rstest]
#[tokio::test]
async fn test_rejected_request_does_not_touch_the_store() {
    let app = TestApp::with_authentication();

    let (status, _) = app.post("/tasks", json!({"title": "Sneaky"})).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.read_tasks_file(), json!([]));
}

#[rstest]
#[tokio::test]
async fn test_unreachable_identity_service_returns_503() {
    let app = TestApp::with_identity_provider(Arc::new(UnreachableIdentityProvider));

    let (status, error) = app.send(Method::GET, "/tasks", None, Some(USER_TOKEN)).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(error["code"], json!("IDENTITY_UNAVAILABLE"));
}

// =============================================================================
// Task Ownership
// =============================================================================

#[rstest]
#[tokio::test]
async fn test_created_task_records_owner() {
    let app = TestApp::with_authentication();

    let (status, task) = app
        .send(Method::POST, "/tasks", Some(json!({"title": "Mine"})), Some(USER_TOKEN))
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(task["userId"], json!("user-1"));
    assert_eq!(app.read_tasks_file()[0]["userId"], json!("user-1"));
}

#[rstest]
#[case(Method::GET, None)]
#[case(Method::PATCH, Some(json!({"completed": true})))]
#[case(Method::PUT, Some(json!({"title": "Taken"})))]
#[case(Method::DELETE, None)]
#[tokio::test]
async fn test_other_users_task_is_not_found(#[case] method: Method, #[case] body: Option<serde_json::Value>) {
    let app = TestApp::with_authentication();
    app.send(Method::POST, "/tasks", Some(json!({"title": "Mine"})), Some(USER_TOKEN))
        .await;
    let before = app.read_tasks_file();

    let (status, error) = app.send(method, "/tasks/1", body, Some(OTHER_USER_TOKEN)).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error["message"], json!("Task 1 not found"));
    assert_eq!(app.read_tasks_file(), before);
}

#[rstest]
#[tokio::test]
async fn test_lists_are_scoped_to_owner_and_admin_sees_all() {
    let app = TestApp::with_authentication();
    app.send(Method::POST, "/tasks", Some(json!({"title": "From A"})), Some(USER_TOKEN))
        .await;
    app.send(Method::POST, "/tasks", Some(json!({"title": "From B"})), Some(OTHER_USER_TOKEN))
        .await;

    let (_, page) = app.send(Method::GET, "/tasks", None, Some(USER_TOKEN)).await;
    assert_eq!(page["total"], json!(1));
    assert_eq!(page["data"][0]["title"], json!("From A"));

    let (_, page) = app.send(Method::GET, "/tasks", None, Some(OTHER_USER_TOKEN)).await;
    assert_eq!(page["total"], json!(1));
    assert_eq!(page["data"][0]["title"], json!("From B"));

    let (_, page) = app.send(Method::GET, "/tasks", None, Some(ADMIN_TOKEN)).await;
    assert_eq!(page["total"], json!(2));

    let (status, task) = app.send(Method::GET, "/tasks/2", None, Some(ADMIN_TOKEN)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(task["userId"], json!("user-2"));
}

#[rstest]
#[tokio::test]
async fn test_admin_can_change_any_task() {
    let app = TestApp::with_authentication();
    app.send(Method::POST, "/tasks", Some(json!({"title": "From A"})), Some(USER_TOKEN))
        .await;

    let (status, task) = app
        .send(Method::PATCH, "/tasks/1", Some(json!({"completed": true})), Some(ADMIN_TOKEN))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(task["userId"], json!("user-1"));

    let (status, _) = app.send(Method::DELETE, "/tasks/1", None, Some(ADMIN_TOKEN)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(app.read_tasks_file(), json!([]));
}

#[rstest]
#[tokio::test]
async fn test_unowned_records_are_visible_to_admins_only() {
    let app = TestApp::with_authentication();
    app.write_tasks_file(
        r#"[{"id": 1, "title": "Imported", "completed": false, "createdAt": "2024-01-01T00:00:00Z"}]"#,
    );

    let (_, page) = app.send(Method::GET, "/tasks", None, Some(USER_TOKEN)).await;
    assert_eq!(page["total"], json!(0));

    let (status, _) = app.send(Method::GET, "/tasks/1", None, Some(USER_TOKEN)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.send(Method::GET, "/tasks/1", None, Some(ADMIN_TOKEN)).await;
    assert_eq!(status, StatusCode::OK);
}

// =============================================================================
// Admin Role
// =============================================================================

#[rstest]
#[tokio::test]
async fn test_admin_storage_forbidden_for_users() {
    let app = TestApp::with_authentication();

    let (status, error) = app
        .send(Method::GET, "/admin/storage", None, Some(USER_TOKEN))
        .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error["code"], json!("FORBIDDEN"));
}

#[rstest]
#[tokio::test]
async fn test_admin_storage_for_admins() {
    let app = TestApp::with_authentication();
    app.send(Method::POST, "/tasks", Some(json!({"title": "One"})), Some(ADMIN_TOKEN))
        .await;

    let (status, body) = app
        .send(Method::GET, "/admin/storage", None, Some(ADMIN_TOKEN))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "location": app.tasks_file.display().to_string(),
            "taskCount": 1
        })
    );
}
