//! End-to-end session and permission scenarios against a scripted backend.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;

use docgate_core::auth::{TOKEN_KEY, USER_DATA_KEY};
use docgate_core::{
    ApiRequest, FileStorage, GateContext, GateError, MemoryStorage, ScriptedTransport,
    SessionDescriptor, SessionStorage,
};

fn context_with(
    storage: Arc<dyn SessionStorage>,
) -> (GateContext, Arc<ScriptedTransport>) {
    let transport = Arc::new(ScriptedTransport::new());
    let context = GateContext::new(storage, transport.clone(), Duration::hours(24));
    (context, transport)
}

#[tokio::test]
async fn rejected_login_stores_nothing() {
    let storage = Arc::new(MemoryStorage::new());
    let (context, transport) = context_with(storage.clone());
    transport.push_json(401, json!({"message": "bad credentials"}));

    let err = context.session().login("admin", "wrong").await.unwrap_err();

    assert_eq!(err, GateError::InvalidCredentials("bad credentials".to_string()));
    assert_eq!(err.to_string(), "bad credentials");
    assert!(storage.is_empty());
    assert!(!context.session().is_live());
}

#[tokio::test]
async fn successful_login_is_live() {
    let (context, transport) = context_with(Arc::new(MemoryStorage::new()));
    transport.push_json(200, json!({"token": "abc"}));

    let credential = context.session().login("admin", "right").await.unwrap();

    assert_eq!(credential.token, "abc");
    assert!(context.session().is_live());
    assert_eq!(context.session().current_identity().as_deref(), Some("admin"));
}

#[tokio::test]
async fn loaded_permissions_gate_actions() {
    let (context, transport) = context_with(Arc::new(MemoryStorage::new()));
    transport.push_json(200, json!({"token": "abc"}));
    context.session().login("admin", "right").await.unwrap();
    transport.push_json(200, json!({"permissions": ["VIEW_DOCUMENT"]}));

    context.gate().load_permissions().await.unwrap();

    assert!(context.gate().has_permission("VIEW_DOCUMENT"));
    assert!(!context.gate().has_permission("DELETE_DOCUMENT"));
}

#[tokio::test]
async fn unauthorized_response_ends_session() {
    let (context, transport) = context_with(Arc::new(MemoryStorage::new()));
    transport.push_json(200, json!({"token": "abc"}));
    context.session().login("admin", "right").await.unwrap();
    transport.push_status(401);

    let err = context
        .gate()
        .authenticated_call(ApiRequest::get("/api/documents"))
        .await
        .unwrap_err();

    assert_eq!(err, GateError::SessionExpired);
    assert!(err.is_session_error());
    assert!(!context.session().is_live());

    let calls = transport.calls();
    let err = context
        .gate()
        .authenticated_call(ApiRequest::get("/api/documents"))
        .await
        .unwrap_err();
    assert_eq!(err, GateError::SessionInvalid);
    assert_eq!(transport.calls(), calls);
}

#[tokio::test]
async fn session_survives_restart_with_file_storage() {
    let dir = tempfile::tempdir().unwrap();

    let (first, transport) = context_with(Arc::new(FileStorage::new(dir.path())));
    transport.push_json(200, json!({"token": "abc"}));
    first.session().login("admin", "right").await.unwrap();
    drop(first);

    // A new context over the same directory picks the session up, but not its permissions
    let (second, transport) = context_with(Arc::new(FileStorage::new(dir.path())));
    assert!(second.session().is_live());
    assert_eq!(second.session().current_identity().as_deref(), Some("admin"));
    assert!(!second.gate().permission_state().is_loaded());

    transport.push_json(200, json!({"permissions": ["UPLOAD_DOCUMENT"]}));
    second.gate().load_permissions().await.unwrap();
    assert!(second.gate().can_upload_documents());
    assert_eq!(
        transport.last_request().unwrap().bearer.as_deref(),
        Some("abc")
    );

    second.logout();
    assert!(!FileStorage::new(dir.path()).path().exists());
}

#[tokio::test]
async fn stale_persisted_session_is_discarded() {
    let storage = Arc::new(MemoryStorage::new());
    storage.set(TOKEN_KEY, "old").unwrap();
    let descriptor = SessionDescriptor::new("admin", Utc::now() - Duration::hours(30));
    storage
        .set(USER_DATA_KEY, &serde_json::to_string(&descriptor).unwrap())
        .unwrap();
    let (context, transport) = context_with(storage.clone());

    let err = context.gate().load_permissions().await.unwrap_err();

    assert_eq!(err, GateError::SessionInvalid);
    assert_eq!(transport.calls(), 0);
    assert!(storage.is_empty());
}
