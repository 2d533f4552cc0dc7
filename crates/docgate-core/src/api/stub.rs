//! Scripted transport for exercising gated code without a backend.
//!
//! Part of the public API: applications that embed the gate use it in their
//! own tests to stand in for the document server.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use reqwest::StatusCode;

use super::client::{ApiRequest, ApiResponse, Transport};
use super::GateError;

/// Replays queued replies in order and records every request it receives.
///
/// Once the queue is empty every request fails with `NetworkFailure`.
///
/// ```
/// use std::sync::Arc;
///
/// use docgate_core::{GateContext, MemoryStorage, ScriptedTransport};
///
/// let transport = Arc::new(ScriptedTransport::new());
/// transport.push_json(200, serde_json::json!({"token": "abc"}));
/// let context = GateContext::new(
///     Arc::new(MemoryStorage::new()),
///     transport.clone(),
///     chrono::Duration::hours(24),
/// );
///
/// futures::executor::block_on(context.session().login("admin", "secret")).unwrap();
/// assert!(context.session().is_live());
/// assert_eq!(transport.last_request().unwrap().path, "/api/auth/login");
/// ```
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Result<ApiResponse, GateError>>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, reply: Result<ApiResponse, GateError>) {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(reply);
    }

    pub fn push_json(&self, status: u16, body: serde_json::Value) {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        self.push(Ok(ApiResponse::json_body(status, &body)));
    }

    pub fn push_status(&self, status: u16) {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        self.push(Ok(ApiResponse::new(status, Vec::new())));
    }

    /// Number of requests sent so far
    pub fn calls(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last_request(&self) -> Option<ApiRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, GateError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| Err(GateError::NetworkFailure("no scripted reply".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replays_in_order_and_records() {
        let transport = ScriptedTransport::new();
        transport.push_json(200, serde_json::json!({"n": 1}));
        transport.push_status(500);

        let first = transport.send(ApiRequest::get("/a")).await.expect("first reply");
        assert_eq!(first.status, StatusCode::OK);
        let second = transport.send(ApiRequest::get("/b")).await.expect("second reply");
        assert_eq!(second.status, StatusCode::INTERNAL_SERVER_ERROR);

        let exhausted = transport.send(ApiRequest::get("/c")).await;
        assert!(matches!(exhausted, Err(GateError::NetworkFailure(_))));

        assert_eq!(transport.calls(), 3);
        assert_eq!(transport.last_request().map(|r| r.path), Some("/c".to_string()));
    }
}
