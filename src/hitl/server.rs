// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! HTTP side channel for approval callbacks.
//!
//! Serves exactly two link shapes: `GET /approve/{secret}/{id}` and
//! `GET /deny/{secret}/{id}`. Anything else is a 404. Startup failure is
//! logged and the gateway keeps running without HITL capability; approval
//! rules then time out into denials.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tracing::{error, info};

use super::{ApprovalCoordinator, CallbackAction, CallbackError};

pub fn router(coordinator: Arc<ApprovalCoordinator>) -> Router {
    Router::new()
        .route("/:action/:token/:id", get(callback_handler))
        .with_state(coordinator)
}

/// Bind and serve the approval router in the background.
pub fn spawn(coordinator: Arc<ApprovalCoordinator>) {
    let port = coordinator.port();
    tokio::spawn(async move {
        let addr = format!("127.0.0.1:{}", port);
        let listener = match tokio::net::TcpListener::bind(&addr).await {
            Ok(listener) => listener,
            Err(e) => {
                error!("Failed to start approval server on {}: {}", addr, e);
                return;
            }
        };

        info!("Approval server running on http://localhost:{}", port);
        if let Err(e) = axum::serve(listener, router(coordinator)).await {
            error!("Approval server terminated: {}", e);
        }
    });
}

async fn callback_handler(
    State(coordinator): State<Arc<ApprovalCoordinator>>,
    Path((action, token, id)): Path<(String, String, String)>,
) -> Response {
    let action = match action.as_str() {
        "approve" => CallbackAction::Approve,
        "deny" => CallbackAction::Deny,
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                "Invalid action. Use /approve/ or /deny/",
            )
                .into_response();
        }
    };

    match coordinator.resolve(action, &token, &id) {
        Ok(CallbackAction::Approve) => confirmation_page("Request APPROVED. You may close this tab."),
        Ok(CallbackAction::Deny) => confirmation_page("Request DENIED. You may close this tab."),
        Err(CallbackError::InvalidToken) => {
            (StatusCode::FORBIDDEN, "Invalid authentication token").into_response()
        }
        Err(CallbackError::NotFound) => {
            (StatusCode::NOT_FOUND, "Request ID not found or expired").into_response()
        }
    }
}

fn confirmation_page(message: &str) -> Response {
    Html(format!(
        "<html><body style='font-family:sans-serif;text-align:center;padding:50px;'>\
         <h1>{}</h1></body></html>",
        message
    ))
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hitl::HitlConfig;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::json;
    use std::time::Duration;
    use tower::ServiceExt;

    fn coordinator() -> Arc<ApprovalCoordinator> {
        Arc::new(ApprovalCoordinator::new(HitlConfig {
            port: 0,
            timeout: Duration::from_secs(30),
        }))
    }

    fn tool_request() -> crate::engine_core::models::JsonRpcRequest {
        serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "method": "tools/call",
            "id": "cb-001",
            "params": {"name": "dangerous_tool", "arguments": {}}
        }))
        .unwrap()
    }

    async fn get(router: Router, uri: &str) -> axum::http::Response<Body> {
        router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn approve_callback_succeeds() {
        let coord = coordinator();
        let waiter = {
            let coord = coord.clone();
            tokio::spawn(async move { coord.request_approval(&tool_request(), "Rule").await })
        };

        let id = loop {
            if let Some(id) = coord.pending_ids().into_iter().next() {
                break id;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        };
        let secret = coord.secret().to_string();

        let response = get(
            router(coord.clone()),
            &format!("/approve/{}/{}", secret, id),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert!(String::from_utf8_lossy(&body).contains("APPROVED"));

        let outcome = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome, crate::hitl::ApprovalOutcome::Approved);
    }

    #[tokio::test]
    async fn wrong_secret_is_forbidden() {
        let coord = coordinator();
        let response = get(router(coord), "/approve/not-the-secret/some-id").await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let coord = coordinator();
        let secret = coord.secret().to_string();
        let response = get(router(coord), &format!("/approve/{}/ghost", secret)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_action_is_bad_request() {
        let coord = coordinator();
        let secret = coord.secret().to_string();
        let response = get(router(coord), &format!("/escalate/{}/some-id", secret)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_paths_are_not_found() {
        let coord = coordinator();
        for uri in ["/approve", "/approve/only-token", "/a/b/c/d"] {
            let response = get(router(coord.clone()), uri).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "uri: {}", uri);
        }
    }
}
