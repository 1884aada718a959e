//! End-to-end tests for the human-in-the-loop approval workflow.
//!
//! Drives the full path: a tool call hits an `allow_with_approval` rule,
//! the client forwarder suspends on the coordinator, and the HTTP callback
//! router (or its absence) settles the outcome.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use mcp_warden::engine::breaker::{BreakerConfig, CircuitBreaker};
use mcp_warden::engine::enforcement::{EnforcementPipeline, Outcome};
use mcp_warden::engine::evaluator::PolicyEngine;
use mcp_warden::engine_core::audit::AuditLog;
use mcp_warden::engine_core::models::{JsonRpcRequest, Policy, Rule, RuleAction};
use mcp_warden::hitl::{self, ApprovalCoordinator, HitlConfig};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

fn approval_policy() -> Policy {
    Policy {
        rules: vec![Rule {
            id: None,
            name: Some("Review Dangerous Actions".to_string()),
            description: None,
            target_tool: "dangerous_tool".to_string(),
            target_argument: "action".to_string(),
            conditions: vec![],
            match_type: Default::default(),
            action: RuleAction::AllowWithApproval,
        }],
    }
}

fn build(
    timeout: Duration,
) -> (
    Arc<EnforcementPipeline>,
    Arc<ApprovalCoordinator>,
    tempfile::TempDir,
) {
    let dir = tempfile::tempdir().expect("tempdir");
    let approvals = Arc::new(ApprovalCoordinator::new(HitlConfig { port: 0, timeout }));
    let pipeline = Arc::new(EnforcementPipeline::new(
        Arc::new(PolicyEngine::new(approval_policy())),
        Arc::new(CircuitBreaker::new(BreakerConfig::default())),
        approvals.clone(),
        Arc::new(AuditLog::new(dir.path().join("audit.log"))),
    ));
    (pipeline, approvals, dir)
}

fn dangerous_call(id: &str) -> JsonRpcRequest {
    serde_json::from_value(json!({
        "jsonrpc": "2.0",
        "method": "tools/call",
        "id": id,
        "params": {"name": "dangerous_tool", "arguments": {"action": "DELETE everything"}}
    }))
    .expect("valid request")
}

async fn wait_for_pending(approvals: &ApprovalCoordinator) -> String {
    for _ in 0..200 {
        if let Some(id) = approvals.pending_ids().into_iter().next() {
            return id;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("no approval became pending");
}

async fn exercise_link(approvals: Arc<ApprovalCoordinator>, action: &str, id: &str) -> StatusCode {
    let uri = format!("/{}/{}/{}", action, approvals.secret(), id);
    let response = hitl::server::router(approvals)
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    response.status()
}

#[tokio::test]
async fn approved_call_proceeds_to_forward() {
    let (pipeline, approvals, _dir) = build(Duration::from_secs(30));

    let decision = {
        let pipeline = pipeline.clone();
        tokio::spawn(async move { pipeline.decide(&dangerous_call("h1")).await })
    };

    let id = wait_for_pending(&approvals).await;
    let status = exercise_link(approvals.clone(), "approve", &id).await;
    assert_eq!(status, StatusCode::OK);

    let outcome = tokio::time::timeout(Duration::from_secs(5), decision)
        .await
        .expect("decision timed out")
        .unwrap();
    assert_eq!(outcome, Outcome::Forward);
    assert_eq!(approvals.pending_count(), 0);
}

#[tokio::test]
async fn denied_call_is_blocked_with_user_reason() {
    let (pipeline, approvals, _dir) = build(Duration::from_secs(30));

    let decision = {
        let pipeline = pipeline.clone();
        tokio::spawn(async move { pipeline.decide(&dangerous_call("h2")).await })
    };

    let id = wait_for_pending(&approvals).await;
    let status = exercise_link(approvals.clone(), "deny", &id).await;
    assert_eq!(status, StatusCode::OK);

    let outcome = tokio::time::timeout(Duration::from_secs(5), decision)
        .await
        .expect("decision timed out")
        .unwrap();
    assert_eq!(
        outcome,
        Outcome::Block {
            reason: hitl::DENIED_BY_USER.to_string()
        }
    );
    assert_eq!(approvals.pending_count(), 0);
}

#[tokio::test]
async fn unattended_call_times_out_into_denial() {
    let (pipeline, approvals, _dir) = build(Duration::from_millis(80));

    let outcome = pipeline.decide(&dangerous_call("h3")).await;
    assert_eq!(
        outcome,
        Outcome::Block {
            reason: hitl::DENIED_BY_TIMEOUT.to_string()
        }
    );
    assert_eq!(approvals.pending_count(), 0);
}

#[tokio::test]
async fn client_receives_denial_through_the_forwarder() {
    // Scenario: the deny link is exercised while the client forwarder is
    // suspended on the approval; the client must receive the -32000 error
    // and the server must never see the request.
    let (pipeline, approvals, _dir) = build(Duration::from_secs(30));

    let (mut client_in_tx, client_in_rx) = tokio::io::duplex(1024);
    let (server_stdin_tx, server_stdin_rx) = tokio::io::duplex(1024);
    let (client_out_tx, client_out_rx) = tokio::io::duplex(1024);

    let stop = CancellationToken::new();
    let _task = mcp_warden::mcp::pipeline::spawn_client_forwarder(
        client_in_rx,
        server_stdin_tx,
        pipeline,
        mcp_warden::mcp::pipeline::SharedWriter::new(client_out_tx),
        stop,
    );

    let call = json!({
        "jsonrpc": "2.0", "method": "tools/call", "id": "h4",
        "params": {"name": "dangerous_tool", "arguments": {"action": "DELETE everything"}}
    });
    client_in_tx
        .write_all(format!("{}\n", call).as_bytes())
        .await
        .unwrap();

    let id = wait_for_pending(&approvals).await;
    exercise_link(approvals.clone(), "deny", &id).await;

    let mut client_side = BufReader::new(client_out_rx);
    let mut line = String::new();
    tokio::time::timeout(Duration::from_secs(5), client_side.read_line(&mut line))
        .await
        .expect("no response reached the client")
        .unwrap();

    let response: Value = serde_json::from_str(&line).unwrap();
    assert_eq!(response["id"], json!("h4"));
    assert_eq!(response["error"]["code"], json!(-32000));
    assert_eq!(
        response["error"]["message"],
        json!(format!("Policy Violation: {}", hitl::DENIED_BY_USER))
    );

    // Nothing was forwarded: closing the client ends the loop, and the
    // server side observes EOF without ever seeing a line.
    drop(client_in_tx);
    let mut server_side = BufReader::new(server_stdin_rx);
    let mut forwarded = String::new();
    tokio::time::timeout(Duration::from_secs(5), server_side.read_line(&mut forwarded))
        .await
        .expect("server read timed out")
        .unwrap();
    assert!(forwarded.is_empty());
}

#[tokio::test]
async fn degraded_mode_times_out_without_server() {
    // No HTTP server was ever started for this coordinator; the approval
    // has no way to resolve and must fall back to the timeout denial.
    let (pipeline, _approvals, _dir) = build(Duration::from_millis(80));
    let outcome = pipeline.decide(&dangerous_call("h5")).await;
    assert_eq!(
        outcome,
        Outcome::Block {
            reason: hitl::DENIED_BY_TIMEOUT.to_string()
        }
    );
}
