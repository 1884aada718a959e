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

//! Enforcement pipeline.
//!
//! One decision per inbound client message: policy rules, then (when a rule
//! demands it) the human approval wait, then the circuit breaker. A block
//! on any stage synthesizes the JSON-RPC error the client will see and
//! appends a record to the audit log.

use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::engine::breaker::CircuitBreaker;
use crate::engine::evaluator::PolicyEngine;
use crate::engine_core::audit::{AuditLog, SecurityEvent};
use crate::engine_core::constants::{jsonrpc, methods};
use crate::engine_core::models::{Decision, JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use crate::hitl::{ApprovalCoordinator, ApprovalOutcome};

/// What the forwarder should do with a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Pass the original message bytes through to the server.
    Forward,
    /// Drop the message and answer the client with a policy-violation error.
    Block { reason: String },
}

pub struct EnforcementPipeline {
    policy: Arc<PolicyEngine>,
    breaker: Arc<CircuitBreaker>,
    approvals: Arc<ApprovalCoordinator>,
    audit: Arc<AuditLog>,
}

impl EnforcementPipeline {
    pub fn new(
        policy: Arc<PolicyEngine>,
        breaker: Arc<CircuitBreaker>,
        approvals: Arc<ApprovalCoordinator>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            policy,
            breaker,
            approvals,
            audit,
        }
    }

    /// Decide one inbound message.
    ///
    /// Everything except `tools/call` bypasses enforcement. An approval
    /// wait suspends only this call; the cap on that wait is the one hard
    /// bound on how long a message can stall here.
    pub async fn decide(&self, request: &JsonRpcRequest) -> Outcome {
        if request.method != methods::TOOLS_CALL {
            return Outcome::Forward;
        }

        match self.policy.evaluate(request) {
            Decision::Allowed => {}
            Decision::Blocked { rule } => return self.block(request, rule),
            Decision::NeedsApproval { rule } => {
                match self.approvals.request_approval(request, &rule).await {
                    ApprovalOutcome::Approved => {}
                    ApprovalOutcome::Denied(reason) => return self.block(request, reason),
                }
            }
        }

        let tool_name = request.tool_name().unwrap_or("unknown");
        if let Some(reason) = self.breaker.check_and_record(tool_name) {
            return self.block(request, reason);
        }

        Outcome::Forward
    }

    fn block(&self, request: &JsonRpcRequest, reason: String) -> Outcome {
        warn!(
            id = %request.id.clone().unwrap_or(serde_json::Value::Null),
            %reason,
            "Request blocked"
        );
        self.audit
            .record(&SecurityEvent::from_request(request, &reason));
        Outcome::Block { reason }
    }
}

/// The error response injected toward the client in place of a blocked
/// request's real answer.
pub fn policy_violation_response(id: Option<Value>, reason: &str) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: "2.0".to_string(),
        result: None,
        error: Some(JsonRpcError {
            code: jsonrpc::ERROR_SECURITY_BLOCK,
            message: format!("Policy Violation: {}", reason),
            data: None,
        }),
        id: id.unwrap_or(Value::Null),
    }
}
