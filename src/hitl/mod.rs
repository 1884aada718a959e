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

//! Human-in-the-loop approval workflow.
//!
//! A rule with action `allow_with_approval` suspends its request until a
//! human follows one of two single-use links served by the side-channel
//! HTTP server ([`server`]), or until the timeout lapses. Waiters block on
//! a per-entry [`Notify`] rather than polling; the callback handler flips
//! the status and wakes them.

pub mod server;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine_core::constants::config;
use crate::engine_core::models::JsonRpcRequest;

pub const DENIED_BY_USER: &str = "User Denied Action";
pub const DENIED_BY_TIMEOUT: &str = "Approval Timed Out";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Denied,
}

/// Final outcome observed by the waiting request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalOutcome {
    Approved,
    Denied(String),
}

/// Callback action parsed from the URL path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    Approve,
    Deny,
}

/// Why a callback was rejected.
#[derive(Debug, PartialEq, Eq)]
pub enum CallbackError {
    /// Secret mismatch
    InvalidToken,
    /// Unknown, expired, or already-resolved request id
    NotFound,
}

#[derive(Debug, Clone)]
pub struct HitlConfig {
    pub port: u16,
    pub timeout: Duration,
}

impl Default for HitlConfig {
    fn default() -> Self {
        Self {
            port: config::DEFAULT_HITL_PORT,
            timeout: Duration::from_secs(config::DEFAULT_HITL_TIMEOUT_SECONDS),
        }
    }
}

struct PendingEntry {
    status: ApprovalStatus,
    #[allow(dead_code)] // retained for operator inspection/debugging
    message: JsonRpcRequest,
    rule_name: String,
    created_at: DateTime<Utc>,
    notify: Arc<Notify>,
}

/// Table of pending approvals plus the process-lifetime callback secret.
///
/// The table lock is held only for map mutation and status reads, never
/// across the wait.
pub struct ApprovalCoordinator {
    config: HitlConfig,
    secret: String,
    pending: Mutex<HashMap<String, PendingEntry>>,
}

impl ApprovalCoordinator {
    pub fn new(config: HitlConfig) -> Self {
        Self {
            config,
            secret: Uuid::new_v4().to_string(),
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn port(&self) -> u16 {
        self.config.port
    }

    /// Process-lifetime callback secret embedded in the action links.
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Suspend until the request is approved, denied, or times out.
    ///
    /// The pending entry is removed before returning on every path, so
    /// abandoned approvals cannot accumulate.
    pub async fn request_approval(
        &self,
        message: &JsonRpcRequest,
        rule_name: &str,
    ) -> ApprovalOutcome {
        let id = Uuid::new_v4().to_string();
        let notify = Arc::new(Notify::new());

        {
            let mut pending = self.lock_pending();
            pending.insert(
                id.clone(),
                PendingEntry {
                    status: ApprovalStatus::Pending,
                    message: message.clone(),
                    rule_name: rule_name.to_string(),
                    created_at: Utc::now(),
                    notify: notify.clone(),
                },
            );
        }

        let base = format!("http://localhost:{}", self.config.port);
        info!(rule = %rule_name, "Action paused pending approval");
        info!("Timeout: {}s", self.config.timeout.as_secs());
        info!("Approve: {}/approve/{}/{}", base, self.secret, id);
        info!("Deny:    {}/deny/{}/{}", base, self.secret, id);

        let outcome = self.wait(&id, &notify).await;

        {
            let mut pending = self.lock_pending();
            pending.remove(&id);
        }

        match &outcome {
            ApprovalOutcome::Approved => info!(request = %id, "Approval granted"),
            ApprovalOutcome::Denied(reason) => warn!(request = %id, %reason, "Approval refused"),
        }
        outcome
    }

    async fn wait(&self, id: &str, notify: &Notify) -> ApprovalOutcome {
        let deadline = tokio::time::Instant::now() + self.config.timeout;

        loop {
            // Register for the wakeup before reading the status, so a
            // callback landing between the two cannot be lost.
            let notified = notify.notified();

            match self.status_of(id) {
                Some(ApprovalStatus::Approved) => return ApprovalOutcome::Approved,
                Some(ApprovalStatus::Denied) => {
                    return ApprovalOutcome::Denied(DENIED_BY_USER.to_string());
                }
                Some(ApprovalStatus::Pending) => {}
                None => return ApprovalOutcome::Denied(DENIED_BY_TIMEOUT.to_string()),
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                return ApprovalOutcome::Denied(DENIED_BY_TIMEOUT.to_string());
            }

            if tokio::time::timeout(deadline - now, notified).await.is_err() {
                // Deadline hit; one final status read settles a race with a
                // callback that arrived at the last instant.
                return match self.status_of(id) {
                    Some(ApprovalStatus::Approved) => ApprovalOutcome::Approved,
                    Some(ApprovalStatus::Denied) => {
                        ApprovalOutcome::Denied(DENIED_BY_USER.to_string())
                    }
                    _ => ApprovalOutcome::Denied(DENIED_BY_TIMEOUT.to_string()),
                };
            }
        }
    }

    /// Resolve a pending entry from an HTTP callback.
    ///
    /// The first callback for an id wins; later callbacks (or callbacks for
    /// ids the waiter already reclaimed) report [`CallbackError::NotFound`].
    pub fn resolve(
        &self,
        action: CallbackAction,
        token: &str,
        id: &str,
    ) -> Result<CallbackAction, CallbackError> {
        if !constant_time_eq(token.as_bytes(), self.secret.as_bytes()) {
            warn!(
                "Unauthorized approval callback with token '{}…'",
                token.chars().take(8).collect::<String>()
            );
            return Err(CallbackError::InvalidToken);
        }

        let mut pending = self.lock_pending();
        let entry = pending.get_mut(id).ok_or(CallbackError::NotFound)?;
        if entry.status != ApprovalStatus::Pending {
            return Err(CallbackError::NotFound);
        }

        entry.status = match action {
            CallbackAction::Approve => ApprovalStatus::Approved,
            CallbackAction::Deny => ApprovalStatus::Denied,
        };
        let waited = Utc::now() - entry.created_at;
        info!(
            request = %id,
            rule = %entry.rule_name,
            ?action,
            waited_secs = waited.num_seconds(),
            "Approval callback accepted"
        );
        entry.notify.notify_waiters();
        Ok(action)
    }

    pub fn pending_count(&self) -> usize {
        self.lock_pending().len()
    }

    /// Ids of requests currently awaiting a decision.
    pub fn pending_ids(&self) -> Vec<String> {
        self.lock_pending().keys().cloned().collect()
    }

    fn status_of(&self, id: &str) -> Option<ApprovalStatus> {
        self.lock_pending().get(id).map(|e| e.status)
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, HashMap<String, PendingEntry>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Length-guarded constant-time byte comparison for the callback secret.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> JsonRpcRequest {
        serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "method": "tools/call",
            "id": "hitl-001",
            "params": {"name": "dangerous_tool", "arguments": {"action": "DELETE users"}}
        }))
        .unwrap()
    }

    fn coordinator(timeout: Duration) -> Arc<ApprovalCoordinator> {
        Arc::new(ApprovalCoordinator::new(HitlConfig {
            port: 0,
            timeout,
        }))
    }

    #[test]
    fn constant_time_eq_basics() {
        assert!(constant_time_eq(b"hello", b"hello"));
        assert!(!constant_time_eq(b"hello", b"world"));
        assert!(!constant_time_eq(b"short", b"longer"));
    }

    #[tokio::test]
    async fn approve_link_resolves_waiter_early() {
        let coord = coordinator(Duration::from_secs(30));
        let waiter = {
            let coord = coord.clone();
            tokio::spawn(async move { coord.request_approval(&request(), "Needs Review").await })
        };

        // Let the waiter insert its entry.
        let id = loop {
            if let Some(id) = coord.pending_ids().into_iter().next() {
                break id;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        };

        let secret = coord.secret().to_string();
        coord
            .resolve(CallbackAction::Approve, &secret, &id)
            .unwrap();

        let outcome = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome, ApprovalOutcome::Approved);
        assert_eq!(coord.pending_count(), 0);
    }

    #[tokio::test]
    async fn deny_link_yields_user_denial() {
        let coord = coordinator(Duration::from_secs(30));
        let waiter = {
            let coord = coord.clone();
            tokio::spawn(async move { coord.request_approval(&request(), "Needs Review").await })
        };

        let id = loop {
            if let Some(id) = coord.pending_ids().into_iter().next() {
                break id;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        };

        let secret = coord.secret().to_string();
        coord.resolve(CallbackAction::Deny, &secret, &id).unwrap();

        let outcome = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome, ApprovalOutcome::Denied(DENIED_BY_USER.to_string()));
        assert_eq!(coord.pending_count(), 0);
    }

    #[tokio::test]
    async fn unattended_request_times_out() {
        let coord = coordinator(Duration::from_millis(50));
        let outcome = coord.request_approval(&request(), "Needs Review").await;
        assert_eq!(
            outcome,
            ApprovalOutcome::Denied(DENIED_BY_TIMEOUT.to_string())
        );
        assert_eq!(coord.pending_count(), 0);
    }

    #[tokio::test]
    async fn bad_token_rejected_without_state_change() {
        let coord = coordinator(Duration::from_secs(30));
        let waiter = {
            let coord = coord.clone();
            tokio::spawn(async move { coord.request_approval(&request(), "Needs Review").await })
        };

        let id = loop {
            if let Some(id) = coord.pending_ids().into_iter().next() {
                break id;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        };

        assert_eq!(
            coord.resolve(CallbackAction::Approve, "wrong-secret", &id),
            Err(CallbackError::InvalidToken)
        );
        assert_eq!(coord.pending_count(), 1);

        let secret = coord.secret().to_string();
        coord.resolve(CallbackAction::Deny, &secret, &id).unwrap();
        let _ = tokio::time::timeout(Duration::from_secs(2), waiter).await;
    }

    #[tokio::test]
    async fn unknown_id_not_found() {
        let coord = coordinator(Duration::from_secs(30));
        let secret = coord.secret().to_string();
        assert_eq!(
            coord.resolve(CallbackAction::Approve, &secret, "no-such-id"),
            Err(CallbackError::NotFound)
        );
    }

    #[tokio::test]
    async fn second_callback_loses() {
        let coord = coordinator(Duration::from_secs(30));
        let waiter = {
            let coord = coord.clone();
            tokio::spawn(async move { coord.request_approval(&request(), "Needs Review").await })
        };

        let id = loop {
            if let Some(id) = coord.pending_ids().into_iter().next() {
                break id;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        };

        let secret = coord.secret().to_string();
        coord
            .resolve(CallbackAction::Approve, &secret, &id)
            .unwrap();
        // Already resolved: the late deny is a 404-class error, not a flip.
        assert_eq!(
            coord.resolve(CallbackAction::Deny, &secret, &id),
            Err(CallbackError::NotFound)
        );

        let outcome = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome, ApprovalOutcome::Approved);
    }
}
