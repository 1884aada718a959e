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

//! Append-only security audit log.
//!
//! One JSON line per blocked or denied request. These records are distinct
//! from debug/info logs and are intended for security review.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;

use crate::engine_core::models::JsonRpcRequest;

/// Audit record for a single blocked/denied decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub timestamp: String,
    pub message_id: Value,
    pub method: String,
    pub reason: String,
    pub details: Value,
}

impl SecurityEvent {
    pub fn from_request(request: &JsonRpcRequest, reason: &str) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            message_id: request.id.clone().unwrap_or(Value::Null),
            method: request.method.clone(),
            reason: reason.to_string(),
            details: serde_json::to_value(request).unwrap_or(Value::Null),
        }
    }
}

/// JSON-lines audit sink. Record failures are logged, never fatal: an
/// unwritable audit file must not take down the enforcement path.
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self, event: &SecurityEvent) {
        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to serialize audit event: {}", e);
                return;
            }
        };

        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut f| writeln!(f, "{}", line));

        if let Err(e) = result {
            error!("Failed to append audit event to {}: {}", self.path.display(), e);
        }
    }
}
