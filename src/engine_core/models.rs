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

//! Domain models for the mcp-warden gateway.
//!
//! This module contains pure data structures representing JSON-RPC wire
//! messages, security policies, and policy decisions. It is designed to be
//! free of I/O side effects.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jsonrpc: Option<String>,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
}

impl JsonRpcRequest {
    /// Tool name from `params.name`, present on `tools/call` requests.
    pub fn tool_name(&self) -> Option<&str> {
        self.params.as_ref()?.get("name")?.as_str()
    }

    /// The `params.arguments` map, if the request carries one.
    pub fn arguments(&self) -> Option<&Map<String, Value>> {
        self.params.as_ref()?.get("arguments")?.as_object()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Operator applied by a single policy condition.
///
/// Closed set: policies naming any other operator are rejected at load time,
/// so the evaluator never sees an unknown operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Contains,
    NotContains,
    Equals,
    Regex,
}

/// A single condition evaluated against one tool argument value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub operator: ConditionOperator,
    pub value: String,
    #[serde(default)]
    pub ignore_case: bool,
}

/// How a rule's conditions are aggregated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    #[default]
    All,
    Any,
}

/// What a matching rule does to the request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    #[default]
    Block,
    Allow,
    Log,
    AllowWithApproval,
}

/// A declarative match-and-act rule over tool calls.
///
/// `target_tool` is a shell-glob pattern (`*`, `?`, character classes);
/// a pattern without wildcards matches exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub target_tool: String,
    pub target_argument: String,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub match_type: MatchType,
    #[serde(default)]
    pub action: RuleAction,
}

impl Rule {
    /// Human-readable identifier used in block reasons and diagnostics.
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .or_else(|| self.id.clone())
            .unwrap_or_else(|| "unnamed rule".to_string())
    }
}

/// Root policy object. Replaced wholesale on (re)load, never mutated in
/// place, so in-flight evaluations always see a consistent snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Policy {
    #[serde(default)]
    pub rules: Vec<Rule>,
}

/// Policy evaluation result for a single message.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Decision {
    /// Request may proceed.
    Allowed,
    /// Request is denied by the named rule.
    Blocked { rule: String },
    /// Request needs a human approve/deny decision before proceeding.
    NeedsApproval { rule: String },
}
