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

//! Policy evaluation engine.
//!
//! Holds the active rule set as an atomically swappable snapshot and scans
//! it in order for the first decisive action. Hot reload replaces the
//! snapshot; evaluations in flight keep the `Arc` they cloned at entry.

use std::sync::{Arc, PoisonError, RwLock};

use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::engine::conditions::check_condition;
use crate::engine_core::constants::methods;
use crate::engine_core::models::{Decision, JsonRpcRequest, MatchType, Policy, Rule, RuleAction};

pub struct PolicyEngine {
    current: RwLock<Arc<Policy>>,
}

impl PolicyEngine {
    pub fn new(policy: Policy) -> Self {
        Self {
            current: RwLock::new(Arc::new(policy)),
        }
    }

    /// Engine with no rules: every request is allowed.
    pub fn empty() -> Self {
        Self::new(Policy::default())
    }

    /// Atomically replace the active policy. Evaluations that already
    /// cloned the previous snapshot finish against it unchanged.
    pub fn reload(&self, policy: Policy) {
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(policy);
    }

    /// Current snapshot, for introspection and diagnostics.
    pub fn snapshot(&self) -> Arc<Policy> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Evaluate one message against the active policy.
    ///
    /// Non-`tools/call` methods are allowed without consulting any rule.
    /// Rules are scanned in stored order: `block` and `allow_with_approval`
    /// terminate with their decision, `allow` terminates with `Allowed`,
    /// and `log` records the match and keeps scanning.
    pub fn evaluate(&self, request: &JsonRpcRequest) -> Decision {
        if request.method != methods::TOOLS_CALL {
            return Decision::Allowed;
        }

        let policy = self.snapshot();
        let tool_name = request.tool_name().unwrap_or("");
        let empty = Map::new();
        let arguments = request.arguments().unwrap_or(&empty);

        for rule in &policy.rules {
            if !rule_matches(rule, tool_name, arguments) {
                continue;
            }

            match rule.action {
                RuleAction::Block => {
                    return Decision::Blocked {
                        rule: rule.display_name(),
                    };
                }
                RuleAction::AllowWithApproval => {
                    return Decision::NeedsApproval {
                        rule: rule.display_name(),
                    };
                }
                RuleAction::Allow => return Decision::Allowed,
                RuleAction::Log => {
                    info!(
                        rule = %rule.display_name(),
                        tool = %tool_name,
                        "Rule matched (action=log)"
                    );
                }
            }
        }

        Decision::Allowed
    }
}

/// Does one rule match one tool call?
///
/// The tool name must match the rule's glob pattern and the targeted
/// argument must be present. Conditions apply to that argument's string
/// value; a non-string value fails every condition (but an empty `all`
/// condition list is still vacuously true).
fn rule_matches(rule: &Rule, tool_name: &str, arguments: &Map<String, Value>) -> bool {
    match glob::Pattern::new(&rule.target_tool) {
        Ok(pattern) => {
            if !pattern.matches(tool_name) {
                return false;
            }
        }
        Err(e) => {
            warn!(
                "Invalid target_tool pattern '{}' in rule '{}': {}",
                rule.target_tool,
                rule.display_name(),
                e
            );
            return false;
        }
    }

    let Some(argument) = arguments.get(&rule.target_argument) else {
        return false;
    };

    if rule.conditions.is_empty() {
        return rule.match_type == MatchType::All;
    }

    let value = argument.as_str();
    let mut results = rule.conditions.iter().map(|c| match value {
        Some(value) => check_condition(value, c),
        None => false,
    });

    match rule.match_type {
        MatchType::All => results.all(|r| r),
        MatchType::Any => results.any(|r| r),
    }
}
