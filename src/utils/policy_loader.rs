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

//! Policy file loading and validation - fail-fast at load time.
//!
//! Schema violations (unknown operators, actions, missing fields) are
//! rejected by deserialization; this module adds structural checks on top
//! and degrades to an empty rule set on any error, logging each problem.
//! A missing policy file means open access, matching the gateway's
//! fail-open posture toward configuration.

use std::path::Path;

use tracing::{error, info, warn};

use crate::engine_core::models::{ConditionOperator, Policy};

/// Load a policy from a YAML file, or an empty policy when no path is
/// configured or the file is missing/invalid.
pub fn load_policy(path: Option<&Path>) -> Policy {
    let Some(path) = path else {
        warn!("No policy file configured. Defaulting to open access.");
        return Policy::default();
    };

    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(
                "Policy file {} not found. Defaulting to open access.",
                path.display()
            );
            return Policy::default();
        }
        Err(e) => {
            error!("Failed to read policy file {}: {}", path.display(), e);
            return Policy::default();
        }
    };

    let policy: Policy = match serde_yaml_ng::from_str(&content) {
        Ok(policy) => policy,
        Err(e) => {
            error!("Failed to parse policy YAML: {}", e);
            return Policy::default();
        }
    };

    let errors = validate_policy(&policy);
    if !errors.is_empty() {
        for error in &errors {
            error!("[policy] {}", error);
        }
        warn!(
            "Policy has {} validation errors. Defaulting to empty.",
            errors.len()
        );
        return Policy::default();
    }

    info!("Loaded policy with {} rules", policy.rules.len());
    policy
}

/// Structural checks beyond the serde schema. Returns one message per
/// problem; an empty result means the policy is usable.
pub fn validate_policy(policy: &Policy) -> Vec<String> {
    let mut errors = Vec::new();

    for (idx, rule) in policy.rules.iter().enumerate() {
        let context = format!("rule #{} ('{}')", idx + 1, rule.display_name());

        if rule.target_tool.is_empty() {
            errors.push(format!("{}: target_tool cannot be empty", context));
        } else if let Err(e) = glob::Pattern::new(&rule.target_tool) {
            errors.push(format!(
                "{}: invalid target_tool pattern '{}': {}",
                context, rule.target_tool, e
            ));
        }

        if rule.target_argument.is_empty() {
            errors.push(format!("{}: target_argument cannot be empty", context));
        }

        for (cidx, condition) in rule.conditions.iter().enumerate() {
            if condition.operator == ConditionOperator::Regex {
                if let Err(e) = regex::Regex::new(&condition.value) {
                    errors.push(format!(
                        "{}: condition #{} has invalid regex '{}': {}",
                        context,
                        cidx + 1,
                        condition.value,
                        e
                    ));
                }
            }
        }
    }

    errors
}
