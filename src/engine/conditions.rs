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

//! Condition evaluation.
//!
//! Pure predicate: one argument value against one policy condition.

use regex::RegexBuilder;
use tracing::warn;

use crate::engine_core::constants::limits;
use crate::engine_core::models::{Condition, ConditionOperator};

/// Evaluate a single condition against an argument value.
///
/// Regex patterns are compiled with the engine's case-insensitive mode when
/// `ignore_case` is set; case-folding the pattern text itself would corrupt
/// character classes and escape sequences. The haystack is capped at
/// `REGEX_INPUT_CHARS` characters. An invalid pattern evaluates to false.
pub fn check_condition(value: &str, condition: &Condition) -> bool {
    match condition.operator {
        ConditionOperator::Contains => {
            if condition.ignore_case {
                value.to_uppercase().contains(&condition.value.to_uppercase())
            } else {
                value.contains(&condition.value)
            }
        }
        ConditionOperator::NotContains => {
            if condition.ignore_case {
                !value.to_uppercase().contains(&condition.value.to_uppercase())
            } else {
                !value.contains(&condition.value)
            }
        }
        ConditionOperator::Equals => {
            if condition.ignore_case {
                value.to_uppercase() == condition.value.to_uppercase()
            } else {
                value == condition.value
            }
        }
        ConditionOperator::Regex => {
            let pattern = RegexBuilder::new(&condition.value)
                .case_insensitive(condition.ignore_case)
                .size_limit(limits::REGEX_SIZE_LIMIT)
                .build();

            match pattern {
                Ok(re) => re.is_match(truncate_chars(value, limits::REGEX_INPUT_CHARS)),
                Err(e) => {
                    warn!("Invalid regex pattern '{}': {}", condition.value, e);
                    false
                }
            }
        }
    }
}

/// First `max` characters of `value`, respecting UTF-8 boundaries.
fn truncate_chars(value: &str, max: usize) -> &str {
    match value.char_indices().nth(max) {
        Some((idx, _)) => &value[..idx],
        None => value,
    }
}
