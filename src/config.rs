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

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::engine::breaker::BreakerConfig;
use crate::engine_core::constants::config as keys;
use crate::hitl::HitlConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub policy_path: Option<PathBuf>,
    pub audit_log_path: PathBuf,
    pub log_level: String,
    pub log_format: String, // "json" or "text"
    pub breaker: BreakerConfig,
    pub hitl: HitlConfig,
}

impl Config {
    /// Build configuration from the environment. Unset or unparseable
    /// values fall back to their defaults.
    pub fn from_env() -> Self {
        Self {
            policy_path: env::var(keys::ENV_POLICY_FILE).ok().map(PathBuf::from),
            audit_log_path: env::var(keys::ENV_AUDIT_LOG)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(keys::DEFAULT_AUDIT_LOG)),
            log_level: env::var(keys::ENV_LOG_LEVEL).unwrap_or_else(|_| "info".to_string()),
            log_format: env::var(keys::ENV_LOG_FORMAT).unwrap_or_else(|_| "text".to_string()),
            breaker: BreakerConfig {
                enabled: env::var(keys::ENV_CIRCUIT_BREAKER)
                    .map(|v| v.to_lowercase() == "true")
                    .unwrap_or(true),
                max_calls: parsed_or(keys::ENV_MAX_CALLS_PER_TOOL, keys::DEFAULT_MAX_CALLS_PER_TOOL),
                window: Duration::from_secs(parsed_or(
                    keys::ENV_CALL_WINDOW_SECONDS,
                    keys::DEFAULT_CALL_WINDOW_SECONDS,
                )),
            },
            hitl: HitlConfig {
                port: parsed_or(keys::ENV_HITL_PORT, keys::DEFAULT_HITL_PORT),
                timeout: Duration::from_secs(parsed_or(
                    keys::ENV_HITL_TIMEOUT_SECONDS,
                    keys::DEFAULT_HITL_TIMEOUT_SECONDS,
                )),
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            policy_path: None,
            audit_log_path: PathBuf::from(keys::DEFAULT_AUDIT_LOG),
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            breaker: BreakerConfig::default(),
            hitl: HitlConfig::default(),
        }
    }
}

fn parsed_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
