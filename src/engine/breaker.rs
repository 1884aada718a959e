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

//! Circuit breaker: per-tool sliding-window rate limiting.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::engine_core::constants::config;

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    pub enabled: bool,
    pub max_calls: usize,
    pub window: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_calls: config::DEFAULT_MAX_CALLS_PER_TOOL,
            window: Duration::from_secs(config::DEFAULT_CALL_WINDOW_SECONDS),
        }
    }
}

/// Sliding-window call limiter, one window per tool name.
///
/// All windows live in one table behind a single mutex; the lock is held
/// only for prune + check + insert, never across I/O or awaits.
pub struct CircuitBreaker {
    config: BreakerConfig,
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Check the limit for `tool_name` and record the call if allowed.
    ///
    /// Returns `Some(reason)` when the call must be denied; a denied call is
    /// not recorded. Time is sampled once, inside the lock, so pruning and
    /// the limit check use a single consistent instant.
    pub fn check_and_record(&self, tool_name: &str) -> Option<String> {
        if !self.config.enabled {
            return None;
        }

        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let now = Instant::now();
        let window = windows.entry(tool_name.to_string()).or_default();

        while let Some(oldest) = window.front() {
            if now.duration_since(*oldest) >= self.config.window {
                window.pop_front();
            } else {
                break;
            }
        }

        if window.len() >= self.config.max_calls {
            return Some(format!(
                "Circuit Breaker: {} exceeded {} calls in {}s",
                tool_name,
                self.config.max_calls,
                self.config.window.as_secs()
            ));
        }

        window.push_back(now);
        None
    }
}
