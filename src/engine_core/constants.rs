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

//! Gateway constants - single source of truth for magic numbers, error
//! codes, and configuration keys.

/// JSON-RPC 2.0 error codes
pub mod jsonrpc {
    /// Security block by gateway policy (custom code)
    pub const ERROR_SECURITY_BLOCK: i32 = -32000;
}

/// MCP protocol methods
pub mod methods {
    pub const TOOLS_CALL: &str = "tools/call";
}

/// Transport and evaluation limits (DoS protection)
pub mod limits {
    /// Maximum allowed JSON-RPC line length (10 MB)
    pub const MAX_LINE_BYTES: usize = 10 * 1024 * 1024;
    /// Regex conditions only search the first N characters of an argument
    /// value, bounding worst-case matching cost on hostile input.
    pub const REGEX_INPUT_CHARS: usize = 10_000;
    /// Maximum compiled regex size (256 KB) to reject pathological patterns.
    pub const REGEX_SIZE_LIMIT: usize = 256 * 1024;
}

/// Configuration environment variables and defaults
pub mod config {
    pub const ENV_POLICY_FILE: &str = "WARDEN_POLICY_FILE";
    pub const ENV_AUDIT_LOG: &str = "WARDEN_AUDIT_LOG";
    pub const ENV_CIRCUIT_BREAKER: &str = "WARDEN_CIRCUIT_BREAKER";
    pub const ENV_MAX_CALLS_PER_TOOL: &str = "WARDEN_MAX_CALLS_PER_TOOL";
    pub const ENV_CALL_WINDOW_SECONDS: &str = "WARDEN_CALL_WINDOW_SECONDS";
    pub const ENV_HITL_PORT: &str = "WARDEN_HITL_PORT";
    pub const ENV_HITL_TIMEOUT_SECONDS: &str = "WARDEN_HITL_TIMEOUT_SECONDS";
    pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";
    pub const ENV_LOG_FORMAT: &str = "LOG_FORMAT";

    pub const DEFAULT_AUDIT_LOG: &str = "security_audit.log";
    pub const DEFAULT_MAX_CALLS_PER_TOOL: usize = 100;
    pub const DEFAULT_CALL_WINDOW_SECONDS: u64 = 60;
    pub const DEFAULT_HITL_PORT: u16 = 8888;
    pub const DEFAULT_HITL_TIMEOUT_SECONDS: u64 = 300;
}
