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

//! mcp-warden: a runtime security gateway for MCP servers.
//!
//! This library provides the core logic for the mcp-warden gateway, which
//! wraps a tool server as a subprocess and enforces declarative security
//! policies, per-tool rate limits, and human-in-the-loop approvals on the
//! JSON-RPC messages flowing through it.

pub mod config;
pub mod engine;
pub mod engine_core;
pub mod hitl;
pub mod mcp;
pub mod utils;
