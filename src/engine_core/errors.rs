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

use thiserror::Error;

/// Main error type for the gateway.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Upstream process could not be spawned or controlled
    #[error("Process error: {0}")]
    Process(String),

    /// Configuration error (bad values, unusable paths)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport-level I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
