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

// Main entry point for the mcp-warden gateway
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use mcp_warden::config::Config;
use mcp_warden::mcp::gateway::Gateway;

#[derive(Parser, Debug)]
#[command(version, about = "Runtime security gateway for MCP servers", long_about = None)]
struct Cli {
    /// Path to policy YAML file
    #[arg(long)]
    policy: Option<PathBuf>,

    /// Wrapped MCP server command and arguments; omit to run the
    /// single-message demo mode
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    server: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    install_panic_hook();

    let mut config = Config::from_env();
    if let Some(path) = cli.policy {
        config.policy_path = Some(path);
    }

    if let Err(e) = init_tracing(&config) {
        eprintln!("Failed to init tracing: {}", e);
    }

    let gateway = Gateway::new(Arc::new(config));

    if cli.server.is_empty() {
        gateway.run_demo().await
    } else {
        info!("mcp-warden {} starting in proxy mode", env!("CARGO_PKG_VERSION"));
        gateway.run_proxy(&cli.server).await
    }
}

fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());

        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("PANIC: {} at {}", message, location);
    }));
}

fn init_tracing(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("mcp_warden=debug,info"));

    // Stderr only: stdout belongs to the JSON-RPC stream.
    let subscriber = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr);

    if config.log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}
