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

//! Gateway orchestration.
//!
//! Wires the policy engine, circuit breaker, approval coordinator, and
//! audit log into the enforcement pipeline, then runs either proxy mode
//! (wrap a server subprocess and forward both directions) or demo mode
//! (validate a single message from stdin).

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::engine::breaker::CircuitBreaker;
use crate::engine::enforcement::{policy_violation_response, EnforcementPipeline, Outcome};
use crate::engine::evaluator::PolicyEngine;
use crate::engine_core::audit::AuditLog;
use crate::hitl::{self, ApprovalCoordinator};
use crate::mcp::pipeline::{
    spawn_client_forwarder, spawn_server_forwarder, spawn_stderr_drain, SharedWriter, UpstreamEvent,
};
use crate::mcp::process::ProcessSupervisor;
use crate::utils::policy_loader;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

pub struct Gateway {
    config: Arc<Config>,
    policy: Arc<PolicyEngine>,
    pipeline: Arc<EnforcementPipeline>,
    approvals: Arc<ApprovalCoordinator>,
}

impl Gateway {
    pub fn new(config: Arc<Config>) -> Self {
        let policy = Arc::new(PolicyEngine::new(policy_loader::load_policy(
            config.policy_path.as_deref(),
        )));
        let approvals = Arc::new(ApprovalCoordinator::new(config.hitl.clone()));
        let pipeline = Arc::new(EnforcementPipeline::new(
            policy.clone(),
            Arc::new(CircuitBreaker::new(config.breaker.clone())),
            approvals.clone(),
            Arc::new(AuditLog::new(&config.audit_log_path)),
        ));

        Self {
            config,
            policy,
            pipeline,
            approvals,
        }
    }

    /// Continuous proxy mode: spawn the wrapped server and forward both
    /// directions until the client disconnects, the server exits, or the
    /// process is interrupted.
    pub async fn run_proxy(&self, command: &[String]) -> Result<()> {
        let (cmd, args) = command
            .split_first()
            .context("Missing upstream server command")?;

        hitl::server::spawn(self.approvals.clone());
        self.register_reload_handler();

        info!("Spawning MCP server: {} {:?}", cmd, args);
        let (tx_events, mut rx_events) = mpsc::channel::<UpstreamEvent>(32);
        let (mut supervisor, server_stdin, server_stdout, server_stderr) =
            ProcessSupervisor::spawn(cmd, args, tx_events.clone())?;

        let server_stdin = server_stdin.context("Upstream process has no stdin")?;
        let server_stdout = server_stdout.context("Upstream process has no stdout")?;

        let stop = CancellationToken::new();
        let client_out = SharedWriter::stdout();

        let client_task = spawn_client_forwarder(
            tokio::io::stdin(),
            server_stdin,
            self.pipeline.clone(),
            client_out.clone(),
            stop.clone(),
        );
        let server_task = spawn_server_forwarder(server_stdout, client_out, stop.clone());
        if let Some(stderr) = server_stderr {
            spawn_stderr_drain(stderr, tx_events);
        }

        loop {
            tokio::select! {
                event = rx_events.recv() => match event {
                    Some(UpstreamEvent::Log(msg)) => warn!("[server stderr] {}", msg),
                    Some(UpstreamEvent::Terminated(code)) => {
                        info!("Upstream server exited with code {:?}", code);
                        break;
                    }
                    None => break,
                },
                _ = tokio::signal::ctrl_c() => {
                    info!("Received interrupt signal");
                    break;
                }
            }
        }

        stop.cancel();
        supervisor.kill();
        for task in [client_task, server_task] {
            if tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err() {
                warn!("Forwarder did not stop within grace period");
            }
        }
        info!("Gateway stopped");
        Ok(())
    }

    /// Single-shot demo mode: read one message from stdin, run it through
    /// the pipeline, and print the verdict.
    pub async fn run_demo(&self) -> Result<()> {
        info!("Demo mode: reading single message from stdin");
        hitl::server::spawn(self.approvals.clone());

        let mut input = String::new();
        tokio::io::stdin()
            .read_to_string(&mut input)
            .await
            .context("Failed to read stdin")?;

        let request = match serde_json::from_str(&input) {
            Ok(request) => request,
            Err(e) => {
                error!("Invalid JSON input: {}", e);
                return Ok(());
            }
        };

        match self.pipeline.decide(&request).await {
            Outcome::Forward => {
                info!("Request validated. Would forward to server.");
            }
            Outcome::Block { reason } => {
                warn!("Request blocked: {}", reason);
                let response = policy_violation_response(request.id.clone(), &reason);
                println!("{}", serde_json::to_string_pretty(&response)?);
            }
        }
        Ok(())
    }

    /// SIGHUP reloads the policy file and swaps the active snapshot.
    fn register_reload_handler(&self) {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            let policy = self.policy.clone();
            let path = self.config.policy_path.clone();
            tokio::spawn(async move {
                let mut hangup = match signal(SignalKind::hangup()) {
                    Ok(hangup) => hangup,
                    Err(e) => {
                        warn!("Failed to register SIGHUP handler: {}", e);
                        return;
                    }
                };
                while hangup.recv().await.is_some() {
                    info!("Received SIGHUP, reloading policy");
                    policy.reload(policy_loader::load_policy(path.as_deref()));
                }
            });
            info!("SIGHUP handler registered for policy hot-reload");
        }
    }
}
