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

//! Stream forwarding tasks.
//!
//! Two independent loops relay line-delimited JSON-RPC between the client
//! and the wrapped server. The client→server direction runs every parsed
//! message through the enforcement pipeline; the server→client direction
//! is a pure relay. Both flush after every line so request/response pairing
//! stays timely.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::engine::enforcement::{policy_violation_response, EnforcementPipeline, Outcome};
use crate::engine_core::constants::limits;
use crate::engine_core::models::JsonRpcRequest;

/// Events surfaced to the gateway's supervising loop.
#[derive(Debug)]
pub enum UpstreamEvent {
    /// Unstructured log line from the server's stderr
    Log(String),
    /// Server process terminated with optional exit code
    Terminated(Option<i32>),
}

/// Client-facing output shared by both forwarders.
///
/// The enforced loop injects synthesized error responses into the same
/// stream the relay loop writes server output to, so writes go through one
/// async mutex and each line is flushed before the lock is released.
#[derive(Clone)]
pub struct SharedWriter {
    inner: Arc<Mutex<Box<dyn AsyncWrite + Unpin + Send>>>,
}

impl SharedWriter {
    pub fn new(writer: impl AsyncWrite + Unpin + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }

    pub async fn write_line(&self, line: &str) -> std::io::Result<()> {
        let mut writer = self.inner.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await
    }
}

/// Read client lines, enforce, and forward or inject errors.
///
/// Unparseable lines are forwarded unchanged: the server is authoritative
/// on rejecting malformed JSON-RPC. The loop checks the stop token once per
/// line and closes the server's stdin on exit so it observes end-of-input.
pub fn spawn_client_forwarder<R, W>(
    client_in: R,
    mut server_stdin: W,
    pipeline: Arc<EnforcementPipeline>,
    client_out: SharedWriter,
    stop: CancellationToken,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = FramedRead::new(
            client_in,
            LinesCodec::new_with_max_length(limits::MAX_LINE_BYTES),
        );

        loop {
            let line = tokio::select! {
                _ = stop.cancelled() => break,
                line = lines.next() => line,
            };

            let line = match line {
                None => break, // client EOF
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    error!("Client stream framing error: {}", e);
                    break;
                }
            };

            match serde_json::from_str::<JsonRpcRequest>(&line) {
                Ok(request) => match pipeline.decide(&request).await {
                    Outcome::Forward => {
                        if write_line(&mut server_stdin, &line).await.is_err() {
                            // Server stdin is gone; forwarding cannot continue.
                            error!("Failed to write to server stdin, stopping forwarder");
                            break;
                        }
                    }
                    Outcome::Block { reason } => {
                        let response = policy_violation_response(request.id.clone(), &reason);
                        match serde_json::to_string(&response) {
                            Ok(json) => {
                                if let Err(e) = client_out.write_line(&json).await {
                                    warn!("Failed to write error response to client: {}", e);
                                }
                            }
                            Err(e) => error!("Failed to serialize error response: {}", e),
                        }
                    }
                },
                Err(_) => {
                    // Fail-open: not valid JSON, let the server reject it.
                    if write_line(&mut server_stdin, &line).await.is_err() {
                        error!("Failed to write to server stdin, stopping forwarder");
                        break;
                    }
                }
            }
        }

        // Close the pipe so the server sees EOF on its stdin.
        let _ = server_stdin.shutdown().await;
        debug!("Client forwarder stopped");
    })
}

/// Relay server lines to the client verbatim, no parsing or policy.
///
/// A broken client pipe ends the loop silently rather than crashing the
/// process.
pub fn spawn_server_forwarder<R>(
    server_stdout: R,
    client_out: SharedWriter,
    stop: CancellationToken,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = FramedRead::new(
            server_stdout,
            LinesCodec::new_with_max_length(limits::MAX_LINE_BYTES),
        );

        loop {
            let line = tokio::select! {
                _ = stop.cancelled() => break,
                line = lines.next() => line,
            };

            match line {
                None => break, // server EOF
                Some(Ok(line)) => {
                    if client_out.write_line(&line).await.is_err() {
                        debug!("Client disconnected, stopping relay");
                        break;
                    }
                }
                Some(Err(e)) => {
                    error!("Server stream framing error: {}", e);
                    break;
                }
            }
        }
        debug!("Server forwarder stopped");
    })
}

/// Drain the server's stderr into operational logging.
pub fn spawn_stderr_drain<R>(stream: R, tx: mpsc::Sender<UpstreamEvent>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut line = String::new();

        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => break, // Pipe closed
                Ok(_) => {
                    let log_msg = line.trim().to_string();
                    if !log_msg.is_empty() && tx.send(UpstreamEvent::Log(log_msg)).await.is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}
