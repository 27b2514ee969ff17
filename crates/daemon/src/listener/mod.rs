// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listener task for handling socket I/O.
//!
//! Each connection carries one request and one response and is served in
//! its own task. Commands and resolutions are funnelled through the command
//! bridge to the agent loop; status is read from the agent's watch channel.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::UnixListener;
use tokio::sync::{watch, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use ua_core::UnitName;
use ua_engine::{CommandBridge, StatusReport};
use ua_wire::{ProtocolError, Request, Response, UnitStatus};

use crate::env::PROTOCOL_VERSION;

/// Shared context for all request handlers.
pub(crate) struct ListenCtx {
    pub unit: UnitName,
    pub bridge: CommandBridge,
    pub status: watch::Receiver<StatusReport>,
    pub shutdown: Arc<Notify>,
    pub ipc_timeout: Duration,
}

/// Listener task for accepting socket connections.
pub(crate) struct Listener {
    unix: UnixListener,
    ctx: Arc<ListenCtx>,
}

/// Errors from connection handling.
#[derive(Debug, Error)]
pub(crate) enum ConnectionError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl Listener {
    pub fn new(unix: UnixListener, ctx: Arc<ListenCtx>) -> Self {
        Self { unix, ctx }
    }

    /// Accept connections until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        loop {
            let accepted = tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = self.unix.accept() => accepted,
            };
            match accepted {
                Ok((stream, _)) => {
                    let ctx = Arc::clone(&self.ctx);
                    tokio::spawn(async move {
                        let (reader, writer) = stream.into_split();
                        if let Err(e) = handle_connection(reader, writer, &ctx).await {
                            log_connection_error(e);
                        }
                    });
                }
                Err(e) => error!("Unix accept error: {}", e),
            }
        }
        debug!("listener stopped");
    }
}

fn log_connection_error(e: ConnectionError) {
    match e {
        ConnectionError::Protocol(ProtocolError::ConnectionClosed) => debug!("Client disconnected"),
        ConnectionError::Protocol(ProtocolError::Timeout) => warn!("Connection timeout"),
        _ => error!("Connection error: {}", e),
    }
}

/// Handle a single client connection.
///
/// The handler is raced against client disconnect so an abandoned request
/// does not keep a task waiting on the agent.
async fn handle_connection<R, W>(
    mut reader: R,
    mut writer: W,
    ctx: &ListenCtx,
) -> Result<(), ConnectionError>
where
    R: AsyncRead + AsyncReadExt + Unpin + Send + 'static,
    W: AsyncWrite + AsyncWriteExt + Unpin + Send + 'static,
{
    let request = ua_wire::read_request(&mut reader, ctx.ipc_timeout).await?;

    // Status and pings are polled; everything else is an operator action
    if matches!(request, Request::Ping | Request::Status) {
        debug!(request = ?request, "received request");
    } else {
        info!(request = ?request, "received request");
    }

    let response = tokio::select! {
        response = handle_request(request, ctx) => response,
        _ = detect_client_disconnect(&mut reader) => {
            debug!("Client disconnected, dropping request");
            return Ok(());
        }
    };

    debug!("Sending response: {:?}", response);
    ua_wire::write_response(&mut writer, &response, ctx.ipc_timeout).await?;
    Ok(())
}

/// Resolves once the client closes its end (or sends unexpected bytes).
async fn detect_client_disconnect<R: AsyncReadExt + Unpin>(reader: &mut R) {
    let mut buf = [0u8; 1];
    let _ = reader.read(&mut buf).await;
}

async fn handle_request(request: Request, ctx: &ListenCtx) -> Response {
    match request {
        Request::Ping => Response::Pong,

        Request::Hello { version } => {
            if version != PROTOCOL_VERSION {
                debug!(client = %version, daemon = PROTOCOL_VERSION, "protocol version mismatch");
            }
            Response::Hello { version: PROTOCOL_VERSION.to_string() }
        }

        Request::RunCommands { args } => match ctx.bridge.run_commands(args).await {
            Ok(response) => Response::Exec { response },
            Err(e) => Response::Error { message: e.to_string() },
        },

        Request::Status => Response::Status { status: Box::new(unit_status(ctx)) },

        Request::Resolve { mode } => match ctx.bridge.resolve(mode).await {
            Ok(()) => Response::Ok,
            Err(e) => Response::Error { message: e.to_string() },
        },

        Request::Shutdown => {
            ctx.shutdown.notify_one();
            Response::ShuttingDown
        }
    }
}

fn unit_status(ctx: &ListenCtx) -> UnitStatus {
    let report = ctx.status.borrow().clone();
    let state = report.state;
    UnitStatus {
        unit: ctx.unit.clone(),
        mode: report.mode.name().to_string(),
        detail: report.mode.to_string(),
        kind: state.kind.to_string(),
        step: state.step.to_string(),
        hook: state.hook,
        deployed: state.deployed,
        installed: state.installed,
        started: state.started,
        leader: state.leader,
    }
}

#[cfg(test)]
#[path = "../listener_tests.rs"]
mod tests;
