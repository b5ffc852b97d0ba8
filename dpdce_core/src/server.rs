//! Protocol server: decodes requests and answers them from the shared state.
//!
//! Mutating methods only enqueue a command and acknowledge at once; their
//! outcome is observable later through `get_results`. Read methods copy a
//! snapshot and never wait for the worker.
use crate::command::{Command, CommandSender};
use crate::error::{EngineError, Report, Result};
use crate::rpc::{Request, Transport, TransportError};
use crate::state::SharedState;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub const NOT_UNDERSTOOD: &str = "request not understood";

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Success(Value),
    Error(String),
}

pub struct ProtocolServer<T: Transport> {
    transport: T,
    shared: Arc<SharedState>,
    commands: CommandSender,
}

impl<T: Transport> ProtocolServer<T> {
    pub fn new(transport: T, shared: Arc<SharedState>, commands: CommandSender) -> Self {
        Self {
            transport,
            shared,
            commands,
        }
    }

    /// Answer one method call.
    pub fn handle(&self, method: &str, params: &Value) -> Reply {
        if let Some(cmd) = Command::from_method(method) {
            return match self.commands.try_enqueue(cmd) {
                Ok(()) => {
                    tracing::info!(command = ?cmd, "command queued");
                    Reply::Success(Value::Null)
                }
                Err(e) => {
                    tracing::warn!(command = ?cmd, error = %e, "command refused");
                    Reply::Error(e.to_string())
                }
            };
        }
        match method {
            "get_settings" => to_reply(&self.shared.settings()),
            "get_results" => to_reply(&self.shared.results()),
            "set_setting" => {
                tracing::info!(%params, "set_setting received, not applied");
                Reply::Success(Value::Null)
            }
            other => {
                tracing::warn!(method = other, "unknown method");
                Reply::Error(NOT_UNDERSTOOD.to_string())
            }
        }
    }

    /// Serve until `shutdown` is set or the transport fails.
    pub fn serve(&mut self, shutdown: &AtomicBool) -> Result<()> {
        tracing::info!("protocol server running");
        while !shutdown.load(Ordering::Relaxed) {
            let request = match self.transport.receive_request() {
                Ok(r) => r,
                Err(TransportError::Timeout) => continue,
                Err(e @ TransportError::Malformed { .. }) => {
                    tracing::warn!(error = %e, "dropping request");
                    continue;
                }
                Err(TransportError::Io(e)) => {
                    tracing::error!(error = %e, "transport failed");
                    return Err(Report::new(EngineError::Transport(e.to_string())));
                }
            };
            self.respond(request);
        }
        tracing::info!("protocol server stopping");
        Ok(())
    }

    fn respond(&mut self, request: Request) {
        let Request {
            addr,
            id,
            method,
            params,
        } = request;
        tracing::debug!(%addr, %method, "request");
        let sent = match self.handle(&method, &params) {
            Reply::Success(payload) => self.transport.send_success_response(addr, &id, payload),
            Reply::Error(msg) => self.transport.send_error_response(addr, &id, &msg),
        };
        if let Err(e) = sent {
            tracing::warn!(%addr, error = %e, "response not sent");
        }
    }
}

fn to_reply<S: serde::Serialize>(value: &S) -> Reply {
    match serde_json::to_value(value) {
        Ok(v) => Reply::Success(v),
        Err(e) => Reply::Error(format!("encode failed: {e}")),
    }
}
