//! Scripted transport used by unit tests across the crate.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::action_model::ActionPayload;
use super::transport::{RemoteResponse, RemoteTransport, TransportError};

#[derive(Debug, Clone)]
pub enum TransportScript {
    Status(u16),
    Json(u16, serde_json::Value),
    Unreachable,
    Delayed { status: u16, delay_ms: u64 },
}

/// Answers requests from a FIFO script; 200 with no body once exhausted.
/// Every request is recorded, in order.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<TransportScript>>,
    sent: Mutex<Vec<ActionPayload>>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<TransportScript>) -> Self {
        Self {
            script: Mutex::new(VecDeque::from(script)),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, step: TransportScript) {
        self.script.lock().expect("script lock").push_back(step);
    }

    pub fn sent(&self) -> Vec<ActionPayload> {
        self.sent.lock().expect("sent lock").clone()
    }
}

#[async_trait]
impl RemoteTransport for ScriptedTransport {
    async fn send(&self, payload: &ActionPayload) -> Result<RemoteResponse, TransportError> {
        self.sent.lock().expect("sent lock").push(payload.clone());
        let step = self
            .script
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or(TransportScript::Status(200));
        match step {
            TransportScript::Status(status) => Ok(RemoteResponse::new(status, None)),
            TransportScript::Json(status, body) => Ok(RemoteResponse::new(status, Some(body))),
            TransportScript::Unreachable => Err(TransportError::Unreachable(
                "connection refused".to_string(),
            )),
            TransportScript::Delayed { status, delay_ms } => {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                Ok(RemoteResponse::new(status, None))
            }
        }
    }
}
