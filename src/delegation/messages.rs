//! Delegation message types.
//!
//! Requests travel in a generic envelope; the channel name routes them and the
//! payload is carried as a JSON value.

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::debug;

/// Well-known channel names.
pub mod channels {
    /// Provision a freshly created resource. Payload and reply: the resource state.
    pub const RESOURCE_CREATE: &str = "resource.create";
    /// Liveness check. Replies `"pong"`.
    pub const WORKER_HEALTHCHECK: &str = "worker.healthcheck";
}

pub const PONG: &str = "pong";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub channel: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Envelope {
    pub fn new(channel: impl Into<String>, payload: impl Serialize) -> serde_json::Result<Self> {
        Ok(Self {
            channel: channel.into(),
            payload: serde_json::to_value(payload)?,
        })
    }
}

/// Failure reply sent by a handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct Failure {
    pub code: u16,
    pub message: String,
}

impl Failure {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Failure {
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(400, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(500, message)
    }
}

pub type Reply = Result<serde_json::Value, Failure>;

/// A request as seen by the handler side, carrying the one-shot reply slot.
#[derive(Debug)]
pub struct DelegatedRequest {
    pub envelope: Envelope,
    reply_to: oneshot::Sender<Reply>,
}

impl DelegatedRequest {
    pub(crate) fn new(envelope: Envelope, reply_to: oneshot::Sender<Reply>) -> Self {
        DelegatedRequest { envelope, reply_to }
    }

    pub fn split(self) -> (Envelope, Replier) {
        (
            self.envelope,
            Replier {
                reply_to: self.reply_to,
            },
        )
    }
}

/// Answers exactly one request.
#[derive(Debug)]
pub struct Replier {
    reply_to: oneshot::Sender<Reply>,
}

impl Replier {
    pub fn reply(self, reply: Reply) {
        if self.reply_to.send(reply).is_err() {
            debug!("Requester went away before the reply was sent");
        }
    }

    pub fn succeed(self, payload: impl Serialize) {
        match serde_json::to_value(payload) {
            Ok(value) => self.reply(Ok(value)),
            Err(e) => self.reply(Err(Failure::internal(format!(
                "failed to encode reply: {}",
                e
            )))),
        }
    }

    pub fn fail(self, failure: Failure) {
        self.reply(Err(failure));
    }
}
