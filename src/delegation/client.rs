use super::bus::MessageBus;
use super::messages::{channels, DelegatedRequest, Envelope, Failure, PONG};
use crate::metrics;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::debug;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("No handler registered for channel {channel}")]
    NoHandler { channel: String },

    #[error("Channel {channel} closed before a reply was received")]
    Closed { channel: String },

    #[error("Request on {channel} timed out after {timeout_ms}ms")]
    Timeout { channel: String, timeout_ms: u64 },

    #[error("Request on {channel} failed with {failure}")]
    Failure { channel: String, failure: Failure },

    #[error("Malformed reply on {channel}: {reason}")]
    MalformedReply { channel: String, reason: String },

    #[error("Failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),
}

impl TransportError {
    fn outcome(&self) -> &'static str {
        match self {
            TransportError::NoHandler { .. } => "no_handler",
            TransportError::Closed { .. } => "closed",
            TransportError::Timeout { .. } => "timeout",
            TransportError::Failure { .. } => "failure",
            TransportError::MalformedReply { .. } => "malformed_reply",
            TransportError::Encode(_) => "encode",
        }
    }
}

/// Requesting side of the delegation channel.
#[derive(Clone)]
pub struct DelegationClient {
    bus: Arc<MessageBus>,
    timeout: Duration,
}

impl DelegationClient {
    pub fn new(bus: Arc<MessageBus>, timeout: Duration) -> Self {
        DelegationClient { bus, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Sends `payload` on `channel` and waits for a single reply of type `Resp`.
    pub async fn request<Req, Resp>(
        &self,
        channel: &str,
        payload: &Req,
    ) -> Result<Resp, TransportError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let start = Instant::now();
        let result = self.round_trip(channel, payload).await;
        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.outcome(),
        };
        metrics::record_delegation_request(channel, outcome, start.elapsed());
        result
    }

    async fn round_trip<Req, Resp>(
        &self,
        channel: &str,
        payload: &Req,
    ) -> Result<Resp, TransportError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let envelope = Envelope::new(channel, payload)?;
        let sender = self
            .bus
            .sender(channel)
            .await
            .ok_or_else(|| TransportError::NoHandler {
                channel: channel.to_string(),
            })?;

        let (reply_tx, reply_rx) = oneshot::channel();
        debug!("Delegating request on {}", channel);
        sender
            .send(DelegatedRequest::new(envelope, reply_tx))
            .await
            .map_err(|_| TransportError::Closed {
                channel: channel.to_string(),
            })?;

        let reply = tokio::time::timeout(self.timeout, reply_rx)
            .await
            .map_err(|_| TransportError::Timeout {
                channel: channel.to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            })?
            .map_err(|_| TransportError::Closed {
                channel: channel.to_string(),
            })?;

        let value = reply.map_err(|failure| TransportError::Failure {
            channel: channel.to_string(),
            failure,
        })?;
        serde_json::from_value(value).map_err(|e| TransportError::MalformedReply {
            channel: channel.to_string(),
            reason: e.to_string(),
        })
    }

    /// Pings the worker. Succeeds only on a `pong` reply.
    pub async fn health_check(&self) -> Result<(), TransportError> {
        let reply: String = self.request(channels::WORKER_HEALTHCHECK, "ping").await?;
        if reply == PONG {
            Ok(())
        } else {
            Err(TransportError::MalformedReply {
                channel: channels::WORKER_HEALTHCHECK.to_string(),
                reason: format!("expected '{}', got '{}'", PONG, reply),
            })
        }
    }
}
