//! Step dispatch collaborator
//!
//! When a step reaches terminal success, the state machine hands a
//! [`DispatchPayload`] to an external event distributor. The channel-backed
//! implementation is the in-process default; webhook-driven deployments
//! plug in their own.

use crate::error::DispatchError;
use crate::types::DispatchPayload;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// External event-distribution collaborator.
#[async_trait]
pub trait StepDispatcher: Send + Sync {
    /// Hand off one dispatch payload.
    async fn dispatch(&self, payload: DispatchPayload) -> Result<(), DispatchError>;
}

/// Dispatcher backed by a bounded in-process channel.
#[derive(Debug, Clone)]
pub struct ChannelDispatcher {
    sender: mpsc::Sender<DispatchPayload>,
}

impl ChannelDispatcher {
    /// Create a dispatcher and the receiving end of its channel.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<DispatchPayload>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl StepDispatcher for ChannelDispatcher {
    async fn dispatch(&self, payload: DispatchPayload) -> Result<(), DispatchError> {
        tracing::debug!(
            "dispatching step '{}' of plan '{}'",
            payload.step_id,
            payload.plan_id
        );
        self.sender
            .send(payload)
            .await
            .map_err(|_| DispatchError::ChannelClosed)
    }
}
