//! Outbound transport seam
//!
//! The engine hands every message it sends to a `MessageBroadcaster`. Real
//! deployments plug in a network transport; tests use channels and pump
//! messages between engines by hand.

use super::types::ConsensusMessage;
use log::warn;
use tokio::sync::mpsc;

/// Delivers outbound protocol messages to the other replicas
pub trait MessageBroadcaster: Send + Sync {
    fn broadcast(&self, message: &ConsensusMessage);
}

/// Drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpBroadcaster;

impl MessageBroadcaster for NoOpBroadcaster {
    fn broadcast(&self, _message: &ConsensusMessage) {}
}

/// Pushes outbound messages onto an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelBroadcaster {
    tx: mpsc::UnboundedSender<ConsensusMessage>,
}

impl ChannelBroadcaster {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ConsensusMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl MessageBroadcaster for ChannelBroadcaster {
    fn broadcast(&self, message: &ConsensusMessage) {
        if self.tx.send(message.clone()).is_err() {
            warn!("Broadcast channel closed, dropping {}", message.kind.as_str());
        }
    }
}
