//! Message transport seams
//!
//! Stores emit update messages after committing writes, and workers consume
//! them to refresh downstream state. The transport itself is abstracted so
//! tests can run against in-process channels.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tracing::warn;

use crate::Result;

/// Sink for update messages emitted after a successful store write.
///
/// A send failure must never fail the write that produced the message;
/// callers log and carry on.
#[async_trait]
pub trait MessageSender<M: Send + 'static>: Send + Sync {
    async fn send(&self, message: M) -> Result<()>;
}

/// Handles one incoming message. Returning a recoverable error signals the
/// transport to redeliver.
#[async_trait]
pub trait Worker<M: Send + 'static>: Send + Sync {
    async fn process(&self, message: M) -> Result<()>;
}

/// In-process sender backed by an unbounded channel.
///
/// Production deployments put a durable queue behind [`MessageSender`];
/// this implementation serves tests and single-process setups.
pub struct ChannelSender<M> {
    tx: mpsc::UnboundedSender<M>,
}

impl<M> ChannelSender<M> {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<M>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl<M: Send + Debug + 'static> MessageSender<M> for ChannelSender<M> {
    async fn send(&self, message: M) -> Result<()> {
        self.tx
            .send(message)
            .map_err(|e| crate::Error::Messaging(format!("channel closed: {e}")))
    }
}

/// Sender that drops every message. Useful when a store is driven directly
/// and no downstream consumer exists.
pub struct NullSender;

#[async_trait]
impl<M: Send + 'static> MessageSender<M> for NullSender {
    async fn send(&self, _message: M) -> Result<()> {
        Ok(())
    }
}

/// Drains a receiver, dispatching each message to a worker. Failures are
/// logged and the message skipped; a durable transport would redeliver
/// recoverable failures instead.
pub async fn run_worker<M: Send + Debug + 'static>(
    rx: Arc<Mutex<mpsc::UnboundedReceiver<M>>>,
    worker: Arc<dyn Worker<M>>,
) {
    loop {
        let message = { rx.lock().await.recv().await };
        let Some(message) = message else {
            return;
        };
        if let Err(e) = worker.process(message).await {
            if e.is_recoverable() {
                warn!(error = %e, "worker failed with recoverable error");
            } else {
                warn!(error = %e, "worker failed; message dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_sender_delivers() {
        let (sender, mut rx) = ChannelSender::new();
        sender.send(42u32).await.unwrap();
        assert_eq!(rx.recv().await, Some(42));
    }

    #[tokio::test]
    async fn test_channel_sender_errors_after_receiver_dropped() {
        let (sender, rx) = ChannelSender::new();
        drop(rx);
        assert!(sender.send(1u32).await.is_err());
    }
}
