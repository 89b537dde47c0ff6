//! Fan-out of hub messages to every connected subscriber.
//!
//! Sends run concurrently and are joined without short-circuiting.  A failed
//! send removes that subscriber and is otherwise only logged.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::events::HubMessage;

pub type SubscriberId = u64;

/// A connected endpoint.  Returning `Err` marks it dead.
#[async_trait]
pub trait Subscriber: Send + Sync {
    async fn send(&self, message: &HubMessage) -> anyhow::Result<()>;
}

/// Subscriber backed by a bounded channel.  A full buffer drops the message
/// for this subscriber only; a closed receiver is a send failure.
pub struct ChannelSubscriber {
    tx: mpsc::Sender<HubMessage>,
}

impl ChannelSubscriber {
    pub fn new(tx: mpsc::Sender<HubMessage>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl Subscriber for ChannelSubscriber {
    async fn send(&self, message: &HubMessage) -> anyhow::Result<()> {
        match self.tx.try_send(message.clone()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!(kind = %message.kind, "subscriber lagging; message dropped");
                Ok(())
            }
            Err(TrySendError::Closed(_)) => anyhow::bail!("subscriber channel closed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("send to subscriber {id} failed: {reason}")]
pub struct SubscriberSendFailed {
    pub id: SubscriberId,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub removed: Vec<SubscriberSendFailed>,
}

#[derive(Default)]
pub struct Hub {
    subscribers: Mutex<HashMap<SubscriberId, Arc<dyn Subscriber>>>,
    next_id: AtomicU64,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber>) -> SubscriberId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.subscribers.lock().insert(id, subscriber);
        debug!(subscriber = id, "subscriber connected");
        id
    }

    /// Subscribe a fresh channel and hand back its receiving end.
    pub fn connect(&self, buffer: usize) -> (SubscriberId, mpsc::Receiver<HubMessage>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let id = self.subscribe(Arc::new(ChannelSubscriber::new(tx)));
        (id, rx)
    }

    /// `false` when the handle was already gone.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.subscribers.lock().remove(&id).is_some();
        if removed {
            debug!(subscriber = id, "subscriber disconnected");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.subscribers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.subscribers.lock().contains_key(&id)
    }

    /// Best-effort, at-most-once delivery to everyone subscribed at call time.
    pub async fn broadcast(&self, message: &HubMessage) -> BroadcastReport {
        let snapshot: Vec<(SubscriberId, Arc<dyn Subscriber>)> = self
            .subscribers
            .lock()
            .iter()
            .map(|(id, sub)| (*id, Arc::clone(sub)))
            .collect();

        let sends = snapshot.iter().map(|(id, sub)| async move {
            let outcome = sub.send(message).await;
            (*id, outcome)
        });
        let outcomes = join_all(sends).await;

        let mut report = BroadcastReport::default();
        for (id, outcome) in outcomes {
            match outcome {
                Ok(()) => report.delivered += 1,
                Err(err) => report.removed.push(SubscriberSendFailed {
                    id,
                    reason: format!("{err:#}"),
                }),
            }
        }

        if !report.removed.is_empty() {
            let mut subscribers = self.subscribers.lock();
            for failure in &report.removed {
                subscribers.remove(&failure.id);
                warn!(subscriber = failure.id, error = %failure.reason, "dropping subscriber after failed send");
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[derive(Default)]
    struct Recording {
        received: Mutex<Vec<HubMessage>>,
    }

    #[async_trait]
    impl Subscriber for Recording {
        async fn send(&self, message: &HubMessage) -> anyhow::Result<()> {
            self.received.lock().push(message.clone());
            Ok(())
        }
    }

    struct Broken;

    #[async_trait]
    impl Subscriber for Broken {
        async fn send(&self, _message: &HubMessage) -> anyhow::Result<()> {
            anyhow::bail!("socket reset")
        }
    }

    #[tokio::test]
    async fn failing_subscriber_is_removed_and_others_receive() {
        let hub = Hub::new();
        let first = Arc::new(Recording::default());
        let third = Arc::new(Recording::default());
        let a = hub.subscribe(first.clone());
        let b = hub.subscribe(Arc::new(Broken));
        let c = hub.subscribe(third.clone());

        let report = hub.broadcast(&HubMessage::new("tool_result", json!({}))).await;

        assert_eq!(report.delivered, 2);
        assert_eq!(report.removed.len(), 1);
        assert_eq!(report.removed[0].id, b);
        assert_eq!(first.received.lock().len(), 1);
        assert_eq!(third.received.lock().len(), 1);
        assert!(hub.contains(a) && hub.contains(c));
        assert!(!hub.contains(b));
    }

    #[tokio::test]
    async fn closed_channel_counts_as_failure() {
        let hub = Hub::new();
        let (id, rx) = hub.connect(4);
        drop(rx);
        let report = hub.broadcast(&HubMessage::new("x", json!({}))).await;
        assert_eq!(report.removed[0].id, id);
        assert!(hub.is_empty());
    }

    #[tokio::test]
    async fn full_channel_drops_message_but_keeps_subscriber() {
        let hub = Hub::new();
        let (id, mut rx) = hub.connect(1);
        hub.broadcast(&HubMessage::new("one", json!({}))).await;
        let report = hub.broadcast(&HubMessage::new("two", json!({}))).await;
        assert!(report.removed.is_empty());
        assert!(hub.contains(id));
        assert_eq!(rx.recv().await.unwrap().kind, "one");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let hub = Hub::new();
        let (id, mut rx) = hub.connect(4);
        assert!(hub.unsubscribe(id));
        assert!(!hub.unsubscribe(id));
        let report = hub.broadcast(&HubMessage::new("x", json!({}))).await;
        assert_eq!(report, BroadcastReport::default());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn concurrent_subscribe_and_broadcast() {
        let hub = Arc::new(Hub::new());
        let mut tasks = Vec::new();
        for i in 0..16 {
            let hub = Arc::clone(&hub);
            tasks.push(tokio::spawn(async move {
                let (id, _rx) = hub.connect(8);
                hub.broadcast(&HubMessage::new("tick", json!({ "i": i }))).await;
                hub.unsubscribe(id);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert!(hub.is_empty());
    }
}
