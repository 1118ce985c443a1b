// ABOUTME: Event bus for state change notifications
// ABOUTME: Best-effort publish/subscribe of JSON envelopes, at-most-once with no replay

use crate::error::BusError;
use crate::protocol::messages::SyncEvent;
use futures_util::stream::{self, BoxStream, StreamExt};
use tokio::sync::broadcast;

/// Stream of events from one subscription
///
/// Ends when the subscription is closed; the consumer resubscribes.
pub type Subscription = BoxStream<'static, Result<SyncEvent, BusError>>;

/// Publish/subscribe channel carrying [`SyncEvent`]s
///
/// The bus only prompts resynchronization. Events lost while nobody is subscribed
/// are never redelivered; the state store stays the source of truth.
pub trait EventBus: Send + Sync {
    /// Fire-and-forget publish
    fn publish(&self, event: &SyncEvent);

    /// Open a new subscription
    fn subscribe(&self) -> Result<Subscription, BusError>;
}

/// In-process bus over a `tokio::sync::broadcast` channel of encoded envelopes
#[derive(Debug, Clone)]
pub struct LocalBus {
    sender: broadcast::Sender<String>,
}

impl LocalBus {
    /// Create a bus retaining at most `capacity` undelivered events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        log::debug!("Event bus initialized (capacity={})", capacity);
        Self { sender }
    }

    /// Publish a raw payload as-is
    pub fn publish_raw(&self, payload: impl Into<String>) {
        // No receivers is fine: the event is simply lost.
        let _ = self.sender.send(payload.into());
    }

    /// Number of open subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl EventBus for LocalBus {
    fn publish(&self, event: &SyncEvent) {
        match event.to_json() {
            Ok(payload) => self.publish_raw(payload),
            Err(e) => log::error!("Failed to encode {} event: {}", event.name(), e),
        }
    }

    fn subscribe(&self) -> Result<Subscription, BusError> {
        let rx = self.sender.subscribe();
        let events = stream::unfold(rx, |mut rx| async move {
            let item = match rx.recv().await {
                Ok(payload) => SyncEvent::from_json(&payload).map_err(BusError::from),
                Err(broadcast::error::RecvError::Lagged(missed)) => Err(BusError::Lagged(missed)),
                Err(broadcast::error::RecvError::Closed) => return None,
            };
            Some((item, rx))
        });
        Ok(events.boxed())
    }
}
