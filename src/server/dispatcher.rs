// ABOUTME: Event dispatcher that fans bus events out to attached sessions
// ABOUTME: Supervised background task that resubscribes with jittered backoff and never gives up

use crate::error::BusError;
use crate::server::bus::EventBus;
use crate::server::session_manager::SessionManager;
use futures_util::StreamExt;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Delay before resubscribing, doubling per consecutive failure up to a cap
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    failures: u32,
}

impl Backoff {
    /// Create a backoff starting at `base` and never exceeding `max` (plus jitter)
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            failures: 0,
        }
    }

    /// Delay for the next retry, with up to 10% random jitter added
    pub fn next_delay(&mut self) -> Duration {
        let factor = 1u32 << self.failures.min(16);
        let delay = self.base.saturating_mul(factor).min(self.max);
        self.failures = self.failures.saturating_add(1);

        let jitter_cap = delay.as_millis() as u64 / 10;
        let jitter = if jitter_cap > 0 {
            rand::thread_rng().gen_range(0..=jitter_cap)
        } else {
            0
        };
        delay + Duration::from_millis(jitter)
    }

    /// Forget previous failures
    pub fn reset(&mut self) {
        self.failures = 0;
    }
}

/// Consumes the event bus and broadcasts every event to all attached sessions
pub struct Dispatcher {
    bus: Arc<dyn EventBus>,
    sessions: Arc<SessionManager>,
    backoff: Backoff,
}

impl Dispatcher {
    /// Create a dispatcher
    pub fn new(bus: Arc<dyn EventBus>, sessions: Arc<SessionManager>, backoff: Backoff) -> Self {
        Self {
            bus,
            sessions,
            backoff,
        }
    }

    /// Run until `shutdown` flips to `true` or its sender is dropped
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        log::info!("Event dispatcher started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.bus.subscribe() {
                Ok(mut subscription) => {
                    log::debug!("Subscribed to event bus");
                    loop {
                        tokio::select! {
                            changed = shutdown.changed() => {
                                if changed.is_err() || *shutdown.borrow() {
                                    log::info!("Event dispatcher stopped");
                                    return;
                                }
                            }
                            item = subscription.next() => match item {
                                Some(Ok(event)) => {
                                    self.backoff.reset();
                                    match event.to_json() {
                                        Ok(json) => {
                                            let delivered = self.sessions.broadcast_text(&json);
                                            log::debug!("Broadcast {} to {} sessions", event.name(), delivered);
                                        }
                                        Err(e) => log::error!("Failed to encode {}: {}", event.name(), e),
                                    }
                                }
                                Some(Err(BusError::Lagged(missed))) => {
                                    log::warn!("Event dispatcher lagged, {} events dropped", missed);
                                }
                                Some(Err(e)) => {
                                    log::warn!("Skipping bus message: {}", e);
                                }
                                None => {
                                    log::warn!("Event bus subscription closed");
                                    break;
                                }
                            }
                        }
                    }
                }
                Err(e) => {
                    log::error!("Event bus subscription failed: {}", e);
                }
            }

            let delay = self.backoff.next_delay();
            log::info!("Resubscribing to event bus in {:?}", delay);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        log::info!("Event dispatcher stopped");
    }
}

/// Spawn the dispatcher as a background task
///
/// Returns the task handle and the sender that stops it.
pub fn spawn_dispatcher(
    bus: Arc<dyn EventBus>,
    sessions: Arc<SessionManager>,
    backoff: Backoff,
) -> (JoinHandle<()>, watch::Sender<bool>) {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let dispatcher = Dispatcher::new(bus, sessions, backoff);
    let handle = tokio::spawn(dispatcher.run(shutdown_rx));
    (handle, shutdown_tx)
}
