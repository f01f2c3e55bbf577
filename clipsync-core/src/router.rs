use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::{
    message::{ActivityState, DeliveryEvent, InboundMessage},
    pending::PendingStore,
};

/// Host hook for "run me briefly, later".
pub trait BackgroundScheduler: Send + Sync {
    /// Best-effort request for a short execution window; must not block.
    fn request_run_window(&self);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopScheduler;

impl BackgroundScheduler for NoopScheduler {
    fn request_run_window(&self) {}
}

pub struct DeliveryRouter {
    store: Arc<PendingStore>,
    scheduler: Arc<dyn BackgroundScheduler>,
}

impl DeliveryRouter {
    pub fn new(store: Arc<PendingStore>, scheduler: Arc<dyn BackgroundScheduler>) -> Self {
        Self { store, scheduler }
    }

    pub fn store(&self) -> &Arc<PendingStore> {
        &self.store
    }

    pub fn route(&self, message: InboundMessage, activity: ActivityState) -> DeliveryEvent {
        match activity {
            ActivityState::Active => DeliveryEvent::Immediate(message.into_text()),
            ActivityState::Background => {
                let text = message.text().to_owned();
                match self.store.push(message) {
                    Ok(Some(evicted)) => warn!(
                        evicted_received_at = evicted.received_at_unix_ms(),
                        "pending store full; dropped oldest undelivered message"
                    ),
                    Ok(None) => {}
                    Err(err) => error!("pending message kept in memory only: {}", err),
                }
                debug!(pending = self.store.len(), "message parked until app is active");
                self.scheduler.request_run_window();
                DeliveryEvent::Deferred(text)
            }
        }
    }
}
