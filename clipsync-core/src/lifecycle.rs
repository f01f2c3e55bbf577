use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{error, info};

use crate::{
    message::{ActivityState, DeliveryEvent, InboundMessage},
    pending::PendingStore,
    router::DeliveryRouter,
};

/// Receiver of delivery events, usually a channel into the interaction context.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: DeliveryEvent);
}

impl<F> EventSink for F
where
    F: Fn(DeliveryEvent) + Send + Sync,
{
    fn emit(&self, event: DeliveryEvent) {
        self(event)
    }
}

/// Owns the app's activity state and the drain-on-wake protocol.
///
/// Routing and draining run under the same lock, so a message routed while the app
/// is backgrounded can never slip in after the drain that follows activation.
pub struct LifecycleBridge {
    router: DeliveryRouter,
    activity: Mutex<ActivityState>,
    sink: Arc<dyn EventSink>,
}

impl LifecycleBridge {
    pub fn new(router: DeliveryRouter, initial: ActivityState, sink: Arc<dyn EventSink>) -> Self {
        Self {
            router,
            activity: Mutex::new(initial),
            sink,
        }
    }

    pub fn activity(&self) -> ActivityState {
        *self.lock()
    }

    pub fn store(&self) -> &Arc<PendingStore> {
        self.router.store()
    }

    /// Routes `message` against the current activity state and emits the result.
    pub fn deliver(&self, message: InboundMessage) -> DeliveryEvent {
        let activity = self.lock();
        let event = self.router.route(message, *activity);
        self.sink.emit(event.clone());
        event
    }

    /// Records an activity change. Becoming active drains the pending store.
    ///
    /// Returns the number of messages drained.
    pub fn set_activity(&self, next: ActivityState) -> usize {
        let mut activity = self.lock();
        let previous = *activity;
        if previous != next {
            info!(from = %previous, to = %next, "activity state changed");
        }
        *activity = next;
        if next.is_active() {
            self.drain_locked()
        } else {
            0
        }
    }

    /// Moves every pending message out as an `Immediate` event.
    ///
    /// Used when the host grants an execution window without foregrounding the app.
    /// Draining an empty store is a no-op.
    pub fn drain(&self) -> usize {
        let _activity = self.lock();
        self.drain_locked()
    }

    fn drain_locked(&self) -> usize {
        let store = self.router.store();
        let pending = store.snapshot();
        if pending.is_empty() {
            return 0;
        }

        let drained = pending.len();
        for message in pending {
            self.sink.emit(DeliveryEvent::Immediate(message.into_text()));
        }
        if let Err(err) = store.clear() {
            error!("failed to clear drained pending store: {}", err);
        }
        info!(drained, "pending messages delivered");
        drained
    }

    fn lock(&self) -> MutexGuard<'_, ActivityState> {
        self.activity.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
