use std::{future::Future, sync::Arc};

use clipsync_core::{BackgroundScheduler, LifecycleBridge};
use tokio::{
    sync::mpsc,
    time::{Instant, sleep, sleep_until},
};
use tracing::{debug, error, info, warn};

use crate::config::WindowSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowRequest {
    /// A message was parked and should be surfaced soon.
    MessageParked,
    /// The app just moved to the background.
    EnteredBackground,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowOutcome {
    Completed { drained: usize },
    Expired,
    Failed,
}

impl WindowOutcome {
    /// Value reported back to the host scheduler.
    pub fn success(self) -> bool {
        matches!(self, WindowOutcome::Completed { .. })
    }
}

/// Handle used by the router and the host to ask for run windows.
#[derive(Debug, Clone)]
pub struct WindowScheduler {
    tx: mpsc::UnboundedSender<WindowRequest>,
}

impl WindowScheduler {
    pub fn new() -> (Self, WindowQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, WindowQueue { rx })
    }

    pub fn request(&self, request: WindowRequest) {
        if self.tx.send(request).is_err() {
            debug!(?request, "window queue closed; request dropped");
        }
    }
}

impl BackgroundScheduler for WindowScheduler {
    fn request_run_window(&self) {
        self.request(WindowRequest::MessageParked);
    }
}

/// Receiving half; `run` grants the requested windows.
#[derive(Debug)]
pub struct WindowQueue {
    rx: mpsc::UnboundedReceiver<WindowRequest>,
}

impl WindowQueue {
    /// Grants windows until every `WindowScheduler` is dropped.
    ///
    /// Requests arriving while one is already due are coalesced into it. After each
    /// window another one is scheduled `interval` later for as long as the app stays
    /// in the background.
    pub async fn run(mut self, bridge: Arc<LifecycleBridge>, settings: WindowSettings) {
        let mut next_due: Option<Instant> = None;
        loop {
            let deadline = next_due;
            let wait = async move {
                match deadline {
                    Some(at) => sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                request = self.rx.recv() => {
                    let Some(request) = request else { break };
                    let due = Instant::now() + settings.delay;
                    next_due = Some(next_due.map_or(due, |current| current.min(due)));
                    debug!(?request, "run window requested");
                }
                _ = wait => {
                    next_due = None;
                    let outcome = run_window(Arc::clone(&bridge), sleep(settings.budget)).await;
                    info!(?outcome, success = outcome.success(), "run window finished");
                    if !bridge.activity().is_active() {
                        next_due = Some(Instant::now() + settings.interval);
                    }
                }
            }
        }
    }
}

/// Drains the pending store inside one execution window.
///
/// Resolves to `Expired` if `expiration` fires before the drain reports back. The
/// drain itself cannot be interrupted once started: it finishes on the blocking
/// pool and its deliveries still land, so `Expired` only means the host was told
/// the window closed first. No parked message is lost either way.
pub async fn run_window(
    bridge: Arc<LifecycleBridge>,
    expiration: impl Future<Output = ()>,
) -> WindowOutcome {
    let work = tokio::task::spawn_blocking(move || bridge.drain());
    tokio::select! {
        joined = work => match joined {
            Ok(drained) => WindowOutcome::Completed { drained },
            Err(err) => {
                error!("run window drain failed: {}", err);
                WindowOutcome::Failed
            }
        },
        _ = expiration => {
            warn!("run window expired before the drain finished; it completes in the background");
            WindowOutcome::Expired
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Mutex, time::Duration};

    use clipsync_core::{
        ActivityState, DeliveryEvent, DeliveryRouter, InboundMessage, NoopScheduler, PendingStore,
    };

    use super::*;

    fn bridge(initial: ActivityState) -> (Arc<LifecycleBridge>, Arc<Mutex<Vec<DeliveryEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&events);
        let router = DeliveryRouter::new(
            Arc::new(PendingStore::in_memory(1)),
            Arc::new(NoopScheduler),
        );
        let sink = move |event: DeliveryEvent| recorded.lock().unwrap().push(event);
        (
            Arc::new(LifecycleBridge::new(router, initial, Arc::new(sink))),
            events,
        )
    }

    #[tokio::test]
    async fn window_drains_pending_message() {
        let (bridge, events) = bridge(ActivityState::Background);
        bridge.deliver(InboundMessage::new("parked"));

        let outcome = run_window(Arc::clone(&bridge), std::future::pending()).await;
        assert_eq!(outcome, WindowOutcome::Completed { drained: 1 });
        assert!(outcome.success());
        assert_eq!(
            events.lock().unwrap().last(),
            Some(&DeliveryEvent::Immediate("parked".to_owned()))
        );
    }

    #[tokio::test]
    async fn empty_window_reports_success() {
        let (bridge, _) = bridge(ActivityState::Background);
        let outcome = run_window(bridge, std::future::pending()).await;
        assert_eq!(outcome, WindowOutcome::Completed { drained: 0 });
    }

    #[tokio::test]
    async fn expired_window_still_delivers_once_drain_finishes() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);
        let recorded = Arc::clone(&events);
        let sink = move |event: DeliveryEvent| {
            if event.is_immediate() {
                let _ = release_rx.lock().unwrap().recv();
            }
            recorded.lock().unwrap().push(event);
        };
        let router = DeliveryRouter::new(
            Arc::new(PendingStore::in_memory(1)),
            Arc::new(NoopScheduler),
        );
        let bridge = Arc::new(LifecycleBridge::new(
            router,
            ActivityState::Background,
            Arc::new(sink),
        ));
        bridge.deliver(InboundMessage::new("slow"));

        let outcome = run_window(Arc::clone(&bridge), sleep(Duration::from_millis(50))).await;
        assert_eq!(outcome, WindowOutcome::Expired);
        assert!(!outcome.success());

        release_tx.send(()).unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        while !bridge.store().is_empty() {
            assert!(Instant::now() < deadline, "drain never finished");
            sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(
            events.lock().unwrap().last(),
            Some(&DeliveryEvent::Immediate("slow".to_owned()))
        );
    }

    #[tokio::test]
    async fn queue_grants_requested_window() {
        let (bridge, events) = bridge(ActivityState::Background);
        let (scheduler, queue) = WindowScheduler::new();
        let settings = WindowSettings {
            delay: Duration::from_millis(10),
            budget: Duration::from_secs(5),
            interval: Duration::from_secs(3600),
        };
        let runner = tokio::spawn(queue.run(Arc::clone(&bridge), settings));

        bridge.deliver(InboundMessage::new("soon"));
        scheduler.request_run_window();

        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            if bridge.store().is_empty() {
                break;
            }
            assert!(Instant::now() < deadline, "window never ran");
            sleep(Duration::from_millis(10)).await;
        }
        assert!(
            events
                .lock()
                .unwrap()
                .contains(&DeliveryEvent::Immediate("soon".to_owned()))
        );

        drop(scheduler);
        tokio::time::timeout(Duration::from_secs(2), runner)
            .await
            .expect("queue stops once schedulers are gone")
            .expect("queue task");
    }
}
