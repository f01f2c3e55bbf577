use std::sync::Arc;

use clipsync_core::{
    ActivityState, DeliveryEvent, DeliveryRouter, LifecycleBridge, PendingStore,
};
use tokio::{
    sync::{broadcast, watch},
    task::JoinHandle,
};
use tracing::{info, warn};

use crate::{
    config::ServerConfig,
    dispatch::{DispatchContext, LandingPage},
    interaction::{
        ClipboardSink, InteractionContext, InteractionHandle, InteractionInput, LogNotifier,
        Notifier, SystemClipboard, UiEvent,
    },
    listener::{BindError, ConnectionListener, ServerState},
    network::{InterfaceSource, SystemInterfaces},
    scheduler::{WindowRequest, WindowScheduler},
};

/// Host-side integrations that differ between a desktop run and tests.
pub struct ServiceComponents {
    pub clipboard: Box<dyn ClipboardSink>,
    pub notifier: Box<dyn Notifier>,
    pub interfaces: Arc<dyn InterfaceSource>,
}

impl Default for ServiceComponents {
    fn default() -> Self {
        Self {
            clipboard: Box::new(SystemClipboard),
            notifier: Box::new(LogNotifier),
            interfaces: Arc::new(SystemInterfaces),
        }
    }
}

/// The assembled app: listener, lifecycle bridge, run-window queue and interaction context.
///
/// Must be created inside a tokio runtime; background tasks are spawned immediately.
pub struct ClipSyncService {
    config: ServerConfig,
    bridge: Arc<LifecycleBridge>,
    scheduler: WindowScheduler,
    listener: ConnectionListener,
    interaction: InteractionHandle,
    tasks: Vec<JoinHandle<()>>,
}

impl ClipSyncService {
    pub fn new(config: ServerConfig) -> Self {
        Self::with_components(config, ServiceComponents::default())
    }

    pub fn with_components(config: ServerConfig, components: ServiceComponents) -> Self {
        let store = match PendingStore::open(&config.pending_path, config.pending_capacity) {
            Ok(store) => store,
            Err(err) => {
                warn!(
                    "pending store unavailable, parked messages will not survive a restart: {}",
                    err
                );
                PendingStore::in_memory(config.pending_capacity)
            }
        };
        if !store.is_empty() {
            info!(pending = store.len(), "restored parked messages");
        }

        let (scheduler, queue) = WindowScheduler::new();
        let (context, interaction) =
            InteractionContext::new(components.clipboard, components.notifier);

        let sink_handle = interaction.clone();
        let sink = move |event: DeliveryEvent| {
            sink_handle.post(InteractionInput::Delivery(event));
        };
        let router = DeliveryRouter::new(Arc::new(store), Arc::new(scheduler.clone()));
        let bridge = Arc::new(LifecycleBridge::new(
            router,
            config.initial_activity,
            Arc::new(sink),
        ));

        let landing = match &config.landing_page {
            Some(path) => LandingPage::File(path.clone()),
            None => LandingPage::Embedded,
        };
        let listener = ConnectionListener::new(
            config.listener_settings(),
            DispatchContext {
                bridge: Arc::clone(&bridge),
                landing,
                max_body_bytes: config.max_body_bytes,
            },
            components.interfaces,
        );

        let tasks = vec![
            tokio::spawn(context.run(listener.subscribe_transitions())),
            tokio::spawn(queue.run(Arc::clone(&bridge), config.window_settings())),
        ];

        // A store restored with content while backgrounded still deserves a window.
        if !config.initial_activity.is_active() && !bridge.store().is_empty() {
            scheduler.request(WindowRequest::EnteredBackground);
        }

        Self {
            config,
            bridge,
            scheduler,
            listener,
            interaction,
            tasks,
        }
    }

    pub async fn start(&self) -> Result<ServerState, BindError> {
        self.listener.start(self.config.host, self.config.port).await
    }

    /// Closes the listener; the service stays up and can be started again.
    pub async fn stop(&self) {
        self.listener.stop().await;
    }

    pub fn restart(&self) -> JoinHandle<Result<ServerState, BindError>> {
        self.listener.restart()
    }

    pub fn state(&self) -> ServerState {
        self.listener.state()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ServerState> {
        self.listener.subscribe()
    }

    pub fn subscribe_ui(&self) -> broadcast::Receiver<UiEvent> {
        self.interaction.subscribe()
    }

    pub fn activity(&self) -> ActivityState {
        self.bridge.activity()
    }

    pub fn pending_len(&self) -> usize {
        self.bridge.store().len()
    }

    /// Applies an activity transition reported by the host.
    ///
    /// Returns how many parked messages were delivered by the transition.
    pub async fn set_activity(&self, next: ActivityState) -> usize {
        let bridge = Arc::clone(&self.bridge);
        let drained = match tokio::task::spawn_blocking(move || bridge.set_activity(next)).await {
            Ok(drained) => drained,
            Err(err) => {
                warn!("activity change task failed: {}", err);
                0
            }
        };
        if !next.is_active() {
            self.scheduler.request(WindowRequest::EnteredBackground);
        }
        drained
    }

    pub fn history(&self) -> Vec<String> {
        self.interaction.history()
    }

    pub fn clear_history(&self) {
        self.interaction.post(InteractionInput::ClearHistory);
    }

    pub async fn shutdown(self) {
        self.listener.stop().await;
        for task in self.tasks {
            task.abort();
        }
        info!("clipsync stopped");
    }
}
