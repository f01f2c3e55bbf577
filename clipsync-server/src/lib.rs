pub mod config;
pub mod console;
pub mod dispatch;
pub mod interaction;
pub mod listener;
pub mod network;
pub mod scheduler;
pub mod service;

pub use config::{ListenerSettings, ServerConfig, WindowSettings, data_dir, pending_store_path};
pub use console::{CONSOLE_HELP, ConsoleCommand, UnknownCommand};
pub use dispatch::{
    AppState, BodyAccumulator, DispatchContext, DispatchError, LandingPage, Route, build_router,
};
pub use interaction::{
    ClipboardSink, InteractionContext, InteractionHandle, InteractionInput, LogNotifier, Notifier,
    SystemClipboard, UiEvent,
};
pub use listener::{BindError, ConnectionListener, ServerState};
pub use network::{
    DefaultRoute, InterfaceAddr, InterfaceSource, StaticInterfaces, SystemInterfaces,
    resolve_bind_host,
};
pub use scheduler::{WindowOutcome, WindowQueue, WindowRequest, WindowScheduler, run_window};
pub use service::{ClipSyncService, ServiceComponents};
