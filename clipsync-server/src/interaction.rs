use std::sync::{Arc, Mutex, PoisonError};

use arboard::Clipboard;
use clipsync_core::{DeliveryEvent, History, content_hash};
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};
use tracing::{debug, info, warn};

use crate::listener::ServerState;

const TOAST_PREVIEW_CHARS: usize = 15;
const UI_EVENT_CAPACITY: usize = 64;
pub const NOTIFICATION_TITLE: &str = "New content received";

pub trait ClipboardSink: Send {
    fn set_text(&mut self, text: &str) -> Result<(), String>;
}

/// Writes to the OS clipboard, opening a fresh handle per write.
#[derive(Debug, Default)]
pub struct SystemClipboard;

impl ClipboardSink for SystemClipboard {
    fn set_text(&mut self, text: &str) -> Result<(), String> {
        let mut clipboard = Clipboard::new().map_err(|err| err.to_string())?;
        clipboard
            .set_text(text.to_owned())
            .map_err(|err| err.to_string())
    }
}

pub trait Notifier: Send {
    fn notify(&mut self, title: &str, body: &str);
}

#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&mut self, title: &str, body: &str) {
        info!(title, "{}", body);
    }
}

/// Signals for whatever renders the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    ServerStateChanged(ServerState),
    HistoryAdded(String),
    PendingReady(String),
    Toast(String),
    Notification { title: String, body: String },
}

#[derive(Debug)]
pub enum InteractionInput {
    Delivery(DeliveryEvent),
    ClearHistory,
}

/// Read-only view of the history plus a way to post work to the context.
#[derive(Debug, Clone)]
pub struct InteractionHandle {
    input_tx: mpsc::UnboundedSender<InteractionInput>,
    history: Arc<Mutex<History>>,
    ui_tx: broadcast::Sender<UiEvent>,
}

impl InteractionHandle {
    pub fn post(&self, input: InteractionInput) {
        if self.input_tx.send(input).is_err() {
            warn!("interaction context is gone; input dropped");
        }
    }

    pub fn history(&self) -> Vec<String> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries()
            .map(str::to_owned)
            .collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UiEvent> {
        self.ui_tx.subscribe()
    }
}

/// The single place where clipboard, history and user-facing signals are mutated.
pub struct InteractionContext {
    clipboard: Box<dyn ClipboardSink>,
    notifier: Box<dyn Notifier>,
    history: Arc<Mutex<History>>,
    last_applied_hash: Option<[u8; 32]>,
    ui_tx: broadcast::Sender<UiEvent>,
    input_rx: mpsc::UnboundedReceiver<InteractionInput>,
}

impl InteractionContext {
    pub fn new(
        clipboard: Box<dyn ClipboardSink>,
        notifier: Box<dyn Notifier>,
    ) -> (Self, InteractionHandle) {
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (ui_tx, _) = broadcast::channel(UI_EVENT_CAPACITY);
        let history = Arc::new(Mutex::new(History::default()));
        let handle = InteractionHandle {
            input_tx,
            history: Arc::clone(&history),
            ui_tx: ui_tx.clone(),
        };
        let context = Self {
            clipboard,
            notifier,
            history,
            last_applied_hash: None,
            ui_tx,
            input_rx,
        };
        (context, handle)
    }

    pub fn apply(&mut self, input: InteractionInput) {
        match input {
            InteractionInput::Delivery(DeliveryEvent::Immediate(text)) => {
                self.apply_immediate(text)
            }
            InteractionInput::Delivery(DeliveryEvent::Deferred(text)) => {
                self.apply_deferred(text)
            }
            InteractionInput::ClearHistory => {
                self.history
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clear();
                debug!("history cleared");
            }
        }
    }

    fn apply_immediate(&mut self, text: String) {
        let hash = content_hash(&text);
        if self.last_applied_hash == Some(hash) {
            debug!("clipboard already holds this content; skipping write");
        } else {
            match self.clipboard.set_text(&text) {
                Ok(()) => self.last_applied_hash = Some(hash),
                Err(err) => warn!("failed to write clipboard: {}", err),
            }
        }

        let added = self
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .append(&text);
        if added {
            self.publish(UiEvent::HistoryAdded(text.clone()));
        }
        let preview = preview_text(&text, TOAST_PREVIEW_CHARS);
        self.publish(UiEvent::Toast(format!("Copied: {preview}")));
    }

    fn apply_deferred(&mut self, text: String) {
        let body = format!("Tap to copy: {text}");
        self.notifier.notify(NOTIFICATION_TITLE, &body);
        self.publish(UiEvent::Notification {
            title: NOTIFICATION_TITLE.to_owned(),
            body,
        });
        self.publish(UiEvent::PendingReady(text));
    }

    fn publish(&self, event: UiEvent) {
        // No subscribers is normal when running headless.
        let _ = self.ui_tx.send(event);
    }

    /// Serves inputs and server-state transitions until every handle is dropped.
    pub async fn run(mut self, mut transitions: broadcast::Receiver<ServerState>) {
        let mut watching = true;
        loop {
            tokio::select! {
                input = self.input_rx.recv() => match input {
                    Some(input) => self.apply(input),
                    None => break,
                },
                transition = transitions.recv(), if watching => match transition {
                    Ok(state) => self.publish(UiEvent::ServerStateChanged(state)),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "missed server state transitions");
                    }
                    Err(RecvError::Closed) => watching = false,
                },
            }
        }
    }
}

fn preview_text(text: &str, max_chars: usize) -> String {
    let mut out = String::new();
    for (index, ch) in text.chars().enumerate() {
        if index >= max_chars {
            out.push_str("...");
            break;
        }
        out.push(ch);
    }
    out
}
