use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A text snippet accepted by the ingestion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InboundMessage {
    text: String,
    received_at_unix_ms: u64,
}

impl InboundMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self::received_at(text, now_unix_ms())
    }

    pub fn received_at(text: impl Into<String>, received_at_unix_ms: u64) -> Self {
        Self {
            text: text.into(),
            received_at_unix_ms,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn received_at_unix_ms(&self) -> u64 {
        self.received_at_unix_ms
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ActivityState {
    #[default]
    Active,
    Background,
}

impl ActivityState {
    pub fn is_active(self) -> bool {
        matches!(self, ActivityState::Active)
    }
}

impl std::fmt::Display for ActivityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActivityState::Active => write!(f, "active"),
            ActivityState::Background => write!(f, "background"),
        }
    }
}

/// One-shot signal for the UI collaborator.
///
/// `Immediate` goes to the clipboard and history right away; `Deferred` means the
/// text was parked in the pending store and only a local notification should be shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryEvent {
    Immediate(String),
    Deferred(String),
}

impl DeliveryEvent {
    pub fn text(&self) -> &str {
        match self {
            DeliveryEvent::Immediate(text) | DeliveryEvent::Deferred(text) => text,
        }
    }

    pub fn is_immediate(&self) -> bool {
        matches!(self, DeliveryEvent::Immediate(_))
    }
}

pub fn content_hash(text: &str) -> [u8; 32] {
    Sha256::digest(text.as_bytes()).into()
}

pub fn now_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
