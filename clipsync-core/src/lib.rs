pub mod history;
pub mod ingest;
pub mod landing;
pub mod lifecycle;
pub mod message;
pub mod pending;
pub mod router;

use std::{io, path::PathBuf};

use thiserror::Error;

pub use history::History;
pub use ingest::{IngestAck, IngestError, parse_ingest_body};
pub use landing::{TARGET_URL_PLACEHOLDER, render_landing, send_url};
pub use lifecycle::{EventSink, LifecycleBridge};
pub use message::{ActivityState, DeliveryEvent, InboundMessage, content_hash, now_unix_ms};
pub use pending::PendingStore;
pub use router::{BackgroundScheduler, DeliveryRouter, NoopScheduler};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_MAX_BODY_BYTES: usize = 256 * 1024;
pub const DEFAULT_PENDING_CAPACITY: usize = 1;
pub const MAX_HISTORY_ENTRIES: usize = 200;
/// Upper bound on the persisted pending file; anything larger is treated as corrupt.
pub const MAX_PENDING_FILE_BYTES: u64 = 4 * 1024 * 1024;
pub const SEND_PATH: &str = "/send";

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("pending store read failed at {path}: {source}")]
    StoreRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("pending store write failed at {path}: {source}")]
    StoreWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("pending store file too large: {size} bytes (max {max})")]
    StoreTooLarge { size: u64, max: u64 },
    #[error("serialization error: {0}")]
    Serialization(String),
}
