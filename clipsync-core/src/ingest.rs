use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const ACK_RECEIVED: &str = "received";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IngestError {
    #[error("body is not valid UTF-8")]
    NotUtf8,
    #[error("body is empty")]
    Empty,
    #[error("malformed JSON body: {0}")]
    MalformedJson(String),
    #[error("JSON body has no non-empty \"message\" string")]
    MissingMessage,
}

/// JSON acknowledgement returned by the ingestion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestAck {
    pub status: String,
    pub message: String,
}

impl IngestAck {
    pub fn success() -> Self {
        Self {
            status: "success".to_owned(),
            message: ACK_RECEIVED.to_owned(),
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            status: "error".to_owned(),
            message: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

/// Extracts the snippet text from a `/send` body.
///
/// A JSON object with a non-empty `message` string wins. Bodies that look like JSON
/// (leading `{` or `[`) but do not carry one are rejected; any other non-empty
/// UTF-8 body is taken verbatim.
pub fn parse_ingest_body(body: &[u8]) -> Result<String, IngestError> {
    let text = std::str::from_utf8(body).map_err(|_| IngestError::NotUtf8)?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(IngestError::Empty);
    }

    if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
        return Ok(text.to_owned());
    }

    let value: Value =
        serde_json::from_str(trimmed).map_err(|err| IngestError::MalformedJson(err.to_string()))?;
    match value.get("message").and_then(Value::as_str) {
        Some(message) if !message.is_empty() => Ok(message.to_owned()),
        _ => Err(IngestError::MissingMessage),
    }
}
