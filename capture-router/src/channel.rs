//! Archive channel: how the capture side reaches the storage service.
//!
//! The capture loop only sees the [`ArchiveChannel`] trait, so tests drive
//! it with an in-memory stub. The production implementation speaks the
//! archive's line-JSON protocol over a Unix socket, one connection per
//! request. Any transport failure maps to [`ChannelError::Severed`]: from
//! the loop's point of view a dead socket is the same as an invalidated
//! runtime, and both are terminal.

use crate::types::{ChannelError, ConversationRecord, SubmitOutcome};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

/// Requests the capture side issues against the archive.
#[async_trait::async_trait]
pub trait ArchiveChannel: Send {
    /// Submit a new record. Duplicates and capacity refusals come back as
    /// structured outcomes, not errors.
    async fn submit_record(
        &mut self,
        record: &ConversationRecord,
    ) -> Result<SubmitOutcome, ChannelError>;

    /// Batched existence check: which of these ids does the archive already
    /// hold?
    async fn check_existing_ids(&mut self, ids: &[String]) -> Result<Vec<String>, ChannelError>;

    /// Domain-allowlist lookup for the current hostname.
    async fn is_domain_enabled(&mut self, domain: &str) -> Result<bool, ChannelError>;
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum WireRequest<'a> {
    SubmitRecord { record: &'a ConversationRecord },
    CheckIds { ids: &'a [String] },
    IsDomainEnabled { domain: &'a str },
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum WireResponse {
    Submitted(SubmitOutcome),
    ExistingIds { ids: Vec<String> },
    DomainEnabled { enabled: bool },
    Error { message: String },
    #[serde(other)]
    Unknown,
}

/// Archive client over the service's Unix socket.
pub struct SocketArchiveChannel {
    socket_path: PathBuf,
}

impl SocketArchiveChannel {
    pub fn new(socket_path: PathBuf) -> Self {
        Self { socket_path }
    }

    async fn round_trip(&self, request: &WireRequest<'_>) -> Result<WireResponse, ChannelError> {
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|e| ChannelError::Severed(e.to_string()))?;
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        let json = serde_json::to_string(request)
            .map_err(|e| ChannelError::Protocol(e.to_string()))?;
        writer
            .write_all(json.as_bytes())
            .await
            .map_err(|e| ChannelError::Severed(e.to_string()))?;
        writer
            .write_all(b"\n")
            .await
            .map_err(|e| ChannelError::Severed(e.to_string()))?;
        writer
            .flush()
            .await
            .map_err(|e| ChannelError::Severed(e.to_string()))?;

        let mut line = String::new();
        let read = reader
            .read_line(&mut line)
            .await
            .map_err(|e| ChannelError::Severed(e.to_string()))?;
        if read == 0 {
            return Err(ChannelError::Severed("connection closed".to_string()));
        }

        serde_json::from_str(&line).map_err(|e| {
            // Preserve the raw payload kind for the log line.
            let kind = serde_json::from_str::<Value>(&line)
                .ok()
                .and_then(|v| v.get("type").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| "invalid json".to_string());
            ChannelError::Protocol(format!("{} ({})", e, kind))
        })
    }
}

#[async_trait::async_trait]
impl ArchiveChannel for SocketArchiveChannel {
    async fn submit_record(
        &mut self,
        record: &ConversationRecord,
    ) -> Result<SubmitOutcome, ChannelError> {
        match self.round_trip(&WireRequest::SubmitRecord { record }).await? {
            WireResponse::Submitted(outcome) => Ok(outcome),
            WireResponse::Error { message } => Err(ChannelError::Remote(message)),
            _ => Err(ChannelError::Protocol("unexpected response".to_string())),
        }
    }

    async fn check_existing_ids(&mut self, ids: &[String]) -> Result<Vec<String>, ChannelError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        match self.round_trip(&WireRequest::CheckIds { ids }).await? {
            WireResponse::ExistingIds { ids } => Ok(ids),
            WireResponse::Error { message } => Err(ChannelError::Remote(message)),
            _ => Err(ChannelError::Protocol("unexpected response".to_string())),
        }
    }

    async fn is_domain_enabled(&mut self, domain: &str) -> Result<bool, ChannelError> {
        match self.round_trip(&WireRequest::IsDomainEnabled { domain }).await? {
            WireResponse::DomainEnabled { enabled } => Ok(enabled),
            WireResponse::Error { message } => Err(ChannelError::Remote(message)),
            _ => Err(ChannelError::Protocol("unexpected response".to_string())),
        }
    }
}
