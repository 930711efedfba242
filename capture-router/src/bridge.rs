//! Page bridge.
//!
//! The browser-side shim connects over a Unix socket, one connection per
//! page context, and streams line-JSON messages: an initial page snapshot,
//! replacement snapshots as the page changes, mutation batches, and
//! visibility/load signals. The first snapshot drives adapter selection and
//! the domain-allowlist check; the reply tells the shim where to attach its
//! mutation observer. Everything after that is forwarded to the capture
//! loop as [`PageEvent`]s.

use crate::adapters::{AdapterRegistry, ObserveTarget};
use crate::capture::CaptureLoop;
use crate::channel::{ArchiveChannel, SocketArchiveChannel};
use crate::config::CaptureConfig;
use crate::dom::{MutationRecord, Page, SharedDom};
use crate::types::{LoopState, PageEvent};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedReadHalf;
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Messages the page shim sends.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BridgeMessage {
    /// Full snapshot of the page; replaces the previous one.
    PageSnapshot { page: Page },
    /// The document finished loading.
    Loaded,
    /// A batch of DOM mutation records.
    Mutations { records: Vec<MutationRecord> },
    /// Tab visibility changed.
    Visibility { hidden: bool },
}

/// Handshake reply to the shim.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum BridgeReply<'a> {
    /// Attach the mutation observer here.
    Observe { target: &'a ObserveTarget },
    /// This page is not captured; the shim can disconnect.
    Ignored { reason: &'a str },
}

/// Drive one page connection to completion. Returns the capture loop's
/// terminal state, or `None` when the page was never captured (no adapter,
/// domain not tracked, or the archive unreachable at startup).
pub async fn handle_page_connection(
    stream: UnixStream,
    config: CaptureConfig,
) -> Option<LoopState> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let mut line = String::new();
    match reader.read_line(&mut line).await {
        Ok(0) | Err(_) => return None,
        Ok(_) => {}
    }

    let page = match serde_json::from_str::<BridgeMessage>(&line) {
        Ok(BridgeMessage::PageSnapshot { page }) => page,
        Ok(other) => {
            warn!("bridge handshake was not a page snapshot: {:?}", other);
            return None;
        }
        Err(e) => {
            warn!("unparseable bridge handshake: {}", e);
            return None;
        }
    };

    let hostname = page.hostname();
    let registry = AdapterRegistry::new();
    let adapter_name = match registry.detect(&page) {
        Some(found) => found.name(),
        None => {
            debug!("no adapter for {}, ignoring page", hostname);
            let _ = send_reply(&mut write_half, &BridgeReply::Ignored { reason: "no adapter" }).await;
            return None;
        }
    };

    let mut channel = SocketArchiveChannel::new(config.sockets.archive_socket_path.clone());
    match channel.is_domain_enabled(&hostname).await {
        Ok(true) => {}
        Ok(false) => {
            debug!("domain {} not tracked, ignoring page", hostname);
            let _ =
                send_reply(&mut write_half, &BridgeReply::Ignored { reason: "domain disabled" })
                    .await;
            return None;
        }
        Err(e) => {
            warn!("archive unreachable during domain check: {}", e);
            return None;
        }
    }

    let adapter_box = match registry.into_adapter(&page) {
        Some(a) => a,
        None => return None,
    };

    let target = adapter_box.observe_target(&page);
    if send_reply(&mut write_half, &BridgeReply::Observe { target: &target })
        .await
        .is_err()
    {
        return None;
    }

    info!("capturing {} via {} adapter", hostname, adapter_name);
    let dom = SharedDom::new(page);

    let (tx, rx) = mpsc::channel(100);
    let reader_dom = dom.clone();
    tokio::spawn(async move {
        read_bridge_messages(reader, reader_dom, tx).await;
    });

    let capture = CaptureLoop::new(adapter_box, channel, dom, config.timing.clone());
    Some(capture.run(rx).await)
}

async fn send_reply(
    writer: &mut tokio::net::unix::OwnedWriteHalf,
    reply: &BridgeReply<'_>,
) -> std::io::Result<()> {
    let json = serde_json::to_string(reply)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

/// Pump remaining bridge messages into the shared snapshot and the event
/// channel until the shim disconnects.
async fn read_bridge_messages(
    mut reader: BufReader<OwnedReadHalf>,
    dom: SharedDom,
    tx: mpsc::Sender<PageEvent>,
) {
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("bridge read error: {}", e);
                break;
            }
        }

        let message = match serde_json::from_str::<BridgeMessage>(&line) {
            Ok(m) => m,
            Err(e) => {
                warn!("unparseable bridge message: {}", e);
                continue;
            }
        };

        let event = match message {
            BridgeMessage::PageSnapshot { page } => {
                dom.replace(page);
                continue;
            }
            BridgeMessage::Loaded => PageEvent::Loaded,
            BridgeMessage::Mutations { records } => PageEvent::Mutations(records),
            BridgeMessage::Visibility { hidden } => PageEvent::Visibility { hidden },
        };

        if tx.send(event).await.is_err() {
            // Loop ended (stopped or severed); nothing left to forward.
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bridge_messages_parse() {
        let snapshot = r#"{"type":"pageSnapshot","page":{"url":"https://gemini.google.com/app/1","body":{"tag":"body"}}}"#;
        match serde_json::from_str::<BridgeMessage>(snapshot).unwrap() {
            BridgeMessage::PageSnapshot { page } => {
                assert_eq!(page.hostname(), "gemini.google.com");
            }
            _ => panic!("wrong variant"),
        }

        let visibility = r#"{"type":"visibility","hidden":true}"#;
        assert!(matches!(
            serde_json::from_str::<BridgeMessage>(visibility).unwrap(),
            BridgeMessage::Visibility { hidden: true }
        ));

        let mutations = r#"{"type":"mutations","records":[{"added":[{"tag":"div","class":"ds-message"}]}]}"#;
        match serde_json::from_str::<BridgeMessage>(mutations).unwrap() {
            BridgeMessage::Mutations { records } => assert_eq!(records.len(), 1),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn observe_reply_shape() {
        let target = ObserveTarget::ElementId("chat-history".to_string());
        let json = serde_json::to_string(&BridgeReply::Observe { target: &target }).unwrap();
        assert_eq!(
            json,
            r#"{"type":"observe","target":{"kind":"elementId","value":"chat-history"}}"#
        );
    }
}
