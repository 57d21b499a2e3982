//! Websocket event channel carrying JSON `{"event": .., "data": ..}` frames.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use shared::protocol::{InboundEvent, OutboundEvent};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

use crate::{inbound_lanes, EventSink, InboundLanes, InboundRouter};

const EVENT_CHANNEL_PATH: &str = "events";

#[derive(Debug, Error)]
pub enum EventChannelUrlError {
    #[error("invalid server url '{url}': {source}")]
    Invalid {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("server url must start with http://, https://, ws:// or wss://, got '{0}'")]
    UnsupportedScheme(String),
}

/// Maps the configured server url onto the websocket endpoint of the event channel.
pub fn event_channel_url(server_url: &str) -> Result<Url, EventChannelUrlError> {
    let mut url = Url::parse(server_url.trim()).map_err(|source| EventChannelUrlError::Invalid {
        url: server_url.to_string(),
        source,
    })?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        _ => return Err(EventChannelUrlError::UnsupportedScheme(server_url.to_string())),
    };
    url.set_scheme(scheme)
        .map_err(|()| EventChannelUrlError::UnsupportedScheme(server_url.to_string()))?;

    if url.path() == "/" || url.path().is_empty() {
        url.set_path(EVENT_CHANNEL_PATH);
    }
    Ok(url)
}

enum OutboundFrame {
    Event(String),
    Close,
}

pub struct WsEventSink {
    outbound: mpsc::UnboundedSender<OutboundFrame>,
}

#[async_trait]
impl EventSink for WsEventSink {
    async fn emit(&self, event: OutboundEvent) -> Result<()> {
        let text = serde_json::to_string(&event)
            .with_context(|| format!("failed to encode {} event", event.name()))?;
        self.outbound
            .send(OutboundFrame::Event(text))
            .map_err(|_| anyhow!("event channel is closed"))
    }

    async fn close(&self) -> Result<()> {
        self.outbound
            .send(OutboundFrame::Close)
            .map_err(|_| anyhow!("event channel is already closed"))
    }
}

/// Connects to the event channel and starts the reader and writer tasks.
pub async fn connect_event_channel(url: &Url) -> Result<(WsEventSink, InboundLanes)> {
    let (ws_stream, _) = connect_async(url.as_str())
        .await
        .with_context(|| format!("failed to connect event channel: {url}"))?;
    info!(%url, "transport: event channel connected");

    let (mut ws_writer, mut ws_reader) = ws_stream.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
    let (router, lanes) = inbound_lanes();

    tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            match frame {
                OutboundFrame::Event(text) => {
                    if let Err(err) = ws_writer.send(Message::Text(text)).await {
                        warn!(error = %err, "transport: websocket send failed");
                        break;
                    }
                }
                OutboundFrame::Close => {
                    let _ = ws_writer.send(Message::Close(None)).await;
                    break;
                }
            }
        }
        let _ = ws_writer.close().await;
        debug!("transport: writer finished");
    });

    tokio::spawn(async move {
        while let Some(msg) = ws_reader.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    if !route_frame(&router, &text) {
                        break;
                    }
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(err) => {
                    warn!(error = %err, "transport: websocket receive failed");
                    break;
                }
            }
        }
        info!("transport: event channel closed");
    });

    Ok((
        WsEventSink {
            outbound: outbound_tx,
        },
        lanes,
    ))
}

/// Decodes one text frame and routes it. Returns `false` once nobody listens.
pub fn route_frame(router: &InboundRouter, text: &str) -> bool {
    match serde_json::from_str::<InboundEvent>(text) {
        Ok(event) => {
            debug!(?event, "transport: inbound event");
            router.route(event)
        }
        Err(err) => {
            warn!(error = %err, frame = %text, "transport: ignoring undecodable frame");
            true
        }
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
