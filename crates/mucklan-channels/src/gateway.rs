//! Discord Gateway listener: WebSocket events as a message stream.
//!
//! Auto-reconnects on disconnect with exponential backoff (5s doubling to 60s).

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::stream::Stream;
use futures::{SinkExt, StreamExt};
use mucklan_core::error::{MucklanError, Result};
use mucklan_core::types::IncomingMessage;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message as WsMsg;

use crate::discord::{API_BASE, DiscordMessage};

/// GUILDS | GUILD_MESSAGES | DIRECT_MESSAGES | MESSAGE_CONTENT
pub const DEFAULT_INTENTS: u64 = (1 << 0) | (1 << 9) | (1 << 12) | (1 << 15);

const DEFAULT_HEARTBEAT_MS: u64 = 41_250;
const MIN_BACKOFF_SECS: u64 = 5;
const MAX_BACKOFF_SECS: u64 = 60;

/// Gateway connection settings.
pub struct DiscordGateway {
    token: String,
    intents: u64,
    client: reqwest::Client,
}

/// What the listener should do after a gateway payload.
#[derive(Debug, PartialEq)]
enum GatewayEvent {
    Hello { heartbeat_ms: u64 },
    Ready { user: String },
    Message(Box<IncomingMessage>),
    Reconnect,
    InvalidSession,
    Ignore,
}

impl DiscordGateway {
    pub fn new(token: &str, client: reqwest::Client) -> Self {
        Self {
            token: token.to_string(),
            intents: DEFAULT_INTENTS,
            client,
        }
    }

    /// Get Gateway WebSocket URL.
    pub async fn gateway_url(&self) -> Result<String> {
        let response = self
            .client
            .get(format!("{API_BASE}/gateway/bot"))
            .send()
            .await
            .map_err(|e| MucklanError::Http(format!("Gateway request failed: {e}")))?;

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| MucklanError::channel(format!("Invalid gateway response: {e}")))?;

        body["url"]
            .as_str()
            .map(|s| format!("{s}/?v=10&encoding=json"))
            .ok_or_else(|| MucklanError::channel("No gateway URL"))
    }

    fn identify(&self) -> serde_json::Value {
        serde_json::json!({
            "op": 2,
            "d": {
                "token": self.token,
                "intents": self.intents,
                "properties": {
                    "os": std::env::consts::OS,
                    "browser": "mucklan",
                    "device": "mucklan"
                }
            }
        })
    }

    /// Start listening: returns a stream of IncomingMessages.
    /// The background task stops once the stream is dropped.
    pub fn start(self) -> GatewayStream {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        tokio::spawn(async move {
            let gateway = self;
            let mut backoff_secs = MIN_BACKOFF_SECS;

            loop {
                tracing::info!("🔌 Discord Gateway connecting...");

                let url = match gateway.gateway_url().await {
                    Ok(url) => url,
                    Err(e) => {
                        tracing::error!("Failed to get gateway URL: {e}, retrying in {backoff_secs}s...");
                        tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                        backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF_SECS);
                        continue;
                    }
                };

                let (mut ws, _) = match tokio_tungstenite::connect_async(&url).await {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::error!("Gateway WebSocket failed: {e}, retrying in {backoff_secs}s...");
                        tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                        backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF_SECS);
                        continue;
                    }
                };

                backoff_secs = MIN_BACKOFF_SECS;
                tracing::info!("🔌 Discord Gateway connected");

                let mut seq: Option<u64> = None;
                let mut heartbeat = heartbeat_timer(DEFAULT_HEARTBEAT_MS);

                loop {
                    tokio::select! {
                        msg = ws.next() => {
                            let text = match msg {
                                Some(Ok(WsMsg::Text(text))) => text,
                                Some(Ok(WsMsg::Close(_))) => {
                                    tracing::warn!("Discord Gateway closed by server");
                                    break;
                                }
                                Some(Err(e)) => {
                                    tracing::error!("Gateway error: {e}");
                                    break;
                                }
                                None => break,
                                Some(Ok(_)) => continue,
                            };

                            let Ok(payload) = serde_json::from_str::<serde_json::Value>(&text) else {
                                continue;
                            };
                            if let Some(s) = payload["s"].as_u64() {
                                seq = Some(s);
                            }

                            match parse_event(&payload) {
                                GatewayEvent::Hello { heartbeat_ms } => {
                                    tracing::debug!("Gateway Hello: heartbeat={heartbeat_ms}ms");
                                    heartbeat = heartbeat_timer(heartbeat_ms);
                                    if ws.send(WsMsg::Text(gateway.identify().to_string())).await.is_err() {
                                        break;
                                    }
                                }
                                GatewayEvent::Ready { user } => {
                                    tracing::info!("🤖 Discord Gateway READY as {user}");
                                }
                                GatewayEvent::Message(msg) => {
                                    if tx.send(*msg).is_err() {
                                        tracing::info!("Discord stream closed (receiver dropped)");
                                        return;
                                    }
                                }
                                GatewayEvent::Reconnect => {
                                    tracing::warn!("Gateway requesting reconnect");
                                    break;
                                }
                                GatewayEvent::InvalidSession => {
                                    tracing::warn!("Invalid session, re-identifying");
                                    tokio::time::sleep(Duration::from_secs(2)).await;
                                    if ws.send(WsMsg::Text(gateway.identify().to_string())).await.is_err() {
                                        break;
                                    }
                                }
                                GatewayEvent::Ignore => {}
                            }
                        }
                        _ = heartbeat.tick() => {
                            let beat = serde_json::json!({ "op": 1, "d": seq });
                            if ws.send(WsMsg::Text(beat.to_string())).await.is_err() {
                                tracing::error!("Heartbeat send failed");
                                break;
                            }
                            tracing::trace!("Heartbeat sent (seq={:?})", seq);
                        }
                    }
                }

                if tx.is_closed() {
                    return;
                }
                tracing::info!("Discord Gateway disconnected, reconnecting in {backoff_secs}s...");
                tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF_SECS);
            }
        });

        GatewayStream { rx }
    }
}

fn heartbeat_timer(ms: u64) -> tokio::time::Interval {
    let period = Duration::from_millis(ms);
    let mut timer = tokio::time::interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}

fn parse_event(payload: &serde_json::Value) -> GatewayEvent {
    match payload["op"].as_u64().unwrap_or(u64::MAX) {
        10 => GatewayEvent::Hello {
            heartbeat_ms: payload["d"]["heartbeat_interval"]
                .as_u64()
                .unwrap_or(DEFAULT_HEARTBEAT_MS),
        },
        7 => GatewayEvent::Reconnect,
        9 => GatewayEvent::InvalidSession,
        0 => match payload["t"].as_str().unwrap_or("") {
            "READY" => GatewayEvent::Ready {
                user: payload["d"]["user"]["username"]
                    .as_str()
                    .unwrap_or("unknown")
                    .to_string(),
            },
            "MESSAGE_CREATE" => match serde_json::from_value::<DiscordMessage>(payload["d"].clone()) {
                Ok(msg) => GatewayEvent::Message(Box::new(msg.into())),
                Err(e) => {
                    tracing::debug!("Skipping malformed MESSAGE_CREATE: {e}");
                    GatewayEvent::Ignore
                }
            },
            other => {
                tracing::trace!("Ignoring event: {other}");
                GatewayEvent::Ignore
            }
        },
        _ => GatewayEvent::Ignore,
    }
}

/// Stream of incoming Discord messages from Gateway.
pub struct GatewayStream {
    rx: tokio::sync::mpsc::UnboundedReceiver<IncomingMessage>,
}

impl Stream for GatewayStream {
    type Item = IncomingMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
