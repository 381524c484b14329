//! Discord Bot channel: REST API v10.
//!
//! Sends DMs and channel posts, lists attachments posted in a channel and
//! downloads them. The Gateway listener lives in [`crate::gateway`].

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mucklan_core::error::{MucklanError, Result};
use mucklan_core::traits::ChatChannel;
use mucklan_core::types::{Attachment, IncomingMessage, ResidentId};
use serde::{Deserialize, Serialize};

use crate::gateway::DiscordGateway;

pub(crate) const API_BASE: &str = "https://discord.com/api/v10";

/// Milliseconds between the Unix epoch and the Discord epoch (2015-01-01).
const DISCORD_EPOCH_MS: i64 = 1_420_070_400_000;

/// Page size for message history requests (Discord maximum).
const PAGE_LIMIT: usize = 100;

/// Discord Bot channel.
pub struct DiscordChannel {
    token: String,
    client: reqwest::Client,
    /// Resident id → DM channel id.
    dm_channels: Mutex<HashMap<String, String>>,
}

impl DiscordChannel {
    pub fn new(token: &str) -> Result<Self> {
        if token.trim().is_empty() {
            return Err(MucklanError::config(
                "Discord token missing (set [discord] token or MUCKLAN_DISCORD_TOKEN)",
            ));
        }

        let mut headers = reqwest::header::HeaderMap::new();
        let auth = format!("Bot {token}")
            .parse()
            .map_err(|_| MucklanError::config("Discord token contains invalid characters"))?;
        headers.insert(reqwest::header::AUTHORIZATION, auth);
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("Mucklan (https://github.com/mucklan/mucklan, 0.3)"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| MucklanError::Http(format!("HTTP client: {e}")))?;

        Ok(Self {
            token: token.to_string(),
            client,
            dm_channels: Mutex::new(HashMap::new()),
        })
    }

    /// Gateway listener sharing this bot's credentials.
    pub fn gateway(&self) -> DiscordGateway {
        DiscordGateway::new(&self.token, self.client.clone())
    }

    /// Get current bot info.
    pub async fn get_me(&self) -> Result<DiscordUser> {
        let response = self
            .client
            .get(format!("{API_BASE}/users/@me"))
            .send()
            .await
            .map_err(|e| MucklanError::Http(format!("getMe failed: {e}")))?;
        let response = check_status(response, "getMe").await?;
        response
            .json()
            .await
            .map_err(|e| MucklanError::channel(format!("Invalid getMe response: {e}")))
    }

    /// Send a message to a channel.
    pub async fn send_message(&self, channel_id: &str, content: &str) -> Result<()> {
        let url = format!("{API_BASE}/channels/{channel_id}/messages");
        let body = serde_json::json!({ "content": content });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| MucklanError::Http(format!("Discord send failed: {e}")))?;
        check_status(response, "send").await?;
        Ok(())
    }

    /// DM channel id for a user, opening it on first use.
    pub async fn dm_channel(&self, user: &ResidentId) -> Result<String> {
        if let Some(id) = self.cached_dm(user.as_str()) {
            return Ok(id);
        }

        let body = serde_json::json!({ "recipient_id": user.as_str() });
        let response = self
            .client
            .post(format!("{API_BASE}/users/@me/channels"))
            .json(&body)
            .send()
            .await
            .map_err(|e| MucklanError::Http(format!("Open DM failed: {e}")))?;
        let response = check_status(response, "open DM").await?;
        let channel: DiscordDmChannel = response
            .json()
            .await
            .map_err(|e| MucklanError::channel(format!("Invalid DM channel response: {e}")))?;

        if let Ok(mut cache) = self.dm_channels.lock() {
            cache.insert(user.as_str().to_string(), channel.id.clone());
        }
        Ok(channel.id)
    }

    fn cached_dm(&self, user: &str) -> Option<String> {
        self.dm_channels.lock().ok()?.get(user).cloned()
    }

    /// One page of channel history after the given message id.
    pub async fn messages_after(&self, channel_id: &str, after: u64) -> Result<Vec<DiscordMessage>> {
        let response = self
            .client
            .get(format!("{API_BASE}/channels/{channel_id}/messages"))
            .query(&[("after", after.to_string()), ("limit", PAGE_LIMIT.to_string())])
            .send()
            .await
            .map_err(|e| MucklanError::Http(format!("Message history failed: {e}")))?;
        let response = check_status(response, "message history").await?;
        response
            .json()
            .await
            .map_err(|e| MucklanError::channel(format!("Invalid message history: {e}")))
    }

    /// All messages posted in `channel_id` after `since`, oldest first.
    pub async fn history_since(
        &self,
        channel_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<DiscordMessage>> {
        let mut after = snowflake_at(since);
        let mut all = Vec::new();

        loop {
            let page = self.messages_after(channel_id, after).await?;
            let full = page.len() >= PAGE_LIMIT;
            let newest = page.iter().filter_map(|m| m.snowflake()).max();
            all.extend(page);

            match newest {
                Some(id) if full && id > after => after = id,
                _ => break,
            }
        }

        all.sort_by_key(|m| m.snowflake().unwrap_or(0));
        all.dedup_by(|a, b| a.id == b.id);
        tracing::debug!("📜 {} message(s) in {} since {}", all.len(), channel_id, since);
        Ok(all)
    }
}

#[async_trait]
impl ChatChannel for DiscordChannel {
    fn name(&self) -> &str {
        "discord"
    }

    async fn send_direct(&self, user: &ResidentId, content: &str) -> Result<()> {
        let channel_id = self.dm_channel(user).await?;
        self.send_message(&channel_id, content).await
    }

    async fn send_to_channel(&self, channel_id: &str, content: &str) -> Result<()> {
        self.send_message(channel_id, content).await
    }

    async fn attachments_since(
        &self,
        channel_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Attachment>> {
        let messages = self.history_since(channel_id, since).await?;
        Ok(messages
            .into_iter()
            .flat_map(|m| m.attachments.into_iter().map(Attachment::from))
            .collect())
    }

    async fn download(&self, attachment: &Attachment) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(&attachment.url)
            .send()
            .await
            .map_err(|e| MucklanError::Http(format!("Download of {} failed: {e}", attachment.filename)))?;
        let response = check_status(response, &attachment.filename).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| MucklanError::Http(format!("Download of {} failed: {e}", attachment.filename)))?;
        tracing::debug!("📥 Downloaded {} ({} bytes)", attachment.filename, bytes.len());
        Ok(bytes.to_vec())
    }
}

async fn check_status(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    Err(MucklanError::Http(format!("Discord {what}: {status}: {text}")))
}

/// Smallest snowflake that sorts after every message sent before `at`.
pub fn snowflake_at(at: DateTime<Utc>) -> u64 {
    let ms = (at.timestamp_millis() - DISCORD_EPOCH_MS).max(0) as u64;
    ms << 22
}

// --- Discord API Types ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordUser {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub bot: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordAttachment {
    pub id: String,
    pub filename: String,
    pub url: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub size: u64,
}

impl From<DiscordAttachment> for Attachment {
    fn from(a: DiscordAttachment) -> Self {
        Attachment {
            id: a.id,
            filename: a.filename,
            url: a.url,
            content_type: a.content_type,
            size: a.size,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordMessage {
    pub id: String,
    pub channel_id: String,
    pub author: DiscordUser,
    #[serde(default)]
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub guild_id: Option<String>,
    #[serde(default)]
    pub attachments: Vec<DiscordAttachment>,
}

impl DiscordMessage {
    pub fn snowflake(&self) -> Option<u64> {
        self.id.parse().ok()
    }
}

impl From<DiscordMessage> for IncomingMessage {
    fn from(m: DiscordMessage) -> Self {
        IncomingMessage {
            channel_id: m.channel_id,
            author_id: m.author.id,
            author_name: Some(m.author.username),
            content: m.content,
            from_bot: m.author.bot.unwrap_or(false),
            timestamp: m.timestamp,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DiscordDmChannel {
    id: String,
}
