//! Seams between the household logic and the outside world.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{Attachment, ResidentId};

/// A chat platform the assistant talks through.
#[async_trait]
pub trait ChatChannel: Send + Sync {
    /// Channel name (e.g. "discord").
    fn name(&self) -> &str;

    /// Send a direct message to a single resident, opening the DM if needed.
    async fn send_direct(&self, user: &ResidentId, content: &str) -> Result<()>;

    /// Post a message in a shared channel.
    async fn send_to_channel(&self, channel_id: &str, content: &str) -> Result<()>;

    /// All attachments posted in `channel_id` after `since`, oldest first.
    async fn attachments_since(
        &self,
        channel_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Attachment>>;

    /// Fetch the raw bytes of an attachment.
    async fn download(&self, attachment: &Attachment) -> Result<Vec<u8>>;
}

/// Turns document bytes into plain text, one string per page.
pub trait DocumentReader: Send + Sync {
    fn pages(&self, bytes: &[u8]) -> Result<Vec<String>>;
}
