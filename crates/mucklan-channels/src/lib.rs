//! # Mucklan Channels
//!
//! Discord connection for the household assistant.
//!
//! - [`DiscordChannel`]: REST API v10, implements `ChatChannel` (DMs,
//!   channel posts, attachment listing and download).
//! - [`DiscordGateway`]: WebSocket listener turning `MESSAGE_CREATE`
//!   events into `IncomingMessage`s, reconnecting with backoff.

pub mod discord;
pub mod gateway;

pub use discord::{DiscordChannel, snowflake_at};
pub use gateway::{DiscordGateway, GatewayStream};
