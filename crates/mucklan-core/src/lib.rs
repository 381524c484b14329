//! # Mucklan Core
//!
//! Configuration, unified errors, shared value types and the traits the
//! household logic uses to reach the chat platform and document reader.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::MucklanConfig;
pub use error::{MucklanError, Result};
pub use traits::{ChatChannel, DocumentReader};
pub use types::{Attachment, IncomingMessage, Money, ResidentId};
