//! Disruptor: a chat bot that interrupts monologues with cat pictures.
//!
//! The bot watches each room for an uninterrupted run of messages from one
//! sender. When the run crosses a configured threshold it fetches a picture
//! from a pluggable source tree and posts it, then resets. A manual trigger
//! (an exact cat-face emoji message) is available behind per-user and
//! per-room token-bucket rate limits.

pub mod bot;
pub mod config;
pub mod error;
pub mod monologue;
pub mod ratelimit;
pub mod source;
pub mod tasks;
pub mod transport;

#[cfg(test)]
pub(crate) mod testutil;

pub use error::{Error, Result};

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Room identifier type.
pub type RoomId = Arc<str>;

/// User identifier type.
pub type UserId = Arc<str>;

/// Opaque content handle returned by the transport's media upload.
pub type ContentUri = Arc<str>;

/// A message event delivered by the transport.
///
/// Encrypted-event wrappers arrive with no `body`; they still count toward
/// monologue detection but can never match the manual trigger command. Edit
/// wrappers are marked by the transport and skipped entirely.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub event_id: String,
    pub room_id: RoomId,
    pub sender: UserId,
    pub body: Option<String>,
    pub is_edit: bool,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Current unix time in seconds.
///
/// All monologue and rate-limit state is kept as float seconds so the state
/// machines can be driven with explicit timestamps in tests.
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}
