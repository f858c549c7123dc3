//! Orchestrator wiring the transport to the tracker, rate limiter, and
//! source tree.

use crate::config::Config;
use crate::monologue::{MonologueConfig, MonologueTracker};
use crate::ratelimit::RateLimiter;
use crate::source::{DisruptionContext, FetchError, SharedSource};
use crate::transport::{InboundStream, TransportDyn};
use crate::{InboundEvent, RoomId, unix_now};
use futures::StreamExt as _;
use std::sync::Arc;

/// The manual trigger: an exact cat-face emoji body, with or without the
/// emoji-presentation variation selector. Not a substring match.
pub fn is_manual_trigger(body: &str) -> bool {
    matches!(body, "\u{1F408}" | "\u{1F408}\u{FE0F}")
}

/// The disruptor bot.
pub struct DisruptorBot {
    transport: Arc<dyn TransportDyn>,
    source: SharedSource,
    tracker: MonologueTracker,
    user_limits: RateLimiter,
    room_limits: RateLimiter,
    user_limit_message: String,
    room_limit_message: String,
}

impl DisruptorBot {
    pub fn new(config: &Config, transport: Arc<dyn TransportDyn>, source: SharedSource) -> Self {
        Self {
            transport,
            source,
            tracker: MonologueTracker::new(MonologueConfig {
                min_monologue_size: config.min_monologue_size,
                max_monologue_delay: config.max_monologue_delay,
                disrupt_cooldown: config.disrupt_cooldown,
            }),
            user_limits: RateLimiter::new(config.user_ratelimit.rate, config.user_ratelimit.per),
            room_limits: RateLimiter::new(config.room_ratelimit.rate, config.room_ratelimit.per),
            user_limit_message: config.user_ratelimit.message.clone(),
            room_limit_message: config.room_ratelimit.message.clone(),
        }
    }

    /// Consume the inbound stream until it ends.
    pub async fn run(&self, mut stream: InboundStream) {
        while let Some(event) = stream.next().await {
            self.handle_event(event).await;
        }
        tracing::info!("inbound stream ended");
    }

    pub(crate) async fn handle_event(&self, event: InboundEvent) {
        if event.is_edit {
            return;
        }
        if let Some(body) = &event.body {
            if is_manual_trigger(body) {
                self.manual_disrupt(&event).await;
            }
        }
        self.track_monologue(&event).await;
    }

    /// Passive path: update the streak and fire when the room qualifies.
    async fn track_monologue(&self, event: &InboundEvent) {
        let room = self.tracker.room(&event.room_id).await;
        room.note_message(&event.sender, self.tracker.config(), unix_now())
            .await;

        // Serialize the decision so concurrent messages in the same room
        // cannot both observe a qualifying streak.
        let _guard = room.trigger_guard().await;
        if room.should_disrupt(self.tracker.config(), unix_now()).await {
            tracing::debug!(
                room_id = %event.room_id,
                state = %room.describe().await,
                "disrupting monologue"
            );
            let ctx = DisruptionContext {
                room_id: event.room_id.clone(),
                user_id: event.sender.clone(),
            };
            self.disrupt(&event.room_id, Some(ctx)).await;
            room.mark_disrupted(unix_now()).await;
        }
    }

    /// Manual path: user bucket first, then the room bucket. A room-level
    /// rejection refunds the user's token so the attempt costs nothing.
    async fn manual_disrupt(&self, event: &InboundEvent) {
        let now = unix_now();
        if !self.user_limits.request(&event.sender, now).await {
            self.send_reply(event, &self.user_limit_message).await;
            return;
        }
        if self.room_limits.request(&event.room_id, now).await {
            self.disrupt(&event.room_id, None).await;
        } else {
            self.send_reply(event, &self.room_limit_message).await;
            self.user_limits.refund(&event.sender).await;
        }
    }

    /// Fetch one image and post it. Cancellation is silent; unexpected
    /// errors are logged and swallowed so the bot keeps running.
    async fn disrupt(&self, room_id: &RoomId, ctx: Option<DisruptionContext>) {
        match self.source.fetch_with_context(ctx).await {
            Ok(image) => {
                if let Err(error) = self.transport.send_image(room_id, &image).await {
                    tracing::error!(%room_id, %error, "failed to send disruption image");
                }
            }
            Err(FetchError::Cancel) => {
                tracing::debug!(%room_id, "disruption cancelled by source");
            }
            Err(FetchError::Other(error)) => {
                tracing::error!(%room_id, %error, "failed to fetch image for disruption");
            }
        }
    }

    async fn send_reply(&self, event: &InboundEvent, text: &str) {
        if let Err(error) = self.transport.reply(event, text).await {
            tracing::error!(room_id = %event.room_id, %error, "failed to send reply");
        }
    }
}
