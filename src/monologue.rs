//! Per-room monologue detection.
//!
//! Each room carries a small state machine: Idle (no tracked sender) or
//! Active (one sender with a streak). The tracker map is created lazily and
//! lives for the whole process. The streak update itself is cheap and
//! lock-free beyond the entry mutex; only the disrupt decision runs under a
//! dedicated per-room lock so two near-simultaneous messages cannot both
//! cross the threshold and double-fire.

use crate::{RoomId, UserId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Tuning knobs for monologue detection.
#[derive(Debug, Clone, Copy)]
pub struct MonologueConfig {
    /// Streak length required before a disruption fires.
    pub min_monologue_size: u32,
    /// Gap (seconds) after which the current monologue is considered over.
    pub max_monologue_delay: f64,
    /// Minimum seconds between disruptions in one room.
    pub disrupt_cooldown: f64,
}

/// Per-room streak state.
///
/// Invariant: `user_id` is set iff `streak >= 1`; Idle is exactly
/// `user_id == None, streak == 0`.
#[derive(Debug)]
pub struct MonologueInfo {
    user_id: Option<UserId>,
    streak: u32,
    last_message: f64,
    prev_disrupt: f64,
}

impl MonologueInfo {
    fn new() -> Self {
        Self {
            user_id: None,
            streak: 0,
            last_message: 0.0,
            prev_disrupt: 0.0,
        }
    }

    /// Record a message: extend the streak for the tracked sender, or
    /// rebind to a new sender with a fresh streak.
    pub fn message(&mut self, user_id: &UserId, now: f64) {
        if self.user_id.as_ref() == Some(user_id) {
            self.streak += 1;
        } else {
            self.user_id = Some(user_id.clone());
            self.streak = 1;
        }
        self.last_message = now;
    }

    /// Back to Idle, keeping the disruption cooldown timestamp.
    pub fn reset(&mut self) {
        self.user_id = None;
        self.streak = 0;
    }

    /// True once the gap since the last message exceeds the configured
    /// delay. A room that has never seen a message is not outdated.
    pub fn is_outdated(&self, max_delay: f64, now: f64) -> bool {
        self.last_message != 0.0 && self.last_message + max_delay < now
    }

    /// The trigger condition: long enough streak, cooldown satisfied.
    pub fn should_disrupt(&self, config: &MonologueConfig, now: f64) -> bool {
        self.streak >= config.min_monologue_size
            && now - self.prev_disrupt >= config.disrupt_cooldown
    }

    /// Reset after a fired disruption and start the cooldown.
    pub fn mark_disrupted(&mut self, now: f64) {
        self.reset();
        self.prev_disrupt = now;
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }

    pub fn user_id(&self) -> Option<&UserId> {
        self.user_id.as_ref()
    }
}

impl std::fmt::Display for MonologueInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "MonologueInfo(user_id={:?}, streak={}, last_message={}, prev_disrupt={})",
            self.user_id, self.streak, self.last_message, self.prev_disrupt
        )
    }
}

/// One room's shared state: the streak info plus the trigger lock.
pub struct RoomMonologue {
    info: Mutex<MonologueInfo>,
    /// Serializes the should-disrupt evaluation through the post-disrupt
    /// reset. Held across the fetch and send.
    trigger_lock: Mutex<()>,
}

impl RoomMonologue {
    fn new() -> Self {
        Self {
            info: Mutex::new(MonologueInfo::new()),
            trigger_lock: Mutex::new(()),
        }
    }

    /// Apply one inbound message to the streak state.
    pub async fn note_message(&self, sender: &UserId, config: &MonologueConfig, now: f64) {
        let mut info = self.info.lock().await;
        if info.is_outdated(config.max_monologue_delay, now) {
            info.reset();
        }
        info.message(sender, now);
    }

    /// Take the per-room trigger lock.
    pub async fn trigger_guard(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.trigger_lock.lock().await
    }

    pub async fn should_disrupt(&self, config: &MonologueConfig, now: f64) -> bool {
        self.info.lock().await.should_disrupt(config, now)
    }

    pub async fn mark_disrupted(&self, now: f64) {
        self.info.lock().await.mark_disrupted(now);
    }

    pub async fn describe(&self) -> String {
        self.info.lock().await.to_string()
    }

    #[cfg(test)]
    pub async fn streak(&self) -> u32 {
        self.info.lock().await.streak()
    }
}

/// Lazily-populated map of room id to monologue state.
///
/// Entries are never removed; the map lives for the process lifetime.
pub struct MonologueTracker {
    rooms: Mutex<HashMap<RoomId, Arc<RoomMonologue>>>,
    config: MonologueConfig,
}

impl MonologueTracker {
    pub fn new(config: MonologueConfig) -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &MonologueConfig {
        &self.config
    }

    /// Get or create the state for a room.
    pub async fn room(&self, room_id: &RoomId) -> Arc<RoomMonologue> {
        self.rooms
            .lock()
            .await
            .entry(room_id.clone())
            .or_insert_with(|| Arc::new(RoomMonologue::new()))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: MonologueConfig = MonologueConfig {
        min_monologue_size: 3,
        max_monologue_delay: 60.0,
        disrupt_cooldown: 60.0,
    };

    fn user(name: &str) -> UserId {
        Arc::from(name)
    }

    #[test]
    fn streak_counts_same_sender_messages() {
        let mut info = MonologueInfo::new();
        let alice = user("@alice:x");
        for i in 1..=5 {
            info.message(&alice, i as f64);
            assert_eq!(info.streak(), i);
        }
        assert_eq!(info.user_id(), Some(&alice));
    }

    #[test]
    fn different_sender_rebinds_and_resets_streak() {
        let mut info = MonologueInfo::new();
        let alice = user("@alice:x");
        let bob = user("@bob:x");

        info.message(&alice, 0.0);
        info.message(&alice, 1.0);
        assert_eq!(info.streak(), 2);

        info.message(&bob, 2.0);
        assert_eq!(info.streak(), 1);
        assert_eq!(info.user_id(), Some(&bob));
    }

    #[test]
    fn gap_beyond_delay_is_outdated() {
        let mut info = MonologueInfo::new();
        assert!(!info.is_outdated(60.0, 1000.0));

        info.message(&user("@alice:x"), 100.0);
        assert!(!info.is_outdated(60.0, 160.0));
        assert!(info.is_outdated(60.0, 160.1));
    }

    #[test]
    fn idle_invariant_holds_through_transitions() {
        let mut info = MonologueInfo::new();
        assert!(info.user_id().is_none());
        assert_eq!(info.streak(), 0);

        info.message(&user("@alice:x"), 0.0);
        assert!(info.user_id().is_some() && info.streak() >= 1);

        info.reset();
        assert!(info.user_id().is_none());
        assert_eq!(info.streak(), 0);
    }

    #[test]
    fn third_message_triggers_and_fourth_rebuilds() {
        let mut info = MonologueInfo::new();
        let alice = user("@alice:x");

        info.message(&alice, 1000.0);
        assert!(!info.should_disrupt(&CONFIG, 1000.0));
        info.message(&alice, 1001.0);
        assert!(!info.should_disrupt(&CONFIG, 1001.0));
        info.message(&alice, 1002.0);
        // prev_disrupt starts at zero, so the cooldown is satisfied.
        assert!(info.should_disrupt(&CONFIG, 1002.0));

        info.mark_disrupted(1002.0);
        info.message(&alice, 1003.0);
        assert_eq!(info.streak(), 1);
        assert!(!info.should_disrupt(&CONFIG, 1003.0));
    }

    #[test]
    fn cooldown_blocks_back_to_back_disruptions() {
        let mut info = MonologueInfo::new();
        let alice = user("@alice:x");

        for t in 1000..1003 {
            info.message(&alice, t as f64);
        }
        assert!(info.should_disrupt(&CONFIG, 1002.0));
        info.mark_disrupted(1002.0);

        for t in 1003..1006 {
            info.message(&alice, t as f64);
        }
        assert!(!info.should_disrupt(&CONFIG, 1005.0));
        assert!(info.should_disrupt(&CONFIG, 1062.0));
    }

    #[tokio::test]
    async fn outdated_room_resets_before_counting() {
        let room = RoomMonologue::new();
        let alice = user("@alice:x");

        room.note_message(&alice, &CONFIG, 0.0).await;
        room.note_message(&alice, &CONFIG, 1.0).await;
        assert_eq!(room.streak().await, 2);

        // Gap longer than max_monologue_delay forces Idle first.
        room.note_message(&alice, &CONFIG, 100.0).await;
        assert_eq!(room.streak().await, 1);
    }

    #[tokio::test]
    async fn tracker_reuses_room_entries() {
        let tracker = MonologueTracker::new(CONFIG);
        let room_id: RoomId = Arc::from("!a:x");

        let first = tracker.room(&room_id).await;
        first.note_message(&user("@alice:x"), &CONFIG, 0.0).await;
        let second = tracker.room(&room_id).await;
        assert_eq!(second.streak().await, 1);
    }
}
