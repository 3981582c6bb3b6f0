//! Daily play allowance.
//!
//! The counter is keyed by the UTC+9 calendar day stored next to it. Every read
//! compares that day with today and zeroes the counter when they differ, so the
//! rollover needs no scheduled job.

use crate::clock::{Clock, calendar_day};
use crate::config::{DAILY_LIMIT, GAME_DATE_KEY, GAMES_PLAYED_KEY, REWARD_COUNTDOWN_SECONDS};
use crate::storage::KeyValueStore;

pub struct PlayLimiter<S, C> {
    store: S,
    clock: C,
    daily_limit: u32,
}

impl<S: KeyValueStore, C: Clock> PlayLimiter<S, C> {
    pub fn new(store: S, clock: C) -> Self {
        Self::with_limit(store, clock, DAILY_LIMIT)
    }

    pub fn with_limit(store: S, clock: C, daily_limit: u32) -> Self {
        Self {
            store,
            clock,
            daily_limit,
        }
    }

    pub fn daily_limit(&self) -> u32 {
        self.daily_limit
    }

    pub fn today(&self) -> String {
        calendar_day(self.clock.now_ms())
    }

    fn roll_over(&self) {
        let today = self.today();
        let stored = self.store.get(GAME_DATE_KEY).ok().flatten();
        if stored.as_deref() != Some(today.as_str()) {
            tracing::debug!("[LIMIT] new day {today} (was {stored:?}), resetting count");
            self.write(GAMES_PLAYED_KEY, "0");
            self.write(GAME_DATE_KEY, &today);
        }
    }

    fn write(&self, key: &str, value: &str) {
        if let Err(e) = self.store.set(key, value) {
            tracing::warn!("[LIMIT] failed to persist {key}: {e}");
        }
    }

    /// Sessions started today. Unreadable storage counts as zero.
    pub fn played_today(&self) -> u32 {
        self.roll_over();
        self.store
            .get(GAMES_PLAYED_KEY)
            .ok()
            .flatten()
            .and_then(|raw| raw.trim().parse().ok())
            .unwrap_or(0)
    }

    pub fn remaining_games(&self) -> u32 {
        self.daily_limit.saturating_sub(self.played_today())
    }

    pub fn can_play(&self) -> bool {
        self.remaining_games() > 0
    }

    /// Count one session. Returns `false`, without counting, once the limit is hit.
    pub fn record_played(&self) -> bool {
        if !self.can_play() {
            return false;
        }
        let played = self.played_today() + 1;
        self.write(GAMES_PLAYED_KEY, &played.to_string());
        true
    }

    /// Refill today's allowance after a redeemed reward.
    pub fn grant_bonus(&self) {
        self.write(GAMES_PLAYED_KEY, "0");
    }
}

/// Countdown the player sits through before a reward refills the allowance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RewardCountdown {
    started_ms: i64,
    duration_ms: i64,
}

impl RewardCountdown {
    pub fn start(now_ms: i64) -> Self {
        Self {
            started_ms: now_ms,
            duration_ms: i64::from(REWARD_COUNTDOWN_SECONDS) * 1000,
        }
    }

    pub fn due_ms(&self) -> i64 {
        self.started_ms + self.duration_ms
    }

    pub fn seconds_left(&self, now_ms: i64) -> u32 {
        let left_ms = (self.due_ms() - now_ms).max(0);
        // Round up: "1" is shown until the very end.
        ((left_ms + 999) / 1000) as u32
    }

    pub fn is_complete(&self, now_ms: i64) -> bool {
        now_ms >= self.due_ms()
    }
}
