//! Wall-clock access and the fixed-offset calendar day.
//!
//! Both the browser client and the leaderboard server decide "which day is it"
//! through [`calendar_day`], so a record submitted online and one kept offline
//! always land on the same day for the same instant.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};

use crate::config::KST_OFFSET_SECS;

const MS_PER_DAY: i64 = 86_400_000;

/// Source of the current instant in epoch milliseconds.
pub trait Clock {
    fn now_ms(&self) -> i64;
}

/// Real time: `Date.now()` in the browser, `SystemTime` natively.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[cfg(target_arch = "wasm32")]
    fn now_ms(&self) -> i64 {
        js_sys::Date::now() as i64
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn now_ms(&self) -> i64 {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}

/// Hand-driven clock. Clones share the same instant.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(start_ms)),
        }
    }

    pub fn set(&self, ms: i64) {
        self.now.store(ms, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: i64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now_ms(&self) -> i64 {
        (**self).now_ms()
    }
}

/// `YYYY-MM-DD` of the given instant in UTC+9.
pub fn calendar_day(epoch_ms: i64) -> String {
    let shifted = epoch_ms.saturating_add(i64::from(KST_OFFSET_SECS) * 1000);
    DateTime::<Utc>::from_timestamp_millis(shifted)
        .unwrap_or_default()
        .format("%Y-%m-%d")
        .to_string()
}

/// Calendar day `days` whole days before the given instant.
pub fn calendar_day_before(epoch_ms: i64, days: i64) -> String {
    calendar_day(epoch_ms.saturating_sub(days.saturating_mul(MS_PER_DAY)))
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2024-03-10T14:59:59.999Z == 2024-03-10T23:59:59.999+09:00
    const BEFORE_KST_MIDNIGHT: i64 = 1_710_082_799_999;

    #[test]
    fn day_rolls_over_at_kst_midnight() {
        assert_eq!(calendar_day(BEFORE_KST_MIDNIGHT), "2024-03-10");
        assert_eq!(calendar_day(BEFORE_KST_MIDNIGHT + 1), "2024-03-11");
    }

    #[test]
    fn utc_evening_is_already_next_day() {
        // 2024-12-31T20:00:00Z
        assert_eq!(calendar_day(1_735_675_200_000), "2025-01-01");
    }

    #[test]
    fn day_before_counts_whole_days() {
        assert_eq!(calendar_day_before(BEFORE_KST_MIDNIGHT, 3), "2024-03-07");
        assert_eq!(calendar_day_before(BEFORE_KST_MIDNIGHT + 1, 3), "2024-03-08");
    }

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new(1_000);
        let other = clock.clone();
        clock.advance(250);
        assert_eq!(other.now_ms(), 1_250);
        other.set(5);
        assert_eq!(clock.now_ms(), 5);
    }
}
