//! Game tuning constants and server configuration.

// -----------------------------------------------------------------------------
// Session timing
// -----------------------------------------------------------------------------

/// Countdown length of a fresh session, in whole seconds.
pub const INITIAL_TIME_SECONDS: u32 = 30;

/// Time lost on every wrong tile (applied by moving the time origin back).
pub const WRONG_PENALTY_MS: i64 = 3_000;

/// A combo survives this long without another correct click.
pub const COMBO_WINDOW_MS: i64 = 3_000;

/// Pause between a correct click and the next grid (feedback time).
pub const NEXT_LEVEL_DELAY_MS: i64 = 600;

/// How long a wrong tile stays marked.
pub const WRONG_MARK_CLEAR_MS: i64 = 400;

/// Countdown polling interval.
pub const COUNTDOWN_POLL_MS: i64 = 100;

/// Length of the reward countdown that refills the daily play allowance.
pub const REWARD_COUNTDOWN_SECONDS: u32 = 30;

/// A level-up cue is emitted every time a multiple of this level is cleared.
pub const LEVEL_UP_CUE_EVERY: u32 = 5;

// -----------------------------------------------------------------------------
// Play limits & rankings
// -----------------------------------------------------------------------------

pub const DAILY_LIMIT: u32 = 10;

/// Entries kept by the offline leaderboard.
pub const LOCAL_LEADERBOARD_CAP: usize = 100;

/// Entries returned by the server for a day.
pub const TOP_LIMIT: u32 = 100;

/// Server keeps this many calendar days of records.
pub const RETENTION_DAYS: i64 = 3;

pub const PURGE_INTERVAL_SECS: u64 = 60 * 60;

/// Fixed offset used for every calendar-day computation (UTC+9).
pub const KST_OFFSET_SECS: i32 = 9 * 3600;

/// Window in which a ranking entry counts as "the one just played".
pub const FRESH_ENTRY_WINDOW_MS: i64 = 30_000;

pub const NAME_MAX_CHARS: usize = 10;
pub const SCORE_MAX: u32 = 100_000;
pub const LEVEL_MAX: u32 = 1_000;

// -----------------------------------------------------------------------------
// Storage keys (browser localStorage namespace)
// -----------------------------------------------------------------------------

pub const RANKINGS_KEY: &str = "hueHuntRankings_v2";
pub const GAMES_PLAYED_KEY: &str = "hueHuntGamesPlayed";
pub const GAME_DATE_KEY: &str = "hueHuntGameDate";
pub const SOUND_ENABLED_KEY: &str = "hueHuntSoundEnabled";

// -----------------------------------------------------------------------------
// Server
// -----------------------------------------------------------------------------

pub const DEFAULT_PORT: u16 = 3000;

/// Process configuration for the leaderboard server, read from the environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    pub database_path: String,
    pub environment: String,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup (tests pass a closure over a map).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let environment = lookup("APP_ENV")
            .or_else(|| lookup("NODE_ENV"))
            .unwrap_or_else(|| "development".to_string());
        let port = lookup("PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);
        let database_path = lookup("DATABASE_PATH").unwrap_or_else(|| {
            if environment == "production" {
                "/tmp/rankings.db".to_string()
            } else {
                "rankings.db".to_string()
            }
        });
        Self {
            port,
            database_path,
            environment,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let cfg = ServerConfig::from_lookup(lookup_from(&[]));
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert_eq!(cfg.database_path, "rankings.db");
        assert_eq!(cfg.environment, "development");
    }

    #[test]
    fn production_uses_tmp_database() {
        let cfg = ServerConfig::from_lookup(lookup_from(&[
            ("NODE_ENV", "production"),
            ("PORT", "8088"),
        ]));
        assert_eq!(cfg.port, 8088);
        assert_eq!(cfg.database_path, "/tmp/rankings.db");
    }

    #[test]
    fn explicit_database_path_wins_and_bad_port_falls_back() {
        let cfg = ServerConfig::from_lookup(lookup_from(&[
            ("APP_ENV", "production"),
            ("DATABASE_PATH", "/var/lib/hue/r.db"),
            ("PORT", "not-a-port"),
        ]));
        assert_eq!(cfg.database_path, "/var/lib/hue/r.db");
        assert_eq!(cfg.port, DEFAULT_PORT);
    }
}
