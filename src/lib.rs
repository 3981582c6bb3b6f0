//! Hue Hunt core crate.
//!
//! Find the one tile whose color is slightly off before the 30 second clock
//! runs out. Wrong picks cost three seconds, quick streaks earn combo bonuses,
//! and every finished game is ranked on a leaderboard that resets each day
//! (UTC+9).
//!
//! The game logic ([`session`], [`palette`], [`limits`], [`ranking`]) is plain
//! Rust with no browser dependency. `web` binds it to the page when compiled
//! for wasm32; `server` is the leaderboard backend for native builds.

use wasm_bindgen::prelude::*;

pub mod api;
pub mod clock;
pub mod config;
pub mod limits;
pub mod palette;
pub mod ranking;
pub mod record;
pub mod session;
pub mod storage;

#[cfg(target_arch = "wasm32")]
pub mod web;

#[cfg(not(target_arch = "wasm32"))]
pub mod server;

pub use clock::{Clock, ManualClock, SystemClock, calendar_day};
pub use limits::PlayLimiter;
pub use palette::{Hsl, LevelLayout};
pub use ranking::{
    ConnectionStatus, LocalLeaderboard, RankingClient, RemoteError, RemoteLeaderboard,
};
pub use record::{DeviceCategory, RankingRecord, Submission, ValidationError};
pub use session::{ClickOutcome, Cue, GameController, GameEvent, Phase, Settlement, StartError};
pub use storage::{KeyValueStore, MemoryStore, StorageError};

// Optional small allocator for size (feature gated)
#[cfg(feature = "wee_alloc")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

#[wasm_bindgen(start)]
pub fn wasm_start() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
    #[cfg(target_arch = "wasm32")]
    install_console_logging();
}

/// Send `tracing` output to the browser console. Safe to call more than once.
#[cfg(target_arch = "wasm32")]
pub fn install_console_logging() {
    let _ = tracing_wasm::try_set_as_global_default();
}
