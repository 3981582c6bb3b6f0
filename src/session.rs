//! Game session controller.
//!
//! A single-threaded state machine (`Idle -> Active -> Ended`) that owns the
//! running game. It never touches a display or a timer API: time comes from a
//! [`Clock`], deferred work sits in an internal task list that the host drives
//! with [`GameController::advance`], and everything the player should see or
//! hear is queued as [`GameEvent`]s for the host to drain.
//!
//! Every session-bound task carries the id of the session that scheduled it,
//! so ending a session cancels all of them at once and nothing scheduled by an
//! old session can touch a newer one.


use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use thiserror::Error;

use crate::clock::Clock;
use crate::config::{
    COMBO_WINDOW_MS, COUNTDOWN_POLL_MS, INITIAL_TIME_SECONDS, LEVEL_UP_CUE_EVERY,
    NEXT_LEVEL_DELAY_MS, WRONG_MARK_CLEAR_MS, WRONG_PENALTY_MS,
};
use crate::limits::{PlayLimiter, RewardCountdown};
use crate::palette::LevelLayout;
use crate::record::{ValidationError, validate_name};
use crate::storage::KeyValueStore;

pub type SessionId = u64;
type TaskId = u64;

const REWARD_TICK_MS: i64 = 1000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Phase {
    Idle,
    Active,
    Ended,
}

/// Points where the player gets audio feedback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Cue {
    Start,
    Correct,
    Combo(u32),
    Wrong,
    LevelUp,
    GameOver,
}

/// Final result handed to the ranking client when a session ends.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Settlement {
    pub session: SessionId,
    pub name: String,
    pub score: u32,
    pub level: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum GameEvent {
    Started { session: SessionId, remaining_games: u32 },
    LevelReady(LevelLayout),
    TileMarked { index: usize, correct: bool },
    TileMarkCleared { index: usize },
    ScoreChanged { score: u32, gained: u32 },
    LevelChanged { level: u32 },
    ComboChanged { combo: u32 },
    TimeLeft { seconds: u32 },
    LimitReached,
    Ended(Settlement),
    RankResolved { session: SessionId, rank: u32 },
    RewardTick { seconds_left: u32 },
    RewardGranted,
    Cue(Cue),
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum StartError {
    /// Today's allowance is used up; offer the reward path.
    #[error("daily play limit reached")]
    LimitReached,
    #[error("a player name is required")]
    MissingName,
    #[error("a session is already running")]
    AlreadyActive,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClickOutcome {
    Correct { gained: u32 },
    Wrong { time_left: u32 },
    /// No session, stale grid, or an index outside the grid.
    Ignored,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TaskKind {
    CountdownPoll,
    ComboDecay,
    NextLevel,
    ClearWrongMark(usize),
    RewardTick,
}

#[derive(Clone, Copy, Debug)]
struct ScheduledTask {
    id: TaskId,
    due_ms: i64,
    kind: TaskKind,
    /// `None` for tasks that outlive sessions (the reward countdown).
    session: Option<SessionId>,
}

#[derive(Debug, Default)]
struct Scheduler {
    next_id: TaskId,
    tasks: Vec<ScheduledTask>,
}

impl Scheduler {
    fn schedule(&mut self, due_ms: i64, kind: TaskKind, session: Option<SessionId>) -> TaskId {
        self.next_id += 1;
        let id = self.next_id;
        self.tasks.push(ScheduledTask {
            id,
            due_ms,
            kind,
            session,
        });
        id
    }

    fn cancel(&mut self, id: TaskId) {
        self.tasks.retain(|t| t.id != id);
    }

    fn cancel_session(&mut self, session: SessionId) {
        self.tasks.retain(|t| t.session != Some(session));
    }

    fn cancel_kind(&mut self, kind: TaskKind) {
        self.tasks.retain(|t| t.kind != kind);
    }

    /// Earliest task due at or before `now`; ties go to the first scheduled.
    fn pop_due(&mut self, now: i64) -> Option<ScheduledTask> {
        let pos = self
            .tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.due_ms <= now)
            .min_by_key(|(_, t)| (t.due_ms, t.id))
            .map(|(i, _)| i)?;
        Some(self.tasks.remove(pos))
    }

    fn next_due(&self) -> Option<i64> {
        self.tasks.iter().map(|t| t.due_ms).min()
    }
}

#[derive(Clone, Debug)]
struct GameSession {
    id: SessionId,
    score: u32,
    level: u32,
    combo: u32,
    /// Countdown origin. Wrong answers move it back instead of touching the
    /// remaining time directly.
    origin_ms: i64,
    initial_seconds: u32,
    last_time_left: u32,
    layout: Option<LevelLayout>,
    /// `None` between a correct click and the next grid.
    correct_tile: Option<usize>,
    combo_task: Option<TaskId>,
}

impl GameSession {
    fn time_left(&self, now_ms: i64) -> u32 {
        let elapsed = (now_ms - self.origin_ms).max(0) / 1000;
        (i64::from(self.initial_seconds) - elapsed).max(0) as u32
    }
}

pub struct GameController<S, C> {
    limits: PlayLimiter<S, C>,
    clock: C,
    rng: StdRng,
    phase: Phase,
    player_name: Option<String>,
    session: Option<GameSession>,
    sessions_started: SessionId,
    scheduler: Scheduler,
    reward: Option<RewardCountdown>,
    last_rank: Option<u32>,
    events: Vec<GameEvent>,
}

impl<S: KeyValueStore, C: Clock + Clone> GameController<S, C> {
    pub fn new(store: S, clock: C) -> Self {
        Self::with_rng(store, clock, StdRng::from_entropy())
    }

    /// Deterministic boards for replays and tests.
    pub fn with_seed(store: S, clock: C, seed: u64) -> Self {
        Self::with_rng(store, clock, StdRng::seed_from_u64(seed))
    }

    fn with_rng(store: S, clock: C, rng: StdRng) -> Self {
        Self {
            limits: PlayLimiter::new(store, clock.clone()),
            clock,
            rng,
            phase: Phase::Idle,
            player_name: None,
            session: None,
            sessions_started: 0,
            scheduler: Scheduler::default(),
            reward: None,
            last_rank: None,
            events: Vec::new(),
        }
    }

    pub fn limits(&self) -> &PlayLimiter<S, C> {
        &self.limits
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn player_name(&self) -> Option<&str> {
        self.player_name.as_deref()
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(|s| s.id)
    }

    pub fn score(&self) -> u32 {
        self.session.as_ref().map_or(0, |s| s.score)
    }

    pub fn level(&self) -> u32 {
        self.session.as_ref().map_or(1, |s| s.level)
    }

    pub fn combo(&self) -> u32 {
        self.session.as_ref().map_or(0, |s| s.combo)
    }

    pub fn layout(&self) -> Option<&LevelLayout> {
        self.session.as_ref().and_then(|s| s.layout.as_ref())
    }

    /// Index of the odd tile while the current grid accepts clicks.
    pub fn correct_tile(&self) -> Option<usize> {
        self.session.as_ref().and_then(|s| s.correct_tile)
    }

    pub fn time_left(&self) -> u32 {
        match (&self.session, self.phase) {
            (Some(s), Phase::Active) => s.time_left(self.clock.now_ms()),
            (Some(s), _) => s.last_time_left,
            (None, _) => INITIAL_TIME_SECONDS,
        }
    }

    pub fn last_rank(&self) -> Option<u32> {
        self.last_rank
    }

    pub fn remaining_games(&self) -> u32 {
        self.limits.remaining_games()
    }

    pub fn reward_seconds_left(&self) -> Option<u32> {
        self.reward
            .map(|r| r.seconds_left(self.clock.now_ms()))
    }

    pub fn pending_tasks(&self) -> usize {
        self.scheduler.tasks.len()
    }

    /// When the host should next call [`advance`](Self::advance).
    pub fn next_due_ms(&self) -> Option<i64> {
        self.scheduler.next_due()
    }

    pub fn drain_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    fn emit(&mut self, event: GameEvent) {
        self.events.push(event);
    }

    pub fn set_player_name(&mut self, name: &str) -> Result<(), ValidationError> {
        let name = name.trim();
        validate_name(name)?;
        self.player_name = Some(name.to_string());
        Ok(())
    }

    pub fn start(&mut self) -> Result<SessionId, StartError> {
        if self.phase == Phase::Active {
            return Err(StartError::AlreadyActive);
        }
        if self.player_name.is_none() {
            return Err(StartError::MissingName);
        }
        if !self.limits.record_played() {
            tracing::info!("[SESSION] daily limit reached");
            self.emit(GameEvent::LimitReached);
            return Err(StartError::LimitReached);
        }

        let now = self.clock.now_ms();
        self.sessions_started += 1;
        let id = self.sessions_started;
        self.session = Some(GameSession {
            id,
            score: 0,
            level: 1,
            combo: 0,
            origin_ms: now,
            initial_seconds: INITIAL_TIME_SECONDS,
            last_time_left: INITIAL_TIME_SECONDS,
            layout: None,
            correct_tile: None,
            combo_task: None,
        });
        self.phase = Phase::Active;
        self.last_rank = None;
        tracing::debug!("[SESSION] session {id} started");

        let remaining_games = self.limits.remaining_games();
        self.emit(GameEvent::Started {
            session: id,
            remaining_games,
        });
        self.emit(GameEvent::ScoreChanged { score: 0, gained: 0 });
        self.emit(GameEvent::LevelChanged { level: 1 });
        self.emit(GameEvent::ComboChanged { combo: 0 });
        self.emit(GameEvent::TimeLeft {
            seconds: INITIAL_TIME_SECONDS,
        });
        self.emit(GameEvent::Cue(Cue::Start));
        self.generate_level();
        self.scheduler
            .schedule(now + COUNTDOWN_POLL_MS, TaskKind::CountdownPoll, Some(id));
        Ok(id)
    }

    /// End the running session (if any) and start a fresh one.
    pub fn restart(&mut self) -> (Option<Settlement>, Result<SessionId, StartError>) {
        let settlement = self.end();
        (settlement, self.start())
    }

    /// Back to `Idle` after the result screen.
    pub fn dismiss(&mut self) {
        if self.phase == Phase::Ended {
            self.phase = Phase::Idle;
        }
    }

    fn generate_level(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let layout = LevelLayout::generate(session.level, &mut self.rng);
        session.correct_tile = Some(layout.odd_index);
        session.layout = Some(layout.clone());
        self.events.push(GameEvent::LevelReady(layout));
    }

    pub fn click_tile(&mut self, index: usize) -> ClickOutcome {
        if self.phase != Phase::Active {
            return ClickOutcome::Ignored;
        }
        let now = self.clock.now_ms();
        if self.poll_countdown(now) == 0 {
            return ClickOutcome::Ignored;
        }
        let Some(session) = self.session.as_ref() else {
            return ClickOutcome::Ignored;
        };
        let (Some(correct), Some(layout)) = (session.correct_tile, session.layout.as_ref()) else {
            return ClickOutcome::Ignored;
        };
        if index >= layout.tile_count() {
            return ClickOutcome::Ignored;
        }

        if index == correct {
            self.resolve_correct(now, index)
        } else {
            self.resolve_wrong(now, index)
        }
    }

    fn resolve_correct(&mut self, now: i64, index: usize) -> ClickOutcome {
        let Some(session) = self.session.as_mut() else {
            return ClickOutcome::Ignored;
        };
        let id = session.id;
        session.correct_tile = None;
        session.combo += 1;
        let base = session.level * 10;
        let bonus = if session.combo >= 2 {
            base * (session.combo - 1) / 2
        } else {
            0
        };
        let gained = base + bonus;
        session.score += gained;
        let cleared = session.level;
        session.level += 1;
        let (score, level, combo) = (session.score, session.level, session.combo);
        if let Some(task) = session.combo_task.take() {
            self.scheduler.cancel(task);
        }
        session.combo_task = Some(self.scheduler.schedule(
            now + COMBO_WINDOW_MS,
            TaskKind::ComboDecay,
            Some(id),
        ));
        self.scheduler
            .schedule(now + NEXT_LEVEL_DELAY_MS, TaskKind::NextLevel, Some(id));

        self.emit(GameEvent::TileMarked {
            index,
            correct: true,
        });
        self.emit(GameEvent::ScoreChanged { score, gained });
        self.emit(GameEvent::ComboChanged { combo });
        self.emit(GameEvent::LevelChanged { level });
        self.emit(GameEvent::Cue(Cue::Correct));
        if combo >= 2 {
            self.emit(GameEvent::Cue(Cue::Combo(combo)));
        }
        if cleared % LEVEL_UP_CUE_EVERY == 0 {
            self.emit(GameEvent::Cue(Cue::LevelUp));
        }
        ClickOutcome::Correct { gained }
    }

    fn resolve_wrong(&mut self, now: i64, index: usize) -> ClickOutcome {
        let Some(session) = self.session.as_mut() else {
            return ClickOutcome::Ignored;
        };
        let id = session.id;
        session.origin_ms -= WRONG_PENALTY_MS;
        session.combo = 0;
        if let Some(task) = session.combo_task.take() {
            self.scheduler.cancel(task);
        }
        self.scheduler.schedule(
            now + WRONG_MARK_CLEAR_MS,
            TaskKind::ClearWrongMark(index),
            Some(id),
        );
        self.emit(GameEvent::TileMarked {
            index,
            correct: false,
        });
        self.emit(GameEvent::ComboChanged { combo: 0 });
        self.emit(GameEvent::Cue(Cue::Wrong));

        let time_left = self.poll_countdown(now);
        ClickOutcome::Wrong { time_left }
    }

    /// Recompute the countdown from the origin. Ends the session at zero.
    fn poll_countdown(&mut self, now: i64) -> u32 {
        let Some(session) = self.session.as_mut() else {
            return 0;
        };
        let time_left = session.time_left(now);
        if time_left != session.last_time_left {
            session.last_time_left = time_left;
            self.events.push(GameEvent::TimeLeft { seconds: time_left });
        }
        if time_left == 0 {
            self.end();
        }
        time_left
    }

    /// Stop the session, cancel everything it scheduled, and return what
    /// should be submitted. `None` when nothing was running.
    pub fn end(&mut self) -> Option<Settlement> {
        if self.phase != Phase::Active {
            return None;
        }
        let session = self.session.as_mut()?;
        session.correct_tile = None;
        session.combo_task = None;
        let id = session.id;
        let settlement = Settlement {
            session: id,
            name: self.player_name.clone().unwrap_or_default(),
            score: session.score,
            level: session.level,
        };
        self.scheduler.cancel_session(id);
        self.phase = Phase::Ended;
        tracing::info!(
            "[SESSION] session {id} ended: score {} level {}",
            settlement.score,
            settlement.level
        );
        self.emit(GameEvent::Cue(Cue::GameOver));
        self.emit(GameEvent::Ended(settlement.clone()));
        Some(settlement)
    }

    /// Attach the rank returned for a settlement. Results for a session that
    /// has since been replaced are dropped.
    pub fn record_rank(&mut self, session: SessionId, rank: u32) -> bool {
        if self.phase == Phase::Active || self.session_id() != Some(session) {
            tracing::debug!("[SESSION] dropping rank {rank} for superseded session {session}");
            return false;
        }
        self.last_rank = Some(rank);
        self.emit(GameEvent::RankResolved { session, rank });
        true
    }

    /// Start the reward countdown. `false` if one is already running.
    pub fn begin_reward(&mut self) -> bool {
        if self.reward.is_some() {
            return false;
        }
        let now = self.clock.now_ms();
        let reward = RewardCountdown::start(now);
        self.reward = Some(reward);
        self.scheduler
            .schedule(now + REWARD_TICK_MS, TaskKind::RewardTick, None);
        self.emit(GameEvent::RewardTick {
            seconds_left: reward.seconds_left(now),
        });
        true
    }

    pub fn cancel_reward(&mut self) {
        self.scheduler.cancel_kind(TaskKind::RewardTick);
        self.reward = None;
    }

    /// Run every task due by now, in due order.
    pub fn advance(&mut self) {
        let now = self.clock.now_ms();
        while let Some(task) = self.scheduler.pop_due(now) {
            self.run_task(now, task);
        }
    }

    fn run_task(&mut self, now: i64, task: ScheduledTask) {
        if let Some(owner) = task.session {
            if self.phase != Phase::Active || self.session_id() != Some(owner) {
                return;
            }
        }
        match task.kind {
            TaskKind::CountdownPoll => {
                if self.poll_countdown(now) > 0 {
                    self.scheduler
                        .schedule(now + COUNTDOWN_POLL_MS, TaskKind::CountdownPoll, task.session);
                }
            }
            TaskKind::ComboDecay => {
                if let Some(session) = self.session.as_mut() {
                    session.combo = 0;
                    session.combo_task = None;
                }
                self.emit(GameEvent::ComboChanged { combo: 0 });
            }
            TaskKind::NextLevel => self.generate_level(),
            TaskKind::ClearWrongMark(index) => self.emit(GameEvent::TileMarkCleared { index }),
            TaskKind::RewardTick => self.reward_tick(now),
        }
    }

    fn reward_tick(&mut self, now: i64) {
        let Some(reward) = self.reward else {
            return;
        };
        if reward.is_complete(now) {
            self.reward = None;
            self.limits.grant_bonus();
            tracing::info!("[SESSION] reward granted, daily allowance refilled");
            self.emit(GameEvent::RewardTick { seconds_left: 0 });
            self.emit(GameEvent::RewardGranted);
        } else {
            self.emit(GameEvent::RewardTick {
                seconds_left: reward.seconds_left(now),
            });
            let next = (now + REWARD_TICK_MS).min(reward.due_ms());
            self.scheduler.schedule(next, TaskKind::RewardTick, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::MemoryStore;

    fn controller() -> (GameController<MemoryStore, ManualClock>, ManualClock) {
        let clock = ManualClock::new(1_710_039_600_000);
        let mut game = GameController::with_seed(MemoryStore::new(), clock.clone(), 42);
        game.set_player_name("tester").unwrap();
        (game, clock)
    }

    fn wrong_tile(game: &GameController<MemoryStore, ManualClock>) -> usize {
        let correct = game.correct_tile().unwrap();
        (correct + 1) % game.layout().unwrap().tile_count()
    }

    #[test]
    fn scheduler_pops_in_due_then_schedule_order() {
        let mut s = Scheduler::default();
        s.schedule(20, TaskKind::NextLevel, Some(1));
        s.schedule(10, TaskKind::ComboDecay, Some(1));
        s.schedule(10, TaskKind::CountdownPoll, Some(1));
        assert_eq!(s.pop_due(5).map(|t| t.kind), None);
        assert_eq!(s.pop_due(30).map(|t| t.kind), Some(TaskKind::ComboDecay));
        assert_eq!(s.pop_due(30).map(|t| t.kind), Some(TaskKind::CountdownPoll));
        assert_eq!(s.pop_due(30).map(|t| t.kind), Some(TaskKind::NextLevel));
    }

    #[test]
    fn name_is_required_and_trimmed() {
        let clock = ManualClock::new(0);
        let mut game = GameController::with_seed(MemoryStore::new(), clock, 1);
        assert_eq!(game.start(), Err(StartError::MissingName));
        assert!(game.set_player_name("   ").is_err());
        assert!(game.set_player_name("  seo  ").is_ok());
        assert_eq!(game.player_name(), Some("seo"));
        assert!(game.start().is_ok());
        assert_eq!(game.start(), Err(StartError::AlreadyActive));
    }

    #[test]
    fn repeated_click_on_cleared_grid_is_ignored() {
        let (mut game, _) = controller();
        game.start().unwrap();
        let odd = game.correct_tile().unwrap();
        assert_eq!(game.click_tile(odd), ClickOutcome::Correct { gained: 10 });
        assert_eq!(game.click_tile(odd), ClickOutcome::Ignored);
        assert_eq!(game.score(), 10);
    }

    #[test]
    fn out_of_grid_click_is_ignored() {
        let (mut game, _) = controller();
        game.start().unwrap();
        assert_eq!(game.click_tile(999), ClickOutcome::Ignored);
        assert_eq!(game.time_left(), INITIAL_TIME_SECONDS);
    }

    #[test]
    fn wrong_mark_clears_after_delay() {
        let (mut game, clock) = controller();
        game.start().unwrap();
        let wrong = wrong_tile(&game);
        game.click_tile(wrong);
        game.drain_events();
        clock.advance(WRONG_MARK_CLEAR_MS);
        game.advance();
        assert!(
            game.drain_events()
                .contains(&GameEvent::TileMarkCleared { index: wrong })
        );
    }

    #[test]
    fn end_cancels_every_session_task() {
        let (mut game, clock) = controller();
        game.start().unwrap();
        let odd = game.correct_tile().unwrap();
        game.click_tile(odd);
        assert!(game.pending_tasks() >= 3);
        let settlement = game.end().unwrap();
        assert_eq!(settlement.score, 10);
        assert_eq!(settlement.level, 2);
        assert_eq!(game.pending_tasks(), 0);
        game.drain_events();
        clock.advance(60_000);
        game.advance();
        assert!(game.drain_events().is_empty());
        assert_eq!(game.end(), None);
    }

    #[test]
    fn rank_for_superseded_session_is_dropped() {
        let (mut game, _) = controller();
        let first = game.start().unwrap();
        game.end();
        let (_, second) = game.restart();
        let second = second.unwrap();
        assert!(!game.record_rank(first, 3));
        game.end();
        assert!(!game.record_rank(first, 3));
        assert!(game.record_rank(second, 7));
        assert_eq!(game.last_rank(), Some(7));
    }

    #[test]
    fn level_up_cue_on_every_fifth_level() {
        let (mut game, clock) = controller();
        game.start().unwrap();
        let mut level_up_at = Vec::new();
        for _ in 0..10 {
            let cleared = game.level();
            let odd = game.correct_tile().unwrap();
            game.drain_events();
            game.click_tile(odd);
            if game.drain_events().contains(&GameEvent::Cue(Cue::LevelUp)) {
                level_up_at.push(cleared);
            }
            clock.advance(NEXT_LEVEL_DELAY_MS);
            game.advance();
        }
        assert_eq!(level_up_at, vec![5, 10]);
    }

    #[test]
    fn combo_cue_layers_on_the_correct_cue() {
        let (mut game, clock) = controller();
        game.start().unwrap();
        let cues = |events: Vec<GameEvent>| -> Vec<Cue> {
            events
                .into_iter()
                .filter_map(|e| match e {
                    GameEvent::Cue(cue) => Some(cue),
                    _ => None,
                })
                .collect()
        };

        game.drain_events();
        game.click_tile(game.correct_tile().unwrap());
        assert_eq!(cues(game.drain_events()), vec![Cue::Correct]);

        clock.advance(NEXT_LEVEL_DELAY_MS);
        game.advance();
        game.drain_events();
        game.click_tile(game.correct_tile().unwrap());
        assert_eq!(game.combo(), 2);
        assert_eq!(cues(game.drain_events()), vec![Cue::Correct, Cue::Combo(2)]);
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_string(&GameEvent::TimeLeft { seconds: 12 }).unwrap();
        assert_eq!(json, r#"{"type":"TimeLeft","data":{"seconds":12}}"#);
        let json = serde_json::to_string(&GameEvent::Cue(Cue::Combo(3))).unwrap();
        assert_eq!(json, r#"{"type":"Cue","data":{"Combo":3}}"#);
    }
}
