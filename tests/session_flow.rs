// Integration tests (native) for the game session controller.
// Time is driven by a ManualClock and the controller's task list is pumped
// with `advance()`, the way the browser interval does it.

use std::rc::Rc;

use hue_hunt::config::{COMBO_WINDOW_MS, DAILY_LIMIT, INITIAL_TIME_SECONDS, NEXT_LEVEL_DELAY_MS};
use hue_hunt::{
    ClickOutcome, Cue, GameController, GameEvent, ManualClock, MemoryStore, Phase, StartError,
};

// 2024-03-10T12:00:00+09:00
const NOON_KST: i64 = 1_710_039_600_000;

type Game = GameController<Rc<MemoryStore>, ManualClock>;

fn new_game() -> (Game, ManualClock) {
    let clock = ManualClock::new(NOON_KST);
    let mut game = GameController::with_seed(Rc::new(MemoryStore::new()), clock.clone(), 2024);
    game.set_player_name("hunter").unwrap();
    (game, clock)
}

fn wrong_index(game: &Game) -> usize {
    let odd = game.correct_tile().expect("grid is live");
    (odd + 1) % game.layout().unwrap().tile_count()
}

/// Click the odd tile, then let the next grid appear.
fn clear_level(game: &mut Game, clock: &ManualClock) -> u32 {
    let odd = game.correct_tile().expect("grid is live");
    let ClickOutcome::Correct { gained } = game.click_tile(odd) else {
        panic!("odd tile was not accepted");
    };
    clock.advance(NEXT_LEVEL_DELAY_MS);
    game.advance();
    gained
}

#[test]
fn first_correct_at_level_five_scores_base_only() {
    let (mut game, clock) = new_game();
    game.start().unwrap();
    for _ in 1..5 {
        clear_level(&mut game, &clock);
        clock.advance(COMBO_WINDOW_MS);
        game.advance();
        assert_eq!(game.combo(), 0);
    }
    assert_eq!(game.level(), 5);
    let before = game.score();
    assert_eq!(clear_level(&mut game, &clock), 50);
    assert_eq!(game.score(), before + 50);
}

#[test]
fn third_combo_at_level_five_doubles_the_gain() {
    let (mut game, clock) = new_game();
    game.start().unwrap();
    assert_eq!(clear_level(&mut game, &clock), 10);
    // Combo 2 at level 2: 20 + floor(20 * 1 * 0.5).
    assert_eq!(clear_level(&mut game, &clock), 30);
    clock.advance(COMBO_WINDOW_MS);
    game.advance();
    assert_eq!(game.combo(), 0);

    assert_eq!(clear_level(&mut game, &clock), 30);
    assert_eq!(clear_level(&mut game, &clock), 60);
    assert_eq!(game.level(), 5);
    assert_eq!(game.combo(), 2);
    assert_eq!(clear_level(&mut game, &clock), 100);
    assert_eq!(game.combo(), 3);
    assert_eq!(game.score(), 10 + 30 + 30 + 60 + 100);
}

#[test]
fn combo_decays_only_after_the_full_window() {
    let (mut game, clock) = new_game();
    game.start().unwrap();
    clear_level(&mut game, &clock);
    clock.advance(COMBO_WINDOW_MS - NEXT_LEVEL_DELAY_MS - 1);
    game.advance();
    assert_eq!(game.combo(), 1);
    clock.advance(1);
    game.advance();
    assert_eq!(game.combo(), 0);
}

#[test]
fn wrong_click_costs_three_seconds() {
    let (mut game, clock) = new_game();
    game.start().unwrap();
    clock.advance(5_000);
    let wrong = wrong_index(&game);
    assert_eq!(game.click_tile(wrong), ClickOutcome::Wrong { time_left: 22 });
    assert_eq!(game.time_left(), 22);
    assert_eq!(game.phase(), Phase::Active);
    clock.advance(1_000);
    assert_eq!(game.time_left(), 21);
}

#[test]
fn wrong_click_resets_combo_and_cancels_decay() {
    let (mut game, clock) = new_game();
    game.start().unwrap();
    clear_level(&mut game, &clock);
    assert_eq!(game.combo(), 1);
    let wrong = wrong_index(&game);
    game.click_tile(wrong);
    assert_eq!(game.combo(), 0);
    game.drain_events();
    clock.advance(COMBO_WINDOW_MS);
    game.advance();
    let events = game.drain_events();
    assert!(!events.contains(&GameEvent::ComboChanged { combo: 0 }));
}

#[test]
fn penalty_with_no_time_left_ends_immediately() {
    let (mut game, clock) = new_game();
    game.start().unwrap();
    clock.advance(28_500);
    let wrong = wrong_index(&game);
    game.drain_events();
    assert_eq!(game.click_tile(wrong), ClickOutcome::Wrong { time_left: 0 });
    assert_eq!(game.phase(), Phase::Ended);
    let events = game.drain_events();
    assert!(events.contains(&GameEvent::TimeLeft { seconds: 0 }));
    assert!(events.contains(&GameEvent::Cue(Cue::GameOver)));
    assert!(
        events
            .iter()
            .any(|e| matches!(e, GameEvent::Ended(s) if s.score == 0 && s.level == 1))
    );
    assert_eq!(game.pending_tasks(), 0);
}

#[test]
fn countdown_runs_out_through_the_poller() {
    let (mut game, clock) = new_game();
    game.start().unwrap();
    game.drain_events();
    let mut seen = Vec::new();
    while game.phase() == Phase::Active {
        clock.advance(100);
        game.advance();
        for event in game.drain_events() {
            if let GameEvent::TimeLeft { seconds } = event {
                seen.push(seconds);
            }
        }
    }
    assert_eq!(seen.first(), Some(&(INITIAL_TIME_SECONDS - 1)));
    assert_eq!(seen.last(), Some(&0));
    assert!(seen.windows(2).all(|w| w[0] > w[1]));
    assert_eq!(game.time_left(), 0);
}

#[test]
fn click_after_expiry_ends_instead_of_scoring() {
    let (mut game, clock) = new_game();
    game.start().unwrap();
    let odd = game.correct_tile().unwrap();
    clock.advance(i64::from(INITIAL_TIME_SECONDS) * 1000);
    assert_eq!(game.click_tile(odd), ClickOutcome::Ignored);
    assert_eq!(game.phase(), Phase::Ended);
    assert_eq!(game.score(), 0);
}

#[test]
fn ended_session_ignores_stale_timers() {
    let (mut game, clock) = new_game();
    game.start().unwrap();
    let odd = game.correct_tile().unwrap();
    game.click_tile(odd);
    let settlement = game.end().unwrap();
    assert_eq!(settlement.name, "hunter");
    assert_eq!((settlement.score, settlement.level), (10, 2));

    game.drain_events();
    clock.advance(60_000);
    game.advance();
    assert!(game.drain_events().is_empty());
    assert_eq!(game.combo(), 1);
    assert!(game.correct_tile().is_none());
    assert_eq!(game.click_tile(0), ClickOutcome::Ignored);
}

#[test]
fn daily_limit_then_reward_unlocks_play() {
    let (mut game, clock) = new_game();
    for _ in 0..DAILY_LIMIT {
        game.start().unwrap();
        game.end();
    }
    game.drain_events();
    assert_eq!(game.start(), Err(StartError::LimitReached));
    assert_eq!(game.drain_events(), vec![GameEvent::LimitReached]);
    assert_eq!(game.remaining_games(), 0);

    assert!(game.begin_reward());
    assert!(!game.begin_reward());
    let mut granted = false;
    for _ in 0..30 {
        clock.advance(1_000);
        game.advance();
        granted |= game.drain_events().contains(&GameEvent::RewardGranted);
    }
    assert!(granted);
    assert_eq!(game.remaining_games(), DAILY_LIMIT);
    assert!(game.start().is_ok());
}

#[test]
fn reward_survives_session_end_but_not_cancel() {
    let (mut game, clock) = new_game();
    game.begin_reward();
    game.start().unwrap();
    game.end();
    assert_eq!(game.pending_tasks(), 1);
    clock.advance(10_000);
    game.advance();
    assert_eq!(game.reward_seconds_left(), Some(20));

    game.cancel_reward();
    assert_eq!(game.pending_tasks(), 0);
    assert_eq!(game.reward_seconds_left(), None);
    clock.advance(30_000);
    game.advance();
    assert!(!game.drain_events().contains(&GameEvent::RewardGranted));
}

#[test]
fn levels_climb_past_the_largest_grid() {
    let (mut game, clock) = new_game();
    game.start().unwrap();
    for _ in 0..25 {
        clear_level(&mut game, &clock);
    }
    assert_eq!(game.level(), 26);
    assert_eq!(game.layout().unwrap().side, 6);
}
