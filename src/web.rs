//! Browser driver.
//!
//! Binds the [`GameController`] and [`RankingClient`] to the page: a
//! `gloo-timers` interval pumps the controller's task list, `gloo-net` talks to
//! the leaderboard server, `localStorage` backs the limit tracker and the
//! offline leaderboard, and the window's online/offline events feed the
//! connectivity state. Rendering and audio stay in JS; every [`GameEvent`] is
//! handed to a JS callback as a JSON string.

use std::cell::RefCell;
use std::rc::Rc;

use gloo_net::http::{Request, Response};
use gloo_timers::callback::{Interval, Timeout};
use serde::Serialize;
use serde::de::DeserializeOwned;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;
use web_sys::window;

use crate::api::{HealthResponse, RankingsResponse, SubmitRequest, SubmitResponse};
use crate::clock::{Clock, SystemClock};
use crate::config::COUNTDOWN_POLL_MS;
use crate::ranking::{ConnectionStatus, RankingClient, RemoteError, RemoteLeaderboard};
use crate::record::{DeviceCategory, RankingRecord};
use crate::session::{GameController, GameEvent, Phase, Settlement};
use crate::storage::{BrowserStorage, Preferences};

/// `RemoteLeaderboard` over `fetch`.
pub struct HttpLeaderboard {
    base_url: String,
}

impl HttpLeaderboard {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{path}", self.base_url)
    }
}

async fn decode<T: DeserializeOwned>(
    sent: Result<Response, gloo_net::Error>,
) -> Result<T, RemoteError> {
    let response = sent.map_err(|e| RemoteError::Network(e.to_string()))?;
    if !response.ok() {
        return Err(RemoteError::Status(response.status()));
    }
    response
        .json::<T>()
        .await
        .map_err(|e| RemoteError::Decode(e.to_string()))
}

impl RemoteLeaderboard for HttpLeaderboard {
    async fn submit(&self, request: &SubmitRequest) -> Result<SubmitResponse, RemoteError> {
        let request = Request::post(&self.url("rankings"))
            .json(request)
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        decode(request.send().await).await
    }

    async fn fetch_top(&self) -> Result<RankingsResponse, RemoteError> {
        decode(Request::get(&self.url("rankings")).send().await).await
    }

    async fn health(&self) -> Result<HealthResponse, RemoteError> {
        decode(Request::get(&self.url("health")).send().await).await
    }
}

type Store = Rc<BrowserStorage>;

struct App {
    game: RefCell<GameController<Store, SystemClock>>,
    ranking: RankingClient<HttpLeaderboard, Store, SystemClock>,
    prefs: Preferences<Store>,
    ticker: RefCell<Option<Interval>>,
    on_event: js_sys::Function,
}

thread_local! {
    static APP: RefCell<Option<Rc<App>>> = const { RefCell::new(None) };
}

fn app() -> Result<Rc<App>, JsValue> {
    APP.with(|cell| cell.borrow().clone())
        .ok_or_else(|| JsValue::from_str("init_game has not been called"))
}

impl App {
    /// Hand queued events to JS and submit any settlement.
    fn flush(self: &Rc<Self>) {
        let events = self.game.borrow_mut().drain_events();
        for event in events {
            if let GameEvent::Ended(settlement) = &event {
                self.settle(settlement.clone());
            }
            self.deliver(&event);
        }
        self.sync_ticker();
    }

    fn deliver<T: Serialize>(&self, payload: &T) {
        match serde_json::to_string(payload) {
            Ok(json) => {
                if let Err(e) = self.on_event.call1(&JsValue::NULL, &JsValue::from_str(&json)) {
                    tracing::warn!("[WEB] event callback threw: {e:?}");
                }
            }
            Err(e) => tracing::error!("[WEB] could not encode event: {e}"),
        }
    }

    fn settle(self: &Rc<Self>, settlement: Settlement) {
        let app = Rc::clone(self);
        spawn_local(async move {
            let rank = app
                .ranking
                .submit(&settlement.name, settlement.score, settlement.level)
                .await;
            app.game.borrow_mut().record_rank(settlement.session, rank);
            app.flush();
        });
    }

    /// Run the pump while the controller has work scheduled.
    fn sync_ticker(self: &Rc<Self>) {
        let busy = self.game.borrow().pending_tasks() > 0;
        let running = self.ticker.borrow().is_some();
        if busy && !running {
            let app = Rc::clone(self);
            let interval = Interval::new(COUNTDOWN_POLL_MS as u32, move || {
                app.game.borrow_mut().advance();
                app.flush();
            });
            *self.ticker.borrow_mut() = Some(interval);
        } else if !busy && running {
            // The interval may be the caller; drop it outside its own callback.
            let stopped = self.ticker.borrow_mut().take();
            let _ = Timeout::new(0, move || drop(stopped)).forget();
        }
    }

    fn install_connectivity_listeners(self: &Rc<Self>) -> Result<(), JsValue> {
        let win = window().ok_or_else(|| JsValue::from_str("no window"))?;
        {
            let app = Rc::clone(self);
            let closure = Closure::wrap(Box::new(move |_evt: web_sys::Event| {
                let app = Rc::clone(&app);
                spawn_local(async move {
                    let status = app.ranking.on_network_available().await;
                    app.deliver(&StatusEvent::new(status));
                });
            }) as Box<dyn FnMut(_)>);
            win.add_event_listener_with_callback("online", closure.as_ref().unchecked_ref())?;
            closure.forget();
        }
        {
            let app = Rc::clone(self);
            let closure = Closure::wrap(Box::new(move |_evt: web_sys::Event| {
                app.ranking.on_network_unavailable();
                app.deliver(&StatusEvent::new(app.ranking.status()));
            }) as Box<dyn FnMut(_)>);
            win.add_event_listener_with_callback("offline", closure.as_ref().unchecked_ref())?;
            closure.forget();
        }
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(tag = "type", content = "data")]
enum StatusEvent {
    ConnectionChanged { status: &'static str },
}

impl StatusEvent {
    fn new(status: ConnectionStatus) -> Self {
        Self::ConnectionChanged {
            status: status_label(status),
        }
    }
}

fn status_label(status: ConnectionStatus) -> &'static str {
    match status {
        ConnectionStatus::Online => "online",
        ConnectionStatus::Offline => "offline",
        ConnectionStatus::ServerUnreachable => "server-unreachable",
    }
}

#[derive(Serialize)]
struct LeaderboardRow {
    rank: usize,
    #[serde(flatten)]
    record: RankingRecord,
    current_player: bool,
}

/// Wire the game to the page. `on_event` receives every game event as JSON.
#[wasm_bindgen]
pub fn init_game(api_base: &str, on_event: js_sys::Function) -> Result<(), JsValue> {
    let storage = Rc::new(BrowserStorage::local().map_err(|e| JsValue::from_str(&e.to_string()))?);
    let navigator = window().map(|w| w.navigator());
    let device = navigator
        .as_ref()
        .and_then(|n| n.user_agent().ok())
        .map(|ua| DeviceCategory::from_user_agent(&ua))
        .unwrap_or(DeviceCategory::Unknown);
    let online = navigator.as_ref().is_none_or(|n| n.on_line());

    let app = Rc::new(App {
        game: RefCell::new(GameController::new(Rc::clone(&storage), SystemClock)),
        ranking: RankingClient::new(
            HttpLeaderboard::new(api_base),
            Rc::clone(&storage),
            SystemClock,
            device,
            online,
        ),
        prefs: Preferences::new(storage),
        ticker: RefCell::new(None),
        on_event,
    });
    app.install_connectivity_listeners()?;
    APP.with(|cell| *cell.borrow_mut() = Some(Rc::clone(&app)));

    spawn_local(async move {
        app.ranking.probe().await;
        app.deliver(&StatusEvent::new(app.ranking.status()));
    });
    tracing::info!("[WEB] hue-hunt ready ({})", device.as_str());
    Ok(())
}

#[wasm_bindgen]
pub fn set_player_name(name: &str) -> Result<(), JsValue> {
    app()?
        .game
        .borrow_mut()
        .set_player_name(name)
        .map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Start a session. Rejects with the reason (e.g. the daily limit).
#[wasm_bindgen]
pub fn start_game() -> Result<(), JsValue> {
    let app = app()?;
    let started = app.game.borrow_mut().start();
    app.flush();
    started
        .map(|_| ())
        .map_err(|e| JsValue::from_str(&e.to_string()))
}

#[wasm_bindgen]
pub fn restart_game() -> Result<(), JsValue> {
    let app = app()?;
    let (_, started) = app.game.borrow_mut().restart();
    app.flush();
    started
        .map(|_| ())
        .map_err(|e| JsValue::from_str(&e.to_string()))
}

#[wasm_bindgen]
pub fn click_tile(index: usize) -> Result<(), JsValue> {
    let app = app()?;
    app.game.borrow_mut().click_tile(index);
    app.flush();
    Ok(())
}

#[wasm_bindgen]
pub fn end_game() -> Result<(), JsValue> {
    let app = app()?;
    app.game.borrow_mut().end();
    app.flush();
    Ok(())
}

#[wasm_bindgen]
pub fn back_to_menu() -> Result<(), JsValue> {
    app()?.game.borrow_mut().dismiss();
    Ok(())
}

#[wasm_bindgen]
pub fn watch_reward() -> Result<bool, JsValue> {
    let app = app()?;
    let started = app.game.borrow_mut().begin_reward();
    app.flush();
    Ok(started)
}

#[wasm_bindgen]
pub fn cancel_reward() -> Result<(), JsValue> {
    let app = app()?;
    app.game.borrow_mut().cancel_reward();
    app.flush();
    Ok(())
}

#[wasm_bindgen]
pub fn remaining_games() -> Result<u32, JsValue> {
    Ok(app()?.game.borrow().remaining_games())
}

#[wasm_bindgen]
pub fn is_playing() -> Result<bool, JsValue> {
    Ok(app()?.game.borrow().phase() == Phase::Active)
}

#[wasm_bindgen]
pub fn sound_enabled() -> Result<bool, JsValue> {
    Ok(app()?.prefs.sound_enabled())
}

#[wasm_bindgen]
pub fn toggle_sound() -> Result<bool, JsValue> {
    Ok(app()?.prefs.toggle_sound())
}

#[wasm_bindgen]
pub fn connection_status() -> Result<String, JsValue> {
    Ok(status_label(app()?.ranking.status()).to_string())
}

/// Resolves to a JSON array of leaderboard rows; the entry the current player
/// just submitted is flagged with `current_player`.
#[wasm_bindgen]
pub fn load_leaderboard() -> Result<js_sys::Promise, JsValue> {
    let app = app()?;
    Ok(wasm_bindgen_futures::future_to_promise(async move {
        let records = app.ranking.fetch_top().await;
        let now = SystemClock.now_ms();
        let name = app.game.borrow().player_name().map(str::to_string);
        let rows: Vec<LeaderboardRow> = records
            .into_iter()
            .enumerate()
            .map(|(i, record)| LeaderboardRow {
                rank: i + 1,
                current_player: name
                    .as_deref()
                    .is_some_and(|n| record.is_fresh_entry_of(n, now)),
                record,
            })
            .collect();
        serde_json::to_string(&rows)
            .map(|json| JsValue::from_str(&json))
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }))
}
