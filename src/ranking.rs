//! Ranking store client.
//!
//! Submissions and leaderboard reads go to the remote server while it is
//! believed reachable and silently fall back to a capped, locally persisted
//! leaderboard otherwise. Nothing here ever returns an error to the game.

use std::cell::{Cell, RefCell};

use rand::SeedableRng;
use rand::rngs::StdRng;
use thiserror::Error;

use crate::api::{HealthResponse, RankingsResponse, SubmitRequest, SubmitResponse};
use crate::clock::{Clock, calendar_day};
use crate::config::{LOCAL_LEADERBOARD_CAP, RANKINGS_KEY};
use crate::record::{
    DeviceCategory, RankingRecord, Submission, generate_record_id, ranking_order,
};
use crate::storage::{KeyValueStore, StorageError};

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The request never produced a response.
    #[error("network error: {0}")]
    Network(String),
    /// The server answered with a non-success status.
    #[error("server responded with status {0}")]
    Status(u16),
    /// A 2xx body that reported `success: false`.
    #[error("server rejected request: {0}")]
    Rejected(String),
    #[error("could not decode response: {0}")]
    Decode(String),
}

/// The authoritative leaderboard, reached over the network.
#[allow(async_fn_in_trait)]
pub trait RemoteLeaderboard {
    async fn submit(&self, request: &SubmitRequest) -> Result<SubmitResponse, RemoteError>;
    async fn fetch_top(&self) -> Result<RankingsResponse, RemoteError>;
    async fn health(&self) -> Result<HealthResponse, RemoteError>;
}

/// Leaderboard kept in key/value storage when the server cannot be used.
pub struct LocalLeaderboard<S> {
    store: S,
    cap: usize,
}

impl<S: KeyValueStore> LocalLeaderboard<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            cap: LOCAL_LEADERBOARD_CAP,
        }
    }

    /// Stored records in leaderboard order. Unreadable data reads as empty.
    pub fn load(&self) -> Vec<RankingRecord> {
        match self.read() {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!("[RANKING] local leaderboard unreadable, treating as empty: {e}");
                Vec::new()
            }
        }
    }

    fn read(&self) -> Result<Vec<RankingRecord>, StorageError> {
        let Some(raw) = self.store.get(RANKINGS_KEY)? else {
            return Ok(Vec::new());
        };
        serde_json::from_str(&raw).map_err(|e| StorageError::Corrupt {
            key: RANKINGS_KEY.to_string(),
            reason: e.to_string(),
        })
    }

    /// Insert `record`, keep the best `cap` entries, and return its 1-based rank.
    pub fn insert(&self, record: RankingRecord) -> u32 {
        let mut records = self.load();
        let id = record.id.clone();
        records.push(record);
        records.sort_by(ranking_order);
        let rank = records
            .iter()
            .position(|r| r.id == id)
            .map_or(records.len(), |p| p + 1);
        records.truncate(self.cap);

        match serde_json::to_string(&records) {
            Ok(json) => {
                if let Err(e) = self.store.set(RANKINGS_KEY, &json) {
                    tracing::warn!("[RANKING] could not persist local leaderboard: {e}");
                }
            }
            Err(e) => tracing::warn!("[RANKING] could not encode local leaderboard: {e}"),
        }
        rank as u32
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionStatus {
    Online,
    Offline,
    ServerUnreachable,
}

/// Network and server reachability as last reported by the environment.
#[derive(Debug)]
pub struct Connectivity {
    network_online: Cell<bool>,
    server_reachable: Cell<bool>,
}

impl Connectivity {
    pub fn new(network_online: bool) -> Self {
        Self {
            network_online: Cell::new(network_online),
            server_reachable: Cell::new(false),
        }
    }

    pub fn network_online(&self) -> bool {
        self.network_online.get()
    }

    pub fn server_reachable(&self) -> bool {
        self.server_reachable.get()
    }

    /// Whether requests should try the server at all.
    pub fn remote_enabled(&self) -> bool {
        self.network_online() && self.server_reachable()
    }

    pub fn status(&self) -> ConnectionStatus {
        match (self.network_online(), self.server_reachable()) {
            (false, _) => ConnectionStatus::Offline,
            (true, true) => ConnectionStatus::Online,
            (true, false) => ConnectionStatus::ServerUnreachable,
        }
    }
}

pub struct RankingClient<R, S, C> {
    remote: R,
    local: LocalLeaderboard<S>,
    clock: C,
    connectivity: Connectivity,
    device: DeviceCategory,
    rng: RefCell<StdRng>,
}

impl<R: RemoteLeaderboard, S: KeyValueStore, C: Clock> RankingClient<R, S, C> {
    pub fn new(
        remote: R,
        store: S,
        clock: C,
        device: DeviceCategory,
        network_online: bool,
    ) -> Self {
        Self {
            remote,
            local: LocalLeaderboard::new(store),
            clock,
            connectivity: Connectivity::new(network_online),
            device,
            rng: RefCell::new(StdRng::from_entropy()),
        }
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    pub fn status(&self) -> ConnectionStatus {
        self.connectivity.status()
    }

    pub fn local(&self) -> &LocalLeaderboard<S> {
        &self.local
    }

    /// The browser reported the network back; re-check the server.
    pub async fn on_network_available(&self) -> ConnectionStatus {
        self.connectivity.network_online.set(true);
        self.probe().await;
        self.status()
    }

    pub fn on_network_unavailable(&self) {
        self.connectivity.network_online.set(false);
        tracing::info!("[RANKING] network offline, using local leaderboard");
    }

    /// Ask the server for its health. Returns whether it is reachable.
    pub async fn probe(&self) -> bool {
        if !self.connectivity.network_online() {
            self.connectivity.server_reachable.set(false);
            return false;
        }
        let reachable = match self.remote.health().await {
            Ok(health) => health.success,
            Err(e) => {
                tracing::debug!("[RANKING] health probe failed: {e}");
                false
            }
        };
        if reachable != self.connectivity.server_reachable() {
            tracing::info!("[RANKING] server reachable: {reachable}");
        }
        self.connectivity.server_reachable.set(reachable);
        reachable
    }

    /// Record a finished game and return its rank. Never fails: any remote
    /// problem lands the record in the local leaderboard instead.
    pub async fn submit(&self, name: &str, score: u32, level: u32) -> u32 {
        let now = self.clock.now_ms();
        match Submission::new(name, score, level, self.device) {
            Ok(submission) => {
                if self.connectivity.remote_enabled() {
                    match self.submit_remote(&submission).await {
                        Ok(rank) => return rank,
                        Err(e) => {
                            tracing::warn!("[RANKING] remote submit failed, saving locally: {e}");
                            if matches!(e, RemoteError::Network(_)) {
                                self.connectivity.server_reachable.set(false);
                            }
                        }
                    }
                }
                let id = self.next_id(now);
                self.local
                    .insert(RankingRecord::from_submission(&submission, id, now))
            }
            Err(e) => {
                tracing::warn!(
                    "[RANKING] submission would be rejected by the server ({e}), saving locally"
                );
                let record = RankingRecord {
                    id: self.next_id(now),
                    name: name.to_string(),
                    score,
                    level,
                    timestamp: now,
                    device: self.device.as_str().to_string(),
                    date: calendar_day(now),
                };
                self.local.insert(record)
            }
        }
    }

    async fn submit_remote(&self, submission: &Submission) -> Result<u32, RemoteError> {
        let response = self
            .remote
            .submit(&SubmitRequest::from_submission(submission))
            .await?;
        if !response.success {
            return Err(RemoteError::Rejected(response.message));
        }
        tracing::debug!("[RANKING] remote rank {} for {}", response.rank, response.id);
        Ok(response.rank)
    }

    /// Today's leaderboard from the server, or every locally kept record.
    pub async fn fetch_top(&self) -> Vec<RankingRecord> {
        if self.connectivity.remote_enabled() {
            match self.remote.fetch_top().await {
                Ok(response) if response.success => return response.rankings,
                Ok(_) => {
                    tracing::warn!("[RANKING] server reported failure, reading local leaderboard")
                }
                Err(e) => {
                    tracing::warn!("[RANKING] remote fetch failed, reading local leaderboard: {e}");
                    if matches!(e, RemoteError::Network(_)) {
                        self.connectivity.server_reachable.set(false);
                    }
                }
            }
        }
        self.local.load()
    }

    fn next_id(&self, now: i64) -> String {
        generate_record_id(now, &mut *self.rng.borrow_mut())
    }
}
