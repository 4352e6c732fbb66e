//! Seams to systems outside the settlement core: the game catalog the
//! platform owns, the analytics feed, and the lifetime player-stats service.
//!
//! Analytics is fire-and-forget: the provided implementation hands events to
//! a bounded channel and a background thread, and the orchestrator only ever
//! logs a delivery failure.

use crate::engines::EngineType;
use crate::errors::{CoreError, CoreResult};
use crate::models::Outcome;
use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::HashMap;
use std::thread;
use uuid::Uuid;

/// Authenticated caller identity, resolved upstream.
#[derive(Debug, Clone, Copy)]
pub struct PlayerContext {
    pub player_id: Uuid,
    pub tenant_id: Uuid,
}

/// Bet bounds a tenant may override per game.
#[derive(Debug, Clone, Copy)]
pub struct BetBounds {
    pub min_bet: Decimal,
    pub max_bet: Decimal,
}

/// Catalog projection of a game: engine binding plus bet bounds.
#[derive(Debug, Clone)]
pub struct GameSpec {
    pub game_id: Uuid,
    pub name: String,
    pub provider: String,
    pub engine_type: EngineType,
    pub engine_config: Value,
    pub min_bet: Decimal,
    pub max_bet: Decimal,
    pub tenant_overrides: HashMap<Uuid, BetBounds>,
}

impl GameSpec {
    /// Effective bet bounds for a tenant.
    pub fn bounds_for(&self, tenant_id: Uuid) -> BetBounds {
        self.tenant_overrides
            .get(&tenant_id)
            .copied()
            .unwrap_or(BetBounds {
                min_bet: self.min_bet,
                max_bet: self.max_bet,
            })
    }
}

/// Read-only game lookup owned by the platform.
pub trait GameCatalog: Send + Sync {
    fn game(&self, game_id: Uuid, tenant_id: Uuid) -> Option<GameSpec>;
}

/// In-memory catalog for fixtures and the demo binary.
pub struct StaticCatalog {
    games: HashMap<Uuid, GameSpec>,
}

impl StaticCatalog {
    pub fn new(games: Vec<GameSpec>) -> Self {
        Self {
            games: games.into_iter().map(|g| (g.game_id, g)).collect(),
        }
    }
}

impl GameCatalog for StaticCatalog {
    fn game(&self, game_id: Uuid, _tenant_id: Uuid) -> Option<GameSpec> {
        self.games.get(&game_id).cloned()
    }
}

/// Settled-bet notification emitted after commit.
#[derive(Debug, Clone)]
pub struct BetEvent {
    pub player_id: Uuid,
    pub tenant_id: Uuid,
    pub game_id: Uuid,
    pub round_id: Uuid,
    pub stake: Decimal,
    pub win_amount: Decimal,
    pub outcome: Outcome,
    pub settled_at: DateTime<Utc>,
}

pub trait Analytics: Send + Sync {
    fn record_bet(&self, event: BetEvent) -> CoreResult<()>;
}

pub trait PlayerStats: Send + Sync {
    fn record_session(&self, player_id: Uuid, play_seconds: u64) -> CoreResult<()>;
}

const ANALYTICS_QUEUE: usize = 1024;

/// Channel-backed [`Analytics`]. Delivery never blocks settlement; a full or
/// disconnected queue surfaces as an error the caller logs and drops.
pub struct ChannelAnalytics {
    tx: Sender<BetEvent>,
}

impl ChannelAnalytics {
    /// Sender plus raw receiver, for callers that drain the queue themselves.
    pub fn pair() -> (Self, Receiver<BetEvent>) {
        let (tx, rx) = bounded(ANALYTICS_QUEUE);
        (Self { tx }, rx)
    }

    /// Spawn a consumer thread running `handler` for each event. The thread
    /// exits when every sender is dropped.
    pub fn spawn<F>(mut handler: F) -> Self
    where
        F: FnMut(BetEvent) + Send + 'static,
    {
        let (analytics, rx) = Self::pair();
        thread::spawn(move || {
            for event in rx {
                handler(event);
            }
        });
        analytics
    }
}

impl Analytics for ChannelAnalytics {
    fn record_bet(&self, event: BetEvent) -> CoreResult<()> {
        self.tx.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) => CoreError::Internal("analytics queue full".to_string()),
            TrySendError::Disconnected(_) => {
                CoreError::Internal("analytics consumer gone".to_string())
            }
        })
    }
}

/// No-op collaborators for tests and minimal deployments.
pub struct NoopAnalytics;

impl Analytics for NoopAnalytics {
    fn record_bet(&self, _event: BetEvent) -> CoreResult<()> {
        Ok(())
    }
}

pub struct NoopPlayerStats;

impl PlayerStats for NoopPlayerStats {
    fn record_session(&self, _player_id: Uuid, _play_seconds: u64) -> CoreResult<()> {
        Ok(())
    }
}
