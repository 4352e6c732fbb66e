//! Service container wiring the settlement core to its collaborators.
//!
//! One [`CasinoServices`] instance owns the store, the engine registry, and
//! the injected collaborator implementations, and exposes the operation
//! surface callers integrate against. Built through [`CasinoServicesBuilder`]
//! so tests swap the catalog, analytics, and RNG without touching the core.

use crate::bonus::{self, CreateBonus};
use crate::collaborators::{
    Analytics, GameCatalog, NoopAnalytics, NoopPlayerStats, PlayerContext, PlayerStats,
    StaticCatalog,
};
use crate::config::CasinoConfig;
use crate::engines::EngineRegistry;
use crate::errors::{CoreError, CoreResult, Entity};
use crate::gameplay::{self, PlayReceipt, PlayRequest, SessionSummary};
use crate::jackpot::{self, CreateJackpot};
use crate::limits::{self, LimitCheck, LimitView};
use crate::models::{
    Bonus, BonusUsage, Jackpot, JackpotWin, LimitPeriod, LimitType, PlayerLimit,
};
use crate::store::Store;
use crate::wallet::{self, DashboardFilter, WalletDashboard};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal::Decimal;
use std::sync::Mutex;
use uuid::Uuid;

pub struct CasinoServices {
    config: CasinoConfig,
    store: Store,
    registry: EngineRegistry,
    catalog: Box<dyn GameCatalog>,
    analytics: Box<dyn Analytics>,
    player_stats: Box<dyn PlayerStats>,
    rng: Mutex<StdRng>,
}

impl CasinoServices {
    pub fn builder() -> CasinoServicesBuilder {
        CasinoServicesBuilder::new()
    }

    pub fn config(&self) -> &CasinoConfig {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Lazily create the player's wallets for a tenant. Returns whether the
    /// profile was created on this call.
    pub fn init_tenant_profile(&self, ctx: PlayerContext) -> bool {
        wallet::init_tenant_profile(
            &self.store,
            ctx.player_id,
            ctx.tenant_id,
            &self.config.platform.currency,
        )
    }

    pub fn play(
        &self,
        ctx: PlayerContext,
        request: &PlayRequest,
        now: DateTime<Utc>,
    ) -> CoreResult<PlayReceipt> {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        gameplay::play(
            &self.store,
            &self.registry,
            self.catalog.as_ref(),
            self.analytics.as_ref(),
            &mut *rng,
            ctx,
            request,
            now,
        )
    }

    pub fn end_session(
        &self,
        ctx: PlayerContext,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> CoreResult<SessionSummary> {
        gameplay::end_session(&self.store, self.player_stats.as_ref(), ctx, session_id, now)
    }

    // ---- responsible gaming ----

    pub fn set_limit(
        &self,
        ctx: PlayerContext,
        limit_type: LimitType,
        period: LimitPeriod,
        value: Decimal,
        now: DateTime<Utc>,
    ) -> CoreResult<PlayerLimit> {
        limits::set_limit(
            &self.store,
            ctx.player_id,
            ctx.tenant_id,
            limit_type,
            period,
            value,
            now,
        )
    }

    pub fn check_limit(
        &self,
        ctx: PlayerContext,
        limit_type: LimitType,
        period: LimitPeriod,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> LimitCheck {
        limits::check_limit(
            &self.store,
            ctx.player_id,
            ctx.tenant_id,
            limit_type,
            period,
            amount,
            now,
        )
    }

    pub fn player_limits(&self, ctx: PlayerContext, now: DateTime<Utc>) -> Vec<LimitView> {
        limits::player_limits(&self.store, ctx.player_id, ctx.tenant_id, now)
    }

    pub fn cancel_pending_increase(
        &self,
        ctx: PlayerContext,
        limit_type: LimitType,
        period: LimitPeriod,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        limits::cancel_pending_increase(
            &self.store,
            ctx.player_id,
            ctx.tenant_id,
            limit_type,
            period,
            now,
        )
    }

    pub fn remove_limit(
        &self,
        ctx: PlayerContext,
        limit_type: LimitType,
        period: LimitPeriod,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        limits::remove_limit(&self.store, ctx.player_id, ctx.tenant_id, limit_type, period, now)
    }

    // ---- bonuses ----

    pub fn create_bonus(&self, payload: CreateBonus) -> CoreResult<Bonus> {
        bonus::create_bonus(&self.store, payload)
    }

    /// Grant the best open campaign the player qualifies for.
    pub fn claim_bonus(
        &self,
        ctx: PlayerContext,
        deposit: Option<Decimal>,
        now: DateTime<Utc>,
    ) -> CoreResult<BonusUsage> {
        let best = {
            let txn = self.store.begin();
            bonus::eligible_bonus(&txn, ctx.player_id, ctx.tenant_id, deposit, now)
                .ok_or(CoreError::NotFound(Entity::Bonus))?
        };
        bonus::grant_bonus(
            &self.store,
            ctx.player_id,
            ctx.tenant_id,
            best.bonus_id,
            deposit,
            now,
        )
    }

    pub fn convert_bonus(
        &self,
        ctx: PlayerContext,
        usage_id: Uuid,
        now: DateTime<Utc>,
    ) -> CoreResult<Decimal> {
        bonus::convert_bonus_to_cash(&self.store, ctx.player_id, ctx.tenant_id, usage_id, now)
    }

    // ---- jackpots ----

    pub fn create_jackpot(&self, payload: CreateJackpot) -> CoreResult<Jackpot> {
        jackpot::create_jackpot(&self.store, payload)
    }

    pub fn contribute_to_jackpot(
        &self,
        ctx: PlayerContext,
        jackpot_id: Uuid,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> CoreResult<Jackpot> {
        jackpot::contribute_to_sponsored(
            &self.store,
            ctx.player_id,
            ctx.tenant_id,
            jackpot_id,
            amount,
            now,
        )
    }

    pub fn draw_jackpot_winner(
        &self,
        tenant_id: Uuid,
        jackpot_id: Uuid,
        now: DateTime<Utc>,
    ) -> CoreResult<JackpotWin> {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        jackpot::draw_winner(&self.store, tenant_id, jackpot_id, &mut *rng, now)
    }

    // ---- reads ----

    pub fn wallet_dashboard(
        &self,
        ctx: PlayerContext,
        filter: DashboardFilter,
    ) -> Option<WalletDashboard> {
        wallet::wallet_dashboard(&self.store, ctx.player_id, ctx.tenant_id, filter)
    }
}

/// Builder with test-friendly overrides for every collaborator.
pub struct CasinoServicesBuilder {
    config: CasinoConfig,
    catalog: Option<Box<dyn GameCatalog>>,
    analytics: Option<Box<dyn Analytics>>,
    player_stats: Option<Box<dyn PlayerStats>>,
    rng_seed: Option<u64>,
}

impl CasinoServicesBuilder {
    pub fn new() -> Self {
        Self {
            config: CasinoConfig::default(),
            catalog: None,
            analytics: None,
            player_stats: None,
            rng_seed: None,
        }
    }

    pub fn with_config(mut self, config: CasinoConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_catalog(mut self, catalog: Box<dyn GameCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_analytics(mut self, analytics: Box<dyn Analytics>) -> Self {
        self.analytics = Some(analytics);
        self
    }

    pub fn with_player_stats(mut self, player_stats: Box<dyn PlayerStats>) -> Self {
        self.player_stats = Some(player_stats);
        self
    }

    /// Deterministic RNG for tests.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    pub fn build(self) -> CasinoServices {
        let rng = match self.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        CasinoServices {
            config: self.config,
            store: Store::new(),
            registry: EngineRegistry::standard(),
            catalog: self
                .catalog
                .unwrap_or_else(|| Box::new(StaticCatalog::new(Vec::new()))),
            analytics: self.analytics.unwrap_or_else(|| Box::new(NoopAnalytics)),
            player_stats: self
                .player_stats
                .unwrap_or_else(|| Box::new(NoopPlayerStats)),
            rng: Mutex::new(rng),
        }
    }
}

impl Default for CasinoServicesBuilder {
    fn default() -> Self {
        Self::new()
    }
}
