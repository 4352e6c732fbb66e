//! In-process settlement store with explicit leases and an atomic
//! transaction boundary.
//!
//! Persistence technology is out of scope for the core; this store realizes
//! the two primitives every service relies on:
//!
//! - [`LeaseRegistry`]: "acquire an exclusive lease on key K for the duration
//!   of transaction T". Concurrent transactions over the same wallet, limit
//!   key, or jackpot serialize here; disjoint keys proceed in parallel.
//! - [`Txn`]: a copy-on-write overlay over the shared tables. Nothing a
//!   transaction stages is visible until `commit`, and dropping an
//!   uncommitted transaction discards every staged mutation, so a failed
//!   request can always be retried without double-effect.

use crate::models::{
    Bet, Bonus, BonusUsage, Jackpot, JackpotContribution, JackpotWin, LimitPeriod, LimitType,
    PlayerLimit, Round, Session, Wallet, WalletTransaction,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Condvar, Mutex, RwLock};
use uuid::Uuid;

/// Keys that can be exclusively leased for a transaction's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LeaseKey {
    Wallet(Uuid),
    Limit(Uuid, Uuid, LimitType, LimitPeriod),
    Jackpot(Uuid),
}

/// Blocking exclusive-lease table. No per-operation timeout: lock waits are
/// the storage layer's concern, exactly as row locks would be.
pub struct LeaseRegistry {
    held: Mutex<HashSet<LeaseKey>>,
    freed: Condvar,
}

impl LeaseRegistry {
    fn new() -> Self {
        Self {
            held: Mutex::new(HashSet::new()),
            freed: Condvar::new(),
        }
    }

    /// Block until `key` is free, then hold it until the guard drops.
    fn acquire(&self, key: LeaseKey) -> LeaseGuard<'_> {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        while held.contains(&key) {
            held = self.freed.wait(held).unwrap_or_else(|e| e.into_inner());
        }
        held.insert(key.clone());
        LeaseGuard {
            registry: self,
            key,
        }
    }
}

/// Releases its lease key on drop.
pub struct LeaseGuard<'a> {
    registry: &'a LeaseRegistry,
    key: LeaseKey,
}

impl Drop for LeaseGuard<'_> {
    fn drop(&mut self) {
        let mut held = self
            .registry
            .held
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        held.remove(&self.key);
        self.registry.freed.notify_all();
    }
}

/// Shared entity tables. The `wallet_transactions` log is strictly
/// append-only; rows are never updated or removed after commit.
#[derive(Default)]
pub struct Tables {
    pub wallets: HashMap<Uuid, Wallet>,
    pub wallet_transactions: Vec<WalletTransaction>,
    pub sessions: HashMap<Uuid, Session>,
    pub rounds: HashMap<Uuid, Round>,
    pub bets: HashMap<Uuid, Bet>,
    pub bonuses: HashMap<Uuid, Bonus>,
    pub bonus_usages: HashMap<Uuid, BonusUsage>,
    pub limits: HashMap<Uuid, PlayerLimit>,
    pub jackpots: HashMap<Uuid, Jackpot>,
    pub jackpot_contributions: Vec<JackpotContribution>,
    pub jackpot_wins: Vec<JackpotWin>,
    /// Reference targets owned by the excluded payment pipeline; registered
    /// so ledger reference checks have something to validate against.
    pub deposits: HashSet<Uuid>,
    pub withdrawals: HashSet<Uuid>,
}

/// The settlement store: tables plus the lease registry.
pub struct Store {
    tables: RwLock<Tables>,
    leases: LeaseRegistry,
}

impl Store {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            leases: LeaseRegistry::new(),
        }
    }

    /// Begin a transaction. Leases are acquired lazily as rows are touched.
    pub fn begin(&self) -> Txn<'_> {
        Txn {
            store: self,
            wallets: HashMap::new(),
            sessions: HashMap::new(),
            rounds: HashMap::new(),
            bets: HashMap::new(),
            bonuses: HashMap::new(),
            bonus_usages: HashMap::new(),
            limits: HashMap::new(),
            jackpots: HashMap::new(),
            new_wallet_transactions: Vec::new(),
            new_contributions: Vec::new(),
            new_wins: Vec::new(),
            guards: Vec::new(),
            held: HashSet::new(),
        }
    }

    /// Committed view of a wallet. Test and dashboard reads only.
    pub fn wallet(&self, wallet_id: Uuid) -> Option<Wallet> {
        self.tables.read().unwrap().wallets.get(&wallet_id).cloned()
    }

    /// Committed ledger rows for a wallet, in append order.
    pub fn wallet_transactions(&self, wallet_id: Uuid) -> Vec<WalletTransaction> {
        self.tables
            .read()
            .unwrap()
            .wallet_transactions
            .iter()
            .filter(|t| t.wallet_id == wallet_id)
            .cloned()
            .collect()
    }

    pub fn round(&self, round_id: Uuid) -> Option<Round> {
        self.tables.read().unwrap().rounds.get(&round_id).cloned()
    }

    pub fn bet_for_round(&self, round_id: Uuid) -> Option<Bet> {
        self.tables
            .read()
            .unwrap()
            .bets
            .values()
            .find(|b| b.round_id == round_id)
            .cloned()
    }

    pub fn jackpot(&self, jackpot_id: Uuid) -> Option<Jackpot> {
        self.tables
            .read()
            .unwrap()
            .jackpots
            .get(&jackpot_id)
            .cloned()
    }

    pub fn bonus_usage(&self, usage_id: Uuid) -> Option<BonusUsage> {
        self.tables
            .read()
            .unwrap()
            .bonus_usages
            .get(&usage_id)
            .cloned()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

/// Copy-on-write transaction overlay. Reads consult the overlay first and
/// fall through to the committed tables; the first mutation of a row copies
/// it into the overlay. `commit` folds everything back under one write lock.
pub struct Txn<'a> {
    store: &'a Store,
    wallets: HashMap<Uuid, Wallet>,
    sessions: HashMap<Uuid, Session>,
    rounds: HashMap<Uuid, Round>,
    bets: HashMap<Uuid, Bet>,
    bonuses: HashMap<Uuid, Bonus>,
    bonus_usages: HashMap<Uuid, BonusUsage>,
    limits: HashMap<Uuid, PlayerLimit>,
    jackpots: HashMap<Uuid, Jackpot>,
    new_wallet_transactions: Vec<WalletTransaction>,
    new_contributions: Vec<JackpotContribution>,
    new_wins: Vec<JackpotWin>,
    guards: Vec<LeaseGuard<'a>>,
    held: HashSet<LeaseKey>,
}

impl<'a> Txn<'a> {
    /// Take the exclusive lease for `key`, blocking if another transaction
    /// holds it. Re-acquiring a key this transaction already holds is a
    /// no-op.
    pub fn lease(&mut self, key: LeaseKey) {
        if self.held.contains(&key) {
            return;
        }
        let guard = self.store.leases.acquire(key.clone());
        self.held.insert(key);
        self.guards.push(guard);
    }

    // ---- wallets ----

    pub fn wallet(&self, wallet_id: Uuid) -> Option<Wallet> {
        if let Some(w) = self.wallets.get(&wallet_id) {
            return Some(w.clone());
        }
        self.store
            .tables
            .read()
            .unwrap()
            .wallets
            .get(&wallet_id)
            .cloned()
    }

    pub fn wallet_mut(&mut self, wallet_id: Uuid) -> Option<&mut Wallet> {
        if !self.wallets.contains_key(&wallet_id) {
            let committed = self
                .store
                .tables
                .read()
                .unwrap()
                .wallets
                .get(&wallet_id)
                .cloned()?;
            self.wallets.insert(wallet_id, committed);
        }
        self.wallets.get_mut(&wallet_id)
    }

    pub fn insert_wallet(&mut self, wallet: Wallet) {
        self.wallets.insert(wallet.wallet_id, wallet);
    }

    pub fn find_wallet(
        &self,
        player_id: Uuid,
        tenant_id: Uuid,
        wallet_type: crate::models::WalletType,
    ) -> Option<Wallet> {
        let matches = |w: &Wallet| {
            w.player_id == player_id
                && w.tenant_id == tenant_id
                && w.wallet_type == wallet_type
                && w.active
        };
        if let Some(w) = self.wallets.values().find(|w| matches(w)) {
            return Some(w.clone());
        }
        let tables = self.store.tables.read().unwrap();
        tables
            .wallets
            .values()
            .filter(|w| !self.wallets.contains_key(&w.wallet_id))
            .find(|w| matches(w))
            .cloned()
    }

    /// Distinct players holding an active wallet for the tenant.
    pub fn active_players(&self, tenant_id: Uuid) -> Vec<Uuid> {
        let tables = self.store.tables.read().unwrap();
        let mut players: Vec<Uuid> = tables
            .wallets
            .values()
            .map(|w| self.wallets.get(&w.wallet_id).unwrap_or(w))
            .chain(
                self.wallets
                    .values()
                    .filter(|w| !tables.wallets.contains_key(&w.wallet_id)),
            )
            .filter(|w| w.tenant_id == tenant_id && w.active)
            .map(|w| w.player_id)
            .collect();
        players.sort();
        players.dedup();
        players
    }

    pub fn append_wallet_transaction(&mut self, row: WalletTransaction) {
        self.new_wallet_transactions.push(row);
    }

    // ---- sessions / rounds / bets ----

    pub fn session_mut(&mut self, session_id: Uuid) -> Option<&mut Session> {
        if !self.sessions.contains_key(&session_id) {
            let committed = self
                .store
                .tables
                .read()
                .unwrap()
                .sessions
                .get(&session_id)
                .cloned()?;
            self.sessions.insert(session_id, committed);
        }
        self.sessions.get_mut(&session_id)
    }

    pub fn insert_session(&mut self, session: Session) {
        self.sessions.insert(session.session_id, session);
    }

    pub fn find_active_session(&self, player_id: Uuid, game_id: Uuid) -> Option<Session> {
        let active = |s: &Session| {
            s.player_id == player_id
                && s.game_id == game_id
                && s.status == crate::models::SessionStatus::Active
        };
        if let Some(s) = self.sessions.values().find(|s| active(s)) {
            return Some(s.clone());
        }
        let tables = self.store.tables.read().unwrap();
        tables
            .sessions
            .values()
            .filter(|s| !self.sessions.contains_key(&s.session_id))
            .find(|s| active(s))
            .cloned()
    }

    pub fn round(&self, round_id: Uuid) -> Option<Round> {
        if let Some(r) = self.rounds.get(&round_id) {
            return Some(r.clone());
        }
        self.store
            .tables
            .read()
            .unwrap()
            .rounds
            .get(&round_id)
            .cloned()
    }

    pub fn round_mut(&mut self, round_id: Uuid) -> Option<&mut Round> {
        if !self.rounds.contains_key(&round_id) {
            let committed = self
                .store
                .tables
                .read()
                .unwrap()
                .rounds
                .get(&round_id)
                .cloned()?;
            self.rounds.insert(round_id, committed);
        }
        self.rounds.get_mut(&round_id)
    }

    pub fn insert_round(&mut self, round: Round) {
        self.rounds.insert(round.round_id, round);
    }

    /// Highest round number recorded for the session, overlay included.
    pub fn last_round_number(&self, session_id: Uuid) -> u64 {
        let tables = self.store.tables.read().unwrap();
        tables
            .rounds
            .values()
            .filter(|r| !self.rounds.contains_key(&r.round_id))
            .chain(self.rounds.values())
            .filter(|r| r.session_id == session_id)
            .map(|r| r.round_number)
            .max()
            .unwrap_or(0)
    }

    pub fn bet_mut(&mut self, bet_id: Uuid) -> Option<&mut Bet> {
        if !self.bets.contains_key(&bet_id) {
            let committed = self
                .store
                .tables
                .read()
                .unwrap()
                .bets
                .get(&bet_id)
                .cloned()?;
            self.bets.insert(bet_id, committed);
        }
        self.bets.get_mut(&bet_id)
    }

    pub fn insert_bet(&mut self, bet: Bet) {
        self.bets.insert(bet.bet_id, bet);
    }

    // ---- bonuses ----

    pub fn bonus(&self, bonus_id: Uuid) -> Option<Bonus> {
        if let Some(b) = self.bonuses.get(&bonus_id) {
            return Some(b.clone());
        }
        self.store
            .tables
            .read()
            .unwrap()
            .bonuses
            .get(&bonus_id)
            .cloned()
    }

    pub fn insert_bonus(&mut self, bonus: Bonus) {
        self.bonuses.insert(bonus.bonus_id, bonus);
    }

    pub fn bonuses_for_tenant(&self, tenant_id: Uuid) -> Vec<Bonus> {
        let tables = self.store.tables.read().unwrap();
        tables
            .bonuses
            .values()
            .filter(|b| !self.bonuses.contains_key(&b.bonus_id))
            .chain(self.bonuses.values())
            .filter(|b| b.tenant_id == tenant_id)
            .cloned()
            .collect()
    }

    pub fn bonus_usage(&self, usage_id: Uuid) -> Option<BonusUsage> {
        if let Some(u) = self.bonus_usages.get(&usage_id) {
            return Some(u.clone());
        }
        self.store
            .tables
            .read()
            .unwrap()
            .bonus_usages
            .get(&usage_id)
            .cloned()
    }

    pub fn bonus_usage_mut(&mut self, usage_id: Uuid) -> Option<&mut BonusUsage> {
        if !self.bonus_usages.contains_key(&usage_id) {
            let committed = self
                .store
                .tables
                .read()
                .unwrap()
                .bonus_usages
                .get(&usage_id)
                .cloned()?;
            self.bonus_usages.insert(usage_id, committed);
        }
        self.bonus_usages.get_mut(&usage_id)
    }

    pub fn insert_bonus_usage(&mut self, usage: BonusUsage) {
        self.bonus_usages.insert(usage.usage_id, usage);
    }

    pub fn bonus_usages_for_player(&self, player_id: Uuid) -> Vec<BonusUsage> {
        let tables = self.store.tables.read().unwrap();
        tables
            .bonus_usages
            .values()
            .filter(|u| !self.bonus_usages.contains_key(&u.usage_id))
            .chain(self.bonus_usages.values())
            .filter(|u| u.player_id == player_id)
            .cloned()
            .collect()
    }

    pub fn usage_count(&self, bonus_id: Uuid, player_id: Uuid) -> usize {
        let tables = self.store.tables.read().unwrap();
        tables
            .bonus_usages
            .values()
            .filter(|u| !self.bonus_usages.contains_key(&u.usage_id))
            .chain(self.bonus_usages.values())
            .filter(|u| u.bonus_id == bonus_id && u.player_id == player_id)
            .count()
    }

    // ---- limits ----

    pub fn limit_mut(&mut self, limit_id: Uuid) -> Option<&mut PlayerLimit> {
        if !self.limits.contains_key(&limit_id) {
            let committed = self
                .store
                .tables
                .read()
                .unwrap()
                .limits
                .get(&limit_id)
                .cloned()?;
            self.limits.insert(limit_id, committed);
        }
        self.limits.get_mut(&limit_id)
    }

    pub fn insert_limit(&mut self, limit: PlayerLimit) {
        self.limits.insert(limit.limit_id, limit);
    }

    pub fn limits_for_player(&self, player_id: Uuid, tenant_id: Uuid) -> Vec<PlayerLimit> {
        let tables = self.store.tables.read().unwrap();
        tables
            .limits
            .values()
            .filter(|l| !self.limits.contains_key(&l.limit_id))
            .chain(self.limits.values())
            .filter(|l| l.player_id == player_id && l.tenant_id == tenant_id)
            .cloned()
            .collect()
    }

    // ---- jackpots ----

    pub fn jackpot(&self, jackpot_id: Uuid) -> Option<Jackpot> {
        if let Some(j) = self.jackpots.get(&jackpot_id) {
            return Some(j.clone());
        }
        self.store
            .tables
            .read()
            .unwrap()
            .jackpots
            .get(&jackpot_id)
            .cloned()
    }

    pub fn jackpot_mut(&mut self, jackpot_id: Uuid) -> Option<&mut Jackpot> {
        if !self.jackpots.contains_key(&jackpot_id) {
            let committed = self
                .store
                .tables
                .read()
                .unwrap()
                .jackpots
                .get(&jackpot_id)
                .cloned()?;
            self.jackpots.insert(jackpot_id, committed);
        }
        self.jackpots.get_mut(&jackpot_id)
    }

    pub fn insert_jackpot(&mut self, jackpot: Jackpot) {
        self.jackpots.insert(jackpot.jackpot_id, jackpot);
    }

    pub fn jackpots_for_tenant(&self, tenant_id: Uuid) -> Vec<Jackpot> {
        let tables = self.store.tables.read().unwrap();
        tables
            .jackpots
            .values()
            .filter(|j| !self.jackpots.contains_key(&j.jackpot_id))
            .chain(self.jackpots.values())
            .filter(|j| j.tenant_id == tenant_id)
            .cloned()
            .collect()
    }

    pub fn append_contribution(&mut self, contribution: JackpotContribution) {
        self.new_contributions.push(contribution);
    }

    pub fn append_win(&mut self, win: JackpotWin) {
        self.new_wins.push(win);
    }

    /// Distinct contributors to a jackpot, committed and staged.
    pub fn contributors(&self, jackpot_id: Uuid) -> Vec<Uuid> {
        let tables = self.store.tables.read().unwrap();
        let mut players: Vec<Uuid> = tables
            .jackpot_contributions
            .iter()
            .chain(self.new_contributions.iter())
            .filter(|c| c.jackpot_id == jackpot_id)
            .map(|c| c.player_id)
            .collect();
        players.sort();
        players.dedup();
        players
    }

    // ---- external reference targets ----

    pub fn deposit_exists(&self, deposit_id: Uuid) -> bool {
        self.store
            .tables
            .read()
            .unwrap()
            .deposits
            .contains(&deposit_id)
    }

    pub fn withdrawal_exists(&self, withdrawal_id: Uuid) -> bool {
        self.store
            .tables
            .read()
            .unwrap()
            .withdrawals
            .contains(&withdrawal_id)
    }

    /// Registration hooks for the excluded payment pipeline.
    pub fn register_deposit(&mut self, deposit_id: Uuid) {
        self.store
            .tables
            .write()
            .unwrap()
            .deposits
            .insert(deposit_id);
    }

    /// Fold every staged mutation into the shared tables atomically. Leases
    /// release when the transaction drops.
    pub fn commit(self) {
        let mut tables = self.store.tables.write().unwrap();
        tables.wallets.extend(self.wallets);
        tables.sessions.extend(self.sessions);
        tables.rounds.extend(self.rounds);
        tables.bets.extend(self.bets);
        tables.bonuses.extend(self.bonuses);
        tables.bonus_usages.extend(self.bonus_usages);
        tables.limits.extend(self.limits);
        tables.jackpots.extend(self.jackpots);
        tables
            .wallet_transactions
            .extend(self.new_wallet_transactions);
        tables.jackpot_contributions.extend(self.new_contributions);
        tables.jackpot_wins.extend(self.new_wins);
    }
}
