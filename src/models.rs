//! Domain entities persisted by the settlement store.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Wallet flavor. Every player holds one of each per tenant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum WalletType {
    Cash,
    Bonus,
}

impl fmt::Display for WalletType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalletType::Cash => write!(f, "CASH"),
            WalletType::Bonus => write!(f, "BONUS"),
        }
    }
}

/// Player + tenant + currency scoped balance holder. Created lazily on
/// tenant entry, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub wallet_id: Uuid,
    pub player_id: Uuid,
    pub tenant_id: Uuid,
    pub currency: String,
    pub wallet_type: WalletType,
    /// Invariant: never negative.
    pub balance: Decimal,
    pub active: bool,
}

impl Wallet {
    pub fn new(player_id: Uuid, tenant_id: Uuid, currency: &str, wallet_type: WalletType) -> Self {
        Self {
            wallet_id: Uuid::new_v4(),
            player_id,
            tenant_id,
            currency: currency.to_string(),
            wallet_type,
            balance: Decimal::ZERO,
            active: true,
        }
    }
}

/// Direction a transaction code moves funds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Debit,
    Credit,
}

/// Every ledger row carries one of these codes; the code resolves to a
/// direction, the caller never passes signed amounts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransactionCode {
    Bet,
    Win,
    Deposit,
    Withdrawal,
    Bonus,
    BonusConversionDebit,
    BonusConversionCredit,
    JackpotContribution,
    JackpotPayout,
}

impl TransactionCode {
    pub fn direction(&self) -> Direction {
        match self {
            TransactionCode::Bet
            | TransactionCode::Withdrawal
            | TransactionCode::BonusConversionDebit
            | TransactionCode::JackpotContribution => Direction::Debit,
            TransactionCode::Win
            | TransactionCode::Deposit
            | TransactionCode::Bonus
            | TransactionCode::BonusConversionCredit
            | TransactionCode::JackpotPayout => Direction::Credit,
        }
    }
}

/// What a ledger row points back at.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceType {
    Bet,
    Deposit,
    Withdrawal,
    WithdrawalRejection,
    Bonus,
    BonusConversion,
    Jackpot,
    JackpotWin,
}

/// Immutable ledger row. Invariant: `balance_after == balance_before +
/// signed_amount`; a wallet's balance always equals its initial balance plus
/// the sum of its rows' signed amounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub transaction_id: Uuid,
    pub wallet_id: Uuid,
    pub code: TransactionCode,
    pub signed_amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub reference_type: ReferenceType,
    pub reference_id: Uuid,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
}

/// Player + game + tenant scoped play session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: Uuid,
    pub player_id: Uuid,
    pub game_id: Uuid,
    pub tenant_id: Uuid,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn start(player_id: Uuid, game_id: Uuid, tenant_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            player_id,
            game_id,
            tenant_id,
            status: SessionStatus::Active,
            started_at: now,
            ended_at: None,
        }
    }
}

/// Game outcome as stored on the round.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Win,
    Lose,
}

/// One spin/roll/drop inside a session. Finalized exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Round {
    pub round_id: Uuid,
    pub session_id: Uuid,
    /// Monotonically increasing within the session.
    pub round_number: u64,
    pub bet_amount: Decimal,
    pub win_amount: Decimal,
    pub outcome: Option<Outcome>,
    pub result_data: Option<Value>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BetStatus {
    Placed,
    Settled,
}

/// 1:1 with a round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bet {
    pub bet_id: Uuid,
    pub round_id: Uuid,
    pub wallet_id: Uuid,
    pub bet_amount: Decimal,
    pub win_amount: Decimal,
    pub status: BetStatus,
    pub placed_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum BonusType {
    /// Bonus amount derived from a deposit percentage, capped.
    Deposit,
    /// Fixed credit configured on the campaign.
    Fixed,
}

/// Tenant-configured bonus campaign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bonus {
    pub bonus_id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub bonus_type: BonusType,
    /// Fixed credit for `Fixed` campaigns.
    pub amount: Decimal,
    /// Deposit percentage for `Deposit` campaigns.
    pub percentage: Decimal,
    pub max_bonus: Decimal,
    pub wagering_multiplier: Decimal,
    pub min_deposit: Decimal,
    pub max_uses_per_player: u32,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BonusStatus {
    Active,
    Eligible,
    Completed,
    Expired,
}

/// A granted bonus working through its wagering requirement. Transitions are
/// strictly active -> eligible -> completed, or -> expired at any point once
/// the campaign's validity window lapses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BonusUsage {
    pub usage_id: Uuid,
    pub bonus_id: Uuid,
    pub player_id: Uuid,
    pub wallet_id: Uuid,
    pub bonus_amount: Decimal,
    pub wagering_required: Decimal,
    pub wagering_completed: Decimal,
    pub status: BonusStatus,
    pub granted_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum LimitType {
    Deposit,
    Loss,
    Session,
    Wager,
}

impl fmt::Display for LimitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitType::Deposit => write!(f, "DEPOSIT"),
            LimitType::Loss => write!(f, "LOSS"),
            LimitType::Session => write!(f, "SESSION"),
            LimitType::Wager => write!(f, "WAGER"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum LimitPeriod {
    Daily,
    Weekly,
    Monthly,
}

impl LimitPeriod {
    /// Period boundary relative to a period start.
    pub fn end_from(&self, period_start: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            LimitPeriod::Daily => period_start + chrono::Duration::days(1),
            LimitPeriod::Weekly => period_start + chrono::Duration::days(7),
            LimitPeriod::Monthly => period_start + chrono::Duration::days(30),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LimitStatus {
    Active,
    PendingIncrease,
    Expired,
    Cancelled,
}

/// Self-imposed responsible-gaming limit row. Invariant: at most one ACTIVE
/// and at most one PENDING_INCREASE row per (player, tenant, type, period).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerLimit {
    pub limit_id: Uuid,
    pub player_id: Uuid,
    pub tenant_id: Uuid,
    pub limit_type: LimitType,
    pub period: LimitPeriod,
    /// Monetary amount, or minutes for SESSION limits.
    pub limit_value: Decimal,
    pub current_usage: Decimal,
    pub status: LimitStatus,
    pub effective_at: DateTime<Utc>,
    pub requested_at: DateTime<Utc>,
    /// None while the row is still pending.
    pub period_start: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum JackpotType {
    Fixed,
    Progressive,
    Sponsored,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum JackpotStatus {
    Active,
    Paused,
    Completed,
}

/// Whether a FIXED pool re-arms after a win.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResetCycle {
    Never,
    Recurring,
}

/// Shared prize pool. `current_amount` only moves up except on win-reset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jackpot {
    pub jackpot_id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub jackpot_type: JackpotType,
    pub seed_amount: Decimal,
    pub current_amount: Decimal,
    /// Share of each opted-in stake diverted into the pool (percent).
    pub contribution_percentage: Decimal,
    pub reset_cycle: ResetCycle,
    pub deadline: Option<DateTime<Utc>>,
    pub status: JackpotStatus,
    pub last_won_at: Option<DateTime<Utc>>,
}

/// Append-only record of a stake share entering a pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JackpotContribution {
    pub contribution_id: Uuid,
    pub jackpot_id: Uuid,
    pub player_id: Uuid,
    /// Set when the contribution was split off a bet.
    pub bet_ref: Option<Uuid>,
    pub amount: Decimal,
    pub contributed_at: DateTime<Utc>,
}

/// Append-only record of a pool payout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JackpotWin {
    pub win_id: Uuid,
    pub jackpot_id: Uuid,
    pub player_id: Uuid,
    pub win_amount: Decimal,
    pub won_at: DateTime<Utc>,
}
