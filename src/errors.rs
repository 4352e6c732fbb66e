//! Closed error taxonomy for the settlement pipeline.
//!
//! Business-rule failures (limits, funds, eligibility) are ordinary values
//! here, never panics: callers are forced to handle each kind. Any error
//! surfacing before commit rolls the enclosing transaction back in full.

use crate::models::LimitType;
use rust_decimal::Decimal;
use std::fmt;

/// Entities that can be missing when an operation resolves its inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Wallet,
    Game,
    Session,
    Bonus,
    BonusUsage,
    Jackpot,
    Limit,
    Round,
    Player,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Entity::Wallet => "wallet",
            Entity::Game => "game",
            Entity::Session => "session",
            Entity::Bonus => "bonus",
            Entity::BonusUsage => "bonus usage",
            Entity::Jackpot => "jackpot",
            Entity::Limit => "limit",
            Entity::Round => "round",
            Entity::Player => "player",
        };
        write!(f, "{}", name)
    }
}

/// Root error type for all settlement operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoreError {
    /// Bad stake, bounds, or payload. No mutation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A responsible-gaming limit would be exceeded. No mutation.
    #[error("{limit_type} limit exceeded: current usage {current_usage}, {remaining} remaining")]
    LimitExceeded {
        limit_type: LimitType,
        current_usage: Decimal,
        remaining: Decimal,
    },

    /// Debit larger than the wallet balance. No mutation.
    #[error("insufficient funds: balance {balance}, required {required}")]
    InsufficientFunds { balance: Decimal, required: Decimal },

    /// BONUS wallet balance below the amount being converted. No mutation.
    #[error("insufficient bonus balance: balance {balance}, required {required}")]
    InsufficientBonusBalance { balance: Decimal, required: Decimal },

    #[error("{0} not found")]
    NotFound(Entity),

    /// Bonus past its validity window. The expiry status change is persisted
    /// even though the operation fails.
    #[error("bonus has expired and cannot be converted")]
    Expired,

    /// Unknown engine type or similar configuration error.
    #[error("unsupported engine type: {0}")]
    Unsupported(String),

    /// Unexpected failure anywhere in the pipeline. Triggers full rollback.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for Results.
pub type CoreResult<T> = Result<T, CoreError>;
