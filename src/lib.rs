//! Wagermill - Transactional Wager-Settlement Core
//!
//! Single-commit settlement pipeline for a multi-tenant casino platform:
//! ledgered wallets, responsible-gaming limits, bonus wagering, jackpot
//! contribution splitting, and pluggable outcome engines, all composed by a
//! gameplay orchestrator under one atomic transaction boundary.

pub mod bonus;
pub mod collaborators;
pub mod config;
pub mod engines;
pub mod errors;
pub mod gameplay;
pub mod jackpot;
pub mod limits;
pub mod models;
pub mod money;
pub mod services;
pub mod store;
pub mod wallet;

pub use errors::{CoreError, CoreResult};
pub use services::CasinoServices;
