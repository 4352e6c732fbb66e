//! Outcome engines: polymorphic pure computation of a game result.
//!
//! Engines hold no state between invocations. Every variant separates its
//! sampling (`run`, which draws through the caller's RNG) from its pure
//! settle function, so tests can force rolls, paths, and crash points
//! directly. Engine selection is a closed enum dispatched through an
//! explicit [`EngineRegistry`] constructed once at startup; an unknown
//! engine tag is a configuration error, never a silent no-op.

mod crash;
mod dice;
mod mines;
mod plinko;
mod slot;

pub use crash::CrashEngine;
pub use dice::DiceEngine;
pub use mines::MinesEngine;
pub use plinko::PlinkoEngine;
pub use slot::SlotEngine;

use crate::errors::{CoreError, CoreResult};
use crate::models::Outcome;
use rand::RngCore;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Closed set of engine variants.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EngineType {
    #[serde(alias = "dice_engine")]
    Dice,
    #[serde(alias = "crash_engine")]
    Crash,
    #[serde(alias = "mines_engine")]
    Mines,
    #[serde(alias = "slot_engine")]
    Slot,
    #[serde(alias = "plinko_engine")]
    Plinko,
}

impl fmt::Display for EngineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineType::Dice => write!(f, "dice"),
            EngineType::Crash => write!(f, "crash"),
            EngineType::Mines => write!(f, "mines"),
            EngineType::Slot => write!(f, "slot"),
            EngineType::Plinko => write!(f, "plinko"),
        }
    }
}

impl FromStr for EngineType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dice" | "dice_engine" => Ok(EngineType::Dice),
            "crash" | "crash_engine" => Ok(EngineType::Crash),
            "mines" | "mines_engine" => Ok(EngineType::Mines),
            "slot" | "slot_engine" => Ok(EngineType::Slot),
            "plinko" | "plinko_engine" => Ok(EngineType::Plinko),
            other => Err(CoreError::Unsupported(other.to_string())),
        }
    }
}

/// Even/odd pick for the dice engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Parity {
    Even,
    Odd,
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Parity::Even => write!(f, "EVEN"),
            Parity::Odd => write!(f, "ODD"),
        }
    }
}

/// Player-supplied inputs that vary per engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlayParams {
    /// Dice: EVEN or ODD.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_choice: Option<Parity>,
    /// Crash: the auto-cashout multiplier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_multiplier: Option<f64>,
    /// Mines: safe tiles revealed before cashing out.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub successful_picks: Option<u32>,
}

/// What an engine hands back to the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineOutcome {
    pub outcome: Outcome,
    pub win_amount: Decimal,
    pub result_data: Value,
}

/// Shared stake-bounds check: out of range is a validation error.
pub fn validate_bet(stake: Decimal, min_bet: Decimal, max_bet: Decimal) -> CoreResult<()> {
    if stake < min_bet || stake > max_bet {
        return Err(CoreError::Validation(format!(
            "stake {} is outside allowed range ({}-{})",
            stake, min_bet, max_bet
        )));
    }
    Ok(())
}

/// A configured engine instance.
#[derive(Debug, Clone)]
pub enum Engine {
    Dice(DiceEngine),
    Crash(CrashEngine),
    Mines(MinesEngine),
    Slot(SlotEngine),
    Plinko(PlinkoEngine),
}

impl Engine {
    /// Resolve the game result for a stake.
    pub fn run(
        &self,
        stake: Decimal,
        params: &PlayParams,
        rng: &mut dyn RngCore,
    ) -> CoreResult<EngineOutcome> {
        match self {
            Engine::Dice(e) => e.run(stake, params, rng),
            Engine::Crash(e) => e.run(stake, params, rng),
            Engine::Mines(e) => e.run(stake, params),
            Engine::Slot(e) => e.run(stake, rng),
            Engine::Plinko(e) => e.run(stake, rng),
        }
    }
}

type EngineCtor = fn(&Value) -> CoreResult<Engine>;

/// Engine-type to constructor table, built once at process start and passed
/// by reference into the orchestrator. Never looked up through global state.
pub struct EngineRegistry {
    ctors: HashMap<EngineType, EngineCtor>,
}

impl EngineRegistry {
    /// Registry with all five production engines.
    pub fn standard() -> Self {
        let mut ctors: HashMap<EngineType, EngineCtor> = HashMap::new();
        ctors.insert(EngineType::Dice, |c| {
            Ok(Engine::Dice(DiceEngine::from_config(c)?))
        });
        ctors.insert(EngineType::Crash, |c| {
            Ok(Engine::Crash(CrashEngine::from_config(c)?))
        });
        ctors.insert(EngineType::Mines, |c| {
            Ok(Engine::Mines(MinesEngine::from_config(c)?))
        });
        ctors.insert(EngineType::Slot, |c| {
            Ok(Engine::Slot(SlotEngine::from_config(c)?))
        });
        ctors.insert(EngineType::Plinko, |c| {
            Ok(Engine::Plinko(PlinkoEngine::from_config(c)?))
        });
        Self { ctors }
    }

    /// Build a configured engine, or fail `Unsupported` for an unknown tag.
    pub fn engine(&self, engine_type: EngineType, config: &Value) -> CoreResult<Engine> {
        match self.ctors.get(&engine_type) {
            Some(ctor) => ctor(config),
            None => Err(CoreError::Unsupported(engine_type.to_string())),
        }
    }
}

/// Deserialize an engine config payload with a readable error.
pub(crate) fn parse_config<T: serde::de::DeserializeOwned>(
    engine: &str,
    config: &Value,
) -> CoreResult<T> {
    serde_json::from_value(config.clone())
        .map_err(|e| CoreError::Validation(format!("invalid {} config: {}", engine, e)))
}
