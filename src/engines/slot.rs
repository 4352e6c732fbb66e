//! Reel slot. Each reel draws one uniform symbol; the concatenated line is
//! looked up in the paytable, missing combinations pay zero.

use super::{parse_config, EngineOutcome};
use crate::errors::{CoreError, CoreResult};
use crate::models::Outcome;
use crate::money;
use rand::{Rng, RngCore};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;

fn default_reels() -> u32 {
    3
}

fn default_symbol_map() -> Vec<String> {
    ["A", "B", "C", "7"].iter().map(|s| s.to_string()).collect()
}

fn default_paytable() -> HashMap<String, f64> {
    [("777", 50.0), ("AAA", 10.0), ("BBB", 5.0), ("CCC", 2.0)]
        .iter()
        .map(|(k, v)| (k.to_string(), *v))
        .collect()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlotConfig {
    #[serde(default = "default_reels")]
    pub reels: u32,
    #[serde(default = "default_symbol_map")]
    pub symbol_map: Vec<String>,
    #[serde(default = "default_paytable")]
    pub paytable: HashMap<String, f64>,
}

#[derive(Debug, Clone)]
pub struct SlotEngine {
    config: SlotConfig,
}

impl SlotEngine {
    pub fn from_config(config: &serde_json::Value) -> CoreResult<Self> {
        let config: SlotConfig = parse_config("slot", config)?;
        if config.reels == 0 {
            return Err(CoreError::Validation("slot reels must be at least 1".into()));
        }
        if config.symbol_map.is_empty() {
            return Err(CoreError::Validation("slot symbol_map is empty".into()));
        }
        Ok(Self { config })
    }

    /// Pure settlement for a known spin.
    pub fn settle(&self, stake: Decimal, spin: &[String]) -> CoreResult<EngineOutcome> {
        let line: String = spin.concat();
        let multiplier = self.config.paytable.get(&line).copied().unwrap_or(0.0);
        let win_amount = money::mul_f64(stake, multiplier)?;

        Ok(EngineOutcome {
            outcome: if win_amount > Decimal::ZERO {
                Outcome::Win
            } else {
                Outcome::Lose
            },
            win_amount,
            result_data: json!({ "spin": spin }),
        })
    }

    pub fn run(&self, stake: Decimal, rng: &mut dyn RngCore) -> CoreResult<EngineOutcome> {
        let spin: Vec<String> = (0..self.config.reels)
            .map(|_| {
                let idx = rng.gen_range(0..self.config.symbol_map.len());
                self.config.symbol_map[idx].clone()
            })
            .collect();
        self.settle(stake, &spin)
    }
}
