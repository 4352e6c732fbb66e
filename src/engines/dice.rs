//! Even/odd dice. A fair d6 is rolled; the player wins when their parity
//! pick matches, paying `multiplier * (1 - house_edge)`.

use super::{parse_config, EngineOutcome, Parity, PlayParams};
use crate::errors::{CoreError, CoreResult};
use crate::models::Outcome;
use crate::money;
use rand::{Rng, RngCore};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;

fn default_multiplier() -> f64 {
    1.98
}

fn default_house_edge() -> f64 {
    0.02
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiceConfig {
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_house_edge")]
    pub house_edge: f64,
}

#[derive(Debug, Clone)]
pub struct DiceEngine {
    config: DiceConfig,
}

impl DiceEngine {
    pub fn from_config(config: &serde_json::Value) -> CoreResult<Self> {
        let config: DiceConfig = parse_config("dice", config)?;
        if !(0.0..1.0).contains(&config.house_edge) {
            return Err(CoreError::Validation(format!(
                "dice house_edge {} must be in [0, 1)",
                config.house_edge
            )));
        }
        Ok(Self { config })
    }

    /// Effective payout after the house edge.
    pub fn payout_multiplier(&self) -> f64 {
        self.config.multiplier * (1.0 - self.config.house_edge)
    }

    /// Pure settlement for a known roll.
    pub fn settle(&self, stake: Decimal, roll: u8, choice: Parity) -> CoreResult<EngineOutcome> {
        let parity = if roll % 2 == 0 {
            Parity::Even
        } else {
            Parity::Odd
        };
        let won = choice == parity;
        let win_amount = if won {
            money::mul_f64(stake, self.payout_multiplier())?
        } else {
            Decimal::ZERO
        };

        Ok(EngineOutcome {
            outcome: if won { Outcome::Win } else { Outcome::Lose },
            win_amount,
            result_data: json!({
                "roll": roll,
                "result": parity.to_string(),
            }),
        })
    }

    pub fn run(
        &self,
        stake: Decimal,
        params: &PlayParams,
        rng: &mut dyn RngCore,
    ) -> CoreResult<EngineOutcome> {
        let choice = params
            .player_choice
            .ok_or_else(|| CoreError::Validation("player_choice is required for dice".into()))?;
        let roll: u8 = rng.gen_range(1..=6);
        self.settle(stake, roll, choice)
    }
}
