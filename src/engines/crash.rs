//! Crash curve. A crash point is drawn from the inverse-uniform
//! distribution `(1 - house_edge) / (1 - U)`; the player wins when their
//! target multiplier is at or below the crash point.

use super::{parse_config, EngineOutcome, PlayParams};
use crate::errors::{CoreError, CoreResult};
use crate::models::Outcome;
use crate::money;
use rand::{Rng, RngCore};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;

fn default_max_multiplier() -> f64 {
    1000.0
}

fn default_house_edge() -> f64 {
    0.03
}

const DEFAULT_TARGET: f64 = 1.5;

#[derive(Debug, Clone, Deserialize)]
pub struct CrashConfig {
    #[serde(default = "default_max_multiplier")]
    pub max_multiplier: f64,
    #[serde(default = "default_house_edge")]
    pub house_edge: f64,
}

#[derive(Debug, Clone)]
pub struct CrashEngine {
    config: CrashConfig,
}

impl CrashEngine {
    pub fn from_config(config: &serde_json::Value) -> CoreResult<Self> {
        let config: CrashConfig = parse_config("crash", config)?;
        if !(0.0..1.0).contains(&config.house_edge) {
            return Err(CoreError::Validation(format!(
                "crash house_edge {} must be in [0, 1)",
                config.house_edge
            )));
        }
        if config.max_multiplier < 1.0 {
            return Err(CoreError::Validation(format!(
                "crash max_multiplier {} must be at least 1",
                config.max_multiplier
            )));
        }
        Ok(Self { config })
    }

    /// Crash point for a uniform draw `u` in [0, 1): rounded to 2 places,
    /// clamped at the configured ceiling.
    pub fn crash_point(&self, u: f64) -> f64 {
        let raw = (1.0 - self.config.house_edge) / (1.0 - u);
        let rounded = (raw * 100.0).round() / 100.0;
        rounded.min(self.config.max_multiplier)
    }

    /// Pure settlement for a known crash point.
    pub fn settle(&self, stake: Decimal, crash_at: f64, target: f64) -> CoreResult<EngineOutcome> {
        let won = target <= crash_at;
        let win_amount = if won {
            money::mul_f64(stake, target)?
        } else {
            Decimal::ZERO
        };

        Ok(EngineOutcome {
            outcome: if won { Outcome::Win } else { Outcome::Lose },
            win_amount,
            result_data: json!({
                "crash_at": crash_at,
                "cashed_out": target,
            }),
        })
    }

    pub fn run(
        &self,
        stake: Decimal,
        params: &PlayParams,
        rng: &mut dyn RngCore,
    ) -> CoreResult<EngineOutcome> {
        let target = params.target_multiplier.unwrap_or(DEFAULT_TARGET);
        if !target.is_finite() || target < 1.0 {
            return Err(CoreError::Validation(format!(
                "target_multiplier {} must be at least 1",
                target
            )));
        }
        let u: f64 = rng.gen();
        self.settle(stake, self.crash_point(u), target)
    }
}
