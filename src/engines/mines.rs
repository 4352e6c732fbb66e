//! Mines cashout multiplier. The multiplier for `p` safe picks on a grid of
//! `g` tiles with `m` mines is `C(g, m) / C(g - p, m)` shaped by a curve
//! factor. `run` always reports WIN: a mine hit is a caller-side event that
//! never invokes the engine, so the stake debited at placement simply stays
//! lost when no cashout follows.

use super::{parse_config, EngineOutcome, PlayParams};
use crate::errors::{CoreError, CoreResult};
use crate::models::Outcome;
use crate::money;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;

fn default_grid_size() -> u32 {
    25
}

fn default_mine_count() -> u32 {
    3
}

fn default_curve() -> f64 {
    0.97
}

#[derive(Debug, Clone, Deserialize)]
pub struct MinesConfig {
    #[serde(default = "default_grid_size")]
    pub grid_size: u32,
    #[serde(default = "default_mine_count")]
    pub mine_count: u32,
    #[serde(default = "default_curve")]
    pub multiplier_curve: f64,
}

#[derive(Debug, Clone)]
pub struct MinesEngine {
    config: MinesConfig,
}

/// n choose k with a u128 intermediate to stay exact for board-sized inputs.
fn comb(n: u64, k: u64) -> u64 {
    if k > n {
        return 0;
    }
    let k = k.min(n - k);
    let mut result: u128 = 1;
    for i in 0..k {
        result = result * (n - i) as u128 / (i + 1) as u128;
    }
    result as u64
}

impl MinesEngine {
    pub fn from_config(config: &serde_json::Value) -> CoreResult<Self> {
        let config: MinesConfig = parse_config("mines", config)?;
        if config.mine_count == 0 || config.mine_count >= config.grid_size {
            return Err(CoreError::Validation(format!(
                "mine_count {} must be between 1 and grid_size {} - 1",
                config.mine_count, config.grid_size
            )));
        }
        Ok(Self { config })
    }

    /// Theoretical cashout multiplier for `picks` revealed safe tiles.
    pub fn multiplier(&self, picks: u32) -> CoreResult<f64> {
        let grid = self.config.grid_size;
        let mines = self.config.mine_count;
        if picks + mines > grid {
            return Err(CoreError::Validation(format!(
                "{} picks leave fewer than {} tiles on a {}-tile grid",
                picks, mines, grid
            )));
        }
        let total = comb(grid as u64, mines as u64) as f64;
        let remaining = comb((grid - picks) as u64, mines as u64) as f64;
        Ok(total / remaining * self.config.multiplier_curve)
    }

    pub fn run(&self, stake: Decimal, params: &PlayParams) -> CoreResult<EngineOutcome> {
        let picks = params.successful_picks.unwrap_or(1);
        let multiplier = self.multiplier(picks)?;
        let win_amount = money::mul_f64(stake, multiplier)?;

        Ok(EngineOutcome {
            outcome: Outcome::Win,
            win_amount,
            result_data: json!({
                "picks": picks,
                "mines": self.config.mine_count,
                "multiplier": (multiplier * 100.0).round() / 100.0,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn engine(grid: u32, mines: u32, curve: f64) -> MinesEngine {
        MinesEngine::from_config(&json!({
            "grid_size": grid,
            "mine_count": mines,
            "multiplier_curve": curve,
        }))
        .unwrap()
    }

    #[test]
    fn test_comb() {
        assert_eq!(comb(25, 3), 2300);
        assert_eq!(comb(24, 3), 2024);
        assert_eq!(comb(5, 0), 1);
        assert_eq!(comb(3, 5), 0);
    }

    #[test]
    fn test_reference_multiplier() {
        // grid=25, mines=3, picks=1, curve=0.97:
        // multiplier = C(25,3) / C(24,3) * 0.97 = 2300/2024 * 0.97
        let e = engine(25, 3, 0.97);
        let m = e.multiplier(1).unwrap();
        let expected = 2300.0 / 2024.0 * 0.97;
        assert!((m - expected).abs() < 1e-12);

        let outcome = e
            .run(
                dec!(10),
                &PlayParams {
                    successful_picks: Some(1),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(outcome.outcome, Outcome::Win);
        assert_eq!(
            outcome.win_amount,
            money::mul_f64(dec!(10), expected).unwrap()
        );
    }

    #[test]
    fn test_multiplier_grows_with_picks() {
        let e = engine(25, 3, 0.97);
        let m1 = e.multiplier(1).unwrap();
        let m5 = e.multiplier(5).unwrap();
        assert!(m5 > m1);
    }

    #[test]
    fn test_too_many_picks_rejected() {
        let e = engine(25, 3, 0.97);
        assert!(e.multiplier(23).is_err());
        assert!(e.multiplier(22).is_ok());
    }

    #[test]
    fn test_run_always_reports_win() {
        let e = engine(25, 3, 0.97);
        let outcome = e.run(dec!(5), &PlayParams::default()).unwrap();
        assert_eq!(outcome.outcome, Outcome::Win);
        assert!(outcome.win_amount > dec!(0));
    }
}
