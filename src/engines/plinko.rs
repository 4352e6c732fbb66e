//! Plinko board. The ball takes `rows` independent fair left/right steps;
//! the landing bucket is the count of rights, indexing the multiplier table.

use super::{parse_config, EngineOutcome};
use crate::errors::{CoreError, CoreResult};
use crate::models::Outcome;
use crate::money;
use rand::{Rng, RngCore};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;

fn default_rows() -> u32 {
    8
}

fn default_bucket_multipliers() -> Vec<f64> {
    vec![5.0, 2.0, 1.0, 0.5, 0.2, 0.5, 1.0, 2.0, 5.0]
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlinkoConfig {
    #[serde(default = "default_rows")]
    pub rows: u32,
    #[serde(default = "default_bucket_multipliers")]
    pub bucket_multipliers: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct PlinkoEngine {
    config: PlinkoConfig,
}

impl PlinkoEngine {
    pub fn from_config(config: &serde_json::Value) -> CoreResult<Self> {
        let config: PlinkoConfig = parse_config("plinko", config)?;
        // A ball over `rows` pegs can land in rows + 1 buckets.
        if config.bucket_multipliers.len() != config.rows as usize + 1 {
            return Err(CoreError::Validation(format!(
                "plinko needs {} bucket multipliers for {} rows, got {}",
                config.rows + 1,
                config.rows,
                config.bucket_multipliers.len()
            )));
        }
        Ok(Self { config })
    }

    /// Pure settlement for a known path (0 = left, 1 = right).
    pub fn settle(&self, stake: Decimal, path: &[u8]) -> CoreResult<EngineOutcome> {
        if path.len() != self.config.rows as usize {
            return Err(CoreError::Validation(format!(
                "plinko path has {} steps, board has {} rows",
                path.len(),
                self.config.rows
            )));
        }
        let bucket = path.iter().filter(|&&step| step == 1).count();
        let multiplier = self.config.bucket_multipliers[bucket];
        let win_amount = money::mul_f64(stake, multiplier)?;

        Ok(EngineOutcome {
            outcome: if multiplier >= 1.0 {
                Outcome::Win
            } else {
                Outcome::Lose
            },
            win_amount,
            result_data: json!({
                "path": path,
                "bucket": bucket,
            }),
        })
    }

    pub fn run(&self, stake: Decimal, rng: &mut dyn RngCore) -> CoreResult<EngineOutcome> {
        let path: Vec<u8> = (0..self.config.rows)
            .map(|_| rng.gen_range(0..=1u8))
            .collect();
        self.settle(stake, &path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn engine() -> PlinkoEngine {
        PlinkoEngine::from_config(&json!({})).unwrap()
    }

    #[test]
    fn test_edge_bucket_pays_top_multiplier() {
        let outcome = engine().settle(dec!(10), &[1; 8]).unwrap();
        assert_eq!(outcome.result_data["bucket"], 8);
        assert_eq!(outcome.win_amount, dec!(50.00));
        assert_eq!(outcome.outcome, Outcome::Win);
    }

    #[test]
    fn test_center_bucket_loses() {
        let outcome = engine().settle(dec!(10), &[1, 1, 1, 1, 0, 0, 0, 0]).unwrap();
        assert_eq!(outcome.result_data["bucket"], 4);
        assert_eq!(outcome.win_amount, dec!(2.00));
        assert_eq!(outcome.outcome, Outcome::Lose);
    }

    #[test]
    fn test_bucket_count_must_match_rows() {
        let err = PlinkoEngine::from_config(&json!({
            "rows": 8,
            "bucket_multipliers": [5.0, 2.0, 0.5, 0.2, 0.2, 0.5, 2.0, 5.0],
        }))
        .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn test_path_length_must_match_rows() {
        let err = engine().settle(dec!(10), &[1; 12]).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        let err = engine().settle(dec!(10), &[]).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn test_run_lands_in_valid_bucket() {
        let e = engine();
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            let outcome = e.run(dec!(1), &mut rng).unwrap();
            let bucket = outcome.result_data["bucket"].as_u64().unwrap();
            assert!(bucket <= 8);
        }
    }
}
