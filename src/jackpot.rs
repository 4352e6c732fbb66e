//! Jackpot pools: contribution splitting and winner draws.
//!
//! Pools only grow between wins. A progressive pool skims a configured share
//! of every opted-in stake; the wallet is still debited the full stake, the
//! game just settles on the remainder.
//!
//! Lease order is wallet before jackpot everywhere a transaction needs both.
//! The play pipeline holds the CASH wallet lease when it skims the pool, so
//! the payout paths here must not take the jackpot lease first.

use crate::errors::{CoreError, CoreResult, Entity};
use crate::models::{
    Jackpot, JackpotContribution, JackpotStatus, JackpotType, JackpotWin, ReferenceType,
    ResetCycle, TransactionCode, WalletType,
};
use crate::money;
use crate::store::{LeaseKey, Store, Txn};
use crate::wallet::{self, Reference};
use chrono::{DateTime, Utc};
use rand::{Rng, RngCore};
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

/// Pool creation payload.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct CreateJackpot {
    pub tenant_id: Uuid,
    pub name: String,
    pub jackpot_type: JackpotType,
    pub seed_amount: Decimal,
    #[serde(default)]
    pub contribution_percentage: Decimal,
    pub reset_cycle: ResetCycle,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
}

pub fn create_jackpot(store: &Store, payload: CreateJackpot) -> CoreResult<Jackpot> {
    if payload.seed_amount < Decimal::ZERO {
        return Err(CoreError::Validation(
            "seed amount must not be negative".to_string(),
        ));
    }
    if payload.contribution_percentage < Decimal::ZERO
        || payload.contribution_percentage > Decimal::ONE_HUNDRED
    {
        return Err(CoreError::Validation(format!(
            "contribution percentage {} out of range",
            payload.contribution_percentage
        )));
    }

    let jackpot = Jackpot {
        jackpot_id: Uuid::new_v4(),
        tenant_id: payload.tenant_id,
        name: payload.name,
        jackpot_type: payload.jackpot_type,
        seed_amount: payload.seed_amount,
        current_amount: payload.seed_amount,
        contribution_percentage: payload.contribution_percentage,
        reset_cycle: payload.reset_cycle,
        deadline: payload.deadline,
        status: JackpotStatus::Active,
        last_won_at: None,
    };
    let mut txn = store.begin();
    txn.insert_jackpot(jackpot.clone());
    txn.commit();
    info!(jackpot = %jackpot.jackpot_id, name = %jackpot.name, "jackpot created");
    Ok(jackpot)
}

/// Voluntary buy-in to a SPONSORED pool: debits CASH and grows the pool.
pub fn contribute_to_sponsored(
    store: &Store,
    player_id: Uuid,
    tenant_id: Uuid,
    jackpot_id: Uuid,
    amount: Decimal,
    now: DateTime<Utc>,
) -> CoreResult<Jackpot> {
    if amount <= Decimal::ZERO {
        return Err(CoreError::Validation(format!(
            "contribution {} must be positive",
            amount
        )));
    }

    let mut txn = store.begin();
    let jackpot = txn
        .jackpot(jackpot_id)
        .filter(|j| j.tenant_id == tenant_id)
        .ok_or(CoreError::NotFound(Entity::Jackpot))?;
    if jackpot.jackpot_type != JackpotType::Sponsored {
        return Err(CoreError::Validation(format!(
            "jackpot {} does not accept direct contributions",
            jackpot.name
        )));
    }
    if jackpot.status != JackpotStatus::Active {
        return Err(CoreError::Validation(format!(
            "jackpot {} is not active",
            jackpot.name
        )));
    }
    if let Some(deadline) = jackpot.deadline {
        if now > deadline {
            return Err(CoreError::Validation(format!(
                "jackpot {} contribution deadline has passed",
                jackpot.name
            )));
        }
    }

    let cash = wallet::get_wallet(&mut txn, player_id, WalletType::Cash, tenant_id)?;
    wallet::apply_transaction(
        &mut txn,
        cash.wallet_id,
        amount,
        TransactionCode::JackpotContribution,
        Reference::new(ReferenceType::Jackpot, jackpot_id),
        now,
    )?;

    txn.lease(LeaseKey::Jackpot(jackpot_id));
    let updated = {
        let row = txn
            .jackpot_mut(jackpot_id)
            .ok_or(CoreError::NotFound(Entity::Jackpot))?;
        // The pre-lease row may be stale; a draw could have closed the pool.
        if row.status != JackpotStatus::Active {
            return Err(CoreError::Validation(format!(
                "jackpot {} is not active",
                row.name
            )));
        }
        row.current_amount += amount;
        row.clone()
    };
    txn.append_contribution(JackpotContribution {
        contribution_id: Uuid::new_v4(),
        jackpot_id,
        player_id,
        bet_ref: None,
        amount,
        contributed_at: now,
    });
    txn.commit();
    Ok(updated)
}

/// Result of splitting a stake against the tenant's progressive pool.
#[derive(Debug, Clone, Copy)]
pub struct ProgressiveSplit {
    /// Stake the game settles on.
    pub game_stake: Decimal,
    pub contribution: Decimal,
    pub jackpot_id: Option<Uuid>,
}

/// Skim the progressive share off a stake. No active PROGRESSIVE pool for
/// the tenant means the stake passes through unchanged. At most one such
/// pool exists per tenant.
pub fn process_progressive_bet(
    txn: &mut Txn<'_>,
    player_id: Uuid,
    tenant_id: Uuid,
    stake: Decimal,
    bet_id: Uuid,
    now: DateTime<Utc>,
) -> CoreResult<ProgressiveSplit> {
    let pool = txn
        .jackpots_for_tenant(tenant_id)
        .into_iter()
        .find(|j| j.jackpot_type == JackpotType::Progressive && j.status == JackpotStatus::Active);
    let Some(pool) = pool else {
        return Ok(ProgressiveSplit {
            game_stake: stake,
            contribution: Decimal::ZERO,
            jackpot_id: None,
        });
    };

    txn.lease(LeaseKey::Jackpot(pool.jackpot_id));
    // Re-read under the lease; the pool may have been drawn and completed
    // since the unleased find. A closed pool means no skim.
    let pool = match txn
        .jackpot(pool.jackpot_id)
        .filter(|j| j.status == JackpotStatus::Active)
    {
        Some(pool) => pool,
        None => {
            return Ok(ProgressiveSplit {
                game_stake: stake,
                contribution: Decimal::ZERO,
                jackpot_id: None,
            })
        }
    };
    let contribution = money::round2(stake * pool.contribution_percentage / Decimal::ONE_HUNDRED);
    if let Some(row) = txn.jackpot_mut(pool.jackpot_id) {
        row.current_amount += contribution;
    }
    txn.append_contribution(JackpotContribution {
        contribution_id: Uuid::new_v4(),
        jackpot_id: pool.jackpot_id,
        player_id,
        bet_ref: Some(bet_id),
        amount: contribution,
        contributed_at: now,
    });
    Ok(ProgressiveSplit {
        game_stake: stake - contribution,
        contribution,
        jackpot_id: Some(pool.jackpot_id),
    })
}

/// Draw and pay a winner.
///
/// FIXED pools draw uniformly over players holding an active wallet for the
/// tenant; PROGRESSIVE and SPONSORED pools draw over distinct contributors.
/// A recurring FIXED pool re-arms at its seed; everything else completes.
pub fn draw_winner(
    store: &Store,
    tenant_id: Uuid,
    jackpot_id: Uuid,
    rng: &mut dyn RngCore,
    now: DateTime<Utc>,
) -> CoreResult<JackpotWin> {
    let mut txn = store.begin();
    let jackpot = txn
        .jackpot(jackpot_id)
        .filter(|j| j.tenant_id == tenant_id)
        .ok_or(CoreError::NotFound(Entity::Jackpot))?;
    if jackpot.status != JackpotStatus::Active {
        return Err(CoreError::Validation(format!(
            "jackpot {} is not active",
            jackpot.name
        )));
    }

    let candidates = match jackpot.jackpot_type {
        JackpotType::Fixed => txn.active_players(tenant_id),
        JackpotType::Progressive | JackpotType::Sponsored => txn.contributors(jackpot_id),
    };
    if candidates.is_empty() {
        return Err(CoreError::NotFound(Entity::Player));
    }
    let winner = candidates[rng.gen_range(0..candidates.len())];

    // Winner's wallet first, then the pool, matching the pipeline's order.
    let cash = wallet::get_wallet(&mut txn, winner, WalletType::Cash, tenant_id)?;
    txn.lease(LeaseKey::Jackpot(jackpot_id));
    let jackpot = txn
        .jackpot(jackpot_id)
        .ok_or(CoreError::NotFound(Entity::Jackpot))?;
    if jackpot.status != JackpotStatus::Active {
        return Err(CoreError::Validation(format!(
            "jackpot {} is not active",
            jackpot.name
        )));
    }
    let prize = jackpot.current_amount;

    let win = JackpotWin {
        win_id: Uuid::new_v4(),
        jackpot_id,
        player_id: winner,
        win_amount: prize,
        won_at: now,
    };
    wallet::apply_transaction(
        &mut txn,
        cash.wallet_id,
        prize,
        TransactionCode::JackpotPayout,
        Reference::new(ReferenceType::JackpotWin, win.win_id),
        now,
    )?;
    txn.append_win(win.clone());

    {
        let row = txn
            .jackpot_mut(jackpot_id)
            .ok_or(CoreError::NotFound(Entity::Jackpot))?;
        row.last_won_at = Some(now);
        let one_shot = row.jackpot_type != JackpotType::Fixed
            || row.reset_cycle == ResetCycle::Never;
        if one_shot {
            row.status = JackpotStatus::Completed;
            row.current_amount = Decimal::ZERO;
        } else {
            row.current_amount = row.seed_amount;
        }
    }
    txn.commit();
    info!(
        jackpot = %jackpot_id,
        winner = %winner,
        prize = %prize,
        "jackpot won"
    );
    Ok(win)
}
