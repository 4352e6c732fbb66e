//! Bonus campaigns and wagering progress.
//!
//! A granted bonus credits the BONUS wallet and opens a `BonusUsage` that
//! advances with every game stake. Once wagering completes the usage turns
//! eligible and the player can convert the bonus balance into cash.

use crate::errors::{CoreError, CoreResult, Entity};
use crate::models::{
    Bonus, BonusStatus, BonusType, BonusUsage, ReferenceType, TransactionCode, WalletType,
};
use crate::money;
use crate::store::{Store, Txn};
use crate::wallet::{self, Reference};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

/// Campaign creation payload.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct CreateBonus {
    pub tenant_id: Uuid,
    pub name: String,
    pub bonus_type: BonusType,
    #[serde(default)]
    pub amount: Decimal,
    #[serde(default)]
    pub percentage: Decimal,
    #[serde(default)]
    pub max_bonus: Decimal,
    pub wagering_multiplier: Decimal,
    #[serde(default)]
    pub min_deposit: Decimal,
    pub max_uses_per_player: u32,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
}

/// Register a campaign. Validation only, no wallet effect.
pub fn create_bonus(store: &Store, payload: CreateBonus) -> CoreResult<Bonus> {
    if payload.valid_from >= payload.valid_to {
        return Err(CoreError::Validation(
            "bonus validity window is empty".to_string(),
        ));
    }
    if payload.wagering_multiplier < Decimal::ZERO {
        return Err(CoreError::Validation(
            "wagering multiplier must not be negative".to_string(),
        ));
    }
    match payload.bonus_type {
        BonusType::Fixed if payload.amount <= Decimal::ZERO => {
            return Err(CoreError::Validation(
                "fixed bonus amount must be positive".to_string(),
            ));
        }
        BonusType::Deposit if payload.percentage <= Decimal::ZERO => {
            return Err(CoreError::Validation(
                "deposit bonus percentage must be positive".to_string(),
            ));
        }
        _ => {}
    }

    let bonus = Bonus {
        bonus_id: Uuid::new_v4(),
        tenant_id: payload.tenant_id,
        name: payload.name,
        bonus_type: payload.bonus_type,
        amount: payload.amount,
        percentage: payload.percentage,
        max_bonus: payload.max_bonus,
        wagering_multiplier: payload.wagering_multiplier,
        min_deposit: payload.min_deposit,
        max_uses_per_player: payload.max_uses_per_player,
        valid_from: payload.valid_from,
        valid_to: payload.valid_to,
        active: true,
    };
    let mut txn = store.begin();
    txn.insert_bonus(bonus.clone());
    txn.commit();
    info!(bonus = %bonus.bonus_id, name = %bonus.name, "bonus campaign created");
    Ok(bonus)
}

/// Credit this campaign would grant, given an optional qualifying deposit.
fn grant_amount(bonus: &Bonus, deposit: Option<Decimal>) -> Option<Decimal> {
    match bonus.bonus_type {
        BonusType::Fixed => Some(bonus.amount),
        BonusType::Deposit => {
            let deposit = deposit?;
            if deposit < bonus.min_deposit {
                return None;
            }
            let raw = deposit * bonus.percentage / Decimal::ONE_HUNDRED;
            Some(money::round2(raw.min(bonus.max_bonus)))
        }
    }
}

fn campaign_open(bonus: &Bonus, now: DateTime<Utc>) -> bool {
    bonus.active && bonus.valid_from <= now && now <= bonus.valid_to
}

/// Best open campaign the player still qualifies for, by grant size.
pub fn eligible_bonus(
    txn: &Txn<'_>,
    player_id: Uuid,
    tenant_id: Uuid,
    deposit: Option<Decimal>,
    now: DateTime<Utc>,
) -> Option<Bonus> {
    txn.bonuses_for_tenant(tenant_id)
        .into_iter()
        .filter(|b| campaign_open(b, now))
        .filter(|b| txn.usage_count(b.bonus_id, player_id) < b.max_uses_per_player as usize)
        .filter_map(|b| grant_amount(&b, deposit).map(|amount| (amount, b)))
        .max_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, b)| b)
}

/// Grant a campaign to a player: credit the BONUS wallet and open the
/// wagering tracker.
pub fn grant_bonus(
    store: &Store,
    player_id: Uuid,
    tenant_id: Uuid,
    bonus_id: Uuid,
    deposit: Option<Decimal>,
    now: DateTime<Utc>,
) -> CoreResult<BonusUsage> {
    let mut txn = store.begin();
    let bonus = txn
        .bonus(bonus_id)
        .filter(|b| b.tenant_id == tenant_id)
        .ok_or(CoreError::NotFound(Entity::Bonus))?;
    if !campaign_open(&bonus, now) {
        return Err(CoreError::Validation(format!(
            "bonus campaign {} is not open",
            bonus.name
        )));
    }
    if txn.usage_count(bonus_id, player_id) >= bonus.max_uses_per_player as usize {
        return Err(CoreError::Validation(format!(
            "bonus campaign {} already used the maximum {} times",
            bonus.name, bonus.max_uses_per_player
        )));
    }
    let amount = grant_amount(&bonus, deposit).ok_or_else(|| {
        CoreError::Validation(format!(
            "deposit below the {} minimum for campaign {}",
            bonus.min_deposit, bonus.name
        ))
    })?;
    if amount <= Decimal::ZERO {
        return Err(CoreError::Validation(
            "computed bonus amount is zero".to_string(),
        ));
    }

    let bonus_wallet = wallet::get_wallet(&mut txn, player_id, WalletType::Bonus, tenant_id)?;
    wallet::apply_transaction(
        &mut txn,
        bonus_wallet.wallet_id,
        amount,
        TransactionCode::Bonus,
        Reference::new(ReferenceType::Bonus, bonus_id),
        now,
    )?;

    let usage = BonusUsage {
        usage_id: Uuid::new_v4(),
        bonus_id,
        player_id,
        wallet_id: bonus_wallet.wallet_id,
        bonus_amount: amount,
        wagering_required: money::round2(amount * bonus.wagering_multiplier),
        wagering_completed: Decimal::ZERO,
        status: BonusStatus::Active,
        granted_at: now,
        completed_at: None,
    };
    txn.insert_bonus_usage(usage.clone());
    txn.commit();
    info!(
        player = %player_id,
        bonus = %bonus_id,
        amount = %amount,
        required = %usage.wagering_required,
        "bonus granted"
    );
    Ok(usage)
}

/// Advance every active, unexpired usage for the tenant by the full stake.
/// A usage whose campaign window has lapsed flips to expired instead.
pub fn apply_wagering(
    txn: &mut Txn<'_>,
    player_id: Uuid,
    tenant_id: Uuid,
    stake: Decimal,
    now: DateTime<Utc>,
) {
    let usages: Vec<BonusUsage> = txn
        .bonus_usages_for_player(player_id)
        .into_iter()
        .filter(|u| u.status == BonusStatus::Active)
        .collect();
    for usage in usages {
        let Some(bonus) = txn.bonus(usage.bonus_id) else {
            warn!(usage = %usage.usage_id, "usage references a missing campaign");
            continue;
        };
        if bonus.tenant_id != tenant_id {
            continue;
        }
        if let Some(row) = txn.bonus_usage_mut(usage.usage_id) {
            if bonus.valid_to < now {
                row.status = BonusStatus::Expired;
                continue;
            }
            row.wagering_completed += stake;
            if row.wagering_completed >= row.wagering_required {
                row.status = BonusStatus::Eligible;
                info!(usage = %row.usage_id, "bonus wagering requirement met");
            }
        }
    }
}

/// Move an eligible bonus balance into the CASH wallet.
///
/// A lapsed campaign fails with `Expired`, and the expiry status is
/// committed on its own even though the call fails.
pub fn convert_bonus_to_cash(
    store: &Store,
    player_id: Uuid,
    tenant_id: Uuid,
    usage_id: Uuid,
    now: DateTime<Utc>,
) -> CoreResult<Decimal> {
    let mut txn = store.begin();
    let usage = txn
        .bonus_usage(usage_id)
        .filter(|u| u.player_id == player_id)
        .ok_or(CoreError::NotFound(Entity::BonusUsage))?;
    let bonus = txn
        .bonus(usage.bonus_id)
        .filter(|b| b.tenant_id == tenant_id)
        .ok_or(CoreError::NotFound(Entity::Bonus))?;

    if usage.status != BonusStatus::Completed && bonus.valid_to < now {
        // The expiry outlives the failed conversion.
        drop(txn);
        let mut expiry = store.begin();
        if let Some(row) = expiry.bonus_usage_mut(usage_id) {
            row.status = BonusStatus::Expired;
        }
        expiry.commit();
        return Err(CoreError::Expired);
    }
    if usage.status != BonusStatus::Eligible {
        return Err(CoreError::Validation(format!(
            "bonus wagering requirement not met: {} of {}",
            usage.wagering_completed, usage.wagering_required
        )));
    }

    let bonus_wallet = wallet::get_wallet(&mut txn, player_id, WalletType::Bonus, tenant_id)?;
    if bonus_wallet.balance < usage.bonus_amount {
        return Err(CoreError::InsufficientBonusBalance {
            balance: bonus_wallet.balance,
            required: usage.bonus_amount,
        });
    }
    let cash_wallet = wallet::get_wallet(&mut txn, player_id, WalletType::Cash, tenant_id)?;

    wallet::apply_transaction(
        &mut txn,
        bonus_wallet.wallet_id,
        usage.bonus_amount,
        TransactionCode::BonusConversionDebit,
        Reference::new(ReferenceType::BonusConversion, usage_id),
        now,
    )?;
    wallet::apply_transaction(
        &mut txn,
        cash_wallet.wallet_id,
        usage.bonus_amount,
        TransactionCode::BonusConversionCredit,
        Reference::new(ReferenceType::BonusConversion, usage_id),
        now,
    )?;
    if let Some(row) = txn.bonus_usage_mut(usage_id) {
        row.status = BonusStatus::Completed;
        row.completed_at = Some(now);
    }
    txn.commit();
    info!(
        player = %player_id,
        usage = %usage_id,
        amount = %usage.bonus_amount,
        "bonus converted to cash"
    );
    Ok(usage.bonus_amount)
}
