//! Responsible-gaming limiter.
//!
//! Limit rows are keyed by (player, tenant, type, period). Reductions take
//! effect immediately; increases sit in PENDING_INCREASE for a 24 hour
//! cooldown and are promoted lazily by a sweep that runs before every read
//! or usage update. Callers pass `now` explicitly so the cooldown and period
//! rollover are testable.

use crate::errors::{CoreError, CoreResult, Entity};
use crate::models::{LimitPeriod, LimitStatus, LimitType, PlayerLimit};
use crate::store::{LeaseKey, Store, Txn};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, info};
use uuid::Uuid;

const COOLDOWN_HOURS: i64 = 24;
const SESSION_CAP_MINUTES: Decimal = dec!(180);

const PERIODS: [LimitPeriod; 3] = [
    LimitPeriod::Daily,
    LimitPeriod::Weekly,
    LimitPeriod::Monthly,
];

/// Outcome of a limit pre-check. `limit_value`/`remaining` are `None` when
/// the player has no active limit of the requested type (unlimited).
#[derive(Debug, Clone, Copy)]
pub struct LimitCheck {
    pub within_limit: bool,
    pub current_usage: Decimal,
    pub limit_value: Option<Decimal>,
    pub remaining: Option<Decimal>,
}

/// One row of the player-facing limits listing.
#[derive(Debug, Clone, serde::Serialize)]
pub struct LimitView {
    pub limit_type: LimitType,
    pub period: LimitPeriod,
    pub limit_value: Decimal,
    pub current_usage: Decimal,
    pub remaining: Decimal,
    pub status: LimitStatus,
    /// Seconds until a PENDING_INCREASE row activates.
    pub pending_activation_secs: Option<i64>,
}

fn lease_key(player_id: Uuid, tenant_id: Uuid, lt: LimitType, period: LimitPeriod) -> LeaseKey {
    LeaseKey::Limit(player_id, tenant_id, lt, period)
}

fn rows_for_key(
    txn: &Txn<'_>,
    player_id: Uuid,
    tenant_id: Uuid,
    lt: LimitType,
    period: LimitPeriod,
) -> Vec<PlayerLimit> {
    txn.limits_for_player(player_id, tenant_id)
        .into_iter()
        .filter(|l| l.limit_type == lt && l.period == period)
        .collect()
}

/// Reset usage when the row's period has lapsed.
fn rollover(limit: &mut PlayerLimit, now: DateTime<Utc>) {
    if let Some(start) = limit.period_start {
        if now >= limit.period.end_from(start) {
            limit.period_start = Some(now);
            limit.current_usage = Decimal::ZERO;
            limit.updated_at = now;
        }
    }
}

/// Promote a due PENDING_INCREASE row for the key: the prior ACTIVE row
/// expires, the pending row becomes ACTIVE with a fresh period.
pub fn sweep_key(
    txn: &mut Txn<'_>,
    player_id: Uuid,
    tenant_id: Uuid,
    lt: LimitType,
    period: LimitPeriod,
    now: DateTime<Utc>,
) {
    txn.lease(lease_key(player_id, tenant_id, lt, period));
    let rows = rows_for_key(txn, player_id, tenant_id, lt, period);
    let due = rows
        .iter()
        .find(|l| l.status == LimitStatus::PendingIncrease && l.effective_at <= now)
        .map(|l| l.limit_id);
    let Some(pending_id) = due else {
        return;
    };
    if let Some(active_id) = rows
        .iter()
        .find(|l| l.status == LimitStatus::Active)
        .map(|l| l.limit_id)
    {
        if let Some(active) = txn.limit_mut(active_id) {
            active.status = LimitStatus::Expired;
            active.updated_at = now;
        }
    }
    if let Some(pending) = txn.limit_mut(pending_id) {
        pending.status = LimitStatus::Active;
        pending.period_start = Some(now);
        pending.current_usage = Decimal::ZERO;
        pending.updated_at = now;
        info!(
            player = %player_id,
            limit_type = %lt,
            value = %pending.limit_value,
            "pending limit increase activated"
        );
    }
}

/// Create or change a self-imposed limit.
///
/// First create activates immediately. A reduction applies in place with
/// usage and period reset. An increase replaces any earlier pending increase
/// and activates after the cooldown. SESSION limits are minutes and may not
/// exceed 180; re-submitting the current value is a no-op.
pub fn set_limit(
    store: &Store,
    player_id: Uuid,
    tenant_id: Uuid,
    lt: LimitType,
    period: LimitPeriod,
    value: Decimal,
    now: DateTime<Utc>,
) -> CoreResult<PlayerLimit> {
    if value <= Decimal::ZERO {
        return Err(CoreError::Validation(format!(
            "limit value {} must be positive",
            value
        )));
    }
    if lt == LimitType::Session && value > SESSION_CAP_MINUTES {
        return Err(CoreError::Validation(format!(
            "session limit cannot exceed {} minutes",
            SESSION_CAP_MINUTES
        )));
    }

    let mut txn = store.begin();
    txn.lease(lease_key(player_id, tenant_id, lt, period));
    sweep_key(&mut txn, player_id, tenant_id, lt, period, now);

    let rows = rows_for_key(&txn, player_id, tenant_id, lt, period);
    let active = rows.iter().find(|l| l.status == LimitStatus::Active).cloned();

    let row = match active {
        None => {
            let row = PlayerLimit {
                limit_id: Uuid::new_v4(),
                player_id,
                tenant_id,
                limit_type: lt,
                period,
                limit_value: value,
                current_usage: Decimal::ZERO,
                status: LimitStatus::Active,
                effective_at: now,
                requested_at: now,
                period_start: Some(now),
                updated_at: now,
            };
            info!(player = %player_id, limit_type = %lt, value = %value, "limit created");
            txn.insert_limit(row.clone());
            row
        }
        // Re-submitting the current value changes nothing.
        Some(active) if value == active.limit_value => active,
        Some(active) if value < active.limit_value => {
            // Reductions are immediate, regulatory rule.
            let updated = {
                let row = txn
                    .limit_mut(active.limit_id)
                    .ok_or(CoreError::NotFound(Entity::Limit))?;
                row.limit_value = value;
                row.current_usage = Decimal::ZERO;
                row.period_start = Some(now);
                row.requested_at = now;
                row.effective_at = now;
                row.updated_at = now;
                row.clone()
            };
            info!(player = %player_id, limit_type = %lt, value = %value, "limit reduced");
            updated
        }
        Some(_) => {
            // Cooldown: supersede any earlier pending increase first.
            for earlier in rows
                .iter()
                .filter(|l| l.status == LimitStatus::PendingIncrease)
            {
                if let Some(p) = txn.limit_mut(earlier.limit_id) {
                    p.status = LimitStatus::Cancelled;
                    p.updated_at = now;
                }
            }
            let row = PlayerLimit {
                limit_id: Uuid::new_v4(),
                player_id,
                tenant_id,
                limit_type: lt,
                period,
                limit_value: value,
                current_usage: Decimal::ZERO,
                status: LimitStatus::PendingIncrease,
                effective_at: now + Duration::hours(COOLDOWN_HOURS),
                requested_at: now,
                period_start: None,
                updated_at: now,
            };
            info!(
                player = %player_id,
                limit_type = %lt,
                value = %value,
                effective_at = %row.effective_at,
                "limit increase pending cooldown"
            );
            txn.insert_limit(row.clone());
            row
        }
    };

    txn.commit();
    Ok(row)
}

/// Sweep, roll over, and return the current ACTIVE row for one key.
fn active_row(
    txn: &mut Txn<'_>,
    player_id: Uuid,
    tenant_id: Uuid,
    lt: LimitType,
    period: LimitPeriod,
    now: DateTime<Utc>,
) -> Option<PlayerLimit> {
    sweep_key(txn, player_id, tenant_id, lt, period, now);
    let active = rows_for_key(txn, player_id, tenant_id, lt, period)
        .into_iter()
        .find(|l| l.status == LimitStatus::Active)?;
    let row = txn.limit_mut(active.limit_id)?;
    rollover(row, now);
    Some(row.clone())
}

fn check_against(row: Option<PlayerLimit>, amount: Decimal) -> LimitCheck {
    match row {
        None => LimitCheck {
            within_limit: true,
            current_usage: Decimal::ZERO,
            limit_value: None,
            remaining: None,
        },
        Some(row) => {
            let remaining = (row.limit_value - row.current_usage).max(Decimal::ZERO);
            LimitCheck {
                within_limit: amount <= remaining,
                current_usage: row.current_usage,
                limit_value: Some(row.limit_value),
                remaining: Some(remaining),
            }
        }
    }
}

/// Would `amount` fit under the active limit of this type and period? Reads
/// through a transaction so sweep and rollover effects persist.
pub fn check_limit(
    store: &Store,
    player_id: Uuid,
    tenant_id: Uuid,
    lt: LimitType,
    period: LimitPeriod,
    amount: Decimal,
    now: DateTime<Utc>,
) -> LimitCheck {
    let mut txn = store.begin();
    let row = active_row(&mut txn, player_id, tenant_id, lt, period, now);
    txn.commit();
    check_against(row, amount)
}

/// Pre-check for the play pipeline: `amount` must fit under every active
/// limit of this type, whatever its period. Reports the tightest one.
pub fn check_limit_in(
    txn: &mut Txn<'_>,
    player_id: Uuid,
    tenant_id: Uuid,
    lt: LimitType,
    amount: Decimal,
    now: DateTime<Utc>,
) -> LimitCheck {
    let mut tightest: Option<PlayerLimit> = None;
    for period in PERIODS {
        let Some(row) = active_row(txn, player_id, tenant_id, lt, period, now) else {
            continue;
        };
        let remaining = row.limit_value - row.current_usage;
        let replace = match &tightest {
            None => true,
            Some(t) => remaining < t.limit_value - t.current_usage,
        };
        if replace {
            tightest = Some(row);
        }
    }
    check_against(tightest, amount)
}

/// Record usage against every active limit of this type. With `enforce` set,
/// an overflow fails with `LimitExceeded` and nothing is recorded; without
/// it usage accumulates past the cap (session close records elapsed time
/// even when it breaches).
pub fn update_usage(
    txn: &mut Txn<'_>,
    player_id: Uuid,
    tenant_id: Uuid,
    lt: LimitType,
    amount: Decimal,
    now: DateTime<Utc>,
    enforce: bool,
) -> CoreResult<()> {
    for period in PERIODS {
        sweep_key(txn, player_id, tenant_id, lt, period, now);
        let active = rows_for_key(txn, player_id, tenant_id, lt, period)
            .into_iter()
            .find(|l| l.status == LimitStatus::Active);
        let Some(active) = active else { continue };
        if let Some(row) = txn.limit_mut(active.limit_id) {
            rollover(row, now);
            if enforce && row.current_usage + amount > row.limit_value {
                let current_usage = row.current_usage;
                let remaining = (row.limit_value - row.current_usage).max(Decimal::ZERO);
                return Err(CoreError::LimitExceeded {
                    limit_type: lt,
                    current_usage,
                    remaining,
                });
            }
            row.current_usage += amount;
            row.updated_at = now;
            debug!(
                player = %player_id,
                limit_type = %lt,
                usage = %row.current_usage,
                "limit usage updated"
            );
        }
    }
    Ok(())
}

/// Player-facing listing: active rows with remaining headroom plus pending
/// increases with seconds until activation.
pub fn player_limits(
    store: &Store,
    player_id: Uuid,
    tenant_id: Uuid,
    now: DateTime<Utc>,
) -> Vec<LimitView> {
    let mut txn = store.begin();
    let keys: Vec<(LimitType, LimitPeriod)> = txn
        .limits_for_player(player_id, tenant_id)
        .iter()
        .map(|l| (l.limit_type, l.period))
        .collect();
    for (lt, period) in keys {
        sweep_key(&mut txn, player_id, tenant_id, lt, period, now);
    }

    let mut views: Vec<LimitView> = txn
        .limits_for_player(player_id, tenant_id)
        .into_iter()
        .filter(|l| {
            l.status == LimitStatus::Active || l.status == LimitStatus::PendingIncrease
        })
        .map(|l| LimitView {
            limit_type: l.limit_type,
            period: l.period,
            limit_value: l.limit_value,
            current_usage: l.current_usage,
            remaining: (l.limit_value - l.current_usage).max(Decimal::ZERO),
            status: l.status,
            pending_activation_secs: (l.status == LimitStatus::PendingIncrease)
                .then(|| (l.effective_at - now).num_seconds().max(0)),
        })
        .collect();
    views.sort_by_key(|v| (v.limit_type as u8, v.period as u8));
    txn.commit();
    views
}

/// Withdraw an increase still inside its cooldown.
pub fn cancel_pending_increase(
    store: &Store,
    player_id: Uuid,
    tenant_id: Uuid,
    lt: LimitType,
    period: LimitPeriod,
    now: DateTime<Utc>,
) -> CoreResult<()> {
    let mut txn = store.begin();
    txn.lease(lease_key(player_id, tenant_id, lt, period));
    let pending = rows_for_key(&txn, player_id, tenant_id, lt, period)
        .into_iter()
        .find(|l| l.status == LimitStatus::PendingIncrease)
        .ok_or(CoreError::NotFound(Entity::Limit))?;
    if let Some(row) = txn.limit_mut(pending.limit_id) {
        row.status = LimitStatus::Cancelled;
        row.updated_at = now;
    }
    txn.commit();
    Ok(())
}

/// Active limits cannot be removed, regulatory rule. Only a pending
/// increase can be withdrawn.
pub fn remove_limit(
    store: &Store,
    player_id: Uuid,
    tenant_id: Uuid,
    lt: LimitType,
    period: LimitPeriod,
    now: DateTime<Utc>,
) -> CoreResult<()> {
    {
        let txn = store.begin();
        if rows_for_key(&txn, player_id, tenant_id, lt, period)
            .iter()
            .any(|l| l.status == LimitStatus::Active)
        {
            return Err(CoreError::Validation(format!(
                "{} limit is active and cannot be removed",
                lt
            )));
        }
    }
    cancel_pending_increase(store, player_id, tenant_id, lt, period, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_check_limit_reports_remaining() {
        let store = Store::new();
        let player = Uuid::new_v4();
        let tenant = Uuid::new_v4();
        let now = t0();

        set_limit(
            &store,
            player,
            tenant,
            LimitType::Wager,
            LimitPeriod::Daily,
            dec!(100),
            now,
        )
        .unwrap();

        let mut txn = store.begin();
        update_usage(&mut txn, player, tenant, LimitType::Wager, dec!(60), now, true).unwrap();
        txn.commit();

        let check = check_limit(&store, player, tenant, LimitType::Wager, LimitPeriod::Daily, dec!(50), now);
        assert!(!check.within_limit);
        assert_eq!(check.current_usage, dec!(60));
        assert_eq!(check.remaining, Some(dec!(40)));

        let smaller = check_limit(&store, player, tenant, LimitType::Wager, LimitPeriod::Daily, dec!(40), now);
        assert!(smaller.within_limit);
    }

    #[test]
    fn test_no_limit_means_unlimited() {
        let store = Store::new();
        let check = check_limit(
            &store,
            Uuid::new_v4(),
            Uuid::new_v4(),
            LimitType::Loss,
            LimitPeriod::Daily,
            dec!(1000000),
            t0(),
        );
        assert!(check.within_limit);
        assert_eq!(check.remaining, None);
        assert_eq!(check.limit_value, None);
    }

    #[test]
    fn test_reduction_applies_immediately() {
        let store = Store::new();
        let player = Uuid::new_v4();
        let tenant = Uuid::new_v4();
        let now = t0();

        set_limit(&store, player, tenant, LimitType::Loss, LimitPeriod::Daily, dec!(200), now)
            .unwrap();
        let reduced =
            set_limit(&store, player, tenant, LimitType::Loss, LimitPeriod::Daily, dec!(50), now)
                .unwrap();

        assert_eq!(reduced.status, LimitStatus::Active);
        assert_eq!(reduced.limit_value, dec!(50));

        let check = check_limit(&store, player, tenant, LimitType::Loss, LimitPeriod::Daily, dec!(60), now);
        assert!(!check.within_limit);
    }

    #[test]
    fn test_increase_waits_out_cooldown() {
        let store = Store::new();
        let player = Uuid::new_v4();
        let tenant = Uuid::new_v4();
        let now = t0();

        set_limit(&store, player, tenant, LimitType::Wager, LimitPeriod::Daily, dec!(100), now)
            .unwrap();
        let pending =
            set_limit(&store, player, tenant, LimitType::Wager, LimitPeriod::Daily, dec!(500), now)
                .unwrap();
        assert_eq!(pending.status, LimitStatus::PendingIncrease);

        // Still the old cap inside the cooldown.
        let before = check_limit(
            &store,
            player,
            tenant,
            LimitType::Wager,
            LimitPeriod::Daily,
            dec!(300),
            now + Duration::hours(23),
        );
        assert!(!before.within_limit);
        assert_eq!(before.limit_value, Some(dec!(100)));

        // Promoted after 24 hours.
        let after = check_limit(
            &store,
            player,
            tenant,
            LimitType::Wager,
            LimitPeriod::Daily,
            dec!(300),
            now + Duration::hours(25),
        );
        assert!(after.within_limit);
        assert_eq!(after.limit_value, Some(dec!(500)));
        assert_eq!(after.current_usage, Decimal::ZERO);
    }

    #[test]
    fn test_second_increase_supersedes_first() {
        let store = Store::new();
        let player = Uuid::new_v4();
        let tenant = Uuid::new_v4();
        let now = t0();

        set_limit(&store, player, tenant, LimitType::Wager, LimitPeriod::Daily, dec!(100), now)
            .unwrap();
        set_limit(&store, player, tenant, LimitType::Wager, LimitPeriod::Daily, dec!(500), now)
            .unwrap();
        set_limit(&store, player, tenant, LimitType::Wager, LimitPeriod::Daily, dec!(300), now)
            .unwrap();

        let after = check_limit(
            &store,
            player,
            tenant,
            LimitType::Wager,
            LimitPeriod::Daily,
            dec!(1),
            now + Duration::hours(25),
        );
        assert_eq!(after.limit_value, Some(dec!(300)));
    }

    #[test]
    fn test_period_rollover_resets_usage() {
        let store = Store::new();
        let player = Uuid::new_v4();
        let tenant = Uuid::new_v4();
        let now = t0();

        set_limit(&store, player, tenant, LimitType::Wager, LimitPeriod::Daily, dec!(100), now)
            .unwrap();
        let mut txn = store.begin();
        update_usage(&mut txn, player, tenant, LimitType::Wager, dec!(90), now, true).unwrap();
        txn.commit();

        let next_day = check_limit(
            &store,
            player,
            tenant,
            LimitType::Wager,
            LimitPeriod::Daily,
            dec!(90),
            now + Duration::hours(25),
        );
        assert!(next_day.within_limit);
        assert_eq!(next_day.current_usage, Decimal::ZERO);
    }

    #[test]
    fn test_update_usage_enforces_cap() {
        let store = Store::new();
        let player = Uuid::new_v4();
        let tenant = Uuid::new_v4();
        let now = t0();

        set_limit(&store, player, tenant, LimitType::Loss, LimitPeriod::Daily, dec!(100), now)
            .unwrap();

        let mut txn = store.begin();
        let err = update_usage(&mut txn, player, tenant, LimitType::Loss, dec!(150), now, true)
            .unwrap_err();
        match err {
            CoreError::LimitExceeded {
                limit_type,
                current_usage,
                remaining,
            } => {
                assert_eq!(limit_type, LimitType::Loss);
                assert_eq!(current_usage, Decimal::ZERO);
                assert_eq!(remaining, dec!(100));
            }
            other => panic!("expected LimitExceeded, got {other:?}"),
        }
    }

    #[test]
    fn test_unenforced_usage_may_overflow() {
        let store = Store::new();
        let player = Uuid::new_v4();
        let tenant = Uuid::new_v4();
        let now = t0();

        set_limit(&store, player, tenant, LimitType::Session, LimitPeriod::Daily, dec!(60), now)
            .unwrap();

        let mut txn = store.begin();
        update_usage(&mut txn, player, tenant, LimitType::Session, dec!(90), now, false).unwrap();
        txn.commit();

        let check = check_limit(&store, player, tenant, LimitType::Session, LimitPeriod::Daily, dec!(1), now);
        assert!(!check.within_limit);
        assert_eq!(check.current_usage, dec!(90));
        assert_eq!(check.remaining, Some(dec!(0)));
    }

    #[test]
    fn test_session_limit_over_cap_rejected() {
        let store = Store::new();
        let player = Uuid::new_v4();
        let tenant = Uuid::new_v4();
        let err = set_limit(
            &store,
            player,
            tenant,
            LimitType::Session,
            LimitPeriod::Daily,
            dec!(600),
            t0(),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        // Nothing was created.
        assert!(player_limits(&store, player, tenant, t0()).is_empty());

        let row = set_limit(
            &store,
            player,
            tenant,
            LimitType::Session,
            LimitPeriod::Daily,
            dec!(180),
            t0(),
        )
        .unwrap();
        assert_eq!(row.limit_value, dec!(180));
    }

    #[test]
    fn test_resubmitting_same_value_is_a_noop() {
        let store = Store::new();
        let player = Uuid::new_v4();
        let tenant = Uuid::new_v4();
        let now = t0();

        let first =
            set_limit(&store, player, tenant, LimitType::Wager, LimitPeriod::Daily, dec!(100), now)
                .unwrap();
        let mut txn = store.begin();
        update_usage(&mut txn, player, tenant, LimitType::Wager, dec!(30), now, true).unwrap();
        txn.commit();

        let again =
            set_limit(&store, player, tenant, LimitType::Wager, LimitPeriod::Daily, dec!(100), now)
                .unwrap();
        assert_eq!(again.limit_id, first.limit_id);
        // Usage is untouched.
        let check = check_limit(&store, player, tenant, LimitType::Wager, LimitPeriod::Daily, dec!(1), now);
        assert_eq!(check.current_usage, dec!(30));
    }

    #[test]
    fn test_active_limit_cannot_be_removed() {
        let store = Store::new();
        let player = Uuid::new_v4();
        let tenant = Uuid::new_v4();
        let now = t0();

        set_limit(&store, player, tenant, LimitType::Deposit, LimitPeriod::Weekly, dec!(100), now)
            .unwrap();
        let err =
            remove_limit(&store, player, tenant, LimitType::Deposit, LimitPeriod::Weekly, now)
                .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn test_cancel_pending_increase() {
        let store = Store::new();
        let player = Uuid::new_v4();
        let tenant = Uuid::new_v4();
        let now = t0();

        set_limit(&store, player, tenant, LimitType::Wager, LimitPeriod::Daily, dec!(100), now)
            .unwrap();
        set_limit(&store, player, tenant, LimitType::Wager, LimitPeriod::Daily, dec!(500), now)
            .unwrap();
        cancel_pending_increase(&store, player, tenant, LimitType::Wager, LimitPeriod::Daily, now)
            .unwrap();

        // Nothing promotes after the cooldown.
        let after = check_limit(
            &store,
            player,
            tenant,
            LimitType::Wager,
            LimitPeriod::Daily,
            dec!(1),
            now + Duration::hours(25),
        );
        assert_eq!(after.limit_value, Some(dec!(100)));

        let views = player_limits(&store, player, tenant, now);
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].status, LimitStatus::Active);
    }
}
