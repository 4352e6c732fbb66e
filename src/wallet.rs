//! Wallet ledger: balance mutation through immutable, append-only rows.
//!
//! Every balance change funnels through [`apply_transaction`], which records
//! before/after balances and never commits: the caller owns the transaction
//! boundary.

use crate::errors::{CoreError, CoreResult, Entity};
use crate::models::{
    Direction, ReferenceType, TransactionCode, Wallet, WalletTransaction, WalletType,
};
use crate::store::{LeaseKey, Store, Txn};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::debug;
use uuid::Uuid;

/// What a ledger row points back at.
#[derive(Debug, Clone, Copy)]
pub struct Reference {
    pub ref_type: ReferenceType,
    pub ref_id: Uuid,
}

impl Reference {
    pub fn new(ref_type: ReferenceType, ref_id: Uuid) -> Self {
        Self { ref_type, ref_id }
    }
}

/// Resolve the wallet for (player, type, tenant) and take its exclusive
/// lease for the remainder of the transaction.
pub fn get_wallet(
    txn: &mut Txn<'_>,
    player_id: Uuid,
    wallet_type: WalletType,
    tenant_id: Uuid,
) -> CoreResult<Wallet> {
    let wallet = txn
        .find_wallet(player_id, tenant_id, wallet_type)
        .ok_or(CoreError::NotFound(Entity::Wallet))?;
    txn.lease(LeaseKey::Wallet(wallet.wallet_id));
    // Re-read under the lease: the pre-lease row may be stale.
    txn.wallet(wallet.wallet_id)
        .ok_or(CoreError::NotFound(Entity::Wallet))
}

/// Lightweight existence check on the reference target. Bonus and jackpot
/// references are exempt: they point at tables owned by their own services.
fn validate_reference(txn: &Txn<'_>, reference: Reference) -> CoreResult<()> {
    let exists = match reference.ref_type {
        ReferenceType::Bet => txn.round(reference.ref_id).is_some(),
        ReferenceType::Deposit => txn.deposit_exists(reference.ref_id),
        ReferenceType::Withdrawal | ReferenceType::WithdrawalRejection => {
            txn.withdrawal_exists(reference.ref_id)
        }
        ReferenceType::Bonus
        | ReferenceType::BonusConversion
        | ReferenceType::Jackpot
        | ReferenceType::JackpotWin => return Ok(()),
    };
    if !exists {
        return Err(CoreError::Validation(format!(
            "invalid {:?} reference {}",
            reference.ref_type, reference.ref_id
        )));
    }
    Ok(())
}

/// Apply one debit or credit and append the ledger row. The code resolves
/// to the direction; a debit larger than the balance fails with no mutation.
pub fn apply_transaction(
    txn: &mut Txn<'_>,
    wallet_id: Uuid,
    amount: Decimal,
    code: TransactionCode,
    reference: Reference,
    now: DateTime<Utc>,
) -> CoreResult<WalletTransaction> {
    if amount <= Decimal::ZERO {
        return Err(CoreError::Validation(format!(
            "transaction amount {} must be positive",
            amount
        )));
    }
    validate_reference(txn, reference)?;
    txn.lease(LeaseKey::Wallet(wallet_id));

    let (signed_amount, balance_before, balance_after) = {
        let wallet = txn
            .wallet_mut(wallet_id)
            .ok_or(CoreError::NotFound(Entity::Wallet))?;
        let balance_before = wallet.balance;
        let signed_amount = match code.direction() {
            Direction::Debit => {
                if wallet.balance < amount {
                    return Err(CoreError::InsufficientFunds {
                        balance: wallet.balance,
                        required: amount,
                    });
                }
                wallet.balance -= amount;
                -amount
            }
            Direction::Credit => {
                wallet.balance += amount;
                amount
            }
        };
        (signed_amount, balance_before, wallet.balance)
    };

    let row = WalletTransaction {
        transaction_id: Uuid::new_v4(),
        wallet_id,
        code,
        signed_amount,
        balance_before,
        balance_after,
        reference_type: reference.ref_type,
        reference_id: reference.ref_id,
        status: "success".to_string(),
        created_at: now,
    };
    debug!(
        wallet = %wallet_id,
        code = ?code,
        amount = %signed_amount,
        balance = %balance_after,
        "ledger row appended"
    );
    txn.append_wallet_transaction(row.clone());
    Ok(row)
}

/// The tenant entry point: idempotently creates the CASH and BONUS wallets
/// for a player's first visit to a tenant.
pub fn init_tenant_profile(
    store: &Store,
    player_id: Uuid,
    tenant_id: Uuid,
    currency: &str,
) -> bool {
    let mut txn = store.begin();
    if txn
        .find_wallet(player_id, tenant_id, WalletType::Cash)
        .is_some()
    {
        return false;
    }
    txn.insert_wallet(Wallet::new(player_id, tenant_id, currency, WalletType::Cash));
    txn.insert_wallet(Wallet::new(
        player_id,
        tenant_id,
        currency,
        WalletType::Bonus,
    ));
    txn.commit();
    true
}

/// Dashboard filters: by reference type, a single day, or a calendar month.
#[derive(Debug, Clone, Copy, Default)]
pub struct DashboardFilter {
    pub reference_type: Option<ReferenceType>,
    pub day: Option<NaiveDate>,
    pub month: Option<(i32, u32)>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct TransactionView {
    pub id: Uuid,
    pub amount: Decimal,
    pub reference_type: ReferenceType,
    pub status: String,
    pub balance_after: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct WalletDashboard {
    pub balance: Decimal,
    pub transactions: Vec<TransactionView>,
}

const DASHBOARD_LIMIT: usize = 50;

/// Committed CASH wallet balance plus recent transactions, newest first.
pub fn wallet_dashboard(
    store: &Store,
    player_id: Uuid,
    tenant_id: Uuid,
    filter: DashboardFilter,
) -> Option<WalletDashboard> {
    let wallet = {
        let txn = store.begin();
        txn.find_wallet(player_id, tenant_id, WalletType::Cash)?
    };

    let mut rows = store.wallet_transactions(wallet.wallet_id);
    rows.retain(|t| {
        filter
            .reference_type
            .map_or(true, |rt| t.reference_type == rt)
            && filter.day.map_or(true, |d| t.created_at.date_naive() == d)
            && filter.month.map_or(true, |(y, m)| {
                t.created_at.year() == y && t.created_at.month() == m
            })
    });
    rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    rows.truncate(DASHBOARD_LIMIT);

    Some(WalletDashboard {
        balance: wallet.balance,
        transactions: rows
            .into_iter()
            .map(|t| TransactionView {
                id: t.transaction_id,
                amount: t.signed_amount,
                reference_type: t.reference_type,
                status: t.status,
                balance_after: t.balance_after,
                created_at: t.created_at,
            })
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn seeded_wallet(store: &Store, balance: Decimal) -> (Uuid, Uuid, Uuid) {
        let player = Uuid::new_v4();
        let tenant = Uuid::new_v4();
        init_tenant_profile(store, player, tenant, "USD");
        let wallet_id = {
            let txn = store.begin();
            txn.find_wallet(player, tenant, WalletType::Cash)
                .unwrap()
                .wallet_id
        };
        if balance > Decimal::ZERO {
            let mut txn = store.begin();
            let deposit_id = Uuid::new_v4();
            txn.register_deposit(deposit_id);
            apply_transaction(
                &mut txn,
                wallet_id,
                balance,
                TransactionCode::Deposit,
                Reference::new(ReferenceType::Deposit, deposit_id),
                Utc::now(),
            )
            .unwrap();
            txn.commit();
        }
        (player, tenant, wallet_id)
    }

    #[test]
    fn test_init_tenant_profile_is_idempotent() {
        let store = Store::new();
        let player = Uuid::new_v4();
        let tenant = Uuid::new_v4();

        assert!(init_tenant_profile(&store, player, tenant, "USD"));
        assert!(!init_tenant_profile(&store, player, tenant, "USD"));

        let txn = store.begin();
        assert!(txn.find_wallet(player, tenant, WalletType::Cash).is_some());
        assert!(txn.find_wallet(player, tenant, WalletType::Bonus).is_some());
    }

    #[test]
    fn test_debit_below_balance_fails_without_mutation() {
        let store = Store::new();
        let (_, _, wallet_id) = seeded_wallet(&store, dec!(5));

        let mut txn = store.begin();
        let err = apply_transaction(
            &mut txn,
            wallet_id,
            dec!(10),
            TransactionCode::BonusConversionDebit,
            Reference::new(ReferenceType::BonusConversion, Uuid::new_v4()),
            Utc::now(),
        )
        .unwrap_err();
        drop(txn);

        assert!(matches!(err, CoreError::InsufficientFunds { .. }));
        assert_eq!(store.wallet(wallet_id).unwrap().balance, dec!(5));
        assert_eq!(store.wallet_transactions(wallet_id).len(), 1);
    }

    #[test]
    fn test_ledger_rows_chain_before_after() {
        let store = Store::new();
        let (_, _, wallet_id) = seeded_wallet(&store, dec!(100));

        let mut txn = store.begin();
        apply_transaction(
            &mut txn,
            wallet_id,
            dec!(30),
            TransactionCode::BonusConversionDebit,
            Reference::new(ReferenceType::BonusConversion, Uuid::new_v4()),
            Utc::now(),
        )
        .unwrap();
        apply_transaction(
            &mut txn,
            wallet_id,
            dec!(12.50),
            TransactionCode::BonusConversionCredit,
            Reference::new(ReferenceType::BonusConversion, Uuid::new_v4()),
            Utc::now(),
        )
        .unwrap();
        txn.commit();

        let rows = store.wallet_transactions(wallet_id);
        let mut running = Decimal::ZERO;
        for row in &rows {
            assert_eq!(row.balance_after, row.balance_before + row.signed_amount);
            running += row.signed_amount;
        }
        assert_eq!(store.wallet(wallet_id).unwrap().balance, running);
        assert_eq!(store.wallet(wallet_id).unwrap().balance, dec!(82.50));
    }

    #[test]
    fn test_bet_reference_must_exist() {
        let store = Store::new();
        let (_, _, wallet_id) = seeded_wallet(&store, dec!(50));

        let mut txn = store.begin();
        let err = apply_transaction(
            &mut txn,
            wallet_id,
            dec!(10),
            TransactionCode::Bet,
            Reference::new(ReferenceType::Bet, Uuid::new_v4()),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn test_bonus_reference_exempt_from_check() {
        let store = Store::new();
        let (_, _, wallet_id) = seeded_wallet(&store, dec!(0));

        let mut txn = store.begin();
        apply_transaction(
            &mut txn,
            wallet_id,
            dec!(25),
            TransactionCode::Bonus,
            Reference::new(ReferenceType::Bonus, Uuid::new_v4()),
            Utc::now(),
        )
        .unwrap();
        txn.commit();

        assert_eq!(store.wallet(wallet_id).unwrap().balance, dec!(25));
    }

    #[test]
    fn test_dashboard_newest_first_with_filter() {
        let store = Store::new();
        let (player, tenant, wallet_id) = seeded_wallet(&store, dec!(100));

        let mut txn = store.begin();
        apply_transaction(
            &mut txn,
            wallet_id,
            dec!(10),
            TransactionCode::JackpotContribution,
            Reference::new(ReferenceType::Jackpot, Uuid::new_v4()),
            Utc::now(),
        )
        .unwrap();
        txn.commit();

        let dashboard = wallet_dashboard(&store, player, tenant, DashboardFilter::default()).unwrap();
        assert_eq!(dashboard.balance, dec!(90));
        assert_eq!(dashboard.transactions.len(), 2);
        assert_eq!(dashboard.transactions[0].amount, dec!(-10));

        let only_jackpot = wallet_dashboard(
            &store,
            player,
            tenant,
            DashboardFilter {
                reference_type: Some(ReferenceType::Jackpot),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(only_jackpot.transactions.len(), 1);
    }
}
