//! End-to-end settlement tests through the public service surface.

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use uuid::Uuid;
use wagermill::bonus::CreateBonus;
use wagermill::collaborators::{GameSpec, PlayerContext, StaticCatalog};
use wagermill::engines::{EngineType, PlayParams};
use wagermill::gameplay::PlayRequest;
use wagermill::jackpot::CreateJackpot;
use wagermill::models::{
    BonusStatus, BonusType, JackpotType, LimitPeriod, LimitType, Outcome, ReferenceType,
    ResetCycle, TransactionCode, WalletType,
};
use wagermill::wallet::{self, DashboardFilter, Reference};
use wagermill::{CasinoServices, CoreError};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
}

fn game(engine_type: EngineType, config: serde_json::Value) -> GameSpec {
    GameSpec {
        game_id: Uuid::new_v4(),
        name: format!("{} table", engine_type),
        provider: "house".to_string(),
        engine_type,
        engine_config: config,
        min_bet: dec!(1),
        max_bet: dec!(1000),
        tenant_overrides: HashMap::new(),
    }
}

/// Mines always settles WIN; the slot paytable below never matches a line.
fn platform(games: Vec<GameSpec>) -> CasinoServices {
    CasinoServices::builder()
        .with_catalog(Box::new(StaticCatalog::new(games)))
        .with_rng_seed(2025)
        .build()
}

fn losing_slot() -> GameSpec {
    game(
        EngineType::Slot,
        serde_json::json!({ "paytable": { "ZZZ": 5.0 } }),
    )
}

fn new_player(services: &CasinoServices, balance: Decimal) -> PlayerContext {
    let ctx = PlayerContext {
        player_id: Uuid::new_v4(),
        tenant_id: Uuid::new_v4(),
    };
    services.init_tenant_profile(ctx);
    if balance > Decimal::ZERO {
        let store = services.store();
        let mut txn = store.begin();
        let deposit = Uuid::new_v4();
        txn.register_deposit(deposit);
        let cash = txn
            .find_wallet(ctx.player_id, ctx.tenant_id, WalletType::Cash)
            .unwrap();
        wallet::apply_transaction(
            &mut txn,
            cash.wallet_id,
            balance,
            TransactionCode::Deposit,
            Reference::new(ReferenceType::Deposit, deposit),
            t0(),
        )
        .unwrap();
        txn.commit();
    }
    ctx
}

fn request(game_id: Uuid, stake: Decimal, join_jackpot: bool) -> PlayRequest {
    PlayRequest {
        game_id,
        stake,
        params: PlayParams::default(),
        join_jackpot,
    }
}

#[test]
fn ledger_conserves_balance_across_plays() {
    let mines = game(EngineType::Mines, serde_json::json!({}));
    let slot = losing_slot();
    let game_ids = [mines.game_id, slot.game_id];
    let services = platform(vec![mines, slot]);
    let ctx = new_player(&services, dec!(500));

    let mut expected = dec!(500);
    for game_id in game_ids {
        for _ in 0..5 {
            let receipt = services
                .play(ctx, &request(game_id, dec!(10), false), Utc::now())
                .unwrap();
            expected = expected - dec!(10) + receipt.win_amount;
        }
    }

    let dashboard = services
        .wallet_dashboard(ctx, DashboardFilter::default())
        .unwrap();
    assert_eq!(dashboard.balance, expected);

    // Balance equals the sum of signed ledger amounts.
    let store = services.store();
    let cash = store
        .begin()
        .find_wallet(ctx.player_id, ctx.tenant_id, WalletType::Cash)
        .unwrap();
    let total: Decimal = store
        .wallet_transactions(cash.wallet_id)
        .iter()
        .map(|t| t.signed_amount)
        .sum();
    assert_eq!(total, expected);

    // Every row chains before/after correctly.
    for row in store.wallet_transactions(cash.wallet_id) {
        assert_eq!(row.balance_after, row.balance_before + row.signed_amount);
    }
}

#[test]
fn every_round_has_exactly_one_stake_debit() {
    let slot = losing_slot();
    let game_id = slot.game_id;
    let services = platform(vec![slot]);
    let ctx = new_player(&services, dec!(100));

    let mut round_ids = Vec::new();
    for _ in 0..4 {
        let receipt = services
            .play(ctx, &request(game_id, dec!(7), false), Utc::now())
            .unwrap();
        round_ids.push(receipt.round_id);
    }

    let store = services.store();
    let cash = store
        .begin()
        .find_wallet(ctx.player_id, ctx.tenant_id, WalletType::Cash)
        .unwrap();
    let rows = store.wallet_transactions(cash.wallet_id);
    for round_id in round_ids {
        let debits: Vec<_> = rows
            .iter()
            .filter(|t| {
                t.reference_id == round_id && t.code == TransactionCode::Bet
            })
            .collect();
        assert_eq!(debits.len(), 1);
        assert_eq!(debits[0].signed_amount, dec!(-7));
    }
}

#[test]
fn progressive_jackpot_splits_one_percent() {
    let mines = game(EngineType::Mines, serde_json::json!({}));
    let game_id = mines.game_id;
    let services = platform(vec![mines]);
    let ctx = new_player(&services, dec!(500));

    let pool = services
        .create_jackpot(CreateJackpot {
            tenant_id: ctx.tenant_id,
            name: "mega".to_string(),
            jackpot_type: JackpotType::Progressive,
            seed_amount: dec!(1000),
            contribution_percentage: dec!(1),
            reset_cycle: ResetCycle::Never,
            deadline: None,
        })
        .unwrap();

    let receipt = services
        .play(ctx, &request(game_id, dec!(100), true), t0())
        .unwrap();

    assert_eq!(receipt.jackpot_contribution, dec!(1.00));
    assert_eq!(receipt.game_stake, dec!(99.00));
    // The wallet was debited the full stake regardless of the split.
    let store = services.store();
    let cash = store
        .begin()
        .find_wallet(ctx.player_id, ctx.tenant_id, WalletType::Cash)
        .unwrap();
    let stake_row = store
        .wallet_transactions(cash.wallet_id)
        .into_iter()
        .find(|t| t.code == TransactionCode::Bet)
        .unwrap();
    assert_eq!(stake_row.signed_amount, dec!(-100));
    assert_eq!(
        store.jackpot(pool.jackpot_id).unwrap().current_amount,
        dec!(1001.00)
    );
}

#[test]
fn limiter_reports_usage_and_remaining() {
    let slot = losing_slot();
    let game_id = slot.game_id;
    let services = platform(vec![slot]);
    let ctx = new_player(&services, dec!(500));

    services
        .set_limit(ctx, LimitType::Wager, LimitPeriod::Daily, dec!(100), t0())
        .unwrap();
    services
        .play(ctx, &request(game_id, dec!(60), false), t0())
        .unwrap();

    let check = services.check_limit(ctx, LimitType::Wager, LimitPeriod::Daily, dec!(50), t0());
    assert!(!check.within_limit);
    assert_eq!(check.current_usage, dec!(60));
    assert_eq!(check.remaining, Some(dec!(40)));

    let err = services
        .play(ctx, &request(game_id, dec!(50), false), t0())
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::LimitExceeded {
            limit_type: LimitType::Wager,
            ..
        }
    ));
}

#[test]
fn limit_increase_promotes_after_cooldown() {
    let services = platform(vec![]);
    let ctx = new_player(&services, Decimal::ZERO);

    services
        .set_limit(ctx, LimitType::Loss, LimitPeriod::Weekly, dec!(100), t0())
        .unwrap();
    services
        .set_limit(ctx, LimitType::Loss, LimitPeriod::Weekly, dec!(400), t0())
        .unwrap();

    let views = services.player_limits(ctx, t0());
    assert_eq!(views.len(), 2);
    assert!(views
        .iter()
        .any(|v| v.pending_activation_secs == Some(24 * 3600)));

    let promoted = services.check_limit(
        ctx,
        LimitType::Loss,
        LimitPeriod::Weekly,
        dec!(300),
        t0() + Duration::hours(25),
    );
    assert!(promoted.within_limit);
    assert_eq!(promoted.limit_value, Some(dec!(400)));
}

#[test]
fn expired_bonus_conversion_persists_expiry_only() {
    let services = platform(vec![]);
    let ctx = new_player(&services, dec!(50));

    services
        .create_bonus(CreateBonus {
            tenant_id: ctx.tenant_id,
            name: "welcome".to_string(),
            bonus_type: BonusType::Fixed,
            amount: dec!(20),
            percentage: Decimal::ZERO,
            max_bonus: Decimal::ZERO,
            wagering_multiplier: dec!(1),
            min_deposit: Decimal::ZERO,
            max_uses_per_player: 1,
            valid_from: t0() - Duration::days(1),
            valid_to: t0() + Duration::days(7),
        })
        .unwrap();
    let usage = services.claim_bonus(ctx, None, t0()).unwrap();

    let err = services
        .convert_bonus(ctx, usage.usage_id, t0() + Duration::days(30))
        .unwrap_err();
    assert_eq!(err, CoreError::Expired);

    let store = services.store();
    assert_eq!(
        store.bonus_usage(usage.usage_id).unwrap().status,
        BonusStatus::Expired
    );
    // CASH untouched, BONUS credit still there.
    let txn = store.begin();
    assert_eq!(
        txn.find_wallet(ctx.player_id, ctx.tenant_id, WalletType::Cash)
            .unwrap()
            .balance,
        dec!(50)
    );
    assert_eq!(
        txn.find_wallet(ctx.player_id, ctx.tenant_id, WalletType::Bonus)
            .unwrap()
            .balance,
        dec!(20)
    );
}

#[test]
fn bonus_wagering_rides_the_play_pipeline() {
    let slot = losing_slot();
    let game_id = slot.game_id;
    let services = platform(vec![slot]);
    let ctx = new_player(&services, dec!(200));

    services
        .create_bonus(CreateBonus {
            tenant_id: ctx.tenant_id,
            name: "welcome".to_string(),
            bonus_type: BonusType::Fixed,
            amount: dec!(10),
            percentage: Decimal::ZERO,
            max_bonus: Decimal::ZERO,
            wagering_multiplier: dec!(3),
            min_deposit: Decimal::ZERO,
            max_uses_per_player: 1,
            valid_from: t0() - Duration::days(1),
            valid_to: t0() + Duration::days(30),
        })
        .unwrap();
    let usage = services.claim_bonus(ctx, None, t0()).unwrap();
    assert_eq!(usage.wagering_required, dec!(30));

    // Two 15-stake plays complete the requirement.
    services
        .play(ctx, &request(game_id, dec!(15), false), t0())
        .unwrap();
    services
        .play(ctx, &request(game_id, dec!(15), false), t0())
        .unwrap();

    let store = services.store();
    assert_eq!(
        store.bonus_usage(usage.usage_id).unwrap().status,
        BonusStatus::Eligible
    );

    let converted = services.convert_bonus(ctx, usage.usage_id, t0()).unwrap();
    assert_eq!(converted, dec!(10));
    let txn = store.begin();
    assert_eq!(
        txn.find_wallet(ctx.player_id, ctx.tenant_id, WalletType::Cash)
            .unwrap()
            .balance,
        dec!(200) - dec!(30) + dec!(10)
    );
}

#[test]
fn failed_play_leaves_no_trace_in_dashboard() {
    let mines = game(EngineType::Mines, serde_json::json!({}));
    let game_id = mines.game_id;
    let services = platform(vec![mines]);
    let ctx = new_player(&services, dec!(20));

    let before = services
        .wallet_dashboard(ctx, DashboardFilter::default())
        .unwrap();

    let err = services
        .play(ctx, &request(game_id, dec!(100), false), t0())
        .unwrap_err();
    assert!(matches!(err, CoreError::InsufficientFunds { .. }));

    let after = services
        .wallet_dashboard(ctx, DashboardFilter::default())
        .unwrap();
    assert_eq!(after.balance, before.balance);
    assert_eq!(after.transactions.len(), before.transactions.len());
}

#[test]
fn session_close_feeds_session_limit() {
    let slot = losing_slot();
    let game_id = slot.game_id;
    let services = platform(vec![slot]);
    let ctx = new_player(&services, dec!(100));

    services
        .set_limit(ctx, LimitType::Session, LimitPeriod::Daily, dec!(60), t0())
        .unwrap();

    let receipt = services
        .play(ctx, &request(game_id, dec!(5), false), t0())
        .unwrap();
    let summary = services
        .end_session(ctx, receipt.session_id, t0() + Duration::minutes(45))
        .unwrap();
    assert_eq!(summary.play_minutes, 45);

    // A fresh session would only have 15 minutes of headroom left.
    let check = services.check_limit(
        ctx,
        LimitType::Session,
        LimitPeriod::Daily,
        dec!(20),
        t0() + Duration::minutes(45),
    );
    assert!(!check.within_limit);
    assert_eq!(check.remaining, Some(dec!(15)));
}

#[test]
fn settled_rounds_carry_outcome_and_result_data() {
    let mines = game(EngineType::Mines, serde_json::json!({}));
    let game_id = mines.game_id;
    let services = platform(vec![mines]);
    let ctx = new_player(&services, dec!(100));

    let receipt = services
        .play(ctx, &request(game_id, dec!(10), false), t0())
        .unwrap();
    assert_eq!(receipt.outcome, Outcome::Win);

    let round = services.store().round(receipt.round_id).unwrap();
    assert_eq!(round.outcome, Some(Outcome::Win));
    assert!(round.result_data.is_some());
    assert!(round.ended_at.is_some());
    assert_eq!(round.win_amount, receipt.win_amount);
}
