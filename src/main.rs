//! Demo driver: seeds a tenant, funds a player, and runs the settlement
//! pipeline end to end against the configured game catalog.

use chrono::Utc;
use clap::Parser;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;
use wagermill::bonus::CreateBonus;
use wagermill::collaborators::{ChannelAnalytics, GameSpec, PlayerContext, StaticCatalog};
use wagermill::config::{CasinoConfig, ConfigLoader, GameEntry};
use wagermill::engines::{EngineType, Parity, PlayParams};
use wagermill::gameplay::PlayRequest;
use wagermill::jackpot::CreateJackpot;
use wagermill::models::{
    JackpotType, LimitPeriod, LimitType, ReferenceType, ResetCycle, TransactionCode, WalletType,
};
use wagermill::wallet::{self, DashboardFilter, Reference};
use wagermill::CasinoServices;

#[derive(Parser)]
#[command(name = "wagermill", about = "Wager settlement pipeline demo")]
struct Args {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Plays to run per catalog game.
    #[arg(long, default_value_t = 3)]
    plays: u32,

    /// RNG seed for a reproducible run.
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut loader = ConfigLoader::new();
    if let Some(path) = &args.config {
        loader = loader.with_path(path);
    }
    let config = loader.load()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone())),
        )
        .init();

    let catalog = build_catalog(&config)?;
    let games: Vec<(Uuid, EngineType)> = catalog
        .iter()
        .map(|g| (g.game_id, g.engine_type))
        .collect();

    let mut builder = CasinoServices::builder()
        .with_config(config.clone())
        .with_catalog(Box::new(StaticCatalog::new(catalog)));
    if config.analytics.enabled {
        builder = builder.with_analytics(Box::new(ChannelAnalytics::spawn(|event| {
            tracing::info!(
                round = %event.round_id,
                stake = %event.stake,
                win = %event.win_amount,
                "analytics: bet recorded"
            );
        })));
    }
    if let Some(seed) = args.seed {
        builder = builder.with_rng_seed(seed);
    }
    let services = builder.build();

    let ctx = PlayerContext {
        player_id: Uuid::new_v4(),
        tenant_id: Uuid::new_v4(),
    };
    let now = Utc::now();

    println!("wagermill settlement demo");
    println!("=========================");
    println!("player {} @ tenant {}", ctx.player_id, ctx.tenant_id);

    services.init_tenant_profile(ctx);
    seed_deposit(&services, ctx, config.platform.starting_balance)?;
    println!("funded CASH wallet with {}", config.platform.starting_balance);

    services.set_limit(ctx, LimitType::Wager, LimitPeriod::Daily, dec!(500), now)?;

    services.create_bonus(CreateBonus {
        tenant_id: ctx.tenant_id,
        name: "welcome".to_string(),
        bonus_type: wagermill::models::BonusType::Fixed,
        amount: dec!(20),
        percentage: dec!(0),
        max_bonus: dec!(0),
        wagering_multiplier: dec!(5),
        min_deposit: dec!(0),
        max_uses_per_player: 1,
        valid_from: now - chrono::Duration::days(1),
        valid_to: now + chrono::Duration::days(30),
    })?;
    let usage = services.claim_bonus(ctx, None, now)?;
    println!(
        "claimed bonus: {} credited, {} wagering required",
        usage.bonus_amount, usage.wagering_required
    );

    let pool = services.create_jackpot(CreateJackpot {
        tenant_id: ctx.tenant_id,
        name: "mega drop".to_string(),
        jackpot_type: JackpotType::Progressive,
        seed_amount: dec!(1000),
        contribution_percentage: dec!(1),
        reset_cycle: ResetCycle::Never,
        deadline: None,
    })?;

    let mut sessions = Vec::new();
    for (game_id, engine_type) in &games {
        for _ in 0..args.plays {
            let receipt = services.play(
                ctx,
                &PlayRequest {
                    game_id: *game_id,
                    stake: dec!(5),
                    params: params_for(*engine_type),
                    join_jackpot: true,
                },
                Utc::now(),
            )?;
            println!(
                "{:<7} round {:>2}: {:?} stake {} (game {}) win {} balance {}",
                engine_type.to_string(),
                receipt.round_number,
                receipt.outcome,
                receipt.stake,
                receipt.game_stake,
                receipt.win_amount,
                receipt.balance
            );
            if !sessions.contains(&receipt.session_id) {
                sessions.push(receipt.session_id);
            }
        }
    }
    for session_id in sessions {
        services.end_session(ctx, session_id, Utc::now())?;
    }

    let jackpot = services
        .store()
        .jackpot(pool.jackpot_id)
        .ok_or("jackpot vanished")?;
    println!("progressive pool now at {}", jackpot.current_amount);

    if let Some(dashboard) = services.wallet_dashboard(ctx, DashboardFilter::default()) {
        println!("final balance {}", dashboard.balance);
        println!("recent transactions:");
        for t in dashboard.transactions.iter().take(10) {
            println!(
                "  {:>10} {:?} -> balance {}",
                t.amount.to_string(),
                t.reference_type,
                t.balance_after
            );
        }
    }

    Ok(())
}

/// Catalog from config, or one game per engine when none is configured.
fn build_catalog(config: &CasinoConfig) -> Result<Vec<GameSpec>, Box<dyn std::error::Error>> {
    if config.games.is_empty() {
        return Ok([
            EngineType::Dice,
            EngineType::Crash,
            EngineType::Mines,
            EngineType::Slot,
            EngineType::Plinko,
        ]
        .into_iter()
        .map(|engine_type| GameSpec {
            game_id: Uuid::new_v4(),
            name: format!("{} table", engine_type),
            provider: "house".to_string(),
            engine_type,
            engine_config: serde_json::json!({}),
            min_bet: dec!(1),
            max_bet: dec!(1000),
            tenant_overrides: HashMap::new(),
        })
        .collect());
    }

    config
        .games
        .iter()
        .map(|entry: &GameEntry| {
            let engine_type = entry.engine.parse::<EngineType>()?;
            let engine_config = match &entry.engine_config {
                Some(v) => serde_json::to_value(v)?,
                None => serde_json::json!({}),
            };
            Ok(GameSpec {
                game_id: Uuid::new_v4(),
                name: entry.name.clone(),
                provider: "house".to_string(),
                engine_type,
                engine_config,
                min_bet: entry.min_bet,
                max_bet: entry.max_bet,
                tenant_overrides: HashMap::new(),
            })
        })
        .collect()
}

/// Player inputs each engine expects in the demo.
fn params_for(engine_type: EngineType) -> PlayParams {
    match engine_type {
        EngineType::Dice => PlayParams {
            player_choice: Some(Parity::Even),
            ..Default::default()
        },
        EngineType::Crash => PlayParams {
            target_multiplier: Some(1.5),
            ..Default::default()
        },
        EngineType::Mines => PlayParams {
            successful_picks: Some(2),
            ..Default::default()
        },
        EngineType::Slot | EngineType::Plinko => PlayParams::default(),
    }
}

/// Demo stand-in for the excluded payment pipeline.
fn seed_deposit(
    services: &CasinoServices,
    ctx: PlayerContext,
    amount: rust_decimal::Decimal,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = services.store();
    let mut txn = store.begin();
    let deposit_id = Uuid::new_v4();
    txn.register_deposit(deposit_id);
    let cash = txn
        .find_wallet(ctx.player_id, ctx.tenant_id, WalletType::Cash)
        .ok_or("cash wallet missing")?;
    wallet::apply_transaction(
        &mut txn,
        cash.wallet_id,
        amount,
        TransactionCode::Deposit,
        Reference::new(ReferenceType::Deposit, deposit_id),
        Utc::now(),
    )?;
    txn.commit();
    Ok(())
}
