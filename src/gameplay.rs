//! Gameplay orchestrator: one transaction per play call.
//!
//! A play resolves the game, pre-checks the responsible-gaming limits at the
//! worst case, debits the full stake, splits off any progressive jackpot
//! share, runs the engine on the remainder, and settles. Every mutation
//! rides the same transaction; the analytics emit happens only after commit
//! and never fails the play.

use crate::bonus;
use crate::collaborators::{Analytics, BetEvent, GameCatalog, PlayerContext};
use crate::engines::{validate_bet, EngineRegistry, PlayParams};
use crate::errors::{CoreError, CoreResult, Entity};
use crate::jackpot;
use crate::limits;
use crate::models::{
    Bet, BetStatus, LimitType, Outcome, ReferenceType, Round, Session, SessionStatus,
    TransactionCode, WalletType,
};
use crate::store::{Store, Txn};
use crate::wallet::{self, Reference};
use chrono::{DateTime, Utc};
use rand::RngCore;
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

/// One play call.
#[derive(Debug, Clone)]
pub struct PlayRequest {
    pub game_id: Uuid,
    pub stake: Decimal,
    pub params: PlayParams,
    /// Opt the stake into the tenant's progressive jackpot split.
    pub join_jackpot: bool,
}

/// Everything the caller learns about a settled play.
#[derive(Debug, Clone)]
pub struct PlayReceipt {
    pub session_id: Uuid,
    pub round_id: Uuid,
    pub bet_id: Uuid,
    pub round_number: u64,
    pub outcome: Outcome,
    pub stake: Decimal,
    /// Stake after the jackpot share, what the engine settled on.
    pub game_stake: Decimal,
    pub jackpot_contribution: Decimal,
    pub win_amount: Decimal,
    pub balance: Decimal,
    pub result_data: Value,
}

#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub play_minutes: i64,
}

/// Close a session and feed its elapsed minutes into the SESSION limit.
/// The elapsed time is recorded even when it breaches the cap: time already
/// played cannot be taken back.
fn close_session(
    txn: &mut Txn<'_>,
    session_id: Uuid,
    player_id: Uuid,
    tenant_id: Uuid,
    now: DateTime<Utc>,
) -> CoreResult<i64> {
    let minutes = {
        let session = txn
            .session_mut(session_id)
            .ok_or(CoreError::NotFound(Entity::Session))?;
        if session.status != SessionStatus::Active {
            return Err(CoreError::Validation(
                "session is already closed".to_string(),
            ));
        }
        session.status = SessionStatus::Completed;
        session.ended_at = Some(now);
        (now - session.started_at).num_minutes().max(0)
    };
    limits::update_usage(
        txn,
        player_id,
        tenant_id,
        LimitType::Session,
        Decimal::from(minutes),
        now,
        false,
    )?;
    Ok(minutes)
}

/// How session resolution ended: an open session to play in, or a breach
/// that the caller must persist after releasing its own transaction.
enum SessionResolution {
    Open(Session),
    Breached {
        session_id: Uuid,
        current_usage: Decimal,
        remaining: Decimal,
    },
}

/// Resume the player's active session for the game or open a fresh one,
/// enforcing the SESSION limit against time already in progress.
fn resolve_session(
    txn: &mut Txn<'_>,
    ctx: PlayerContext,
    game_id: Uuid,
    now: DateTime<Utc>,
) -> CoreResult<SessionResolution> {
    if let Some(session) = txn.find_active_session(ctx.player_id, game_id) {
        let elapsed = Decimal::from((now - session.started_at).num_minutes().max(0));
        let check = limits::check_limit_in(
            txn,
            ctx.player_id,
            ctx.tenant_id,
            LimitType::Session,
            elapsed,
            now,
        );
        if !check.within_limit {
            return Ok(SessionResolution::Breached {
                session_id: session.session_id,
                current_usage: check.current_usage,
                remaining: check.remaining.unwrap_or(Decimal::ZERO),
            });
        }
        return Ok(SessionResolution::Open(session));
    }

    let check = limits::check_limit_in(
        txn,
        ctx.player_id,
        ctx.tenant_id,
        LimitType::Session,
        Decimal::ZERO,
        now,
    );
    if !check.within_limit {
        return Err(CoreError::LimitExceeded {
            limit_type: LimitType::Session,
            current_usage: check.current_usage,
            remaining: check.remaining.unwrap_or(Decimal::ZERO),
        });
    }
    let session = Session::start(ctx.player_id, game_id, ctx.tenant_id, now);
    txn.insert_session(session.clone());
    Ok(SessionResolution::Open(session))
}

/// Settle one play atomically.
#[allow(clippy::too_many_arguments)]
pub fn play(
    store: &Store,
    registry: &EngineRegistry,
    catalog: &dyn GameCatalog,
    analytics: &dyn Analytics,
    rng: &mut dyn RngCore,
    ctx: PlayerContext,
    request: &PlayRequest,
    now: DateTime<Utc>,
) -> CoreResult<PlayReceipt> {
    // Resolve the game and its engine before touching any state.
    let game = catalog
        .game(request.game_id, ctx.tenant_id)
        .ok_or(CoreError::NotFound(Entity::Game))?;
    let bounds = game.bounds_for(ctx.tenant_id);
    validate_bet(request.stake, bounds.min_bet, bounds.max_bet)?;
    let engine = registry.engine(game.engine_type, &game.engine_config)?;

    let mut txn = store.begin();

    // Worst-case limit pre-checks: the whole stake is wagered and lost.
    for lt in [LimitType::Wager, LimitType::Loss] {
        let check = limits::check_limit_in(
            &mut txn,
            ctx.player_id,
            ctx.tenant_id,
            lt,
            request.stake,
            now,
        );
        if !check.within_limit {
            return Err(CoreError::LimitExceeded {
                limit_type: lt,
                current_usage: check.current_usage,
                remaining: check.remaining.unwrap_or(Decimal::ZERO),
            });
        }
    }

    let session = match resolve_session(&mut txn, ctx, game.game_id, now)? {
        SessionResolution::Open(session) => session,
        SessionResolution::Breached {
            session_id,
            current_usage,
            remaining,
        } => {
            // Drop the play transaction (and its leases) first, then commit
            // the closure on its own so it survives the aborted play.
            drop(txn);
            let mut closer = store.begin();
            close_session(&mut closer, session_id, ctx.player_id, ctx.tenant_id, now)?;
            closer.commit();
            info!(session = %session_id, "session auto-closed on limit breach");
            return Err(CoreError::LimitExceeded {
                limit_type: LimitType::Session,
                current_usage,
                remaining,
            });
        }
    };
    let cash = wallet::get_wallet(&mut txn, ctx.player_id, WalletType::Cash, ctx.tenant_id)?;

    let round_number = txn.last_round_number(session.session_id) + 1;
    let round_id = Uuid::new_v4();
    txn.insert_round(Round {
        round_id,
        session_id: session.session_id,
        round_number,
        bet_amount: request.stake,
        win_amount: Decimal::ZERO,
        outcome: None,
        result_data: None,
        started_at: now,
        ended_at: None,
    });
    let bet_id = Uuid::new_v4();
    txn.insert_bet(Bet {
        bet_id,
        round_id,
        wallet_id: cash.wallet_id,
        bet_amount: request.stake,
        win_amount: Decimal::ZERO,
        status: BetStatus::Placed,
        placed_at: now,
        settled_at: None,
    });

    // The wallet is always debited the full stake, jackpot share included.
    wallet::apply_transaction(
        &mut txn,
        cash.wallet_id,
        request.stake,
        TransactionCode::Bet,
        Reference::new(ReferenceType::Bet, round_id),
        now,
    )?;
    limits::update_usage(
        &mut txn,
        ctx.player_id,
        ctx.tenant_id,
        LimitType::Wager,
        request.stake,
        now,
        true,
    )?;

    let split = if request.join_jackpot {
        jackpot::process_progressive_bet(
            &mut txn,
            ctx.player_id,
            ctx.tenant_id,
            request.stake,
            bet_id,
            now,
        )?
    } else {
        jackpot::ProgressiveSplit {
            game_stake: request.stake,
            contribution: Decimal::ZERO,
            jackpot_id: None,
        }
    };

    bonus::apply_wagering(&mut txn, ctx.player_id, ctx.tenant_id, split.game_stake, now);

    let outcome = engine.run(split.game_stake, &request.params, rng)?;

    let net_loss = request.stake - outcome.win_amount;
    if net_loss > Decimal::ZERO {
        limits::update_usage(
            &mut txn,
            ctx.player_id,
            ctx.tenant_id,
            LimitType::Loss,
            net_loss,
            now,
            true,
        )?;
    }
    if outcome.win_amount > Decimal::ZERO {
        wallet::apply_transaction(
            &mut txn,
            cash.wallet_id,
            outcome.win_amount,
            TransactionCode::Win,
            Reference::new(ReferenceType::Bet, round_id),
            now,
        )?;
    }

    if let Some(bet) = txn.bet_mut(bet_id) {
        bet.win_amount = outcome.win_amount;
        bet.status = BetStatus::Settled;
        bet.settled_at = Some(now);
    }
    if let Some(round) = txn.round_mut(round_id) {
        round.win_amount = outcome.win_amount;
        round.outcome = Some(outcome.outcome);
        round.result_data = Some(outcome.result_data.clone());
        round.ended_at = Some(now);
    }

    let balance = txn
        .wallet(cash.wallet_id)
        .map(|w| w.balance)
        .unwrap_or(Decimal::ZERO);
    txn.commit();
    info!(
        player = %ctx.player_id,
        game = %game.game_id,
        round = %round_id,
        stake = %request.stake,
        win = %outcome.win_amount,
        outcome = ?outcome.outcome,
        "play settled"
    );

    // Post-commit, fire-and-forget.
    if let Err(e) = analytics.record_bet(BetEvent {
        player_id: ctx.player_id,
        tenant_id: ctx.tenant_id,
        game_id: game.game_id,
        round_id,
        stake: request.stake,
        win_amount: outcome.win_amount,
        outcome: outcome.outcome,
        settled_at: now,
    }) {
        warn!(round = %round_id, error = %e, "analytics emit dropped");
    }

    Ok(PlayReceipt {
        session_id: session.session_id,
        round_id,
        bet_id,
        round_number,
        outcome: outcome.outcome,
        stake: request.stake,
        game_stake: split.game_stake,
        jackpot_contribution: split.contribution,
        win_amount: outcome.win_amount,
        balance,
        result_data: outcome.result_data,
    })
}

/// Close a session explicitly and forward lifetime play time.
pub fn end_session(
    store: &Store,
    player_stats: &dyn crate::collaborators::PlayerStats,
    ctx: PlayerContext,
    session_id: Uuid,
    now: DateTime<Utc>,
) -> CoreResult<SessionSummary> {
    let mut txn = store.begin();
    let minutes = close_session(&mut txn, session_id, ctx.player_id, ctx.tenant_id, now)?;
    txn.commit();

    if let Err(e) = player_stats.record_session(ctx.player_id, (minutes * 60) as u64) {
        warn!(session = %session_id, error = %e, "player stats emit dropped");
    }
    Ok(SessionSummary {
        session_id,
        play_minutes: minutes,
    })
}
