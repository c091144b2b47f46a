//! Arena host - runs a single match with local bot players
//!
//! The host seats `BOT_COUNT` local players, plays out random ship kills
//! until the match ends and logs the final standings.

use std::time::Duration;

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use arena_game_mode::config::{Config, GameModeData};
use arena_game_mode::game::{
    GameMatch, JoinOutcome, MatchHandle, MatchPhase, MatchRunner, MatchSnapshot, ObjectKind,
    PlayerIdentity,
};
use arena_game_mode::util::time::Timer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(&config.log_level);

    // Invalid tuning is fatal
    let mode = config.load_game_mode()?;
    let seed = config.match_seed.unwrap_or_else(rand::random);

    info!(
        mode = %mode.code_name,
        seed,
        bots = config.bot_count,
        "Starting arena host"
    );

    let game = GameMatch::new(mode.clone(), seed)?;
    let (handle, task) = MatchRunner::spawn(game);
    spawn_event_logger(&handle);

    for index in 0..config.bot_count {
        let identity = PlayerIdentity::local(index as i32);
        match handle.join(identity).await? {
            JoinOutcome::Joined { team_id, .. } => {
                debug!(player = %identity.key(), team_id, "Bot seated");
            }
            JoinOutcome::KickRequested => {
                warn!(player = %identity.key(), "Bot rejected, roster full");
            }
        }
    }

    let timer = Timer::new();
    tokio::select! {
        result = simulate(&handle, &mode, seed) => {
            if let Err(e) = result {
                error!(error = %e, "Simulation stopped");
            }
        }
        _ = shutdown_signal() => {
            handle.end_game("host interrupted").await.ok();
        }
    }

    let final_snapshot = task.await?;
    log_standings(&final_snapshot, timer.elapsed_ms());

    info!("Arena host shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

fn spawn_event_logger(handle: &MatchHandle) {
    let mut events = handle.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let json = serde_json::to_string(&event).unwrap_or_default();
                    debug!(event = %json, "Match event");
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event logger lagging");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

/// Destroy a random ship every half second until the match is decided
async fn simulate(handle: &MatchHandle, mode: &GameModeData, seed: u64) -> anyhow::Result<()> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(1));
    let mut ticker = interval(Duration::from_millis(500));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        let snapshot = handle.snapshot().await?;
        match snapshot.phase {
            MatchPhase::WaitingForPlayers | MatchPhase::Countdown => continue,
            MatchPhase::Ending | MatchPhase::Ended => return Ok(()),
            MatchPhase::InProgress => {}
        }

        let ships: Vec<_> = snapshot
            .objects
            .iter()
            .filter(|o| o.kind == ObjectKind::Ship)
            .collect();
        let Some(victim) = ships.choose(&mut rng) else {
            continue;
        };
        let source = ships
            .iter()
            .filter(|o| o.id != victim.id)
            .collect::<Vec<_>>()
            .choose(&mut rng)
            .and_then(|o| o.owner)
            .map(PlayerIdentity::from);

        let flight_time = rng.gen_range(0.0..4.0);
        let skim_time = if rng.gen_bool(0.25) {
            rng.gen_range(0.0..2.0)
        } else {
            0.0
        };
        let score = mode.missile_score(flight_time, skim_time);

        let lives = handle.ship_destroyed(victim.id, score, source).await?;
        debug!(ship = victim.id, score, ?lives, "Ship destroyed");
    }
}

fn log_standings(snapshot: &MatchSnapshot, elapsed_ms: u64) {
    info!(
        match_id = %snapshot.match_id,
        winning_team = ?snapshot.winning_team,
        elapsed_ms,
        "Final standings"
    );
    for team in &snapshot.teams {
        info!(
            team_id = team.team_id,
            score = team.score,
            kills = team.kill_count,
            lives_left = team.lives_left.raw(),
            members = team.members.len(),
            "Team"
        );
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, ending match");
        }
        _ = terminate => {
            info!("Received terminate signal, ending match");
        }
    }
}
