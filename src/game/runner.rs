//! Host tick loop - owns a match on one task and serializes every mutation onto it

use std::time::Duration;

use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::util::time::{tick_delta, TICK_DURATION_MICROS};

use super::events::{EndReason, MatchEvent};
use super::placement::ObjectId;
use super::r#match::{GameMatch, JoinOutcome, MatchPhase, MatchSnapshot};
use super::roster::{Lives, PlayerIdentity};

/// Requests a host sends to the match task
#[derive(Debug)]
pub enum MatchCommand {
    Join {
        identity: PlayerIdentity,
        reply: oneshot::Sender<JoinOutcome>,
    },
    Leave {
        identity: PlayerIdentity,
    },
    ShipDestroyed {
        ship: ObjectId,
        score: f32,
        source: Option<PlayerIdentity>,
        reply: oneshot::Sender<Option<Lives>>,
    },
    EndGame {
        reason: String,
    },
    Snapshot {
        reply: oneshot::Sender<MatchSnapshot>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("Match task has stopped")]
    Closed,
}

/// Handle to a running match
#[derive(Clone)]
pub struct MatchHandle {
    pub id: Uuid,
    command_tx: mpsc::Sender<MatchCommand>,
    event_tx: broadcast::Sender<MatchEvent>,
}

impl MatchHandle {
    async fn send(&self, command: MatchCommand) -> Result<(), RunnerError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| RunnerError::Closed)
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> MatchCommand,
    ) -> Result<T, RunnerError> {
        let (reply, rx) = oneshot::channel();
        self.send(build(reply)).await?;
        rx.await.map_err(|_| RunnerError::Closed)
    }

    pub async fn join(&self, identity: PlayerIdentity) -> Result<JoinOutcome, RunnerError> {
        self.request(|reply| MatchCommand::Join { identity, reply })
            .await
    }

    pub async fn leave(&self, identity: PlayerIdentity) -> Result<(), RunnerError> {
        self.send(MatchCommand::Leave { identity }).await
    }

    pub async fn ship_destroyed(
        &self,
        ship: ObjectId,
        score: f32,
        source: Option<PlayerIdentity>,
    ) -> Result<Option<Lives>, RunnerError> {
        self.request(|reply| MatchCommand::ShipDestroyed {
            ship,
            score,
            source,
            reply,
        })
        .await
    }

    pub async fn end_game(&self, reason: impl Into<String>) -> Result<(), RunnerError> {
        self.send(MatchCommand::EndGame {
            reason: reason.into(),
        })
        .await
    }

    pub async fn snapshot(&self) -> Result<MatchSnapshot, RunnerError> {
        self.request(|reply| MatchCommand::Snapshot { reply }).await
    }

    /// Receive every match event from now on
    pub fn subscribe(&self) -> broadcast::Receiver<MatchEvent> {
        self.event_tx.subscribe()
    }
}

/// Runs a match at the simulation tick rate
pub struct MatchRunner {
    game: GameMatch,
    command_rx: mpsc::Receiver<MatchCommand>,
    handles_dropped: bool,
}

impl MatchRunner {
    /// Spawn the match task. The task resolves to the final snapshot once the
    /// match has ended and its shutdown countdown elapsed.
    pub fn spawn(mut game: GameMatch) -> (MatchHandle, JoinHandle<MatchSnapshot>) {
        let (command_tx, command_rx) = mpsc::channel(256);
        let (event_tx, _) = broadcast::channel(256);

        let forward = event_tx.clone();
        game.subscribe(move |event| {
            let _ = forward.send(event.clone());
        });

        let handle = MatchHandle {
            id: game.id(),
            command_tx,
            event_tx,
        };

        let runner = Self {
            game,
            command_rx,
            handles_dropped: false,
        };
        let task = tokio::spawn(runner.run());

        (handle, task)
    }

    async fn run(mut self) -> MatchSnapshot {
        info!(match_id = %self.game.id(), mode = %self.game.mode().code_name, "Match task started");

        let mut tick_interval = interval(Duration::from_micros(TICK_DURATION_MICROS));
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tick_interval.tick().await;

            // Commands first, so joins are seated and placed before the tick runs
            self.process_commands();

            self.game.tick(tick_delta());

            if self.game.should_shutdown() {
                info!(match_id = %self.game.id(), "Match task stopping");
                break;
            }
        }

        self.game.snapshot()
    }

    fn process_commands(&mut self) {
        if self.handles_dropped {
            return;
        }

        loop {
            let command = match self.command_rx.try_recv() {
                Ok(command) => command,
                Err(TryRecvError::Empty) => return,
                Err(TryRecvError::Disconnected) => {
                    self.handles_dropped = true;
                    if !matches!(self.game.phase(), MatchPhase::Ending | MatchPhase::Ended) {
                        warn!(match_id = %self.game.id(), "All match handles dropped, ending match");
                        self.game
                            .end_game(EndReason::Requested("host detached".to_string()));
                    }
                    return;
                }
            };

            match command {
                MatchCommand::Join { identity, reply } => {
                    let _ = reply.send(self.game.join(identity));
                }
                MatchCommand::Leave { identity } => {
                    self.game.leave(&identity);
                }
                MatchCommand::ShipDestroyed {
                    ship,
                    score,
                    source,
                    reply,
                } => {
                    let _ = reply.send(self.game.on_ship_destroyed(ship, score, source));
                }
                MatchCommand::EndGame { reason } => {
                    debug!(match_id = %self.game.id(), %reason, "End game requested");
                    self.game.end_game(EndReason::Requested(reason));
                }
                MatchCommand::Snapshot { reply } => {
                    let _ = reply.send(self.game.snapshot());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameModeData;

    fn quick_mode() -> GameModeData {
        GameModeData {
            start_game_countdown: 0.5,
            game_ends_delay: 0.2,
            game_ends_shutdown_countdown: 0.5,
            ..GameModeData::default()
        }
    }

    async fn wait_for_phase(handle: &MatchHandle, phase: MatchPhase) -> MatchSnapshot {
        loop {
            let snapshot = handle.snapshot().await.unwrap();
            if snapshot.phase == phase {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn runs_a_match_to_shutdown() {
        let game = GameMatch::new(quick_mode(), 21).unwrap();
        let (handle, task) = MatchRunner::spawn(game);
        let mut events = handle.subscribe();

        for i in 0..3 {
            let outcome = handle.join(PlayerIdentity::local(i)).await.unwrap();
            assert!(matches!(outcome, JoinOutcome::Joined { spawn: None, .. }));
        }

        let snapshot = wait_for_phase(&handle, MatchPhase::InProgress).await;
        assert_eq!(snapshot.connected_players, 3);

        let ship = snapshot
            .objects
            .iter()
            .find(|o| o.owner == Some(PlayerIdentity::local(1).key()))
            .map(|o| o.id)
            .unwrap();
        let lives = handle
            .ship_destroyed(ship, 500.0, Some(PlayerIdentity::local(0)))
            .await
            .unwrap();
        assert_eq!(lives, Some(Lives::Count(2)));

        tokio_test::assert_ok!(handle.end_game("test over").await);
        let final_snapshot = task.await.unwrap();
        assert_eq!(final_snapshot.phase, MatchPhase::Ended);
        assert_eq!(final_snapshot.teams[0].score, 500.0);

        let mut saw_ended = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, MatchEvent::MatchEnded { .. }) {
                saw_ended = true;
            }
        }
        assert!(saw_ended);
        assert!(matches!(handle.snapshot().await, Err(RunnerError::Closed)));
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_every_handle_ends_the_match() {
        let game = GameMatch::new(quick_mode(), 4).unwrap();
        let (handle, task) = MatchRunner::spawn(game);
        handle.join(PlayerIdentity::local(0)).await.unwrap();
        drop(handle);

        let final_snapshot = task.await.unwrap();
        assert_eq!(final_snapshot.phase, MatchPhase::Ended);
        assert_eq!(final_snapshot.connected_players, 1);
    }
}
