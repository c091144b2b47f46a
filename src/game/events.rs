//! Match events and the observer registry they are delivered through

use serde::Serialize;

use super::roster::{PlayerKey, TeamId, TeamSummary};

/// Why a match is ending
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum EndReason {
    ScoreLimit,
    TimeLimit,
    LastTeamStanding,
    NotEnoughPlayers,
    Requested(String),
}

/// Events fired synchronously from the mutating match operations
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum MatchEvent {
    PlayerJoined {
        player: PlayerKey,
        team_id: TeamId,
        restored: bool,
    },

    /// The host should disconnect this participant
    PlayerKickRequested {
        player: PlayerKey,
        reason: String,
    },

    PlayerLeft {
        player: PlayerKey,
    },

    CountdownStarted {
        seconds: f32,
    },

    CountdownCancelled,

    MatchStarted,

    ScoreChanged {
        player: PlayerKey,
        team_id: TeamId,
        score: f32,
        kill_count: u32,
    },

    PlayerEliminated {
        player: PlayerKey,
        team_id: TeamId,
    },

    NotEnoughPlayersCountdownStarted {
        seconds: f32,
    },

    NotEnoughPlayersCountdownCleared,

    MatchEnding {
        reason: EndReason,
        winning_team: Option<TeamId>,
    },

    MatchEnded {
        winning_team: Option<TeamId>,
        teams: Vec<TeamSummary>,
    },

    ShutdownRequested,
}

pub type SubscriptionId = u64;

type Observer = Box<dyn FnMut(&MatchEvent) + Send>;

/// Registered observers, called in subscription order
#[derive(Default)]
pub struct EventBus {
    observers: Vec<(SubscriptionId, Observer)>,
    next_id: SubscriptionId,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, observer: impl FnMut(&MatchEvent) + Send + 'static) -> SubscriptionId {
        let id = self.next_id;
        self.next_id += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    /// Returns false if the subscription was already gone
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(sub, _)| *sub != id);
        self.observers.len() != before
    }

    pub fn emit(&mut self, event: MatchEvent) {
        for (_, observer) in self.observers.iter_mut() {
            observer(&event);
        }
    }

}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn observers_receive_events_until_unsubscribed() {
        let mut bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        let id = bus.subscribe(move |event| sink.lock().unwrap().push(event.clone()));

        bus.emit(MatchEvent::MatchStarted);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.emit(MatchEvent::ShutdownRequested);

        assert_eq!(*seen.lock().unwrap(), vec![MatchEvent::MatchStarted]);
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = MatchEvent::MatchEnding {
            reason: EndReason::LastTeamStanding,
            winning_team: Some(1),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "match_ending");
        assert_eq!(json["reason"]["reason"], "last_team_standing");
        assert_eq!(json["winning_team"], 1);
    }
}
