//! Match lifecycle - phases, countdowns, joins and ship destruction on top of
//! the roster and the placement engine

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::game_mode::team_color;
use crate::config::{ConfigError, GameModeData};
use crate::util::time::unix_millis;

use super::events::{EndReason, EventBus, MatchEvent, SubscriptionId};
use super::placement::{ArenaObject, ObjectId, ObjectKind, Placement, PlacementEngine};
use super::roster::{
    Lives, PlayerIdentity, PlayerKey, PlayerRecord, Roster, RosterError, RosterLimits, TeamId,
    TeamSummary,
};

/// Match phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPhase {
    /// Not enough teams connected yet
    WaitingForPlayers,
    /// Counting down to the start
    Countdown,
    /// Match in progress
    InProgress,
    /// Result decided, waiting to announce it
    Ending,
    /// Match over, counting down to host shutdown
    Ended,
}

/// Per-connection state, mirrored from the roster
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSession {
    pub identity: PlayerIdentity,
    pub team_id: TeamId,
    /// Team colour, linear RGBA
    pub color: [f32; 4],
    pub score: f32,
    pub lives: Lives,
    pub kill_count: u32,
    /// Ship currently in the arena
    pub ship: Option<ObjectId>,
    pub missiles_in_flight: u32,
}

impl PlayerSession {
    fn from_record(record: &PlayerRecord) -> Self {
        Self {
            identity: record.identity,
            team_id: record.team_id,
            color: team_color(record.team_id),
            score: record.score,
            lives: record.lives,
            kill_count: record.kill_count,
            ship: None,
            missiles_in_flight: 0,
        }
    }

    fn sync(&mut self, record: &PlayerRecord) {
        self.team_id = record.team_id;
        self.color = team_color(record.team_id);
        self.score = record.score;
        self.lives = record.lives;
        self.kill_count = record.kill_count;
    }
}

/// Result of a join request
#[derive(Debug, Clone, PartialEq)]
pub enum JoinOutcome {
    Joined {
        team_id: TeamId,
        restored: bool,
        /// Where the ship was placed, if the match is running
        spawn: Option<Placement>,
    },
    /// Roster full and no prior record; the host should disconnect the participant
    KickRequested,
}

/// Serializable view of a match
#[derive(Debug, Clone, Serialize)]
pub struct MatchSnapshot {
    pub match_id: Uuid,
    pub phase: MatchPhase,
    pub started_at: Option<u64>,
    pub time_left: Option<f32>,
    pub countdown_remaining: Option<f32>,
    pub not_enough_players_remaining: Option<f32>,
    pub connected_players: usize,
    pub winning_team: Option<TeamId>,
    pub teams: Vec<TeamSummary>,
    pub objects: Vec<ArenaObject>,
    pub bound: f32,
}

/// The authoritative game match
pub struct GameMatch {
    id: Uuid,
    mode: GameModeData,
    phase: MatchPhase,
    roster: Roster,
    placement: PlacementEngine,
    sessions: HashMap<PlayerKey, PlayerSession>,
    objects: BTreeMap<ObjectId, ArenaObject>,
    next_object_id: ObjectId,
    events: EventBus,
    countdown_remaining: f32,
    time_left: f32,
    not_enough_players_remaining: Option<f32>,
    ending_remaining: f32,
    shutdown_remaining: f32,
    shutdown_requested: bool,
    started_at: Option<u64>,
    winning_team: Option<TeamId>,
}

impl GameMatch {
    /// Create a match for a game mode, rejecting degenerate tuning
    pub fn new(mode: GameModeData, seed: u64) -> Result<Self, ConfigError> {
        mode.validate()?;

        let roster = Roster::new(RosterLimits {
            max_players: mode.max_players,
            max_team_num: mode.max_team_num,
        });
        let placement = PlacementEngine::new(mode.placement.clone(), seed);

        Ok(Self {
            id: Uuid::new_v4(),
            phase: MatchPhase::WaitingForPlayers,
            roster,
            placement,
            sessions: HashMap::new(),
            objects: BTreeMap::new(),
            next_object_id: 1,
            events: EventBus::new(),
            countdown_remaining: mode.start_game_countdown,
            time_left: mode.match_time as f32,
            not_enough_players_remaining: None,
            ending_remaining: mode.game_ends_delay,
            shutdown_remaining: mode.game_ends_shutdown_countdown,
            shutdown_requested: false,
            started_at: None,
            winning_team: None,
            mode,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    pub fn mode(&self) -> &GameModeData {
        &self.mode
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn session(&self, identity: &PlayerIdentity) -> Option<&PlayerSession> {
        self.sessions.get(&identity.key())
    }

    pub fn objects(&self) -> impl Iterator<Item = &ArenaObject> {
        self.objects.values()
    }

    pub fn object(&self, id: ObjectId) -> Option<&ArenaObject> {
        self.objects.get(&id)
    }

    pub fn winning_team(&self) -> Option<TeamId> {
        self.winning_team
    }

    /// True once the post-match shutdown countdown has elapsed
    pub fn should_shutdown(&self) -> bool {
        self.shutdown_requested
    }

    pub fn subscribe(
        &mut self,
        observer: impl FnMut(&MatchEvent) + Send + 'static,
    ) -> SubscriptionId {
        self.events.subscribe(observer)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Teams with at least one connected player
    pub fn active_team_count(&self) -> usize {
        let mut teams: Vec<TeamId> = self.sessions.values().map(|s| s.team_id).collect();
        teams.sort_unstable();
        teams.dedup();
        teams.len()
    }

    /// Teams with at least one member not yet eliminated
    pub fn living_team_count(&self) -> usize {
        self.roster.living_team_count()
    }

    fn required_team_count(&self) -> usize {
        self.mode.minimum_team_count_to_prevent_auto_shutdown.max(1) as usize
    }

    /// Seat a connecting participant and, if the match is running, spawn their ship
    pub fn join(&mut self, identity: PlayerIdentity) -> JoinOutcome {
        let key = identity.key();

        if let Some(session) = self.sessions.get(&key) {
            warn!(match_id = %self.id, player = %key, "Player already in match");
            return JoinOutcome::Joined {
                team_id: session.team_id,
                restored: true,
                spawn: None,
            };
        }

        let initial_lives = if self.phase == MatchPhase::InProgress {
            Lives::starting(self.mode.starting_lives)
        } else {
            Lives::Unlimited
        };

        let assignment = match self
            .roster
            .assign_team(identity, self.mode.game_mode_type, initial_lives)
        {
            Ok(assignment) => assignment,
            Err(e) => {
                info!(match_id = %self.id, player = %key, error = %e, "Kicking player");
                self.events.emit(MatchEvent::PlayerKickRequested {
                    player: key,
                    reason: e.to_string(),
                });
                return JoinOutcome::KickRequested;
            }
        };

        let team_id = assignment.team_id();
        self.sessions
            .insert(key, PlayerSession::from_record(&assignment.record));

        info!(
            match_id = %self.id,
            player = %key,
            team_id,
            restored = assignment.restored,
            player_count = self.sessions.len(),
            "Player joined match"
        );
        self.events.emit(MatchEvent::PlayerJoined {
            player: key,
            team_id,
            restored: assignment.restored,
        });

        let spawn = if self.phase == MatchPhase::InProgress && assignment.record.lives.is_alive() {
            self.spawn_ship(key)
        } else {
            None
        };

        self.update_waiting();

        JoinOutcome::Joined {
            team_id,
            restored: assignment.restored,
            spawn,
        }
    }

    /// Drop a connection. The roster record stays for a later rejoin.
    pub fn leave(&mut self, identity: &PlayerIdentity) -> bool {
        let key = identity.key();
        let Some(session) = self.sessions.remove(&key) else {
            warn!(match_id = %self.id, player = %key, "Leave for player not in match");
            return false;
        };

        if let Some(ship) = session.ship {
            self.remove_object(ship);
        }

        info!(match_id = %self.id, player = %key, "Player left match");
        self.events.emit(MatchEvent::PlayerLeft { player: key });
        true
    }

    /// Advance timers by `dt` seconds
    pub fn tick(&mut self, dt: f32) {
        match self.phase {
            MatchPhase::WaitingForPlayers => self.update_waiting(),
            MatchPhase::Countdown => {
                if self.active_team_count() < self.required_team_count() {
                    self.phase = MatchPhase::WaitingForPlayers;
                    info!(match_id = %self.id, "Not enough teams, countdown cancelled");
                    self.events.emit(MatchEvent::CountdownCancelled);
                    return;
                }

                self.countdown_remaining -= dt;
                if self.countdown_remaining <= 0.0 {
                    self.start_game();
                }
            }
            MatchPhase::InProgress => {
                if self.mode.has_time_limit() {
                    self.time_left -= dt;
                    if self.time_left <= 0.0 {
                        self.time_left = 0.0;
                        self.end_game(EndReason::TimeLimit);
                        return;
                    }
                }
                self.not_enough_players_counting(dt);
                self.check_end_conditions();
            }
            MatchPhase::Ending => {
                self.ending_remaining -= dt;
                if self.ending_remaining <= 0.0 {
                    self.phase = MatchPhase::Ended;
                    self.shutdown_remaining = self.mode.game_ends_shutdown_countdown;
                    info!(match_id = %self.id, winning_team = ?self.winning_team, "Match ended");
                    self.events.emit(MatchEvent::MatchEnded {
                        winning_team: self.winning_team,
                        teams: self.roster.snapshot().teams,
                    });
                }
            }
            MatchPhase::Ended => {
                if self.shutdown_requested {
                    return;
                }
                self.shutdown_remaining -= dt;
                if self.shutdown_remaining <= 0.0 {
                    self.shutdown_requested = true;
                    info!(match_id = %self.id, "Shutdown countdown elapsed");
                    self.events.emit(MatchEvent::ShutdownRequested);
                }
            }
        }
    }

    fn update_waiting(&mut self) {
        if self.phase != MatchPhase::WaitingForPlayers
            || self.active_team_count() < self.required_team_count()
        {
            return;
        }

        self.phase = MatchPhase::Countdown;
        self.countdown_remaining = self.mode.start_game_countdown;
        info!(
            match_id = %self.id,
            seconds = self.countdown_remaining,
            "Enough teams present, starting countdown"
        );
        self.events.emit(MatchEvent::CountdownStarted {
            seconds: self.countdown_remaining,
        });
    }

    fn not_enough_players_counting(&mut self, dt: f32) {
        let short = self.active_team_count() < self.required_team_count();

        match (short, self.not_enough_players_remaining) {
            (true, None) => {
                let seconds = self.mode.not_enough_player_shutdown_countdown;
                self.not_enough_players_remaining = Some(seconds);
                warn!(match_id = %self.id, seconds, "Not enough players, shutdown countdown started");
                self.events
                    .emit(MatchEvent::NotEnoughPlayersCountdownStarted { seconds });
            }
            (true, Some(remaining)) => {
                let remaining = remaining - dt;
                if remaining <= 0.0 {
                    self.end_game(EndReason::NotEnoughPlayers);
                } else {
                    self.not_enough_players_remaining = Some(remaining);
                }
            }
            (false, Some(_)) => {
                self.not_enough_players_remaining = None;
                info!(match_id = %self.id, "Enough players again, shutdown countdown cleared");
                self.events.emit(MatchEvent::NotEnoughPlayersCountdownCleared);
            }
            (false, None) => {}
        }
    }

    /// Seed hazards, hand out starting lives and spawn every connected player
    fn start_game(&mut self) {
        self.phase = MatchPhase::InProgress;
        self.started_at = Some(unix_millis());
        self.time_left = self.mode.match_time as f32;
        self.not_enough_players_remaining = None;

        self.roster
            .set_all_lives(Lives::starting(self.mode.starting_lives));
        for session in self.sessions.values_mut() {
            if let Some(record) = self.roster.find_player(&session.identity) {
                session.sync(record);
            }
        }

        self.objects.retain(|_, o| o.kind == ObjectKind::Ship);
        self.placement.reset_bound();
        let planet_radii = self.mode.placement.planet_radii.clone();
        for radius in planet_radii {
            let existing: Vec<ArenaObject> = self.objects.values().cloned().collect();
            let placement = self.placement.find_good_planet_position(&existing, radius);
            self.insert_object(ObjectKind::Hazard, placement, radius, None);
        }

        let mut keys: Vec<PlayerKey> = self
            .sessions
            .iter()
            .filter(|(_, s)| s.ship.is_none())
            .map(|(key, _)| *key)
            .collect();
        keys.sort_unstable();
        for key in keys {
            self.spawn_ship(key);
        }

        info!(
            match_id = %self.id,
            players = self.sessions.len(),
            hazards = self.mode.placement.planet_radii.len(),
            "Match started"
        );
        self.events.emit(MatchEvent::MatchStarted);
    }

    fn insert_object(
        &mut self,
        kind: ObjectKind,
        placement: Placement,
        radius: f32,
        owner: Option<PlayerKey>,
    ) -> ObjectId {
        let id = self.next_object_id;
        self.next_object_id += 1;
        self.objects.insert(
            id,
            ArenaObject {
                id,
                kind,
                position: placement.position,
                radius,
                owner,
            },
        );
        id
    }

    /// Place and register a ship for a connected player
    fn spawn_ship(&mut self, key: PlayerKey) -> Option<Placement> {
        if !self.sessions.contains_key(&key) {
            return None;
        }

        let existing: Vec<ArenaObject> = self.objects.values().cloned().collect();
        let placement = self.placement.find_good_player_position(&existing);
        let radius = self.mode.placement.ship_radius;
        let id = self.insert_object(ObjectKind::Ship, placement, radius, Some(key));

        if let Some(session) = self.sessions.get_mut(&key) {
            session.ship = Some(id);
        }
        debug!(
            match_id = %self.id,
            player = %key,
            x = placement.position.x,
            y = placement.position.y,
            degraded = placement.degraded,
            "Ship spawned"
        );
        Some(placement)
    }

    /// Remove an object from the arena. Safe to call again for the same object.
    pub fn remove_object(&mut self, id: ObjectId) -> bool {
        let Some(object) = self.objects.remove(&id) else {
            return false;
        };

        if let Some(owner) = object.owner {
            if let Some(session) = self.sessions.get_mut(&owner) {
                if session.ship == Some(id) {
                    session.ship = None;
                }
            }
        }
        true
    }

    /// Add to a player's score in the roster and their session. Returns the new score.
    pub fn add_player_score(
        &mut self,
        identity: &PlayerIdentity,
        delta: f32,
        add_kill: bool,
    ) -> Result<f32, RosterError> {
        let score = match self.roster.add_score(identity, delta, add_kill) {
            Ok(score) => score,
            Err(e) => {
                warn!(match_id = %self.id, error = %e, "Add score cancelled");
                return Err(e);
            }
        };

        if let Some(record) = self.roster.find_player(identity) {
            if let Some(session) = self.sessions.get_mut(&identity.key()) {
                session.sync(record);
            }
            self.events.emit(MatchEvent::ScoreChanged {
                player: identity.key(),
                team_id: record.team_id,
                score,
                kill_count: record.kill_count,
            });
        }

        Ok(score)
    }

    /// Take lives from a player in the roster and their session. Returns the lives left.
    pub fn decrease_player_life(
        &mut self,
        identity: &PlayerIdentity,
        amount: u32,
    ) -> Result<Lives, RosterError> {
        let lives = match self.roster.decrease_lives(identity, amount) {
            Ok(lives) => lives,
            Err(e) => {
                warn!(match_id = %self.id, error = %e, "Decrease life cancelled");
                return Err(e);
            }
        };

        if let Some(record) = self.roster.find_player(identity) {
            if let Some(session) = self.sessions.get_mut(&identity.key()) {
                session.sync(record);
            }
            if !lives.is_alive() {
                info!(match_id = %self.id, player = %identity.key(), "Player eliminated");
                self.events.emit(MatchEvent::PlayerEliminated {
                    player: identity.key(),
                    team_id: record.team_id,
                });
            }
        }

        Ok(lives)
    }

    /// A ship was destroyed. Credits the source player, takes a life from
    /// the pilot, respawns them if they have lives left and re-checks the end
    /// conditions. Returns the pilot's lives left.
    pub fn on_ship_destroyed(
        &mut self,
        ship: ObjectId,
        score: f32,
        source: Option<PlayerIdentity>,
    ) -> Option<Lives> {
        if self.phase != MatchPhase::InProgress {
            debug!(match_id = %self.id, ship, phase = ?self.phase, "Ship destroyed outside of play");
            return None;
        }

        let Some(object) = self.objects.get(&ship) else {
            warn!(match_id = %self.id, ship, "Destroyed ship is not an active game object");
            return None;
        };
        if object.kind != ObjectKind::Ship {
            warn!(match_id = %self.id, ship, "Destroyed object is not a ship");
            return None;
        }
        let pilot = object.owner;
        self.remove_object(ship);

        let Some(pilot) = pilot.and_then(|key| self.roster.find_by_key(key)).map(|r| r.identity)
        else {
            warn!(match_id = %self.id, ship, "Destroyed ship has no registered pilot");
            return None;
        };

        if let Some(source) = source {
            if source.key() != pilot.key() {
                // Failure is logged inside
                let _ = self.add_player_score(&source, score, true);
            }
        }

        let lives = self.decrease_player_life(&pilot, 1).ok()?;
        if lives.is_alive() {
            self.spawn_ship(pilot.key());
        }

        self.check_end_conditions();
        Some(lives)
    }

    fn check_end_conditions(&mut self) {
        if self.phase != MatchPhase::InProgress {
            return;
        }

        if self.mode.has_score_limit() {
            let limit = self.mode.score_limit as f32;
            if self.roster.teams().any(|t| t.score() >= limit) {
                self.end_game(EndReason::ScoreLimit);
                return;
            }
        }

        if self.roster.teams().count() > 1 && self.living_team_count() <= 1 {
            self.end_game(EndReason::LastTeamStanding);
        }
    }

    /// Only counts missiles while the match is running and under the per-player limit
    pub fn try_fire_missile(&mut self, identity: &PlayerIdentity) -> bool {
        if self.phase != MatchPhase::InProgress {
            return false;
        }
        let limit = self.mode.fired_missiles_limit;
        let Some(session) = self.sessions.get_mut(&identity.key()) else {
            warn!(match_id = %self.id, player = %identity.key(), "Missile fired by unknown player");
            return false;
        };

        if limit > 0 && session.missiles_in_flight >= limit as u32 {
            return false;
        }
        session.missiles_in_flight += 1;
        true
    }

    pub fn missile_expired(&mut self, identity: &PlayerIdentity) {
        if let Some(session) = self.sessions.get_mut(&identity.key()) {
            session.missiles_in_flight = session.missiles_in_flight.saturating_sub(1);
        }
    }

    /// Finish the match. Ignored once the match is already ending.
    pub fn end_game(&mut self, reason: EndReason) {
        if matches!(self.phase, MatchPhase::Ending | MatchPhase::Ended) {
            debug!(match_id = %self.id, ?reason, "Match already ending");
            return;
        }

        self.phase = MatchPhase::Ending;
        self.ending_remaining = self.mode.game_ends_delay;
        self.not_enough_players_remaining = None;
        self.winning_team = self.decide_winner();

        info!(
            match_id = %self.id,
            ?reason,
            winning_team = ?self.winning_team,
            "Match ending"
        );
        self.events.emit(MatchEvent::MatchEnding {
            reason,
            winning_team: self.winning_team,
        });
    }

    /// The only living team, otherwise the single highest scoring team
    fn decide_winner(&self) -> Option<TeamId> {
        let living: Vec<TeamId> = self
            .roster
            .teams()
            .filter(|t| t.is_living())
            .map(|t| t.team_id)
            .collect();
        if let [only] = living.as_slice() {
            return Some(*only);
        }

        let mut best: Option<(f32, TeamId)> = None;
        let mut tied = false;
        for team in self.roster.teams() {
            let score = team.score();
            match best {
                Some((top, _)) if score < top => {}
                Some((top, _)) if score == top => tied = true,
                _ => {
                    best = Some((score, team.team_id));
                    tied = false;
                }
            }
        }

        if tied {
            None
        } else {
            best.map(|(_, team_id)| team_id)
        }
    }

    /// Clear roster, sessions and arena for a fresh match. Observers stay registered.
    pub fn reset(&mut self) {
        self.roster.reset();
        self.sessions.clear();
        self.objects.clear();
        self.placement.reset_bound();
        self.phase = MatchPhase::WaitingForPlayers;
        self.countdown_remaining = self.mode.start_game_countdown;
        self.time_left = self.mode.match_time as f32;
        self.not_enough_players_remaining = None;
        self.ending_remaining = self.mode.game_ends_delay;
        self.shutdown_remaining = self.mode.game_ends_shutdown_countdown;
        self.shutdown_requested = false;
        self.started_at = None;
        self.winning_team = None;
        info!(match_id = %self.id, "Match reset");
    }

    pub fn snapshot(&self) -> MatchSnapshot {
        MatchSnapshot {
            match_id: self.id,
            phase: self.phase,
            started_at: self.started_at,
            time_left: (self.phase == MatchPhase::InProgress && self.mode.has_time_limit())
                .then_some(self.time_left),
            countdown_remaining: (self.phase == MatchPhase::Countdown)
                .then_some(self.countdown_remaining),
            not_enough_players_remaining: self.not_enough_players_remaining,
            connected_players: self.sessions.len(),
            winning_team: self.winning_team,
            teams: self.roster.snapshot().teams,
            objects: self.objects.values().cloned().collect(),
            bound: self.placement.bound(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameModeType;
    use std::sync::{Arc, Mutex};

    fn ffa() -> GameModeData {
        GameModeData {
            start_game_countdown: 1.0,
            not_enough_player_shutdown_countdown: 2.0,
            game_ends_delay: 0.5,
            game_ends_shutdown_countdown: 1.0,
            ..GameModeData::default()
        }
    }

    fn recorder(game: &mut GameMatch) -> Arc<Mutex<Vec<MatchEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        game.subscribe(move |e| sink.lock().unwrap().push(e.clone()));
        events
    }

    fn started(mode: GameModeData, players: i32) -> GameMatch {
        let mut game = GameMatch::new(mode, 99).unwrap();
        for i in 0..players {
            game.join(PlayerIdentity::local(i));
        }
        game.tick(10.0);
        assert_eq!(game.phase(), MatchPhase::InProgress);
        game
    }

    fn ship_of(game: &GameMatch, id: i32) -> ObjectId {
        game.session(&PlayerIdentity::local(id))
            .and_then(|s| s.ship)
            .unwrap()
    }

    #[test]
    fn rejects_invalid_mode() {
        let mut mode = ffa();
        mode.placement.separation_factor = 0.0;
        assert!(GameMatch::new(mode, 1).is_err());
    }

    #[test]
    fn countdown_starts_with_enough_teams_and_cancels_when_short() {
        let mut game = GameMatch::new(ffa(), 1).unwrap();
        let events = recorder(&mut game);

        game.join(PlayerIdentity::local(0));
        assert_eq!(game.phase(), MatchPhase::WaitingForPlayers);
        game.join(PlayerIdentity::local(1));
        assert_eq!(game.phase(), MatchPhase::Countdown);

        game.leave(&PlayerIdentity::local(1));
        game.tick(0.1);
        assert_eq!(game.phase(), MatchPhase::WaitingForPlayers);
        assert!(events
            .lock()
            .unwrap()
            .contains(&MatchEvent::CountdownCancelled));
    }

    #[test]
    fn start_seeds_hazards_and_spawns_players_apart() {
        let game = started(ffa(), 4);
        let snapshot = game.snapshot();

        let hazards = snapshot
            .objects
            .iter()
            .filter(|o| o.kind == ObjectKind::Hazard)
            .count();
        let ships = snapshot
            .objects
            .iter()
            .filter(|o| o.kind == ObjectKind::Ship)
            .count();
        assert_eq!(hazards, game.mode().placement.planet_radii.len());
        assert_eq!(ships, 4);

        let settings = &game.mode().placement;
        for (i, a) in snapshot.objects.iter().enumerate() {
            for b in &snapshot.objects[i + 1..] {
                let factor = if a.kind == ObjectKind::Ship && b.kind == ObjectKind::Ship {
                    settings.ship_separation_factor
                } else {
                    settings.separation_factor
                };
                let distance = a.position.xy().distance(b.position.xy());
                assert!(distance >= (a.radius + b.radius) * factor - 1e-2);
            }
        }

        for team in &snapshot.teams {
            assert_eq!(team.lives_left, Lives::Count(3));
        }
    }

    #[test]
    fn kill_scores_source_and_respawns_victim() {
        let mut game = started(ffa(), 3);
        let victim_ship = ship_of(&game, 1);

        let lives = game.on_ship_destroyed(victim_ship, 500.0, Some(PlayerIdentity::local(0)));
        assert_eq!(lives, Some(Lives::Count(2)));

        let killer = game.session(&PlayerIdentity::local(0)).unwrap();
        assert_eq!(killer.score, 500.0);
        assert_eq!(killer.kill_count, 1);

        let victim = game.session(&PlayerIdentity::local(1)).unwrap();
        assert_eq!(victim.lives, Lives::Count(2));
        assert!(victim.ship.is_some());
        assert_ne!(victim.ship, Some(victim_ship));
        assert!(game.object(victim_ship).is_none());
    }

    #[test]
    fn destroyed_ship_cleanup_is_idempotent() {
        let mut game = started(ffa(), 3);
        let ship = ship_of(&game, 2);

        assert!(game.on_ship_destroyed(ship, 100.0, None).is_some());
        assert!(game.on_ship_destroyed(ship, 100.0, None).is_none());
        assert!(!game.remove_object(ship));

        let record = game.roster().find_player(&PlayerIdentity::local(2)).unwrap();
        assert_eq!(record.lives, Lives::Count(2));
    }

    #[test]
    fn self_destruction_gives_no_score() {
        let mut game = started(ffa(), 2);
        let ship = ship_of(&game, 0);
        game.on_ship_destroyed(ship, 500.0, Some(PlayerIdentity::local(0)));

        let session = game.session(&PlayerIdentity::local(0)).unwrap();
        assert_eq!(session.score, 0.0);
        assert_eq!(session.kill_count, 0);
    }

    #[test]
    fn last_team_standing_ends_match() {
        let mode = GameModeData {
            starting_lives: 1,
            ..ffa()
        };
        let mut game = started(mode, 2);
        let events = recorder(&mut game);

        let ship = ship_of(&game, 1);
        assert_eq!(
            game.on_ship_destroyed(ship, 500.0, Some(PlayerIdentity::local(0))),
            Some(Lives::Count(0))
        );

        assert_eq!(game.phase(), MatchPhase::Ending);
        assert_eq!(game.winning_team(), Some(0));
        assert_eq!(game.living_team_count(), 1);

        let events = events.lock().unwrap();
        assert!(events.contains(&MatchEvent::PlayerEliminated {
            player: PlayerKey::Local(1),
            team_id: 1
        }));
        assert!(events.contains(&MatchEvent::MatchEnding {
            reason: EndReason::LastTeamStanding,
            winning_team: Some(0)
        }));
    }

    #[test]
    fn elimination_outside_ship_destruction_ends_match_on_tick() {
        let mode = GameModeData {
            starting_lives: 1,
            ..ffa()
        };
        let mut game = started(mode, 2);

        assert_eq!(
            game.decrease_player_life(&PlayerIdentity::local(1), 1),
            Ok(Lives::Count(0))
        );
        assert_eq!(game.living_team_count(), 1);
        assert_eq!(game.phase(), MatchPhase::InProgress);

        game.tick(0.1);
        assert_eq!(game.phase(), MatchPhase::Ending);
        assert_eq!(game.winning_team(), Some(0));
    }

    #[test]
    fn single_team_match_keeps_running() {
        let mode = GameModeData {
            minimum_team_count_to_prevent_auto_shutdown: 1,
            ..ffa()
        };
        let mut game = started(mode, 1);
        game.tick(0.1);
        assert_eq!(game.phase(), MatchPhase::InProgress);
    }

    #[test]
    fn score_limit_ends_match() {
        let mode = GameModeData {
            score_limit: 1000,
            ..ffa()
        };
        let mut game = started(mode, 3);

        game.on_ship_destroyed(ship_of(&game, 1), 600.0, Some(PlayerIdentity::local(0)));
        assert_eq!(game.phase(), MatchPhase::InProgress);
        game.on_ship_destroyed(ship_of(&game, 2), 600.0, Some(PlayerIdentity::local(0)));
        assert_eq!(game.phase(), MatchPhase::Ending);
        assert_eq!(game.winning_team(), Some(0));
    }

    #[test]
    fn time_limit_runs_through_ending_to_shutdown() {
        let mode = GameModeData {
            match_time: 2,
            ..ffa()
        };
        let mut game = started(mode, 2);
        let events = recorder(&mut game);

        game.tick(1.0);
        assert_eq!(game.phase(), MatchPhase::InProgress);
        game.tick(1.5);
        assert_eq!(game.phase(), MatchPhase::Ending);
        game.tick(0.5);
        assert_eq!(game.phase(), MatchPhase::Ended);
        assert!(!game.should_shutdown());
        game.tick(1.0);
        assert!(game.should_shutdown());
        game.tick(1.0);

        let events = events.lock().unwrap();
        let ended = events
            .iter()
            .filter(|e| matches!(e, MatchEvent::MatchEnded { .. }))
            .count();
        let shutdown = events
            .iter()
            .filter(|e| matches!(e, MatchEvent::ShutdownRequested))
            .count();
        assert_eq!((ended, shutdown), (1, 1));
    }

    #[test]
    fn not_enough_players_countdown_clears_on_rejoin() {
        let mut game = started(ffa(), 2);
        let events = recorder(&mut game);

        game.leave(&PlayerIdentity::local(1));
        game.tick(0.1);
        game.tick(1.0);
        assert_eq!(game.phase(), MatchPhase::InProgress);
        assert!(game.snapshot().not_enough_players_remaining.is_some());

        game.join(PlayerIdentity::local(1));
        game.tick(0.1);
        assert_eq!(game.phase(), MatchPhase::InProgress);
        assert!(game.snapshot().not_enough_players_remaining.is_none());

        let events = events.lock().unwrap();
        assert!(events.contains(&MatchEvent::NotEnoughPlayersCountdownStarted { seconds: 2.0 }));
        assert!(events.contains(&MatchEvent::NotEnoughPlayersCountdownCleared));
    }

    #[test]
    fn not_enough_players_countdown_ends_match() {
        let mut game = started(ffa(), 2);
        game.leave(&PlayerIdentity::local(1));

        game.tick(0.1);
        game.tick(1.0);
        game.tick(1.5);
        assert_eq!(game.phase(), MatchPhase::Ending);
    }

    #[test]
    fn rejoin_mid_match_restores_lives_and_respawns() {
        let mut game = started(ffa(), 3);
        game.on_ship_destroyed(ship_of(&game, 2), 0.0, None);
        game.leave(&PlayerIdentity::local(2));
        assert!(game
            .objects()
            .all(|o| o.owner != Some(PlayerKey::Local(2))));

        match game.join(PlayerIdentity::local(2)) {
            JoinOutcome::Joined {
                team_id,
                restored,
                spawn,
            } => {
                assert_eq!(team_id, 2);
                assert!(restored);
                assert!(spawn.is_some());
            }
            other => panic!("unexpected {other:?}"),
        }
        let session = game.session(&PlayerIdentity::local(2)).unwrap();
        assert_eq!(session.color, team_color(2));
        assert_ne!(session.color, game.session(&PlayerIdentity::local(1)).unwrap().color);
        assert_eq!(
            game.session(&PlayerIdentity::local(2)).unwrap().lives,
            Lives::Count(2)
        );
    }

    #[test]
    fn full_match_requests_kick() {
        let mode = GameModeData {
            max_players: 2,
            ..ffa()
        };
        let mut game = GameMatch::new(mode, 5).unwrap();
        let events = recorder(&mut game);
        game.join(PlayerIdentity::local(0));
        game.join(PlayerIdentity::local(1));

        assert_eq!(game.join(PlayerIdentity::local(2)), JoinOutcome::KickRequested);
        assert!(game.session(&PlayerIdentity::local(2)).is_none());
        assert!(events
            .lock()
            .unwrap()
            .iter()
            .any(|e| matches!(e, MatchEvent::PlayerKickRequested { .. })));
    }

    #[test]
    fn unknown_player_operations_are_ignored() {
        let mut game = started(ffa(), 2);
        let ghost = PlayerIdentity::online(Uuid::new_v4());

        assert!(game.add_player_score(&ghost, 10.0, true).is_err());
        assert!(game.decrease_player_life(&ghost, 1).is_err());
        assert!(!game.try_fire_missile(&ghost));
        assert!(!game.leave(&ghost));
        assert_eq!(game.on_ship_destroyed(9999, 10.0, Some(ghost)), None);
        assert_eq!(game.phase(), MatchPhase::InProgress);
    }

    #[test]
    fn fired_missile_limit() {
        let mut game = started(ffa(), 2);
        let player = PlayerIdentity::local(0);

        assert!(game.try_fire_missile(&player));
        assert!(game.try_fire_missile(&player));
        assert!(!game.try_fire_missile(&player));
        game.missile_expired(&player);
        assert!(game.try_fire_missile(&player));
    }

    #[test]
    fn external_end_request_and_reset() {
        let mut game = GameMatch::new(
            GameModeData {
                game_mode_type: GameModeType::Tdm,
                is_team_game: true,
                max_team_num: 2,
                ..ffa()
            },
            3,
        )
        .unwrap();
        game.join(PlayerIdentity::local(0));
        game.end_game(EndReason::Requested("host shutdown".to_string()));
        assert_eq!(game.phase(), MatchPhase::Ending);

        game.reset();
        assert_eq!(game.phase(), MatchPhase::WaitingForPlayers);
        assert_eq!(game.roster().registered_players(), 0);
        assert_eq!(game.objects().count(), 0);
    }
}
