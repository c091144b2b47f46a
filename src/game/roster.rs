//! Team/player roster - the authoritative per-match store of team membership,
//! score, lives and kills

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::game_mode::team_color;
use crate::config::GameModeType;

pub type TeamId = u32;

/// Key a player record is stored under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum PlayerKey {
    /// Platform-issued identity
    Net(Uuid),
    /// Local controller index, for players without a platform identity
    Local(i32),
}

impl fmt::Display for PlayerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayerKey::Net(id) => write!(f, "{id}"),
            PlayerKey::Local(index) => write!(f, "local:{index}"),
        }
    }
}

/// Identity presented by a connecting participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerIdentity {
    pub net_id: Option<Uuid>,
    pub controller_id: i32,
}

impl PlayerIdentity {
    pub fn online(net_id: Uuid) -> Self {
        Self {
            net_id: Some(net_id),
            controller_id: 0,
        }
    }

    pub fn local(controller_id: i32) -> Self {
        Self {
            net_id: None,
            controller_id,
        }
    }

    /// The controller index only identifies a player when no platform identity is present
    pub fn key(&self) -> PlayerKey {
        match self.net_id {
            Some(id) => PlayerKey::Net(id),
            None => PlayerKey::Local(self.controller_id),
        }
    }
}

impl From<PlayerKey> for PlayerIdentity {
    fn from(key: PlayerKey) -> Self {
        match key {
            PlayerKey::Net(id) => PlayerIdentity::online(id),
            PlayerKey::Local(index) => PlayerIdentity::local(index),
        }
    }
}

/// Lives remaining
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lives {
    Unlimited,
    /// May go negative; zero or below means eliminated
    Count(i32),
}

impl Lives {
    /// Lives a player starts with for a configured value (<= 0 means unlimited)
    pub fn starting(configured: i32) -> Self {
        if configured > 0 {
            Lives::Count(configured)
        } else {
            Lives::Unlimited
        }
    }

    pub fn is_alive(self) -> bool {
        match self {
            Lives::Unlimited => true,
            Lives::Count(n) => n > 0,
        }
    }

    pub fn decreased(self, amount: u32) -> Self {
        match self {
            Lives::Unlimited => Lives::Unlimited,
            Lives::Count(n) => {
                let amount = i32::try_from(amount).unwrap_or(i32::MAX);
                Lives::Count(n.saturating_sub(amount))
            }
        }
    }

    /// Engine-facing form, -1 stands for unlimited
    pub fn raw(self) -> i32 {
        match self {
            Lives::Unlimited => -1,
            Lives::Count(n) => n,
        }
    }
}

/// One human participant for the duration of a match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub identity: PlayerIdentity,
    pub team_id: TeamId,
    pub score: f32,
    pub lives: Lives,
    pub kill_count: u32,
}

impl PlayerRecord {
    pub fn key(&self) -> PlayerKey {
        self.identity.key()
    }
}

/// A group of players. Aggregates are always folded over the current members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamRecord {
    pub team_id: TeamId,
    pub members: Vec<PlayerRecord>,
}

impl TeamRecord {
    fn new(team_id: TeamId) -> Self {
        Self {
            team_id,
            members: Vec::new(),
        }
    }

    pub fn score(&self) -> f32 {
        self.members.iter().map(|m| m.score).sum()
    }

    /// Unlimited if any member has unlimited lives
    pub fn lives_left(&self) -> Lives {
        let mut total = 0;
        for member in &self.members {
            match member.lives {
                Lives::Unlimited => return Lives::Unlimited,
                Lives::Count(n) => total += n,
            }
        }
        Lives::Count(total)
    }

    pub fn kill_count(&self) -> u32 {
        self.members.iter().map(|m| m.kill_count).sum()
    }

    /// At least one member not yet eliminated
    pub fn is_living(&self) -> bool {
        self.members.iter().any(|m| m.lives.is_alive())
    }
}

/// Team with its aggregates, as exposed to hosts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamSummary {
    pub team_id: TeamId,
    /// Linear RGBA
    pub color: [f32; 4],
    pub score: f32,
    pub lives_left: Lives,
    pub kill_count: u32,
    pub members: Vec<PlayerRecord>,
}

impl From<&TeamRecord> for TeamSummary {
    fn from(team: &TeamRecord) -> Self {
        Self {
            team_id: team.team_id,
            color: team_color(team.team_id),
            score: team.score(),
            lives_left: team.lives_left(),
            kill_count: team.kill_count(),
            members: team.members.clone(),
        }
    }
}

/// Serializable view of the whole roster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterSnapshot {
    pub teams: Vec<TeamSummary>,
}

/// Result of seating a connecting participant
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    /// The stored record after assignment
    pub record: PlayerRecord,
    /// True when an existing record was found and its state restored
    pub restored: bool,
}

impl Assignment {
    pub fn team_id(&self) -> TeamId {
        self.record.team_id
    }
}

/// Roster errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RosterError {
    #[error("No roster record for player {0}")]
    RecordNotFound(PlayerKey),

    #[error("Roster is full ({max_players} players registered)")]
    RosterFull { max_players: u32 },
}

/// Capacity limits taken from the game mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RosterLimits {
    pub max_players: u32,
    pub max_team_num: u32,
}

/// The roster. Teams are kept in ascending team id order.
#[derive(Debug, Clone)]
pub struct Roster {
    teams: BTreeMap<TeamId, TeamRecord>,
    limits: RosterLimits,
}

impl Roster {
    pub fn new(limits: RosterLimits) -> Self {
        Self {
            teams: BTreeMap::new(),
            limits,
        }
    }

    pub fn limits(&self) -> RosterLimits {
        self.limits
    }

    /// Find the record stored for an identity
    pub fn find_player(&self, identity: &PlayerIdentity) -> Option<&PlayerRecord> {
        self.find_by_key(identity.key())
    }

    /// Find a record by its storage key
    pub fn find_by_key(&self, key: PlayerKey) -> Option<&PlayerRecord> {
        self.teams
            .values()
            .flat_map(|t| t.members.iter())
            .find(|m| m.key() == key)
    }

    fn find_player_mut(&mut self, identity: &PlayerIdentity) -> Option<&mut PlayerRecord> {
        let key = identity.key();
        self.teams
            .values_mut()
            .flat_map(|t| t.members.iter_mut())
            .find(|m| m.key() == key)
    }

    /// Number of players with a record
    pub fn registered_players(&self) -> usize {
        self.teams.values().map(|t| t.members.len()).sum()
    }

    pub fn teams(&self) -> impl Iterator<Item = &TeamRecord> {
        self.teams.values()
    }

    pub fn team(&self, team_id: TeamId) -> Option<&TeamRecord> {
        self.teams.get(&team_id)
    }

    /// Seat a connecting participant.
    ///
    /// A returning identity gets its stored record back. A new identity is
    /// refused with `RosterFull` once `max_players` records exist; the caller
    /// decides whether to kick. Otherwise free-for-all always opens a new
    /// team, and team mode opens a new team until `max_team_num` teams exist,
    /// then fills the least populated team (lowest team id on ties).
    pub fn assign_team(
        &mut self,
        identity: PlayerIdentity,
        mode: GameModeType,
        initial_lives: Lives,
    ) -> Result<Assignment, RosterError> {
        if let Some(record) = self.find_player(&identity) {
            debug!(
                player = %identity.key(),
                team_id = record.team_id,
                "Found existing player data, restoring team"
            );
            return Ok(Assignment {
                record: record.clone(),
                restored: true,
            });
        }

        if self.registered_players() >= self.limits.max_players as usize {
            return Err(RosterError::RosterFull {
                max_players: self.limits.max_players,
            });
        }

        let team_id = match mode {
            GameModeType::Ffa => self.next_team_id(),
            GameModeType::Tdm => {
                if self.teams.len() >= self.limits.max_team_num as usize {
                    self.least_populated_team().unwrap_or(0)
                } else {
                    self.next_team_id()
                }
            }
        };

        info!(player = %identity.key(), team_id, "No player data found, assigning team");

        self.add_or_update_member(team_id, identity, initial_lives, 0.0, 0);
        let record = self
            .find_player(&identity)
            .cloned()
            .ok_or(RosterError::RecordNotFound(identity.key()))?;

        Ok(Assignment {
            record,
            restored: false,
        })
    }

    /// Lowest team id not yet in use
    fn next_team_id(&self) -> TeamId {
        (0..)
            .find(|id| !self.teams.contains_key(id))
            .unwrap_or(self.teams.len() as TeamId)
    }

    /// First team in ascending id order with the fewest members
    fn least_populated_team(&self) -> Option<TeamId> {
        self.teams
            .values()
            .min_by_key(|t| t.members.len())
            .map(|t| t.team_id)
    }

    /// Insert or update a player in a team. A player already stored in
    /// another team is moved rather than duplicated.
    pub fn add_or_update_member(
        &mut self,
        team_id: TeamId,
        identity: PlayerIdentity,
        lives: Lives,
        score: f32,
        kill_count: u32,
    ) {
        let key = identity.key();
        let record = PlayerRecord {
            identity,
            team_id,
            score,
            lives,
            kill_count,
        };

        if let Some(team) = self.teams.get_mut(&team_id) {
            if let Some(existing) = team.members.iter_mut().find(|m| m.key() == key) {
                *existing = record;
                return;
            }
        }

        for team in self.teams.values_mut() {
            team.members.retain(|m| m.key() != key);
        }

        self.teams
            .entry(team_id)
            .or_insert_with(|| TeamRecord::new(team_id))
            .members
            .push(record);
    }

    /// Add to a player's score, optionally counting a kill. Returns the new score.
    pub fn add_score(
        &mut self,
        identity: &PlayerIdentity,
        delta: f32,
        increment_kills: bool,
    ) -> Result<f32, RosterError> {
        let record = self
            .find_player_mut(identity)
            .ok_or(RosterError::RecordNotFound(identity.key()))?;

        record.score += delta;
        if increment_kills {
            record.kill_count += 1;
        }
        Ok(record.score)
    }

    /// Take lives from a player. Returns the lives left.
    pub fn decrease_lives(
        &mut self,
        identity: &PlayerIdentity,
        amount: u32,
    ) -> Result<Lives, RosterError> {
        let record = self
            .find_player_mut(identity)
            .ok_or(RosterError::RecordNotFound(identity.key()))?;

        record.lives = record.lives.decreased(amount);
        Ok(record.lives)
    }

    /// Give every registered player the same lives (match start)
    pub fn set_all_lives(&mut self, lives: Lives) {
        for member in self.teams.values_mut().flat_map(|t| t.members.iter_mut()) {
            member.lives = lives;
        }
    }

    /// Teams with at least one member not yet eliminated
    pub fn living_team_count(&self) -> usize {
        self.teams.values().filter(|t| t.is_living()).count()
    }

    pub fn snapshot(&self) -> RosterSnapshot {
        RosterSnapshot {
            teams: self.teams.values().map(TeamSummary::from).collect(),
        }
    }

    /// Clear all teams and players (match teardown)
    pub fn reset(&mut self) {
        self.teams.clear();
    }
}
