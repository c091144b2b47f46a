//! Game mode data: the read-only tuning record a match is created from

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Game mode types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameModeType {
    /// Free-for-all: every player is a team of one
    Ffa,
    /// Team deathmatch
    Tdm,
}

impl Default for GameModeType {
    fn default() -> Self {
        Self::Ffa
    }
}

/// How the match is hosted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkType {
    Local,
    P2p,
    DedicatedServer,
}

impl Default for NetworkType {
    fn default() -> Self {
        Self::DedicatedServer
    }
}

/// Arena placement tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementSettings {
    /// Half extent of the initial square bounding area
    pub default_bound: f32,
    /// Multiplier on summed radii for any pair involving a hazard
    pub separation_factor: f32,
    /// Multiplier on summed radii for ship-to-ship pairs
    pub ship_separation_factor: f32,
    /// Radius of a player ship
    pub ship_radius: f32,
    /// One hazard (planet) is seeded per entry at match start
    pub planet_radii: Vec<f32>,
    /// Extra distance a hazard must keep from a sightline between two ships
    pub line_of_sight_clearance: f32,
    /// Samples drawn inside one bounding area before it grows
    pub attempts_per_bound: u32,
    /// How many times the bounding area may grow before placement degrades
    pub max_bound_growths: u32,
    /// Growth multiplier applied to the bounding area
    pub bound_growth_factor: f32,
}

impl Default for PlacementSettings {
    fn default() -> Self {
        Self {
            default_bound: 1000.0,
            separation_factor: 1.5,
            ship_separation_factor: 2.0,
            ship_radius: 30.0,
            planet_radii: vec![120.0, 90.0, 90.0, 60.0],
            line_of_sight_clearance: 20.0,
            attempts_per_bound: 32,
            max_bound_growths: 8,
            bound_growth_factor: 2.0,
        }
    }
}

/// Full game mode record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameModeData {
    /// Alias used to look the mode up (unique within a catalog)
    pub code_name: String,
    pub display_name: String,
    pub game_mode_type: GameModeType,
    pub network_type: NetworkType,
    /// Must be false for free-for-all
    pub is_team_game: bool,
    pub max_team_num: u32,
    pub max_players: u32,
    /// Match length in seconds, <= 0 means unlimited
    pub match_time: i32,
    /// Team score that ends the match, <= 0 disables it
    pub score_limit: i32,
    /// How many missiles a player may have in flight at once, <= 0 means no limit
    pub fired_missiles_limit: i32,
    /// Lives each player starts the match with, <= 0 means unlimited
    pub starting_lives: i32,
    pub base_score_for_kill: i32,
    pub time_score_increment: i32,
    pub time_score_delta_time: f32,
    pub skim_initial_score: i32,
    pub skim_score_delta_time: f32,
    pub skim_score_additional_multiplier: f32,
    /// Seconds between enough teams being present and the match starting
    pub start_game_countdown: f32,
    /// Seconds between the match ending and the host shutting down
    pub game_ends_shutdown_countdown: f32,
    pub minimum_team_count_to_prevent_auto_shutdown: u32,
    pub not_enough_player_shutdown_countdown: f32,
    /// Delay between the match ending and the ended notification
    pub game_ends_delay: f32,
    pub placement: PlacementSettings,
}

impl Default for GameModeData {
    fn default() -> Self {
        Self {
            code_name: "ffa".to_string(),
            display_name: "Elimination".to_string(),
            game_mode_type: GameModeType::Ffa,
            network_type: NetworkType::DedicatedServer,
            is_team_game: false,
            max_team_num: 4,
            max_players: 4,
            match_time: 300,
            score_limit: 0,
            fired_missiles_limit: 2,
            starting_lives: 3,
            base_score_for_kill: 500,
            time_score_increment: 100,
            time_score_delta_time: 1.0,
            skim_initial_score: 200,
            skim_score_delta_time: 0.5,
            skim_score_additional_multiplier: 1.5,
            start_game_countdown: 5.0,
            game_ends_shutdown_countdown: 30.0,
            minimum_team_count_to_prevent_auto_shutdown: 2,
            not_enough_player_shutdown_countdown: 15.0,
            game_ends_delay: 1.0,
            placement: PlacementSettings::default(),
        }
    }
}

impl GameModeData {
    /// Built-in team deathmatch preset
    pub fn team_deathmatch() -> Self {
        Self {
            code_name: "tdm".to_string(),
            display_name: "Team Deathmatch".to_string(),
            game_mode_type: GameModeType::Tdm,
            is_team_game: true,
            max_team_num: 2,
            max_players: 4,
            ..Self::default()
        }
    }

    pub fn is_team_mode(&self) -> bool {
        self.game_mode_type == GameModeType::Tdm
    }

    pub fn has_time_limit(&self) -> bool {
        self.match_time > 0
    }

    pub fn has_score_limit(&self) -> bool {
        self.score_limit > 0
    }

    /// Score awarded for a missile kill.
    ///
    /// Flight time adds `time_score_increment` for every full
    /// `time_score_delta_time`. Skimming close to planets or ships adds
    /// `skim_initial_score`, compounded by the skim multiplier for every full
    /// `skim_score_delta_time` spent skimming.
    pub fn missile_score(&self, flight_time: f32, skim_time: f32) -> f32 {
        let mut score = self.base_score_for_kill as f32;

        if self.time_score_delta_time > 0.0 && flight_time > 0.0 {
            let steps = (flight_time / self.time_score_delta_time).floor();
            score += steps * self.time_score_increment as f32;
        }

        if skim_time > 0.0 {
            let steps = if self.skim_score_delta_time > 0.0 {
                (skim_time / self.skim_score_delta_time).floor() as i32
            } else {
                0
            };
            score += self.skim_initial_score as f32
                * self.skim_score_additional_multiplier.powi(steps);
        }

        score
    }

    /// Collect every degenerate tuning value in this mode
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.code_name.trim().is_empty() {
            problems.push("code_name must not be empty".to_string());
        }
        if self.max_players == 0 {
            problems.push("max_players must be at least 1".to_string());
        }
        match self.game_mode_type {
            GameModeType::Ffa if self.is_team_game => {
                problems.push("free-for-all mode cannot be a team game".to_string());
            }
            GameModeType::Tdm if !self.is_team_game => {
                problems.push("team deathmatch must be a team game".to_string());
            }
            GameModeType::Tdm if self.max_team_num < 2 => {
                problems.push(format!(
                    "team deathmatch needs max_team_num >= 2, got {}",
                    self.max_team_num
                ));
            }
            _ => {}
        }

        let countdowns = [
            ("start_game_countdown", self.start_game_countdown),
            ("game_ends_shutdown_countdown", self.game_ends_shutdown_countdown),
            (
                "not_enough_player_shutdown_countdown",
                self.not_enough_player_shutdown_countdown,
            ),
            ("game_ends_delay", self.game_ends_delay),
        ];
        for (name, value) in countdowns {
            if !value.is_finite() || value < 0.0 {
                problems.push(format!("{name} must be a non-negative number, got {value}"));
            }
        }

        if !self.time_score_delta_time.is_finite() || self.time_score_delta_time < 0.0 {
            problems.push("time_score_delta_time must be non-negative".to_string());
        }
        if !self.skim_score_delta_time.is_finite() || self.skim_score_delta_time < 0.0 {
            problems.push("skim_score_delta_time must be non-negative".to_string());
        }

        problems.extend(self.placement.problems());
        problems
    }

    /// Reject degenerate tuning at load time
    pub fn validate(&self) -> Result<(), ConfigError> {
        let problems = self.problems();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::InvalidConfiguration(problems))
        }
    }
}

impl PlacementSettings {
    fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        let positive = [
            ("placement.default_bound", self.default_bound),
            ("placement.separation_factor", self.separation_factor),
            ("placement.ship_separation_factor", self.ship_separation_factor),
            ("placement.ship_radius", self.ship_radius),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                problems.push(format!("{name} must be positive, got {value}"));
            }
        }

        for (i, radius) in self.planet_radii.iter().enumerate() {
            if !radius.is_finite() || *radius <= 0.0 {
                problems.push(format!("placement.planet_radii[{i}] must be positive, got {radius}"));
            }
        }
        if !self.line_of_sight_clearance.is_finite() || self.line_of_sight_clearance < 0.0 {
            problems.push("placement.line_of_sight_clearance must be non-negative".to_string());
        }
        if self.attempts_per_bound == 0 {
            problems.push("placement.attempts_per_bound must be at least 1".to_string());
        }
        if !self.bound_growth_factor.is_finite() || self.bound_growth_factor <= 1.0 {
            problems.push(format!(
                "placement.bound_growth_factor must be greater than 1, got {}",
                self.bound_growth_factor
            ));
        }
        if problems.is_empty() {
            let growths = i32::try_from(self.max_bound_growths).unwrap_or(i32::MAX);
            let largest =
                f64::from(self.default_bound) * f64::from(self.bound_growth_factor).powi(growths);
            if !largest.is_finite() || largest > f64::from(MAX_PLACEMENT_BOUND) {
                problems.push(format!(
                    "placement bound can grow to {largest}, past the {MAX_PLACEMENT_BOUND} limit"
                ));
            }
        }

        problems
    }
}

/// Largest half extent the spawn bounding area may reach
pub const MAX_PLACEMENT_BOUND: f32 = 1.0e7;

/// Team colors as linear RGBA, cycled by team id
pub const TEAM_COLORS: [[f32; 4]; 4] = [
    [0.0, 0.6, 1.0, 1.0],
    [1.0, 0.35, 0.1, 1.0],
    [0.3, 1.0, 0.3, 1.0],
    [1.0, 0.9, 0.1, 1.0],
];

pub fn team_color(team_id: u32) -> [f32; 4] {
    TEAM_COLORS[team_id as usize % TEAM_COLORS.len()]
}
