//! Configuration module - environment variable parsing and game mode data

pub mod catalog;
pub mod game_mode;

use std::env;
use std::path::PathBuf;

pub use catalog::GameModeCatalog;
pub use game_mode::{
    GameModeData, GameModeType, NetworkType, PlacementSettings, MAX_PLACEMENT_BOUND,
};

/// Host configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Code name of the game mode to host
    pub game_mode: String,
    /// Optional JSON game mode catalog, the built-in catalog is used otherwise
    pub game_modes_path: Option<PathBuf>,
    /// Seed for placement randomness, random when unset
    pub match_seed: Option<u64>,
    /// Number of simulated local players the host joins
    pub bot_count: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let match_seed = match lookup("MATCH_SEED") {
            Some(raw) => Some(raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: "MATCH_SEED",
                value: raw,
            })?),
            None => None,
        };

        let bot_count = match lookup("BOT_COUNT") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: "BOT_COUNT",
                value: raw,
            })?,
            None => 4,
        };

        Ok(Self {
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            game_mode: lookup("GAME_MODE").unwrap_or_else(|| "ffa".to_string()),
            game_modes_path: lookup("GAME_MODES_PATH").map(PathBuf::from),
            match_seed,
            bot_count,
        })
    }

    /// Load the configured catalog and pick the configured mode
    pub fn load_game_mode(&self) -> Result<GameModeData, ConfigError> {
        let catalog = match &self.game_modes_path {
            Some(path) => GameModeCatalog::load(path)?,
            None => GameModeCatalog::builtin(),
        };
        catalog.resolve(&self.game_mode)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },

    #[error("Invalid configuration: {}", .0.join("; "))]
    InvalidConfiguration(Vec<String>),

    #[error("Unknown game mode: {0}")]
    UnknownGameMode(String),

    #[error("Failed to read game mode catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse game mode catalog: {0}")]
    Parse(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.game_mode, "ffa");
        assert_eq!(config.bot_count, 4);
        assert!(config.match_seed.is_none());
        assert!(config.game_modes_path.is_none());
    }

    #[test]
    fn parses_seed_and_bot_count() {
        let config =
            Config::from_lookup(lookup(&[("MATCH_SEED", "42"), ("BOT_COUNT", "2")])).unwrap();
        assert_eq!(config.match_seed, Some(42));
        assert_eq!(config.bot_count, 2);
    }

    #[test]
    fn rejects_malformed_seed() {
        let err = Config::from_lookup(lookup(&[("MATCH_SEED", "soon")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "MATCH_SEED", .. }));
    }

    #[test]
    fn unknown_mode_is_reported() {
        let config = Config::from_lookup(lookup(&[("GAME_MODE", "koth")])).unwrap();
        assert!(matches!(
            config.load_game_mode(),
            Err(ConfigError::UnknownGameMode(name)) if name == "koth"
        ));
    }
}
