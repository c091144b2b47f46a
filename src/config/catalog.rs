//! Game mode catalog - the set of selectable modes keyed by code name

use std::collections::HashSet;
use std::path::Path;

use tracing::info;

use super::game_mode::GameModeData;
use super::ConfigError;

/// Validated collection of game modes
#[derive(Debug, Clone)]
pub struct GameModeCatalog {
    modes: Vec<GameModeData>,
}

impl GameModeCatalog {
    /// Create a catalog, rejecting it if any mode is degenerate or code names collide
    pub fn new(modes: Vec<GameModeData>) -> Result<Self, ConfigError> {
        let catalog = Self { modes };
        catalog.validate()?;
        Ok(catalog)
    }

    /// Modes shipped with the host
    pub fn builtin() -> Self {
        Self {
            modes: vec![GameModeData::default(), GameModeData::team_deathmatch()],
        }
    }

    /// Parse a JSON array of game modes
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let modes: Vec<GameModeData> = serde_json::from_str(json)?;
        Self::new(modes)
    }

    /// Load a JSON catalog file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        let catalog = Self::from_json_str(&json)?;
        info!(path = %path.display(), modes = catalog.modes.len(), "Loaded game mode catalog");
        Ok(catalog)
    }

    /// Check every mode and the uniqueness of code names, reporting all problems at once
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();
        let mut seen = HashSet::new();

        if self.modes.is_empty() {
            problems.push("catalog contains no game modes".to_string());
        }

        for mode in &self.modes {
            if !seen.insert(mode.code_name.as_str()) {
                problems.push(format!("duplicate code_name '{}'", mode.code_name));
            }
            problems.extend(
                mode.problems()
                    .into_iter()
                    .map(|p| format!("{}: {}", mode.code_name, p)),
            );
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::InvalidConfiguration(problems))
        }
    }

    pub fn get(&self, code_name: &str) -> Option<&GameModeData> {
        self.modes.iter().find(|m| m.code_name == code_name)
    }

    /// Look up a mode by code name, failing if it is not in the catalog
    pub fn resolve(&self, code_name: &str) -> Result<GameModeData, ConfigError> {
        self.get(code_name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownGameMode(code_name.to_string()))
    }

    pub fn code_names(&self) -> impl Iterator<Item = &str> {
        self.modes.iter().map(|m| m.code_name.as_str())
    }
}

impl Default for GameModeCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_is_valid() {
        let catalog = GameModeCatalog::builtin();
        assert!(catalog.validate().is_ok());
        assert_eq!(catalog.code_names().collect::<Vec<_>>(), vec!["ffa", "tdm"]);
    }

    #[test]
    fn reports_duplicates_and_bad_modes_together() {
        let json = r#"[
            {"code_name": "ffa"},
            {"code_name": "ffa"},
            {"code_name": "broken", "max_players": 0}
        ]"#;

        match GameModeCatalog::from_json_str(json) {
            Err(ConfigError::InvalidConfiguration(problems)) => {
                assert_eq!(problems.len(), 2);
                assert!(problems.iter().any(|p| p.contains("duplicate code_name 'ffa'")));
                assert!(problems.iter().any(|p| p.starts_with("broken:")));
            }
            other => panic!("expected invalid configuration, got {other:?}"),
        }
    }

    #[test]
    fn empty_catalog_is_rejected() {
        assert!(matches!(
            GameModeCatalog::from_json_str("[]"),
            Err(ConfigError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn resolve_unknown_mode_fails() {
        let catalog = GameModeCatalog::builtin();
        assert_eq!(catalog.resolve("tdm").unwrap().max_team_num, 2);
        assert!(matches!(
            catalog.resolve("capture_the_flag"),
            Err(ConfigError::UnknownGameMode(_))
        ));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(
            GameModeCatalog::from_json_str("{not json"),
            Err(ConfigError::Parse(_))
        ));
    }
}
