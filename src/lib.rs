//! Arena game mode - team assignment, score and lives bookkeeping, object
//! placement and the match lifecycle for a small arena ship game

pub mod config;
pub mod game;
pub mod util;
