//! Match simulation: roster bookkeeping, arena placement, lifecycle and the host tick loop

pub mod events;
pub mod r#match;
pub mod placement;
pub mod roster;
pub mod runner;

pub use events::{EndReason, EventBus, MatchEvent, SubscriptionId};
pub use placement::{ArenaObject, ObjectId, ObjectKind, Placement, PlacementEngine};
pub use r#match::{GameMatch, JoinOutcome, MatchPhase, MatchSnapshot, PlayerSession};
pub use roster::{Lives, PlayerIdentity, PlayerKey, Roster, RosterError, TeamId};
pub use runner::{MatchCommand, MatchHandle, MatchRunner, RunnerError};
