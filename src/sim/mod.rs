//! Deterministic simulation module
//!
//! All gameplay logic lives here. This module must be pure and deterministic:
//! - Host-supplied frame deltas only
//! - Seeded RNG only
//! - Stable iteration order (by pool slot)
//! - No rendering or platform dependencies

pub mod collision;
pub mod difficulty;
pub mod pattern;
pub mod pool;
pub mod rewind;
pub mod shard;
pub mod spawner;
pub mod state;
pub mod tick;

pub use collision::{Contact, Orb, classify_contact, clamp_player, midline_y, movement_bounds};
pub use difficulty::{
    DIFFICULTY_THRESHOLDS, DifficultyProgression, DifficultyThreshold, current_difficulty_threshold,
    select_pattern_by_weight,
};
pub use pattern::{
    Difficulty, Lane, Pattern, PatternObstacle, PatternShard, ShardKind, catalog, default_pattern,
    deserialize_pattern, is_valid_pattern_id, pattern_by_id, patterns_by_difficulty, serialize_pattern,
    validate_pattern,
};
pub use pool::{ObjectPool, PoolHandle};
pub use rewind::{GameSnapshot, SnapshotBuffer};
pub use shard::{PlacedShard, collect_shard};
pub use spawner::{PatternManagerState, PatternPhase, calculate_spawn_interval};
pub use state::{
    EventSink, GameEvent, GamePhase, GameState, Invulnerability, LogSink, Obstacle, Polarity,
};
pub use tick::{RestoreDecision, TickInput, tick};
