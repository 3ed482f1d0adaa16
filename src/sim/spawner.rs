//! Pattern manager
//!
//! Walks a running pattern's obstacle and shard lists against the spawn
//! clock and hands due entries to the caller's spawn callbacks.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::pattern::{Lane, Pattern, ShardKind};
use crate::consts::{BASE_REACTION_TIME_MS, MIN_SPAWN_INTERVAL_MS};

/// Height ratio used when a pattern obstacle leaves it unspecified
pub const DEFAULT_HEIGHT_RATIO: f64 = 0.5;

/// Lifecycle of the pattern manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternPhase {
    /// No pattern loaded
    Idle,
    /// Entries still due or duration not yet elapsed
    Active,
    /// Every entry spawned and duration elapsed
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpawnedObstacle {
    pub lane: Lane,
    pub height_ratio: f64,
    pub time: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpawnedShard {
    pub lane: Lane,
    pub kind: ShardKind,
    pub time: f64,
}

/// Spawn progress through the current pattern
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PatternManagerState {
    pub current_pattern: Option<Arc<Pattern>>,
    pub pattern_start_time: f64,
    pub obstacle_index: usize,
    pub shard_index: usize,
    pub spawned_obstacles: Vec<SpawnedObstacle>,
    pub spawned_shards: Vec<SpawnedShard>,
}

impl Clone for PatternManagerState {
    fn clone(&self) -> Self {
        Self {
            current_pattern: self.current_pattern.clone(),
            pattern_start_time: self.pattern_start_time,
            obstacle_index: self.obstacle_index,
            shard_index: self.shard_index,
            spawned_obstacles: self.spawned_obstacles.clone(),
            spawned_shards: self.spawned_shards.clone(),
        }
    }

    /// Reuses the spawn logs' allocations
    fn clone_from(&mut self, source: &Self) {
        self.current_pattern.clone_from(&source.current_pattern);
        self.pattern_start_time = source.pattern_start_time;
        self.obstacle_index = source.obstacle_index;
        self.shard_index = source.shard_index;
        self.spawned_obstacles.clone_from(&source.spawned_obstacles);
        self.spawned_shards.clone_from(&source.spawned_shards);
    }
}

impl PatternManagerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a pattern and restart its clock at `now`
    pub fn start_pattern(&mut self, pattern: Arc<Pattern>, now: f64) {
        log::debug!("Starting pattern '{}' at {:.0}ms", pattern.id, now);
        self.current_pattern = Some(pattern);
        self.pattern_start_time = now;
        self.obstacle_index = 0;
        self.shard_index = 0;
        self.spawned_obstacles.clear();
        self.spawned_shards.clear();
    }

    /// Spawn every entry due by `now`, in list order.
    ///
    /// Each list stops at its first entry that is not yet due; lists are
    /// expected sorted by `time_offset`. Returns the number of spawns.
    pub fn update_pattern_spawn(
        &mut self,
        now: f64,
        mut spawn_obstacle: impl FnMut(Lane, f64),
        mut spawn_shard: impl FnMut(Lane, ShardKind, Option<f64>),
    ) -> usize {
        let Some(pattern) = self.current_pattern.clone() else {
            return 0;
        };
        let elapsed = now - self.pattern_start_time;
        let mut spawned = 0;

        while let Some(entry) = pattern.obstacles.get(self.obstacle_index) {
            if entry.time_offset > elapsed {
                break;
            }
            let height_ratio = entry.height_ratio.unwrap_or(DEFAULT_HEIGHT_RATIO);
            spawn_obstacle(entry.lane, height_ratio);
            self.spawned_obstacles.push(SpawnedObstacle {
                lane: entry.lane,
                height_ratio,
                time: now,
            });
            self.obstacle_index += 1;
            spawned += 1;
        }

        while let Some(entry) = pattern.shards.get(self.shard_index) {
            if entry.time_offset > elapsed {
                break;
            }
            spawn_shard(entry.lane, entry.kind, entry.position_offset);
            self.spawned_shards.push(SpawnedShard {
                lane: entry.lane,
                kind: entry.kind,
                time: now,
            });
            self.shard_index += 1;
            spawned += 1;
        }

        spawned
    }

    /// True once every entry has spawned and the duration has elapsed
    pub fn is_pattern_complete(&self, now: f64) -> bool {
        match &self.current_pattern {
            Some(pattern) => {
                self.obstacle_index >= pattern.obstacles.len()
                    && self.shard_index >= pattern.shards.len()
                    && now - self.pattern_start_time >= pattern.duration
            }
            None => false,
        }
    }

    pub fn phase(&self, now: f64) -> PatternPhase {
        if self.current_pattern.is_none() {
            PatternPhase::Idle
        } else if self.is_pattern_complete(now) {
            PatternPhase::Complete
        } else {
            PatternPhase::Active
        }
    }

    /// Back to Idle
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Legacy fixed cadence used when pattern spawning is off.
///
/// `max(BASE_REACTION_TIME_MS / (speed / 10), MIN_SPAWN_INTERVAL_MS)`;
/// non-positive or non-finite speeds get the base reaction time.
pub fn calculate_spawn_interval(speed: f64) -> f64 {
    if !speed.is_finite() || speed <= 0.0 {
        return BASE_REACTION_TIME_MS;
    }
    (BASE_REACTION_TIME_MS / (speed / 10.0)).max(MIN_SPAWN_INTERVAL_MS)
}
