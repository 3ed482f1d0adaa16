//! Shard placement and motion
//!
//! Safe shards sit in the gap between obstacles; risky shards hug an
//! obstacle edge and wobble harder. Motion parameters are rolled once at
//! spawn from the run's seeded RNG, so a shard's path is a pure function of
//! time afterwards.

use std::f32::consts::TAU;
use std::ops::Range;

use glam::Vec2;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::pattern::{Lane, ShardKind};
use super::state::Obstacle;

pub const SHARD_RADIUS: f32 = 10.0;
pub const SAFE_SHARD_VALUE: u32 = 1;
pub const RISKY_SHARD_VALUE: u32 = 3;
/// Added (never multiplied) when a shard is taken during a near-miss streak
pub const NEAR_MISS_SHARD_BONUS: u32 = 5;

/// One axis of sinusoidal motion
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MotionAxis {
    pub amplitude: f32,
    /// Radians per second
    pub frequency: f32,
    pub phase: f32,
}

impl MotionAxis {
    /// Offset from base at `elapsed_ms` after spawn
    pub fn offset(&self, elapsed_ms: f64) -> f32 {
        self.amplitude * (self.frequency * (elapsed_ms / 1000.0) as f32 + self.phase).sin()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ShardMovement {
    pub vertical: MotionAxis,
    pub horizontal: MotionAxis,
}

/// Sampling ranges for one axis
#[derive(Debug, Clone, PartialEq)]
pub struct AxisRange {
    pub amplitude: Range<f32>,
    pub frequency: Range<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MotionRanges {
    pub vertical: AxisRange,
    pub horizontal: AxisRange,
}

/// Risky ranges sit strictly above safe ranges on every axis
pub fn motion_ranges(kind: ShardKind) -> MotionRanges {
    match kind {
        ShardKind::Safe => MotionRanges {
            vertical: AxisRange {
                amplitude: 2.0..6.0,
                frequency: 1.0..2.0,
            },
            horizontal: AxisRange {
                amplitude: 1.0..3.0,
                frequency: 0.5..1.5,
            },
        },
        ShardKind::Risky => MotionRanges {
            vertical: AxisRange {
                amplitude: 8.0..14.0,
                frequency: 2.5..4.0,
            },
            horizontal: AxisRange {
                amplitude: 4.0..8.0,
                frequency: 2.0..3.0,
            },
        },
    }
}

fn roll_axis<R: Rng + ?Sized>(range: &AxisRange, rng: &mut R) -> MotionAxis {
    MotionAxis {
        amplitude: rng.random_range(range.amplitude.clone()),
        frequency: rng.random_range(range.frequency.clone()),
        phase: rng.random_range(0.0..TAU),
    }
}

pub fn random_movement<R: Rng + ?Sized>(kind: ShardKind, rng: &mut R) -> ShardMovement {
    let ranges = motion_ranges(kind);
    ShardMovement {
        vertical: roll_axis(&ranges.vertical, rng),
        horizontal: roll_axis(&ranges.horizontal, rng),
    }
}

/// Tunables for shard placement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlacementConfig {
    pub canvas_height: f32,
    /// Where in the gap a safe shard sits (0 = gap start, 1 = gap end)
    pub safe_gap_ratio: f32,
    /// Distance a risky shard keeps from the obstacle edge
    pub risky_edge_distance: f32,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            canvas_height: crate::consts::CANVAS_HEIGHT,
            safe_gap_ratio: 0.5,
            risky_edge_distance: 20.0,
        }
    }
}

/// Position inside the gap between two obstacles
pub fn place_safe(lane: Lane, gap_start: f32, gap_end: f32, config: &PlacementConfig) -> Vec2 {
    let x = gap_start + (gap_end - gap_start) * config.safe_gap_ratio;
    let y = match lane {
        Lane::Top => config.canvas_height * 0.25,
        Lane::Bottom => config.canvas_height * 0.75,
    };
    Vec2::new(x, y)
}

/// Position just outside an obstacle's free edge
pub fn place_risky(lane: Lane, obstacle: &Obstacle, config: &PlacementConfig) -> Vec2 {
    let x = obstacle.x + config.risky_edge_distance;
    let y = match lane {
        Lane::Top => obstacle.target_y + obstacle.height + config.risky_edge_distance,
        Lane::Bottom => obstacle.target_y - config.risky_edge_distance,
    };
    Vec2::new(x, y)
}

/// A collectible in the world
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlacedShard {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub base_x: f32,
    pub base_y: f32,
    pub lane: Lane,
    pub kind: ShardKind,
    pub value: u32,
    pub collected: bool,
    pub movement: ShardMovement,
    /// Play-clock time of spawn (ms)
    pub spawn_time: f64,
}

impl PlacedShard {
    pub fn new(id: u32, lane: Lane, kind: ShardKind, base: Vec2, movement: ShardMovement, now: f64) -> Self {
        let value = match kind {
            ShardKind::Safe => SAFE_SHARD_VALUE,
            ShardKind::Risky => RISKY_SHARD_VALUE,
        };
        let mut shard = Self {
            id,
            x: base.x,
            y: base.y,
            base_x: base.x,
            base_y: base.y,
            lane,
            kind,
            value,
            collected: false,
            movement,
            spawn_time: now,
        };
        shard.update_position(now);
        shard
    }

    /// Recompute the oscillating position at `now`
    pub fn update_position(&mut self, now: f64) {
        let elapsed = now - self.spawn_time;
        self.x = self.base_x + self.movement.horizontal.offset(elapsed);
        self.y = self.base_y + self.movement.vertical.offset(elapsed);
    }

    pub fn pos(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    pub fn is_off_screen(&self) -> bool {
        self.base_x + self.movement.horizontal.amplitude + SHARD_RADIUS < 0.0
    }
}

/// Points for collecting `shard`
pub fn collect_shard(shard: &PlacedShard, is_near_miss: bool) -> u32 {
    if is_near_miss {
        shard.value + NEAR_MISS_SHARD_BONUS
    } else {
        shard.value
    }
}
