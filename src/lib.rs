//! Polarity Dash - simulation core for a two-orb polarity-swap runner
//!
//! Core modules:
//! - `sim`: Deterministic simulation (spawning, collisions, scoring, rewind)
//! - `settings`: Mode flags and run modifiers supplied by the host
//! - `error`: Crate error type

pub mod error;
pub mod settings;
pub mod sim;

pub use error::{Error, Result};
pub use settings::{MidlineMode, RunModifiers, SelectionMode, Settings, SpawnMode};

/// Game configuration constants
pub mod consts {
    /// Nominal frame duration (ms); world speeds are expressed per nominal frame
    pub const FRAME_MS: f64 = 1000.0 / 60.0;
    /// Largest delta a single tick will integrate (ms)
    pub const MAX_DELTA_MS: f64 = 100.0;

    /// Default arena dimensions
    pub const CANVAS_WIDTH: f32 = 800.0;
    pub const CANVAS_HEIGHT: f32 = 600.0;
    /// Player column as a fraction of canvas width
    pub const PLAYER_X_RATIO: f32 = 0.2;

    /// Orb geometry
    pub const ORB_RADIUS: f32 = 12.0;
    /// Per-frame easing factor toward the input target
    pub const PLAYER_EASING: f32 = 0.15;

    /// Connector between the two orbs
    pub const CONNECTOR_BASE_LENGTH: f32 = 80.0;
    pub const CONNECTOR_MAX_LENGTH: f32 = 220.0;
    pub const CONNECTOR_GROWTH_PER_POINT: f32 = 0.02;
    pub const CONNECTOR_EASING: f32 = 0.05;

    /// Dynamic midline oscillation
    pub const MIDLINE_FREQUENCY: f64 = 0.6; // radians per second
    pub const MIDLINE_AMPLITUDE_PER_POINT: f32 = 0.02;
    pub const MIDLINE_MAX_AMPLITUDE_RATIO: f32 = 0.15;

    /// Obstacles
    pub const OBSTACLE_WIDTH: f32 = 40.0;
    pub const OBSTACLE_MIN_HEIGHT: f32 = 16.0;
    pub const OBSTACLE_SLIDE_EASING: f32 = 0.2;

    /// World speed (px per nominal frame)
    pub const BASE_SPEED: f64 = 5.0;
    pub const SPEED_PER_POINT: f64 = 0.001;
    pub const MAX_SPEED: f64 = 14.0;
    pub const MIN_SPEED: f64 = 1.0;

    /// Legacy interval cadence
    pub const BASE_REACTION_TIME_MS: f64 = 1000.0;
    pub const MIN_SPAWN_INTERVAL_MS: f64 = 400.0;

    /// Collision tolerances
    pub const MICRO_PHASING_TOLERANCE: f32 = 4.0;
    pub const NEAR_MISS_DISTANCE: f32 = 18.0;

    /// Scoring
    pub const BASE_PASS_SCORE: f64 = 10.0;
    pub const NEAR_MISS_BASE_BONUS: f64 = 25.0;
    pub const NEAR_MISS_STREAK_CAP: u32 = 10;
    pub const NEAR_MISS_STREAK_WINDOW_MS: f64 = 2000.0;

    /// Overdrive (destructive bonus state)
    pub const OVERDRIVE_STREAK: u32 = 5;
    pub const OVERDRIVE_DURATION_MS: f64 = 5000.0;
    pub const OVERDRIVE_DESTROY_POINTS: f64 = 50.0;

    /// Rhythm
    pub const RHYTHM_TOLERANCE_MS: f64 = 120.0;
    pub const RHYTHM_MIN_INTERVAL_MS: f64 = 200.0;
    pub const RHYTHM_MAX_INTERVAL_MS: f64 = 2000.0;
    pub const RHYTHM_MAX_STREAK: u32 = 10;
    pub const RHYTHM_STEP: f64 = 0.1;

    /// Invincibility windows (ms of play clock)
    pub const SWAP_PHASE_MS: f64 = 80.0;
    /// Minimum time between the starts of two swap windows
    pub const SWAP_PHASE_COOLDOWN_MS: f64 = 250.0;
    pub const SHIELD_INVINCIBILITY_MS: f64 = 1500.0;
    pub const POST_RESTORE_INVINCIBILITY_MS: f64 = 2000.0;

    /// Slow motion
    pub const SLOW_MOTION_DURATION_MS: f64 = 3000.0;
    pub const SLOW_MOTION_FACTOR: f64 = 0.5;

    /// Rewind
    pub const SNAPSHOT_CAPACITY: usize = 180;
    pub const REWIND_DURATION_MS: f64 = 1500.0;
}

/// Replace a non-finite value with a fallback
#[inline]
pub fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() { value } else { fallback }
}

/// Move `current` a fraction of the way toward `target`
#[inline]
pub fn ease_toward(current: f32, target: f32, factor: f32) -> f32 {
    current + (target - current) * factor
}
