//! Game state and core simulation types
//!
//! All state that must survive a rewind or be inspected by the host lives
//! here. The host only ever reads it; `tick` is the sole writer.

use glam::Vec2;
use rand::SeedableRng;
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use super::collision::Orb;
use super::difficulty::DifficultyProgression;
use super::pattern::Lane;
use super::pool::ObjectPool;
use super::rewind::SnapshotBuffer;
use super::shard::PlacedShard;
use super::spawner::PatternManagerState;
use crate::consts::*;
use crate::settings::Settings;

/// Current phase of gameplay
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum GamePhase {
    /// Active gameplay
    Playing,
    /// Game is paused
    Paused,
    /// Fatal hit; waiting for the host to accept or decline a rewind
    RestoreOffered { score_at_death: u64 },
    /// Reverse playback in progress
    Rewinding,
    /// Run ended
    GameOver,
}

/// White/black identity of orbs and obstacles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Polarity {
    #[default]
    White,
    Black,
}

impl Polarity {
    pub fn opposite(self) -> Self {
        match self {
            Polarity::White => Polarity::Black,
            Polarity::Black => Polarity::White,
        }
    }
}

/// An obstacle entity (rectangle anchored to the top or bottom edge)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    /// Resting y the obstacle slides toward after spawning
    pub target_y: f32,
    pub width: f32,
    pub height: f32,
    pub lane: Lane,
    pub polarity: Polarity,
    /// Pass scoring already ran
    pub passed: bool,
    /// Near-miss already evaluated (awarded or no longer possible)
    pub near_miss_checked: bool,
    /// Micro-phasing suppressed an overlap with this obstacle
    pub has_phased: bool,
    /// Harmless for the rest of its life
    pub is_latent: bool,
}

impl Obstacle {
    pub fn new(id: u32, lane: Lane, polarity: Polarity, x: f32, target_y: f32, height: f32) -> Self {
        Self {
            id,
            x,
            y: target_y,
            target_y,
            width: OBSTACLE_WIDTH,
            height,
            lane,
            polarity,
            passed: false,
            near_miss_checked: false,
            has_phased: false,
            is_latent: false,
        }
    }

    /// Min and max corners
    pub fn bounds(&self) -> (Vec2, Vec2) {
        (
            Vec2::new(self.x, self.y),
            Vec2::new(self.x + self.width, self.y + self.height),
        )
    }

    pub fn right_edge(&self) -> f32 {
        self.x + self.width
    }

    pub fn is_off_screen(&self) -> bool {
        self.right_edge() < 0.0
    }
}

/// Timed invincibility. Only one window is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum Invulnerability {
    #[default]
    None,
    /// Brief grace right after a swap
    SwapPhase { until: f64 },
    /// A shield charge absorbed a hit
    Shield { until: f64 },
    /// Just came back from a rewind
    Restored { until: f64 },
}

impl Invulnerability {
    pub fn until(&self) -> Option<f64> {
        match *self {
            Invulnerability::None => None,
            Invulnerability::SwapPhase { until }
            | Invulnerability::Shield { until }
            | Invulnerability::Restored { until } => Some(until),
        }
    }

    pub fn is_active(&self, now: f64) -> bool {
        self.until().is_some_and(|until| now < until)
    }

    /// Replace the current window unless it outlasts the new one
    pub fn grant(&mut self, window: Invulnerability, now: f64) {
        let current = if self.is_active(now) { self.until() } else { None };
        match (current, window.until()) {
            (Some(current), Some(new)) if current > new => {}
            _ => *self = window,
        }
    }

    /// Clear an elapsed window
    pub fn expire(&mut self, now: f64) {
        if self.until().is_some() && !self.is_active(now) {
            *self = Invulnerability::None;
        }
    }
}

/// Swap-timing streak
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RhythmState {
    pub streak: u32,
    pub last_swap: Option<f64>,
    pub last_interval: Option<f64>,
}

impl RhythmState {
    pub fn multiplier(&self) -> f64 {
        1.0 + self.streak.min(RHYTHM_MAX_STREAK) as f64 * RHYTHM_STEP
    }

    /// Record a swap; returns true if the streak changed
    pub fn on_swap(&mut self, now: f64) -> bool {
        let before = self.streak;
        if let Some(last) = self.last_swap {
            let interval = now - last;
            if (RHYTHM_MIN_INTERVAL_MS..=RHYTHM_MAX_INTERVAL_MS).contains(&interval) {
                let steady = self
                    .last_interval
                    .is_some_and(|prev| (interval - prev).abs() <= RHYTHM_TOLERANCE_MS);
                self.streak = if steady { self.streak + 1 } else { 0 };
                self.last_interval = Some(interval);
            } else {
                self.streak = 0;
                self.last_interval = None;
            }
        }
        self.last_swap = Some(now);
        self.streak != before
    }

    /// Drop the streak after a long silence; returns true if it was reset
    pub fn expire(&mut self, now: f64) -> bool {
        let stale = self
            .last_swap
            .is_some_and(|last| now - last > RHYTHM_MAX_INTERVAL_MS);
        if stale && self.streak > 0 {
            self.streak = 0;
            self.last_interval = None;
            return true;
        }
        false
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Consecutive near-miss tracking
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NearMissState {
    pub streak: u32,
    pub last_time: Option<f64>,
}

impl NearMissState {
    /// A streak is live while the last near-miss is inside the window
    pub fn is_active(&self, now: f64) -> bool {
        self.streak > 0
            && self
                .last_time
                .is_some_and(|t| now - t <= NEAR_MISS_STREAK_WINDOW_MS)
    }

    /// Record a near-miss; returns the new streak length
    pub fn register(&mut self, now: f64) -> u32 {
        self.streak = if self.is_active(now) { self.streak + 1 } else { 1 };
        self.last_time = Some(now);
        self.streak
    }

    /// Returns true if a streak just lapsed
    pub fn expire(&mut self, now: f64) -> bool {
        if self.streak > 0 && !self.is_active(now) {
            self.streak = 0;
            return true;
        }
        false
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// The connected orb pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    /// Vertical centre of the connector
    pub y: f32,
    pub target_y: f32,
    /// False: white orb on top. True: black orb on top.
    pub swapped: bool,
    pub connector_length: f32,
}

impl Player {
    fn new(y: f32) -> Self {
        Self {
            y,
            target_y: y,
            swapped: false,
            connector_length: CONNECTOR_BASE_LENGTH,
        }
    }

    pub fn top_polarity(&self) -> Polarity {
        if self.swapped { Polarity::Black } else { Polarity::White }
    }

    /// Polarity of the orb that sits in `lane`
    pub fn polarity_in(&self, lane: Lane) -> Polarity {
        match lane {
            Lane::Top => self.top_polarity(),
            Lane::Bottom => self.top_polarity().opposite(),
        }
    }
}

/// Outbound notifications for the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GameEvent {
    ScoreChanged { score: u64 },
    GameOver { final_score: u64 },
    RhythmChanged { multiplier: f64, streak: u32 },
    NearMissChanged { streak: u32 },
    RestoreOffered { score_at_death: u64, can_restore: bool },
    RestoreComplete,
    ShieldAbsorbed { charges_left: u32 },
    ObstacleDestroyed { id: u32, points: u64 },
    ShardCollected { id: u32, points: u64, near_miss: bool },
    OverdriveStarted { until: f64 },
}

/// Receiver for game events
pub trait EventSink {
    fn on_event(&mut self, event: &GameEvent);
}

impl EventSink for Vec<GameEvent> {
    fn on_event(&mut self, event: &GameEvent) {
        self.push(event.clone());
    }
}

/// Sink that writes every event to the log
#[derive(Debug, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn on_event(&mut self, event: &GameEvent) {
        match event {
            GameEvent::ScoreChanged { .. } => log::trace!("{:?}", event),
            GameEvent::GameOver { final_score } => log::info!("Game over, final score {}", final_score),
            _ => log::debug!("{:?}", event),
        }
    }
}

/// RNG state wrapper for serialization
///
/// Each gameplay call site asks for its own generator; the stream counter
/// makes every draw reproducible from the run seed alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RngState {
    pub seed: u64,
    pub stream: u64,
}

impl RngState {
    pub fn new(seed: u64) -> Self {
        Self { seed, stream: 0 }
    }

    pub fn next_rng(&mut self) -> Pcg32 {
        let rng = Pcg32::seed_from_u64(self.seed ^ self.stream.wrapping_mul(0x9E37_79B9_7F4A_7C15));
        self.stream += 1;
        rng
    }
}

/// Pre-warmed pool sizes
const OBSTACLE_POOL_SIZE: usize = 16;
const SHARD_POOL_SIZE: usize = 8;

/// Complete game state (deterministic, serializable)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameState {
    /// Run seed for reproducibility
    pub seed: u64,
    /// RNG state
    pub rng_state: RngState,
    pub settings: Settings,
    /// Current phase
    pub phase: GamePhase,
    /// Milliseconds of active play (frozen while paused or rewinding)
    pub clock: f64,
    /// Spawn clock fed to the pattern manager (scaled by spawn rate)
    pub spawn_clock: f64,
    /// Spawn-clock time of the last legacy interval spawn
    pub last_interval_spawn: f64,
    pub score: u64,
    /// World scroll speed (px per nominal frame)
    pub game_speed: f64,
    pub player: Player,
    pub midline_y: f32,
    pub obstacles: ObjectPool<Obstacle>,
    pub shards: ObjectPool<PlacedShard>,
    pub patterns: PatternManagerState,
    pub difficulty: DifficultyProgression,
    pub rhythm: RhythmState,
    pub near_miss: NearMissState,
    pub invulnerability: Invulnerability,
    /// Play-clock start of the last swap window
    pub last_swap_phase: Option<f64>,
    /// Destructive bonus state end time
    pub overdrive_until: Option<f64>,
    pub shield_charges: u32,
    pub slow_motion_uses: u32,
    pub slow_motion_until: Option<f64>,
    pub rewind: SnapshotBuffer,
    /// Pending events for the host
    #[serde(skip)]
    pub events: Vec<GameEvent>,
    /// Next entity ID
    next_id: u32,
}

impl GameState {
    /// Create a new game state with the given seed
    pub fn new(seed: u64, settings: Settings) -> Self {
        let mut settings = settings;
        settings.modifiers = settings.modifiers.sanitized();
        let modifiers = settings.modifiers;
        let center = settings.canvas_height / 2.0;

        Self {
            seed,
            rng_state: RngState::new(seed),
            phase: GamePhase::Playing,
            clock: 0.0,
            spawn_clock: 0.0,
            last_interval_spawn: 0.0,
            score: modifiers.starting_score,
            game_speed: BASE_SPEED * modifiers.speed_multiplier,
            player: Player::new(center),
            midline_y: center,
            obstacles: ObjectPool::with_capacity(OBSTACLE_POOL_SIZE),
            shards: ObjectPool::with_capacity(SHARD_POOL_SIZE),
            patterns: PatternManagerState::new(),
            difficulty: DifficultyProgression::new(settings.selection_mode),
            rhythm: RhythmState::default(),
            near_miss: NearMissState::default(),
            invulnerability: Invulnerability::None,
            last_swap_phase: None,
            overdrive_until: None,
            shield_charges: modifiers.shield_charges,
            slow_motion_uses: modifiers.slow_motion_uses,
            slow_motion_until: None,
            rewind: SnapshotBuffer::new(SNAPSHOT_CAPACITY),
            events: Vec::new(),
            next_id: 1,
            settings,
        }
    }

    /// Start a fresh run, clearing every stateful component but keeping
    /// pool capacity
    pub fn restart(&mut self, seed: u64) {
        let mut obstacles = std::mem::take(&mut self.obstacles);
        let mut shards = std::mem::take(&mut self.shards);
        obstacles.reset();
        shards.reset();

        *self = Self::new(seed, self.settings.clone());
        self.obstacles = obstacles;
        self.shards = shards;
        log::info!("Run started (seed {})", seed);
    }

    /// Allocate a new entity ID
    pub fn next_entity_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn player_x(&self) -> f32 {
        self.settings.canvas_width * PLAYER_X_RATIO
    }

    /// Both orbs, top first
    pub fn orbs(&self) -> [Orb; 2] {
        let x = self.player_x();
        let half = self.player.connector_length / 2.0;
        let top = self.player.top_polarity();
        [
            Orb {
                pos: Vec2::new(x, self.player.y - half),
                radius: ORB_RADIUS,
                polarity: top,
            },
            Orb {
                pos: Vec2::new(x, self.player.y + half),
                radius: ORB_RADIUS,
                polarity: top.opposite(),
            },
        ]
    }

    pub fn overdrive_active(&self) -> bool {
        self.overdrive_until.is_some_and(|until| self.clock < until)
    }

    pub fn slow_motion_active(&self) -> bool {
        self.slow_motion_until.is_some_and(|until| self.clock < until)
    }

    pub fn emit(&mut self, event: GameEvent) {
        self.events.push(event);
    }

    /// Take all pending events
    pub fn drain_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    /// Deliver all pending events to a sink
    pub fn dispatch(&mut self, sink: &mut impl EventSink) {
        for event in self.events.drain(..) {
            sink.on_event(&event);
        }
    }

    /// End the run: emit GameOver and drop the rewind history
    pub fn end_run(&mut self) {
        self.phase = GamePhase::GameOver;
        self.rewind.clear();
        let final_score = self.score;
        self.emit(GameEvent::GameOver { final_score });
        log::info!("Run ended with score {}", final_score);
    }
}
