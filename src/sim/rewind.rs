//! Rolling snapshot history and reverse-playback recovery
//!
//! While a life still has its rewind available, every playing frame pushes
//! a snapshot into a fixed ring. A fatal hit can then play the ring
//! backwards and hard-reset the run to the oldest entry.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::difficulty::DifficultyProgression;
use super::shard::PlacedShard;
use super::spawner::PatternManagerState;
use super::state::{GameEvent, GamePhase, GameState, Invulnerability, Obstacle, Player, RngState};
use crate::consts::{POST_RESTORE_INVINCIBILITY_MS, REWIND_DURATION_MS};

/// Everything needed to rebuild the simulation at one frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSnapshot {
    /// Play clock at capture (ms)
    pub timestamp: f64,
    pub spawn_clock: f64,
    pub last_interval_spawn: f64,
    pub score: u64,
    pub game_speed: f64,
    pub player: Player,
    pub midline_y: f32,
    pub obstacles: Vec<Obstacle>,
    pub shards: Vec<PlacedShard>,
    pub patterns: PatternManagerState,
    pub difficulty: DifficultyProgression,
    pub rng_state: RngState,
}

/// Reverse playback in progress
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewindAnimation {
    /// Host timestamp the animation started at
    pub started_at: f64,
    pub duration: f64,
}

impl RewindAnimation {
    pub fn progress(&self, now: f64) -> f64 {
        if self.duration <= 0.0 {
            return 1.0;
        }
        let progress = (now - self.started_at) / self.duration;
        if progress.is_finite() { progress.clamp(0.0, 1.0) } else { 1.0 }
    }
}

/// Ring index shown at `progress` through a rewind of `len` snapshots
pub fn rewind_index(progress: f64, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    let progress = progress.clamp(0.0, 1.0);
    (((1.0 - progress) * (len - 1) as f64).floor() as usize).min(len - 1)
}

/// Fixed-capacity snapshot ring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotBuffer {
    snapshots: VecDeque<GameSnapshot>,
    capacity: usize,
    /// Rewind spent for this life
    pub has_been_used: bool,
    pub animation: Option<RewindAnimation>,
}

impl SnapshotBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            snapshots: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            has_been_used: false,
            animation: None,
        }
    }

    /// Append, evicting the oldest entry when full
    pub fn push(&mut self, snapshot: GameSnapshot) {
        if self.snapshots.len() == self.capacity {
            self.snapshots.pop_front();
        }
        self.snapshots.push_back(snapshot);
    }

    /// Take the oldest entry out of a full ring so its allocations can be
    /// refilled and pushed back
    pub fn evict_if_full(&mut self) -> Option<GameSnapshot> {
        if self.snapshots.len() >= self.capacity {
            self.snapshots.pop_front()
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn oldest(&self) -> Option<&GameSnapshot> {
        self.snapshots.front()
    }

    pub fn newest(&self) -> Option<&GameSnapshot> {
        self.snapshots.back()
    }

    pub fn get(&self, index: usize) -> Option<&GameSnapshot> {
        self.snapshots.get(index)
    }

    /// Drop history and any running animation
    pub fn clear(&mut self) {
        self.snapshots.clear();
        self.animation = None;
    }
}

impl GameState {
    pub fn capture_snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            timestamp: self.clock,
            spawn_clock: self.spawn_clock,
            last_interval_spawn: self.last_interval_spawn,
            score: self.score,
            game_speed: self.game_speed,
            player: self.player.clone(),
            midline_y: self.midline_y,
            obstacles: self.obstacles.iter_active().map(|(_, o)| o.clone()).collect(),
            shards: self.shards.iter_active().map(|(_, s)| s.clone()).collect(),
            patterns: self.patterns.clone(),
            difficulty: self.difficulty.clone(),
            rng_state: self.rng_state.clone(),
        }
    }

    /// Overwrite `snapshot` with this frame, keeping its buffers
    pub fn capture_into(&self, snapshot: &mut GameSnapshot) {
        snapshot.timestamp = self.clock;
        snapshot.spawn_clock = self.spawn_clock;
        snapshot.last_interval_spawn = self.last_interval_spawn;
        snapshot.score = self.score;
        snapshot.game_speed = self.game_speed;
        snapshot.player.clone_from(&self.player);
        snapshot.midline_y = self.midline_y;
        snapshot.obstacles.clear();
        snapshot
            .obstacles
            .extend(self.obstacles.iter_active().map(|(_, o)| o.clone()));
        snapshot.shards.clear();
        snapshot
            .shards
            .extend(self.shards.iter_active().map(|(_, s)| s.clone()));
        snapshot.patterns.clone_from(&self.patterns);
        snapshot.difficulty.clone_from(&self.difficulty);
        snapshot.rng_state.clone_from(&self.rng_state);
    }

    /// Push this frame into the ring while the rewind is still available.
    /// Once the ring is full the evicted entry is refilled in place.
    pub fn record_snapshot(&mut self) {
        if !self.rewind_available() {
            return;
        }
        let snapshot = match self.rewind.evict_if_full() {
            Some(mut recycled) => {
                self.capture_into(&mut recycled);
                recycled
            }
            None => self.capture_snapshot(),
        };
        self.rewind.push(snapshot);
    }

    /// Rewind mode on and not yet spent this life
    pub fn rewind_available(&self) -> bool {
        self.settings.rewind_enabled && !self.rewind.has_been_used
    }

    /// A fatal hit right now could be undone
    pub fn can_restore(&self) -> bool {
        self.rewind_available() && !self.rewind.is_empty()
    }

    /// Hard-reset simulation state to `snapshot`. Streaks and timed bonuses
    /// do not survive.
    pub fn apply_snapshot(&mut self, snapshot: &GameSnapshot) {
        self.clock = snapshot.timestamp;
        self.spawn_clock = snapshot.spawn_clock;
        self.last_interval_spawn = snapshot.last_interval_spawn;
        self.score = snapshot.score;
        self.game_speed = snapshot.game_speed;
        self.player = snapshot.player.clone();
        self.midline_y = snapshot.midline_y;
        self.patterns = snapshot.patterns.clone();
        self.difficulty = snapshot.difficulty.clone();
        self.rng_state = snapshot.rng_state.clone();

        self.obstacles.reset();
        for obstacle in &snapshot.obstacles {
            self.obstacles.acquire_with(obstacle.clone());
        }
        self.shards.reset();
        for shard in &snapshot.shards {
            self.shards.acquire_with(shard.clone());
        }

        self.rhythm.reset();
        self.near_miss.reset();
        self.overdrive_until = None;
        self.slow_motion_until = None;
        self.invulnerability = Invulnerability::None;
        self.last_swap_phase = None;
    }

    /// Start reverse playback. Returns false (and changes nothing) when
    /// there is no history to rewind through.
    pub fn request_restore(&mut self, now: f64) -> bool {
        if !self.can_restore() {
            log::warn!(
                "Restore requested with nothing to rewind (used: {}, buffered: {})",
                self.rewind.has_been_used,
                self.rewind.len()
            );
            return false;
        }
        self.rewind.has_been_used = true;
        self.rewind.animation = Some(RewindAnimation {
            started_at: now,
            duration: REWIND_DURATION_MS,
        });
        self.phase = GamePhase::Rewinding;
        log::info!("Rewinding through {} snapshots", self.rewind.len());
        true
    }

    /// Snapshot the renderer should show at host time `now`
    pub fn rewind_preview(&self, now: f64) -> Option<&GameSnapshot> {
        let animation = self.rewind.animation?;
        self.rewind
            .get(rewind_index(animation.progress(now), self.rewind.len()))
    }

    /// Step the animation; restores the oldest snapshot once it completes.
    /// Returns true on the frame the restore lands.
    pub fn advance_rewind(&mut self, now: f64) -> bool {
        let Some(animation) = self.rewind.animation else {
            return false;
        };
        if animation.progress(now) < 1.0 {
            return false;
        }

        let Some(oldest) = self.rewind.oldest().cloned() else {
            // History vanished mid-animation; nothing to restore to
            self.rewind.clear();
            self.end_run();
            return false;
        };
        self.apply_snapshot(&oldest);
        self.invulnerability = Invulnerability::Restored {
            until: self.clock + POST_RESTORE_INVINCIBILITY_MS,
        };
        self.rewind.clear();
        self.phase = GamePhase::Playing;

        let score = self.score;
        self.emit(GameEvent::RestoreComplete);
        self.emit(GameEvent::ScoreChanged { score });
        log::info!("Restored to {:.0}ms with score {}", self.clock, score);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;
    use crate::sim::pattern::Lane;
    use crate::sim::state::Polarity;

    fn playing_state() -> GameState {
        GameState::new(5, Settings::default())
    }

    #[test]
    fn test_ring_evicts_oldest() {
        let state = playing_state();
        let mut buffer = SnapshotBuffer::new(3);
        for score in 0..5 {
            let mut snapshot = state.capture_snapshot();
            snapshot.score = score;
            buffer.push(snapshot);
        }
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.oldest().map(|s| s.score), Some(2));
        assert_eq!(buffer.newest().map(|s| s.score), Some(4));
    }

    #[test]
    fn test_full_ring_reuses_evicted_buffers() {
        let mut state = playing_state();
        state.rewind = SnapshotBuffer::new(2);
        for _ in 0..6 {
            let id = state.next_entity_id();
            state
                .obstacles
                .acquire_with(Obstacle::new(id, Lane::Top, Polarity::Black, 600.0, 0.0, 120.0));
        }
        state.record_snapshot();

        state.obstacles.reset();
        let id = state.next_entity_id();
        state
            .obstacles
            .acquire_with(Obstacle::new(id, Lane::Bottom, Polarity::White, 300.0, 500.0, 100.0));
        state.score = 7;
        state.record_snapshot();
        state.clock = 50.0;
        state.record_snapshot();

        assert_eq!(state.rewind.len(), 2);
        let newest = state.rewind.newest().unwrap();
        // Refilled from the first entry, which held six obstacles
        assert!(newest.obstacles.capacity() >= 6);
        assert_eq!(newest.obstacles.len(), 1);
        assert_eq!(newest.obstacles[0].id, id);
        assert_eq!(newest.timestamp, 50.0);
        assert_eq!(newest.score, 7);
        assert_eq!(state.rewind.oldest().map(|s| s.obstacles.len()), Some(1));
    }

    #[test]
    fn test_rewind_index_mapping() {
        assert_eq!(rewind_index(0.0, 180), 179);
        assert_eq!(rewind_index(0.5, 180), 89);
        assert_eq!(rewind_index(1.0, 180), 0);
        assert_eq!(rewind_index(2.0, 180), 0);
        assert_eq!(rewind_index(0.3, 1), 0);
        assert_eq!(rewind_index(0.3, 0), 0);
    }

    #[test]
    fn test_restore_with_empty_buffer_is_noop() {
        let mut state = playing_state();
        state.score = 321;
        state.player.y = 250.0;

        assert!(!state.request_restore(1000.0));
        assert!(!state.rewind.has_been_used);
        assert_eq!(state.phase, GamePhase::Playing);
        assert_eq!(state.score, 321);
        assert_eq!(state.player.y, 250.0);
        assert!(state.rewind.animation.is_none());
        assert!(state.events.is_empty());
    }

    #[test]
    fn test_recording_stops_when_disabled_or_used() {
        let mut state = playing_state();
        state.record_snapshot();
        assert_eq!(state.rewind.len(), 1);

        state.rewind.has_been_used = true;
        state.record_snapshot();
        assert_eq!(state.rewind.len(), 1);

        let mut state = GameState::new(
            5,
            Settings {
                rewind_enabled: false,
                ..Default::default()
            },
        );
        state.record_snapshot();
        assert!(state.rewind.is_empty());
        assert!(!state.can_restore());
    }

    #[test]
    fn test_full_rewind_restores_oldest() {
        let mut state = playing_state();
        let id = state.next_entity_id();
        state
            .obstacles
            .acquire_with(Obstacle::new(id, Lane::Top, Polarity::Black, 600.0, 0.0, 120.0));
        state.clock = 100.0;
        state.score = 40;
        state.record_snapshot();

        state.clock = 900.0;
        state.score = 95;
        state.near_miss.streak = 3;
        state.obstacles.reset();
        state.record_snapshot();

        assert!(state.request_restore(10_000.0));
        assert!(state.rewind.has_been_used);
        assert_eq!(state.phase, GamePhase::Rewinding);

        // Playback starts at the newest frame and walks back
        assert_eq!(state.rewind_preview(10_000.0).map(|s| s.score), Some(95));
        assert!(!state.advance_rewind(10_000.0 + REWIND_DURATION_MS / 2.0));
        assert_eq!(state.rewind_preview(10_000.0 + REWIND_DURATION_MS).map(|s| s.score), Some(40));

        assert!(state.advance_rewind(10_000.0 + REWIND_DURATION_MS));
        assert_eq!(state.phase, GamePhase::Playing);
        assert_eq!(state.score, 40);
        assert_eq!(state.clock, 100.0);
        assert_eq!(state.obstacles.active_count(), 1);
        assert_eq!(state.near_miss.streak, 0);
        assert!(state.rewind.is_empty());
        assert_eq!(
            state.invulnerability,
            Invulnerability::Restored {
                until: 100.0 + POST_RESTORE_INVINCIBILITY_MS
            }
        );
        assert_eq!(
            state.drain_events(),
            vec![GameEvent::RestoreComplete, GameEvent::ScoreChanged { score: 40 }]
        );

        // Single use per life
        state.record_snapshot();
        assert!(state.rewind.is_empty());
        assert!(!state.request_restore(20_000.0));
    }
}
