//! Per-frame simulation tick
//!
//! Core game loop that advances the run by one host frame.

use std::cmp::Ordering;

use rand::Rng;

use super::collision::{Contact, clamp_player, classify_contact, midline_y};
use super::pattern::{Lane, ShardKind, catalog, default_pattern};
use super::pool::PoolHandle;
use super::shard::{PlacedShard, SHARD_RADIUS, collect_shard, place_risky, place_safe, random_movement};
use super::spawner::{PatternPhase, calculate_spawn_interval};
use super::state::{GameEvent, GamePhase, GameState, Invulnerability, Obstacle, Polarity};
use crate::consts::*;
use crate::settings::SpawnMode;
use crate::{ease_toward, finite_or};

/// Host answer to a restore offer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreDecision {
    Accept,
    Decline,
}

/// Input commands for a single tick
#[derive(Debug, Clone, Default)]
pub struct TickInput {
    /// Host timestamp (ms); drives the rewind animation
    pub now: f64,
    /// Time since the previous frame (ms)
    pub delta_time: f64,
    /// Desired connector centre (pointer/touch y)
    pub target_y: Option<f32>,
    /// Swap the orbs' polarity positions
    pub swap: bool,
    /// Spend a slow-motion charge
    pub slow_motion: bool,
    /// Pause toggle
    pub pause: bool,
    /// Answer to a pending restore offer
    pub restore: Option<RestoreDecision>,
    /// Headless mode - the core plays itself
    pub autopilot: bool,
}

/// Advance the game state by one frame
pub fn tick(state: &mut GameState, input: &TickInput) {
    // Handle pause toggle
    if input.pause {
        match state.phase {
            GamePhase::Playing => {
                state.phase = GamePhase::Paused;
                return;
            }
            GamePhase::Paused => state.phase = GamePhase::Playing,
            _ => {}
        }
    }

    match state.phase {
        GamePhase::Paused | GamePhase::GameOver => return,
        GamePhase::RestoreOffered { .. } => {
            match input.restore {
                Some(RestoreDecision::Accept) => {
                    if !state.request_restore(input.now) {
                        state.end_run();
                    }
                }
                Some(RestoreDecision::Decline) => state.end_run(),
                None => {}
            }
            return;
        }
        GamePhase::Rewinding => {
            state.advance_rewind(input.now);
            return;
        }
        GamePhase::Playing => {}
    }

    let mut input = input.clone();
    if input.autopilot {
        autopilot(state, &mut input);
    }

    let dt = finite_or(input.delta_time, 0.0).clamp(0.0, MAX_DELTA_MS);
    let score_before = state.score;
    state.clock += dt;
    let now = state.clock;

    expire_timers(state, now);

    if input.slow_motion && state.slow_motion_uses > 0 && !state.slow_motion_active() {
        state.slow_motion_uses -= 1;
        state.slow_motion_until = Some(now + SLOW_MOTION_DURATION_MS);
        log::debug!("Slow motion until {:.0}ms ({} left)", now + SLOW_MOTION_DURATION_MS, state.slow_motion_uses);
    }

    if input.swap {
        state.player.swapped = !state.player.swapped;
        let cooled = state
            .last_swap_phase
            .is_none_or(|started| now - started >= SWAP_PHASE_COOLDOWN_MS);
        if cooled && !state.invulnerability.is_active(now) {
            state
                .invulnerability
                .grant(Invulnerability::SwapPhase { until: now + SWAP_PHASE_MS }, now);
            state.last_swap_phase = Some(now);
        }
        if state.rhythm.on_swap(now) {
            emit_rhythm(state);
        }
    }

    state.game_speed = game_speed(state.score, state.settings.modifiers.speed_multiplier);
    let time_scale = if state.slow_motion_active() { SLOW_MOTION_FACTOR } else { 1.0 };
    let world_step = (state.game_speed * dt / FRAME_MS * time_scale) as f32;

    update_player(state, input.target_y);
    move_world(state, world_step, now);

    state.spawn_clock += dt * state.settings.modifiers.spawn_rate_multiplier * time_scale;
    match state.settings.spawn_mode {
        SpawnMode::Patterns => spawn_from_patterns(state),
        SpawnMode::Interval => spawn_on_interval(state),
    }

    if resolve_collisions(state) {
        handle_fatal_hit(state);
    } else {
        score_passes(state);
        collect_shards(state);
        state.obstacles.retain_active(|o| !o.is_off_screen());
        state.shards.retain_active(|s| !s.collected && !s.is_off_screen());
        state.record_snapshot();
    }

    if state.score != score_before {
        let score = state.score;
        state.emit(GameEvent::ScoreChanged { score });
    }
}

/// World speed at `score`; never non-finite and never below the safe minimum
pub fn game_speed(score: u64, speed_multiplier: f64) -> f64 {
    let speed = (BASE_SPEED + score as f64 * SPEED_PER_POINT).min(MAX_SPEED) * speed_multiplier;
    finite_or(speed, MIN_SPEED).max(MIN_SPEED)
}

/// Connector length the orbs grow toward at `score`
pub fn connector_target(score: u64) -> f32 {
    (CONNECTOR_BASE_LENGTH + score as f32 * CONNECTOR_GROWTH_PER_POINT).min(CONNECTOR_MAX_LENGTH)
}

/// Add points, ignoring anything non-finite or negative
fn add_points(state: &mut GameState, points: f64) -> u64 {
    let points = if points.is_finite() && points > 0.0 { points.round() as u64 } else { 0 };
    state.score = state.score.saturating_add(points);
    points
}

fn emit_rhythm(state: &mut GameState) {
    let multiplier = state.rhythm.multiplier();
    let streak = state.rhythm.streak;
    state.emit(GameEvent::RhythmChanged { multiplier, streak });
}

fn expire_timers(state: &mut GameState, now: f64) {
    state.invulnerability.expire(now);
    if state.overdrive_until.is_some_and(|until| now >= until) {
        state.overdrive_until = None;
        log::debug!("Overdrive ended");
    }
    if state.slow_motion_until.is_some_and(|until| now >= until) {
        state.slow_motion_until = None;
    }
    if state.rhythm.expire(now) {
        emit_rhythm(state);
    }
    if state.near_miss.expire(now) {
        state.emit(GameEvent::NearMissChanged { streak: 0 });
    }
}

/// Pick the swap state that keeps the next obstacle's lane safe
fn autopilot(state: &GameState, input: &mut TickInput) {
    let player_left = state.player_x() - ORB_RADIUS;
    let next = state
        .obstacles
        .iter_active()
        .map(|(_, o)| o)
        .filter(|o| !o.passed && !o.is_latent && o.right_edge() >= player_left)
        .min_by(|a, b| a.x.partial_cmp(&b.x).unwrap_or(Ordering::Equal).then(a.id.cmp(&b.id)));

    input.target_y = Some(state.midline_y);
    if let Some(obstacle) = next {
        let wants_swapped = match obstacle.lane {
            Lane::Top => obstacle.polarity == Polarity::Black,
            Lane::Bottom => obstacle.polarity == Polarity::White,
        };
        input.swap = wants_swapped != state.player.swapped;
    }
}

fn update_player(state: &mut GameState, target_y: Option<f32>) {
    let height = state.settings.canvas_height;
    if let Some(target) = target_y.filter(|t| t.is_finite()) {
        state.player.target_y = target;
    }

    state.player.connector_length = ease_toward(
        state.player.connector_length,
        connector_target(state.score),
        CONNECTOR_EASING,
    );
    state.midline_y = midline_y(state.settings.midline_mode, state.clock, state.score, height);

    let eased = ease_toward(state.player.y, state.player.target_y, PLAYER_EASING);
    state.player.y = clamp_player(
        eased,
        state.player.connector_length,
        ORB_RADIUS,
        state.midline_y,
        height,
    );
}

fn move_world(state: &mut GameState, step: f32, now: f64) {
    for obstacle in state.obstacles.iter_active_mut() {
        obstacle.x -= step;
        obstacle.y = ease_toward(obstacle.y, obstacle.target_y, OBSTACLE_SLIDE_EASING);
        if (obstacle.y - obstacle.target_y).abs() < 0.5 {
            obstacle.y = obstacle.target_y;
        }
    }
    for shard in state.shards.iter_active_mut() {
        shard.base_x -= step;
        shard.update_position(now);
    }
}

fn spawn_from_patterns(state: &mut GameState) {
    let spawn_now = state.spawn_clock;
    if matches!(state.patterns.phase(spawn_now), PatternPhase::Idle | PatternPhase::Complete) {
        let mut rng = state.rng_state.next_rng();
        let pattern = state
            .difficulty
            .next_pattern(catalog(), state.score as f64, &mut rng)
            .unwrap_or_else(default_pattern);
        state.patterns.start_pattern(pattern, spawn_now);
    }

    let mut obstacles = Vec::new();
    let mut shards = Vec::new();
    state.patterns.update_pattern_spawn(
        spawn_now,
        |lane, ratio| obstacles.push((lane, ratio)),
        |lane, kind, offset| shards.push((lane, kind, offset)),
    );

    let mut batch: Vec<(Lane, Polarity)> = Vec::new();
    for (lane, ratio) in obstacles {
        // Obstacles entering together in opposite lanes are passable with one swap state
        let paired = batch.iter().find(|(l, _)| *l != lane).map(|(_, p)| p.opposite());
        let polarity = spawn_obstacle(state, lane, ratio, paired);
        batch.push((lane, polarity));
    }
    for (lane, kind, offset) in shards {
        spawn_shard(state, lane, kind, offset);
    }
}

fn spawn_on_interval(state: &mut GameState) {
    if state.spawn_clock - state.last_interval_spawn < calculate_spawn_interval(state.game_speed) {
        return;
    }
    state.last_interval_spawn = state.spawn_clock;
    let mut rng = state.rng_state.next_rng();
    let lane = if rng.random_bool(0.5) { Lane::Top } else { Lane::Bottom };
    let ratio = rng.random_range(0.3..=0.9);
    spawn_obstacle(state, lane, ratio, None);
}

/// Place a new obstacle at the right edge; it slides in from its lane's
/// screen edge. Returns the polarity it was given.
fn spawn_obstacle(state: &mut GameState, lane: Lane, height_ratio: f64, polarity: Option<Polarity>) -> Polarity {
    let canvas_height = state.settings.canvas_height;
    let midline = state.midline_y;
    let lane_extent = match lane {
        Lane::Top => midline,
        Lane::Bottom => canvas_height - midline,
    };
    // Ratio 1.0 reaches the midline; lower ratios leave part of the
    // connector's reach open
    let clearance = (1.0 - height_ratio.clamp(0.0, 1.0) as f32) * state.player.connector_length;
    let height = (lane_extent - clearance).max(OBSTACLE_MIN_HEIGHT);
    let target_y = match lane {
        Lane::Top => 0.0,
        Lane::Bottom => canvas_height - height,
    };

    let polarity = polarity.unwrap_or_else(|| {
        let mut rng = state.rng_state.next_rng();
        if rng.random_bool(0.5) { Polarity::White } else { Polarity::Black }
    });

    let id = state.next_entity_id();
    let mut obstacle = Obstacle::new(id, lane, polarity, state.settings.canvas_width, target_y, height);
    obstacle.y = match lane {
        Lane::Top => -height,
        Lane::Bottom => canvas_height,
    };
    state.obstacles.acquire_with(obstacle);
    polarity
}

fn spawn_shard(state: &mut GameState, lane: Lane, kind: ShardKind, position_offset: Option<f64>) {
    let config = state.settings.placement();
    let width = state.settings.canvas_width;

    // Most recent obstacle in the lane anchors the shard
    let reference = state
        .obstacles
        .iter_active()
        .map(|(_, o)| o)
        .filter(|o| o.lane == lane)
        .max_by_key(|o| o.id)
        .cloned();

    let mut base = match (kind, &reference) {
        (ShardKind::Risky, Some(obstacle)) => place_risky(lane, obstacle, &config),
        _ => {
            let gap_start = reference.as_ref().map_or(width, |o| o.right_edge().max(width));
            place_safe(lane, gap_start, gap_start + state.settings.safe_gap_span, &config)
        }
    };
    base.x += position_offset.filter(|o| o.is_finite()).unwrap_or(0.0) as f32;

    let mut rng = state.rng_state.next_rng();
    let movement = random_movement(kind, &mut rng);
    let id = state.next_entity_id();
    let now = state.clock;
    state.shards.acquire_with(PlacedShard::new(id, lane, kind, base, movement, now));
}

/// Resolve orb/obstacle contacts. Returns true on an unabsorbed hit.
fn resolve_collisions(state: &mut GameState) -> bool {
    let orbs = state.orbs();
    let midline = state.midline_y;
    let phasing_tolerance = state.settings.micro_phasing_tolerance;
    let now = state.clock;
    let handles: Vec<PoolHandle> = state.obstacles.iter_active().map(|(h, _)| h).collect();

    for handle in handles {
        let Some(obstacle) = state.obstacles.get(handle) else {
            continue;
        };
        if obstacle.is_latent {
            continue;
        }

        let mut hit = false;
        let mut phased = false;
        let mut near_miss = false;
        for orb in &orbs {
            match classify_contact(orb, obstacle, midline, phasing_tolerance, NEAR_MISS_DISTANCE) {
                Contact::Hit => hit = true,
                Contact::Phased => phased = true,
                Contact::NearMiss { .. } => near_miss = true,
                Contact::Clear | Contact::Permeable => {}
            }
        }
        let checked = obstacle.near_miss_checked;

        if phased {
            if let Some(obstacle) = state.obstacles.get_mut(handle) {
                obstacle.has_phased = true;
            }
        }

        if hit {
            if !absorb_hit(state, handle, now) {
                return true;
            }
        } else if near_miss && !checked && !state.invulnerability.is_active(now) {
            register_near_miss(state, handle, now);
        }
    }
    false
}

/// Try every way of surviving a hit. Returns false when the hit is fatal.
fn absorb_hit(state: &mut GameState, handle: PoolHandle, now: f64) -> bool {
    match state.invulnerability {
        // Covers the polarity flip only; the obstacle stays dangerous
        Invulnerability::SwapPhase { until } if now < until => return true,
        Invulnerability::Shield { until } | Invulnerability::Restored { until } if now < until => {
            if let Some(obstacle) = state.obstacles.get_mut(handle) {
                obstacle.is_latent = true;
            }
            return true;
        }
        _ => {}
    }

    if state.overdrive_active() {
        let id = state.obstacles.get(handle).map_or(0, |o| o.id);
        state.obstacles.release(handle);
        let reward = OVERDRIVE_DESTROY_POINTS * state.settings.modifiers.score_multiplier;
        let points = add_points(state, reward);
        state.emit(GameEvent::ObstacleDestroyed { id, points });
        return true;
    }

    if state.shield_charges > 0 {
        state.shield_charges -= 1;
        if let Some(obstacle) = state.obstacles.get_mut(handle) {
            obstacle.is_latent = true;
        }
        state.invulnerability.grant(
            Invulnerability::Shield {
                until: now + SHIELD_INVINCIBILITY_MS,
            },
            now,
        );
        state.rhythm.reset();
        state.near_miss.reset();
        let charges_left = state.shield_charges;
        state.emit(GameEvent::ShieldAbsorbed { charges_left });
        emit_rhythm(state);
        state.emit(GameEvent::NearMissChanged { streak: 0 });
        log::debug!("Shield absorbed a hit ({} left)", charges_left);
        return true;
    }

    false
}

fn register_near_miss(state: &mut GameState, handle: PoolHandle, now: f64) {
    if let Some(obstacle) = state.obstacles.get_mut(handle) {
        obstacle.near_miss_checked = true;
    }
    let streak = state.near_miss.register(now);
    let bonus = NEAR_MISS_BASE_BONUS
        * streak.min(NEAR_MISS_STREAK_CAP) as f64
        * state.settings.modifiers.score_multiplier;
    add_points(state, bonus);
    state.emit(GameEvent::NearMissChanged { streak });

    if streak >= OVERDRIVE_STREAK && !state.overdrive_active() {
        let until = now + OVERDRIVE_DURATION_MS;
        state.overdrive_until = Some(until);
        state.emit(GameEvent::OverdriveStarted { until });
        log::debug!("Overdrive until {:.0}ms", until);
    }
}

/// Offer a rewind when one is possible, otherwise end the run
fn handle_fatal_hit(state: &mut GameState) {
    let score_at_death = state.score;
    if !state.settings.rewind_enabled {
        state.end_run();
        return;
    }

    let can_restore = state.can_restore();
    state.emit(GameEvent::RestoreOffered {
        score_at_death,
        can_restore,
    });
    if can_restore {
        state.phase = GamePhase::RestoreOffered { score_at_death };
        log::info!("Fatal hit at score {}, rewind offered", score_at_death);
    } else {
        state.end_run();
    }
}

fn score_passes(state: &mut GameState) {
    let pass_line = state.player_x() - ORB_RADIUS;
    let multiplier = state.rhythm.multiplier() * state.settings.modifiers.score_multiplier;
    let mut earned = 0.0;

    for obstacle in state.obstacles.iter_active_mut() {
        if obstacle.passed || obstacle.right_edge() >= pass_line {
            continue;
        }
        obstacle.passed = true;
        obstacle.near_miss_checked = true;
        if !obstacle.is_latent {
            earned += BASE_PASS_SCORE * multiplier;
        }
    }
    add_points(state, earned);
}

fn collect_shards(state: &mut GameState) {
    let orbs = state.orbs();
    let near_miss = state.near_miss.is_active(state.clock);
    let mut collected = Vec::new();

    for shard in state.shards.iter_active_mut() {
        if shard.collected {
            continue;
        }
        let touching = orbs
            .iter()
            .any(|orb| orb.pos.distance(shard.pos()) < orb.radius + SHARD_RADIUS);
        if touching {
            shard.collected = true;
            collected.push((shard.id, collect_shard(shard, near_miss)));
        }
    }

    for (id, value) in collected {
        let points = add_points(state, value as f64);
        state.emit(GameEvent::ShardCollected { id, points, near_miss });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{RunModifiers, Settings};
    use crate::sim::shard::ShardMovement;
    use glam::Vec2;

    fn frame(now: f64) -> TickInput {
        TickInput {
            now,
            delta_time: FRAME_MS,
            ..Default::default()
        }
    }

    fn no_rewind() -> Settings {
        Settings {
            rewind_enabled: false,
            ..Default::default()
        }
    }

    /// A black obstacle reaching down over the resting white top orb
    fn add_top_obstacle(state: &mut GameState, height: f32) -> PoolHandle {
        let id = state.next_entity_id();
        state
            .obstacles
            .acquire_with(Obstacle::new(id, Lane::Top, Polarity::Black, 140.0, 0.0, height))
    }

    #[test]
    fn test_tick_pause() {
        let mut state = GameState::new(12345, Settings::default());
        tick(&mut state, &frame(16.0));
        let clock = state.clock;

        let pause = TickInput {
            pause: true,
            ..frame(32.0)
        };
        tick(&mut state, &pause);
        assert_eq!(state.phase, GamePhase::Paused);
        tick(&mut state, &frame(48.0));
        assert_eq!(state.clock, clock);

        // Unpause
        tick(&mut state, &pause);
        assert_eq!(state.phase, GamePhase::Playing);
        assert!(state.clock > clock);
    }

    #[test]
    fn test_first_frame_starts_a_basic_pattern() {
        let mut state = GameState::new(3, Settings::default());
        tick(&mut state, &frame(16.0));
        let pattern = state.patterns.current_pattern.clone().unwrap();
        assert_eq!(pattern.difficulty, crate::sim::pattern::Difficulty::Basic);
        assert!(state.obstacles.active_count() >= 1);
        for (_, obstacle) in state.obstacles.iter_active() {
            assert!(obstacle.height >= OBSTACLE_MIN_HEIGHT);
            assert!(obstacle.x <= state.settings.canvas_width);
        }
    }

    #[test]
    fn test_fatal_hit_ends_run() {
        let mut state = GameState::new(1, no_rewind());
        add_top_obstacle(&mut state, 280.0);
        tick(&mut state, &frame(16.0));

        assert_eq!(state.phase, GamePhase::GameOver);
        let events = state.drain_events();
        assert!(events.contains(&GameEvent::GameOver { final_score: 0 }));

        // Nothing moves after the run ends
        let clock = state.clock;
        tick(&mut state, &frame(32.0));
        assert_eq!(state.clock, clock);
    }

    #[test]
    fn test_shield_absorbs_hit() {
        let settings = Settings {
            modifiers: RunModifiers {
                shield_charges: 1,
                ..Default::default()
            },
            ..no_rewind()
        };
        let mut state = GameState::new(1, settings);
        let handle = add_top_obstacle(&mut state, 280.0);
        state.near_miss.streak = 2;
        state.near_miss.last_time = Some(0.0);

        tick(&mut state, &frame(16.0));
        assert_eq!(state.phase, GamePhase::Playing);
        assert_eq!(state.shield_charges, 0);
        assert!(state.obstacles.get(handle).unwrap().is_latent);
        assert!(matches!(state.invulnerability, Invulnerability::Shield { .. }));
        assert_eq!(state.near_miss.streak, 0);
        assert!(state.drain_events().contains(&GameEvent::ShieldAbsorbed { charges_left: 0 }));

        // Latent obstacle stays harmless after the window
        state.invulnerability = Invulnerability::None;
        tick(&mut state, &frame(32.0));
        assert_eq!(state.phase, GamePhase::Playing);
    }

    #[test]
    fn test_overdrive_destroys_obstacle() {
        let mut state = GameState::new(1, no_rewind());
        let handle = add_top_obstacle(&mut state, 280.0);
        state.overdrive_until = Some(10_000.0);

        tick(&mut state, &frame(16.0));
        assert_eq!(state.phase, GamePhase::Playing);
        assert!(!state.obstacles.is_active(handle));
        assert_eq!(state.score, OVERDRIVE_DESTROY_POINTS as u64);
        let events = state.drain_events();
        assert!(events.iter().any(|e| matches!(e, GameEvent::ObstacleDestroyed { points: 50, .. })));
        assert!(events.contains(&GameEvent::ScoreChanged { score: 50 }));
    }

    #[test]
    fn test_swap_turns_hit_into_pass_through() {
        let mut state = GameState::new(1, no_rewind());
        add_top_obstacle(&mut state, 280.0);
        let swap = TickInput {
            swap: true,
            ..frame(16.0)
        };
        tick(&mut state, &swap);
        assert!(state.player.swapped);
        assert_eq!(state.phase, GamePhase::Playing);

        // Still overlapping once the swap window ends, but now same polarity
        for i in 2..10 {
            tick(&mut state, &frame(16.0 * i as f64));
        }
        assert_eq!(state.phase, GamePhase::Playing);
        assert_eq!(state.invulnerability, Invulnerability::None);
    }

    #[test]
    fn test_near_miss_awards_bonus_once() {
        let mut state = GameState::new(1, no_rewind());
        // Bottom edge 8px above the top orb's edge
        let handle = add_top_obstacle(&mut state, 240.0);

        tick(&mut state, &frame(16.0));
        assert_eq!(state.near_miss.streak, 1);
        assert!(state.obstacles.get(handle).unwrap().near_miss_checked);
        assert_eq!(state.score, NEAR_MISS_BASE_BONUS as u64);
        assert!(state.drain_events().contains(&GameEvent::NearMissChanged { streak: 1 }));

        tick(&mut state, &frame(32.0));
        assert_eq!(state.near_miss.streak, 1);
        assert_eq!(state.score, NEAR_MISS_BASE_BONUS as u64);
    }

    #[test]
    fn test_pass_scores_once() {
        let mut state = GameState::new(1, no_rewind());
        let id = state.next_entity_id();
        let handle = state
            .obstacles
            .acquire_with(Obstacle::new(id, Lane::Top, Polarity::Black, 100.0, 0.0, 50.0));

        tick(&mut state, &frame(16.0));
        assert!(state.obstacles.get(handle).unwrap().passed);
        assert_eq!(state.score, BASE_PASS_SCORE as u64);
        tick(&mut state, &frame(32.0));
        assert_eq!(state.score, BASE_PASS_SCORE as u64);
    }

    #[test]
    fn test_shard_collection() {
        let mut state = GameState::new(1, no_rewind());
        let id = state.next_entity_id();
        let top_orb = state.orbs()[0].pos;
        state.shards.acquire_with(PlacedShard::new(
            id,
            Lane::Top,
            ShardKind::Safe,
            Vec2::new(top_orb.x, top_orb.y),
            ShardMovement::default(),
            0.0,
        ));

        tick(&mut state, &frame(16.0));
        assert_eq!(state.score, 1);
        assert!(state.drain_events().contains(&GameEvent::ShardCollected {
            id,
            points: 1,
            near_miss: false
        }));
        assert!(state.shards.iter_active().all(|(_, s)| s.id != id));
    }

    #[test]
    fn test_slow_motion_halves_world_speed() {
        let settings = Settings {
            modifiers: RunModifiers {
                slow_motion_uses: 1,
                ..Default::default()
            },
            ..no_rewind()
        };
        let mut state = GameState::new(1, settings);
        let id = state.next_entity_id();
        let handle = state
            .obstacles
            .acquire_with(Obstacle::new(id, Lane::Top, Polarity::White, 600.0, 0.0, 50.0));

        let slow = TickInput {
            slow_motion: true,
            ..frame(16.0)
        };
        tick(&mut state, &slow);
        assert_eq!(state.slow_motion_uses, 0);
        assert!(state.slow_motion_active());
        let x = state.obstacles.get(handle).unwrap().x;
        assert!((x - (600.0 - BASE_SPEED as f32 * 0.5)).abs() < 1e-3);
    }

    #[test]
    fn test_interval_mode_spawns_on_cadence() {
        let settings = Settings {
            spawn_mode: SpawnMode::Interval,
            ..no_rewind()
        };
        let mut state = GameState::new(9, settings);
        let interval = calculate_spawn_interval(BASE_SPEED);
        let frames = (interval / FRAME_MS).ceil() as usize + 1;
        for i in 1..=frames {
            tick(&mut state, &frame(i as f64 * FRAME_MS));
        }
        assert!(state.obstacles.active_count() >= 1);
        assert!(state.patterns.current_pattern.is_none());
        assert!(state.last_interval_spawn > 0.0);
    }

    #[test]
    fn test_rewind_offer_accept_and_complete() {
        let mut state = GameState::new(1, Settings::default());
        for i in 1..=3 {
            tick(&mut state, &frame(16.0 * i as f64));
        }
        assert_eq!(state.rewind.len(), 3);
        state.drain_events();

        add_top_obstacle(&mut state, 280.0);
        tick(&mut state, &frame(64.0));
        assert_eq!(state.phase, GamePhase::RestoreOffered { score_at_death: 0 });
        assert!(state.drain_events().contains(&GameEvent::RestoreOffered {
            score_at_death: 0,
            can_restore: true
        }));

        // Waiting for an answer changes nothing
        tick(&mut state, &frame(80.0));
        assert!(matches!(state.phase, GamePhase::RestoreOffered { .. }));

        let accept = TickInput {
            restore: Some(RestoreDecision::Accept),
            ..frame(100.0)
        };
        tick(&mut state, &accept);
        assert_eq!(state.phase, GamePhase::Rewinding);

        tick(&mut state, &frame(100.0 + REWIND_DURATION_MS));
        assert_eq!(state.phase, GamePhase::Playing);
        assert!(matches!(state.invulnerability, Invulnerability::Restored { .. }));
        assert!(state.drain_events().contains(&GameEvent::RestoreComplete));
        assert!(state.rewind.has_been_used);
    }

    #[test]
    fn test_declined_rewind_ends_run() {
        let mut state = GameState::new(1, Settings::default());
        tick(&mut state, &frame(16.0));
        add_top_obstacle(&mut state, 280.0);
        tick(&mut state, &frame(32.0));
        assert!(matches!(state.phase, GamePhase::RestoreOffered { .. }));

        let decline = TickInput {
            restore: Some(RestoreDecision::Decline),
            ..frame(48.0)
        };
        tick(&mut state, &decline);
        assert_eq!(state.phase, GamePhase::GameOver);
        assert!(state.rewind.is_empty());
    }

    #[test]
    fn test_fatal_hit_with_empty_history_is_not_offered() {
        let mut state = GameState::new(1, Settings::default());
        add_top_obstacle(&mut state, 280.0);
        tick(&mut state, &frame(16.0));
        assert_eq!(state.phase, GamePhase::GameOver);
        assert!(!state.rewind.has_been_used);
        let events = state.drain_events();
        assert!(events.contains(&GameEvent::RestoreOffered {
            score_at_death: 0,
            can_restore: false
        }));
        assert!(events.contains(&GameEvent::GameOver { final_score: 0 }));
    }

    #[test]
    fn test_swap_window_does_not_disarm_obstacle() {
        let mut state = GameState::new(1, no_rewind());
        state.player.swapped = true;
        let handle = add_top_obstacle(&mut state, 280.0);
        if let Some(obstacle) = state.obstacles.get_mut(handle) {
            obstacle.width = 2000.0;
        }
        tick(&mut state, &frame(16.0));
        assert_eq!(state.phase, GamePhase::Playing);

        // Swap into the wrong polarity while overlapping
        let swap = TickInput {
            swap: true,
            ..frame(32.0)
        };
        tick(&mut state, &swap);
        let swapped_at = state.clock;
        assert!(!state.player.swapped);
        assert_eq!(state.phase, GamePhase::Playing);
        assert!(!state.obstacles.get(handle).unwrap().is_latent);

        for i in 3..12 {
            tick(&mut state, &frame(16.0 * i as f64));
            if state.phase == GamePhase::GameOver {
                break;
            }
            assert!(!state.obstacles.get(handle).unwrap().is_latent);
        }
        assert_eq!(state.phase, GamePhase::GameOver);
        assert!(state.clock >= swapped_at + SWAP_PHASE_MS);
    }

    #[test]
    fn test_swap_spam_cannot_chain_windows() {
        for period in [4, 5] {
            let mut state = GameState::new(1, no_rewind());
            let handle = add_top_obstacle(&mut state, 280.0);
            if let Some(obstacle) = state.obstacles.get_mut(handle) {
                obstacle.width = 4000.0;
            }

            let mut frames = 0;
            for i in 1..=120 {
                let input = TickInput {
                    swap: i % period == 1,
                    ..frame(i as f64 * FRAME_MS)
                };
                tick(&mut state, &input);
                frames = i;
                if state.phase == GamePhase::GameOver {
                    break;
                }
            }
            assert_eq!(state.phase, GamePhase::GameOver, "swapping every {period} frames");
            assert!(frames < 20);
        }
    }

    #[test]
    fn test_swap_window_regranted_after_cooldown() {
        let mut state = GameState::new(1, no_rewind());
        let swap = |now: f64| TickInput {
            swap: true,
            ..frame(now)
        };
        tick(&mut state, &swap(16.0));
        assert!(matches!(state.invulnerability, Invulnerability::SwapPhase { .. }));
        let first = state.last_swap_phase;

        // Inside the cooldown: the swap happens but no new window
        for i in 2..=8 {
            tick(&mut state, &frame(16.0 * i as f64));
        }
        tick(&mut state, &swap(16.0 * 9.0));
        assert!(!state.player.swapped);
        assert_eq!(state.last_swap_phase, first);
        assert_eq!(state.invulnerability, Invulnerability::None);

        for i in 10..=20 {
            tick(&mut state, &frame(16.0 * i as f64));
        }
        tick(&mut state, &swap(16.0 * 21.0));
        let now = state.clock;
        assert_eq!(state.last_swap_phase, Some(now));
        assert_eq!(
            state.invulnerability,
            Invulnerability::SwapPhase {
                until: now + SWAP_PHASE_MS
            }
        );
    }

    #[test]
    fn test_near_miss_streak_starts_overdrive() {
        let mut state = GameState::new(1, no_rewind());
        state.near_miss.streak = OVERDRIVE_STREAK - 1;
        state.near_miss.last_time = Some(0.0);
        add_top_obstacle(&mut state, 240.0);

        tick(&mut state, &frame(16.0));
        let now = state.clock;
        assert_eq!(state.near_miss.streak, OVERDRIVE_STREAK);
        assert_eq!(state.overdrive_until, Some(now + OVERDRIVE_DURATION_MS));
        assert!(state.overdrive_active());
        assert_eq!(state.score, 125);
        let events = state.drain_events();
        assert!(events.contains(&GameEvent::OverdriveStarted {
            until: now + OVERDRIVE_DURATION_MS
        }));
        assert!(events.contains(&GameEvent::NearMissChanged { streak: 5 }));
    }

    #[test]
    fn test_pass_score_uses_rhythm_and_score_multipliers() {
        let settings = Settings {
            modifiers: RunModifiers {
                score_multiplier: 2.0,
                ..Default::default()
            },
            ..no_rewind()
        };
        let mut state = GameState::new(1, settings);
        state.rhythm.streak = 3;
        state.rhythm.last_swap = Some(0.0);
        let id = state.next_entity_id();
        state
            .obstacles
            .acquire_with(Obstacle::new(id, Lane::Top, Polarity::Black, 100.0, 0.0, 50.0));

        tick(&mut state, &frame(16.0));
        // 10 base x 1.3 rhythm x 2 run modifier
        assert_eq!(state.score, 26);
    }

    #[test]
    fn test_shard_bonus_during_near_miss_streak() {
        let mut state = GameState::new(1, no_rewind());
        state.near_miss.streak = 1;
        state.near_miss.last_time = Some(0.0);
        let id = state.next_entity_id();
        let top_orb = state.orbs()[0].pos;
        state.shards.acquire_with(PlacedShard::new(
            id,
            Lane::Top,
            ShardKind::Safe,
            top_orb,
            ShardMovement::default(),
            0.0,
        ));

        tick(&mut state, &frame(16.0));
        assert_eq!(state.score, 6);
        assert!(state.drain_events().contains(&GameEvent::ShardCollected {
            id,
            points: 6,
            near_miss: true
        }));
    }

    /// Player positioned so the white top orb sits exactly on the midline
    fn orb_on_midline(settings: Settings) -> (GameState, PoolHandle) {
        let mut state = GameState::new(1, settings);
        state.player.y = 340.0;
        state.player.target_y = 340.0;
        let handle = add_top_obstacle(&mut state, 295.0);
        (state, handle)
    }

    #[test]
    fn test_micro_phasing_at_midline() {
        let (mut state, handle) = orb_on_midline(no_rewind());
        tick(&mut state, &frame(16.0));
        assert_eq!(state.orbs()[0].pos.y, state.midline_y);
        assert_eq!(state.phase, GamePhase::Playing);
        let obstacle = state.obstacles.get(handle).unwrap();
        assert!(obstacle.has_phased);
        assert!(!obstacle.is_latent);
    }

    #[test]
    fn test_zero_phasing_tolerance_disables_phasing() {
        let settings = Settings {
            micro_phasing_tolerance: 0.0,
            ..no_rewind()
        };
        let (mut state, _) = orb_on_midline(settings);
        tick(&mut state, &frame(16.0));
        assert_eq!(state.phase, GamePhase::GameOver);
    }

    #[test]
    fn test_game_speed_is_safe() {
        assert_eq!(game_speed(0, 1.0), BASE_SPEED);
        assert_eq!(game_speed(u64::MAX, 1.0), MAX_SPEED);
        assert_eq!(game_speed(0, f64::NAN), MIN_SPEED);
        assert_eq!(game_speed(0, 0.01), MIN_SPEED);
    }

    #[test]
    fn test_connector_grows_to_cap() {
        assert_eq!(connector_target(0), CONNECTOR_BASE_LENGTH);
        assert_eq!(connector_target(1_000_000), CONNECTOR_MAX_LENGTH);
    }

    #[test]
    fn test_determinism() {
        // Two states with same seed should produce identical results
        let mut state1 = GameState::new(99999, Settings::default());
        let mut state2 = GameState::new(99999, Settings::default());

        for i in 1..=600 {
            let input = TickInput {
                autopilot: true,
                ..frame(i as f64 * FRAME_MS)
            };
            tick(&mut state1, &input);
            tick(&mut state2, &input);
        }

        assert_eq!(state1.clock, state2.clock);
        assert_eq!(state1.score, state2.score);
        assert_eq!(state1.phase, state2.phase);
        let ids1: Vec<u32> = state1.obstacles.iter_active().map(|(_, o)| o.id).collect();
        let ids2: Vec<u32> = state2.obstacles.iter_active().map(|(_, o)| o.id).collect();
        assert_eq!(ids1, ids2);
    }
}
