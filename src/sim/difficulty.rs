//! Difficulty progression
//!
//! Maps score to the set of unlocked pattern difficulties and picks the next
//! pattern either by weighted roll or from a fixed, learnable schedule.

use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::pattern::{Difficulty, Pattern};
use crate::settings::SelectionMode;

/// Length of the deterministic selection schedule
pub const SCHEDULE_LEN: usize = 10;

/// Selection weight per difficulty
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DifficultyWeights {
    pub basic: f64,
    pub intermediate: f64,
    pub advanced: f64,
    pub expert: f64,
}

impl DifficultyWeights {
    pub fn get(&self, difficulty: Difficulty) -> f64 {
        match difficulty {
            Difficulty::Basic => self.basic,
            Difficulty::Intermediate => self.intermediate,
            Difficulty::Advanced => self.advanced,
            Difficulty::Expert => self.expert,
        }
    }
}

/// A score gate and the selection table it unlocks
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DifficultyThreshold {
    pub score: u64,
    pub unlocked: &'static [Difficulty],
    pub weights: DifficultyWeights,
}

impl DifficultyThreshold {
    pub fn is_unlocked(&self, difficulty: Difficulty) -> bool {
        self.unlocked.contains(&difficulty)
    }
}

/// Ascending by score
pub const DIFFICULTY_THRESHOLDS: [DifficultyThreshold; 4] = [
    DifficultyThreshold {
        score: 0,
        unlocked: &[Difficulty::Basic],
        weights: DifficultyWeights {
            basic: 1.0,
            intermediate: 0.0,
            advanced: 0.0,
            expert: 0.0,
        },
    },
    DifficultyThreshold {
        score: 1000,
        unlocked: &[Difficulty::Basic, Difficulty::Intermediate],
        weights: DifficultyWeights {
            basic: 0.6,
            intermediate: 0.4,
            advanced: 0.0,
            expert: 0.0,
        },
    },
    DifficultyThreshold {
        score: 2500,
        unlocked: &[Difficulty::Basic, Difficulty::Intermediate, Difficulty::Advanced],
        weights: DifficultyWeights {
            basic: 0.3,
            intermediate: 0.4,
            advanced: 0.3,
            expert: 0.0,
        },
    },
    DifficultyThreshold {
        score: 5000,
        unlocked: &Difficulty::ALL,
        weights: DifficultyWeights {
            basic: 0.1,
            intermediate: 0.4,
            advanced: 0.3,
            expert: 0.2,
        },
    },
];

/// Highest threshold at or below `score` (negative and NaN scores count as 0)
pub fn current_difficulty_threshold(score: f64) -> &'static DifficultyThreshold {
    let score = if score.is_nan() { 0.0 } else { score.max(0.0) };
    DIFFICULTY_THRESHOLDS
        .iter()
        .rev()
        .find(|t| t.score as f64 <= score)
        .unwrap_or(&DIFFICULTY_THRESHOLDS[0])
}

/// Weighted random pick among patterns whose difficulty is unlocked.
///
/// Falls back to a uniform pick when the candidates carry no weight, and to
/// the first pattern of the full list when nothing is unlocked. Returns
/// `None` only for an empty list.
pub fn select_pattern_by_weight<R: Rng + ?Sized>(
    patterns: &[Arc<Pattern>],
    threshold: &DifficultyThreshold,
    rng: &mut R,
) -> Option<Arc<Pattern>> {
    let candidates: Vec<&Arc<Pattern>> = patterns
        .iter()
        .filter(|p| threshold.is_unlocked(p.difficulty))
        .collect();
    if candidates.is_empty() {
        return patterns.first().cloned();
    }

    let total: f64 = candidates
        .iter()
        .map(|p| threshold.weights.get(p.difficulty).max(0.0))
        .sum();
    if total <= 0.0 {
        let index = rng.random_range(0..candidates.len());
        return Some(candidates[index].clone());
    }

    let mut roll = rng.random::<f64>() * total;
    for candidate in &candidates {
        let weight = threshold.weights.get(candidate.difficulty).max(0.0);
        if roll < weight {
            return Some((*candidate).clone());
        }
        roll -= weight;
    }
    candidates.last().map(|p| (*p).clone())
}

/// Interleaved difficulty schedule of `SCHEDULE_LEN` slots.
///
/// Counts use largest-remainder rounding of `weight × SCHEDULE_LEN`; slots
/// are then dealt round-robin across difficulties so runs of one tier stay
/// short.
pub fn build_schedule(threshold: &DifficultyThreshold) -> Vec<Difficulty> {
    let unlocked = threshold.unlocked;
    if unlocked.is_empty() {
        return vec![Difficulty::Basic; SCHEDULE_LEN];
    }

    let total: f64 = unlocked.iter().map(|d| threshold.weights.get(*d).max(0.0)).sum();
    let share = |d: Difficulty| {
        if total > 0.0 {
            threshold.weights.get(d).max(0.0) / total
        } else {
            1.0 / unlocked.len() as f64
        }
    };

    let raw: Vec<f64> = unlocked.iter().map(|d| share(*d) * SCHEDULE_LEN as f64).collect();
    let mut counts: Vec<usize> = raw.iter().map(|r| (r + 1e-9).floor() as usize).collect();

    let assigned: usize = counts.iter().sum();
    let mut by_remainder: Vec<usize> = (0..unlocked.len()).collect();
    by_remainder.sort_by(|&a, &b| {
        let ra = raw[a] - counts[a] as f64;
        let rb = raw[b] - counts[b] as f64;
        rb.partial_cmp(&ra).unwrap_or(std::cmp::Ordering::Equal).then(a.cmp(&b))
    });
    for &i in by_remainder.iter().cycle().take(SCHEDULE_LEN.saturating_sub(assigned)) {
        counts[i] += 1;
    }

    let mut schedule = Vec::with_capacity(SCHEDULE_LEN);
    while schedule.len() < SCHEDULE_LEN {
        for (i, difficulty) in unlocked.iter().enumerate() {
            if counts[i] > 0 && schedule.len() < SCHEDULE_LEN {
                counts[i] -= 1;
                schedule.push(*difficulty);
            }
        }
    }
    schedule
}

/// Deterministic pick driven by a monotonic sequence counter
pub fn select_pattern_scheduled(
    patterns: &[Arc<Pattern>],
    threshold: &DifficultyThreshold,
    sequence: u64,
) -> Option<Arc<Pattern>> {
    let schedule = build_schedule(threshold);
    let slot = (sequence % SCHEDULE_LEN as u64) as usize;
    let round = (sequence / SCHEDULE_LEN as u64) as usize;
    let difficulty = schedule[slot];

    // Successive appearances of a tier walk through that tier's patterns
    let per_round = schedule.iter().filter(|d| **d == difficulty).count();
    let earlier = schedule[..slot].iter().filter(|d| **d == difficulty).count();
    let occurrence = round * per_round + earlier;

    let of_tier: Vec<&Arc<Pattern>> = patterns.iter().filter(|p| p.difficulty == difficulty).collect();
    if !of_tier.is_empty() {
        return Some(of_tier[occurrence % of_tier.len()].clone());
    }

    let unlocked: Vec<&Arc<Pattern>> = patterns
        .iter()
        .filter(|p| threshold.is_unlocked(p.difficulty))
        .collect();
    if !unlocked.is_empty() {
        return Some(unlocked[sequence as usize % unlocked.len()].clone());
    }
    patterns.first().cloned()
}

/// Per-run selection state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DifficultyProgression {
    pub mode: SelectionMode,
    /// Number of patterns handed out this run
    pub sequence: u64,
}

impl DifficultyProgression {
    pub fn new(mode: SelectionMode) -> Self {
        Self { mode, sequence: 0 }
    }

    /// Pick the pattern to run next at the given score
    pub fn next_pattern<R: Rng + ?Sized>(
        &mut self,
        patterns: &[Arc<Pattern>],
        score: f64,
        rng: &mut R,
    ) -> Option<Arc<Pattern>> {
        let threshold = current_difficulty_threshold(score);
        let picked = match self.mode {
            SelectionMode::Weighted => select_pattern_by_weight(patterns, threshold, rng),
            SelectionMode::Scheduled => select_pattern_scheduled(patterns, threshold, self.sequence),
        };
        self.sequence += 1;
        picked
    }

    pub fn reset(&mut self) {
        self.sequence = 0;
    }
}
