//! Run settings and mode flags
//!
//! Everything the host decides about a run (mode flags, arena size, and the
//! pre-computed campaign/daily modifiers) arrives here. Stored as JSON.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::consts::{CANVAS_HEIGHT, CANVAS_WIDTH, MICRO_PHASING_TOLERANCE};
use crate::error::{Error, Result};
use crate::sim::shard::PlacementConfig;

/// How the midline between the polarity zones moves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MidlineMode {
    /// Fixed at mid-screen
    #[default]
    Static,
    /// Oscillates with time, amplitude growing with score
    Oscillating,
}

/// Where obstacles come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SpawnMode {
    /// Learnable pattern templates
    #[default]
    Patterns,
    /// Legacy single obstacles at a speed-derived interval
    Interval,
}

/// How the next pattern is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SelectionMode {
    /// Seeded weighted roll
    #[default]
    Weighted,
    /// Fixed interleaved schedule (replay-stable cadence)
    Scheduled,
}

impl SelectionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionMode::Weighted => "Weighted",
            SelectionMode::Scheduled => "Scheduled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "weighted" | "random" => Some(SelectionMode::Weighted),
            "scheduled" | "schedule" => Some(SelectionMode::Scheduled),
            _ => None,
        }
    }
}

/// Numeric modifiers derived by campaign or daily-challenge rules
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunModifiers {
    pub speed_multiplier: f64,
    pub spawn_rate_multiplier: f64,
    pub starting_score: u64,
    /// Upgrade multiplier applied to pass, near-miss and destroy points
    pub score_multiplier: f64,
    pub shield_charges: u32,
    pub slow_motion_uses: u32,
}

impl Default for RunModifiers {
    fn default() -> Self {
        Self {
            speed_multiplier: 1.0,
            spawn_rate_multiplier: 1.0,
            starting_score: 0,
            score_multiplier: 1.0,
            shield_charges: 0,
            slow_motion_uses: 0,
        }
    }
}

fn positive_or_one(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 { value } else { 1.0 }
}

impl RunModifiers {
    /// Replace non-finite or non-positive multipliers with 1.0
    pub fn sanitized(&self) -> Self {
        Self {
            speed_multiplier: positive_or_one(self.speed_multiplier),
            spawn_rate_multiplier: positive_or_one(self.spawn_rate_multiplier),
            score_multiplier: positive_or_one(self.score_multiplier),
            ..*self
        }
    }
}

/// Game settings for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // === Arena ===
    pub canvas_width: f32,
    pub canvas_height: f32,

    // === Modes ===
    pub midline_mode: MidlineMode,
    pub spawn_mode: SpawnMode,
    pub selection_mode: SelectionMode,
    /// Offer a rewind on the first fatal hit
    pub rewind_enabled: bool,

    // === Collision ===
    /// Orbs this close to the midline skip collision
    pub micro_phasing_tolerance: f32,

    // === Shards ===
    pub safe_gap_ratio: f32,
    pub risky_edge_distance: f32,
    /// Horizontal span of the gap a safe shard is centred in
    pub safe_gap_span: f32,

    // === Modifiers ===
    pub modifiers: RunModifiers,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            canvas_width: CANVAS_WIDTH,
            canvas_height: CANVAS_HEIGHT,

            midline_mode: MidlineMode::Static,
            spawn_mode: SpawnMode::Patterns,
            selection_mode: SelectionMode::Weighted,
            rewind_enabled: true,

            micro_phasing_tolerance: MICRO_PHASING_TOLERANCE,

            safe_gap_ratio: 0.5,
            risky_edge_distance: 20.0,
            safe_gap_span: 160.0,

            modifiers: RunModifiers::default(),
        }
    }
}

impl Settings {
    /// Parse and validate settings JSON
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: Settings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject settings the simulation cannot run with
    pub fn validate(&self) -> Result<()> {
        let dims_ok = |v: f32| v.is_finite() && v > 0.0;
        if !dims_ok(self.canvas_width) || !dims_ok(self.canvas_height) {
            return Err(Error::InvalidSettings(format!(
                "canvas must be positive, got {}x{}",
                self.canvas_width, self.canvas_height
            )));
        }
        if !(0.0..=1.0).contains(&self.safe_gap_ratio) {
            return Err(Error::InvalidSettings(format!(
                "safe_gap_ratio {} outside [0, 1]",
                self.safe_gap_ratio
            )));
        }
        if !self.micro_phasing_tolerance.is_finite() || self.micro_phasing_tolerance < 0.0 {
            return Err(Error::InvalidSettings(format!(
                "micro_phasing_tolerance {} must be finite and non-negative",
                self.micro_phasing_tolerance
            )));
        }
        if !self.risky_edge_distance.is_finite() || !self.safe_gap_span.is_finite() {
            return Err(Error::InvalidSettings("shard distances must be finite".into()));
        }
        Ok(())
    }

    /// Shard placement tunables for this arena
    pub fn placement(&self) -> PlacementConfig {
        PlacementConfig {
            canvas_height: self.canvas_height,
            safe_gap_ratio: self.safe_gap_ratio,
            risky_edge_distance: self.risky_edge_distance,
        }
    }

    /// Load settings from a JSON file
    pub fn try_load(path: impl AsRef<Path>) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Load settings, falling back to defaults when the file is missing or bad
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::try_load(path) {
            Ok(settings) => {
                log::info!("Loaded settings from {}", path.display());
                settings
            }
            Err(e) => {
                log::warn!("Using default settings ({}: {})", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path.as_ref(), self.to_json()?)?;
        log::info!("Settings saved");
        Ok(())
    }
}
