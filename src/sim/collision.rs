//! Collision geometry for orbs, obstacles and the midline
//!
//! Orbs are circles; obstacles are axis-aligned rectangles anchored to the
//! top or bottom edge. A contact is only dangerous across polarities.

use glam::Vec2;

use super::state::{Obstacle, Polarity};
use crate::consts::{MIDLINE_FREQUENCY, MIDLINE_AMPLITUDE_PER_POINT, MIDLINE_MAX_AMPLITUDE_RATIO};
use crate::settings::MidlineMode;

/// One of the two connected orbs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Orb {
    pub pos: Vec2,
    pub radius: f32,
    pub polarity: Polarity,
}

/// Outcome of testing one orb against one obstacle
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Contact {
    /// No interaction
    Clear,
    /// Overlap with a same-polarity obstacle (passes through)
    Permeable,
    /// Opposite-polarity overlap suppressed at the zone boundary
    Phased,
    /// Opposite-polarity overlap
    Hit,
    /// Opposite-polarity pass within the near-miss band
    NearMiss { gap: f32 },
}

/// Distance from the circle's edge to the rectangle (negative when overlapping)
pub fn circle_rect_gap(center: Vec2, radius: f32, min: Vec2, max: Vec2) -> f32 {
    let closest = center.clamp(min, max);
    center.distance(closest) - radius
}

/// Test an orb against an obstacle.
///
/// `phasing_tolerance` suppresses hits for orbs that sit within that
/// distance of the midline; `near_miss_distance` is the width of the
/// near-miss band outside the obstacle.
pub fn classify_contact(
    orb: &Orb,
    obstacle: &Obstacle,
    midline_y: f32,
    phasing_tolerance: f32,
    near_miss_distance: f32,
) -> Contact {
    let (min, max) = obstacle.bounds();
    let gap = circle_rect_gap(orb.pos, orb.radius, min, max);

    if orb.polarity == obstacle.polarity {
        return if gap < 0.0 { Contact::Permeable } else { Contact::Clear };
    }

    if gap < 0.0 {
        if (orb.pos.y - midline_y).abs() < phasing_tolerance {
            Contact::Phased
        } else {
            Contact::Hit
        }
    } else if gap <= near_miss_distance && orb.pos.x >= min.x && orb.pos.x <= max.x {
        Contact::NearMiss { gap }
    } else {
        Contact::Clear
    }
}

/// Vertical position of the zone boundary
pub fn midline_y(mode: MidlineMode, clock_ms: f64, score: u64, canvas_height: f32) -> f32 {
    let center = canvas_height / 2.0;
    match mode {
        MidlineMode::Static => center,
        MidlineMode::Oscillating => {
            let amplitude = (score as f32 * MIDLINE_AMPLITUDE_PER_POINT)
                .min(canvas_height * MIDLINE_MAX_AMPLITUDE_RATIO);
            let phase = (clock_ms / 1000.0 * MIDLINE_FREQUENCY).sin() as f32;
            let y = center + amplitude * phase;
            if y.is_finite() { y } else { center }
        }
    }
}

/// Range the connector's centre may occupy: both orbs on screen, and the
/// midline within reach of the connector. `None` when the two do not
/// intersect.
pub fn movement_bounds(
    connector_length: f32,
    orb_radius: f32,
    midline_y: f32,
    canvas_height: f32,
) -> Option<(f32, f32)> {
    let half = connector_length / 2.0;
    let screen = (half + orb_radius, canvas_height - half - orb_radius);
    let reach = (midline_y - half, midline_y + half);

    let lo = screen.0.max(reach.0);
    let hi = screen.1.min(reach.1);
    (lo <= hi).then_some((lo, hi))
}

/// Clamp the connector centre into its bounds, snapping to the midline
/// when no valid position exists
pub fn clamp_player(y: f32, connector_length: f32, orb_radius: f32, midline_y: f32, canvas_height: f32) -> f32 {
    match movement_bounds(connector_length, orb_radius, midline_y, canvas_height) {
        Some((lo, hi)) => y.clamp(lo, hi),
        None => midline_y,
    }
}
