//! Pattern library
//!
//! Patterns are fixed-timing templates of obstacle and shard spawns. The
//! catalog is built once and shared by `Arc`; patterns are never mutated
//! after construction.

use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Lane an entity spawns into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Lane {
    #[default]
    #[serde(rename = "TOP")]
    Top,
    #[serde(rename = "BOTTOM")]
    Bottom,
}

/// Pattern difficulty tier, ordered easiest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Basic,
    Intermediate,
    Advanced,
    Expert,
}

impl Difficulty {
    pub const ALL: [Difficulty; 4] = [
        Difficulty::Basic,
        Difficulty::Intermediate,
        Difficulty::Advanced,
        Difficulty::Expert,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Basic => "basic",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Advanced => "advanced",
            Difficulty::Expert => "expert",
        }
    }
}

/// Collectible kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShardKind {
    #[default]
    Safe,
    Risky,
}

/// Obstacle entry of a pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternObstacle {
    pub lane: Lane,
    /// Milliseconds after pattern start
    pub time_offset: f64,
    /// Fraction of the lane the obstacle covers (0.5 when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height_ratio: Option<f64>,
}

/// Shard entry of a pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternShard {
    pub lane: Lane,
    pub time_offset: f64,
    #[serde(rename = "type")]
    pub kind: ShardKind,
    /// Horizontal nudge (px) applied after placement
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_offset: Option<f64>,
}

/// Immutable spawn template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub id: String,
    pub name: String,
    pub difficulty: Difficulty,
    /// Total pattern length (ms)
    pub duration: f64,
    pub obstacles: Vec<PatternObstacle>,
    pub shards: Vec<PatternShard>,
}

/// Id of the designated fallback pattern
pub const DEFAULT_PATTERN_ID: &str = "basic-alternate";

/// Check a pattern's values. Offsets past the pattern's duration are
/// rejected so a running pattern can never spawn after it reports complete.
pub fn validate_pattern(pattern: &Pattern) -> Result<()> {
    let malformed = |msg: String| Err(Error::MalformedPattern(msg));

    if pattern.id.trim().is_empty() {
        return malformed("id must be a non-empty string".into());
    }
    if pattern.name.trim().is_empty() {
        return malformed(format!("pattern '{}' has an empty name", pattern.id));
    }
    if !pattern.duration.is_finite() || pattern.duration <= 0.0 {
        return malformed(format!(
            "pattern '{}' duration {} must be positive",
            pattern.id, pattern.duration
        ));
    }

    for (i, obstacle) in pattern.obstacles.iter().enumerate() {
        check_offset(&pattern.id, "obstacle", i, obstacle.time_offset, pattern.duration)?;
        if let Some(ratio) = obstacle.height_ratio {
            if !(0.0..=1.0).contains(&ratio) {
                return malformed(format!(
                    "pattern '{}' obstacle {} heightRatio {} outside [0, 1]",
                    pattern.id, i, ratio
                ));
            }
        }
    }

    for (i, shard) in pattern.shards.iter().enumerate() {
        check_offset(&pattern.id, "shard", i, shard.time_offset, pattern.duration)?;
        if let Some(offset) = shard.position_offset {
            if !offset.is_finite() {
                return malformed(format!(
                    "pattern '{}' shard {} positionOffset is not a number",
                    pattern.id, i
                ));
            }
        }
    }

    Ok(())
}

fn check_offset(id: &str, what: &str, index: usize, offset: f64, duration: f64) -> Result<()> {
    if !offset.is_finite() || offset < 0.0 {
        return Err(Error::MalformedPattern(format!(
            "pattern '{}' {} {} timeOffset {} must be non-negative",
            id, what, index, offset
        )));
    }
    if offset > duration {
        return Err(Error::MalformedPattern(format!(
            "pattern '{}' {} {} timeOffset {} exceeds duration {}",
            id, what, index, offset, duration
        )));
    }
    Ok(())
}

/// Serialize a pattern to JSON
pub fn serialize_pattern(pattern: &Pattern) -> Result<String> {
    Ok(serde_json::to_string(pattern)?)
}

/// Parse and validate a JSON pattern
pub fn deserialize_pattern(json: &str) -> Result<Pattern> {
    let pattern: Pattern =
        serde_json::from_str(json).map_err(|e| Error::MalformedPattern(e.to_string()))?;
    validate_pattern(&pattern)?;
    Ok(pattern)
}

/// Parse a pattern, falling back to the default pattern on malformed input
pub fn load_pattern_or_default(json: &str) -> Arc<Pattern> {
    match deserialize_pattern(json) {
        Ok(pattern) => Arc::new(pattern),
        Err(e) => {
            log::warn!("{}; using default pattern", e);
            default_pattern()
        }
    }
}

fn obstacle(lane: Lane, time_offset: f64, height_ratio: Option<f64>) -> PatternObstacle {
    PatternObstacle {
        lane,
        time_offset,
        height_ratio,
    }
}

fn shard(lane: Lane, time_offset: f64, kind: ShardKind) -> PatternShard {
    PatternShard {
        lane,
        time_offset,
        kind,
        position_offset: None,
    }
}

fn pattern(
    id: &str,
    name: &str,
    difficulty: Difficulty,
    duration: f64,
    obstacles: Vec<PatternObstacle>,
    shards: Vec<PatternShard>,
) -> Arc<Pattern> {
    Arc::new(Pattern {
        id: id.to_string(),
        name: name.to_string(),
        difficulty,
        duration,
        obstacles,
        shards,
    })
}

fn build_catalog() -> Vec<Arc<Pattern>> {
    use Difficulty::*;
    use Lane::{Bottom, Top};
    use ShardKind::{Risky, Safe};

    vec![
        pattern(
            DEFAULT_PATTERN_ID,
            "Alternate",
            Basic,
            2400.0,
            vec![
                obstacle(Top, 0.0, None),
                obstacle(Bottom, 800.0, None),
                obstacle(Top, 1600.0, None),
            ],
            vec![shard(Bottom, 400.0, Safe), shard(Top, 1200.0, Safe)],
        ),
        pattern(
            "basic-pair",
            "Pair",
            Basic,
            2000.0,
            vec![
                obstacle(Top, 0.0, Some(0.4)),
                obstacle(Bottom, 0.0, Some(0.4)),
                obstacle(Top, 1000.0, None),
            ],
            vec![shard(Top, 500.0, Safe)],
        ),
        pattern(
            "basic-stairs",
            "Stairs",
            Basic,
            2400.0,
            vec![
                obstacle(Top, 0.0, Some(0.3)),
                obstacle(Top, 600.0, Some(0.5)),
                obstacle(Top, 1200.0, Some(0.7)),
            ],
            vec![shard(Bottom, 900.0, Safe)],
        ),
        pattern(
            "intermediate-zigzag",
            "Zigzag",
            Intermediate,
            2000.0,
            vec![
                obstacle(Top, 0.0, None),
                obstacle(Bottom, 400.0, None),
                obstacle(Top, 800.0, None),
                obstacle(Bottom, 1200.0, None),
            ],
            vec![shard(Top, 200.0, Risky), shard(Bottom, 1000.0, Safe)],
        ),
        pattern(
            "intermediate-gate",
            "Gate",
            Intermediate,
            1800.0,
            vec![
                obstacle(Top, 0.0, Some(0.6)),
                obstacle(Bottom, 0.0, Some(0.6)),
                obstacle(Top, 900.0, Some(0.6)),
                obstacle(Bottom, 900.0, Some(0.6)),
            ],
            vec![PatternShard {
                position_offset: Some(20.0),
                ..shard(Top, 450.0, Safe)
            }],
        ),
        pattern(
            "advanced-flurry",
            "Flurry",
            Advanced,
            1800.0,
            vec![
                obstacle(Top, 0.0, None),
                obstacle(Bottom, 250.0, None),
                obstacle(Top, 500.0, None),
                obstacle(Bottom, 750.0, None),
                obstacle(Top, 1000.0, None),
                obstacle(Bottom, 1250.0, None),
            ],
            vec![shard(Bottom, 375.0, Risky), shard(Top, 875.0, Risky)],
        ),
        pattern(
            "advanced-squeeze",
            "Squeeze",
            Advanced,
            1600.0,
            vec![
                obstacle(Top, 0.0, Some(0.8)),
                obstacle(Bottom, 300.0, Some(0.8)),
                obstacle(Top, 600.0, Some(0.9)),
                obstacle(Bottom, 900.0, Some(0.9)),
            ],
            vec![shard(Top, 150.0, Risky)],
        ),
        pattern(
            "expert-gauntlet",
            "Gauntlet",
            Expert,
            1500.0,
            vec![
                obstacle(Top, 0.0, Some(0.9)),
                obstacle(Bottom, 0.0, Some(0.9)),
                obstacle(Top, 300.0, None),
                obstacle(Bottom, 450.0, None),
                obstacle(Top, 600.0, None),
                obstacle(Bottom, 750.0, None),
                obstacle(Top, 900.0, Some(1.0)),
                obstacle(Bottom, 1050.0, Some(1.0)),
            ],
            vec![shard(Top, 225.0, Risky), shard(Bottom, 675.0, Risky)],
        ),
        pattern(
            "expert-cascade",
            "Cascade",
            Expert,
            1400.0,
            (0..7)
                .map(|i| {
                    let lane = if i % 2 == 0 { Top } else { Bottom };
                    obstacle(lane, i as f64 * 200.0, Some(0.5 + i as f64 * 0.05))
                })
                .collect(),
            vec![shard(Bottom, 700.0, Risky)],
        ),
    ]
}

/// The static pattern catalog
pub fn catalog() -> &'static [Arc<Pattern>] {
    static CATALOG: OnceLock<Vec<Arc<Pattern>>> = OnceLock::new();
    CATALOG.get_or_init(build_catalog)
}

pub fn pattern_by_id(id: &str) -> Option<Arc<Pattern>> {
    catalog().iter().find(|p| p.id == id).cloned()
}

pub fn patterns_by_difficulty(difficulty: Difficulty) -> Vec<Arc<Pattern>> {
    catalog()
        .iter()
        .filter(|p| p.difficulty == difficulty)
        .cloned()
        .collect()
}

pub fn is_valid_pattern_id(id: &str) -> bool {
    catalog().iter().any(|p| p.id == id)
}

/// The designated fallback pattern
pub fn default_pattern() -> Arc<Pattern> {
    catalog()
        .iter()
        .find(|p| p.id == DEFAULT_PATTERN_ID)
        .or_else(|| catalog().first())
        .cloned()
        .unwrap_or_else(|| {
            pattern(
                DEFAULT_PATTERN_ID,
                "Alternate",
                Difficulty::Basic,
                1000.0,
                vec![obstacle(Lane::Top, 0.0, None)],
                Vec::new(),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_catalog_is_valid_and_sorted() {
        for p in catalog() {
            validate_pattern(p).unwrap();
            assert!(p.obstacles.windows(2).all(|w| w[0].time_offset <= w[1].time_offset), "{}", p.id);
            assert!(p.shards.windows(2).all(|w| w[0].time_offset <= w[1].time_offset), "{}", p.id);
            let json = serialize_pattern(p).unwrap();
            assert_eq!(&deserialize_pattern(&json).unwrap(), p.as_ref());
        }
        for d in Difficulty::ALL {
            assert!(!patterns_by_difficulty(d).is_empty(), "no {} patterns", d.as_str());
        }
    }

    #[test]
    fn test_lookups() {
        assert!(is_valid_pattern_id("basic-pair"));
        assert!(!is_valid_pattern_id("nope"));
        assert_eq!(pattern_by_id("expert-cascade").unwrap().difficulty, Difficulty::Expert);
        assert_eq!(default_pattern().id, DEFAULT_PATTERN_ID);
    }

    #[test]
    fn test_serialized_field_names() {
        let json = serialize_pattern(&pattern_by_id("intermediate-gate").unwrap()).unwrap();
        assert!(json.contains("\"timeOffset\""));
        assert!(json.contains("\"heightRatio\":0.6"));
        assert!(json.contains("\"type\":\"safe\""));
        assert!(json.contains("\"positionOffset\":20"));
        assert!(json.contains("\"lane\":\"TOP\""));
        assert!(json.contains("\"difficulty\":\"intermediate\""));

        // Absent optionals stay absent rather than becoming null
        let json = serialize_pattern(&default_pattern()).unwrap();
        assert!(!json.contains("heightRatio"));
        assert!(!json.contains("null"));
    }

    #[test]
    fn test_deserialize_rejects_malformed() {
        let cases = [
            "not json",
            r#"{"id":"","name":"x","difficulty":"basic","duration":100,"obstacles":[],"shards":[]}"#,
            r#"{"id":"a","name":"x","difficulty":"insane","duration":100,"obstacles":[],"shards":[]}"#,
            r#"{"id":"a","name":"x","difficulty":"basic","duration":0,"obstacles":[],"shards":[]}"#,
            r#"{"id":"a","name":"x","difficulty":"basic","duration":100,"obstacles":[{"lane":"LEFT","timeOffset":0}],"shards":[]}"#,
            r#"{"id":"a","name":"x","difficulty":"basic","duration":100,"obstacles":[{"lane":"TOP","timeOffset":-1}],"shards":[]}"#,
            r#"{"id":"a","name":"x","difficulty":"basic","duration":100,"obstacles":[{"lane":"TOP","timeOffset":0,"heightRatio":1.5}],"shards":[]}"#,
            r#"{"id":"a","name":"x","difficulty":"basic","duration":100,"obstacles":[],"shards":[{"lane":"TOP","timeOffset":0,"type":"rare"}]}"#,
            r#"{"id":"a","name":"x","difficulty":"basic","duration":100,"obstacles":[{"lane":"TOP","timeOffset":150}],"shards":[]}"#,
        ];
        for json in cases {
            match deserialize_pattern(json) {
                Err(Error::MalformedPattern(_)) => {}
                other => panic!("expected malformed for {json}: {other:?}"),
            }
        }
    }

    #[test]
    fn test_load_falls_back_to_default() {
        let loaded = load_pattern_or_default("{\"id\":42}");
        assert_eq!(loaded.id, DEFAULT_PATTERN_ID);
    }

    fn arb_lane() -> impl Strategy<Value = Lane> {
        prop_oneof![Just(Lane::Top), Just(Lane::Bottom)]
    }

    fn arb_pattern() -> impl Strategy<Value = Pattern> {
        let difficulty = prop_oneof![
            Just(Difficulty::Basic),
            Just(Difficulty::Intermediate),
            Just(Difficulty::Advanced),
            Just(Difficulty::Expert),
        ];
        let obstacles = proptest::collection::vec(
            (arb_lane(), 0u32..1000, proptest::option::of(0u32..=4)),
            0..8,
        );
        let shards = proptest::collection::vec(
            (arb_lane(), 0u32..1000, any::<bool>(), proptest::option::of(-50i32..50)),
            0..4,
        );
        ("[a-z]{1,12}", "[A-Za-z ]{0,8}[A-Za-z]", difficulty, obstacles, shards).prop_map(
            |(id, name, difficulty, obstacles, shards)| Pattern {
                id,
                name,
                difficulty,
                duration: 1000.0,
                obstacles: obstacles
                    .into_iter()
                    .map(|(lane, t, r)| PatternObstacle {
                        lane,
                        time_offset: t as f64,
                        // Quarter steps keep the ratios exact in decimal JSON
                        height_ratio: r.map(|r| r as f64 / 4.0),
                    })
                    .collect(),
                shards: shards
                    .into_iter()
                    .map(|(lane, t, risky, offset)| PatternShard {
                        lane,
                        time_offset: t as f64,
                        kind: if risky { ShardKind::Risky } else { ShardKind::Safe },
                        position_offset: offset.map(|o| o as f64),
                    })
                    .collect(),
            },
        )
    }

    proptest! {
        #[test]
        fn prop_serialization_round_trips(p in arb_pattern()) {
            let json = serialize_pattern(&p).unwrap();
            let back = deserialize_pattern(&json).unwrap();
            prop_assert_eq!(back, p);
        }
    }
}
