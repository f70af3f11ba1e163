//! Configuration for the SOPHIA rules engine.
//!
//! Maps directly to `sophia.toml`. Every rule the game designers are
//! expected to tune (damage formulas, alignment margin, marker predicates,
//! level thresholds) lives here rather than in code.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SophiaError};
use crate::ledger::{MarkerRule, MarkerTrigger};
use crate::types::PermanentMarker;

/// Top-level SOPHIA configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SophiaConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// New-character defaults and capacities.
    #[serde(default)]
    pub player: PlayerConfig,
    /// Experience → level table.
    #[serde(default)]
    pub progression: ProgressionConfig,
    /// Authenticity ledger rule table.
    #[serde(default)]
    pub ledger: LedgerConfig,
    /// Alignment drift tuning.
    #[serde(default)]
    pub alignment: AlignmentConfig,
    /// Combat formulas.
    #[serde(default)]
    pub combat: CombatConfig,
    /// Per-player locking.
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,
    /// Persistence / save settings.
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
}

impl SophiaConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `SophiaError::Config` if the TOML is invalid or fails validation.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(toml_str).map_err(|e| SophiaError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Layered load: built-in defaults, then the optional TOML file, then
    /// `SOPHIA__SECTION__KEY` environment variables.
    ///
    /// # Errors
    /// Returns `SophiaError::Config` if any layer is malformed or the merged
    /// result fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path.to_path_buf())
                    .format(config::FileFormat::Toml)
                    .required(true),
            );
        }
        builder = builder.add_source(
            config::Environment::with_prefix("SOPHIA")
                .separator("__")
                .try_parsing(true),
        );

        let merged: Self = builder
            .build()
            .and_then(|c| c.try_deserialize::<Self>())
            .map_err(|e| SophiaError::Config(e.to_string()))?;
        merged.validate()?;
        Ok(merged)
    }

    /// Check cross-field invariants the serde defaults cannot express.
    ///
    /// # Errors
    /// Returns `SophiaError::Config` describing the first violation found.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(SophiaError::Config(msg));

        if self.player.base_hit_points == 0 {
            return fail("player.base_hit_points must be positive".into());
        }
        if self.player.max_equipped_fallacies == 0 || self.player.max_equipped_fallacies > 4 {
            return fail("player.max_equipped_fallacies must be within 1..=4".into());
        }
        if self.player.starting_fallacies.len() > self.player.max_equipped_fallacies {
            return fail("player.starting_fallacies exceeds the loadout size".into());
        }
        if !(0.0..=100.0).contains(&self.player.starting_authenticity) {
            return fail("player.starting_authenticity must be within [0, 100]".into());
        }

        let thresholds = &self.progression.level_thresholds;
        if thresholds.first() != Some(&0) {
            return fail("progression.level_thresholds must start at 0".into());
        }
        if thresholds.windows(2).any(|w| w[0] >= w[1]) {
            return fail("progression.level_thresholds must be strictly increasing".into());
        }

        if self.alignment.window == 0 {
            return fail("alignment.window must be positive".into());
        }
        if !self.alignment.margin.is_finite() || self.alignment.margin < 0.0 {
            return fail("alignment.margin must be a non-negative number".into());
        }

        if self.combat.mind_damage_divisor <= 0 || self.combat.heart_defense_divisor <= 0 {
            return fail("combat divisors must be positive".into());
        }
        if self.combat.difficulty_multipliers.is_empty()
            || self
                .combat
                .difficulty_multipliers
                .iter()
                .any(|m| !m.is_finite() || *m <= 0.0)
        {
            return fail("combat.difficulty_multipliers must be non-empty and positive".into());
        }
        if !self.combat.weakness_multiplier.is_finite() || self.combat.weakness_multiplier < 1.0 {
            return fail("combat.weakness_multiplier must be at least 1.0".into());
        }

        match self.persistence.backend.as_str() {
            "memory" | "sqlite" => {}
            other => return fail(format!("unknown persistence.backend: {other}")),
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// General system settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log format: "pretty" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

/// New-character defaults and hard capacities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Starting body.
    #[serde(default = "default_5_i32")]
    pub default_body: i32,
    /// Starting mind.
    #[serde(default = "default_5_i32")]
    pub default_mind: i32,
    /// Starting heart.
    #[serde(default = "default_5_i32")]
    pub default_heart: i32,
    /// Hit points at level 1 before the body bonus.
    #[serde(default = "default_20_u32")]
    pub base_hit_points: u32,
    /// Extra maximum hit points per level above 1.
    #[serde(default = "default_5_u32")]
    pub hit_points_per_level: u32,
    /// Extra maximum hit points per point of body.
    #[serde(default = "default_2_u32")]
    pub hit_points_per_body: u32,
    /// Authenticity value of a fresh character.
    #[serde(default = "default_50_f32")]
    pub starting_authenticity: f32,
    /// Maximum items carried.
    #[serde(default = "default_12")]
    pub inventory_capacity: usize,
    /// Fallacy loadout slots (at most 4).
    #[serde(default = "default_4")]
    pub max_equipped_fallacies: usize,
    /// Fallacy ids equipped at creation.
    #[serde(default = "default_starting_fallacies")]
    pub starting_fallacies: Vec<String>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            default_body: 5,
            default_mind: 5,
            default_heart: 5,
            base_hit_points: 20,
            hit_points_per_level: 5,
            hit_points_per_body: 2,
            starting_authenticity: 50.0,
            inventory_capacity: 12,
            max_equipped_fallacies: 4,
            starting_fallacies: default_starting_fallacies(),
        }
    }
}

/// Monotonic experience thresholds: `level_thresholds[i]` is the experience
/// needed for level `i + 1`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressionConfig {
    /// Strictly increasing, starting at 0.
    #[serde(default = "default_level_thresholds")]
    pub level_thresholds: Vec<u64>,
}

impl Default for ProgressionConfig {
    fn default() -> Self {
        Self {
            level_thresholds: default_level_thresholds(),
        }
    }
}

impl ProgressionConfig {
    /// Level reached with `experience` points. Never below 1.
    #[must_use]
    pub fn level_for(&self, experience: u64) -> u32 {
        let reached = self
            .level_thresholds
            .iter()
            .take_while(|&&t| t <= experience)
            .count();
        u32::try_from(reached.max(1)).unwrap_or(u32::MAX)
    }
}

/// The marker rule table evaluated after every ledger append.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Content-defined predicates over the choice history.
    #[serde(default = "default_marker_rules")]
    pub marker_rules: Vec<MarkerRule>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            marker_rules: default_marker_rules(),
        }
    }
}

/// Alignment drift tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignmentConfig {
    /// How many of the most recent influencing entries are counted.
    #[serde(default = "default_6")]
    pub window: usize,
    /// A rival alignment must out-pull the current one by more than this.
    #[serde(default = "default_1_5")]
    pub margin: f32,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            window: 6,
            margin: 1.5,
        }
    }
}

/// Combat formulas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombatConfig {
    /// Base damage when no fallacy is equipped.
    #[serde(default = "default_2_u32")]
    pub unarmed_damage: u32,
    /// Bonus damage = mind / this.
    #[serde(default = "default_4_i32")]
    pub mind_damage_divisor: i32,
    /// Damage reduction = heart / this.
    #[serde(default = "default_5_i32")]
    pub heart_defense_divisor: i32,
    /// Multiplier when the fallacy matches the enemy's weakness.
    #[serde(default = "default_2_0")]
    pub weakness_multiplier: f32,
    /// Multiplier indexed by syllogism difficulty − 1 (clamped to the last entry).
    #[serde(default = "default_difficulty_multipliers")]
    pub difficulty_multipliers: Vec<f32>,
    /// Fixed RNG seed for syllogism selection; random per encounter when unset.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            unarmed_damage: 2,
            mind_damage_divisor: 4,
            heart_defense_divisor: 5,
            weakness_multiplier: 2.0,
            difficulty_multipliers: default_difficulty_multipliers(),
            seed: None,
        }
    }
}

impl CombatConfig {
    /// Multiplier for a syllogism difficulty (1-based).
    #[must_use]
    pub fn difficulty_multiplier(&self, difficulty: u8) -> f32 {
        let idx = usize::from(difficulty.max(1) - 1);
        self.difficulty_multipliers
            .get(idx)
            .or_else(|| self.difficulty_multipliers.last())
            .copied()
            .unwrap_or(1.0)
    }
}

/// Per-player lock settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    /// Longest an action waits for another action on the same player.
    #[serde(default = "default_2000")]
    pub lock_timeout_ms: u64,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 2000,
        }
    }
}

/// Persistence / save configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Backend: "memory" or "sqlite".
    #[serde(default = "default_memory")]
    pub backend: String,
    /// Database file for the sqlite backend.
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Use WAL mode for concurrent reads.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
    /// Number of rotating backups to keep.
    #[serde(default = "default_3")]
    pub backup_count: u32,
    /// Detect save corruption via checksums.
    #[serde(default = "default_true")]
    pub checksum_enabled: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            path: "sophia_players.db".to_string(),
            wal_mode: true,
            backup_count: 3,
            checksum_enabled: true,
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to listen on.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Content TOML; the built-in library is used when unset.
    #[serde(default)]
    pub content_path: Option<String>,
    /// Allow any origin (the browser client is usually served elsewhere).
    #[serde(default = "default_true")]
    pub permissive_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            content_path: None,
            permissive_cors: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "pretty".to_string() }
fn default_memory() -> String { "memory".to_string() }
fn default_db_path() -> String { "sophia_players.db".to_string() }
fn default_bind() -> String { "127.0.0.1:8080".to_string() }
fn default_1_5() -> f32 { 1.5 }
fn default_2_0() -> f32 { 2.0 }
fn default_50_f32() -> f32 { 50.0 }
fn default_2_u32() -> u32 { 2 }
fn default_3() -> u32 { 3 }
fn default_4() -> usize { 4 }
fn default_4_i32() -> i32 { 4 }
fn default_5_i32() -> i32 { 5 }
fn default_5_u32() -> u32 { 5 }
fn default_6() -> usize { 6 }
fn default_12() -> usize { 12 }
fn default_20_u32() -> u32 { 20 }
fn default_2000() -> u64 { 2000 }
fn default_starting_fallacies() -> Vec<String> {
    vec!["ad_hominem".to_string(), "straw_man".to_string()]
}
fn default_level_thresholds() -> Vec<u64> {
    vec![0, 100, 250, 450, 700, 1000, 1400, 1900, 2500, 3200]
}
fn default_difficulty_multipliers() -> Vec<f32> {
    vec![1.0, 1.25, 1.5, 1.75, 2.0]
}
fn default_marker_rules() -> Vec<MarkerRule> {
    vec![
        MarkerRule {
            marker: PermanentMarker::Hypocrite,
            trigger: MarkerTrigger::Contradiction {
                min_count: 3,
                window: 10,
            },
        },
        MarkerRule {
            marker: PermanentMarker::Hedonist,
            trigger: MarkerTrigger::TagCount {
                tag: "indulgence".to_string(),
                min_count: 3,
                window: Some(10),
            },
        },
        MarkerRule {
            marker: PermanentMarker::Sophist,
            trigger: MarkerTrigger::TagCount {
                tag: "flawed_reasoning".to_string(),
                min_count: 3,
                window: None,
            },
        },
        MarkerRule {
            marker: PermanentMarker::Martyr,
            trigger: MarkerTrigger::CumulativeLoss {
                tag: "sacrifice".to_string(),
                threshold: 30.0,
            },
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        SophiaConfig::default().validate().expect("defaults validate");
    }

    #[test]
    fn empty_toml_yields_defaults() {
        let config = SophiaConfig::from_toml("").expect("parse");
        assert_eq!(config.player.base_hit_points, 20);
        assert_eq!(config.ledger.marker_rules.len(), 4);
    }

    #[test]
    fn load_layers_file_then_environment() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("sophia.toml");
        std::fs::write(
            &path,
            r#"
            [alignment]
            window = 9
            margin = 1.0

            [combat]
            seed = 42

            [[ledger.marker_rules]]
            marker = "Sophist"
            trigger = { kind = "tag_count", tag = "flawed_reasoning", min_count = 2 }
            "#,
        )
        .expect("write config");

        // SAFETY: no other test in this crate reads SOPHIA__ variables.
        unsafe { std::env::set_var("SOPHIA__ALIGNMENT__MARGIN", "3") };
        let loaded = SophiaConfig::load(Some(&path));
        unsafe { std::env::remove_var("SOPHIA__ALIGNMENT__MARGIN") };
        let config = loaded.expect("load");

        assert!((config.alignment.margin - 3.0).abs() < f32::EPSILON);
        assert_eq!(config.alignment.window, 9);
        assert_eq!(config.combat.seed, Some(42));
        assert_eq!(config.player.base_hit_points, 20);
        assert_eq!(
            config.ledger.marker_rules,
            vec![MarkerRule {
                marker: PermanentMarker::Sophist,
                trigger: MarkerTrigger::TagCount {
                    tag: "flawed_reasoning".to_string(),
                    min_count: 2,
                    window: None,
                },
            }]
        );
    }

    #[test]
    fn load_rejects_a_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = SophiaConfig::load(Some(&dir.path().join("absent.toml"))).expect_err("missing");
        assert!(matches!(err, SophiaError::Config(_)));
    }

    #[test]
    fn partial_override() {
        let config = SophiaConfig::from_toml(
            r#"
            [alignment]
            margin = 3.0

            [progression]
            level_thresholds = [0, 10, 20]
            "#,
        )
        .expect("parse");
        assert!((config.alignment.margin - 3.0).abs() < f32::EPSILON);
        assert_eq!(config.alignment.window, 6);
        assert_eq!(config.progression.level_for(15), 2);
    }

    #[test]
    fn rejects_non_monotonic_thresholds() {
        let err = SophiaConfig::from_toml("[progression]\nlevel_thresholds = [0, 50, 50]")
            .expect_err("should fail");
        assert!(matches!(err, SophiaError::Config(_)));
    }

    #[test]
    fn rejects_oversized_loadout() {
        let err = SophiaConfig::from_toml("[player]\nmax_equipped_fallacies = 5")
            .expect_err("should fail");
        assert!(matches!(err, SophiaError::Config(_)));
    }

    #[test]
    fn level_table_is_monotonic() {
        let p = ProgressionConfig::default();
        assert_eq!(p.level_for(0), 1);
        assert_eq!(p.level_for(99), 1);
        assert_eq!(p.level_for(100), 2);
        assert_eq!(p.level_for(1_000_000), 10);
        let mut last = 0;
        for xp in (0..4000).step_by(37) {
            let level = p.level_for(xp);
            assert!(level >= last);
            last = level;
        }
    }

    #[test]
    fn difficulty_multiplier_clamps_to_table() {
        let c = CombatConfig::default();
        assert!((c.difficulty_multiplier(1) - 1.0).abs() < f32::EPSILON);
        assert!((c.difficulty_multiplier(9) - 2.0).abs() < f32::EPSILON);
        assert!((c.difficulty_multiplier(0) - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn marker_rules_parse_from_toml() {
        let config = SophiaConfig::from_toml(
            r#"
            [[ledger.marker_rules]]
            marker = "Martyr"
            trigger = { kind = "value_floor", threshold = 5.0 }
            "#,
        )
        .expect("parse");
        assert_eq!(config.ledger.marker_rules.len(), 1);
        assert!(matches!(
            config.ledger.marker_rules[0].trigger,
            MarkerTrigger::ValueFloor { .. }
        ));
    }
}
