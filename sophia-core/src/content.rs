//! Static game content: scenarios, fallacies, syllogisms, enemies, items.
//!
//! Content is loaded once at startup and never created at runtime. It is
//! authored as TOML (camelCase keys, the same shape the client receives);
//! a default library is compiled into the crate.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, SophiaError};
use crate::types::{Alignment, AttributeModifiers, AttributeRequirement, FallacyType};

/// The content library compiled into the crate.
const BUILTIN_CONTENT: &str = include_str!("../content/default.toml");

// ---------------------------------------------------------------------------
// Content types
// ---------------------------------------------------------------------------

/// A combat asset: a named fallacy the player wields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fallacy {
    /// Content id.
    pub id: String,
    /// Which flawed-reasoning pattern this is.
    pub fallacy_type: FallacyType,
    /// Display name.
    pub name: String,
    /// Base damage on a correct judgement.
    pub damage: u32,
    /// Explanatory text shown alongside the strike.
    pub explanation: String,
}

/// Whether an item is used up or worn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemKind {
    /// Applied once and removed from the inventory.
    Consumable,
    /// Toggled on and off; modifiers count while equipped.
    Equipment,
}

/// A modifier that fades after a number of concluded encounters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemporaryEffect {
    /// Display name.
    pub name: String,
    /// Attribute deltas while active.
    #[serde(default)]
    pub modifiers: AttributeModifiers,
    /// Concluded encounters left before the effect ends.
    pub remaining_encounters: i32,
}

/// An immutable item template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    /// Content id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Flavour text.
    #[serde(default)]
    pub description: String,
    /// Consumable or equipment.
    pub kind: ItemKind,
    /// Permanent deltas (consumables) or while-equipped deltas (equipment).
    #[serde(default)]
    pub modifiers: AttributeModifiers,
    /// Ledger impact when consumed.
    #[serde(default)]
    pub authenticity_change: f32,
    /// Ledger tag recorded when consumed.
    #[serde(default)]
    pub tag: Option<String>,
    /// Effect applied when consumed.
    #[serde(default)]
    pub effect: Option<TemporaryEffect>,
}

/// One option within a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Choice {
    /// Content id, unique within its scenario.
    pub id: String,
    /// Text the player sees.
    pub text: String,
    /// Signed ledger impact.
    pub authenticity_change: f32,
    /// Which alignment this choice votes for, if any.
    #[serde(default)]
    pub alignment_influence: Option<Alignment>,
    /// Strength of the vote.
    #[serde(default = "default_weight")]
    pub influence_weight: f32,
    /// Ledger reason.
    #[serde(default)]
    pub reason: String,
    /// Ledger tags read by the marker rules.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Attribute gate.
    #[serde(default)]
    pub requirement: Option<AttributeRequirement>,
    /// Item id added to the inventory.
    #[serde(default)]
    pub grants_item: Option<String>,
}

/// A narrative situation offering a set of choices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    /// Content id.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Scene text.
    pub description: String,
    /// The options.
    pub choices: Vec<Choice>,
}

impl Scenario {
    /// Look up a choice by id.
    #[must_use]
    pub fn choice(&self, choice_id: &str) -> Option<&Choice> {
        self.choices.iter().find(|c| c.id == choice_id)
    }
}

/// A two-premise argument the player judges valid or invalid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Syllogism {
    /// Content id.
    pub id: String,
    /// Exactly two premises.
    pub premises: Vec<String>,
    /// The conclusion drawn.
    pub conclusion: String,
    /// Ground truth.
    pub valid: bool,
    /// 1 (easy) to 5 (hard).
    pub difficulty: u8,
    /// The fallacy committed when invalid.
    #[serde(default)]
    pub fallacy: Option<FallacyType>,
    /// Ledger impact for accepting this argument when it is invalid.
    #[serde(default)]
    pub flawed_acceptance_impact: Option<f32>,
    /// Why it is (in)valid; revealed after the answer.
    #[serde(default)]
    pub explanation: String,
}

/// An enemy template, instantiated per encounter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnemyTemplate {
    /// Content id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Flavour text.
    #[serde(default)]
    pub description: String,
    /// Starting hit points.
    pub max_hit_points: u32,
    /// Damage dealt on a wrong judgement before multipliers.
    pub attack: u32,
    /// Fallacy type that deals bonus damage.
    pub weakness: FallacyType,
    /// Hardest syllogism this enemy poses.
    pub max_difficulty: u8,
    /// Experience awarded on victory.
    pub experience_reward: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContentFile {
    #[serde(default)]
    fallacies: Vec<Fallacy>,
    #[serde(default)]
    items: Vec<Item>,
    #[serde(default)]
    scenarios: Vec<Scenario>,
    #[serde(default)]
    syllogisms: Vec<Syllogism>,
    #[serde(default)]
    enemies: Vec<EnemyTemplate>,
}

// ---------------------------------------------------------------------------
// ContentLibrary
// ---------------------------------------------------------------------------

/// Validated, indexed content tables.
#[derive(Debug, Clone)]
pub struct ContentLibrary {
    fallacies: Vec<Fallacy>,
    items: Vec<Item>,
    scenarios: Vec<Scenario>,
    syllogisms: Vec<Syllogism>,
    enemies: Vec<EnemyTemplate>,
    fallacy_index: HashMap<String, usize>,
    item_index: HashMap<String, usize>,
    scenario_index: HashMap<String, usize>,
    syllogism_index: HashMap<String, usize>,
    enemy_index: HashMap<String, usize>,
}

impl ContentLibrary {
    /// The library compiled into the crate.
    ///
    /// # Errors
    /// Returns `SophiaError::Config` if the bundled TOML is malformed.
    pub fn builtin() -> Result<Self> {
        Self::from_toml(BUILTIN_CONTENT)
    }

    /// Parse and validate a content TOML document.
    ///
    /// # Errors
    /// Returns `SophiaError::Config` on parse errors, duplicate ids, dangling
    /// references or out-of-range values.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let file: ContentFile =
            toml::from_str(toml_str).map_err(|e| SophiaError::Config(e.to_string()))?;
        Self::build(file)
    }

    /// Load a content TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let library = Self::from_toml(&content)?;
        info!(
            path = %path.display(),
            scenarios = library.scenarios.len(),
            syllogisms = library.syllogisms.len(),
            enemies = library.enemies.len(),
            "Content library loaded"
        );
        Ok(library)
    }

    fn build(file: ContentFile) -> Result<Self> {
        let fallacy_index = index_by_id("fallacy", file.fallacies.iter().map(|f| &f.id))?;
        let item_index = index_by_id("item", file.items.iter().map(|i| &i.id))?;
        let scenario_index = index_by_id("scenario", file.scenarios.iter().map(|s| &s.id))?;
        let syllogism_index = index_by_id("syllogism", file.syllogisms.iter().map(|s| &s.id))?;
        let enemy_index = index_by_id("enemy", file.enemies.iter().map(|e| &e.id))?;

        let library = Self {
            fallacies: file.fallacies,
            items: file.items,
            scenarios: file.scenarios,
            syllogisms: file.syllogisms,
            enemies: file.enemies,
            fallacy_index,
            item_index,
            scenario_index,
            syllogism_index,
            enemy_index,
        };
        library.validate()?;
        Ok(library)
    }

    fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(SophiaError::Config(msg));

        for f in &self.fallacies {
            if f.damage == 0 {
                return fail(format!("fallacy {} has zero damage", f.id));
            }
        }

        for item in &self.items {
            if !item.authenticity_change.is_finite() {
                return fail(format!("item {} has a non-finite authenticity change", item.id));
            }
            if item.effect.as_ref().is_some_and(|e| e.remaining_encounters <= 0) {
                return fail(format!("item {} effect must last at least one encounter", item.id));
            }
        }

        for s in &self.scenarios {
            if s.choices.is_empty() {
                return fail(format!("scenario {} has no choices", s.id));
            }
            let mut seen = HashSet::new();
            for c in &s.choices {
                if !seen.insert(c.id.as_str()) {
                    return fail(format!("scenario {} repeats choice {}", s.id, c.id));
                }
                if !c.authenticity_change.is_finite()
                    || !c.influence_weight.is_finite()
                    || c.influence_weight < 0.0
                {
                    return fail(format!("choice {}/{} has invalid numbers", s.id, c.id));
                }
                if let Some(item_id) = &c.grants_item {
                    if !self.item_index.contains_key(item_id) {
                        return fail(format!(
                            "choice {}/{} grants unknown item {item_id}",
                            s.id, c.id
                        ));
                    }
                }
            }
        }

        for s in &self.syllogisms {
            if s.premises.len() != 2 {
                return fail(format!("syllogism {} must have exactly two premises", s.id));
            }
            if !(1..=5).contains(&s.difficulty) {
                return fail(format!("syllogism {} difficulty must be 1..=5", s.id));
            }
            if s.flawed_acceptance_impact.is_some_and(|v| !v.is_finite()) {
                return fail(format!("syllogism {} has a non-finite impact", s.id));
            }
        }

        for e in &self.enemies {
            if e.max_hit_points == 0 || e.attack == 0 {
                return fail(format!("enemy {} needs positive hit points and attack", e.id));
            }
            if self.syllogisms_up_to(e.max_difficulty).is_empty() {
                return fail(format!("enemy {} has no syllogism within its difficulty", e.id));
            }
        }

        Ok(())
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    /// All scenarios in authoring order. Restartable: call again for a fresh pass.
    pub fn scenarios(&self) -> impl Iterator<Item = &Scenario> + '_ {
        self.scenarios.iter()
    }

    /// All fallacies in authoring order.
    pub fn fallacies(&self) -> impl Iterator<Item = &Fallacy> + '_ {
        self.fallacies.iter()
    }

    /// All enemies in authoring order.
    pub fn enemies(&self) -> impl Iterator<Item = &EnemyTemplate> + '_ {
        self.enemies.iter()
    }

    /// All syllogisms in authoring order.
    pub fn syllogisms(&self) -> impl Iterator<Item = &Syllogism> + '_ {
        self.syllogisms.iter()
    }

    /// Look up a scenario.
    ///
    /// # Errors
    /// `SophiaError::NotFound` for unknown ids.
    pub fn scenario(&self, id: &str) -> Result<&Scenario> {
        lookup(&self.scenarios, &self.scenario_index, "scenario", id)
    }

    /// Look up a fallacy.
    ///
    /// # Errors
    /// `SophiaError::NotFound` for unknown ids.
    pub fn fallacy(&self, id: &str) -> Result<&Fallacy> {
        lookup(&self.fallacies, &self.fallacy_index, "fallacy", id)
    }

    /// Look up an item.
    ///
    /// # Errors
    /// `SophiaError::NotFound` for unknown ids.
    pub fn item(&self, id: &str) -> Result<&Item> {
        lookup(&self.items, &self.item_index, "item", id)
    }

    /// Look up an enemy template.
    ///
    /// # Errors
    /// `SophiaError::NotFound` for unknown ids.
    pub fn enemy(&self, id: &str) -> Result<&EnemyTemplate> {
        lookup(&self.enemies, &self.enemy_index, "enemy", id)
    }

    /// Look up a syllogism; `None` for unknown ids (combat treats those as a
    /// state error, not a missing resource).
    #[must_use]
    pub fn syllogism(&self, id: &str) -> Option<&Syllogism> {
        self.syllogism_index.get(id).map(|&i| &self.syllogisms[i])
    }

    /// Syllogisms no harder than `max_difficulty`, in authoring order.
    #[must_use]
    pub fn syllogisms_up_to(&self, max_difficulty: u8) -> Vec<&Syllogism> {
        self.syllogisms
            .iter()
            .filter(|s| s.difficulty <= max_difficulty)
            .collect()
    }
}

fn index_by_id<'a>(
    kind: &str,
    ids: impl Iterator<Item = &'a String>,
) -> Result<HashMap<String, usize>> {
    let mut index = HashMap::new();
    for (i, id) in ids.enumerate() {
        if id.trim().is_empty() {
            return Err(SophiaError::Config(format!("{kind} #{i} has an empty id")));
        }
        if index.insert(id.clone(), i).is_some() {
            return Err(SophiaError::Config(format!("duplicate {kind} id: {id}")));
        }
    }
    Ok(index)
}

fn lookup<'a, T>(
    items: &'a [T],
    index: &HashMap<String, usize>,
    kind: &'static str,
    id: &str,
) -> Result<&'a T> {
    index
        .get(id)
        .map(|&i| &items[i])
        .ok_or_else(|| SophiaError::not_found(kind, id))
}

fn default_weight() -> f32 {
    1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_library_loads() {
        let lib = ContentLibrary::builtin().expect("builtin content");
        assert!(lib.scenarios().count() >= 3);
        assert!(lib.fallacy("ad_hominem").is_ok());
        assert!(lib.fallacy("straw_man").is_ok());
        assert!(lib.enemies().count() >= 2);
    }

    #[test]
    fn scenario_listing_is_restartable() {
        let lib = ContentLibrary::builtin().expect("builtin content");
        let first: Vec<_> = lib.scenarios().map(|s| s.id.clone()).collect();
        let second: Vec<_> = lib.scenarios().map(|s| s.id.clone()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn unknown_lookups_are_not_found() {
        let lib = ContentLibrary::builtin().expect("builtin content");
        assert!(matches!(
            lib.scenario("nope"),
            Err(SophiaError::NotFound { kind: "scenario", .. })
        ));
        assert!(lib.syllogism("nope").is_none());
    }

    #[test]
    fn rejects_duplicate_ids() {
        let toml = r#"
            [[fallacies]]
            id = "x"
            fallacyType = "AdHominem"
            name = "X"
            damage = 3
            explanation = ""

            [[fallacies]]
            id = "x"
            fallacyType = "StrawMan"
            name = "Y"
            damage = 3
            explanation = ""
        "#;
        assert!(matches!(
            ContentLibrary::from_toml(toml),
            Err(SophiaError::Config(_))
        ));
    }

    #[test]
    fn rejects_single_premise() {
        let toml = r#"
            [[syllogisms]]
            id = "s"
            premises = ["All A are B."]
            conclusion = "Therefore."
            valid = true
            difficulty = 1
        "#;
        assert!(ContentLibrary::from_toml(toml).is_err());
    }

    #[test]
    fn rejects_dangling_item_grant() {
        let toml = r#"
            [[scenarios]]
            id = "s"
            title = "T"
            description = "D"

            [[scenarios.choices]]
            id = "c"
            text = "take it"
            authenticityChange = 1.0
            grantsItem = "ghost"
        "#;
        assert!(ContentLibrary::from_toml(toml).is_err());
    }

    #[test]
    fn rejects_effects_that_never_run() {
        for remaining in [0, -2] {
            let toml = format!(
                r#"
                [[items]]
                id = "stale_wine"
                name = "Stale Wine"
                kind = "Consumable"
                effect = {{ name = "Flat", remainingEncounters = {remaining} }}
                "#
            );
            assert!(matches!(
                ContentLibrary::from_toml(&toml),
                Err(SophiaError::Config(_))
            ));
        }
    }

    #[test]
    fn every_enemy_has_reachable_syllogisms() {
        let lib = ContentLibrary::builtin().expect("builtin content");
        for enemy in lib.enemies() {
            assert!(!lib.syllogisms_up_to(enemy.max_difficulty).is_empty());
        }
    }
}
