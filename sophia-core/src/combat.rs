//! Combat engine: syllogism encounters.
//!
//! Each encounter is keyed by (player, enemy) and lives only in memory:
//!
//! ```text
//! Engaged ──► PlayerTurn ──► Resolving ──┬──► PlayerTurn
//!                  │                     └──► Concluded (Victory | Defeat)
//!                  └──────(flee)────────────► Concluded (Fled)
//! ```
//!
//! A turn presents one syllogism. Judging it correctly strikes the enemy
//! with the best equipped fallacy; judging it wrongly lets the enemy strike
//! back. All player changes go through one registry transaction, and the
//! encounter table is only updated after that transaction commits.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::CombatConfig;
use crate::content::{ContentLibrary, EnemyTemplate, Fallacy, Syllogism};
use crate::error::{Result, SophiaError};
use crate::ledger::{AuthenticityLedger, Impact};
use crate::player::PlayerState;
use crate::registry::PlayerRegistry;
use crate::types::{FallacyType, ImpactSource, PermanentMarker, PlayerId};

/// Ledger tag recorded when a player accepts an invalid argument.
pub const FLAWED_REASONING_TAG: &str = "flawed_reasoning";

// ---------------------------------------------------------------------------
// Encounter state
// ---------------------------------------------------------------------------

/// How a concluded encounter ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CombatResult {
    /// The enemy fell.
    Victory,
    /// The player fell.
    Defeat,
    /// The player walked away.
    Fled,
}

/// Where an encounter is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum EncounterState {
    /// Created; no syllogism presented yet.
    Engaged,
    /// Waiting for the player's judgement of `syllogism_id`.
    PlayerTurn {
        /// The syllogism presented this turn.
        syllogism_id: String,
    },
    /// Applying the consequences of a judgement.
    Resolving,
    /// Finished.
    Concluded {
        /// Outcome.
        result: CombatResult,
    },
}

impl EncounterState {
    /// Move to `next`, rejecting transitions the state machine does not allow.
    ///
    /// # Errors
    /// `SophiaError::InvalidState` for an illegal transition.
    pub fn transition(&self, next: Self) -> Result<Self> {
        let allowed = matches!(
            (self, &next),
            (Self::Engaged, Self::PlayerTurn { .. })
                | (Self::PlayerTurn { .. }, Self::Resolving)
                | (
                    Self::PlayerTurn { .. },
                    Self::Concluded {
                        result: CombatResult::Fled
                    }
                )
                | (Self::Resolving, Self::PlayerTurn { .. } | Self::Concluded { .. })
        );
        if allowed {
            Ok(next)
        } else {
            Err(SophiaError::InvalidState(format!(
                "encounter cannot move from {self:?} to {next:?}"
            )))
        }
    }

    /// Whether the encounter has ended.
    #[must_use]
    pub fn is_concluded(&self) -> bool {
        matches!(self, Self::Concluded { .. })
    }
}

/// An enemy instantiated for one encounter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Enemy {
    /// Template id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Remaining hit points.
    pub hit_points: u32,
    /// Starting hit points.
    pub max_hit_points: u32,
    /// Damage before multipliers.
    pub attack: u32,
    /// Fallacy type dealing bonus damage.
    pub weakness: FallacyType,
    /// Hardest syllogism posed.
    pub max_difficulty: u8,
    /// Experience on defeat.
    pub experience_reward: u64,
}

impl From<&EnemyTemplate> for Enemy {
    fn from(t: &EnemyTemplate) -> Self {
        Self {
            id: t.id.clone(),
            name: t.name.clone(),
            hit_points: t.max_hit_points,
            max_hit_points: t.max_hit_points,
            attack: t.attack,
            weakness: t.weakness,
            max_difficulty: t.max_difficulty,
            experience_reward: t.experience_reward,
        }
    }
}

/// One in-memory encounter.
#[derive(Debug, Clone)]
pub struct Encounter {
    /// Who is fighting.
    pub player_id: PlayerId,
    /// Who they are fighting.
    pub enemy: Enemy,
    /// Lifecycle position.
    pub state: EncounterState,
    /// Turns presented so far.
    pub turn: u32,
    last_syllogism: Option<String>,
    rng: StdRng,
}

impl Encounter {
    /// A fresh encounter in the `Engaged` state.
    #[must_use]
    pub fn new(player_id: PlayerId, template: &EnemyTemplate, rng: StdRng) -> Self {
        Self {
            player_id,
            enemy: Enemy::from(template),
            state: EncounterState::Engaged,
            turn: 0,
            last_syllogism: None,
            rng,
        }
    }

    /// The syllogism currently awaiting judgement.
    #[must_use]
    pub fn presented(&self) -> Option<&str> {
        match &self.state {
            EncounterState::PlayerTurn { syllogism_id } => Some(syllogism_id),
            _ => None,
        }
    }
}

type EncounterKey = (PlayerId, String);

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// The argument shown to the player. Validity is withheld.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyllogismPrompt {
    /// Id the answer must quote.
    pub id: String,
    /// Two premises.
    pub premises: Vec<String>,
    /// Conclusion.
    pub conclusion: String,
    /// 1–5.
    pub difficulty: u8,
}

impl From<&Syllogism> for SyllogismPrompt {
    fn from(s: &Syllogism) -> Self {
        Self {
            id: s.id.clone(),
            premises: s.premises.clone(),
            conclusion: s.conclusion.clone(),
            difficulty: s.difficulty,
        }
    }
}

/// A player turn awaiting an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnPrompt {
    /// Enemy template id.
    pub enemy_id: String,
    /// Enemy display name.
    pub enemy_name: String,
    /// Enemy hit points left.
    pub enemy_hit_points: u32,
    /// Enemy starting hit points.
    pub enemy_max_hit_points: u32,
    /// 1-based turn counter.
    pub turn: u32,
    /// The argument to judge.
    pub syllogism: SyllogismPrompt,
}

/// What happened on one judged turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombatOutcome {
    /// The syllogism judged.
    pub syllogism_id: String,
    /// Whether the judgement matched the ground truth.
    pub correct: bool,
    /// The ground truth, revealed after answering.
    pub was_valid: bool,
    /// Why it is (in)valid.
    pub explanation: String,
    /// Fallacy used for the strike, if any.
    pub fallacy_used: Option<String>,
    /// Whether the strike hit the enemy's weakness.
    pub weakness_exploited: bool,
    /// Damage dealt to the enemy.
    pub damage_to_enemy: u32,
    /// Damage dealt to the player.
    pub damage_to_player: u32,
    /// Enemy hit points after the turn.
    pub enemy_hit_points: u32,
    /// Ledger impact recorded for accepting a flawed argument.
    pub authenticity_impact: Option<f32>,
    /// Markers first earned this turn.
    pub new_markers: Vec<PermanentMarker>,
    /// Set when the encounter ended.
    pub result: Option<CombatResult>,
    /// Experience awarded (victory only).
    pub experience_gained: u64,
    /// Whether the award crossed a level threshold.
    pub leveled_up: bool,
    /// Effects that ran out when the encounter ended.
    pub expired_effects: Vec<String>,
}

/// Full answer to a judged turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombatResolution {
    /// Turn details.
    pub combat_outcome: CombatOutcome,
    /// The committed player state.
    pub updated_player: PlayerState,
    /// Whether another turn follows.
    pub continues_combat: bool,
    /// The next turn, when combat continues.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub next_turn: Option<TurnPrompt>,
}

// ---------------------------------------------------------------------------
// CombatEngine
// ---------------------------------------------------------------------------

/// Runs encounters and applies their consequences.
#[derive(Debug)]
pub struct CombatEngine {
    content: Arc<ContentLibrary>,
    registry: Arc<PlayerRegistry>,
    ledger: Arc<AuthenticityLedger>,
    config: CombatConfig,
    encounters: DashMap<EncounterKey, Encounter>,
    encounter_seq: AtomicU64,
}

impl CombatEngine {
    /// Wire the engine to shared content, registry and ledger.
    #[must_use]
    pub fn new(
        content: Arc<ContentLibrary>,
        registry: Arc<PlayerRegistry>,
        ledger: Arc<AuthenticityLedger>,
        config: CombatConfig,
    ) -> Self {
        Self {
            content,
            registry,
            ledger,
            config,
            encounters: DashMap::new(),
            encounter_seq: AtomicU64::new(0),
        }
    }

    /// Start (or resume) an encounter and return the turn awaiting an answer.
    ///
    /// # Errors
    /// - `NotFound` for an unknown player or enemy.
    /// - `InvalidState` if the player has no hit points left.
    /// - `Conflict` if the player stays locked past the timeout.
    pub fn engage(&self, player_id: &PlayerId, enemy_id: &str) -> Result<TurnPrompt> {
        let template = self.content.enemy(enemy_id)?;
        let tx = self.registry.begin(player_id)?;
        let key = (player_id.clone(), enemy_id.to_string());

        if tx.is_incapacitated() {
            return Err(incapacitated(&tx));
        }
        if let Some(existing) = self.encounters.get(&key) {
            if !existing.state.is_concluded() {
                return self.prompt_for(&existing);
            }
        }

        let mut encounter = Encounter::new(player_id.clone(), template, self.next_rng());
        self.present_next(&mut encounter)?;
        let prompt = self.prompt_for(&encounter)?;
        self.encounters.insert(key, encounter);
        drop(tx);

        info!(player = %player_id, enemy = enemy_id, "Encounter engaged");
        Ok(prompt)
    }

    /// The turn currently awaiting an answer.
    ///
    /// # Errors
    /// `InvalidState` if there is no active encounter.
    pub fn current_turn(&self, player_id: &PlayerId, enemy_id: &str) -> Result<TurnPrompt> {
        let key = (player_id.clone(), enemy_id.to_string());
        let encounter = self
            .encounters
            .get(&key)
            .ok_or_else(|| no_encounter(player_id, enemy_id))?;
        self.prompt_for(&encounter)
    }

    /// Whether the player has any unfinished encounter.
    #[must_use]
    pub fn has_active_encounter(&self, player_id: &PlayerId) -> bool {
        self.encounters
            .iter()
            .any(|e| e.key().0 == *player_id && !e.state.is_concluded())
    }

    /// Judge the presented syllogism.
    ///
    /// # Errors
    /// - `NotFound` for an unknown player.
    /// - `InvalidState` with no active encounter, a concluded encounter, an
    ///   unrecognised syllogism id or an id other than the one presented.
    /// - `Conflict` if the player stays locked past the timeout.
    pub fn resolve_syllogism(
        &self,
        player_id: &PlayerId,
        enemy_id: &str,
        syllogism_id: &str,
        player_answer: bool,
    ) -> Result<CombatResolution> {
        let start = Instant::now();
        let mut tx = self.registry.begin(player_id)?;
        let key = (player_id.clone(), enemy_id.to_string());

        let mut encounter = self
            .encounters
            .get(&key)
            .map(|e| e.value().clone())
            .ok_or_else(|| no_encounter(player_id, enemy_id))?;

        if encounter.state.is_concluded() {
            return Err(SophiaError::InvalidState(format!(
                "encounter with {enemy_id} is already concluded"
            )));
        }
        if tx.is_incapacitated() {
            return Err(incapacitated(&tx));
        }
        let syllogism = self.content.syllogism(syllogism_id).ok_or_else(|| {
            SophiaError::InvalidState(format!("unrecognised syllogism {syllogism_id}"))
        })?;
        if encounter.presented() != Some(syllogism_id) {
            return Err(SophiaError::InvalidState(format!(
                "syllogism {syllogism_id} was not presented this turn"
            )));
        }

        let outcome = self.resolve_turn(&mut tx, &mut encounter, syllogism, player_answer)?;
        tx.commit()?;

        let continues_combat = !encounter.state.is_concluded();
        let next_turn = if continues_combat {
            Some(self.prompt_for(&encounter)?)
        } else {
            None
        };
        self.encounters.insert(key, encounter);
        let updated_player = tx.into_state();

        debug!(
            player = %player_id,
            enemy = enemy_id,
            correct = outcome.correct,
            to_enemy = outcome.damage_to_enemy,
            to_player = outcome.damage_to_player,
            elapsed_us = start.elapsed().as_micros(),
            "Combat turn resolved"
        );

        Ok(CombatResolution {
            combat_outcome: outcome,
            updated_player,
            continues_combat,
            next_turn,
        })
    }

    /// Walk away from an active encounter. No experience; effects tick.
    ///
    /// # Errors
    /// `InvalidState` with no active encounter; `NotFound`/`Conflict` from
    /// the registry.
    pub fn flee(&self, player_id: &PlayerId, enemy_id: &str) -> Result<PlayerState> {
        let mut tx = self.registry.begin(player_id)?;
        let key = (player_id.clone(), enemy_id.to_string());
        let mut encounter = self
            .encounters
            .get(&key)
            .map(|e| e.value().clone())
            .ok_or_else(|| no_encounter(player_id, enemy_id))?;

        encounter.state = encounter.state.transition(EncounterState::Concluded {
            result: CombatResult::Fled,
        })?;
        self.conclude(&mut tx);
        tx.commit()?;
        self.encounters.insert(key, encounter);

        info!(player = %player_id, enemy = enemy_id, result = "Fled", "Encounter concluded");
        Ok(tx.into_state())
    }

    // ------------------------------------------------------------------
    // Turn mechanics
    // ------------------------------------------------------------------

    /// Apply one judgement to a working copy of the player and encounter.
    ///
    /// # Errors
    /// `InvalidState` if the encounter is not awaiting this syllogism;
    /// ledger validation errors.
    pub fn resolve_turn(
        &self,
        player: &mut PlayerState,
        encounter: &mut Encounter,
        syllogism: &Syllogism,
        player_answer: bool,
    ) -> Result<CombatOutcome> {
        if encounter.presented() != Some(syllogism.id.as_str()) {
            return Err(SophiaError::InvalidState(format!(
                "syllogism {} was not presented this turn",
                syllogism.id
            )));
        }
        encounter.state = encounter.state.transition(EncounterState::Resolving)?;

        let correct = player_answer == syllogism.valid;
        let mut outcome = CombatOutcome {
            syllogism_id: syllogism.id.clone(),
            correct,
            was_valid: syllogism.valid,
            explanation: syllogism.explanation.clone(),
            fallacy_used: None,
            weakness_exploited: false,
            damage_to_enemy: 0,
            damage_to_player: 0,
            enemy_hit_points: encounter.enemy.hit_points,
            authenticity_impact: None,
            new_markers: Vec::new(),
            result: None,
            experience_gained: 0,
            leveled_up: false,
            expired_effects: Vec::new(),
        };

        if correct {
            let strike = self.strike(player, &encounter.enemy, syllogism);
            encounter.enemy.hit_points = encounter.enemy.hit_points.saturating_sub(strike.damage);
            outcome.damage_to_enemy = strike.damage;
            outcome.fallacy_used = strike.fallacy_id;
            outcome.weakness_exploited = strike.weakness;
        } else {
            let damage = self.enemy_damage(player, &encounter.enemy, syllogism);
            outcome.damage_to_player = player.take_damage(damage);

            if player_answer && !syllogism.valid {
                if let Some(amount) = syllogism.flawed_acceptance_impact {
                    let receipt = self.ledger.record(
                        player,
                        Impact::new(
                            amount,
                            &syllogism.id,
                            "Accepted a flawed argument",
                            ImpactSource::Combat,
                        )
                        .with_tags([FLAWED_REASONING_TAG.to_string()]),
                    )?;
                    outcome.authenticity_impact = Some(amount);
                    outcome.new_markers = receipt.new_markers;
                }
            }
        }
        outcome.enemy_hit_points = encounter.enemy.hit_points;

        if encounter.enemy.hit_points == 0 {
            let change = player.gain_experience(
                encounter.enemy.experience_reward,
                self.registry.player_config(),
                self.registry.progression(),
            );
            player.encounters_won += 1;
            outcome.experience_gained = encounter.enemy.experience_reward;
            outcome.leveled_up = change.leveled_up();
            outcome.expired_effects = self.conclude(player);
            outcome.result = Some(CombatResult::Victory);
        } else if player.is_incapacitated() {
            player.encounters_lost += 1;
            outcome.expired_effects = self.conclude(player);
            outcome.result = Some(CombatResult::Defeat);
        }

        match outcome.result {
            Some(result) => {
                encounter.state = encounter
                    .state
                    .transition(EncounterState::Concluded { result })?;
                info!(
                    player = %player.id,
                    enemy = %encounter.enemy.id,
                    ?result,
                    turns = encounter.turn,
                    "Encounter concluded"
                );
            }
            None => self.present_next(encounter)?,
        }
        Ok(outcome)
    }

    /// Damage dealt to `enemy` by a correct judgement, with the fallacy used.
    #[must_use]
    pub fn strike(&self, player: &PlayerState, enemy: &Enemy, syllogism: &Syllogism) -> Strike {
        let fallacy = best_fallacy(&player.equipped_fallacies, enemy.weakness, syllogism.fallacy);
        let base = fallacy.map_or(self.config.unarmed_damage, |f| f.damage);
        let mind = player.effective_attributes().mind / self.config.mind_damage_divisor;
        let base = base.saturating_add(u32::try_from(mind.max(0)).unwrap_or(0));

        let weakness = fallacy.is_some_and(|f| f.fallacy_type == enemy.weakness);
        let mut multiplier = self.config.difficulty_multiplier(syllogism.difficulty);
        if weakness {
            multiplier *= self.config.weakness_multiplier;
        }

        Strike {
            damage: scale(base, multiplier).max(1),
            fallacy_id: fallacy.map(|f| f.id.clone()),
            weakness,
        }
    }

    /// Damage dealt to the player by a wrong judgement.
    #[must_use]
    pub fn enemy_damage(&self, player: &PlayerState, enemy: &Enemy, syllogism: &Syllogism) -> u32 {
        let raw = scale(enemy.attack, self.config.difficulty_multiplier(syllogism.difficulty));
        let defense = player.effective_attributes().heart / self.config.heart_defense_divisor;
        raw.saturating_sub(u32::try_from(defense.max(0)).unwrap_or(0))
            .max(1)
    }

    fn conclude(&self, player: &mut PlayerState) -> Vec<String> {
        let expired = player.tick_effects();
        if !expired.is_empty() {
            player.recompute_derived(self.registry.player_config(), self.registry.progression());
        }
        expired
    }

    fn present_next(&self, encounter: &mut Encounter) -> Result<()> {
        let candidates = self.content.syllogisms_up_to(encounter.enemy.max_difficulty);
        let fresh: Vec<&Syllogism> = candidates
            .iter()
            .copied()
            .filter(|s| Some(&s.id) != encounter.last_syllogism.as_ref())
            .collect();
        let pool = if fresh.is_empty() { &candidates } else { &fresh };
        let chosen = pool.choose(&mut encounter.rng).ok_or_else(|| {
            SophiaError::InvalidState(format!(
                "no syllogism available for {}",
                encounter.enemy.id
            ))
        })?;

        encounter.state = encounter.state.transition(EncounterState::PlayerTurn {
            syllogism_id: chosen.id.clone(),
        })?;
        encounter.last_syllogism = Some(chosen.id.clone());
        encounter.turn += 1;
        Ok(())
    }

    fn prompt_for(&self, encounter: &Encounter) -> Result<TurnPrompt> {
        let id = encounter.presented().ok_or_else(|| {
            SophiaError::InvalidState(format!(
                "encounter with {} is not awaiting an answer",
                encounter.enemy.id
            ))
        })?;
        let syllogism = self
            .content
            .syllogism(id)
            .ok_or_else(|| SophiaError::InvalidState(format!("unrecognised syllogism {id}")))?;
        Ok(TurnPrompt {
            enemy_id: encounter.enemy.id.clone(),
            enemy_name: encounter.enemy.name.clone(),
            enemy_hit_points: encounter.enemy.hit_points,
            enemy_max_hit_points: encounter.enemy.max_hit_points,
            turn: encounter.turn,
            syllogism: SyllogismPrompt::from(syllogism),
        })
    }

    fn next_rng(&self) -> StdRng {
        match self.config.seed {
            Some(seed) => {
                let n = self.encounter_seq.fetch_add(1, Ordering::Relaxed);
                StdRng::seed_from_u64(seed.wrapping_add(n))
            }
            None => StdRng::from_entropy(),
        }
    }
}

/// A computed strike.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Strike {
    /// Damage dealt, at least 1.
    pub damage: u32,
    /// Fallacy used; `None` when unarmed.
    pub fallacy_id: Option<String>,
    /// Whether the weakness multiplier applied.
    pub weakness: bool,
}

/// The fallacy to strike with: the enemy's weakness first, then the one the
/// syllogism commits, then the strongest.
#[must_use]
pub fn best_fallacy(
    equipped: &[Fallacy],
    weakness: FallacyType,
    committed: Option<FallacyType>,
) -> Option<&Fallacy> {
    equipped.iter().max_by_key(|f| {
        (
            f.fallacy_type == weakness,
            Some(f.fallacy_type) == committed,
            f.damage,
        )
    })
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn scale(base: u32, multiplier: f32) -> u32 {
    let v = (base as f32 * multiplier).round();
    if v <= 0.0 { 0 } else { v.min(u32::MAX as f32) as u32 }
}

fn no_encounter(player_id: &PlayerId, enemy_id: &str) -> SophiaError {
    SophiaError::InvalidState(format!(
        "player {player_id} has no active encounter with {enemy_id}"
    ))
}

fn incapacitated(player: &PlayerState) -> SophiaError {
    SophiaError::InvalidState(format!(
        "{} has no hit points left; rest before fighting",
        player.name
    ))
}
