//! Game façade: one entry point for every player-facing operation.
//!
//! [`GameEngine`] owns the content library, the registry, the ledger and the
//! scenario and combat engines. Integrations either call its methods
//! directly or hand it a tagged [`Action`].

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::combat::{CombatEngine, CombatResolution, TurnPrompt};
use crate::config::SophiaConfig;
use crate::content::{ContentLibrary, ItemKind, Scenario};
use crate::error::{Result, SophiaError};
use crate::ledger::{AuthenticityLedger, Impact};
use crate::persistence::{self, PlayerStore};
use crate::player::PlayerState;
use crate::registry::PlayerRegistry;
use crate::scenario::ScenarioEngine;
use crate::types::{Alignment, ImpactSource, PlayerId};

/// A player intent, as relayed by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum Action {
    /// Pick a choice in a scenario.
    ResolveChoice {
        /// Scenario id.
        scenario_id: String,
        /// Choice id within the scenario.
        choice_id: String,
    },
    /// Start or resume an encounter.
    EngageEnemy {
        /// Enemy template id.
        enemy_id: String,
    },
    /// Judge the presented syllogism.
    AnswerSyllogism {
        /// Enemy template id.
        enemy_id: String,
        /// The presented syllogism.
        syllogism_id: String,
        /// `true` for "valid".
        player_answer: bool,
    },
    /// Leave an encounter.
    Flee {
        /// Enemy template id.
        enemy_id: String,
    },
    /// Consume or toggle an inventory item.
    UseItem {
        /// Item id.
        item_id: String,
    },
    /// Add a fallacy to the loadout.
    EquipFallacy {
        /// Fallacy id.
        fallacy_id: String,
    },
    /// Remove a fallacy from the loadout.
    UnequipFallacy {
        /// Fallacy id.
        fallacy_id: String,
    },
    /// Restore hit points outside combat.
    Rest,
}

/// What an [`Action`] produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum ActionResponse {
    /// The refreshed player.
    StateUpdate {
        /// Committed state.
        player: PlayerState,
    },
    /// A turn awaiting an answer.
    CombatTurn {
        /// The prompt.
        turn: TurnPrompt,
        /// Current state.
        player: PlayerState,
    },
    /// A judged turn.
    CombatResolved(CombatResolution),
}

/// The wired-up rules engine.
#[derive(Debug)]
pub struct GameEngine {
    content: Arc<ContentLibrary>,
    registry: Arc<PlayerRegistry>,
    ledger: Arc<AuthenticityLedger>,
    scenarios: ScenarioEngine,
    combat: CombatEngine,
}

impl GameEngine {
    /// Wire every component over an explicit content library and store.
    ///
    /// # Errors
    /// `SophiaError::Config` if the starting loadout references unknown
    /// fallacies.
    pub fn new(
        config: &SophiaConfig,
        content: ContentLibrary,
        store: Arc<dyn PlayerStore>,
    ) -> Result<Self> {
        let content = Arc::new(content);
        let registry = Arc::new(PlayerRegistry::new(store, config, &content)?);
        let ledger = Arc::new(AuthenticityLedger::new(config.ledger.marker_rules.clone()));
        let scenarios = ScenarioEngine::new(
            Arc::clone(&content),
            Arc::clone(&registry),
            Arc::clone(&ledger),
            config.alignment.clone(),
        );
        let combat = CombatEngine::new(
            Arc::clone(&content),
            Arc::clone(&registry),
            Arc::clone(&ledger),
            config.combat.clone(),
        );
        Ok(Self {
            content,
            registry,
            ledger,
            scenarios,
            combat,
        })
    }

    /// Load content and open the configured store.
    ///
    /// # Errors
    /// Content, configuration or database errors.
    pub fn from_config(config: &SophiaConfig) -> Result<Self> {
        let content = match &config.server.content_path {
            Some(path) => ContentLibrary::from_file(Path::new(path))?,
            None => ContentLibrary::builtin()?,
        };
        let store = persistence::open_store(&config.persistence)?;
        let engine = Self::new(config, content, store)?;
        info!(
            backend = %config.persistence.backend,
            scenarios = engine.content.scenarios().count(),
            enemies = engine.content.enemies().count(),
            "Game engine ready"
        );
        Ok(engine)
    }

    /// Static content.
    #[must_use]
    pub fn content(&self) -> &ContentLibrary {
        &self.content
    }

    /// The player registry.
    #[must_use]
    pub fn registry(&self) -> &PlayerRegistry {
        &self.registry
    }

    /// The ledger.
    #[must_use]
    pub fn ledger(&self) -> &AuthenticityLedger {
        &self.ledger
    }

    /// The scenario engine.
    #[must_use]
    pub fn scenarios(&self) -> &ScenarioEngine {
        &self.scenarios
    }

    /// The combat engine.
    #[must_use]
    pub fn combat(&self) -> &CombatEngine {
        &self.combat
    }

    // ------------------------------------------------------------------
    // Player lifecycle
    // ------------------------------------------------------------------

    /// See [`PlayerRegistry::create_player`].
    ///
    /// # Errors
    /// `Validation` for a blank name.
    pub fn create_player(&self, name: &str, alignment: Alignment) -> Result<PlayerState> {
        self.registry.create_player(name, alignment)
    }

    /// See [`PlayerRegistry::get_player`].
    ///
    /// # Errors
    /// `NotFound` for unknown ids.
    pub fn get_player(&self, id: &PlayerId) -> Result<PlayerState> {
        self.registry.get_player(id)
    }

    /// All scenarios, in authoring order.
    pub fn list_scenarios(&self) -> impl Iterator<Item = &Scenario> + '_ {
        self.scenarios.list_scenarios()
    }

    // ------------------------------------------------------------------
    // Inventory & loadout
    // ------------------------------------------------------------------

    /// Consume a consumable or toggle a piece of equipment.
    ///
    /// # Errors
    /// `NotFound` if the player does not carry the item.
    pub fn use_item(&self, player_id: &PlayerId, item_id: &str) -> Result<PlayerState> {
        let (_, player) = self.registry.transact(player_id, |player| {
            let pos = player.inventory_position(item_id)?;
            match player.inventory[pos].item.kind {
                ItemKind::Equipment => {
                    let worn = player.toggle_equipment(item_id)?;
                    debug!(player = %player.id, item = item_id, worn, "Equipment toggled");
                }
                ItemKind::Consumable => {
                    let item = player.take_consumable(item_id)?;
                    player.attributes = player.attributes.apply(&item.modifiers);
                    if item.authenticity_change != 0.0 || item.tag.is_some() {
                        self.ledger.record(
                            player,
                            Impact::new(
                                item.authenticity_change,
                                &item.id,
                                format!("Used {}", item.name),
                                ImpactSource::Item,
                            )
                            .with_tags(item.tag.clone()),
                        )?;
                    }
                    if let Some(effect) = item.effect {
                        player.active_effects.push(effect);
                    }
                    debug!(player = %player.id, item = item_id, "Consumable used");
                }
            }
            player.recompute_derived(self.registry.player_config(), self.registry.progression());
            Ok(())
        })?;
        Ok(player)
    }

    /// Equip a fallacy from the content library.
    ///
    /// # Errors
    /// `NotFound` for unknown fallacies; `InvalidState` when already equipped
    /// or the loadout is full.
    pub fn equip_fallacy(&self, player_id: &PlayerId, fallacy_id: &str) -> Result<PlayerState> {
        let fallacy = self.content.fallacy(fallacy_id)?.clone();
        let slots = self.registry.player_config().max_equipped_fallacies;
        let (_, player) = self
            .registry
            .transact(player_id, |player| player.equip_fallacy(fallacy, slots))?;
        Ok(player)
    }

    /// Remove a fallacy from the loadout.
    ///
    /// # Errors
    /// `NotFound` when it is not equipped.
    pub fn unequip_fallacy(&self, player_id: &PlayerId, fallacy_id: &str) -> Result<PlayerState> {
        let (_, player) = self
            .registry
            .transact(player_id, |player| player.unequip_fallacy(fallacy_id).map(|_| ()))?;
        Ok(player)
    }

    /// Restore hit points to the maximum.
    ///
    /// # Errors
    /// `InvalidState` while any encounter is active.
    pub fn rest(&self, player_id: &PlayerId) -> Result<PlayerState> {
        let (_, player) = self.registry.transact(player_id, |player| {
            if self.combat.has_active_encounter(player_id) {
                return Err(SophiaError::InvalidState(
                    "cannot rest during an encounter".into(),
                ));
            }
            player.heal_full();
            Ok(())
        })?;
        Ok(player)
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    /// Execute one action for a player.
    ///
    /// # Errors
    /// Whatever the underlying operation returns.
    pub fn dispatch(&self, player_id: &PlayerId, action: Action) -> Result<ActionResponse> {
        debug!(player = %player_id, ?action, "Dispatching action");
        let player = match action {
            Action::ResolveChoice {
                scenario_id,
                choice_id,
            } => self
                .scenarios
                .resolve_choice(player_id, &scenario_id, &choice_id)?,
            Action::EngageEnemy { enemy_id } => {
                let turn = self.combat.engage(player_id, &enemy_id)?;
                let player = self.registry.get_player(player_id)?;
                return Ok(ActionResponse::CombatTurn { turn, player });
            }
            Action::AnswerSyllogism {
                enemy_id,
                syllogism_id,
                player_answer,
            } => {
                let resolution = self.combat.resolve_syllogism(
                    player_id,
                    &enemy_id,
                    &syllogism_id,
                    player_answer,
                )?;
                return Ok(ActionResponse::CombatResolved(resolution));
            }
            Action::Flee { enemy_id } => self.combat.flee(player_id, &enemy_id)?,
            Action::UseItem { item_id } => self.use_item(player_id, &item_id)?,
            Action::EquipFallacy { fallacy_id } => self.equip_fallacy(player_id, &fallacy_id)?,
            Action::UnequipFallacy { fallacy_id } => {
                self.unequip_fallacy(player_id, &fallacy_id)?
            }
            Action::Rest => self.rest(player_id)?,
        };
        Ok(ActionResponse::StateUpdate { player })
    }

    /// Write a recovery point through the store (rotating backup on SQLite).
    ///
    /// # Errors
    /// Store failures.
    pub fn checkpoint(&self) -> Result<()> {
        self.registry.store().checkpoint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;

    fn engine() -> GameEngine {
        let mut config = SophiaConfig::default();
        config.combat.seed = Some(11);
        GameEngine::new(
            &config,
            ContentLibrary::builtin().expect("content"),
            Arc::new(MemoryStore::new()),
        )
        .expect("engine")
    }

    fn updated(resp: ActionResponse) -> PlayerState {
        match resp {
            ActionResponse::StateUpdate { player } => player,
            other => panic!("expected StateUpdate, got {other:?}"),
        }
    }

    #[test]
    fn action_json_shape() {
        let action: Action = serde_json::from_str(
            r#"{"type":"ResolveChoice","scenarioId":"the_feast","choiceId":"abstain"}"#,
        )
        .expect("parse");
        assert_eq!(
            action,
            Action::ResolveChoice {
                scenario_id: "the_feast".into(),
                choice_id: "abstain".into()
            }
        );
        let rest: Action = serde_json::from_str(r#"{"type":"Rest"}"#).expect("parse");
        assert_eq!(rest, Action::Rest);
    }

    #[test]
    fn dispatch_resolve_choice_returns_state_update() {
        let g = engine();
        let p = g.create_player("Beauvoir", Alignment::Existentialist).expect("create");
        let resp = g
            .dispatch(
                &p.id,
                Action::ResolveChoice {
                    scenario_id: "the_mirror".into(),
                    choice_id: "affirm_choice".into(),
                },
            )
            .expect("dispatch");
        let json = serde_json::to_value(&resp).expect("ser");
        assert_eq!(json["type"], "StateUpdate");
        assert!((updated(resp).authenticity_metric.value() - 56.0).abs() < f32::EPSILON);
    }

    #[test]
    fn consumables_apply_and_disappear() {
        let g = engine();
        let p = g.create_player("Epicurus", Alignment::Nihilist).expect("create");
        g.dispatch(
            &p.id,
            Action::ResolveChoice {
                scenario_id: "market_of_ideas".into(),
                choice_id: "buy_wine".into(),
            },
        )
        .expect("buy");
        let after = g.use_item(&p.id, "wine_of_dionysus").expect("drink");
        assert!(after.inventory.is_empty());
        assert_eq!(after.active_effects.len(), 1);
        assert_eq!(after.effective_attributes().body, 7);
        let last = after.authenticity_metric.history().last().expect("entry");
        assert_eq!(last.source, ImpactSource::Item);
        assert!(last.has_tag("indulgence"));
    }

    #[test]
    fn equipment_toggles_and_raises_attributes() {
        let g = engine();
        let p = g.create_player("Marcus", Alignment::Existentialist).expect("create");
        g.scenarios()
            .resolve_choice(&p.id, "market_of_ideas", "buy_journal")
            .expect("buy");
        let worn = g.use_item(&p.id, "stoic_journal").expect("wear");
        assert!(worn.inventory[0].equipped);
        assert_eq!(worn.effective_attributes().heart, 7);
        let removed = g.use_item(&p.id, "stoic_journal").expect("remove");
        assert!(!removed.inventory[0].equipped);
        assert_eq!(removed.inventory.len(), 1);
    }

    #[test]
    fn using_an_item_not_carried_is_not_found() {
        let g = engine();
        let p = g.create_player("Diogenes", Alignment::Nihilist).expect("create");
        assert!(matches!(
            g.use_item(&p.id, "lantern_of_diogenes"),
            Err(SophiaError::NotFound { .. })
        ));
    }

    #[test]
    fn loadout_management() {
        let g = engine();
        let p = g.create_player("Aristotle", Alignment::Utilitarian).expect("create");
        assert!(matches!(
            g.equip_fallacy(&p.id, "ad_hominem"),
            Err(SophiaError::InvalidState(_))
        ));
        assert!(matches!(
            g.equip_fallacy(&p.id, "no_such_fallacy"),
            Err(SophiaError::NotFound { .. })
        ));
        g.equip_fallacy(&p.id, "false_dilemma").expect("3");
        let full = g.equip_fallacy(&p.id, "slippery_slope").expect("4");
        assert_eq!(full.equipped_fallacies.len(), 4);
        assert!(matches!(
            g.equip_fallacy(&p.id, "circular_reasoning"),
            Err(SophiaError::InvalidState(_))
        ));
        let fewer = g.unequip_fallacy(&p.id, "straw_man").expect("unequip");
        assert_eq!(fewer.equipped_fallacies.len(), 3);
    }

    #[test]
    fn rest_is_blocked_during_combat() {
        let g = engine();
        let p = g.create_player("Plato", Alignment::Utilitarian).expect("create");
        let resp = g
            .dispatch(
                &p.id,
                Action::EngageEnemy {
                    enemy_id: "sophist_apprentice".into(),
                },
            )
            .expect("engage");
        assert!(matches!(resp, ActionResponse::CombatTurn { .. }));
        assert!(matches!(g.rest(&p.id), Err(SophiaError::InvalidState(_))));

        g.dispatch(
            &p.id,
            Action::Flee {
                enemy_id: "sophist_apprentice".into(),
            },
        )
        .expect("flee");
        let rested = updated(g.dispatch(&p.id, Action::Rest).expect("rest"));
        assert_eq!(rested.hit_points, rested.max_hit_points);
    }
}
