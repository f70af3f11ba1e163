//! Scenario engine: narrative choices and their consequences.

use std::sync::Arc;

use tracing::info;

use crate::alignment;
use crate::config::AlignmentConfig;
use crate::content::{Choice, ContentLibrary, Scenario};
use crate::error::{Result, SophiaError};
use crate::ledger::{AuthenticityLedger, Impact};
use crate::player::PlayerState;
use crate::registry::PlayerRegistry;
use crate::types::{ImpactSource, Influence, PlayerId};

/// Resolves scenario choices against players.
#[derive(Debug, Clone)]
pub struct ScenarioEngine {
    content: Arc<ContentLibrary>,
    registry: Arc<PlayerRegistry>,
    ledger: Arc<AuthenticityLedger>,
    alignment: AlignmentConfig,
}

impl ScenarioEngine {
    /// Wire the engine to shared content, registry and ledger.
    #[must_use]
    pub fn new(
        content: Arc<ContentLibrary>,
        registry: Arc<PlayerRegistry>,
        ledger: Arc<AuthenticityLedger>,
        alignment: AlignmentConfig,
    ) -> Self {
        Self {
            content,
            registry,
            ledger,
            alignment,
        }
    }

    /// Every scenario, in authoring order. Each call starts a fresh pass.
    pub fn list_scenarios(&self) -> impl Iterator<Item = &Scenario> + '_ {
        self.content.scenarios()
    }

    /// Look up one scenario.
    ///
    /// # Errors
    /// `SophiaError::NotFound` for unknown ids.
    pub fn get_scenario(&self, scenario_id: &str) -> Result<&Scenario> {
        self.content.scenario(scenario_id)
    }

    /// Apply a choice and persist the result.
    ///
    /// Not idempotent: resolving the same choice twice records it twice.
    ///
    /// # Errors
    /// - `NotFound` for an unknown player, scenario or choice.
    /// - `Validation` when the choice's attribute requirement is unmet.
    /// - `InvalidState` when a granted item does not fit the inventory.
    /// - `Conflict` when the player stays locked past the timeout.
    pub fn resolve_choice(
        &self,
        player_id: &PlayerId,
        scenario_id: &str,
        choice_id: &str,
    ) -> Result<PlayerState> {
        let scenario = self.content.scenario(scenario_id)?;
        let choice = scenario
            .choice(choice_id)
            .ok_or_else(|| SophiaError::not_found("choice", format!("{scenario_id}/{choice_id}")))?;

        let (_, player) = self
            .registry
            .transact(player_id, |player| self.apply_choice(player, choice))?;

        info!(
            player = %player_id,
            scenario = scenario_id,
            choice = choice_id,
            authenticity = player.authenticity_metric.value(),
            alignment = %player.philosophical_alignment,
            "Choice resolved"
        );
        Ok(player)
    }

    /// Apply a choice to an in-flight working copy.
    ///
    /// # Errors
    /// See [`ScenarioEngine::resolve_choice`].
    pub fn apply_choice(&self, player: &mut PlayerState, choice: &Choice) -> Result<()> {
        if let Some(req) = &choice.requirement {
            if !player.meets(req) {
                return Err(SophiaError::Validation(format!(
                    "choice {} requires {} {} (have {})",
                    choice.id,
                    req.attribute,
                    req.minimum,
                    player.effective_attributes().get(req.attribute)
                )));
            }
        }

        let reason = if choice.reason.is_empty() {
            choice.text.clone()
        } else {
            choice.reason.clone()
        };
        let influence = choice.alignment_influence.map(|alignment| Influence {
            alignment,
            weight: choice.influence_weight,
        });
        self.ledger.record(
            player,
            Impact::new(choice.authenticity_change, &choice.id, reason, ImpactSource::Choice)
                .with_tags(choice.tags.iter().cloned())
                .with_influence(influence),
        )?;

        player.philosophical_alignment = alignment::nudge(
            player.authenticity_metric.history(),
            player.philosophical_alignment,
            &self.alignment,
        );

        if let Some(item_id) = &choice.grants_item {
            let item = self.content.item(item_id)?.clone();
            player.add_item(item, self.registry.player_config().inventory_capacity)?;
        }
        Ok(())
    }
}
