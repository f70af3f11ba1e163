//! Player state: the authoritative record the registry stores.
//!
//! Everything here is a pure mutation of one [`PlayerState`]; locking and
//! persistence belong to [`crate::registry`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{PlayerConfig, ProgressionConfig};
use crate::content::{Fallacy, Item, ItemKind, TemporaryEffect};
use crate::error::{Result, SophiaError};
use crate::ledger::AuthenticityMetric;
use crate::types::{Alignment, AttributeModifiers, AttributeRequirement, Attributes, PlayerId};

/// An item instance in a player's inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryEntry {
    /// The template this entry was instantiated from.
    #[serde(flatten)]
    pub item: Item,
    /// Whether equipment is currently worn. Always false for consumables.
    #[serde(default)]
    pub equipped: bool,
    /// When the item was acquired.
    pub acquired_at: DateTime<Utc>,
}

/// Level and hit-point change produced by an experience award.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelChange {
    /// Level before the award.
    pub previous: u32,
    /// Level after the award.
    pub current: u32,
}

impl LevelChange {
    /// Whether at least one level was gained.
    #[must_use]
    pub fn leveled_up(&self) -> bool {
        self.current > self.previous
    }
}

/// One player's authoritative state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    /// Stable identity.
    pub id: PlayerId,
    /// Display name, never blank.
    pub name: String,
    /// Base trinity (before items and effects).
    #[serde(flatten)]
    pub attributes: Attributes,
    /// Current hit points, within `[0, max_hit_points]`.
    pub hit_points: u32,
    /// Derived from level and body.
    pub max_hit_points: u32,
    /// The authenticity ledger's state for this player.
    pub authenticity_metric: AuthenticityMetric,
    /// Dominant stance; drifts only through accumulated choices.
    pub philosophical_alignment: Alignment,
    /// Items in acquisition order.
    pub inventory: Vec<InventoryEntry>,
    /// Combat loadout.
    pub equipped_fallacies: Vec<Fallacy>,
    /// Total experience.
    pub experience: u64,
    /// Derived from experience.
    pub level: u32,
    /// Temporary modifiers, ticked once per concluded encounter.
    pub active_effects: Vec<TemporaryEffect>,
    /// Encounters ending in victory.
    #[serde(default)]
    pub encounters_won: u32,
    /// Encounters ending in defeat.
    #[serde(default)]
    pub encounters_lost: u32,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last successful save.
    pub updated_at: DateTime<Utc>,
}

impl PlayerState {
    /// Create a fresh level-1 character at full health.
    ///
    /// # Errors
    /// `SophiaError::Validation` if `name` is empty or whitespace.
    pub fn new(
        name: &str,
        alignment: Alignment,
        player: &PlayerConfig,
        progression: &ProgressionConfig,
        loadout: Vec<Fallacy>,
    ) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SophiaError::Validation("player name must not be blank".into()));
        }

        let attributes =
            Attributes::new(player.default_body, player.default_mind, player.default_heart);
        let level = progression.level_for(0);
        let max_hit_points = max_hit_points_for(level, attributes.body, player);
        let now = Utc::now();

        Ok(Self {
            id: PlayerId::generate(),
            name: name.to_string(),
            attributes,
            hit_points: max_hit_points,
            max_hit_points,
            authenticity_metric: AuthenticityMetric::new(player.starting_authenticity),
            philosophical_alignment: alignment,
            inventory: Vec::new(),
            equipped_fallacies: loadout,
            experience: 0,
            level,
            active_effects: Vec::new(),
            encounters_won: 0,
            encounters_lost: 0,
            created_at: now,
            updated_at: now,
        })
    }

    // ------------------------------------------------------------------
    // Attributes
    // ------------------------------------------------------------------

    /// Sum of modifiers from worn equipment and active effects.
    #[must_use]
    pub fn active_modifiers(&self) -> AttributeModifiers {
        let worn = self
            .inventory
            .iter()
            .filter(|e| e.equipped)
            .map(|e| e.item.modifiers);
        let effects = self.active_effects.iter().map(|e| e.modifiers);
        worn.chain(effects)
            .fold(AttributeModifiers::default(), |acc, m| acc.combine(&m))
    }

    /// Base trinity with equipment and effects applied, clamped.
    #[must_use]
    pub fn effective_attributes(&self) -> Attributes {
        self.attributes.apply(&self.active_modifiers())
    }

    /// Whether the player satisfies an attribute gate.
    #[must_use]
    pub fn meets(&self, requirement: &AttributeRequirement) -> bool {
        self.effective_attributes().get(requirement.attribute) >= requirement.minimum
    }

    /// Recompute level and maximum hit points, keeping hit points in range.
    pub fn recompute_derived(&mut self, player: &PlayerConfig, progression: &ProgressionConfig) {
        self.level = progression.level_for(self.experience);
        self.max_hit_points =
            max_hit_points_for(self.level, self.effective_attributes().body, player);
        self.hit_points = self.hit_points.min(self.max_hit_points);
    }

    // ------------------------------------------------------------------
    // Health & progression
    // ------------------------------------------------------------------

    /// Subtract hit points, saturating at zero. Returns the damage applied.
    pub fn take_damage(&mut self, amount: u32) -> u32 {
        let applied = amount.min(self.hit_points);
        self.hit_points -= applied;
        applied
    }

    /// Whether the player is at zero hit points.
    #[must_use]
    pub fn is_incapacitated(&self) -> bool {
        self.hit_points == 0
    }

    /// Restore hit points to the maximum.
    pub fn heal_full(&mut self) {
        self.hit_points = self.max_hit_points;
    }

    /// Award experience; on level-up the hit-point ceiling rises and current
    /// hit points rise by the same amount.
    pub fn gain_experience(
        &mut self,
        amount: u64,
        player: &PlayerConfig,
        progression: &ProgressionConfig,
    ) -> LevelChange {
        let previous = self.level;
        let previous_max = self.max_hit_points;
        self.experience = self.experience.saturating_add(amount);
        self.recompute_derived(player, progression);
        let gained = self.max_hit_points.saturating_sub(previous_max);
        self.hit_points = (self.hit_points + gained).min(self.max_hit_points);
        LevelChange {
            previous,
            current: self.level,
        }
    }

    // ------------------------------------------------------------------
    // Effects
    // ------------------------------------------------------------------

    /// Decrement every effect once; drop those at or below zero.
    /// Returns the names of effects that ended.
    pub fn tick_effects(&mut self) -> Vec<String> {
        let mut expired = Vec::new();
        self.active_effects.retain_mut(|effect| {
            effect.remaining_encounters = effect.remaining_encounters.saturating_sub(1);
            if effect.remaining_encounters <= 0 {
                expired.push(effect.name.clone());
                false
            } else {
                true
            }
        });
        expired
    }

    // ------------------------------------------------------------------
    // Inventory
    // ------------------------------------------------------------------

    /// Append an item instance.
    ///
    /// # Errors
    /// `SophiaError::InvalidState` when the inventory is full.
    pub fn add_item(&mut self, item: Item, capacity: usize) -> Result<()> {
        if self.inventory.len() >= capacity {
            return Err(SophiaError::InvalidState(format!(
                "inventory is full ({capacity} items)"
            )));
        }
        self.inventory.push(InventoryEntry {
            item,
            equipped: false,
            acquired_at: Utc::now(),
        });
        Ok(())
    }

    /// Position of the first inventory entry with this item id.
    ///
    /// # Errors
    /// `SophiaError::NotFound` if the player does not carry it.
    pub fn inventory_position(&self, item_id: &str) -> Result<usize> {
        self.inventory
            .iter()
            .position(|e| e.item.id == item_id)
            .ok_or_else(|| SophiaError::not_found("inventory item", item_id))
    }

    /// Remove a consumable from the inventory, returning its template.
    ///
    /// # Errors
    /// `NotFound` if not carried; `InvalidState` if the item is equipment.
    pub fn take_consumable(&mut self, item_id: &str) -> Result<Item> {
        let pos = self.inventory_position(item_id)?;
        if self.inventory[pos].item.kind != ItemKind::Consumable {
            return Err(SophiaError::InvalidState(format!(
                "{item_id} is equipment, not a consumable"
            )));
        }
        Ok(self.inventory.remove(pos).item)
    }

    /// Flip the worn state of a piece of equipment. Returns the new state.
    ///
    /// # Errors
    /// `NotFound` if not carried; `InvalidState` if the item is consumable.
    pub fn toggle_equipment(&mut self, item_id: &str) -> Result<bool> {
        let pos = self.inventory_position(item_id)?;
        let entry = &mut self.inventory[pos];
        if entry.item.kind != ItemKind::Equipment {
            return Err(SophiaError::InvalidState(format!(
                "{item_id} is a consumable and cannot be worn"
            )));
        }
        entry.equipped = !entry.equipped;
        Ok(entry.equipped)
    }

    // ------------------------------------------------------------------
    // Fallacy loadout
    // ------------------------------------------------------------------

    /// Put a fallacy into a free loadout slot.
    ///
    /// # Errors
    /// `SophiaError::InvalidState` if already equipped or no slot is free.
    pub fn equip_fallacy(&mut self, fallacy: Fallacy, slots: usize) -> Result<()> {
        if self.equipped_fallacies.iter().any(|f| f.id == fallacy.id) {
            return Err(SophiaError::InvalidState(format!(
                "{} is already equipped",
                fallacy.id
            )));
        }
        if self.equipped_fallacies.len() >= slots {
            return Err(SophiaError::InvalidState(format!(
                "all {slots} fallacy slots are in use"
            )));
        }
        self.equipped_fallacies.push(fallacy);
        Ok(())
    }

    /// Remove a fallacy from the loadout.
    ///
    /// # Errors
    /// `SophiaError::NotFound` if it is not equipped.
    pub fn unequip_fallacy(&mut self, fallacy_id: &str) -> Result<Fallacy> {
        let pos = self
            .equipped_fallacies
            .iter()
            .position(|f| f.id == fallacy_id)
            .ok_or_else(|| SophiaError::not_found("equipped fallacy", fallacy_id))?;
        Ok(self.equipped_fallacies.remove(pos))
    }
}

/// Maximum hit points for a level and body score. Always positive when
/// `base_hit_points` is.
#[must_use]
pub fn max_hit_points_for(level: u32, body: i32, player: &PlayerConfig) -> u32 {
    let body = u32::try_from(body.max(0)).unwrap_or(0);
    player
        .base_hit_points
        .saturating_add(player.hit_points_per_level.saturating_mul(level.saturating_sub(1)))
        .saturating_add(player.hit_points_per_body.saturating_mul(body))
}
