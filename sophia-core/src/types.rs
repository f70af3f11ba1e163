//! Core type definitions shared by every SOPHIA component.
//!
//! All types are serializable; field names follow the camelCase JSON
//! contract the browser client already speaks.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identity Types
// ---------------------------------------------------------------------------

/// Opaque, stable identifier of a player record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl PlayerId {
    /// Generate a fresh random player ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PlayerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for PlayerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Philosophy
// ---------------------------------------------------------------------------

/// A player's dominant philosophical stance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Alignment {
    /// The greatest good for the greatest number.
    Utilitarian,
    /// Existence precedes essence; meaning is made, not found.
    Existentialist,
    /// Nothing carries inherent meaning or value.
    Nihilist,
    /// No stance yet.
    Undecided,
}

impl Alignment {
    /// Every alignment, in declaration order.
    pub const ALL: [Self; 4] = [
        Self::Utilitarian,
        Self::Existentialist,
        Self::Nihilist,
        Self::Undecided,
    ];
}

impl fmt::Display for Alignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Utilitarian => "Utilitarian",
            Self::Existentialist => "Existentialist",
            Self::Nihilist => "Nihilist",
            Self::Undecided => "Undecided",
        };
        f.write_str(s)
    }
}

/// Irreversible character traits awarded for behavioural patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PermanentMarker {
    /// Repeatedly acted against the stance they profess.
    Hypocrite,
    /// Repeatedly chose pleasure over principle.
    Hedonist,
    /// Repeatedly accepted arguments they should have seen through.
    Sophist,
    /// Paid heavily, again and again, for others.
    Martyr,
}

// ---------------------------------------------------------------------------
// Attributes
// ---------------------------------------------------------------------------

/// Lowest value a trinity attribute can take.
pub const ATTRIBUTE_MIN: i32 = 0;
/// Highest value a trinity attribute can take.
pub const ATTRIBUTE_MAX: i32 = 20;

/// One of the three trinity attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Attribute {
    /// Physical resilience; raises maximum hit points.
    Body,
    /// Reasoning; sharpens fallacy strikes.
    Mind,
    /// Conviction; softens the blows of bad arguments.
    Heart,
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Body => "body",
            Self::Mind => "mind",
            Self::Heart => "heart",
        };
        f.write_str(s)
    }
}

/// The body/mind/heart trinity, each clamped to `[0, 20]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attributes {
    /// Physical resilience.
    pub body: i32,
    /// Reasoning.
    pub mind: i32,
    /// Conviction.
    pub heart: i32,
}

impl Attributes {
    /// Create a new trinity, clamping each value.
    #[must_use]
    pub fn new(body: i32, mind: i32, heart: i32) -> Self {
        Self {
            body: body.clamp(ATTRIBUTE_MIN, ATTRIBUTE_MAX),
            mind: mind.clamp(ATTRIBUTE_MIN, ATTRIBUTE_MAX),
            heart: heart.clamp(ATTRIBUTE_MIN, ATTRIBUTE_MAX),
        }
    }

    /// Read one attribute.
    #[must_use]
    pub fn get(&self, attribute: Attribute) -> i32 {
        match attribute {
            Attribute::Body => self.body,
            Attribute::Mind => self.mind,
            Attribute::Heart => self.heart,
        }
    }

    /// Apply modifiers, re-clamping the result.
    #[must_use]
    pub fn apply(&self, modifiers: &AttributeModifiers) -> Self {
        Self::new(
            self.body.saturating_add(modifiers.body),
            self.mind.saturating_add(modifiers.mind),
            self.heart.saturating_add(modifiers.heart),
        )
    }
}

impl Default for Attributes {
    fn default() -> Self {
        Self::new(5, 5, 5)
    }
}

/// Signed deltas to the trinity, carried by items and effects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeModifiers {
    /// Body delta.
    #[serde(default)]
    pub body: i32,
    /// Mind delta.
    #[serde(default)]
    pub mind: i32,
    /// Heart delta.
    #[serde(default)]
    pub heart: i32,
}

impl AttributeModifiers {
    /// Sum two sets of modifiers.
    #[must_use]
    pub fn combine(&self, other: &Self) -> Self {
        Self {
            body: self.body.saturating_add(other.body),
            mind: self.mind.saturating_add(other.mind),
            heart: self.heart.saturating_add(other.heart),
        }
    }

    /// Whether every delta is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.body == 0 && self.mind == 0 && self.heart == 0
    }
}

/// Minimum attribute value a choice demands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeRequirement {
    /// Which attribute is checked.
    pub attribute: Attribute,
    /// Inclusive minimum (effective value, after items and effects).
    pub minimum: i32,
}

// ---------------------------------------------------------------------------
// Fallacies
// ---------------------------------------------------------------------------

/// Named flawed-reasoning patterns: enemy weaknesses and player weapons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FallacyType {
    /// Attacking the arguer instead of the argument.
    AdHominem,
    /// Refuting a distorted version of the claim.
    StrawMan,
    /// Presenting two options as the only ones.
    FalseDilemma,
    /// Asserting an unsupported chain of consequences.
    SlipperySlope,
    /// Treating an authority's word as proof.
    AppealToAuthority,
    /// Assuming the conclusion in a premise.
    CircularReasoning,
    /// Generalising from too few cases.
    HastyGeneralization,
    /// "If P then Q; Q; therefore P."
    AffirmingTheConsequent,
    /// "If P then Q; not P; therefore not Q."
    DenyingTheAntecedent,
    /// The middle term is never distributed.
    UndistributedMiddle,
}

// ---------------------------------------------------------------------------
// Ledger provenance
// ---------------------------------------------------------------------------

/// What produced a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImpactSource {
    /// A narrative choice.
    Choice,
    /// A combat turn.
    Combat,
    /// A consumed item.
    Item,
}

/// A weighted vote toward an alignment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Influence {
    /// The alignment being pushed toward.
    pub alignment: Alignment,
    /// How hard (non-negative).
    pub weight: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes_clamp_on_creation() {
        let a = Attributes::new(-3, 25, 7);
        assert_eq!(a, Attributes { body: 0, mind: 20, heart: 7 });
    }

    #[test]
    fn modifiers_reclamp() {
        let a = Attributes::new(18, 1, 5);
        let m = AttributeModifiers { body: 5, mind: -4, heart: 0 };
        assert_eq!(a.apply(&m), Attributes { body: 20, mind: 0, heart: 5 });
    }

    #[test]
    fn player_id_serializes_as_plain_string() {
        let id = PlayerId::from("abc");
        assert_eq!(serde_json::to_string(&id).expect("ser"), "\"abc\"");
    }

    #[test]
    fn alignment_round_trips_by_name() {
        let parsed: Alignment = serde_json::from_str("\"Existentialist\"").expect("de");
        assert_eq!(parsed, Alignment::Existentialist);
    }
}
