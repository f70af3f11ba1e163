//! Authenticity ledger: the append-only record of every choice's moral weight.
//!
//! The metric's `value` is always the clamped left fold of its history from
//! `initial_value`, and permanent markers are a pure function of that
//! history and the configured rule table. Markers are only ever added.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, SophiaError};
use crate::player::PlayerState;
use crate::types::{Alignment, ImpactSource, Influence, PermanentMarker};

/// Lowest authenticity value.
pub const AUTHENTICITY_MIN: f32 = 0.0;
/// Highest authenticity value.
pub const AUTHENTICITY_MAX: f32 = 100.0;

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// One ledger record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// When the entry was appended.
    pub timestamp: DateTime<Utc>,
    /// Short label (usually the choice or syllogism id).
    pub label: String,
    /// Signed change requested (before clamping).
    pub impact: f32,
    /// Human-readable reason.
    pub reason: String,
    /// What produced the entry.
    pub source: ImpactSource,
    /// Tags read by the marker rules.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Alignment vote carried by the entry, if any.
    #[serde(default)]
    pub influence: Option<Influence>,
    /// The player's alignment when the entry was made.
    pub stated_alignment: Alignment,
}

impl LogEntry {
    /// Whether the entry carries `tag`.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Whether the entry votes against the alignment the player held.
    #[must_use]
    pub fn contradicts_stance(&self) -> bool {
        match self.influence {
            Some(i) => {
                i.alignment != Alignment::Undecided
                    && self.stated_alignment != Alignment::Undecided
                    && i.alignment != self.stated_alignment
            }
            None => false,
        }
    }
}

/// A player's authenticity: bounded value, full history, permanent markers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticityMetric {
    value: f32,
    initial_value: f32,
    history: Vec<LogEntry>,
    permanent_markers: BTreeSet<PermanentMarker>,
}

impl AuthenticityMetric {
    /// A fresh metric with an empty history.
    #[must_use]
    pub fn new(initial_value: f32) -> Self {
        let initial_value = clamp_value(initial_value);
        Self {
            value: initial_value,
            initial_value,
            history: Vec::new(),
            permanent_markers: BTreeSet::new(),
        }
    }

    /// Current value in `[0, 100]`.
    #[must_use]
    pub fn value(&self) -> f32 {
        self.value
    }

    /// Value before any history.
    #[must_use]
    pub fn initial_value(&self) -> f32 {
        self.initial_value
    }

    /// Entries in append order.
    #[must_use]
    pub fn history(&self) -> &[LogEntry] {
        &self.history
    }

    /// Markers earned so far.
    #[must_use]
    pub fn permanent_markers(&self) -> &BTreeSet<PermanentMarker> {
        &self.permanent_markers
    }

    /// Whether `marker` has been earned.
    #[must_use]
    pub fn has_marker(&self, marker: PermanentMarker) -> bool {
        self.permanent_markers.contains(&marker)
    }

    fn append(&mut self, entry: LogEntry) {
        self.value = clamp_value(self.value + entry.impact);
        self.history.push(entry);
    }
}

fn clamp_value(v: f32) -> f32 {
    v.clamp(AUTHENTICITY_MIN, AUTHENTICITY_MAX)
}

/// Recompute the value from scratch: the clamped fold of the history.
#[must_use]
pub fn replay_value(metric: &AuthenticityMetric) -> f32 {
    metric
        .history
        .iter()
        .fold(metric.initial_value, |v, e| clamp_value(v + e.impact))
}

// ---------------------------------------------------------------------------
// Marker rules
// ---------------------------------------------------------------------------

/// Predicate over the history that awards a marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MarkerTrigger {
    /// At least `min_count` of the last `window` entries voted against the
    /// stance held at the time.
    Contradiction {
        /// Entries required.
        min_count: usize,
        /// How many recent entries are inspected.
        window: usize,
    },
    /// At least `min_count` entries carry `tag`, optionally within the last
    /// `window` entries.
    TagCount {
        /// Tag to count.
        tag: String,
        /// Entries required.
        min_count: usize,
        /// Recent entries inspected; whole history when unset.
        #[serde(default)]
        window: Option<usize>,
    },
    /// Negative impacts of entries tagged `tag` sum to `-threshold` or less.
    CumulativeLoss {
        /// Tag to sum.
        tag: String,
        /// Positive loss threshold.
        threshold: f32,
    },
    /// The replayed value reached `threshold` or lower at any point.
    ValueFloor {
        /// Floor value.
        threshold: f32,
    },
}

/// A marker and the predicate that awards it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerRule {
    /// Marker awarded.
    pub marker: PermanentMarker,
    /// When it is awarded.
    pub trigger: MarkerTrigger,
}

impl MarkerTrigger {
    /// Evaluate this trigger against a history.
    #[must_use]
    pub fn matches(&self, history: &[LogEntry], initial_value: f32) -> bool {
        match self {
            Self::Contradiction { min_count, window } => {
                *min_count > 0
                    && recent(history, Some(*window))
                        .iter()
                        .filter(|e| e.contradicts_stance())
                        .count()
                        >= *min_count
            }
            Self::TagCount {
                tag,
                min_count,
                window,
            } => {
                *min_count > 0
                    && recent(history, *window)
                        .iter()
                        .filter(|e| e.has_tag(tag))
                        .count()
                        >= *min_count
            }
            Self::CumulativeLoss { tag, threshold } => {
                let loss: f32 = history
                    .iter()
                    .filter(|e| e.has_tag(tag) && e.impact < 0.0)
                    .map(|e| e.impact)
                    .sum();
                loss < 0.0 && loss <= -threshold.abs()
            }
            Self::ValueFloor { threshold } => {
                let mut value = clamp_value(initial_value);
                for e in history {
                    value = clamp_value(value + e.impact);
                    if value <= *threshold {
                        return true;
                    }
                }
                false
            }
        }
    }
}

fn recent(history: &[LogEntry], window: Option<usize>) -> &[LogEntry] {
    match window {
        Some(w) => &history[history.len().saturating_sub(w)..],
        None => history,
    }
}

/// Every marker the rule table awards for `history`.
#[must_use]
pub fn evaluate_markers(
    history: &[LogEntry],
    initial_value: f32,
    rules: &[MarkerRule],
) -> BTreeSet<PermanentMarker> {
    rules
        .iter()
        .filter(|r| r.trigger.matches(history, initial_value))
        .map(|r| r.marker)
        .collect()
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// A pending ledger append.
#[derive(Debug, Clone)]
pub struct Impact {
    /// Signed change.
    pub amount: f32,
    /// Entry label.
    pub label: String,
    /// Entry reason.
    pub reason: String,
    /// What produced it.
    pub source: ImpactSource,
    /// Tags for the marker rules.
    pub tags: Vec<String>,
    /// Alignment vote.
    pub influence: Option<Influence>,
}

impl Impact {
    /// An untagged impact without an alignment vote.
    #[must_use]
    pub fn new(
        amount: f32,
        label: impl Into<String>,
        reason: impl Into<String>,
        source: ImpactSource,
    ) -> Self {
        Self {
            amount,
            label: label.into(),
            reason: reason.into(),
            source,
            tags: Vec::new(),
            influence: None,
        }
    }

    /// Attach tags.
    #[must_use]
    pub fn with_tags(mut self, tags: impl IntoIterator<Item = String>) -> Self {
        self.tags.extend(tags);
        self
    }

    /// Attach an alignment vote.
    #[must_use]
    pub fn with_influence(mut self, influence: Option<Influence>) -> Self {
        self.influence = influence;
        self
    }
}

/// Outcome of one append.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerReceipt {
    /// Value before the append.
    pub value_before: f32,
    /// Value after the append.
    pub value_after: f32,
    /// Markers first earned by this append.
    pub new_markers: Vec<PermanentMarker>,
}

/// Applies impacts and evaluates the marker rule table.
#[derive(Debug, Clone)]
pub struct AuthenticityLedger {
    rules: Vec<MarkerRule>,
}

impl AuthenticityLedger {
    /// Create a ledger with a rule table.
    #[must_use]
    pub fn new(rules: Vec<MarkerRule>) -> Self {
        Self { rules }
    }

    /// The rule table.
    #[must_use]
    pub fn rules(&self) -> &[MarkerRule] {
        &self.rules
    }

    /// Append a plain untagged choice entry and return the updated metric.
    ///
    /// # Errors
    /// `SophiaError::Validation` if `amount` is not finite.
    pub fn apply_impact(
        &self,
        player: &mut PlayerState,
        amount: f32,
        reason: &str,
        label: &str,
    ) -> Result<AuthenticityMetric> {
        self.record(player, Impact::new(amount, label, reason, ImpactSource::Choice))?;
        Ok(player.authenticity_metric.clone())
    }

    /// Append an entry, clamp the value and award any newly matched markers.
    ///
    /// # Errors
    /// `SophiaError::Validation` if the amount or influence weight is not
    /// finite.
    pub fn record(&self, player: &mut PlayerState, impact: Impact) -> Result<LedgerReceipt> {
        if !impact.amount.is_finite() {
            return Err(SophiaError::Validation(format!(
                "impact for {} is not a finite number",
                impact.label
            )));
        }
        if impact
            .influence
            .is_some_and(|i| !i.weight.is_finite() || i.weight < 0.0)
        {
            return Err(SophiaError::Validation(format!(
                "influence weight for {} must be a non-negative number",
                impact.label
            )));
        }

        let stated_alignment = player.philosophical_alignment;
        let metric = &mut player.authenticity_metric;
        let value_before = metric.value;

        metric.append(LogEntry {
            timestamp: Utc::now(),
            label: impact.label,
            impact: impact.amount,
            reason: impact.reason,
            source: impact.source,
            tags: impact.tags,
            influence: impact.influence,
            stated_alignment,
        });

        let earned = evaluate_markers(&metric.history, metric.initial_value, &self.rules);
        let new_markers: Vec<PermanentMarker> = earned
            .into_iter()
            .filter(|m| metric.permanent_markers.insert(*m))
            .collect();

        debug!(
            player = %player.id,
            before = value_before,
            after = metric.value,
            entries = metric.history.len(),
            "Ledger entry recorded"
        );
        for marker in &new_markers {
            info!(player = %player.id, ?marker, "Permanent marker earned");
        }

        Ok(LedgerReceipt {
            value_before,
            value_after: metric.value,
            new_markers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LedgerConfig, PlayerConfig, ProgressionConfig};

    fn player(alignment: Alignment) -> PlayerState {
        PlayerState::new(
            "Kierkegaard",
            alignment,
            &PlayerConfig::default(),
            &ProgressionConfig::default(),
            Vec::new(),
        )
        .expect("player")
    }

    fn ledger() -> AuthenticityLedger {
        AuthenticityLedger::new(LedgerConfig::default().marker_rules)
    }

    fn tagged(amount: f32, tag: &str) -> Impact {
        Impact::new(amount, "t", "test", ImpactSource::Choice).with_tags([tag.to_string()])
    }

    #[test]
    fn value_clamps_at_zero() {
        let mut p = player(Alignment::Undecided);
        let metric = ledger()
            .apply_impact(&mut p, -60.0, "despair", "abyss")
            .expect("apply");
        assert!(metric.value().abs() < f32::EPSILON);
        assert_eq!(metric.history().len(), 1);
        assert!((metric.history()[0].impact + 60.0).abs() < f32::EPSILON);
    }

    #[test]
    fn value_clamps_at_hundred() {
        let mut p = player(Alignment::Undecided);
        ledger().apply_impact(&mut p, 80.0, "", "x").expect("apply");
        assert!((p.authenticity_metric.value() - 100.0).abs() < f32::EPSILON);
    }

    #[test]
    fn non_finite_impact_is_rejected() {
        let mut p = player(Alignment::Undecided);
        let err = ledger()
            .apply_impact(&mut p, f32::NAN, "", "x")
            .expect_err("nan");
        assert!(matches!(err, SophiaError::Validation(_)));
        assert!(p.authenticity_metric.history().is_empty());
    }

    #[test]
    fn replay_matches_running_value() {
        let mut p = player(Alignment::Undecided);
        let l = ledger();
        for amount in [-30.0, -40.0, 25.0, 70.0, -5.0] {
            l.apply_impact(&mut p, amount, "", "x").expect("apply");
        }
        let replayed = replay_value(&p.authenticity_metric);
        assert!((replayed - p.authenticity_metric.value()).abs() < f32::EPSILON);
    }

    #[test]
    fn hedonist_after_three_indulgences() {
        let mut p = player(Alignment::Nihilist);
        let l = ledger();
        l.record(&mut p, tagged(-1.0, "indulgence")).expect("1");
        l.record(&mut p, tagged(-1.0, "indulgence")).expect("2");
        assert!(!p.authenticity_metric.has_marker(PermanentMarker::Hedonist));
        let receipt = l.record(&mut p, tagged(-1.0, "indulgence")).expect("3");
        assert_eq!(receipt.new_markers, vec![PermanentMarker::Hedonist]);
    }

    #[test]
    fn markers_survive_later_history() {
        let mut p = player(Alignment::Nihilist);
        let l = ledger();
        for _ in 0..3 {
            l.record(&mut p, tagged(-1.0, "indulgence")).expect("indulge");
        }
        // Push the indulgences out of the 10-entry window.
        for _ in 0..12 {
            l.record(&mut p, tagged(1.0, "virtue")).expect("virtue");
        }
        assert!(p.authenticity_metric.has_marker(PermanentMarker::Hedonist));
    }

    #[test]
    fn hypocrite_counts_contradicted_stances() {
        let mut p = player(Alignment::Existentialist);
        let l = ledger();
        let vote = Some(Influence {
            alignment: Alignment::Nihilist,
            weight: 1.0,
        });
        for _ in 0..3 {
            l.record(
                &mut p,
                Impact::new(-1.0, "c", "", ImpactSource::Choice).with_influence(vote),
            )
            .expect("record");
        }
        assert!(p.authenticity_metric.has_marker(PermanentMarker::Hypocrite));
    }

    #[test]
    fn undecided_players_cannot_contradict() {
        let mut p = player(Alignment::Undecided);
        let l = ledger();
        let vote = Some(Influence {
            alignment: Alignment::Nihilist,
            weight: 1.0,
        });
        for _ in 0..5 {
            l.record(
                &mut p,
                Impact::new(0.0, "c", "", ImpactSource::Choice).with_influence(vote),
            )
            .expect("record");
        }
        assert!(!p.authenticity_metric.has_marker(PermanentMarker::Hypocrite));
    }

    #[test]
    fn martyr_needs_cumulative_sacrifice() {
        let mut p = player(Alignment::Utilitarian);
        let l = ledger();
        l.record(&mut p, tagged(-20.0, "sacrifice")).expect("1");
        assert!(!p.authenticity_metric.has_marker(PermanentMarker::Martyr));
        l.record(&mut p, tagged(-10.0, "sacrifice")).expect("2");
        assert!(p.authenticity_metric.has_marker(PermanentMarker::Martyr));
    }

    #[test]
    fn value_floor_uses_the_replayed_path() {
        let rules = vec![MarkerRule {
            marker: PermanentMarker::Martyr,
            trigger: MarkerTrigger::ValueFloor { threshold: 10.0 },
        }];
        let l = AuthenticityLedger::new(rules);
        let mut p = player(Alignment::Undecided);
        l.apply_impact(&mut p, -45.0, "", "x").expect("down");
        l.apply_impact(&mut p, 45.0, "", "x").expect("up");
        assert!(p.authenticity_metric.has_marker(PermanentMarker::Martyr));
    }

    #[test]
    fn evaluation_is_pure() {
        let mut p = player(Alignment::Nihilist);
        let l = ledger();
        for _ in 0..4 {
            l.record(&mut p, tagged(-2.0, "indulgence")).expect("record");
        }
        let a = evaluate_markers(p.authenticity_metric.history(), 50.0, l.rules());
        let b = evaluate_markers(p.authenticity_metric.history(), 50.0, l.rules());
        assert_eq!(a, b);
        assert!(a.contains(&PermanentMarker::Hedonist));
    }

    #[test]
    fn metric_serializes_camel_case() {
        let json = serde_json::to_value(AuthenticityMetric::new(50.0)).expect("ser");
        assert_eq!(json["value"], 50.0);
        assert_eq!(json["initialValue"], 50.0);
        assert!(json["history"].as_array().is_some());
        assert!(json["permanentMarkers"].as_array().is_some());
    }
}
