//! Alignment drift.
//!
//! A player's stance moves only when recent choices pull toward one rival
//! alignment harder than toward the current one, by more than a margin.

use std::collections::HashMap;

use ordered_float::OrderedFloat;

use crate::config::AlignmentConfig;
use crate::ledger::LogEntry;
use crate::types::Alignment;

/// Summed influence per alignment over the last `window` influencing entries.
#[must_use]
pub fn influence_totals(history: &[LogEntry], window: usize) -> HashMap<Alignment, f32> {
    let mut totals = HashMap::new();
    for influence in history
        .iter()
        .rev()
        .filter_map(|e| e.influence)
        .take(window)
    {
        *totals.entry(influence.alignment).or_insert(0.0) += influence.weight;
    }
    totals
}

/// The alignment after considering recent influence.
///
/// Returns `current` unless a single other alignment leads it by more than
/// `config.margin`. A tie for the lead never switches.
#[must_use]
pub fn nudge(history: &[LogEntry], current: Alignment, config: &AlignmentConfig) -> Alignment {
    let totals = influence_totals(history, config.window);
    let own = totals.get(&current).copied().unwrap_or(0.0);

    let mut rivals: Vec<(Alignment, OrderedFloat<f32>)> = totals
        .iter()
        .filter(|(a, _)| **a != current && **a != Alignment::Undecided)
        .map(|(a, w)| (*a, OrderedFloat(*w)))
        .collect();
    rivals.sort_by(|a, b| b.1.cmp(&a.1));

    match rivals.as_slice() {
        [] => current,
        [(leader, lead), rest @ ..] => {
            let tied = rest.first().is_some_and(|(_, w)| w == lead);
            if !tied && lead.0 - own > config.margin {
                *leader
            } else {
                current
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ImpactSource, Influence};
    use chrono::Utc;

    fn vote(alignment: Alignment, weight: f32) -> LogEntry {
        LogEntry {
            timestamp: Utc::now(),
            label: "c".into(),
            impact: 0.0,
            reason: String::new(),
            source: ImpactSource::Choice,
            tags: Vec::new(),
            influence: Some(Influence { alignment, weight }),
            stated_alignment: Alignment::Undecided,
        }
    }

    fn plain() -> LogEntry {
        LogEntry {
            influence: None,
            ..vote(Alignment::Undecided, 0.0)
        }
    }

    #[test]
    fn single_vote_does_not_flip() {
        let cfg = AlignmentConfig::default();
        let h = vec![vote(Alignment::Nihilist, 1.0)];
        assert_eq!(nudge(&h, Alignment::Existentialist, &cfg), Alignment::Existentialist);
    }

    #[test]
    fn sustained_pull_flips() {
        let cfg = AlignmentConfig::default();
        let h = vec![vote(Alignment::Nihilist, 1.0), vote(Alignment::Nihilist, 1.0)];
        assert_eq!(nudge(&h, Alignment::Existentialist, &cfg), Alignment::Nihilist);
    }

    #[test]
    fn exactly_the_margin_does_not_flip() {
        let cfg = AlignmentConfig {
            window: 6,
            margin: 2.0,
        };
        let h = vec![vote(Alignment::Nihilist, 1.0), vote(Alignment::Nihilist, 1.0)];
        assert_eq!(nudge(&h, Alignment::Utilitarian, &cfg), Alignment::Utilitarian);
    }

    #[test]
    fn tied_rivals_never_switch() {
        let cfg = AlignmentConfig::default();
        let h = vec![
            vote(Alignment::Nihilist, 3.0),
            vote(Alignment::Utilitarian, 3.0),
        ];
        assert_eq!(nudge(&h, Alignment::Existentialist, &cfg), Alignment::Existentialist);
    }

    #[test]
    fn window_ignores_uninfluencing_entries() {
        let cfg = AlignmentConfig {
            window: 2,
            margin: 1.5,
        };
        let h = vec![
            vote(Alignment::Nihilist, 5.0),
            vote(Alignment::Existentialist, 1.0),
            plain(),
            vote(Alignment::Existentialist, 1.0),
            plain(),
        ];
        // Only the last two votes count; the old Nihilist push is outside.
        assert_eq!(nudge(&h, Alignment::Nihilist, &cfg), Alignment::Existentialist);
    }

    #[test]
    fn undecided_is_left_by_the_first_clear_lead() {
        let cfg = AlignmentConfig::default();
        let h = vec![vote(Alignment::Utilitarian, 2.0)];
        assert_eq!(nudge(&h, Alignment::Undecided, &cfg), Alignment::Utilitarian);
    }
}
