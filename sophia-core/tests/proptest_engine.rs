//! Property-based tests for the SOPHIA rules engine.
//!
//! Value bounds and replay fidelity of the ledger, monotonic permanent
//! markers, alignment stability and termination of combat.

use std::collections::BTreeSet;
use std::sync::Arc;

use proptest::prelude::*;

use sophia_core::alignment;
use sophia_core::config::{AlignmentConfig, PlayerConfig, ProgressionConfig, SophiaConfig};
use sophia_core::content::ContentLibrary;
use sophia_core::game::GameEngine;
use sophia_core::ledger::{replay_value, AuthenticityLedger, Impact};
use sophia_core::persistence::MemoryStore;
use sophia_core::{Alignment, ImpactSource, Influence, PermanentMarker, PlayerState};

// ---------------------------------------------------------------------------
// Strategy helpers
// ---------------------------------------------------------------------------

fn arb_alignment() -> impl Strategy<Value = Alignment> {
    prop_oneof![
        Just(Alignment::Utilitarian),
        Just(Alignment::Existentialist),
        Just(Alignment::Nihilist),
        Just(Alignment::Undecided),
    ]
}

fn arb_tag() -> impl Strategy<Value = Option<String>> {
    prop_oneof![
        Just(None),
        Just(Some("indulgence".to_string())),
        Just(Some("sacrifice".to_string())),
        Just(Some("flawed_reasoning".to_string())),
    ]
}

fn arb_impact() -> impl Strategy<Value = Impact> {
    (
        -80.0..80.0f32,
        arb_tag(),
        proptest::option::of((arb_alignment(), 0.0..3.0f32)),
    )
        .prop_map(|(amount, tag, influence)| {
            Impact::new(amount, "p", "property", ImpactSource::Choice)
                .with_tags(tag)
                .with_influence(influence.map(|(alignment, weight)| Influence { alignment, weight }))
        })
}

fn fresh_player(alignment: Alignment) -> PlayerState {
    PlayerState::new(
        "Prop",
        alignment,
        &PlayerConfig::default(),
        &ProgressionConfig::default(),
        Vec::new(),
    )
    .expect("player")
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn value_stays_within_bounds(impacts in proptest::collection::vec(arb_impact(), 0..60)) {
        let ledger = AuthenticityLedger::new(SophiaConfig::default().ledger.marker_rules);
        let mut p = fresh_player(Alignment::Existentialist);
        for impact in impacts {
            let receipt = ledger.record(&mut p, impact).expect("finite impact");
            prop_assert!((0.0..=100.0).contains(&receipt.value_after));
        }
        let metric = &p.authenticity_metric;
        prop_assert!((replay_value(metric) - metric.value()).abs() < 1e-3);
    }

    #[test]
    fn markers_never_disappear(impacts in proptest::collection::vec(arb_impact(), 1..60)) {
        let ledger = AuthenticityLedger::new(SophiaConfig::default().ledger.marker_rules);
        let mut p = fresh_player(Alignment::Utilitarian);
        let mut seen: BTreeSet<PermanentMarker> = BTreeSet::new();
        for impact in impacts {
            ledger.record(&mut p, impact).expect("record");
            let now = p.authenticity_metric.permanent_markers().clone();
            prop_assert!(seen.is_subset(&now));
            seen = now;
        }
    }

    #[test]
    fn alignment_never_moves_within_the_margin(
        current in arb_alignment(),
        rival in arb_alignment(),
        weight in 0.0..1.5f32,
    ) {
        let ledger = AuthenticityLedger::new(Vec::new());
        let mut p = fresh_player(current);
        ledger
            .record(
                &mut p,
                Impact::new(0.0, "v", "", ImpactSource::Choice)
                    .with_influence(Some(Influence { alignment: rival, weight })),
            )
            .expect("record");
        let next = alignment::nudge(
            p.authenticity_metric.history(),
            current,
            &AlignmentConfig::default(),
        );
        prop_assert_eq!(next, current);
    }
}

// ---------------------------------------------------------------------------
// Combat termination
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn every_encounter_terminates(
        seed in any::<u64>(),
        answers in proptest::collection::vec(any::<bool>(), 200),
        enemy_idx in 0usize..4,
    ) {
        let mut config = SophiaConfig::default();
        config.combat.seed = Some(seed);
        let engine = GameEngine::new(
            &config,
            ContentLibrary::builtin().expect("content"),
            Arc::new(MemoryStore::new()),
        )
        .expect("engine");
        let enemy = engine.content().enemies().nth(enemy_idx).expect("enemy").id.clone();
        let id = engine.create_player("Zeno", Alignment::Undecided).expect("create").id;

        let mut turn = engine.combat().engage(&id, &enemy).expect("engage");
        let mut concluded = false;
        for answer in answers {
            let res = engine
                .combat()
                .resolve_syllogism(&id, &enemy, &turn.syllogism.id, answer)
                .expect("resolve");
            prop_assert!(
                res.combat_outcome.damage_to_enemy >= 1 || res.combat_outcome.damage_to_player >= 1
            );
            match res.next_turn {
                Some(next) => turn = next,
                None => {
                    concluded = true;
                    break;
                }
            }
        }
        prop_assert!(concluded);
        prop_assert!(!engine.combat().has_active_encounter(&id));
    }
}
