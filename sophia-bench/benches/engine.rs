//! SOPHIA Benchmark Suite
//!
//! Targets on a developer laptop:
//!   ledger_replay_1000_entries ........ < 20μs
//!   marker_evaluation_1000_entries .... < 50μs
//!   ledger_record_with_markers ........ < 10μs
//!   scenario_choice_resolution ........ < 50μs
//!   combat_turn ....................... < 100μs

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use sophia_core::combat::FLAWED_REASONING_TAG;
use sophia_core::config::SophiaConfig;
use sophia_core::ledger::{self, AuthenticityLedger, Impact};
use sophia_core::persistence::MemoryStore;
use sophia_core::{
    Alignment, ContentLibrary, GameEngine, ImpactSource, Influence, PlayerId, PlayerState,
};

const ALIGNMENTS: [Alignment; 3] = [
    Alignment::Existentialist,
    Alignment::Utilitarian,
    Alignment::Nihilist,
];

fn make_engine() -> GameEngine {
    let mut config = SophiaConfig::default();
    config.combat.seed = Some(7);
    GameEngine::new(
        &config,
        ContentLibrary::builtin().unwrap(),
        Arc::new(MemoryStore::new()),
    )
    .unwrap()
}

/// A player whose ledger holds `entries` mixed entries.
fn make_player_with_history(entries: usize) -> (PlayerState, AuthenticityLedger) {
    let config = SophiaConfig::default();
    let ledger = AuthenticityLedger::new(config.ledger.marker_rules.clone());
    let mut player = PlayerState::new(
        "Bench",
        Alignment::Existentialist,
        &config.player,
        &config.progression,
        Vec::new(),
    )
    .unwrap();

    for i in 0..entries {
        let amount = if i % 3 == 0 { -2.0 } else { 1.5 };
        let tags = if i % 5 == 0 {
            vec!["sacrifice".to_string()]
        } else {
            Vec::new()
        };
        let impact = Impact::new(amount, format!("choice_{i}"), "bench", ImpactSource::Choice)
            .with_tags(tags)
            .with_influence(Some(Influence {
                alignment: ALIGNMENTS[i % ALIGNMENTS.len()],
                weight: 1.0,
            }));
        ledger.record(&mut player, impact).unwrap();
    }
    (player, ledger)
}

/// Benchmark: Recomputing the value from 1000 entries (target: < 20μs).
fn bench_ledger_replay(c: &mut Criterion) {
    let (player, _) = make_player_with_history(1000);
    c.bench_function("ledger_replay_1000_entries", |b| {
        b.iter(|| {
            let value = ledger::replay_value(black_box(&player.authenticity_metric));
            black_box(value);
        });
    });
}

/// Benchmark: Running the default rule table over 1000 entries (target: < 50μs).
fn bench_marker_evaluation(c: &mut Criterion) {
    let (player, ledger) = make_player_with_history(1000);
    let metric = &player.authenticity_metric;
    c.bench_function("marker_evaluation_1000_entries", |b| {
        b.iter(|| {
            let markers = ledger::evaluate_markers(
                black_box(metric.history()),
                metric.initial_value(),
                ledger.rules(),
            );
            black_box(markers);
        });
    });
}

/// Benchmark: One append on a 200-entry history (target: < 10μs).
fn bench_ledger_record(c: &mut Criterion) {
    let (player, ledger) = make_player_with_history(200);
    c.bench_function("ledger_record_with_markers", |b| {
        b.iter_batched(
            || player.clone(),
            |mut p| {
                let impact = Impact::new(-1.0, "bench_choice", "bench", ImpactSource::Choice)
                    .with_tags([FLAWED_REASONING_TAG.to_string()]);
                let receipt = ledger.record(&mut p, black_box(impact)).unwrap();
                black_box(receipt);
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

/// Benchmark: A full scenario choice through the registry (target: < 50μs).
fn bench_scenario_choice(c: &mut Criterion) {
    let engine = make_engine();
    let player = engine.create_player("Bench", Alignment::Utilitarian).unwrap();
    c.bench_function("scenario_choice_resolution", |b| {
        b.iter(|| {
            let state = engine
                .scenarios()
                .resolve_choice(black_box(&player.id), "the_mirror", "follow_crowd")
                .unwrap();
            black_box(state);
        });
    });
}

/// Benchmark: One judged combat turn, re-engaging as encounters end (target: < 100μs).
fn bench_combat_turn(c: &mut Criterion) {
    let engine = make_engine();
    let player: PlayerId = engine
        .create_player("Bench", Alignment::Existentialist)
        .unwrap()
        .id;
    let enemy = "the_abyss";
    let mut answer = false;

    c.bench_function("combat_turn", |b| {
        b.iter(|| {
            let turn = match engine.combat().current_turn(&player, enemy) {
                Ok(turn) => turn,
                Err(_) => {
                    engine.rest(&player).unwrap();
                    engine.combat().engage(&player, enemy).unwrap()
                }
            };
            answer = !answer;
            let resolution = engine
                .combat()
                .resolve_syllogism(&player, enemy, &turn.syllogism.id, black_box(answer))
                .unwrap();
            black_box(resolution);
        });
    });
}

criterion_group!(
    benches,
    bench_ledger_replay,
    bench_marker_evaluation,
    bench_ledger_record,
    bench_scenario_choice,
    bench_combat_turn,
);
criterion_main!(benches);
