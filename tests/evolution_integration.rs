use chrono::Utc;
use evoguard::config::AppConfig;
use evoguard::data::{MarketDataWindow, SyntheticMarket};
use evoguard::engines::evaluation::{EvaluationFailure, WORST_FITNESS};
use evoguard::engines::generation::{
    CancellationToken, EvolutionScheduler, GenerationOutcome, GenerationReport, ProgressCallback,
    ProgressMessage, TerminationReason,
};
use evoguard::engines::risk::{GateStatus, MarketSnapshot, PositionSnapshot, RiskController};
use evoguard::execution::{ChannelExecutionSink, ExecutionSignal, NullExecutionSink};
use evoguard::services::{Checkpointer, EvolutionRunner};
use evoguard::storage::{JsonSnapshotStore, SnapshotStore};
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::channel;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Progress callback for tests that can cancel after a number of evaluations.
struct TestProgressCallback {
    cancel_after: Option<(CancellationToken, usize)>,
    evaluated: AtomicUsize,
    completed: AtomicUsize,
}

impl TestProgressCallback {
    fn new() -> Self {
        Self {
            cancel_after: None,
            evaluated: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
        }
    }

    fn cancelling(token: CancellationToken, after: usize) -> Self {
        Self {
            cancel_after: Some((token, after)),
            ..Self::new()
        }
    }
}

impl ProgressCallback for TestProgressCallback {
    fn on_generation_start(&self, _generation: usize) {}

    fn on_generation_complete(&self, _generation: usize, _best_fitness: f64, _hof_size: usize) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    fn on_genome_evaluated(&self, _done: usize, _total: usize) {
        let evaluated = self.evaluated.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((token, after)) = &self.cancel_after {
            if evaluated >= *after {
                token.cancel();
            }
        }
    }
}

fn test_config(population: usize, generations: usize, seed: u64) -> AppConfig {
    let mut config = AppConfig::default();
    config.evolution.population_size = population;
    config.evolution.num_generations = generations;
    config.evolution.seed = Some(seed);
    config.evolution.worker_threads = 2;
    config.evolution.convergence_threshold = 0.0;
    config
}

fn scheduler(config: &AppConfig, window: MarketDataWindow) -> EvolutionScheduler {
    let controller = Arc::new(RiskController::new(
        config.risk.clone(),
        Arc::new(NullExecutionSink),
        None,
    ));
    EvolutionScheduler::new(config, Arc::new(window), controller.clone(), controller.view()).unwrap()
}

fn completed(outcome: GenerationOutcome) -> GenerationReport {
    match outcome {
        GenerationOutcome::Completed(report) => report,
        GenerationOutcome::Cancelled(_) => panic!("generation was cancelled"),
    }
}

#[test]
fn test_flat_market_ranks_best_quote_first() {
    let config = test_config(50, 1, 11);
    let window = SyntheticMarket::flat("SPX", 120, 100.0).unwrap();
    let mut scheduler = scheduler(&config, window);

    let report = completed(scheduler.run_generation(&TestProgressCallback::new()).unwrap());
    let evaluated = &report.evaluated;

    assert_eq!(evaluated.generation, 0);
    assert_eq!(evaluated.size(), 50);
    assert_eq!(evaluated.members.iter().filter(|g| g.parent_ids.is_empty()).count(), 50);
    assert!(evaluated
        .members
        .iter()
        .any(|g| g.value("spread_ratio") == Some(0.18)));

    for genome in &evaluated.members {
        let fitness = genome.fitness.as_ref().unwrap();
        assert!(fitness.failure.is_none());
        assert_eq!(fitness.max_drawdown, 0.0);
    }

    let optimum = config.fitness.simulation.optimal_spread_ratio;
    let distance = |g: &evoguard::engines::generation::Genome| {
        (g.value("spread_ratio").unwrap() - optimum).abs()
    };
    let nearest = evaluated.members.iter().map(distance).fold(f64::INFINITY, f64::min);
    assert!(distance(&evaluated.members[0]) <= nearest + 1e-6);
}

#[test]
fn test_cancel_mid_generation_returns_previous_generation() {
    let mut config = test_config(50, 5, 3);
    config.evolution.worker_threads = 1;
    let window = SyntheticMarket::random_walk("SPX", 150, 100.0, 0.15, 3).unwrap();
    let mut scheduler = scheduler(&config, window);

    let first = completed(scheduler.run_generation(&TestProgressCallback::new()).unwrap());
    let pending_before = scheduler.population().unwrap().clone();
    assert_eq!(pending_before.generation, 1);

    let callback = TestProgressCallback::cancelling(scheduler.cancellation_token(), 30);
    match scheduler.run_generation(&callback).unwrap() {
        GenerationOutcome::Cancelled(population) => {
            assert_eq!(population, first.evaluated);
            assert!(population.is_fully_evaluated());
        }
        GenerationOutcome::Completed(_) => panic!("expected cancellation"),
    }

    assert_eq!(callback.evaluated.load(Ordering::SeqCst), 30);
    assert_eq!(callback.completed.load(Ordering::SeqCst), 0);
    assert_eq!(scheduler.population(), Some(&pending_before));
    assert_eq!(scheduler.history().records().len(), 1);
}

#[test]
fn test_cancel_before_first_generation_returns_input() {
    let config = test_config(20, 3, 5);
    let window = SyntheticMarket::flat("SPX", 60, 100.0).unwrap();
    let mut scheduler = scheduler(&config, window);
    scheduler.cancellation_token().cancel();

    let summary = scheduler.run(&TestProgressCallback::new()).unwrap();
    assert_eq!(summary.termination, TerminationReason::Cancelled);
    assert_eq!(summary.generations_completed, 0);
    assert_eq!(summary.final_population.generation, 0);
    assert!(summary.final_population.members.iter().all(|g| !g.is_evaluated()));
}

#[test]
fn test_population_size_and_elitism_hold_across_generations() {
    let config = test_config(24, 4, 21);
    let elite_count = config.evolution.elite_count();
    let window = SyntheticMarket::random_walk("SPX", 120, 100.0, 0.2, 21).unwrap();
    let mut scheduler = scheduler(&config, window);
    let callback = TestProgressCallback::new();

    for generation in 0..4 {
        let report = completed(scheduler.run_generation(&callback).unwrap());
        assert_eq!(report.evaluated.generation, generation);
        assert_eq!(report.evaluated.size(), 24);
        assert_eq!(report.next.size(), 24);
        assert_eq!(report.elite.len(), elite_count);

        let fitness: Vec<f64> = report.evaluated.members.iter().map(|g| g.scalar_fitness()).collect();
        assert!(fitness.windows(2).all(|w| w[0] >= w[1]));

        for id in &report.elite {
            let before = report.evaluated.get(*id).unwrap();
            let after = report.next.get(*id).unwrap();
            assert_eq!(before.values, after.values);
            assert_eq!(before.fitness, after.fitness);
            assert_eq!(before.generation, after.generation);
        }
        for child in report.next.members.iter().filter(|g| !report.elite.contains(&g.id)) {
            assert_eq!(child.generation, generation + 1);
            assert!(!child.is_evaluated());
            assert!(!child.parent_ids.is_empty());
        }
    }
    assert_eq!(scheduler.history().records().len(), 4);
}

#[test]
fn test_same_seed_same_run() {
    let config = test_config(16, 3, 99);
    let window = SyntheticMarket::random_walk("SPX", 100, 100.0, 0.25, 99).unwrap();

    let a = scheduler(&config, window.clone())
        .run(&TestProgressCallback::new())
        .unwrap();
    let b = scheduler(&config, window).run(&TestProgressCallback::new()).unwrap();

    assert_eq!(a.generations_completed, 3);
    assert_eq!(a.termination, TerminationReason::GenerationLimit);
    assert_eq!(a.final_population, b.final_population);
    assert_eq!(
        a.best.as_ref().map(|g| g.id),
        b.best.as_ref().map(|g| g.id)
    );
}

#[test]
fn test_hall_of_fame_keeps_unique_best() {
    let config = test_config(20, 3, 8);
    let window = SyntheticMarket::random_walk("SPX", 100, 100.0, 0.2, 8).unwrap();
    let mut scheduler = scheduler(&config, window);
    let summary = scheduler.run(&TestProgressCallback::new()).unwrap();

    let hof = &summary.hall_of_fame;
    assert!(!hof.is_empty());
    assert!(hof.len() <= config.evolution.hall_of_fame_size);
    let mut ids: Vec<_> = hof.iter().map(|g| g.id).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), hof.len());

    let best = summary.best.unwrap();
    for entry in &summary.history {
        assert!(best.scalar_fitness() >= entry.best_fitness - 1e-12);
    }
}

fn lenient_config(population: usize, generations: usize, seed: u64) -> AppConfig {
    let mut config = test_config(population, generations, seed);
    config.risk.limits.position_limit = 1.0;
    config.risk.limits.max_drawdown = 0.9;
    config.risk.limits.daily_loss_limit = 0.9;
    config
}

#[test]
fn test_rejected_elite_stays_rejected_after_resume() {
    let config = lenient_config(12, 5, 17);
    let window = Arc::new(SyntheticMarket::random_walk("SPX", 120, 100.0, 0.2, 17).unwrap());
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.json");

    let first_controller = Arc::new(RiskController::new(
        config.risk.clone(),
        Arc::new(NullExecutionSink),
        None,
    ));
    let mut first = EvolutionScheduler::new(
        &config,
        Arc::clone(&window),
        first_controller.clone(),
        first_controller.view(),
    )
    .unwrap();
    let report = completed(first.run_generation(&TestProgressCallback::new()).unwrap());
    let target = report
        .gate_decisions
        .iter()
        .find(|(_, status)| status.is_publishable())
        .map(|(id, _)| *id)
        .expect("an elite passed the gate");

    // Live account collapses after approval.
    let collapsed = PositionSnapshot {
        equity: 5.0,
        peak_equity: 100.0,
        day_start_equity: 100.0,
        positions: [("SPX".to_string(), 0.5)].into(),
    };
    let market = MarketSnapshot::from_window(&window);
    assert_eq!(
        first_controller.reassess(target, &collapsed, &market, Utc::now()),
        Some(GateStatus::Rejected)
    );
    Checkpointer::new(Arc::new(JsonSnapshotStore::new(&path)), first_controller.clone())
        .save(&first)
        .unwrap();

    let (signal_tx, signal_rx) = channel();
    let resumed_controller = Arc::new(RiskController::new(
        config.risk.clone(),
        Arc::new(ChannelExecutionSink::new(signal_tx)),
        None,
    ));
    let mut resumed = EvolutionScheduler::new(
        &config,
        Arc::clone(&window),
        resumed_controller.clone(),
        resumed_controller.view(),
    )
    .unwrap();
    let restored = Checkpointer::new(Arc::new(JsonSnapshotStore::new(&path)), resumed_controller.clone())
        .restore(&mut resumed)
        .unwrap();
    assert_eq!(restored, Some(1));
    assert_eq!(resumed_controller.view().status(target), Some(GateStatus::Rejected));
    assert!(resumed.population().unwrap().get(target).is_some());

    let report = completed(resumed.run_generation(&TestProgressCallback::new()).unwrap());
    assert!(report.gate_decisions.iter().all(|(id, _)| *id != target));
    assert_eq!(resumed_controller.view().status(target), Some(GateStatus::Rejected));
    assert!(!resumed.approved_elite().contains(&target));
    let republished = signal_rx.try_iter().any(|signal| {
        matches!(signal, ExecutionSignal::Parameters { genome_id, .. } if genome_id == target)
    });
    assert!(!republished);
}

#[test]
fn test_low_variance_converges_after_patience() {
    let mut config = test_config(10, 20, 4);
    config.evolution.convergence_threshold = 1e12;
    config.evolution.convergence_patience = 2;
    let window = SyntheticMarket::random_walk("SPX", 80, 100.0, 0.2, 4).unwrap();

    let summary = scheduler(&config, window).run(&TestProgressCallback::new()).unwrap();
    assert_eq!(summary.termination, TerminationReason::Converged);
    assert_eq!(summary.generations_completed, 2);
    assert_eq!(summary.history.len(), 2);
}

#[test]
fn test_timed_out_genomes_score_worst_and_generation_completes() {
    let mut config = test_config(4, 1, 6);
    config.evolution.evaluation_timeout_ms = 1;
    let window = SyntheticMarket::random_walk("SPX", 400_000, 100.0, 0.2, 6).unwrap();
    let mut scheduler = scheduler(&config, window);

    let report = completed(scheduler.run_generation(&TestProgressCallback::new()).unwrap());
    for genome in &report.evaluated.members {
        let fitness = genome.fitness.as_ref().unwrap();
        assert!(matches!(fitness.failure, Some(EvaluationFailure::Timeout { .. })));
        assert_eq!(fitness.scalar_fitness, WORST_FITNESS);
    }
    assert_eq!(report.stats.failed, 4);
    assert!(report.gate_decisions.is_empty());
    assert_eq!(report.next.size(), 4);
    assert_eq!(report.next.generation, 1);
}

#[test]
fn test_runner_reports_progress_and_checkpoints() {
    let config = test_config(10, 3, 12);
    let window = Arc::new(SyntheticMarket::random_walk("SPX", 80, 100.0, 0.2, 12).unwrap());
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonSnapshotStore::new(dir.path().join("run.json")));

    let controller = Arc::new(RiskController::new(
        config.risk.clone(),
        Arc::new(NullExecutionSink),
        None,
    ));
    let scheduler =
        EvolutionScheduler::new(&config, window, controller.clone(), controller.view()).unwrap();
    let checkpointer = Checkpointer::new(store.clone(), controller);

    let mut runner = EvolutionRunner::start(scheduler, Some(checkpointer)).unwrap();
    let mut messages = Vec::new();
    let summary = loop {
        while let Some(message) = runner.poll_progress() {
            messages.push(message);
        }
        if let Some(result) = runner.try_get_results() {
            break result.unwrap();
        }
        thread::sleep(Duration::from_millis(10));
    };
    while let Some(message) = runner.poll_progress() {
        messages.push(message);
    }

    assert_eq!(summary.generations_completed, 3);
    let completions = messages
        .iter()
        .filter(|m| matches!(m, ProgressMessage::GenerationComplete { .. }))
        .count();
    assert_eq!(completions, 3);
    assert!(messages
        .iter()
        .any(|m| matches!(m, ProgressMessage::GenomeEvaluated { done: 10, total: 10 })));

    let snapshot = store.load().unwrap().unwrap();
    assert_eq!(snapshot.generation, 3);
    assert_eq!(snapshot.population.size(), 10);
    let max_id = snapshot.population.members.iter().map(|g| g.id.0).max().unwrap();
    assert!(snapshot.next_genome_id > max_id);
}

#[test]
fn test_runner_cancel_stops_run() {
    let config = test_config(10, 10_000, 13);
    let window = SyntheticMarket::random_walk("SPX", 80, 100.0, 0.2, 13).unwrap();
    let runner = EvolutionRunner::start(scheduler(&config, window), None).unwrap();
    runner.cancel();

    let summary = runner.wait().unwrap();
    assert_eq!(summary.termination, TerminationReason::Cancelled);
    assert!(summary.generations_completed < 10_000);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn prop_bred_genomes_stay_in_bounds(seed in any::<u64>()) {
        let config = test_config(10, 2, seed);
        let window = SyntheticMarket::random_walk("SPX", 40, 100.0, 0.3, seed).unwrap();
        let mut scheduler = scheduler(&config, window);
        let summary = scheduler.run(&TestProgressCallback::new()).unwrap();

        let next = scheduler.population().unwrap();
        for genome in summary.final_population.members.iter().chain(next.members.iter()) {
            for gene in &config.genes.genes {
                let value = genome.value(&gene.name).unwrap();
                prop_assert!(value >= gene.min && value <= gene.max,
                    "{} = {} outside [{}, {}]", gene.name, value, gene.min, gene.max);
            }
        }
    }
}
