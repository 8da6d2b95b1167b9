use crate::{
    config::{AppConfig, EvolutionConfig},
    data::MarketDataWindow,
    engines::{
        evaluation::{Evaluation, FitnessEvaluator},
        generation::{
            gene_model::GeneSpace,
            genome::Genome,
            hall_of_fame::HallOfFame,
            history::{GenerationHistory, GenerationStats},
            population::{Population, PopulationManager},
        },
        risk::{GateStatus, MarketSnapshot, RiskGate, RiskStateView},
    },
    error::{EvoError, Result},
    types::GenomeId,
};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub trait ProgressCallback: Send + Sync {
    fn on_generation_start(&self, generation: usize);
    fn on_generation_complete(&self, generation: usize, best_fitness: f64, hall_of_fame_size: usize);
    /// Called from worker threads as each genome finishes.
    fn on_genome_evaluated(&self, done: usize, total: usize);
}

/// Cooperative cancellation flag shared with whoever may stop the run.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone)]
pub struct GenerationReport {
    /// The generation just evaluated, ranked best-first.
    pub evaluated: Population,
    /// Retained elite plus offspring, not yet evaluated.
    pub next: Population,
    pub stats: GenerationStats,
    pub elite: Vec<GenomeId>,
    pub gate_decisions: Vec<(GenomeId, GateStatus)>,
    pub converged: bool,
}

#[derive(Debug, Clone)]
pub enum GenerationOutcome {
    Completed(GenerationReport),
    /// Evaluation was interrupted; carries the last fully evaluated
    /// population, or the untouched input population if there is none yet.
    Cancelled(Population),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    GenerationLimit,
    Converged,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub generations_completed: usize,
    pub termination: TerminationReason,
    pub best: Option<Genome>,
    pub history: Vec<GenerationStats>,
    pub final_population: Population,
    pub hall_of_fame: Vec<Genome>,
}

/// Drives evolution for one run. Owns its population, RNG and worker pool;
/// nothing here is shared between runs.
pub struct EvolutionScheduler {
    config: EvolutionConfig,
    space: Arc<GeneSpace>,
    evaluator: Arc<FitnessEvaluator>,
    window: Arc<MarketDataWindow>,
    market: MarketSnapshot,
    manager: PopulationManager,
    gate: Arc<dyn RiskGate>,
    risk_view: RiskStateView,
    pool: rayon::ThreadPool,
    rng: StdRng,
    cancel: CancellationToken,
    history: GenerationHistory,
    hall_of_fame: HallOfFame,
    last_evaluated: Option<Population>,
    low_variance_streak: usize,
}

impl EvolutionScheduler {
    pub fn new(
        config: &AppConfig,
        window: Arc<MarketDataWindow>,
        gate: Arc<dyn RiskGate>,
        risk_view: RiskStateView,
    ) -> Result<Self> {
        config.validate()?;
        if window.is_empty() {
            return Err(EvoError::DataQuality("market data window is empty".to_string()));
        }

        let space = Arc::new(GeneSpace::from_config(&config.genes)?);
        let evaluator = Arc::new(FitnessEvaluator::new(Arc::clone(&space), config.fitness.clone()));
        let evolution = config.evolution.clone();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(evolution.worker_threads)
            .thread_name(|i| format!("fitness-{}", i))
            .build()
            .map_err(|e| EvoError::Configuration(format!("Failed to build worker pool: {}", e)))?;

        let rng = match evolution.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            manager: PopulationManager::new(Arc::clone(&space), evolution.clone()),
            hall_of_fame: HallOfFame::new(evolution.hall_of_fame_size),
            market: MarketSnapshot::from_window(&window),
            config: evolution,
            space,
            evaluator,
            window,
            gate,
            risk_view,
            pool,
            rng,
            cancel: CancellationToken::new(),
            history: GenerationHistory::new(),
            last_evaluated: None,
            low_variance_streak: 0,
        })
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn population(&self) -> Option<&Population> {
        self.manager.population()
    }

    pub fn last_evaluated(&self) -> Option<&Population> {
        self.last_evaluated.as_ref()
    }

    pub fn next_genome_id(&self) -> u64 {
        self.manager.next_id()
    }

    pub fn history(&self) -> &GenerationHistory {
        &self.history
    }

    pub fn hall_of_fame(&self) -> &HallOfFame {
        &self.hall_of_fame
    }

    pub fn lineage(&self, id: GenomeId) -> Vec<GenomeId> {
        self.manager.lineage(id)
    }

    pub fn evaluator(&self) -> &FitnessEvaluator {
        &self.evaluator
    }

    /// Resume from a stored population.
    pub fn restore(&mut self, population: Population, next_genome_id: u64) {
        if population.is_fully_evaluated() {
            self.last_evaluated = Some(population.clone());
        }
        self.manager.restore(population, next_genome_id);
    }

    /// Members of the last evaluated generation the risk gate has approved.
    pub fn approved_elite(&self) -> Vec<GenomeId> {
        self.last_evaluated
            .as_ref()
            .map(|p| {
                p.members
                    .iter()
                    .take(self.config.elite_count())
                    .filter(|g| self.risk_view.is_approved(g.id))
                    .map(|g| g.id)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Evaluate, select, gate and breed one generation.
    pub fn run_generation(&mut self, callback: &dyn ProgressCallback) -> Result<GenerationOutcome> {
        let population = match self.manager.population() {
            Some(p) => p.clone(),
            None => self.manager.initialize(&mut self.rng).clone(),
        };
        callback.on_generation_start(population.generation);

        let pending: Vec<usize> = population
            .members
            .iter()
            .enumerate()
            .filter(|(_, g)| !g.is_evaluated())
            .map(|(i, _)| i)
            .collect();
        let total = pending.len();

        let done = AtomicUsize::new(0);
        let budget = Duration::from_millis(self.config.evaluation_timeout_ms);
        let evaluator = &self.evaluator;
        let window = &self.window;
        let cancel = &self.cancel;
        let members = &population.members;

        let results: Vec<Option<Evaluation>> = self.pool.install(|| {
            pending
                .par_iter()
                .map(|&i| {
                    if cancel.is_cancelled() {
                        return None;
                    }
                    let evaluation = evaluator.evaluate_with_budget(&members[i], window, Some(budget));
                    callback.on_genome_evaluated(done.fetch_add(1, Ordering::SeqCst) + 1, total);
                    Some(evaluation)
                })
                .collect()
        });

        if self.cancel.is_cancelled() || results.iter().any(Option::is_none) {
            log::info!(
                "Generation {} cancelled after {}/{} evaluations",
                population.generation,
                done.load(Ordering::SeqCst),
                total
            );
            let fallback = self.last_evaluated.clone().unwrap_or(population);
            return Ok(GenerationOutcome::Cancelled(fallback));
        }

        let mut evaluated = population;
        for (&i, evaluation) in pending.iter().zip(results.into_iter().flatten()) {
            let member = &mut evaluated.members[i];
            member.fitness = Some(evaluation.fitness);
            member.exposure = evaluation.exposure;
        }
        evaluated.rank();

        let stats = GenerationStats::from_population(&evaluated, Utc::now());
        for genome in &evaluated.members {
            self.hall_of_fame.try_add(genome);
        }
        self.history.record(stats.clone());

        let mut elite = self.manager.select(&evaluated);
        let gate_decisions = self.gate_elite(&mut elite);
        for genome in &elite {
            if let Some(member) = evaluated.members.iter_mut().find(|m| m.id == genome.id) {
                member.risk_state = genome.risk_state.clone();
            }
        }
        let elite_ids: Vec<GenomeId> = elite.iter().map(|g| g.id).collect();

        let converged = self.update_convergence(&evaluated);
        self.last_evaluated = Some(evaluated.clone());
        let next = self.manager.breed(elite, evaluated.generation, &mut self.rng)?;

        callback.on_generation_complete(evaluated.generation, stats.best_fitness, self.hall_of_fame.len());

        Ok(GenerationOutcome::Completed(GenerationReport {
            evaluated,
            next,
            stats,
            elite: elite_ids,
            gate_decisions,
            converged,
        }))
    }

    /// Send newly selected elite through the risk gate. Genomes the gate has
    /// already seen are left to the monitor.
    fn gate_elite(&self, elite: &mut [Genome]) -> Vec<(GenomeId, GateStatus)> {
        let mut decisions = Vec::new();
        for genome in elite.iter_mut() {
            let failed = genome.fitness.as_ref().map(|f| f.is_failure()).unwrap_or(true);
            if failed {
                continue;
            }
            if self.risk_view.status(genome.id).is_some() {
                genome.risk_state = self.risk_view.assessment(genome.id);
                continue;
            }

            let params = match self.space.decode(genome) {
                Ok(params) => params,
                Err(e) => {
                    log::warn!("Skipping risk review of {}: {}", genome.id, e);
                    continue;
                }
            };
            match self.gate.review(genome, &params, &self.market, Utc::now()) {
                Ok(decision) => {
                    genome.risk_state = Some(decision.assessment);
                    decisions.push((genome.id, decision.status));
                }
                Err(e) => log::warn!("Risk review of {} failed: {}", genome.id, e),
            }
        }
        decisions
    }

    fn update_convergence(&mut self, evaluated: &Population) -> bool {
        match evaluated.fitness_variance() {
            Some(variance) if variance < self.config.convergence_threshold => {
                self.low_variance_streak += 1;
            }
            _ => self.low_variance_streak = 0,
        }
        self.low_variance_streak >= self.config.convergence_patience
    }

    /// Run until the generation limit, convergence or cancellation.
    pub fn run(&mut self, callback: &dyn ProgressCallback) -> Result<RunSummary> {
        self.run_with_checkpoint(callback, &mut |_| Ok(()))
    }

    /// Like [`run`](Self::run), calling `checkpoint` after every completed
    /// generation with the next population in place.
    pub fn run_with_checkpoint(
        &mut self,
        callback: &dyn ProgressCallback,
        checkpoint: &mut dyn FnMut(&Self) -> Result<()>,
    ) -> Result<RunSummary> {
        let mut completed = 0;
        let mut termination = TerminationReason::GenerationLimit;

        while completed < self.config.num_generations {
            match self.run_generation(callback)? {
                GenerationOutcome::Completed(report) => {
                    completed += 1;
                    checkpoint(&*self)?;
                    if report.converged {
                        log::info!(
                            "Converged at generation {} (variance below {} for {} generations)",
                            report.evaluated.generation,
                            self.config.convergence_threshold,
                            self.config.convergence_patience
                        );
                        termination = TerminationReason::Converged;
                        break;
                    }
                }
                GenerationOutcome::Cancelled(_) => {
                    termination = TerminationReason::Cancelled;
                    break;
                }
            }
        }

        let final_population = match (&self.last_evaluated, self.manager.population()) {
            (Some(evaluated), _) => evaluated.clone(),
            (None, Some(current)) => current.clone(),
            (None, None) => Population {
                generation: 0,
                members: Vec::new(),
            },
        };

        if let Some(last) = self.history.latest() {
            log::info!(
                "Run stopped ({:?}) at generation {}: best {:.4}, mean {:.4}, {} failed",
                termination,
                last.generation,
                last.best_fitness,
                last.mean_fitness,
                last.failed
            );
        }

        Ok(RunSummary {
            generations_completed: completed,
            termination,
            best: self.hall_of_fame.best().map(|e| e.genome.clone()),
            history: self.history.records().to_vec(),
            hall_of_fame: self.hall_of_fame.get_all().iter().map(|e| e.genome.clone()).collect(),
            final_population,
        })
    }
}

