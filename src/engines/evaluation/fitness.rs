use super::simulator::{OptionsBook, SymbolRun};
use crate::{
    config::FitnessConfig,
    data::MarketDataWindow,
    engines::{
        generation::{GeneSpace, Genome, StrategyParams},
        metrics::MetricsEngine,
        risk::ExposureProfile,
    },
    error::{EvoError, Result},
    types::PerformanceMetrics,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Scalar fitness given to genomes whose evaluation failed.
pub const WORST_FITNESS: f64 = -1.0e9;

/// Why a genome got the worst-case score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EvaluationFailure {
    InvalidGene(String),
    DataQuality(String),
    Timeout { elapsed_ms: u64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitnessResult {
    pub annualized_return: f64,
    pub max_drawdown: f64,
    pub sharpe_ratio: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub data_quality_penalty: f64,
    pub missing_fraction: f64,
    pub trade_count: usize,
    pub scalar_fitness: f64,
    pub failure: Option<EvaluationFailure>,
}

impl FitnessResult {
    pub fn failed(failure: EvaluationFailure) -> Self {
        Self {
            scalar_fitness: WORST_FITNESS,
            failure: Some(failure),
            ..Self::from_scalar(WORST_FITNESS)
        }
    }

    /// Result carrying only a scalar score, with every metric zeroed.
    pub fn from_scalar(scalar_fitness: f64) -> Self {
        Self {
            annualized_return: 0.0,
            max_drawdown: 0.0,
            sharpe_ratio: 0.0,
            win_rate: 0.0,
            profit_factor: 0.0,
            data_quality_penalty: 0.0,
            missing_fraction: 0.0,
            trade_count: 0,
            scalar_fitness,
            failure: None,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.failure.is_some()
    }

    pub fn metrics(&self) -> PerformanceMetrics {
        PerformanceMetrics {
            annualized_return: self.annualized_return,
            max_drawdown: self.max_drawdown,
            sharpe_ratio: self.sharpe_ratio,
            win_rate: self.win_rate,
            profit_factor: self.profit_factor,
            volatility: 0.0,
            trade_count: self.trade_count,
        }
    }
}

/// Fitness plus the simulated exposure the risk gate reviews.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub fitness: FitnessResult,
    pub exposure: Option<ExposureProfile>,
}

/// Scores genomes by simulating them over a market data window.
///
/// Evaluation is a pure function of the genome values, the window and the
/// configuration, so a population can be evaluated on any number of threads.
pub struct FitnessEvaluator {
    space: Arc<GeneSpace>,
    config: FitnessConfig,
}

impl FitnessEvaluator {
    pub fn new(space: Arc<GeneSpace>, config: FitnessConfig) -> Self {
        Self { space, config }
    }

    pub fn config(&self) -> &FitnessConfig {
        &self.config
    }

    /// Deterministic evaluation without a time budget.
    pub fn evaluate(&self, genome: &Genome, window: &MarketDataWindow) -> FitnessResult {
        self.evaluate_with_budget(genome, window, None).fitness
    }

    /// Evaluate under an optional wall-clock budget. Failures never escape:
    /// they come back as a worst-case result with the cause recorded.
    pub fn evaluate_with_budget(
        &self,
        genome: &Genome,
        window: &MarketDataWindow,
        budget: Option<Duration>,
    ) -> Evaluation {
        let started = Instant::now();
        let deadline = budget.map(|b| (started, started + b));

        match self.simulate(genome, window, deadline) {
            Ok((fitness, exposure)) => Evaluation {
                fitness,
                exposure: Some(exposure),
            },
            Err(e) => {
                log::warn!("Genome {} failed evaluation: {}", genome.id, e);
                let failure = match e {
                    EvoError::InvalidGene(msg) => EvaluationFailure::InvalidGene(msg),
                    EvoError::EvaluationTimeout { elapsed_ms, .. } => EvaluationFailure::Timeout {
                        elapsed_ms: elapsed_ms.min(u64::MAX as u128) as u64,
                    },
                    other => EvaluationFailure::DataQuality(other.to_string()),
                };
                Evaluation {
                    fitness: FitnessResult::failed(failure),
                    exposure: None,
                }
            }
        }
    }

    fn simulate(
        &self,
        genome: &Genome,
        window: &MarketDataWindow,
        deadline: Option<(Instant, Instant)>,
    ) -> Result<(FitnessResult, ExposureProfile)> {
        let params = StrategyParams::from_parameters(&self.space.decode(genome)?)?;
        let sim = &self.config.simulation;

        let n_symbols = window.symbol_count();
        if n_symbols == 0 {
            return Err(EvoError::DataQuality("market data window is empty".to_string()));
        }
        let notional = sim.initial_capital * params.max_position_size / n_symbols as f64;

        let mut runs: Vec<SymbolRun> = Vec::with_capacity(n_symbols);
        for (symbol, bars) in window.series() {
            runs.push(OptionsBook::new(symbol, notional, &params, sim).simulate(bars, deadline)?);
        }

        let total_bars: usize = runs.iter().map(|r| r.total_bars).sum();
        let missing_bars: usize = runs.iter().map(|r| r.missing_bars).sum();
        if total_bars == missing_bars {
            return Err(EvoError::DataQuality(format!(
                "no usable bars among {}",
                total_bars
            )));
        }
        let missing_fraction = missing_bars as f64 / total_bars as f64;

        let mut merged: BTreeMap<i64, f64> = BTreeMap::new();
        for run in &runs {
            for &(ts, pnl) in &run.pnl {
                *merged.entry(ts).or_insert(0.0) += pnl;
            }
        }
        let pnl: Vec<f64> = merged.into_values().collect();
        let trades: Vec<_> = runs.iter().flat_map(|r| r.trades.iter().cloned()).collect();

        let engine = MetricsEngine::new(sim);
        let metrics = engine.calculate_all(&pnl, &trades, notional * n_symbols as f64);

        let w = &self.config.weights;
        let data_quality_penalty = missing_fraction * w.data_quality;
        let scalar_fitness = w.annualized_return * metrics.annualized_return
            + w.max_drawdown * metrics.max_drawdown
            + w.sharpe_ratio * metrics.sharpe_ratio
            + w.win_rate * metrics.win_rate
            + w.profit_factor * metrics.profit_factor
            - data_quality_penalty;
        if !scalar_fitness.is_finite() {
            return Err(EvoError::DataQuality(format!(
                "non-finite fitness from metrics {:?}",
                metrics
            )));
        }

        let exposure = self.exposure_profile(&engine.equity_curve(&pnl), &pnl, &runs, &metrics);

        Ok((
            FitnessResult {
                annualized_return: metrics.annualized_return,
                max_drawdown: metrics.max_drawdown,
                sharpe_ratio: metrics.sharpe_ratio,
                win_rate: metrics.win_rate,
                profit_factor: metrics.profit_factor,
                data_quality_penalty,
                missing_fraction,
                trade_count: metrics.trade_count,
                scalar_fitness,
                failure: None,
            },
            exposure,
        ))
    }

    /// Worst-case exposure over the simulated run, in fractions of equity.
    fn exposure_profile(
        &self,
        equity: &[f64],
        pnl: &[f64],
        runs: &[SymbolRun],
        metrics: &PerformanceMetrics,
    ) -> ExposureProfile {
        let min_equity = equity
            .iter()
            .copied()
            .fold(f64::INFINITY, f64::min)
            .max(f64::EPSILON);

        let symbol_fractions: BTreeMap<String, f64> = runs
            .iter()
            .map(|r| (r.symbol.clone(), r.notional / min_equity))
            .collect();

        let bars_per_day = self.config.simulation.bars_per_day.max(1);
        let worst_daily_loss = pnl
            .chunks(bars_per_day)
            .enumerate()
            .map(|(day, chunk)| {
                let start = equity[day * bars_per_day];
                let loss = -chunk.iter().sum::<f64>();
                if start > 0.0 {
                    (loss / start).max(0.0)
                } else {
                    1.0
                }
            })
            .fold(0.0, f64::max);

        ExposureProfile {
            max_drawdown: metrics.max_drawdown,
            worst_daily_loss,
            largest_position_fraction: symbol_fractions.values().copied().fold(0.0, f64::max),
            gross_exposure: symbol_fractions.values().sum(),
            symbol_fractions,
        }
    }
}
