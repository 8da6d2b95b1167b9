use super::traits::{check_positive, ConfigSection};
use crate::error::EvoError;
use serde::{Deserialize, Serialize};

/// Weights of the documented linear combination producing `scalar_fitness`:
///
/// ```text
/// scalar = w_ret * annualized_return + w_dd * max_drawdown + w_sharpe * sharpe
///        + w_win * win_rate + w_pf * profit_factor - data_quality_penalty
/// data_quality_penalty = w_dq * missing_fraction
/// ```
///
/// Drawdown is a positive fraction, so its weight is normally negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitnessWeights {
    pub annualized_return: f64,
    pub max_drawdown: f64,
    pub sharpe_ratio: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub data_quality: f64,
}

impl Default for FitnessWeights {
    fn default() -> Self {
        Self {
            annualized_return: 1.0,
            max_drawdown: -2.0,
            sharpe_ratio: 0.1,
            win_rate: 0.25,
            profit_factor: 0.05,
            data_quality: 1.0,
        }
    }
}

/// Constants of the options book simulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub initial_capital: f64,
    pub bars_per_year: f64,
    /// Bars making up one trading day, for the daily-loss measure.
    pub bars_per_day: usize,
    /// Annual edge earned on allocated notional at perfect quoting.
    pub base_edge: f64,
    /// Spread ratio at which quoting cost is minimal.
    pub optimal_spread_ratio: f64,
    pub spread_tolerance: f64,
    /// Gamma exposure per unit of notional.
    pub gamma_scale: f64,
    /// Cost of re-hedging per unit of delta notional.
    pub hedge_cost_rate: f64,
    pub profit_factor_cap: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            initial_capital: 100_000.0,
            bars_per_year: 252.0,
            bars_per_day: 1,
            base_edge: 0.12,
            optimal_spread_ratio: 0.22,
            spread_tolerance: 0.12,
            gamma_scale: 10.0,
            hedge_cost_rate: 0.0005,
            profit_factor_cap: 10.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FitnessConfig {
    pub weights: FitnessWeights,
    pub simulation: SimulationConfig,
}

impl ConfigSection for FitnessConfig {
    fn section_name() -> &'static str {
        "fitness"
    }

    fn validate(&self) -> Result<(), EvoError> {
        let w = &self.weights;
        for (name, value) in [
            ("annualized_return", w.annualized_return),
            ("max_drawdown", w.max_drawdown),
            ("sharpe_ratio", w.sharpe_ratio),
            ("win_rate", w.win_rate),
            ("profit_factor", w.profit_factor),
            ("data_quality", w.data_quality),
        ] {
            if !value.is_finite() {
                return Err(EvoError::Configuration(format!(
                    "fitness.weights.{} must be finite",
                    name
                )));
            }
        }
        if w.data_quality < 0.0 {
            return Err(EvoError::Configuration(
                "fitness.weights.data_quality must not be negative".to_string(),
            ));
        }

        let s = &self.simulation;
        check_positive("fitness.simulation", "initial_capital", s.initial_capital)?;
        check_positive("fitness.simulation", "bars_per_year", s.bars_per_year)?;
        check_positive("fitness.simulation", "spread_tolerance", s.spread_tolerance)?;
        check_positive("fitness.simulation", "profit_factor_cap", s.profit_factor_cap)?;
        if s.bars_per_day == 0 {
            return Err(EvoError::Configuration(
                "fitness.simulation.bars_per_day must be at least 1".to_string(),
            ));
        }
        for (name, value) in [
            ("base_edge", s.base_edge),
            ("optimal_spread_ratio", s.optimal_spread_ratio),
            ("gamma_scale", s.gamma_scale),
            ("hedge_cost_rate", s.hedge_cost_rate),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(EvoError::Configuration(format!(
                    "fitness.simulation.{} must be a non-negative number",
                    name
                )));
            }
        }
        Ok(())
    }
}
