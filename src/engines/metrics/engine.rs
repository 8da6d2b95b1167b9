use crate::config::SimulationConfig;
use crate::engines::metrics::{ProfitabilityMetrics, RiskMetrics};
use crate::types::{PerformanceMetrics, Trade};

/// Combines trade and return-series metrics into [`PerformanceMetrics`].
pub struct MetricsEngine<'a> {
    sim: &'a SimulationConfig,
}

impl<'a> MetricsEngine<'a> {
    pub fn new(sim: &'a SimulationConfig) -> Self {
        Self { sim }
    }

    /// `pnl` is the merged per-bar P&L; returns are measured on
    /// `allocated_capital`, drawdown on account equity.
    pub fn calculate_all(
        &self,
        pnl: &[f64],
        trades: &[Trade],
        allocated_capital: f64,
    ) -> PerformanceMetrics {
        let profit = ProfitabilityMetrics::calculate(trades, self.sim.profit_factor_cap);

        let returns: Vec<f64> = if allocated_capital > 0.0 {
            pnl.iter().map(|p| p / allocated_capital).collect()
        } else {
            vec![0.0; pnl.len()]
        };
        let equity = self.equity_curve(pnl);
        let risk = RiskMetrics::calculate(&returns, &equity, self.sim.bars_per_year);

        let total_pnl: f64 = pnl.iter().sum();
        let annualized_return = if pnl.is_empty() || allocated_capital <= 0.0 {
            0.0
        } else {
            total_pnl / allocated_capital * self.sim.bars_per_year / pnl.len() as f64
        };

        PerformanceMetrics {
            annualized_return,
            max_drawdown: risk.max_drawdown,
            sharpe_ratio: risk.sharpe_ratio,
            win_rate: profit.win_rate,
            profit_factor: profit.profit_factor,
            volatility: risk.volatility,
            trade_count: trades.len(),
        }
    }

    /// Account equity starting at initial capital.
    pub fn equity_curve(&self, pnl: &[f64]) -> Vec<f64> {
        let mut equity = Vec::with_capacity(pnl.len() + 1);
        let mut current = self.sim.initial_capital;
        equity.push(current);
        for p in pnl {
            current += p;
            equity.push(current);
        }
        equity
    }
}
