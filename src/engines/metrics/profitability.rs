use crate::types::Trade;

/// Trade-level profitability figures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfitabilityMetrics {
    pub total_profit: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
}

impl ProfitabilityMetrics {
    /// Win rate is a fraction in `[0, 1]`. Profit factor is capped at
    /// `profit_factor_cap`, which also applies when there are wins and no
    /// losses. No trades means zero for both.
    pub fn calculate(trades: &[Trade], profit_factor_cap: f64) -> Self {
        if trades.is_empty() {
            return Self {
                total_profit: 0.0,
                win_rate: 0.0,
                profit_factor: 0.0,
            };
        }

        let total_profit: f64 = trades.iter().map(|t| t.profit).sum();
        let wins = trades.iter().filter(|t| t.profit > 0.0).count();
        let win_rate = wins as f64 / trades.len() as f64;

        let gross_profit: f64 = trades.iter().filter(|t| t.profit > 0.0).map(|t| t.profit).sum();
        let gross_loss: f64 = trades
            .iter()
            .filter(|t| t.profit <= 0.0)
            .map(|t| t.profit.abs())
            .sum();

        let profit_factor = if gross_loss > 0.0 {
            (gross_profit / gross_loss).min(profit_factor_cap)
        } else if gross_profit > 0.0 {
            profit_factor_cap
        } else {
            0.0
        };

        Self {
            total_profit,
            win_rate,
            profit_factor,
        }
    }
}
