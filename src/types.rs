use serde::{Deserialize, Serialize};
use std::fmt;

/// Sequentially allocated genome identifier, unique within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GenomeId(pub u64);

impl fmt::Display for GenomeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{:06}", self.0)
    }
}

/// Trade record produced by the strategy simulator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub symbol: String,
    pub entry_bar: usize,
    pub exit_bar: usize,
    pub notional: f64,
    pub profit: f64,
    pub exit_reason: ExitReason,
    pub fees: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    RegimeFilter,
    EndOfData,
}

/// Annualized performance numbers computed from a simulated run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub annualized_return: f64,
    pub max_drawdown: f64,
    pub sharpe_ratio: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub volatility: f64,
    pub trade_count: usize,
}
