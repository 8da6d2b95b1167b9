use crate::data::MarketDataWindow;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Worst-case exposure of a simulated run, as fractions of equity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureProfile {
    pub max_drawdown: f64,
    pub worst_daily_loss: f64,
    pub largest_position_fraction: f64,
    pub gross_exposure: f64,
    pub symbol_fractions: BTreeMap<String, f64>,
}

/// Account state at one instant. Position values are signed notionals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub equity: f64,
    pub peak_equity: f64,
    pub day_start_equity: f64,
    pub positions: BTreeMap<String, f64>,
}

impl PositionSnapshot {
    /// Normalized snapshot (peak equity 1.0) reproducing a simulated profile:
    /// the calculator reads back the same drawdown, daily loss and fractions.
    pub fn from_exposure(profile: &ExposureProfile) -> Self {
        let peak_equity = 1.0;
        let equity = (peak_equity * (1.0 - profile.max_drawdown)).max(f64::EPSILON);
        let day_start_equity = if profile.worst_daily_loss < 1.0 {
            equity / (1.0 - profile.worst_daily_loss)
        } else {
            peak_equity
        };
        let positions = profile
            .symbol_fractions
            .iter()
            .map(|(symbol, fraction)| (symbol.clone(), fraction * equity))
            .collect();

        Self {
            equity,
            peak_equity,
            day_start_equity,
            positions,
        }
    }
}

/// Market conditions for one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SymbolMarket {
    /// Annualized volatility.
    pub volatility: f64,
    /// Spread as a fraction of price.
    pub spread: f64,
    /// Notional available near the touch.
    pub depth: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub symbols: BTreeMap<String, SymbolMarket>,
}

impl MarketSnapshot {
    /// Latest usable bar per symbol. Missing spread reads as zero and missing
    /// depth as an empty book.
    pub fn from_window(window: &MarketDataWindow) -> Self {
        let symbols = window
            .latest_usable()
            .into_iter()
            .map(|(symbol, bar)| {
                let (_, iv) = bar.usable().unwrap_or((0.0, 0.0));
                (
                    symbol.to_string(),
                    SymbolMarket {
                        volatility: iv,
                        spread: bar.spread.filter(|s| s.is_finite()).unwrap_or(0.0),
                        depth: bar.depth.filter(|d| d.is_finite()).unwrap_or(0.0),
                    },
                )
            })
            .collect();
        Self { symbols }
    }
}
