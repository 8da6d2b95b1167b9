use crate::error::{EvoError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One observation of an underlying and its option surface summary.
///
/// Any field may be absent; the simulator skips bars without a usable price or
/// implied volatility and charges a data-quality penalty for them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketBar {
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub price: Option<f64>,
    pub implied_vol: Option<f64>,
    /// Quoted spread as a fraction of price.
    pub spread: Option<f64>,
    /// Notional resting in the top levels of the book.
    pub depth: Option<f64>,
}

impl MarketBar {
    pub fn new(timestamp: i64, price: f64, implied_vol: f64) -> Self {
        Self {
            timestamp,
            price: Some(price),
            implied_vol: Some(implied_vol),
            spread: None,
            depth: None,
        }
    }

    pub fn missing(timestamp: i64) -> Self {
        Self {
            timestamp,
            price: None,
            implied_vol: None,
            spread: None,
            depth: None,
        }
    }

    /// Price and implied vol if both are present and sane.
    pub fn usable(&self) -> Option<(f64, f64)> {
        match (self.price, self.implied_vol) {
            (Some(p), Some(iv)) if p.is_finite() && p > 0.0 && iv.is_finite() && iv >= 0.0 => {
                Some((p, iv))
            }
            _ => None,
        }
    }
}

/// Market data keyed by symbol, timestamps non-decreasing per symbol.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketDataWindow {
    series: BTreeMap<String, Vec<MarketBar>>,
}

impl MarketDataWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_series(series: BTreeMap<String, Vec<MarketBar>>) -> Result<Self> {
        let mut window = Self::new();
        for (symbol, bars) in series {
            window.insert(symbol, bars)?;
        }
        Ok(window)
    }

    /// Add or replace a symbol's bars. Rejects decreasing timestamps, which
    /// break the market data contract.
    pub fn insert(&mut self, symbol: impl Into<String>, bars: Vec<MarketBar>) -> Result<()> {
        let symbol = symbol.into();
        if let Some(pos) = bars.windows(2).position(|w| w[1].timestamp < w[0].timestamp) {
            return Err(EvoError::DataQuality(format!(
                "{}: timestamp {} at bar {} precedes {}",
                symbol,
                bars[pos + 1].timestamp,
                pos + 1,
                bars[pos].timestamp
            )));
        }
        self.series.insert(symbol, bars);
        Ok(())
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(|s| s.as_str())
    }

    pub fn series(&self) -> impl Iterator<Item = (&str, &[MarketBar])> {
        self.series.iter().map(|(s, b)| (s.as_str(), b.as_slice()))
    }

    pub fn bars(&self, symbol: &str) -> Option<&[MarketBar]> {
        self.series.get(symbol).map(|b| b.as_slice())
    }

    pub fn symbol_count(&self) -> usize {
        self.series.len()
    }

    pub fn total_bars(&self) -> usize {
        self.series.values().map(|b| b.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_bars() == 0
    }

    /// Latest bar per symbol that carries a usable price.
    pub fn latest_usable(&self) -> BTreeMap<&str, &MarketBar> {
        self.series
            .iter()
            .filter_map(|(symbol, bars)| {
                bars.iter()
                    .rev()
                    .find(|b| b.usable().is_some())
                    .map(|b| (symbol.as_str(), b))
            })
            .collect()
    }
}
