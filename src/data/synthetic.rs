use super::market::{MarketBar, MarketDataWindow};
use crate::error::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const DAY_MS: i64 = 86_400_000;

/// Deterministic market windows for dry runs and tests.
pub struct SyntheticMarket;

impl SyntheticMarket {
    /// Constant price, zero volatility.
    pub fn flat(symbol: &str, bars: usize, price: f64) -> Result<MarketDataWindow> {
        let series = (0..bars)
            .map(|i| MarketBar::new(i as i64 * DAY_MS, price, 0.0))
            .collect();
        let mut window = MarketDataWindow::new();
        window.insert(symbol, series)?;
        Ok(window)
    }

    /// Geometric random walk with constant implied vol, seeded.
    pub fn random_walk(
        symbol: &str,
        bars: usize,
        start_price: f64,
        annual_vol: f64,
        seed: u64,
    ) -> Result<MarketDataWindow> {
        let mut window = MarketDataWindow::new();
        window.insert(
            symbol,
            Self::walk_bars(bars, start_price, annual_vol, seed),
        )?;
        Ok(window)
    }

    pub fn walk_bars(bars: usize, start_price: f64, annual_vol: f64, seed: u64) -> Vec<MarketBar> {
        let mut rng = StdRng::seed_from_u64(seed);
        let step_vol = annual_vol / 252f64.sqrt();
        let mut price = start_price;
        let mut out = Vec::with_capacity(bars);

        for i in 0..bars {
            if i > 0 {
                // Sum of uniforms, close enough to normal for a test market.
                let z: f64 = (0..12).map(|_| rng.gen::<f64>()).sum::<f64>() - 6.0;
                price *= (z * step_vol).exp();
            }
            let mut bar = MarketBar::new(i as i64 * DAY_MS, price, annual_vol);
            bar.spread = Some(0.002);
            bar.depth = Some(2_000_000.0);
            out.push(bar);
        }
        out
    }

    /// Blank out every `every`-th bar's price and vol.
    pub fn with_gaps(window: &MarketDataWindow, every: usize) -> Result<MarketDataWindow> {
        let mut gapped = MarketDataWindow::new();
        for (symbol, bars) in window.series() {
            let bars = bars
                .iter()
                .enumerate()
                .map(|(i, bar)| {
                    if every > 0 && i % every == every - 1 {
                        MarketBar::missing(bar.timestamp)
                    } else {
                        *bar
                    }
                })
                .collect();
            gapped.insert(symbol, bars)?;
        }
        Ok(gapped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_walk_is_reproducible() {
        let a = SyntheticMarket::random_walk("SPX", 50, 100.0, 0.2, 7).unwrap();
        let b = SyntheticMarket::random_walk("SPX", 50, 100.0, 0.2, 7).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_with_gaps_blanks_bars() {
        let flat = SyntheticMarket::flat("SPX", 10, 100.0).unwrap();
        let gapped = SyntheticMarket::with_gaps(&flat, 5).unwrap();
        let missing = gapped
            .bars("SPX")
            .unwrap()
            .iter()
            .filter(|b| b.usable().is_none())
            .count();
        assert_eq!(missing, 2);
    }
}
