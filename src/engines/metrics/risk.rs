const MIN_STD: f64 = 1e-12;

/// Equity-curve and return-series risk figures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskMetrics {
    pub max_drawdown: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
}

impl RiskMetrics {
    /// `returns` are per-bar returns on allocated capital, `equity` the
    /// account equity curve.
    pub fn calculate(returns: &[f64], equity: &[f64], bars_per_year: f64) -> Self {
        // Below this the series is constant up to rounding.
        let std = match Self::std_dev(returns) {
            s if s < MIN_STD => 0.0,
            s => s,
        };
        let mean = if returns.is_empty() {
            0.0
        } else {
            returns.iter().sum::<f64>() / returns.len() as f64
        };

        // Zero-variance series have no meaningful Sharpe.
        let sharpe_ratio = if std == 0.0 {
            0.0
        } else {
            mean / std * bars_per_year.sqrt()
        };

        Self {
            max_drawdown: Self::max_drawdown(equity),
            volatility: std * bars_per_year.sqrt(),
            sharpe_ratio,
        }
    }

    /// Largest peak-to-trough decline as a fraction of the peak.
    pub fn max_drawdown(equity: &[f64]) -> f64 {
        let Some(&first) = equity.first() else {
            return 0.0;
        };
        let mut max_dd = 0.0;
        let mut peak = first;

        for &value in equity {
            if value > peak {
                peak = value;
            }
            if peak > 0.0 {
                let dd = (peak - value) / peak;
                if dd > max_dd {
                    max_dd = dd;
                }
            }
        }

        max_dd
    }

    fn std_dev(values: &[f64]) -> f64 {
        if values.len() < 2 {
            return 0.0;
        }

        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let variance = values.iter().map(|&v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;

        variance.sqrt()
    }
}
