use super::traits::{check_positive, check_unit_interval, ConfigSection};
use crate::error::EvoError;
use serde::{Deserialize, Serialize};

/// Hard limits, all expressed as fractions of equity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskLimits {
    pub max_drawdown: f64,
    pub position_limit: f64,
    pub daily_loss_limit: f64,
    /// Total notional over equity. Unset means unlimited.
    #[serde(default)]
    pub max_gross_exposure: Option<f64>,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_drawdown: 0.2,
            position_limit: 0.25,
            daily_loss_limit: 0.05,
            max_gross_exposure: None,
        }
    }
}

/// Weights of the composite score's weighted-sum term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskWeights {
    pub portfolio: f64,
    pub position: f64,
    pub market: f64,
    pub liquidity: f64,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            portfolio: 0.4,
            position: 0.25,
            market: 0.2,
            liquidity: 0.15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    pub limits: RiskLimits,
    pub weights: RiskWeights,
    /// Annualized volatility at which market risk reads 1.0.
    pub volatility_reference: f64,
    /// Book depth (notional) considered fully liquid.
    pub depth_reference: f64,
    pub monitor_interval_ms: u64,
    /// Seconds before a sustained breach may alert again.
    pub rearm_interval_secs: u64,
    pub alert_history_size: usize,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            limits: RiskLimits::default(),
            weights: RiskWeights::default(),
            volatility_reference: 0.3,
            depth_reference: 1_000_000.0,
            monitor_interval_ms: 1_000,
            rearm_interval_secs: 300,
            alert_history_size: 1_000,
        }
    }
}

impl ConfigSection for RiskConfig {
    fn section_name() -> &'static str {
        "risk"
    }

    fn validate(&self) -> Result<(), EvoError> {
        let l = &self.limits;
        check_positive("risk.limits", "max_drawdown", l.max_drawdown)?;
        check_positive("risk.limits", "position_limit", l.position_limit)?;
        check_positive("risk.limits", "daily_loss_limit", l.daily_loss_limit)?;
        check_unit_interval("risk.limits", "max_drawdown", l.max_drawdown)?;
        check_unit_interval("risk.limits", "daily_loss_limit", l.daily_loss_limit)?;
        if let Some(gross) = l.max_gross_exposure {
            check_positive("risk.limits", "max_gross_exposure", gross)?;
        }

        let w = &self.weights;
        for (name, value) in [
            ("portfolio", w.portfolio),
            ("position", w.position),
            ("market", w.market),
            ("liquidity", w.liquidity),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(EvoError::Configuration(format!(
                    "risk.weights.{} must be a non-negative number",
                    name
                )));
            }
        }

        check_positive("risk", "volatility_reference", self.volatility_reference)?;
        check_positive("risk", "depth_reference", self.depth_reference)?;
        if self.monitor_interval_ms == 0 {
            return Err(EvoError::Configuration(
                "risk.monitor_interval_ms must be positive".to_string(),
            ));
        }
        if self.alert_history_size == 0 {
            return Err(EvoError::Configuration(
                "risk.alert_history_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_risk_config_is_valid() {
        assert!(RiskConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_drawdown_above_one() {
        let mut config = RiskConfig::default();
        config.limits.max_drawdown = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_negative_weight() {
        let mut config = RiskConfig::default();
        config.weights.market = -0.1;
        assert!(config.validate().is_err());
    }
}
