use super::snapshot::{MarketSnapshot, PositionSnapshot};
use crate::config::{RiskConfig, RiskLimits};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LimitKind {
    MaxDrawdown,
    PositionLimit,
    DailyLossLimit,
    GrossExposure,
}

impl LimitKind {
    /// Drawdown and daily-loss breaches reject outright.
    pub fn is_critical(&self) -> bool {
        matches!(self, LimitKind::MaxDrawdown | LimitKind::DailyLossLimit)
    }
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LimitKind::MaxDrawdown => "max_drawdown",
            LimitKind::PositionLimit => "position_limit",
            LimitKind::DailyLossLimit => "daily_loss_limit",
            LimitKind::GrossExposure => "max_gross_exposure",
        };
        f.write_str(name)
    }
}

/// Reporting bucket for a utilization (1.0 = at limit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_utilization(utilization: f64) -> Self {
        if utilization <= 0.5 {
            RiskLevel::Low
        } else if utilization <= 1.0 {
            RiskLevel::Medium
        } else if utilization <= 1.5 {
            RiskLevel::High
        } else {
            RiskLevel::Critical
        }
    }
}

/// Raw measurements the sub-scores were derived from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRiskValues {
    pub drawdown: f64,
    pub daily_loss: f64,
    pub largest_position_fraction: f64,
    pub gross_exposure: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub portfolio_risk: f64,
    pub position_risk: f64,
    pub market_risk: f64,
    pub liquidity_risk: f64,
    pub composite_score: f64,
    pub breached_limits: BTreeSet<LimitKind>,
    pub raw: RawRiskValues,
}

impl RiskAssessment {
    pub fn level(&self) -> RiskLevel {
        RiskLevel::from_utilization(self.composite_score)
    }

    pub fn has_critical_breach(&self) -> bool {
        self.breached_limits.iter().any(LimitKind::is_critical)
    }
}

/// Stateless risk scoring against configured limits.
///
/// Every sub-score is a utilization where 1.0 means "at the limit":
///
/// ```text
/// portfolio = max(drawdown / max_drawdown, daily_loss / daily_loss_limit,
///                 gross / max_gross_exposure)
/// position  = largest_position_fraction / position_limit
/// market    = sum(|fraction_i| * vol_i) / volatility_reference
/// liquidity = exposure-weighted 1 - min(1, depth_i / depth_reference) * (1 - spread_i)
/// composite = max(weighted sum of sub-scores, largest breached-limit utilization)
/// ```
pub struct RiskCalculator {
    config: RiskConfig,
}

impl RiskCalculator {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.config.limits
    }

    pub fn assess(&self, position: &PositionSnapshot, market: &MarketSnapshot) -> RiskAssessment {
        let limits = &self.config.limits;
        let equity = position.equity.max(f64::EPSILON);

        let drawdown = if position.peak_equity > 0.0 {
            ((position.peak_equity - position.equity) / position.peak_equity).max(0.0)
        } else {
            0.0
        };
        let daily_loss = if position.day_start_equity > 0.0 {
            ((position.day_start_equity - position.equity) / position.day_start_equity).max(0.0)
        } else {
            0.0
        };

        let fractions: Vec<(&str, f64)> = position
            .positions
            .iter()
            .map(|(symbol, notional)| (symbol.as_str(), notional.abs() / equity))
            .collect();
        let gross_exposure: f64 = fractions.iter().map(|(_, f)| f).sum();
        let largest = fractions.iter().map(|(_, f)| *f).fold(0.0, f64::max);

        let mut utilizations = vec![
            (LimitKind::MaxDrawdown, drawdown / limits.max_drawdown),
            (LimitKind::DailyLossLimit, daily_loss / limits.daily_loss_limit),
            (LimitKind::PositionLimit, largest / limits.position_limit),
        ];
        if let Some(max_gross) = limits.max_gross_exposure {
            utilizations.push((LimitKind::GrossExposure, gross_exposure / max_gross));
        }

        let breached_limits: BTreeSet<LimitKind> = utilizations
            .iter()
            .filter(|(_, u)| *u > 1.0)
            .map(|(kind, _)| *kind)
            .collect();
        let breach_utilization = utilizations
            .iter()
            .filter(|(kind, _)| breached_limits.contains(kind))
            .map(|(_, u)| *u)
            .fold(0.0, f64::max);

        let portfolio_risk = utilizations
            .iter()
            .filter(|(kind, _)| *kind != LimitKind::PositionLimit)
            .map(|(_, u)| *u)
            .fold(0.0, f64::max);
        let position_risk = largest / limits.position_limit;

        let market_risk = fractions
            .iter()
            .map(|(symbol, f)| f * market.symbols.get(*symbol).map(|m| m.volatility).unwrap_or(0.0))
            .sum::<f64>()
            / self.config.volatility_reference;

        let liquidity_risk = if gross_exposure > 0.0 {
            fractions
                .iter()
                .map(|(symbol, f)| {
                    let illiquidity = market
                        .symbols
                        .get(*symbol)
                        .map(|m| {
                            let depth_score = (m.depth / self.config.depth_reference).clamp(0.0, 1.0);
                            1.0 - depth_score * (1.0 - m.spread.clamp(0.0, 1.0))
                        })
                        .unwrap_or(1.0);
                    f * illiquidity
                })
                .sum::<f64>()
                / gross_exposure
        } else {
            0.0
        };

        let w = &self.config.weights;
        let weighted = w.portfolio * portfolio_risk
            + w.position * position_risk
            + w.market * market_risk
            + w.liquidity * liquidity_risk;

        RiskAssessment {
            portfolio_risk,
            position_risk,
            market_risk,
            liquidity_risk,
            composite_score: weighted.max(breach_utilization),
            breached_limits,
            raw: RawRiskValues {
                drawdown,
                daily_loss,
                largest_position_fraction: largest,
                gross_exposure,
            },
        }
    }
}
