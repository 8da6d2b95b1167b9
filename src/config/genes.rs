use super::traits::ConfigSection;
use crate::error::EvoError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Gene names the options strategy simulator decodes.
pub const STRATEGY_GENES: [&str; 10] = [
    "spread_ratio",
    "gamma_threshold",
    "iv_skew_sensitivity",
    "theta_decay_rate",
    "hedge_frequency",
    "max_position_size",
    "stop_loss_threshold",
    "take_profit_threshold",
    "volatility_lookback",
    "correlation_threshold",
];

/// A named, bounded numeric strategy parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneDefinition {
    pub name: String,
    pub min: f64,
    pub max: f64,
    pub default: f64,
}

impl GeneDefinition {
    pub fn new(name: &str, min: f64, max: f64, default: f64) -> Self {
        Self {
            name: name.to_string(),
            min,
            max,
            default,
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        value.is_finite() && value >= self.min && value <= self.max
    }

    pub fn width(&self) -> f64 {
        self.max - self.min
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneSpaceConfig {
    pub genes: Vec<GeneDefinition>,
}

impl Default for GeneSpaceConfig {
    fn default() -> Self {
        Self {
            genes: vec![
                GeneDefinition::new("spread_ratio", 0.05, 0.5, 0.18),
                GeneDefinition::new("gamma_threshold", 0.1, 1.0, 0.4),
                GeneDefinition::new("iv_skew_sensitivity", 0.0, 2.0, 0.5),
                GeneDefinition::new("theta_decay_rate", 0.0, 1.0, 0.3),
                GeneDefinition::new("hedge_frequency", 1.0, 48.0, 6.0),
                GeneDefinition::new("max_position_size", 0.05, 0.5, 0.2),
                GeneDefinition::new("stop_loss_threshold", 0.01, 0.2, 0.05),
                GeneDefinition::new("take_profit_threshold", 0.02, 0.3, 0.1),
                GeneDefinition::new("volatility_lookback", 5.0, 60.0, 20.0),
                GeneDefinition::new("correlation_threshold", 0.1, 0.9, 0.5),
            ],
        }
    }
}

impl GeneSpaceConfig {
    pub fn get(&self, name: &str) -> Option<&GeneDefinition> {
        self.genes.iter().find(|g| g.name == name)
    }
}

impl ConfigSection for GeneSpaceConfig {
    fn section_name() -> &'static str {
        "genes"
    }

    fn validate(&self) -> Result<(), EvoError> {
        if self.genes.is_empty() {
            return Err(EvoError::Configuration(
                "Gene space must define at least one gene".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for gene in &self.genes {
            if !seen.insert(gene.name.as_str()) {
                return Err(EvoError::Configuration(format!(
                    "Duplicate gene definition: {}",
                    gene.name
                )));
            }
            if !gene.min.is_finite() || !gene.max.is_finite() || !gene.default.is_finite() {
                return Err(EvoError::Configuration(format!(
                    "Gene {} has non-finite bounds",
                    gene.name
                )));
            }
            if gene.min >= gene.max {
                return Err(EvoError::Configuration(format!(
                    "Gene {} has degenerate bounds [{}, {}]",
                    gene.name, gene.min, gene.max
                )));
            }
            if !gene.contains(gene.default) {
                return Err(EvoError::Configuration(format!(
                    "Gene {} default {} outside [{}, {}]",
                    gene.name, gene.default, gene.min, gene.max
                )));
            }
        }

        for required in STRATEGY_GENES {
            if self.get(required).is_none() {
                return Err(EvoError::Configuration(format!(
                    "Strategy gene {} is not defined",
                    required
                )));
            }
        }

        // The baseline genome has to be a valid strategy on its own.
        if let (Some(stop), Some(take)) = (
            self.get("stop_loss_threshold"),
            self.get("take_profit_threshold"),
        ) {
            if stop.default >= take.default {
                return Err(EvoError::Configuration(
                    "Default stop_loss_threshold must be below take_profit_threshold".to_string(),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_gene_space_is_valid() {
        let config = GeneSpaceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.get("spread_ratio").map(|g| g.default), Some(0.18));
    }

    #[test]
    fn test_degenerate_bounds_rejected() {
        let mut config = GeneSpaceConfig::default();
        config.genes[0].max = config.genes[0].min;
        assert!(matches!(config.validate(), Err(EvoError::Configuration(_))));
    }

    #[test]
    fn test_default_out_of_bounds_rejected() {
        let mut config = GeneSpaceConfig::default();
        config.genes[1].default = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_strategy_gene_rejected() {
        let mut config = GeneSpaceConfig::default();
        config.genes.retain(|g| g.name != "hedge_frequency");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_gene_rejected() {
        let mut config = GeneSpaceConfig::default();
        let dup = config.genes[0].clone();
        config.genes.push(dup);
        assert!(config.validate().is_err());
    }
}
