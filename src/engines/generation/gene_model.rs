use super::genome::Genome;
use crate::config::{GeneDefinition, GeneSpaceConfig};
use crate::error::{EvoError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// The fixed, validated parameter space. Built once and shared read-only.
#[derive(Debug, Clone)]
pub struct GeneSpace {
    genes: Vec<GeneDefinition>,
    index: HashMap<String, usize>,
}

impl GeneSpace {
    pub fn from_config(config: &GeneSpaceConfig) -> Result<Self> {
        use crate::config::ConfigSection;
        config.validate()?;

        let index = config
            .genes
            .iter()
            .enumerate()
            .map(|(i, g)| (g.name.clone(), i))
            .collect();
        Ok(Self {
            genes: config.genes.clone(),
            index,
        })
    }

    pub fn genes(&self) -> &[GeneDefinition] {
        &self.genes
    }

    pub fn get(&self, name: &str) -> Option<&GeneDefinition> {
        self.index.get(name).map(|&i| &self.genes[i])
    }

    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }

    fn definition(&self, name: &str) -> Result<&GeneDefinition> {
        self.get(name)
            .ok_or_else(|| EvoError::InvalidGene(format!("unknown gene '{}'", name)))
    }

    /// Bound a raw value into the gene's range. Breeding only.
    pub fn clamp(&self, name: &str, raw: f64) -> Result<f64> {
        let gene = self.definition(name)?;
        if raw.is_nan() {
            return Ok(gene.default);
        }
        Ok(raw.clamp(gene.min, gene.max))
    }

    pub fn defaults(&self) -> BTreeMap<String, f64> {
        self.genes
            .iter()
            .map(|g| (g.name.clone(), g.default))
            .collect()
    }

    /// Uniform draw within each gene's bounds.
    pub fn randomize<R: Rng>(&self, rng: &mut R) -> BTreeMap<String, f64> {
        self.genes
            .iter()
            .map(|g| (g.name.clone(), rng.gen_range(g.min..=g.max)))
            .collect()
    }

    /// Every gene present, nothing extra, every value finite and in bounds.
    pub fn validate(&self, values: &BTreeMap<String, f64>) -> Result<()> {
        for (name, &value) in values {
            let gene = self.definition(name)?;
            if !value.is_finite() {
                return Err(EvoError::InvalidGene(format!(
                    "{} is not finite ({})",
                    name, value
                )));
            }
            if !gene.contains(value) {
                return Err(EvoError::InvalidGene(format!(
                    "{} = {} outside [{}, {}]",
                    name, value, gene.min, gene.max
                )));
            }
        }
        if let Some(missing) = self.genes.iter().find(|g| !values.contains_key(&g.name)) {
            return Err(EvoError::InvalidGene(format!(
                "missing gene '{}'",
                missing.name
            )));
        }
        Ok(())
    }

    /// Validated parameter set for a genome. Never clamps.
    pub fn decode(&self, genome: &Genome) -> Result<ParameterSet> {
        self.validate(&genome.values)?;
        Ok(ParameterSet(genome.values.clone()))
    }
}

/// Decoded parameters handed to execution, keyed by gene name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet(pub BTreeMap<String, f64>);

impl ParameterSet {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    fn require(&self, name: &str) -> Result<f64> {
        self.get(name)
            .ok_or_else(|| EvoError::InvalidGene(format!("missing gene '{}'", name)))
    }
}

/// Typed view of the options strategy parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrategyParams {
    pub spread_ratio: f64,
    pub gamma_threshold: f64,
    pub iv_skew_sensitivity: f64,
    pub theta_decay_rate: f64,
    pub hedge_frequency: usize,
    pub max_position_size: f64,
    pub stop_loss_threshold: f64,
    pub take_profit_threshold: f64,
    pub volatility_lookback: usize,
    pub correlation_threshold: f64,
}

impl StrategyParams {
    pub fn from_parameters(params: &ParameterSet) -> Result<Self> {
        Ok(Self {
            spread_ratio: params.require("spread_ratio")?,
            gamma_threshold: params.require("gamma_threshold")?,
            iv_skew_sensitivity: params.require("iv_skew_sensitivity")?,
            theta_decay_rate: params.require("theta_decay_rate")?,
            hedge_frequency: (params.require("hedge_frequency")?.round() as usize).max(1),
            max_position_size: params.require("max_position_size")?,
            stop_loss_threshold: params.require("stop_loss_threshold")?,
            take_profit_threshold: params.require("take_profit_threshold")?,
            volatility_lookback: (params.require("volatility_lookback")?.round() as usize).max(2),
            correlation_threshold: params.require("correlation_threshold")?,
        })
    }
}
