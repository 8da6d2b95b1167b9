use crate::engines::evaluation::FitnessResult;
use crate::engines::risk::{ExposureProfile, RiskAssessment};
use crate::types::GenomeId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One candidate parameter set and everything learned about it.
///
/// `values` is keyed by gene name; a `BTreeMap` keeps iteration order stable,
/// which seeded breeding relies on for reproducibility. Once `fitness` is set
/// the genome is never evaluated or mutated again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genome {
    pub id: GenomeId,
    pub generation: usize,
    pub values: BTreeMap<String, f64>,
    /// Empty for seeds, one entry for mutation-only children, two after crossover.
    pub parent_ids: Vec<GenomeId>,
    pub fitness: Option<FitnessResult>,
    pub risk_state: Option<RiskAssessment>,
    /// Simulated exposure, set alongside `fitness`.
    pub exposure: Option<ExposureProfile>,
}

impl Genome {
    pub fn new(
        id: GenomeId,
        generation: usize,
        values: BTreeMap<String, f64>,
        parent_ids: Vec<GenomeId>,
    ) -> Self {
        Self {
            id,
            generation,
            values,
            parent_ids,
            fitness: None,
            risk_state: None,
            exposure: None,
        }
    }

    pub fn is_evaluated(&self) -> bool {
        self.fitness.is_some()
    }

    /// Scalar fitness, or negative infinity before evaluation.
    pub fn scalar_fitness(&self) -> f64 {
        self.fitness
            .as_ref()
            .map(|f| f.scalar_fitness)
            .unwrap_or(f64::NEG_INFINITY)
    }

    pub fn value(&self, gene: &str) -> Option<f64> {
        self.values.get(gene).copied()
    }
}
