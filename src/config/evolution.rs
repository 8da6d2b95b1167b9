use super::traits::{check_positive, check_unit_interval, ConfigSection};
use crate::error::EvoError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionConfig {
    pub population_size: usize,
    pub num_generations: usize,
    pub mutation_rate: f64,
    /// Largest mutation step as a fraction of the gene's width.
    pub mutation_strength: f64,
    pub crossover_rate: f64,
    pub elitism_fraction: f64,
    /// Fitness variance below which a generation counts towards convergence.
    pub convergence_threshold: f64,
    /// Consecutive converged generations before the run stops.
    pub convergence_patience: usize,
    /// Worker threads for fitness evaluation, 0 = one per core.
    pub worker_threads: usize,
    pub evaluation_timeout_ms: u64,
    pub hall_of_fame_size: usize,
    pub seed: Option<u64>,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            population_size: 50,
            num_generations: 40,
            mutation_rate: 0.15,
            mutation_strength: 0.1,
            crossover_rate: 0.7,
            elitism_fraction: 0.2,
            convergence_threshold: 1e-6,
            convergence_patience: 5,
            worker_threads: 0,
            evaluation_timeout_ms: 5_000,
            hall_of_fame_size: 10,
            seed: None,
        }
    }
}

impl EvolutionConfig {
    /// Number of genomes carried unchanged into the next generation.
    pub fn elite_count(&self) -> usize {
        ((self.population_size as f64 * self.elitism_fraction).floor() as usize)
            .max(1)
            .min(self.population_size)
    }
}

impl ConfigSection for EvolutionConfig {
    fn section_name() -> &'static str {
        "evolution"
    }

    fn validate(&self) -> Result<(), EvoError> {
        if self.population_size < 2 {
            return Err(EvoError::Configuration(
                "Population size must be at least 2".to_string(),
            ));
        }
        check_unit_interval("evolution", "mutation_rate", self.mutation_rate)?;
        check_unit_interval("evolution", "crossover_rate", self.crossover_rate)?;
        check_positive("evolution", "mutation_strength", self.mutation_strength)?;
        check_positive("evolution", "elitism_fraction", self.elitism_fraction)?;
        if self.elitism_fraction > 1.0 {
            return Err(EvoError::Configuration(
                "Elitism fraction must not exceed 1".to_string(),
            ));
        }
        if !self.convergence_threshold.is_finite() || self.convergence_threshold < 0.0 {
            return Err(EvoError::Configuration(
                "Convergence threshold must be a non-negative number".to_string(),
            ));
        }
        if self.convergence_patience == 0 {
            return Err(EvoError::Configuration(
                "Convergence patience must be at least 1".to_string(),
            ));
        }
        if self.evaluation_timeout_ms == 0 {
            return Err(EvoError::Configuration(
                "Evaluation timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elite_count() {
        let mut config = EvolutionConfig::default();
        assert_eq!(config.elite_count(), 10);

        config.population_size = 3;
        config.elitism_fraction = 0.1;
        assert_eq!(config.elite_count(), 1);
    }

    #[test]
    fn test_rejects_non_positive_population() {
        let config = EvolutionConfig {
            population_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_rates() {
        let config = EvolutionConfig {
            mutation_rate: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = EvolutionConfig {
            elitism_fraction: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
