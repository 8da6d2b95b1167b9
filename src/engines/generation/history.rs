use super::population::Population;
use crate::types::GenomeId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fitness statistics of one evaluated generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationStats {
    pub generation: usize,
    pub best_fitness: f64,
    pub mean_fitness: f64,
    pub std_fitness: f64,
    pub failed: usize,
    pub best_genome: Option<GenomeId>,
    pub recorded_at: DateTime<Utc>,
}

impl GenerationStats {
    pub fn from_population(population: &Population, recorded_at: DateTime<Utc>) -> Self {
        let healthy = population.healthy_fitness();
        let failed = population.size() - healthy.len();

        let (best, mean, std) = if healthy.is_empty() {
            (f64::NEG_INFINITY, f64::NEG_INFINITY, 0.0)
        } else {
            let n = healthy.len() as f64;
            let mean = healthy.iter().sum::<f64>() / n;
            let var = healthy.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            let best = healthy.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            (best, mean, var.sqrt())
        };

        Self {
            generation: population.generation,
            best_fitness: best,
            mean_fitness: mean,
            std_fitness: std,
            failed,
            best_genome: population.best().map(|g| g.id),
            recorded_at,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationHistory {
    records: Vec<GenerationStats>,
}

impl GenerationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, stats: GenerationStats) {
        self.records.push(stats);
    }

    pub fn records(&self) -> &[GenerationStats] {
        &self.records
    }

    pub fn latest(&self) -> Option<&GenerationStats> {
        self.records.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::evaluation::{EvaluationFailure, FitnessResult};
    use crate::engines::generation::Genome;
    use std::collections::BTreeMap;

    fn stats(generation: usize, best: f64) -> GenerationStats {
        GenerationStats {
            generation,
            best_fitness: best,
            mean_fitness: best,
            std_fitness: 0.0,
            failed: 0,
            best_genome: None,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn test_records_in_order() {
        let mut history = GenerationHistory::new();
        history.record(stats(0, 1.0));
        history.record(stats(1, 2.0));
        assert_eq!(history.records().len(), 2);
        assert_eq!(history.latest().map(|s| s.generation), Some(1));
    }

    #[test]
    fn test_stats_skip_failed_members() {
        let mut ok = Genome::new(GenomeId(0), 0, BTreeMap::new(), vec![]);
        ok.fitness = Some(FitnessResult::from_scalar(2.0));
        let mut ok2 = Genome::new(GenomeId(1), 0, BTreeMap::new(), vec![]);
        ok2.fitness = Some(FitnessResult::from_scalar(4.0));
        let mut failed = Genome::new(GenomeId(2), 0, BTreeMap::new(), vec![]);
        failed.fitness = Some(FitnessResult::failed(EvaluationFailure::Timeout { elapsed_ms: 5 }));

        let population = Population {
            generation: 0,
            members: vec![ok, ok2, failed],
        };
        let stats = GenerationStats::from_population(&population, Utc::now());
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.best_fitness, 4.0);
        assert_eq!(stats.mean_fitness, 3.0);
        assert_eq!(stats.std_fitness, 1.0);
    }
}
