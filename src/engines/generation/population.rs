use super::{
    gene_model::GeneSpace,
    genome::Genome,
    operators::{mutate, select_parent_pair, rank_weighted_selection, uniform_crossover},
};
use crate::config::EvolutionConfig;
use crate::error::Result;
use crate::types::GenomeId;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// One generation's members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Population {
    pub generation: usize,
    pub members: Vec<Genome>,
}

impl Population {
    pub fn size(&self) -> usize {
        self.members.len()
    }

    pub fn is_fully_evaluated(&self) -> bool {
        self.members.iter().all(Genome::is_evaluated)
    }

    /// Sort best-first by scalar fitness, ties broken by id.
    pub fn rank(&mut self) {
        self.members.sort_by(compare_rank);
    }

    pub fn best(&self) -> Option<&Genome> {
        self.members
            .iter()
            .filter(|g| g.is_evaluated())
            .min_by(|a, b| compare_rank(a, b))
    }

    pub fn get(&self, id: GenomeId) -> Option<&Genome> {
        self.members.iter().find(|g| g.id == id)
    }

    /// Scalar fitness of members whose evaluation succeeded.
    pub fn healthy_fitness(&self) -> Vec<f64> {
        self.members
            .iter()
            .filter_map(|g| g.fitness.as_ref())
            .filter(|f| f.failure.is_none())
            .map(|f| f.scalar_fitness)
            .collect()
    }

    /// Population variance of healthy fitness values. `None` with fewer than
    /// two healthy members.
    pub fn fitness_variance(&self) -> Option<f64> {
        let values = self.healthy_fitness();
        if values.len() < 2 {
            return None;
        }
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        Some(values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64)
    }
}

fn compare_rank(a: &Genome, b: &Genome) -> Ordering {
    b.scalar_fitness()
        .partial_cmp(&a.scalar_fitness())
        .unwrap_or(Ordering::Equal)
        .then(a.id.cmp(&b.id))
}

/// Owns the current population, allocates genome ids and records lineage.
pub struct PopulationManager {
    space: Arc<GeneSpace>,
    config: EvolutionConfig,
    population: Option<Population>,
    next_id: u64,
    parents: HashMap<GenomeId, Vec<GenomeId>>,
}

impl PopulationManager {
    pub fn new(space: Arc<GeneSpace>, config: EvolutionConfig) -> Self {
        Self {
            space,
            config,
            population: None,
            next_id: 0,
            parents: HashMap::new(),
        }
    }

    pub fn population(&self) -> Option<&Population> {
        self.population.as_ref()
    }

    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    fn allocate_id(&mut self) -> GenomeId {
        let id = GenomeId(self.next_id);
        self.next_id += 1;
        id
    }

    fn register(&mut self, genome: &Genome) {
        self.parents
            .entry(genome.id)
            .or_insert_with(|| genome.parent_ids.clone());
    }

    /// Generation 0: the default genome plus `size - 1` random genomes.
    pub fn initialize<R: Rng>(&mut self, rng: &mut R) -> &Population {
        let size = self.config.population_size;
        let mut members = Vec::with_capacity(size);

        let default_id = self.allocate_id();
        members.push(Genome::new(default_id, 0, self.space.defaults(), Vec::new()));
        while members.len() < size {
            let id = self.allocate_id();
            members.push(Genome::new(id, 0, self.space.randomize(rng), Vec::new()));
        }
        for genome in &members {
            self.register(genome);
        }

        log::debug!("Initialized population of {} genomes", members.len());
        self.population.insert(Population {
            generation: 0,
            members,
        })
    }

    /// Replace the current population, e.g. with its evaluated copy or when
    /// resuming from a snapshot.
    pub fn restore(&mut self, population: Population, next_id: u64) {
        for genome in &population.members {
            self.register(genome);
        }
        let max_seen = population.members.iter().map(|g| g.id.0 + 1).max().unwrap_or(0);
        self.next_id = next_id.max(max_seen);
        self.population = Some(population);
    }

    /// Top `elite_count` of an evaluated population, unchanged.
    pub fn select(&self, evaluated: &Population) -> Vec<Genome> {
        let mut ranked = evaluated.clone();
        ranked.rank();
        ranked
            .members
            .into_iter()
            .take(self.config.elite_count())
            .collect()
    }

    /// Fill back up to the configured size from the retained elite. Elites are
    /// carried over as-is, children are new, unevaluated genomes.
    pub fn breed<R: Rng>(
        &mut self,
        retained: Vec<Genome>,
        from_generation: usize,
        rng: &mut R,
    ) -> Result<Population> {
        let size = self.config.population_size;
        let next_generation = from_generation + 1;

        let mut parents = retained.clone();
        parents.sort_by(compare_rank);

        let mut members = retained;
        members.truncate(size);

        while members.len() < size && !parents.is_empty() {
            let (values, parent_ids) = if rng.gen::<f64>() < self.config.crossover_rate {
                let (a, b) = select_parent_pair(parents.len(), rng);
                let values = uniform_crossover(&parents[a].values, &parents[b].values, rng);
                let ids = if a == b {
                    vec![parents[a].id]
                } else {
                    vec![parents[a].id, parents[b].id]
                };
                (values, ids)
            } else {
                let p = &parents[rank_weighted_selection(parents.len(), rng)];
                (p.values.clone(), vec![p.id])
            };

            let mut values = values;
            mutate(
                &mut values,
                &self.space,
                self.config.mutation_rate,
                self.config.mutation_strength,
                rng,
            )?;

            let id = self.allocate_id();
            let child = Genome::new(id, next_generation, values, parent_ids);
            self.register(&child);
            members.push(child);
        }

        let population = Population {
            generation: next_generation,
            members,
        };
        self.population = Some(population.clone());
        Ok(population)
    }

    /// Known ancestors of a genome, nearest first.
    pub fn lineage(&self, id: GenomeId) -> Vec<GenomeId> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut queue: VecDeque<GenomeId> = self
            .parents
            .get(&id)
            .map(|p| p.iter().copied().collect())
            .unwrap_or_default();

        while let Some(ancestor) = queue.pop_front() {
            if !seen.insert(ancestor) {
                continue;
            }
            out.push(ancestor);
            if let Some(grandparents) = self.parents.get(&ancestor) {
                queue.extend(grandparents.iter().copied());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeneSpaceConfig;
    use crate::engines::evaluation::FitnessResult;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn manager(size: usize) -> PopulationManager {
        let space = Arc::new(GeneSpace::from_config(&GeneSpaceConfig::default()).unwrap());
        let config = EvolutionConfig {
            population_size: size,
            ..EvolutionConfig::default()
        };
        PopulationManager::new(space, config)
    }

    fn score(population: &mut Population) {
        for genome in &mut population.members {
            let spread = genome.values["spread_ratio"];
            genome.fitness = Some(FitnessResult::from_scalar(-spread));
        }
    }

    #[test]
    fn test_initialize_includes_default_genome() {
        let mut manager = manager(10);
        let mut rng = StdRng::seed_from_u64(1);
        let population = manager.initialize(&mut rng).clone();
        assert_eq!(population.size(), 10);
        assert_eq!(population.members[0].values["spread_ratio"], 0.18);
        let ids: HashSet<_> = population.members.iter().map(|g| g.id).collect();
        assert_eq!(ids.len(), 10);
    }

    #[test]
    fn test_breed_preserves_size_and_elites() {
        let mut manager = manager(20);
        let mut rng = StdRng::seed_from_u64(2);
        let mut population = manager.initialize(&mut rng).clone();
        score(&mut population);

        let elites = manager.select(&population);
        assert_eq!(elites.len(), 4);
        let next = manager.breed(elites.clone(), 0, &mut rng).unwrap();

        assert_eq!(next.size(), 20);
        assert_eq!(next.generation, 1);
        for elite in &elites {
            assert_eq!(next.get(elite.id), Some(elite));
        }
        assert!(next.members.iter().filter(|g| !g.is_evaluated()).all(|g| !g.parent_ids.is_empty()));
    }

    #[test]
    fn test_lineage_walks_ancestors() {
        let mut manager = manager(6);
        let mut rng = StdRng::seed_from_u64(3);
        let mut population = manager.initialize(&mut rng).clone();
        score(&mut population);
        let elites = manager.select(&population);
        let next = manager.breed(elites, 0, &mut rng).unwrap();

        let child = next.members.iter().find(|g| !g.parent_ids.is_empty()).unwrap();
        let lineage = manager.lineage(child.id);
        assert_eq!(lineage[0], child.parent_ids[0]);
        assert!(manager.lineage(GenomeId(0)).is_empty());
    }

    #[test]
    fn test_restore_keeps_ids_unique() {
        let mut original = manager(4);
        let mut rng = StdRng::seed_from_u64(4);
        let population = original.initialize(&mut rng).clone();

        let mut resumed = manager(4);
        resumed.restore(population, 0);
        assert_eq!(resumed.next_id(), 4);
    }

    #[test]
    fn test_fitness_variance_ignores_failures() {
        let mut manager = manager(4);
        let mut rng = StdRng::seed_from_u64(5);
        let mut population = manager.initialize(&mut rng).clone();
        for genome in &mut population.members {
            genome.fitness = Some(FitnessResult::from_scalar(1.0));
        }
        population.members[3].fitness = Some(FitnessResult::failed(
            crate::engines::evaluation::EvaluationFailure::Timeout { elapsed_ms: 10 },
        ));
        assert_eq!(population.fitness_variance(), Some(0.0));
    }
}
