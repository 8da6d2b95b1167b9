use super::genome::Genome;
use crate::types::GenomeId;
use std::collections::HashSet;

#[derive(Clone, Debug)]
pub struct EliteGenome {
    pub genome: Genome,
    pub fitness: f64,
    pub signature: String, // For deduplication
}

impl EliteGenome {
    pub fn from_genome(genome: &Genome) -> Self {
        Self {
            fitness: genome.scalar_fitness(),
            signature: parameter_signature(genome),
            genome: genome.clone(),
        }
    }

    pub fn id(&self) -> GenomeId {
        self.genome.id
    }
}

/// Best genomes seen across all generations of a run.
pub struct HallOfFame {
    entries: Vec<EliteGenome>,
    max_size: usize,
    seen_signatures: HashSet<String>,
    seen_ids: HashSet<GenomeId>,
}

impl HallOfFame {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: Vec::new(),
            max_size,
            seen_signatures: HashSet::new(),
            seen_ids: HashSet::new(),
        }
    }

    /// Attempt to add an evaluated genome. Elites carried between generations
    /// and clones with identical parameters are rejected.
    pub fn try_add(&mut self, genome: &Genome) -> bool {
        let Some(fitness) = genome.fitness.as_ref() else {
            return false;
        };
        if fitness.failure.is_some() || self.max_size == 0 {
            return false;
        }

        let elite = EliteGenome::from_genome(genome);
        if self.seen_ids.contains(&elite.id()) || self.seen_signatures.contains(&elite.signature) {
            return false;
        }

        self.seen_ids.insert(elite.id());
        self.seen_signatures.insert(elite.signature.clone());
        self.entries.push(elite);
        self.sort_and_trim();
        true
    }

    fn sort_and_trim(&mut self) {
        self.entries.sort_by(|a, b| {
            b.fitness
                .partial_cmp(&a.fitness)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.id().cmp(&b.id()))
        });

        while self.entries.len() > self.max_size {
            if let Some(removed) = self.entries.pop() {
                self.seen_signatures.remove(&removed.signature);
            }
        }
    }

    pub fn get_all(&self) -> &[EliteGenome] {
        &self.entries
    }

    pub fn get_top_n(&self, n: usize) -> &[EliteGenome] {
        &self.entries[..n.min(self.entries.len())]
    }

    pub fn best(&self) -> Option<&EliteGenome> {
        self.entries.first()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Gene values rounded to 1e-9, as a stable string.
pub fn parameter_signature(genome: &Genome) -> String {
    genome
        .values
        .iter()
        .map(|(name, value)| format!("{}={:.9}", name, value))
        .collect::<Vec<_>>()
        .join(";")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::evaluation::FitnessResult;
    use std::collections::BTreeMap;

    fn genome(id: u64, spread: f64, fitness: f64) -> Genome {
        let values: BTreeMap<String, f64> = [("spread_ratio".to_string(), spread)].into();
        let mut genome = Genome::new(GenomeId(id), 0, values, vec![]);
        genome.fitness = Some(FitnessResult::from_scalar(fitness));
        genome
    }

    #[test]
    fn test_dedup_and_trim() {
        let mut hof = HallOfFame::new(2);
        assert!(hof.try_add(&genome(1, 0.1, 1.0)));
        assert!(!hof.try_add(&genome(1, 0.1, 1.0)));
        assert!(!hof.try_add(&genome(2, 0.1, 5.0)));
        assert!(hof.try_add(&genome(3, 0.2, 3.0)));
        assert!(hof.try_add(&genome(4, 0.3, 2.0)));

        assert_eq!(hof.len(), 2);
        assert_eq!(hof.best().map(|e| e.id()), Some(GenomeId(3)));
        assert_eq!(hof.get_top_n(5).len(), 2);
    }

    #[test]
    fn test_unevaluated_rejected() {
        let mut hof = HallOfFame::new(3);
        let mut g = genome(1, 0.1, 1.0);
        g.fitness = None;
        assert!(!hof.try_add(&g));
        assert!(hof.is_empty());
    }
}
