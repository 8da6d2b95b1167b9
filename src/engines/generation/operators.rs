use super::gene_model::GeneSpace;
use crate::error::Result;
use rand::Rng;
use std::collections::BTreeMap;

/// Linear ranking selection over a slice sorted best-first.
///
/// Rank `i` (0 = best) of `n` gets weight `n - i`, so the best is picked `n`
/// times as often as the worst. Returns an index into the ranked slice.
pub fn rank_weighted_selection<R: Rng>(ranked_len: usize, rng: &mut R) -> usize {
    if ranked_len <= 1 {
        return 0;
    }
    let total = ranked_len * (ranked_len + 1) / 2;
    let mut spin = rng.gen_range(0..total);
    for i in 0..ranked_len {
        let weight = ranked_len - i;
        if spin < weight {
            return i;
        }
        spin -= weight;
    }
    ranked_len - 1
}

/// Pick two parents, distinct whenever the pool allows it.
pub fn select_parent_pair<R: Rng>(ranked_len: usize, rng: &mut R) -> (usize, usize) {
    let first = rank_weighted_selection(ranked_len, rng);
    if ranked_len < 2 {
        return (first, first);
    }
    loop {
        let second = rank_weighted_selection(ranked_len, rng);
        if second != first {
            return (first, second);
        }
    }
}

/// Uniform crossover: each gene comes from either parent with equal odds.
pub fn uniform_crossover<R: Rng>(
    parent1: &BTreeMap<String, f64>,
    parent2: &BTreeMap<String, f64>,
    rng: &mut R,
) -> BTreeMap<String, f64> {
    parent1
        .iter()
        .map(|(name, &v1)| {
            let v2 = parent2.get(name).copied().unwrap_or(v1);
            let value = if rng.gen_bool(0.5) { v1 } else { v2 };
            (name.clone(), value)
        })
        .collect()
}

/// Per-gene bounded mutation: with probability `mutation_rate` shift a gene by
/// `U(-1, 1) * strength * (max - min)`, then clamp to its bounds.
pub fn mutate<R: Rng>(
    values: &mut BTreeMap<String, f64>,
    space: &GeneSpace,
    mutation_rate: f64,
    strength: f64,
    rng: &mut R,
) -> Result<()> {
    for (name, value) in values.iter_mut() {
        if rng.gen::<f64>() < mutation_rate {
            let width = space.get(name).map(|g| g.width()).unwrap_or(0.0);
            let delta = rng.gen_range(-1.0..=1.0) * strength * width;
            *value = space.clamp(name, *value + delta)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeneSpaceConfig;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_rank_weighting_prefers_top() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut counts = [0usize; 4];
        for _ in 0..10_000 {
            counts[rank_weighted_selection(4, &mut rng)] += 1;
        }
        assert!(counts[0] > counts[1]);
        assert!(counts[1] > counts[2]);
        assert!(counts[2] > counts[3]);
        assert!(counts[3] > 0);
    }

    #[test]
    fn test_parent_pair_is_distinct() {
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..200 {
            let (a, b) = select_parent_pair(3, &mut rng);
            assert_ne!(a, b);
        }
        assert_eq!(select_parent_pair(1, &mut rng), (0, 0));
    }

    #[test]
    fn test_uniform_crossover_takes_genes_from_parents() {
        let mut rng = StdRng::seed_from_u64(1);
        let p1: BTreeMap<String, f64> = [("a".to_string(), 1.0), ("b".to_string(), 1.0)].into();
        let p2: BTreeMap<String, f64> = [("a".to_string(), 2.0), ("b".to_string(), 2.0)].into();
        for _ in 0..50 {
            let child = uniform_crossover(&p1, &p2, &mut rng);
            assert_eq!(child.len(), 2);
            assert!(child.values().all(|&v| v == 1.0 || v == 2.0));
        }
    }

    #[test]
    fn test_full_strength_mutation_stays_in_bounds() {
        let space = GeneSpace::from_config(&GeneSpaceConfig::default()).unwrap();
        let mut rng = StdRng::seed_from_u64(9);
        let mut values = space.defaults();
        for _ in 0..200 {
            mutate(&mut values, &space, 1.0, 1.0, &mut rng).unwrap();
            assert!(space.validate(&values).is_ok());
        }
    }
}
