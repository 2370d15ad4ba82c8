use rand::distributions::{Distribution, WeightedIndex};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SpeciesConfig;
use crate::genome::Genome;
use crate::rng::NeatRng;

/// Identifies a species within a run. Ids increase in order of creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpeciesId(pub u64);

/// A species: genomes of one generation that are close to a common representative.
///
/// Members are indices into the population's genome vector, so every operation that looks at
/// member genomes takes that vector as an argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Species {
    id: SpeciesId,
    /// The representative defines whether another
    /// individual belongs to the species or not.
    representative: Genome,
    members: Vec<usize>,
    /// Generations since the species was formed.
    age: usize,
    /// Best raw fitness any member ever reached.
    best_fitness: Option<f64>,
    generations_without_improvement: usize,
}

impl Species {
    /// Create a new, empty species around `representative`.
    pub fn new(id: SpeciesId, representative: Genome) -> Species {
        Species {
            id,
            representative,
            members: Vec::new(),
            age: 0,
            best_fitness: None,
            generations_without_improvement: 0,
        }
    }

    pub fn id(&self) -> SpeciesId {
        self.id
    }

    pub fn representative(&self) -> &Genome {
        &self.representative
    }

    /// Indices of the member genomes, in ascending order.
    pub fn members(&self) -> &[usize] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn age(&self) -> usize {
        self.age
    }

    pub fn best_fitness(&self) -> Option<f64> {
        self.best_fitness
    }

    pub fn generations_without_improvement(&self) -> usize {
        self.generations_without_improvement
    }

    pub fn add_member(&mut self, index: usize) {
        self.members.push(index);
    }

    pub(crate) fn clear_members(&mut self) {
        self.members.clear();
    }

    pub(crate) fn grow_older(&mut self) {
        self.age += 1;
    }

    fn assert_populated(&self) {
        assert!(!self.members.is_empty(), "species {:?} has no members", self.id);
    }

    fn raw_fitness(genomes: &[Genome], index: usize) -> f64 {
        genomes[index].fitness().unwrap_or(0.)
    }

    /// Explicit fitness sharing: every member's adjusted fitness is its raw fitness divided
    /// by the size of the species. Returns the sum of the adjusted fitness of all members.
    pub fn compute_shared_fitness(&self, genomes: &mut [Genome]) -> f64 {
        self.assert_populated();
        let size = self.members.len() as f64;
        let mut total = 0.;
        for &index in &self.members {
            let adjusted = Self::raw_fitness(genomes, index) / size;
            genomes[index].set_adjusted_fitness(adjusted);
            total += adjusted;
        }
        total
    }

    /// Sum of the members' adjusted fitness as last computed.
    pub fn total_adjusted_fitness(&self, genomes: &[Genome]) -> f64 {
        self.members.iter().map(|&i| genomes[i].adjusted_fitness()).sum()
    }

    /// Work out average raw fitness of this species
    pub fn average_fitness(&self, genomes: &[Genome]) -> f64 {
        if self.members.is_empty() {
            return 0.;
        }
        let total: f64 = self.members.iter().map(|&i| Self::raw_fitness(genomes, i)).sum();
        total / self.members.len() as f64
    }

    /// Members ordered from best to worst raw fitness; ties keep index order.
    pub fn ranked_members(&self, genomes: &[Genome]) -> Vec<usize> {
        let mut ranked = self.members.clone();
        ranked.sort_by(|&a, &b| {
            Self::raw_fitness(genomes, b).total_cmp(&Self::raw_fitness(genomes, a))
        });
        ranked
    }

    /// Get the most performant member
    pub fn champion(&self, genomes: &[Genome]) -> usize {
        self.assert_populated();
        self.ranked_members(genomes)[0]
    }

    /// The best `threshold` fraction of the members, at least one.
    pub fn survivors(&self, genomes: &[Genome], threshold: f64) -> Vec<usize> {
        self.assert_populated();
        let mut ranked = self.ranked_members(genomes);
        let keep = ((ranked.len() as f64 * threshold).ceil() as usize).clamp(1, ranked.len());
        ranked.truncate(keep);
        ranked
    }

    /// Draw a parent from `ranked` (best first) with probability proportional to its rank:
    /// the best of n candidates has weight n, the worst weight 1.
    pub fn select_parent(ranked: &[usize], rng: &mut NeatRng) -> usize {
        let n = ranked.len();
        match WeightedIndex::new((0..n).map(|rank| n - rank)) {
            Ok(dist) => ranked[dist.sample(rng)],
            Err(_) => ranked[0],
        }
    }

    /// Track the best raw fitness of the members; returns whether it improved.
    pub fn update_stagnation(&mut self, genomes: &[Genome]) -> bool {
        self.assert_populated();
        let current = Self::raw_fitness(genomes, self.champion(genomes));
        match self.best_fitness {
            Some(best) if current <= best => {
                self.generations_without_improvement += 1;
                false
            }
            _ => {
                self.best_fitness = Some(current);
                self.generations_without_improvement = 0;
                true
            }
        }
    }

    pub fn is_stagnant(&self, limit: usize) -> bool {
        self.generations_without_improvement >= limit
    }

    /// Choose a new representative of the species at random among its members.
    pub fn select_representative(&mut self, genomes: &[Genome], rng: &mut NeatRng) {
        self.assert_populated();
        let index = self.members[rng.index(self.members.len())];
        self.representative = genomes[index].clone();
    }

    /// Distance of `genome` to the representative.
    pub fn distance(&self, genome: &Genome, config: &SpeciesConfig) -> f64 {
        self.representative.distance(genome, config)
    }
}

/// Place every genome into the first species whose representative lies within
/// `compatibility_threshold` (inclusive), founding a new species otherwise.
///
/// Existing species lose their previous members first; those that attract no genome are
/// dropped. Newly founded species take ids from `next_id`.
pub fn speciate(
    genomes: &[Genome],
    species: &mut Vec<Species>,
    config: &SpeciesConfig,
    next_id: &mut u64,
) {
    for s in species.iter_mut() {
        s.clear_members();
    }
    for (index, genome) in genomes.iter().enumerate() {
        match species
            .iter_mut()
            .find(|s| s.distance(genome, config) <= config.compatibility_threshold)
        {
            Some(s) => s.add_member(index),
            None => {
                let mut founded = Species::new(SpeciesId(*next_id), genome.clone());
                *next_id += 1;
                founded.add_member(index);
                debug!(species = founded.id.0, genome = index, "new species");
                species.push(founded);
            }
        }
    }
    species.retain(|s| {
        if s.is_empty() {
            debug!(species = s.id.0, age = s.age, "species went extinct");
        }
        !s.is_empty()
    });
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::genome::test_support::{genome, with_fitness};

    fn species_of(genomes: &[Genome]) -> Species {
        let mut s = Species::new(SpeciesId(0), genomes[0].clone());
        for i in 0..genomes.len() {
            s.add_member(i);
        }
        s
    }

    fn population(fitness: &[f64]) -> Vec<Genome> {
        fitness.iter().map(|&f| with_fitness(genome(1, 1, &[(0, 0, 1, 1.)]), f)).collect()
    }

    #[test]
    fn species_should_return_correct_average_fitness() {
        let genomes = population(&[10., 15., 20.]);
        assert_relative_eq!(species_of(&genomes).average_fitness(&genomes), 15.);
    }

    #[test]
    fn shared_fitness_divides_by_species_size() {
        let mut genomes = population(&[3., 6., 9.]);
        let s = species_of(&genomes);
        let total = s.compute_shared_fitness(&mut genomes);
        assert_relative_eq!(total, 6.);
        assert_relative_eq!(genomes[0].adjusted_fitness(), 1.);
        assert_relative_eq!(genomes[2].adjusted_fitness(), 3.);
        assert_relative_eq!(s.total_adjusted_fitness(&genomes), 6.);
    }

    #[test]
    fn shared_fitness_per_member_decreases_with_membership() {
        let total_raw = 12.;
        let mut previous = f64::INFINITY;
        for size in 1..8 {
            let mut genomes = population(&vec![total_raw / size as f64; size]);
            let s = species_of(&genomes);
            s.compute_shared_fitness(&mut genomes);
            let per_member = genomes[0].adjusted_fitness();
            assert!(per_member < previous);
            previous = per_member;
        }
    }

    #[test]
    #[should_panic(expected = "has no members")]
    fn shared_fitness_of_empty_species_is_a_bug() {
        let mut genomes = population(&[1.]);
        Species::new(SpeciesId(3), genomes[0].clone()).compute_shared_fitness(&mut genomes);
    }

    #[test]
    fn survivors_keep_the_best_fraction() {
        let genomes = population(&[1., 5., 3., 4., 2.]);
        let s = species_of(&genomes);
        assert_eq!(s.ranked_members(&genomes), vec![1, 3, 2, 4, 0]);
        assert_eq!(s.survivors(&genomes, 0.4), vec![1, 3]);
        assert_eq!(s.survivors(&genomes, 0.01), vec![1]);
        assert_eq!(s.champion(&genomes), 1);
    }

    #[test]
    fn rank_weighted_selection_prefers_the_best() {
        let mut rng = NeatRng::new(1);
        let ranked = [7, 8, 9];
        let mut counts = [0; 3];
        for _ in 0..6000 {
            let picked = Species::select_parent(&ranked, &mut rng);
            counts[picked - 7] += 1;
        }
        assert!(counts[0] > counts[1] && counts[1] > counts[2]);
        assert_eq!(Species::select_parent(&[4], &mut rng), 4);
    }

    #[test]
    fn stagnation_counts_generations_without_improvement() {
        let mut genomes = population(&[1., 2.]);
        let mut s = species_of(&genomes);
        assert!(s.update_stagnation(&genomes));
        assert!(!s.update_stagnation(&genomes));
        assert!(!s.update_stagnation(&genomes));
        assert_eq!(s.generations_without_improvement(), 2);
        assert!(s.is_stagnant(2));
        assert!(!s.is_stagnant(3));
        genomes[0].set_fitness(3.);
        assert!(s.update_stagnation(&genomes));
        assert_eq!(s.best_fitness(), Some(3.));
        assert_eq!(s.generations_without_improvement(), 0);
    }

    #[test]
    fn representative_is_drawn_from_members() {
        let genomes = vec![
            genome(1, 1, &[(0, 0, 1, 1.)]),
            genome(1, 1, &[(0, 0, 1, 2.)]),
        ];
        let mut s = Species::new(SpeciesId(0), genome(1, 1, &[]));
        s.add_member(1);
        s.select_representative(&genomes, &mut NeatRng::new(0));
        assert_eq!(s.representative(), &genomes[1]);
    }

    #[test]
    fn distance_equal_to_threshold_joins_the_species() {
        // one excess gene, no weight difference: distance is exactly 1
        let genomes = vec![
            genome(2, 1, &[(0, 0, 2, 1.)]),
            genome(2, 1, &[(0, 0, 2, 1.), (1, 1, 2, 1.)]),
        ];
        let config = SpeciesConfig { compatibility_threshold: 1.0, ..SpeciesConfig::default() };
        assert_eq!(genomes[0].distance(&genomes[1], &config), 1.0);

        let mut species = Vec::new();
        let mut next_id = 0;
        speciate(&genomes, &mut species, &config, &mut next_id);
        assert_eq!(species.len(), 1);
        assert_eq!(species[0].members(), &[0, 1]);

        let config = SpeciesConfig { compatibility_threshold: 0.999, ..config };
        let mut species = Vec::new();
        speciate(&genomes, &mut species, &config, &mut next_id);
        assert_eq!(species.len(), 2);
        assert_eq!(species[0].id(), SpeciesId(1));
        assert_eq!(species[1].id(), SpeciesId(2));
        assert_eq!(next_id, 3);
    }

    #[test]
    fn speciation_drops_species_without_members() {
        let near = genome(2, 1, &[(0, 0, 2, 1.)]);
        let far = genome(2, 1, &[(5, 1, 2, 1.), (6, 0, 3, 1.), (7, 3, 2, 1.), (8, 1, 3, 1.)]);
        let config = SpeciesConfig { compatibility_threshold: 1.0, ..SpeciesConfig::default() };
        let mut species =
            vec![Species::new(SpeciesId(0), far), Species::new(SpeciesId(1), near.clone())];
        let mut next_id = 2;
        speciate(&[near.clone(), near], &mut species, &config, &mut next_id);
        assert_eq!(species.len(), 1);
        assert_eq!(species[0].id(), SpeciesId(1));
        assert_eq!(species[0].members(), &[0, 1]);
        assert_eq!(next_id, 2);
    }
}
