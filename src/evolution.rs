//! Breeding a new generation from a speciated, evaluated one.
//!
//! Quote from the original paper:
//!
//! As the reproduction mechanism for NEAT, we use explicit fitness sharing (Goldberg
//! and Richardson, 1987), where organisms in the same species must share the fitness
//! of their niche. Thus, a species cannot afford to become too big even if many of its
//! organisms perform well.
//!
//! Every species is assigned a potentially different number of offspring in proportion to the sum
//! of adjusted fitness fᵢ' of its member organisms. Species then reproduce by first eliminating
//! the lowest performing members from the population. The entire population is then replaced by
//! the offspring of the remaining organisms in each species.
use tracing::{debug, trace};

use crate::config::{MutationConfig, SpeciesConfig};
use crate::genome::Genome;
use crate::history::GeneHistory;
use crate::rng::NeatRng;
use crate::species::{Species, SpeciesId};

/// What a species brings to the offspring allocation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OffspringShare {
    pub species: SpeciesId,
    /// Sum of the members' adjusted fitness.
    pub fitness: f64,
    pub members: usize,
}

/// Split `total` offspring among species in proportion to their adjusted fitness.
///
/// Every species first receives the integer part of its quota; the slots left over go one
/// each to the largest fractional remainders, ties to the lowest species id. When no species
/// has any fitness the quotas follow member counts instead. The result is aligned with
/// `shares` and always sums to `total` (given at least one share).
pub fn allocate_offspring(shares: &[OffspringShare], total: usize) -> Vec<usize> {
    if shares.is_empty() {
        return Vec::new();
    }
    let fitness_sum: f64 = shares.iter().map(|s| s.fitness).sum();
    let weights: Vec<f64> = if fitness_sum > 0. {
        shares.iter().map(|s| s.fitness).collect()
    } else if shares.iter().any(|s| s.members > 0) {
        shares.iter().map(|s| s.members as f64).collect()
    } else {
        vec![1.; shares.len()]
    };
    let weight_sum: f64 = weights.iter().sum();

    let quotas: Vec<f64> = weights.iter().map(|w| total as f64 * w / weight_sum).collect();
    let mut counts: Vec<usize> = quotas.iter().map(|q| q.floor() as usize).collect();

    let mut by_remainder: Vec<usize> = (0..shares.len()).collect();
    by_remainder.sort_by(|&a, &b| {
        let ra = quotas[a] - quotas[a].floor();
        let rb = quotas[b] - quotas[b].floor();
        rb.total_cmp(&ra).then(shares[a].species.cmp(&shares[b].species))
    });

    let mut assigned: usize = counts.iter().sum();
    for &slot in by_remainder.iter().cycle() {
        if assigned >= total {
            break;
        }
        counts[slot] += 1;
        assigned += 1;
    }
    // rounding noise can push the floors one past the total
    for &slot in by_remainder.iter().rev().cycle() {
        if assigned <= total {
            break;
        }
        if counts[slot] > 0 {
            counts[slot] -= 1;
            assigned -= 1;
        }
    }
    counts
}

/// Positions in `species` that may reproduce this generation.
///
/// Stagnant species are left out. If every species is stagnant, the one with the best fitness
/// ever seen survives (ties to the earliest species).
pub fn breeding_species(species: &[Species], config: &SpeciesConfig) -> Vec<usize> {
    let active: Vec<usize> = (0..species.len())
        .filter(|&i| !species[i].is_stagnant(config.stagnation_limit))
        .collect();
    if !active.is_empty() || species.is_empty() {
        return active;
    }
    let mut best = 0;
    for (i, s) in species.iter().enumerate().skip(1) {
        if s.best_fitness().unwrap_or(0.) > species[best].best_fitness().unwrap_or(0.) {
            best = i;
        }
    }
    debug!(species = species[best].id().0, "all species stagnant, keeping the best");
    vec![best]
}

/// Shared state of one reproduction step.
pub struct Breeder<'a> {
    pub genomes: &'a [Genome],
    pub mutation: &'a MutationConfig,
    pub species: &'a SpeciesConfig,
}

impl<'a> Breeder<'a> {
    /// Produce exactly `count` offspring of `species`.
    ///
    /// A species with at least `elitism_min_size` members passes its champion on unchanged.
    /// The remaining offspring come from the surviving top fraction of the species, either by
    /// crossover of two rank-selected parents or as a mutated clone of one.
    pub fn breed(
        &self,
        species: &Species,
        count: usize,
        history: &mut GeneHistory,
        rng: &mut NeatRng,
    ) -> Vec<Genome> {
        let mut offspring = Vec::with_capacity(count);
        if count == 0 {
            return offspring;
        }

        if species.len() >= self.species.elitism_min_size {
            let mut champion = self.genomes[species.champion(self.genomes)].clone();
            champion.clear_fitness();
            offspring.push(champion);
        }

        let survivors = species.survivors(self.genomes, self.species.survival_threshold);
        while offspring.len() < count {
            let mother = Species::select_parent(&survivors, rng);
            let mut child = if rng.chance(self.mutation.crossover_rate) {
                match self.mate_for(mother, &survivors, rng) {
                    Some(father) => {
                        self.genomes[mother].crossover(&self.genomes[father], self.mutation, rng)
                    }
                    None => self.genomes[mother].clone(),
                }
            } else {
                self.genomes[mother].clone()
            };
            child.clear_fitness();
            child.mutate(self.mutation, history, rng);
            offspring.push(child);
        }
        trace!(species = species.id().0, count, "bred offspring");
        offspring
    }

    /// Second parent for `mother`: rarely any genome of the population, otherwise another survivor.
    fn mate_for(&self, mother: usize, survivors: &[usize], rng: &mut NeatRng) -> Option<usize> {
        if rng.chance(self.mutation.interspecies_mate_rate) {
            return Some(rng.index(self.genomes.len()));
        }
        let others: Vec<usize> = survivors.iter().copied().filter(|&i| i != mother).collect();
        if others.is_empty() {
            None
        } else {
            Some(Species::select_parent(&others, rng))
        }
    }
}
