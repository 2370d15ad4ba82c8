use itertools::EitherOrBoth::{Both, Left, Right};

use crate::config::SpeciesConfig;
use crate::genome::Genome;

/// Defines separation of genomes into species.
pub trait Compatibility {
    /// Compute the distance of two genomes. Higher distance means lower compatibility.
    fn distance(&self, genome1: &Genome, genome2: &Genome) -> f64;
}

/// δ = (c1 * E)/N + (c2 * D)/N + c3*W
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultCompatibility {
    pub c1: f64,
    pub c2: f64,
    pub c3: f64,
    /// Below this gene count N is taken as 1.
    pub normalize_min_genes: usize,
}

impl Default for DefaultCompatibility {
    fn default() -> Self {
        DefaultCompatibility::from(&SpeciesConfig::default())
    }
}

impl From<&SpeciesConfig> for DefaultCompatibility {
    fn from(config: &SpeciesConfig) -> Self {
        Self {
            c1: config.excess_coefficient,
            c2: config.disjoint_coefficient,
            c3: config.weight_diff_coefficient,
            normalize_min_genes: config.normalize_min_genes,
        }
    }
}

/// Gene counts behind a distance value.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GeneDifference {
    pub excess: usize,
    pub disjoint: usize,
    pub matching: usize,
    /// Average absolute weight difference of matching genes, 0 without matches.
    pub average_weight_difference: f64,
}

impl GeneDifference {
    /// Count excess, disjoint and matching genes of two genomes.
    ///
    /// > Genes that do not match are either disjoint or excess, depending on whether they occur
    /// > within or outside the range of the other parent’s innovation numbers.
    pub fn between(genome1: &Genome, genome2: &Genome) -> GeneDifference {
        let max1 = genome1.max_innovation();
        let max2 = genome2.max_innovation();
        let mut diff = GeneDifference::default();
        let mut total_weight_distance = 0.;
        for pair in genome1.align(genome2) {
            match pair {
                Both(e1, e2) => {
                    diff.matching += 1;
                    total_weight_distance += f64::abs(e1.weight - e2.weight);
                }
                Left(e) if Some(e.innovation) > max2 => diff.excess += 1,
                Right(e) if Some(e.innovation) > max1 => diff.excess += 1,
                _ => diff.disjoint += 1,
            }
        }
        if diff.matching > 0 {
            diff.average_weight_difference = total_weight_distance / diff.matching as f64;
        }
        diff
    }
}

impl Compatibility for DefaultCompatibility {
    fn distance(&self, genome1: &Genome, genome2: &Genome) -> f64 {
        let diff = GeneDifference::between(genome1, genome2);

        // n, the number of genes in the larger genome, normalizes for genome size (n
        // can be set to 1 if both genomes are small, i.e., consist of fewer than 20 genes)
        let larger = std::cmp::max(genome1.edge_count(), genome2.edge_count());
        let n = if larger < self.normalize_min_genes { 1 } else { larger.max(1) } as f64;

        (self.c1 * diff.excess as f64 + self.c2 * diff.disjoint as f64) / n
            + self.c3 * diff.average_weight_difference
    }
}
