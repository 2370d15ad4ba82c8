//! Tunable probabilities and thresholds of a run.
//!
//! Every struct deserializes with `#[serde(default)]`, so a config file only needs to name
//! the fields it changes. Values are checked by `validate()` when a population is built.
use serde::{Deserialize, Serialize};

use crate::error::{check_positive, check_probability, NeatError, Result};

/// Rates of the genome mutation and crossover operators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MutationConfig {
    /// Chance, per enabled edge, that its weight is mutated.
    pub weight_mutate_rate: f64,
    /// Standard deviation of the Gaussian weight perturbation.
    pub weight_perturb_stddev: f64,
    /// Chance that a mutated weight is reassigned uniformly instead of perturbed.
    pub weight_replace_rate: f64,
    /// Initial and reassigned weights are drawn from `[-weight_range, weight_range)`.
    pub weight_range: f64,
    pub add_edge_rate: f64,
    pub add_node_rate: f64,
    /// Chance to flip the enabled flag of one random edge.
    pub toggle_edge_rate: f64,
    /// Chance that a matching gene disabled in either parent is enabled in the child.
    pub reenable_rate: f64,
    /// With equally fit parents, chance of inheriting each disjoint or excess gene.
    pub disjoint_inherit_rate: f64,
    /// Chance an offspring is bred by crossover rather than cloned from one parent.
    pub crossover_rate: f64,
    /// Chance that the second parent is drawn from another species.
    pub interspecies_mate_rate: f64,
    /// Forbid edges that would close a cycle.
    pub feed_forward: bool,
    /// Random node pairs tried by add-edge before it gives up.
    pub max_add_edge_attempts: usize,
}

impl Default for MutationConfig {
    fn default() -> Self {
        MutationConfig {
            weight_mutate_rate: 0.8,
            weight_perturb_stddev: 0.5,
            weight_replace_rate: 0.1,
            weight_range: 1.0,
            add_edge_rate: 0.05,
            add_node_rate: 0.03,
            toggle_edge_rate: 0.01,
            reenable_rate: 0.25,
            disjoint_inherit_rate: 0.5,
            crossover_rate: 0.75,
            interspecies_mate_rate: 0.001,
            feed_forward: true,
            max_add_edge_attempts: 20,
        }
    }
}

impl MutationConfig {
    pub fn validate(&self) -> Result<()> {
        check_probability("weight_mutate_rate", self.weight_mutate_rate)?;
        check_probability("weight_replace_rate", self.weight_replace_rate)?;
        check_probability("add_edge_rate", self.add_edge_rate)?;
        check_probability("add_node_rate", self.add_node_rate)?;
        check_probability("toggle_edge_rate", self.toggle_edge_rate)?;
        check_probability("reenable_rate", self.reenable_rate)?;
        check_probability("disjoint_inherit_rate", self.disjoint_inherit_rate)?;
        check_probability("crossover_rate", self.crossover_rate)?;
        check_probability("interspecies_mate_rate", self.interspecies_mate_rate)?;
        if !(self.weight_perturb_stddev.is_finite() && self.weight_perturb_stddev >= 0.0) {
            return Err(NeatError::InvalidParameter {
                name: "weight_perturb_stddev",
                value: self.weight_perturb_stddev,
            });
        }
        check_positive("weight_range", self.weight_range)?;
        if self.max_add_edge_attempts == 0 {
            return Err(NeatError::InvalidParameter { name: "max_add_edge_attempts", value: 0. });
        }
        Ok(())
    }
}

/// Speciation and selection parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeciesConfig {
    /// δₜ: a genome joins a species when its distance to the representative is at most this.
    pub compatibility_threshold: f64,
    /// c1, weight of excess genes.
    pub excess_coefficient: f64,
    /// c2, weight of disjoint genes.
    pub disjoint_coefficient: f64,
    /// c3, weight of the average weight difference of matching genes.
    pub weight_diff_coefficient: f64,
    /// Genomes with fewer genes than this are not normalized by size (N = 1).
    pub normalize_min_genes: usize,
    /// Fraction of each species, best first, allowed to reproduce.
    pub survival_threshold: f64,
    /// Generations without improvement after which a species stops reproducing.
    pub stagnation_limit: usize,
    /// Species with at least this many members keep their champion unchanged.
    pub elitism_min_size: usize,
}

impl Default for SpeciesConfig {
    // From the original paper:
    // c3 was increased [for DPNV experiment which had population size of 1000 instead of 150]
    // to 3.0 in order to allow for finer distinctions between species based on weight
    // differences (the larger population has room for more species).
    fn default() -> Self {
        SpeciesConfig {
            compatibility_threshold: 3.0,
            excess_coefficient: 1.0,
            disjoint_coefficient: 1.0,
            weight_diff_coefficient: 0.4,
            normalize_min_genes: 20,
            survival_threshold: 0.2,
            stagnation_limit: 15,
            elitism_min_size: 5,
        }
    }
}

impl SpeciesConfig {
    pub fn validate(&self) -> Result<()> {
        check_probability("survival_threshold", self.survival_threshold)?;
        if self.survival_threshold == 0.0 {
            return Err(NeatError::InvalidProbability { name: "survival_threshold", value: 0.0 });
        }
        check_positive("compatibility_threshold", self.compatibility_threshold)?;
        for (name, value) in [
            ("excess_coefficient", self.excess_coefficient),
            ("disjoint_coefficient", self.disjoint_coefficient),
            ("weight_diff_coefficient", self.weight_diff_coefficient),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(NeatError::InvalidParameter { name, value });
            }
        }
        if self.stagnation_limit == 0 {
            return Err(NeatError::InvalidParameter { name: "stagnation_limit", value: 0. });
        }
        Ok(())
    }
}

/// When a run stops. Both conditions unset means the caller decides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Termination {
    /// Stop once this many generations have been produced.
    pub max_generations: Option<usize>,
    /// Stop once an evaluated genome reaches this fitness.
    pub fitness_target: Option<f64>,
}

impl Termination {
    pub fn validate(&self) -> Result<()> {
        if let Some(target) = self.fitness_target {
            if !target.is_finite() {
                return Err(NeatError::InvalidParameter { name: "fitness_target", value: target });
            }
        }
        if self.max_generations == Some(0) {
            return Err(NeatError::InvalidParameter { name: "max_generations", value: 0. });
        }
        Ok(())
    }
}
