use ndarray::Array1;
use ndarray_stats::QuantileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{MutationConfig, SpeciesConfig, Termination};
use crate::error::{NeatError, Result};
use crate::evolution::{allocate_offspring, breeding_species, Breeder, OffspringShare};
use crate::genome::Genome;
use crate::history::GeneHistory;
use crate::rng::NeatRng;
use crate::species::{speciate, Species};

/// Where a population stands in its generational cycle.
///
/// A population is speciated as soon as it is built and again right after every reproduction,
/// so the initialization and reproduction steps are never observed from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PopulationState {
    /// Every genome belongs to a species; fitness values are still being collected.
    Speciated,
    /// Every genome has a fitness, the next call to `evolve` breeds.
    Evaluated,
    /// A termination criterion was met. The population no longer evolves.
    Terminal,
}

/// Fitness summary of one evaluated generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationStats {
    pub generation: usize,
    pub best: f64,
    pub mean: f64,
    pub worst: f64,
    pub species_count: usize,
}

/// A population of genomes evolving generation by generation.
///
/// The caller evaluates the genomes, reports their fitness, and calls [`Population::evolve`]
/// to replace them by the next generation. The whole population, random state included,
/// can be serialized and resumed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Population {
    size: usize,
    n_inputs: usize,
    n_outputs: usize,
    genomes: Vec<Genome>,
    species: Vec<Species>,
    history: GeneHistory,
    rng: NeatRng,
    mutation: MutationConfig,
    speciation: SpeciesConfig,
    termination: Termination,
    generation: usize,
    next_species_id: u64,
    state: PopulationState,
    best: Option<Genome>,
    best_history: Vec<Genome>,
    stats: Vec<GenerationStats>,
}

impl Population {
    /// Create `size` fully connected genomes with random weights and speciate them.
    pub fn new(
        size: usize,
        inputs: usize,
        outputs: usize,
        mutation: MutationConfig,
        speciation: SpeciesConfig,
        seed: u64,
    ) -> Result<Population> {
        if size == 0 {
            return Err(NeatError::InvalidPopulationSize(size));
        }
        if inputs == 0 || outputs == 0 {
            return Err(NeatError::InvalidTopology { inputs, outputs });
        }
        mutation.validate()?;
        speciation.validate()?;

        let mut rng = NeatRng::new(seed);
        let mut history = GeneHistory::new(inputs, outputs);
        let genomes = (0..size)
            .map(|_| Genome::minimal(inputs, outputs, &mut history, &mutation, &mut rng))
            .collect();

        let mut population = Population {
            size,
            n_inputs: inputs,
            n_outputs: outputs,
            genomes,
            species: Vec::new(),
            history,
            rng,
            mutation,
            speciation,
            termination: Termination::default(),
            generation: 0,
            next_species_id: 0,
            state: PopulationState::Speciated,
            best: None,
            best_history: Vec::new(),
            stats: Vec::new(),
        };
        population.speciate();
        info!(
            size,
            inputs,
            outputs,
            seed,
            species = population.species.len(),
            "population initialized"
        );
        Ok(population)
    }

    /// Stop evolving once `termination` is met.
    pub fn with_termination(mut self, termination: Termination) -> Result<Population> {
        termination.validate()?;
        self.termination = termination;
        Ok(self)
    }

    pub fn state(&self) -> PopulationState {
        match self.state {
            PopulationState::Speciated if self.genomes.iter().all(|g| g.fitness().is_some()) => {
                PopulationState::Evaluated
            }
            state => state,
        }
    }

    /// Number of reproductions so far.
    pub fn generation(&self) -> usize {
        self.generation
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn input_count(&self) -> usize {
        self.n_inputs
    }

    pub fn output_count(&self) -> usize {
        self.n_outputs
    }

    pub fn genomes(&self) -> &[Genome] {
        &self.genomes
    }

    pub fn species(&self) -> &[Species] {
        &self.species
    }

    pub fn species_count(&self) -> usize {
        self.species.len()
    }

    pub fn history(&self) -> &GeneHistory {
        &self.history
    }

    /// Best genome evaluated so far, with its fitness.
    pub fn best_genome(&self) -> Option<&Genome> {
        self.best.as_ref()
    }

    /// Best genome of every evaluated generation, oldest first.
    pub fn best_genome_history(&self) -> &[Genome] {
        &self.best_history
    }

    /// Fitness summaries of every evaluated generation, oldest first.
    pub fn stats(&self) -> &[GenerationStats] {
        &self.stats
    }

    pub fn seed(&self) -> u64 {
        self.rng.seed()
    }

    /// Restart the random sequence from `seed`.
    pub fn set_seed(&mut self, seed: u64) {
        self.rng.set_seed(seed);
    }

    pub fn mutation_config(&self) -> &MutationConfig {
        &self.mutation
    }

    pub fn set_mutation_config(&mut self, config: MutationConfig) -> Result<()> {
        config.validate()?;
        self.mutation = config;
        Ok(())
    }

    pub fn species_config(&self) -> &SpeciesConfig {
        &self.speciation
    }

    /// Takes effect from the next speciation on.
    pub fn set_species_config(&mut self, config: SpeciesConfig) -> Result<()> {
        config.validate()?;
        self.speciation = config;
        Ok(())
    }

    pub fn termination(&self) -> &Termination {
        &self.termination
    }

    fn check_fitness(index: usize, value: f64) -> Result<()> {
        if value.is_finite() && value >= 0. {
            Ok(())
        } else {
            Err(NeatError::InvalidFitness { index, value })
        }
    }

    /// Record the fitness of genome `index`.
    pub fn set_fitness(&mut self, index: usize, fitness: f64) -> Result<()> {
        let len = self.genomes.len();
        let genome = self
            .genomes
            .get_mut(index)
            .ok_or(NeatError::IndexOutOfRange { index, len })?;
        Self::check_fitness(index, fitness)?;
        genome.set_fitness(fitness);
        Ok(())
    }

    /// Record fitness values aligned with the genome vector.
    ///
    /// Values past the population size are ignored. Nothing is stored if any value is invalid.
    pub fn set_fitnesses(&mut self, fitness: &[f64]) -> Result<()> {
        if fitness.len() > self.genomes.len() {
            warn!(
                given = fitness.len(),
                size = self.genomes.len(),
                "ignoring surplus fitness values"
            );
        }
        for (index, &value) in fitness.iter().enumerate().take(self.genomes.len()) {
            Self::check_fitness(index, value)?;
        }
        for (genome, &value) in self.genomes.iter_mut().zip(fitness) {
            genome.set_fitness(value);
        }
        Ok(())
    }

    /// Assign `fitness` (aligned with the genome vector) and evolve.
    pub fn evolve_with(&mut self, fitness: &Array1<f64>) -> Result<PopulationState> {
        let values: Vec<f64> = fitness.iter().copied().collect();
        self.set_fitnesses(&values)?;
        self.evolve()
    }

    /// Replace the evaluated generation by its offspring.
    ///
    /// Fails if any genome lacks a valid fitness or if the run already terminated. When the
    /// evaluated generation reaches the fitness target the population turns terminal without
    /// breeding; otherwise it breeds exactly `size` offspring, speciates them and turns
    /// terminal if the generation limit is reached.
    pub fn evolve(&mut self) -> Result<PopulationState> {
        self.evolve_to(self.size)
    }

    /// Like [`Population::evolve`], but breed `size` offspring. The population keeps that size
    /// for later generations.
    pub fn evolve_to(&mut self, size: usize) -> Result<PopulationState> {
        if size == 0 {
            return Err(NeatError::InvalidPopulationSize(size));
        }
        if self.state == PopulationState::Terminal {
            return Err(NeatError::Terminated { generation: self.generation });
        }
        self.check_shapes()?;
        let fitness = self.evaluated_fitness()?;
        self.record(&fitness);

        if let (Some(target), Some(best)) = (self.termination.fitness_target, self.best.as_ref()) {
            if best.fitness().unwrap_or(0.) >= target {
                info!(generation = self.generation, target, "fitness target reached");
                self.state = PopulationState::Terminal;
                return Ok(self.state);
            }
        }

        if size != self.size {
            debug!(from = self.size, to = size, "resizing population");
            self.size = size;
        }
        self.genomes = self.reproduce();
        self.generation += 1;
        self.speciate();
        self.state = PopulationState::Speciated;

        if let Some(max) = self.termination.max_generations {
            if self.generation >= max {
                info!(generation = self.generation, "generation limit reached");
                self.state = PopulationState::Terminal;
            }
        }
        Ok(self.state)
    }

    /// Every genome must keep the input and output layout of the run.
    fn check_shapes(&self) -> Result<()> {
        for (index, genome) in self.genomes.iter().enumerate() {
            if genome.input_count() != self.n_inputs || genome.output_count() != self.n_outputs {
                return Err(NeatError::InvalidGenome(format!(
                    "genome {index} has {} inputs and {} outputs, the population {} and {}",
                    genome.input_count(),
                    genome.output_count(),
                    self.n_inputs,
                    self.n_outputs
                )));
            }
        }
        Ok(())
    }

    /// Fitness of every genome, or the error explaining why the generation cannot breed.
    fn evaluated_fitness(&self) -> Result<Array1<f64>> {
        let missing: Vec<usize> = (0..self.genomes.len())
            .filter(|&i| self.genomes[i].fitness().is_none())
            .collect();
        if !missing.is_empty() {
            return Err(NeatError::EvaluationIncomplete { missing });
        }
        let fitness: Array1<f64> = self.genomes.iter().map(|g| g.fitness().unwrap_or(0.)).collect();
        for (index, &value) in fitness.iter().enumerate() {
            Self::check_fitness(index, value)?;
        }
        Ok(fitness)
    }

    fn record(&mut self, fitness: &Array1<f64>) {
        let best = fitness.argmax().unwrap_or(0);
        let stats = GenerationStats {
            generation: self.generation,
            best: fitness[best],
            mean: fitness.mean().unwrap_or(0.),
            worst: fitness.min().copied().unwrap_or(0.),
            species_count: self.species.len(),
        };
        info!(
            generation = stats.generation,
            best = stats.best,
            mean = stats.mean,
            species = stats.species_count,
            "generation evaluated"
        );
        self.stats.push(stats);

        let champion = &self.genomes[best];
        self.best_history.push(champion.clone());
        let improved = match &self.best {
            Some(previous) => fitness[best] > previous.fitness().unwrap_or(0.),
            None => true,
        };
        if improved {
            self.best = Some(champion.clone());
        }
    }

    fn reproduce(&mut self) -> Vec<Genome> {
        for s in &self.species {
            s.compute_shared_fitness(&mut self.genomes);
        }
        for s in &mut self.species {
            s.update_stagnation(&self.genomes);
        }

        let breeding = breeding_species(&self.species, &self.speciation);
        let shares: Vec<OffspringShare> = breeding
            .iter()
            .map(|&i| {
                let s = &self.species[i];
                OffspringShare {
                    species: s.id(),
                    fitness: s.total_adjusted_fitness(&self.genomes),
                    members: s.len(),
                }
            })
            .collect();
        let counts = allocate_offspring(&shares, self.size);

        let breeder = Breeder {
            genomes: &self.genomes,
            mutation: &self.mutation,
            species: &self.speciation,
        };
        let mut offspring = Vec::with_capacity(self.size);
        for (&i, &count) in breeding.iter().zip(&counts) {
            let s = &self.species[i];
            debug!(species = s.id().0, members = s.len(), offspring = count, "breeding");
            offspring.extend(breeder.breed(s, count, &mut self.history, &mut self.rng));
        }

        // stagnant species leave the population with their members
        let mut position = 0;
        self.species.retain(|s| {
            let keep = breeding.contains(&position);
            if !keep {
                debug!(species = s.id().0, "stagnant species removed");
            }
            position += 1;
            keep
        });
        offspring
    }

    fn speciate(&mut self) {
        for s in &mut self.species {
            s.grow_older();
        }
        speciate(&self.genomes, &mut self.species, &self.speciation, &mut self.next_species_id);
        for s in &mut self.species {
            s.select_representative(&self.genomes, &mut self.rng);
        }
        debug!(generation = self.generation, species = self.species.len(), "speciated");
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    fn population(size: usize, seed: u64) -> Population {
        Population::new(size, 2, 1, MutationConfig::default(), SpeciesConfig::default(), seed)
            .unwrap()
    }

    #[test]
    fn new_population_is_speciated() {
        let p = population(10, 42);
        assert_eq!(p.genomes().len(), 10);
        assert_eq!(p.state(), PopulationState::Speciated);
        assert!(p.species_count() >= 1);
        let members: usize = p.species().iter().map(|s| s.len()).sum();
        assert_eq!(members, 10);
        assert_eq!(p.generation(), 0);
    }

    #[test]
    fn invalid_arguments_are_rejected() {
        let new = |size, inputs, outputs, mutation| {
            Population::new(size, inputs, outputs, mutation, SpeciesConfig::default(), 0)
                .map(|_| ())
        };
        assert_eq!(
            new(0, 2, 1, MutationConfig::default()),
            Err(NeatError::InvalidPopulationSize(0))
        );
        assert_eq!(
            new(5, 0, 1, MutationConfig::default()),
            Err(NeatError::InvalidTopology { inputs: 0, outputs: 1 })
        );
        let bad = MutationConfig { crossover_rate: 2., ..MutationConfig::default() };
        assert!(matches!(
            new(5, 2, 1, bad),
            Err(NeatError::InvalidProbability { name: "crossover_rate", .. })
        ));
    }

    #[test]
    fn evolve_requires_every_fitness() {
        let mut p = population(4, 0);
        p.set_fitness(0, 1.).unwrap();
        p.set_fitness(2, 1.).unwrap();
        assert_eq!(p.evolve(), Err(NeatError::EvaluationIncomplete { missing: vec![1, 3] }));
        assert_eq!(p.generation(), 0);
    }

    #[test]
    fn invalid_fitness_is_rejected() {
        let mut p = population(3, 0);
        assert_eq!(
            p.set_fitness(1, -1.),
            Err(NeatError::InvalidFitness { index: 1, value: -1. })
        );
        assert_eq!(p.set_fitness(7, 1.), Err(NeatError::IndexOutOfRange { index: 7, len: 3 }));
        assert!(p.set_fitnesses(&[1., f64::NAN, 1.]).is_err());
        assert!(p.genomes().iter().all(|g| g.fitness().is_none()));

        p.set_fitnesses(&[1., 1., 1.]).unwrap();
        p.genomes[2].set_fitness(f64::INFINITY);
        assert!(matches!(p.evolve(), Err(NeatError::InvalidFitness { index: 2, .. })));
    }

    #[test]
    fn evaluated_state_follows_fitness() {
        let mut p = population(3, 0);
        p.set_fitnesses(&[1., 2.]).unwrap();
        assert_eq!(p.state(), PopulationState::Speciated);
        p.set_fitness(2, 3.).unwrap();
        assert_eq!(p.state(), PopulationState::Evaluated);
    }

    #[test]
    fn evolve_keeps_population_size() {
        let mut p = population(10, 42);
        for generation in 1..=5 {
            let fitness = Array1::from_iter((0..10).map(|i| i as f64));
            assert_eq!(p.evolve_with(&fitness), Ok(PopulationState::Speciated));
            assert_eq!(p.genomes().len(), 10);
            assert_eq!(p.generation(), generation);
            assert!(p.genomes().iter().all(|g| g.fitness().is_none()));
        }
        assert_eq!(p.stats().len(), 5);
        assert_eq!(p.best_genome_history().len(), 5);
    }

    #[test]
    fn stats_summarize_the_evaluated_generation() {
        let mut p = population(3, 1);
        p.evolve_with(&array![1., 4., 2.5]).unwrap();
        let stats = &p.stats()[0];
        assert_eq!(stats.generation, 0);
        assert_eq!(stats.best, 4.);
        assert_eq!(stats.worst, 1.);
        assert_eq!(stats.mean, 2.5);
        assert_eq!(p.best_genome().and_then(|g| g.fitness()), Some(4.));
    }

    #[test]
    fn fitness_target_terminates() {
        let mut p = population(5, 3)
            .with_termination(Termination { fitness_target: Some(3.), ..Termination::default() })
            .unwrap();
        assert_eq!(p.evolve_with(&array![1., 1., 1., 1., 1.]), Ok(PopulationState::Speciated));
        assert_eq!(p.evolve_with(&array![1., 3., 1., 1., 1.]), Ok(PopulationState::Terminal));
        assert_eq!(p.generation(), 1);
        assert_eq!(p.state(), PopulationState::Terminal);
        assert_eq!(p.evolve(), Err(NeatError::Terminated { generation: 1 }));
    }

    #[test]
    fn generation_limit_terminates() {
        let mut p = population(4, 3)
            .with_termination(Termination { max_generations: Some(2), ..Termination::default() })
            .unwrap();
        assert_eq!(p.evolve_with(&array![1., 1., 1., 1.]), Ok(PopulationState::Speciated));
        assert_eq!(p.evolve_with(&array![1., 1., 1., 1.]), Ok(PopulationState::Terminal));
        assert!(p.evolve().is_err());
    }

    #[test]
    fn genomes_of_another_layout_are_rejected() {
        let mut p = population(6, 0);
        let mut foreign = GeneHistory::new(5, 4);
        let config = MutationConfig::default();
        p.genomes[0] = Genome::minimal(5, 4, &mut foreign, &config, &mut NeatRng::new(1));
        p.set_fitnesses(&[1.; 6]).unwrap();
        assert!(matches!(p.evolve(), Err(NeatError::InvalidGenome(_))));
        assert_eq!(p.generation(), 0);
        assert!(p.stats().is_empty());
    }

    #[test]
    fn evolve_to_grows_and_shrinks() {
        let mut p = population(6, 8);
        p.set_fitnesses(&[1., 2., 3., 4., 5., 6.]).unwrap();
        assert_eq!(p.evolve_to(15), Ok(PopulationState::Speciated));
        assert_eq!(p.genomes().len(), 15);
        assert_eq!(p.size(), 15);
        let members: usize = p.species().iter().map(|s| s.len()).sum();
        assert_eq!(members, 15);

        p.set_fitnesses(&[1.; 15]).unwrap();
        assert_eq!(p.evolve_to(4), Ok(PopulationState::Speciated));
        assert_eq!(p.genomes().len(), 4);

        // the new size sticks
        p.set_fitnesses(&[1.; 4]).unwrap();
        p.evolve().unwrap();
        assert_eq!(p.genomes().len(), 4);
    }

    #[test]
    fn evolve_to_zero_is_rejected() {
        let mut p = population(3, 0);
        p.set_fitnesses(&[1., 1., 1.]).unwrap();
        assert_eq!(p.evolve_to(0), Err(NeatError::InvalidPopulationSize(0)));
        assert_eq!(p.size(), 3);
        assert_eq!(p.generation(), 0);
        assert_eq!(p.state(), PopulationState::Evaluated);
    }

    #[test]
    fn config_setters_validate() {
        let mut p = population(2, 0);
        let bad = SpeciesConfig { compatibility_threshold: 0., ..SpeciesConfig::default() };
        assert!(p.set_species_config(bad).is_err());
        assert_eq!(p.species_config(), &SpeciesConfig::default());
        let lively = MutationConfig { add_node_rate: 0.5, ..MutationConfig::default() };
        p.set_mutation_config(lively.clone()).unwrap();
        assert_eq!(p.mutation_config(), &lively);
    }
}
