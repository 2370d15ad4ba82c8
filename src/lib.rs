//! Implementation of `NeuroEvolution` of Augmenting Topologies [NEAT]
//! (http://nn.cs.utexas.edu/downloads/papers/stanley.ec02.pdf)
//!
//! A [`Population`] holds the genomes of one generation. The caller evaluates them, reports
//! their fitness and calls [`Population::evolve`] to breed the next generation:
//!
//! ```
//! use neat_engine::{MutationConfig, Population, SpeciesConfig};
//!
//! let mut population =
//!     Population::new(20, 2, 1, MutationConfig::default(), SpeciesConfig::default(), 7).unwrap();
//! for _ in 0..3 {
//!     let fitness: Vec<f64> =
//!         population.genomes().iter().map(|g| g.edge_count() as f64).collect();
//!     population.set_fitnesses(&fitness).unwrap();
//!     population.evolve().unwrap();
//! }
//! assert_eq!(population.generation(), 3);
//! ```
//!
//! Networks are never executed here: how a genome maps to a phenotype and how it scores is up
//! to the caller.
pub use self::compatibility::{Compatibility, DefaultCompatibility, GeneDifference};
pub use self::config::{MutationConfig, SpeciesConfig, Termination};
pub use self::error::{NeatError, Result};
pub use self::gene::{Activation, EdgeGene, InnovationId, NodeGene, NodeId, NodeKind};
pub use self::genome::Genome;
pub use self::history::GeneHistory;
pub use self::population::{GenerationStats, Population, PopulationState};
pub use self::rng::NeatRng;
pub use self::species::{Species, SpeciesId};

pub mod compatibility;
pub mod config;
pub mod error;
pub mod evolution;
pub mod gene;
pub mod genome;
pub mod history;
mod mutation;
pub mod population;
pub mod rng;
pub mod species;
