use thiserror::Error;

/// Errors surfaced by the evolution engine.
///
/// A structural mutation that finds no valid target is not an error: the operator
/// returns `false` and the genome stays untouched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NeatError {
    #[error("probability `{name}` must lie in [0, 1], got {value}")]
    InvalidProbability { name: &'static str, value: f64 },

    #[error("parameter `{name}` is out of range: {value}")]
    InvalidParameter { name: &'static str, value: f64 },

    #[error("population size must be positive, got {0}")]
    InvalidPopulationSize(usize),

    #[error("a genome needs at least one input and one output, got {inputs} and {outputs}")]
    InvalidTopology { inputs: usize, outputs: usize },

    #[error("genomes without an assigned fitness: {missing:?}")]
    EvaluationIncomplete { missing: Vec<usize> },

    #[error("fitness of genome {index} must be finite and non-negative, got {value}")]
    InvalidFitness { index: usize, value: f64 },

    #[error("genome index {index} out of range for a population of {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("invalid genome: {0}")]
    InvalidGenome(String),

    #[error("the run terminated at generation {generation}")]
    Terminated { generation: usize },
}

pub type Result<T> = std::result::Result<T, NeatError>;

/// Reject probabilities outside of `[0, 1]` (NaN included).
pub(crate) fn check_probability(name: &'static str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(NeatError::InvalidProbability { name, value })
    }
}

/// Reject parameters that are not strictly positive and finite.
pub(crate) fn check_positive(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(NeatError::InvalidParameter { name, value })
    }
}
