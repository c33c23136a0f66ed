//! Errors surfaced by the attack runners and the configuration search.

use crate::divergence::DivergenceError;
use crate::likelihood::ScoreError;
use crate::population::PopulationError;
use crate::statistics::ShapeError;
use thiserror::Error;

/// Every failure is fatal for the run; there is no partial result.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AttackError {
    #[error("Invalid attack inputs: {0}")]
    Shape(#[from] ShapeError),
    #[error("Could not assemble reference populations for target model {target}: {source}")]
    Population {
        target: usize,
        #[source]
        source: PopulationError,
    },
    #[error("Could not score target model {target}: {source}")]
    Scoring {
        target: usize,
        #[source]
        source: ScoreError,
    },
    #[error(
        "Divergence between target model {target} and shadow model {model} at configuration {configuration} is undefined: {source}"
    )]
    Divergence {
        target: usize,
        configuration: usize,
        model: usize,
        #[source]
        source: DivergenceError,
    },
    #[error(
        "Shadow model {model} trained on no examples, so it cannot be compared with target model {target}."
    )]
    NoOverlap { target: usize, model: usize },
    #[error(
        "The mean divergence between target model {target} and configuration {configuration} is NaN."
    )]
    NonFiniteDistance { target: usize, configuration: usize },
    #[error("No shadow configuration could be ranked for target model {target}.")]
    NoUsableConfiguration { target: usize },
    #[error("Expected one selected configuration per target model ({expected}), got {found}.")]
    SelectionLength { expected: usize, found: usize },
    #[error(
        "Selected configuration {configuration} for target model {target} is invalid: {n_configurations} configurations exist and a model may not select its own."
    )]
    InvalidSelection {
        target: usize,
        configuration: usize,
        n_configurations: usize,
    },
}
