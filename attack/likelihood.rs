//! # Likelihood-Ratio Scorer
//!
//! Scores a target model's observations against per-example IN and OUT reference
//! populations. For every example and repetition a Gaussian is fitted to each
//! population (median location, population standard deviation), and the score is
//! the log-likelihood ratio `log N(x; IN) - log N(x; OUT)` averaged over
//! repetitions. A higher score is more evidence that the example was a member.
//!
//! The variance estimate is a caller policy ([`VarianceMode`]): per example and
//! repetition, or a single global estimate pooled over every value of the
//! population side. Only the global estimate can score size-1 populations.

use crate::population::{PopulationPair, PopulationSide};
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How the scale of each reference Gaussian is estimated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VarianceMode {
    /// One standard deviation per example and repetition.
    #[default]
    PerExample,
    /// One standard deviation per population side, pooled over all examples.
    Global,
}

impl VarianceMode {
    pub fn from_global_flag(use_global_variance: bool) -> Self {
        if use_global_variance {
            Self::Global
        } else {
            Self::PerExample
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScoreError {
    #[error("Received {found} population pairs for {expected} target examples.")]
    PopulationCountMismatch { expected: usize, found: usize },
    #[error(
        "Example {example}: the {side} population has {found} repetitions, but the target has {expected}."
    )]
    RepetitionMismatch {
        example: usize,
        side: PopulationSide,
        expected: usize,
        found: usize,
    },
    #[error("Example {example}: the {side} population is empty.")]
    EmptyPopulation {
        example: usize,
        side: PopulationSide,
    },
    #[error(
        "Example {example}, repetition {repetition}: the {side} population has standard deviation {std_dev}; enable the global variance estimate or provide more shadow models."
    )]
    ZeroVariance {
        example: usize,
        repetition: usize,
        side: PopulationSide,
        std_dev: f64,
    },
    #[error(
        "The pooled {side} population has standard deviation {std_dev}; all reference values are identical."
    )]
    ZeroGlobalVariance { side: PopulationSide, std_dev: f64 },
}

/// A fitted reference Gaussian for one example and repetition.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Reference {
    location: f64,
    scale: f64,
}

impl Reference {
    fn log_density(&self, x: f64) -> f64 {
        let z = (x - self.location) / self.scale;
        -0.5 * z * z - self.scale.ln() - 0.5 * (2.0 * std::f64::consts::PI).ln()
    }
}

/// Scores every example of one target model.
///
/// # Arguments
/// * `target`: `[example, repetition]` observations of the target model.
/// * `populations`: one IN/OUT pair per example, in example order.
/// * `variance`: the scale estimation policy.
///
/// # Returns
/// One score per example; higher means the observation is more likely under IN.
pub fn score_lira(
    target: ArrayView2<'_, f64>,
    populations: &[PopulationPair],
    variance: VarianceMode,
) -> Result<Array1<f64>, ScoreError> {
    let (n_examples, n_repetitions) = target.dim();
    if populations.len() != n_examples {
        return Err(ScoreError::PopulationCountMismatch {
            expected: n_examples,
            found: populations.len(),
        });
    }

    for (example, pair) in populations.iter().enumerate() {
        for side in [PopulationSide::In, PopulationSide::Out] {
            let population = pair.get(side);
            if population.nrows() == 0 {
                return Err(ScoreError::EmptyPopulation { example, side });
            }
            if population.ncols() != n_repetitions {
                return Err(ScoreError::RepetitionMismatch {
                    example,
                    side,
                    expected: n_repetitions,
                    found: population.ncols(),
                });
            }
        }
    }

    let global_scales = match variance {
        VarianceMode::PerExample => None,
        VarianceMode::Global => Some((
            pooled_std(populations, PopulationSide::In)?,
            pooled_std(populations, PopulationSide::Out)?,
        )),
    };

    let mut scores = Array1::zeros(n_examples);
    for (example, (pair, observed)) in populations
        .iter()
        .zip(target.axis_iter(Axis(0)))
        .enumerate()
    {
        let mut total = 0.0;
        for (repetition, &x) in observed.iter().enumerate() {
            let fit = |side: PopulationSide, global: Option<f64>| -> Result<Reference, ScoreError> {
                let values = pair.get(side).column(repetition);
                let location = median(values);
                let scale = match global {
                    Some(scale) => scale,
                    None => {
                        let std_dev = std_dev(values);
                        if std_dev.is_nan() || std_dev <= 0.0 {
                            return Err(ScoreError::ZeroVariance {
                                example,
                                repetition,
                                side,
                                std_dev,
                            });
                        }
                        std_dev
                    }
                };
                Ok(Reference { location, scale })
            };
            let inside = fit(PopulationSide::In, global_scales.map(|(s, _)| s))?;
            let outside = fit(PopulationSide::Out, global_scales.map(|(_, s)| s))?;
            total += inside.log_density(x) - outside.log_density(x);
        }
        scores[example] = total / n_repetitions as f64;
    }

    Ok(scores)
}

/// Median of a non-empty column; even-length columns average the two middle values.
fn median(values: ArrayView1<'_, f64>) -> f64 {
    let mut sorted: Vec<f64> = values.iter().copied().collect();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        0.5 * (sorted[mid - 1] + sorted[mid])
    } else {
        sorted[mid]
    }
}

/// Population standard deviation (`ddof = 0`).
fn std_dev(values: ArrayView1<'_, f64>) -> f64 {
    values.std(0.0)
}

/// Standard deviation of every value on one population side, across all examples
/// and repetitions.
fn pooled_std(populations: &[PopulationPair], side: PopulationSide) -> Result<f64, ScoreError> {
    let (count, sum) = populations
        .iter()
        .map(|pair| pair.get(side))
        .fold((0usize, 0.0f64), |(count, sum), values| {
            (count + values.len(), sum + values.sum())
        });
    let mean = sum / count as f64;
    let squares: f64 = populations
        .iter()
        .flat_map(|pair| pair.get(side).iter())
        .map(|&v| (v - mean) * (v - mean))
        .sum();
    let std_dev = (squares / count as f64).sqrt();
    if std_dev.is_nan() || std_dev <= 0.0 {
        return Err(ScoreError::ZeroGlobalVariance { side, std_dev });
    }
    Ok(std_dev)
}
