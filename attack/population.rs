//! # Population Assembler
//!
//! Builds, for every example, the IN and OUT reference populations from a pool of
//! shadow models. The pool is an explicit list of model indices (never a pair of
//! spliced slices), so leave-one-out exclusion of the target is a plain set
//! difference and model/membership alignment is preserved by construction: the
//! statistics row and the membership row of a pool member are always read with the
//! same model index.

use crate::statistics::{MembershipMatrix, ShadowStatistics};
use ndarray::{Array2, ArrayView2, ArrayView3, Axis};
use std::fmt;
use thiserror::Error;

/// Which reference population a value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopulationSide {
    /// Shadow models that trained on the example.
    In,
    /// Shadow models that did not train on the example.
    Out,
}

impl fmt::Display for PopulationSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::In => f.write_str("IN"),
            Self::Out => f.write_str("OUT"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PopulationError {
    #[error(
        "Example {example} has no {side} shadow models in the pool of {pool_size}; the shadow membership cannot support this attack."
    )]
    EmptyPopulation {
        example: usize,
        side: PopulationSide,
        pool_size: usize,
    },
    #[error("Model index {model} is out of range for {n_models} models.")]
    ModelOutOfRange { model: usize, n_models: usize },
    #[error("Configuration {configuration} is out of range for {n_configurations} configurations.")]
    ConfigurationOutOfRange {
        configuration: usize,
        n_configurations: usize,
    },
}

/// The IN and OUT populations of one example. Each population has one row per pool
/// model (in pool order) and one column per repetition.
#[derive(Debug, Clone, PartialEq)]
pub struct PopulationPair {
    pub inside: Array2<f64>,
    pub outside: Array2<f64>,
}

impl PopulationPair {
    pub fn get(&self, side: PopulationSide) -> &Array2<f64> {
        match side {
            PopulationSide::In => &self.inside,
            PopulationSide::Out => &self.outside,
        }
    }
}

/// Every model index in `0..n_models` except `target`.
pub fn leave_one_out(n_models: usize, target: usize) -> Vec<usize> {
    (0..n_models).filter(|&model| model != target).collect()
}

/// Where the statistics of a pool member come from.
#[derive(Debug, Clone, Copy)]
enum PoolSource<'a> {
    /// Each model at its own configuration.
    Diagonal(&'a ShadowStatistics),
    /// Every model at one shared configuration, `[model, example, repetition]`.
    Column(ArrayView3<'a, f64>),
}

/// A set of shadow models together with the statistics and membership rows used to
/// build reference populations.
#[derive(Debug, Clone)]
pub struct ShadowPool<'a> {
    source: PoolSource<'a>,
    membership: &'a MembershipMatrix,
    models: Vec<usize>,
}

impl<'a> ShadowPool<'a> {
    /// Pool whose members contribute their own-configuration statistics.
    pub fn diagonal(
        shadow: &'a ShadowStatistics,
        membership: &'a MembershipMatrix,
        models: Vec<usize>,
    ) -> Result<Self, PopulationError> {
        for &model in &models {
            check_model(model, shadow.n_models().min(membership.n_models()))?;
            if model >= shadow.n_configurations() {
                return Err(PopulationError::ConfigurationOutOfRange {
                    configuration: model,
                    n_configurations: shadow.n_configurations(),
                });
            }
        }
        Ok(Self {
            source: PoolSource::Diagonal(shadow),
            membership,
            models,
        })
    }

    /// Pool whose members all contribute their statistics at `configuration`.
    pub fn column(
        shadow: &'a ShadowStatistics,
        membership: &'a MembershipMatrix,
        models: Vec<usize>,
        configuration: usize,
    ) -> Result<Self, PopulationError> {
        if configuration >= shadow.n_configurations() {
            return Err(PopulationError::ConfigurationOutOfRange {
                configuration,
                n_configurations: shadow.n_configurations(),
            });
        }
        Self::from_column(shadow.column(configuration), membership, models)
    }

    /// Pool over a pre-sliced `[model, example, repetition]` array whose model axis
    /// is indexed like the membership matrix.
    pub fn from_column(
        statistics: ArrayView3<'a, f64>,
        membership: &'a MembershipMatrix,
        models: Vec<usize>,
    ) -> Result<Self, PopulationError> {
        let n_models = statistics.len_of(Axis(0)).min(membership.n_models());
        for &model in &models {
            check_model(model, n_models)?;
        }
        Ok(Self {
            source: PoolSource::Column(statistics),
            membership,
            models,
        })
    }

    pub fn models(&self) -> &[usize] {
        &self.models
    }

    pub fn membership(&self) -> &MembershipMatrix {
        self.membership
    }

    /// `[example, repetition]` statistics of one pool member.
    pub fn statistics_of(&self, model: usize) -> ArrayView2<'a, f64> {
        match self.source {
            PoolSource::Diagonal(shadow) => shadow.model_at(model, model),
            PoolSource::Column(view) => view.index_axis_move(Axis(0), model),
        }
    }

    fn n_examples(&self) -> usize {
        self.membership.n_examples()
    }
}

fn check_model(model: usize, n_models: usize) -> Result<(), PopulationError> {
    if model < n_models {
        Ok(())
    } else {
        Err(PopulationError::ModelOutOfRange { model, n_models })
    }
}

/// Partitions the pool into IN and OUT populations for every example.
pub fn assemble(pool: &ShadowPool<'_>) -> Result<Vec<PopulationPair>, PopulationError> {
    let member_stats: Vec<ArrayView2<'_, f64>> = pool
        .models()
        .iter()
        .map(|&model| pool.statistics_of(model))
        .collect();
    let n_repetitions = member_stats.first().map_or(0, |s| s.ncols());

    (0..pool.n_examples())
        .map(|example| -> Result<PopulationPair, PopulationError> {
            let mut inside = Vec::new();
            let mut outside = Vec::new();
            for (&model, stats) in pool.models().iter().zip(&member_stats) {
                let row = stats.row(example);
                if pool.membership().is_member(model, example) {
                    inside.extend(row.iter().copied());
                } else {
                    outside.extend(row.iter().copied());
                }
            }
            Ok(PopulationPair {
                inside: into_population(inside, n_repetitions, example, PopulationSide::In, pool)?,
                outside: into_population(
                    outside,
                    n_repetitions,
                    example,
                    PopulationSide::Out,
                    pool,
                )?,
            })
        })
        .collect()
}

fn into_population(
    values: Vec<f64>,
    n_repetitions: usize,
    example: usize,
    side: PopulationSide,
    pool: &ShadowPool<'_>,
) -> Result<Array2<f64>, PopulationError> {
    let empty = PopulationError::EmptyPopulation {
        example,
        side,
        pool_size: pool.models().len(),
    };
    if values.is_empty() || n_repetitions == 0 {
        return Err(empty);
    }
    let rows = values.len() / n_repetitions;
    Array2::from_shape_vec((rows, n_repetitions), values).map_err(|_| empty)
}

/// Leave-one-out assembly for `target`: the pool is every other model, read at
/// `configuration` or, when `None`, at each model's own configuration.
pub fn assemble_for_target(
    shadow: &ShadowStatistics,
    membership: &MembershipMatrix,
    target: usize,
    configuration: Option<usize>,
) -> Result<Vec<PopulationPair>, PopulationError> {
    let n_models = shadow.n_models();
    check_model(target, n_models)?;
    let models = leave_one_out(n_models, target);
    let pool = match configuration {
        Some(column) => ShadowPool::column(shadow, membership, models, column)?,
        None => ShadowPool::diagonal(shadow, membership, models)?,
    };
    assemble(&pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array4, array};

    /// Statistic value encodes (model, configuration, example, repetition) so that
    /// every population entry can be traced back to its source.
    fn traced_shadow(n_models: usize, n_configs: usize, n_examples: usize) -> ShadowStatistics {
        ShadowStatistics::new(Array4::from_shape_fn(
            (n_models, n_configs, n_examples, 2),
            |(m, c, e, r)| (1000 * m + 100 * c + 10 * e + r) as f64,
        ))
    }

    fn membership() -> MembershipMatrix {
        MembershipMatrix::from_rows(&[
            vec![true, false, true],
            vec![false, true, true],
            vec![true, true, false],
            vec![false, false, true],
        ])
        .unwrap()
    }

    fn source_model(value: f64) -> usize {
        (value / 1000.0).floor() as usize
    }

    #[test]
    fn leave_one_out_excludes_only_the_target() {
        assert_eq!(leave_one_out(4, 0), vec![1, 2, 3]);
        assert_eq!(leave_one_out(4, 2), vec![0, 1, 3]);
        assert_eq!(leave_one_out(4, 3), vec![0, 1, 2]);
        assert!(leave_one_out(1, 0).is_empty());
    }

    #[test]
    fn target_never_appears_in_its_own_populations() {
        let shadow = traced_shadow(4, 4, 3);
        let membership = membership();
        for target in 0..4 {
            for configuration in [None, Some(0), Some(3)] {
                let result = assemble_for_target(&shadow, &membership, target, configuration);
                let Ok(pairs) = result else {
                    // Some targets leave an example without IN or OUT models.
                    continue;
                };
                for pair in &pairs {
                    for value in pair.inside.iter().chain(pair.outside.iter()) {
                        assert_ne!(source_model(*value), target);
                    }
                }
            }
        }
    }

    #[test]
    fn diagonal_pool_partitions_by_membership() {
        let shadow = traced_shadow(4, 4, 3);
        let membership = membership();
        // Target 3: pool {0, 1, 2} each at its own configuration.
        let pairs = assemble_for_target(&shadow, &membership, 3, None).unwrap();
        assert_eq!(pairs.len(), 3);

        // Example 0: IN = {0, 2}, OUT = {1}.
        assert_eq!(pairs[0].inside, array![[0.0, 1.0], [2200.0, 2201.0]]);
        assert_eq!(pairs[0].outside, array![[1100.0, 1101.0]]);

        // Example 2: IN = {0, 1}, OUT = {2}.
        assert_eq!(pairs[2].inside, array![[20.0, 21.0], [1120.0, 1121.0]]);
        assert_eq!(pairs[2].outside, array![[2220.0, 2221.0]]);
    }

    #[test]
    fn column_pool_reads_the_shared_configuration() {
        let shadow = traced_shadow(4, 4, 3);
        let membership = membership();
        let pairs = assemble_for_target(&shadow, &membership, 3, Some(1)).unwrap();
        // Example 1: IN = {1, 2}, OUT = {0}, all at configuration 1.
        assert_eq!(pairs[1].inside, array![[1110.0, 1111.0], [2110.0, 2111.0]]);
        assert_eq!(pairs[1].outside, array![[110.0, 111.0]]);
    }

    #[test]
    fn empty_population_is_fatal() {
        let shadow = traced_shadow(4, 4, 3);
        let membership = membership();
        // Target 2: example 1 has IN = {1}, OUT = {0, 3}; example 0 has IN = {0}, OUT = {1, 3};
        // example 2 has IN = {0, 1, 3}, OUT = {} -> error.
        let err = assemble_for_target(&shadow, &membership, 2, None).unwrap_err();
        assert_eq!(
            err,
            PopulationError::EmptyPopulation {
                example: 2,
                side: PopulationSide::Out,
                pool_size: 3
            }
        );
    }

    #[test]
    fn out_of_range_indices_are_rejected() {
        let shadow = traced_shadow(4, 4, 3);
        let membership = membership();
        assert!(matches!(
            assemble_for_target(&shadow, &membership, 7, None),
            Err(PopulationError::ModelOutOfRange { model: 7, .. })
        ));
        assert!(matches!(
            assemble_for_target(&shadow, &membership, 0, Some(9)),
            Err(PopulationError::ConfigurationOutOfRange {
                configuration: 9,
                ..
            })
        ));
    }
}
