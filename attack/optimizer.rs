//! # Shadow Configuration Search
//!
//! For each target model, ranks every alternative shadow configuration by how
//! closely its statistics match the target's own distribution, and selects the
//! closest one. The target's own configuration is reserved for measurement: its
//! distance is forced to `+inf` so it can never be selected.
//!
//! The distance of configuration `j` for target `i` is the mean, over every shadow
//! model `k != i`, of `metric(P_k, Q_k)` where
//! - `P_k` is target `i`'s observations on the examples model `k` trained on, and
//! - `Q_k` is model `k`'s configuration-`j` statistics on the same examples.
//!
//! All repetitions of the selected examples are pooled into each sample.

use crate::divergence::Metric;
use crate::error::AttackError;
use crate::population::leave_one_out;
use crate::progress::{AttackProgressObserver, AttackStage};
use crate::runner::for_each_target;
use crate::settings::AttackSettings;
use crate::statistics::AttackInputs;
use itertools::Itertools;
use ndarray::{ArrayView2, Axis};

/// A shadow model of the pool together with the target sample restricted to that
/// model's training examples. Independent of the configuration being scanned.
struct ReferenceModel {
    model: usize,
    examples: Vec<usize>,
    target_sample: Vec<f64>,
}

fn gather(values: ArrayView2<'_, f64>, examples: &[usize]) -> Vec<f64> {
    values.select(Axis(0), examples).iter().copied().collect()
}

fn reference_models(
    inputs: &AttackInputs,
    target: usize,
) -> Result<Vec<ReferenceModel>, AttackError> {
    let observations = inputs.target().observations(target);
    leave_one_out(inputs.n_models(), target)
        .into_iter()
        .map(|model| {
            let examples = inputs.membership().training_examples(model);
            if examples.is_empty() {
                return Err(AttackError::NoOverlap { target, model });
            }
            let target_sample = gather(observations, &examples);
            Ok(ReferenceModel {
                model,
                examples,
                target_sample,
            })
        })
        .collect()
}

/// Mean divergence between target `target` and the pool at `configuration`.
fn column_distance(
    inputs: &AttackInputs,
    target: usize,
    configuration: usize,
    references: &[ReferenceModel],
    metric: Metric,
) -> Result<f64, AttackError> {
    let mut total = 0.0;
    for reference in references {
        let shadow_sample = gather(
            inputs.shadow().model_at(reference.model, configuration),
            &reference.examples,
        );
        total += metric
            .evaluate(&reference.target_sample, &shadow_sample)
            .map_err(|source| AttackError::Divergence {
                target,
                configuration,
                model: reference.model,
                source,
            })?;
    }
    let distance = total / references.len() as f64;
    if distance.is_nan() {
        return Err(AttackError::NonFiniteDistance {
            target,
            configuration,
        });
    }
    Ok(distance)
}

/// Distance of every shadow configuration to `target`'s distribution. The entry at
/// the target's own index is `+inf`.
pub fn column_distances(
    inputs: &AttackInputs,
    target: usize,
    metric: Metric,
) -> Result<Vec<f64>, AttackError> {
    let references = reference_models(inputs, target)?;
    (0..inputs.shadow().n_configurations())
        .map(|configuration| {
            if configuration == target {
                Ok(f64::INFINITY)
            } else {
                column_distance(inputs, target, configuration, &references, metric)
            }
        })
        .collect()
}

/// Index of the smallest distance; ties resolve to the lowest index. Returns `None`
/// for an empty slice or when any distance is NaN, since NaN has no place in the
/// ordering.
pub fn select_configuration(distances: &[f64]) -> Option<usize> {
    if distances.iter().any(|d| d.is_nan()) {
        return None;
    }
    distances
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(index, _)| index)
}

/// Selects, for every target model, the alternative shadow configuration whose
/// statistics best match the target's own distribution under `settings.metric`.
pub fn find_optimal_configurations(
    inputs: &AttackInputs,
    settings: &AttackSettings,
    progress: &dyn AttackProgressObserver,
) -> Result<Vec<usize>, AttackError> {
    let metric = settings.metric;
    log::info!(
        "Searching {} shadow configurations for {} target models using the {metric} metric.",
        inputs.shadow().n_configurations(),
        inputs.n_models()
    );
    let selection = for_each_target(
        inputs.n_models(),
        settings.parallel,
        AttackStage::ConfigurationSearch,
        progress,
        |target| {
            log::info!("Currently targeting model #{}", target + 1);
            let distances = column_distances(inputs, target, metric)?;
            log::debug!(
                "Target {target} distances: [{}]",
                distances.iter().map(|d| format!("{d:.4}")).join(", ")
            );
            let chosen = select_configuration(&distances)
                .ok_or(AttackError::NoUsableConfiguration { target })?;
            if chosen == target {
                return Err(AttackError::InvalidSelection {
                    target,
                    configuration: chosen,
                    n_configurations: distances.len(),
                });
            }
            log::debug!("Target {target} selects configuration {chosen}");
            Ok(chosen)
        },
    )?;
    log::info!("Selected configurations: [{}]", selection.iter().join(", "));
    Ok(selection)
}
