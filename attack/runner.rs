//! # Attack Runners
//!
//! Both attacks treat every model in turn as the target, build leave-one-out
//! reference populations from the remaining shadow models and score the target's
//! observations against them:
//!
//! - ACC-LiRA (`run_fixed_attack`) reads every shadow model at its own configuration.
//! - KL-LiRA (`run_adaptive_attack`) reads every shadow model at the configuration
//!   selected for the target by [`crate::optimizer::find_optimal_configurations`].
//!
//! Each target produces an immutable [`TargetScores`]; the records are concatenated
//! by target index afterwards, so sequential and parallel runs are identical.
//!
//! Labels follow the inverted convention of the reference experiments: `0` marks a
//! member ("in") and `1` a non-member ("out"), while a higher score means more
//! evidence of membership. ROC consumers must treat label `0` as the positive class.

use crate::error::AttackError;
use crate::likelihood::{VarianceMode, score_lira};
use crate::population::{PopulationError, assemble_for_target};
use crate::progress::{AttackProgressObserver, AttackStage};
use crate::settings::AttackSettings;
use crate::statistics::AttackInputs;
use ndarray::Array1;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Ground-truth label of a training member.
pub const MEMBER_LABEL: u8 = 0;
/// Ground-truth label of a non-member.
pub const NON_MEMBER_LABEL: u8 = 1;

pub fn membership_label(member: bool) -> u8 {
    if member { MEMBER_LABEL } else { NON_MEMBER_LABEL }
}

/// Labels and scores for every example of one target model, in example order.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetScores {
    pub target: usize,
    pub labels: Vec<u8>,
    pub scores: Array1<f64>,
}

/// Labels and scores concatenated over all target models, target-major.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub y_true: Vec<u8>,
    pub y_score: Vec<f64>,
}

impl ScoreRecord {
    /// Concatenates per-target results. `parts` must already be in target order.
    pub fn from_targets(parts: Vec<TargetScores>) -> Self {
        let total = parts.iter().map(|part| part.labels.len()).sum();
        let mut record = Self {
            y_true: Vec::with_capacity(total),
            y_score: Vec::with_capacity(total),
        };
        for part in parts {
            record.y_true.extend(part.labels);
            record.y_score.extend(part.scores.iter());
        }
        record
    }

    pub fn len(&self) -> usize {
        self.y_true.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y_true.is_empty()
    }
}

/// Runs `task` for every target index and returns the results in target order.
pub(crate) fn for_each_target<T, F>(
    n_targets: usize,
    parallel: bool,
    stage: AttackStage,
    progress: &dyn AttackProgressObserver,
    task: F,
) -> Result<Vec<T>, AttackError>
where
    T: Send,
    F: Fn(usize) -> Result<T, AttackError> + Sync,
{
    progress.on_stage_start(stage, n_targets);
    let run_one = |target: usize| {
        let result = task(target);
        progress.on_target_finished(stage, target);
        result
    };
    let results = if parallel {
        (0..n_targets).into_par_iter().map(run_one).collect()
    } else {
        (0..n_targets).map(run_one).collect()
    };
    progress.on_stage_finish(stage);
    results
}

/// Scores one target against the leave-one-out pool read at `configuration`
/// (`None` reads each pool model at its own configuration).
fn score_target(
    inputs: &AttackInputs,
    target: usize,
    configuration: Option<usize>,
    variance: VarianceMode,
) -> Result<TargetScores, AttackError> {
    let wrap = |source: PopulationError| AttackError::Population { target, source };
    let populations =
        assemble_for_target(inputs.shadow(), inputs.membership(), target, configuration)
            .map_err(wrap)?;

    let scores = score_lira(inputs.target().observations(target), &populations, variance)
        .map_err(|source| AttackError::Scoring { target, source })?;
    let labels = inputs
        .membership()
        .row(target)
        .iter()
        .map(|&member| membership_label(member))
        .collect();

    Ok(TargetScores {
        target,
        labels,
        scores,
    })
}

/// ACC-LiRA: every target is scored against shadow models at their own
/// (diagonal) configuration.
pub fn run_fixed_attack(
    inputs: &AttackInputs,
    settings: &AttackSettings,
    progress: &dyn AttackProgressObserver,
) -> Result<ScoreRecord, AttackError> {
    let variance = settings.variance_mode();
    log::info!(
        "Running ACC-LiRA over {} target models ({:?} variance).",
        inputs.n_models(),
        variance
    );
    let parts = for_each_target(
        inputs.n_models(),
        settings.parallel,
        AttackStage::FixedAttack,
        progress,
        |target| {
            log::info!("Target model is #{target}");
            score_target(inputs, target, None, variance)
        },
    )?;
    Ok(ScoreRecord::from_targets(parts))
}

/// KL-LiRA: every target is scored against shadow models at the configuration
/// selected for it.
pub fn run_adaptive_attack(
    inputs: &AttackInputs,
    selection: &[usize],
    settings: &AttackSettings,
    progress: &dyn AttackProgressObserver,
) -> Result<ScoreRecord, AttackError> {
    let n_models = inputs.n_models();
    if selection.len() != n_models {
        return Err(AttackError::SelectionLength {
            expected: n_models,
            found: selection.len(),
        });
    }
    let n_configurations = inputs.shadow().n_configurations();
    if let Some((target, &configuration)) = selection
        .iter()
        .enumerate()
        .find(|&(target, &configuration)| configuration >= n_configurations || configuration == target)
    {
        return Err(AttackError::InvalidSelection {
            target,
            configuration,
            n_configurations,
        });
    }

    let variance = settings.variance_mode();
    log::info!("Running KL-LiRA over {n_models} target models ({variance:?} variance).");
    let parts = for_each_target(
        n_models,
        settings.parallel,
        AttackStage::AdaptiveAttack,
        progress,
        |target| {
            log::info!("Target model M[{target}][{target}] against configuration {}", selection[target]);
            score_target(inputs, target, Some(selection[target]), variance)
        },
    )?;
    Ok(ScoreRecord::from_targets(parts))
}
