//! # Experiment Layout
//!
//! Resolves an experiment selector into the directories and file names the
//! statistics were stored under. Resolution is pure and happens before any file is
//! touched, so an invalid selector aborts the run with nothing read or written.
//!
//! Layout: `<results_dir>/Seed=<seed>/Run_<n>/experiment_<exp_id>/`. Shadow
//! statistics live in the training-run directory, target statistics and the
//! membership matrix in the evaluation-run directory, and both outputs are written
//! next to the target statistics.

use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Few-shot setting whose shadow and target statistics come from runs 1 and 2.
const FULL_SHOT_EXAMPLES_PER_CLASS: i64 = 100;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExperimentError {
    #[error("Invalid experiment option {0}: expected an experiment id between 1 and 4.")]
    InvalidExperiment(u32),
    #[error("At least one model is required, got num_models = {0}.")]
    NoModels(usize),
}

/// Which feature-extractor parameters were learned when the statistics were produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LearnableParams {
    #[default]
    None,
    Film,
}

impl fmt::Display for LearnableParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::Film => f.write_str("film"),
        }
    }
}

/// Privacy budget the target models were trained under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetEpsilon {
    Infinite,
    Eight,
    Two,
    One,
}

impl TargetEpsilon {
    pub fn from_experiment(exp_id: u32) -> Result<Self, ExperimentError> {
        match exp_id {
            1 => Ok(Self::Infinite),
            2 => Ok(Self::Eight),
            3 => Ok(Self::Two),
            4 => Ok(Self::One),
            other => Err(ExperimentError::InvalidExperiment(other)),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Infinite => "inf",
            Self::Eight => "8",
            Self::Two => "2",
            Self::One => "1",
        }
    }
}

impl fmt::Display for TargetEpsilon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// User-facing description of one experiment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentSpec {
    pub results_dir: PathBuf,
    pub seed: u64,
    pub exp_id: u32,
    /// `-1` selects the entire training set.
    pub examples_per_class: i64,
    pub learnable_params: LearnableParams,
    pub num_models: usize,
}

/// Fully resolved paths of one experiment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentLayout {
    spec: ExperimentSpec,
    epsilon: TargetEpsilon,
    shadow_stats_dir: PathBuf,
    target_stats_dir: PathBuf,
}

impl ExperimentLayout {
    pub fn resolve(spec: ExperimentSpec) -> Result<Self, ExperimentError> {
        let epsilon = TargetEpsilon::from_experiment(spec.exp_id)?;
        if spec.num_models == 0 {
            return Err(ExperimentError::NoModels(spec.num_models));
        }
        let (shadow_run, target_run) = run_ids(spec.examples_per_class);
        let seed_dir = spec.results_dir.join(format!("Seed={}", spec.seed));
        let experiment_dir = format!("experiment_{}", spec.exp_id);
        let shadow_stats_dir = seed_dir
            .join(format!("Run_{shadow_run}"))
            .join(&experiment_dir);
        let target_stats_dir = seed_dir
            .join(format!("Run_{target_run}"))
            .join(&experiment_dir);
        Ok(Self {
            spec,
            epsilon,
            shadow_stats_dir,
            target_stats_dir,
        })
    }

    pub fn spec(&self) -> &ExperimentSpec {
        &self.spec
    }

    pub fn epsilon(&self) -> TargetEpsilon {
        self.epsilon
    }

    pub fn shadow_stats_dir(&self) -> &Path {
        &self.shadow_stats_dir
    }

    pub fn target_stats_dir(&self) -> &Path {
        &self.target_stats_dir
    }

    /// The membership matrix is stored with the target statistics.
    pub fn indices_dir(&self) -> &Path {
        &self.target_stats_dir
    }

    fn tag(&self) -> String {
        format!(
            "{}_{}_{}",
            self.spec.learnable_params, self.spec.examples_per_class, self.epsilon
        )
    }

    fn stats_file_name(&self) -> String {
        format!("stat_{}_r_0_to_{}.json", self.tag(), self.spec.num_models)
    }

    pub fn target_stats_path(&self) -> PathBuf {
        self.target_stats_dir.join(self.stats_file_name())
    }

    pub fn shadow_stats_path(&self) -> PathBuf {
        self.shadow_stats_dir.join(self.stats_file_name())
    }

    pub fn membership_path(&self) -> PathBuf {
        self.indices_dir()
            .join(format!("in_indices_{}.json", self.tag()))
    }

    pub fn scores_path(&self) -> PathBuf {
        self.target_stats_dir
            .join(format!("scores_{}.json", self.tag()))
    }

    pub fn optimal_configurations_path(&self) -> PathBuf {
        self.target_stats_dir
            .join(format!("opt_shadow_hypers_{}.json", self.tag()))
    }
}

/// `(shadow run, target run)` directory numbers for a few-shot setting.
pub fn run_ids(examples_per_class: i64) -> (u32, u32) {
    if examples_per_class == FULL_SHOT_EXAMPLES_PER_CLASS {
        (1, 2)
    } else {
        (3, 4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(exp_id: u32, examples_per_class: i64) -> ExperimentSpec {
        ExperimentSpec {
            results_dir: PathBuf::from("/results"),
            seed: 3,
            exp_id,
            examples_per_class,
            learnable_params: LearnableParams::Film,
            num_models: 65,
        }
    }

    #[test]
    fn experiment_ids_map_to_privacy_budgets() {
        let labels: Vec<&str> = (1..=4)
            .map(|id| TargetEpsilon::from_experiment(id).unwrap().label())
            .collect();
        assert_eq!(labels, vec!["inf", "8", "2", "1"]);
        assert_eq!(
            TargetEpsilon::from_experiment(5),
            Err(ExperimentError::InvalidExperiment(5))
        );
        assert_eq!(
            TargetEpsilon::from_experiment(0),
            Err(ExperimentError::InvalidExperiment(0))
        );
    }

    #[test]
    fn hundred_shot_uses_first_runs() {
        assert_eq!(run_ids(100), (1, 2));
        assert_eq!(run_ids(10), (3, 4));
        assert_eq!(run_ids(-1), (3, 4));
    }

    #[test]
    fn layout_paths_follow_naming_convention() {
        let layout = ExperimentLayout::resolve(spec(2, 100)).unwrap();
        assert_eq!(
            layout.shadow_stats_path(),
            PathBuf::from("/results/Seed=3/Run_1/experiment_2/stat_film_100_8_r_0_to_65.json")
        );
        assert_eq!(
            layout.target_stats_path(),
            PathBuf::from("/results/Seed=3/Run_2/experiment_2/stat_film_100_8_r_0_to_65.json")
        );
        assert_eq!(
            layout.membership_path(),
            PathBuf::from("/results/Seed=3/Run_2/experiment_2/in_indices_film_100_8.json")
        );
        assert_eq!(
            layout.scores_path(),
            PathBuf::from("/results/Seed=3/Run_2/experiment_2/scores_film_100_8.json")
        );
        assert_eq!(
            layout.optimal_configurations_path(),
            PathBuf::from("/results/Seed=3/Run_2/experiment_2/opt_shadow_hypers_film_100_8.json")
        );
    }

    #[test]
    fn invalid_selector_fails_before_any_path_is_built() {
        assert_eq!(
            ExperimentLayout::resolve(spec(9, 10)).unwrap_err(),
            ExperimentError::InvalidExperiment(9)
        );
        let mut no_models = spec(1, 10);
        no_models.num_models = 0;
        assert_eq!(
            ExperimentLayout::resolve(no_models).unwrap_err(),
            ExperimentError::NoModels(0)
        );
    }
}
