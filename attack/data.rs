//! # Experiment Files
//!
//! Reads the statistic tensors and the membership matrix of one experiment and
//! writes its two outputs. Tensors use `ndarray`'s serde representation, the
//! membership matrix is a JSON list of boolean rows, and both outputs are plain
//! JSON objects keyed by attack name.

use crate::experiment::ExperimentLayout;
use crate::pipeline::{AttackScores, OptimalConfigurations};
use crate::statistics::{
    AttackInputs, MembershipMatrix, ShadowStatistics, ShapeError, TargetStatistics,
};
use ndarray::ArrayD;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataError {
    #[error("Could not access '{}': {source}", path.display())]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("'{}' is not valid JSON for the expected content: {source}", path.display())]
    JsonError {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("'{}' has an unusable shape: {source}", path.display())]
    InvalidShape {
        path: PathBuf,
        #[source]
        source: ShapeError,
    },
    #[error("Experiment inputs do not line up: {0}")]
    Misaligned(#[from] ShapeError),
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, DataError> {
    let file = File::open(path).map_err(|source| DataError::IoError {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| DataError::JsonError {
        path: path.to_path_buf(),
        source,
    })
}

/// Serializes `value` as JSON to `path`, replacing any existing file.
pub fn write_json<T: Serialize + ?Sized>(value: &T, path: &Path) -> Result<(), DataError> {
    let io_error = |source: std::io::Error| DataError::IoError {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(io_error)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, value).map_err(|source| DataError::JsonError {
        path: path.to_path_buf(),
        source,
    })?;
    writer.flush().map_err(io_error)
}

fn shape_error(path: &Path) -> impl FnOnce(ShapeError) -> DataError + '_ {
    move |source| DataError::InvalidShape {
        path: path.to_path_buf(),
        source,
    }
}

pub fn load_target_statistics(path: &Path) -> Result<TargetStatistics, DataError> {
    let values: ArrayD<f64> = read_json(path)?;
    TargetStatistics::from_dyn(values).map_err(shape_error(path))
}

pub fn load_shadow_statistics(path: &Path) -> Result<ShadowStatistics, DataError> {
    let values: ArrayD<f64> = read_json(path)?;
    ShadowStatistics::from_dyn(values).map_err(shape_error(path))
}

/// Loads the membership rows and keeps the first `num_models` of them.
pub fn load_membership(path: &Path, num_models: usize) -> Result<MembershipMatrix, DataError> {
    let rows: Vec<Vec<bool>> = read_json(path)?;
    MembershipMatrix::from_rows(&rows)
        .and_then(|membership| membership.truncated(num_models))
        .map_err(shape_error(path))
}

/// Loads and validates everything an attack run needs.
pub fn load_experiment_inputs(layout: &ExperimentLayout) -> Result<AttackInputs, DataError> {
    let target_path = layout.target_stats_path();
    log::info!("Loading target statistics from {}", target_path.display());
    let target = load_target_statistics(&target_path)?;

    let shadow_path = layout.shadow_stats_path();
    log::info!("Loading shadow statistics from {}", shadow_path.display());
    let shadow = load_shadow_statistics(&shadow_path)?;

    let membership_path = layout.membership_path();
    log::info!("Loading membership matrix from {}", membership_path.display());
    let membership = load_membership(&membership_path, layout.spec().num_models)?;

    Ok(AttackInputs::new(target, shadow, membership)?)
}

pub fn save_scores(scores: &AttackScores, path: &Path) -> Result<(), DataError> {
    write_json(scores, path)?;
    log::info!("Scores saved to {}", path.display());
    Ok(())
}

pub fn save_optimal_configurations(
    optimal: &OptimalConfigurations,
    path: &Path,
) -> Result<(), DataError> {
    write_json(optimal, path)?;
    log::info!("Selected configurations saved to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::ScoreRecord;
    use ndarray::{Array3, Array4, IxDyn};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn statistics_round_trip_through_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stat.json");
        let values = Array3::from_shape_fn((2, 3, 2), |(m, e, r)| (m * 6 + e * 2 + r) as f64 * 0.5);
        write_json(&values.clone().into_dyn(), &path).unwrap();

        let loaded = load_target_statistics(&path).unwrap();
        assert!(matches!(loaded, TargetStatistics::PerModel(_)));
        assert_eq!(loaded.n_models(), 2);
        assert_eq!(loaded.observations(1), values.index_axis(ndarray::Axis(0), 1));
    }

    #[test]
    fn shadow_statistics_must_be_four_dimensional() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shadow.json");
        write_json(&ArrayD::<f64>::zeros(IxDyn(&[2, 3, 4])), &path).unwrap();
        let err = load_shadow_statistics(&path).unwrap_err();
        assert!(matches!(
            err,
            DataError::InvalidShape {
                source: ShapeError::WrongDimensionality {
                    expected: "4",
                    found: 3,
                    ..
                },
                ..
            }
        ));

        let valid = dir.path().join("shadow4.json");
        write_json(&Array4::<f64>::ones((2, 2, 3, 1)).into_dyn(), &valid).unwrap();
        assert_eq!(load_shadow_statistics(&valid).unwrap().n_configurations(), 2);
    }

    #[test]
    fn membership_is_truncated_to_requested_models() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("in_indices.json");
        fs::write(&path, "[[true,false],[false,true],[true,true]]").unwrap();

        let membership = load_membership(&path, 2).unwrap();
        assert_eq!(membership.n_models(), 2);
        assert_eq!(membership.n_examples(), 2);
        assert!(membership.is_member(1, 1));

        let err = load_membership(&path, 4).unwrap_err();
        assert!(matches!(
            err,
            DataError::InvalidShape {
                source: ShapeError::NotEnoughMembershipRows {
                    requested: 4,
                    available: 3
                },
                ..
            }
        ));
    }

    #[test]
    fn ragged_membership_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ragged.json");
        fs::write(&path, "[[true,false],[true]]").unwrap();
        assert!(matches!(
            load_membership(&path, 2),
            Err(DataError::InvalidShape {
                source: ShapeError::RaggedMembership { row: 1, .. },
                ..
            })
        ));
    }

    #[test]
    fn missing_and_malformed_files_are_reported_with_their_path() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        let err = load_target_statistics(&missing).unwrap_err();
        assert!(matches!(&err, DataError::IoError { path, .. } if path == &missing));

        let garbage = dir.path().join("garbage.json");
        fs::write(&garbage, "{not json").unwrap();
        assert!(matches!(
            load_membership(&garbage, 1),
            Err(DataError::JsonError { .. })
        ));
    }

    #[test]
    fn scores_use_attack_names_as_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scores.json");
        let scores = AttackScores {
            acc_lira: ScoreRecord {
                y_true: vec![0, 1],
                y_score: vec![1.5, -0.5],
            },
            kl_lira: ScoreRecord {
                y_true: vec![1, 0],
                y_score: vec![-2.0, 0.25],
            },
        };
        save_scores(&scores, &path).unwrap();

        let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["ACC-LiRA"]["y_true"], serde_json::json!([0, 1]));
        assert_eq!(raw["KL-LiRA"]["y_score"], serde_json::json!([-2.0, 0.25]));

        let optimal_path = dir.path().join("opt.json");
        save_optimal_configurations(
            &OptimalConfigurations {
                kl_lira: vec![2, 0, 1],
            },
            &optimal_path,
        )
        .unwrap();
        assert_eq!(
            fs::read_to_string(&optimal_path).unwrap(),
            r#"{"KL-LiRA":[2,0,1]}"#
        );
    }
}
