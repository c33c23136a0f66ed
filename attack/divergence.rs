//! # Divergence Library
//!
//! Closed-form comparisons between two empirical 1-D samples under a Gaussian
//! approximation. Each sample is summarised by its mean and its population standard
//! deviation (`ddof = 0`), and the metrics below are evaluated on those two
//! Gaussians.
//!
//! Every metric that divides by a standard deviation validates it before any
//! arithmetic happens, so a degenerate sample surfaces as a [`DivergenceError`]
//! instead of a NaN or an infinity leaking into an average.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised when a sample cannot support the requested metric.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DivergenceError {
    #[error("Cannot compare distributions: sample '{0}' is empty.")]
    EmptySample(SampleSide),
    #[error(
        "Sample '{side}' has standard deviation {std_dev}, but the {metric} metric requires strictly positive variance."
    )]
    DegenerateVariance {
        side: SampleSide,
        std_dev: f64,
        metric: Metric,
    },
    #[error("Unknown divergence metric '{0}'. Expected one of: kl, hellinger, carlini, jeffreys, mean-difference.")]
    UnknownMetric(String),
    #[error("The {metric} metric evaluated to {value}; the fitted Gaussians are too far apart to compare.")]
    NonFinite { metric: Metric, value: f64 },
}

/// Identifies which of the two compared samples an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleSide {
    P,
    Q,
}

impl fmt::Display for SampleSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::P => f.write_str("P"),
            Self::Q => f.write_str("Q"),
        }
    }
}

/// Direction of the Kullback-Leibler divergence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KlDirection {
    /// `KL(P || Q)`: `P` is treated as the true distribution.
    Forward,
    /// `KL(Q || P)`: `Q` is treated as the true distribution.
    Backward,
}

/// The distributional distance used to rank shadow configurations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Metric {
    /// Forward Gaussian KL divergence.
    #[default]
    Kl,
    Hellinger,
    /// Mean gap normalised by the sum of the standard deviations.
    Carlini,
    /// Symmetrised KL divergence.
    Jeffreys,
    MeanDifference,
}

impl Metric {
    pub const ALL: [Metric; 5] = [
        Metric::Kl,
        Metric::Hellinger,
        Metric::Carlini,
        Metric::Jeffreys,
        Metric::MeanDifference,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Kl => "kl",
            Self::Hellinger => "hellinger",
            Self::Carlini => "carlini",
            Self::Jeffreys => "jeffreys",
            Self::MeanDifference => "mean-difference",
        }
    }

    /// Whether the metric divides by a standard deviation and therefore needs
    /// non-degenerate samples on both sides.
    pub fn requires_variance(self) -> bool {
        !matches!(self, Self::MeanDifference)
    }

    /// Evaluates the metric between `p` and `q`.
    pub fn evaluate(self, p: &[f64], q: &[f64]) -> Result<f64, DivergenceError> {
        match self {
            Self::Kl => kl_divergence(p, q, KlDirection::Forward),
            Self::Hellinger => hellinger(p, q),
            Self::Carlini => carlini(p, q),
            Self::Jeffreys => jeffreys(p, q),
            Self::MeanDifference => mean_difference(p, q),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Metric {
    type Err = DivergenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        Metric::ALL
            .into_iter()
            .find(|metric| metric.name() == normalized)
            .ok_or_else(|| DivergenceError::UnknownMetric(s.to_string()))
    }
}

/// Mean and population standard deviation of a sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianFit {
    pub mean: f64,
    pub std_dev: f64,
}

impl GaussianFit {
    /// Fits a Gaussian to `sample`. The sample must be non-empty.
    pub fn from_sample(sample: &[f64], side: SampleSide) -> Result<Self, DivergenceError> {
        if sample.is_empty() {
            return Err(DivergenceError::EmptySample(side));
        }
        let n = sample.len() as f64;
        let mean = sample.iter().sum::<f64>() / n;
        let variance = sample.iter().map(|&x| (x - mean) * (x - mean)).sum::<f64>() / n;
        Ok(Self {
            mean,
            std_dev: variance.sqrt(),
        })
    }

    pub fn variance(&self) -> f64 {
        self.std_dev * self.std_dev
    }
}

fn fit_pair(p: &[f64], q: &[f64]) -> Result<(GaussianFit, GaussianFit), DivergenceError> {
    Ok((
        GaussianFit::from_sample(p, SampleSide::P)?,
        GaussianFit::from_sample(q, SampleSide::Q)?,
    ))
}

fn finite(metric: Metric, value: f64) -> Result<f64, DivergenceError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(DivergenceError::NonFinite { metric, value })
    }
}

fn require_positive(
    fit: &GaussianFit,
    side: SampleSide,
    metric: Metric,
) -> Result<(), DivergenceError> {
    if fit.std_dev > 0.0 && fit.std_dev.is_finite() {
        Ok(())
    } else {
        Err(DivergenceError::DegenerateVariance {
            side,
            std_dev: fit.std_dev,
            metric,
        })
    }
}

/// Hellinger distance between the Gaussians fitted to `p` and `q`. Always in `[0, 1]`.
pub fn hellinger(p: &[f64], q: &[f64]) -> Result<f64, DivergenceError> {
    let (fp, fq) = fit_pair(p, q)?;
    require_positive(&fp, SampleSide::P, Metric::Hellinger)?;
    require_positive(&fq, SampleSide::Q, Metric::Hellinger)?;

    let variance_sum = fp.variance() + fq.variance();
    let gap = fp.mean - fq.mean;
    let base = (2.0 * fp.std_dev * fq.std_dev / variance_sum).sqrt();
    let decay = (-(gap * gap) / (4.0 * variance_sum)).exp();
    // Rounding can push the coefficient a hair above one.
    let squared = (1.0 - base * decay).clamp(0.0, 1.0);
    Ok(squared.sqrt())
}

/// Absolute mean gap divided by the sum of standard deviations.
pub fn carlini(p: &[f64], q: &[f64]) -> Result<f64, DivergenceError> {
    let (fp, fq) = fit_pair(p, q)?;
    let spread = fp.std_dev + fq.std_dev;
    if spread.is_nan() || spread <= 0.0 {
        return Err(DivergenceError::DegenerateVariance {
            side: if fp.std_dev > 0.0 {
                SampleSide::Q
            } else {
                SampleSide::P
            },
            std_dev: 0.0,
            metric: Metric::Carlini,
        });
    }
    finite(Metric::Carlini, (fp.mean - fq.mean).abs() / spread)
}

/// Absolute difference of the sample means.
pub fn mean_difference(p: &[f64], q: &[f64]) -> Result<f64, DivergenceError> {
    let (fp, fq) = fit_pair(p, q)?;
    finite(Metric::MeanDifference, (fp.mean - fq.mean).abs())
}

/// Closed-form KL divergence between the Gaussians fitted to `p` and `q`.
pub fn kl_divergence(p: &[f64], q: &[f64], direction: KlDirection) -> Result<f64, DivergenceError> {
    let (fp, fq) = fit_pair(p, q)?;
    require_positive(&fp, SampleSide::P, Metric::Kl)?;
    require_positive(&fq, SampleSide::Q, Metric::Kl)?;
    let value = match direction {
        KlDirection::Forward => gaussian_kl(&fp, &fq),
        KlDirection::Backward => gaussian_kl(&fq, &fp),
    };
    finite(Metric::Kl, value)
}

/// Jeffreys divergence: forward plus backward KL.
pub fn jeffreys(p: &[f64], q: &[f64]) -> Result<f64, DivergenceError> {
    let (fp, fq) = fit_pair(p, q)?;
    require_positive(&fp, SampleSide::P, Metric::Jeffreys)?;
    require_positive(&fq, SampleSide::Q, Metric::Jeffreys)?;
    finite(Metric::Jeffreys, gaussian_kl(&fp, &fq) + gaussian_kl(&fq, &fp))
}

/// `KL(truth || approx)` for two Gaussians with positive variance. The log term is
/// taken as a difference of logs so that a variance ratio overflowing to `inf`
/// yields `inf` rather than `inf - inf`.
fn gaussian_kl(truth: &GaussianFit, approx: &GaussianFit) -> f64 {
    let gap = truth.mean - approx.mean;
    let log_ratio = 2.0 * (truth.std_dev.ln() - approx.std_dev.ln());
    0.5 * ((gap * gap + truth.variance()) / approx.variance() - log_ratio - 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const P: [f64; 6] = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
    const Q: [f64; 5] = [2.5, 4.0, 3.5, 7.0, 8.0];

    #[test]
    fn kl_of_a_sample_with_itself_is_zero() {
        for direction in [KlDirection::Forward, KlDirection::Backward] {
            assert_abs_diff_eq!(kl_divergence(&P, &P, direction).unwrap(), 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn kl_matches_closed_form() {
        // N(0, 1) against N(1, 2^2): 0.5 * ((1 + 1) / 4 - ln(1 / 4) - 1)
        let p = [-1.0, 1.0];
        let q = [-1.0, 3.0];
        let expected = 0.5 * (0.5 - (0.25f64).ln() - 1.0);
        assert_abs_diff_eq!(
            kl_divergence(&p, &q, KlDirection::Forward).unwrap(),
            expected,
            epsilon = 1e-12
        );
        let backward = 0.5 * ((1.0 + 4.0) / 1.0 - (4.0f64).ln() - 1.0);
        assert_abs_diff_eq!(
            kl_divergence(&p, &q, KlDirection::Backward).unwrap(),
            backward,
            epsilon = 1e-12
        );
    }

    #[test]
    fn jeffreys_is_symmetric() {
        let pq = jeffreys(&P, &Q).unwrap();
        let qp = jeffreys(&Q, &P).unwrap();
        assert_abs_diff_eq!(pq, qp, epsilon = 1e-12);
        let forward = kl_divergence(&P, &Q, KlDirection::Forward).unwrap();
        let backward = kl_divergence(&P, &Q, KlDirection::Backward).unwrap();
        assert_abs_diff_eq!(pq, forward + backward, epsilon = 1e-12);
    }

    #[test]
    fn hellinger_stays_in_unit_interval() {
        let far: Vec<f64> = P.iter().map(|x| x + 1.0e4).collect();
        let cases: [(&[f64], &[f64]); 3] = [(&P, &P), (&P, &Q), (&P, &far)];
        for (p, q) in cases {
            let h = hellinger(p, q).unwrap();
            assert!((0.0..=1.0).contains(&h), "hellinger out of range: {h}");
        }
        assert_abs_diff_eq!(hellinger(&P, &P).unwrap(), 0.0, epsilon = 1e-7);
        assert_abs_diff_eq!(hellinger(&P, &far).unwrap(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn hellinger_grows_with_mean_gap() {
        let near: Vec<f64> = P.iter().map(|x| x + 0.5).collect();
        let farther: Vec<f64> = P.iter().map(|x| x + 3.0).collect();
        assert!(hellinger(&P, &near).unwrap() < hellinger(&P, &farther).unwrap());
    }

    #[test]
    fn carlini_and_mean_difference() {
        let p = [0.0, 2.0]; // mean 1, sd 1
        let q = [4.0, 8.0]; // mean 6, sd 2
        assert_abs_diff_eq!(mean_difference(&p, &q).unwrap(), 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(carlini(&p, &q).unwrap(), 5.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn degenerate_variance_is_rejected() {
        let constant = [3.0, 3.0, 3.0];
        match kl_divergence(&P, &constant, KlDirection::Forward) {
            Err(DivergenceError::DegenerateVariance { side, metric, .. }) => {
                assert_eq!(side, SampleSide::Q);
                assert_eq!(metric, Metric::Kl);
            }
            other => panic!("Expected DegenerateVariance, got {other:?}"),
        }
        assert!(jeffreys(&constant, &P).is_err());
        assert!(hellinger(&constant, &P).is_err());
        assert!(carlini(&constant, &constant).is_err());
        // Mean difference does not need any spread.
        assert_abs_diff_eq!(
            mean_difference(&constant, &constant).unwrap(),
            0.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn empty_samples_are_rejected() {
        for metric in Metric::ALL {
            assert_eq!(
                metric.evaluate(&[], &P),
                Err(DivergenceError::EmptySample(SampleSide::P))
            );
        }
    }

    #[test]
    fn metric_names_round_trip_through_from_str() {
        for metric in Metric::ALL {
            assert_eq!(metric.name().parse::<Metric>().unwrap(), metric);
        }
        assert_eq!("KL".parse::<Metric>().unwrap(), Metric::Kl);
        assert_eq!("mean_difference".parse::<Metric>().unwrap(), Metric::MeanDifference);
        assert!(matches!(
            "bhattacharyya".parse::<Metric>(),
            Err(DivergenceError::UnknownMetric(_))
        ));
    }

    #[test]
    fn metric_dispatch_matches_free_functions() {
        assert_eq!(
            Metric::Kl.evaluate(&P, &Q).unwrap(),
            kl_divergence(&P, &Q, KlDirection::Forward).unwrap()
        );
        assert_eq!(Metric::Jeffreys.evaluate(&P, &Q).unwrap(), jeffreys(&P, &Q).unwrap());
        assert_eq!(Metric::Hellinger.evaluate(&P, &Q).unwrap(), hellinger(&P, &Q).unwrap());
        assert_eq!(Metric::Carlini.evaluate(&P, &Q).unwrap(), carlini(&P, &Q).unwrap());
        assert_eq!(
            Metric::MeanDifference.evaluate(&P, &Q).unwrap(),
            mean_difference(&P, &Q).unwrap()
        );
    }

    #[test]
    fn overflowing_variance_ratio_is_an_error_not_nan() {
        let wide = [-1e150, 1e150];
        let narrow = [0.0, 2e-5];
        let err = kl_divergence(&wide, &narrow, KlDirection::Forward).unwrap_err();
        assert!(matches!(
            err,
            DivergenceError::NonFinite {
                metric: Metric::Kl,
                ..
            }
        ));
        assert!(matches!(
            Metric::Jeffreys.evaluate(&wide, &narrow),
            Err(DivergenceError::NonFinite { .. })
        ));
        // The reverse direction is small and stays finite.
        assert!(kl_divergence(&wide, &narrow, KlDirection::Backward).unwrap().is_finite());
        // Hellinger is bounded and needs no guard.
        assert_abs_diff_eq!(hellinger(&wide, &narrow).unwrap(), 1.0, epsilon = 1e-6);
    }
}
