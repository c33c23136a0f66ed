#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]
//! Likelihood-ratio membership inference (LiRA) over precomputed per-example
//! statistics, with a fixed attack that reads every shadow model at its own
//! configuration and an adaptive attack that first searches for the shadow
//! configuration closest to each target.

pub mod data;
pub mod divergence;
pub mod error;
pub mod experiment;
pub mod likelihood;
pub mod optimizer;
pub mod pipeline;
pub mod population;
pub mod progress;
pub mod runner;
pub mod settings;
pub mod statistics;

pub use error::AttackError;
pub use pipeline::{AttackOutcome, AttackScores, OptimalConfigurations, run_attacks};
pub use settings::AttackSettings;
pub use statistics::AttackInputs;
