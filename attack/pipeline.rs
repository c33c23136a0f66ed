//! The full evaluation: ACC-LiRA, the configuration search, and KL-LiRA, run over
//! the same validated inputs.

use crate::error::AttackError;
use crate::optimizer::find_optimal_configurations;
use crate::progress::AttackProgressObserver;
use crate::runner::{ScoreRecord, run_adaptive_attack, run_fixed_attack};
use crate::settings::AttackSettings;
use crate::statistics::AttackInputs;
use serde::{Deserialize, Serialize};

/// The two score records, keyed like the persisted dictionary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttackScores {
    #[serde(rename = "ACC-LiRA")]
    pub acc_lira: ScoreRecord,
    #[serde(rename = "KL-LiRA")]
    pub kl_lira: ScoreRecord,
}

/// The configuration selected for every target model by the adaptive attack.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimalConfigurations {
    #[serde(rename = "KL-LiRA")]
    pub kl_lira: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttackOutcome {
    pub scores: AttackScores,
    pub optimal: OptimalConfigurations,
}

/// Runs both attacks. Any failure aborts before anything is returned.
pub fn run_attacks(
    inputs: &AttackInputs,
    settings: &AttackSettings,
    progress: &dyn AttackProgressObserver,
) -> Result<AttackOutcome, AttackError> {
    let acc_lira = run_fixed_attack(inputs, settings, progress)?;
    let selection = find_optimal_configurations(inputs, settings, progress)?;
    let kl_lira = run_adaptive_attack(inputs, &selection, settings, progress)?;
    Ok(AttackOutcome {
        scores: AttackScores { acc_lira, kl_lira },
        optimal: OptimalConfigurations { kl_lira: selection },
    })
}
