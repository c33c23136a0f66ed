use std::fmt;

/// Stages reported while running an attack.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttackStage {
    FixedAttack,
    ConfigurationSearch,
    AdaptiveAttack,
}

impl AttackStage {
    pub fn describe(self) -> &'static str {
        match self {
            Self::FixedAttack => "ACC-LiRA scoring",
            Self::ConfigurationSearch => "shadow configuration search",
            Self::AdaptiveAttack => "KL-LiRA scoring",
        }
    }
}

impl fmt::Display for AttackStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Observer for per-target progress. Targets may finish out of order and from
/// several worker threads, so every callback takes `&self`.
pub trait AttackProgressObserver: Sync {
    fn on_stage_start(&self, stage: AttackStage, total_targets: usize) {
        let _ = (stage, total_targets);
    }
    fn on_target_finished(&self, stage: AttackStage, target: usize) {
        let _ = (stage, target);
    }
    fn on_stage_finish(&self, stage: AttackStage) {
        let _ = stage;
    }
}

#[derive(Default)]
pub struct NoopAttackProgress;

impl AttackProgressObserver for NoopAttackProgress {}
