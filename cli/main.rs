#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process;

use lira::data::{load_experiment_inputs, save_optimal_configurations, save_scores};
use lira::divergence::Metric;
use lira::experiment::{ExperimentLayout, ExperimentSpec, LearnableParams};
use lira::progress::{AttackProgressObserver, AttackStage};
use lira::{AttackSettings, run_attacks};

#[derive(Clone, Copy, ValueEnum)]
pub enum LearnableParamsCli {
    None,
    Film,
}

impl From<LearnableParamsCli> for LearnableParams {
    fn from(value: LearnableParamsCli) -> Self {
        match value {
            LearnableParamsCli::None => LearnableParams::None,
            LearnableParamsCli::Film => LearnableParams::Film,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum MetricCli {
    Kl,
    Hellinger,
    Carlini,
    Jeffreys,
    MeanDifference,
}

impl From<MetricCli> for Metric {
    fn from(value: MetricCli) -> Self {
        match value {
            MetricCli::Kl => Metric::Kl,
            MetricCli::Hellinger => Metric::Hellinger,
            MetricCli::Carlini => Metric::Carlini,
            MetricCli::Jeffreys => Metric::Jeffreys,
            MetricCli::MeanDifference => Metric::MeanDifference,
        }
    }
}

/// Attack options shared by every subcommand that resolves settings.
#[derive(Args)]
pub struct SettingsArgs {
    /// TOML file with attack settings; flags below override its values
    #[arg(long, value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// Divergence used to rank shadow configurations
    #[arg(long, value_enum)]
    pub metric: Option<MetricCli>,

    /// Score against one pooled variance per population instead of per-example variances
    #[arg(long)]
    pub global_variance: bool,

    /// Process target models one after another instead of on the thread pool
    #[arg(long)]
    pub sequential: bool,
}

impl SettingsArgs {
    fn resolve(&self) -> Result<AttackSettings, Box<dyn std::error::Error>> {
        let mut settings = match &self.settings {
            Some(path) => AttackSettings::load(path)?,
            None => AttackSettings::default(),
        };
        if let Some(metric) = self.metric {
            settings.metric = metric.into();
        }
        if self.global_variance {
            settings.use_global_variance = true;
        }
        if self.sequential {
            settings.parallel = false;
        }
        Ok(settings)
    }
}

#[derive(Args)]
pub struct AttackArgs {
    /// Directory holding the `Seed=<seed>` result trees
    #[arg(long, value_name = "DIR")]
    pub results_dir: PathBuf,

    /// Seed of the training runs that produced the statistics
    #[arg(long, default_value = "0")]
    pub seed: u64,

    /// Experiment selector: 1 = eps inf, 2 = eps 8, 3 = eps 2, 4 = eps 1
    #[arg(long)]
    pub exp_id: u32,

    /// Shots per class; -1 for the entire training set
    #[arg(long, allow_negative_numbers = true)]
    pub examples_per_class: i64,

    /// Which feature-extractor parameters were learned
    #[arg(long, value_enum, default_value_t = LearnableParamsCli::None)]
    pub learnable_params: LearnableParamsCli,

    /// Number of models to attack
    #[arg(long, default_value = "257")]
    pub num_models: usize,

    #[command(flatten)]
    pub attack: SettingsArgs,
}

#[derive(Parser)]
#[command(
    name = "lira",
    about = "Likelihood-ratio membership inference over precomputed model statistics",
    long_about = "Runs ACC-LiRA and KL-LiRA against every target model of an experiment and \
                 writes the membership scores and the selected shadow configurations."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Score every target model of one experiment
    Attack(AttackArgs),
    /// Write the resolved attack settings to a TOML file
    Settings {
        /// Destination of the TOML file
        #[arg(long, value_name = "FILE")]
        output: PathBuf,

        #[command(flatten)]
        attack: SettingsArgs,
    },
    /// Show version information
    Version,
}

/// Terminal progress: one bar per attack stage, hidden when stderr is not a terminal.
struct TerminalProgress {
    bars: [ProgressBar; 3],
}

impl TerminalProgress {
    fn new() -> Self {
        Self {
            bars: std::array::from_fn(|_| ProgressBar::hidden()),
        }
    }

    fn bar(&self, stage: AttackStage) -> &ProgressBar {
        match stage {
            AttackStage::FixedAttack => &self.bars[0],
            AttackStage::ConfigurationSearch => &self.bars[1],
            AttackStage::AdaptiveAttack => &self.bars[2],
        }
    }
}

impl AttackProgressObserver for TerminalProgress {
    fn on_stage_start(&self, stage: AttackStage, total_targets: usize) {
        let bar = self.bar(stage);
        let style = ProgressStyle::with_template(
            "> [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} targets ({eta}) {msg}",
        )
        .map(|style| style.progress_chars("█▉▊▋▌▍▎▏  "))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        bar.set_length(total_targets as u64);
        bar.set_message(stage.describe());
        if std::io::stderr().is_terminal() {
            bar.set_draw_target(ProgressDrawTarget::stderr_with_hz(20));
        }
    }

    fn on_target_finished(&self, stage: AttackStage, target: usize) {
        let bar = self.bar(stage);
        bar.inc(1);
        log::debug!("{stage}: target model {target} done");
    }

    fn on_stage_finish(&self, stage: AttackStage) {
        self.bar(stage).finish_with_message(format!("{stage} complete"));
    }
}

fn run_attack(args: AttackArgs) -> Result<(), Box<dyn std::error::Error>> {
    // Everything that can be rejected without touching the filesystem is checked first.
    let settings = args.attack.resolve()?;
    let layout = ExperimentLayout::resolve(ExperimentSpec {
        results_dir: args.results_dir,
        seed: args.seed,
        exp_id: args.exp_id,
        examples_per_class: args.examples_per_class,
        learnable_params: args.learnable_params.into(),
        num_models: args.num_models,
    })?;
    log::info!(
        "Experiment {} (target epsilon {}), metric {}, {} variance, {}",
        layout.spec().exp_id,
        layout.epsilon(),
        settings.metric,
        if settings.use_global_variance {
            "global"
        } else {
            "per-example"
        },
        if settings.parallel {
            "parallel"
        } else {
            "sequential"
        }
    );

    let inputs = load_experiment_inputs(&layout)?;
    log::info!(
        "Attacking {} models over {} examples with {} shadow configurations",
        inputs.n_models(),
        inputs.n_examples(),
        inputs.shadow().n_configurations()
    );

    let progress = TerminalProgress::new();
    let outcome = run_attacks(&inputs, &settings, &progress)?;

    save_scores(&outcome.scores, &layout.scores_path())?;
    save_optimal_configurations(&outcome.optimal, &layout.optimal_configurations_path())?;
    Ok(())
}

fn write_settings(
    output: PathBuf,
    attack: SettingsArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let settings = attack.resolve()?;
    settings.save(&output)?;
    println!("Attack settings written to {}", output.display());
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Cli { command } = Cli::parse();

    let result = match command {
        Some(Commands::Attack(args)) => run_attack(args),
        Some(Commands::Settings { output, attack }) => write_settings(output, attack),
        Some(Commands::Version) => {
            print_version_info();
            Ok(())
        }
        None => Cli::command()
            .print_help()
            .map(|()| println!())
            .map_err(|err| Box::new(err) as Box<dyn std::error::Error>),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

/// Format seconds into a coarse age like "2.4 hours ago".
fn format_duration_ago(seconds: u64) -> String {
    const MINUTE: u64 = 60;
    const HOUR: u64 = 60 * MINUTE;
    const DAY: u64 = 24 * HOUR;

    if seconds < MINUTE {
        format!("{seconds} seconds ago")
    } else if seconds < HOUR {
        format!("{:.1} minutes ago", seconds as f64 / MINUTE as f64)
    } else if seconds < DAY {
        format!("{:.1} hours ago", seconds as f64 / HOUR as f64)
    } else {
        format!("{:.1} days ago", seconds as f64 / DAY as f64)
    }
}

fn print_version_info() {
    let version = env!("CARGO_PKG_VERSION");
    let build_timestamp: u64 = env!("LIRA_BUILD_TIMESTAMP").parse().unwrap_or(0);

    println!("lira {version}");

    if build_timestamp > 0 {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        if now > build_timestamp {
            println!("Built: {}", format_duration_ago(now - build_timestamp));
        } else {
            println!("Built: just now");
        }
    }
}
