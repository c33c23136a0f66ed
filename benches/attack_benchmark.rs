use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use lira::divergence::Metric;
use lira::optimizer::find_optimal_configurations;
use lira::progress::NoopAttackProgress;
use lira::statistics::{MembershipMatrix, ShadowStatistics, TargetStatistics};
use lira::{AttackInputs, AttackSettings, run_attacks};
use ndarray::{Array3, Array4};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

const N_EXAMPLES: usize = 64;
const N_REPETITIONS: usize = 4;

fn random_inputs(n_models: usize) -> AttackInputs {
    let mut rng = StdRng::seed_from_u64(0x11AA_5EED + n_models as u64);
    let rows: Vec<Vec<bool>> = (0..n_models)
        .map(|m| (0..N_EXAMPLES).map(|e| (m + e) % 2 == 0).collect())
        .collect();
    let membership = MembershipMatrix::from_rows(&rows).expect("rectangular membership");

    let mut draw = |member: bool, shift: f64| -> f64 {
        let noise: f64 = rng.sample(StandardNormal);
        (if member { 1.0 } else { -1.0 }) + shift + 0.5 * noise
    };
    let target = Array3::from_shape_fn((n_models, N_EXAMPLES, N_REPETITIONS), |(m, e, _)| {
        draw(membership.is_member(m, e), 0.0)
    });
    let shadow = Array4::from_shape_fn(
        (n_models, n_models, N_EXAMPLES, N_REPETITIONS),
        |(m, c, e, _)| draw(membership.is_member(m, e), 0.1 * c as f64),
    );
    AttackInputs::new(
        TargetStatistics::PerModel(target),
        ShadowStatistics::new(shadow),
        membership,
    )
    .expect("consistent inputs")
}

fn benchmark_attacks(c: &mut Criterion) {
    let model_counts = [8_usize, 16, 32];
    let fixtures: Vec<_> = model_counts
        .iter()
        .map(|&n| (n, random_inputs(n)))
        .collect();
    let settings = AttackSettings::default();

    let mut group = c.benchmark_group("lira");
    group.sample_size(10);
    for (n_models, inputs) in fixtures.iter() {
        group.throughput(Throughput::Elements((*n_models * N_EXAMPLES) as u64));

        group.bench_with_input(BenchmarkId::new("full_run", n_models), inputs, |b, input| {
            b.iter(|| {
                let outcome = run_attacks(black_box(input), &settings, &NoopAttackProgress);
                black_box(outcome).expect("attack succeeds");
            });
        });

        for metric in [Metric::Kl, Metric::Hellinger] {
            let search = AttackSettings {
                metric,
                ..settings
            };
            group.bench_with_input(
                BenchmarkId::new(format!("search_{metric}"), n_models),
                inputs,
                |b, input| {
                    b.iter(|| {
                        let selection =
                            find_optimal_configurations(black_box(input), &search, &NoopAttackProgress);
                        black_box(selection).expect("search succeeds");
                    });
                },
            );
        }
    }
    group.finish();
}

criterion_group!(attack_benchmark, benchmark_attacks);
criterion_main!(attack_benchmark);
